//! 物理量量化编解码
//!
//! 将位置、速度、力矩、增益等浮点物理量映射到定宽无符号整数，以及反向映射。
//!
//! 编码先限幅、再线性映射到 `[0, 2^bits - 1]`、最后截断取整，是全函数：
//! 越界输入被限幅而不是拒绝。解码是仿射逆映射。
//!
//! **注意**：往返不是无损的。`uint_to_float(float_to_uint(x))` 与 `x` 的误差
//! 上界为一个量化步长 `(max - min) / (2^bits - 1)`，这是协议的固有精度。

/// 将 `x` 限制在 `[min, max]` 内
///
/// NaN 被映射为 `min`。
pub fn clamp(x: f64, min: f64, max: f64) -> f64 {
    x.max(min).min(max)
}

/// 计算 `bits` 位无符号整数的最大值
fn max_uint(bits: u32) -> u64 {
    (1u64 << bits.min(32)) - 1
}

/// 浮点数 → 无符号整数
///
/// 公式：`(clamp(x) - min) / (max - min) * (2^bits - 1)`，向零截断。
/// 区间宽度非正时返回 0。
pub fn float_to_uint(x: f64, min: f64, max: f64, bits: u32) -> u32 {
    let span = max - min;
    if span <= 0.0 || span.is_nan() {
        return 0;
    }
    let max_int = max_uint(bits);
    let norm = (clamp(x, min, max) - min) / span;
    let result = (norm * max_int as f64) as u64;
    result.min(max_int) as u32
}

/// 无符号整数 → 浮点数
///
/// 公式：`u / (2^bits - 1) * (max - min) + min`
/// 零位宽只有一个码值，恒返回 `min`。
pub fn uint_to_float(u: u32, min: f64, max: f64, bits: u32) -> f64 {
    if bits == 0 {
        return min;
    }
    let span = max - min;
    let max_int = max_uint(bits) as f64;
    (u as f64) / max_int * span + min
}

/// 给定区间与位宽下的量化步长，零位宽时为 0
pub fn quantization_step(min: f64, max: f64, bits: u32) -> f64 {
    if bits == 0 {
        return 0.0;
    }
    (max - min) / max_uint(bits) as f64
}
