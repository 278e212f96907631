//! CAN ID 与命令字节常量
//!
//! 每个电机有一对由用户分配的 ID：发送 ID（主机 → 电机）与接收 ID（电机 → 主机）。
//! 参数读写和状态刷新走固定的广播 ID `0x7FF`，目标电机由载荷前两个字节指定。

/// 参数读写 / 状态刷新使用的广播 ID
pub const ID_PARAM_BROADCAST: u32 = 0x7FF;

/// 位置-速度模式控制帧的 ID 偏移（发送 ID + 0x100）
pub const ID_OFFSET_POS_VEL: u32 = 0x100;

/// 力位混合模式控制帧的 ID 偏移（发送 ID + 0x300）
pub const ID_OFFSET_POS_FORCE: u32 = 0x300;

/// 标准帧最大 ID
pub const STANDARD_ID_MAX: u32 = 0x7FF;

// ============================================================================
// 特殊命令字节（Byte 7，前 7 字节为 0xFF）
// ============================================================================

/// 使能
pub const CMD_ENABLE: u8 = 0xFC;

/// 失能
pub const CMD_DISABLE: u8 = 0xFD;

/// 将当前位置设为零点
pub const CMD_SET_ZERO: u8 = 0xFE;

/// 特殊命令的前导填充字节
pub const CMD_PREFIX: u8 = 0xFF;

// ============================================================================
// 广播帧功能字节（Byte 2）
// ============================================================================

/// 读取寄存器
pub const PARAM_READ: u8 = 0x33;

/// 写入寄存器
pub const PARAM_WRITE: u8 = 0x55;

/// 请求状态刷新
pub const STATE_REFRESH: u8 = 0xCC;

/// 是否为合法的参数应答功能字节
pub fn is_param_reply_tag(tag: u8) -> bool {
    tag == PARAM_READ || tag == PARAM_WRITE
}
