//! 反馈帧解析
//!
//! 两类反馈共用同一个接收 ID，由调用方按回调模式选择解析方式：
//! - 状态帧：位置 / 速度 / 力矩 / 温度
//! - 参数应答帧：寄存器 ID + 32 位数值
//!
//! 严格接口（`try_from_payload`）返回 `ProtocolError`；
//! `CanPacketDecoder` 的宽松接口返回带 `valid` 标志的结果，畸形数据不会 panic。

use crate::codec::uint_to_float;
use crate::constants::*;
use crate::ids::is_param_reply_tag;
use crate::{CAN_MAX_DLEN, OpenArmFrame, ProtocolError};
use tracing::warn;

// ============================================================================
// 状态帧
// ============================================================================

/// 状态帧原始字段
///
/// 位域布局（MSB 在前）：
/// - Byte 0: [bit7~bit4] 状态码 | [bit3~bit0] 电机 ID 低位
/// - Byte 1-2: q (16位)
/// - Byte 3: dq [bit11~bit4]
/// - Byte 4: dq [bit3~bit0] | tau [bit11~bit8]
/// - Byte 5: tau [bit7~bit0]
/// - Byte 6: MOS 温度（°C）
/// - Byte 7: 转子温度（°C）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorStateFeedback {
    pub status: MotorStatus,
    pub q_raw: u16,
    pub dq_raw: u16,
    pub tau_raw: u16,
    pub t_mos: u8,
    pub t_rotor: u8,
}

impl MotorStateFeedback {
    /// 从载荷解析（需要至少 8 字节）
    pub fn try_from_payload(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < CAN_MAX_DLEN {
            return Err(ProtocolError::InvalidLength {
                expected: CAN_MAX_DLEN,
                actual: data.len(),
            });
        }

        let q_raw = ((data[1] as u16) << 8) | data[2] as u16;
        let dq_raw = ((data[3] as u16) << 4) | (data[4] as u16 >> 4);
        let tau_raw = (((data[4] & 0x0F) as u16) << 8) | data[5] as u16;

        Ok(Self {
            status: MotorStatus::from(data[0] >> 4),
            q_raw,
            dq_raw,
            tau_raw,
            t_mos: data[6],
            t_rotor: data[7],
        })
    }

    /// 按电机型号限幅表换算为物理量
    pub fn to_physical(&self, motor_type: MotorType) -> MotorStateResult {
        let limits = motor_type.limits();
        MotorStateResult {
            position: uint_to_float(self.q_raw as u32, -limits.p_max, limits.p_max, POSITION_BITS),
            velocity: uint_to_float(self.dq_raw as u32, -limits.v_max, limits.v_max, VELOCITY_BITS),
            torque: uint_to_float(self.tau_raw as u32, -limits.t_max, limits.t_max, TORQUE_BITS),
            t_mos: self.t_mos as i32,
            t_rotor: self.t_rotor as i32,
            status: self.status,
            valid: true,
        }
    }
}

/// 状态帧解析结果
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorStateResult {
    /// rad
    pub position: f64,
    /// rad/s
    pub velocity: f64,
    /// N·m
    pub torque: f64,
    pub t_mos: i32,
    pub t_rotor: i32,
    pub status: MotorStatus,
    pub valid: bool,
}

// ============================================================================
// 参数应答帧
// ============================================================================

/// 参数应答帧
///
/// - Byte 0-1: 电机发送 ID（小端）
/// - Byte 2: 0x33（读应答）或 0x55（写应答）
/// - Byte 3: 寄存器 ID
/// - Byte 4-7: 数值（小端；整数寄存器为 u32，其余为 f32）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamFeedback {
    pub tag: u8,
    pub rid: u8,
    pub raw: [u8; 4],
}

impl ParamFeedback {
    /// 从载荷解析（需要至少 8 字节且功能字节为 0x33 / 0x55）
    pub fn try_from_payload(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < CAN_MAX_DLEN {
            return Err(ProtocolError::InvalidLength {
                expected: CAN_MAX_DLEN,
                actual: data.len(),
            });
        }
        if !is_param_reply_tag(data[2]) {
            return Err(ProtocolError::InvalidValue {
                field: "param_tag".to_string(),
                value: data[2],
            });
        }

        Ok(Self {
            tag: data[2],
            rid: data[3],
            raw: [data[4], data[5], data[6], data[7]],
        })
    }

    /// 按寄存器类型解释数值
    pub fn value(&self) -> f64 {
        if is_integer_register(self.rid) {
            u32::from_le_bytes(self.raw) as f64
        } else {
            f32::from_le_bytes(self.raw) as f64
        }
    }

    /// 已知寄存器（未知 RID 返回 `None`）
    pub fn variable(&self) -> Option<MotorVariable> {
        MotorVariable::try_from(self.rid).ok()
    }
}

impl TryFrom<OpenArmFrame> for ParamFeedback {
    type Error = ProtocolError;

    fn try_from(frame: OpenArmFrame) -> Result<Self, Self::Error> {
        Self::try_from_payload(frame.data_slice())
    }
}

/// 参数应答解析结果（无效时 `value` 为 NaN）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamResult {
    pub rid: u8,
    pub value: f64,
    pub valid: bool,
}

impl Default for ParamResult {
    fn default() -> Self {
        Self {
            rid: 0,
            value: f64::NAN,
            valid: false,
        }
    }
}

// ============================================================================
// 宽松解码器
// ============================================================================

/// 达妙电机反馈解码器
///
/// 畸形输入只产生 `valid == false` 的结果和一条 warn 日志。
#[derive(Debug, Clone, Copy, Default)]
pub struct CanPacketDecoder;

impl CanPacketDecoder {
    /// 解析状态帧
    pub fn parse_motor_state_data(motor_type: MotorType, data: &[u8]) -> MotorStateResult {
        match MotorStateFeedback::try_from_payload(data) {
            Ok(feedback) => feedback.to_physical(motor_type),
            Err(e) => {
                warn!("Skipping motor state data: {}", e);
                MotorStateResult::default()
            },
        }
    }

    /// 解析参数应答帧
    pub fn parse_motor_param_data(data: &[u8]) -> ParamResult {
        match ParamFeedback::try_from_payload(data) {
            Ok(feedback) => ParamResult {
                rid: feedback.rid,
                value: feedback.value(),
                valid: true,
            },
            Err(e) => {
                warn!("Invalid param data: {}", e);
                ParamResult::default()
            },
        }
    }
}
