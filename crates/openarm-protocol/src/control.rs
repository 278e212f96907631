//! 控制帧构建
//!
//! `CanPacketEncoder` 为每种命令提供一个纯函数：输入电机身份与命令参数，
//! 输出 `CanPacket`（ID + 8 字节载荷），不做任何 I/O。

use crate::codec::{clamp, float_to_uint};
use crate::constants::*;
use crate::ids::*;
use crate::{CAN_MAX_DLEN, OpenArmFrame};

/// 电机身份（构造后不可变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotorIdentity {
    pub motor_type: MotorType,
    /// 主机 → 电机
    pub send_can_id: u32,
    /// 电机 → 主机
    pub recv_can_id: u32,
}

impl MotorIdentity {
    pub fn new(motor_type: MotorType, send_can_id: u32, recv_can_id: u32) -> Self {
        Self {
            motor_type,
            send_can_id,
            recv_can_id,
        }
    }

    /// 发送 ID 的小端两字节（广播帧载荷前缀）
    fn send_id_le(&self) -> [u8; 2] {
        [
            (self.send_can_id & 0xFF) as u8,
            ((self.send_can_id >> 8) & 0xFF) as u8,
        ]
    }
}

/// 待发送的命令包，构建后立即交给传输层
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanPacket {
    pub send_can_id: u32,
    pub data: [u8; CAN_MAX_DLEN],
}

impl CanPacket {
    /// 转换为经典 CAN 帧
    pub fn to_frame(&self) -> OpenArmFrame {
        OpenArmFrame::new_standard(self.send_can_id as u16, &self.data)
    }

    /// 转换为 CAN-FD 帧（载荷仍为 8 字节）
    pub fn to_fd_frame(&self) -> OpenArmFrame {
        OpenArmFrame::new_fd(self.send_can_id as u16, &self.data)
    }
}

/// MIT 控制参数
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MitParam {
    /// 位置增益 [0, 500]
    pub kp: f64,
    /// 阻尼增益 [0, 5]
    pub kd: f64,
    /// 目标位置（rad）
    pub q: f64,
    /// 目标速度（rad/s）
    pub dq: f64,
    /// 前馈力矩（N·m）
    pub tau: f64,
}

impl MitParam {
    pub fn new(kp: f64, kd: f64, q: f64, dq: f64, tau: f64) -> Self {
        Self { kp, kd, q, dq, tau }
    }
}

/// 位置-速度模式参数
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PosVelParam {
    /// 目标位置（rad）
    pub q: f64,
    /// 速度上限（rad/s）
    pub dq: f64,
}

/// 力位混合模式参数
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PosForceParam {
    /// 目标位置（rad）
    pub q: f64,
    /// 速度上限（rad/s），[0, v_max]
    pub dq: f64,
    /// 电流标幺值上限，[0, 1]
    pub i: f64,
}

/// 达妙电机命令编码器
#[derive(Debug, Clone, Copy, Default)]
pub struct CanPacketEncoder;

impl CanPacketEncoder {
    fn special_command(motor: &MotorIdentity, cmd: u8) -> CanPacket {
        let mut data = [CMD_PREFIX; CAN_MAX_DLEN];
        data[7] = cmd;
        CanPacket {
            send_can_id: motor.send_can_id,
            data,
        }
    }

    fn broadcast(motor: &MotorIdentity, tag: u8, rid: u8, value: [u8; 4]) -> CanPacket {
        let [lo, hi] = motor.send_id_le();
        CanPacket {
            send_can_id: ID_PARAM_BROADCAST,
            data: [lo, hi, tag, rid, value[0], value[1], value[2], value[3]],
        }
    }

    /// 使能：`FF×7 FC`
    pub fn create_enable_command(motor: &MotorIdentity) -> CanPacket {
        Self::special_command(motor, CMD_ENABLE)
    }

    /// 失能：`FF×7 FD`
    pub fn create_disable_command(motor: &MotorIdentity) -> CanPacket {
        Self::special_command(motor, CMD_DISABLE)
    }

    /// 设置零点：`FF×7 FE`
    pub fn create_set_zero_command(motor: &MotorIdentity) -> CanPacket {
        Self::special_command(motor, CMD_SET_ZERO)
    }

    /// MIT 控制帧
    ///
    /// 协议位域布局（MSB 在前）：
    /// - Byte 0-1: q (16位)
    /// - Byte 2: dq [bit11~bit4]
    /// - Byte 3: dq [bit3~bit0] | kp [bit11~bit8]
    /// - Byte 4: kp [bit7~bit0]
    /// - Byte 5: kd [bit11~bit4]
    /// - Byte 6: kd [bit3~bit0] | tau [bit11~bit8]
    /// - Byte 7: tau [bit7~bit0]
    ///
    /// q / dq / tau 的范围取自电机型号限幅表，越界值被限幅。
    pub fn create_mit_control_command(motor: &MotorIdentity, param: &MitParam) -> CanPacket {
        let limits = motor.motor_type.limits();

        let kp_uint = float_to_uint(param.kp, KP_MIN, KP_MAX, GAIN_BITS);
        let kd_uint = float_to_uint(param.kd, KD_MIN, KD_MAX, GAIN_BITS);
        let q_uint = float_to_uint(param.q, -limits.p_max, limits.p_max, POSITION_BITS);
        let dq_uint = float_to_uint(param.dq, -limits.v_max, limits.v_max, VELOCITY_BITS);
        let tau_uint = float_to_uint(param.tau, -limits.t_max, limits.t_max, TORQUE_BITS);

        let data = [
            ((q_uint >> 8) & 0xFF) as u8,
            (q_uint & 0xFF) as u8,
            ((dq_uint >> 4) & 0xFF) as u8,
            (((dq_uint & 0x0F) << 4) | ((kp_uint >> 8) & 0x0F)) as u8,
            (kp_uint & 0xFF) as u8,
            ((kd_uint >> 4) & 0xFF) as u8,
            (((kd_uint & 0x0F) << 4) | ((tau_uint >> 8) & 0x0F)) as u8,
            (tau_uint & 0xFF) as u8,
        ];

        CanPacket {
            send_can_id: motor.send_can_id,
            data,
        }
    }

    /// 位置-速度控制帧（ID = 发送 ID + 0x100）
    ///
    /// - Byte 0-3: q，f32 小端
    /// - Byte 4-7: dq，f32 小端
    pub fn create_posvel_control_command(motor: &MotorIdentity, param: &PosVelParam) -> CanPacket {
        let limits = motor.motor_type.limits();
        let q = clamp(param.q, -limits.p_max, limits.p_max) as f32;
        let dq = clamp(param.dq, -limits.v_max, limits.v_max) as f32;

        let mut data = [0u8; CAN_MAX_DLEN];
        data[..4].copy_from_slice(&q.to_le_bytes());
        data[4..].copy_from_slice(&dq.to_le_bytes());

        CanPacket {
            send_can_id: motor.send_can_id + ID_OFFSET_POS_VEL,
            data,
        }
    }

    /// 力位混合控制帧（ID = 发送 ID + 0x300）
    ///
    /// - Byte 0-3: q，f32 小端
    /// - Byte 4-5: dq × 100，u16 小端，dq ∈ [0, v_max]
    /// - Byte 6-7: i × 10000，u16 小端，i ∈ [0, 1]
    pub fn create_posforce_control_command(
        motor: &MotorIdentity,
        param: &PosForceParam,
    ) -> CanPacket {
        let limits = motor.motor_type.limits();
        let q = clamp(param.q, -limits.p_max, limits.p_max) as f32;
        let dq = clamp(param.dq, 0.0, limits.v_max);
        let i = clamp(param.i, 0.0, 1.0);

        let dq_scaled = clamp(dq * 100.0, 0.0, u16::MAX as f64) as u16;
        let i_scaled = (i * 10000.0) as u16;

        let mut data = [0u8; CAN_MAX_DLEN];
        data[..4].copy_from_slice(&q.to_le_bytes());
        data[4..6].copy_from_slice(&dq_scaled.to_le_bytes());
        data[6..].copy_from_slice(&i_scaled.to_le_bytes());

        CanPacket {
            send_can_id: motor.send_can_id + ID_OFFSET_POS_FORCE,
            data,
        }
    }

    /// 读取寄存器：`[id_lo, id_hi, 0x33, rid, 0, 0, 0, 0]` @ 0x7FF
    pub fn create_query_param_command(motor: &MotorIdentity, rid: MotorVariable) -> CanPacket {
        Self::create_query_param_raw_command(motor, rid.rid())
    }

    /// 按原始 RID 读取寄存器（包括未在 `MotorVariable` 中列出的寄存器）
    pub fn create_query_param_raw_command(motor: &MotorIdentity, rid: u8) -> CanPacket {
        Self::broadcast(motor, PARAM_READ, rid, [0; 4])
    }

    /// 请求状态刷新：`[id_lo, id_hi, 0xCC, 0, 0, 0, 0, 0]` @ 0x7FF
    pub fn create_refresh_command(motor: &MotorIdentity) -> CanPacket {
        let [lo, hi] = motor.send_id_le();
        CanPacket {
            send_can_id: ID_PARAM_BROADCAST,
            data: [lo, hi, STATE_REFRESH, 0, 0, 0, 0, 0],
        }
    }

    /// 写入寄存器：`[id_lo, id_hi, 0x55, rid, v0..v3]` @ 0x7FF
    ///
    /// 整数寄存器按 u32 小端（四舍五入并限幅到 u32 范围），其余按 f32 小端。
    pub fn create_write_param_command(
        motor: &MotorIdentity,
        rid: MotorVariable,
        value: f64,
    ) -> CanPacket {
        let bytes = if rid.is_integer() {
            (clamp(value.round(), 0.0, u32::MAX as f64) as u32).to_le_bytes()
        } else {
            (value as f32).to_le_bytes()
        };
        Self::broadcast(motor, PARAM_WRITE, rid.rid(), bytes)
    }

    /// 切换固件控制模式（写寄存器 `CTRL_MODE`）
    pub fn create_set_control_mode_command(motor: &MotorIdentity, mode: ControlMode) -> CanPacket {
        Self::create_write_param_command(motor, MotorVariable::CtrlMode, u8::from(mode) as f64)
    }
}
