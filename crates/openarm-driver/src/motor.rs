//! 电机实体
//!
//! 身份（型号 + 收发 ID）构造后不可变；状态与参数表由集合在收到反馈时更新。

use openarm_protocol::{
    CallbackMode, ControlMode, MotorIdentity, MotorStateResult, MotorStatus, MotorType,
    MotorVariable, ParamResult,
};
use std::collections::BTreeMap;

/// 最近一次解码得到的电机状态
///
/// 初始为全 0 且 `valid == false`，直到收到第一帧有效状态。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorState {
    /// rad
    pub position: f64,
    /// rad/s
    pub velocity: f64,
    /// N·m
    pub torque: f64,
    /// MOS 温度（°C）
    pub t_mos: i32,
    /// 转子温度（°C）
    pub t_rotor: i32,
    pub status: MotorStatus,
    pub valid: bool,
}

/// 单个达妙电机
#[derive(Debug, Clone, PartialEq)]
pub struct Motor {
    identity: MotorIdentity,
    control_mode: ControlMode,
    callback_mode: CallbackMode,
    enabled: bool,
    state: MotorState,
    params: BTreeMap<u8, f64>,
}

impl Motor {
    pub fn new(
        motor_type: MotorType,
        send_can_id: u32,
        recv_can_id: u32,
        control_mode: ControlMode,
    ) -> Self {
        Self {
            identity: MotorIdentity::new(motor_type, send_can_id, recv_can_id),
            control_mode,
            callback_mode: CallbackMode::State,
            enabled: false,
            state: MotorState::default(),
            params: BTreeMap::new(),
        }
    }

    pub fn identity(&self) -> &MotorIdentity {
        &self.identity
    }

    pub fn motor_type(&self) -> MotorType {
        self.identity.motor_type
    }

    pub fn send_can_id(&self) -> u32 {
        self.identity.send_can_id
    }

    pub fn recv_can_id(&self) -> u32 {
        self.identity.recv_can_id
    }

    /// 固件当前（最近一次下发）的控制模式
    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn callback_mode(&self) -> CallbackMode {
        self.callback_mode
    }

    /// 按最近一次下发的使能 / 失能命令跟踪，不代表固件应答
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> &MotorState {
        &self.state
    }

    pub fn position(&self) -> f64 {
        self.state.position
    }

    pub fn velocity(&self) -> f64 {
        self.state.velocity
    }

    pub fn torque(&self) -> f64 {
        self.state.torque
    }

    pub fn t_mos(&self) -> i32 {
        self.state.t_mos
    }

    pub fn t_rotor(&self) -> i32 {
        self.state.t_rotor
    }

    pub fn status(&self) -> MotorStatus {
        self.state.status
    }

    /// 是否已收到过有效状态帧
    pub fn is_state_valid(&self) -> bool {
        self.state.valid
    }

    /// 已查询到的寄存器值；未收到应答时为 `None`
    pub fn get_param(&self, rid: MotorVariable) -> Option<f64> {
        self.get_param_raw(rid.rid())
    }

    /// 按原始 RID 读取（包括未在 `MotorVariable` 中列出的寄存器）
    pub fn get_param_raw(&self, rid: u8) -> Option<f64> {
        self.params.get(&rid).copied()
    }

    /// 所有已收到的寄存器值（按 RID 升序）
    pub fn params(&self) -> impl Iterator<Item = (u8, f64)> + '_ {
        self.params.iter().map(|(rid, value)| (*rid, *value))
    }

    pub(crate) fn set_callback_mode(&mut self, mode: CallbackMode) {
        self.callback_mode = mode;
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_control_mode(&mut self, mode: ControlMode) {
        self.control_mode = mode;
    }

    /// 应用状态解码结果，无效结果被忽略
    pub(crate) fn apply_state(&mut self, result: &MotorStateResult) -> bool {
        if !result.valid {
            return false;
        }
        self.state = MotorState {
            position: result.position,
            velocity: result.velocity,
            torque: result.torque,
            t_mos: result.t_mos,
            t_rotor: result.t_rotor,
            status: result.status,
            valid: true,
        };
        true
    }

    /// 应用参数解码结果，无效结果被忽略
    pub(crate) fn apply_param(&mut self, result: &ParamResult) -> bool {
        if !result.valid {
            return false;
        }
        self.params.insert(result.rid, result.value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor() -> Motor {
        Motor::new(MotorType::Dm4310, 0x01, 0x11, ControlMode::Mit)
    }

    #[test]
    fn test_new_motor_defaults() {
        let m = motor();
        assert_eq!(m.send_can_id(), 0x01);
        assert_eq!(m.recv_can_id(), 0x11);
        assert_eq!(m.motor_type(), MotorType::Dm4310);
        assert_eq!(m.callback_mode(), CallbackMode::State);
        assert!(!m.is_state_valid());
        assert!(!m.is_enabled());
        assert_eq!(m.position(), 0.0);
        assert_eq!(m.get_param(MotorVariable::MstId), None);
    }

    #[test]
    fn test_apply_valid_state() {
        let mut m = motor();
        let result = MotorStateResult {
            position: 1.0,
            velocity: -2.0,
            torque: 0.5,
            t_mos: 30,
            t_rotor: 33,
            status: MotorStatus::Enabled,
            valid: true,
        };
        assert!(m.apply_state(&result));
        assert!(m.is_state_valid());
        assert_eq!(m.velocity(), -2.0);
        assert_eq!(m.t_rotor(), 33);
        assert_eq!(m.status(), MotorStatus::Enabled);
    }

    #[test]
    fn test_invalid_state_leaves_previous() {
        let mut m = motor();
        let good = MotorStateResult {
            position: 1.0,
            valid: true,
            ..Default::default()
        };
        m.apply_state(&good);
        assert!(!m.apply_state(&MotorStateResult::default()));
        assert_eq!(m.position(), 1.0);
        assert!(m.is_state_valid());
    }

    #[test]
    fn test_apply_param() {
        let mut m = motor();
        assert!(m.apply_param(&ParamResult {
            rid: 7,
            value: 17.0,
            valid: true,
        }));
        assert!(!m.apply_param(&ParamResult::default()));
        assert_eq!(m.get_param(MotorVariable::MstId), Some(17.0));
        assert_eq!(m.params().collect::<Vec<_>>(), vec![(7, 17.0)]);
    }
}
