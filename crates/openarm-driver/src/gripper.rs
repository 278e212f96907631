//! 夹爪组件
//!
//! 单电机集合。对外使用归一化的夹爪开度（1.0 = 张开，0.0 = 闭合），
//! 内部按线性映射换算为电机角度（rad）。

use crate::collection::{DmDeviceCollection, SharedBus};
use crate::error::DriverError;
use crate::motor::Motor;
use openarm_protocol::{clamp, ControlMode, MitParam, MotorType, PosForceParam};
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// 默认速度上限（rad/s）
pub const DEFAULT_LIMIT_SPEED: f64 = 5.0;
/// 默认电流上限（标幺值）
pub const DEFAULT_LIMIT_TORQUE_PU: f64 = 0.5;
/// `set_position_mit` 默认刚度
pub const DEFAULT_MIT_KP: f64 = 50.0;
/// `set_position_mit` 默认阻尼
pub const DEFAULT_MIT_KD: f64 = 1.0;

/// 夹爪开度与电机角度的映射端点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GripperMapping {
    pub gripper_open: f64,
    pub gripper_closed: f64,
    /// 抓取目标（略超过闭合，保证持续施力）
    pub gripper_grasp: f64,
    pub motor_open: f64,
    pub motor_closed: f64,
}

impl Default for GripperMapping {
    fn default() -> Self {
        Self {
            gripper_open: 1.0,
            gripper_closed: 0.0,
            gripper_grasp: -0.1,
            motor_open: -1.0472,
            motor_closed: 0.0,
        }
    }
}

impl GripperMapping {
    pub fn gripper_to_motor(&self, gripper: f64) -> f64 {
        (gripper - self.gripper_open) / (self.gripper_closed - self.gripper_open)
            * (self.motor_closed - self.motor_open)
            + self.motor_open
    }

    pub fn motor_to_gripper(&self, motor: f64) -> f64 {
        (motor - self.motor_open) / (self.motor_closed - self.motor_open)
            * (self.gripper_closed - self.gripper_open)
            + self.gripper_open
    }
}

#[derive(Debug)]
pub struct GripperComponent {
    devices: DmDeviceCollection,
    mapping: GripperMapping,
    limit_speed: f64,
    limit_torque_pu: f64,
}

impl GripperComponent {
    pub fn new(bus: SharedBus) -> Self {
        Self {
            devices: DmDeviceCollection::new("gripper", bus),
            mapping: GripperMapping::default(),
            limit_speed: DEFAULT_LIMIT_SPEED,
            limit_torque_pu: DEFAULT_LIMIT_TORQUE_PU,
        }
    }

    /// 替换开度映射
    pub fn with_mapping(mut self, mapping: GripperMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn set_mapping(&mut self, mapping: GripperMapping) {
        self.mapping = mapping;
    }

    pub fn init_motor_device(
        &mut self,
        motor_type: MotorType,
        send_can_id: u32,
        recv_can_id: u32,
        control_mode: ControlMode,
    ) -> Result<(), DriverError> {
        self.devices.init_motors(vec![Motor::new(
            motor_type,
            send_can_id,
            recv_can_id,
            control_mode,
        )])
    }

    pub fn mapping(&self) -> &GripperMapping {
        &self.mapping
    }

    pub fn limit_speed(&self) -> f64 {
        self.limit_speed
    }

    pub fn limit_torque_pu(&self) -> f64 {
        self.limit_torque_pu
    }

    /// 设置力位混合模式下的默认速度与电流上限，电流标幺值限制在 [0, 1]
    pub fn set_limit(&mut self, speed_rad_s: f64, torque_pu: f64) {
        self.limit_speed = speed_rad_s;
        self.limit_torque_pu = clamp(torque_pu, 0.0, 1.0);
        debug!(
            "gripper limits: speed={} rad/s, torque={} pu",
            self.limit_speed, self.limit_torque_pu
        );
    }

    pub fn motor(&self) -> Result<&Motor, DriverError> {
        self.devices
            .motors()
            .first()
            .ok_or(DriverError::NotInitialized("gripper"))
    }

    pub fn gripper_to_motor_position(&self, gripper_position: f64) -> f64 {
        self.mapping.gripper_to_motor(gripper_position)
    }

    pub fn motor_to_gripper_position(&self, motor_position: f64) -> f64 {
        self.mapping.motor_to_gripper(motor_position)
    }

    /// 由最近一次状态帧换算的夹爪开度；尚无有效状态时为 `None`
    pub fn position(&self) -> Option<f64> {
        let motor = self.devices.motors().first()?;
        motor
            .is_state_valid()
            .then(|| self.motor_to_gripper_position(motor.position()))
    }

    // ============================================================================
    // 动作
    // ============================================================================

    /// 张开（力位混合，默认限速限流）
    pub fn open(&self) -> Result<(), DriverError> {
        self.set_position(self.mapping.gripper_open, None, None, false)
    }

    /// 闭合（力位混合，默认限速限流）
    pub fn close(&self) -> Result<(), DriverError> {
        self.set_position(self.mapping.gripper_closed, None, None, false)
    }

    /// MIT 模式张开
    pub fn open_mit(&self, kp: f64, kd: f64) -> Result<(), DriverError> {
        self.set_position_mit(self.mapping.gripper_open, kp, kd)
    }

    /// MIT 模式闭合
    pub fn close_mit(&self, kp: f64, kd: f64) -> Result<(), DriverError> {
        self.set_position_mit(self.mapping.gripper_closed, kp, kd)
    }

    /// 以给定电流上限向抓取位置运动，物体阻挡时保持该夹持力
    pub fn grasp(&self, torque_pu: f64, speed_rad_s: Option<f64>) -> Result<(), DriverError> {
        self.set_position(self.mapping.gripper_grasp, speed_rad_s, Some(torque_pu), false)
    }

    /// 力位混合位置控制
    ///
    /// `raw_position` 为 true 时 `position` 直接作为电机角度（rad）。
    pub fn set_position(
        &self,
        position: f64,
        speed_rad_s: Option<f64>,
        torque_pu: Option<f64>,
        raw_position: bool,
    ) -> Result<(), DriverError> {
        self.motor()?;
        let q = if raw_position {
            position
        } else {
            self.gripper_to_motor_position(position)
        };
        let param = PosForceParam {
            q,
            dq: speed_rad_s.unwrap_or(self.limit_speed),
            i: torque_pu.unwrap_or(self.limit_torque_pu),
        };
        self.devices.posforce_control_one(0, &param)
    }

    /// MIT 位置控制（前馈速度与力矩为 0）
    pub fn set_position_mit(&self, position: f64, kp: f64, kd: f64) -> Result<(), DriverError> {
        self.motor()?;
        let q = self.gripper_to_motor_position(position);
        self.devices
            .mit_control_one(0, &MitParam::new(kp, kd, q, 0.0, 0.0))
    }

    pub fn set_zero(&self) -> Result<(), DriverError> {
        self.motor()?;
        self.devices.set_zero_one(0)
    }

    pub fn devices(&self) -> &DmDeviceCollection {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DmDeviceCollection {
        &mut self.devices
    }
}

impl Deref for GripperComponent {
    type Target = DmDeviceCollection;

    fn deref(&self) -> &Self::Target {
        &self.devices
    }
}

impl DerefMut for GripperComponent {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openarm_can::{MockBusHandle, MockCanAdapter, OpenArmFrame};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn gripper() -> (GripperComponent, MockBusHandle) {
        let (adapter, handle) = MockCanAdapter::new();
        let mut g = GripperComponent::new(Rc::new(RefCell::new(adapter)));
        g.init_motor_device(MotorType::Dm4310, 0x08, 0x18, ControlMode::PosForce)
            .unwrap();
        (g, handle)
    }

    fn f32_at(data: &[u8], at: usize) -> f32 {
        f32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
    }

    #[test]
    fn test_mapping_endpoints() {
        let m = GripperMapping::default();
        assert!((m.gripper_to_motor(1.0) - -1.0472).abs() < 1e-12);
        assert!(m.gripper_to_motor(0.0).abs() < 1e-12);
        assert!((m.motor_to_gripper(-1.0472) - 1.0).abs() < 1e-12);
        assert!((m.motor_to_gripper(m.gripper_to_motor(0.37)) - 0.37).abs() < 1e-12);
    }

    #[test]
    fn test_open_uses_posforce_with_defaults() {
        let (g, handle) = gripper();
        g.open().unwrap();
        let sent = handle.sent_frames();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, 0x308);
        let data = sent[0].data_slice();
        assert!((f32_at(data, 0) - -1.0472).abs() < 1e-6);
        assert_eq!(u16::from_le_bytes([data[4], data[5]]), 500);
        assert_eq!(u16::from_le_bytes([data[6], data[7]]), 5000);
    }

    #[test]
    fn test_grasp_targets_past_closed() {
        let (g, handle) = gripper();
        g.grasp(0.3, None).unwrap();
        let sent = handle.sent_frames();
        let data = sent[0].data_slice();
        assert!(f32_at(data, 0) > 0.0);
        assert_eq!(u16::from_le_bytes([data[6], data[7]]), 3000);
    }

    #[test]
    fn test_set_limit_clamps_torque() {
        let (mut g, _) = gripper();
        g.set_limit(2.0, 1.7);
        assert_eq!(g.limit_speed(), 2.0);
        assert_eq!(g.limit_torque_pu(), 1.0);
        g.set_limit(2.0, -0.2);
        assert_eq!(g.limit_torque_pu(), 0.0);
    }

    #[test]
    fn test_raw_position_bypasses_mapping() {
        let (g, handle) = gripper();
        g.set_position(0.25, Some(1.0), Some(0.1), true).unwrap();
        let data = handle.sent_frames()[0];
        assert_eq!(f32_at(data.data_slice(), 0), 0.25);
    }

    #[test]
    fn test_set_position_mit_frame_id() {
        let (g, handle) = gripper();
        g.set_position_mit(0.0, DEFAULT_MIT_KP, DEFAULT_MIT_KD).unwrap();
        let sent = handle.sent_frames();
        assert_eq!(sent[0].id, 0x08);
        // q = 0 落在量程中点
        assert_eq!(&sent[0].data_slice()[..2], &[0x7F, 0xFF]);
    }

    #[test]
    fn test_uninitialized_gripper() {
        let (adapter, handle) = MockCanAdapter::new();
        let g = GripperComponent::new(Rc::new(RefCell::new(adapter)));
        assert!(matches!(g.open(), Err(DriverError::NotInitialized("gripper"))));
        assert!(g.position().is_none());
        assert!(handle.sent_frames().is_empty());
    }

    #[test]
    fn test_position_from_state() {
        let (mut g, _) = gripper();
        assert!(g.position().is_none());
        // q 原始值 0x7FFF ≈ 0 rad → 闭合
        let frame = OpenArmFrame::new_standard(0x18, &[0x18, 0x7F, 0xFF, 0x7F, 0xF7, 0xFF, 25, 25]);
        assert!(g.dispatch_frame(&frame));
        let pos = g.position().unwrap();
        assert!(pos.abs() < 1e-3, "position {}", pos);
    }
}
