//! 手臂组件
//!
//! 多关节电机集合，初始化参数为三组（可选四组）并行数组。
//! 集合的全部操作通过 `Deref` 直接可用。

use crate::collection::{DmDeviceCollection, SharedBus};
use crate::error::DriverError;
use crate::motor::Motor;
use openarm_protocol::{ControlMode, MotorType};
use std::ops::{Deref, DerefMut};

#[derive(Debug)]
pub struct ArmComponent {
    devices: DmDeviceCollection,
}

impl ArmComponent {
    pub fn new(bus: SharedBus) -> Self {
        Self {
            devices: DmDeviceCollection::new("arm", bus),
        }
    }

    /// 按并行数组创建关节电机
    ///
    /// `control_modes` 为 `None` 时全部使用 MIT 模式。
    /// 任一数组长度与 `motor_types` 不一致时返回 `ConfigMismatch`，集合保持未初始化。
    pub fn init_motor_devices(
        &mut self,
        motor_types: &[MotorType],
        send_can_ids: &[u32],
        recv_can_ids: &[u32],
        control_modes: Option<&[ControlMode]>,
    ) -> Result<(), DriverError> {
        let expected = motor_types.len();
        let check = |what: &'static str, actual: usize| {
            if actual == expected {
                Ok(())
            } else {
                Err(DriverError::ConfigMismatch {
                    what,
                    expected,
                    actual,
                })
            }
        };
        check("send CAN ids", send_can_ids.len())?;
        check("recv CAN ids", recv_can_ids.len())?;
        if let Some(modes) = control_modes {
            check("control modes", modes.len())?;
        }

        let motors = (0..expected)
            .map(|i| {
                let mode = control_modes.map_or(ControlMode::Mit, |modes| modes[i]);
                Motor::new(motor_types[i], send_can_ids[i], recv_can_ids[i], mode)
            })
            .collect();
        self.devices.init_motors(motors)
    }

    pub fn devices(&self) -> &DmDeviceCollection {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DmDeviceCollection {
        &mut self.devices
    }

    /// 各关节位置（rad）
    pub fn positions(&self) -> Vec<f64> {
        self.devices.motors().iter().map(Motor::position).collect()
    }
}

impl Deref for ArmComponent {
    type Target = DmDeviceCollection;

    fn deref(&self) -> &Self::Target {
        &self.devices
    }
}

impl DerefMut for ArmComponent {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openarm_can::MockCanAdapter;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn arm() -> ArmComponent {
        let (adapter, _) = MockCanAdapter::new();
        ArmComponent::new(Rc::new(RefCell::new(adapter)))
    }

    #[test]
    fn test_init_parallel_arrays() {
        let mut arm = arm();
        arm.init_motor_devices(
            &[MotorType::Dm8009, MotorType::Dm4340],
            &[0x01, 0x02],
            &[0x11, 0x12],
            Some(&[ControlMode::Mit, ControlMode::PosVel]),
        )
        .unwrap();
        assert_eq!(arm.motor_count(), 2);
        assert_eq!(arm.motors()[1].motor_type(), MotorType::Dm4340);
        assert_eq!(arm.motors()[1].control_mode(), ControlMode::PosVel);
        assert_eq!(arm.positions(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_init_length_mismatch() {
        let mut arm = arm();
        let err = arm
            .init_motor_devices(&[MotorType::Dm8009; 3], &[1, 2, 3], &[0x11, 0x12], None)
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::ConfigMismatch {
                what: "recv CAN ids",
                expected: 3,
                actual: 2,
            }
        ));
        assert!(!arm.is_initialized());
    }

    #[test]
    fn test_default_mode_is_mit() {
        let mut arm = arm();
        arm.init_motor_devices(&[MotorType::Dm4310], &[0x01], &[0x11], None)
            .unwrap();
        assert_eq!(arm.motors()[0].control_mode(), ControlMode::Mit);
    }
}
