//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use openarm_sdk::prelude::*;
//! ```

pub use crate::can::CanAdapter;
pub use crate::driver::{
    ArmComponent, DriverError, GripperComponent, Motor, MotorRef, OpenArm, OpenArmConfig,
    RecvStats,
};
pub use crate::protocol::{
    CallbackMode, ControlMode, MitParam, MotorType, MotorVariable, PosForceParam, PosVelParam,
};
