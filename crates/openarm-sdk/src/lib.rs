//! OpenArm SDK - 达妙电机 CAN / CAN-FD 驱动栈
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 量化编解码、控制帧编码、反馈帧解码，无 I/O
//! - **CAN 层** (`can`): `CanAdapter` 传输抽象，SocketCAN（经典帧 / CAN-FD）与 Mock
//! - **驱动层** (`driver`): 电机实体、电机集合、手臂 / 夹爪组件、协调器 `OpenArm`
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use openarm_sdk::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), DriverError> {
//! let mut arm = OpenArm::open("can0", true)?;
//! arm.init_arm_motors(&[MotorType::Dm8009], &[0x01], &[0x11], None)?;
//! arm.enable_all()?;
//! arm.refresh_all()?;
//! arm.recv_all(Duration::from_micros(500))?;
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod prelude;

pub use openarm_can as can;
pub use openarm_driver as driver;
pub use openarm_protocol as protocol;

// CAN 层常用类型
pub use openarm_can::{CanAdapter, CanError, OpenArmFrame};

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use openarm_can::SocketCanAdapter;

#[cfg(feature = "mock")]
pub use openarm_can::{MockBusHandle, MockCanAdapter};

// 协议层
pub use openarm_protocol::{
    CallbackMode, ControlMode, MitParam, MotorStatus, MotorType, MotorVariable, PosForceParam,
    PosVelParam, ProtocolError,
};

// 驱动层
pub use openarm_driver::{
    ArmComponent, ConfigError, DmDeviceCollection, DriverError, GripperComponent, GripperMapping,
    Motor, MotorGroup, MotorRef, OpenArm, OpenArmConfig, RecvStats,
};

pub use logging::{init_logger, try_init_logger};
