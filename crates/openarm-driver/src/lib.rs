//! 驱动层模块
//!
//! 本模块提供 OpenArm 的有状态电机驱动，包括：
//! - 电机实体（身份、最近状态、寄存器表）
//! - 电机集合（命令扇出、按接收 ID 分发反馈）
//! - 手臂 / 夹爪组件
//! - 顶层协调器 `OpenArm`（独占总线、排空并路由反馈）
//! - TOML 配置
//!
//! # 线程模型
//!
//! 单线程、同步。总线句柄为 `Rc<RefCell<dyn CanAdapter>>`，
//! 阻塞只发生在传输层的带超时接收上。

pub mod arm;
pub mod collection;
pub mod config;
mod error;
pub mod gripper;
pub mod motor;
mod openarm;

pub use arm::ArmComponent;
pub use collection::{DmDeviceCollection, PacketBuffer, SharedBus};
pub use config::{ArmArrays, ArmConfig, ConfigError, GripperConfig, MotorConfig, OpenArmConfig};
pub use error::DriverError;
pub use gripper::{GripperComponent, GripperMapping};
pub use motor::{Motor, MotorState};
pub use openarm::{DEFAULT_RECV_TIMEOUT, MotorGroup, MotorRef, OpenArm, RecvStats};
