//! 驱动层错误类型定义

use crate::config::ConfigError;
use openarm_can::CanError;
use openarm_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
///
/// 配置类错误（数量不匹配、下标越界、ID 冲突）在发送任何帧之前返回，
/// 不会改变集合状态。
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 驱动错误
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置文件错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 并行数组长度与电机数量不一致
    #[error("Config mismatch for {what}: expected {expected}, got {actual}")]
    ConfigMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// 电机下标越界
    #[error("Motor index {index} out of range (collection has {len} motors)")]
    IndexOutOfRange { index: usize, len: usize },

    /// CAN ID 与已有电机冲突
    #[error("CAN ID 0x{0:X} is already used by another motor")]
    DuplicateCanId(u32),

    /// 电机集合只能初始化一次
    #[error("{0} motors are already initialized")]
    AlreadyInitialized(&'static str),

    /// 尚未初始化电机
    #[error("{0} motor is not initialized")]
    NotInitialized(&'static str),

    /// 总线句柄正被占用（重入调用）
    #[error("CAN bus handle is busy")]
    BusBusy,
}
