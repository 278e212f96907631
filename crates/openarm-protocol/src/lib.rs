//! # OpenArm Protocol
//!
//! 达妙（Damiao）电机 CAN / CAN-FD 总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `codec`: 浮点物理量与定宽无符号整数之间的量化编解码
//! - `constants`: 电机型号、限幅表、控制模式、寄存器 ID
//! - `ids`: CAN ID 与命令字节常量
//! - `control`: 控制帧构建（`CanPacketEncoder`）
//! - `feedback`: 反馈帧解析（状态帧、参数帧）
//!
//! ## 字节序
//!
//! MIT 控制帧和状态帧按 MSB 在前、跨字节半字节拼接；
//! 参数寄存器的 32 位数值按小端字节序传输。

pub mod codec;
pub mod constants;
pub mod control;
pub mod feedback;
pub mod ids;

// 重新导出常用类型
pub use codec::*;
pub use constants::*;
pub use control::*;
pub use feedback::*;
pub use ids::*;

use thiserror::Error;

/// 经典 CAN 帧最大数据长度
pub const CAN_MAX_DLEN: usize = 8;

/// CAN-FD 帧最大数据长度
pub const CANFD_MAX_DLEN: usize = 64;

/// CAN / CAN-FD 帧的统一抽象
///
/// 协议层和传输层之间的中间类型：协议层通过 `CanPacket::to_frame()` 构建，
/// 传输层（`openarm-can`）负责与 SocketCAN 帧互转。
///
/// # 设计特性
///
/// - **Copy trait**：无堆分配，适合 1kHz 级别的控制循环
/// - **固定 64 字节缓冲**：同一类型同时承载经典帧（≤8 字节）与 FD 帧（≤64 字节）
/// - **时间戳**：`timestamp_us` 由接收端填充，0 表示不可用
///
/// ```rust
/// use openarm_protocol::OpenArmFrame;
///
/// let frame = OpenArmFrame::new_standard(0x01, &[0xFF; 8]);
/// assert_eq!(frame.id(), 0x01);
/// assert_eq!(frame.data_slice().len(), 8);
/// assert!(!frame.is_fd);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenArmFrame {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 帧数据（未使用部分为 0）
    pub data: [u8; CANFD_MAX_DLEN],

    /// 有效数据长度（经典帧 0-8，FD 帧 0-64）
    pub len: u8,

    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,

    /// 是否为 CAN-FD 帧
    pub is_fd: bool,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl OpenArmFrame {
    /// 创建经典标准帧（数据超过 8 字节时截断）
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false, false)
    }

    /// 创建经典扩展帧
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id, data, true, false)
    }

    /// 创建 CAN-FD 标准帧（数据超过 64 字节时截断）
    pub fn new_fd(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false, true)
    }

    fn new(id: u32, data: &[u8], is_extended: bool, is_fd: bool) -> Self {
        let max = if is_fd { CANFD_MAX_DLEN } else { CAN_MAX_DLEN };
        let mut fixed_data = [0u8; CANFD_MAX_DLEN];
        let len = data.len().min(max);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            is_extended,
            is_fd,
            timestamp_us: 0,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..(self.len as usize).min(CANFD_MAX_DLEN)]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 转换为 FD 帧（数据不变）
    pub fn into_fd(mut self) -> Self {
        self.is_fd = true;
        self
    }
}

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u8 },
}
