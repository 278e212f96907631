//! # OpenArm CAN Adapter Layer
//!
//! CAN 传输抽象层：上层只依赖 `CanAdapter` trait，
//! 具体实现为 Linux SocketCAN（经典帧 / CAN-FD）和内存 Mock。

use std::time::Duration;
use thiserror::Error;

// 重新导出协议层的帧类型
pub use openarm_protocol::OpenArmFrame;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use socketcan::SocketCanAdapter;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockBusHandle, MockCanAdapter};

/// 单次接收周期内最多排空的帧数
///
/// 总线被持续打满时保证 `receive_frames` 能返回。
pub const MAX_FRAMES_PER_DRAIN: usize = 4096;

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("Bus off")]
    BusOff,
    #[error("Device not started")]
    NotStarted,
    #[error("CAN-FD frame on a classic CAN socket")]
    FdNotSupported,
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    NotUp,
    AccessDenied,
    UnsupportedConfig,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 重试无意义的错误（需要人工介入）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NotFound
                | CanDeviceErrorKind::AccessDenied
                | CanDeviceErrorKind::UnsupportedConfig
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// CAN 传输接口
///
/// 同步、单线程使用；阻塞只发生在带超时的接收上。
pub trait CanAdapter {
    /// 发送一帧（Fire-and-Forget）
    fn send(&mut self, frame: OpenArmFrame) -> Result<(), CanError>;

    /// 接收一帧，使用适配器当前的读超时
    fn receive(&mut self) -> Result<OpenArmFrame, CanError>;

    /// 设置默认读超时
    fn set_receive_timeout(&mut self, _timeout: Duration) {}

    /// 带超时的接收
    fn receive_timeout(&mut self, timeout: Duration) -> Result<OpenArmFrame, CanError> {
        self.set_receive_timeout(timeout);
        self.receive()
    }

    /// 非阻塞接收，无数据时返回 `Ok(None)`
    fn try_receive(&mut self) -> Result<Option<OpenArmFrame>, CanError> {
        match self.receive_timeout(Duration::ZERO) {
            Ok(frame) => Ok(Some(frame)),
            Err(CanError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 是否以 CAN-FD 模式打开
    fn is_fd_enabled(&self) -> bool {
        false
    }

    /// 一个接收周期：最多等待 `first_timeout` 拿到第一帧，随后不阻塞地排空已到达的帧
    ///
    /// 超时无数据时返回空列表。返回顺序即到达顺序。
    /// 首帧等待的错误直接返回；排空途中出错则记录 `warn!` 并返回已读出的帧。
    fn receive_frames(&mut self, first_timeout: Duration) -> Result<Vec<OpenArmFrame>, CanError> {
        let mut frames = Vec::new();
        match self.receive_timeout(first_timeout) {
            Ok(frame) => frames.push(frame),
            Err(CanError::Timeout) => return Ok(frames),
            Err(e) => return Err(e),
        }

        while frames.len() < MAX_FRAMES_PER_DRAIN {
            match self.try_receive() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                // 已读出的帧照常交付；错误若持续，下一周期的首帧等待会再次报告
                Err(e) => {
                    tracing::warn!("drain stopped after {} frames: {}", frames.len(), e);
                    break;
                },
            }
        }
        Ok(frames)
    }
}

impl<T: CanAdapter + ?Sized> CanAdapter for Box<T> {
    fn send(&mut self, frame: OpenArmFrame) -> Result<(), CanError> {
        (**self).send(frame)
    }

    fn receive(&mut self) -> Result<OpenArmFrame, CanError> {
        (**self).receive()
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        (**self).set_receive_timeout(timeout)
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<OpenArmFrame, CanError> {
        (**self).receive_timeout(timeout)
    }

    fn try_receive(&mut self) -> Result<Option<OpenArmFrame>, CanError> {
        (**self).try_receive()
    }

    fn is_fd_enabled(&self) -> bool {
        (**self).is_fd_enabled()
    }

    fn receive_frames(&mut self, first_timeout: Duration) -> Result<Vec<OpenArmFrame>, CanError> {
        (**self).receive_frames(first_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_fatal() {
        assert!(CanDeviceError::new(CanDeviceErrorKind::NotFound, "x").is_fatal());
        assert!(!CanDeviceError::new(CanDeviceErrorKind::NotUp, "x").is_fatal());
        assert!(!CanDeviceError::from("oops").is_fatal());
    }

    #[test]
    fn test_can_error_from_device_error() {
        let err: CanError = CanDeviceError::from("no such device".to_string()).into();
        assert!(err.to_string().contains("no such device"));
    }

    #[test]
    fn test_receive_frames_empty_on_timeout() {
        let (mut adapter, _handle) = MockCanAdapter::new();
        let frames = adapter.receive_frames(Duration::from_micros(500)).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn test_receive_frames_preserves_order() {
        let (mut adapter, handle) = MockCanAdapter::new();
        for id in [0x13u16, 0x11, 0x12] {
            handle.push_rx(OpenArmFrame::new_standard(id, &[0; 8]));
        }
        let ids: Vec<u32> = adapter
            .receive_frames(Duration::from_micros(500))
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![0x13, 0x11, 0x12]);
        assert_eq!(handle.pending_rx(), 0);
    }

    /// 按脚本逐次返回结果的适配器
    struct ScriptedAdapter {
        script: std::collections::VecDeque<Result<OpenArmFrame, CanError>>,
    }

    impl ScriptedAdapter {
        fn new(script: Vec<Result<OpenArmFrame, CanError>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl CanAdapter for ScriptedAdapter {
        fn send(&mut self, _frame: OpenArmFrame) -> Result<(), CanError> {
            Ok(())
        }

        fn receive(&mut self) -> Result<OpenArmFrame, CanError> {
            self.script.pop_front().unwrap_or(Err(CanError::Timeout))
        }
    }

    #[test]
    fn test_receive_frames_keeps_frames_read_before_error() {
        let mut adapter = ScriptedAdapter::new(vec![
            Ok(OpenArmFrame::new_standard(0x11, &[0; 8])),
            Ok(OpenArmFrame::new_standard(0x12, &[0; 8])),
            Err(CanError::BufferOverflow),
            Ok(OpenArmFrame::new_standard(0x13, &[0; 8])),
        ]);
        let ids: Vec<u32> = adapter
            .receive_frames(Duration::from_micros(500))
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![0x11, 0x12]);

        // 错误之后的帧留给下一周期
        let ids: Vec<u32> = adapter
            .receive_frames(Duration::from_micros(500))
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![0x13]);
    }

    #[test]
    fn test_receive_frames_first_wait_error_propagates() {
        let mut adapter = ScriptedAdapter::new(vec![Err(CanError::BusOff)]);
        let err = adapter.receive_frames(Duration::from_micros(500)).unwrap_err();
        assert!(matches!(err, CanError::BusOff));
    }

    #[test]
    fn test_boxed_adapter_forwards() {
        let (adapter, handle) = MockCanAdapter::with_fd();
        let mut boxed: Box<dyn CanAdapter> = Box::new(adapter);
        assert!(boxed.is_fd_enabled());
        boxed.send(OpenArmFrame::new_fd(0x01, &[1, 2, 3])).unwrap();
        assert_eq!(handle.sent_frames().len(), 1);
    }
}
