//! 内存 Mock 适配器
//!
//! 不依赖硬件：发送的帧记录在 TX 日志中，接收从 RX 队列取出。
//! 通过 `MockBusHandle` 在测试中注入 RX 帧、检查 TX 帧，
//! 或安装一个应答器模拟电机对命令的回复。

use crate::{CanAdapter, CanError, OpenArmFrame};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::trace;

/// 根据发出的帧生成应答帧（模拟总线另一端的电机）
pub type Responder = Box<dyn FnMut(&OpenArmFrame) -> Vec<OpenArmFrame> + Send>;

/// RX 队列条目
enum RxEntry {
    Frame(OpenArmFrame),
    /// 读到此处时报告一次 `CanError::BufferOverflow`
    Overflow,
}

#[derive(Default)]
struct MockBusState {
    tx: Vec<OpenArmFrame>,
    rx: VecDeque<RxEntry>,
    responder: Option<Responder>,
    fail_sends: bool,
    last_timeout: Option<Duration>,
}

/// Mock 总线的共享句柄
#[derive(Clone, Default)]
pub struct MockBusHandle {
    state: Arc<Mutex<MockBusState>>,
}

impl MockBusHandle {
    fn lock(&self) -> MutexGuard<'_, MockBusState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 注入一帧到 RX 队列尾部
    pub fn push_rx(&self, frame: OpenArmFrame) {
        self.lock().rx.push_back(RxEntry::Frame(frame));
    }

    /// 批量注入
    pub fn push_rx_all(&self, frames: impl IntoIterator<Item = OpenArmFrame>) {
        self.lock().rx.extend(frames.into_iter().map(RxEntry::Frame));
    }

    /// 在 RX 队列尾部注入一次接收溢出
    pub fn push_rx_overflow(&self) {
        self.lock().rx.push_back(RxEntry::Overflow);
    }

    /// RX 队列中尚未被读取的条目数
    pub fn pending_rx(&self) -> usize {
        self.lock().rx.len()
    }

    /// 已发送帧的快照
    pub fn sent_frames(&self) -> Vec<OpenArmFrame> {
        self.lock().tx.clone()
    }

    /// 取出并清空已发送帧
    pub fn take_sent(&self) -> Vec<OpenArmFrame> {
        std::mem::take(&mut self.lock().tx)
    }

    /// 安装应答器：每次发送后，其返回的帧被追加到 RX 队列
    pub fn set_responder(
        &self,
        responder: impl FnMut(&OpenArmFrame) -> Vec<OpenArmFrame> + Send + 'static,
    ) {
        self.lock().responder = Some(Box::new(responder));
    }

    /// 令后续发送返回 `CanError::BusOff`
    pub fn set_fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// 最近一次接收请求使用的超时
    pub fn last_receive_timeout(&self) -> Option<Duration> {
        self.lock().last_timeout
    }
}

/// Mock CAN 适配器
pub struct MockCanAdapter {
    handle: MockBusHandle,
    fd_enabled: bool,
    read_timeout: Duration,
}

impl MockCanAdapter {
    /// 经典 CAN 模式
    pub fn new() -> (Self, MockBusHandle) {
        Self::build(false)
    }

    /// CAN-FD 模式
    pub fn with_fd() -> (Self, MockBusHandle) {
        Self::build(true)
    }

    fn build(fd_enabled: bool) -> (Self, MockBusHandle) {
        let handle = MockBusHandle::default();
        let adapter = Self {
            handle: handle.clone(),
            fd_enabled,
            read_timeout: Duration::from_millis(2),
        };
        (adapter, handle)
    }

    /// 获取共享句柄
    pub fn handle(&self) -> MockBusHandle {
        self.handle.clone()
    }
}

impl CanAdapter for MockCanAdapter {
    fn send(&mut self, frame: OpenArmFrame) -> Result<(), CanError> {
        if frame.is_fd && !self.fd_enabled {
            return Err(CanError::FdNotSupported);
        }

        let mut state = self.handle.lock();
        if state.fail_sends {
            return Err(CanError::BusOff);
        }
        state.tx.push(frame);
        trace!("Mock sent frame: ID=0x{:X}, len={}", frame.id, frame.len);

        let replies = match state.responder.as_mut() {
            Some(responder) => responder(&frame),
            None => Vec::new(),
        };
        state.rx.extend(replies.into_iter().map(RxEntry::Frame));
        Ok(())
    }

    fn receive(&mut self) -> Result<OpenArmFrame, CanError> {
        let timeout = self.read_timeout;
        self.receive_timeout(timeout)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<OpenArmFrame, CanError> {
        let mut state = self.handle.lock();
        state.last_timeout = Some(timeout);
        match state.rx.pop_front() {
            Some(RxEntry::Frame(frame)) => Ok(frame),
            Some(RxEntry::Overflow) => Err(CanError::BufferOverflow),
            None => Err(CanError::Timeout),
        }
    }

    fn is_fd_enabled(&self) -> bool {
        self.fd_enabled
    }
}
