//! SocketCAN CAN 适配器实现
//!
//! Linux 内核级 CAN 接口，支持经典 CAN 与 CAN-FD 两种打开方式。
//!
//! ## 特性
//!
//! - 打开前检查接口存在且已 UP，FD 模式额外检查 MTU
//! - 接收使用 `select()` 等待，超时精度为微秒
//! - 订阅 Bus Off 与控制器错误帧（Bus Off / 溢出以错误返回，其余记录日志后忽略）
//! - 跳过远程帧
//! - 禁用回环，本进程发出的帧不会被其他本地 socket 重复接收
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - **接口配置**：波特率、FD 数据段速率由 `ip link` 完成，不在应用层设置

use crate::{CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, OpenArmFrame};
use socketcan::{
    CanAnyFrame, CanError as SocketCanError, CanErrorFrame, CanFdFrame, CanFdSocket, CanFrame,
    CanSocket, EmbeddedFrame, ExtendedId, Frame, Id, Socket, SocketOptions, StandardId,
};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{error, trace, warn};

mod interface_check;

pub use interface_check::{CAN_MTU, CANFD_MTU, InterfaceStatus, check_interface_status};

/// 控制器问题类错误帧（linux/can/error.h `CAN_ERR_CRTL`，含 RX/TX 溢出）
pub const CAN_ERR_CRTL: u32 = 0x0000_0004;
/// 总线关闭错误帧（linux/can/error.h `CAN_ERR_BUSOFF`）
pub const CAN_ERR_BUSOFF: u32 = 0x0000_0040;

/// 打开时订阅的错误帧类别
///
/// 内核默认的错误掩码为 0，不订阅则收不到任何错误帧。
pub const ERROR_FRAME_MASK: u32 = CAN_ERR_CRTL | CAN_ERR_BUSOFF;

/// 底层 socket（经典 / FD）
enum SocketKind {
    Classic(CanSocket),
    Fd(CanFdSocket),
}

impl SocketKind {
    fn raw_fd(&self) -> RawFd {
        match self {
            SocketKind::Classic(sock) => sock.as_raw_fd(),
            SocketKind::Fd(sock) => sock.as_raw_fd(),
        }
    }

    fn set_error_filter(&self, mask: u32) -> std::io::Result<()> {
        match self {
            SocketKind::Classic(sock) => sock.set_error_filter(mask),
            SocketKind::Fd(sock) => sock.set_error_filter(mask),
        }
    }
}

/// 单次读取的结果
enum Received {
    Data(OpenArmFrame),
    Error(CanErrorFrame),
    Remote,
}

/// SocketCAN 适配器
///
/// # 示例
///
/// ```no_run
/// use openarm_can::{CanAdapter, OpenArmFrame, SocketCanAdapter};
///
/// let mut adapter = SocketCanAdapter::open("can0", true).unwrap();
/// adapter.send(OpenArmFrame::new_fd(0x01, &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC])).unwrap();
/// let frames = adapter.receive_frames(std::time::Duration::from_micros(500)).unwrap();
/// ```
pub struct SocketCanAdapter {
    socket: SocketKind,
    /// 接口名称（如 "can0"）
    interface: String,
    /// 是否已启动（SocketCAN 打开即启动）
    started: bool,
    /// 默认读超时（用于 receive 方法）
    read_timeout: Duration,
}

impl std::fmt::Debug for SocketCanAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketCanAdapter")
            .field("interface", &self.interface)
            .field("fd", &self.is_fd_enabled())
            .field("started", &self.started)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl SocketCanAdapter {
    /// 以经典 CAN 模式打开
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        Self::open(interface, false)
    }

    /// 以 CAN-FD 模式打开
    pub fn new_fd(interface: impl Into<String>) -> Result<Self, CanError> {
        Self::open(interface, true)
    }

    /// 打开 SocketCAN 接口
    ///
    /// # 错误
    /// - `CanError::Device`:
    ///   - 接口不存在（`NotFound`，会提示创建命令）
    ///   - 接口未启动（`NotUp`，会提示启动命令）
    ///   - 要求 FD 但接口 MTU 不是 CAN-FD（`UnsupportedConfig`）
    ///   - 无法打开 socket（`Backend`）
    /// - `CanError::Io`: 系统调用失败
    pub fn open(interface: impl Into<String>, enable_fd: bool) -> Result<Self, CanError> {
        let interface = interface.into();

        // 1. 检查接口状态（仅检查，不自动配置）
        let status = check_interface_status(&interface)?;
        if !status.is_up {
            return Err(CanDeviceError::new(
                CanDeviceErrorKind::NotUp,
                format!(
                    "CAN interface '{}' exists but is not UP. Please start it first:\n  sudo ip link set up {}",
                    interface, interface
                ),
            )
            .into());
        }
        if enable_fd && !status.is_fd_capable() {
            return Err(CanDeviceError::new(
                CanDeviceErrorKind::UnsupportedConfig,
                format!(
                    "CAN interface '{}' has MTU {} and cannot carry CAN-FD frames (expected {}). \
                     Reconfigure it with `fd on`, or open it in classic mode",
                    interface, status.mtu, CANFD_MTU
                ),
            )
            .into());
        }

        // 2. 打开 socket
        let open_err = |e: std::io::Error| {
            CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::Backend,
                format!("Failed to open CAN interface '{}': {}", interface, e),
            ))
        };
        let socket = if enable_fd {
            SocketKind::Fd(CanFdSocket::open(&interface).map_err(open_err)?)
        } else {
            SocketKind::Classic(CanSocket::open(&interface).map_err(open_err)?)
        };

        // 3. 禁用 Loopback
        let loopback_enabled: libc::c_int = 0;
        let loopback_result = unsafe {
            libc::setsockopt(
                socket.raw_fd(),
                libc::SOL_CAN_RAW,
                libc::CAN_RAW_LOOPBACK,
                &loopback_enabled as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if loopback_result < 0 {
            // 某些系统不支持此选项，不阻塞初始化
            warn!(
                "Failed to disable CAN_RAW_LOOPBACK on '{}': {}",
                interface,
                std::io::Error::last_os_error()
            );
        } else {
            trace!("SocketCAN interface '{}' loopback disabled", interface);
        }

        // 4. 订阅 Bus Off / 控制器错误帧
        if let Err(e) = socket.set_error_filter(ERROR_FRAME_MASK) {
            warn!(
                "Failed to set CAN_RAW_ERR_FILTER on '{}': {}, bus-off will not be reported",
                interface, e
            );
        }

        trace!(
            "SocketCAN interface '{}' opened ({})",
            interface,
            if enable_fd { "CAN-FD" } else { "classic" }
        );

        Ok(Self {
            socket,
            interface,
            started: true,
            read_timeout: Duration::from_millis(2),
        })
    }

    /// 获取接口名称
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 获取默认读超时
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// 检查是否已启动
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// 等待 socket 可读
    ///
    /// 返回 `Ok(false)` 表示超时（或被信号中断）。
    fn wait_readable(&self, timeout: Duration) -> Result<bool, CanError> {
        let fd = self.socket.raw_fd();
        let mut read_fds: libc::fd_set = unsafe { std::mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut read_fds);
            libc::FD_SET(fd, &mut read_fds);
        }

        let mut tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };

        let result = unsafe {
            libc::select(
                fd + 1,
                &mut read_fds,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut tv,
            )
        };

        if result < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.raw_os_error() == Some(libc::EINTR) {
                return Ok(false);
            }
            return Err(CanError::Io(errno));
        }
        Ok(result > 0)
    }

    /// 读取一帧（调用前 socket 已可读）
    fn read_one(&self) -> Result<Received, CanError> {
        let timestamp_us = now_micros();
        let received = match &self.socket {
            SocketKind::Classic(sock) => match sock.read_frame()? {
                CanFrame::Data(f) => Received::Data(convert_frame(&f, false, timestamp_us)),
                CanFrame::Remote(_) => Received::Remote,
                CanFrame::Error(e) => Received::Error(e),
            },
            SocketKind::Fd(sock) => match sock.read_frame()? {
                CanAnyFrame::Normal(f) => Received::Data(convert_frame(&f, false, timestamp_us)),
                CanAnyFrame::Fd(f) => Received::Data(convert_frame(&f, true, timestamp_us)),
                CanAnyFrame::Remote(_) => Received::Remote,
                CanAnyFrame::Error(e) => Received::Error(e),
            },
        };
        Ok(received)
    }

    /// 在 `timeout` 内接收一个有效数据帧
    ///
    /// 截止时间在进入时确定，被跳过的远程帧 / 错误帧不延长等待。
    /// 零超时只读取一次：读到的若不是数据帧即按超时返回。
    fn receive_within(&mut self, timeout: Duration) -> Result<OpenArmFrame, CanError> {
        if !self.started {
            return Err(CanError::NotStarted);
        }

        let deadline = Instant::now() + timeout;
        let mut remaining = timeout;
        loop {
            if !self.wait_readable(remaining)? {
                return Err(CanError::Timeout);
            }

            match self.read_one()? {
                Received::Data(frame) => {
                    trace!(
                        "Received CAN frame: ID=0x{:X}, len={}, fd={}",
                        frame.id, frame.len, frame.is_fd
                    );
                    return Ok(frame);
                },
                Received::Remote => {
                    trace!("Skipping remote frame");
                },
                Received::Error(error_frame) => {
                    let socketcan_error = SocketCanError::from(error_frame);
                    match &socketcan_error {
                        SocketCanError::BusOff => {
                            error!("CAN Bus Off error detected on '{}'", self.interface);
                            return Err(CanError::BusOff);
                        },
                        SocketCanError::ControllerProblem(problem) => {
                            let problem_str = format!("{}", problem);
                            if problem_str.to_lowercase().contains("overflow") {
                                error!("CAN Buffer Overflow detected: {}", problem);
                                return Err(CanError::BufferOverflow);
                            }
                            warn!("CAN Controller Problem: {}, ignoring", problem);
                        },
                        _ => {
                            warn!("CAN Error Frame received: {}, ignoring", socketcan_error);
                        },
                    }
                },
            }

            remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CanError::Timeout);
            }
        }
    }
}

impl Drop for SocketCanAdapter {
    fn drop(&mut self) {
        trace!("SocketCAN interface '{}' closed", self.interface);
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// socketcan 数据帧 → OpenArmFrame
fn convert_frame<F: Frame>(frame: &F, is_fd: bool, timestamp_us: u64) -> OpenArmFrame {
    let mut out = if is_fd {
        OpenArmFrame::new_fd(0, frame.data())
    } else {
        OpenArmFrame::new_standard(0, frame.data())
    };
    out.id = frame.raw_id();
    out.is_extended = frame.is_extended();
    out.timestamp_us = timestamp_us;
    out
}

/// OpenArmFrame 的 ID → socketcan ID
fn to_socketcan_id(frame: &OpenArmFrame) -> Result<Id, CanError> {
    let id = if frame.is_extended {
        ExtendedId::new(frame.id).map(Id::Extended)
    } else {
        u16::try_from(frame.id)
            .ok()
            .and_then(StandardId::new)
            .map(Id::Standard)
    };
    id.ok_or_else(|| CanError::InvalidFrame(format!("invalid CAN ID 0x{:X}", frame.id)))
}

impl CanAdapter for SocketCanAdapter {
    /// 发送帧（Fire-and-Forget）
    ///
    /// FD 模式下经典帧仍以经典帧发送；经典模式下发送 FD 帧返回 `FdNotSupported`。
    fn send(&mut self, frame: OpenArmFrame) -> Result<(), CanError> {
        if !self.started {
            return Err(CanError::NotStarted);
        }

        let id = to_socketcan_id(&frame)?;
        let invalid = || {
            CanError::InvalidFrame(format!(
                "cannot build frame ID=0x{:X} with {} bytes",
                frame.id, frame.len
            ))
        };

        match &self.socket {
            SocketKind::Classic(sock) => {
                if frame.is_fd {
                    return Err(CanError::FdNotSupported);
                }
                let can_frame = CanFrame::new(id, frame.data_slice()).ok_or_else(invalid)?;
                sock.write_frame(&can_frame)?;
            },
            SocketKind::Fd(sock) => {
                if frame.is_fd {
                    let fd_frame = CanFdFrame::new(id, frame.data_slice()).ok_or_else(invalid)?;
                    sock.write_frame(&fd_frame)?;
                } else {
                    let can_frame = CanFrame::new(id, frame.data_slice()).ok_or_else(invalid)?;
                    sock.write_frame(&can_frame)?;
                }
            },
        }

        trace!(
            "Sent CAN frame: ID=0x{:X}, len={}, fd={}",
            frame.id, frame.len, frame.is_fd
        );
        Ok(())
    }

    fn receive(&mut self) -> Result<OpenArmFrame, CanError> {
        let timeout = self.read_timeout;
        self.receive_within(timeout)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// 带超时的接收（不修改默认读超时）
    fn receive_timeout(&mut self, timeout: Duration) -> Result<OpenArmFrame, CanError> {
        self.receive_within(timeout)
    }

    fn is_fd_enabled(&self) -> bool {
        matches!(self.socket, SocketKind::Fd(_))
    }
}
