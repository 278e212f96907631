//! CAN 接口状态检查
//!
//! 使用 ioctl 读取 Linux 网络接口的 UP 标志与 MTU，
//! 只读不改，普通用户即可执行。

use crate::{CanDeviceError, CanDeviceErrorKind, CanError};
use libc::{AF_INET, IFF_UP, SIOCGIFFLAGS, SIOCGIFMTU, SOCK_DGRAM, if_nametoindex, ifreq};
use std::ffi::CString;
use std::io;
use tracing::trace;

/// 经典 CAN 接口的 MTU（`sizeof(struct can_frame)`）
pub const CAN_MTU: i32 = 16;

/// CAN-FD 接口的 MTU（`sizeof(struct canfd_frame)`）
pub const CANFD_MTU: i32 = 72;

/// IFNAMSIZ - 1
const MAX_IFACE_NAME_LEN: usize = 15;

/// 接口状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceStatus {
    /// 管理态 UP
    pub is_up: bool,
    /// 接口 MTU
    pub mtu: i32,
}

impl InterfaceStatus {
    /// 接口是否配置为 CAN-FD
    pub fn is_fd_capable(&self) -> bool {
        self.mtu >= CANFD_MTU
    }
}

struct FdGuard(libc::c_int);

impl Drop for FdGuard {
    fn drop(&mut self) {
        if self.0 >= 0 {
            unsafe { libc::close(self.0) };
        }
    }
}

fn prepare_ifreq(interface: &str) -> Result<ifreq, CanError> {
    if interface.len() > MAX_IFACE_NAME_LEN {
        return Err(CanDeviceError::new(
            CanDeviceErrorKind::UnsupportedConfig,
            format!(
                "Interface name '{}' is too long (max {} characters)",
                interface, MAX_IFACE_NAME_LEN
            ),
        )
        .into());
    }

    let c_iface = CString::new(interface).map_err(|e| {
        CanDeviceError::new(
            CanDeviceErrorKind::UnsupportedConfig,
            format!("Invalid interface name: {}", e),
        )
    })?;

    let ifindex = unsafe { if_nametoindex(c_iface.as_ptr()) };
    if ifindex == 0 {
        let errno = io::Error::last_os_error();
        return Err(CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            format!(
                "CAN interface '{}' does not exist ({}). Please create it first:\n  sudo ip link add dev {} type can",
                interface, errno, interface
            ),
        )
        .into());
    }

    let mut ifr: ifreq = unsafe { std::mem::zeroed() };
    let name = interface.as_bytes();
    unsafe {
        std::ptr::copy_nonoverlapping(name.as_ptr(), ifr.ifr_name.as_mut_ptr() as *mut u8, name.len());
    }
    ifr.ifr_name[name.len()] = 0;
    Ok(ifr)
}

fn ioctl(sockfd: libc::c_int, request: libc::Ioctl, ifr: &mut ifreq) -> Result<(), CanError> {
    let result = unsafe { libc::ioctl(sockfd, request, ifr as *mut _ as *mut libc::c_void) };
    if result < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// 读取接口 UP 标志和 MTU
///
/// # 错误
/// - `CanError::Device`（`NotFound`）：接口不存在
/// - `CanError::Device`（`UnsupportedConfig`）：接口名非法
/// - `CanError::Io`：socket / ioctl 失败
pub fn check_interface_status(interface: &str) -> Result<InterfaceStatus, CanError> {
    let mut ifr = prepare_ifreq(interface)?;

    let sockfd = unsafe { libc::socket(AF_INET, SOCK_DGRAM, 0) };
    if sockfd < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }
    let _guard = FdGuard(sockfd);

    // ifr_ifru 是 union，flags / mtu 都位于偏移 0
    ioctl(sockfd, SIOCGIFFLAGS, &mut ifr)?;
    let flags = unsafe { *(std::ptr::addr_of!(ifr.ifr_ifru) as *const libc::c_short) };

    ioctl(sockfd, SIOCGIFMTU, &mut ifr)?;
    let mtu = unsafe { *(std::ptr::addr_of!(ifr.ifr_ifru) as *const libc::c_int) };

    let status = InterfaceStatus {
        is_up: (flags as i32 & IFF_UP) != 0,
        mtu,
    };
    trace!(
        "Interface '{}' status: {}, mtu={}",
        interface,
        if status.is_up { "UP" } else { "DOWN" },
        status.mtu
    );
    Ok(status)
}
