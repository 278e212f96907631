//! 顶层协调器
//!
//! `OpenArm` 独占 CAN 适配器，并把共享句柄交给手臂与夹爪两个集合。
//! 命令按"手臂 → 夹爪"的顺序扇出；接收时一次排空总线，
//! 再按到达顺序把每帧交给认领它的集合。

use crate::arm::ArmComponent;
use crate::collection::{DmDeviceCollection, SharedBus};
use crate::config::OpenArmConfig;
use crate::error::DriverError;
use crate::gripper::GripperComponent;
use crate::motor::Motor;
use openarm_can::CanAdapter;
use openarm_protocol::{CallbackMode, ControlMode, MotorType, MotorVariable};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace};

/// 一次 `recv_all` 的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecvStats {
    /// 从总线读到的帧数
    pub received: usize,
    /// 被手臂或夹爪认领的帧数
    pub routed: usize,
}

impl RecvStats {
    pub fn unrouted(&self) -> usize {
        self.received - self.routed
    }
}

/// 电机所属分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorGroup {
    Arm,
    Gripper,
}

/// 按 (分组, 下标) 引用电机，不持有借用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotorRef {
    pub group: MotorGroup,
    pub index: usize,
}

impl MotorRef {
    pub fn arm(index: usize) -> Self {
        Self {
            group: MotorGroup::Arm,
            index,
        }
    }

    pub fn gripper() -> Self {
        Self {
            group: MotorGroup::Gripper,
            index: 0,
        }
    }
}

pub struct OpenArm {
    bus: SharedBus,
    arm: ArmComponent,
    gripper: GripperComponent,
    recv_timeout: Duration,
}

impl fmt::Debug for OpenArm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenArm")
            .field("arm", &self.arm)
            .field("gripper", &self.gripper)
            .field("recv_timeout", &self.recv_timeout)
            .finish_non_exhaustive()
    }
}

/// `recv_all` 的默认首帧等待时间
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_micros(500);

impl OpenArm {
    /// 用任意适配器构造（电机尚未初始化）
    pub fn with_adapter<A: CanAdapter + 'static>(adapter: A) -> Self {
        let bus: SharedBus = Rc::new(RefCell::new(adapter));
        Self {
            arm: ArmComponent::new(Rc::clone(&bus)),
            gripper: GripperComponent::new(Rc::clone(&bus)),
            bus,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }

    /// 打开 SocketCAN 接口
    #[cfg(all(target_os = "linux", feature = "socketcan"))]
    pub fn open(interface: &str, enable_fd: bool) -> Result<Self, DriverError> {
        let adapter = openarm_can::SocketCanAdapter::open(interface, enable_fd)?;
        tracing::info!("OpenArm opened on {} (fd={})", interface, enable_fd);
        Ok(Self::with_adapter(adapter))
    }

    /// 按配置初始化手臂与夹爪
    pub fn from_config<A: CanAdapter + 'static>(
        adapter: A,
        config: &OpenArmConfig,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        let mut openarm = Self::with_adapter(adapter);
        openarm.recv_timeout = config.recv_timeout();

        let arrays = config.arm_parallel_arrays();
        if !arrays.motor_types.is_empty() {
            openarm.init_arm_motors(
                &arrays.motor_types,
                &arrays.send_can_ids,
                &arrays.recv_can_ids,
                Some(&arrays.control_modes),
            )?;
        }
        if let Some(gripper) = &config.gripper {
            openarm.init_gripper_motor(
                gripper.motor_type,
                gripper.send_can_id,
                gripper.recv_can_id,
                gripper.control_mode,
            )?;
            openarm.gripper.set_mapping(gripper.mapping());
            let (speed, torque_pu) = gripper.limits();
            openarm.gripper.set_limit(speed, torque_pu);
        }
        Ok(openarm)
    }

    /// 打开配置中的接口并完成初始化
    #[cfg(all(target_os = "linux", feature = "socketcan"))]
    pub fn open_with_config(config: &OpenArmConfig) -> Result<Self, DriverError> {
        let adapter = openarm_can::SocketCanAdapter::open(&config.interface, config.enable_fd)?;
        tracing::info!("OpenArm opened on {} (fd={})", config.interface, config.enable_fd);
        Self::from_config(adapter, config)
    }

    // ============================================================================
    // 初始化
    // ============================================================================

    /// 初始化手臂电机（只允许一次）
    ///
    /// 任何 ID 与夹爪重叠时返回 `DuplicateCanId`。
    pub fn init_arm_motors(
        &mut self,
        motor_types: &[MotorType],
        send_can_ids: &[u32],
        recv_can_ids: &[u32],
        control_modes: Option<&[ControlMode]>,
    ) -> Result<(), DriverError> {
        if self.arm.is_initialized() {
            return Err(DriverError::AlreadyInitialized("arm"));
        }
        check_overlap(
            send_can_ids.iter().copied(),
            recv_can_ids.iter().copied(),
            self.gripper.devices(),
        )?;
        self.arm
            .init_motor_devices(motor_types, send_can_ids, recv_can_ids, control_modes)?;
        debug!("arm initialized with {} motors", self.arm.motor_count());
        Ok(())
    }

    /// 初始化夹爪电机（只允许一次）
    pub fn init_gripper_motor(
        &mut self,
        motor_type: MotorType,
        send_can_id: u32,
        recv_can_id: u32,
        control_mode: ControlMode,
    ) -> Result<(), DriverError> {
        if self.gripper.is_initialized() {
            return Err(DriverError::AlreadyInitialized("gripper"));
        }
        check_overlap([send_can_id], [recv_can_id], self.arm.devices())?;
        self.gripper
            .init_motor_device(motor_type, send_can_id, recv_can_id, control_mode)?;
        debug!("gripper initialized: {} 0x{:X}/0x{:X}", motor_type, send_can_id, recv_can_id);
        Ok(())
    }

    // ============================================================================
    // 访问
    // ============================================================================

    pub fn arm(&self) -> &ArmComponent {
        &self.arm
    }

    pub fn arm_mut(&mut self) -> &mut ArmComponent {
        &mut self.arm
    }

    pub fn gripper(&self) -> &GripperComponent {
        &self.gripper
    }

    pub fn gripper_mut(&mut self) -> &mut GripperComponent {
        &mut self.gripper
    }

    pub fn motor(&self, motor_ref: MotorRef) -> Option<&Motor> {
        let motors = match motor_ref.group {
            MotorGroup::Arm => self.arm.motors(),
            MotorGroup::Gripper => self.gripper.motors(),
        };
        motors.get(motor_ref.index)
    }

    /// 全部电机引用（手臂在前）
    pub fn motor_refs(&self) -> impl Iterator<Item = MotorRef> + '_ {
        (0..self.arm.motor_count())
            .map(MotorRef::arm)
            .chain((0..self.gripper.motor_count()).map(|_| MotorRef::gripper()))
    }

    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    pub fn set_recv_timeout(&mut self, timeout: Duration) {
        self.recv_timeout = timeout;
    }

    // ============================================================================
    // 批量操作
    // ============================================================================

    pub fn enable_all(&mut self) -> Result<(), DriverError> {
        self.arm.enable_all()?;
        self.gripper.enable_all()
    }

    pub fn disable_all(&mut self) -> Result<(), DriverError> {
        self.arm.disable_all()?;
        self.gripper.disable_all()
    }

    pub fn set_zero_all(&self) -> Result<(), DriverError> {
        self.arm.set_zero_all()?;
        self.gripper.set_zero_all()
    }

    pub fn refresh_all(&self) -> Result<(), DriverError> {
        self.arm.refresh_all()?;
        self.gripper.refresh_all()
    }

    pub fn query_param_all(&self, rid: MotorVariable) -> Result<(), DriverError> {
        self.arm.query_param_all(rid)?;
        self.gripper.query_param_all(rid)
    }

    pub fn set_callback_mode_all(&mut self, mode: CallbackMode) {
        self.arm.set_callback_mode_all(mode);
        self.gripper.set_callback_mode_all(mode);
    }

    // ============================================================================
    // 接收
    // ============================================================================

    /// 排空总线并分发
    ///
    /// 首帧最多等待 `timeout`，其余帧非阻塞读取；超时且无帧时返回全 0 统计。
    pub fn recv_all(&mut self, timeout: Duration) -> Result<RecvStats, DriverError> {
        let frames = {
            let mut bus = self.bus.try_borrow_mut().map_err(|_| DriverError::BusBusy)?;
            bus.receive_frames(timeout)?
        };

        let mut stats = RecvStats {
            received: frames.len(),
            routed: 0,
        };
        for frame in &frames {
            if self.arm.dispatch_frame(frame) || self.gripper.dispatch_frame(frame) {
                stats.routed += 1;
            } else {
                trace!("unrouted frame 0x{:X} ({} bytes)", frame.id, frame.len);
            }
        }
        Ok(stats)
    }

    /// 使用配置的默认超时排空总线
    pub fn recv_all_default(&mut self) -> Result<RecvStats, DriverError> {
        self.recv_all(self.recv_timeout)
    }
}

/// 新分组的 ID 不得与已有分组重叠
fn check_overlap(
    send_ids: impl IntoIterator<Item = u32>,
    recv_ids: impl IntoIterator<Item = u32>,
    existing: &DmDeviceCollection,
) -> Result<(), DriverError> {
    let taken_send: HashSet<u32> = existing.send_can_ids().collect();
    let taken_recv: HashSet<u32> = existing.recv_can_ids().collect();
    if let Some(id) = send_ids.into_iter().find(|id| taken_send.contains(id)) {
        return Err(DriverError::DuplicateCanId(id));
    }
    if let Some(id) = recv_ids.into_iter().find(|id| taken_recv.contains(id)) {
        return Err(DriverError::DuplicateCanId(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openarm_can::{MockBusHandle, MockCanAdapter, OpenArmFrame};

    fn openarm() -> (OpenArm, MockBusHandle) {
        let (adapter, handle) = MockCanAdapter::new();
        let mut arm = OpenArm::with_adapter(adapter);
        arm.init_arm_motors(
            &[MotorType::Dm8009, MotorType::Dm4340],
            &[0x01, 0x02],
            &[0x11, 0x12],
            None,
        )
        .unwrap();
        arm.init_gripper_motor(MotorType::Dm4310, 0x08, 0x18, ControlMode::PosForce)
            .unwrap();
        (arm, handle)
    }

    #[test]
    fn test_enable_all_order_arm_then_gripper() {
        let (mut oa, handle) = openarm();
        oa.enable_all().unwrap();
        let ids: Vec<u32> = handle.sent_frames().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0x01, 0x02, 0x08]);
    }

    #[test]
    fn test_init_twice() {
        let (mut oa, _) = openarm();
        let err = oa
            .init_gripper_motor(MotorType::Dm4310, 0x09, 0x19, ControlMode::Mit)
            .unwrap_err();
        assert!(matches!(err, DriverError::AlreadyInitialized("gripper")));
    }

    #[test]
    fn test_overlap_rejected() {
        let (adapter, _) = MockCanAdapter::new();
        let mut oa = OpenArm::with_adapter(adapter);
        oa.init_gripper_motor(MotorType::Dm4310, 0x08, 0x18, ControlMode::PosForce)
            .unwrap();
        let err = oa
            .init_arm_motors(&[MotorType::Dm4310], &[0x01], &[0x18], None)
            .unwrap_err();
        assert!(matches!(err, DriverError::DuplicateCanId(0x18)));
        assert!(!oa.arm().is_initialized());
    }

    #[test]
    fn test_recv_all_routes_and_counts() {
        let (mut oa, handle) = openarm();
        let state = [0x10, 0x80, 0x00, 0x80, 0x08, 0x00, 30, 31];
        handle.push_rx(OpenArmFrame::new_standard(0x12, &state));
        handle.push_rx(OpenArmFrame::new_standard(0x18, &state));
        handle.push_rx(OpenArmFrame::new_standard(0x55, &state));

        let stats = oa.recv_all(Duration::from_millis(1)).unwrap();
        assert_eq!(stats, RecvStats { received: 3, routed: 2 });
        assert_eq!(stats.unrouted(), 1);
        assert!(!oa.motor(MotorRef::arm(0)).unwrap().is_state_valid());
        assert!(oa.motor(MotorRef::arm(1)).unwrap().is_state_valid());
        assert!(oa.motor(MotorRef::gripper()).unwrap().is_state_valid());
        assert_eq!(oa.motor(MotorRef::arm(1)).unwrap().t_rotor(), 31);
    }

    #[test]
    fn test_recv_all_timeout_is_empty() {
        let (mut oa, _) = openarm();
        let stats = oa.recv_all(Duration::from_micros(100)).unwrap();
        assert_eq!(stats, RecvStats::default());
    }

    #[test]
    fn test_motor_refs() {
        let (oa, _) = openarm();
        let refs: Vec<MotorRef> = oa.motor_refs().collect();
        assert_eq!(refs, vec![MotorRef::arm(0), MotorRef::arm(1), MotorRef::gripper()]);
        assert!(oa.motor(MotorRef::arm(5)).is_none());
    }
}
