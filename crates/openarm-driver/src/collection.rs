//! 电机集合
//!
//! `DmDeviceCollection` 持有一组电机（初始化后数量与顺序固定）以及总线的共享句柄，
//! 负责命令扇出和按接收 ID 的反馈分发。
//!
//! 所有批量操作先完成编码与校验，再统一发送；
//! 校验失败时不会有任何帧上总线，也不会修改任何电机状态。

use crate::error::DriverError;
use crate::motor::Motor;
use openarm_can::{CanAdapter, OpenArmFrame};
use openarm_protocol::{
    CallbackMode, CanPacket, CanPacketDecoder, CanPacketEncoder, ControlMode, ID_PARAM_BROADCAST,
    MitParam, MotorIdentity, MotorVariable, PosForceParam, PosVelParam, ProtocolError,
    STANDARD_ID_MAX,
};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace};

/// 总线共享句柄
///
/// 单线程共享，不加锁；每次借用只覆盖一次发送或一次排空。
pub type SharedBus = Rc<RefCell<dyn CanAdapter>>;

/// 命令包缓冲区
///
/// 栈上预留 8 个位置，覆盖 7 关节手臂 + 夹爪的一次扇出。
pub type PacketBuffer = SmallVec<[CanPacket; 8]>;

/// 达妙电机集合
pub struct DmDeviceCollection {
    name: &'static str,
    bus: SharedBus,
    motors: Vec<Motor>,
    /// 接收 ID → 电机下标
    recv_index: HashMap<u32, usize>,
    initialized: bool,
}

impl fmt::Debug for DmDeviceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmDeviceCollection")
            .field("name", &self.name)
            .field("motors", &self.motors)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl DmDeviceCollection {
    /// 创建空集合；`name` 用于日志与错误信息
    pub fn new(name: &'static str, bus: SharedBus) -> Self {
        Self {
            name,
            bus,
            motors: Vec::new(),
            recv_index: HashMap::new(),
            initialized: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 装入电机（只允许一次）
    ///
    /// 发送 ID 与接收 ID 分别在集合内唯一，且必须是合法的标准帧 ID。
    pub(crate) fn init_motors(&mut self, motors: Vec<Motor>) -> Result<(), DriverError> {
        if self.initialized {
            return Err(DriverError::AlreadyInitialized(self.name));
        }

        let mut recv_index = HashMap::with_capacity(motors.len());
        let mut send_ids = Vec::with_capacity(motors.len());
        for (index, motor) in motors.iter().enumerate() {
            for id in [motor.send_can_id(), motor.recv_can_id()] {
                if id >= ID_PARAM_BROADCAST {
                    return Err(ProtocolError::InvalidCanId { id }.into());
                }
            }
            if send_ids.contains(&motor.send_can_id()) {
                return Err(DriverError::DuplicateCanId(motor.send_can_id()));
            }
            send_ids.push(motor.send_can_id());
            if recv_index.insert(motor.recv_can_id(), index).is_some() {
                return Err(DriverError::DuplicateCanId(motor.recv_can_id()));
            }
        }

        debug!("{}: initialized {} motors", self.name, motors.len());
        self.motors = motors;
        self.recv_index = recv_index;
        self.initialized = true;
        Ok(())
    }

    // ============================================================================
    // 查询
    // ============================================================================

    pub fn motor_count(&self) -> usize {
        self.motors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }

    pub fn motors(&self) -> &[Motor] {
        &self.motors
    }

    /// 电机快照（克隆）
    pub fn get_motors(&self) -> Vec<Motor> {
        self.motors.clone()
    }

    pub fn get_motor(&self, index: usize) -> Result<&Motor, DriverError> {
        self.motors.get(index).ok_or(DriverError::IndexOutOfRange {
            index,
            len: self.motors.len(),
        })
    }

    pub fn send_can_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.motors.iter().map(Motor::send_can_id)
    }

    pub fn recv_can_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.motors.iter().map(Motor::recv_can_id)
    }

    /// 该接收 ID 是否属于本集合
    pub fn owns_recv_id(&self, id: u32) -> bool {
        self.recv_index.contains_key(&id)
    }

    // ============================================================================
    // 特殊命令
    // ============================================================================

    pub fn enable_all(&mut self) -> Result<(), DriverError> {
        let packets = self.each(CanPacketEncoder::create_enable_command);
        self.send_packets(&packets)?;
        self.motors.iter_mut().for_each(|m| m.set_enabled(true));
        Ok(())
    }

    pub fn disable_all(&mut self) -> Result<(), DriverError> {
        let packets = self.each(CanPacketEncoder::create_disable_command);
        self.send_packets(&packets)?;
        self.motors.iter_mut().for_each(|m| m.set_enabled(false));
        Ok(())
    }

    pub fn enable_one(&mut self, index: usize) -> Result<(), DriverError> {
        let packet = self.one(index, CanPacketEncoder::create_enable_command)?;
        self.send_packets(&[packet])?;
        self.motors[index].set_enabled(true);
        Ok(())
    }

    pub fn disable_one(&mut self, index: usize) -> Result<(), DriverError> {
        let packet = self.one(index, CanPacketEncoder::create_disable_command)?;
        self.send_packets(&[packet])?;
        self.motors[index].set_enabled(false);
        Ok(())
    }

    /// 把当前位置设为零点
    pub fn set_zero_all(&self) -> Result<(), DriverError> {
        let packets = self.each(CanPacketEncoder::create_set_zero_command);
        self.send_packets(&packets)
    }

    pub fn set_zero_one(&self, index: usize) -> Result<(), DriverError> {
        let packet = self.one(index, CanPacketEncoder::create_set_zero_command)?;
        self.send_packets(&[packet])
    }

    /// 请求状态刷新（电机以一帧状态帧应答）
    pub fn refresh_all(&self) -> Result<(), DriverError> {
        let packets = self.each(CanPacketEncoder::create_refresh_command);
        self.send_packets(&packets)
    }

    pub fn refresh_one(&self, index: usize) -> Result<(), DriverError> {
        let packet = self.one(index, CanPacketEncoder::create_refresh_command)?;
        self.send_packets(&[packet])
    }

    /// 查询寄存器；应答需在 `Param` 回调模式下才会写入参数表
    pub fn query_param_all(&self, rid: MotorVariable) -> Result<(), DriverError> {
        let packets = self.each(|m| CanPacketEncoder::create_query_param_command(m, rid));
        self.send_packets(&packets)
    }

    pub fn query_param_one(&self, index: usize, rid: MotorVariable) -> Result<(), DriverError> {
        let packet = self.one(index, |m| {
            CanPacketEncoder::create_query_param_command(m, rid)
        })?;
        self.send_packets(&[packet])
    }

    /// 按原始 RID 查询单个电机的寄存器
    pub fn query_param_raw_one(&self, index: usize, rid: u8) -> Result<(), DriverError> {
        let packet = self.one(index, |m| {
            CanPacketEncoder::create_query_param_raw_command(m, rid)
        })?;
        self.send_packets(&[packet])
    }

    /// 写寄存器（所有电机写同一个值）
    pub fn write_param_all(&self, rid: MotorVariable, value: f64) -> Result<(), DriverError> {
        let packets = self.each(|m| CanPacketEncoder::create_write_param_command(m, rid, value));
        self.send_packets(&packets)
    }

    pub fn write_param_one(
        &self,
        index: usize,
        rid: MotorVariable,
        value: f64,
    ) -> Result<(), DriverError> {
        let packet = self.one(index, |m| {
            CanPacketEncoder::create_write_param_command(m, rid, value)
        })?;
        self.send_packets(&[packet])
    }

    // ============================================================================
    // 控制命令
    // ============================================================================

    pub fn mit_control_one(&self, index: usize, param: &MitParam) -> Result<(), DriverError> {
        let packet = self.one(index, |m| {
            CanPacketEncoder::create_mit_control_command(m, param)
        })?;
        self.send_packets(&[packet])
    }

    /// 每个电机一组 MIT 参数，数量必须与电机数一致
    pub fn mit_control_all(&self, params: &[MitParam]) -> Result<(), DriverError> {
        let packets = self.zip("mit params", params, |m, p| {
            CanPacketEncoder::create_mit_control_command(m, p)
        })?;
        self.send_packets(&packets)
    }

    pub fn posvel_control_one(&self, index: usize, param: &PosVelParam) -> Result<(), DriverError> {
        let packet = self.one(index, |m| {
            CanPacketEncoder::create_posvel_control_command(m, param)
        })?;
        self.send_packets(&[packet])
    }

    pub fn posvel_control_all(&self, params: &[PosVelParam]) -> Result<(), DriverError> {
        let packets = self.zip("posvel params", params, |m, p| {
            CanPacketEncoder::create_posvel_control_command(m, p)
        })?;
        self.send_packets(&packets)
    }

    pub fn posforce_control_one(
        &self,
        index: usize,
        param: &PosForceParam,
    ) -> Result<(), DriverError> {
        let packet = self.one(index, |m| {
            CanPacketEncoder::create_posforce_control_command(m, param)
        })?;
        self.send_packets(&[packet])
    }

    pub fn posforce_control_all(&self, params: &[PosForceParam]) -> Result<(), DriverError> {
        let packets = self.zip("posforce params", params, |m, p| {
            CanPacketEncoder::create_posforce_control_command(m, p)
        })?;
        self.send_packets(&packets)
    }

    /// 切换固件控制模式，发送成功后更新本地记录
    pub fn set_control_mode_one(
        &mut self,
        index: usize,
        mode: ControlMode,
    ) -> Result<(), DriverError> {
        let packet = self.one(index, |m| {
            CanPacketEncoder::create_set_control_mode_command(m, mode)
        })?;
        self.send_packets(&[packet])?;
        self.motors[index].set_control_mode(mode);
        Ok(())
    }

    pub fn set_control_mode_all(&mut self, modes: &[ControlMode]) -> Result<(), DriverError> {
        let packets = self.zip("control modes", modes, |m, mode| {
            CanPacketEncoder::create_set_control_mode_command(m, *mode)
        })?;
        self.send_packets(&packets)?;
        for (motor, mode) in self.motors.iter_mut().zip(modes) {
            motor.set_control_mode(*mode);
        }
        Ok(())
    }

    // ============================================================================
    // 回调模式
    // ============================================================================

    pub fn set_callback_mode_one(
        &mut self,
        index: usize,
        mode: CallbackMode,
    ) -> Result<(), DriverError> {
        let len = self.motors.len();
        let motor = self
            .motors
            .get_mut(index)
            .ok_or(DriverError::IndexOutOfRange { index, len })?;
        motor.set_callback_mode(mode);
        Ok(())
    }

    /// 所有电机切换到同一回调模式
    pub fn set_callback_mode_all(&mut self, mode: CallbackMode) {
        self.motors.iter_mut().for_each(|m| m.set_callback_mode(mode));
    }

    // ============================================================================
    // 接收
    // ============================================================================

    /// 按接收 ID 认领并处理一帧
    ///
    /// 返回值表示该帧是否属于本集合；`Ignore` 模式的电机认领但丢弃该帧，
    /// 解码失败的帧不修改电机状态。
    pub fn dispatch_frame(&mut self, frame: &OpenArmFrame) -> bool {
        let Some(&index) = self.recv_index.get(&frame.id) else {
            return false;
        };
        let motor = &mut self.motors[index];
        match motor.callback_mode() {
            CallbackMode::State => {
                let result =
                    CanPacketDecoder::parse_motor_state_data(motor.motor_type(), frame.data_slice());
                if motor.apply_state(&result) {
                    trace!(
                        "{}[{}]: q={:.4} dq={:.4} tau={:.4}",
                        self.name, index, result.position, result.velocity, result.torque
                    );
                }
            },
            CallbackMode::Param => {
                let result = CanPacketDecoder::parse_motor_param_data(frame.data_slice());
                if motor.apply_param(&result) {
                    trace!("{}[{}]: rid {} = {}", self.name, index, result.rid, result.value);
                }
            },
            CallbackMode::Ignore => {
                trace!("{}[{}]: frame 0x{:X} ignored", self.name, index, frame.id);
            },
        }
        true
    }

    /// 从总线排空一批帧并分发给本集合，返回被认领的帧数
    ///
    /// 单独使用集合时的便捷接口；与其他集合共用总线时应使用协调器的 `recv_all`。
    pub fn recv_all(&mut self, timeout: Duration) -> Result<usize, DriverError> {
        let frames = {
            let mut bus = self.bus.try_borrow_mut().map_err(|_| DriverError::BusBusy)?;
            bus.receive_frames(timeout)?
        };
        Ok(frames.iter().filter(|f| self.dispatch_frame(f)).count())
    }

    // ============================================================================
    // 内部
    // ============================================================================

    fn each(&self, encode: impl Fn(&MotorIdentity) -> CanPacket) -> PacketBuffer {
        self.motors.iter().map(|m| encode(m.identity())).collect()
    }

    fn one(
        &self,
        index: usize,
        encode: impl FnOnce(&MotorIdentity) -> CanPacket,
    ) -> Result<CanPacket, DriverError> {
        self.get_motor(index).map(|m| encode(m.identity()))
    }

    fn zip<P>(
        &self,
        what: &'static str,
        params: &[P],
        encode: impl Fn(&MotorIdentity, &P) -> CanPacket,
    ) -> Result<PacketBuffer, DriverError> {
        if params.len() != self.motors.len() {
            return Err(DriverError::ConfigMismatch {
                what,
                expected: self.motors.len(),
                actual: params.len(),
            });
        }
        Ok(self
            .motors
            .iter()
            .zip(params)
            .map(|(m, p)| encode(m.identity(), p))
            .collect())
    }

    /// 校验所有包的 ID 后依次发送
    fn send_packets(&self, packets: &[CanPacket]) -> Result<(), DriverError> {
        if packets.is_empty() {
            return Ok(());
        }
        if let Some(bad) = packets.iter().find(|p| p.send_can_id > STANDARD_ID_MAX) {
            return Err(ProtocolError::InvalidCanId { id: bad.send_can_id }.into());
        }

        let mut bus = self.bus.try_borrow_mut().map_err(|_| DriverError::BusBusy)?;
        let fd = bus.is_fd_enabled();
        for packet in packets {
            let frame = if fd { packet.to_fd_frame() } else { packet.to_frame() };
            trace!("{}: TX 0x{:03X} {:02X?}", self.name, packet.send_can_id, packet.data);
            bus.send(frame)?;
        }
        Ok(())
    }
}
