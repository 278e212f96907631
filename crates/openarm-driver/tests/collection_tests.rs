//! 电机集合与协调器的集成测试
//!
//! 使用 MockCanAdapter 的应答器模拟电机固件：
//! 刷新请求应答状态帧，寄存器读取应答参数帧。

use openarm_can::{MockBusHandle, MockCanAdapter, OpenArmFrame};
use openarm_driver::*;
use openarm_protocol::*;
use proptest::prelude::*;
use std::time::Duration;

const ARM_SEND: [u32; 3] = [0x01, 0x02, 0x03];
const ARM_RECV: [u32; 3] = [0x11, 0x12, 0x13];

fn openarm() -> (OpenArm, MockBusHandle) {
    let (adapter, handle) = MockCanAdapter::new();
    let mut oa = OpenArm::with_adapter(adapter);
    oa.init_arm_motors(&[MotorType::Dm8009, MotorType::Dm4340, MotorType::Dm4310], &ARM_SEND, &ARM_RECV, None)
        .unwrap();
    oa.init_gripper_motor(MotorType::Dm4310, 0x08, 0x18, ControlMode::PosForce)
        .unwrap();
    (oa, handle)
}

/// 发送 ID → 接收 ID（= 发送 ID + 0x10）
fn recv_id_of(send: u32) -> u32 {
    send + 0x10
}

/// 模拟固件：状态帧中位置原始值等于 0x8000，MOS 温度等于发送 ID
fn install_firmware(handle: &MockBusHandle) {
    handle.set_responder(|frame: &OpenArmFrame| {
        if frame.id != ID_PARAM_BROADCAST {
            return Vec::new();
        }
        let data = frame.data_slice();
        let send = u16::from_le_bytes([data[0], data[1]]) as u32;
        let recv = recv_id_of(send) as u16;
        match data[2] {
            STATE_REFRESH => vec![OpenArmFrame::new_standard(
                recv,
                &[0x10 | send as u8, 0x80, 0x00, 0x80, 0x08, 0x00, send as u8, 40],
            )],
            PARAM_READ => {
                let rid = data[3];
                let value = if is_integer_register(rid) {
                    recv_id_of(send).to_le_bytes()
                } else {
                    1.5f32.to_le_bytes()
                };
                vec![OpenArmFrame::new_standard(
                    recv,
                    &[data[0], data[1], PARAM_READ, rid, value[0], value[1], value[2], value[3]],
                )]
            },
            _ => Vec::new(),
        }
    });
}

#[test]
fn test_refresh_roundtrip_updates_every_motor() {
    let (mut oa, handle) = openarm();
    install_firmware(&handle);

    oa.refresh_all().unwrap();
    let stats = oa.recv_all(Duration::from_millis(1)).unwrap();
    assert_eq!(stats, RecvStats { received: 4, routed: 4 });

    for motor_ref in oa.motor_refs().collect::<Vec<_>>() {
        let motor = oa.motor(motor_ref).unwrap();
        assert!(motor.is_state_valid(), "{:?}", motor_ref);
        assert_eq!(motor.t_mos() as u32, motor.send_can_id());
        assert_eq!(motor.status(), MotorStatus::Enabled);
        // 0x8000 比中点高半个量化步长
        assert!(motor.position().abs() < 1e-3);
    }
}

#[test]
fn test_query_param_in_param_mode() {
    let (mut oa, handle) = openarm();
    install_firmware(&handle);

    oa.set_callback_mode_all(CallbackMode::Param);
    oa.query_param_all(MotorVariable::MstId).unwrap();
    oa.recv_all(Duration::from_millis(1)).unwrap();

    assert_eq!(oa.arm().motors()[1].get_param(MotorVariable::MstId), Some(0x12 as f64));
    assert_eq!(oa.gripper().motors()[0].get_param(MotorVariable::MstId), Some(0x18 as f64));

    oa.query_param_all(MotorVariable::Pmax).unwrap();
    oa.recv_all(Duration::from_millis(1)).unwrap();
    assert_eq!(oa.arm().motors()[0].get_param(MotorVariable::Pmax), Some(1.5));
    // 参数模式下不解析状态帧
    assert!(!oa.arm().motors()[0].is_state_valid());
}

#[test]
fn test_query_unlisted_register_by_raw_rid() {
    let (mut oa, handle) = openarm();
    install_firmware(&handle);

    oa.set_callback_mode_all(CallbackMode::Param);
    oa.arm().query_param_raw_one(1, 60).unwrap();
    let sent = handle.sent_frames();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data_slice(), &[0x02, 0x00, PARAM_READ, 60, 0, 0, 0, 0]);

    oa.recv_all(Duration::from_millis(1)).unwrap();
    assert_eq!(oa.arm().motors()[1].get_param_raw(60), Some(1.5));
    assert_eq!(oa.arm().motors()[0].get_param_raw(60), None);
}

#[test]
fn test_state_mode_ignores_param_replies() {
    let (mut oa, handle) = openarm();
    install_firmware(&handle);

    oa.query_param_all(MotorVariable::MstId).unwrap();
    oa.recv_all(Duration::from_millis(1)).unwrap();
    // 参数应答被当作状态帧解码；参数表保持为空
    assert!(oa.arm().motors().iter().all(|m| m.params().next().is_none()));
}

#[test]
fn test_mit_all_length_mismatch_sends_nothing() {
    let (oa, handle) = openarm();
    let before: Vec<Motor> = oa.arm().get_motors();

    let params = vec![MitParam::new(10.0, 1.0, 0.0, 0.0, 0.0); 2];
    let err = oa.arm().mit_control_all(&params).unwrap_err();
    assert!(matches!(
        err,
        DriverError::ConfigMismatch {
            expected: 3,
            actual: 2,
            ..
        }
    ));
    assert!(handle.sent_frames().is_empty());
    assert_eq!(oa.arm().get_motors(), before);
}

#[test]
fn test_mit_all_sends_in_motor_order() {
    let (oa, handle) = openarm();
    let params = vec![MitParam::new(50.0, 1.0, 0.0, 0.0, 0.0); 3];
    oa.arm().mit_control_all(&params).unwrap();

    let sent = handle.sent_frames();
    assert_eq!(sent.iter().map(|f| f.id).collect::<Vec<_>>(), ARM_SEND.to_vec());
    // DM4310 的已知编码
    assert_eq!(sent[2].data_slice(), &[0x7F, 0xFF, 0x7F, 0xF1, 0x99, 0x33, 0x37, 0xFF]);
}

#[test]
fn test_empty_collections_are_noops() {
    let (adapter, handle) = MockCanAdapter::new();
    let mut oa = OpenArm::with_adapter(adapter);

    oa.enable_all().unwrap();
    oa.disable_all().unwrap();
    oa.set_zero_all().unwrap();
    oa.refresh_all().unwrap();
    oa.query_param_all(MotorVariable::CtrlMode).unwrap();
    oa.arm().mit_control_all(&[]).unwrap();
    oa.arm().posforce_control_all(&[]).unwrap();
    oa.set_callback_mode_all(CallbackMode::Ignore);

    assert!(handle.sent_frames().is_empty());
    assert_eq!(oa.recv_all(Duration::from_micros(50)).unwrap(), RecvStats::default());
}

#[test]
fn test_send_failure_surfaces_as_can_error() {
    let (mut oa, handle) = openarm();
    handle.set_fail_sends(true);
    let err = oa.enable_all().unwrap_err();
    assert!(matches!(err, DriverError::Can(openarm_can::CanError::BusOff)));
    assert!(oa.arm().motors().iter().all(|m| !m.is_enabled()));
}

#[test]
fn test_overflow_mid_drain_keeps_earlier_feedback() {
    let (mut oa, handle) = openarm();
    handle.push_rx(OpenArmFrame::new_standard(0x11, &[0x11, 0x80, 0x00, 0x80, 0x08, 0x00, 30, 40]));
    handle.push_rx(OpenArmFrame::new_standard(0x12, &[0x12, 0x80, 0x00, 0x80, 0x08, 0x00, 30, 40]));
    handle.push_rx_overflow();
    handle.push_rx(OpenArmFrame::new_standard(0x13, &[0x13, 0x80, 0x00, 0x80, 0x08, 0x00, 30, 40]));

    let stats = oa.recv_all(Duration::from_millis(1)).unwrap();
    assert_eq!(stats, RecvStats { received: 2, routed: 2 });
    let valid: Vec<bool> = oa.arm().motors().iter().map(|m| m.is_state_valid()).collect();
    assert_eq!(valid, vec![true, true, false]);

    // 溢出之后的帧在下一周期交付
    let stats = oa.recv_all(Duration::from_millis(1)).unwrap();
    assert_eq!(stats.routed, 1);
    assert!(oa.arm().motors()[2].is_state_valid());
}

#[test]
fn test_overflow_on_first_wait_is_reported() {
    let (mut oa, handle) = openarm();
    handle.push_rx_overflow();
    let err = oa.recv_all(Duration::from_millis(1)).unwrap_err();
    assert!(matches!(err, DriverError::Can(openarm_can::CanError::BufferOverflow)));
}

#[test]
fn test_short_frame_leaves_motor_untouched() {
    let (mut oa, handle) = openarm();
    handle.push_rx(OpenArmFrame::new_standard(0x11, &[0x11, 0x80, 0x00]));
    let stats = oa.recv_all(Duration::from_millis(1)).unwrap();
    assert_eq!(stats.routed, 1);
    assert!(!oa.arm().motors()[0].is_state_valid());
}

#[test]
fn test_from_config_full_init() {
    let config = OpenArmConfig::from_toml_str(
        r#"
interface = "vcan0"
recv_timeout_us = 200

[[arm.motors]]
motor_type = "DM8009"
send_can_id = 0x01
recv_can_id = 0x11

[gripper]
motor_type = "DM4310"
send_can_id = 0x08
recv_can_id = 0x18
motor_open_position = -0.8
limit_speed = 2.0
"#,
    )
    .unwrap();

    let (adapter, handle) = MockCanAdapter::new();
    let oa = OpenArm::from_config(adapter, &config).unwrap();
    assert_eq!(oa.recv_timeout(), Duration::from_micros(200));
    assert_eq!(oa.arm().motor_count(), 1);
    assert_eq!(oa.gripper().motors()[0].control_mode(), ControlMode::PosForce);
    assert_eq!(oa.gripper().mapping().motor_open, -0.8);
    assert_eq!(oa.gripper().limit_speed(), 2.0);

    oa.gripper().open().unwrap();
    let sent = handle.sent_frames();
    assert_eq!(sent[0].id, 0x308);
    let q = f32::from_le_bytes([sent[0].data[0], sent[0].data[1], sent[0].data[2], sent[0].data[3]]);
    assert_eq!(q, -0.8f32);
    assert_eq!(u16::from_le_bytes([sent[0].data[4], sent[0].data[5]]), 200);
}

proptest! {
    /// 任意帧序列：只有接收 ID 匹配的电机可能被修改
    #[test]
    fn prop_demux_isolation(
        frames in proptest::collection::vec(
            (0u32..0x40, proptest::collection::vec(any::<u8>(), 0..=8)),
            0..32,
        )
    ) {
        let (mut oa, handle) = openarm();
        let before: Vec<Motor> = oa.motor_refs().map(|r| oa.motor(r).unwrap().clone()).collect();
        let touched: Vec<u32> = frames.iter().map(|(id, _)| *id).collect();
        handle.push_rx_all(frames.iter().map(|(id, data)| OpenArmFrame::new_standard(*id as u16, data)));

        let stats = oa.recv_all(Duration::from_millis(1)).unwrap();
        prop_assert_eq!(stats.received, frames.len());

        let after: Vec<Motor> = oa.motor_refs().map(|r| oa.motor(r).unwrap().clone()).collect();
        for (b, a) in before.iter().zip(&after) {
            if !touched.contains(&b.recv_can_id()) {
                prop_assert_eq!(b, a);
            }
        }
        let expected_routed = touched
            .iter()
            .filter(|id| ARM_RECV.contains(id) || **id == 0x18)
            .count();
        prop_assert_eq!(stats.routed, expected_routed);
    }
}
