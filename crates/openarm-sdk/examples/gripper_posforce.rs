//! 夹爪力位混合控制演示
//!
//! 用法：`cargo run -p openarm-sdk --example gripper_posforce -- can0`
//!
//! 张开 → 以 0.3 pu 夹持 → 张开，每一步之后打印夹爪开度与电机温度。

use openarm_sdk::prelude::*;
use std::thread;
use std::time::Duration;

const STEP_TIME: Duration = Duration::from_secs(2);
const POLL_PERIOD: Duration = Duration::from_millis(10);

fn run_step(openarm: &mut OpenArm, label: &str) -> Result<(), DriverError> {
    let polls = STEP_TIME.as_millis() / POLL_PERIOD.as_millis();
    for _ in 0..polls {
        openarm.refresh_all()?;
        openarm.recv_all_default()?;
        thread::sleep(POLL_PERIOD);
    }
    let gripper = openarm.gripper();
    let motor = gripper.motor()?;
    match gripper.position() {
        Some(pos) => println!(
            "{label}: gripper={pos:.3} motor={:.3} rad tau={:.3} N·m mos={}°C",
            motor.position(),
            motor.torque(),
            motor.t_mos()
        ),
        None => println!("{label}: no state received"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    openarm_sdk::init_logger();

    let interface = std::env::args().nth(1).unwrap_or_else(|| "can0".to_string());
    let mut openarm = OpenArm::open(&interface, true)?;
    openarm.init_gripper_motor(MotorType::Dm4310, 0x08, 0x18, ControlMode::PosForce)?;

    openarm.gripper_mut().set_control_mode_all(&[ControlMode::PosForce])?;
    openarm.enable_all()?;

    openarm.gripper().open()?;
    run_step(&mut openarm, "open")?;

    openarm.gripper().grasp(0.3, None)?;
    run_step(&mut openarm, "grasp")?;

    openarm.gripper().open()?;
    run_step(&mut openarm, "open")?;

    openarm.disable_all()?;
    Ok(())
}
