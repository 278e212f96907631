//! # 配置文件
//!
//! TOML 格式的总线与电机布局描述，用于 `OpenArm::from_config` 一次完成初始化。
//!
//! ```toml
//! interface = "can0"
//! enable_fd = true
//! recv_timeout_us = 500
//!
//! [[arm.motors]]
//! motor_type = "DM8009"
//! send_can_id = 0x01
//! recv_can_id = 0x11
//!
//! [gripper]
//! motor_type = "DM4310"
//! send_can_id = 0x08
//! recv_can_id = 0x18
//! control_mode = "POS_FORCE"
//! ```

use crate::gripper::{DEFAULT_LIMIT_SPEED, DEFAULT_LIMIT_TORQUE_PU, GripperMapping};
use openarm_protocol::{ControlMode, ID_PARAM_BROADCAST, MotorType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn default_recv_timeout_us() -> u64 {
    500
}

fn default_gripper_mode() -> ControlMode {
    ControlMode::PosForce
}

/// 顶层配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenArmConfig {
    /// SocketCAN 接口名
    pub interface: String,
    #[serde(default)]
    pub enable_fd: bool,
    /// `recv_all` 等待首帧的超时（微秒）
    #[serde(default = "default_recv_timeout_us")]
    pub recv_timeout_us: u64,
    #[serde(default)]
    pub arm: ArmConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gripper: Option<GripperConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArmConfig {
    #[serde(default)]
    pub motors: Vec<MotorConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotorConfig {
    pub motor_type: MotorType,
    pub send_can_id: u32,
    pub recv_can_id: u32,
    #[serde(default)]
    pub control_mode: ControlMode,
}

/// 夹爪配置；映射与限幅字段缺省时使用组件默认值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GripperConfig {
    pub motor_type: MotorType,
    pub send_can_id: u32,
    pub recv_can_id: u32,
    #[serde(default = "default_gripper_mode")]
    pub control_mode: ControlMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor_open_position: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor_closed_position: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_torque_pu: Option<f64>,
}

impl GripperConfig {
    pub fn mapping(&self) -> GripperMapping {
        let default = GripperMapping::default();
        GripperMapping {
            motor_open: self.motor_open_position.unwrap_or(default.motor_open),
            motor_closed: self.motor_closed_position.unwrap_or(default.motor_closed),
            ..default
        }
    }

    pub fn limits(&self) -> (f64, f64) {
        (
            self.limit_speed.unwrap_or(DEFAULT_LIMIT_SPEED),
            self.limit_torque_pu.unwrap_or(DEFAULT_LIMIT_TORQUE_PU),
        )
    }
}

/// 手臂初始化用的并行数组
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArmArrays {
    pub motor_types: Vec<MotorType>,
    pub send_can_ids: Vec<u32>,
    pub recv_can_ids: Vec<u32>,
    pub control_modes: Vec<ControlMode>,
}

impl OpenArmConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml_string()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_micros(self.recv_timeout_us)
    }

    /// 接口名非空；所有 CAN ID 为合法标准帧 ID（不含 0x7FF）且在整条总线上唯一
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.trim().is_empty() {
            return Err(ConfigError::Invalid("interface name is empty".to_string()));
        }

        let ids = self
            .arm
            .motors
            .iter()
            .map(|m| (m.send_can_id, m.recv_can_id))
            .chain(self.gripper.iter().map(|g| (g.send_can_id, g.recv_can_id)));

        let mut send_seen = HashSet::new();
        let mut recv_seen = HashSet::new();
        for (send, recv) in ids {
            for id in [send, recv] {
                if id >= ID_PARAM_BROADCAST {
                    return Err(ConfigError::Invalid(format!(
                        "CAN ID 0x{:X} is outside 0x000..=0x7FE",
                        id
                    )));
                }
            }
            if !send_seen.insert(send) {
                return Err(ConfigError::Invalid(format!("duplicate send CAN ID 0x{:X}", send)));
            }
            if !recv_seen.insert(recv) {
                return Err(ConfigError::Invalid(format!("duplicate recv CAN ID 0x{:X}", recv)));
            }
        }

        let torque_limit = self.gripper.and_then(|g| g.limit_torque_pu);
        if let Some(limit) = torque_limit.filter(|l| !(0.0..=1.0).contains(l)) {
            return Err(ConfigError::Invalid(format!(
                "gripper limit_torque_pu {} is outside [0, 1]",
                limit
            )));
        }
        Ok(())
    }

    pub fn arm_parallel_arrays(&self) -> ArmArrays {
        let motors = &self.arm.motors;
        ArmArrays {
            motor_types: motors.iter().map(|m| m.motor_type).collect(),
            send_can_ids: motors.iter().map(|m| m.send_can_id).collect(),
            recv_can_ids: motors.iter().map(|m| m.recv_can_id).collect(),
            control_modes: motors.iter().map(|m| m.control_mode).collect(),
        }
    }
}
