//! 协议常量定义
//!
//! 电机型号与限幅表、控制模式、回调模式、参数寄存器 ID、状态码。

use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};

// ============================================================================
// MIT 增益范围
// ============================================================================

/// Kp 编码范围（12 位）
pub const KP_MIN: f64 = 0.0;
pub const KP_MAX: f64 = 500.0;

/// Kd 编码范围（12 位）
pub const KD_MIN: f64 = 0.0;
pub const KD_MAX: f64 = 5.0;

/// MIT 帧各字段位宽
pub const POSITION_BITS: u32 = 16;
pub const VELOCITY_BITS: u32 = 12;
pub const TORQUE_BITS: u32 = 12;
pub const GAIN_BITS: u32 = 12;

// ============================================================================
// 电机型号
// ============================================================================

/// 单个电机型号的物理量限幅
///
/// 编码区间为对称区间 `[-max, max]`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitParam {
    /// 位置上限（rad）
    pub p_max: f64,
    /// 速度上限（rad/s）
    pub v_max: f64,
    /// 力矩上限（N·m）
    pub t_max: f64,
}

/// 达妙电机型号
///
/// 数值与 `MOTOR_LIMIT_PARAMS` 的下标一一对应。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MotorType {
    #[cfg_attr(feature = "serde", serde(rename = "DM3507"))]
    Dm3507 = 0,
    #[cfg_attr(feature = "serde", serde(rename = "DM4310"))]
    Dm4310 = 1,
    #[cfg_attr(feature = "serde", serde(rename = "DM4310_48V"))]
    Dm4310V48 = 2,
    #[cfg_attr(feature = "serde", serde(rename = "DM4340"))]
    Dm4340 = 3,
    #[cfg_attr(feature = "serde", serde(rename = "DM4340_48V"))]
    Dm4340V48 = 4,
    #[cfg_attr(feature = "serde", serde(rename = "DM6006"))]
    Dm6006 = 5,
    #[cfg_attr(feature = "serde", serde(rename = "DM8006"))]
    Dm8006 = 6,
    #[cfg_attr(feature = "serde", serde(rename = "DM8009"))]
    Dm8009 = 7,
    #[cfg_attr(feature = "serde", serde(rename = "DM10010L"))]
    Dm10010L = 8,
    #[cfg_attr(feature = "serde", serde(rename = "DM10010"))]
    Dm10010 = 9,
    #[cfg_attr(feature = "serde", serde(rename = "DMH3510"))]
    Dmh3510 = 10,
    #[cfg_attr(feature = "serde", serde(rename = "DMH6215"))]
    Dmh6215 = 11,
    #[cfg_attr(feature = "serde", serde(rename = "DMG6220"))]
    Dmg6220 = 12,
}

/// 各型号限幅表（顺序与 `MotorType` 数值一致）
pub const MOTOR_LIMIT_PARAMS: [LimitParam; MotorType::COUNT] = [
    LimitParam { p_max: 12.5, v_max: 50.0, t_max: 5.0 },   // DM3507
    LimitParam { p_max: 12.5, v_max: 30.0, t_max: 10.0 },  // DM4310
    LimitParam { p_max: 12.5, v_max: 50.0, t_max: 10.0 },  // DM4310_48V
    LimitParam { p_max: 12.5, v_max: 10.0, t_max: 28.0 },  // DM4340
    LimitParam { p_max: 12.5, v_max: 10.0, t_max: 28.0 },  // DM4340_48V
    LimitParam { p_max: 12.5, v_max: 45.0, t_max: 1.2 },   // DM6006
    LimitParam { p_max: 12.5, v_max: 45.0, t_max: 3.0 },   // DM8006
    LimitParam { p_max: 12.5, v_max: 25.0, t_max: 54.0 },  // DM8009
    LimitParam { p_max: 12.5, v_max: 20.0, t_max: 60.0 },  // DM10010L
    LimitParam { p_max: 12.5, v_max: 20.0, t_max: 100.0 }, // DM10010
    LimitParam { p_max: 12.5, v_max: 280.0, t_max: 0.75 }, // DMH3510
    LimitParam { p_max: 12.5, v_max: 100.0, t_max: 13.4 }, // DMH6215
    LimitParam { p_max: 12.5, v_max: 100.0, t_max: 20.0 }, // DMG6220
];

impl MotorType {
    /// 型号数量
    pub const COUNT: usize = 13;

    /// 全部型号
    pub const ALL: [MotorType; Self::COUNT] = [
        MotorType::Dm3507,
        MotorType::Dm4310,
        MotorType::Dm4310V48,
        MotorType::Dm4340,
        MotorType::Dm4340V48,
        MotorType::Dm6006,
        MotorType::Dm8006,
        MotorType::Dm8009,
        MotorType::Dm10010L,
        MotorType::Dm10010,
        MotorType::Dmh3510,
        MotorType::Dmh6215,
        MotorType::Dmg6220,
    ];

    /// 获取该型号的限幅参数
    pub fn limits(self) -> LimitParam {
        MOTOR_LIMIT_PARAMS[self as usize]
    }

    /// 厂商型号名（如 `"DM4310_48V"`）
    pub fn name(self) -> &'static str {
        match self {
            MotorType::Dm3507 => "DM3507",
            MotorType::Dm4310 => "DM4310",
            MotorType::Dm4310V48 => "DM4310_48V",
            MotorType::Dm4340 => "DM4340",
            MotorType::Dm4340V48 => "DM4340_48V",
            MotorType::Dm6006 => "DM6006",
            MotorType::Dm8006 => "DM8006",
            MotorType::Dm8009 => "DM8009",
            MotorType::Dm10010L => "DM10010L",
            MotorType::Dm10010 => "DM10010",
            MotorType::Dmh3510 => "DMH3510",
            MotorType::Dmh6215 => "DMH6215",
            MotorType::Dmg6220 => "DMG6220",
        }
    }
}

impl std::fmt::Display for MotorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for MotorType {
    type Err = crate::ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MotorType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::ProtocolError::ParseError(format!("unknown motor type '{s}'")))
    }
}

// ============================================================================
// 控制模式 / 回调模式
// ============================================================================

/// 电机固件控制模式（写入寄存器 `CTRL_MODE`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
#[repr(u8)]
pub enum ControlMode {
    /// MIT 模式（kp/kd/q/dq/tau）
    #[default]
    Mit = 1,
    /// 位置-速度模式
    PosVel = 2,
    /// 速度模式
    Vel = 3,
    /// 力位混合模式（位置 + 速度上限 + 电流标幺值上限）
    PosForce = 4,
}

/// 接收帧的解析方式
///
/// 同一个接收 ID 上既可能是状态帧也可能是参数应答帧，
/// 需要调用方在发起查询前切换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackMode {
    /// 按状态帧解析
    #[default]
    State,
    /// 按参数应答帧解析
    Param,
    /// 认领但丢弃
    Ignore,
}

// ============================================================================
// 参数寄存器
// ============================================================================

/// 电机参数寄存器 ID（RID）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MotorVariable {
    UvValue = 0,
    KtValue = 1,
    OtValue = 2,
    OcValue = 3,
    Acc = 4,
    Dec = 5,
    MaxSpd = 6,
    MstId = 7,
    EscId = 8,
    Timeout = 9,
    CtrlMode = 10,
    Damp = 11,
    Inertia = 12,
    HwVer = 13,
    SwVer = 14,
    Sn = 15,
    Npp = 16,
    Rs = 17,
    Ls = 18,
    Flux = 19,
    Gr = 20,
    Pmax = 21,
    Vmax = 22,
    Tmax = 23,
    IBw = 24,
    KpAsr = 25,
    KiAsr = 26,
    KpApr = 27,
    KiApr = 28,
    OvValue = 29,
    Gtefp = 30,
    Gtefn = 31,
    Alias = 32,
    CodeVersion = 33,
    MotorType = 34,
    CanRateLevel = 35,
    CanIdLevel = 36,
    Cbkp = 37,
    Cbkd = 38,
    SubVer = 39,
    UOff = 40,
    VOff = 41,
    K1 = 42,
    K2 = 43,
    MOff = 44,
    Dir = 45,
    PM = 46,
    Xout = 47,
    EnableBkp = 48,
    BkpLoc = 49,
    Pmin = 50,
    MasterId = 51,
    IsReduction = 52,
    RunState = 56,
    ErrorState = 80,
    CurAngle = 81,
}

impl MotorVariable {
    /// 寄存器原始 ID
    pub fn rid(self) -> u8 {
        self.into()
    }

    /// 是否按 32 位无符号整数传输
    pub fn is_integer(self) -> bool {
        is_integer_register(self.rid())
    }
}

/// 按 u32 解释的寄存器：`[7,10]`、`[13,16]`、`[35,36]`，其余按 IEEE-754 f32
pub fn is_integer_register(rid: u8) -> bool {
    matches!(rid, 7..=10 | 13..=16 | 35..=36)
}

// ============================================================================
// 状态码
// ============================================================================

/// 状态帧 Byte 0 高 4 位携带的电机状态 / 故障码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MotorStatus {
    Disabled = 0x0,
    Enabled = 0x1,
    OverVoltage = 0x8,
    UnderVoltage = 0x9,
    OverCurrent = 0xA,
    MosOverTemperature = 0xB,
    RotorOverTemperature = 0xC,
    CommunicationLost = 0xD,
    Overload = 0xE,
    #[default]
    Unknown = 0xFF,
}

impl MotorStatus {
    /// 是否为故障状态
    pub fn is_fault(self) -> bool {
        !matches!(
            self,
            MotorStatus::Disabled | MotorStatus::Enabled | MotorStatus::Unknown
        )
    }
}
