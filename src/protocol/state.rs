use std::fmt::Debug;

use strum_macros::{Display, EnumIter};
use tracing::debug;

use crate::error::{Result, S21Error};

use super::responses::Response;


/// Operating mode.
///
/// Native values are the ASCII characters used on the wire, external codes
/// are the numbers clients use to select a mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter)]
pub enum Mode {
    Auto,
    Dry,
    Cool,
    Heat,
    Fan,
    /// A native value with no known meaning; kept so it can be sent back unchanged.
    #[strum(to_string = "Unknown")]
    Unknown(u8),
}

impl Mode {
    /// Decode from the native wire character.
    ///
    /// The unit reports Auto as either `'0'` or `'1'`.
    pub fn from_native(native: u8) -> Self {
        match native {
            b'0' | b'1' => Self::Auto,
            b'2' => Self::Dry,
            b'3' => Self::Cool,
            b'4' => Self::Heat,
            b'6' => Self::Fan,
            other => Self::Unknown(other),
        }
    }

    pub fn native(&self) -> u8 {
        match self {
            Self::Auto => b'1',
            Self::Dry => b'2',
            Self::Cool => b'3',
            Self::Heat => b'4',
            Self::Fan => b'6',
            Self::Unknown(native) => *native,
        }
    }

    /// Map a client supplied mode code (`1` Auto, `2` Dry, `3` Cool, `4` Heat, `6` Fan).
    pub fn from_external(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Auto),
            2 => Ok(Self::Dry),
            3 => Ok(Self::Cool),
            4 => Ok(Self::Heat),
            6 => Ok(Self::Fan),
            other => Err(S21Error::InvalidInput(format!("unknown mode code {other}"))),
        }
    }

    pub fn external(&self) -> Option<u8> {
        match self {
            Self::Unknown(_) => None,
            mode => Some(mode.native() - b'0'),
        }
    }

    /// The unit reports a meaningless setpoint in these modes.
    pub fn has_setpoint(&self) -> bool {
        !matches!(self, Self::Dry | Self::Fan)
    }
}


/// Fan speed.
///
/// Native and external codes are the same characters: `'A'` for auto and
/// `'3'`..`'7'` for speeds 1 to 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum FanSpeed {
    Auto,
    #[strum(to_string = "1")]
    Speed1,
    #[strum(to_string = "2")]
    Speed2,
    #[strum(to_string = "3")]
    Speed3,
    #[strum(to_string = "4")]
    Speed4,
    #[strum(to_string = "5")]
    Speed5,
    #[strum(to_string = "Unknown")]
    Unknown(u8),
}

impl FanSpeed {
    pub fn from_native(native: u8) -> Self {
        match native {
            b'A' => Self::Auto,
            b'3' => Self::Speed1,
            b'4' => Self::Speed2,
            b'5' => Self::Speed3,
            b'6' => Self::Speed4,
            b'7' => Self::Speed5,
            other => Self::Unknown(other),
        }
    }

    pub fn native(&self) -> u8 {
        match self {
            Self::Auto => b'A',
            Self::Speed1 => b'3',
            Self::Speed2 => b'4',
            Self::Speed3 => b'5',
            Self::Speed4 => b'6',
            Self::Speed5 => b'7',
            Self::Unknown(native) => *native,
        }
    }

    /// Validate a client supplied fan code.
    pub fn from_external(code: u8) -> Result<Self> {
        match Self::from_native(code) {
            Self::Unknown(other) => Err(S21Error::InvalidInput(format!("unknown fan code {:?}", other as char))),
            speed => Ok(speed),
        }
    }
}


/// Last known operating values of the unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceState {
    pub power_on: bool,
    pub mode: Mode,
    pub fan: FanSpeed,
    /// Target temperature, tenths of °C
    pub setpoint_c10: i16,
    pub swing_v: bool,
    pub swing_h: bool,
    pub temp_inside_c10: i16,
    pub temp_outside_c10: i16,
    pub temp_coil_c10: i16,
    pub fan_rpm: u16,
    /// Compressor inactive
    pub idle: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power_on: false,
            mode: Mode::Auto,
            fan: FanSpeed::Auto,
            setpoint_c10: 270,
            swing_v: false,
            swing_h: false,
            temp_inside_c10: 0,
            temp_outside_c10: 0,
            temp_coil_c10: 0,
            fan_rpm: 0,
            idle: true,
        }
    }
}

fn update<T: PartialEq + Debug>(name: &str, field: &mut T, value: T) -> bool {
    if *field == value {
        return false;
    }

    debug!("{name} changed from {field:?} to {value:?}");
    *field = value;
    true
}

impl DeviceState {
    /// Apply a decoded response, returning whether any field changed.
    pub fn apply(&mut self, response: &Response) -> bool {
        match *response {
            Response::BasicState { power_on, mode, setpoint_c10, fan } => {
                let mut changed = update("Power", &mut self.power_on, power_on);
                changed |= update("Mode", &mut self.mode, mode);
                changed |= update("Fan", &mut self.fan, fan);
                if mode.has_setpoint() {
                    changed |= update("Setpoint", &mut self.setpoint_c10, setpoint_c10);
                }
                debug!("Power is {}, mode is {}, setpoint is {}, fan is {}", self.power_on, self.mode, self.setpoint_c10, self.fan);
                changed
            },
            Response::Swing { swing_v, swing_h } => {
                update("SwingV", &mut self.swing_v, swing_v)
                    | update("SwingH", &mut self.swing_h, swing_h)
            },
            Response::InsideTemperature(c10) => update("Temp inside", &mut self.temp_inside_c10, c10),
            Response::CoilTemperature(c10) => update("Temp coil", &mut self.temp_coil_c10, c10),
            Response::OutsideTemperature(c10) => update("Temp outside", &mut self.temp_outside_c10, c10),
            Response::FanRpm(rpm) => update("Fan RPM", &mut self.fan_rpm, rpm),
            Response::Compressor { idle } => update("Idle", &mut self.idle, idle),
        }
    }

    /// Multi-line summary for the debug log.
    pub fn dump(&self) -> String {
        format!(
            "Power: {}\nMode: {} ({})\nTarget: {:.1} C\nFan: {} ({} rpm)\nSwing: H:{} V:{}\nInside: {:.1} C\nOutside: {:.1} C\nCoil: {:.1} C",
            self.power_on,
            self.mode,
            if self.idle { "idle" } else { "active" },
            self.setpoint_c10 as f32 / 10.0,
            self.fan,
            self.fan_rpm,
            self.swing_h,
            self.swing_v,
            self.temp_inside_c10 as f32 / 10.0,
            self.temp_outside_c10 as f32 / 10.0,
            self.temp_coil_c10 as f32 / 10.0,
        )
    }
}
