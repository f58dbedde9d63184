use std::fmt;

use crate::error::{Result, S21Error};

use super::codec::{setpoint_byte, str_repr, Frame};
use super::state::{DeviceState, FanSpeed, Mode};


/// Accepted target temperature range, tenths of °C.
pub const SETPOINT_RANGE_C10: std::ops::RangeInclusive<i16> = 50..=350;

/// What a client asked for, in its own terms.
///
/// Codes are validated when converted into a [Command].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandRequest {
    Power(bool),
    /// External mode code (`1`, `2`, `3`, `4`, `6`)
    Mode(u8),
    /// External mode code, or `0` for power off
    HaMode(u8),
    /// Fan code (`'A'`, `'3'`..`'7'`)
    Fan(u8),
    /// Target temperature, tenths of °C
    Temp(i16),
    SwingV(bool),
    SwingH(bool),
    Swing {
        swing_h: bool,
        swing_v: bool
    },
}

/// A validated write to the unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Power(bool),
    Mode(Mode),
    /// Power off (`None`) or power on in the given mode
    HaMode(Option<Mode>),
    Fan(FanSpeed),
    Temp(i16),
    SwingV(bool),
    SwingH(bool),
    Swing {
        swing_h: bool,
        swing_v: bool
    },
}

impl TryFrom<CommandRequest> for Command {
    type Error = S21Error;

    fn try_from(request: CommandRequest) -> Result<Self> {
        let command = match request {
            CommandRequest::Power(on) => Command::Power(on),
            CommandRequest::Mode(code) => Command::Mode(Mode::from_external(code)?),
            CommandRequest::HaMode(0) => Command::HaMode(None),
            CommandRequest::HaMode(code) => Command::HaMode(Some(Mode::from_external(code)?)),
            CommandRequest::Fan(code) => Command::Fan(FanSpeed::from_external(code)?),
            CommandRequest::Temp(c10) => {
                if !SETPOINT_RANGE_C10.contains(&c10) {
                    return Err(S21Error::InvalidInput(format!("setpoint {c10} out of range")));
                }
                Command::Temp(c10)
            },
            CommandRequest::SwingV(on) => Command::SwingV(on),
            CommandRequest::SwingH(on) => Command::SwingH(on),
            CommandRequest::Swing { swing_h, swing_v } => Command::Swing { swing_h, swing_v },
        };

        Ok(command)
    }
}

fn power_byte(on: bool) -> u8 {
    if on { b'1' } else { b'0' }
}

/// `D1` payload. Fields not given are taken from `state`.
fn basic_state(state: &DeviceState, power_on: Option<bool>, mode: Option<Mode>, setpoint_c10: Option<i16>, fan: Option<FanSpeed>) -> Vec<u8> {
    vec![
        b'D', b'1',
        power_byte(power_on.unwrap_or(state.power_on)),
        mode.unwrap_or(state.mode).native(),
        setpoint_byte(setpoint_c10.unwrap_or(state.setpoint_c10)),
        fan.unwrap_or(state.fan).native(),
    ]
}

/// `D5` payload for the resulting swing state.
///
/// The flag/sentinel encoding is carried over from observed traffic as is:
/// `'0' + 2*H + V + 4*(H and V)`, then `'?'` if any axis swings.
fn swing(swing_h: bool, swing_v: bool) -> Vec<u8> {
    let flags = b'0'
        + (if swing_h { 2 } else { 0 })
        + (if swing_v { 1 } else { 0 })
        + (if swing_h && swing_v { 4 } else { 0 });

    let sentinel = if swing_h || swing_v { b'?' } else { b'0' };

    vec![b'D', b'5', flags, sentinel, b'0', b'0']
}

impl Command {
    /// Build the write payload for this command against the current state.
    pub fn payload(&self, state: &DeviceState) -> Vec<u8> {
        match *self {
            Command::Power(on) => basic_state(state, Some(on), None, None, None),
            Command::Mode(mode) => basic_state(state, None, Some(mode), None, None),
            Command::HaMode(None) => basic_state(state, Some(false), None, None, None),
            Command::HaMode(Some(mode)) => basic_state(state, Some(true), Some(mode), None, None),
            Command::Fan(fan) => basic_state(state, None, None, None, Some(fan)),
            Command::Temp(c10) => basic_state(state, None, None, Some(c10), None),
            Command::SwingV(on) => swing(state.swing_h, on),
            Command::SwingH(on) => swing(on, state.swing_v),
            Command::Swing { swing_h, swing_v } => swing(swing_h, swing_v),
        }
    }

    pub fn frame(&self, state: &DeviceState) -> Frame {
        Frame::new(self.payload(state))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Power(on) => write!(f, "power {}", if *on { "on" } else { "off" }),
            Command::Mode(mode) => write!(f, "mode {mode}"),
            Command::HaMode(None) => write!(f, "power off"),
            Command::HaMode(Some(mode)) => write!(f, "power on, mode {mode}"),
            Command::Fan(fan) => write!(f, "fan {fan}"),
            Command::Temp(c10) => write!(f, "setpoint {:.1} C", *c10 as f32 / 10.0),
            Command::SwingV(on) => write!(f, "vertical swing {on}"),
            Command::SwingH(on) => write!(f, "horizontal swing {on}"),
            Command::Swing { swing_h, swing_v } => write!(f, "swing H:{swing_h} V:{swing_v}"),
        }
    }
}

/// A command ready to be written: the command plus its frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: Command,
    pub frame: Frame,
}

impl PendingCommand {
    pub fn new(command: Command, state: &DeviceState) -> Self {
        Self { command, frame: command.frame(state) }
    }
}

impl fmt::Display for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.command, str_repr(self.frame.payload()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn cooling() -> DeviceState {
        DeviceState {
            power_on: true,
            mode: Mode::Cool,
            fan: FanSpeed::Speed2,
            setpoint_c10: 240,
            ..Default::default()
        }
    }

    fn build(request: CommandRequest, state: &DeviceState) -> Vec<u8> {
        Command::try_from(request).expect("valid request").payload(state)
    }

    #[test]
    fn test_power_keeps_other_fields() {
        let state = cooling();
        assert_eq!(build(CommandRequest::Power(false), &state), vec![b'D', b'1', b'0', b'3', setpoint_byte(240), b'4']);
    }

    #[test]
    fn test_mode_fan_temp() {
        let state = cooling();
        assert_eq!(build(CommandRequest::Mode(4), &state), vec![b'D', b'1', b'1', b'4', setpoint_byte(240), b'4']);
        assert_eq!(build(CommandRequest::Fan(b'A'), &state), vec![b'D', b'1', b'1', b'3', setpoint_byte(240), b'A']);
        assert_eq!(build(CommandRequest::Temp(220), &state), vec![b'D', b'1', b'1', b'3', 72, b'4']);
    }

    #[test]
    fn test_unknown_mode_is_carried_over() {
        let state = DeviceState { mode: Mode::Unknown(b'7'), ..cooling() };
        assert_eq!(build(CommandRequest::Power(true), &state)[3], b'7');
    }

    #[test]
    fn test_ha_mode() {
        let state = cooling();
        assert_eq!(build(CommandRequest::HaMode(0), &state), vec![b'D', b'1', b'0', b'3', setpoint_byte(240), b'4']);

        let off = DeviceState { power_on: false, ..cooling() };
        assert_eq!(build(CommandRequest::HaMode(6), &off), vec![b'D', b'1', b'1', b'6', setpoint_byte(240), b'4']);
    }

    #[test]
    fn test_invalid_input() {
        for request in [
            CommandRequest::Mode(5),
            CommandRequest::Mode(b'3'),
            CommandRequest::HaMode(9),
            CommandRequest::Fan(b'8'),
            CommandRequest::Fan(3),
            CommandRequest::Temp(400),
            CommandRequest::Temp(-10),
        ] {
            assert!(matches!(Command::try_from(request), Err(S21Error::InvalidInput(_))), "{request:?}");
        }
    }

    // The swing encoding mirrors observed wire traffic;
    // these tests pin that behaviour, they don't prove it is what the unit expects.
    #[test]
    fn test_swing_encoding_is_preserved() {
        let state = DeviceState { swing_h: true, ..cooling() };
        assert_eq!(build(CommandRequest::SwingV(true), &state), b"D57?00".to_vec());
        assert_eq!(build(CommandRequest::SwingV(false), &state), b"D52?00".to_vec());

        let state = DeviceState { swing_v: true, ..cooling() };
        assert_eq!(build(CommandRequest::SwingH(false), &state), b"D51?00".to_vec());

        let state = cooling();
        assert_eq!(build(CommandRequest::Swing { swing_h: false, swing_v: false }, &state), b"D50000".to_vec());
        assert_eq!(build(CommandRequest::Swing { swing_h: true, swing_v: true }, &state), b"D57?00".to_vec());
    }

    #[test]
    fn test_pending_command_frame() {
        let state = cooling();
        let pending = PendingCommand::new(Command::Power(false), &state);
        assert_eq!(pending.frame.header(), Some(*b"D1"));
        assert_eq!(pending.frame.payload(), &build(CommandRequest::Power(false), &state)[..]);
    }
}
