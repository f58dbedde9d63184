//! JSON control messages, one per line.
//!
//! ```text
//! {"command":"acPower","power":true}
//! {"command":"acMode","mode":3}
//! {"command":"acFan","fan":"A"}
//! {"command":"acTemp","temp":22}
//! {"command":"config","target":"period","value":30}
//! ```

use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::controller::{Controller, Reporter, Transport};
use crate::protocol::commands::CommandRequest;


#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field} value {value:?}")]
    InvalidValue {
        field: &'static str,
        value: String
    },
    #[error("unknown config target {0:?}")]
    UnknownTarget(String),
}

/// A code given either as a number or as a string.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
enum Code {
    Number(u8),
    Text(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "command")]
enum Message {
    #[serde(rename = "acPower")]
    Power { power: bool },
    #[serde(rename = "acMode")]
    Mode { mode: Code },
    #[serde(rename = "acHaMode")]
    HaMode { mode: Code },
    #[serde(rename = "acFan")]
    Fan { fan: Code },
    #[serde(rename = "acTemp")]
    Temp { temp: i16 },
    #[serde(rename = "acSwingV")]
    SwingV {
        #[serde(rename = "swingV")]
        swing_v: bool
    },
    #[serde(rename = "acSwingH")]
    SwingH {
        #[serde(rename = "swingH")]
        swing_h: bool
    },
    #[serde(rename = "acSwing")]
    Swing {
        #[serde(rename = "swingH")]
        swing_h: bool,
        #[serde(rename = "swingV")]
        swing_v: bool
    },
    #[serde(rename = "config")]
    Config { target: String, value: u64 },
}

/// What a control message asks the daemon to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Command(CommandRequest),
    SetPeriod(Duration),
}

/// Mode codes are numbers (`"3"` is accepted too).
fn mode_code(code: Code) -> Result<u8, IntakeError> {
    match code {
        Code::Number(n) => Ok(n),
        Code::Text(text) => text.trim().parse().map_err(|_| IntakeError::InvalidValue { field: "mode", value: text }),
    }
}

/// Fan codes are characters (`"A"`, `"3"`..`"7"`) or their ASCII values.
fn fan_code(code: Code) -> Result<u8, IntakeError> {
    match code {
        Code::Number(n) => Ok(n),
        Code::Text(text) => match text.as_bytes() {
            [c] => Ok(*c),
            _ => Err(IntakeError::InvalidValue { field: "fan", value: text }),
        },
    }
}

/// Parse one control message.
///
/// Only the shape of the message is checked here; codes and ranges are
/// validated when the command is submitted.
pub fn parse(line: &str) -> Result<Request, IntakeError> {
    let message: Message = serde_json::from_str(line)?;

    let request = match message {
        Message::Power { power } => Request::Command(CommandRequest::Power(power)),
        Message::Mode { mode } => Request::Command(CommandRequest::Mode(mode_code(mode)?)),
        Message::HaMode { mode } => Request::Command(CommandRequest::HaMode(mode_code(mode)?)),
        Message::Fan { fan } => Request::Command(CommandRequest::Fan(fan_code(fan)?)),
        Message::Temp { temp } => {
            let c10 = temp.checked_mul(10)
                .ok_or_else(|| IntakeError::InvalidValue { field: "temp", value: temp.to_string() })?;
            Request::Command(CommandRequest::Temp(c10))
        },
        Message::SwingV { swing_v } => Request::Command(CommandRequest::SwingV(swing_v)),
        Message::SwingH { swing_h } => Request::Command(CommandRequest::SwingH(swing_h)),
        Message::Swing { swing_h, swing_v } => Request::Command(CommandRequest::Swing { swing_h, swing_v }),
        Message::Config { target, value } => match target.as_str() {
            "period" if value > 0 => Request::SetPeriod(Duration::from_secs(value)),
            "period" => return Err(IntakeError::InvalidValue { field: "period", value: value.to_string() }),
            _ => return Err(IntakeError::UnknownTarget(target)),
        },
    };

    Ok(request)
}

/// Parse `line` and hand it to `controller`.
///
/// Lines that can't be parsed and commands the controller refuses are
/// answered through its reporter.
pub fn dispatch<T: Transport, R: Reporter>(controller: &mut Controller<T, R>, line: &str, now: Instant) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match parse(line) {
        Ok(Request::Command(request)) => {
            if let Err(err) = controller.submit(request, now) {
                warn!("Rejected {request:?}: {err}");
                controller.reporter_mut().request_rejected(&format!("{request:?}"), &err.to_string());
            }
        },
        Ok(Request::SetPeriod(period)) => controller.set_period(period),
        Err(err) => {
            warn!("Ignoring {line:?}: {err}");
            controller.reporter_mut().request_rejected(line, &err.to_string());
        },
    }
}
