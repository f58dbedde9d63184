use std::io::Write;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::controller::Reporter;
use crate::error::S21Error;
use crate::protocol::commands::Command;
use crate::protocol::state::DeviceState;


/// One line of output.
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Report {
    Sensor {
        power: bool,
        /// External mode code, `null` if the unit reported something unknown
        mode: Option<u8>,
        mode_name: String,
        fan: String,
        /// Tenths of °C
        setpoint: i16,
        swing_v: bool,
        swing_h: bool,
        temp_inside: i16,
        temp_outside: i16,
        temp_coil: i16,
        fan_rpm: u16,
        idle: bool,
    },
    Command {
        command: String,
        result: String,
    },
    Config {
        period: u64,
    },
}

impl From<&DeviceState> for Report {
    fn from(state: &DeviceState) -> Self {
        Report::Sensor {
            power: state.power_on,
            mode: state.mode.external(),
            mode_name: state.mode.to_string(),
            fan: (state.fan.native() as char).to_string(),
            setpoint: state.setpoint_c10,
            swing_v: state.swing_v,
            swing_h: state.swing_h,
            temp_inside: state.temp_inside_c10,
            temp_outside: state.temp_outside_c10,
            temp_coil: state.temp_coil_c10,
            fan_rpm: state.fan_rpm,
            idle: state.idle,
        }
    }
}


/// Writes every report as a single JSON line.
pub struct JsonReporter<W> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn emit(&mut self, report: &Report) {
        let result = serde_json::to_writer(&mut self.out, report)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(self.out))
            .and_then(|_| self.out.flush());

        if let Err(err) = result {
            warn!("Failed to write report: {err}");
        }
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn state_changed(&mut self, state: &DeviceState) {
        self.emit(&Report::from(state));
    }

    fn command_settled(&mut self, command: &Command, result: &Result<(), S21Error>) {
        let result = match result {
            Ok(()) => "ok".to_string(),
            Err(err) => err.to_string(),
        };

        self.emit(&Report::Command { command: command.to_string(), result });
    }

    fn request_rejected(&mut self, request: &str, reason: &str) {
        self.emit(&Report::Command { command: request.to_string(), result: reason.to_string() });
    }

    fn period_changed(&mut self, period: Duration) {
        self.emit(&Report::Config { period: period.as_secs() });
    }
}
