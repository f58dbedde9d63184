use crate::error::{Result, S21Error};

use super::codec::{decode_numeric, setpoint_c10, str_repr, Frame};
use super::state::{FanSpeed, Mode};


/// A decoded reply to one of the poll queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    /// `G1`
    BasicState {
        power_on: bool,
        mode: Mode,
        /// Only meaningful when `mode.has_setpoint()`
        setpoint_c10: i16,
        fan: FanSpeed,
    },
    /// `G5`
    Swing {
        swing_v: bool,
        swing_h: bool,
    },
    /// `SH`
    InsideTemperature(i16),
    /// `SI`
    CoilTemperature(i16),
    /// `Sa`
    OutsideTemperature(i16),
    /// `SL`
    FanRpm(u16),
    /// `Sd`, compressor frequency
    Compressor {
        idle: bool,
    },
}

fn malformed(frame: &Frame) -> S21Error {
    S21Error::MalformedPayload(str_repr(frame.payload()))
}

fn temperature(frame: &Frame) -> Result<i16> {
    decode_numeric(frame.body()).ok_or_else(|| malformed(frame))
}

impl TryFrom<&Frame> for Response {
    type Error = S21Error;

    fn try_from(frame: &Frame) -> Result<Self> {
        let header = frame.header().ok_or_else(|| malformed(frame))?;
        let body = frame.body();

        let response = match &header {
            b"G1" => {
                let [power, mode, setpoint, fan, ..] = *body else {
                    return Err(malformed(frame))
                };

                Response::BasicState {
                    power_on: power == b'1',
                    mode: Mode::from_native(mode),
                    setpoint_c10: setpoint_c10(setpoint),
                    fan: FanSpeed::from_native(fan),
                }
            },
            b"G5" => {
                let flags = *body.first().ok_or_else(|| malformed(frame))?;

                Response::Swing {
                    swing_v: flags & 0b01 != 0,
                    swing_h: flags & 0b10 != 0,
                }
            },
            b"SH" => Response::InsideTemperature(temperature(frame)?),
            b"SI" => Response::CoilTemperature(temperature(frame)?),
            b"Sa" => Response::OutsideTemperature(temperature(frame)?),
            b"SL" => {
                let value = decode_numeric(body).ok_or_else(|| malformed(frame))?;
                let rpm = u16::try_from(value).map_err(|_| malformed(frame))?;
                Response::FanRpm(rpm * 10)
            },
            b"Sd" => {
                let digits = body.get(..3).ok_or_else(|| malformed(frame))?;
                Response::Compressor { idle: digits == b"000" }
            },
            _ => return Err(S21Error::UnknownHeader(str_repr(frame.payload()))),
        };

        Ok(response)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::setpoint_byte;

    fn parse(payload: &[u8]) -> Result<Response> {
        Response::try_from(&Frame::new(payload))
    }

    #[test]
    fn test_basic_state() {
        let setpoint = setpoint_byte(220);
        assert_eq!((setpoint - 28) as i16 * 5, 220);

        assert_eq!(
            parse(&[b'G', b'1', b'1', b'3', setpoint, b'A']),
            Ok(Response::BasicState { power_on: true, mode: Mode::Cool, setpoint_c10: 220, fan: FanSpeed::Auto })
        );

        assert_eq!(
            parse(&[b'G', b'1', b'0', b'0', setpoint, b'5']),
            Ok(Response::BasicState { power_on: false, mode: Mode::Auto, setpoint_c10: 220, fan: FanSpeed::Speed3 })
        );
    }

    #[test]
    fn test_swing() {
        assert_eq!(parse(b"G51?00"), Ok(Response::Swing { swing_v: true, swing_h: false }));
        assert_eq!(parse(b"G52?00"), Ok(Response::Swing { swing_v: false, swing_h: true }));
        assert_eq!(parse(b"G57?00"), Ok(Response::Swing { swing_v: true, swing_h: true }));
        assert_eq!(parse(b"G50000"), Ok(Response::Swing { swing_v: false, swing_h: false }));
    }

    #[test]
    fn test_temperatures() {
        assert_eq!(parse(b"SH532+"), Ok(Response::InsideTemperature(235)));
        assert_eq!(parse(b"SI021+"), Ok(Response::CoilTemperature(120)));
        assert_eq!(parse(b"Sa050-"), Ok(Response::OutsideTemperature(-50)));
    }

    #[test]
    fn test_fan_rpm() {
        assert_eq!(parse(b"SL021"), Ok(Response::FanRpm(1200)));
        assert!(matches!(parse(b"SL050-"), Err(S21Error::MalformedPayload(_))));
    }

    #[test]
    fn test_compressor() {
        assert_eq!(parse(b"Sd000"), Ok(Response::Compressor { idle: true }));
        assert_eq!(parse(b"Sd000+"), Ok(Response::Compressor { idle: true }));

        for digits in [b"100", b"010", b"001", b"999"] {
            let mut payload = b"Sd".to_vec();
            payload.extend_from_slice(digits);
            assert_eq!(parse(&payload), Ok(Response::Compressor { idle: false }));
        }
    }

    #[test]
    fn test_unknown_and_malformed() {
        assert_eq!(parse(b"SN123+"), Err(S21Error::UnknownHeader("SN123+".to_string())));
        assert_eq!(parse(b"XY"), Err(S21Error::UnknownHeader("XY".to_string())));
        assert!(matches!(parse(b"G1"), Err(S21Error::MalformedPayload(_))));
        assert!(matches!(parse(b"SH5"), Err(S21Error::MalformedPayload(_))));
        assert!(matches!(parse(b"S"), Err(S21Error::MalformedPayload(_))));
    }
}
