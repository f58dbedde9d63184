use rand::Rng;
use tracing::{debug, info, warn};

use crate::protocol::codec::{setpoint_byte, setpoint_c10, str_repr, Frame, RxFrame, TxFrame};
use crate::protocol::state::{DeviceState, FanSpeed, Mode};


/// `<ones><tens><hundreds><sign>`, clamped to three digits.
fn numeric(value: i16) -> [u8; 4] {
    let abs = value.unsigned_abs().min(999);
    let digit = |n: u16| b'0' + (n % 10) as u8;

    [
        digit(abs),
        digit(abs / 10),
        digit(abs / 100),
        if value < 0 { b'-' } else { b'+' },
    ]
}

fn swing_flags(swing_h: bool, swing_v: bool) -> [u8; 2] {
    let flags = b'0'
        + (if swing_h { 2 } else { 0 })
        + (if swing_v { 1 } else { 0 })
        + (if swing_h && swing_v { 4 } else { 0 });

    [flags, if swing_h || swing_v { b'?' } else { b'0' }]
}


/// A Daikin indoor unit as seen from its S21 port.
#[derive(Debug, Clone)]
pub struct UnitEmulator {
    pub state: DeviceState,
    pub compressor_hz: u16,
}

impl Default for UnitEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitEmulator {
    pub fn new() -> Self {
        Self {
            state: DeviceState {
                power_on: true,
                mode: Mode::Heat,
                fan: FanSpeed::Auto,
                setpoint_c10: 230,
                temp_inside_c10: 205,
                temp_outside_c10: 85,
                temp_coil_c10: 310,
                fan_rpm: 1150,
                idle: false,
                ..Default::default()
            },
            compressor_hz: 42,
        }
    }

    /// The reply payload for query `code`, if it is one the unit answers.
    fn answer(&self, code: &[u8]) -> Option<Vec<u8>> {
        let state = &self.state;

        let body = match code {
            b"F1" => vec![
                if state.power_on { b'1' } else { b'0' },
                state.mode.native(),
                setpoint_byte(state.setpoint_c10),
                state.fan.native(),
            ],
            b"F5" => {
                let [flags, sentinel] = swing_flags(state.swing_h, state.swing_v);
                vec![flags, sentinel, b'0', b'0']
            },
            b"RH" => numeric(state.temp_inside_c10).to_vec(),
            b"RI" => numeric(state.temp_coil_c10).to_vec(),
            b"Ra" => numeric(state.temp_outside_c10).to_vec(),
            b"RL" => numeric((state.fan_rpm / 10) as i16)[..3].to_vec(),
            b"Rd" => numeric(self.compressor_hz as i16)[..3].to_vec(),
            _ => return None,
        };

        let mut payload = vec![code[0] + 1, code[1]];
        payload.extend(body);
        Some(payload)
    }

    fn write(&mut self, frame: &Frame) -> bool {
        match (frame.header(), frame.body()) {
            (Some([b'D', b'1']), &[power, mode, setpoint, fan, ..]) => {
                self.state.power_on = power == b'1';
                self.state.mode = Mode::from_native(mode);
                self.state.setpoint_c10 = setpoint_c10(setpoint);
                self.state.fan = FanSpeed::from_native(fan);
                self.settle_compressor();
                info!("Basic state now: power {}, mode {}, setpoint {}, fan {}",
                    self.state.power_on, self.state.mode, self.state.setpoint_c10, self.state.fan);
                true
            },
            (Some([b'D', b'5']), &[flags, ..]) => {
                self.state.swing_v = flags & 0b01 != 0;
                self.state.swing_h = flags & 0b10 != 0;
                info!("Swing now: H:{} V:{}", self.state.swing_h, self.state.swing_v);
                true
            },
            _ => false,
        }
    }

    fn settle_compressor(&mut self) {
        if !self.state.power_on || self.state.mode == Mode::Fan {
            self.compressor_hz = 0;
        } else if self.compressor_hz == 0 {
            self.compressor_hz = 30;
        }
    }

    /// React to something received from the controller.
    pub fn handle(&mut self, rx: RxFrame) -> Vec<TxFrame> {
        match rx {
            // the controller acknowledging one of our replies
            RxFrame::Ack => vec![],
            RxFrame::Nak => {
                warn!("Controller rejected a reply");
                vec![]
            },
            RxFrame::Unexpected(byte) => {
                debug!("Ignoring stray byte {byte:#04x}");
                vec![]
            },
            RxFrame::Corrupted(payload) => {
                warn!("Corrupted frame from controller: {}", str_repr(&payload));
                vec![TxFrame::Nak]
            },
            RxFrame::Frame(frame) => {
                if let Some(reply) = self.answer(frame.payload()) {
                    debug!("Query {} -> {}", frame, str_repr(&reply));
                    return vec![TxFrame::Ack, Frame::new(reply).into()];
                }

                if self.write(&frame) {
                    return vec![TxFrame::Ack];
                }

                warn!("Unsupported frame {}", frame);
                vec![TxFrame::Nak]
            },
        }
    }

    /// Random walk of the sensor values.
    pub fn drift<R: Rng>(&mut self, rng: &mut R) {
        let state = &mut self.state;

        state.temp_inside_c10 = (state.temp_inside_c10 + rng.gen_range(-2..=2)).clamp(-99, 450);
        state.temp_outside_c10 = (state.temp_outside_c10 + rng.gen_range(-3..=3)).clamp(-300, 500);
        state.temp_coil_c10 = (state.temp_coil_c10 + rng.gen_range(-5..=5)).clamp(-99, 700);

        if self.compressor_hz > 0 {
            self.compressor_hz = (self.compressor_hz as i16 + rng.gen_range(-4..=4)).clamp(10, 120) as u16;
        }
        state.fan_rpm = if state.power_on { rng.gen_range(90..=130) * 10 } else { 0 };
        state.idle = self.compressor_hz == 0;
    }
}


#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::protocol::queries::QUERY_LIST;
    use crate::protocol::responses::Response;

    fn reply(emulator: &mut UnitEmulator, payload: &[u8]) -> Vec<TxFrame> {
        emulator.handle(RxFrame::Frame(Frame::new(payload)))
    }

    #[test]
    fn test_numeric() {
        assert_eq!(&numeric(235), b"532+");
        assert_eq!(&numeric(-50), b"050-");
        assert_eq!(&numeric(1234), b"999+");
    }

    #[test]
    fn test_answers_every_query() {
        let mut emulator = UnitEmulator::new();
        let mut device = DeviceState::default();

        for query in QUERY_LIST {
            let tx = reply(&mut emulator, query.code());
            let [TxFrame::Ack, TxFrame::Frame(frame)] = &tx[..] else { panic!("{query}: {tx:?}") };
            assert_eq!(frame.header(), Some(query.response_header()));

            let response = Response::try_from(frame).expect("decodable reply");
            device.apply(&response);
        }

        assert!(device.power_on);
        assert_eq!(device.mode, Mode::Heat);
        assert_eq!(device.setpoint_c10, 230);
        assert_eq!(device.temp_inside_c10, 205);
        assert_eq!(device.temp_outside_c10, 85);
        assert_eq!(device.fan_rpm, 1150);
        assert!(!device.idle);
    }

    #[test]
    fn test_applies_writes() {
        let mut emulator = UnitEmulator::new();

        let tx = reply(&mut emulator, &[b'D', b'1', b'0', b'3', setpoint_byte(210), b'5']);
        assert_eq!(tx, vec![TxFrame::Ack]);
        assert!(!emulator.state.power_on);
        assert_eq!(emulator.state.mode, Mode::Cool);
        assert_eq!(emulator.state.setpoint_c10, 210);
        assert_eq!(emulator.state.fan, FanSpeed::Speed3);
        assert_eq!(emulator.compressor_hz, 0);

        assert_eq!(reply(&mut emulator, b"D57?00"), vec![TxFrame::Ack]);
        assert!(emulator.state.swing_h && emulator.state.swing_v);

        let tx = reply(&mut emulator, b"F5");
        assert_eq!(tx[1], TxFrame::Frame(Frame::new(&b"G57?00"[..])));
    }

    #[test]
    fn test_rejects_unknown() {
        let mut emulator = UnitEmulator::new();

        assert_eq!(reply(&mut emulator, b"FZ"), vec![TxFrame::Nak]);
        assert_eq!(reply(&mut emulator, b"D1"), vec![TxFrame::Nak]);
        assert_eq!(emulator.handle(RxFrame::Corrupted(vec![])), vec![TxFrame::Nak]);
        assert!(emulator.handle(RxFrame::Ack).is_empty());
        assert!(emulator.handle(RxFrame::Unexpected(0x41)).is_empty());
    }

    #[test]
    fn test_drift_stays_in_range() {
        let mut emulator = UnitEmulator::new();
        let mut rng = StdRng::seed_from_u64(21);

        for _ in 0..1000 {
            emulator.drift(&mut rng);
            assert!((-99..=450).contains(&emulator.state.temp_inside_c10));
            assert!((10..=120).contains(&emulator.compressor_hz));
            assert!(!emulator.state.idle);
        }
    }
}
