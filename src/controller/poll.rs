use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::error::S21Error;
use crate::protocol::codec::{decode_numeric, hex_repr, str_repr, Frame, FramingError, FrameReader, ReadOutcome, ACK, NAK};
use crate::protocol::queries::{Query, QUERY_LIST};
use crate::protocol::responses::Response;
use crate::protocol::state::DeviceState;

use super::{Effect, Step, BYTE_TIMEOUT, INTER_QUERY_DELAY};


#[derive(Debug)]
pub enum PollState {
    Idle,
    SendQuery,
    AwaitAck {
        since: Instant
    },
    ReadFrame {
        reader: FrameReader,
        /// Time of the last byte received (or of the ACK)
        since: Instant
    },
    ParseFrame(Frame),
    InterQueryDelay {
        since: Instant
    },
}

/// Walks [QUERY_LIST] once per trigger, updating the device state.
#[derive(Debug)]
pub struct PollCycle {
    state: PollState,
    index: usize,
    /// Set when any field changed since the last report
    changed: bool,
    started: Option<Instant>,
}

impl Default for PollCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl PollCycle {
    pub fn new() -> Self {
        Self {
            state: PollState::Idle,
            index: 0,
            changed: false,
            started: None,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, PollState::Idle)
    }

    /// Index into [QUERY_LIST] of the query in progress.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    fn query(&self) -> Query {
        QUERY_LIST[self.index]
    }

    /// Is the current state waiting on a byte from the line?
    pub fn wants_byte(&self) -> bool {
        matches!(self.state, PollState::AwaitAck { .. } | PollState::ReadFrame { .. })
    }

    /// Start a new cycle from the first query. Returns `false` if a cycle is
    /// already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if !self.is_idle() {
            error!("AC not ready to start update, still in {:?}", self.state);
            return false;
        }

        debug!("Starting AC update");
        self.index = 0;
        self.started = Some(now);
        self.state = PollState::SendQuery;
        true
    }

    /// Abandon the cycle in progress. The next trigger starts over from the
    /// first query; pending changes are still reported at the end of it.
    pub fn interrupt(&mut self) {
        if !self.is_idle() {
            debug!("Interrupting AC update at query {}", self.query());
        }

        self.state = PollState::Idle;
        self.index = 0;
        self.started = None;
    }

    /// Advance by one transition.
    ///
    /// `input` is the next received byte, only taken when [Self::wants_byte].
    pub fn step(&mut self, input: Option<u8>, now: Instant, device: &mut DeviceState) -> Step {
        let state = std::mem::replace(&mut self.state, PollState::Idle);
        let (state, step) = self.transition(state, input, now, device);
        self.state = state;
        step
    }

    fn transition(&mut self, state: PollState, input: Option<u8>, now: Instant, device: &mut DeviceState) -> (PollState, Step) {
        match state {
            PollState::Idle => (PollState::Idle, Step::Wait),

            PollState::SendQuery => {
                let frame = Frame::query(self.query());
                debug!("Writing query {}", frame);

                let effects = vec![Effect::DiscardInput, Effect::Write(frame.to_wire())];
                (PollState::AwaitAck { since: now }, Step::Next(effects))
            },

            PollState::AwaitAck { since } => match input {
                Some(ACK) => {
                    let reader = FrameReader::new();
                    (PollState::ReadFrame { reader, since: now }, Step::done())
                },
                Some(byte) => {
                    let err = if byte == NAK { S21Error::Nak } else { S21Error::UnexpectedByte(byte) };
                    error!("No ACK from S21 for {} query: {}", self.query(), err);
                    (PollState::InterQueryDelay { since: now }, Step::done())
                },
                None if now.saturating_duration_since(since) > BYTE_TIMEOUT => {
                    error!("Timeout waiting for ACK for query {}: {}", self.query(), S21Error::AckTimeout);
                    (PollState::InterQueryDelay { since: now }, Step::done())
                },
                None => (PollState::AwaitAck { since }, Step::Wait),
            },

            PollState::ReadFrame { mut reader, since } => {
                let Some(byte) = input else {
                    if now.saturating_duration_since(since) > BYTE_TIMEOUT {
                        error!("Timeout waiting frame for query {}: {}", self.query(), S21Error::FrameTimeout);
                        return (PollState::InterQueryDelay { since: now }, Step::done());
                    }
                    return (PollState::ReadFrame { reader, since }, Step::Wait);
                };

                match reader.push(byte) {
                    ReadOutcome::Pending => (PollState::ReadFrame { reader, since: now }, Step::done()),
                    ReadOutcome::Unexpected(ACK) => {
                        error!("Unexpected ACK waiting to read start of frame");
                        (PollState::ReadFrame { reader, since: now }, Step::done())
                    },
                    ReadOutcome::Unexpected(byte) => {
                        error!("Unexpected byte waiting to read start of frame: {byte:#04x}");
                        (PollState::ReadFrame { reader, since: now }, Step::done())
                    },
                    ReadOutcome::Complete(Ok(frame)) => {
                        debug!("Correctly received frame: {} - {}", hex_repr(frame.payload()), frame);
                        (PollState::ParseFrame(frame), Step::Next(vec![Effect::Write(vec![ACK])]))
                    },
                    ReadOutcome::Complete(Err(FramingError::InvalidChecksum { expected, actual, payload })) => {
                        error!("{} from {}", S21Error::ChecksumMismatch { expected, actual }, hex_repr(&payload));
                        (PollState::InterQueryDelay { since: now }, Step::done())
                    },
                    ReadOutcome::Complete(Err(err)) => {
                        error!("Discarding frame for query {}: {}", self.query(), err);
                        (PollState::InterQueryDelay { since: now }, Step::done())
                    },
                }
            },

            PollState::ParseFrame(frame) => {
                match Response::try_from(&frame) {
                    Ok(response) => self.changed |= device.apply(&response),
                    Err(err @ S21Error::UnknownHeader(_)) => {
                        let payload = frame.payload();
                        if payload.first() == Some(&b'S') && payload.len() > 5 {
                            if let Some(c10) = decode_numeric(frame.body()) {
                                debug!("Unknown temp: {} -> {:.1} C", str_repr(payload), c10 as f32 / 10.0);
                            }
                        }
                        warn!("{err}");
                    },
                    Err(err) => warn!("{err}"),
                }

                (PollState::InterQueryDelay { since: now }, Step::done())
            },

            PollState::InterQueryDelay { since } => {
                if now.saturating_duration_since(since) <= INTER_QUERY_DELAY {
                    return (PollState::InterQueryDelay { since }, Step::Wait);
                }

                self.index += 1;
                if self.index < QUERY_LIST.len() {
                    return (PollState::SendQuery, Step::done());
                }

                (PollState::Idle, Step::Next(self.finish(now, device)))
            },
        }
    }

    fn finish(&mut self, now: Instant, device: &DeviceState) -> Vec<Effect> {
        self.index = 0;

        if let Some(started) = self.started.take() {
            info!("Total update time: {:.2}s", now.saturating_duration_since(started).as_secs_f32());
        }
        debug!("AC state:\n{}", device.dump());

        if !self.changed {
            return vec![];
        }

        debug!("Values changed!");
        self.changed = false;
        vec![Effect::Report(device.clone())]
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::codec::{encode, setpoint_byte};
    use crate::protocol::state::Mode;

    fn ms(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    fn feed(poll: &mut PollCycle, bytes: &[u8], now: Instant, device: &mut DeviceState) -> Vec<Effect> {
        let mut effects = vec![];
        for &byte in bytes {
            assert!(poll.wants_byte(), "not expecting {byte:#04x} in {:?}", poll.state());
            if let Step::Next(mut next) = poll.step(Some(byte), now, device) {
                effects.append(&mut next);
            }
        }
        effects
    }

    #[test]
    fn test_trigger_while_busy_is_ignored() {
        let start = Instant::now();
        let mut poll = PollCycle::new();

        assert!(poll.start(start));
        assert!(!poll.start(start));
        assert!(matches!(poll.state(), PollState::SendQuery));
    }

    #[test]
    fn test_query_response() {
        let start = Instant::now();
        let mut device = DeviceState::default();
        let mut poll = PollCycle::new();
        poll.start(start);

        let Step::Next(effects) = poll.step(None, start, &mut device) else { panic!("expected query") };
        assert_eq!(effects, vec![Effect::DiscardInput, Effect::Write(encode(b"F1"))]);

        let mut response = encode(&[b'G', b'1', b'1', b'3', setpoint_byte(220), b'A']);
        response.insert(0, ACK);
        let effects = feed(&mut poll, &response, ms(start, 20), &mut device);
        assert_eq!(effects, vec![Effect::Write(vec![ACK])]);

        assert!(matches!(poll.step(None, ms(start, 20), &mut device), Step::Next(_)));
        assert!(matches!(poll.state(), PollState::InterQueryDelay { .. }));
        assert!(poll.changed());
        assert!(device.power_on);
        assert_eq!(device.mode, Mode::Cool);
        assert_eq!(device.setpoint_c10, 220);

        // quiet period not over yet
        assert_eq!(poll.step(None, ms(start, 25), &mut device), Step::Wait);
        assert_eq!(poll.step(None, ms(start, 31), &mut device), Step::done());
        assert_eq!(poll.index(), 1);
        assert!(matches!(poll.state(), PollState::SendQuery));
    }

    #[test]
    fn test_ack_timeout_advances_once() {
        let start = Instant::now();
        let mut device = DeviceState::default();
        let mut poll = PollCycle::new();
        poll.start(start);
        poll.step(None, start, &mut device);

        assert_eq!(poll.step(None, ms(start, 100), &mut device), Step::Wait);
        assert_eq!(poll.step(None, ms(start, 101), &mut device), Step::done());
        assert!(matches!(poll.state(), PollState::InterQueryDelay { .. }));

        // no second failure transition while waiting
        assert_eq!(poll.step(None, ms(start, 105), &mut device), Step::Wait);
        assert_eq!(poll.step(None, ms(start, 112), &mut device), Step::done());
        assert_eq!(poll.index(), 1);
        assert!(matches!(poll.state(), PollState::SendQuery));
    }

    #[test]
    fn test_nak_skips_query() {
        let start = Instant::now();
        let mut device = DeviceState::default();
        let mut poll = PollCycle::new();
        poll.start(start);
        poll.step(None, start, &mut device);

        feed(&mut poll, &[NAK], start, &mut device);
        assert!(matches!(poll.state(), PollState::InterQueryDelay { .. }));
        assert_eq!(poll.index(), 0);
    }

    #[test]
    fn test_checksum_mismatch_leaves_state_untouched() {
        let start = Instant::now();
        let mut device = DeviceState::default();
        let before = device.clone();
        let mut poll = PollCycle::new();
        poll.start(start);
        poll.step(None, start, &mut device);

        let mut response = encode(&[b'G', b'1', b'1', b'3', setpoint_byte(220), b'A']);
        response[3] = b'0'; // power byte
        response.insert(0, ACK);

        let effects = feed(&mut poll, &response, start, &mut device);
        assert!(effects.is_empty(), "no ACK for a corrupted frame");
        assert!(matches!(poll.state(), PollState::InterQueryDelay { .. }));
        assert_eq!(device, before);
        assert!(!poll.changed());
    }

    #[test]
    fn test_unparseable_reply_is_acked_and_skipped() {
        // unknown header, then replies too short for their header
        for payload in [&b"SN123+"[..], b"G1", b"SH5"] {
            let start = Instant::now();
            let mut device = DeviceState::default();
            let before = device.clone();
            let mut poll = PollCycle::new();
            poll.start(start);
            poll.step(None, start, &mut device);

            let mut response = encode(payload);
            response.insert(0, ACK);

            let effects = feed(&mut poll, &response, start, &mut device);
            assert_eq!(effects, vec![Effect::Write(vec![ACK])], "{}", str_repr(payload));
            assert!(matches!(poll.state(), PollState::ParseFrame(_)));

            assert_eq!(poll.step(None, start, &mut device), Step::done());
            assert!(matches!(poll.state(), PollState::InterQueryDelay { .. }));
            assert_eq!(device, before);
            assert!(!poll.changed());

            // the cycle carries on with the next query
            assert_eq!(poll.step(None, ms(start, 11), &mut device), Step::done());
            assert_eq!(poll.index(), 1);
        }
    }

    #[test]
    fn test_frame_timeout_counts_from_last_byte() {
        let start = Instant::now();
        let mut device = DeviceState::default();
        let mut poll = PollCycle::new();
        poll.start(start);
        poll.step(None, start, &mut device);

        feed(&mut poll, &[ACK], ms(start, 10), &mut device);
        feed(&mut poll, b"\x02SH5", ms(start, 90), &mut device);

        assert_eq!(poll.step(None, ms(start, 150), &mut device), Step::Wait);
        assert_eq!(poll.step(None, ms(start, 191), &mut device), Step::done());
        assert!(matches!(poll.state(), PollState::InterQueryDelay { .. }));
    }

    #[test]
    fn test_interrupt_resets_index() {
        let start = Instant::now();
        let mut device = DeviceState::default();
        let mut poll = PollCycle::new();
        poll.start(start);
        poll.step(None, start, &mut device);
        poll.step(None, ms(start, 101), &mut device);
        poll.step(None, ms(start, 112), &mut device);
        assert_eq!(poll.index(), 1);

        poll.interrupt();
        assert!(poll.is_idle());
        assert_eq!(poll.index(), 0);
        assert_eq!(poll.step(None, ms(start, 200), &mut device), Step::Wait);
    }
}
