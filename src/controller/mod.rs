use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Result, S21Error};
use crate::protocol::commands::{Command, CommandRequest, PendingCommand};
use crate::protocol::state::DeviceState;

pub mod command;
pub mod poll;
pub mod transport;

use command::CommandCycle;
use poll::PollCycle;


/// Longest wait for an ACK, or between two bytes of a frame.
pub const BYTE_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause after each query before sending the next.
pub const INTER_QUERY_DELAY: Duration = Duration::from_millis(10);

/// Grace period after interrupting a poll before a command is written.
pub const QUIESCE_DELAY: Duration = Duration::from_millis(100);

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(15);


/// Non-blocking byte link to the unit.
pub trait Transport {
    fn available(&self) -> bool;

    /// Next received byte, if any.
    fn read(&mut self) -> Option<u8>;

    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Drop anything already received.
    fn discard(&mut self) {
        while self.read().is_some() {}
    }
}

/// Receives everything the controller has to tell the outside world.
pub trait Reporter {
    fn state_changed(&mut self, state: &DeviceState);

    fn command_settled(&mut self, command: &Command, result: &std::result::Result<(), S21Error>);

    /// A request was refused before anything reached the unit.
    fn request_rejected(&mut self, _request: &str, _reason: &str) {}

    fn period_changed(&mut self, _period: Duration) {}
}


/// Side effects requested by a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Write(Vec<u8>),
    DiscardInput,
    Report(DeviceState),
    CommandSettled {
        command: Command,
        result: std::result::Result<(), S21Error>
    },
    /// Start a poll on the next tick, regardless of the period
    RefreshNow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing more can happen until time passes or a byte arrives
    Wait,
    Next(Vec<Effect>),
}

impl Step {
    pub fn done() -> Self {
        Step::Next(vec![])
    }
}


/// Owns the device state and schedules the poll and command cycles over a
/// single transport.
pub struct Controller<T, R> {
    transport: T,
    reporter: R,
    device: DeviceState,
    poll: PollCycle,
    command: CommandCycle,
    period: Duration,
    last_trigger: Option<Instant>,
}

impl<T: Transport, R: Reporter> Controller<T, R> {
    pub fn new(transport: T, reporter: R) -> Self {
        Self {
            transport,
            reporter,
            device: DeviceState::default(),
            poll: PollCycle::new(),
            command: CommandCycle::new(),
            period: DEFAULT_PERIOD,
            last_trigger: None,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn device(&self) -> &DeviceState {
        &self.device
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn set_period(&mut self, period: Duration) {
        info!("Update period set to {}s", period.as_secs());
        self.period = period;
        self.reporter.period_changed(period);
    }

    pub fn poll(&self) -> &PollCycle {
        &self.poll
    }

    pub fn command(&self) -> &CommandCycle {
        &self.command
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut R {
        &mut self.reporter
    }

    /// Start a poll on the next tick.
    pub fn request_poll(&mut self) {
        self.last_trigger = None;
    }

    /// Validate `request` and queue it for sending.
    ///
    /// The frame is built now, from the state as currently known.
    pub fn submit(&mut self, request: CommandRequest, now: Instant) -> Result<()> {
        let command = Command::try_from(request)?;
        let pending = PendingCommand::new(command, &self.device);

        self.command.submit(pending, &mut self.poll, now)?;
        self.last_trigger = Some(now);
        Ok(())
    }

    fn trigger_due(&self, now: Instant) -> bool {
        match self.last_trigger {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.period,
        }
    }

    /// Run every transition possible at `now`.
    pub fn tick(&mut self, now: Instant) {
        if self.command.is_idle() && self.trigger_due(now) {
            self.last_trigger = Some(now);
            self.poll.start(now);
        }

        loop {
            let step = if !self.command.is_idle() {
                let input = if self.command.wants_byte() { self.transport.read() } else { None };
                self.command.step(input, now)
            } else {
                let input = if self.poll.wants_byte() { self.transport.read() } else { None };
                self.poll.step(input, now, &mut self.device)
            };

            match step {
                Step::Wait => break,
                Step::Next(effects) => {
                    for effect in effects {
                        self.perform(effect);
                    }
                },
            }
        }
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::Write(bytes) => {
                if let Err(err) = self.transport.write(&bytes) {
                    warn!("Failed to write to S21: {err}");
                }
            },
            Effect::DiscardInput => self.transport.discard(),
            Effect::Report(state) => self.reporter.state_changed(&state),
            Effect::CommandSettled { command, result } => self.reporter.command_settled(&command, &result),
            Effect::RefreshNow => {
                debug!("Refreshing state after command");
                self.request_poll();
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::{encode, ACK};
    use super::transport::BufferedTransport;

    #[derive(Default)]
    struct Recorder {
        states: Vec<DeviceState>,
        settled: Vec<(Command, std::result::Result<(), S21Error>)>,
    }

    impl Reporter for Recorder {
        fn state_changed(&mut self, state: &DeviceState) {
            self.states.push(state.clone());
        }

        fn command_settled(&mut self, command: &Command, result: &std::result::Result<(), S21Error>) {
            self.settled.push((*command, result.clone()));
        }
    }

    fn ms(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn test_first_tick_starts_poll() {
        let start = Instant::now();
        let mut controller = Controller::new(BufferedTransport::new(), Recorder::default());

        controller.tick(start);
        assert_eq!(controller.transport_mut().take_written(), encode(b"F1"));
        assert!(!controller.poll().is_idle());
    }

    #[test]
    fn test_stale_input_discarded_before_query() {
        let start = Instant::now();
        let mut transport = BufferedTransport::new();
        transport.feed(&[ACK, b'x']);
        let mut controller = Controller::new(transport, Recorder::default());

        controller.tick(start);
        // the leftover ACK must not count as the reply to F1
        assert!(!controller.transport().available());
        assert_eq!(controller.poll().index(), 0);
        assert!(controller.poll().wants_byte());
    }

    #[test]
    fn test_invalid_command_rejected_synchronously() {
        let start = Instant::now();
        let mut controller = Controller::new(BufferedTransport::new(), Recorder::default());

        assert!(matches!(controller.submit(CommandRequest::Mode(9), start), Err(S21Error::InvalidInput(_))));
        assert!(controller.command().is_idle());
    }

    #[test]
    fn test_command_preempts_poll_and_refreshes() {
        let start = Instant::now();
        let mut controller = Controller::new(BufferedTransport::new(), Recorder::default());
        controller.tick(start);
        controller.transport_mut().take_written();

        controller.submit(CommandRequest::Power(true), ms(start, 5)).expect("submit");
        assert!(controller.poll().is_idle());

        controller.tick(ms(start, 50));
        assert!(controller.transport_mut().take_written().is_empty(), "nothing written while quiescing");

        controller.tick(ms(start, 106));
        let written = controller.transport_mut().take_written();
        assert_eq!(written[1..3], *b"D1");

        controller.transport_mut().feed(&[ACK]);
        controller.tick(ms(start, 120));
        assert_eq!(controller.reporter().settled, vec![(Command::Power(true), Ok(()))]);

        // the refresh poll starts straight away, without waiting for the period
        controller.tick(ms(start, 121));
        assert_eq!(controller.transport_mut().take_written(), encode(b"F1"));
    }

    #[test]
    fn test_period_elapses_before_next_poll() {
        let start = Instant::now();
        let mut controller = Controller::new(BufferedTransport::new(), Recorder::default())
            .with_period(Duration::from_secs(1));

        // let every query time out
        let mut now = start;
        controller.tick(now);
        while !controller.poll().is_idle() {
            now += Duration::from_millis(5);
            controller.tick(now);
        }
        controller.transport_mut().take_written();
        assert!(controller.reporter().states.is_empty());

        controller.tick(ms(start, 1000));
        assert!(controller.transport_mut().take_written().is_empty());

        controller.tick(ms(start, 1001));
        assert_eq!(controller.transport_mut().take_written(), encode(b"F1"));
    }
}
