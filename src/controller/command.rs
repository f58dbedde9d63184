use std::time::Instant;

use tracing::{debug, error, info};

use crate::error::{Result, S21Error};
use crate::protocol::codec::{ACK, NAK};
use crate::protocol::commands::PendingCommand;

use super::poll::PollCycle;
use super::{Effect, Step, BYTE_TIMEOUT, QUIESCE_DELAY};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Idle,
    /// Waiting for an interrupted poll to go quiet on the line
    Quiesce {
        since: Instant
    },
    SendCommand,
    AwaitAck {
        since: Instant
    },
}

/// Sends a single write command, preempting any poll in progress.
#[derive(Debug)]
pub struct CommandCycle {
    state: CommandState,
    pending: Option<PendingCommand>,
}

impl Default for CommandCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandCycle {
    pub fn new() -> Self {
        Self {
            state: CommandState::Idle,
            pending: None,
        }
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == CommandState::Idle
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    /// Bytes are taken while quiescing (and thrown away) and while awaiting the ACK.
    pub fn wants_byte(&self) -> bool {
        matches!(self.state, CommandState::Quiesce { .. } | CommandState::AwaitAck { .. })
    }

    /// Accept `pending` for sending, interrupting `poll` if it is mid-cycle.
    pub fn submit(&mut self, pending: PendingCommand, poll: &mut PollCycle, now: Instant) -> Result<()> {
        if !self.is_idle() {
            return Err(S21Error::CommandBusy);
        }

        if poll.is_idle() {
            self.state = CommandState::SendCommand;
        } else {
            debug!("An update is in progress, waiting before sending command");
            poll.interrupt();
            self.state = CommandState::Quiesce { since: now };
        }

        self.pending = Some(pending);
        Ok(())
    }

    pub fn step(&mut self, input: Option<u8>, now: Instant) -> Step {
        let (state, step) = self.transition(self.state, input, now);
        self.state = state;
        step
    }

    fn transition(&mut self, state: CommandState, input: Option<u8>, now: Instant) -> (CommandState, Step) {
        match state {
            CommandState::Idle => (CommandState::Idle, Step::Wait),

            CommandState::Quiesce { since } => {
                if let Some(byte) = input {
                    debug!("Dropping {byte:#04x} left over from interrupted update");
                    return (state, Step::done());
                }

                if now.saturating_duration_since(since) <= QUIESCE_DELAY {
                    return (state, Step::Wait);
                }

                (CommandState::SendCommand, Step::done())
            },

            CommandState::SendCommand => {
                let Some(pending) = &self.pending else {
                    return (CommandState::Idle, Step::done());
                };

                debug!("Sending AC command {}", pending);
                let effects = vec![Effect::DiscardInput, Effect::Write(pending.frame.to_wire())];
                (CommandState::AwaitAck { since: now }, Step::Next(effects))
            },

            CommandState::AwaitAck { since } => {
                let result = match input {
                    Some(ACK) => Ok(()),
                    Some(NAK) => Err(S21Error::Nak),
                    Some(byte) => Err(S21Error::UnexpectedByte(byte)),
                    None if now.saturating_duration_since(since) > BYTE_TIMEOUT => Err(S21Error::AckTimeout),
                    None => return (state, Step::Wait),
                };

                let Some(pending) = self.pending.take() else {
                    return (CommandState::Idle, Step::done());
                };

                match &result {
                    Ok(()) => info!("Command {} acknowledged", pending),
                    Err(err) => error!("Command {} failed: {}", pending, err),
                }

                let effects = vec![
                    Effect::CommandSettled { command: pending.command, result },
                    Effect::RefreshNow,
                ];
                (CommandState::Idle, Step::Next(effects))
            },
        }
    }
}
