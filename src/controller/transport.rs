use std::collections::VecDeque;
use std::io;

use super::Transport;


/// In-memory [Transport]: received bytes are fed in from the port reader,
/// written bytes are collected until taken and flushed to the port.
#[derive(Debug, Default)]
pub struct BufferedTransport {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl BufferedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    /// Take everything written since the last call.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }

    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }
}

impl Transport for BufferedTransport {
    fn available(&self) -> bool {
        !self.rx.is_empty()
    }

    fn read(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.tx.extend_from_slice(bytes);
        Ok(())
    }

    fn discard(&mut self) {
        self.rx.clear();
    }
}
