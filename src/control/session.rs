//! Control session lifecycle: reconnection backoff and layout authority, per
//! spec §4.5. Transport-agnostic: the embedder drives actual I/O and calls
//! into this type to decide backoff timing and to fold inbound events.

use std::time::Duration;

use crate::control::protocol::{ControlEvent, OutboundControlMessage};
use crate::error::Result;

const BACKOFF_CAP: Duration = Duration::from_secs(1);
const BACKOFF_FLOOR: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
}

/// Exponential backoff capped at one attempt per second, per spec.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    next: Duration,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self { next: BACKOFF_FLOOR }
    }

    /// The delay to wait before the next reconnect attempt, then double it
    /// (capped) for the attempt after that.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(BACKOFF_CAP);
        delay
    }

    pub fn reset(&mut self) {
        self.next = BACKOFF_FLOOR;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ControlSession {
    state: ConnectionState,
    backoff: ReconnectPolicy,
    /// True from a fresh connect/reconnect until the first `panel_list`
    /// arrives, which the caller must treat as authoritative state.
    awaiting_authoritative_snapshot: bool,
}

impl ControlSession {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connected,
            backoff: ReconnectPolicy::new(),
            awaiting_authoritative_snapshot: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The stream closed. Returns the delay to wait before retrying.
    pub fn note_disconnected(&mut self) -> Duration {
        self.state = ConnectionState::Reconnecting;
        self.backoff.next_delay()
    }

    /// A reconnect attempt succeeded.
    pub fn note_reconnected(&mut self) {
        self.state = ConnectionState::Connected;
        self.backoff.reset();
        self.awaiting_authoritative_snapshot = true;
    }

    /// Decode an inbound frame and report whether it is the fresh
    /// `panel_list` that must be treated as authoritative after a reconnect.
    pub fn handle_inbound(&mut self, raw: &[u8]) -> Result<(ControlEvent, bool)> {
        let event = ControlEvent::decode(raw)?;
        let is_authoritative_snapshot =
            self.awaiting_authoritative_snapshot && matches!(event, ControlEvent::PanelList { .. });
        if is_authoritative_snapshot {
            self.awaiting_authoritative_snapshot = false;
        }
        Ok((event, is_authoritative_snapshot))
    }

    pub fn encode_outbound(&self, message: &OutboundControlMessage) -> Vec<u8> {
        message.encode()
    }
}

impl Default for ControlSession {
    fn default() -> Self {
        Self::new()
    }
}
