//! Per-panel wire endpoint state machine, per spec §4.2.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::panel::protocol::{
    encode_connect_panel, encode_create_panel, encode_pause_stream, encode_request_keyframe,
    encode_resume_stream,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelSessionState {
    Idle,
    Opening,
    CreatePending,
    ConnectPending,
    Streaming,
    Paused,
    Closed,
}

/// A resize event PanelSession hands to ControlSession to encode and send
/// (the wire message itself is owned by ControlSession per §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequest {
    pub server_id: u32,
    pub width: u16,
    pub height: u16,
}

pub struct PanelSession {
    state: PanelSessionState,
    server_id: Option<u32>,
    last_reported_size: Option<(u16, u16)>,
}

impl PanelSession {
    pub fn new() -> Self {
        Self {
            state: PanelSessionState::Idle,
            server_id: None,
            last_reported_size: None,
        }
    }

    pub fn state(&self) -> PanelSessionState {
        self.state
    }

    pub fn server_id(&self) -> Option<u32> {
        self.server_id
    }

    /// Open a brand new panel (no known `serverId`).
    pub fn open_create(&mut self, width: u16, height: u16, scale: f32) -> Result<Bytes> {
        if self.state != PanelSessionState::Idle {
            return Err(Error::user("panel session already opened"));
        }
        self.state = PanelSessionState::CreatePending;
        Ok(encode_create_panel(width, height, scale))
    }

    /// Reattach to a panel restored from a layout snapshot.
    pub fn open_connect(&mut self, server_id: u32) -> Result<Bytes> {
        if self.state != PanelSessionState::Idle {
            return Err(Error::user("panel session already opened"));
        }
        self.server_id = Some(server_id);
        self.state = PanelSessionState::ConnectPending;
        Ok(encode_connect_panel(server_id))
    }

    /// The server assigned (or confirmed) a `serverId`; transition to streaming.
    pub fn bind(&mut self, server_id: u32) -> Result<()> {
        match self.state {
            PanelSessionState::CreatePending | PanelSessionState::ConnectPending => {
                self.server_id = Some(server_id);
                self.state = PanelSessionState::Streaming;
                Ok(())
            }
            _ => Err(Error::protocol(format!(
                "cannot bind panel in state {:?}",
                self.state
            ))),
        }
    }

    /// Tab deactivated: suppress rendering but keep input/control flowing.
    pub fn pause(&mut self) -> Result<Bytes> {
        if self.state != PanelSessionState::Streaming {
            return Err(Error::protocol("pause requires an active stream"));
        }
        self.state = PanelSessionState::Paused;
        Ok(encode_pause_stream())
    }

    /// Tab reactivated: resume, then request a fresh keyframe.
    pub fn resume(&mut self) -> Result<[Bytes; 2]> {
        if self.state != PanelSessionState::Paused {
            return Err(Error::protocol("resume requires a paused stream"));
        }
        self.state = PanelSessionState::Streaming;
        Ok([encode_resume_stream(), encode_request_keyframe()])
    }

    pub fn request_keyframe(&self) -> Bytes {
        encode_request_keyframe()
    }

    pub fn close(&mut self) {
        self.state = PanelSessionState::Closed;
    }

    /// Debounced size observer: returns a resize event only if `(w, h)`
    /// differs from the last reported size. Debouncing itself (one
    /// report per 16ms of stability) is the caller's responsibility, since it
    /// needs a real clock/timer this type intentionally does not own.
    pub fn report_size(&mut self, width: u16, height: u16) -> Option<ResizeRequest> {
        if self.last_reported_size == Some((width, height)) {
            return None;
        }
        self.last_reported_size = Some((width, height));
        self.server_id.map(|server_id| ResizeRequest {
            server_id,
            width,
            height,
        })
    }
}

impl Default for PanelSession {
    fn default() -> Self {
        Self::new()
    }
}
