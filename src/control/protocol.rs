//! Control-stream wire messages, per spec §4.5.
//!
//! Inbound events may arrive as plain JSON text or as a binary frame whose
//! first byte is the event code and whose remaining bytes are that event's
//! JSON body; the client accepts both and the binary form takes precedence
//! where both exist for the same logical event. Outbound messages (client ->
//! server) are always textual JSON, since nothing in the contract requires
//! a compact binary encoding for the handful of low-frequency action
//! messages the core emits.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlEventCode {
    PanelList = 0x01,
    PanelCreated = 0x02,
    PanelClosed = 0x03,
    PanelTitle = 0x04,
    PanelPwd = 0x05,
    PanelBell = 0x06,
    LayoutUpdate = 0x07,
    Clipboard = 0x08,
    InspectorState = 0x09,
    AuthState = 0x0A,
    SessionList = 0x0B,
    ShareLinks = 0x0C,
    PanelNotification = 0x0D,
}

impl ControlEventCode {
    fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => Self::PanelList,
            0x02 => Self::PanelCreated,
            0x03 => Self::PanelClosed,
            0x04 => Self::PanelTitle,
            0x05 => Self::PanelPwd,
            0x06 => Self::PanelBell,
            0x07 => Self::LayoutUpdate,
            0x08 => Self::Clipboard,
            0x09 => Self::InspectorState,
            0x0A => Self::AuthState,
            0x0B => Self::SessionList,
            0x0C => Self::ShareLinks,
            0x0D => Self::PanelNotification,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSummary {
    pub server_id: u32,
    pub pwd: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    PanelList { panels: Vec<PanelSummary> },
    PanelCreated { server_id: u32, pwd: Option<String> },
    PanelClosed { server_id: u32 },
    PanelTitle { server_id: u32, title: String },
    PanelPwd { server_id: u32, pwd: String },
    PanelBell { server_id: u32 },
    LayoutUpdate { snapshot: serde_json::Value },
    Clipboard { text: String },
    InspectorState { server_id: u32, visible: bool },
    AuthState { authenticated: bool, reason: Option<String> },
    SessionList { sessions: Vec<String> },
    ShareLinks { links: Vec<String> },
    PanelNotification { server_id: u32, message: String },
}

impl ControlEvent {
    fn code(&self) -> ControlEventCode {
        match self {
            ControlEvent::PanelList { .. } => ControlEventCode::PanelList,
            ControlEvent::PanelCreated { .. } => ControlEventCode::PanelCreated,
            ControlEvent::PanelClosed { .. } => ControlEventCode::PanelClosed,
            ControlEvent::PanelTitle { .. } => ControlEventCode::PanelTitle,
            ControlEvent::PanelPwd { .. } => ControlEventCode::PanelPwd,
            ControlEvent::PanelBell { .. } => ControlEventCode::PanelBell,
            ControlEvent::LayoutUpdate { .. } => ControlEventCode::LayoutUpdate,
            ControlEvent::Clipboard { .. } => ControlEventCode::Clipboard,
            ControlEvent::InspectorState { .. } => ControlEventCode::InspectorState,
            ControlEvent::AuthState { .. } => ControlEventCode::AuthState,
            ControlEvent::SessionList { .. } => ControlEventCode::SessionList,
            ControlEvent::ShareLinks { .. } => ControlEventCode::ShareLinks,
            ControlEvent::PanelNotification { .. } => ControlEventCode::PanelNotification,
        }
    }

    /// Encode as a binary-tagged frame: `[code:1][json body]`.
    pub fn encode_binary(&self) -> Result<Vec<u8>> {
        let mut out = vec![self.code() as u8];
        out.extend(serde_json::to_vec(self)?);
        Ok(out)
    }

    /// Decode either representation. Binary-tagged frames (first byte is a
    /// known event code) are tried first; anything else falls back to a
    /// whole-message JSON parse with a `"type"` discriminant.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if let Some(&first) = raw.first() {
            if ControlEventCode::from_byte(first).is_some() {
                return serde_json::from_slice(&raw[1..])
                    .map_err(|e| Error::protocol(format!("malformed binary control event: {e}")));
            }
        }
        serde_json::from_slice(raw).map_err(|e| Error::protocol(format!("malformed control event: {e}")))
    }
}

/// Client -> server control messages; always textual JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundControlMessage {
    FocusPanel { server_id: u32 },
    ClosePanel { server_id: u32 },
    ResizePanel { server_id: u32, width: u16, height: u16 },
    ViewAction { server_id: u32, action: String },
    InspectorSubscribe { server_id: u32, tab: Option<String> },
    InspectorUnsubscribe { server_id: u32, tab: Option<String> },
    SetOverviewOpen { open: bool },
}

impl OutboundControlMessage {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("OutboundControlMessage always serializes")
    }
}
