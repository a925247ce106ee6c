//! Single reliable ordered control channel: panel lifecycle events, layout
//! updates, and user action dispatch, per spec §4.5.

pub mod protocol;
pub mod session;

pub use protocol::{ControlEvent, ControlEventCode, OutboundControlMessage, PanelSummary};
pub use session::{ConnectionState, ControlSession, ReconnectPolicy};
