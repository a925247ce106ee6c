//! Per-panel wire endpoint: outbound message encoding and the session
//! lifecycle state machine.

pub mod protocol;
pub mod session;

pub use protocol::{
    encode_connect_panel, encode_create_panel, encode_key_input, encode_mouse_input,
    encode_mouse_move, encode_mouse_scroll, encode_pause_stream, encode_request_keyframe,
    encode_resume_stream, encode_text_input, KeyAction, Modifiers, MouseButton, MouseState,
    PanelMessageType,
};
pub use session::{PanelSession, PanelSessionState, ResizeRequest};
