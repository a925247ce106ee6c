//! Outbound panel-stream wire messages, per spec §4.2.

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

bitflags! {
    /// shift=1, ctrl=2, alt=4, super/meta=8.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
        const SUPER = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    Other(u8),
}

impl MouseButton {
    fn to_byte(self) -> u8 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
            MouseButton::Other(b) => b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseState {
    Down,
    Up,
}

/// First byte of every outbound panel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PanelMessageType {
    CreatePanel = 0x01,
    ConnectPanel = 0x02,
    KeyInput = 0x10,
    MouseInput = 0x11,
    MouseMove = 0x12,
    MouseScroll = 0x13,
    TextInput = 0x14,
    RequestKeyframe = 0x20,
    PauseStream = 0x21,
    ResumeStream = 0x22,
}

/// `[width:2][height:2][scale:f32 LE]` — sent on open when `serverId` is unknown.
pub fn encode_create_panel(width: u16, height: u16, scale: f32) -> Bytes {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(PanelMessageType::CreatePanel as u8);
    buf.put_u16_le(width);
    buf.put_u16_le(height);
    buf.put_f32_le(scale);
    buf.freeze()
}

/// `[serverId:4 LE]` — sent on open when reattaching to a known panel.
pub fn encode_connect_panel(server_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(PanelMessageType::ConnectPanel as u8);
    buf.put_u32_le(server_id);
    buf.freeze()
}

/// `code` is forwarded as an opaque server-recognized identifier and must
/// never be transformed (spec §9 open question resolution).
pub fn encode_key_input(action: KeyAction, mods: Modifiers, code: &str, text: &str) -> Bytes {
    let code_bytes = code.as_bytes();
    let text_bytes = text.as_bytes();
    let mut buf = BytesMut::with_capacity(4 + code_bytes.len() + text_bytes.len());
    buf.put_u8(PanelMessageType::KeyInput as u8);
    buf.put_u8(if action == KeyAction::Press { 1 } else { 0 });
    buf.put_u8(mods.bits());
    buf.put_u8(code_bytes.len() as u8);
    buf.put_slice(code_bytes);
    buf.put_u8(text_bytes.len() as u8);
    buf.put_slice(text_bytes);
    buf.freeze()
}

pub fn encode_mouse_input(
    x: f64,
    y: f64,
    button: MouseButton,
    state: MouseState,
    mods: Modifiers,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(20);
    buf.put_u8(PanelMessageType::MouseInput as u8);
    buf.put_f64_le(x);
    buf.put_f64_le(y);
    buf.put_u8(button.to_byte());
    buf.put_u8(if state == MouseState::Down { 1 } else { 0 });
    buf.put_u8(mods.bits());
    buf.freeze()
}

pub fn encode_mouse_move(x: f64, y: f64, mods: Modifiers) -> Bytes {
    let mut buf = BytesMut::with_capacity(18);
    buf.put_u8(PanelMessageType::MouseMove as u8);
    buf.put_f64_le(x);
    buf.put_f64_le(y);
    buf.put_u8(mods.bits());
    buf.freeze()
}

pub fn encode_mouse_scroll(x: f64, y: f64, dx: f64, dy: f64, mods: Modifiers) -> Bytes {
    let mut buf = BytesMut::with_capacity(34);
    buf.put_u8(PanelMessageType::MouseScroll as u8);
    buf.put_f64_le(x);
    buf.put_f64_le(y);
    buf.put_f64_le(dx);
    buf.put_f64_le(dy);
    buf.put_u8(mods.bits());
    buf.freeze()
}

pub fn encode_text_input(text: &str) -> Bytes {
    let bytes = text.as_bytes();
    let mut buf = BytesMut::with_capacity(1 + bytes.len());
    buf.put_u8(PanelMessageType::TextInput as u8);
    buf.put_slice(bytes);
    buf.freeze()
}

pub fn encode_request_keyframe() -> Bytes {
    Bytes::from_static(&[PanelMessageType::RequestKeyframe as u8])
}

pub fn encode_pause_stream() -> Bytes {
    Bytes::from_static(&[PanelMessageType::PauseStream as u8])
}

pub fn encode_resume_stream() -> Bytes {
    Bytes::from_static(&[PanelMessageType::ResumeStream as u8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn create_panel_layout_matches_spec() {
        let msg = encode_create_panel(800, 600, 1.5);
        let mut b = msg;
        assert_eq!(b.get_u8(), 0x01);
        assert_eq!(b.get_u16_le(), 800);
        assert_eq!(b.get_u16_le(), 600);
        assert_eq!(b.get_f32_le(), 1.5);
        assert!(!b.has_remaining());
    }

    #[test]
    fn key_input_carries_opaque_code_and_text() {
        let msg = encode_key_input(KeyAction::Press, Modifiers::SHIFT | Modifiers::CTRL, "KeyA", "a");
        let mut b = msg;
        assert_eq!(b.get_u8(), 0x10);
        assert_eq!(b.get_u8(), 1);
        assert_eq!(b.get_u8(), Modifiers::SHIFT.bits() | Modifiers::CTRL.bits());
        let code_len = b.get_u8() as usize;
        let code = b.copy_to_bytes(code_len);
        assert_eq!(&code[..], b"KeyA");
        let text_len = b.get_u8() as usize;
        let text = b.copy_to_bytes(text_len);
        assert_eq!(&text[..], b"a");
    }

    #[test]
    fn request_keyframe_is_a_single_byte() {
        assert_eq!(&encode_request_keyframe()[..], &[0x20]);
    }
}
