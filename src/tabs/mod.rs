//! Process-wide tab/focus state machine and server layout reconciliation.

pub mod controller;

pub use controller::{
    FocusPanelEvent, LayoutSnapshot, ServerPanelId, ServerTabSnapshot, Tab, TabController, TabId,
};
