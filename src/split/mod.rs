//! Per-tab binary split tree of panels.

pub mod tree;

pub use tree::{Direction, Orientation, PanelId, Rect, SplitNode, SplitTree};
