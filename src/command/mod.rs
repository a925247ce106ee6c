//! CommandBus: routes stable action strings to local controller operations
//! or server-bound view actions, per spec §4.9.

use crate::control::OutboundControlMessage;

/// Actions beginning with `_` that the client handles entirely on its own,
/// without involving the server. The leading underscore is stripped before
/// matching against this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAction {
    SplitRight,
    SplitDown,
    SplitLeft,
    SplitUp,
    NewTab,
    CloseTab,
    Close,
    ZoomSplit,
    SelectSplitUp,
    SelectSplitDown,
    SelectSplitLeft,
    SelectSplitRight,
    ToggleFullscreen,
    NextTab,
    PrevTab,
}

impl LocalAction {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "split_right" => Self::SplitRight,
            "split_down" => Self::SplitDown,
            "split_left" => Self::SplitLeft,
            "split_up" => Self::SplitUp,
            "new_tab" => Self::NewTab,
            "close_tab" => Self::CloseTab,
            "close" => Self::Close,
            "zoom_split" => Self::ZoomSplit,
            "select_split_up" => Self::SelectSplitUp,
            "select_split_down" => Self::SelectSplitDown,
            "select_split_left" => Self::SelectSplitLeft,
            "select_split_right" => Self::SelectSplitRight,
            "toggle_fullscreen" => Self::ToggleFullscreen,
            "next_tab" => Self::NextTab,
            "prev_tab" => Self::PrevTab,
            _ => return None,
        })
    }
}

/// Actions known to be meaningful as a server-bound `view_action`. The
/// client never interprets these beyond forwarding; this table only bounds
/// which strings are worth forwarding at all.
const REMOTE_ACTIONS: &[&str] = &[
    "copy_to_clipboard",
    "paste_from_clipboard",
    "increase_font_size",
    "decrease_font_size",
    "reset_font_size",
    "clear_scrollback",
    "select_all",
    "find",
    "toggle_bell_mute",
];

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Handled entirely on the client; `argument` is the optional `:`-suffix.
    Local { action: LocalAction, argument: Option<String> },
    /// Forwarded to the server as a `view_action` on the active panel.
    Remote(OutboundControlMessage),
    /// Unknown action, or a remote action with no active panel to target.
    /// The caller has already had this logged; nothing further to do.
    Dropped,
}

fn split_action(raw: &str) -> (&str, Option<String>) {
    match raw.split_once(':') {
        Some((name, argument)) => (name, Some(argument.to_string())),
        None => (raw, None),
    }
}

/// Stateless dispatcher: one call per action string, independent of history.
pub struct CommandBus;

impl CommandBus {
    pub fn new() -> Self {
        Self
    }

    /// Dispatch one action string. `active_server_id` is the server id of
    /// the currently focused panel, needed to address a forwarded
    /// `view_action`; remote actions drop silently (after logging) when
    /// there is no active panel.
    pub fn dispatch(&self, raw: &str, active_server_id: Option<u32>) -> CommandOutcome {
        if let Some(stripped) = raw.strip_prefix('_') {
            let (name, _rest) = split_action(stripped);
            return match LocalAction::from_name(name) {
                Some(action) => {
                    let (_, argument) = split_action(stripped);
                    CommandOutcome::Local { action, argument }
                }
                None => {
                    tracing::warn!(action = raw, "unknown local action");
                    CommandOutcome::Dropped
                }
            };
        }

        let (name, _) = split_action(raw);
        if !REMOTE_ACTIONS.contains(&name) {
            tracing::warn!(action = raw, "unknown action");
            return CommandOutcome::Dropped;
        }

        match active_server_id {
            Some(server_id) => {
                CommandOutcome::Remote(OutboundControlMessage::ViewAction { server_id, action: raw.to_string() })
            }
            None => {
                tracing::warn!(action = raw, "no active panel to target");
                CommandOutcome::Dropped
            }
        }
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_action_strips_leading_underscore() {
        let bus = CommandBus::new();
        assert_eq!(
            bus.dispatch("_split_right", None),
            CommandOutcome::Local { action: LocalAction::SplitRight, argument: None }
        );
        assert_eq!(
            bus.dispatch("_new_tab", Some(3)),
            CommandOutcome::Local { action: LocalAction::NewTab, argument: None }
        );
    }

    #[test]
    fn remote_action_forwards_as_view_action_with_argument() {
        let bus = CommandBus::new();
        let outcome = bus.dispatch("increase_font_size:1", Some(5));
        assert_eq!(
            outcome,
            CommandOutcome::Remote(OutboundControlMessage::ViewAction { server_id: 5, action: "increase_font_size:1".into() })
        );
    }

    #[test]
    fn remote_action_without_active_panel_is_dropped() {
        let bus = CommandBus::new();
        assert_eq!(bus.dispatch("copy_to_clipboard", None), CommandOutcome::Dropped);
    }

    #[test]
    fn unknown_action_is_dropped() {
        let bus = CommandBus::new();
        assert_eq!(bus.dispatch("_not_a_real_action", None), CommandOutcome::Dropped);
        assert_eq!(bus.dispatch("also_not_real", Some(1)), CommandOutcome::Dropped);
    }
}
