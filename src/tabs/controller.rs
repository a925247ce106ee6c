//! Process-wide tab/focus state machine, per spec §4.4.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::split::{Direction, PanelId, SplitNode, SplitTree};

pub type TabId = String;

#[derive(Debug, Clone)]
pub struct Tab {
    pub id: TabId,
    pub title: String,
    pub tree: SplitTree,
}

/// A server-assigned panel id, bound once the server confirms a locally
/// created panel or the panel is restored from a layout snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerPanelId(pub Option<u32>);

/// Control message TabController asks the caller to emit after a focus change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusPanelEvent {
    pub server_id: u32,
}

/// One tab in a server-sent layout snapshot.
#[derive(Debug, Clone)]
pub struct ServerTabSnapshot {
    pub id: TabId,
    pub root: SplitNode,
    pub active_panel_id: Option<PanelId>,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutSnapshot {
    pub tabs: Vec<ServerTabSnapshot>,
    pub active_tab_id: Option<TabId>,
}

pub struct TabController {
    tabs: HashMap<TabId, Tab>,
    panel_server_ids: HashMap<PanelId, ServerPanelId>,
    /// Most-recently-active last: switching away from a tab appends it here.
    lru: Vec<TabId>,
    active_tab: Option<TabId>,
    active_panel: Option<PanelId>,
}

impl TabController {
    pub fn new() -> Self {
        Self {
            tabs: HashMap::new(),
            panel_server_ids: HashMap::new(),
            lru: Vec::new(),
            active_tab: None,
            active_panel: None,
        }
    }

    pub fn active_tab(&self) -> Option<&TabId> {
        self.active_tab.as_ref()
    }

    pub fn active_panel(&self) -> Option<&PanelId> {
        self.active_panel.as_ref()
    }

    pub fn tab(&self, id: &str) -> Option<&Tab> {
        self.tabs.get(id)
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty_state(&self) -> bool {
        self.active_tab.is_none()
    }

    /// Create a new tab rooted at a single panel and make it active.
    pub fn create_tab(&mut self, id: impl Into<TabId>, title: impl Into<String>, initial_panel: PanelId) {
        let id = id.into();
        self.tabs.insert(
            id.clone(),
            Tab {
                id: id.clone(),
                title: title.into(),
                tree: SplitTree::with_single_panel(initial_panel.clone()),
            },
        );
        self.panel_server_ids.insert(initial_panel.clone(), ServerPanelId::default());
        self.switch_active_tab(&id);
        self.active_panel = Some(initial_panel);
    }

    /// A locally initiated split must render before the server confirms: the
    /// new panel is inserted with an unbound server id immediately.
    pub fn split_local(
        &mut self,
        tab_id: &str,
        leaf: &str,
        direction: Direction,
        new_panel: PanelId,
    ) -> Result<()> {
        let tab = self
            .tabs
            .get_mut(tab_id)
            .ok_or_else(|| Error::user(format!("no such tab {tab_id}")))?;
        tab.tree.split(leaf, direction, new_panel.clone())?;
        self.panel_server_ids.insert(new_panel, ServerPanelId::default());
        Ok(())
    }

    /// The server confirmed a tentative local panel's id.
    pub fn bind_panel(&mut self, panel: &str, server_id: u32) -> Result<()> {
        let entry = self
            .panel_server_ids
            .get_mut(panel)
            .ok_or_else(|| Error::protocol(format!("unknown panel {panel}")))?;
        entry.0 = Some(server_id);
        Ok(())
    }

    pub fn server_id_of(&self, panel: &str) -> Option<u32> {
        self.panel_server_ids.get(panel).and_then(|id| id.0)
    }

    /// The server rejected a tentative panel creation: remove it from its
    /// tree if it is still unbound.
    pub fn reject_tentative_panel(&mut self, tab_id: &str, panel: &str) -> Result<()> {
        if self.server_id_of(panel).is_some() {
            return Err(Error::protocol("cannot reject an already-bound panel"));
        }
        let tab = self
            .tabs
            .get_mut(tab_id)
            .ok_or_else(|| Error::user(format!("no such tab {tab_id}")))?;
        let tree_emptied = tab.tree.remove(panel)?;
        self.panel_server_ids.remove(panel);
        if self.active_panel.as_deref() == Some(panel) {
            self.active_panel = None;
        }
        if tree_emptied {
            self.close_tab(tab_id);
        }
        Ok(())
    }

    /// Switching away from the current active tab appends it to LRU history.
    pub fn switch_active_tab(&mut self, tab_id: &str) {
        if let Some(current) = self.active_tab.take() {
            if current != tab_id {
                self.lru.retain(|id| id != &current);
                self.lru.push(current);
            }
        }
        self.lru.retain(|id| id != tab_id);
        self.active_tab = Some(tab_id.to_string());
    }

    /// Close a tab. Returns the newly active tab id, or `None` if the
    /// process entered the empty state.
    pub fn close_tab(&mut self, tab_id: &str) -> Option<TabId> {
        if let Some(tab) = self.tabs.remove(tab_id) {
            for panel in tab.tree.get_all_panels() {
                self.panel_server_ids.remove(&panel);
            }
        }
        self.lru.retain(|id| id != tab_id);

        if self.active_tab.as_deref() != Some(tab_id) {
            return self.active_tab.clone();
        }

        match self.lru.pop() {
            Some(next) => {
                self.active_tab = Some(next.clone());
                self.active_panel = None;
                Some(next)
            }
            None => {
                self.active_tab = None;
                self.active_panel = None;
                None
            }
        }
    }

    /// Set the process-wide active panel; emits a focus event only if the
    /// panel already has a bound server id.
    pub fn set_active_panel(&mut self, panel: PanelId) -> Option<FocusPanelEvent> {
        let server_id = self.server_id_of(&panel);
        self.active_panel = Some(panel);
        server_id.map(|server_id| FocusPanelEvent { server_id })
    }

    /// Reconcile local state against a server-authoritative layout snapshot.
    pub fn reconcile_layout(&mut self, snapshot: LayoutSnapshot) {
        let server_ids: Vec<&TabId> = snapshot.tabs.iter().map(|t| &t.id).collect();
        let local_ids: Vec<TabId> = self.tabs.keys().cloned().collect();
        for id in local_ids {
            if !server_ids.contains(&&id) {
                if let Some(tab) = self.tabs.remove(&id) {
                    for panel in tab.tree.get_all_panels() {
                        self.panel_server_ids.remove(&panel);
                    }
                }
                self.lru.retain(|lru_id| lru_id != &id);
            }
        }

        for server_tab in &snapshot.tabs {
            let mut panel_ids = Vec::new();
            collect_panel_ids(&server_tab.root, &mut panel_ids);
            for panel in &panel_ids {
                self.panel_server_ids.entry(panel.clone()).or_default();
            }

            match self.tabs.get_mut(&server_tab.id) {
                Some(tab) => {
                    tab.tree = SplitTree::from_snapshot(server_tab.root.clone());
                }
                None => {
                    self.tabs.insert(
                        server_tab.id.clone(),
                        Tab {
                            id: server_tab.id.clone(),
                            title: String::new(),
                            tree: SplitTree::from_snapshot(server_tab.root.clone()),
                        },
                    );
                }
            }
        }

        if snapshot.tabs.is_empty() {
            self.active_tab = None;
            self.active_panel = None;
            self.lru.clear();
            return;
        }

        self.active_tab = snapshot.active_tab_id.clone();
        self.active_panel = snapshot
            .active_tab_id
            .as_ref()
            .and_then(|id| snapshot.tabs.iter().find(|t| &t.id == id))
            .and_then(|t| t.active_panel_id.clone());
    }
}

fn collect_panel_ids(node: &SplitNode, out: &mut Vec<PanelId>) {
    match node {
        SplitNode::Leaf(id) => out.push(id.clone()),
        SplitNode::Split { first, second, .. } => {
            collect_panel_ids(first, out);
            collect_panel_ids(second, out);
        }
    }
}

impl Default for TabController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::Direction;

    #[test]
    fn focus_determinism_after_closing_active_tab() {
        // Testable property 10.
        let mut ctl = TabController::new();
        ctl.create_tab("t1", "one", "p1".into());
        ctl.create_tab("t2", "two", "p2".into());
        ctl.create_tab("t3", "three", "p3".into());

        // Active order so far: created t1 (active), t2 (active, t1 in lru),
        // t3 (active, t1,t2 in lru back=t2).
        ctl.close_tab("t3");
        assert_eq!(ctl.active_tab(), Some(&"t2".to_string()));

        ctl.close_tab("t2");
        assert_eq!(ctl.active_tab(), Some(&"t1".to_string()));

        ctl.close_tab("t1");
        assert_eq!(ctl.active_tab(), None);
        assert_eq!(ctl.active_panel(), None);
    }

    #[test]
    fn split_creation_latency_inserts_unbound_panel_immediately() {
        let mut ctl = TabController::new();
        ctl.create_tab("t1", "one", "p1".into());
        ctl.split_local("t1", "p1", Direction::Right, "p2".into()).unwrap();
        assert_eq!(ctl.server_id_of("p2"), None);
        assert!(ctl.tab("t1").unwrap().tree.get_all_panels().contains(&"p2".to_string()));

        ctl.bind_panel("p2", 99).unwrap();
        assert_eq!(ctl.server_id_of("p2"), Some(99));
    }

    #[test]
    fn rejected_tentative_panel_is_removed() {
        let mut ctl = TabController::new();
        ctl.create_tab("t1", "one", "p1".into());
        ctl.split_local("t1", "p1", Direction::Right, "p2".into()).unwrap();
        ctl.reject_tentative_panel("t1", "p2").unwrap();
        assert!(!ctl.tab("t1").unwrap().tree.get_all_panels().contains(&"p2".to_string()));
    }

    #[test]
    fn closing_a_tab_drops_its_panel_bindings() {
        let mut ctl = TabController::new();
        ctl.create_tab("t1", "one", "p1".into());
        ctl.split_local("t1", "p1", Direction::Right, "p2".into()).unwrap();
        ctl.bind_panel("p2", 99).unwrap();
        assert_eq!(ctl.panel_server_ids.len(), 2);

        ctl.close_tab("t1");
        assert!(ctl.panel_server_ids.is_empty());
    }

    #[test]
    fn empty_snapshot_enters_empty_state() {
        let mut ctl = TabController::new();
        ctl.create_tab("t1", "one", "p1".into());
        ctl.reconcile_layout(LayoutSnapshot::default());
        assert!(ctl.is_empty_state());
        assert_eq!(ctl.tab_count(), 0);
    }

    #[test]
    fn reconcile_tears_down_tabs_missing_from_snapshot() {
        let mut ctl = TabController::new();
        ctl.create_tab("t1", "one", "p1".into());
        ctl.create_tab("stale", "stale", "px".into());

        let snapshot = LayoutSnapshot {
            tabs: vec![ServerTabSnapshot {
                id: "t1".into(),
                root: SplitNode::Leaf("p1".into()),
                active_panel_id: Some("p1".into()),
            }],
            active_tab_id: Some("t1".into()),
        };
        ctl.reconcile_layout(snapshot);
        assert!(ctl.tab("stale").is_none());
        assert!(ctl.tab("t1").is_some());
        assert_eq!(ctl.active_tab(), Some(&"t1".to_string()));
        assert_eq!(ctl.active_panel(), Some(&"p1".to_string()));
        assert!(!ctl.panel_server_ids.contains_key("px"));
    }

    #[test]
    fn set_active_panel_emits_focus_only_when_bound() {
        let mut ctl = TabController::new();
        ctl.create_tab("t1", "one", "p1".into());
        assert_eq!(ctl.set_active_panel("p1".into()), None);
        ctl.bind_panel("p1", 5).unwrap();
        assert_eq!(
            ctl.set_active_panel("p1".into()),
            Some(FocusPanelEvent { server_id: 5 })
        );
    }
}
