//! A per-tab binary split tree of panels, per spec §4.3.

use crate::error::{Error, Result};

pub type PanelId = String;

const MIN_RATIO: f64 = 0.05;
const MAX_RATIO: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Direction of a `split()` call or directional neighbor search; distinct
/// from [`Orientation`] because left/right and up/down both collapse onto
/// one orientation each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    fn orientation(self) -> Orientation {
        match self {
            Direction::Left | Direction::Right => Orientation::Horizontal,
            Direction::Up | Direction::Down => Orientation::Vertical,
        }
    }

    /// `true` if this direction places the new panel in the tree's `first` slot.
    fn new_panel_is_first(self) -> bool {
        matches!(self, Direction::Up | Direction::Left)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SplitNode {
    Leaf(PanelId),
    Split {
        orientation: Orientation,
        ratio: f64,
        first: Box<SplitNode>,
        second: Box<SplitNode>,
    },
}

impl SplitNode {
    fn leaf_count(&self) -> usize {
        match self {
            SplitNode::Leaf(_) => 1,
            SplitNode::Split { first, second, .. } => first.leaf_count() + second.leaf_count(),
        }
    }

    fn contains(&self, panel: &str) -> bool {
        match self {
            SplitNode::Leaf(id) => id == panel,
            SplitNode::Split { first, second, .. } => first.contains(panel) || second.contains(panel),
        }
    }

    fn collect_panels(&self, out: &mut Vec<PanelId>) {
        match self {
            SplitNode::Leaf(id) => out.push(id.clone()),
            SplitNode::Split { first, second, .. } => {
                first.collect_panels(out);
                second.collect_panels(out);
            }
        }
    }

    fn equalize(&mut self) {
        if let SplitNode::Split {
            ratio, first, second, ..
        } = self
        {
            first.equalize();
            second.equalize();
            let f = first.leaf_count() as f64;
            let s = second.leaf_count() as f64;
            *ratio = clamp_ratio(f / (f + s));
        }
    }
}

fn clamp_ratio(ratio: f64) -> f64 {
    ratio.clamp(MIN_RATIO, MAX_RATIO)
}

/// Axis-aligned rectangle in whatever unit the caller's viewport uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    fn split_first(&self, orientation: Orientation, ratio: f64) -> Rect {
        match orientation {
            Orientation::Horizontal => Rect {
                width: self.width * ratio,
                ..*self
            },
            Orientation::Vertical => Rect {
                height: self.height * ratio,
                ..*self
            },
        }
    }

    fn split_second(&self, orientation: Orientation, ratio: f64) -> Rect {
        match orientation {
            Orientation::Horizontal => Rect {
                x: self.x + self.width * ratio,
                width: self.width * (1.0 - ratio),
                ..*self
            },
            Orientation::Vertical => Rect {
                y: self.y + self.height * ratio,
                height: self.height * (1.0 - ratio),
                ..*self
            },
        }
    }

    fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A binary tree of splits for one tab. `None` root means the tab has no
/// panels yet (a transient state the caller should close the tab out of).
#[derive(Debug, Clone, Default)]
pub struct SplitTree {
    root: Option<SplitNode>,
}

impl SplitTree {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_single_panel(panel: PanelId) -> Self {
        Self {
            root: Some(SplitNode::Leaf(panel)),
        }
    }

    /// Build a tree directly from a pre-built node, e.g. a server-sent
    /// layout snapshot whose tree arrives whole rather than via incremental
    /// `split()` calls.
    pub fn from_snapshot(root: SplitNode) -> Self {
        Self { root: Some(root) }
    }

    pub fn root(&self) -> Option<&SplitNode> {
        self.root.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// In-order traversal of every panel in the tree.
    pub fn get_all_panels(&self) -> Vec<PanelId> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.collect_panels(&mut out);
        }
        out
    }

    /// Replace `leaf` with a new `Split` holding `leaf`'s old panel and
    /// `new_panel`, oriented per `direction`.
    pub fn split(&mut self, leaf: &str, direction: Direction, new_panel: PanelId) -> Result<()> {
        let Some(root) = self.root.take() else {
            return Err(Error::protocol("split on an empty tree"));
        };
        let (replaced, found) = Self::split_node(root, leaf, direction, new_panel);
        self.root = Some(replaced);
        if !found {
            return Err(Error::protocol(format!("panel {leaf} not found in tree")));
        }
        Ok(())
    }

    fn split_node(node: SplitNode, leaf: &str, direction: Direction, new_panel: PanelId) -> (SplitNode, bool) {
        match node {
            SplitNode::Leaf(ref id) if id == leaf => {
                let new_leaf = SplitNode::Leaf(new_panel);
                let old_leaf = node;
                let (first, second) = if direction.new_panel_is_first() {
                    (new_leaf, old_leaf)
                } else {
                    (old_leaf, new_leaf)
                };
                (
                    SplitNode::Split {
                        orientation: direction.orientation(),
                        ratio: 0.5,
                        first: Box::new(first),
                        second: Box::new(second),
                    },
                    true,
                )
            }
            SplitNode::Leaf(_) => (node, false),
            SplitNode::Split {
                orientation,
                ratio,
                first,
                second,
            } => {
                let (new_first, found_in_first) = Self::split_node(*first, leaf, direction, new_panel.clone());
                if found_in_first {
                    return (
                        SplitNode::Split {
                            orientation,
                            ratio,
                            first: Box::new(new_first),
                            second,
                        },
                        true,
                    );
                }
                let (new_second, found_in_second) = Self::split_node(*second, leaf, direction, new_panel);
                (
                    SplitNode::Split {
                        orientation,
                        ratio,
                        first: Box::new(new_first),
                        second: Box::new(new_second),
                    },
                    found_in_second,
                )
            }
        }
    }

    /// Remove `panel`'s leaf, collapsing its enclosing split into the sibling
    /// subtree. Returns `true` if the tree is now empty (the caller must
    /// close the owning tab).
    pub fn remove(&mut self, panel: &str) -> Result<bool> {
        let Some(root) = self.root.take() else {
            return Err(Error::protocol("remove on an empty tree"));
        };
        match Self::remove_node(root, panel) {
            RemoveOutcome::NotFound(node) => {
                self.root = Some(node);
                Err(Error::protocol(format!("panel {panel} not found in tree")))
            }
            RemoveOutcome::Removed(Some(node)) => {
                self.root = Some(node);
                Ok(false)
            }
            RemoveOutcome::Removed(None) => Ok(true),
        }
    }

    fn remove_node(node: SplitNode, panel: &str) -> RemoveOutcome {
        match node {
            SplitNode::Leaf(ref id) if id == panel => RemoveOutcome::Removed(None),
            SplitNode::Leaf(_) => RemoveOutcome::NotFound(node),
            SplitNode::Split {
                orientation,
                ratio,
                first,
                second,
            } => {
                if first.contains(panel) {
                    match Self::remove_node(*first, panel) {
                        RemoveOutcome::Removed(None) => RemoveOutcome::Removed(Some(*second)),
                        RemoveOutcome::Removed(Some(new_first)) => RemoveOutcome::Removed(Some(SplitNode::Split {
                            orientation,
                            ratio,
                            first: Box::new(new_first),
                            second,
                        })),
                        RemoveOutcome::NotFound(restored) => RemoveOutcome::NotFound(SplitNode::Split {
                            orientation,
                            ratio,
                            first: Box::new(restored),
                            second,
                        }),
                    }
                } else if second.contains(panel) {
                    match Self::remove_node(*second, panel) {
                        RemoveOutcome::Removed(None) => RemoveOutcome::Removed(Some(*first)),
                        RemoveOutcome::Removed(Some(new_second)) => RemoveOutcome::Removed(Some(SplitNode::Split {
                            orientation,
                            ratio,
                            first,
                            second: Box::new(new_second),
                        })),
                        RemoveOutcome::NotFound(restored) => RemoveOutcome::NotFound(SplitNode::Split {
                            orientation,
                            ratio,
                            first,
                            second: Box::new(restored),
                        }),
                    }
                } else {
                    RemoveOutcome::NotFound(SplitNode::Split {
                        orientation,
                        ratio,
                        first,
                        second,
                    })
                }
            }
        }
    }

    /// The innermost `Split` whose subtree contains `panel`, or `None` if it
    /// is the tree's sole leaf (or it isn't found).
    pub fn find_container(&self, panel: &str) -> Option<&SplitNode> {
        fn search<'a>(node: &'a SplitNode, panel: &str) -> Option<&'a SplitNode> {
            match node {
                SplitNode::Leaf(_) => None,
                SplitNode::Split { first, second, .. } => {
                    if let SplitNode::Leaf(id) = first.as_ref() {
                        if id == panel {
                            return Some(node);
                        }
                    }
                    if let SplitNode::Leaf(id) = second.as_ref() {
                        if id == panel {
                            return Some(node);
                        }
                    }
                    search(first, panel).or_else(|| search(second, panel))
                }
            }
        }
        self.root.as_ref().and_then(|root| search(root, panel))
    }

    /// Recursively set every split's ratio to `first_leaf_count / total`.
    pub fn equalize(&mut self) {
        if let Some(root) = &mut self.root {
            root.equalize();
        }
    }

    /// Adjust the nearest split enclosing `from` whose orientation matches
    /// `dir`, clamped to `[0.05, 0.95]`. `pixels` is interpreted against
    /// `viewport_extent` (the full width for horizontal, height for vertical).
    pub fn resize_split(&mut self, from: &str, dir: Direction, pixels: f64, viewport_extent: f64) -> Result<()> {
        let Some(root) = &mut self.root else {
            return Err(Error::protocol("resize on an empty tree"));
        };
        let orientation = dir.orientation();
        if !Self::resize_nearest(root, from, orientation, pixels, viewport_extent) {
            return Err(Error::protocol(format!(
                "no enclosing {orientation:?} split found for {from}"
            )));
        }
        Ok(())
    }

    fn resize_nearest(
        node: &mut SplitNode,
        from: &str,
        orientation: Orientation,
        pixels: f64,
        viewport_extent: f64,
    ) -> bool {
        if let SplitNode::Split {
            orientation: node_orientation,
            ratio,
            first,
            second,
        } = node
        {
            if first.contains(from) && Self::resize_nearest(first, from, orientation, pixels, viewport_extent) {
                return true;
            }
            if second.contains(from) && Self::resize_nearest(second, from, orientation, pixels, viewport_extent) {
                return true;
            }
            if *node_orientation == orientation && (first.contains(from) || second.contains(from)) {
                let delta = pixels / viewport_extent;
                *ratio = clamp_ratio(*ratio + delta);
                return true;
            }
        }
        false
    }

    fn layout_rects(node: &SplitNode, rect: Rect, out: &mut Vec<(PanelId, Rect)>) {
        match node {
            SplitNode::Leaf(id) => out.push((id.clone(), rect)),
            SplitNode::Split {
                orientation,
                ratio,
                first,
                second,
            } => {
                Self::layout_rects(first, rect.split_first(*orientation, *ratio), out);
                Self::layout_rects(second, rect.split_second(*orientation, *ratio), out);
            }
        }
    }

    /// Geometric neighbor search: the leaf whose rectangle is adjacent to
    /// `from`'s rectangle in `dir` with the greatest perpendicular overlap;
    /// ties broken by closer centroid.
    pub fn select_in_direction(&self, from: &str, dir: Direction, viewport: Rect) -> Option<PanelId> {
        let root = self.root.as_ref()?;
        let mut rects = Vec::new();
        Self::layout_rects(root, viewport, &mut rects);
        let from_rect = rects.iter().find(|(id, _)| id == from)?.1;

        let mut best: Option<(PanelId, f64, f64)> = None; // (id, overlap, dist)
        for (id, rect) in &rects {
            if id == from {
                continue;
            }
            let adjacent = match dir {
                Direction::Right => (rect.x - (from_rect.x + from_rect.width)).abs() < 0.01,
                Direction::Left => (from_rect.x - (rect.x + rect.width)).abs() < 0.01,
                Direction::Down => (rect.y - (from_rect.y + from_rect.height)).abs() < 0.01,
                Direction::Up => (from_rect.y - (rect.y + rect.height)).abs() < 0.01,
            };
            if !adjacent {
                continue;
            }
            let overlap = match dir {
                Direction::Left | Direction::Right => {
                    overlap_1d(from_rect.y, from_rect.y + from_rect.height, rect.y, rect.y + rect.height)
                }
                Direction::Up | Direction::Down => {
                    overlap_1d(from_rect.x, from_rect.x + from_rect.width, rect.x, rect.x + rect.width)
                }
            };
            if overlap <= 0.0 {
                continue;
            }
            let (fc_x, fc_y) = from_rect.center();
            let (c_x, c_y) = rect.center();
            let dist = ((fc_x - c_x).powi(2) + (fc_y - c_y).powi(2)).sqrt();

            let better = match &best {
                None => true,
                Some((_, best_overlap, best_dist)) => {
                    overlap > *best_overlap || (overlap == *best_overlap && dist < *best_dist)
                }
            };
            if better {
                best = Some((id.clone(), overlap, dist));
            }
        }
        best.map(|(id, _, _)| id)
    }
}

fn overlap_1d(a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    (a1.min(b1) - a0.max(b0)).max(0.0)
}

enum RemoveOutcome {
    Removed(Option<SplitNode>),
    NotFound(SplitNode),
}
