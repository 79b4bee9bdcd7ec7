//! AST Index ("Lens").
//!
//! Built on demand from a [`Script`], this gives the Interpreter and the
//! Restorer an id → live node lookup and dotted beat paths, without every
//! consumer having to walk the tree itself.

use std::collections::BTreeMap;

use crate::ast::{BeatDecl, Node, NodeId, NodeKind, Script};

/// One indexed entry: enough to answer "does this id still exist, and with
/// what kind" without re-walking the
/// tree.
/// Sentinel id for the implicit "script root" scope entered via the `_`
/// transition target. No real parser ever emits this id (real
/// sections start at 0), so it can't collide with an actual AST node.
pub const ROOT_NODE_ID: NodeId = NodeId { section: u32::MAX, offset: 0 };

/// Resolution outcome for a transition/call target.
#[derive(Debug, Clone, Copy)]
pub enum TransitionTarget<'s> {
    /// `.` — equivalent to firing the finish trigger directly.
    Finish,
    /// `_` — the outermost beat (script root): the script's free-floating
    /// top-level statements, run as an implicit body.
    Root,
    Beat(&'s BeatDecl),
}

#[derive(Debug, Clone)]
pub enum Indexed<'s> {
    Beat(&'s BeatDecl),
    Node(&'s Node),
    /// A `ChoiceOption` id, carrying the enclosing `Choice` node it was
    /// declared under (there's no standalone AST node for an option).
    ChoiceOption(&'s Node),
    /// An `Insertion` id, carrying the enclosing `Choice` node.
    Insertion(&'s Node),
}

impl<'s> Indexed<'s> {
    pub fn kind(&self) -> NodeKind {
        match self {
            Indexed::Beat(_) => NodeKind::BeatDecl,
            Indexed::Node(n) => n.kind(),
            Indexed::ChoiceOption(_) => NodeKind::ChoiceOption,
            Indexed::Insertion(_) => NodeKind::Insertion,
        }
    }

    /// The enclosing `Choice` node, for the two variants that carry one.
    pub fn choice_node(&self) -> Option<&'s Node> {
        match self {
            Indexed::ChoiceOption(n) | Indexed::Insertion(n) => Some(n),
            _ => None,
        }
    }
}

/// The AST Index: `NodeId -> live node` plus dotted beat paths, built once
/// per script and reused for the life of a session.
pub struct Lens<'s> {
    script: &'s Script,
    by_id: BTreeMap<NodeId, Indexed<'s>>,
    beat_paths: BTreeMap<NodeId, String>,
    path_to_beat: BTreeMap<String, NodeId>,
}

impl<'s> Lens<'s> {
    pub fn build(script: &'s Script) -> Self {
        let mut lens = Lens {
            script,
            by_id: BTreeMap::new(),
            beat_paths: BTreeMap::new(),
            path_to_beat: BTreeMap::new(),
        };
        for beat in &script.beats {
            lens.index_beat(beat, None);
        }
        for node in &script.top_level {
            lens.index_node(node);
        }
        lens
    }

    fn index_beat(&mut self, beat: &'s BeatDecl, parent_path: Option<&str>) {
        let path = match parent_path {
            Some(p) => format!("{p}.{}", beat.name),
            None => beat.name.clone(),
        };
        self.by_id.insert(beat.id, Indexed::Beat(beat));
        self.beat_paths.insert(beat.id, path.clone());
        self.path_to_beat.insert(path.clone(), beat.id);
        for node in &beat.body {
            self.index_node(node);
        }
        for nested in &beat.nested {
            self.index_beat(nested, Some(&path));
        }
    }

    fn index_node(&mut self, node: &'s Node) {
        self.by_id.insert(node.id(), Indexed::Node(node));
        match node {
            Node::Conditional(c) => {
                for (_, body) in &c.branches {
                    for n in body {
                        self.index_node(n);
                    }
                }
            },
            Node::Alternative(a) => {
                for branch in &a.branches {
                    for n in branch {
                        self.index_node(n);
                    }
                }
            },
            Node::Choice(c) => {
                for entry in &c.entries {
                    match entry {
                        crate::ast::ChoiceEntry::Option(opt) => {
                            self.by_id.insert(opt.id, Indexed::ChoiceOption(node));
                            for n in &opt.body {
                                self.index_node(n);
                            }
                        },
                        crate::ast::ChoiceEntry::Insertion(ins) => {
                            self.by_id.insert(ins.id, Indexed::Insertion(node));
                        },
                    }
                }
            },
            Node::BeatDecl(b) => self.index_beat(b, None),
            _ => {},
        }
    }

    pub fn script(&self) -> &'s Script {
        self.script
    }

    pub fn get(&self, id: NodeId) -> Option<&Indexed<'s>> {
        self.by_id.get(&id)
    }

    pub fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        self.by_id.get(&id).map(|i| i.kind())
    }

    pub fn beat(&self, id: NodeId) -> Option<&'s BeatDecl> {
        match self.by_id.get(&id) {
            Some(Indexed::Beat(b)) => Some(b),
            _ => None,
        }
    }

    pub fn dotted_path(&self, beat_id: NodeId) -> Option<&str> {
        self.beat_paths.get(&beat_id).map(|s| s.as_str())
    }

    /// Finds a beat by dotted path, e.g. `Parent.Child`.
    pub fn beat_by_path(&self, path: &str) -> Option<&'s BeatDecl> {
        self.path_to_beat.get(path).and_then(|id| self.beat(*id))
    }

    /// Resolves a transition/call/insertion target by searching from the
    /// enclosing beat outward — nested scope, then ancestor beats, then
    /// script root. `_` is the script root; `.` is handled by
    /// the caller (finish trigger), not here.
    pub fn resolve_target(&self, from_beat: NodeId, target: &str) -> Option<&'s BeatDecl> {
        if target == "_" {
            return None;
        }

        if target.contains('.') {
            return self.beat_by_path(target);
        }

        // Search the enclosing beat's own nested beats first, then walk
        // outward through ancestor beats by progressively shortening the
        // dotted path, then fall back to any top-level beat with this name.
        if let Some(path) = self.dotted_path(from_beat) {
            let mut components: Vec<&str> = path.split('.').collect();
            while !components.is_empty() {
                let candidate = format!("{}.{}", components.join("."), target);
                if let Some(beat) = self.beat_by_path(&candidate) {
                    return Some(beat);
                }
                components.pop();
            }
        }

        self.beat_by_path(target)
    }

    pub fn root_beats(&self) -> &'s [BeatDecl] {
        &self.script.beats
    }

    /// Resolves a transition/call target, handling the two special names
    /// (`.` fires the finish trigger directly; `_` refers to
    /// the outermost/script-root context) before falling back to
    /// [`Lens::resolve_target`] for a named beat.
    pub fn resolve_transition_target(&self, from_beat: NodeId, target: &str) -> Option<TransitionTarget<'s>> {
        match target {
            "." => Some(TransitionTarget::Finish),
            "_" => Some(TransitionTarget::Root),
            _ => self.resolve_target(from_beat, target).map(TransitionTarget::Beat),
        }
    }

    /// Fetches the body slice a scope attached to `node` should walk.
    /// `branch` selects the active branch for
    /// [`NodeKind::Conditional`]/[`NodeKind::Alternative`], and is ignored
    /// for everything else.
    pub fn body_for(&self, node: NodeId, kind: NodeKind, branch: Option<usize>) -> Option<&'s [Node]> {
        match kind {
            NodeKind::BeatDecl if node == ROOT_NODE_ID => Some(self.script.top_level.as_slice()),
            NodeKind::BeatDecl => self.beat(node).map(|b| b.body.as_slice()),
            NodeKind::Conditional => match self.by_id.get(&node) {
                Some(Indexed::Node(Node::Conditional(c))) => {
                    c.branches.get(branch?).map(|(_, body)| body.as_slice())
                },
                _ => None,
            },
            NodeKind::Alternative => match self.by_id.get(&node) {
                Some(Indexed::Node(Node::Alternative(a))) => {
                    a.branches.get(branch?).map(|b| b.as_slice())
                },
                _ => None,
            },
            NodeKind::ChoiceOption => match self.by_id.get(&node).and_then(Indexed::choice_node) {
                Some(Node::Choice(c)) => c.entries.iter().find_map(|entry| match entry {
                    crate::ast::ChoiceEntry::Option(opt) if opt.id == node => {
                        Some(opt.body.as_slice())
                    },
                    _ => None,
                }),
                _ => None,
            },
            _ => None,
        }
    }

    /// Finds the [`crate::ast::ChoiceOptionDecl`] for a given option id,
    /// searching through the enclosing choice node this id was indexed
    /// under.
    pub fn choice_option(&self, option_id: NodeId) -> Option<&'s crate::ast::ChoiceOptionDecl> {
        match self.by_id.get(&option_id).and_then(Indexed::choice_node) {
            Some(Node::Choice(c)) => c.entries.iter().find_map(|entry| match entry {
                crate::ast::ChoiceEntry::Option(opt) if opt.id == option_id => Some(opt),
                _ => None,
            }),
            _ => None,
        }
    }

    /// The enclosing [`crate::ast::ChoiceBlock`] node id for a given option
    /// id.
    pub fn enclosing_choice(&self, option_id: NodeId) -> Option<NodeId> {
        self.by_id.get(&option_id).and_then(Indexed::choice_node).map(|n| n.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AlternativeMode, Template};

    fn beat(id: u32, name: &str, body: Vec<Node>, nested: Vec<BeatDecl>) -> BeatDecl {
        BeatDecl {
            id: NodeId::new(0, id),
            name: name.to_string(),
            body,
            nested,
        }
    }

    fn text(id: u32) -> Node {
        Node::Text {
            id: NodeId::new(0, id),
            template: Template::plain("x"),
        }
    }

    #[test]
    fn dotted_path_reflects_nesting() {
        let child = beat(2, "Child", vec![text(3)], vec![]);
        let parent = beat(1, "Parent", vec![], vec![child]);
        let script = Script {
            beats: vec![parent],
            ..Default::default()
        };
        let lens = Lens::build(&script);
        let child_id = NodeId::new(0, 2);
        assert_eq!(lens.dotted_path(child_id), Some("Parent.Child"));
        assert!(lens.beat_by_path("Parent.Child").is_some());
    }

    #[test]
    fn resolve_target_prefers_nested_then_walks_outward() {
        let inner = beat(3, "Inner", vec![], vec![]);
        let sibling = beat(2, "Sibling", vec![], vec![]);
        let parent = beat(1, "Parent", vec![], vec![inner, sibling]);
        let script = Script {
            beats: vec![parent],
            ..Default::default()
        };
        let lens = Lens::build(&script);
        let inner_id = NodeId::new(0, 3);
        let resolved = lens.resolve_target(inner_id, "Sibling").unwrap();
        assert_eq!(resolved.name, "Sibling");
    }

    #[test]
    #[allow(unused)]
    fn alternative_mode_variants_exist() {
        let _ = AlternativeMode::Shuffle;
    }
}
