//! Serializer: `SaveData`, the versioned JSON-shape
//! blob a host persists and later hands back to [`restore::restore`].

pub mod restore;
pub mod resume;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ast::{NodeId, NodeKind};
use crate::interpreter::Interpreter;
use crate::scope::{ChoiceOption, CollectedOptions, InsertionArena, InsertionId, RuntimeScope};
use crate::value::Value;

pub const SAVE_VERSION: u32 = 1;

/// `{ id string, kind string }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: String,
    pub kind: NodeKind,
}

/// `{ id string, dotted path }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatRef {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRecord {
    pub offset: usize,
    pub value: String,
    pub closing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeRecord {
    pub id: u64,
    pub beat: BeatRef,
    pub node: NodeRef,
    pub body_head: Option<NodeRef>,
    pub local_state: Option<BTreeMap<String, Value>>,
    pub nested_beats: Vec<BeatRef>,
    pub insertion_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOptionRecord {
    pub display_text: String,
    pub tags: Vec<TagRecord>,
    pub enabled: bool,
    pub source_node: NodeRef,
    pub insertion_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertionRecord {
    pub origin: NodeRef,
    /// `None` when the insertion's first choice hasn't been reached yet
    /// (`CollectedOptions::Pending`); `Some` (possibly empty) once collection
    /// has run (`CollectedOptions::Collected`).
    pub options: Option<Vec<ChoiceOptionRecord>>,
    pub stack: Vec<ScopeRecord>,
}

/// A save. `state`/`characters`/`node_state` are delta maps;
/// `insertions` is the flat id-keyed map that lets scope records and
/// insertion records refer to each other without a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveData {
    pub version: u32,
    pub stack: Vec<ScopeRecord>,
    pub state: BTreeMap<String, Value>,
    pub characters: BTreeMap<String, BTreeMap<String, Value>>,
    pub node_state: BTreeMap<String, BTreeMap<String, Value>>,
    pub insertions: BTreeMap<u64, InsertionRecord>,
}

impl Interpreter {
    /// `save()`. MUST NOT be called while a
    /// continuation is outstanding, same as the other accessors.
    pub fn save(&self) -> SaveData {
        let lens = self.lens();
        let mut insertions = BTreeMap::new();
        let stack = self
            .stack
            .frames
            .iter()
            .map(|s| scope_record(&lens, s, &self.insertions, &mut insertions))
            .collect();

        SaveData {
            version: SAVE_VERSION,
            stack,
            state: self.store.top_level.delta(),
            characters: self.store.characters.iter().map(|(k, f)| (k.clone(), f.delta())).collect(),
            node_state: self.store.node_state.iter().map(|(id, f)| (id.as_save_string(), f.delta())).collect(),
            insertions,
        }
    }

    /// Convenience wrapper producing the stable JSON-shape blob directly.
    pub fn save_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.save())
    }
}

fn node_ref(lens: &crate::lens::Lens<'_>, id: NodeId) -> NodeRef {
    NodeRef {
        id: id.as_save_string(),
        kind: lens.kind_of(id).unwrap_or(NodeKind::BeatDecl),
    }
}

fn beat_ref(lens: &crate::lens::Lens<'_>, id: NodeId) -> BeatRef {
    BeatRef {
        id: id.as_save_string(),
        path: lens.dotted_path(id).unwrap_or_default().to_string(),
    }
}

fn scope_record(
    lens: &crate::lens::Lens<'_>,
    scope: &RuntimeScope,
    arena: &InsertionArena,
    out: &mut BTreeMap<u64, InsertionRecord>,
) -> ScopeRecord {
    if let Some(ins_id) = scope.insertion {
        record_insertion(lens, ins_id, arena, out);
    }
    ScopeRecord {
        id: scope.id.0,
        beat: beat_ref(lens, scope.beat),
        node: node_ref(lens, scope.node),
        body_head: scope.body_head.map(|id| node_ref(lens, id)),
        local_state: scope.local_state.as_ref().map(|f| f.delta()),
        nested_beats: scope.nested_beats.iter().map(|id| beat_ref(lens, *id)).collect(),
        insertion_id: scope.insertion.map(|i| i.0),
    }
}

/// Records insertion `ins_id` into `out`, recursing into its stack
/// snapshot. The id-keyed map breaks cycles: the slot is
/// reserved before recursing, so a scope whose own insertion refers back to
/// `ins_id` is a no-op on the second visit.
fn record_insertion(lens: &crate::lens::Lens<'_>, ins_id: InsertionId, arena: &InsertionArena, out: &mut BTreeMap<u64, InsertionRecord>) {
    if out.contains_key(&ins_id.0) {
        return;
    }
    let Some(ins) = arena.get(ins_id) else { return };

    out.insert(
        ins_id.0,
        InsertionRecord {
            origin: node_ref(lens, ins.origin),
            options: None,
            stack: Vec::new(),
        },
    );

    let options = match &ins.options {
        CollectedOptions::Collected(opts) => {
            Some(opts.iter().map(|o| choice_option_record(lens, o)).collect())
        },
        CollectedOptions::Pending => None,
    };
    let stack = ins
        .stack_snapshot
        .as_ref()
        .map(|frames| frames.iter().map(|s| scope_record(lens, s, arena, out)).collect())
        .unwrap_or_default();

    out.insert(
        ins_id.0,
        InsertionRecord {
            origin: node_ref(lens, ins.origin),
            options,
            stack,
        },
    );
}

fn choice_option_record(lens: &crate::lens::Lens<'_>, opt: &ChoiceOption) -> ChoiceOptionRecord {
    ChoiceOptionRecord {
        display_text: opt.display_text.clone(),
        tags: opt
            .tags
            .iter()
            .map(|t| TagRecord { offset: t.offset, value: t.value.clone(), closing: t.closing })
            .collect(),
        enabled: opt.enabled,
        source_node: node_ref(lens, opt.source_option),
        insertion_id: opt.insertion.map(|i| i.0),
    }
}
