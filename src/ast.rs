//! The AST contract: the shape a parser hands the runtime.
//!
//! Nothing in this crate builds these nodes from source text — that's the
//! lexer/parser's job, out of scope here — but the interpreter needs
//! concrete types to walk, so this module defines the closed node-kind set
//! and the node payloads the Continuation Core dispatches on.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A stable node identifier, unique within one parse of a script.
///
/// Encodes a section index plus an offset within that section.
/// `Ord` is derived only so the Restorer has a total order to
/// compute a "section offset" against; the ordering itself carries no
/// other meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub section: u32,
    pub offset: u32,
}

impl NodeId {
    pub fn new(section: u32, offset: u32) -> Self {
        NodeId { section, offset }
    }

    /// Produces the string form used in save records.
    pub fn as_save_string(&self) -> String {
        format!("{}:{}", self.section, self.offset)
    }

    /// Parses the string form written by `as_save_string`. Returns `None`
    /// for anything that isn't `"<section>:<offset>"` with both halves
    /// valid `u32`s.
    pub fn from_save_string(s: &str) -> Option<NodeId> {
        let (section, offset) = s.split_once(':')?;
        Some(NodeId {
            section: section.parse().ok()?,
            offset: offset.parse().ok()?,
        })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.section, self.offset)
    }
}

/// The closed kind tag set every node carries for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    BeatDecl,
    CharacterDecl,
    StateDecl,
    FunctionDecl,
    Dialogue,
    Text,
    Choice,
    ChoiceOption,
    Insertion,
    Conditional,
    Alternative,
    Transition,
    Call,
    Assignment,
    UnaryOp,
    BinaryOp,
    ArrayAccess,
    FieldAccess,
    ObjectField,
    LiteralNumber,
    LiteralBoolean,
    LiteralNull,
    LiteralArray,
    LiteralObject,
    StringUnquoted,
    StringDoubleQuoted,
    Import,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Visit mode for an [`Alternative`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlternativeMode {
    Sequence,
    Cycle,
    Once,
    Pick,
    Shuffle,
}

/// A run of plain text possibly containing `$name` / `${expr}`
/// interpolations and inline tags, evaluated by [`crate::expr`] against the
/// [`crate::store::Store`].
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Raw(String),
    Expression(crate::expr::Expr),
    /// An inline tag marker; `closing` distinguishes `<tag>` from `</tag>`.
    Tag { name: String, closing: bool },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

impl Template {
    pub fn plain(text: impl Into<String>) -> Self {
        Template {
            parts: vec![TemplatePart::Raw(text.into())],
        }
    }
}

/// Ordered mapping of field name to initial-value expression: a state
/// block body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateFields {
    pub fields: Vec<(String, crate::expr::Expr)>,
}

/// A single declaration-like node local state/alternative carry, keyed by
/// [`NodeId`] in [`crate::store::Store`]. `temporary` state never reaches
/// the node-state map — it lives only on the [`crate::scope::RuntimeScope`]
/// that declared it.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDecl {
    pub id: NodeId,
    pub temporary: bool,
    pub fields: StateFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterDecl {
    pub name: String,
    pub fields: StateFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Node>,
}

/// One option or insertion inside a [`ChoiceBlock`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceEntry {
    Option(ChoiceOptionDecl),
    Insertion(InsertionDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceOptionDecl {
    pub id: NodeId,
    pub text: Template,
    pub guard: Option<crate::expr::Expr>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertionDecl {
    pub id: NodeId,
    /// The target beat's name, resolved the same way a transition target
    /// is.
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceBlock {
    pub id: NodeId,
    pub entries: Vec<ChoiceEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlternativeBlock {
    pub id: NodeId,
    pub mode: AlternativeMode,
    pub branches: Vec<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBlock {
    pub id: NodeId,
    /// `(condition, body)` pairs in source order; the first whose
    /// condition evaluates true is entered. A final branch with no
    /// condition acts as `else`.
    pub branches: Vec<(Option<crate::expr::Expr>, Vec<Node>)>,
}

/// A beat declaration: a named, ordered body, optionally nested.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatDecl {
    pub id: NodeId,
    pub name: String,
    pub body: Vec<Node>,
    pub nested: Vec<BeatDecl>,
}

/// A path component used for assignment/read-path resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<String>,
}

impl Path {
    pub fn single(name: impl Into<String>) -> Self {
        Path {
            segments: vec![name.into()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub id: NodeId,
    pub path: Path,
    pub op: AssignOp,
    pub value: crate::expr::Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub id: NodeId,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub id: NodeId,
    pub target: String,
    pub args: Vec<crate::expr::Expr>,
}

/// One statement inside a beat/block body. This is the unit the Continuation
/// Core's body walker steps through.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text {
        id: NodeId,
        template: Template,
    },
    Dialogue {
        id: NodeId,
        character: String,
        template: Template,
    },
    Assignment(Assignment),
    Conditional(ConditionalBlock),
    Alternative(AlternativeBlock),
    Call(Call),
    Transition(Transition),
    StateDecl(StateDecl),
    Choice(ChoiceBlock),
    BeatDecl(BeatDecl),
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Text { id, .. } => *id,
            Node::Dialogue { id, .. } => *id,
            Node::Assignment(a) => a.id,
            Node::Conditional(c) => c.id,
            Node::Alternative(a) => a.id,
            Node::Call(c) => c.id,
            Node::Transition(t) => t.id,
            Node::StateDecl(s) => s.id,
            Node::Choice(c) => c.id,
            Node::BeatDecl(b) => b.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Text { .. } => NodeKind::Text,
            Node::Dialogue { .. } => NodeKind::Dialogue,
            Node::Assignment(_) => NodeKind::Assignment,
            Node::Conditional(_) => NodeKind::Conditional,
            Node::Alternative(_) => NodeKind::Alternative,
            Node::Call(_) => NodeKind::Call,
            Node::Transition(_) => NodeKind::Transition,
            Node::StateDecl(_) => NodeKind::StateDecl,
            Node::Choice(_) => NodeKind::Choice,
            Node::BeatDecl(_) => NodeKind::BeatDecl,
        }
    }
}

/// The root AST node: an ordered sequence of
/// declarations. Free-floating statements and top-level beats are both
/// represented as `top_level` `Node`s; `beats`/`characters`/`state` index
/// the declarations the Lens and Store need at a stable path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub beats: Vec<BeatDecl>,
    pub characters: Vec<CharacterDecl>,
    pub top_level_state: Vec<StateDecl>,
    pub functions: Vec<FunctionDecl>,
    /// Free-floating statements executed before any beat, in source order.
    pub top_level: Vec<Node>,
}

/// Parallel map from field name to declared (pre-mutation) value, rebuilt
/// from `StateFields` at Store-construction time. Kept here so `ast` stays
/// the single source of "what did the script declare" truth; see
/// [`crate::store`] for the runtime mirror that tracks current values.
pub type InitialFields = BTreeMap<String, crate::value::Value>;
