//! Value & State Store.
//!
//! Every container (top-level state, each character, each node-state entry)
//! keeps an "initial-values shadow" captured at construction, so
//! serialization only has to walk changed fields.

use std::collections::BTreeMap;

use crate::ast::{NodeId, Script, StateFields};
use crate::error::RuntimeError;
use crate::expr::{ExpressionEvaluator, VariableReader};
use crate::value::Value;

/// A field container paired with the declared defaults it was built from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fields {
    pub current: BTreeMap<String, Value>,
    pub initial: BTreeMap<String, Value>,
}

impl Fields {
    pub fn from_declared(current: BTreeMap<String, Value>) -> Self {
        Fields {
            initial: current.clone(),
            current,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.current.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.current.insert(name.to_string(), value);
    }

    /// Fields whose current value differs from the declared initial value.
    /// Fields absent from `initial` (created
    /// on demand in lax access mode) are always included.
    pub fn delta(&self) -> BTreeMap<String, Value> {
        self.current
            .iter()
            .filter(|(name, value)| self.initial.get(*name) != Some(*value))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Rebuilds a container from declared defaults plus a saved delta.
    /// Fields in `delta` absent from `declared` are still applied
    /// (a save made against an older script can still carry extra fields;
    /// this mirrors "missing optional fields default to none" read in
    /// reverse — we don't *drop* save data we didn't ask for).
    pub fn restore(declared: BTreeMap<String, Value>, delta: BTreeMap<String, Value>) -> Self {
        let mut fields = Fields::from_declared(declared);
        for (name, value) in delta {
            fields.current.insert(name, value);
        }
        fields
    }
}

fn eval_fields(
    decl: &StateFields,
    evaluator: &dyn ExpressionEvaluator,
    reader: &dyn VariableReader,
) -> Result<BTreeMap<String, Value>, RuntimeError> {
    let mut out = BTreeMap::new();
    for (name, expr) in &decl.fields {
        out.insert(name.clone(), evaluator.eval(expr, reader)?);
    }
    Ok(out)
}

/// The runtime's single mutable state container.
pub struct Store {
    pub top_level: Fields,
    pub characters: BTreeMap<String, Fields>,
    pub node_state: BTreeMap<NodeId, Fields>,
}

/// A reader that resolves a dotted path against the current chain of local
/// states (innermost-first), then top-level state, then characters, then
/// functions. `locals` is supplied by the
/// Continuation Core from the live scope stack at the moment of
/// evaluation.
pub struct PathReader<'a> {
    pub store: &'a Store,
    pub locals: Vec<&'a Fields>,
    pub function_names: &'a [String],
}

impl Store {
    /// Builds an empty store with no declared state. Used by tests and by
    /// [`Store::from_script`] before evaluating initializers.
    pub fn empty() -> Self {
        Store {
            top_level: Fields::default(),
            characters: BTreeMap::new(),
            node_state: BTreeMap::new(),
        }
    }

    /// Evaluates a script's declared state and characters into a fresh
    /// store. Initializer expressions may only read from state declared
    /// earlier in source order and from other characters' declared
    /// defaults — there is no forward reference support, matching the
    /// original's single-pass initialization.
    pub fn from_script(
        script: &Script,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<Self, RuntimeError> {
        let mut store = Store::empty();

        for decl in &script.top_level_state {
            let reader = PathReader {
                store: &store,
                locals: vec![],
                function_names: &[],
            };
            let fields = eval_fields(&decl.fields, evaluator, &reader)?;
            for (name, value) in fields {
                store.top_level.current.insert(name.clone(), value.clone());
                store.top_level.initial.insert(name, value);
            }
        }

        for character in &script.characters {
            let reader = PathReader {
                store: &store,
                locals: vec![],
                function_names: &[],
            };
            let fields = eval_fields(&character.fields, evaluator, &reader)?;
            store
                .characters
                .insert(character.name.clone(), Fields::from_declared(fields));
        }

        Ok(store)
    }

    /// Implements the read path: innermost-first locals, then
    /// top-level state, then characters, then functions; subsequent path
    /// components perform field lookup on the resolved value.
    pub fn read_path(
        &self,
        segments: &[String],
        locals: &[&Fields],
        function_names: &[String],
    ) -> Option<Value> {
        let (head, rest) = segments.split_first()?;

        let mut value = None;
        for frame in locals.iter().rev() {
            if let Some(v) = frame.get(head) {
                value = Some(v.clone());
                break;
            }
        }
        if value.is_none() {
            value = self.top_level.get(head).cloned();
        }
        if value.is_none() && self.characters.contains_key(head) {
            value = Some(Value::Character(head.clone()));
        }
        if value.is_none() && function_names.iter().any(|f| f == head) {
            value = Some(Value::Function(head.clone()));
        }

        let mut current = value?;
        for segment in rest {
            current = self.field_of(&current, segment)?;
        }
        Some(current)
    }

    /// Field lookup on an already-resolved value: characters read from
    /// their runtime fields, objects from their own fields.
    fn field_of(&self, value: &Value, segment: &str) -> Option<Value> {
        match value {
            Value::Character(name) => self.characters.get(name)?.get(segment).cloned(),
            Value::Object(_) => value.field(segment),
            _ => None,
        }
    }

    /// Implements the write path. `a.b.c` resolves `a.b` by the
    /// read path, then sets field `c`; a bare identifier writes to the
    /// innermost local state that declares it, or — in lax mode — creates
    /// the binding in top-level state; in strict mode an unresolved bare
    /// write is an [`RuntimeError::UndefinedBinding`].
    pub fn write_path(
        &mut self,
        segments: &[String],
        locals: &mut [&mut Fields],
        value: Value,
        strict: bool,
    ) -> Result<(), RuntimeError> {
        if segments.len() == 1 {
            let name = &segments[0];
            for frame in locals.iter_mut().rev() {
                if frame.current.contains_key(name) {
                    frame.set(name, value);
                    return Ok(());
                }
            }
            if self.top_level.current.contains_key(name) {
                self.top_level.set(name, value);
                return Ok(());
            }
            if strict {
                return Err(RuntimeError::UndefinedBinding(name.clone()));
            }
            self.top_level.set(name, value);
            return Ok(());
        }

        let (base_segments, last) = segments.split_at(segments.len() - 1);
        let last = &last[0];
        let function_names: Vec<String> = Vec::new();
        let locals_ref: Vec<&Fields> = locals.iter().map(|f| &**f).collect();
        let base = self
            .read_path(base_segments, &locals_ref, &function_names)
            .ok_or_else(|| RuntimeError::UndefinedBinding(base_segments.join(".")))?;

        match base {
            Value::Character(name) => {
                let fields = self
                    .characters
                    .get_mut(&name)
                    .ok_or_else(|| RuntimeError::UnknownCharacter(name.clone()))?;
                fields.set(last, value);
                Ok(())
            },
            _ => Err(RuntimeError::EvaluationError(format!(
                "cannot assign into field '{last}' of a non-character, non-local value"
            ))),
        }
    }

    /// The display name for a character: its current `name` field if
    /// non-empty, else its declared identifier.
    pub fn character_display_name(&self, identifier: &str) -> String {
        match self.characters.get(identifier).and_then(|f| f.get("name")) {
            Some(Value::Text(name)) if !name.is_empty() => name.clone(),
            _ => identifier.to_string(),
        }
    }

    /// Stringifies a value for template interpolation, resolving
    /// `Value::Character` through [`Store::character_display_name`].
    pub fn display_value(&self, value: &Value) -> String {
        match value {
            Value::Character(name) => self.character_display_name(name),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| self.display_value(v)).collect();
                format!("[{}]", parts.join(", "))
            },
            Value::Object(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", self.display_value(v)))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            },
            other => other.to_string(),
        }
    }

    pub fn node_state_or_init(
        &mut self,
        id: NodeId,
        declared: impl FnOnce() -> BTreeMap<String, Value>,
    ) -> &mut Fields {
        self.node_state
            .entry(id)
            .or_insert_with(|| Fields::from_declared(declared()))
    }
}

impl<'a> VariableReader for PathReader<'a> {
    fn read_path(&self, segments: &[String]) -> Option<Value> {
        self.store.read_path(segments, &self.locals, self.function_names)
    }

    fn has_function(&self, name: &str) -> bool {
        self.function_names.iter().any(|f| f == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_omits_unchanged_fields() {
        let mut fields = Fields::from_declared(BTreeMap::from([("x".into(), Value::Integer(1))]));
        assert!(fields.delta().is_empty());
        fields.set("x", Value::Integer(2));
        assert_eq!(fields.delta().get("x"), Some(&Value::Integer(2)));
    }

    #[test]
    fn restore_reapplies_delta_over_new_defaults() {
        let declared = BTreeMap::from([("x".into(), Value::Integer(2))]);
        let delta = BTreeMap::new();
        let fields = Fields::restore(declared, delta);
        assert_eq!(fields.get("x"), Some(&Value::Integer(2)));
    }

    #[test]
    fn write_path_creates_binding_in_lax_mode() {
        let mut store = Store::empty();
        let mut locals: Vec<&mut Fields> = vec![];
        store
            .write_path(&["beans".into()], &mut locals, Value::Integer(90), false)
            .unwrap();
        assert_eq!(store.top_level.get("beans"), Some(&Value::Integer(90)));
    }

    #[test]
    fn write_path_strict_rejects_unknown_binding() {
        let mut store = Store::empty();
        let mut locals: Vec<&mut Fields> = vec![];
        let err = store.write_path(&["beans".into()], &mut locals, Value::Integer(1), true);
        assert!(matches!(err, Err(RuntimeError::UndefinedBinding(_))));
    }
}
