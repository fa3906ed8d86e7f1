//! Flow state: ordered field map plus a declared schema with per-field reducers.
//!
//! A graph carries one [`StateSchema`] declared up front. Each field is either
//! *replace* (a node's update overwrites the old value) or *reduced* (a merge
//! function combines old and new). Fields absent from an update are untouched;
//! fields never written stay absent unless the schema gives them a default.

use std::sync::Arc;

use serde_json::Value;

/// Graph state: field name to JSON value, in insertion order.
///
/// `serde_json`'s `preserve_order` feature keeps the map ordered, so state
/// round-trips through checkpoint storage without reshuffling fields.
pub type FlowState = serde_json::Map<String, Value>;

/// Merge function for a reduced field: `reduce(old, new) -> merged`.
///
/// Called with `old = None` on the first write to the field. Reducers must be
/// pure functions of their two inputs; checkpoint replay depends on it. The
/// engine does not enforce purity.
pub type Reducer = Arc<dyn Fn(Option<Value>, Value) -> Value + Send + Sync>;

#[derive(Clone)]
struct FieldSpec {
    name: String,
    default: Option<Value>,
    reducer: Option<Reducer>,
}

/// Declares the fields a graph's state may hold and how updates merge into it.
///
/// Built once before the graph and handed to `FlowEngine::new`. Field order is
/// declaration order; [`StateSchema::apply`] walks fields in that order so the
/// resulting state keeps a stable layout.
///
/// **Interaction**: consumed by `FlowEngine`; `apply` is invoked once per node
/// activation (after the terminal result) and once for the caller's update
/// argument to `invoke`/`stream`.
#[derive(Clone, Default)]
pub struct StateSchema {
    fields: Vec<FieldSpec>,
}

impl StateSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Declares a plain field: updates replace the current value outright.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            default: None,
            reducer: None,
        });
        self
    }

    /// Declares a plain field with a default value, present in freshly seeded state.
    pub fn field_with_default(mut self, name: impl Into<String>, default: Value) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            default: Some(default),
            reducer: None,
        });
        self
    }

    /// Declares a reduced field: updates are merged via `reduce(old, new)`.
    ///
    /// `old` is `None` the first time the field is written.
    pub fn reduced_field(
        mut self,
        name: impl Into<String>,
        reducer: impl Fn(Option<Value>, Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            default: None,
            reducer: Some(Arc::new(reducer)),
        });
        self
    }

    /// Seed state for a session with no checkpoint: declared defaults only.
    ///
    /// Fields without a default are absent, not null-filled.
    pub fn defaults(&self) -> FlowState {
        let mut state = FlowState::new();
        for field in &self.fields {
            if let Some(default) = &field.default {
                state.insert(field.name.clone(), default.clone());
            }
        }
        state
    }

    /// Merges a partial update into `state`, field by field.
    ///
    /// Reduced fields combine via their reducer; plain fields replace. Fields
    /// absent from the update are left untouched. Fields not declared in the
    /// schema are dropped, keeping state within the declared field set.
    pub fn apply(&self, state: &mut FlowState, mut update: FlowState) {
        for field in &self.fields {
            let Some(new) = update.remove(&field.name) else {
                continue;
            };
            match &field.reducer {
                Some(reduce) => {
                    let old = state.remove(&field.name);
                    state.insert(field.name.clone(), reduce(old, new));
                }
                None => {
                    state.insert(field.name.clone(), new);
                }
            }
        }
    }
}

/// List-append reducer: concatenates the new array onto the old one.
///
/// The usual reducer for message-history fields. Non-array values fall back to
/// replace so a malformed update cannot wedge the field.
pub fn append(old: Option<Value>, new: Value) -> Value {
    match (old, new) {
        (Some(Value::Array(mut items)), Value::Array(new_items)) => {
            items.extend(new_items);
            Value::Array(items)
        }
        (None, new) | (Some(_), new) => new,
    }
}
