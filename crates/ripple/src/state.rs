//! Immutable component state and change tracking
//!
//! - [`State`] is a shared, copy-on-write snapshot. Published snapshots are
//!   never mutated; applying changes to a shared snapshot copies it first.
//! - [`Changes`] is a partial field → value mapping, either requested by a
//!   caller or produced as state effects.
//! - [`ChangeSet`] names the fields whose values actually differ.

use crate::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Build a [`Changes`] mapping inline
///
/// ```ignore
/// let changes = changes! { "count" => 11, "label" => "eleven" };
/// ```
#[macro_export]
macro_rules! changes {
    () => {
        $crate::Changes::new()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut changes = $crate::Changes::new();
        $(changes.set($field, $value);)+
        changes
    }};
}

/// A partial set of field values to merge into state
#[derive(Clone, Default, PartialEq)]
pub struct Changes {
    fields: BTreeMap<String, Value>,
}

impl Changes {
    /// Create an empty change mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`Changes::set`]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field, replacing any earlier value for it
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` on top of these changes; `other` wins on conflicts
    pub fn merge(&mut self, other: Changes) {
        self.fields.extend(other.fields);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Changes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Changes {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl fmt::Debug for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter()).finish()
    }
}

/// Names of the fields that differ from a previous state
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    fields: BTreeSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a field as changed; marking twice has no further effect
    pub fn insert(&mut self, field: impl Into<String>) {
        self.fields.insert(field.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Whether any of the given fields changed
    pub fn any_of(&self, fields: &[&str]) -> bool {
        fields.iter().any(|field| self.contains(field))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Add every field of `other` to this set
    pub fn merge(&mut self, other: &ChangeSet) {
        self.fields.extend(other.fields.iter().cloned());
    }

    /// Set union of two change sets
    pub fn union(&self, other: &ChangeSet) -> ChangeSet {
        let mut union = self.clone();
        union.merge(other);
        union
    }
}

impl<S: Into<String>> FromIterator<S> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Debug for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.fields.iter()).finish()
    }
}

/// An immutable snapshot of one component's fields
#[derive(Clone, Default)]
pub struct State {
    fields: Rc<BTreeMap<String, Value>>,
}

impl State {
    /// The empty state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether two handles point at the same published snapshot
    pub fn ptr_eq(&self, other: &State) -> bool {
        Rc::ptr_eq(&self.fields, &other.fields)
    }

    /// Which of `changes` would actually alter this state
    ///
    /// A field counts as changed when it is absent here or its current value
    /// is not the [same value](Value::same_value) as the requested one.
    pub fn fields_changed(&self, changes: &Changes) -> ChangeSet {
        changes
            .iter()
            .filter(|(field, value)| {
                self.get(field)
                    .map_or(true, |current| !current.same_value(value))
            })
            .map(|(field, _)| field)
            .collect()
    }

    /// A new snapshot with `changes` merged in; `self` is untouched
    pub fn with_changes(&self, changes: &Changes) -> State {
        let mut next = self.clone();
        next.apply(changes);
        next
    }

    /// Merge changes in place, copying the map first if it is shared
    pub(crate) fn apply(&mut self, changes: &Changes) {
        if changes.is_empty() {
            return;
        }
        let fields = Rc::make_mut(&mut self.fields);
        for (field, value) in changes.iter() {
            fields.insert(field.to_owned(), value.clone());
        }
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.fields == other.fields
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter()).finish()
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, value) in self.fields.iter() {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}
