//! Tri-state JSON patch fields. PATCH bodies need to tell "field omitted"
//! apart from "field explicitly null": the former leaves the stored value
//! alone, the latter clears a nullable column.

use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch<T> {
    Omitted,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Omitted
    }
}

impl<T> Patch<T> {
    /// Maps onto diesel's nested changeset option: outer `None` skips the
    /// column, `Some(None)` writes NULL, `Some(Some(_))` writes the value.
    pub fn into_nullable_change(self) -> Option<Option<T>> {
        match self {
            Patch::Omitted => None,
            Patch::Null => Some(None),
            Patch::Value(value) => Some(Some(value)),
        }
    }
}

// A field typed `Patch<T>` must also carry `#[serde(default)]` so a missing
// key becomes `Omitted`; deserialization itself only ever sees null/value.
impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(|value| match value {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        })
    }
}
