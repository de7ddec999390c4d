//! `FieldDelta<T>`: the three-state (unset / null / value) field used
//! throughout `MetadataDelta`/`ObservedDelta`/`ResourceDelta`.
//!
//! The original Python implementation represents this with plain `Optional`
//! fields plus sentinel handling in `diff()`/`with_update()` (see
//! `knowledge/models/storage_metadata.py`). Rust's `Option<Option<T>>` would
//! work but reads poorly at every call site, so the three states are named
//! explicitly: `Unset` (no change/not observed), `Clear` (explicitly wipe
//! the field), `Set(v)` (replace with `v`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldDelta<T> {
    #[default]
    Unset,
    Clear,
    Set(T),
}

impl<T: Clone + PartialEq> FieldDelta<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, FieldDelta::Unset)
    }

    pub fn is_empty(&self) -> bool {
        self.is_unset()
    }

    /// The delta that, applied on top of `old`, produces `new`. `Unset`
    /// when the two already agree (diff elides no-op fields, matching the
    /// original's `ResourceHistory.diff()`).
    pub fn from_change(old: &Option<T>, new: &Option<T>) -> Self {
        if old == new {
            FieldDelta::Unset
        } else {
            match new {
                Some(v) => FieldDelta::Set(v.clone()),
                None => FieldDelta::Clear,
            }
        }
    }

    /// Apply this delta on top of a currently-merged value.
    pub fn apply(&self, current: Option<T>) -> Option<T> {
        match self {
            FieldDelta::Unset => current,
            FieldDelta::Clear => None,
            FieldDelta::Set(v) => Some(v.clone()),
        }
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            FieldDelta::Set(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: Serialize> Serialize for FieldDelta<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FieldDelta::Unset | FieldDelta::Clear => serializer.serialize_none(),
            FieldDelta::Set(v) => serializer.serialize_some(v),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldDelta<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<T>::deserialize(deserializer)?;
        Ok(match opt {
            Some(v) => FieldDelta::Set(v),
            None => FieldDelta::Clear,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_change_elides_no_op() {
        let delta: FieldDelta<String> = FieldDelta::from_change(&Some("a".into()), &Some("a".into()));
        assert!(delta.is_unset());
    }

    #[test]
    fn from_change_detects_clear() {
        let delta: FieldDelta<String> = FieldDelta::from_change(&Some("a".into()), &None);
        assert_eq!(delta, FieldDelta::Clear);
        assert_eq!(delta.apply(Some("a".into())), None);
    }

    #[test]
    fn unset_preserves_current() {
        let delta: FieldDelta<String> = FieldDelta::Unset;
        assert_eq!(delta.apply(Some("keep".into())), Some("keep".into()));
    }
}
