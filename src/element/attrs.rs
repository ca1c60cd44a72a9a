//! Attributes of tag instances.
//!
//! The engine only compares attributes to decide whether an `Update` mutation
//! is needed. Applying them is the host's job; [`diff_attrs`] gives hosts the
//! exact changes.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// Attribute Value
// =============================================================================

/// A single attribute value.
#[derive(Clone)]
pub enum AttrValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Opaque value such as an event handler, compared by pointer.
    Any(Rc<dyn Any>),
}

impl AttrValue {
    /// Wrap any value (handlers, host specific payloads).
    pub fn any<T: Any>(value: T) -> Self {
        AttrValue::Any(Rc::new(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            AttrValue::Any(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrValue::Str(a), AttrValue::Str(b)) => a == b,
            (AttrValue::Int(a), AttrValue::Int(b)) => a == b,
            (AttrValue::Float(a), AttrValue::Float(b)) => a.to_bits() == b.to_bits(),
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            (AttrValue::Any(a), AttrValue::Any(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(value) => write!(f, "{value:?}"),
            AttrValue::Int(value) => write!(f, "{value}"),
            AttrValue::Float(value) => write!(f, "{value}"),
            AttrValue::Bool(value) => write!(f, "{value}"),
            AttrValue::Any(_) => f.write_str("<any>"),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(value) => f.write_str(value),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(Rc::from(value))
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(Rc::from(value))
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value as i64)
    }
}

impl From<usize> for AttrValue {
    fn from(value: usize) -> Self {
        AttrValue::Int(value as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

// =============================================================================
// Attribute Map
// =============================================================================

/// Attributes of one tag, ordered by name.
pub type Attrs = BTreeMap<String, AttrValue>;

/// One attribute change between two renders.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrChange<'a> {
    Set(&'a str, &'a AttrValue),
    Remove(&'a str),
}

/// Changes needed to turn `prev` into `next`.
pub fn diff_attrs<'a>(prev: &'a Attrs, next: &'a Attrs) -> Vec<AttrChange<'a>> {
    let mut changes = Vec::new();
    for (name, value) in next {
        if prev.get(name) != Some(value) {
            changes.push(AttrChange::Set(name, value));
        }
    }
    for name in prev.keys() {
        if !next.contains_key(name) {
            changes.push(AttrChange::Remove(name));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_attrs() {
        let mut prev = Attrs::new();
        prev.insert("class".into(), "a".into());
        prev.insert("id".into(), "x".into());

        let mut next = Attrs::new();
        next.insert("class".into(), "b".into());
        next.insert("id".into(), "x".into());
        next.insert("tabindex".into(), 1.into());

        let changes = diff_attrs(&prev, &next);
        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&AttrChange::Set("class", &AttrValue::from("b"))));

        let removed = diff_attrs(&next, &prev);
        assert!(removed.contains(&AttrChange::Remove("tabindex")));
    }

    #[test]
    fn test_any_compares_by_pointer() {
        let handler = AttrValue::any(5u8);
        assert_eq!(handler, handler.clone());
        assert_ne!(handler, AttrValue::any(5u8));
        assert_eq!(handler.downcast_ref::<u8>(), Some(&5));
    }
}
