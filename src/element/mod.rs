//! Element description model.
//!
//! Instances are produced fresh on every render and never mutated. They are
//! the input to reconciliation:
//!
//! - [`Instance::Tag`] - a native element with attributes and children
//! - [`Instance::Text`] / [`Instance::Comment`] - leaf primitives
//! - [`Instance::Component`] - a component invocation with its props
//!
//! Components return an [`Element`], which is flattened into instances.

mod attrs;
mod component;

pub use attrs::{diff_attrs, AttrChange, AttrValue, Attrs};
pub use component::{
    fragment, lazy, memo, memo_with, portal, shadow, Component, ComponentId, ComponentInvocation,
    ComponentKind, RenderResult,
};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::platform::NativeHandle;
use crate::types::Key;

/// Comment value used for empty render positions.
pub const EMPTY_MARKER: &str = "spark:empty";

// =============================================================================
// Node Ref
// =============================================================================

/// Shared slot receiving the native handle of the tag it is attached to.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<RefCell<Option<NativeHandle>>>);

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<NativeHandle> {
        self.0.borrow().clone()
    }

    pub(crate) fn set(&self, handle: Option<NativeHandle>) {
        *self.0.borrow_mut() = handle;
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.get()).finish()
    }
}

// =============================================================================
// Tag Node
// =============================================================================

bitflags::bitflags! {
    /// Hints a tag gives the reconciler about its children.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Children never change order; diff them by position.
        const NO_TRANSPOSITIONS = 1 << 0;
    }
}

/// A native element description.
#[derive(Debug, Clone, PartialEq)]
pub struct TagNode {
    pub name: Rc<str>,
    pub key: Option<Key>,
    pub attrs: Attrs,
    pub children: Vec<Instance>,
    pub node_ref: Option<NodeRef>,
    pub flags: NodeFlags,
}

/// Start describing a tag.
pub fn tag(name: &str) -> TagNode {
    TagNode {
        name: Rc::from(name),
        key: None,
        attrs: Attrs::new(),
        children: Vec::new(),
        node_ref: None,
        flags: NodeFlags::empty(),
    }
}

impl TagNode {
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn child(mut self, child: impl Into<Element>) -> Self {
        child.into().flatten_into(&mut self.children);
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Element>,
    {
        for child in children {
            child.into().flatten_into(&mut self.children);
        }
        self
    }

    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    /// Declare that the children of this tag are never reordered.
    pub fn no_transpositions(mut self) -> Self {
        self.flags |= NodeFlags::NO_TRANSPOSITIONS;
        self
    }
}

// =============================================================================
// Instance
// =============================================================================

/// One node of an element description.
#[derive(Clone, PartialEq)]
pub enum Instance {
    Tag(Rc<TagNode>),
    Text(Rc<str>),
    Comment(Rc<str>),
    Component(ComponentInvocation),
}

/// A text primitive.
pub fn text(value: impl AsRef<str>) -> Instance {
    Instance::Text(Rc::from(value.as_ref()))
}

/// A comment primitive.
pub fn comment(value: impl AsRef<str>) -> Instance {
    Instance::Comment(Rc::from(value.as_ref()))
}

impl Instance {
    /// Placeholder occupying an empty render position.
    pub fn empty() -> Self {
        Instance::Comment(Rc::from(EMPTY_MARKER))
    }

    pub fn is_empty_placeholder(&self) -> bool {
        matches!(self, Instance::Comment(value) if &**value == EMPTY_MARKER)
    }

    pub fn key(&self) -> Option<&Key> {
        match self {
            Instance::Tag(tag) => tag.key.as_ref(),
            Instance::Component(invocation) => invocation.key(),
            Instance::Text(_) | Instance::Comment(_) => None,
        }
    }

    /// Tag, text and comment instances own a native handle.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Instance::Component(_))
    }

    pub fn as_tag(&self) -> Option<&TagNode> {
        match self {
            Instance::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&ComponentInvocation> {
        match self {
            Instance::Component(invocation) => Some(invocation),
            _ => None,
        }
    }

    /// Same element type: equal tag names, both text, both comments or the
    /// same component definition.
    pub fn same_type(&self, other: &Instance) -> bool {
        match (self, other) {
            (Instance::Tag(a), Instance::Tag(b)) => a.name == b.name,
            (Instance::Text(_), Instance::Text(_)) => true,
            (Instance::Comment(_), Instance::Comment(_)) => true,
            (Instance::Component(a), Instance::Component(b)) => a.id() == b.id(),
            _ => false,
        }
    }

    /// Same type and same key.
    pub fn matches(&self, other: &Instance) -> bool {
        self.same_type(other) && self.key() == other.key()
    }

    /// Whether the host has to patch a reused native node.
    pub(crate) fn differs_for_host(&self, next: &Instance) -> bool {
        match (self, next) {
            (Instance::Tag(a), Instance::Tag(b)) => !Rc::ptr_eq(a, b) && a.attrs != b.attrs,
            (Instance::Text(a), Instance::Text(b)) => a != b,
            (Instance::Comment(a), Instance::Comment(b)) => a != b,
            _ => false,
        }
    }

    /// Children known without rendering (tags only).
    pub(crate) fn static_children(&self) -> &[Instance] {
        match self {
            Instance::Tag(tag) => &tag.children,
            _ => &[],
        }
    }

    /// A shadow whose children are hidden.
    pub(crate) fn is_hidden_shadow(&self) -> bool {
        self.as_component()
            .is_some_and(ComponentInvocation::is_hidden_shadow)
    }

    /// Target of a portal invocation.
    pub fn portal_target(&self) -> Option<NativeHandle> {
        match self {
            Instance::Component(invocation) => invocation.portal_target(),
            _ => None,
        }
    }

    /// Human readable name for diagnostics.
    pub fn display_name(&self) -> String {
        match self {
            Instance::Tag(tag) => format!("<{}>", tag.name),
            Instance::Text(_) => "#text".to_string(),
            Instance::Comment(_) => "#comment".to_string(),
            Instance::Component(invocation) => invocation.name().to_string(),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Tag(tag) => f
                .debug_struct("Tag")
                .field("name", &tag.name)
                .field("key", &tag.key)
                .field("attrs", &tag.attrs)
                .field("children", &tag.children)
                .finish(),
            Instance::Text(value) => f.debug_tuple("Text").field(value).finish(),
            Instance::Comment(value) => f.debug_tuple("Comment").field(value).finish(),
            Instance::Component(invocation) => fmt::Debug::fmt(invocation, f),
        }
    }
}

impl From<TagNode> for Instance {
    fn from(tag: TagNode) -> Self {
        Instance::Tag(Rc::new(tag))
    }
}

// =============================================================================
// Element
// =============================================================================

/// What a component renders.
///
/// Nested lists are flattened; empty positions become placeholder comments
/// so siblings keep their positions.
#[derive(Debug, Clone, Default)]
pub enum Element {
    #[default]
    Empty,
    Node(Instance),
    List(Vec<Element>),
}

impl Element {
    pub fn flatten(self) -> Vec<Instance> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    pub(crate) fn flatten_into(self, out: &mut Vec<Instance>) {
        match self {
            Element::Empty => out.push(Instance::empty()),
            Element::Node(instance) => out.push(instance),
            Element::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

impl From<Instance> for Element {
    fn from(instance: Instance) -> Self {
        Element::Node(instance)
    }
}

impl From<TagNode> for Element {
    fn from(tag: TagNode) -> Self {
        Element::Node(tag.into())
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::Node(text(value))
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Element::Node(text(value))
    }
}

impl From<()> for Element {
    fn from(_: ()) -> Self {
        Element::Empty
    }
}

impl<T: Into<Element>> From<Option<T>> for Element {
    fn from(value: Option<T>) -> Self {
        value.map_or(Element::Empty, Into::into)
    }
}

impl<T: Into<Element>> From<Vec<T>> for Element {
    fn from(items: Vec<T>) -> Self {
        Element::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Element>> FromIterator<T> for Element {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Element::List(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_keeps_positions() {
        let element = Element::List(vec![
            Element::from("a"),
            Element::Empty,
            Element::List(vec![Element::from("b"), Element::from(None::<Instance>)]),
        ]);
        let flat = element.flatten();
        assert_eq!(flat.len(), 4);
        assert!(flat[1].is_empty_placeholder());
        assert!(flat[3].is_empty_placeholder());
        assert_eq!(flat[2], text("b"));
    }

    #[test]
    fn test_type_and_key_matching() {
        let a: Instance = tag("li").key(1).into();
        let b: Instance = tag("li").key(1).attr("class", "x").into();
        let c: Instance = tag("li").key(2).into();
        let d: Instance = tag("div").key(1).into();

        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert!(!a.matches(&d));
        assert!(a.differs_for_host(&b));
        assert!(!a.differs_for_host(&a.clone()));
        assert!(text("x").same_type(&text("y")));
        assert!(!text("x").same_type(&comment("x")));
    }

    #[test]
    fn test_tag_builder() {
        let list: Instance = tag("ul")
            .children((0..3).map(|i| tag("li").key(i as i64)))
            .child(None::<TagNode>)
            .into();
        let children = list.static_children();
        assert_eq!(children.len(), 4);
        assert_eq!(children[2].key(), Some(&Key::Int(2)));
        assert!(children[3].is_empty_placeholder());
    }
}
