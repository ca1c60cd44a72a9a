//! Component definitions and invocations.
//!
//! A [`Component<P>`] is a render function with a process-unique id. Calling
//! it with props yields an [`Instance::Component`] that the reconciler
//! compares by id and key.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Element, Instance, NodeRef};
use crate::error::Throw;
use crate::hooks::Hooks;
use crate::platform::NativeHandle;
use crate::suspense::Resource;
use crate::types::Key;

/// Result of rendering a component.
pub type RenderResult = Result<Element, Throw>;

pub(crate) type RenderFn = Rc<dyn Fn(&dyn Any, &mut Hooks<'_>) -> RenderResult>;
pub(crate) type ShouldUpdateFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a component definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Engine-level role of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Plain,
    /// Skips rendering when `should_update` says props did not change.
    Memo,
    Fragment,
    Provider,
    Suspense,
    ErrorBoundary,
    /// Renders its children into a detached native target.
    Portal,
    /// Keeps its children mounted while their native nodes are hidden.
    Shadow,
}

pub(crate) struct ComponentDef {
    pub(crate) id: ComponentId,
    pub(crate) name: &'static str,
    pub(crate) kind: ComponentKind,
    pub(crate) render: RenderFn,
    pub(crate) should_update: Option<ShouldUpdateFn>,
}

// Pins closure signatures to the higher-ranked form the aliases need.
fn render_fn<F>(f: F) -> F
where
    F: Fn(&dyn Any, &mut Hooks<'_>) -> RenderResult,
{
    f
}

fn should_update_fn<F>(f: F) -> F
where
    F: Fn(&dyn Any, &dyn Any) -> bool,
{
    f
}

// =============================================================================
// Component
// =============================================================================

/// A reusable component with props of type `P`.
pub struct Component<P> {
    def: Rc<ComponentDef>,
    _props: PhantomData<fn(P)>,
}

impl<P> Clone for Component<P> {
    fn clone(&self) -> Self {
        Self {
            def: self.def.clone(),
            _props: PhantomData,
        }
    }
}

impl<P: 'static> Component<P> {
    /// Define a component from its render function.
    pub fn new<F>(name: &'static str, render: F) -> Self
    where
        F: Fn(&P, &mut Hooks<'_>) -> RenderResult + 'static,
    {
        Self::with_kind(name, ComponentKind::Plain, render)
    }

    pub(crate) fn with_kind<F>(name: &'static str, kind: ComponentKind, render: F) -> Self
    where
        F: Fn(&P, &mut Hooks<'_>) -> RenderResult + 'static,
    {
        let render: RenderFn = Rc::new(render_fn(move |props, hooks| {
            match props.downcast_ref::<P>() {
                Some(props) => render(props, hooks),
                None => Err(Throw::msg(format!("{name} received props of another type"))),
            }
        }));
        Self {
            def: Rc::new(ComponentDef {
                id: ComponentId::next(),
                name,
                kind,
                render,
                should_update: None,
            }),
            _props: PhantomData,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.def.id
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// Invoke the component.
    pub fn call(&self, props: P) -> Instance {
        self.invoke(props, None, None)
    }

    /// Invoke the component with a key.
    pub fn keyed(&self, key: impl Into<Key>, props: P) -> Instance {
        self.invoke(props, Some(key.into()), None)
    }

    /// Invoke the component forwarding a node ref to it.
    pub fn with_ref(&self, node_ref: &NodeRef, props: P) -> Instance {
        self.invoke(props, None, Some(node_ref.clone()))
    }

    fn invoke(&self, props: P, key: Option<Key>, forwarded_ref: Option<NodeRef>) -> Instance {
        Instance::Component(ComponentInvocation {
            def: self.def.clone(),
            props: Rc::new(props),
            key,
            forwarded_ref,
        })
    }
}

impl<P> fmt::Debug for Component<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.def.name)
            .field("id", &self.def.id)
            .finish()
    }
}

// =============================================================================
// Memo
// =============================================================================

/// Skip re-rendering while props compare equal.
pub fn memo<P: PartialEq + 'static>(component: Component<P>) -> Component<P> {
    memo_with(component, |prev: &P, next: &P| prev != next)
}

/// Skip re-rendering unless `should_update(prev, next)` returns true.
pub fn memo_with<P, F>(component: Component<P>, should_update: F) -> Component<P>
where
    P: 'static,
    F: Fn(&P, &P) -> bool + 'static,
{
    let should_update: ShouldUpdateFn = Rc::new(should_update_fn(move |prev, next| {
        match (prev.downcast_ref::<P>(), next.downcast_ref::<P>()) {
            (Some(prev), Some(next)) => should_update(prev, next),
            _ => true,
        }
    }));
    Component {
        def: Rc::new(ComponentDef {
            id: ComponentId::next(),
            name: component.def.name,
            kind: ComponentKind::Memo,
            render: component.def.render.clone(),
            should_update: Some(should_update),
        }),
        _props: PhantomData,
    }
}

// =============================================================================
// Invocation
// =============================================================================

/// A component call site: definition, props and identity.
#[derive(Clone)]
pub struct ComponentInvocation {
    pub(crate) def: Rc<ComponentDef>,
    pub(crate) props: Rc<dyn Any>,
    pub(crate) key: Option<Key>,
    pub(crate) forwarded_ref: Option<NodeRef>,
}

impl ComponentInvocation {
    pub fn id(&self) -> ComponentId {
        self.def.id
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    pub fn kind(&self) -> ComponentKind {
        self.def.kind
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn props<P: 'static>(&self) -> Option<&P> {
        self.props.downcast_ref::<P>()
    }

    pub fn forwarded_ref(&self) -> Option<&NodeRef> {
        self.forwarded_ref.as_ref()
    }

    /// Memo check against the previous invocation at the same position.
    pub(crate) fn should_update(&self, prev: &ComponentInvocation) -> bool {
        match &self.def.should_update {
            Some(should_update) => should_update(&*prev.props, &*self.props),
            None => true,
        }
    }

    pub(crate) fn portal_target(&self) -> Option<NativeHandle> {
        if self.def.kind != ComponentKind::Portal {
            return None;
        }
        self.props::<PortalProps>().map(|props| props.target.clone())
    }

    /// A shadow invocation whose children are hidden.
    pub(crate) fn is_hidden_shadow(&self) -> bool {
        self.def.kind == ComponentKind::Shadow
            && self.props::<ShadowProps>().is_some_and(|props| !props.visible)
    }

    pub(crate) fn render(&self, hooks: &mut Hooks<'_>) -> RenderResult {
        (self.def.render)(&*self.props, hooks)
    }
}

impl PartialEq for ComponentInvocation {
    fn eq(&self, other: &Self) -> bool {
        self.def.id == other.def.id
            && Rc::ptr_eq(&self.props, &other.props)
            && self.key == other.key
    }
}

impl fmt::Debug for ComponentInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.def.name)
            .field("kind", &self.def.kind)
            .field("key", &self.key)
            .finish()
    }
}

// =============================================================================
// Built-ins
// =============================================================================

pub(crate) struct FragmentProps {
    children: Vec<Instance>,
}

pub(crate) struct PortalProps {
    pub(crate) target: NativeHandle,
    children: Vec<Instance>,
}

pub(crate) struct ShadowProps {
    visible: bool,
    children: Vec<Instance>,
}

thread_local! {
    static FRAGMENT: Component<FragmentProps> = Component::with_kind(
        "Fragment",
        ComponentKind::Fragment,
        |props: &FragmentProps, _| Ok(Element::List(props.children.iter().cloned().map(Element::Node).collect())),
    );

    static PORTAL: Component<PortalProps> = Component::with_kind(
        "Portal",
        ComponentKind::Portal,
        |props: &PortalProps, _| Ok(Element::List(props.children.iter().cloned().map(Element::Node).collect())),
    );

    static SHADOW: Component<ShadowProps> = Component::with_kind(
        "Shadow",
        ComponentKind::Shadow,
        |props: &ShadowProps, _| Ok(Element::List(props.children.iter().cloned().map(Element::Node).collect())),
    );
}

/// Group children under one (optionally keyed) position.
pub fn fragment(key: Option<Key>, children: impl Into<Element>) -> Instance {
    let props = FragmentProps {
        children: children.into().flatten(),
    };
    FRAGMENT.with(|component| match key {
        Some(key) => component.keyed(key, props),
        None => component.call(props),
    })
}

/// Render `children` into `target` instead of the parent's native node.
pub fn portal(target: &NativeHandle, children: impl Into<Element>) -> Instance {
    let props = PortalProps {
        target: target.clone(),
        children: children.into().flatten(),
    };
    PORTAL.with(|component| component.call(props))
}

/// Keep `children` mounted whether or not they are shown.
///
/// While `visible` is false the subtree keeps its fibers, state and native
/// nodes, but its native nodes are taken out of their parent. Showing it
/// again puts the same nodes back in place.
pub fn shadow(visible: bool, children: impl Into<Element>) -> Instance {
    let props = ShadowProps {
        visible,
        children: children.into().flatten(),
    };
    SHADOW.with(|component| component.call(props))
}

/// A component whose definition is loaded on first use.
///
/// `loader` runs once, on the first render of any invocation, and returns
/// the resource the definition arrives through. Until it resolves the
/// nearest suspense boundary shows its fallback. Props and a forwarded ref
/// are passed on to the loaded component.
pub fn lazy<P, F>(loader: F) -> Component<P>
where
    P: Clone + 'static,
    F: Fn() -> Resource<Component<P>> + 'static,
{
    let loaded: RefCell<Option<Resource<Component<P>>>> = RefCell::new(None);
    Component::new("Lazy", move |props: &P, hooks| {
        let resource = loaded.borrow_mut().get_or_insert_with(&loader).clone();
        let component = resource.read()?;
        let instance = match hooks.forwarded_ref() {
            Some(node_ref) => component.with_ref(&node_ref, props.clone()),
            None => component.call(props.clone()),
        };
        Ok(instance.into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::text;

    #[test]
    fn test_ids_are_unique() {
        let a: Component<()> = Component::new("A", |_, _| Ok(Element::Empty));
        let b: Component<()> = Component::new("A", |_, _| Ok(Element::Empty));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
        assert!(a.call(()).same_type(&a.call(())));
        assert!(!a.call(()).same_type(&b.call(())));
    }

    #[test]
    fn test_memo_is_a_distinct_type() {
        let plain: Component<u32> = Component::new("Row", |n: &u32, _| Ok(text(n.to_string()).into()));
        let memoized = memo(plain.clone());
        assert_ne!(plain.id(), memoized.id());

        let prev = memoized.call(1);
        let same = memoized.call(1);
        let changed = memoized.call(2);
        let (Instance::Component(prev), Instance::Component(same), Instance::Component(changed)) =
            (prev, same, changed)
        else {
            unreachable!()
        };
        assert!(!same.should_update(&prev));
        assert!(changed.should_update(&prev));
    }

    #[test]
    fn test_fragment_and_portal_ids_are_stable() {
        let a = fragment(None, vec![text("a")]);
        let b = fragment(Some(Key::from(1)), vec![text("b")]);
        assert!(a.same_type(&b));
        assert_eq!(b.key(), Some(&Key::Int(1)));

        let target = NativeHandle::new(0u8);
        let p = portal(&target, text("x"));
        assert!(p.portal_target().is_some_and(|t| t.ptr_eq(&target)));
        assert!(a.portal_target().is_none());
    }
}
