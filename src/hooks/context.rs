//! Context: values provided to a subtree.
//!
//! A provider keeps the value of its render on its own fiber, so a pass
//! reads the value it rendered while the committed tree keeps the committed
//! one. Subscriptions live in the [`ProviderMap`] shared by every version of
//! the provider fiber; it takes the new value when the provider commits and
//! re-renders exactly the consumers whose value changed.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Hooks, RcIdentity};
use crate::element::{Component, ComponentKind, Element, Instance};
use crate::fiber::ProviderMap;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

/// Props of a context provider.
pub struct ProviderProps<T> {
    value: Rc<T>,
    children: Vec<Instance>,
}

/// A typed context with a default value.
pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
    provider: Component<ProviderProps<T>>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
            provider: self.provider.clone(),
        }
    }
}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

/// Create a context. Consumers outside any provider see `default`.
pub fn create_context<T: 'static>(default: T) -> Context<T> {
    let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
    let provider = Component::with_kind(
        "ContextProvider",
        ComponentKind::Provider,
        move |props: &ProviderProps<T>, hooks| {
            hooks.provide_value(id, props.value.clone());
            Ok(props.children.iter().cloned().collect::<Element>())
        },
    );
    Context {
        id,
        default: Rc::new(default),
        provider,
    }
}

impl<T: 'static> Context<T> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn default_value(&self) -> Rc<T> {
        self.default.clone()
    }

    /// Provide `value` to `children`.
    ///
    /// Consumers are notified when the provided `Rc` changes identity.
    pub fn provider(&self, value: Rc<T>, children: impl Into<Element>) -> Instance {
        self.provider.call(ProviderProps {
            value,
            children: children.into().flatten(),
        })
    }
}

impl Hooks<'_> {
    pub(crate) fn provide_value(&mut self, context: ContextId, value: Rc<dyn Any>) {
        self.out.provided = Some((context.0, value.clone()));
        let map = self
            .out
            .providers
            .get_or_insert_with(ProviderMap::default)
            .clone();
        self.use_layout_effect(Some(RcIdentity(value.clone())), move || {
            map.set_value(context.0, value);
            map.notify(context.0);
            None
        });
    }

    /// Current value of `context` for this component.
    pub fn use_context<T: 'static>(&mut self, context: &Context<T>) -> Rc<T> {
        let id = context.id.0;
        let provider = self.tree.parent(self.fiber).and_then(|parent| {
            self.tree.find_ancestor(parent, |fiber| match &fiber.provided {
                Some((provided, value)) if *provided == id => {
                    Some((value.clone(), fiber.providers.clone()))
                }
                _ => None,
            })
        });
        let (value, provider) = match provider {
            Some((value, map)) => (value.downcast::<T>().ok(), map),
            None => (None, None),
        };
        let value = value.unwrap_or_else(|| context.default.clone());

        let seen = self.value_slot(None, || RefCell::new(None::<RcIdentity>));
        *seen.borrow_mut() = Some(RcIdentity(value.clone()));

        let update = self.use_update();
        let provider_id = provider.as_ref().map(ProviderMap::ptr_id);
        self.use_layout_effect(Some(provider_id), move || {
            let map = provider?;
            let subscription = map.subscribe(
                id,
                Rc::new(move |next: &Rc<dyn Any>| {
                    let next = RcIdentity(next.clone());
                    if seen.borrow().as_ref() != Some(&next) {
                        update.update();
                    }
                }),
            );
            Some(Box::new(move || map.unsubscribe(id, subscription)))
        });
        value
    }
}
