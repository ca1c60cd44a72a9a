//! Root registry - the roots alive on this thread and the host factory
//! used by [`render`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::element::Element;
use crate::error::RenderError;
use crate::platform::{HostAdapter, NativeHandle};

use super::{RootHandle, RootId, RootInner};

/// Builds the host adapter for a container passed to [`render`].
pub type HostFactory = dyn Fn(&NativeHandle) -> Box<dyn HostAdapter>;

// =============================================================================
// Registry State
// =============================================================================

thread_local! {
    /// Mounted roots by id.
    static ROOTS: RefCell<HashMap<RootId, Rc<RootInner>>> = RefCell::new(HashMap::new());

    /// Host factory installed for `render`.
    static HOST_FACTORY: RefCell<Option<Rc<HostFactory>>> = const { RefCell::new(None) };

    /// Next root id.
    static NEXT_ROOT_ID: Cell<u64> = const { Cell::new(1) };
}

fn allocate_id() -> RootId {
    NEXT_ROOT_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        RootId(id)
    })
}

// =============================================================================
// Creation
// =============================================================================

/// Create a root rendering into `container` through `host`.
pub fn create_root(container: &NativeHandle, host: impl HostAdapter + 'static) -> RootHandle {
    create_root_with_config(container, host, RuntimeConfig::default())
}

pub fn create_root_with_config(
    container: &NativeHandle,
    host: impl HostAdapter + 'static,
    config: RuntimeConfig,
) -> RootHandle {
    register(container, Box::new(host), config)
}

fn register(container: &NativeHandle, host: Box<dyn HostAdapter>, config: RuntimeConfig) -> RootHandle {
    let id = allocate_id();
    let inner = RootInner::new(id, container.clone(), host, config);
    ROOTS.with(|roots| roots.borrow_mut().insert(id, inner.clone()));
    tracing::debug!(root = %id, "root created");
    RootHandle::new(inner)
}

/// Install the factory [`render`] uses for containers without a root.
pub fn install_host_factory(factory: impl Fn(&NativeHandle) -> Box<dyn HostAdapter> + 'static) {
    HOST_FACTORY.with(|slot| *slot.borrow_mut() = Some(Rc::new(factory)));
}

/// Render `element` into `container`, creating its root on first use.
///
/// The render is scheduled, not performed. Fails with
/// [`RenderError::NoHostFactory`] when a root must be created and no
/// factory was installed.
pub fn render(element: impl Into<Element>, container: &NativeHandle) -> Result<RootHandle, RenderError> {
    let root = match root_for_container(container) {
        Some(root) => root,
        None => {
            let factory = HOST_FACTORY
                .with(|slot| slot.borrow().clone())
                .ok_or(RenderError::NoHostFactory)?;
            let host = factory(container);
            register(container, host, RuntimeConfig::default())
        }
    };
    root.render(element);
    Ok(root)
}

// =============================================================================
// Lookup And Removal
// =============================================================================

pub fn find_root(id: RootId) -> Option<RootHandle> {
    ROOTS.with(|roots| roots.borrow().get(&id).cloned().map(RootHandle::new))
}

/// The most recently created root rendering into `container`.
pub fn root_for_container(container: &NativeHandle) -> Option<RootHandle> {
    ROOTS.with(|roots| {
        roots
            .borrow()
            .values()
            .filter(|root| root.container.ptr_eq(container))
            .max_by_key(|root| root.id)
            .cloned()
            .map(RootHandle::new)
    })
}

/// Unmount the root `id`, running every cleanup of its tree.
pub fn unmount_root(id: RootId) -> Result<(), RenderError> {
    let root = find_root(id).ok_or(RenderError::RootNotFound(id))?;
    root.unmount();
    Ok(())
}

pub(super) fn forget(id: RootId) {
    ROOTS.with(|roots| roots.borrow_mut().remove(&id));
}

/// Unmount every root and drop the host factory.
pub fn reset_roots() {
    let roots: Vec<_> = ROOTS.with(|roots| roots.borrow().values().cloned().collect());
    for root in roots {
        RootHandle::new(root).unmount();
    }
    HOST_FACTORY.with(|slot| *slot.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::tag;
    use crate::host::MemoryHost;

    #[test]
    fn test_render_without_factory_fails() {
        reset_roots();
        let host = MemoryHost::new();
        let result = render(tag("div"), &host.container());
        assert!(matches!(result, Err(RenderError::NoHostFactory)));
    }

    #[test]
    fn test_render_reuses_root_per_container() {
        reset_roots();
        let host = MemoryHost::new();
        let factory_host = host.clone();
        install_host_factory(move |_| Box::new(factory_host.clone()));

        let container = host.container();
        let first = render(tag("div"), &container).unwrap();
        let second = render(tag("span"), &container).unwrap();
        assert_eq!(first.id(), second.id());

        host.run_scheduled();
        assert_eq!(host.render_to_string(&container), "<span></span>");
        reset_roots();
    }

    #[test]
    fn test_unmount_root_by_id() {
        reset_roots();
        let host = MemoryHost::new();
        let root = create_root(&host.container(), host.clone());
        root.render(tag("div"));
        root.flush_sync();

        let id = root.id();
        unmount_root(id).unwrap();
        assert!(!root.is_mounted());
        assert!(find_root(id).is_none());
        assert!(matches!(unmount_root(id), Err(RenderError::RootNotFound(_))));
        assert_eq!(host.render_to_string(&host.container()), "");
    }
}
