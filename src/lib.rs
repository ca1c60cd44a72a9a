//! # spark-fiber
//!
//! Fiber reconciliation engine for component-based UIs.
//!
//! Components describe what the UI should look like as a tree of
//! [`Element`]s. The engine keeps a tree of fibers mirroring the last
//! committed description, diffs every new description against it and
//! turns the difference into the smallest set of native mutations, which a
//! [`HostAdapter`] applies to the real target.
//!
//! ## Architecture
//!
//! ```text
//! render / setState → TaskQueue → work loop (render + reconcile, interruptible)
//!                   → commit (deletions, moves, placement, effects) → HostAdapter
//! ```
//!
//! Rendering is split into units of work so a pass can yield to the host
//! between units and be preempted by more urgent updates. Commits are never
//! interrupted.
//!
//! ## Modules
//!
//! - [`element`] - Element and instance model, components, memo, lazy,
//!   fragments, portals, shadows
//! - [`hooks`] - State, reducer, effects, memo, refs, context and boundaries
//! - [`platform`] - The host adapter contract and native handles
//! - [`root`] - Roots: creation, rendering, flushing, unmounting
//! - [`host`] - The in-memory host adapter
//! - [`types`] - Keys, priorities, effect tags and flags
//! - [`error`] - Render errors, component errors and diagnostics

pub mod commit;
pub mod config;
pub mod element;
pub mod error;
pub(crate) mod fiber;
pub mod hooks;
pub mod host;
pub mod platform;
pub(crate) mod reconciler;
pub mod root;
pub(crate) mod scheduler;
pub mod suspense;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use element::{
    comment, diff_attrs, fragment, lazy, memo, memo_with, portal, shadow, tag, text, AttrChange,
    AttrValue, Attrs, Component, ComponentId, ComponentKind, Element, Instance, NodeRef,
    RenderResult, TagNode,
};

pub use hooks::{
    create_context, error_boundary, suspense, Cleanup, Context, Dispatch, EffectPhase, ErrorReset,
    Hooks, Setter, Transition, UpdateHandle, EVERY_RENDER,
};

pub use suspense::{Pending, Resolver, Resource};

pub use error::{ComponentError, Diagnostic, RenderError, Throw};

pub use config::{RuntimeConfig, UnkeyedListPolicy};

pub use platform::{HostAdapter, Mutation, NativeHandle, WorkCallback};

pub use commit::CommitReport;

pub use host::{MemoryHost, RecordedOp};

pub use root::{
    create_root, create_root_with_config, find_root, install_host_factory, render, reset_roots,
    root_for_container, unmount_root, FiberSnapshot, RootHandle, RootId,
};
