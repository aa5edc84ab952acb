//! # ripple
//!
//! Reactive state and batched rendering core for UI components.
//!
//! Each component instance owns an immutable [`State`]. Changes go through
//! [`Element::request_change`], which resolves second-order state effects to a
//! fixed point before publishing, then defers a render onto a [`Microtasks`]
//! queue so that every change made in the same turn renders together.
//!
//! ## Core Types
//!
//! - [`Element`] - Handle to one reactive component instance
//! - [`ReactiveHost`] / [`Behavior`] - Callbacks the component supplies
//! - [`Composed`] - Stacks behaviors into one host
//! - [`Microtasks`] - The queue the event loop drains between turns
//!
//! ## State
//!
//! - [`State`] - Immutable field snapshot
//! - [`Changes`] - Requested field values (see [`changes!`])
//! - [`ChangeSet`] - Fields that actually changed
//! - [`Value`] - A single field value
//!
//! ## Internals
//!
//! - [`StateStore`] - Convergence loop and publication
//! - [`RenderScheduler`] - Pending diff and render flags

mod compose;
mod element;
mod error;
mod host;
mod microtask;
mod options;
mod scheduler;
mod state;
mod store;
mod value;

pub use compose::*;
pub use element::*;
pub use error::*;
pub use host::*;
pub use microtask::*;
pub use options::*;
pub use scheduler::*;
pub use state::*;
pub use store::*;
pub use value::*;
