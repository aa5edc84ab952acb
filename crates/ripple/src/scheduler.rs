//! Render batching and lifecycle bookkeeping
//!
//! [`RenderScheduler`] tracks everything that has changed since the last
//! render and the flags that surround a render pass. It never calls host code
//! itself; [`Element`](crate::Element) drives it and calls the host between
//! the steps of a flush:
//!
//! ```text
//! begin_flush ─► RenderingGuard (render) ─► FlushGuard::rendered
//!             ─► rendered callback ─► drop FlushGuard
//! ```
//!
//! The guards restore flags on every exit path, including errors and panics
//! in host callbacks.

use crate::ChangeSet;
use std::cell::RefCell;

/// Where a component instance is in its render lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// No state has been applied yet
    Constructed,
    /// Default state applied, never rendered
    FirstRenderPending,
    /// Rendered and nothing scheduled
    Idle,
    /// A flush is queued on the microtask queue
    BatchScheduled,
    /// Inside render or post-render
    Flushing,
    /// Torn down; nothing will render again
    Destroyed,
}

/// Per-instance pending diff and render flags
#[derive(Debug, Default)]
pub struct RenderScheduler {
    /// Union of every change set published since the last render
    pending: ChangeSet,
    /// `None` before any render, `Some(true)` during the first, then `Some(false)`
    first_render: Option<bool>,
    rendering: bool,
    flushing: bool,
    raise_change_events: bool,
    raise_change_events_next: bool,
    /// Flush tasks queued but not yet started
    scheduled: usize,
    destroyed: bool,
}

/// What a flush that is going ahead will render
#[derive(Debug)]
pub struct FlushPlan {
    /// Snapshot of the pending diff
    pub changed: ChangeSet,
    /// `raise_change_events` as it was before the flush
    pub saved_raise_change_events: bool,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a published change set into the pending diff
    pub fn mark_changed(&mut self, changed: &ChangeSet) {
        self.pending.merge(changed);
    }

    /// Record that a flush has been queued for a published change
    ///
    /// A user-triggered change makes the next render raise change events; the
    /// intent sticks until a flush consumes it.
    pub fn notify(&mut self, user_triggered: bool) {
        if user_triggered {
            self.raise_change_events_next = true;
        }
        self.scheduled += 1;
    }

    /// A queued flush task has started running
    pub fn task_started(&mut self) {
        self.scheduled = self.scheduled.saturating_sub(1);
    }

    /// Decide whether a flush renders, and if so, enter flushing mode
    ///
    /// The first flush always renders. Later flushes render only when the
    /// pending diff is non-empty; otherwise `None` is returned and no flag is
    /// touched except marking the first render as underway.
    pub fn begin_flush(&mut self) -> Option<FlushPlan> {
        if self.destroyed {
            return None;
        }

        let changed = self.pending.clone();

        if self.first_render.is_none() {
            self.first_render = Some(true);
        }

        if self.first_render == Some(false) && changed.is_empty() {
            return None;
        }

        let saved_raise_change_events = self.raise_change_events;
        self.raise_change_events = self.raise_change_events_next;
        self.flushing = true;

        Some(FlushPlan {
            changed,
            saved_raise_change_events,
        })
    }

    pub fn pending(&self) -> &ChangeSet {
        &self.pending
    }

    pub fn first_render(&self) -> Option<bool> {
        self.first_render
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    pub fn raise_change_events(&self) -> bool {
        self.raise_change_events
    }

    pub fn set_raise_change_events(&mut self, raise: bool) {
        self.raise_change_events = raise;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    /// Current lifecycle stage; `has_state` tells whether any state was published
    pub fn lifecycle(&self, has_state: bool) -> Lifecycle {
        if self.destroyed {
            Lifecycle::Destroyed
        } else if self.flushing {
            Lifecycle::Flushing
        } else if !has_state {
            Lifecycle::Constructed
        } else if self.scheduled > 0 {
            Lifecycle::BatchScheduled
        } else if self.first_render != Some(false) {
            Lifecycle::FirstRenderPending
        } else {
            Lifecycle::Idle
        }
    }
}

/// Holds `rendering` set for the duration of a render callback
pub struct RenderingGuard<'a> {
    scheduler: &'a RefCell<RenderScheduler>,
}

impl<'a> RenderingGuard<'a> {
    pub fn enter(scheduler: &'a RefCell<RenderScheduler>) -> Self {
        scheduler.borrow_mut().rendering = true;
        Self { scheduler }
    }
}

impl Drop for RenderingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut scheduler) = self.scheduler.try_borrow_mut() {
            scheduler.rendering = false;
        }
    }
}

/// Restores the raise-events flags and leaves flushing mode when dropped
///
/// If the render step completed, dropping also marks the first render done.
pub struct FlushGuard<'a> {
    scheduler: &'a RefCell<RenderScheduler>,
    saved_raise_change_events: bool,
    rendered: bool,
}

impl<'a> FlushGuard<'a> {
    pub fn new(scheduler: &'a RefCell<RenderScheduler>, plan: &FlushPlan) -> Self {
        Self {
            scheduler,
            saved_raise_change_events: plan.saved_raise_change_events,
            rendered: false,
        }
    }

    /// The render callback succeeded: clear the pending diff
    pub fn rendered(&mut self) {
        self.scheduler.borrow_mut().pending = ChangeSet::new();
        self.rendered = true;
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut scheduler) = self.scheduler.try_borrow_mut() {
            if self.rendered {
                scheduler.first_render = Some(false);
            }
            scheduler.raise_change_events = self.saved_raise_change_events;
            scheduler.raise_change_events_next = self.saved_raise_change_events;
            scheduler.flushing = false;
        }
    }
}
