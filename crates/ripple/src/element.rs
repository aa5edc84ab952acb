//! Per-instance reactive element
//!
//! An [`Element`] ties together the state store, the render scheduler, the
//! host callbacks, and a microtask queue:
//!
//! 1. [`Element::request_change`] converges the requested changes with the
//!    host's state effects and publishes the result.
//! 2. If anything changed and the host is active, a flush is deferred onto the
//!    microtask queue. Further changes made before the queue drains join the
//!    same batch.
//! 3. The flush renders the accumulated changes once, then runs the host's
//!    post-render callback.
//!
//! # Example
//!
//! ```ignore
//! let queue = Microtasks::new();
//! let element = Element::new(Counter, queue.spawner())?;
//!
//! let task = element.request_change(changes! { "count" => 11 })?;
//! let _ = element.request_change(changes! { "label" => "eleven" })?;
//!
//! // One render with {count, done, label}
//! queue.run_until(task)?;
//! ```

use crate::{
    ChangeSet, Changes, Diagnostic, ElementOptions, FlushGuard, Lifecycle, MicrotaskSpawner,
    ReactiveError, ReactiveHost, RenderScheduler, RenderTask, RenderingGuard, State, StateStore,
};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Handle to one reactive component instance
///
/// Cloning the handle does not clone the element; all clones refer to the same
/// state. Flushes already queued hold only a weak reference, so dropping every
/// handle discards the element and its queued flushes become no-ops.
#[derive(Clone)]
pub struct Element {
    inner: Rc<ElementInner>,
}

struct ElementInner {
    host: Box<dyn ReactiveHost>,
    options: ElementOptions,
    store: RefCell<StateStore>,
    scheduler: RefCell<RenderScheduler>,
    spawner: MicrotaskSpawner,
}

impl Element {
    /// Create an element with default options
    ///
    /// The host's default state is applied immediately. If the host is active,
    /// the first render is queued on the microtask queue.
    pub fn new(
        host: impl ReactiveHost + 'static,
        spawner: MicrotaskSpawner,
    ) -> Result<Self, ReactiveError> {
        Self::with_options(host, spawner, ElementOptions::default())
    }

    /// Create an element with explicit options
    pub fn with_options(
        host: impl ReactiveHost + 'static,
        spawner: MicrotaskSpawner,
        options: ElementOptions,
    ) -> Result<Self, ReactiveError> {
        let element = Self {
            inner: Rc::new(ElementInner {
                host: Box::new(host),
                options,
                store: RefCell::new(StateStore::new(options.max_effect_iterations)),
                scheduler: RefCell::new(RenderScheduler::new()),
                spawner,
            }),
        };

        let defaults = element.inner.host.default_state();
        // Nobody awaits the initial render; a failure there is logged by the queue.
        let _initial = element.request_change(defaults)?;

        Ok(element)
    }

    // ========== State ==========

    /// The current published state
    pub fn state(&self) -> State {
        self.inner.store.borrow().snapshot()
    }

    /// Merge `changes` into state, then schedule a render if anything changed
    ///
    /// State effects are resolved synchronously, so the new state is visible
    /// through [`Element::state`] as soon as this returns. The returned task
    /// completes once the scheduled flush has run, carrying any render error;
    /// it is already complete when no flush was scheduled (nothing changed,
    /// host inactive, or element destroyed).
    ///
    /// Calling this from inside a render callback is reported to the host as
    /// [`Diagnostic::ChangeDuringRender`] but still applies the change.
    pub fn request_change(&self, changes: Changes) -> Result<RenderTask, ReactiveError> {
        let inner = &self.inner;

        if inner.scheduler.borrow().is_rendering() {
            let diagnostic = Diagnostic::ChangeDuringRender {
                fields: changes.iter().map(|(field, _)| field.to_owned()).collect(),
            };
            inner.host.diagnostic(self, &diagnostic);
        }

        let (base, max_iterations) = {
            let store = inner.store.borrow();
            (store.snapshot(), store.max_iterations())
        };
        let convergence = StateStore::converge(&base, changes, max_iterations, |state, changed| {
            inner.host.state_effects(state, changed)
        })?;

        let Some(changed) = inner.store.borrow_mut().commit(convergence) else {
            return Ok(RenderTask::ready());
        };
        log::debug!("published state change: {changed:?}");

        let (destroyed, user_triggered) = {
            let mut scheduler = inner.scheduler.borrow_mut();
            scheduler.mark_changed(&changed);
            (scheduler.is_destroyed(), scheduler.raise_change_events())
        };

        if destroyed || !inner.host.is_active() {
            return Ok(RenderTask::ready());
        }

        let element = Rc::downgrade(&self.inner);
        let task = inner.spawner.defer(move || Self::run_scheduled(element))?;
        inner.scheduler.borrow_mut().notify(user_triggered);
        Ok(task)
    }

    fn run_scheduled(element: Weak<ElementInner>) -> Result<(), ReactiveError> {
        let Some(inner) = element.upgrade() else {
            return Ok(());
        };
        let element = Element { inner };
        element.inner.scheduler.borrow_mut().task_started();
        element.render_changes()
    }

    // ========== Rendering ==========

    /// Render pending changes now
    ///
    /// Does nothing if the element has rendered before and nothing changed
    /// since. The first call always renders, even with no changes.
    pub fn render_changes(&self) -> Result<(), ReactiveError> {
        let inner = &self.inner;
        let Some(plan) = inner.scheduler.borrow_mut().begin_flush() else {
            log::trace!("skipping flush: nothing changed since last render");
            return Ok(());
        };
        log::debug!("rendering changes: {:?}", plan.changed);

        let mut flush = FlushGuard::new(&inner.scheduler, &plan);
        {
            let _rendering = RenderingGuard::enter(&inner.scheduler);
            inner
                .host
                .render(self, &plan.changed)
                .map_err(ReactiveError::Render)?;
        }
        flush.rendered();

        inner
            .host
            .rendered(self, &plan.changed)
            .map_err(ReactiveError::Rendered)
    }

    /// Attach hook: render immediately
    ///
    /// Call when the element becomes active. Renders the default state and any
    /// changes that accumulated while inactive; a no-op if already up to date.
    pub fn connected(&self) -> Result<(), ReactiveError> {
        log::debug!("element connected");
        self.render_changes()
    }

    /// Tear the element down; queued and future flushes will not render
    pub fn destroy(&self) {
        self.inner.scheduler.borrow_mut().destroy();
    }

    // ========== Flags ==========

    /// Whether the current change or render was triggered by the user
    ///
    /// Render callbacks read this to decide whether to raise change events.
    pub fn raise_change_events(&self) -> bool {
        self.inner.scheduler.borrow().raise_change_events()
    }

    /// Mark subsequent change requests as user-triggered (or not)
    pub fn set_raise_change_events(&self, raise: bool) {
        self.inner
            .scheduler
            .borrow_mut()
            .set_raise_change_events(raise);
    }

    /// Run `f` with change events enabled, restoring the previous flag after
    ///
    /// Use from input handlers so the changes they request render with
    /// [`Element::raise_change_events`] set.
    pub fn with_change_events<R>(&self, f: impl FnOnce(&Element) -> R) -> R {
        let saved = self.raise_change_events();
        self.set_raise_change_events(true);
        let result = f(self);
        self.set_raise_change_events(saved);
        result
    }

    /// `None` before any render, `Some(true)` during the first, `Some(false)` after
    pub fn first_render(&self) -> Option<bool> {
        self.inner.scheduler.borrow().first_render()
    }

    /// Whether a render callback is running right now
    pub fn is_rendering(&self) -> bool {
        self.inner.scheduler.borrow().is_rendering()
    }

    /// Fields changed since the last render
    pub fn pending_changes(&self) -> ChangeSet {
        self.inner.scheduler.borrow().pending().clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        let has_state = self.inner.store.borrow().state().is_some();
        self.inner.scheduler.borrow().lifecycle(has_state)
    }

    // ========== Debugging ==========

    pub fn options(&self) -> ElementOptions {
        self.inner.options
    }

    /// The current state as JSON, if state exposure is enabled
    pub fn debug_state(&self) -> Option<serde_json::Value> {
        if !self.inner.options.expose_state_for_debugging {
            return None;
        }
        serde_json::to_value(self.state()).ok()
    }

    /// Whether two handles refer to the same element
    pub fn ptr_eq(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Element");
        debug
            .field("lifecycle", &self.lifecycle())
            .field("first_render", &self.first_render())
            .field("pending", &self.pending_changes());
        if self.inner.options.expose_state_for_debugging {
            debug.field("state", &self.state());
        }
        debug.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{changes, Behavior, HostError, Microtasks};
    use chrono::{TimeZone, Utc};
    use std::cell::{Cell, RefCell};
    use std::panic::{self, AssertUnwindSafe};

    /// A host that records every callback it receives
    #[derive(Default)]
    struct Recorder {
        defaults: Changes,
        renders: RefCell<Vec<ChangeSet>>,
        rendered: RefCell<Vec<ChangeSet>>,
        raised: RefCell<Vec<bool>>,
        first: RefCell<Vec<Option<bool>>>,
        diagnostics: RefCell<Vec<Diagnostic>>,
        inactive: Cell<bool>,
        fail_render: Cell<bool>,
        panic_render: Cell<bool>,
        fail_rendered: Cell<bool>,
        change_in_render: RefCell<Option<Changes>>,
        change_in_rendered: RefCell<Option<Changes>>,
    }

    impl Recorder {
        fn with_defaults(defaults: Changes) -> Rc<Self> {
            Rc::new(Self {
                defaults,
                ..Self::default()
            })
        }

        fn render_count(&self) -> usize {
            self.renders.borrow().len()
        }
    }

    impl Behavior for Recorder {
        fn default_state(&self) -> Changes {
            self.defaults.clone()
        }

        fn state_effects(&self, state: &State, changed: &ChangeSet) -> Changes {
            if changed.contains("count") {
                changes! { "done" => state.get_i64("count").unwrap_or(0) > 10 }
            } else {
                Changes::new()
            }
        }

        fn render(&self, element: &Element, changed: &ChangeSet) -> Result<(), HostError> {
            assert!(element.is_rendering());
            self.renders.borrow_mut().push(changed.clone());
            self.raised.borrow_mut().push(element.raise_change_events());
            self.first.borrow_mut().push(element.first_render());
            if let Some(changes) = self.change_in_render.borrow_mut().take() {
                let _ = element.request_change(changes)?;
            }
            if self.panic_render.get() {
                panic!("render panicked");
            }
            if self.fail_render.get() {
                return Err("render exploded".into());
            }
            Ok(())
        }

        fn rendered(&self, element: &Element, changed: &ChangeSet) -> Result<(), HostError> {
            assert!(!element.is_rendering());
            self.rendered.borrow_mut().push(changed.clone());
            if let Some(changes) = self.change_in_rendered.borrow_mut().take() {
                let _ = element.request_change(changes)?;
            }
            if self.fail_rendered.get() {
                return Err("post-render exploded".into());
            }
            Ok(())
        }
    }

    impl ReactiveHost for Recorder {
        fn is_active(&self) -> bool {
            !self.inactive.get()
        }

        fn diagnostic(&self, _: &Element, diagnostic: &Diagnostic) {
            self.diagnostics.borrow_mut().push(diagnostic.clone());
        }
    }

    fn set(fields: &[&str]) -> ChangeSet {
        fields.iter().copied().collect()
    }

    fn counter() -> (Microtasks, Rc<Recorder>, Element) {
        let queue = Microtasks::new();
        let host = Recorder::with_defaults(changes! { "count" => 0 });
        let element = Element::new(host.clone(), queue.spawner()).unwrap();
        (queue, host, element)
    }

    #[test]
    fn test_first_render_happens_once() {
        let (queue, host, element) = counter();
        assert_eq!(element.lifecycle(), Lifecycle::BatchScheduled);
        assert_eq!(host.render_count(), 0);

        queue.run_until_stalled();
        assert_eq!(host.render_count(), 1);
        assert_eq!(host.renders.borrow()[0], set(&["count", "done"]));
        assert_eq!(*host.first.borrow(), vec![Some(true)]);
        assert_eq!(element.first_render(), Some(false));
        assert_eq!(element.lifecycle(), Lifecycle::Idle);

        queue.run_until_stalled();
        element.render_changes().unwrap();
        assert_eq!(host.render_count(), 1);
    }

    #[test]
    fn test_count_over_ten_sets_done() {
        let (queue, host, element) = counter();
        queue.run_until_stalled();

        let task = element.request_change(changes! { "count" => 11 }).unwrap();
        assert!(task.is_scheduled());
        queue.run_until(task).unwrap();

        let state = element.state();
        assert_eq!(state.get_i64("count"), Some(11));
        assert_eq!(state.get_bool("done"), Some(true));
        assert_eq!(host.render_count(), 2);
        assert_eq!(host.renders.borrow()[1], set(&["count", "done"]));
        assert_eq!(host.rendered.borrow()[1], set(&["count", "done"]));
    }

    #[test]
    fn test_synchronous_changes_batch_into_one_render() {
        let (queue, host, element) = counter();
        queue.run_until_stalled();

        let _ = element.request_change(changes! { "count" => 1 }).unwrap();
        let _ = element.request_change(changes! { "label" => "one" }).unwrap();
        assert_eq!(element.pending_changes(), set(&["count", "label"]));
        queue.run_until_stalled();

        assert_eq!(host.render_count(), 2);
        assert_eq!(host.renders.borrow()[1], set(&["count", "label"]));
        assert!(element.pending_changes().is_empty());
    }

    #[test]
    fn test_empty_request_is_a_no_op() {
        let (queue, host, element) = counter();
        queue.run_until_stalled();
        let before = element.state();

        let task = element.request_change(Changes::new()).unwrap();
        assert!(!task.is_scheduled());
        queue.run_until_stalled();

        assert!(element.state().ptr_eq(&before));
        assert_eq!(host.render_count(), 1);
    }

    #[test]
    fn test_same_instant_date_is_a_no_op() {
        let queue = Microtasks::new();
        let when = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let host = Recorder::with_defaults(changes! { "when" => when });
        let element = Element::new(host.clone(), queue.spawner()).unwrap();
        queue.run_until_stalled();

        let same_instant = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let task = element.request_change(changes! { "when" => same_instant }).unwrap();
        assert!(!task.is_scheduled());
        queue.run_until_stalled();

        assert_eq!(host.render_count(), 1);
        assert!(element.pending_changes().is_empty());
    }

    #[test]
    fn test_change_during_render_is_reported_not_nested() {
        let (queue, host, element) = counter();
        *host.change_in_render.borrow_mut() = Some(changes! { "label" => "late" });
        queue.run_until_stalled();

        assert_eq!(
            *host.diagnostics.borrow(),
            vec![Diagnostic::ChangeDuringRender {
                fields: vec!["label".into()]
            }]
        );
        assert_eq!(host.render_count(), 1);
        assert_eq!(element.state().get_str("label"), Some("late"));
        assert!(!element.is_rendering());
    }

    #[test]
    fn test_change_in_rendered_starts_new_batch() {
        let (queue, host, element) = counter();
        *host.change_in_rendered.borrow_mut() = Some(changes! { "count" => 3 });
        queue.run_until_stalled();

        assert!(host.diagnostics.borrow().is_empty());
        assert_eq!(host.render_count(), 2);
        assert_eq!(host.renders.borrow()[1], set(&["count"]));
        assert_eq!(*host.first.borrow(), vec![Some(true), Some(false)]);
        assert_eq!(element.state().get_i64("count"), Some(3));
    }

    #[test]
    fn test_inactive_host_accumulates_until_connected() {
        let queue = Microtasks::new();
        let host = Recorder::with_defaults(changes! { "count" => 0 });
        host.inactive.set(true);
        let element = Element::new(host.clone(), queue.spawner()).unwrap();

        let task = element.request_change(changes! { "count" => 5 }).unwrap();
        assert!(!task.is_scheduled());
        queue.run_until_stalled();
        assert_eq!(host.render_count(), 0);
        assert_eq!(element.lifecycle(), Lifecycle::FirstRenderPending);

        host.inactive.set(false);
        element.connected().unwrap();
        assert_eq!(host.render_count(), 1);
        assert_eq!(host.renders.borrow()[0], set(&["count", "done"]));

        element.connected().unwrap();
        assert_eq!(host.render_count(), 1);
    }

    #[test]
    fn test_connected_renders_empty_default_state() {
        let queue = Microtasks::new();
        let host = Recorder::with_defaults(Changes::new());
        host.inactive.set(true);
        let element = Element::new(host.clone(), queue.spawner()).unwrap();

        element.connected().unwrap();
        assert_eq!(host.render_count(), 1);
        assert!(host.renders.borrow()[0].is_empty());
    }

    #[test]
    fn test_raise_change_events_reaches_render_and_resets() {
        let (queue, host, element) = counter();
        queue.run_until_stalled();

        element.with_change_events(|element| {
            let _ = element.request_change(changes! { "count" => 1 }).unwrap();
        });
        assert!(!element.raise_change_events());
        queue.run_until_stalled();

        let _ = element.request_change(changes! { "count" => 2 }).unwrap();
        queue.run_until_stalled();

        assert_eq!(*host.raised.borrow(), vec![false, true, false]);
        assert!(!element.raise_change_events());
    }

    #[test]
    fn test_render_error_propagates_and_resets_flags() {
        let (queue, host, element) = counter();
        queue.run_until_stalled();

        host.fail_render.set(true);
        let task = element.request_change(changes! { "count" => 1 }).unwrap();
        let err = queue.run_until(task).unwrap_err();
        assert!(matches!(err, ReactiveError::Render(_)));
        assert!(err.is_host_error());
        assert!(!element.is_rendering());
        assert_eq!(element.pending_changes(), set(&["count"]));

        host.fail_render.set(false);
        element.render_changes().unwrap();
        assert_eq!(host.renders.borrow().last(), Some(&set(&["count"])));
        assert!(element.pending_changes().is_empty());
    }

    #[test]
    fn test_render_panic_resets_flags() {
        let (queue, host, element) = counter();
        queue.run_until_stalled();

        host.panic_render.set(true);
        element.with_change_events(|element| {
            let _ = element.request_change(changes! { "count" => 1 }).unwrap();
        });
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| queue.run_until_stalled()));
        assert!(outcome.is_err());

        assert!(!element.is_rendering());
        assert!(!element.raise_change_events());
        assert_eq!(element.pending_changes(), set(&["count"]));
        assert_eq!(element.first_render(), Some(false));
        assert_eq!(element.lifecycle(), Lifecycle::Idle);

        host.panic_render.set(false);
        element.render_changes().unwrap();
        assert_eq!(host.renders.borrow().last(), Some(&set(&["count"])));
        assert_eq!(*host.raised.borrow(), vec![false, true, false]);
        assert!(element.pending_changes().is_empty());
    }

    #[test]
    fn test_rendered_error_still_completes_render() {
        let queue = Microtasks::new();
        let host = Recorder::with_defaults(changes! { "count" => 0 });
        host.fail_rendered.set(true);
        let element = Element::new(host.clone(), queue.spawner()).unwrap();

        let err = element.connected().unwrap_err();
        assert!(matches!(err, ReactiveError::Rendered(_)));
        assert!(err.is_host_error());
        assert_eq!(host.render_count(), 1);
        assert_eq!(host.rendered.borrow().len(), 1);
        assert!(element.pending_changes().is_empty());
        assert_eq!(element.first_render(), Some(false));
        assert!(!element.is_rendering());

        // the queued initial flush finds nothing left to render
        queue.run_until_stalled();
        assert_eq!(host.render_count(), 1);
        assert_eq!(element.lifecycle(), Lifecycle::Idle);
    }

    #[test]
    fn test_rendered_can_create_child_elements() {
        struct Parent {
            queue: Rc<Microtasks>,
            children: RefCell<Vec<(Rc<Recorder>, Element)>>,
        }
        impl Behavior for Parent {
            fn rendered(&self, _: &Element, _: &ChangeSet) -> Result<(), HostError> {
                let host = Recorder::with_defaults(changes! { "count" => 0 });
                let child = Element::new(host.clone(), self.queue.spawner())?;
                self.children.borrow_mut().push((host, child));
                Ok(())
            }
        }
        impl ReactiveHost for Parent {}

        let queue = Rc::new(Microtasks::new());
        let parent = Rc::new(Parent {
            queue: queue.clone(),
            children: RefCell::default(),
        });
        let _element = Element::new(parent.clone(), queue.spawner()).unwrap();
        queue.run_until_stalled();

        let children = parent.children.borrow();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0.render_count(), 1);
        assert_eq!(children[0].1.first_render(), Some(false));
    }

    #[test]
    fn test_non_convergence_is_fatal() {
        struct Oscillator;
        impl Behavior for Oscillator {
            fn default_state(&self) -> Changes {
                changes! { "n" => 0 }
            }

            fn state_effects(&self, state: &State, _: &ChangeSet) -> Changes {
                changes! { "n" => state.get_i64("n").unwrap_or(0) + 1 }
            }
        }
        impl ReactiveHost for Oscillator {}

        let queue = Microtasks::new();
        let options = ElementOptions::new().with_max_effect_iterations(5);
        let element = Element::with_options(Oscillator, queue.spawner(), options);
        match element {
            Err(ReactiveError::EffectsDidNotConverge { iterations, .. }) => {
                assert_eq!(iterations, 5)
            }
            other => panic!("expected non-convergence, got {other:?}"),
        }
    }

    #[test]
    fn test_non_convergence_leaves_state_unchanged() {
        struct Runaway;
        impl Behavior for Runaway {
            fn state_effects(&self, state: &State, changed: &ChangeSet) -> Changes {
                if changed.contains("go") || changed.contains("n") {
                    changes! { "n" => state.get_i64("n").unwrap_or(0) + 1 }
                } else {
                    Changes::new()
                }
            }
        }
        impl ReactiveHost for Runaway {}

        let queue = Microtasks::new();
        let options = ElementOptions::new().with_max_effect_iterations(5);
        let element = Element::with_options(Runaway, queue.spawner(), options).unwrap();
        let before = element.state();

        let err = element.request_change(changes! { "go" => true }).unwrap_err();
        assert!(matches!(
            err,
            ReactiveError::EffectsDidNotConverge { iterations: 5, .. }
        ));
        assert!(element.state().ptr_eq(&before));
    }

    #[test]
    fn test_destroy_stops_rendering() {
        let (queue, host, element) = counter();
        element.destroy();
        queue.run_until_stalled();
        assert_eq!(host.render_count(), 0);

        let task = element.request_change(changes! { "count" => 2 }).unwrap();
        assert!(!task.is_scheduled());
        assert_eq!(element.state().get_i64("count"), Some(2));
        assert_eq!(element.lifecycle(), Lifecycle::Destroyed);
    }

    #[test]
    fn test_dropped_element_skips_queued_flush() {
        let (queue, host, element) = counter();
        drop(element);
        queue.run_until_stalled();
        assert_eq!(host.render_count(), 0);
    }

    #[test]
    fn test_debug_state_exposure() {
        let queue = Microtasks::new();
        let host = Recorder::with_defaults(changes! { "count" => 4 });

        let hidden = Element::new(host.clone(), queue.spawner()).unwrap();
        assert!(hidden.debug_state().is_none());
        assert!(!format!("{hidden:?}").contains("state"));

        let exposed =
            Element::with_options(host, queue.spawner(), ElementOptions::debug()).unwrap();
        assert_eq!(
            exposed.debug_state(),
            Some(serde_json::json!({ "count": 4, "done": false }))
        );
        assert!(format!("{exposed:?}").contains("count"));
    }
}
