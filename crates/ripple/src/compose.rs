//! Stacking behaviors into one host
//!
//! A component is usually assembled from several independent behaviors, each
//! owning a few state fields. [`Composed`] runs them in order, base behaviors
//! first and the host last:
//!
//! - default states merge, later layers overriding earlier ones
//! - state effects merge the same way, so one layer can react to fields
//!   another layer changed in the previous round
//! - `render` and `rendered` run on every layer; the first error stops the pass
//!
//! ```ignore
//! let host = Composed::new(MyWidget::default())
//!     .with(Defaults::new(changes! { "selected_index" => -1 }))
//!     .with(FnEffects::new(|state, changed| clamp_selection(state, changed)));
//! let element = Element::new(host, queue.spawner())?;
//! ```

use crate::{Behavior, ChangeSet, Changes, Diagnostic, Element, HostError, ReactiveHost, State};
use std::rc::Rc;

/// A host decorated with an ordered list of behaviors
pub struct Composed<H> {
    behaviors: Vec<Box<dyn Behavior>>,
    host: H,
}

impl<H: ReactiveHost> Composed<H> {
    pub fn new(host: H) -> Self {
        Self {
            behaviors: Vec::new(),
            host,
        }
    }

    /// Add a behavior after the ones already present
    pub fn with(mut self, behavior: impl Behavior + 'static) -> Self {
        self.behaviors.push(Box::new(behavior));
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Number of behaviors, not counting the host
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    fn layers(&self) -> impl Iterator<Item = &dyn Behavior> {
        self.behaviors
            .iter()
            .map(|behavior| behavior.as_ref() as &dyn Behavior)
            .chain(std::iter::once(&self.host as &dyn Behavior))
    }
}

impl<H: ReactiveHost> Behavior for Composed<H> {
    fn default_state(&self) -> Changes {
        let mut state = Changes::new();
        for layer in self.layers() {
            state.merge(layer.default_state());
        }
        state
    }

    fn state_effects(&self, state: &State, changed: &ChangeSet) -> Changes {
        let mut effects = Changes::new();
        for layer in self.layers() {
            effects.merge(layer.state_effects(state, changed));
        }
        effects
    }

    fn render(&self, element: &Element, changed: &ChangeSet) -> Result<(), HostError> {
        for layer in self.layers() {
            layer.render(element, changed)?;
        }
        Ok(())
    }

    fn rendered(&self, element: &Element, changed: &ChangeSet) -> Result<(), HostError> {
        for layer in self.layers() {
            layer.rendered(element, changed)?;
        }
        Ok(())
    }
}

impl<H: ReactiveHost> ReactiveHost for Composed<H> {
    fn is_active(&self) -> bool {
        self.host.is_active()
    }

    fn diagnostic(&self, element: &Element, diagnostic: &Diagnostic) {
        self.host.diagnostic(element, diagnostic);
    }
}

/// A behavior that only contributes default field values
#[derive(Debug, Clone, Default)]
pub struct Defaults(Changes);

impl Defaults {
    pub fn new(defaults: Changes) -> Self {
        Self(defaults)
    }
}

impl Behavior for Defaults {
    fn default_state(&self) -> Changes {
        self.0.clone()
    }
}

/// A behavior whose state effects come from a closure
pub struct FnEffects<F>(F);

impl<F> FnEffects<F>
where
    F: Fn(&State, &ChangeSet) -> Changes,
{
    pub fn new(effects: F) -> Self {
        Self(effects)
    }
}

impl<F> Behavior for FnEffects<F>
where
    F: Fn(&State, &ChangeSet) -> Changes,
{
    fn state_effects(&self, state: &State, changed: &ChangeSet) -> Changes {
        (self.0)(state, changed)
    }
}

// Shared hosts let the owner keep a handle to inspect them after handing one to an element.
impl<T: Behavior + ?Sized> Behavior for Rc<T> {
    fn default_state(&self) -> Changes {
        (**self).default_state()
    }

    fn state_effects(&self, state: &State, changed: &ChangeSet) -> Changes {
        (**self).state_effects(state, changed)
    }

    fn render(&self, element: &Element, changed: &ChangeSet) -> Result<(), HostError> {
        (**self).render(element, changed)
    }

    fn rendered(&self, element: &Element, changed: &ChangeSet) -> Result<(), HostError> {
        (**self).rendered(element, changed)
    }
}

impl<T: ReactiveHost + ?Sized> ReactiveHost for Rc<T> {
    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn diagnostic(&self, element: &Element, diagnostic: &Diagnostic) {
        (**self).diagnostic(element, diagnostic)
    }
}
