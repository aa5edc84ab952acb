//! The contract between the reactive core and the component built on it
//!
//! The core owns state and decides when to render; everything visible is
//! delegated to the host through these traits.
//!
//! # Example
//!
//! ```ignore
//! use ripple::{changes, Behavior, ChangeSet, Changes, Element, HostError, ReactiveHost, State};
//!
//! struct Counter;
//!
//! impl Behavior for Counter {
//!     fn default_state(&self) -> Changes {
//!         changes! { "count" => 0 }
//!     }
//!
//!     fn state_effects(&self, state: &State, changed: &ChangeSet) -> Changes {
//!         if changed.contains("count") {
//!             changes! { "done" => state.get_i64("count").unwrap_or(0) > 10 }
//!         } else {
//!             Changes::new()
//!         }
//!     }
//!
//!     fn render(&self, element: &Element, changed: &ChangeSet) -> Result<(), HostError> {
//!         if changed.contains("count") {
//!             println!("count = {:?}", element.state().get("count"));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! impl ReactiveHost for Counter {}
//! ```

use crate::{ChangeSet, Changes, Element, HostError, State};
use std::fmt;

/// State, effects, and render hooks a component contributes
///
/// Every method has a no-op default so a behavior only implements what it
/// needs. Behaviors can be stacked with [`Composed`](crate::Composed).
pub trait Behavior {
    /// Initial field values, requested once when the element is created
    fn default_state(&self) -> Changes {
        Changes::new()
    }

    /// Second-order changes implied by `changed` fields of a proposed state
    ///
    /// Must be pure. Called repeatedly during a change request until it
    /// returns nothing that differs from `state`.
    fn state_effects(&self, state: &State, changed: &ChangeSet) -> Changes {
        let _ = (state, changed);
        Changes::new()
    }

    /// Reflect `changed` fields of the current state in the presentation
    ///
    /// Runs with [`Element::is_rendering`] set; requesting state changes here
    /// is reported as a [`Diagnostic::ChangeDuringRender`].
    fn render(&self, element: &Element, changed: &ChangeSet) -> Result<(), HostError> {
        let _ = (element, changed);
        Ok(())
    }

    /// Post-render work; may request further state changes, which start a new batch
    fn rendered(&self, element: &Element, changed: &ChangeSet) -> Result<(), HostError> {
        let _ = (element, changed);
        Ok(())
    }
}

/// The outermost host of an element: a behavior plus its environment
pub trait ReactiveHost: Behavior {
    /// Whether changes should be rendered now (e.g. attached to a live view)
    ///
    /// While inactive, changes only accumulate.
    fn is_active(&self) -> bool {
        true
    }

    /// Receives non-fatal misuse reports
    fn diagnostic(&self, element: &Element, diagnostic: &Diagnostic) {
        let _ = element;
        log::warn!("{diagnostic}");
    }
}

/// A recoverable misuse of the reactive core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// State was changed from inside a render callback
    ChangeDuringRender {
        /// Fields the offending request tried to set
        fields: Vec<String>,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ChangeDuringRender { fields } => write!(
                f,
                "state change requested during rendering (fields: {}); \
                 render callbacks should not change state",
                fields.join(", ")
            ),
        }
    }
}
