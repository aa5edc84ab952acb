//! Error types for the reactive core

use thiserror::Error;

/// Error raised by a host callback
pub type HostError = Box<dyn std::error::Error + Send + Sync>;

/// Failures surfaced by [`Element`](crate::Element) operations
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// State effects kept producing changes past the iteration bound
    #[error(
        "state effects did not converge after {iterations} iterations \
         (still changing: {fields:?})"
    )]
    EffectsDidNotConverge {
        /// Rounds that produced a substantive change
        iterations: usize,
        /// Fields changed by the last round
        fields: Vec<String>,
    },

    /// The host's render callback failed
    #[error("render failed: {0}")]
    Render(#[source] HostError),

    /// The host's post-render callback failed
    #[error("post-render callback failed: {0}")]
    Rendered(#[source] HostError),

    /// The microtask queue is gone, so no flush can be scheduled
    #[error("could not schedule render: {0}")]
    Spawn(#[from] futures::task::SpawnError),

    /// The scheduled flush was dropped before it ran
    #[error("scheduled render was dropped before it ran")]
    Canceled,
}

impl ReactiveError {
    /// Whether this error came from a host callback rather than the core
    pub fn is_host_error(&self) -> bool {
        matches!(self, ReactiveError::Render(_) | ReactiveError::Rendered(_))
    }
}
