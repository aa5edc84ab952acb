/// Default bound on state-effects rounds for a single change request
pub const DEFAULT_MAX_EFFECT_ITERATIONS: usize = 100;

/// Construction-time configuration for an [`Element`](crate::Element)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementOptions {
    /// Expose the current state through `Element::debug_state` and `Debug`
    pub expose_state_for_debugging: bool,
    /// Rounds of state effects allowed before a change request fails
    pub max_effect_iterations: usize,
}

impl ElementOptions {
    /// Default options: state hidden, default iteration bound
    pub const fn new() -> Self {
        Self {
            expose_state_for_debugging: false,
            max_effect_iterations: DEFAULT_MAX_EFFECT_ITERATIONS,
        }
    }

    /// Default options with state exposed for debugging
    pub const fn debug() -> Self {
        Self::new().with_exposed_state(true)
    }

    /// Enable or disable debug state exposure
    pub const fn with_exposed_state(mut self, enabled: bool) -> Self {
        self.expose_state_for_debugging = enabled;
        self
    }

    /// Set the state-effects iteration bound (at least one round)
    pub const fn with_max_effect_iterations(mut self, iterations: usize) -> Self {
        self.max_effect_iterations = if iterations == 0 { 1 } else { iterations };
        self
    }
}

impl Default for ElementOptions {
    fn default() -> Self {
        Self::new()
    }
}
