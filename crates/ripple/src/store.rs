//! State ownership and the state-effects convergence loop
//!
//! A change request is resolved in two phases so that no borrow of the store
//! has to be held while host code runs:
//!
//! 1. [`StateStore::converge`] takes a snapshot and repeatedly asks for
//!    second-order effects until a round changes nothing.
//! 2. [`StateStore::commit`] publishes the converged snapshot, unless nothing
//!    changed and a state was already published.

use crate::{ChangeSet, Changes, ReactiveError, State};

/// Result of running the convergence loop on a snapshot
#[derive(Debug, Clone)]
pub struct Convergence {
    state: State,
    changed: ChangeSet,
    iterations: usize,
}

impl Convergence {
    /// The converged candidate state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Every field changed across all rounds
    pub fn changed(&self) -> &ChangeSet {
        &self.changed
    }

    /// Rounds that produced a substantive change
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

/// Owns the published state of one component instance
#[derive(Debug)]
pub struct StateStore {
    state: Option<State>,
    max_iterations: usize,
}

impl StateStore {
    /// Create a store with no published state yet
    pub fn new(max_iterations: usize) -> Self {
        Self {
            state: None,
            max_iterations: max_iterations.max(1),
        }
    }

    /// The published state, if any has been published
    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    /// The published state, or the empty state before the first publish
    pub fn snapshot(&self) -> State {
        self.state.clone().unwrap_or_default()
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Apply `changes` to a copy of `base` and iterate state effects to a fixed point
    ///
    /// Each round diffs the pending effects against the working copy. A round
    /// with no substantive change ends the loop. Otherwise the effects are
    /// merged, the round's changed fields are accumulated, and `effects` is
    /// asked for the next round given the working copy and that round's fields.
    ///
    /// Fails with [`ReactiveError::EffectsDidNotConverge`] once more than
    /// `max_iterations` rounds changed something. `base` is never modified.
    pub fn converge<F>(
        base: &State,
        changes: Changes,
        max_iterations: usize,
        mut effects: F,
    ) -> Result<Convergence, ReactiveError>
    where
        F: FnMut(&State, &ChangeSet) -> Changes,
    {
        let mut working = base.clone();
        let mut changed = ChangeSet::new();
        let mut pending = changes;
        let mut iterations = 0;

        loop {
            let round = working.fields_changed(&pending);
            if round.is_empty() {
                break;
            }
            if iterations >= max_iterations {
                return Err(ReactiveError::EffectsDidNotConverge {
                    iterations,
                    fields: round.iter().map(String::from).collect(),
                });
            }
            iterations += 1;

            working.apply(&pending);
            changed.merge(&round);
            log::trace!("state effects round {iterations}: changed {round:?}");

            pending = effects(&working, &round);
        }

        Ok(Convergence {
            state: working,
            changed,
            iterations,
        })
    }

    /// Publish a converged state
    ///
    /// Returns the changed fields when the state was published, or `None` when
    /// the request was a no-op. The very first commit always publishes, even
    /// with no changed fields.
    pub fn commit(&mut self, convergence: Convergence) -> Option<ChangeSet> {
        let first = self.state.is_none();
        if convergence.changed.is_empty() && !first {
            return None;
        }
        self.state = Some(convergence.state);
        Some(convergence.changed)
    }

    /// Converge against the published state and commit in one step
    pub fn apply<F>(
        &mut self,
        changes: Changes,
        effects: F,
    ) -> Result<Option<ChangeSet>, ReactiveError>
    where
        F: FnMut(&State, &ChangeSet) -> Changes,
    {
        let convergence = Self::converge(&self.snapshot(), changes, self.max_iterations, effects)?;
        Ok(self.commit(convergence))
    }
}
