//! Single-agent forward search (spec §4.B), parameterized over an abstract
//! heuristic and instrumented with callback hooks so the multi-agent driver
//! can interleave message processing without owning the search loop itself.

pub mod astar;
pub mod ehc;
pub mod heuristic;
pub mod lazy;
pub mod open_list;

pub use heuristic::{GoalCountHeuristic, Heuristic, MaHeuristic, MaHeuristicStatus, MaxAggregateHeuristic};
pub use open_list::OpenList;

use maplan_state::{StateId, StatePool};

/// Outcome of a single-agent search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Solved(StateId),
    NoSolution,
    /// Unwound cooperatively via [`SearchCallbacks::aborted`] (spec §5
    /// "cancellation & timeouts"), not because the open list ran dry.
    /// Distinct from `NoSolution` so a caller never mistakes an aborted run
    /// for a genuine dead end and starts dead-end verification on it.
    Aborted,
}

/// Instrumentation hooks a caller can attach to a search loop (spec §4.B,
/// §4.D "callback hooks"). Every method defaults to doing nothing, so a
/// plain single-agent run can ignore this entirely. Each hook is handed the
/// `StatePool` the search loop is already holding `&mut` to, so a
/// distributed driver can read back a node's packed bytes and cost to
/// announce it to peers without the search loop needing to know anything
/// about messages or agents.
pub trait SearchCallbacks {
    /// Called once per iteration of the main loop, after a node is popped
    /// but before it's expanded; the distributed driver uses this to drain
    /// its message queue without missing a beat between expansions.
    fn post_step(&mut self, _pool: &StatePool) {}

    /// Called for every successor generated during an expansion, whether or
    /// not it ends up being pushed to the open list.
    fn expanded_node(&mut self, _id: StateId, _pool: &StatePool) {}

    /// Called exactly once, when a goal state is reached.
    fn reached_goal(&mut self, _id: StateId, _pool: &StatePool) {}

    /// Called when a node the heuristic previously marked a dead end (or
    /// `Pending`, if using an MA heuristic) is about to be skipped.
    fn dead_end(&mut self, _id: StateId, _pool: &StatePool) {}

    /// Checked once per iteration, right after `post_step`. A `true` here
    /// unwinds the loop immediately with `SearchOutcome::Aborted` instead of
    /// continuing. The cooperative flag a hard-limit monitor or a signal
    /// handler flips (spec §5).
    fn aborted(&self) -> bool {
        false
    }
}

/// A [`SearchCallbacks`] that does nothing, for tests and standalone runs.
pub struct NoCallbacks;
impl SearchCallbacks for NoCallbacks {}
