use maplan_state::{AgentId, Cost, PartialState, State};

/// A single-agent heuristic: a pure function from state to an estimated
/// remaining cost (spec §4.B "Heuristic"). Search is parameterized over this
/// trait and never needs to know which concrete estimator is plugged in.
pub trait Heuristic {
    fn estimate(&mut self, state: &State) -> Option<Cost>;
}

/// Status of a multi-agent heuristic evaluation that may need to hear back
/// from other agents before it can produce a value (spec §4.B "MA
/// heuristic"). Search treats `Pending` as "come back to this node later,
/// once outstanding responses arrive" rather than as a dead end.
pub enum MaHeuristicStatus {
    Ready(Option<Cost>),
    Pending,
}

/// A heuristic whose evaluation may require requesting a contribution from
/// other agents and waiting for their response before resolving. Concrete
/// drivers poll [`MaHeuristic::poll`] after every incoming `Heur` message to
/// see whether a previously pending request is now ready.
pub trait MaHeuristic {
    /// Starts (or continues) evaluating `state`, returning immediately with
    /// whatever is already known.
    fn evaluate(&mut self, state: &State) -> MaHeuristicStatus;

    /// Feeds in a response received from `from`, returning the resolved
    /// value if this completes the outstanding request.
    fn resolve(&mut self, from: AgentId, contribution: Option<Cost>) -> Option<Cost>;
}

/// Counts goal variables not yet satisfied in `state` (the textbook "goal
/// count" heuristic). Not admissible in general - a single operator can
/// satisfy several goal atoms at once, or cost more than one unsatisfied
/// atom "should", but it's the one concrete single-agent heuristic this
/// crate ships non-abstractly (spec.md explicitly keeps h_max/h_add/h_FF/
/// LM-Cut/DTG/flow/potential out of scope), cheap to evaluate, and good
/// enough to drive both A* and EHC to a goal.
pub struct GoalCountHeuristic {
    goal: PartialState,
}

impl GoalCountHeuristic {
    pub fn new(goal: PartialState) -> Self {
        GoalCountHeuristic { goal }
    }
}

impl Heuristic for GoalCountHeuristic {
    fn estimate(&mut self, state: &State) -> Option<Cost> {
        let unsatisfied = self.goal.iter().filter(|&(v, val)| state.get(v) != val).count();
        Some(unsatisfied as Cost)
    }
}

/// Minimal concrete MA heuristic (SPEC_FULL.md supplement 4): each agent
/// locally estimates its own remaining cost over its public+private view and
/// the aggregate is their maximum, matching h-max's admissibility argument
/// without requiring a shared encoding of every agent's private operators.
pub struct MaxAggregateHeuristic<H: Heuristic> {
    local: H,
    peers: Vec<AgentId>,
    pending: Option<PendingAggregate>,
}

struct PendingAggregate {
    best: Option<Cost>,
    outstanding: Vec<AgentId>,
}

impl<H: Heuristic> MaxAggregateHeuristic<H> {
    pub fn new(local: H, peers: Vec<AgentId>) -> Self {
        MaxAggregateHeuristic {
            local,
            peers,
            pending: None,
        }
    }
}

impl<H: Heuristic> MaHeuristic for MaxAggregateHeuristic<H> {
    fn evaluate(&mut self, state: &State) -> MaHeuristicStatus {
        let local = self.local.estimate(state);
        if self.peers.is_empty() {
            return MaHeuristicStatus::Ready(local);
        }
        self.pending = Some(PendingAggregate {
            best: local,
            outstanding: self.peers.clone(),
        });
        MaHeuristicStatus::Pending
    }

    fn resolve(&mut self, from: AgentId, contribution: Option<Cost>) -> Option<Cost> {
        let Some(pending) = self.pending.as_mut() else {
            return None;
        };
        pending.outstanding.retain(|&a| a != from);
        pending.best = match (pending.best, contribution) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };
        if pending.outstanding.is_empty() {
            let resolved = pending.best;
            self.pending = None;
            Some(resolved.unwrap_or(Cost::MAX))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplan_state::{Variable, Variables};

    #[test]
    fn goal_count_drops_as_variables_are_satisfied() {
        let vars = Variables::new(vec![Variable::new("x", 2, false), Variable::new("y", 2, false)]);
        let ids: Vec<_> = vars.ids().collect();
        let mut goal = PartialState::new();
        goal.set(ids[0], 1);
        goal.set(ids[1], 1);
        let mut h = GoalCountHeuristic::new(goal);

        let state = State::from_fn(&vars, |_| 0);
        assert_eq!(h.estimate(&state), Some(2));

        let state = State::from_fn(&vars, |i| if i == ids[0] { 1 } else { 0 });
        assert_eq!(h.estimate(&state), Some(1));
    }

    struct ConstHeuristic(Cost);
    impl Heuristic for ConstHeuristic {
        fn estimate(&mut self, _state: &State) -> Option<Cost> {
            Some(self.0)
        }
    }

    #[test]
    fn no_peers_resolves_immediately() {
        let vars = Variables::new(vec![]);
        let state = State::from_fn(&vars, |_| 0);
        let mut h = MaxAggregateHeuristic::new(ConstHeuristic(3), vec![]);
        match h.evaluate(&state) {
            MaHeuristicStatus::Ready(Some(3)) => {}
            _ => panic!("expected immediate ready(3)"),
        }
    }

    #[test]
    fn aggregates_max_over_peer_responses() {
        let vars = Variables::new(vec![]);
        let state = State::from_fn(&vars, |_| 0);
        let mut h = MaxAggregateHeuristic::new(ConstHeuristic(3), vec![1, 2]);
        assert!(matches!(h.evaluate(&state), MaHeuristicStatus::Pending));
        assert!(h.resolve(1, Some(7)).is_none());
        assert_eq!(h.resolve(2, Some(2)), Some(7));
    }
}
