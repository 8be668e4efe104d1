//! Typed problem-input contract: the in-memory shape a (stubbed) parser
//! would produce, consumed by `maplan-search` and `maplan-distributed`.
//! This crate owns no parsing; it only defines the struct and, for tests,
//! a handful of synthetic builders matching known scenarios.

pub mod synthetic;

use maplan_state::{AgentId, Operators, PartialState, State, Variables};
use thiserror::Error;

/// Everything one agent needs to start a local search: its view of the
/// variables and operators (only the operators it owns; a foreign agent's
/// operator can never be locally applied, only observed via PUBLIC_STATE),
/// the initial state, the goal condition, and its position among its peers.
#[derive(Debug, Clone)]
pub struct Problem {
    pub vars: Variables,
    pub operators: Operators,
    pub initial: State,
    pub goal: PartialState,
    pub agent_id: AgentId,
    pub node_size: usize,
}

#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("agent id {agent_id} is out of range for {node_size} agents")]
    AgentIdOutOfRange { agent_id: AgentId, node_size: usize },
    #[error("operator '{name}' has owner {owner}, out of range for {node_size} agents")]
    OperatorOwnerOutOfRange { name: String, owner: AgentId, node_size: usize },
    #[error("node_size must be at least 1")]
    EmptyNodeSize,
}

impl Problem {
    /// Validates the cross-field invariants the parser is trusted to have
    /// already upheld: this is the one place that re-checks them before
    /// anything downstream trusts them.
    pub fn new(
        vars: Variables,
        operators: Operators,
        initial: State,
        goal: PartialState,
        agent_id: AgentId,
        node_size: usize,
    ) -> Result<Self, ProblemError> {
        if node_size == 0 {
            return Err(ProblemError::EmptyNodeSize);
        }
        if agent_id as usize >= node_size {
            return Err(ProblemError::AgentIdOutOfRange { agent_id, node_size });
        }
        for (_, op) in operators.iter() {
            if op.owner as usize >= node_size {
                return Err(ProblemError::OperatorOwnerOutOfRange {
                    name: op.name.clone(),
                    owner: op.owner,
                    node_size,
                });
            }
        }
        Ok(Problem {
            vars,
            operators,
            initial,
            goal,
            agent_id,
            node_size,
        })
    }

    pub fn is_single_agent(&self) -> bool {
        self.node_size == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplan_state::Variable;

    #[test]
    fn rejects_agent_id_past_node_size() {
        let vars = Variables::new(vec![Variable::new("x", 2, false)]);
        let initial = State::from_fn(&vars, |_| 0);
        let err = Problem::new(vars, Operators::new(vec![]), initial, PartialState::new(), 3, 2).unwrap_err();
        assert!(matches!(err, ProblemError::AgentIdOutOfRange { agent_id: 3, node_size: 2 }));
    }

    #[test]
    fn rejects_operator_owner_past_node_size() {
        let vars = Variables::new(vec![Variable::new("x", 2, false)]);
        let x = vars.ids().next().unwrap();
        let mut pre = PartialState::new();
        pre.set(x, 0);
        let mut eff = PartialState::new();
        eff.set(x, 1);
        let op = maplan_state::Operator {
            name: "go".into(),
            precond: pre,
            effect: eff,
            cond_effects: vec![],
            cost: 1,
            owner: 5,
            global_id: 0,
            private: false,
        };
        let initial = State::from_fn(&vars, |_| 0);
        let err = Problem::new(vars, Operators::new(vec![op]), initial, PartialState::new(), 0, 1).unwrap_err();
        assert!(matches!(err, ProblemError::OperatorOwnerOutOfRange { owner: 5, node_size: 1, .. }));
    }
}
