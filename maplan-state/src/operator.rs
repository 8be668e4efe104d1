use crate::agent::AgentId;
use crate::state::{PartialState, State};
use crate::vars::OpId;

pub type Cost = i64;

/// A grounded planning operator, owned by exactly one agent.
///
/// Conditional effects are a supplement over the distilled spec (see
/// SPEC_FULL.md item 1, grounded on `maplan`'s `plan_op_t.cond_eff`): each
/// entry fires only when its precondition holds in the state *before* the
/// operator is applied, and later entries win over earlier ones (and over
/// the unconditional effect) when they disagree on a variable - "add after
/// delete" per spec §3.
#[derive(Debug, Clone)]
pub struct Operator {
    pub name: String,
    pub precond: PartialState,
    pub effect: PartialState,
    pub cond_effects: Vec<(PartialState, PartialState)>,
    pub cost: Cost,
    pub owner: AgentId,
    /// Id shared across all agents, used to refer to this operator in a
    /// path fragment without re-encoding its name over the wire.
    pub global_id: u32,
    pub private: bool,
}

impl Operator {
    pub fn is_applicable(&self, state: &State) -> bool {
        self.precond.holds_in(state)
    }

    /// Applies the operator's effects to `state`, returning the successor.
    /// Does not check applicability; callers must have already checked
    /// `is_applicable`.
    pub fn apply(&self, state: &State) -> State {
        let mut next = state.clone();
        next.set_all(&self.effect);
        for (cond, eff) in &self.cond_effects {
            if cond.holds_in(state) {
                next.set_all(eff);
            }
        }
        next
    }
}

/// Immutable table of all grounded operators of a problem, indexed by `OpId`.
#[derive(Debug, Clone, Default)]
pub struct Operators {
    ops: Vec<Operator>,
}

impl Operators {
    pub fn new(ops: Vec<Operator>) -> Self {
        Operators { ops }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn get(&self, id: OpId) -> &Operator {
        &self.ops[usize::from(id)]
    }

    pub fn ids(&self) -> impl Iterator<Item = OpId> {
        (0..self.ops.len()).map(OpId::from)
    }

    pub fn iter(&self) -> impl Iterator<Item = (OpId, &Operator)> {
        self.ops.iter().enumerate().map(|(i, op)| (OpId::from(i), op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::{VarId, Variable, Variables};

    fn vars() -> Variables {
        Variables::new(vec![Variable::new("x", 2, false), Variable::new("y", 2, false)])
    }

    #[test]
    fn conditional_effect_fires_on_pre_state() {
        let vars = vars();
        let ids: Vec<VarId> = vars.ids().collect();
        let (x, y) = (ids[0], ids[1]);

        let mut precond = PartialState::new();
        precond.set(x, 0);
        let mut effect = PartialState::new();
        effect.set(x, 1);
        let mut cond_pre = PartialState::new();
        cond_pre.set(x, 0); // must hold BEFORE applying, not after
        let mut cond_eff = PartialState::new();
        cond_eff.set(y, 1);

        let op = Operator {
            name: "a".into(),
            precond,
            effect,
            cond_effects: vec![(cond_pre, cond_eff)],
            cost: 1,
            owner: 0,
            global_id: 0,
            private: false,
        };

        let s0 = State::from_fn(&vars, |_| 0);
        assert!(op.is_applicable(&s0));
        let s1 = op.apply(&s0);
        assert_eq!(s1.get(x), 1);
        assert_eq!(s1.get(y), 1);
    }

    #[test]
    fn later_conditional_effect_wins() {
        let vars = vars();
        let ids: Vec<VarId> = vars.ids().collect();
        let (x, y) = (ids[0], ids[1]);

        let mut eff1 = PartialState::new();
        eff1.set(y, 0);
        let mut eff2 = PartialState::new();
        eff2.set(y, 1);

        let op = Operator {
            name: "a".into(),
            precond: PartialState::new(),
            effect: PartialState::new(),
            cond_effects: vec![(PartialState::new(), eff1), (PartialState::new(), eff2)],
            cost: 1,
            owner: 0,
            global_id: 0,
            private: false,
        };
        let s0 = State::from_fn(&vars, |_| 0);
        let s1 = op.apply(&s0);
        assert_eq!(s1.get(y), 1);
        let _ = x;
    }
}
