use crate::vars::{VarId, Value, Variables};
use maplan_collections::RefVec;

/// A finite mapping from variable to value, not necessarily total.
/// Used for operator preconditions/effects, the goal, and messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialState {
    assignments: Vec<(VarId, Value)>,
}

impl PartialState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(assignments: Vec<(VarId, Value)>) -> Self {
        PartialState { assignments }
    }

    pub fn set(&mut self, var: VarId, value: Value) {
        if let Some(slot) = self.assignments.iter_mut().find(|(v, _)| *v == var) {
            slot.1 = value;
        } else {
            self.assignments.push((var, value));
        }
    }

    pub fn get(&self, var: VarId) -> Option<Value> {
        self.assignments.iter().find(|(v, _)| *v == var).map(|(_, val)| *val)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, Value)> + '_ {
        self.assignments.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// True if every assignment of `self` holds in `state`.
    pub fn holds_in(&self, state: &State) -> bool {
        self.assignments.iter().all(|&(v, val)| state.get(v) == val)
    }
}

/// A total assignment of every variable of the problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct State {
    values: RefVec<VarId, Value>,
}

impl State {
    pub fn new(values: RefVec<VarId, Value>) -> Self {
        State { values }
    }

    pub fn from_fn(vars: &Variables, mut f: impl FnMut(VarId) -> Value) -> Self {
        let mut values = RefVec::new();
        for v in vars.ids() {
            values.push(f(v));
        }
        State { values }
    }

    pub fn get(&self, var: VarId) -> Value {
        self.values[var]
    }

    pub fn set(&mut self, var: VarId, value: Value) {
        self.values[var] = value;
    }

    pub fn set_all(&mut self, partial: &PartialState) {
        for (v, val) in partial.iter() {
            self.set(v, val);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, Value)> + '_ {
        self.values.entries().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
