use std::collections::{HashSet, VecDeque};

use maplan_state::{Heuristic as NodeHeuristic, Operators, Packer, PartialState, State, StateId, StatePool, Variables};
use maplan_succgen::SuccGen;

use crate::heuristic::Heuristic;
use crate::{SearchCallbacks, SearchOutcome};

/// Enforced hill climbing: from the current state, breadth-first searches
/// the plateau of successors for the first one with a strictly better
/// heuristic value, then jumps there and repeats.
///
/// Each plateau gets its own visited set: a state revisited within the
/// *same* plateau is skipped, but a state from
/// an earlier, abandoned plateau is fair game again, since EHC never
/// commits to anything but the jump points it actually takes.
pub fn ehc(
    pool: &mut StatePool,
    vars: &Variables,
    operators: &Operators,
    succgen: &SuccGen,
    packer: &Packer,
    heuristic: &mut impl Heuristic,
    goal: &PartialState,
    root: &State,
    callbacks: &mut impl SearchCallbacks,
) -> SearchOutcome {
    let root_id = pool.insert_root(packer.pack(root));
    let Some(mut current_h) = resolve(pool, packer, vars, heuristic, root_id, callbacks) else {
        return SearchOutcome::NoSolution;
    };
    let mut current = root_id;

    loop {
        let packed = pool.get_packed(current).to_vec();
        let state = packer.unpack(vars, &packed);
        if goal.holds_in(&state) {
            callbacks.reached_goal(current, pool);
            return SearchOutcome::Solved(current);
        }
        match plateau_search(pool, vars, operators, succgen, packer, heuristic, current, current_h, callbacks) {
            PlateauOutcome::Found(next, next_h) => {
                current = next;
                current_h = next_h;
            }
            PlateauOutcome::Exhausted => return SearchOutcome::NoSolution,
            PlateauOutcome::Aborted => return SearchOutcome::Aborted,
        }
    }
}

enum PlateauOutcome {
    Found(StateId, i64),
    Exhausted,
    Aborted,
}

#[allow(clippy::too_many_arguments)]
fn plateau_search(
    pool: &mut StatePool,
    vars: &Variables,
    operators: &Operators,
    succgen: &SuccGen,
    packer: &Packer,
    heuristic: &mut impl Heuristic,
    start: StateId,
    start_h: i64,
    callbacks: &mut impl SearchCallbacks,
) -> PlateauOutcome {
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    queue.push_back(start);
    visited.insert(start);

    while let Some(id) = queue.pop_front() {
        callbacks.post_step(pool);
        if callbacks.aborted() {
            return PlateauOutcome::Aborted;
        }
        let packed = pool.get_packed(id).to_vec();
        let state = packer.unpack(vars, &packed);
        let g = pool.node(id).cost;

        for op_id in succgen.find(&state) {
            let op = operators.get(op_id);
            if !op.is_applicable(&state) {
                continue;
            }
            let child = op.apply(&state);
            let child_cost = g + op.cost;
            let before = pool.len();
            let child_id = pool.insert_successor(packer.pack(&child), id, op_id, child_cost);
            if pool.len() == before {
                pool.relax(child_id, id, op_id, child_cost);
            }
            if !visited.insert(child_id) {
                continue;
            }
            callbacks.expanded_node(child_id, pool);

            let Some(h) = resolve(pool, packer, vars, heuristic, child_id, callbacks) else {
                continue;
            };
            if h < start_h {
                return PlateauOutcome::Found(child_id, h);
            }
            queue.push_back(child_id);
        }
    }
    PlateauOutcome::Exhausted
}

fn resolve(
    pool: &mut StatePool,
    packer: &Packer,
    vars: &Variables,
    heuristic: &mut impl Heuristic,
    id: StateId,
    callbacks: &mut impl SearchCallbacks,
) -> Option<i64> {
    if let NodeHeuristic::Value(h) = pool.node(id).heuristic {
        return Some(h);
    }
    if matches!(pool.node(id).heuristic, NodeHeuristic::DeadEnd) {
        callbacks.dead_end(id, pool);
        return None;
    }
    let packed = pool.get_packed(id).to_vec();
    let state = packer.unpack(vars, &packed);
    let h = heuristic.estimate(&state);
    pool.node_mut(id).heuristic = match h {
        Some(v) => NodeHeuristic::Value(v),
        None => NodeHeuristic::DeadEnd,
    };
    if h.is_none() {
        callbacks.dead_end(id, pool);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplan_state::{Operator, Variable};

    // h(x) = 2 - x: strictly improves on every step of the chain 0->1->2.
    struct DistanceToTwo;
    impl Heuristic for DistanceToTwo {
        fn estimate(&mut self, state: &State) -> Option<i64> {
            let x = state.get(state_var());
            Some((2 - x as i64).max(0))
        }
    }

    fn state_var() -> maplan_state::VarId {
        // Only variable in the test problem below.
        maplan_state::VarId::from(0usize)
    }

    #[test]
    fn climbs_straight_to_goal_without_backtracking() {
        let vars = Variables::new(vec![Variable::new("x", 3, false)]);
        let x = vars.ids().next().unwrap();

        let mut pre0 = PartialState::new();
        pre0.set(x, 0);
        let mut eff0 = PartialState::new();
        eff0.set(x, 1);
        let op0 = Operator {
            name: "inc0".into(),
            precond: pre0,
            effect: eff0,
            cond_effects: vec![],
            cost: 1,
            owner: 0,
            global_id: 0,
            private: false,
        };

        let mut pre1 = PartialState::new();
        pre1.set(x, 1);
        let mut eff1 = PartialState::new();
        eff1.set(x, 2);
        let op1 = Operator {
            name: "inc1".into(),
            precond: pre1,
            effect: eff1,
            cond_effects: vec![],
            cost: 1,
            owner: 0,
            global_id: 1,
            private: false,
        };

        let mut goal = PartialState::new();
        goal.set(x, 2);
        let ops = Operators::new(vec![op0, op1]);
        let succgen = SuccGen::new(&ops, vars.ids().collect());
        let packer = Packer::new(&vars);
        let mut pool = StatePool::new();
        let root = State::from_fn(&vars, |_| 0);

        let outcome = ehc(
            &mut pool,
            &vars,
            &ops,
            &succgen,
            &packer,
            &mut DistanceToTwo,
            &goal,
            &root,
            &mut crate::NoCallbacks,
        );
        assert!(matches!(outcome, SearchOutcome::Solved(_)));
    }
}
