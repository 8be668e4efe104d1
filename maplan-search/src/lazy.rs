use maplan_state::{Heuristic as NodeHeuristic, NodeStatus, Operators, Packer, PartialState, State, StateId, StatePool, Variables};
use maplan_succgen::SuccGen;

use crate::heuristic::Heuristic;
use crate::open_list::OpenList;
use crate::{SearchCallbacks, SearchOutcome};

/// Lazy best-first search: a successor is pushed to the open list keyed by
/// its *parent's* heuristic estimate, and only evaluated for real once it's
/// popped. This trades some wasted expansions (a successor may turn out to
/// be a dead end after all) for far fewer heuristic calls than A*, which
/// evaluates every successor eagerly (spec §4.B "lazy best-first").
pub fn lazy_best_first(
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
    let mut open = OpenList::new();
    open.push(0, root_id);

    loop {
        let Some((_, id)) = open.pop() else {
            return SearchOutcome::NoSolution;
        };
        if pool.node(id).status == NodeStatus::Closed {
            continue;
        }
        callbacks.post_step(pool);
        if callbacks.aborted() {
            return SearchOutcome::Aborted;
        }

        let resolved_h = resolve_heuristic(pool, packer, vars, heuristic, id);
        let Some(h) = resolved_h else {
            pool.node_mut(id).status = NodeStatus::Closed;
            callbacks.dead_end(id, pool);
            continue;
        };
        pool.node_mut(id).status = NodeStatus::Closed;

        let packed = pool.get_packed(id).to_vec();
        let state = packer.unpack(vars, &packed);
        if goal.holds_in(&state) {
            callbacks.reached_goal(id, pool);
            return SearchOutcome::Solved(id);
        }

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
            let improved = if pool.len() > before {
                true
            } else {
                pool.relax(child_id, id, op_id, child_cost)
            };
            if !improved {
                continue;
            }
            callbacks.expanded_node(child_id, pool);
            // Key is the parent's known h: the child's own heuristic is
            // resolved lazily, only if and when it's popped.
            open.push(child_cost + h, child_id);
        }
    }
}

fn resolve_heuristic(
    pool: &mut StatePool,
    packer: &Packer,
    vars: &Variables,
    heuristic: &mut impl Heuristic,
    id: StateId,
) -> Option<i64> {
    if let NodeHeuristic::Value(h) = pool.node(id).heuristic {
        return Some(h);
    }
    if matches!(pool.node(id).heuristic, NodeHeuristic::DeadEnd) {
        return None;
    }
    let packed = pool.get_packed(id).to_vec();
    let state = packer.unpack(vars, &packed);
    let h = heuristic.estimate(&state);
    pool.node_mut(id).heuristic = match h {
        Some(v) => NodeHeuristic::Value(v),
        None => NodeHeuristic::DeadEnd,
    };
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplan_state::{Operator, Variable};

    struct ZeroHeuristic;
    impl Heuristic for ZeroHeuristic {
        fn estimate(&mut self, _state: &State) -> Option<i64> {
            Some(0)
        }
    }

    #[test]
    fn finds_goal_in_single_op_chain() {
        let vars = Variables::new(vec![Variable::new("x", 2, false)]);
        let x = vars.ids().next().unwrap();
        let mut pre = PartialState::new();
        pre.set(x, 0);
        let mut eff = PartialState::new();
        eff.set(x, 1);
        let op = Operator {
            name: "go".into(),
            precond: pre,
            effect: eff,
            cond_effects: vec![],
            cost: 1,
            owner: 0,
            global_id: 0,
            private: false,
        };
        let mut goal = PartialState::new();
        goal.set(x, 1);
        let ops = Operators::new(vec![op]);
        let succgen = SuccGen::new(&ops, vars.ids().collect());
        let packer = Packer::new(&vars);
        let mut pool = StatePool::new();
        let root = State::from_fn(&vars, |_| 0);

        let outcome = lazy_best_first(
            &mut pool,
            &vars,
            &ops,
            &succgen,
            &packer,
            &mut ZeroHeuristic,
            &goal,
            &root,
            &mut crate::NoCallbacks,
        );
        assert!(matches!(outcome, SearchOutcome::Solved(_)));
    }
}
