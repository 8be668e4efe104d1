use maplan_state::{Heuristic as NodeHeuristic, NodeStatus, Operators, Packer, PartialState, State, StatePool, Variables};
use maplan_succgen::SuccGen;

use crate::heuristic::Heuristic;
use crate::open_list::OpenList;
use crate::{SearchCallbacks, SearchOutcome};

/// A* search: expands nodes in order of `g + h`, re-opening a closed node
/// only when a strictly cheaper path to it is found.
pub fn a_star(
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
    if let Some(outcome) = seed_and_check(pool, packer, vars, heuristic, goal, root_id) {
        return outcome;
    }

    let mut open = OpenList::new();
    if let NodeHeuristic::Value(h) = pool.node(root_id).heuristic {
        open.push(h, root_id);
    } else {
        return SearchOutcome::NoSolution;
    }

    run_loop(pool, vars, operators, succgen, packer, heuristic, goal, open, callbacks)
}

/// Resumes a search over a pool that already has nodes in it, re-opening
/// `seeds` as fresh roots of the open list, for re-seeding after a
/// peer-state import or a solution-verification nack.
/// Unlike [`a_star`], this never calls `pool.insert_root`: every seed is
/// expected to already exist in `pool`, typically `Closed` from a previous
/// run.
pub fn a_star_resume(
    pool: &mut StatePool,
    vars: &Variables,
    operators: &Operators,
    succgen: &SuccGen,
    packer: &Packer,
    heuristic: &mut impl Heuristic,
    goal: &PartialState,
    seeds: &[maplan_state::StateId],
    callbacks: &mut impl SearchCallbacks,
) -> SearchOutcome {
    let mut open = OpenList::new();
    for &id in seeds {
        if matches!(pool.node(id).heuristic, maplan_state::Heuristic::Unknown) {
            let packed = pool.get_packed(id).to_vec();
            let state = packer.unpack(vars, &packed);
            let h = heuristic.estimate(&state);
            pool.node_mut(id).heuristic = match h {
                Some(v) => maplan_state::Heuristic::Value(v),
                None => maplan_state::Heuristic::DeadEnd,
            };
        }
        let node = pool.node(id);
        match node.heuristic {
            maplan_state::Heuristic::Value(h) => {
                pool.node_mut(id).status = NodeStatus::Open;
                open.push(pool.node(id).cost + h, id);
            }
            maplan_state::Heuristic::DeadEnd => callbacks.dead_end(id, pool),
            maplan_state::Heuristic::Unknown => unreachable!("just resolved above"),
        }
    }
    if open.is_empty() {
        return SearchOutcome::NoSolution;
    }
    run_loop(pool, vars, operators, succgen, packer, heuristic, goal, open, callbacks)
}

fn run_loop(
    pool: &mut StatePool,
    vars: &Variables,
    operators: &Operators,
    succgen: &SuccGen,
    packer: &Packer,
    heuristic: &mut impl Heuristic,
    goal: &PartialState,
    mut open: OpenList,
    callbacks: &mut impl SearchCallbacks,
) -> SearchOutcome {
    loop {
        let Some((_, id)) = open.pop() else {
            return SearchOutcome::NoSolution;
        };
        if pool.node(id).status == NodeStatus::Closed {
            continue;
        }
        pool.node_mut(id).status = NodeStatus::Closed;
        callbacks.post_step(pool);
        if callbacks.aborted() {
            return SearchOutcome::Aborted;
        }

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
            let child_packed = packer.pack(&child);

            let before = pool.len();
            let child_id = pool.insert_successor(child_packed, id, op_id, child_cost);
            let is_new = pool.len() > before;

            let improved = if is_new {
                true
            } else {
                pool.relax(child_id, id, op_id, child_cost)
            };
            if !improved {
                continue;
            }

            callbacks.expanded_node(child_id, pool);
            if matches!(pool.node(child_id).heuristic, maplan_state::Heuristic::Unknown) {
                let h = heuristic.estimate(&child);
                pool.node_mut(child_id).heuristic = match h {
                    Some(v) => maplan_state::Heuristic::Value(v),
                    None => maplan_state::Heuristic::DeadEnd,
                };
            }
            match pool.node(child_id).heuristic {
                maplan_state::Heuristic::DeadEnd => {
                    callbacks.dead_end(child_id, pool);
                }
                maplan_state::Heuristic::Value(h) => {
                    pool.node_mut(child_id).status = NodeStatus::Open;
                    open.push(child_cost + h, child_id);
                }
                maplan_state::Heuristic::Unknown => unreachable!("just resolved above"),
            }
        }
    }
}

/// Shared root-state bookkeeping: packs, inserts, and evaluates the root,
/// returning `Some(NoSolution)` directly if it's already a dead end.
pub(crate) fn seed_and_check(
    pool: &mut StatePool,
    packer: &Packer,
    vars: &Variables,
    heuristic: &mut impl Heuristic,
    _goal: &PartialState,
    root_id: maplan_state::StateId,
) -> Option<SearchOutcome> {
    if matches!(pool.node(root_id).heuristic, maplan_state::Heuristic::Unknown) {
        let packed = pool.get_packed(root_id).to_vec();
        let state = packer.unpack(vars, &packed);
        let h = heuristic.estimate(&state);
        pool.node_mut(root_id).heuristic = match h {
            Some(v) => maplan_state::Heuristic::Value(v),
            None => maplan_state::Heuristic::DeadEnd,
        };
    }
    if matches!(pool.node(root_id).heuristic, maplan_state::Heuristic::DeadEnd) {
        return Some(SearchOutcome::NoSolution);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplan_state::{Operator, Variable};

    // x: 0 -> 1 -> 2 (goal), two operators each cost 1.
    fn chain_problem() -> (Variables, Operators, PartialState) {
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
        (vars, Operators::new(vec![op0, op1]), goal)
    }

    struct ZeroHeuristic;
    impl Heuristic for ZeroHeuristic {
        fn estimate(&mut self, _state: &State) -> Option<i64> {
            Some(0)
        }
    }

    #[test]
    fn finds_shortest_chain() {
        let (vars, ops, goal) = chain_problem();
        let ids: Vec<_> = vars.ids().collect();
        let succgen = SuccGen::new(&ops, ids);
        let packer = Packer::new(&vars);
        let mut pool = StatePool::new();
        let root = State::from_fn(&vars, |_| 0);

        let outcome = a_star(
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
        match outcome {
            SearchOutcome::Solved(id) => assert_eq!(pool.node(id).cost, 2),
            SearchOutcome::NoSolution => panic!("expected a solution"),
            SearchOutcome::Aborted => panic!("did not expect an abort"),
        }
    }

    struct DeadEndHeuristic;
    impl Heuristic for DeadEndHeuristic {
        fn estimate(&mut self, _state: &State) -> Option<i64> {
            None
        }
    }

    #[test]
    fn dead_end_root_reports_no_solution() {
        let (vars, ops, goal) = chain_problem();
        let ids: Vec<_> = vars.ids().collect();
        let succgen = SuccGen::new(&ops, ids);
        let packer = Packer::new(&vars);
        let mut pool = StatePool::new();
        let root = State::from_fn(&vars, |_| 0);

        let outcome = a_star(
            &mut pool,
            &vars,
            &ops,
            &succgen,
            &packer,
            &mut DeadEndHeuristic,
            &goal,
            &root,
            &mut crate::NoCallbacks,
        );
        assert_eq!(outcome, SearchOutcome::NoSolution);
    }

    #[test]
    fn resume_from_manually_seeded_root_finds_same_chain() {
        let (vars, ops, goal) = chain_problem();
        let ids: Vec<_> = vars.ids().collect();
        let succgen = SuccGen::new(&ops, ids);
        let packer = Packer::new(&vars);
        let mut pool = StatePool::new();
        let root = State::from_fn(&vars, |_| 0);
        let root_id = pool.insert_root(packer.pack(&root));

        let outcome = a_star_resume(
            &mut pool,
            &vars,
            &ops,
            &succgen,
            &packer,
            &mut ZeroHeuristic,
            &goal,
            &[root_id],
            &mut crate::NoCallbacks,
        );
        match outcome {
            SearchOutcome::Solved(id) => assert_eq!(pool.node(id).cost, 2),
            SearchOutcome::NoSolution => panic!("expected a solution"),
            SearchOutcome::Aborted => panic!("did not expect an abort"),
        }
    }

    #[test]
    fn resume_reopens_a_previously_closed_goal_after_relax() {
        let (vars, ops, goal) = chain_problem();
        let ids: Vec<_> = vars.ids().collect();
        let succgen = SuccGen::new(&ops, ids);
        let packer = Packer::new(&vars);
        let mut pool = StatePool::new();
        let root = State::from_fn(&vars, |_| 0);

        let outcome = a_star(
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
        let SearchOutcome::Solved(goal_id) = outcome else {
            panic!("expected first pass to find a solution")
        };

        // Simulate a verification nack: the goal node is forced back open so
        // a resumed search can look for an alternative path to it.
        pool.node_mut(goal_id).status = NodeStatus::Open;
        let resumed = a_star_resume(
            &mut pool,
            &vars,
            &ops,
            &succgen,
            &packer,
            &mut ZeroHeuristic,
            &goal,
            &[goal_id],
            &mut crate::NoCallbacks,
        );
        match resumed {
            SearchOutcome::Solved(id) => assert_eq!(id, goal_id),
            other => panic!("expected to re-confirm the goal, got {other:?}"),
        }
    }
}
