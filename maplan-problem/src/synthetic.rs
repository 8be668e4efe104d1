//! Synthetic problem builders for end-to-end scenarios (S1-S6). Single-agent
//! scenarios return one [`Problem`]; the multi-agent ones return one
//! `Problem` per agent, each already filtered to the operators that agent
//! owns.

use maplan_state::{Operator, Operators, PartialState, State, Variable, Variables};

use crate::Problem;

fn op(name: &str, pre: &[(usize, u16)], eff: &[(usize, u16)], cost: i64, owner: u32, global_id: u32, vars: &Variables) -> Operator {
    let ids: Vec<_> = vars.ids().collect();
    let mut precond = PartialState::new();
    for &(i, v) in pre {
        precond.set(ids[i], v);
    }
    let mut effect = PartialState::new();
    for &(i, v) in eff {
        effect.set(ids[i], v);
    }
    Operator {
        name: name.into(),
        precond,
        effect,
        cond_effects: vec![],
        cost,
        owner,
        global_id,
        private: false,
    }
}

/// S1: single-agent A*, trivial. One variable, one operator, no heuristic
/// help needed (h ≡ 0 is supplied by the caller, not by this builder).
pub fn s1() -> Problem {
    let vars = Variables::new(vec![Variable::new("x", 2, false)]);
    let flip = op("flip", &[(0, 0)], &[(0, 1)], 3, 0, 0, &vars);
    let mut goal = PartialState::new();
    goal.set(vars.ids().next().unwrap(), 1);
    let initial = State::from_fn(&vars, |_| 0);
    Problem::new(vars, Operators::new(vec![flip]), initial, goal, 0, 1).expect("builder invariants hold")
}

/// S2: single-agent EHC with a private operator. `b` requires a private
/// variable `y` that only this agent ever sees.
pub fn s2() -> Problem {
    let vars = Variables::new(vec![Variable::new("x", 2, false), Variable::new("y", 2, true)]);
    let a = op("a", &[(0, 0)], &[(0, 1)], 1, 0, 0, &vars);
    let b = op("b", &[(0, 1), (1, 0)], &[(1, 1)], 1, 0, 1, &vars);
    let ids: Vec<_> = vars.ids().collect();
    let mut goal = PartialState::new();
    goal.set(ids[0], 1);
    goal.set(ids[1], 1);
    let initial = State::from_fn(&vars, |_| 0);
    Problem::new(vars, Operators::new(vec![a, b]), initial, goal, 0, 1).expect("builder invariants hold")
}

/// S3 / S6: two agents sharing one public variable, each owning one step
/// of the path to the goal. S6 reuses this builder verbatim; only the
/// transport differs (TCP instead of in-process).
pub fn s3() -> Vec<Problem> {
    let vars = Variables::new(vec![Variable::new("v", 3, false)]);
    let op0 = op("op0", &[(0, 0)], &[(0, 1)], 1, 0, 0, &vars);
    let op1 = op("op1", &[(0, 1)], &[(0, 2)], 1, 1, 1, &vars);
    let mut goal = PartialState::new();
    goal.set(vars.ids().next().unwrap(), 2);

    let agent0 = Problem::new(
        vars.clone(),
        Operators::new(vec![op0]),
        State::from_fn(&vars, |_| 0),
        goal.clone(),
        0,
        2,
    )
    .expect("builder invariants hold");
    let agent1 = Problem::new(vars.clone(), Operators::new(vec![op1]), State::from_fn(&vars, |_| 0), goal, 1, 2)
        .expect("builder invariants hold");
    vec![agent0, agent1]
}

/// S4: three agents. Agent 0 can reach the goal directly at cost 10; agent
/// 1 reaches an intermediate state at cost 6 and only later continues on to
/// the same goal, also at cost 10, enough to exercise a verification round
/// that nacks agent 0's premature announcement. Agent 2 owns an operator
/// that is never applicable, standing in for a peer that contributes
/// nothing to this particular solution.
pub fn s4() -> Vec<Problem> {
    let vars = Variables::new(vec![Variable::new("v", 11, false)]);
    let direct = op("direct", &[(0, 0)], &[(0, 10)], 10, 0, 0, &vars);
    let partial = op("partial", &[(0, 0)], &[(0, 6)], 6, 1, 1, &vars);
    let finish = op("finish", &[(0, 6)], &[(0, 10)], 4, 1, 2, &vars);
    let idle = op("idle", &[(0, 99)], &[(0, 10)], 1, 2, 3, &vars);
    // `idle`'s precondition references a value outside `v`'s declared range
    // on purpose: it can never fire, matching this agent's role as a
    // bystander in the scenario.
    let mut goal = PartialState::new();
    goal.set(vars.ids().next().unwrap(), 10);

    let agent0 = Problem::new(
        vars.clone(),
        Operators::new(vec![direct]),
        State::from_fn(&vars, |_| 0),
        goal.clone(),
        0,
        3,
    )
    .expect("builder invariants hold");
    let agent1 = Problem::new(
        vars.clone(),
        Operators::new(vec![partial, finish]),
        State::from_fn(&vars, |_| 0),
        goal.clone(),
        1,
        3,
    )
    .expect("builder invariants hold");
    let agent2 = Problem::new(vars.clone(), Operators::new(vec![idle]), State::from_fn(&vars, |_| 0), goal, 2, 3)
        .expect("builder invariants hold");
    vec![agent0, agent1, agent2]
}

/// S5: unsolvable goal, three agents, no operator ever touches the goal
/// variable. Exercises global dead-end detection end to end.
pub fn s5() -> Vec<Problem> {
    let vars = Variables::new(vec![Variable::new("z", 2, false)]);
    let mut goal = PartialState::new();
    goal.set(vars.ids().next().unwrap(), 1);

    (0..3u32)
        .map(|agent_id| {
            Problem::new(vars.clone(), Operators::new(vec![]), State::from_fn(&vars, |_| 0), goal.clone(), agent_id, 3)
                .expect("builder invariants hold")
        })
        .collect()
}

/// S6 is S3 run over TCP instead of in-process; the problem itself is
/// unchanged.
pub fn s6() -> Vec<Problem> {
    s3()
}
