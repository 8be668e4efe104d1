//! End-to-end search driver: wires a single-agent search loop to
//! [`MultiAgentDriver`], looping step -> callback-driven message dispatch ->
//! verification -> termination the way `search.c`'s main loop around
//! `planSearchRun` does.
//!
//! A true single agent (`node_size == 1`) skips the distributed machinery
//! entirely (no ring to terminate, no peer to verify with) and just runs
//! the chosen single-agent algorithm straight through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use maplan_distributed::{MultiAgentDriver, SnapshotResult, TraceStep, FINAL_DELIVERY};
use maplan_message::{Cost, PathOpRecord, SearchOutcome as WireOutcome};
use maplan_problem::Problem;
use maplan_search::{astar, ehc, lazy, GoalCountHeuristic, Heuristic, SearchCallbacks, SearchOutcome};
use maplan_state::{PartialState, State, StateId, StatePool};
use maplan_succgen::SuccGen;
use maplan_transport::{Transport, TransportError};

use crate::cli::{HeurName, SearchAlgo};

/// How this run concluded.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Found { cost: Cost, path: Vec<PathOpRecord> },
    NotFound,
    /// Unwound by the hard-limit monitor or a signal, not a genuine
    /// exhaustive dead end.
    Aborted,
}

/// How long a blocked agent waits for new traffic before re-checking
/// whether it's time to (re-)start dead-end verification or whether an
/// outstanding trace request has resolved.
pub const DEFAULT_DEAD_END_POLL: Duration = Duration::from_millis(200);

struct ZeroHeuristic;
impl Heuristic for ZeroHeuristic {
    fn estimate(&mut self, _state: &State) -> Option<Cost> {
        Some(0)
    }
}

/// Either concrete single-agent heuristic this crate ships, picked at
/// startup by `--heur`. A plain enum rather than `Box<dyn Heuristic>`: the
/// trait and `Box` both live outside this crate, so a blanket impl for the
/// boxed form isn't ours to write.
enum AnyHeuristic {
    GoalCount(GoalCountHeuristic),
    Zero(ZeroHeuristic),
}

impl Heuristic for AnyHeuristic {
    fn estimate(&mut self, state: &State) -> Option<Cost> {
        match self {
            AnyHeuristic::GoalCount(h) => h.estimate(state),
            AnyHeuristic::Zero(h) => h.estimate(state),
        }
    }
}

fn build_heuristic(name: HeurName, goal: PartialState) -> AnyHeuristic {
    match name {
        HeurName::Goalcount => AnyHeuristic::GoalCount(GoalCountHeuristic::new(goal)),
        HeurName::Zero => AnyHeuristic::Zero(ZeroHeuristic),
    }
}

/// Delegates every [`SearchCallbacks`] hook to the wrapped driver except
/// `aborted`, which reads the supervisor's flag instead of the driver's own
/// (always-false) default. `MultiAgentDriver` can't own this itself since it
/// knows nothing about hard limits.
struct AbortableDriver<'d, 'a, T: Transport> {
    driver: &'d mut MultiAgentDriver<'a, T>,
    abort: Arc<AtomicBool>,
}

impl<'d, 'a, T: Transport> SearchCallbacks for AbortableDriver<'d, 'a, T> {
    fn post_step(&mut self, pool: &StatePool) {
        self.driver.post_step(pool);
    }
    fn expanded_node(&mut self, id: StateId, pool: &StatePool) {
        self.driver.expanded_node(id, pool);
    }
    fn reached_goal(&mut self, id: StateId, pool: &StatePool) {
        self.driver.reached_goal(id, pool);
    }
    fn dead_end(&mut self, id: StateId, pool: &StatePool) {
        self.driver.dead_end(id, pool);
    }
    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

struct AbortOnly {
    abort: Arc<AtomicBool>,
}
impl SearchCallbacks for AbortOnly {
    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

/// Runs the chosen algorithm once, from `root`, on an empty pool.
fn run_once(
    algo: SearchAlgo,
    pool: &mut StatePool,
    problem: &Problem,
    succgen: &SuccGen,
    packer: &maplan_state::Packer,
    heuristic: &mut impl Heuristic,
    callbacks: &mut impl SearchCallbacks,
) -> SearchOutcome {
    match algo {
        SearchAlgo::Astar => astar::a_star(pool, &problem.vars, &problem.operators, succgen, packer, heuristic, &problem.goal, &problem.initial, callbacks),
        SearchAlgo::Ehc => ehc::ehc(pool, &problem.vars, &problem.operators, succgen, packer, heuristic, &problem.goal, &problem.initial, callbacks),
        SearchAlgo::Lazy => {
            lazy::lazy_best_first(pool, &problem.vars, &problem.operators, succgen, packer, heuristic, &problem.goal, &problem.initial, callbacks)
        }
    }
}

/// Single-agent fast path: no ring, no verification, no transport traffic
/// at all. Honors whichever algorithm `--search` names.
pub fn run_single_agent(problem: &Problem, algo: SearchAlgo, heur: HeurName, abort: Arc<AtomicBool>) -> RunOutcome {
    let packer = maplan_state::Packer::new(&problem.vars);
    let succgen = SuccGen::new(&problem.operators, problem.vars.ids().collect());
    let mut pool = StatePool::new();
    let mut heuristic = build_heuristic(heur, problem.goal.clone());
    let mut callbacks = AbortOnly { abort };

    match run_once(algo, &mut pool, problem, &succgen, &packer, &mut heuristic, &mut callbacks) {
        SearchOutcome::Solved(goal_id) => {
            let cost = pool.node(goal_id).cost;
            let path = reconstruct_local_path(&pool, &problem.operators, goal_id);
            RunOutcome::Found { cost, path }
        }
        SearchOutcome::NoSolution => RunOutcome::NotFound,
        SearchOutcome::Aborted => RunOutcome::Aborted,
    }
}

/// Walks `goal_id`'s parent chain straight to the root; used only by the
/// single-agent path, which has no peers and therefore nothing a
/// [`maplan_distributed::PathTracer`] boundary could ever apply to.
fn reconstruct_local_path(pool: &StatePool, operators: &maplan_state::Operators, goal_id: StateId) -> Vec<PathOpRecord> {
    let mut path = Vec::new();
    let mut current = goal_id;
    while let Some(parent) = pool.node(current).parent {
        let op_id = pool.node(current).generating_op.expect("non-root state has a generating operator");
        let op = operators.get(op_id);
        path.push(PathOpRecord {
            global_op_id: op.global_id,
            owner: op.owner,
            cost: op.cost,
            name: op.name.clone(),
        });
        current = parent;
    }
    path.reverse();
    path
}

/// Drains and acts on every `TracePath` message queued since the last call:
/// forwards a trace request originating from another agent one hop further
/// back, and recognizes the [`FINAL_DELIVERY`] sentinel as this agent's own
/// fully assembled path coming home. Returns that path once it has arrived.
fn process_pending_traces<T: Transport>(driver: &mut MultiAgentDriver<'_, T>, pool: &StatePool) -> Result<Option<Vec<PathOpRecord>>, TransportError> {
    for tp in driver.drain_pending_traces() {
        if tp.private_id == FINAL_DELIVERY {
            return Ok(Some(tp.path));
        }
        let local_id = StateId::from_u32(tp.private_id);
        match driver.trace_path(pool, local_id, tp.initiator, tp.path)? {
            TraceStep::Complete(path) => return Ok(Some(path)),
            TraceStep::Forwarded { .. } => {}
        }
    }
    Ok(None)
}

fn wait_for_termination<T: Transport>(driver: &mut MultiAgentDriver<'_, T>, poll: Duration) -> Result<WireOutcome, TransportError> {
    loop {
        if let Some((outcome, _path)) = driver.outcome() {
            return Ok(*outcome);
        }
        driver.block_for_message(poll)?;
    }
}

/// Multi-agent driver loop: repeatedly runs (or resumes) local
/// search, verifies any candidate it finds against the rest of the ring,
/// imports peers' public states between attempts, and starts the ring
/// termination protocol once the outcome is settled.
///
/// Always uses A*, regardless of `--search`: it's the only algorithm with a
/// resumable counterpart ([`astar::a_star_resume`]), which this loop needs
/// to pick up where it left off after an import or a verification nack
/// without re-expanding everything from the root (see DESIGN.md).
pub fn run_multi_agent<T: Transport>(
    problem: &Problem,
    transport: &T,
    heur: HeurName,
    abort: Arc<AtomicBool>,
    dead_end_poll: Duration,
) -> Result<RunOutcome, TransportError> {
    let packer = maplan_state::Packer::new(&problem.vars);
    let succgen = SuccGen::new(&problem.operators, problem.vars.ids().collect());
    let mut pool = StatePool::new();
    let mut heuristic = build_heuristic(heur, problem.goal.clone());
    let mut driver = MultiAgentDriver::new(transport, &problem.operators, &packer);
    let my_id = driver.agent_id();

    let mut seeded = false;
    let mut resume_seeds: Vec<StateId> = Vec::new();

    loop {
        if let Some(path) = process_pending_traces(&mut driver, &pool)? {
            driver.begin_termination(WireOutcome::Solved, path.clone())?;
            let outcome = wait_for_termination(&mut driver, dead_end_poll)?;
            return Ok(to_run_outcome(outcome, path));
        }

        let outcome = {
            let mut cb = AbortableDriver { driver: &mut driver, abort: abort.clone() };
            if !seeded {
                seeded = true;
                astar::a_star(&mut pool, &problem.vars, &problem.operators, &succgen, &packer, &mut heuristic, &problem.goal, &problem.initial, &mut cb)
            } else {
                let seeds = std::mem::take(&mut resume_seeds);
                astar::a_star_resume(&mut pool, &problem.vars, &problem.operators, &succgen, &packer, &mut heuristic, &problem.goal, &seeds, &mut cb)
            }
        };

        match outcome {
            SearchOutcome::Aborted => {
                driver.begin_termination(WireOutcome::NoSolution, vec![])?;
                wait_for_termination(&mut driver, dead_end_poll)?;
                return Ok(RunOutcome::Aborted);
            }
            SearchOutcome::Solved(goal_id) => {
                let cost = pool.node(goal_id).cost;
                match driver.verify_solution(cost)? {
                    SnapshotResult::Confirmed => match driver.trace_path(&pool, goal_id, my_id, vec![])? {
                        TraceStep::Complete(path) => {
                            driver.begin_termination(WireOutcome::Solved, path.clone())?;
                            wait_for_termination(&mut driver, dead_end_poll)?;
                            return Ok(RunOutcome::Found { cost, path });
                        }
                        TraceStep::Forwarded { .. } => loop {
                            if let Some(path) = process_pending_traces(&mut driver, &pool)? {
                                driver.begin_termination(WireOutcome::Solved, path.clone())?;
                                wait_for_termination(&mut driver, dead_end_poll)?;
                                return Ok(RunOutcome::Found { cost, path });
                            }
                            driver.block_for_message(dead_end_poll)?;
                        },
                    },
                    SnapshotResult::Rejected => {
                        let imported = driver.apply_pending(&mut pool);
                        resume_seeds = if imported.is_empty() { vec![goal_id] } else { imported };
                    }
                }
            }
            SearchOutcome::NoSolution => {
                let imported = driver.apply_pending(&mut pool);
                if !imported.is_empty() {
                    resume_seeds = imported;
                    continue;
                }
                // Dead-end verification is initiated only by agent 0 (spec
                // §4.I); every other agent just waits, joining the round
                // via `handle_message` when agent 0's INIT arrives.
                if my_id != 0 {
                    driver.block_for_message(dead_end_poll)?;
                    continue;
                }
                match driver.verify_dead_end()? {
                    SnapshotResult::Confirmed => {
                        driver.begin_termination(WireOutcome::NoSolution, vec![])?;
                        wait_for_termination(&mut driver, dead_end_poll)?;
                        return Ok(RunOutcome::NotFound);
                    }
                    SnapshotResult::Rejected => {
                        driver.block_for_message(dead_end_poll)?;
                    }
                }
            }
        }
    }
}

fn to_run_outcome(outcome: WireOutcome, path: Vec<PathOpRecord>) -> RunOutcome {
    match outcome {
        WireOutcome::Solved => {
            let cost = path.iter().map(|p| p.cost).sum();
            RunOutcome::Found { cost, path }
        }
        WireOutcome::NoSolution => RunOutcome::NotFound,
    }
}
