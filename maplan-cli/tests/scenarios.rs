//! End-to-end coverage of the bundled synthetic scenarios, driven through
//! the same orchestrator the `maplan` binary uses. Each multi-agent
//! scenario spawns one thread per agent over `InProcessTransport`,
//! mirroring `--ma-unfactor`.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use maplan_cli::cli::HeurName;
use maplan_cli::orchestrator::{run_multi_agent, run_single_agent, RunOutcome, DEFAULT_DEAD_END_POLL};
use maplan_problem::synthetic;
use maplan_transport::{InProcessTransport, TcpTransport, Transport};

fn no_abort() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

fn run_in_process(problems: Vec<maplan_problem::Problem>) -> Vec<RunOutcome> {
    let transports = InProcessTransport::network(problems.len());
    let handles: Vec<_> = problems
        .into_iter()
        .zip(transports)
        .map(|(problem, transport)| {
            let abort = no_abort();
            std::thread::spawn(move || {
                run_multi_agent(&problem, &transport, HeurName::Goalcount, abort, DEFAULT_DEAD_END_POLL).expect("transport never errors in-process")
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().expect("agent thread panicked")).collect()
}

#[test]
fn s1_single_agent_astar_finds_the_trivial_plan() {
    let problem = synthetic::s1();
    let outcome = run_single_agent(&problem, maplan_cli::cli::SearchAlgo::Astar, HeurName::Goalcount, no_abort());
    match outcome {
        RunOutcome::Found { cost, path } => {
            assert_eq!(cost, 3);
            assert_eq!(path.len(), 1);
            assert_eq!(path[0].name, "flip");
        }
        other => panic!("expected FOUND, got {other:?}"),
    }
}

#[test]
fn s2_single_agent_ehc_finds_the_two_step_plan() {
    let problem = synthetic::s2();
    let outcome = run_single_agent(&problem, maplan_cli::cli::SearchAlgo::Ehc, HeurName::Goalcount, no_abort());
    match outcome {
        RunOutcome::Found { cost, path } => {
            assert_eq!(cost, 2);
            let names: Vec<_> = path.iter().map(|p| p.name.as_str()).collect();
            assert_eq!(names, vec!["a", "b"]);
        }
        other => panic!("expected FOUND, got {other:?}"),
    }
}

#[test]
fn s3_two_agents_over_in_process_transport_find_the_relay_plan() {
    let outcomes = run_in_process(synthetic::s3());
    for outcome in outcomes {
        match outcome {
            RunOutcome::Found { cost, path } => {
                assert_eq!(cost, 2);
                let names: Vec<_> = path.iter().map(|p| p.name.as_str()).collect();
                assert_eq!(names, vec!["op0", "op1"]);
            }
            other => panic!("expected every agent to report FOUND, got {other:?}"),
        }
    }
}

#[test]
fn s4_three_agents_converge_on_the_optimal_cost_despite_a_premature_candidate() {
    let outcomes = run_in_process(synthetic::s4());
    for outcome in outcomes {
        match outcome {
            RunOutcome::Found { cost, .. } => assert_eq!(cost, 10),
            other => panic!("expected every agent to report FOUND, got {other:?}"),
        }
    }
}

#[test]
fn s5_three_agents_agree_the_goal_is_unreachable() {
    let outcomes = run_in_process(synthetic::s5());
    for outcome in outcomes {
        assert!(matches!(outcome, RunOutcome::NotFound), "expected NOT_FOUND, got {outcome:?}");
    }
}

#[test]
fn s6_is_s3_and_stays_solvable_when_reusing_the_same_builder() {
    // S6 differs from S3 only in transport (TCP instead of in-process);
    // the problem definitions themselves are identical.
    let outcomes = run_in_process(synthetic::s6());
    assert_eq!(outcomes.len(), 2);
    for outcome in outcomes {
        assert!(matches!(outcome, RunOutcome::Found { cost: 2, .. }));
    }
}

/// S6 proper: the same two-agent relay problem as S3, but run over real TCP
/// sockets instead of in-process queues. Exercises the greeting-based
/// connection reordering (spec §8 property 6), length-prefixed framing end
/// to end, and graceful per-socket shutdown (spec §4.F).
#[test]
fn s6_tcp_transport_finds_the_relay_plan_and_closes_cleanly() {
    let addrs = vec!["127.0.0.1:18791".to_string(), "127.0.0.1:18792".to_string()];
    let problems = synthetic::s6();
    assert_eq!(problems.len(), 2);

    let handles: Vec<_> = problems
        .into_iter()
        .enumerate()
        .map(|(id, problem)| {
            let addrs = addrs.clone();
            std::thread::spawn(move || {
                let mut transport = TcpTransport::connect(id as u32, addrs).expect("TCP mesh establishes within its timeout");
                let outcome = run_multi_agent(&problem, &transport, HeurName::Goalcount, no_abort(), DEFAULT_DEAD_END_POLL)
                    .expect("TCP transport never errors in this scenario");
                transport.close().expect("every socket this agent opened shuts down within its timeout");
                outcome
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().expect("agent thread panicked")).collect();
    for outcome in outcomes {
        match outcome {
            RunOutcome::Found { cost, path } => {
                assert_eq!(cost, 2);
                let names: Vec<_> = path.iter().map(|p| p.name.as_str()).collect();
                assert_eq!(names, vec!["op0", "op1"]);
            }
            other => panic!("expected every agent to report FOUND over TCP, got {other:?}"),
        }
    }
}

#[test]
fn aborted_run_reports_aborted_instead_of_hanging() {
    let problem = synthetic::s1();
    let abort = Arc::new(AtomicBool::new(true));
    let outcome = run_single_agent(&problem, maplan_cli::cli::SearchAlgo::Astar, HeurName::Goalcount, abort);
    assert!(matches!(outcome, RunOutcome::Aborted));
}

#[test]
fn dead_end_poll_interval_is_a_small_positive_duration() {
    assert!(DEFAULT_DEAD_END_POLL > Duration::ZERO);
    assert!(DEFAULT_DEAD_END_POLL < Duration::from_secs(1));
}
