//! `maplan`: a multi-agent classical planner, following
//! `plannerosp.rs`'s shape for a binary entry point: `clap`-derived options,
//! a `tracing_subscriber` initialized with an uptime timer and thread ids,
//! a panic hook that forces a non-zero exit, and a final `match` on the
//! result dispatching the process's exit code.

use std::process::ExitCode;

use maplan_cli::cli::{Cli, Demo, HeurName};
use maplan_cli::orchestrator::{run_multi_agent, run_single_agent, RunOutcome, DEFAULT_DEAD_END_POLL};
use maplan_cli::supervisor::Supervisor;
use maplan_problem::Problem;
use maplan_transport::{InProcessTransport, TcpTransport};
use tracing_subscriber::fmt::time::Uptime;

use clap::Parser;

fn init_logging(level: &str) {
    let level = level.parse().unwrap_or(tracing::Level::INFO);
    let _ = tracing_subscriber::fmt()
        .with_timer(Uptime::from(std::time::Instant::now()))
        .with_thread_ids(true)
        .with_max_level(level)
        .try_init();
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        std::process::exit(1);
    }));
}

fn demo_problems(demo: Demo) -> Vec<Problem> {
    match demo {
        Demo::S1 => vec![maplan_problem::synthetic::s1()],
        Demo::S2 => vec![maplan_problem::synthetic::s2()],
        Demo::S3 => maplan_problem::synthetic::s3(),
        Demo::S4 => maplan_problem::synthetic::s4(),
        Demo::S5 => maplan_problem::synthetic::s5(),
        Demo::S6 => maplan_problem::synthetic::s6(),
    }
}

fn render(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Found { cost, path } => {
            let mut out = format!("FOUND cost={cost}\n");
            for step in path {
                out.push_str(&format!("  {} (cost {})\n", step.name, step.cost));
            }
            out
        }
        RunOutcome::NotFound => "NOT_FOUND\n".to_string(),
        RunOutcome::Aborted => "ABORTED\n".to_string(),
    }
}

fn report(outcome: &RunOutcome, output: &str) -> anyhow::Result<()> {
    let rendered = render(outcome);
    if output == "-" {
        print!("{rendered}");
    } else {
        std::fs::write(output, rendered)?;
    }
    Ok(())
}

/// `--ma-unfactor`, and the implicit default for any multi-agent `--demo`
/// run given no `--tcp` addresses: every agent runs as a thread of this one
/// process, talking over in-process channels instead of real sockets.
fn run_in_process(problems: Vec<Problem>, heur: HeurName, supervisor: &Supervisor) -> anyhow::Result<RunOutcome> {
    let transports = InProcessTransport::network(problems.len());
    let handles: Vec<_> = problems
        .into_iter()
        .zip(transports)
        .map(|(problem, transport)| {
            let abort = supervisor.abort_flag();
            std::thread::spawn(move || run_multi_agent(&problem, &transport, heur, abort, DEFAULT_DEAD_END_POLL))
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        let joined = handle.join().map_err(|_| anyhow::anyhow!("an agent thread panicked"))?;
        results.push(joined?);
    }
    Ok(results.into_iter().next().expect("--demo always yields at least one agent"))
}

/// `--ma-factor`/`--tcp`: this process is exactly one agent, dialing its
/// peers over TCP at the addresses `--tcp` lists in agent-id order.
fn run_over_tcp(problem: &Problem, tcp: &[String], tcp_id: i64, heur: HeurName, supervisor: &Supervisor) -> anyhow::Result<RunOutcome> {
    anyhow::ensure!(tcp_id >= 0, "--tcp-id must be set (and non-negative) when --tcp is used");
    let transport = TcpTransport::connect(tcp_id as u32, tcp.to_vec())?;
    Ok(run_multi_agent(problem, &transport, heur, supervisor.abort_flag(), DEFAULT_DEAD_END_POLL)?)
}

fn run(cli: &Cli) -> anyhow::Result<RunOutcome> {
    let mut supervisor = Supervisor::new(cli.max_time_duration(), cli.max_mem, cli.hard_limit_sleep());
    if let Err(e) = supervisor.install_signal_handler() {
        tracing::warn!("could not install signal handler: {e}");
    }
    supervisor.start();

    anyhow::ensure!(
        cli.problem.is_none(),
        "problem-file parsing is out of scope for this build; pass --demo {{s1..s6}} instead"
    );
    let demo = cli
        .demo
        .ok_or_else(|| anyhow::anyhow!("either --problem (unsupported) or --demo is required"))?;
    let mut problems = demo_problems(demo);

    let outcome = if !cli.tcp.is_empty() {
        let tcp_id = usize::try_from(cli.tcp_id).map_err(|_| anyhow::anyhow!("--tcp-id out of range"))?;
        anyhow::ensure!(tcp_id < problems.len(), "--tcp-id {tcp_id} out of range for {} agents", problems.len());
        run_over_tcp(&problems[tcp_id], &cli.tcp, cli.tcp_id, cli.heur, &supervisor)?
    } else if problems.len() == 1 {
        run_single_agent(&problems.remove(0), cli.search, cli.heur, supervisor.abort_flag())
    } else {
        run_in_process(problems, cli.heur, &supervisor)?
    };

    supervisor.join();
    Ok(outcome)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_panic_hook();
    init_logging(&cli.log_level);

    match run(&cli) {
        Ok(outcome) => {
            if let Err(e) = report(&outcome, &cli.output) {
                eprintln!("Error writing output: {e:#}");
                return ExitCode::from(255);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(255)
        }
    }
}
