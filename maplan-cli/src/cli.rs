//! Command-line surface, following `structopt`/`clap`-derive CLI
//! conventions the way `plannerosp.rs` lays out its `Opt` struct.
//!
//! Problem loading is a separate collaborator's job, so `--problem` is kept
//! for interface fidelity but only ever produces a configuration error;
//! `--demo` selects one of the bundled synthetic scenarios so the binary
//! stays actually runnable without a fabricated parser.

use std::time::Duration;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchAlgo {
    Ehc,
    Lazy,
    Astar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HeurName {
    Goalcount,
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
}

/// `maplan`: a multi-agent classical planner.
#[derive(Debug, Parser)]
#[command(name = "maplan", version)]
pub struct Cli {
    /// Path to a problem definition. Problem parsing is out of scope for
    /// this crate; passing this flag always fails fast with a configuration
    /// error naming the missing collaborator. Use `--demo` to actually run
    /// something.
    #[arg(long)]
    pub problem: Option<String>,

    /// One of the bundled synthetic scenarios, in lieu of a real problem
    /// parser.
    #[arg(long, value_enum)]
    pub demo: Option<Demo>,

    #[arg(long, value_enum, default_value = "astar")]
    pub search: SearchAlgo,

    #[arg(long, value_enum, default_value = "goalcount")]
    pub heur: HeurName,

    /// Output path for the found plan, or `-` for stdout (default).
    #[arg(long, default_value = "-")]
    pub output: String,

    /// Run every agent as a thread of this one process over in-process
    /// channels, instead of dialing out over `--tcp`.
    #[arg(long)]
    pub ma_unfactor: bool,

    /// This process is one agent of a `--tcp`-connected multi-agent run.
    #[arg(long)]
    pub ma_factor: bool,

    /// Reserved for factoring a single combined problem file into per-agent
    /// problem files; unused since problem parsing is out of scope here.
    #[arg(long)]
    pub ma_factor_dir: Option<String>,

    /// `host:port` this agent and its peers listen on, in agent-id order.
    /// Repeat once per agent.
    #[arg(long = "tcp")]
    pub tcp: Vec<String>,

    /// This process's index into `--tcp`.
    #[arg(long, default_value_t = -1)]
    pub tcp_id: i64,

    /// Hard wall-clock limit in seconds.
    #[arg(long)]
    pub max_time: Option<u64>,

    /// Hard memory limit in megabytes.
    #[arg(long)]
    pub max_mem: Option<u64>,

    /// How many expansions between progress log lines.
    #[arg(long, default_value_t = 10_000)]
    pub progress_freq: u64,

    /// Hard-limit monitor poll interval, in seconds.
    #[arg(long, default_value_t = 1)]
    pub hard_limit_sleeptime: u64,

    /// Every operator costs 1, ignoring whatever cost the problem assigns.
    #[arg(long)]
    pub op_unit_cost: bool,

    /// `tracing`'s env-filter level for this run.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn max_time_duration(&self) -> Option<Duration> {
        self.max_time.map(Duration::from_secs)
    }

    pub fn hard_limit_sleep(&self) -> Duration {
        Duration::from_secs(self.hard_limit_sleeptime)
    }
}
