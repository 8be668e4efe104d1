//! Distributed multi-agent search coordination (spec §4.E-§4.K): the layer
//! sitting above `maplan-search`'s single-agent loops and `maplan-transport`'s
//! point-to-point channels, responsible for everything that only makes sense
//! once more than one agent is involved: ring termination, Chandy-Lamport
//! style snapshots, private-state fingerprint interning, and distributed path
//! reconstruction.

pub mod driver;
pub mod ma_state;
pub mod path_trace;
pub mod snapshot;
pub mod termination;

pub use driver::MultiAgentDriver;
pub use ma_state::MaStateRegistry;
pub use path_trace::{PathTracer, TraceStep, FINAL_DELIVERY};
pub use snapshot::{DeadEndVerificationHandler, SnapshotHandler, SnapshotRegistry, SnapshotResult, SolutionVerificationHandler};
pub use termination::TerminationProtocol;
