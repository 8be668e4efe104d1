//! Process entry point and end-to-end driver for the multi-agent planner:
//! glues `maplan-problem`'s synthetic scenarios, `maplan-search`'s
//! single-agent algorithms, and `maplan-distributed`'s coordination layer
//! into one runnable binary.

pub mod cli;
pub mod orchestrator;
pub mod supervisor;
