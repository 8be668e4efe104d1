//! Dense, index-based collections shared by every crate in the workspace.
//!
//! State ids, operator ids and the other handles that flow through the
//! planner are small dense integers. Rather than threading `usize` around
//! (and risking mixing up a state id with an operator id), every handle is a
//! distinct newtype generated by [`create_ref_type`], and storage is one of
//! the collections below, indexed by that type.

pub mod ref_store;

pub use ref_store::{Ref, RefMap, RefPool, RefStore, RefVec};
