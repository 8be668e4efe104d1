//! State representation shared by the successor generator, search, and
//! distributed layers: variables, operators, packed-state buffers, the
//! content-addressed state pool, and solution paths.

pub mod agent;
pub mod operator;
pub mod packer;
pub mod path;
pub mod pool;
pub mod state;
pub mod vars;

pub use agent::AgentId;
pub use operator::{Cost, Operator, Operators};
pub use packer::Packer;
pub use path::{Path, PathEntry};
pub use pool::{Heuristic, Node, NodeStatus, StatePool, StateId};
pub use state::{PartialState, State};
pub use vars::{OpId, Value, VarId, Variable, Variables};
