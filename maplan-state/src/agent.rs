/// Identifies one agent among the `node_size` agents participating in a run.
/// Dense, `0..node_size`. Agent ids never travel as sentinels in this
/// codebase: "no agent" is expressed with `Option<AgentId>`, not a magic
/// negative value as in the original C (`agent_id == -1`).
pub type AgentId = u32;
