//! Decision-tree successor generator: finds every operator applicable in a
//! state without scanning the whole operator table (spec §4.C).
//!
//! Operators are sorted once by their precondition values along a fixed
//! variable order, then folded into a tree where each node either holds the
//! operators that no longer care about any remaining variable ("immediate"
//! ops) or branches on the next variable's value, with a `default` branch
//! for operators that don't constrain it at all. Finding applicable
//! operators for a state walks exactly the branches the state's values
//! select, skipping every subtree whose precondition can't match.

use maplan_state::{OpId, Operators, PartialState, State, VarId};

enum Node {
    Leaf {
        ops: Vec<OpId>,
    },
    Branch {
        var: VarId,
        /// Indexed by value; `None` where no operator group exists.
        val: Vec<Option<Box<Node>>>,
        def: Option<Box<Node>>,
    },
}

pub struct SuccGen {
    root: Node,
    var_order: Vec<VarId>,
    num_operators: usize,
}

impl SuccGen {
    /// Builds a successor generator over every operator in `operators`,
    /// branching on variables in `var_order` (only the variables present in
    /// `var_order` are ever consulted; pass every variable id to guarantee
    /// exact results).
    pub fn new(operators: &Operators, var_order: Vec<VarId>) -> Self {
        let mut ids: Vec<OpId> = operators.ids().collect();
        ids.sort_by(|&a, &b| cmp_by_precond(operators, a, b, &var_order));
        let root = build(operators, &ids, &var_order);
        SuccGen {
            root,
            var_order,
            num_operators: operators.len(),
        }
    }

    pub fn num_operators(&self) -> usize {
        self.num_operators
    }

    /// All operators applicable in `state`.
    pub fn find(&self, state: &State) -> Vec<OpId> {
        let mut out = Vec::new();
        find_node(&self.root, &mut |var| Some(state.get(var)), &mut out);
        out
    }

    /// All operators whose precondition is consistent with `partial` (used
    /// by solution verification to find candidates for an unassigned
    /// fragment, spec §4.I).
    pub fn find_part(&self, partial: &PartialState) -> Vec<OpId> {
        let mut out = Vec::new();
        find_node(&self.root, &mut |var| partial.get(var), &mut out);
        out
    }
}

fn cmp_by_precond(
    operators: &Operators,
    a: OpId,
    b: OpId,
    var_order: &[VarId],
) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let (pa, pb) = (&operators.get(a).precond, &operators.get(b).precond);
    for &var in var_order {
        match (pa.get(var), pb.get(var)) {
            (Some(x), Some(y)) if x != y => return x.cmp(&y),
            (Some(_), Some(_)) => {}
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => {}
        }
    }
    Ordering::Equal
}

fn build(operators: &Operators, ops: &[OpId], var_order: &[VarId]) -> Node {
    if ops.is_empty() {
        return Node::Leaf { ops: Vec::new() };
    }

    let last = *ops.last().unwrap();
    let mut split_at = None;
    for (i, &var) in var_order.iter().enumerate() {
        if operators.get(last).precond.get(var).is_some() {
            split_at = Some(i);
            break;
        }
    }

    let Some(i) = split_at else {
        return Node::Leaf { ops: ops.to_vec() };
    };
    let var = var_order[i];
    let rest = &var_order[i + 1..];

    let mut start = 0;
    let def = if operators.get(ops[0]).precond.get(var).is_none() {
        let mut end = 1;
        while end < ops.len() && operators.get(ops[end]).precond.get(var).is_none() {
            end += 1;
        }
        start = end;
        Some(Box::new(build(operators, &ops[..end], rest)))
    } else {
        None
    };

    let mut max_val = 0u16;
    for &op in &ops[start..] {
        if let Some(v) = operators.get(op).precond.get(var) {
            max_val = max_val.max(v);
        }
    }
    let mut val: Vec<Option<Box<Node>>> = (0..=max_val).map(|_| None).collect();
    while start < ops.len() {
        let v = operators.get(ops[start]).precond.get(var).expect("grouped by set value");
        let mut end = start + 1;
        while end < ops.len() && operators.get(ops[end]).precond.get(var) == Some(v) {
            end += 1;
        }
        val[v as usize] = Some(Box::new(build(operators, &ops[start..end], rest)));
        start = end;
    }

    Node::Branch { var, val, def }
}

fn find_node(node: &Node, get: &mut impl FnMut(VarId) -> Option<u16>, out: &mut Vec<OpId>) {
    match node {
        Node::Leaf { ops } => out.extend(ops.iter().copied()),
        Node::Branch { var, val, def } => {
            if let Some(d) = def {
                find_node(d, get, out);
            }
            if let Some(v) = get(*var) {
                if let Some(Some(child)) = val.get(v as usize) {
                    find_node(child, get, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplan_state::{Operator, PartialState, Variable, Variables};

    fn setup() -> (Variables, Operators) {
        let vars = Variables::new(vec![
            Variable::new("x", 3, false),
            Variable::new("y", 3, false),
        ]);
        let ids: Vec<VarId> = vars.ids().collect();
        let (x, y) = (ids[0], ids[1]);

        let mut pre_a = PartialState::new();
        pre_a.set(x, 0);
        let op_a = Operator {
            name: "a".into(),
            precond: pre_a,
            effect: PartialState::new(),
            cond_effects: vec![],
            cost: 1,
            owner: 0,
            global_id: 0,
            private: false,
        };

        let mut pre_b = PartialState::new();
        pre_b.set(x, 1);
        pre_b.set(y, 2);
        let op_b = Operator {
            name: "b".into(),
            precond: pre_b,
            effect: PartialState::new(),
            cond_effects: vec![],
            cost: 1,
            owner: 0,
            global_id: 1,
            private: false,
        };

        let op_c = Operator {
            name: "c".into(),
            precond: PartialState::new(),
            effect: PartialState::new(),
            cond_effects: vec![],
            cost: 1,
            owner: 0,
            global_id: 2,
            private: false,
        };

        (vars, Operators::new(vec![op_a, op_b, op_c]))
    }

    #[test]
    fn finds_only_applicable_operators() {
        let (vars, ops) = setup();
        let gen = SuccGen::new(&ops, vars.ids().collect());

        let state = State::from_fn(&vars, |v| if v == vars.ids().next().unwrap() { 0 } else { 0 });
        let found = gen.find(&state);
        // op_a (x=0) and op_c (no precond) apply; op_b (x=1,y=2) does not.
        assert_eq!(found.len(), 2);
        assert!(found.contains(&OpId::from(0usize)));
        assert!(found.contains(&OpId::from(2usize)));
    }

    #[test]
    fn finds_operator_requiring_exact_match() {
        let (vars, ops) = setup();
        let gen = SuccGen::new(&ops, vars.ids().collect());
        let ids: Vec<VarId> = vars.ids().collect();
        let state = State::from_fn(&vars, |v| if v == ids[0] { 1 } else { 2 });
        let found = gen.find(&state);
        assert!(found.contains(&OpId::from(1usize)));
        assert!(found.contains(&OpId::from(2usize)));
        assert!(!found.contains(&OpId::from(0usize)));
    }

    #[test]
    fn find_part_skips_unassigned_variables() {
        let (vars, ops) = setup();
        let gen = SuccGen::new(&ops, vars.ids().collect());
        let partial = PartialState::new();
        let found = gen.find_part(&partial);
        // No variable assigned: only the unconditional operator matches.
        assert_eq!(found, vec![OpId::from(2usize)]);
    }
}
