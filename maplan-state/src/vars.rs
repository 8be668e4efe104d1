use maplan_collections::create_ref_type;

create_ref_type!(VarId);
create_ref_type!(OpId);

/// A value taken by a variable. Finite, small, dense: ranges rarely exceed a
/// few dozen values in SAS+-style encodings.
pub type Value = u16;

/// A finite-domain state variable.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    /// Domain is `0..range` (exclusive upper bound).
    pub range: Value,
    /// Private variables are never sent on the wire (spec §3 "Variable / Value").
    pub private: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, range: Value, private: bool) -> Self {
        Variable {
            name: name.into(),
            range,
            private,
        }
    }
}

/// Static description of every variable of a problem, in a fixed order.
///
/// The fixed order is load-bearing: it is the order the packer uses to lay
/// out public vs. private bytes, and the order the successor generator's
/// decision tree branches on (spec §4.C).
#[derive(Debug, Clone, Default)]
pub struct Variables {
    vars: Vec<Variable>,
}

impl Variables {
    pub fn new(vars: Vec<Variable>) -> Self {
        Variables { vars }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn get(&self, id: VarId) -> &Variable {
        &self.vars[usize::from(id)]
    }

    pub fn ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len()).map(VarId::from)
    }

    pub fn public_ids(&self) -> impl Iterator<Item = VarId> + '_ {
        self.ids().filter(move |&v| !self.get(v).private)
    }

    pub fn private_ids(&self) -> impl Iterator<Item = VarId> + '_ {
        self.ids().filter(move |&v| self.get(v).private)
    }
}
