//! Rewrite-time state: the known-value environment, the mutation ledger and
//! the fresh-name supply.

use std::collections::{HashMap, HashSet};

use pe_core::ast::{Ident, Value};

/// Names with values known to the current rewrite attempt.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    map: HashMap<Ident, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &Ident) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &Ident) -> bool {
        self.map.contains_key(name)
    }

    pub fn insert(&mut self, name: Ident, value: Value) {
        self.map.insert(name, value);
    }

    pub fn remove(&mut self, name: &Ident) -> Option<Value> {
        self.map.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &Ident> {
        self.map.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ident, &Value)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<(Ident, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (Ident, Value)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// Names observed escaping into an opaque call or attribute store. Once a
/// name is here its value can no longer be trusted, this attempt or later
/// within the same tree.
#[derive(Debug, Clone, Default)]
pub struct MutatedSet {
    set: HashSet<Ident>,
}

impl MutatedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &Ident) -> bool {
        self.set.contains(name)
    }

    /// Returns true if the name was not already recorded.
    pub fn insert(&mut self, name: Ident) -> bool {
        self.set.insert(name)
    }
}

/// Generates names guaranteed not to collide with source-level names. Owned
/// by the rewrite attempt, so repeated attempts over the same tree produce
/// the same numbering.
#[derive(Debug, Clone, Default)]
pub struct NameSupply {
    next: u32,
}

impl NameSupply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Ident {
        let n = self.next;
        self.next += 1;
        Ident::new(format!("__pe_var_{}", n))
    }
}
