//! Fresh name generation for one procedure
//!
//! A `NameGen` is created per procedure and passed by `&mut` to every pass that
//! invents names. Counters only move forward.

use crate::tac::types::{Label, Temp};
use std::collections::HashSet;

#[derive(Debug)]
pub struct NameGen {
    next_block: u32,
    next_version: u32,
    taken: HashSet<Label>,
    taken_temps: HashSet<Temp>,
}

impl NameGen {
    /// Create a generator that avoids the given labels
    pub fn new<'a>(taken: impl IntoIterator<Item = &'a Label>) -> Self {
        Self {
            next_block: 0,
            next_version: 1,
            taken: taken.into_iter().cloned().collect(),
            taken_temps: HashSet::new(),
        }
    }

    /// Also avoid versions that already appear in the procedure
    pub fn with_temps<'a>(mut self, temps: impl IntoIterator<Item = &'a Temp>) -> Self {
        self.taken_temps.extend(temps.into_iter().filter(|t| t.version().is_some()).cloned());
        self
    }

    /// A block label not used anywhere in the procedure
    pub fn fresh_label(&mut self) -> Label {
        loop {
            let label = Label::new(format!("_bb{}", self.next_block));
            self.next_block += 1;
            if self.taken.insert(label.clone()) {
                return label;
            }
        }
    }

    /// Next SSA version of `temp`, unique across the whole procedure
    pub fn fresh_version(&mut self, temp: &Temp) -> Temp {
        loop {
            let candidate = temp.with_version(self.next_version);
            self.next_version += 1;
            if !self.taken_temps.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Number of versions handed out so far
    pub fn versions(&self) -> u32 {
        self.next_version - 1
    }
}
