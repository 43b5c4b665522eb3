//! Label table - bidirectional label name <-> step index mapping

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    by_name: BTreeMap<String, u16>,
    by_step: BTreeMap<u16, BTreeSet<String>>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a label. Returns false if the name is already taken.
    pub fn insert(&mut self, name: impl Into<String>, step: u16) -> bool {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return false;
        }
        self.by_step.entry(step).or_default().insert(name.clone());
        self.by_name.insert(name, step);
        true
    }

    pub fn step_of(&self, name: &str) -> Option<u16> {
        self.by_name.get(name).copied()
    }

    /// First label (by name) pointing at `step`
    pub fn name_at(&self, step: u16) -> Option<&str> {
        self.by_step
            .get(&step)
            .and_then(|names| names.iter().next())
            .map(String::as_str)
    }

    /// All labels pointing at `step`, sorted by name
    pub fn names_at(&self, step: u16) -> impl Iterator<Item = &str> {
        self.by_step
            .get(&step)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// `(name, step)` pairs sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.by_name.iter().map(|(name, &step)| (name.as_str(), step))
    }

    /// Distinct labelled steps, highest first
    pub fn steps_descending(&self) -> impl Iterator<Item = u16> + '_ {
        self.by_step.keys().rev().copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bidirectional() {
        let mut labels = LabelTable::new();
        assert!(labels.insert("loop", 2));
        assert!(labels.insert("again", 2));
        assert!(labels.insert("end", 5));
        assert!(!labels.insert("loop", 9));

        assert_eq!(labels.step_of("loop"), Some(2));
        assert_eq!(labels.step_of("missing"), None);
        assert_eq!(labels.name_at(2), Some("again"));
        assert_eq!(labels.names_at(2).collect::<Vec<_>>(), vec!["again", "loop"]);
        assert_eq!(labels.name_at(3), None);
        assert_eq!(labels.steps_descending().collect::<Vec<_>>(), vec![5, 2]);
        assert_eq!(labels.len(), 3);
    }
}
