//! Raw relation edges collected during ingestion.

use std::collections::{HashMap, HashSet};

/// Ordered map from an entity's raw identifier to the raw identifiers it
/// claims a relation to.
///
/// Source keys merge case-insensitively and keep the first spelling seen.
/// Targets keep their first-seen order and drop exact duplicates; they are
/// compared again during resolution, where case rules depend on whether the
/// target turns out to be a DN or a unique id.
#[derive(Debug, Clone, Default)]
pub struct RawMembershipIndex {
    entries: Vec<(String, Vec<String>)>,
    /// Targets already recorded per entry, parallel to `entries`.
    seen: Vec<HashSet<String>>,
    positions: HashMap<String, usize>,
}

impl RawMembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `source` relates to each of `targets`.
    ///
    /// Empty identifiers are ignored.
    pub fn insert<I, S>(&mut self, source: &str, targets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if source.is_empty() {
            return;
        }

        let key = source.to_lowercase();
        let position = match self.positions.get(&key) {
            Some(position) => *position,
            None => {
                self.entries.push((source.to_string(), Vec::new()));
                self.seen.push(HashSet::new());
                let position = self.entries.len() - 1;
                self.positions.insert(key, position);
                position
            }
        };

        let existing = &mut self.entries[position].1;
        let seen = &mut self.seen[position];
        for target in targets {
            let target = target.into();
            if !target.is_empty() && seen.insert(target.clone()) {
                existing.push(target);
            }
        }
    }

    /// Targets recorded for `source`, matched case-insensitively.
    pub fn get(&self, source: &str) -> Option<&[String]> {
        self.positions
            .get(&source.to_lowercase())
            .map(|position| self.entries[*position].1.as_slice())
    }

    /// Iterate sources and their targets in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(source, targets)| (source.as_str(), targets.as_slice()))
    }

    /// Number of distinct sources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of recorded edges.
    pub fn edge_count(&self) -> usize {
        self.entries.iter().map(|(_, targets)| targets.len()).sum()
    }
}
