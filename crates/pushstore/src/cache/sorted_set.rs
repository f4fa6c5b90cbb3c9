/// Score-ordered set of unique members, the per-key structure of a cache node.
///
/// Ties on score are broken by member bytes. Rank arguments follow the
/// usual sorted-set convention: 0 is the lowest score, -1 the highest.
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `member`, or move it to `score` if already present.
    /// Returns true when the member is new.
    pub fn add(&mut self, score: i64, member: String) -> bool {
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                self.ordered.remove(&(old, member.clone()));
                self.ordered.insert((score, member));
                false
            }
            None => {
                self.ordered.insert((score, member));
                true
            }
        }
    }

    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    /// Remove members ranked `start..=stop`. Returns how many were removed.
    pub fn remove_range_by_rank(&mut self, start: i64, stop: i64) -> usize {
        let len = self.ordered.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return 0;
        }

        let doomed: Vec<(i64, String)> = self
            .ordered
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect();

        for entry in &doomed {
            self.ordered.remove(entry);
            self.scores.remove(&entry.1);
        }
        doomed.len()
    }

    /// Members with score strictly greater than `min`, lowest score first.
    pub fn range_above(&self, min: i64) -> Vec<String> {
        let Some(lowest) = min.checked_add(1) else {
            return vec![];
        };
        self.ordered
            .range((lowest, String::new())..)
            .map(|(_, member)| member.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
