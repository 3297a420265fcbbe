use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;

/// Compressed storage for a one-to-many incidence relation, such as vertex-to-cell.
///
/// Each source entity `i` owns a contiguous slice of target indices. Within each slice,
/// targets appear in the order they were inserted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incidence {
    offsets: Vec<usize>,
    targets: Vec<usize>,
}

impl Debug for Incidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Default for Incidence {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            targets: Vec::new(),
        }
    }
}

impl Incidence {
    /// Builds the relation from `(source, target)` pairs.
    ///
    /// Panics if a source index is not smaller than `num_sources`.
    pub fn from_pairs<I>(num_sources: usize, pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
        I::IntoIter: Clone,
    {
        let pairs = pairs.into_iter();
        let mut counts = vec![0; num_sources];
        for (source, _) in pairs.clone() {
            assert!(source < num_sources, "Incidence source index out of bounds.");
            counts[source] += 1;
        }

        let mut offsets = Vec::with_capacity(num_sources + 1);
        offsets.push(0);
        for count in &counts {
            let last = *offsets.last().unwrap_or(&0);
            offsets.push(last + count);
        }

        // Fill in insertion order, reusing counts as per-source cursors
        let mut cursors = offsets[..num_sources].to_vec();
        let mut targets = vec![0; *offsets.last().unwrap_or(&0)];
        for (source, target) in pairs {
            targets[cursors[source]] = target;
            cursors[source] += 1;
        }

        Self { offsets, targets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&[usize]> {
        let begin = *self.offsets.get(index)?;
        let end = *self.offsets.get(index + 1)?;
        self.targets.get(begin..end)
    }

    pub fn iter<'a>(&'a self) -> impl 'a + Iterator<Item = &'a [usize]> {
        self.offsets
            .windows(2)
            .map(move |range| &self.targets[range[0]..range[1]])
    }

    /// Total number of stored (source, target) pairs.
    pub fn total_num_targets(&self) -> usize {
        self.targets.len()
    }
}

impl std::ops::Index<usize> for Incidence {
    type Output = [usize];

    fn index(&self, index: usize) -> &[usize] {
        self.get(index)
            .expect("Incidence index out of bounds.")
    }
}
