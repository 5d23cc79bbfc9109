//! A permutation stored both ways

use std::fmt;

/// Ranking of `n_pos` objects
///
/// `o[p]` is the object at position `p` and `r[obj]` the position of object
/// `obj`; the two vectors are inverse permutations of each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RankVal {
    o: Vec<usize>,
    r: Vec<usize>,
}

impl RankVal {
    /// Objects in natural order
    pub fn identity(n_pos: usize) -> Self {
        let o: Vec<usize> = (0..n_pos).collect();
        Self { r: o.clone(), o }
    }

    /// Builds from the ordering, `None` when `o` is not a permutation of `0..n`
    pub fn from_order(o: Vec<usize>) -> Option<Self> {
        let n = o.len();
        let mut r = vec![usize::MAX; n];
        for (p, &obj) in o.iter().enumerate() {
            if obj >= n || r[obj] != usize::MAX {
                return None;
            }
            r[obj] = p;
        }
        Some(Self { o, r })
    }

    pub fn n_pos(&self) -> usize {
        self.o.len()
    }

    pub fn o(&self) -> &[usize] {
        &self.o
    }

    pub fn r(&self) -> &[usize] {
        &self.r
    }

    /// Swaps the objects at positions `p` and `p + 1`
    pub fn permutation(&mut self, p: usize) {
        self.o.swap(p, p + 1);
        self.r[self.o[p]] = p;
        self.r[self.o[p + 1]] = p + 1;
    }

    /// Ordering with 1-based objects, as written in results
    pub fn to_one_based(&self) -> Vec<usize> {
        self.o.iter().map(|&v| v + 1).collect()
    }
}

impl fmt::Display for RankVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.o.iter().map(|v| (v + 1).to_string()).collect();
        write!(f, "{}", items.join(","))
    }
}
