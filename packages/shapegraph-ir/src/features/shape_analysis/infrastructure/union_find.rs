//! Union-Find with link offsets
//!
//! Disjoint-set forest where every parent edge carries a byte offset: if
//! `x` forwards to `p` with offset `d`, then byte `k` of `x` is byte `k + d`
//! of `p`. `find` returns the root together with the accumulated offset and
//! compresses the path, rewriting each visited edge to point straight at the
//! root with the summed offset.
//!
//! The representative is chosen by the caller (the graph decides which node
//! survives a merge), so there is no union-by-rank here.
//!
//! # References
//! - Tarjan, R. E. "Efficiency of a Good But Not Linear Set Union Algorithm" (1975)
//! - Steensgaard, B. "Points-to Analysis in Almost Linear Time" (POPL 1996)

#[derive(Debug, Clone, Default)]
pub struct OffsetUnionFind {
    /// Parent pointers (self-loop = root)
    parent: Vec<u32>,

    /// Offset of each element inside its parent
    delta: Vec<u32>,

    /// Number of disjoint sets
    set_count: usize,
}

impl OffsetUnionFind {
    /// Add a fresh singleton and return its id
    pub fn push(&mut self) -> u32 {
        let id = self.parent.len() as u32;
        self.parent.push(id);
        self.delta.push(0);
        self.set_count += 1;
        id
    }

    /// Root of `x` and the offset of `x` inside it, with path compression
    pub fn find(&mut self, x: u32) -> (u32, u32) {
        let idx = x as usize;
        let parent = self.parent[idx];
        if parent == x {
            return (x, 0);
        }

        let (root, parent_delta) = self.find(parent);
        let total = self.delta[idx].saturating_add(parent_delta);
        self.parent[idx] = root;
        self.delta[idx] = total;
        (root, total)
    }

    /// Same as `find`, without touching the structure
    pub fn find_readonly(&self, x: u32) -> (u32, u32) {
        let mut current = x;
        let mut total = 0;
        while self.parent[current as usize] != current {
            total = self.delta[current as usize].saturating_add(total);
            current = self.parent[current as usize];
        }
        (current, total)
    }

    /// Forward root `child` into root `parent` at `offset`
    ///
    /// Both must be roots and distinct; anything else is a caller bug.
    pub fn link(&mut self, child: u32, parent: u32, offset: u32) {
        assert_ne!(child, parent, "cannot link a set into itself");
        assert!(self.is_root(child) && self.is_root(parent));
        self.parent[child as usize] = parent;
        self.delta[child as usize] = offset;
        self.set_count -= 1;
    }

    #[inline]
    pub fn is_root(&self, x: u32) -> bool {
        self.parent[x as usize] == x
    }

    /// Number of disjoint sets
    #[inline]
    pub fn count(&self) -> usize {
        self.set_count
    }

    /// Get all roots (set representatives)
    pub fn roots(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.parent.len() as u32).filter(move |&i| self.is_root(i))
    }
}
