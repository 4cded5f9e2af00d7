//! Adaptive quad-tree index over alignment sticks.
//!
//! Built once per layer over the fixed plot domain, then queried read-only
//! on every repaint. Segments are clipped at quadrant midlines during
//! insertion so that each stored piece lies entirely inside its node;
//! leaves keep at most eight entries before splitting.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CancelToken, Rect, Segment};

mod arena;
mod insert;
mod query;


use arena::{Arena, NodeId, QuadNode};
use insert::{insert, InsertCtx};

pub use query::QueryScratch;

/// Errors that can occur while building or querying a tree.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("memory allocation failed while building the stick index")]
    OutOfMemory,

    #[error("operation cancelled")]
    Cancelled,
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Shape summary of a built tree, as reported after every build and used by
/// the occupancy invariants in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    /// Total stored entries; exceeds the segment count when sticks split
    /// across quadrants.
    pub entries: usize,
    pub max_depth: u16,
    pub min_leaf_entries: usize,
    pub max_leaf_entries: usize,
    pub arena_bytes: usize,
}

/// Spatial index over one layer's segments. Owns the segment records it was
/// built over; read-only after build. Dropping it releases the node slabs
/// wholesale.
#[derive(Debug)]
pub struct QuadTree {
    arena: Arena,
    root: Option<NodeId>,
    domain: Rect,
    segments: Vec<Segment>,
}

impl QuadTree {
    /// An index with no segments; every query is empty.
    pub fn empty(domain: Rect) -> Self {
        Self {
            arena: Arena::new(),
            root: None,
            domain,
            segments: Vec::new(),
        }
    }

    /// Build the index for `segments` over `domain`. On error nothing is
    /// retained; there is no partially built tree.
    pub fn build(segments: Vec<Segment>, domain: Rect) -> TreeResult<Self> {
        Self::build_inner(segments, domain, None)
    }

    /// Like [`QuadTree::build`], polling `cancel` between segments.
    pub fn build_with_cancel(
        segments: Vec<Segment>,
        domain: Rect,
        cancel: &CancelToken,
    ) -> TreeResult<Self> {
        Self::build_inner(segments, domain, Some(cancel))
    }

    fn build_inner(
        segments: Vec<Segment>,
        domain: Rect,
        cancel: Option<&CancelToken>,
    ) -> TreeResult<Self> {
        let mut arena = Arena::new();
        let mut root = None;
        {
            let mut ctx = InsertCtx {
                segs: &segments,
                arena: &mut arena,
            };
            for (i, seg) in segments.iter().enumerate() {
                if let Some(token) = cancel {
                    if token.is_cancelled() {
                        return Err(TreeError::Cancelled);
                    }
                }
                let mut piece = Rect::of_segment(seg);
                let mut frame = domain;
                root = Some(insert(&mut ctx, root, &mut frame, &mut piece, i as u32, 0)?);
            }
        }
        let tree = Self {
            arena,
            root,
            domain,
            segments,
        };
        if log::log_enabled!(log::Level::Debug) {
            let st = tree.stats();
            log::debug!(
                "stick index built: {} segments, {} pieces, {} nodes ({} leaves), depth {}, {}KB",
                tree.segments.len(),
                st.entries,
                st.nodes,
                st.leaves,
                st.max_depth,
                st.arena_bytes >> 10,
            );
        }
        Ok(tree)
    }

    /// The domain the index was built over.
    pub fn domain(&self) -> Rect {
        self.domain
    }

    /// The segment records the index was built over, in insertion order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments the index was built over.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Walk the tree and summarize its shape.
    pub fn stats(&self) -> TreeStats {
        let mut st = TreeStats {
            min_leaf_entries: usize::MAX,
            arena_bytes: self.arena.allocated_bytes(),
            ..TreeStats::default()
        };
        if let Some(root) = self.root {
            self.stat_node(root, &mut st);
        }
        if st.leaves == 0 {
            st.min_leaf_entries = 0;
        }
        st
    }

    fn stat_node(&self, id: NodeId, st: &mut TreeStats) {
        st.nodes += 1;
        match self.arena[id] {
            QuadNode::Leaf {
                depth, len, next, ..
            } => {
                st.leaves += 1;
                st.entries += len as usize;
                st.max_depth = st.max_depth.max(depth);
                st.min_leaf_entries = st.min_leaf_entries.min(len as usize);
                st.max_leaf_entries = st.max_leaf_entries.max(len as usize);
                if let Some(bucket) = next {
                    self.stat_node(bucket, st);
                }
            }
            QuadNode::Internal { depth, quads } => {
                st.max_depth = st.max_depth.max(depth);
                for child in quads.into_iter().flatten() {
                    self.stat_node(child, st);
                }
            }
        }
    }
}
