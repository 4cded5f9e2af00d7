//! Viewport range queries.
//!
//! A query descends only into the children whose quadrant overlaps the
//! viewport. A segment split across several leaves must still be reported
//! once; the dedup state lives in a caller-owned [`QueryScratch`] stamped
//! with a per-query generation, so the tree itself stays read-only and
//! concurrent queries each bring their own scratch.

use crate::types::{CancelToken, Rect, Segment};

use super::arena::{NodeId, QuadNode};
use super::insert::{Q_NE, Q_NW, Q_SE, Q_SW};
use super::QuadTree;

/// Does the stick's line cross the closed viewport rectangle? Parametric
/// interval clip over both axes; degenerate sticks reduce to a point test.
fn stick_intersects(seg: &Segment, view: &Rect) -> bool {
    let x1 = seg.abeg as f64;
    let y1 = seg.bbeg as f64;
    let dx = seg.aend as f64 - x1;
    let dy = seg.bend as f64 - y1;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-dx, x1 - view.abeg),
        (dx, view.aend - x1),
        (-dy, y1 - view.bbeg),
        (dy, view.bend - y1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
        } else {
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
            if t0 > t1 {
                return false;
            }
        }
    }
    true
}

/// Reusable per-query state: the hit list and the generation stamps that
/// dedup a segment reported by more than one leaf. One scratch serves one
/// query at a time; reuse across frames avoids per-frame allocation.
#[derive(Debug, Default)]
pub struct QueryScratch {
    hits: Vec<u32>,
    last_seen: Vec<u32>,
    generation: u32,
}

impl QueryScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hits of the most recent query, as indices into the queried layer's
    /// segment slice. Order follows the tree walk.
    pub fn hits(&self) -> &[u32] {
        &self.hits
    }

    fn begin(&mut self, num_segments: usize) {
        self.hits.clear();
        if self.last_seen.len() < num_segments {
            self.last_seen.resize(num_segments, 0);
        }
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            // Stamp wrap: old stamps could alias the new generation.
            self.last_seen.fill(0);
            self.generation = 1;
        }
    }

    /// Stamp `seg` for this query; on first sight, test its full geometry
    /// against the viewport and report it on a hit. Later sightings from
    /// other leaves are skipped outright (the geometry test is identical).
    fn record(&mut self, seg: u32, segment: &Segment, view: &Rect) {
        let slot = &mut self.last_seen[seg as usize];
        if *slot != self.generation {
            *slot = self.generation;
            if stick_intersects(segment, view) {
                self.hits.push(seg);
            }
        }
    }
}

impl QuadTree {
    /// Collect every segment crossing `viewport`, each exactly once. An
    /// empty or unbuilt tree yields an empty result.
    pub fn query<'s>(&self, viewport: &Rect, scratch: &'s mut QueryScratch) -> &'s [u32] {
        scratch.begin(self.segments.len());
        if let Some(root) = self.root {
            let mut frame = self.domain;
            self.visit(root, &mut frame, viewport, scratch, None);
        }
        scratch.hits()
    }

    /// Like [`QuadTree::query`], polling `cancel` at every internal node.
    pub fn query_with_cancel<'s>(
        &self,
        viewport: &Rect,
        scratch: &'s mut QueryScratch,
        cancel: &CancelToken,
    ) -> super::TreeResult<&'s [u32]> {
        scratch.begin(self.segments.len());
        if let Some(root) = self.root {
            let mut frame = self.domain;
            if !self.visit(root, &mut frame, viewport, scratch, Some(cancel)) {
                return Err(super::TreeError::Cancelled);
            }
        }
        Ok(scratch.hits())
    }

    /// Returns false when cancelled mid-walk.
    fn visit(
        &self,
        id: NodeId,
        frame: &mut Rect,
        view: &Rect,
        scratch: &mut QueryScratch,
        cancel: Option<&CancelToken>,
    ) -> bool {
        match self.arena[id] {
            QuadNode::Leaf { len, idx, next, .. } => {
                for &seg in &idx[..len as usize] {
                    scratch.record(seg, &self.segments[seg as usize], view);
                }
                let mut bucket = next;
                while let Some(b) = bucket {
                    if let QuadNode::Leaf { len, idx, next, .. } = self.arena[b] {
                        for &seg in &idx[..len as usize] {
                            scratch.record(seg, &self.segments[seg as usize], view);
                        }
                        bucket = next;
                    } else {
                        bucket = None;
                    }
                }
                true
            }
            QuadNode::Internal { quads, .. } => {
                if let Some(token) = cancel {
                    if token.is_cancelled() {
                        return false;
                    }
                }
                let amid = frame.amid();
                let bmid = frame.bmid();

                if view.abeg < amid && view.bbeg < bmid {
                    if let Some(c) = quads[Q_NW] {
                        let (aend, bend) = (frame.aend, frame.bend);
                        frame.aend = amid;
                        frame.bend = bmid;
                        if !self.visit(c, frame, view, scratch, cancel) {
                            return false;
                        }
                        frame.aend = aend;
                        frame.bend = bend;
                    }
                }
                if view.abeg < amid && view.bend > bmid {
                    if let Some(c) = quads[Q_NE] {
                        let (aend, bbeg) = (frame.aend, frame.bbeg);
                        frame.aend = amid;
                        frame.bbeg = bmid;
                        if !self.visit(c, frame, view, scratch, cancel) {
                            return false;
                        }
                        frame.aend = aend;
                        frame.bbeg = bbeg;
                    }
                }
                if view.aend > amid && view.bend > bmid {
                    if let Some(c) = quads[Q_SE] {
                        let (abeg, bbeg) = (frame.abeg, frame.bbeg);
                        frame.abeg = amid;
                        frame.bbeg = bmid;
                        if !self.visit(c, frame, view, scratch, cancel) {
                            return false;
                        }
                        frame.abeg = abeg;
                        frame.bbeg = bbeg;
                    }
                }
                if view.aend > amid && view.bbeg < bmid {
                    if let Some(c) = quads[Q_SW] {
                        let (abeg, bend) = (frame.abeg, frame.bend);
                        frame.abeg = amid;
                        frame.bend = bmid;
                        if !self.visit(c, frame, view, scratch, cancel) {
                            return false;
                        }
                        frame.abeg = abeg;
                        frame.bend = bend;
                    }
                }
                true
            }
        }
    }
}
