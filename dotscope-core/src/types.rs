//! Shared value types for the dotscope engines.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Global plot coordinate (base pairs; contig offsets pre-resolved upstream).
pub type GenomicPos = i64;

/// One aligned block ("stick") between the two genome axes, in global plot
/// coordinates. The stick runs from `(abeg, bbeg)` to `(aend, bend)`; a
/// reverse-strand alignment has `bend < bbeg`. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub abeg: GenomicPos,
    pub aend: GenomicPos,
    pub bbeg: GenomicPos,
    pub bend: GenomicPos,
    /// Percent identity of the block, 0.0..=100.0.
    pub identity: f32,
    /// Index of the alignment record this block was loaded from.
    pub orig_index: u32,
}

impl Segment {
    pub fn new(
        abeg: GenomicPos,
        aend: GenomicPos,
        bbeg: GenomicPos,
        bend: GenomicPos,
        identity: f32,
        orig_index: u32,
    ) -> Self {
        Self {
            abeg,
            aend,
            bbeg,
            bend,
            identity,
            orig_index,
        }
    }

    /// Extent of the block along the A axis.
    pub fn a_span(&self) -> GenomicPos {
        self.aend - self.abeg
    }
}

/// Axis-aligned rectangle over the two genome axes. Serves both as a tree
/// node's covering region and as a query viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub abeg: f64,
    pub aend: f64,
    pub bbeg: f64,
    pub bend: f64,
}

impl Rect {
    pub fn new(abeg: f64, aend: f64, bbeg: f64, bend: f64) -> Self {
        Self {
            abeg,
            aend,
            bbeg,
            bend,
        }
    }

    /// The full plot domain `[0,alen) x [0,blen)`.
    pub fn domain(alen: GenomicPos, blen: GenomicPos) -> Self {
        Self::new(0.0, alen as f64, 0.0, blen as f64)
    }

    /// The covering rectangle of a segment's two endpoints.
    pub fn of_segment(seg: &Segment) -> Self {
        Self::new(
            seg.abeg as f64,
            seg.aend as f64,
            seg.bbeg as f64,
            seg.bend as f64,
        )
    }

    pub(crate) fn amid(&self) -> f64 {
        (self.abeg + self.aend) / 2.0
    }

    pub(crate) fn bmid(&self) -> f64 {
        (self.bbeg + self.bend) / 2.0
    }
}

/// Cooperative cancellation flag shared between a caller and an in-flight
/// build/query/match call. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the running call returns a `Cancelled` error at
    /// its next checkpoint.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
