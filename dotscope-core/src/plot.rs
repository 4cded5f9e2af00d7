//! Plot model: the fixed domain plus up to [`MAX_LAYERS`] alignment layers,
//! each carrying its segments and the stick index built over them.
//!
//! Layer loading and file parsing happen upstream; this module receives
//! in-memory segment records, applies the display filters, and owns the
//! per-layer trees and the shared dot engine scratch.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dots::{DotEngine, DotParams, DotResult, Dots};
use crate::qtree::{QuadTree, QueryScratch, TreeError};
use crate::types::{CancelToken, GenomicPos, Rect, Segment};

/// Maximum number of alignment layers a plot can hold.
pub const MAX_LAYERS: usize = 5;

/// Errors that can occur while managing a plot.
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("cannot have more than {} alignment layers", MAX_LAYERS)]
    CapacityExceeded,

    #[error("no layer at index {0}")]
    UnknownLayer(usize),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

pub type PlotResult<T> = Result<T, PlotError>;

/// Display filter applied to a layer's segments before its tree is built.
/// `None` fields pass everything through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerFilter {
    /// Drop blocks whose A-axis span is at or below this cut.
    pub min_span: Option<GenomicPos>,
    /// Drop blocks whose percent identity is at or below this cut.
    pub min_identity: Option<f32>,
    /// Keep only (roughly) the longest N blocks. The span threshold is
    /// rounded down to a round number as long as that costs it less than
    /// 10%, so blocks just under the exact N-th length survive too.
    pub max_blocks: Option<usize>,
}

impl LayerFilter {
    /// Apply the filter to `segs`, logging what was culled.
    pub fn apply(&self, name: &str, mut segs: Vec<Segment>) -> Vec<Segment> {
        let initial = segs.len();

        if self.min_span.is_some() || self.min_identity.is_some() {
            let span_cut = self.min_span;
            let identity_cut = self.min_identity;
            segs.retain(|s| {
                span_cut.map_or(true, |c| s.a_span() > c)
                    && identity_cut.map_or(true, |c| s.identity > c)
            });
        }

        match self.max_blocks {
            Some(0) => segs.clear(),
            Some(max) if segs.len() > max => {
                let mut spans: Vec<GenomicPos> = segs.iter().map(|s| s.a_span()).collect();
                spans.sort_unstable_by(|x, y| y.cmp(x));
                let mut cutoff = spans[max - 1];
                if cutoff > 0 {
                    // Zero the low digits of the cutoff while that keeps at
                    // least 90% of it.
                    let mut digits: GenomicPos = 1;
                    loop {
                        let next = digits * 10;
                        if ((cutoff / next) * next) as f64 <= 0.9 * cutoff as f64 {
                            break;
                        }
                        digits = next;
                    }
                    cutoff = (cutoff / digits) * digits;
                }
                segs.retain(|s| s.a_span() >= cutoff);
            }
            _ => {}
        }

        if segs.len() < initial {
            log::info!(
                "layer {name}: {} of {initial} blocks pass the display filter",
                segs.len()
            );
        }
        segs
    }
}

/// One alignment layer: the index built over its filtered segments.
#[derive(Debug)]
pub struct Layer {
    name: String,
    tree: QuadTree,
}

impl Layer {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The layer's filtered segments; query hits index into this slice.
    pub fn segments(&self) -> &[Segment] {
        self.tree.segments()
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }
}

/// A dot plot over the domain `[0,alen) x [0,blen)`.
pub struct DotPlot {
    alen: GenomicPos,
    blen: GenomicPos,
    layers: Vec<Layer>,
    engine: DotEngine,
}

impl DotPlot {
    pub fn new(alen: GenomicPos, blen: GenomicPos) -> Self {
        Self::with_params(alen, blen, DotParams::default())
    }

    pub fn with_params(alen: GenomicPos, blen: GenomicPos, params: DotParams) -> Self {
        Self {
            alen,
            blen,
            layers: Vec::new(),
            engine: DotEngine::new(params),
        }
    }

    pub fn alen(&self) -> GenomicPos {
        self.alen
    }

    pub fn blen(&self) -> GenomicPos {
        self.blen
    }

    pub fn domain(&self) -> Rect {
        Rect::domain(self.alen, self.blen)
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// Filter `segments`, build the layer's tree, and append the layer.
    /// The layer limit is checked before any tree work begins.
    pub fn add_layer(
        &mut self,
        name: impl Into<String>,
        segments: Vec<Segment>,
        filter: &LayerFilter,
    ) -> PlotResult<usize> {
        if self.layers.len() >= MAX_LAYERS {
            return Err(PlotError::CapacityExceeded);
        }
        let name = name.into();
        let segments = filter.apply(&name, segments);
        let tree = QuadTree::build(segments, self.domain())?;
        log::info!("layer {name}: indexed {} blocks", tree.num_segments());
        self.layers.push(Layer { name, tree });
        Ok(self.layers.len() - 1)
    }

    /// Add several layers at once, building their trees on worker threads.
    /// Capacity is checked for the whole batch up front; on any build error
    /// no layer of the batch is committed.
    pub fn add_layers(
        &mut self,
        batch: Vec<(String, Vec<Segment>)>,
        filter: &LayerFilter,
    ) -> PlotResult<Vec<usize>> {
        if self.layers.len() + batch.len() > MAX_LAYERS {
            return Err(PlotError::CapacityExceeded);
        }
        let domain = self.domain();
        let built = batch
            .into_par_iter()
            .map(|(name, segments)| {
                let segments = filter.apply(&name, segments);
                let tree = QuadTree::build(segments, domain)?;
                Ok(Layer { name, tree })
            })
            .collect::<Result<Vec<Layer>, TreeError>>()?;
        let first = self.layers.len();
        for layer in &built {
            log::info!(
                "layer {}: indexed {} blocks",
                layer.name,
                layer.tree.num_segments()
            );
        }
        self.layers.extend(built);
        Ok((first..self.layers.len()).collect())
    }

    /// Drop a layer, bulk-releasing its tree.
    pub fn remove_layer(&mut self, index: usize) -> PlotResult<Layer> {
        if index >= self.layers.len() {
            return Err(PlotError::UnknownLayer(index));
        }
        let layer = self.layers.remove(index);
        log::info!("layer {}: removed", layer.name);
        Ok(layer)
    }

    /// Segments of `layer` visible in `viewport`, each exactly once, as
    /// indices into that layer's segment slice.
    pub fn query_layer<'s>(
        &self,
        layer: usize,
        viewport: &Rect,
        scratch: &'s mut QueryScratch,
    ) -> PlotResult<&'s [u32]> {
        let layer = self
            .layers
            .get(layer)
            .ok_or(PlotError::UnknownLayer(layer))?;
        Ok(layer.tree.query(viewport, scratch))
    }

    /// Base-resolution dot plot of two extracted sub-sequences at `k`.
    pub fn dots(&mut self, aseq: &[u8], bseq: &[u8], k: usize) -> DotResult<Dots<'_>> {
        self.engine.dots(aseq, bseq, k)
    }

    /// Like [`DotPlot::dots`] with a cancellation checkpoint.
    pub fn dots_with_cancel(
        &mut self,
        aseq: &[u8],
        bseq: &[u8],
        k: usize,
        cancel: &CancelToken,
    ) -> DotResult<Dots<'_>> {
        self.engine.dots_with_cancel(aseq, bseq, k, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(abeg: i64, aend: i64, identity: f32) -> Segment {
        Segment::new(abeg, aend, abeg, aend, identity, 0)
    }

    #[test]
    fn test_layer_capacity_is_checked_up_front() {
        let mut plot = DotPlot::new(1000, 1000);
        let filter = LayerFilter::default();
        for i in 0..MAX_LAYERS {
            let idx = plot
                .add_layer(format!("layer-{i}"), vec![seg(0, 10, 90.0)], &filter)
                .unwrap();
            assert_eq!(idx, i);
        }
        assert!(matches!(
            plot.add_layer("overflow", vec![seg(0, 10, 90.0)], &filter),
            Err(PlotError::CapacityExceeded)
        ));
        assert_eq!(plot.num_layers(), MAX_LAYERS);
    }

    #[test]
    fn test_batch_capacity_rejects_before_building() {
        let mut plot = DotPlot::new(1000, 1000);
        let batch: Vec<(String, Vec<Segment>)> = (0..MAX_LAYERS + 1)
            .map(|i| (format!("l{i}"), vec![seg(0, 10, 90.0)]))
            .collect();
        assert!(matches!(
            plot.add_layers(batch, &LayerFilter::default()),
            Err(PlotError::CapacityExceeded)
        ));
        assert_eq!(plot.num_layers(), 0);
    }

    #[test]
    fn test_batch_layers_match_serial_layers() {
        let segs: Vec<Segment> = (0..200)
            .map(|i| Segment::new(i * 4, i * 4 + 40, i * 4, i * 4 + 40, 90.0, i as u32))
            .collect();
        let filter = LayerFilter::default();

        let mut serial = DotPlot::new(1000, 1000);
        serial.add_layer("one", segs.clone(), &filter).unwrap();
        serial.add_layer("two", segs.clone(), &filter).unwrap();

        let mut batch = DotPlot::new(1000, 1000);
        let ids = batch
            .add_layers(
                vec![("one".to_string(), segs.clone()), ("two".to_string(), segs)],
                &filter,
            )
            .unwrap();
        assert_eq!(ids, vec![0, 1]);

        let view = Rect::new(100.5, 300.5, 100.5, 300.5);
        let mut s1 = QueryScratch::new();
        let mut s2 = QueryScratch::new();
        for layer in 0..2 {
            let mut a = serial.query_layer(layer, &view, &mut s1).unwrap().to_vec();
            let mut b = batch.query_layer(layer, &view, &mut s2).unwrap().to_vec();
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_span_and_identity_cuts() {
        let filter = LayerFilter {
            min_span: Some(50),
            min_identity: Some(80.0),
            max_blocks: None,
        };
        let segs = vec![
            seg(0, 40, 95.0),   // span too short
            seg(0, 50, 95.0),   // span exactly at the cut: dropped
            seg(0, 100, 80.0),  // identity exactly at the cut: dropped
            seg(0, 100, 95.0),  // passes
            seg(0, 200, 81.0),  // passes
        ];
        let kept = filter.apply("t", segs);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|s| s.a_span() > 50 && s.identity > 80.0));
    }

    #[test]
    fn test_longest_blocks_cut_rounds_the_threshold() {
        // Spans 1..=100; keeping the longest 10 gives an exact threshold of
        // 91, which rounds down to 90 and keeps one extra block.
        let segs: Vec<Segment> = (1..=100).map(|i| seg(0, i, 90.0)).collect();
        let filter = LayerFilter {
            max_blocks: Some(10),
            ..LayerFilter::default()
        };
        let kept = filter.apply("t", segs);
        assert_eq!(kept.len(), 11);
        assert!(kept.iter().all(|s| s.a_span() >= 90));
    }

    #[test]
    fn test_remove_layer_and_unknown_layer() {
        let mut plot = DotPlot::new(1000, 1000);
        let filter = LayerFilter::default();
        plot.add_layer("keep", vec![seg(0, 10, 90.0)], &filter).unwrap();
        plot.add_layer("drop", vec![seg(0, 10, 90.0)], &filter).unwrap();

        let removed = plot.remove_layer(1).unwrap();
        assert_eq!(removed.name(), "drop");
        assert_eq!(plot.num_layers(), 1);

        let mut scratch = QueryScratch::new();
        assert!(matches!(
            plot.query_layer(1, &Rect::new(0.0, 1.0, 0.0, 1.0), &mut scratch),
            Err(PlotError::UnknownLayer(1))
        ));
    }

    #[test]
    fn test_dots_passthrough() {
        let mut plot = DotPlot::new(1000, 1000);
        let seq: Vec<u8> = vec![0, 1, 2, 3, 0, 1, 2, 3];
        let dots = plot.dots(&seq, &seq, 4).unwrap();
        assert!(dots.num_matches() > 0);
    }
}
