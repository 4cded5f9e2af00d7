//! Base-resolution k-mer dot plot engine.
//!
//! Given two extracted symbol sequences (2-bit alphabet plus a gap symbol)
//! and a k-mer length, computes every pair of positions whose canonical
//! k-mers match. Both sequences get a sorted vector of (code, position)
//! tuples which a single merge-join turns into a row -> column-run table
//! shaped for the rasterizer's sequential sweep.
//!
//! All scratch is owned by the engine and sized once; repeated calls during
//! pan/zoom do not allocate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::CancelToken;

/// Sequence symbol that invalidates any k-mer window covering it
/// (gap / unsequenced base).
pub const GAP_SYMBOL: u8 = 4;

/// Default bound on k-mer tuples per sequence (and so on match columns).
pub const DEFAULT_MAX_TUPLES: usize = 1_000_000;

/// How many windows are processed between cancellation checks.
const CANCEL_STRIDE: usize = 4096;

/// Errors that can occur while computing a dot plot.
#[derive(Debug, Error)]
pub enum DotError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("k-mer table capacity of {0} tuples exceeded")]
    ResultOverflow(usize),

    #[error("operation cancelled")]
    Cancelled,
}

pub type DotResult<T> = Result<T, DotError>;

/// Engine sizing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DotParams {
    /// Hard bound on k-mer tuples per sequence; exceeding it fails the call
    /// with [`DotError::ResultOverflow`] rather than truncating the plot.
    pub max_tuples: usize,
}

impl Default for DotParams {
    fn default() -> Self {
        Self {
            max_tuples: DEFAULT_MAX_TUPLES,
        }
    }
}

/// A (canonical code, window start) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tuple {
    code: u64,
    pos: u32,
}

/// One row of the match table: all matches whose B-axis position is `bpos`
/// share the column run `cols[start..start + len]`.
#[derive(Debug, Clone, Copy)]
struct DotRow {
    bpos: u32,
    start: u32,
    len: u32,
}

/// Row -> column-run view over the most recent [`DotEngine`] call. Rows come
/// in code order; iterate rows and their runs sequentially to rasterize.
#[derive(Debug)]
pub struct Dots<'a> {
    rows: &'a [DotRow],
    cols: &'a [u32],
}

impl<'a> Dots<'a> {
    /// Iterate `(b_position, a_positions)` rows. Rows whose code has no
    /// counterpart in the A sequence carry an empty slice.
    pub fn rows(&self) -> impl Iterator<Item = (u32, &'a [u32])> + '_ {
        self.rows.iter().map(|r| {
            let run = &self.cols[r.start as usize..(r.start + r.len) as usize];
            (r.bpos, run)
        })
    }

    /// Number of rows (valid k-mer windows in the B sequence).
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Total number of matches (dots) across all rows.
    pub fn num_matches(&self) -> usize {
        self.rows.iter().map(|r| r.len as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.len == 0)
    }
}

/// Reusable k-mer match engine. One engine serves one caller at a time;
/// independent engines are fully independent.
pub struct DotEngine {
    params: DotParams,
    alist: Vec<Tuple>,
    blist: Vec<Tuple>,
    rows: Vec<DotRow>,
    cols: Vec<u32>,
}

impl DotEngine {
    pub fn new(params: DotParams) -> Self {
        let cap = params.max_tuples;
        Self {
            params,
            // One extra slot per list for the merge sentinel.
            alist: Vec::with_capacity(cap + 1),
            blist: Vec::with_capacity(cap + 1),
            rows: Vec::with_capacity(cap),
            cols: Vec::with_capacity(cap),
        }
    }

    pub fn params(&self) -> &DotParams {
        &self.params
    }

    /// Compute the dot plot of `aseq` x `bseq` at k-mer length `k`.
    ///
    /// Sequences are over the symbols 0..=3 plus [`GAP_SYMBOL`]; any window
    /// covering a gap symbol is suppressed. The returned view borrows the
    /// engine's scratch and is valid until the next call.
    pub fn dots(&mut self, aseq: &[u8], bseq: &[u8], k: usize) -> DotResult<Dots<'_>> {
        self.dots_inner(aseq, bseq, k, None)
    }

    /// Like [`DotEngine::dots`], polling `cancel` so a superseded viewport
    /// request can abandon its work.
    pub fn dots_with_cancel(
        &mut self,
        aseq: &[u8],
        bseq: &[u8],
        k: usize,
        cancel: &CancelToken,
    ) -> DotResult<Dots<'_>> {
        self.dots_inner(aseq, bseq, k, Some(cancel))
    }

    fn dots_inner(
        &mut self,
        aseq: &[u8],
        bseq: &[u8],
        k: usize,
        cancel: Option<&CancelToken>,
    ) -> DotResult<Dots<'_>> {
        if !(4..=32).contains(&k) {
            return Err(DotError::InvalidParams(format!(
                "k-mer length {k} outside 4..=32"
            )));
        }

        let max = self.params.max_tuples;
        build_vector(aseq, k, max, &mut self.alist, cancel)?;
        build_vector(bseq, k, max, &mut self.blist, cancel)?;

        self.alist.sort_unstable_by_key(|t| t.code);
        self.blist.sort_unstable_by_key(|t| t.code);
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(DotError::Cancelled);
            }
        }

        self.merge(cancel)?;
        Ok(Dots {
            rows: &self.rows,
            cols: &self.cols,
        })
    }

    /// Merge-join the two sorted tuple vectors. A +infinity sentinel appended
    /// to each vector closes the final code runs, so the maximal real code
    /// needs no special handling (canonical codes can never equal the
    /// sentinel: for k < 32 they are below 2^(2k), and for k = 32 the
    /// all-ones forward code pairs with the all-zero reverse complement).
    fn merge(&mut self, cancel: Option<&CancelToken>) -> DotResult<()> {
        self.rows.clear();
        self.cols.clear();
        self.alist.push(Tuple {
            code: u64::MAX,
            pos: u32::MAX,
        });
        self.blist.push(Tuple {
            code: u64::MAX,
            pos: u32::MAX,
        });

        let brun = self.blist.len() - 1;
        let mut i = 0usize;
        let mut j = 0usize;
        let mut runs = 0usize;
        while i < brun {
            if let Some(token) = cancel {
                runs += 1;
                if runs % CANCEL_STRIDE == 0 && token.is_cancelled() {
                    self.alist.pop();
                    self.blist.pop();
                    return Err(DotError::Cancelled);
                }
            }

            let code = self.blist[i].code;
            while self.alist[j].code < code {
                j += 1;
            }
            if self.alist[j].code == code {
                let start = self.cols.len() as u32;
                while self.alist[j].code == code {
                    self.cols.push(self.alist[j].pos);
                    j += 1;
                }
                let len = self.cols.len() as u32 - start;
                while i < brun && self.blist[i].code == code {
                    self.rows.push(DotRow {
                        bpos: self.blist[i].pos,
                        start,
                        len,
                    });
                    i += 1;
                }
            } else {
                while i < brun && self.blist[i].code == code {
                    self.rows.push(DotRow {
                        bpos: self.blist[i].pos,
                        start: 0,
                        len: 0,
                    });
                    i += 1;
                }
            }
        }

        self.alist.pop();
        self.blist.pop();
        Ok(())
    }
}

/// Scan `seq`, emitting one canonical-code tuple per valid k-mer window.
/// The forward code rolls new symbols into the low bits while the reverse
/// complement rolls them into the high bits; the numerically smaller of the
/// two is canonical. A gap symbol clears both and emission resumes only once
/// k valid symbols have accumulated again.
fn build_vector(
    seq: &[u8],
    k: usize,
    max: usize,
    list: &mut Vec<Tuple>,
    cancel: Option<&CancelToken>,
) -> DotResult<()> {
    list.clear();

    let kmask = if k == 32 {
        u64::MAX
    } else {
        (1u64 << (2 * k)) - 1
    };
    let shift = 2 * (k - 1);
    // Reverse-complement contribution of each symbol, pre-shifted to the
    // window's leading position.
    let cumber: [u64; 4] = [3 << shift, 2 << shift, 1 << shift, 0];

    let mut fwd = 0u64;
    let mut rev = 0u64;
    let mut next_valid = 0usize;
    for (i, &x) in seq.iter().enumerate() {
        if let Some(token) = cancel {
            if i % CANCEL_STRIDE == 0 && token.is_cancelled() {
                return Err(DotError::Cancelled);
            }
        }
        if x >= GAP_SYMBOL {
            next_valid = i + 1;
            fwd = 0;
            rev = 0;
            continue;
        }
        fwd = ((fwd << 2) | x as u64) & kmask;
        rev = (rev >> 2) | cumber[x as usize];
        if i + 1 >= next_valid + k {
            if list.len() == max {
                return Err(DotError::ResultOverflow(max));
            }
            list.push(Tuple {
                code: fwd.min(rev),
                pos: (i + 1 - k) as u32,
            });
        }
    }
    Ok(())
}
