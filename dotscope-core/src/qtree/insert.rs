//! Tree construction: recursive insert with midline clipping.
//!
//! Leaves store segment indices only; geometry is re-derived from the segment
//! array whenever a leaf splits, so clipped pieces never need to be stored.
//! A piece filed under a node never extends past that node's rectangle.

use crate::types::{Rect, Segment};

use super::arena::{Arena, NodeId, QuadNode, LEAF_CAPACITY};
use super::TreeResult;

// Child slots of an internal node. A/B midline comparisons select one:
// NW and NE take the low A half, NW and SW the low B half.
pub(crate) const Q_NW: usize = 0;
pub(crate) const Q_NE: usize = 1;
pub(crate) const Q_SE: usize = 2;
pub(crate) const Q_SW: usize = 3;

/// Depth at which leaf overflow stops splitting and chains continuation
/// buckets instead. Coincident (or epsilon-separated) endpoints would
/// otherwise subdivide forever without ever separating.
const MAX_SPLIT_DEPTH: u16 = 64;

pub(crate) struct InsertCtx<'a> {
    pub(crate) segs: &'a [Segment],
    pub(crate) arena: &'a mut Arena,
}

/// Quadrant of a piece's begin point. A point exactly on a midline follows
/// the rest of the piece, defaulting to the low side; every point therefore
/// belongs to exactly one quadrant.
fn beg_quad(seg: &Rect, amid: f64, bmid: f64) -> usize {
    let a_low = seg.abeg < amid || (seg.abeg == amid && seg.aend <= amid);
    let b_low = seg.bbeg < bmid || (seg.bbeg == bmid && seg.bend <= bmid);
    match (a_low, b_low) {
        (true, true) => Q_NW,
        (true, false) => Q_NE,
        (false, false) => Q_SE,
        (false, true) => Q_SW,
    }
}

/// Quadrant of a piece's end point, with the same tie rule mirrored.
fn end_quad(seg: &Rect, amid: f64, bmid: f64) -> usize {
    let a_low = seg.aend < amid || (seg.aend == amid && seg.abeg <= amid);
    let b_low = seg.bend < bmid || (seg.bend == bmid && seg.bbeg <= bmid);
    match (a_low, b_low) {
        (true, true) => Q_NW,
        (true, false) => Q_NE,
        (false, false) => Q_SE,
        (false, true) => Q_SW,
    }
}

/// Quadrant of a free point (used for the middle piece of a 3-way split).
fn mid_quad(ac: f64, bc: f64, amid: f64, bmid: f64) -> usize {
    match (ac < amid, bc < bmid) {
        (true, true) => Q_NW,
        (true, false) => Q_NE,
        (false, false) => Q_SE,
        (false, true) => Q_SW,
    }
}

/// Shrink `frame` to the given quadrant.
pub(crate) fn cut_frame(frame: &mut Rect, amid: f64, bmid: f64, quad: usize) {
    if quad < 2 {
        frame.aend = amid;
    } else {
        frame.abeg = amid;
    }
    if quad % 3 == 0 {
        frame.bend = bmid;
    } else {
        frame.bbeg = bmid;
    }
}

/// Clip a piece to `frame` by linear interpolation, preserving the piece's
/// direction along both axes.
pub(crate) fn clip_to_frame(seg: &mut Rect, frame: &Rect) {
    let flipx = seg.abeg > seg.aend;
    let (mut x1, mut x2, mut y1, mut y2) = if flipx {
        (seg.aend, seg.abeg, seg.bend, seg.bbeg)
    } else {
        (seg.abeg, seg.aend, seg.bbeg, seg.bend)
    };
    let mut clipped = false;

    let flipy = y1 > y2;
    if flipy {
        std::mem::swap(&mut x1, &mut x2);
        std::mem::swap(&mut y1, &mut y2);
    }
    if y2 > frame.bend {
        x2 = x1 + (x2 - x1) * (frame.bend - y1) / (y2 - y1);
        y2 = frame.bend;
        clipped = true;
    }
    if y1 < frame.bbeg {
        x1 = x1 + (x2 - x1) * (frame.bbeg - y1) / (y2 - y1);
        y1 = frame.bbeg;
        clipped = true;
    }
    if flipy {
        std::mem::swap(&mut x1, &mut x2);
        std::mem::swap(&mut y1, &mut y2);
    }

    if x2 > frame.aend {
        y2 = y1 + (y2 - y1) * (frame.aend - x1) / (x2 - x1);
        x2 = frame.aend;
        clipped = true;
    }
    if x1 < frame.abeg {
        y1 = y1 + (y2 - y1) * (frame.abeg - x1) / (x2 - x1);
        x1 = frame.abeg;
        clipped = true;
    }

    if clipped {
        if flipx {
            seg.abeg = x2;
            seg.aend = x1;
            seg.bbeg = y2;
            seg.bend = y1;
        } else {
            seg.abeg = x1;
            seg.aend = x2;
            seg.bbeg = y1;
            seg.bend = y2;
        }
    }
}

fn child(ctx: &InsertCtx<'_>, id: NodeId, quad: usize) -> Option<NodeId> {
    match ctx.arena[id] {
        QuadNode::Internal { quads, .. } => quads[quad],
        QuadNode::Leaf { .. } => None,
    }
}

fn set_child(ctx: &mut InsertCtx<'_>, id: NodeId, quad: usize, c: NodeId) {
    if let QuadNode::Internal { quads, .. } = &mut ctx.arena[id] {
        quads[quad] = Some(c);
    }
}

/// Insert piece `seg` of segment `idx` below `node` (covering `frame`),
/// returning the node filling that slot. `frame` and `seg` are scratch and
/// may be narrowed in place.
pub(crate) fn insert(
    ctx: &mut InsertCtx<'_>,
    node: Option<NodeId>,
    frame: &mut Rect,
    seg: &mut Rect,
    idx: u32,
    depth: u16,
) -> TreeResult<NodeId> {
    let id = match node {
        None => return ctx.arena.alloc(QuadNode::leaf(depth, idx)),
        Some(id) => id,
    };

    match ctx.arena[id] {
        QuadNode::Leaf { len, .. } if (len as usize) < LEAF_CAPACITY => {
            if let QuadNode::Leaf { len, idx: slots, .. } = &mut ctx.arena[id] {
                slots[*len as usize] = idx;
                *len += 1;
            }
            Ok(id)
        }
        QuadNode::Leaf {
            depth: d,
            idx: slots,
            next,
            ..
        } => {
            if d >= MAX_SPLIT_DEPTH {
                // Entries this deep cannot be separated; chain a new bucket
                // in front of the full one.
                let mut bucket = [0u32; LEAF_CAPACITY];
                bucket[0] = idx;
                return ctx.arena.alloc(QuadNode::Leaf {
                    depth: d,
                    len: 1,
                    idx: bucket,
                    next: Some(id),
                });
            }
            debug_assert!(next.is_none());

            // Split: become internal at the same depth, then push the new
            // piece and all previous entries one level down. Previous entries
            // re-derive their true geometry and re-clip to this frame.
            ctx.arena[id] = QuadNode::Internal {
                depth: d,
                quads: [None; 4],
            };
            {
                let mut f = *frame;
                insert(ctx, Some(id), &mut f, seg, idx, d)?;
            }
            for &entry in slots.iter() {
                let o = &ctx.segs[entry as usize];
                let mut piece = Rect::of_segment(o);
                clip_to_frame(&mut piece, frame);
                let mut f = *frame;
                insert(ctx, Some(id), &mut f, &mut piece, entry, d)?;
            }
            Ok(id)
        }
        QuadNode::Internal { depth: d, .. } => {
            let amid = frame.amid();
            let bmid = frame.bmid();
            let qb = beg_quad(seg, amid, bmid);
            let qe = end_quad(seg, amid, bmid);
            let down = d + 1;

            if qb == qe {
                // Whole piece fits one quadrant; only the frame shrinks.
                cut_frame(frame, amid, bmid, qb);
                let c = insert(ctx, child(ctx, id, qb), frame, seg, idx, down)?;
                set_child(ctx, id, qb, c);
                return Ok(id);
            }

            let mut frame2 = *frame;
            let mut seg2 = *seg;

            if (qb as i32 - qe as i32).abs() % 2 == 1 {
                // Axis-adjacent quadrants: one midline crossed, two pieces.
                if qb + qe == 3 {
                    let t = (amid - seg.abeg) / (seg.aend - seg.abeg);
                    let bcut = seg.bbeg + t * (seg.bend - seg.bbeg);
                    seg.aend = amid;
                    seg.bend = bcut;
                    seg2.abeg = amid;
                    seg2.bbeg = bcut;
                } else {
                    let t = (bmid - seg.bbeg) / (seg.bend - seg.bbeg);
                    let acut = seg.abeg + t * (seg.aend - seg.abeg);
                    seg.aend = acut;
                    seg.bend = bmid;
                    seg2.abeg = acut;
                    seg2.bbeg = bmid;
                }
                cut_frame(frame, amid, bmid, qb);
                cut_frame(&mut frame2, amid, bmid, qe);
                let c = insert(ctx, child(ctx, id, qb), frame, seg, idx, down)?;
                set_child(ctx, id, qb, c);
                let c = insert(ctx, child(ctx, id, qe), &mut frame2, &mut seg2, idx, down)?;
                set_child(ctx, id, qe, c);
                return Ok(id);
            }

            // Diagonally opposite quadrants: both midlines crossed.
            let x = (bmid - seg.bbeg) / (seg.bend - seg.bbeg);
            let y = (amid - seg.abeg) / (seg.aend - seg.abeg);

            if x == y {
                // Crossing point is the frame center: two pieces.
                let bcut = seg.bbeg + x * (seg.bend - seg.bbeg);
                seg.aend = amid;
                seg.bend = bcut;
                seg2.abeg = amid;
                seg2.bbeg = bcut;
                cut_frame(frame, amid, bmid, qb);
                cut_frame(&mut frame2, amid, bmid, qe);
                let c = insert(ctx, child(ctx, id, qb), frame, seg, idx, down)?;
                set_child(ctx, id, qb, c);
                let c = insert(ctx, child(ctx, id, qe), &mut frame2, &mut seg2, idx, down)?;
                set_child(ctx, id, qe, c);
                return Ok(id);
            }

            // Three consecutive pieces along the segment; the middle piece's
            // quadrant is decided by its own midpoint.
            let mut frame3 = *frame;
            let mut seg3 = *seg;
            if x < y {
                let bcut_y = seg.bbeg + y * (seg.bend - seg.bbeg);
                let acut_x = seg.abeg + x * (seg.aend - seg.abeg);
                seg3.bend = bcut_y;
                seg2.bbeg = bcut_y;
                seg3.aend = amid;
                seg2.abeg = amid;
                seg.aend = acut_x;
                seg3.abeg = acut_x;
                seg.bend = bmid;
                seg3.bbeg = bmid;
            } else {
                let acut_x = seg.abeg + x * (seg.aend - seg.abeg);
                let bcut_y = seg.bbeg + y * (seg.bend - seg.bbeg);
                seg3.aend = acut_x;
                seg2.abeg = acut_x;
                seg3.bend = bmid;
                seg2.bbeg = bmid;
                seg.bend = bcut_y;
                seg3.bbeg = bcut_y;
                seg.aend = amid;
                seg3.abeg = amid;
            }
            let qm = mid_quad(
                (seg3.abeg + seg3.aend) / 2.0,
                (seg3.bbeg + seg3.bend) / 2.0,
                amid,
                bmid,
            );
            cut_frame(frame, amid, bmid, qb);
            cut_frame(&mut frame2, amid, bmid, qe);
            cut_frame(&mut frame3, amid, bmid, qm);
            let c = insert(ctx, child(ctx, id, qb), frame, seg, idx, down)?;
            set_child(ctx, id, qb, c);
            let c = insert(ctx, child(ctx, id, qm), &mut frame3, &mut seg3, idx, down)?;
            set_child(ctx, id, qm, c);
            let c = insert(ctx, child(ctx, id, qe), &mut frame2, &mut seg2, idx, down)?;
            set_child(ctx, id, qe, c);
            Ok(id)
        }
    }
}
