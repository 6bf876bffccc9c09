//! Per-thread bookkeeping of prior values.
//!
//! Every restore pushes a frame holding the values that were bound on the
//! calling thread before the restore. Frames never leave their thread, so the
//! same snapshot can be restored concurrently on many threads without any
//! shared mutable state.

use crate::accessor::BoundValue;
use std::cell::RefCell;
use uuid::Uuid;

pub(crate) struct PriorFrame {
    pub(crate) snapshot_id: Uuid,
    /// Number of unmatched restores of this snapshot on this thread.
    pub(crate) depth: usize,
    /// Prior values in accessor registration order.
    pub(crate) priors: Vec<Option<BoundValue>>,
}

pub(crate) enum Release {
    NotRestored,
    Nested { remaining: usize },
    Released { frame: PriorFrame, out_of_order: bool },
}

thread_local! {
    static FRAMES: RefCell<Vec<PriorFrame>> = const { RefCell::new(Vec::new()) };
}

/// Bumps the depth of this snapshot's frame if it is the innermost open
/// frame on the calling thread.
///
/// A frame for the same snapshot further down the stack is not re-entered:
/// the restore then needs its own frame holding the values of the brackets
/// opened since.
pub(crate) fn reenter(snapshot_id: Uuid) -> bool {
    FRAMES
        .try_with(|frames| match frames.borrow_mut().last_mut() {
            Some(frame) if frame.snapshot_id == snapshot_id => {
                frame.depth += 1;
                true
            }
            _ => false,
        })
        .unwrap_or(false)
}

/// Records `frame` on the calling thread.
///
/// Hands the frame back if the thread's frame storage is already torn down.
pub(crate) fn push(frame: PriorFrame) -> Result<(), PriorFrame> {
    let mut frame = Some(frame);
    let pushed = FRAMES.try_with(|frames| {
        if let Some(frame) = frame.take() {
            frames.borrow_mut().push(frame);
        }
    });
    match (pushed, frame) {
        (Err(_), Some(frame)) => Err(frame),
        _ => Ok(()),
    }
}

/// Releases one level of this snapshot's frame on the calling thread.
pub(crate) fn release(snapshot_id: Uuid) -> Release {
    FRAMES
        .try_with(|frames| {
            let mut frames = frames.borrow_mut();
            let Some(index) = frames.iter().rposition(|f| f.snapshot_id == snapshot_id) else {
                return Release::NotRestored;
            };

            if frames[index].depth > 1 {
                frames[index].depth -= 1;
                return Release::Nested {
                    remaining: frames[index].depth,
                };
            }

            let out_of_order = index + 1 != frames.len();
            Release::Released {
                frame: frames.remove(index),
                out_of_order,
            }
        })
        .unwrap_or(Release::NotRestored)
}

pub(crate) fn is_open(snapshot_id: Uuid) -> bool {
    FRAMES
        .try_with(|frames| frames.borrow().iter().any(|f| f.snapshot_id == snapshot_id))
        .unwrap_or(false)
}

/// Returns the number of restore brackets currently open on this thread.
///
/// Zero once every restore has been matched by a reset.
#[must_use]
pub fn open_brackets() -> usize {
    FRAMES
        .try_with(|frames| frames.borrow().iter().map(|f| f.depth).sum())
        .unwrap_or(0)
}
