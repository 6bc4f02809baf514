//! Stepping through the dataset, optionally skipping labeled images.

use crate::dataset::{DatasetIndex, ImageId};

/// Navigation direction through the dataset order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Compute the next image from `current` in `direction`.
///
/// Moves one position; with `unlabeled_only`, keeps moving in the same
/// direction while the candidate position is already labeled. A step that
/// would leave the valid range clamps to the last in-range position reached,
/// even if that boundary image is itself labeled. A `current` not present in
/// the index is treated as position 0.
///
/// Pure: no session state is read or written.
pub fn step(
    index: &DatasetIndex,
    current: &ImageId,
    direction: Direction,
    unlabeled_only: bool,
) -> ImageId {
    let mut pos = match index.position(current) {
        Some(pos) => pos as isize,
        None => {
            log::warn!("{current} not in dataset index, navigating from the first image");
            0
        }
    };
    let len = index.len() as isize;
    let delta: isize = match direction {
        Direction::Forward => 1,
        Direction::Backward => -1,
    };

    loop {
        pos += delta;

        // don't exceed the index: clamp to the boundary, labeled or not
        if pos < 0 || pos >= len {
            pos -= delta;
            break;
        }

        if !unlabeled_only {
            break;
        }

        if !index.is_labeled(&index.images()[pos as usize]) {
            break;
        }
    }

    index.images()[pos as usize].clone()
}
