use rten_imageproc::Rect;
use tracing::debug;

use crate::geom_util::{contains_rect, intersection_area, rect_area};

/// Reduce a list of candidate text rects to a set in which no rect contains
/// another and no two rects overlap.
///
/// This runs in two passes over every ordered pair `(a, b)` where `a`
/// precedes `b` in `rects`:
///
/// 1. If `a` contains `b`, `b` is removed. Otherwise if `b` contains `a`,
///    `a` is removed and the scan continues with the next remaining rect
///    after `a` as the new `a`. Exact duplicates are removed by this pass.
/// 2. If `a` and `b` overlap, the one with the smaller area is removed. When
///    the areas are equal, `b` is removed.
///
/// The result depends on the input order and preserves it.
pub fn remove_duplicates(rects: &[Rect]) -> Vec<Rect> {
    let mut removed = vec![false; rects.len()];

    remove_contained(rects, &mut removed);
    let after_containment = removed.iter().filter(|r| !**r).count();

    remove_overlapping(rects, &mut removed);

    let kept: Vec<Rect> = rects
        .iter()
        .zip(removed.iter())
        .filter(|(_, removed)| !**removed)
        .map(|(r, _)| *r)
        .collect();

    debug!(
        input = rects.len(),
        after_containment,
        output = kept.len(),
        "removed duplicate rects"
    );

    kept
}

/// Return the index of the first rect after `index` that has not been
/// removed.
fn next_remaining(removed: &[bool], index: usize) -> Option<usize> {
    (index + 1..removed.len()).find(|&i| !removed[i])
}

fn remove_contained(rects: &[Rect], removed: &mut [bool]) {
    for outer in 0..rects.len() {
        if removed[outer] {
            continue;
        }
        let mut inner = outer;
        while let Some(next) = next_remaining(removed, inner) {
            inner = next;
            if contains_rect(&rects[outer], &rects[inner]) {
                removed[inner] = true;
            } else if contains_rect(&rects[inner], &rects[outer]) {
                removed[outer] = true;
                break;
            }
        }
    }
}

fn remove_overlapping(rects: &[Rect], removed: &mut [bool]) {
    for outer in 0..rects.len() {
        if removed[outer] {
            continue;
        }
        let mut inner = outer;
        while let Some(next) = next_remaining(removed, inner) {
            inner = next;
            if intersection_area(&rects[outer], &rects[inner]) == 0 {
                continue;
            }
            if rect_area(&rects[outer]) >= rect_area(&rects[inner]) {
                removed[inner] = true;
            } else {
                removed[outer] = true;
                break;
            }
        }
    }
}
