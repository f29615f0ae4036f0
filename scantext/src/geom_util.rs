//! Shared utilities for working with axis-aligned rects.

use rten_imageproc::Rect;

/// Return true if both corners of `inner` lie within `outer`.
///
/// Corners on the boundary of `outer` count as inside, so a rect contains
/// itself and any exact duplicate of itself.
pub fn contains_rect(outer: &Rect, inner: &Rect) -> bool {
    outer.left() <= inner.left()
        && outer.top() <= inner.top()
        && inner.right() <= outer.right()
        && inner.bottom() <= outer.bottom()
}

/// Return the area of the overlap between `a` and `b`, or zero if they do
/// not overlap. Rects which only share an edge have zero overlap.
pub fn intersection_area(a: &Rect, b: &Rect) -> i64 {
    let width = a.right().min(b.right()) - a.left().max(b.left());
    let height = a.bottom().min(b.bottom()) - a.top().max(b.top());
    if width <= 0 || height <= 0 {
        return 0;
    }
    width as i64 * height as i64
}

/// Return the area of `r`, treating inverted rects as empty.
pub fn rect_area(r: &Rect) -> i64 {
    r.width().max(0) as i64 * r.height().max(0) as i64
}

/// Clamp `r` so that it lies within an image of the given size.
///
/// The result may be empty if `r` lies entirely outside the image.
pub fn clamp_to_image(r: &Rect, width: u32, height: u32) -> Rect {
    let (width, height) = (width as i32, height as i32);
    let left = r.left().clamp(0, width);
    let top = r.top().clamp(0, height);
    let right = r.right().clamp(left, width);
    let bottom = r.bottom().clamp(top, height);
    Rect::from_tlbr(top, left, bottom, right)
}

#[cfg(test)]
mod tests {
    use rten_imageproc::Rect;

    use super::{clamp_to_image, contains_rect, intersection_area, rect_area};

    #[test]
    fn test_contains_rect() {
        let outer = Rect::from_tlhw(0, 0, 10, 10);

        assert!(contains_rect(&outer, &outer));
        assert!(contains_rect(&outer, &Rect::from_tlhw(2, 2, 5, 5)));
        assert!(contains_rect(&outer, &Rect::from_tlhw(5, 5, 5, 5)));
        assert!(!contains_rect(&outer, &Rect::from_tlhw(5, 5, 6, 5)));
        assert!(!contains_rect(&Rect::from_tlhw(2, 2, 5, 5), &outer));
    }

    #[test]
    fn test_intersection_area() {
        let a = Rect::from_tlhw(0, 0, 10, 10);

        assert_eq!(intersection_area(&a, &Rect::from_tlhw(5, 5, 10, 10)), 25);
        assert_eq!(intersection_area(&a, &Rect::from_tlhw(2, 2, 3, 4)), 12);

        // Shared edge
        assert_eq!(intersection_area(&a, &Rect::from_tlhw(0, 10, 10, 10)), 0);

        // Disjoint
        assert_eq!(intersection_area(&a, &Rect::from_tlhw(20, 20, 5, 5)), 0);
    }

    #[test]
    fn test_clamp_to_image() {
        let r = clamp_to_image(&Rect::from_tlhw(-5, -5, 20, 20), 10, 8);
        assert_eq!(r, Rect::from_tlbr(0, 0, 8, 10));
        assert_eq!(rect_area(&r), 80);

        let outside = clamp_to_image(&Rect::from_tlhw(50, 50, 5, 5), 10, 8);
        assert_eq!(rect_area(&outside), 0);
    }
}
