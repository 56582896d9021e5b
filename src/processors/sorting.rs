//! Reading-order sorting for detected text regions.

use crate::core::constants::READING_ORDER_Y_TOLERANCE;
use crate::processors::geometry::Point;

/// Sorts items top-to-bottom, left-to-right by the point `key` extracts
/// (normally the region's top-left corner).
///
/// Rows are fuzzy: after the primary `(y, x)` sort, adjacent items whose `y`
/// difference is within [`READING_ORDER_Y_TOLERANCE`] are reordered by `x`,
/// so slightly tilted lines still read left to right.
pub fn sort_reading_order<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> Point,
{
    items.sort_by(|a, b| {
        let (pa, pb) = (key(a), key(b));
        pa.y.partial_cmp(&pb.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| pa.x.partial_cmp(&pb.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    // Local bubble pass: pull same-row items left while their y values stay
    // within tolerance.
    for i in 0..items.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            if j + 1 >= items.len() {
                break;
            }
            let curr = key(&items[j]);
            let next = key(&items[j + 1]);
            if (next.y - curr.y).abs() < READING_ORDER_Y_TOLERANCE && next.x < curr.x {
                items.swap(j, j + 1);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_sort_left_to_right_despite_jitter() {
        // Three boxes on one visual row (y within tolerance), one below.
        let mut pts = vec![
            Point::new(300.0, 12.0),
            Point::new(10.0, 15.0),
            Point::new(150.0, 9.0),
            Point::new(20.0, 80.0),
        ];
        sort_reading_order(&mut pts, |p| *p);
        assert_eq!(pts[0].x, 10.0);
        assert_eq!(pts[1].x, 150.0);
        assert_eq!(pts[2].x, 300.0);
        assert_eq!(pts[3].y, 80.0);
    }

    #[test]
    fn distinct_rows_stay_top_to_bottom() {
        let mut pts = vec![
            Point::new(5.0, 200.0),
            Point::new(400.0, 20.0),
            Point::new(5.0, 100.0),
        ];
        sort_reading_order(&mut pts, |p| *p);
        assert_eq!(pts[0].y, 20.0);
        assert_eq!(pts[1].y, 100.0);
        assert_eq!(pts[2].y, 200.0);
    }

    #[test]
    fn empty_and_single_are_noops() {
        let mut empty: Vec<Point> = vec![];
        sort_reading_order(&mut empty, |p| *p);
        let mut one = vec![Point::new(1.0, 1.0)];
        sort_reading_order(&mut one, |p| *p);
        assert_eq!(one.len(), 1);
    }
}
