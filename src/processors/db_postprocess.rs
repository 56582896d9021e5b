//! Post-processing for DB (Differentiable Binarization) text detection.
//!
//! Converts the detector's single-channel probability map into oriented
//! quadrilaterals: threshold the map, merge broken strokes with a small
//! dilation, walk the external contours, score each contour by the mean
//! probability inside its minimal rotated rectangle, offset ("unclip") the
//! contour back out to the true text extent, and restore source-image
//! coordinates.
//!
//! Scoring deliberately uses the *unexpanded* rectangle: whether a region is
//! text is judged before deciding how large the crop should be.

use crate::core::Tensor2D;
use crate::processors::geometry::{Point, Polygon, Quadrilateral, ScanlineBuffer};
use crate::processors::resize_detection::ResizeInfo;
use crate::processors::sorting::sort_reading_order;
use clipper2::{EndType, JoinType, Path as ClipperPath};
use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use itertools::Itertools;
use rayon::prelude::*;
use tracing::debug;

/// A detected text region before recognition: an ordered quadrilateral in
/// source-image coordinates plus its detection confidence.
#[derive(Debug, Clone)]
pub struct DetectionCandidate {
    /// Region corners, `[top-left, top-right, bottom-right, bottom-left]`.
    pub quad: Quadrilateral,
    /// Mean detector probability inside the unexpanded minimal rectangle.
    pub score: f32,
}

/// Post-processor for DB-style probability maps.
#[derive(Debug, Clone)]
pub struct DbPostProcess {
    /// Binarization threshold for the probability map.
    pub thresh: f32,
    /// Minimum mean probability for a region to survive.
    pub box_thresh: f32,
    /// Cap on the number of contours considered.
    pub max_candidates: usize,
    /// Offset ratio for the unclip expansion.
    pub unclip_ratio: f32,
    /// Minimum length of a region's shorter side, in map pixels.
    pub min_size: f32,
    /// Whether to dilate the binary mask before contour extraction.
    pub use_dilation: bool,
}

impl Default for DbPostProcess {
    fn default() -> Self {
        Self {
            thresh: 0.3,
            box_thresh: 0.6,
            max_candidates: 1000,
            unclip_ratio: 1.5,
            min_size: 3.0,
            use_dilation: true,
        }
    }
}

impl DbPostProcess {
    /// Converts a probability map into detection candidates in reading order.
    ///
    /// `pred` is the detector output for the resized image, `scale` the
    /// factors applied by detection resize, `src_w`/`src_h` the source image
    /// size the coordinates are restored into.
    pub fn apply(
        &self,
        pred: &Tensor2D,
        scale: ResizeInfo,
        src_w: u32,
        src_h: u32,
    ) -> Vec<DetectionCandidate> {
        let bitmap = self.binarize(pred);
        let bitmap = if self.use_dilation {
            dilate_2x2(&bitmap)
        } else {
            bitmap
        };

        let contours = find_contours::<u32>(&bitmap);
        let mut candidates = Vec::new();

        for contour in contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .take(self.max_candidates)
        {
            if contour.points.len() < 3 {
                continue;
            }

            let polygon = Polygon::from_contour(contour).simplify_chain();
            let rect = polygon.min_area_rect();
            if rect.min_side() < self.min_size {
                continue;
            }

            let score = self.box_score(pred, &rect.corner_points());
            if score < self.box_thresh {
                continue;
            }

            let Some(expanded) = unclip(&polygon, self.unclip_ratio) else {
                continue;
            };
            let out_rect = expanded.min_area_rect();
            if out_rect.min_side() < self.min_size + 2.0 {
                continue;
            }

            let quad = Quadrilateral::order_clockwise(out_rect.corner_points())
                .scaled(1.0 / scale.ratio_w, 1.0 / scale.ratio_h)
                .clamped(src_w.saturating_sub(1) as f32, src_h.saturating_sub(1) as f32);

            candidates.push(DetectionCandidate { quad, score });
        }

        sort_reading_order(&mut candidates, |c| c.quad.top_left());
        debug!("db postprocess produced {} candidates", candidates.len());
        candidates
    }

    fn binarize(&self, pred: &Tensor2D) -> GrayImage {
        let (h, w) = (pred.shape()[0], pred.shape()[1]);
        let mut bitmap = GrayImage::new(w as u32, h as u32);
        for y in 0..h {
            for x in 0..w {
                if pred[[y, x]] > self.thresh {
                    bitmap.put_pixel(x as u32, y as u32, Luma([255]));
                }
            }
        }
        bitmap
    }

    /// Mean probability inside `polygon`, computed with a scanline walk over
    /// the polygon's bounding rows. Large regions fan the rows out over
    /// rayon.
    fn box_score(&self, pred: &Tensor2D, polygon: &[Point]) -> f32 {
        let height = pred.shape()[0];
        let width = pred.shape()[1];

        let Some((min_x, max_x)) = polygon.iter().map(|p| p.x).minmax().into_option() else {
            return 0.0;
        };
        let Some((min_y, max_y)) = polygon.iter().map(|p| p.y).minmax().into_option() else {
            return 0.0;
        };

        let start_x = min_x.max(0.0).min(width as f32 - 1.0) as usize;
        let end_x = max_x.max(0.0).min(width as f32 - 1.0) as usize + 1;
        let start_y = min_y.max(0.0).min(height as f32 - 1.0) as usize;
        let end_y = max_y.max(0.0).min(height as f32 - 1.0) as usize + 1;

        let region = (end_y - start_y) * (end_x - start_x);
        let (total, pixels) = if region < 8_000 {
            let mut buffer = ScanlineBuffer::new(polygon.len());
            let mut total = 0.0;
            let mut pixels = 0;
            for y in start_y..end_y {
                let (s, p) =
                    buffer.process_scanline(y as f32 + 0.5, polygon, start_x, end_x, pred);
                total += s;
                pixels += p;
            }
            (total, pixels)
        } else {
            (start_y..end_y)
                .into_par_iter()
                .map(|y| {
                    let mut buffer = ScanlineBuffer::new(polygon.len());
                    buffer.process_scanline(y as f32 + 0.5, polygon, start_x, end_x, pred)
                })
                .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1))
        };

        if pixels > 0 {
            total / pixels as f32
        } else {
            0.0
        }
    }
}

/// Offsets `polygon` outward by `area * unclip_ratio / perimeter` with round
/// joins, compensating for the shrunk masks DB detectors are trained on.
///
/// Returns `None` for degenerate polygons. If the offset splits into several
/// disjoint rings, the largest by area is kept.
pub(crate) fn unclip(polygon: &Polygon, unclip_ratio: f32) -> Option<Polygon> {
    if polygon.points.len() < 3 {
        return None;
    }

    let path: ClipperPath = polygon
        .points
        .iter()
        .map(|p| (p.x as f64, p.y as f64))
        .collect::<Vec<_>>()
        .into();

    let area = path.signed_area().abs();
    let perimeter = polygon.perimeter() as f64;
    if area <= f64::EPSILON || perimeter <= f64::EPSILON {
        return None;
    }

    let delta = area * unclip_ratio as f64 / perimeter;
    if delta <= f64::EPSILON {
        return None;
    }

    let rings = path.inflate(delta, JoinType::Round, EndType::Polygon, 2.0);
    let best = rings.into_iter().max_by(|a, b| {
        a.signed_area()
            .abs()
            .partial_cmp(&b.signed_area().abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;

    let mut points: Vec<Point> = best
        .iter()
        .map(|p| Point::new(p.x() as f32, p.y() as f32))
        .collect();

    // The offset ring may repeat its first vertex as a closing point.
    if points.len() > 1 {
        let (first, last) = (points[0], points[points.len() - 1]);
        if (first.x - last.x).abs() < f32::EPSILON && (first.y - last.y).abs() < f32::EPSILON {
            points.pop();
        }
    }

    if points.len() < 3 {
        return None;
    }
    Some(Polygon::new(points))
}

/// 2x2 rectangular dilation: a pixel becomes foreground if any pixel of its
/// 2x2 forward window is foreground. Merges single-pixel gaps between strokes
/// without inflating regions the way a full 3x3 kernel would.
fn dilate_2x2(img: &GrayImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let mut v = img.get_pixel(x, y).0[0];
            if x + 1 < width {
                v = v.max(img.get_pixel(x + 1, y).0[0]);
            }
            if y + 1 < height {
                v = v.max(img.get_pixel(x, y + 1).0[0]);
            }
            if x + 1 < width && y + 1 < height {
                v = v.max(img.get_pixel(x + 1, y + 1).0[0]);
            }
            out.put_pixel(x, y, Luma([v]));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_scale() -> ResizeInfo {
        ResizeInfo {
            ratio_h: 1.0,
            ratio_w: 1.0,
        }
    }

    fn map_with_rect(h: usize, w: usize, y0: usize, x0: usize, y1: usize, x1: usize) -> Tensor2D {
        let mut pred = Tensor2D::zeros((h, w));
        for y in y0..y1 {
            for x in x0..x1 {
                pred[[y, x]] = 1.0;
            }
        }
        pred
    }

    #[test]
    fn solid_rectangle_yields_one_candidate() {
        let pred = map_with_rect(160, 320, 40, 60, 80, 260);
        let post = DbPostProcess::default();
        let candidates = post.apply(&pred, identity_scale(), 320, 160);

        assert_eq!(candidates.len(), 1);
        let cand = &candidates[0];
        assert!(cand.score > 0.9, "score was {}", cand.score);

        // The unclip expansion for a 200x40 region is area*1.5/perimeter ~ 25.
        let tl = cand.quad.points[0];
        let br = cand.quad.points[2];
        assert!(tl.x > 60.0 - 30.0 && tl.x < 60.0);
        assert!(tl.y > 40.0 - 30.0 && tl.y < 40.0);
        assert!(br.x < 260.0 + 30.0 && br.x > 260.0);
        assert!(br.y < 80.0 + 30.0 && br.y > 80.0);
    }

    #[test]
    fn uniform_low_map_yields_nothing() {
        let pred = Tensor2D::from_elem((96, 96), 0.2);
        let post = DbPostProcess::default();
        assert!(post.apply(&pred, identity_scale(), 96, 96).is_empty());
    }

    #[test]
    fn low_confidence_region_is_dropped() {
        let mut pred = Tensor2D::zeros((96, 160));
        for y in 30..60 {
            for x in 20..140 {
                pred[[y, x]] = 0.4; // above thresh, below box_thresh
            }
        }
        let post = DbPostProcess::default();
        assert!(post.apply(&pred, identity_scale(), 160, 96).is_empty());
    }

    #[test]
    fn tiny_region_is_dropped() {
        let pred = map_with_rect(64, 64, 30, 30, 32, 32);
        let post = DbPostProcess::default();
        assert!(post.apply(&pred, identity_scale(), 64, 64).is_empty());
    }

    #[test]
    fn coordinates_are_restored_and_clamped() {
        // Map is half the source resolution.
        let pred = map_with_rect(100, 100, 10, 10, 40, 90);
        let post = DbPostProcess::default();
        let scale = ResizeInfo {
            ratio_h: 0.5,
            ratio_w: 0.5,
        };
        let candidates = post.apply(&pred, scale, 200, 200);
        assert_eq!(candidates.len(), 1);
        for p in &candidates[0].quad.points {
            assert!(p.x >= 0.0 && p.x <= 199.0);
            assert!(p.y >= 0.0 && p.y <= 199.0);
        }
        // Box center should land near the scaled-up region center.
        let cx: f32 = candidates[0].quad.points.iter().map(|p| p.x).sum::<f32>() / 4.0;
        assert!((cx - 100.0).abs() < 15.0);
    }

    #[test]
    fn candidates_come_out_in_reading_order() {
        let mut pred = Tensor2D::zeros((200, 320));
        // Two boxes on one row, one below; insert in scrambled spatial order.
        for (y0, x0) in [(130usize, 40usize), (30, 180), (30, 20)] {
            for y in y0..y0 + 30 {
                for x in x0..x0 + 90 {
                    pred[[y, x]] = 1.0;
                }
            }
        }
        let post = DbPostProcess::default();
        let candidates = post.apply(&pred, identity_scale(), 320, 200);
        assert_eq!(candidates.len(), 3);
        assert!(candidates[0].quad.top_left().x < candidates[1].quad.top_left().x);
        assert!(candidates[0].quad.top_left().y < candidates[2].quad.top_left().y);
        assert!(candidates[1].quad.top_left().y < candidates[2].quad.top_left().y);
    }

    #[test]
    fn unclip_is_monotone_in_ratio() {
        let polygon = Polygon::new(vec![
            Point::new(10.0, 10.0),
            Point::new(110.0, 12.0),
            Point::new(108.0, 52.0),
            Point::new(8.0, 50.0),
        ]);
        let mut last_area = polygon.area();
        for ratio in [0.5, 1.0, 1.5, 2.0, 3.0] {
            let expanded = unclip(&polygon, ratio).expect("offset should succeed");
            let area = expanded.area();
            assert!(
                area >= last_area,
                "area decreased at ratio {ratio}: {area} < {last_area}"
            );
            last_area = area;
        }
    }

    #[test]
    fn unclip_rejects_degenerate_polygons() {
        let line = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(20.0, 0.0),
        ]);
        assert!(unclip(&line, 1.5).is_none());
        assert!(unclip(&Polygon::new(vec![]), 1.5).is_none());
    }

    #[test]
    fn dilation_closes_single_pixel_gaps() {
        let mut img = GrayImage::new(8, 1);
        img.put_pixel(2, 0, Luma([255]));
        img.put_pixel(4, 0, Luma([255]));
        let out = dilate_2x2(&img);
        // Forward 2x2 window pulls x=3 up from its right neighbor.
        assert_eq!(out.get_pixel(3, 0).0[0], 255);
    }
}
