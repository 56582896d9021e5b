//! Geometric primitives for detection post-processing.
//!
//! Contours coming out of the binary detection mask are arbitrary
//! [`Polygon`]s; the pipeline reduces each of them to a [`RotatedRect`] via a
//! convex hull and rotating calipers, and finally to an ordered
//! [`Quadrilateral`] in source-image coordinates.

use imageproc::contours::Contour;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// A 2-D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X-coordinate.
    pub x: f32,
    /// Y-coordinate.
    pub y: f32,
}

impl Point {
    /// Creates a new point.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// An arbitrary polygon given by its vertex list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polygon {
    /// Vertices in boundary order.
    pub points: Vec<Point>,
}

impl Polygon {
    /// Creates a polygon from a vertex list.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Converts an integer contour from the binary mask into a polygon.
    pub fn from_contour(contour: &Contour<u32>) -> Self {
        let points = contour
            .points
            .iter()
            .map(|p| Point::new(p.x as f32, p.y as f32))
            .collect();
        Self { points }
    }

    /// Shoelace area. Zero for fewer than 3 vertices.
    pub fn area(&self) -> f32 {
        if self.points.len() < 3 {
            return 0.0;
        }
        let n = self.points.len();
        let mut acc = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            acc += self.points[i].x * self.points[j].y;
            acc -= self.points[j].x * self.points[i].y;
        }
        acc.abs() / 2.0
    }

    /// Closed-boundary perimeter.
    pub fn perimeter(&self) -> f32 {
        let n = self.points.len();
        let mut acc = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            acc += self.points[i].distance(&self.points[j]);
        }
        acc
    }

    /// Drops interior points of straight chain segments, keeping only turning
    /// points. Pixel contours walk every boundary pixel; offsetting them
    /// directly is wasteful.
    pub fn simplify_chain(&self) -> Polygon {
        if self.points.len() <= 2 {
            return self.clone();
        }

        let n = self.points.len();
        let mut kept = Vec::with_capacity(n);
        for i in 0..n {
            let prev = self.points[(i + n - 1) % n];
            let curr = self.points[i];
            let next = self.points[(i + 1) % n];

            let dir_in = (sign_step(curr.x - prev.x), sign_step(curr.y - prev.y));
            let dir_out = (sign_step(next.x - curr.x), sign_step(next.y - curr.y));
            if dir_in != dir_out {
                kept.push(curr);
            }
        }

        if kept.len() < 3 {
            self.clone()
        } else {
            Polygon::new(kept)
        }
    }

    /// Convex hull via Andrew's monotone chain.
    fn convex_hull(&self) -> Vec<Point> {
        let mut pts = self.points.clone();
        pts.sort_by(|a, b| {
            a.x.partial_cmp(&b.x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
        });
        pts.dedup_by(|a, b| a.x == b.x && a.y == b.y);

        if pts.len() < 3 {
            return pts;
        }

        let mut lower: Vec<Point> = Vec::new();
        for &p in &pts {
            while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0
            {
                lower.pop();
            }
            lower.push(p);
        }

        let mut upper: Vec<Point> = Vec::new();
        for &p in pts.iter().rev() {
            while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0
            {
                upper.pop();
            }
            upper.push(p);
        }

        lower.pop();
        upper.pop();
        lower.extend(upper);
        lower
    }

    /// Minimum-area enclosing rectangle via rotating calipers on the convex
    /// hull. Degenerate inputs (collinear or fewer than 3 distinct points)
    /// fall back to the axis-aligned bounding box.
    pub fn min_area_rect(&self) -> RotatedRect {
        let hull = self.convex_hull();
        if hull.len() < 3 {
            return self.axis_aligned_rect();
        }

        let n = hull.len();
        let mut best_area = f32::MAX;
        let mut best = self.axis_aligned_rect();

        for i in 0..n {
            let j = (i + 1) % n;
            let ex = hull[j].x - hull[i].x;
            let ey = hull[j].y - hull[i].y;
            let len = (ex * ex + ey * ey).sqrt();
            if len < f32::EPSILON {
                continue;
            }
            let (nx, ny) = (ex / len, ey / len);
            let (px, py) = (-ny, nx);

            let mut min_n = f32::MAX;
            let mut max_n = f32::MIN;
            let mut min_p = f32::MAX;
            let mut max_p = f32::MIN;
            for pt in &hull {
                let along = nx * (pt.x - hull[i].x) + ny * (pt.y - hull[i].y);
                let across = px * (pt.x - hull[i].x) + py * (pt.y - hull[i].y);
                min_n = min_n.min(along);
                max_n = max_n.max(along);
                min_p = min_p.min(across);
                max_p = max_p.max(across);
            }

            let width = max_n - min_n;
            let height = max_p - min_p;
            let area = width * height;
            if area < best_area {
                best_area = area;
                let cn = (min_n + max_n) / 2.0;
                let cp = (min_p + max_p) / 2.0;
                best = RotatedRect {
                    center: Point::new(
                        hull[i].x + cn * nx + cp * px,
                        hull[i].y + cn * ny + cp * py,
                    ),
                    width,
                    height,
                    angle: ny.atan2(nx) * 180.0 / PI,
                };
            }
        }

        best
    }

    fn axis_aligned_rect(&self) -> RotatedRect {
        let Some((min_x, max_x)) = self.points.iter().map(|p| p.x).minmax().into_option() else {
            return RotatedRect::default();
        };
        let Some((min_y, max_y)) = self.points.iter().map(|p| p.y).minmax().into_option() else {
            return RotatedRect::default();
        };
        RotatedRect {
            center: Point::new((min_x + max_x) / 2.0, (min_y + max_y) / 2.0),
            width: max_x - min_x,
            height: max_y - min_y,
            angle: 0.0,
        }
    }
}

#[inline]
fn sign_step(v: f32) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

#[inline]
fn cross(o: Point, a: Point, b: Point) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// An oriented rectangle described by center, size, and rotation angle in
/// degrees.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotatedRect {
    /// Center of the rectangle.
    pub center: Point,
    /// Extent along the rectangle's own x axis.
    pub width: f32,
    /// Extent along the rectangle's own y axis.
    pub height: f32,
    /// Rotation in degrees.
    pub angle: f32,
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl RotatedRect {
    /// The shorter of the two sides.
    pub fn min_side(&self) -> f32 {
        self.width.min(self.height)
    }

    /// The four corners in rectangle-local order (no image-space ordering).
    pub fn corner_points(&self) -> [Point; 4] {
        let cos_a = (self.angle * PI / 180.0).cos();
        let sin_a = (self.angle * PI / 180.0).sin();
        let w2 = self.width / 2.0;
        let h2 = self.height / 2.0;
        let local = [(-w2, -h2), (w2, -h2), (w2, h2), (-w2, h2)];
        local.map(|(x, y)| {
            Point::new(
                x * cos_a - y * sin_a + self.center.x,
                x * sin_a + y * cos_a + self.center.y,
            )
        })
    }
}

/// Exactly four corners ordered `[top-left, top-right, bottom-right,
/// bottom-left]` (clockwise in image coordinates, y growing downward).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    /// Ordered corner points.
    pub points: [Point; 4],
}

impl Quadrilateral {
    /// Orders four arbitrary corners into the canonical layout.
    ///
    /// Corners are sorted by `x + y` ascending: the smallest sum is the
    /// top-left corner and the largest the bottom-right. Of the two middle
    /// corners, the one with the larger `x` becomes top-right. Ties on
    /// `x + y` are broken by `y` ascending, and equal-`x` middle corners
    /// resolve the topmost one as top-right, so the ordering is a total,
    /// deterministic function of the input.
    pub fn order_clockwise(corners: [Point; 4]) -> Self {
        let mut sorted = corners;
        sorted.sort_by(|a, b| {
            (a.x + a.y)
                .partial_cmp(&(b.x + b.y))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
        });

        let top_left = sorted[0];
        let bottom_right = sorted[3];
        let (top_right, bottom_left) = if sorted[1].x >= sorted[2].x {
            (sorted[1], sorted[2])
        } else {
            (sorted[2], sorted[1])
        };

        Self {
            points: [top_left, top_right, bottom_right, bottom_left],
        }
    }

    /// The top-left corner.
    #[inline]
    pub fn top_left(&self) -> Point {
        self.points[0]
    }

    /// Scales every corner, mapping detector-space coordinates back to the
    /// source image.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            points: self.points.map(|p| Point::new(p.x * sx, p.y * sy)),
        }
    }

    /// Clamps every corner into `[0, max_x] x [0, max_y]`.
    pub fn clamped(&self, max_x: f32, max_y: f32) -> Self {
        Self {
            points: self
                .points
                .map(|p| Point::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y))),
        }
    }

    /// Shoelace area of the quadrilateral.
    pub fn area(&self) -> f32 {
        Polygon::new(self.points.to_vec()).area()
    }
}

/// Scanline intersection buffer for polygon-masked mean scoring.
pub(crate) struct ScanlineBuffer {
    intersections: Vec<f32>,
}

impl ScanlineBuffer {
    pub(crate) fn new(max_polygon_points: usize) -> Self {
        Self {
            intersections: Vec::with_capacity(max_polygon_points),
        }
    }

    /// Accumulates probabilities along one scanline inside the polygon.
    ///
    /// Returns the summed score and the number of pixels visited.
    pub(crate) fn process_scanline(
        &mut self,
        y: f32,
        polygon: &[Point],
        start_x: usize,
        end_x: usize,
        pred: &ndarray::Array2<f32>,
    ) -> (f32, usize) {
        self.intersections.clear();

        let n = polygon.len();
        for i in 0..n {
            let p1 = &polygon[i];
            let p2 = &polygon[(i + 1) % n];
            if ((p1.y <= y && y < p2.y) || (p2.y <= y && y < p1.y))
                && (p2.y - p1.y).abs() > f32::EPSILON
            {
                self.intersections
                    .push(p1.x + (y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y));
            }
        }
        self.intersections
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut score = 0.0;
        let mut pixels = 0;
        for pair in self.intersections.chunks(2) {
            if pair.len() != 2 {
                continue;
            }
            let x1 = pair[0].max(start_x as f32) as usize;
            let x2 = pair[1].min(end_x as f32) as usize;
            if x1 < x2 && x1 >= start_x && x2 <= end_x {
                for x in x1..x2 {
                    if (y as usize) < pred.shape()[0] && x < pred.shape()[1] {
                        score += pred[[y as usize, x]];
                        pixels += 1;
                    }
                }
            }
        }

        (score, pixels)
    }
}
