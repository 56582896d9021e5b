//! Perspective rectification of detected text regions.
//!
//! Each detected quadrilateral is warped into an upright rectangular crop
//! sized from its own edge lengths. Sampling is bicubic with edge
//! replication for out-of-bounds coordinates; crops that come out much
//! taller than wide are assumed to hold vertical text and rotated 90°
//! counter-clockwise.

use crate::core::OcrError;
use crate::processors::geometry::Quadrilateral;
use image::{Rgb, RgbImage, imageops};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use tracing::debug;

/// Height/width ratio beyond which a crop is treated as vertical text.
const VERTICAL_ASPECT_THRESHOLD: f32 = 1.5;

/// Rectifies the region under `quad` into an axis-aligned crop.
///
/// The target width is the longer of the two horizontal edges and the target
/// height the longer of the two vertical edges, so slanted regions keep their
/// full extent.
///
/// # Errors
///
/// Returns [`OcrError::Geometry`] when the region collapses to zero size or
/// the perspective system is unsolvable; the caller skips such candidates.
pub fn rotate_crop_quad(src: &RgbImage, quad: &Quadrilateral) -> Result<RgbImage, OcrError> {
    let p = &quad.points;

    // Work inside the axis-aligned bounding box to keep the warp source small.
    let min_x = p.iter().map(|q| q.x).fold(f32::INFINITY, f32::min);
    let max_x = p.iter().map(|q| q.x).fold(f32::NEG_INFINITY, f32::max);
    let min_y = p.iter().map(|q| q.y).fold(f32::INFINITY, f32::min);
    let max_y = p.iter().map(|q| q.y).fold(f32::NEG_INFINITY, f32::max);

    let left = min_x.max(0.0) as u32;
    let top = min_y.max(0.0) as u32;
    let right = (max_x.ceil() as u32).min(src.width());
    let bottom = (max_y.ceil() as u32).min(src.height());
    if right <= left || bottom <= top {
        return Err(OcrError::geometry("region outside the image"));
    }

    let patch = imageops::crop_imm(src, left, top, right - left, bottom - top).to_image();
    let local: Vec<(f32, f32)> = p
        .iter()
        .map(|q| (q.x - left as f32, q.y - top as f32))
        .collect();

    let target_w = distance(local[0], local[1])
        .max(distance(local[3], local[2]))
        .round() as u32;
    let target_h = distance(local[0], local[3])
        .max(distance(local[1], local[2]))
        .round() as u32;
    if target_w == 0 || target_h == 0 {
        return Err(OcrError::geometry("zero-sized crop"));
    }

    let dst = [
        (0.0, 0.0),
        (target_w as f32, 0.0),
        (target_w as f32, target_h as f32),
        (0.0, target_h as f32),
    ];
    let matrix = perspective_transform(&local, &dst)?;
    let warped = warp_perspective(&patch, &matrix, target_w, target_h)?;

    if warped.height() as f32 >= warped.width() as f32 * VERTICAL_ASPECT_THRESHOLD {
        debug!(
            "rotating vertical crop {}x{}",
            warped.width(),
            warped.height()
        );
        Ok(imageops::rotate270(&warped))
    } else {
        Ok(warped)
    }
}

#[inline]
fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Solves the 8-unknown linear system mapping four source points onto four
/// destination points.
fn perspective_transform(
    src: &[(f32, f32)],
    dst: &[(f32, f32); 4],
) -> Result<Matrix3<f32>, OcrError> {
    if src.len() != 4 {
        return Err(OcrError::geometry("perspective transform needs 4 points"));
    }

    let mut a = nalgebra::DMatrix::<f32>::zeros(8, 8);
    let mut b = nalgebra::DVector::<f32>::zeros(8);

    for i in 0..4 {
        let (sx, sy) = src[i];
        let (dx, dy) = dst[i];
        a.set_row(
            i * 2,
            &nalgebra::RowDVector::from_row_slice(&[
                sx,
                sy,
                1.0,
                0.0,
                0.0,
                0.0,
                -sx * dx,
                -sy * dx,
            ]),
        );
        b[i * 2] = dx;
        a.set_row(
            i * 2 + 1,
            &nalgebra::RowDVector::from_row_slice(&[
                0.0,
                0.0,
                0.0,
                sx,
                sy,
                1.0,
                -sx * dy,
                -sy * dy,
            ]),
        );
        b[i * 2 + 1] = dy;
    }

    let solution = a
        .lu()
        .solve(&b)
        .ok_or_else(|| OcrError::geometry("perspective system is singular"))?;

    Ok(Matrix3::new(
        solution[0],
        solution[1],
        solution[2],
        solution[3],
        solution[4],
        solution[5],
        solution[6],
        solution[7],
        1.0,
    ))
}

/// Inverse-mapping warp: every destination pixel is traced back through the
/// inverted matrix and sampled bicubically. Rows are processed in parallel.
fn warp_perspective(
    src: &RgbImage,
    matrix: &Matrix3<f32>,
    dst_width: u32,
    dst_height: u32,
) -> Result<RgbImage, OcrError> {
    let inv = matrix
        .try_inverse()
        .ok_or_else(|| OcrError::geometry("perspective matrix is not invertible"))?;

    let mut dst = RgbImage::new(dst_width, dst_height);
    let buffer: &mut [u8] = dst.as_mut();

    buffer
        .par_chunks_mut((dst_width * 3) as usize)
        .enumerate()
        .for_each(|(dst_y, row)| {
            for dst_x in 0..dst_width {
                let mapped = inv * Vector3::new(dst_x as f32, dst_y as f32, 1.0);
                let pixel = if mapped.z.abs() > f32::EPSILON {
                    sample_bicubic(src, mapped.x / mapped.z, mapped.y / mapped.z)
                } else {
                    Rgb([0, 0, 0])
                };
                let i = (dst_x * 3) as usize;
                row[i..i + 3].copy_from_slice(&pixel.0);
            }
        });

    Ok(dst)
}

/// Catmull-Rom weight (bicubic kernel with a = -0.5).
#[inline]
fn cubic_weight(t: f32) -> f32 {
    let t = t.abs();
    if t <= 1.0 {
        (1.5 * t - 2.5) * t * t + 1.0
    } else if t < 2.0 {
        ((-0.5 * t + 2.5) * t - 4.0) * t + 2.0
    } else {
        0.0
    }
}

/// Bicubic sample over a 4x4 neighborhood with edge-replicated coordinates.
fn sample_bicubic(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let clamp = |v: i64, hi: i64| v.clamp(0, hi - 1) as u32;

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let mut acc = [0.0f32; 3];
    for m in -1..=2i64 {
        let wy = cubic_weight(fy - m as f32);
        if wy == 0.0 {
            continue;
        }
        let sy = clamp(y0 as i64 + m, h);
        for n in -1..=2i64 {
            let wx = cubic_weight(fx - n as f32);
            if wx == 0.0 {
                continue;
            }
            let sx = clamp(x0 as i64 + n, w);
            let px = img.get_pixel(sx, sy);
            let weight = wx * wy;
            for c in 0..3 {
                acc[c] += weight * px.0[c] as f32;
            }
        }
    }

    Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::geometry::Point;

    fn gradient_image(w: u32, h: u32) -> RgbImage {
        let mut img = RgbImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                img.put_pixel(x, y, Rgb([(x * 5 % 256) as u8, (y * 5 % 256) as u8, 0]));
            }
        }
        img
    }

    fn axis_quad(x0: f32, y0: f32, w: f32, h: f32) -> Quadrilateral {
        Quadrilateral::order_clockwise([
            Point::new(x0, y0),
            Point::new(x0 + w, y0),
            Point::new(x0 + w, y0 + h),
            Point::new(x0, y0 + h),
        ])
    }

    #[test]
    fn axis_aligned_quad_crops_to_its_own_size() {
        let img = gradient_image(100, 60);
        let crop = rotate_crop_quad(&img, &axis_quad(10.0, 10.0, 40.0, 20.0)).unwrap();
        assert_eq!(crop.dimensions(), (40, 20));
        // Top-left of the crop should match the source content.
        assert_eq!(crop.get_pixel(0, 0).0[0], img.get_pixel(10, 10).0[0]);
    }

    #[test]
    fn tall_crop_is_rotated_to_horizontal() {
        let img = gradient_image(100, 200);
        let crop = rotate_crop_quad(&img, &axis_quad(20.0, 20.0, 30.0, 120.0)).unwrap();
        // 120x30 after the 90 degree counter-clockwise rotation.
        assert_eq!(crop.dimensions(), (120, 30));
    }

    #[test]
    fn moderate_aspect_is_not_rotated() {
        let img = gradient_image(100, 100);
        let crop = rotate_crop_quad(&img, &axis_quad(0.0, 0.0, 40.0, 50.0)).unwrap();
        assert_eq!(crop.dimensions(), (40, 50));
    }

    #[test]
    fn out_of_image_quad_is_a_geometry_error() {
        let img = gradient_image(50, 50);
        let quad = axis_quad(200.0, 200.0, 10.0, 10.0);
        // Clamping happens upstream in detection; raw far-out quads fail here.
        match rotate_crop_quad(&img, &quad) {
            Err(OcrError::Geometry { .. }) => {}
            other => panic!("expected geometry error, got {other:?}"),
        }
    }

    #[test]
    fn degenerate_quad_is_a_geometry_error() {
        let img = gradient_image(50, 50);
        let quad = Quadrilateral::order_clockwise([
            Point::new(10.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 10.0),
        ]);
        assert!(matches!(
            rotate_crop_quad(&img, &quad),
            Err(OcrError::Geometry { .. })
        ));
    }

    #[test]
    fn bicubic_replicates_edges_out_of_bounds() {
        let img = RgbImage::from_pixel(4, 4, Rgb([77, 10, 10]));
        let px = sample_bicubic(&img, -3.0, -3.0);
        assert_eq!(px.0[0], 77);
    }
}
