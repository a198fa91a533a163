//! Region analysis over labeled masks: outer boundary tracing and
//! moment-based ellipse fitting.

use kurbo::Point;

use crate::provider::LabelMask;

/// Best-fit ellipse of a labeled region, from second-order central moments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EllipseFit {
    pub cx: f64,
    pub cy: f64,
    pub major_half: f64,
    pub minor_half: f64,
    /// Orientation of the major axis, radians from the +x axis.
    pub angle_rad: f64,
}

/// Clockwise Moore neighborhood, y down: E, SE, S, SW, W, NW, N, NE.
const NEIGHBORS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

struct Region {
    pixels: Vec<(i64, i64)>,
    /// Topmost-leftmost pixel; always on the outer boundary.
    start: (i64, i64),
}

/// 8-connected components of `mask == label`, in scan order.
fn regions(mask: &LabelMask, label: u32) -> Vec<Region> {
    let (w, h) = (i64::from(mask.width()), i64::from(mask.height()));
    let mut seen = vec![false; (w * h) as usize];
    let mut out = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if seen[idx] || mask.get(x, y) != Some(label) {
                continue;
            }

            let mut pixels = Vec::new();
            let mut stack = vec![(x, y)];
            seen[idx] = true;
            while let Some((px, py)) = stack.pop() {
                pixels.push((px, py));
                for (dx, dy) in NEIGHBORS {
                    let (nx, ny) = (px + dx, py + dy);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let nidx = (ny * w + nx) as usize;
                    if !seen[nidx] && mask.get(nx, ny) == Some(label) {
                        seen[nidx] = true;
                        stack.push((nx, ny));
                    }
                }
            }
            out.push(Region {
                pixels,
                start: (x, y),
            });
        }
    }
    out
}

/// Clockwise radial sweep: first in-region neighbor of `current`, searching
/// from just past the backtrack direction.
fn next_boundary_step(
    inside: &dyn Fn((i64, i64)) -> bool,
    current: (i64, i64),
    backtrack: usize,
) -> Option<((i64, i64), usize)> {
    for i in 0..8 {
        let dir = (backtrack + 1 + i) % 8;
        let (dx, dy) = NEIGHBORS[dir];
        let next = (current.0 + dx, current.1 + dy);
        if inside(next) {
            return Some((next, dir));
        }
    }
    None
}

/// Moore-neighbor boundary trace from the region's topmost-leftmost pixel.
///
/// The walk stops when re-entering the start pixel in a state whose next
/// step would repeat the first step (the walk is then periodic). One-pixel
/// wide spurs legitimately revisit pixels, including the start.
fn trace_boundary(mask: &LabelMask, label: u32, start: (i64, i64)) -> Vec<(i64, i64)> {
    let inside = |p: (i64, i64)| mask.get(p.0, p.1) == Some(label);

    let mut contour = vec![start];
    let mut current = start;
    // The scan reached `start` from the west, so the west neighbor is outside.
    let mut backtrack = 4usize;
    let cap = 4 * (mask.width() as usize * mask.height() as usize) + 8;

    for _ in 0..cap {
        let Some((next, dir)) = next_boundary_step(&inside, current, backtrack) else {
            break; // isolated pixel
        };
        let next_backtrack = (dir + 4) % 8;

        if next == start {
            let peek = next_boundary_step(&inside, start, next_backtrack);
            let closed = match (peek, contour.get(1)) {
                (Some((p, _)), Some(&second)) => p == second,
                _ => true,
            };
            if closed {
                break;
            }
            current = start;
            backtrack = next_backtrack;
            continue;
        }

        contour.push(next);
        current = next;
        backtrack = next_backtrack;
    }

    contour
}

/// Outer boundary of every connected component of the object, each as a
/// closed polygon of pixel centers.
pub fn object_contours(mask: &LabelMask, label: u32) -> Vec<Vec<Point>> {
    regions(mask, label)
        .iter()
        .map(|region| {
            trace_boundary(mask, label, region.start)
                .into_iter()
                .map(|(x, y)| Point::new(x as f64 + 0.5, y as f64 + 0.5))
                .collect()
        })
        .collect()
}

/// Fit an ellipse to the largest connected component of the object.
///
/// Requires at least 5 boundary points (smaller blobs have no meaningful
/// orientation); returns `None` on any degenerate geometry rather than
/// failing the frame.
pub fn fit_ellipse(mask: &LabelMask, label: u32) -> Option<EllipseFit> {
    let regions = regions(mask, label);
    let region = regions.iter().max_by_key(|r| r.pixels.len())?;

    let boundary = trace_boundary(mask, label, region.start);
    if boundary.len() < 5 {
        return None;
    }

    let n = region.pixels.len() as f64;
    let (mut sx, mut sy) = (0.0, 0.0);
    for &(x, y) in &region.pixels {
        sx += x as f64;
        sy += y as f64;
    }
    let (cx, cy) = (sx / n, sy / n);

    let (mut mu20, mut mu02, mut mu11) = (0.0, 0.0, 0.0);
    for &(x, y) in &region.pixels {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        mu20 += dx * dx;
        mu02 += dy * dy;
        mu11 += dx * dy;
    }
    // The 1/12 term accounts for each pixel being a unit square, keeping
    // single-row regions from collapsing to a zero-width ellipse.
    mu20 = mu20 / n + 1.0 / 12.0;
    mu02 = mu02 / n + 1.0 / 12.0;
    mu11 /= n;

    let common = (mu20 + mu02) / 2.0;
    let diff = (((mu20 - mu02) / 2.0).powi(2) + mu11 * mu11).sqrt();
    let lambda_major = common + diff;
    let lambda_minor = common - diff;
    if !lambda_major.is_finite() || lambda_major <= 0.0 {
        return None;
    }

    let angle_rad = 0.5 * (2.0 * mu11).atan2(mu20 - mu02);

    Some(EllipseFit {
        cx,
        cy,
        major_half: 2.0 * lambda_major.sqrt(),
        minor_half: 2.0 * lambda_minor.max(0.0).sqrt(),
        angle_rad,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> LabelMask {
        let h = rows.len() as u32;
        let w = rows[0].len() as u32;
        let mut mask = LabelMask::zeroed(w, h);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                if ch != '.' {
                    mask.set(x as u32, y as u32, ch.to_digit(10).unwrap());
                }
            }
        }
        mask
    }

    #[test]
    fn square_boundary_has_perimeter_pixels_only() {
        let mask = mask_from_rows(&[
            "......",
            ".1111.",
            ".1111.",
            ".1111.",
            ".1111.",
            "......",
        ]);
        let contours = object_contours(&mask, 1);
        assert_eq!(contours.len(), 1);
        // 4x4 square: 12 perimeter pixels.
        assert_eq!(contours[0].len(), 12);
        // Interior pixel (2.5 is the center offset of pixel 2) must not appear.
        assert!(!contours[0].iter().any(|p| p.x == 2.5 && p.y == 2.5));
    }

    #[test]
    fn separate_components_trace_separately() {
        let mask = mask_from_rows(&[
            "11..22",
            "11..22",
        ]);
        let contours = object_contours(&mask, 1);
        assert_eq!(contours.len(), 1);
        assert_eq!(object_contours(&mask, 2).len(), 1);
    }

    #[test]
    fn single_pixel_region_traces_without_looping() {
        let mask = mask_from_rows(&["...", ".1.", "..."]);
        let contours = object_contours(&mask, 1);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].len(), 1);
    }

    #[test]
    fn horizontal_bar_fits_axis_aligned_ellipse() {
        let mask = mask_from_rows(&[
            "..........",
            ".11111111.",
            ".11111111.",
            "..........",
        ]);
        let fit = fit_ellipse(&mask, 1).unwrap();
        assert!((fit.cx - 4.5).abs() < 1e-9);
        assert!((fit.cy - 1.5).abs() < 1e-9);
        assert!(fit.major_half > fit.minor_half);
        // Major axis along x.
        assert!(fit.angle_rad.abs() < 1e-6);
    }

    #[test]
    fn tiny_region_declines_to_fit() {
        let mask = mask_from_rows(&["1.", "..",]);
        assert!(fit_ellipse(&mask, 1).is_none());
    }

    #[test]
    fn fit_uses_largest_component() {
        let mask = mask_from_rows(&[
            "1..1111",
            "...1111",
            ".......",
        ]);
        let fit = fit_ellipse(&mask, 1).unwrap();
        assert!(fit.cx > 2.0, "centered on the 4x2 block, not the stray pixel");
    }
}
