use std::f64::consts::PI;

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

use super::DetectionParams;

/// A circular blob that may be an answer bubble; `x`/`y` are its centroid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BubbleCandidate {
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) area: f64,
}

/// Inverted fixed threshold: dark pixels become foreground (255).
pub(crate) fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut binary = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = if pixel[0] > threshold { 0 } else { 255 };
        binary.put_pixel(x, y, Luma([value]));
    }
    binary
}

pub(crate) fn find_bubble_candidates(
    binary: &GrayImage,
    params: &DetectionParams,
) -> Vec<BubbleCandidate> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .filter_map(|contour| {
            let points = &contour.points;
            let area = polygon_area(points);
            let perimeter = polygon_perimeter(points);
            if perimeter <= 0.0 {
                return None;
            }

            let circularity = 4.0 * PI * area / (perimeter * perimeter);
            if circularity <= params.min_circularity
                || area <= params.min_area
                || area >= params.max_area
            {
                return None;
            }

            let (cx, cy) = polygon_centroid(points)?;
            if cx < 0.0 || cy < 0.0 {
                return None;
            }
            Some(BubbleCandidate { x: cx as u32, y: cy as u32, area })
        })
        .collect()
}

/// Foreground pixels in the `[c - window, c + window)` square around the centroid.
pub(crate) fn fill_score(binary: &GrayImage, candidate: &BubbleCandidate, window: u32) -> u32 {
    let x0 = candidate.x.saturating_sub(window);
    let y0 = candidate.y.saturating_sub(window);
    let x1 = candidate.x.saturating_add(window).min(binary.width());
    let y1 = candidate.y.saturating_add(window).min(binary.height());

    let mut count = 0;
    for y in y0..y1 {
        for x in x0..x1 {
            if binary.get_pixel(x, y)[0] > 0 {
                count += 1;
            }
        }
    }
    count
}

fn polygon_area(points: &[Point<i32>]) -> f64 {
    signed_double_area(points).abs() / 2.0
}

fn signed_double_area(points: &[Point<i32>]) -> f64 {
    edges(points)
        .map(|(a, b)| f64::from(a.x) * f64::from(b.y) - f64::from(b.x) * f64::from(a.y))
        .sum()
}

fn polygon_perimeter(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    edges(points)
        .map(|(a, b)| {
            let dx = f64::from(b.x - a.x);
            let dy = f64::from(b.y - a.y);
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// Centroid from the first-order polygon moments; `None` for degenerate shapes.
fn polygon_centroid(points: &[Point<i32>]) -> Option<(f64, f64)> {
    let double_area = signed_double_area(points);
    if double_area == 0.0 {
        return None;
    }

    let (mut sum_x, mut sum_y) = (0.0, 0.0);
    for (a, b) in edges(points) {
        let cross = f64::from(a.x) * f64::from(b.y) - f64::from(b.x) * f64::from(a.y);
        sum_x += f64::from(a.x + b.x) * cross;
        sum_y += f64::from(a.y + b.y) * cross;
    }

    Some((sum_x / (3.0 * double_area), sum_y / (3.0 * double_area)))
}

fn edges(points: &[Point<i32>]) -> impl Iterator<Item = (Point<i32>, Point<i32>)> + '_ {
    points.iter().enumerate().map(move |(index, point)| (*point, points[(index + 1) % points.len()]))
}

#[cfg(test)]
mod tests {
    use imageproc::drawing::draw_filled_circle_mut;

    use super::*;
    use crate::services::sheet_vision::test_sheets::draw_bar;

    fn square(x: i32, y: i32, side: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ]
    }

    #[test]
    fn polygon_metrics_for_square() {
        let points = square(10, 20, 4);
        assert_eq!(polygon_area(&points), 16.0);
        assert_eq!(polygon_perimeter(&points), 16.0);
        assert_eq!(polygon_centroid(&points), Some((12.0, 22.0)));
    }

    #[test]
    fn degenerate_polygons_have_no_centroid() {
        let line = vec![Point::new(1, 1), Point::new(5, 1)];
        assert_eq!(polygon_centroid(&line), None);
        assert_eq!(polygon_perimeter(&[Point::new(3, 3)]), 0.0);
    }

    #[test]
    fn binarize_inverts_dark_pixels() {
        let mut gray = GrayImage::from_pixel(2, 1, Luma([200]));
        gray.put_pixel(1, 0, Luma([150]));

        let binary = binarize(&gray, 150);
        assert_eq!(binary.get_pixel(0, 0)[0], 0);
        assert_eq!(binary.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn keeps_round_blobs_and_drops_bars_and_specks() {
        let mut gray = GrayImage::from_pixel(200, 200, Luma([255]));
        draw_filled_circle_mut(&mut gray, (50, 50), 8, Luma([0]));
        draw_filled_circle_mut(&mut gray, (150, 150), 2, Luma([0]));
        draw_filled_circle_mut(&mut gray, (150, 50), 20, Luma([0]));
        draw_bar(&mut gray, 20, 150);

        let candidates = find_bubble_candidates(&binarize(&gray, 150), &DetectionParams::default());

        assert_eq!(candidates.len(), 1);
        let bubble = candidates[0];
        assert!(bubble.x.abs_diff(50) <= 1 && bubble.y.abs_diff(50) <= 1);
    }

    #[test]
    fn fill_window_is_clipped_to_image() {
        let binary = GrayImage::from_pixel(8, 8, Luma([255]));
        let corner = BubbleCandidate { x: 2, y: 2, area: 100.0 };
        assert_eq!(fill_score(&binary, &corner, 10), 64);

        let middle = BubbleCandidate { x: 4, y: 4, area: 100.0 };
        assert_eq!(fill_score(&binary, &middle, 2), 16);
    }
}
