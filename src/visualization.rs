use std::path::Path;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use ndarray as nd;

use crate::geometry::Rect;
use crate::image::{Frame, Origin};
use crate::my_types::*;
use crate::pipeline::FrameReport;

pub const POINT_COLOR: [u8; 3] = [0, 255, 0];
pub const COMPONENT_COLOR: [u8; 3] = [255, 0, 0];
pub const BOX_COLOR: [u8; 3] = [0, 0, 255];

const POINT_RADIUS: i32 = 3;

fn put(image: &mut nd::Array3<u8>, x: i32, y: i32, color: [u8; 3]) {
    let (h, w, _) = image.dim();
    if x < 0 || y < 0 || x >= w as i32 || y >= h as i32 {
        return;
    }
    for (c, v) in color.iter().enumerate() {
        image[[y as usize, x as usize, c]] = *v;
    }
}

fn draw_line(image: &mut nd::Array3<u8>, a: Vector2d, b: Vector2d, color: [u8; 3]) {
    let steps = (b - a).abs().max().ceil().max(1.) as usize;
    for i in 0..=steps {
        let p = a + (b - a) * (i as f64 / steps as f64);
        put(image, p.x.round() as i32, p.y.round() as i32, color);
    }
}

fn draw_polygon(image: &mut nd::Array3<u8>, vertices: &[Vector2d], color: [u8; 3]) {
    for i in 0..vertices.len() {
        draw_line(image, vertices[i], vertices[(i + 1) % vertices.len()], color);
    }
}

fn draw_rect(image: &mut nd::Array3<u8>, rect: &Rect, color: [u8; 3]) {
    if rect.is_empty() {
        return;
    }
    // outline on the outermost pixels of the rect
    let (x0, y0) = (rect.x as f64, rect.y as f64);
    let (x1, y1) = ((rect.right() - 1) as f64, (rect.bottom() - 1) as f64);
    let corners = [
        Vector2d::new(x0, y0),
        Vector2d::new(x1, y0),
        Vector2d::new(x1, y1),
        Vector2d::new(x0, y1),
    ];
    draw_polygon(image, &corners, color);
}

fn draw_disc(image: &mut nd::Array3<u8>, center: Vector2d, radius: i32, color: [u8; 3]) {
    let (cx, cy) = (center.x.round() as i32, center.y.round() as i32);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(image, cx + dx, cy + dy, color);
            }
        }
    }
}

/// RGB copy of `frame` with feature points, motion segments and the
/// tracked box drawn on top.
pub fn visualize_report(frame: &Frame, report: &FrameReport) -> nd::Array3<u8> {
    let mut image = nd::Array3::from_shape_fn((frame.height, frame.width, 3), |(y, x, c)| {
        frame.rgb_at(x, y)[c]
    });

    for feature in &report.points {
        draw_disc(&mut image, feature.point, POINT_RADIUS, POINT_COLOR);
    }
    for component in &report.components {
        draw_rect(&mut image, &component.rect, COMPONENT_COLOR);
    }
    if let Some(mut track_box) = report.track_box {
        // back to buffer coordinates
        if frame.origin == Origin::BottomLeft {
            track_box.angle = -track_box.angle;
        }
        draw_polygon(&mut image, &track_box.vertices(), BOX_COLOR);
    }
    image
}

pub fn save_png(image: &nd::Array3<u8>, path: &Path) -> Result<()> {
    let (h, w, _) = image.dim();
    let data: Vec<u8> = image.iter().copied().collect();
    let buffer = ::image::RgbImage::from_raw(w as u32, h as u32, data)
        .ok_or_else(|| anyhow!("Image buffer does not match {w}x{h}"))?;
    buffer
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeaturePoint;
    use crate::geometry::RotatedBox;
    use crate::motion::ConnectedComponent;

    fn report() -> FrameReport {
        let rect = Rect::new(2, 2, 10, 8);
        FrameReport {
            frame_number: 1,
            timestamp: 0.,
            point_count: 1,
            points: vec![FeaturePoint::detected(Vector2d::new(20., 20.))],
            components: vec![ConnectedComponent {
                rect,
                area: rect.area(),
                label: 1,
            }],
            track_box: Some(RotatedBox::from_rect(&Rect::new(14, 2, 10, 10))),
            window: None,
            decision: None,
            reseeded: false,
        }
    }

    #[test]
    fn test_annotations_land_where_expected() {
        let frame = Frame::gray(vec![50; 32 * 32], 32, 32).unwrap();
        let image = visualize_report(&frame, &report());
        let at = |x: usize, y: usize| [image[[y, x, 0]], image[[y, x, 1]], image[[y, x, 2]]];

        assert_eq!(at(20, 20), POINT_COLOR);
        assert_eq!(at(23, 20), POINT_COLOR);
        assert_eq!(at(24, 20), [50, 50, 50]);
        assert_eq!(at(2, 2), COMPONENT_COLOR);
        assert_eq!(at(11, 9), COMPONENT_COLOR);
        assert_eq!(at(6, 5), [50, 50, 50]);
        assert_eq!(at(18, 2), BOX_COLOR);
        assert_eq!(at(14, 7), BOX_COLOR);
        assert_eq!(at(0, 31), [50, 50, 50]);
    }
}
