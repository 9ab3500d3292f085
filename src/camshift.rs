//! Color window tracking.
//!
//! A hue histogram taken from a seed rectangle is backprojected onto every
//! new frame, mean-shift moves the search window onto the densest part of
//! the backprojection and the second order moments around it give an
//! oriented box (CamShift).

use std::f64::consts::FRAC_PI_2;

use log::{debug, info, warn};

use crate::color::{hue_and_mask, HUE_RANGE};
use crate::config::ColorConfig;
use crate::error::{Result, TrackError};
use crate::geometry::{Rect, RotatedBox};
use crate::image::{Frame, FrameShape, Image, Origin};
use crate::my_types::*;

/// Margin added around the converged window before the box moments are taken.
const BOX_TOLERANCE: i32 = 10;

#[derive(Default)]
struct Moments {
    m00: f64,
    m10: f64,
    m01: f64,
    m20: f64,
    m11: f64,
    m02: f64,
}

/// Raw moments of `image` inside `rect`, pixel centres relative to the rect origin.
fn moments(image: &Image, rect: &Rect) -> Moments {
    let mut m = Moments::default();
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            let v = image.value_i32(x, y) as f64;
            if v == 0. {
                continue;
            }
            let fx = (x - rect.x) as f64 + 0.5;
            let fy = (y - rect.y) as f64 + 0.5;
            m.m00 += v;
            m.m10 += v * fx;
            m.m01 += v * fy;
            m.m20 += v * fx * fx;
            m.m11 += v * fx * fy;
            m.m02 += v * fy * fy;
        }
    }
    m
}

pub struct ColorTracker {
    config: ColorConfig,
    shape: Option<FrameShape>,
    origin: Origin,
    hue: Image,
    mask: Image,
    backprojection: Image,
    histogram: Vec<f32>,
    window: Rect,
    track_box: Option<RotatedBox>,
    tracking: bool,
}

impl ColorTracker {
    pub fn new(config: &ColorConfig) -> Self {
        ColorTracker {
            config: config.clone(),
            shape: None,
            origin: Origin::TopLeft,
            hue: Image::empty(),
            mask: Image::empty(),
            backprojection: Image::empty(),
            histogram: vec![0.; config.hue_bins],
            window: Rect::default(),
            track_box: None,
            tracking: false,
        }
    }

    /// Reallocate the per-frame planes for frames of `shape`. Tracking stops.
    pub fn resize(&mut self, shape: FrameShape) {
        self.hue.reallocate(shape.width, shape.height);
        self.mask.reallocate(shape.width, shape.height);
        self.backprojection.reallocate(shape.width, shape.height);
        self.tracking = false;
        self.track_box = None;
        self.shape = Some(shape);
        info!("color planes allocated for {shape}");
    }

    /// Recompute hue and validity mask for `frame` and, while tracking, move
    /// the window. Returns the new box as `track_box` reports it, `None` when
    /// not tracking.
    pub fn update(&mut self, frame: &Frame) -> Result<Option<RotatedBox>> {
        match self.shape {
            None => self.resize(frame.shape()),
            Some(shape) if shape != frame.shape() => {
                return Err(TrackError::DimensionMismatch {
                    expected: shape,
                    found: frame.shape(),
                })
            }
            _ => {}
        }
        self.origin = frame.origin;
        let c = &self.config;
        hue_and_mask(frame, c.smin, c.vmin, c.vmax, &mut self.hue, &mut self.mask);

        if !self.tracking {
            return Ok(None);
        }
        self.backproject();
        match self.camshift() {
            Some(track_box) => {
                debug!(
                    "track box at ({:.1}, {:.1}) {:.1}x{:.1} {:.1} deg",
                    track_box.center.x,
                    track_box.center.y,
                    track_box.width,
                    track_box.height,
                    track_box.angle
                );
                self.track_box = Some(track_box);
                Ok(self.track_box())
            }
            None => {
                warn!("color window lost its mass, tracking stopped");
                self.tracking = false;
                Ok(None)
            }
        }
    }

    /// Start tracking the colors inside `seed` on the last updated frame.
    /// Returns whether tracking is active afterwards.
    pub fn reset(&mut self, seed: Rect) -> bool {
        self.tracking = false;
        let clipped = seed.clip(self.hue.width, self.hue.height);
        if clipped.is_empty() {
            warn!("seed {seed:?} has no area inside the frame, color tracking stays off");
            return false;
        }
        if !self.build_histogram(&clipped) {
            warn!("no valid hue inside seed {seed:?}, color tracking stays off");
            return false;
        }
        self.window = clipped;
        self.track_box = Some(RotatedBox::from_rect(&clipped));
        self.tracking = true;
        info!("color tracking reseeded at {clipped:?}");
        true
    }

    pub fn stop(&mut self) {
        self.tracking = false;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Last computed box, `None` before the first successful reset. The angle
    /// is negated for frames with a bottom-left origin.
    pub fn track_box(&self) -> Option<RotatedBox> {
        self.track_box.map(|mut track_box| {
            if self.origin == Origin::BottomLeft {
                track_box.angle = -track_box.angle;
            }
            track_box
        })
    }

    /// Last computed box in buffer coordinates, the frame the motion
    /// segments and feature points live in.
    pub fn buffer_box(&self) -> Option<RotatedBox> {
        self.track_box
    }

    /// Search window for the next frame.
    pub fn window(&self) -> Rect {
        self.window
    }

    pub fn histogram(&self) -> &[f32] {
        &self.histogram
    }

    pub fn backprojection(&self) -> &Image {
        &self.backprojection
    }

    fn bin(&self, hue: u8) -> usize {
        hue as usize * self.histogram.len() / HUE_RANGE as usize
    }

    /// Histogram of valid hues inside `seed`, scaled to a peak of 255.
    /// False when no pixel contributed.
    fn build_histogram(&mut self, seed: &Rect) -> bool {
        self.histogram.iter_mut().for_each(|v| *v = 0.);
        for y in seed.y..seed.bottom() {
            for x in seed.x..seed.right() {
                if self.mask.value_i32(x, y) == 0 {
                    continue;
                }
                let bin = self.bin(self.hue.value_i32(x, y));
                self.histogram[bin] += 1.;
            }
        }
        let peak = self.histogram.iter().copied().fold(0f32, f32::max);
        if peak <= 0. {
            return false;
        }
        let scale = 255. / peak;
        self.histogram.iter_mut().for_each(|v| *v *= scale);
        true
    }

    fn backproject(&mut self) {
        let bins = self.histogram.len();
        let pixels = self.hue.data.iter().zip(&self.mask.data);
        for (b, (&hue, &valid)) in self.backprojection.data.iter_mut().zip(pixels) {
            *b = if valid == 0 {
                0
            } else {
                let bin = hue as usize * bins / HUE_RANGE as usize;
                self.histogram[bin].round().clamp(0., 255.) as u8
            };
        }
    }

    /// Move `window` towards the centroid of the backprojection until it
    /// settles or the iteration budget runs out.
    fn mean_shift(&self, mut window: Rect) -> Rect {
        let (w, h) = (
            self.backprojection.width as i32,
            self.backprojection.height as i32,
        );
        let eps2 = self.config.meanshift_epsilon * self.config.meanshift_epsilon;
        for _ in 0..self.config.meanshift_iterations {
            let m = moments(&self.backprojection, &window);
            if m.m00 < f64::EPSILON {
                break;
            }
            let dx = (m.m10 / m.m00 - window.width as f64 / 2.).round() as i32;
            let dy = (m.m01 / m.m00 - window.height as f64 / 2.).round() as i32;
            let nx = (window.x + dx).clamp(0, (w - window.width).max(0));
            let ny = (window.y + dy).clamp(0, (h - window.height).max(0));
            let (dx, dy) = (nx - window.x, ny - window.y);
            window.x = nx;
            window.y = ny;
            if ((dx * dx + dy * dy) as f64) < eps2 {
                break;
            }
        }
        window
    }

    /// One CamShift step from the stored window. `None` when there is no
    /// mass left to track.
    fn camshift(&mut self) -> Option<RotatedBox> {
        let (w, h) = (self.backprojection.width, self.backprojection.height);
        let window = self.window.clip(w, h);
        if window.is_empty() {
            return None;
        }
        let window = self.mean_shift(window);

        let grown = window.inflate(BOX_TOLERANCE).clip(w, h);
        let m = moments(&self.backprojection, &grown);
        if m.m00 < f64::EPSILON {
            return None;
        }
        let inv = 1. / m.m00;
        let (xc, yc) = (m.m10 * inv, m.m01 * inv);
        // central moments
        let a = m.m20 * inv - xc * xc;
        let b = m.m11 * inv - xc * yc;
        let c = m.m02 * inv - yc * yc;

        let square = (4. * b * b + (a - c) * (a - c)).sqrt();
        let mut theta = (2. * b).atan2(a - c + square);
        let (sn, cs) = theta.sin_cos();
        let rotate_a = cs * cs * a + 2. * cs * sn * b + sn * sn * c;
        let rotate_c = sn * sn * a - 2. * cs * sn * b + cs * cs * c;
        let mut length = rotate_a.max(0.).sqrt() * 4.;
        let mut width = rotate_c.max(0.).sqrt() * 4.;
        if length < width {
            std::mem::swap(&mut length, &mut width);
            theta += FRAC_PI_2;
        }

        let track_box = RotatedBox {
            center: Vector2d::new(grown.x as f64 + xc, grown.y as f64 + yc),
            width,
            height: length,
            angle: (90. + theta.to_degrees()).rem_euclid(180.),
        };
        self.window = track_box.bounding_rect().clip(w, h);
        if self.window.is_empty() {
            return None;
        }
        Some(track_box)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Region;

    const W: usize = 80;
    const H: usize = 60;
    const GREEN: [u8; 3] = [0, 160, 0];
    const RED: [u8; 3] = [200, 20, 20];

    fn scene(blob: Option<Rect>, origin: Origin) -> Frame {
        let mut data = Vec::with_capacity(W * H * 3);
        for y in 0..H as i32 {
            for x in 0..W as i32 {
                let inside = blob.map_or(false, |r| r.contains(Vector2d::new(x as f64, y as f64)));
                data.extend_from_slice(if inside { &RED } else { &GREEN });
            }
        }
        Frame::new(data, W, H, 3, origin).unwrap()
    }

    #[test]
    fn test_zero_area_seed_stays_inactive() {
        let mut tracker = ColorTracker::new(&ColorConfig::default());
        let seed = Rect::new(20, 20, 12, 12);
        // nothing seen yet
        assert!(!tracker.reset(seed));

        tracker.update(&scene(Some(seed), Origin::TopLeft)).unwrap();
        assert!(!tracker.reset(Rect::new(20, 20, 0, 12)));
        assert!(!tracker.is_tracking());
        assert!(tracker.track_box().is_none());
        // completely outside the frame
        assert!(!tracker.reset(Rect::new(200, 200, 10, 10)));
        assert!(!tracker.is_tracking());
    }

    #[test]
    fn test_unsaturated_seed_is_degenerate() {
        let mut tracker = ColorTracker::new(&ColorConfig::default());
        let gray = Frame::gray(vec![128; W * H], W, H).unwrap();
        tracker.update(&gray).unwrap();
        assert!(!tracker.reset(Rect::new(10, 10, 20, 20)));
        assert!(!tracker.is_tracking());
    }

    #[test]
    fn test_follows_moving_blob() {
        let mut tracker = ColorTracker::new(&ColorConfig::default());
        let seed = Rect::new(20, 20, 12, 12);
        tracker.update(&scene(Some(seed), Origin::TopLeft)).unwrap();
        assert!(tracker.reset(seed));
        assert_eq!(tracker.histogram()[0], 255.);
        assert!(tracker.histogram()[1..].iter().all(|&v| v == 0.));

        let moved = Rect::new(24, 23, 12, 12);
        let track_box = tracker
            .update(&scene(Some(moved), Origin::TopLeft))
            .unwrap()
            .unwrap();
        assert!((track_box.center - moved.center()).norm() < 0.5, "{track_box:?}");
        assert!(track_box.width > 10. && track_box.width < 18.);
        assert!(track_box.height > 10. && track_box.height < 18.);
        assert!(tracker.window().contains(moved.center()));
        assert!(tracker.is_tracking());
    }

    #[test]
    fn test_box_follows_elongation() {
        for (origin, angle) in [(Origin::TopLeft, 90.), (Origin::BottomLeft, -90.)] {
            let mut tracker = ColorTracker::new(&ColorConfig::default());
            let bar = Rect::new(20, 25, 30, 6);
            let frame = scene(Some(bar), origin);
            tracker.update(&frame).unwrap();
            assert!(tracker.reset(bar));
            let track_box = tracker.update(&frame).unwrap().unwrap();
            assert!(track_box.height > 2. * track_box.width);
            assert!((track_box.angle - angle).abs() < 1e-6, "{track_box:?}");
        }
    }

    fn diagonal_bar(origin: Origin) -> Frame {
        let mut data = Vec::with_capacity(W * H * 3);
        for y in 0..H as i32 {
            for x in 0..W as i32 {
                let on_bar = (x - y - 10).abs() <= 2 && (15..45).contains(&y);
                data.extend_from_slice(if on_bar { &RED } else { &[0, 0, 0] });
            }
        }
        Frame::new(data, W, H, 3, origin).unwrap()
    }

    #[test]
    fn test_buffer_box_ignores_origin() {
        let on_bar = Region::Rect(Rect::new(35, 25, 10, 10));
        let off_bar = Region::Rect(Rect::new(20, 40, 10, 10));
        let mut overlaps = vec![];
        for origin in [Origin::TopLeft, Origin::BottomLeft] {
            let mut tracker = ColorTracker::new(&ColorConfig::default());
            let frame = diagonal_bar(origin);
            tracker.update(&frame).unwrap();
            assert!(tracker.reset(Rect::new(25, 15, 30, 30)));
            let reported = tracker.update(&frame).unwrap().unwrap();
            let buffer_box = tracker.buffer_box().unwrap();
            assert!(buffer_box.height > 3. * buffer_box.width, "{buffer_box:?}");
            assert!((buffer_box.angle - 135.).abs() < 5., "{buffer_box:?}");
            let expected = if origin == Origin::BottomLeft {
                -buffer_box.angle
            } else {
                buffer_box.angle
            };
            assert_eq!(reported.angle, expected);

            let region = Region::Box(buffer_box);
            assert!(region.contains(Vector2d::new(40., 30.)));
            assert!(!region.contains(Vector2d::new(25., 45.)));
            assert!(region.intersection_area(&off_bar) < 1.);
            overlaps.push(region.intersection_area(&on_bar));
        }
        assert!(overlaps[0] > 40.);
        assert_eq!(overlaps[0], overlaps[1]);
    }

    #[test]
    fn test_lost_color_stops_tracking() {
        let mut tracker = ColorTracker::new(&ColorConfig::default());
        let seed = Rect::new(20, 20, 12, 12);
        tracker.update(&scene(Some(seed), Origin::TopLeft)).unwrap();
        assert!(tracker.reset(seed));

        assert!(tracker.update(&scene(None, Origin::TopLeft)).unwrap().is_none());
        assert!(!tracker.is_tracking());
        // the last box stays readable
        assert!(tracker.track_box().is_some());
    }

    #[test]
    fn test_size_change_rejected() {
        let mut tracker = ColorTracker::new(&ColorConfig::default());
        tracker.update(&scene(None, Origin::TopLeft)).unwrap();
        let small = Frame::rgb(vec![0; 10 * 10 * 3], 10, 10).unwrap();
        assert!(matches!(
            tracker.update(&small),
            Err(TrackError::DimensionMismatch { .. })
        ));
        tracker.resize(small.shape());
        tracker.update(&small).unwrap();
    }
}
