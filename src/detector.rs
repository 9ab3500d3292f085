//! Corner detection for the feature point tracker.
//!
//! Corners are scored by the smaller eigenvalue of the structure tensor
//! ("good features to track"), thinned by non-maximum suppression and a
//! minimum distance, then refined to sub-pixel accuracy.

use crate::config::FlowConfig;
use crate::image::{bilinear, Image};
use crate::my_types::*;

const SUBPIX_ITERATIONS: usize = 20;
const SUBPIX_EPSILON: f64 = 0.03;

pub struct Detector {
    quality_level: f64,
    min_distance: f64,
    block_size: usize,
    subpix_radius: usize,
    scores: Image<f32>,
    // products of the image derivatives
    gxx: Image<f32>,
    gyy: Image<f32>,
    gxy: Image<f32>,
    candidates: Vec<(f32, usize, usize)>,
}

impl Detector {
    pub fn new(config: &FlowConfig) -> Self {
        Detector {
            quality_level: config.quality_level,
            min_distance: config.min_distance,
            block_size: config.block_size,
            subpix_radius: config.window_size / 2,
            scores: Image::empty(),
            gxx: Image::empty(),
            gyy: Image::empty(),
            gxy: Image::empty(),
            candidates: vec![],
        }
    }

    /// Detect up to `max_corners` corners, strongest first, into `out`.
    pub fn detect(&mut self, image: &Image, max_corners: usize, out: &mut Vec<Vector2d>) {
        out.clear();
        if max_corners == 0 {
            return;
        }
        let max_score = self.min_eigen_scores(image);
        if max_score <= 0. {
            return;
        }
        let threshold = max_score * self.quality_level as f32;

        self.candidates.clear();
        let s = &self.scores;
        for y in 1..s.height.saturating_sub(1) {
            for x in 1..s.width.saturating_sub(1) {
                let v = s.value(x, y);
                if v <= 0. || v < threshold {
                    continue;
                }
                // local maximum over the 3x3 neighbourhood
                let is_peak = (-1i32..=1).all(|dy| {
                    (-1i32..=1).all(|dx| s.value_i32(x as i32 + dx, y as i32 + dy) <= v)
                });
                if is_peak {
                    self.candidates.push((v, x, y));
                }
            }
        }
        self.candidates
            .sort_by(|a, b| b.0.total_cmp(&a.0).then(a.2.cmp(&b.2)).then(a.1.cmp(&b.1)));

        let min_dist2 = self.min_distance * self.min_distance;
        for &(_, x, y) in &self.candidates {
            if out.len() >= max_corners {
                break;
            }
            let p = Vector2d::new(x as f64, y as f64);
            if out.iter().all(|q| (q - p).norm_squared() >= min_dist2) {
                out.push(p);
            }
        }

        for p in out.iter_mut() {
            *p = self.refine_subpixel(image, *p);
        }
    }

    /// Fill the score image with the minimum eigenvalue of the structure
    /// tensor over a `block_size` neighbourhood of Sobel derivatives and
    /// return the largest score.
    fn min_eigen_scores(&mut self, image: &Image) -> f32 {
        let (w, h) = (image.width, image.height);
        self.scores.reallocate(w, h);
        if w < 3 || h < 3 {
            return 0.;
        }

        self.gxx.reallocate(w, h);
        self.gyy.reallocate(w, h);
        self.gxy.reallocate(w, h);
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                let p = |dx: i32, dy: i32| image.value_clamped(x + dx, y + dy) as f32;
                let gx = (p(1, -1) + 2. * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2. * p(-1, 0) + p(-1, 1));
                let gy = (p(-1, 1) + 2. * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2. * p(0, -1) + p(1, -1));
                // scaled to keep the tensor in a sane range for f32
                let (gx, gy) = (gx / 8., gy / 8.);
                self.gxx.set_value(x as usize, y as usize, gx * gx);
                self.gyy.set_value(x as usize, y as usize, gy * gy);
                self.gxy.set_value(x as usize, y as usize, gx * gy);
            }
        }

        let r = (self.block_size / 2) as i32;
        let mut max_score = 0f32;
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                let (mut a, mut b, mut c) = (0f32, 0f32, 0f32);
                for dy in -r..=r {
                    for dx in -r..=r {
                        a += self.gxx.value_clamped(x + dx, y + dy);
                        b += self.gxy.value_clamped(x + dx, y + dy);
                        c += self.gyy.value_clamped(x + dx, y + dy);
                    }
                }
                let half_trace = (a + c) / 2.;
                let score = half_trace - (((a - c) / 2.).powi(2) + b * b).sqrt();
                let score = score.max(0.);
                self.scores.set_value(x as usize, y as usize, score);
                max_score = max_score.max(score);
            }
        }
        max_score
    }

    /// Iteratively move the corner to the point where the image gradients in
    /// its neighbourhood are orthogonal to the offsets from the point.
    fn refine_subpixel(&self, image: &Image, initial: Vector2d) -> Vector2d {
        let r = self.subpix_radius as i32;
        if r == 0 {
            return initial;
        }
        let sigma2 = (r as f64).powi(2);
        let mut p = initial;
        for _ in 0..SUBPIX_ITERATIONS {
            let mut a = Matrix2d::zeros();
            let mut b = Vector2d::zeros();
            for dy in -r..=r {
                for dx in -r..=r {
                    let q = p + Vector2d::new(dx as f64, dy as f64);
                    let gx = (bilinear(image, q + Vector2d::new(1., 0.))
                        - bilinear(image, q - Vector2d::new(1., 0.)))
                        / 2.;
                    let gy = (bilinear(image, q + Vector2d::new(0., 1.))
                        - bilinear(image, q - Vector2d::new(0., 1.)))
                        / 2.;
                    let w = (-((dx * dx + dy * dy) as f64) / (2. * sigma2)).exp();
                    let g = Vector2d::new(gx, gy);
                    let ggt = g * g.transpose() * w;
                    a += ggt;
                    b += ggt * q;
                }
            }
            let next = match a.try_inverse() {
                Some(inv) => inv * b,
                None => break,
            };
            let shift = (next - p).norm_squared();
            p = next;
            if shift < SUBPIX_EPSILON * SUBPIX_EPSILON {
                break;
            }
        }

        // a corner that wandered out of its window is not trusted
        let d = p - initial;
        if !p.x.is_finite() || !p.y.is_finite() || d.x.abs() > r as f64 || d.y.abs() > r as f64 {
            return initial;
        }
        p
    }
}
