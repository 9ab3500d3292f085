//! Motion history tracking.
//!
//! A ring of recent grayscale frames is differenced to find pixels that
//! changed, those pixels are stamped with the current time in the motion
//! history image (MHI), and the MHI is cut into connected moving regions.

use std::collections::VecDeque;
use std::time::Instant;

use log::{debug, info};
use ndarray as nd;
use serde::{Deserialize, Serialize};

use crate::config::MotionConfig;
use crate::error::{Result, TrackError};
use crate::geometry::Rect;
use crate::image::{Frame, FrameShape, Image};

/// Motion history value of a pixel that has no motion inside the history
/// duration.
pub const NO_MOTION: f32 = f32::NEG_INFINITY;

/// One moving region of the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectedComponent {
    pub rect: Rect,
    /// number of pixels in the region
    pub area: f64,
    /// value of the region in the segmentation mask, starting at 1
    pub label: u32,
}

pub struct MotionTracker {
    config: MotionConfig,
    shape: Option<FrameShape>,
    ring: Vec<Image>,
    last: usize,
    // every ring slot holds a real frame
    primed: bool,
    silhouette: Image,
    mhi: nd::Array2<f32>,
    segmask: nd::Array2<u32>,
    components: Vec<ConnectedComponent>,
    queue: VecDeque<(usize, usize)>,
    clock: Instant,
    timestamp: f64,
}

impl MotionTracker {
    pub fn new(config: &MotionConfig) -> Self {
        MotionTracker {
            config: config.clone(),
            shape: None,
            ring: vec![],
            last: 0,
            primed: false,
            silhouette: Image::empty(),
            mhi: nd::Array2::from_elem((0, 0), NO_MOTION),
            segmask: nd::Array2::zeros((0, 0)),
            components: vec![],
            queue: VecDeque::new(),
            clock: Instant::now(),
            timestamp: 0.,
        }
    }

    /// Drop every buffer and allocate fresh ones for frames of `shape`. This
    /// is the only way to change the session frame size. The next frame
    /// fills the whole ring.
    pub fn resize(&mut self, shape: FrameShape) {
        let (w, h) = (shape.width, shape.height);
        self.ring.clear();
        self.ring
            .resize_with(self.config.ring_depth, || Image::new(w, h));
        self.last = 0;
        self.primed = false;
        self.silhouette.reallocate(w, h);
        self.mhi = nd::Array2::from_elem((h, w), NO_MOTION);
        self.segmask = nd::Array2::zeros((h, w));
        self.components.clear();
        self.shape = Some(shape);
        info!("motion history buffers allocated for {shape}");
    }

    /// Update with the time elapsed since the tracker was created.
    pub fn update(&mut self, frame: &Frame) -> Result<&[ConnectedComponent]> {
        let timestamp = self.clock.elapsed().as_secs_f64();
        self.update_at(frame, timestamp)
    }

    /// Update with an explicit timestamp in seconds. Timestamps are expected
    /// to increase between calls.
    pub fn update_at(&mut self, frame: &Frame, timestamp: f64) -> Result<&[ConnectedComponent]> {
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
        self.timestamp = timestamp;
        if !self.primed {
            // no motion against frames that were never seen
            for slot in self.ring.iter_mut() {
                frame.to_gray_into(slot);
            }
            self.primed = true;
        }

        let newest = self.last;
        let oldest = (self.last + 1) % self.ring.len();
        frame.to_gray_into(&mut self.ring[newest]);
        self.last = oldest;

        let threshold = self.config.diff_threshold;
        let (a, b) = (&self.ring[newest], &self.ring[oldest]);
        for ((s, &p), &q) in self.silhouette.data.iter_mut().zip(&a.data).zip(&b.data) {
            *s = (p.abs_diff(q) > threshold) as u8;
        }

        self.update_motion_history();
        self.segment();
        debug!(
            "{} motion segments at t={:.3}",
            self.components.len(),
            timestamp
        );
        Ok(&self.components)
    }

    /// Stamp moved pixels, forget stamps older than the history duration.
    fn update_motion_history(&mut self) {
        let ts = self.timestamp as f32;
        let stale = (self.timestamp - self.config.mhi_duration) as f32;
        for (m, &s) in self.mhi.iter_mut().zip(&self.silhouette.data) {
            if s != 0 {
                *m = ts;
            } else if *m < stale {
                *m = NO_MOTION;
            }
        }
    }

    /// Flood fill from every pixel stamped at (about) the current time into
    /// 4-connected neighbours whose stamp is at most `max_time_delta` older
    /// than the pixel they are reached from.
    fn segment(&mut self) {
        self.components.clear();
        self.segmask.fill(0);
        let (h, w) = self.mhi.dim();
        let ts = self.timestamp as f32;
        let fresh = ts - self.config.min_time_delta as f32;
        let gap = self.config.max_time_delta as f32;
        let stale = (self.timestamp - self.config.mhi_duration) as f32;
        let mut label = 0;

        for y in 0..h {
            for x in 0..w {
                let v = self.mhi[[y, x]];
                if v < fresh || self.segmask[[y, x]] != 0 {
                    continue;
                }
                label += 1;
                self.segmask[[y, x]] = label;
                self.queue.push_back((x, y));
                let (mut x0, mut y0, mut x1, mut y1) = (x, y, x, y);
                let mut area = 0usize;

                while let Some((cx, cy)) = self.queue.pop_front() {
                    area += 1;
                    x0 = x0.min(cx);
                    y0 = y0.min(cy);
                    x1 = x1.max(cx);
                    y1 = y1.max(cy);
                    let cv = self.mhi[[cy, cx]];

                    let neighbours = [
                        (cx.wrapping_sub(1), cy),
                        (cx + 1, cy),
                        (cx, cy.wrapping_sub(1)),
                        (cx, cy + 1),
                    ];
                    for (nx, ny) in neighbours {
                        if nx >= w || ny >= h || self.segmask[[ny, nx]] != 0 {
                            continue;
                        }
                        let nv = self.mhi[[ny, nx]];
                        if nv < stale || nv < cv - gap {
                            continue;
                        }
                        self.segmask[[ny, nx]] = label;
                        self.queue.push_back((nx, ny));
                    }
                }

                self.components.push(ConnectedComponent {
                    rect: Rect::from_corners(x0 as i32, y0 as i32, x1 as i32 + 1, y1 as i32 + 1),
                    area: area as f64,
                    label,
                });
            }
        }
    }

    /// Components found by the last update.
    pub fn segments(&self) -> &[ConnectedComponent] {
        &self.components
    }

    /// The component with the largest pixel area, the first one on ties.
    pub fn largest(&self) -> Option<&ConnectedComponent> {
        self.components
            .iter()
            .fold(None, |best: Option<&ConnectedComponent>, c| match best {
                Some(b) if b.area >= c.area => Some(b),
                _ => Some(c),
            })
    }

    pub fn motion_history(&self) -> &nd::Array2<f32> {
        &self.mhi
    }

    pub fn segment_mask(&self) -> &nd::Array2<u32> {
        &self.segmask
    }

    pub fn shape(&self) -> Option<FrameShape> {
        self.shape
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }
}
