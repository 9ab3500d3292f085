use std::time::Instant;

use log::{debug, info};
use serde::Serialize;
use tracing::instrument;

use crate::camshift::ColorTracker;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackError};
use crate::feature::FeaturePoint;
use crate::flow::FeatureTracker;
use crate::focus::{Decision, FocusEngine};
use crate::geometry::{Rect, Region, RotatedBox};
use crate::image::{Frame, FrameShape, Image};
use crate::motion::{ConnectedComponent, MotionTracker};

/// Everything the session produced for one frame.
#[derive(Clone, Debug, Serialize)]
pub struct FrameReport {
    pub frame_number: usize,
    pub timestamp: f64,
    pub point_count: usize,
    pub points: Vec<FeaturePoint>,
    pub components: Vec<ConnectedComponent>,
    /// oriented box of the color tracker, `None` while it is inactive
    pub track_box: Option<RotatedBox>,
    /// search window of the color tracker for the next frame
    pub window: Option<Rect>,
    pub decision: Option<Decision>,
    /// the color tracker was (re)started on this frame
    pub reseeded: bool,
}

/// One tracking session over a sequence of same sized frames.
///
/// Per frame: feature flow, motion history and segmentation, color window
/// update, then the refocus decision against the largest motion segment.
pub struct Satori {
    flow: FeatureTracker,
    motion: MotionTracker,
    color: ColorTracker,
    focus: FocusEngine,
    refresh_interval: usize,
    /// grayscale copies of the last two frames, `current` is the newest
    grays: [Image; 2],
    current: usize,
    has_previous: bool,
    shape: Option<FrameShape>,
    do_flow: bool,
    do_track: bool,
    need_flow_init: bool,
    reseed_requested: bool,
    // Incremented just before processing a new frame. 0 before the first frame.
    frame_number: usize,
    frames_since_detection: usize,
    clock: Instant,
}

impl Satori {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Satori {
            flow: FeatureTracker::new(&config.flow),
            motion: MotionTracker::new(&config.motion),
            color: ColorTracker::new(&config.color),
            focus: FocusEngine::new(&config.focus),
            refresh_interval: config.flow.feature_refresh_interval,
            grays: [Image::empty(), Image::empty()],
            current: 0,
            has_previous: false,
            shape: None,
            do_flow: true,
            do_track: true,
            need_flow_init: true,
            reseed_requested: false,
            frame_number: 0,
            frames_since_detection: 0,
            clock: Instant::now(),
        })
    }

    /// Start over with frames of `shape`. All tracking state is dropped.
    pub fn resize(&mut self, shape: FrameShape) {
        self.motion.resize(shape);
        self.color.resize(shape);
        self.flow.resize(shape);
        self.grays.iter_mut().for_each(|g| g.clear());
        self.has_previous = false;
        self.need_flow_init = true;
        self.shape = Some(shape);
        info!("session frame size set to {shape}");
    }

    /// Process a frame stamped with the time since the session was created.
    pub fn process(&mut self, frame: &Frame) -> Result<FrameReport> {
        let timestamp = self.clock.elapsed().as_secs_f64();
        self.process_at(frame, timestamp)
    }

    #[instrument(skip(self, frame))]
    pub fn process_at(&mut self, frame: &Frame, timestamp: f64) -> Result<FrameReport> {
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
        self.frame_number += 1;

        let next = 1 - self.current;
        frame.to_gray_into(&mut self.grays[next]);
        if self.do_flow {
            self.process_flow(next)?;
        }
        self.current = next;
        self.has_previous = true;

        let mut decision = None;
        let mut reseeded = false;
        if self.do_track {
            self.motion.update_at(frame, timestamp)?;
            self.color.update(frame)?;
            let largest = self.motion.largest().copied();

            if !self.color.is_tracking() || self.reseed_requested {
                if let Some(component) = largest {
                    reseeded = self.color.reset(component.rect);
                    self.reseed_requested = false;
                }
            } else if let (Some(component), Some(track_box)) = (largest, self.color.buffer_box()) {
                let points: &[FeaturePoint] = if self.do_flow { self.flow.points() } else { &[] };
                let d = self
                    .focus
                    .evaluate(&Region::Box(track_box), &component, points, frame.shape());
                if let Some(seed) = d.seed {
                    info!("refocusing on motion segment {seed:?}");
                    reseeded = self.color.reset(seed);
                }
                decision = Some(d);
            }
        }

        let tracking = self.do_track && self.color.is_tracking();
        let report = FrameReport {
            frame_number: self.frame_number,
            timestamp,
            point_count: self.point_count(),
            points: self.points().to_vec(),
            components: self.components().to_vec(),
            track_box: if tracking { self.color.track_box() } else { None },
            window: tracking.then(|| self.color.window()),
            decision,
            reseeded,
        };
        debug!(
            "frame {}: {} points, {} segments, tracking {}",
            report.frame_number,
            report.point_count,
            report.components.len(),
            tracking
        );
        Ok(report)
    }

    /// Detect or follow feature points into the gray frame in slot `next`.
    fn process_flow(&mut self, next: usize) -> Result<()> {
        let refresh_due =
            self.refresh_interval > 0 && self.frames_since_detection >= self.refresh_interval;
        let [g0, g1] = &self.grays;
        let (prev, curr) = if next == 0 { (g1, g0) } else { (g0, g1) };

        if self.need_flow_init || self.flow.count() == 0 || refresh_due || !self.has_previous {
            self.flow.initialize(curr)?;
            self.need_flow_init = false;
            self.frames_since_detection = 0;
        } else {
            self.flow.advance(prev, curr)?;
            self.frames_since_detection += 1;
        }
        Ok(())
    }

    /// Restart color tracking from the largest motion segment of the next frame.
    pub fn request_reseed(&mut self) {
        self.reseed_requested = true;
    }

    /// Turn feature flow on or off. Turning it on detects fresh points.
    pub fn set_flow_enabled(&mut self, enabled: bool) {
        if enabled && !self.do_flow {
            self.need_flow_init = true;
        }
        self.do_flow = enabled;
    }

    /// Turn motion segmentation and color tracking on or off.
    pub fn set_tracking_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.color.stop();
        }
        self.do_track = enabled;
    }

    pub fn flow_enabled(&self) -> bool {
        self.do_flow
    }

    pub fn tracking_enabled(&self) -> bool {
        self.do_track
    }

    pub fn point_count(&self) -> usize {
        if self.do_flow {
            self.flow.count()
        } else {
            0
        }
    }

    pub fn points(&self) -> &[FeaturePoint] {
        if self.do_flow {
            self.flow.points()
        } else {
            &[]
        }
    }

    pub fn components(&self) -> &[ConnectedComponent] {
        if self.do_track {
            self.motion.segments()
        } else {
            &[]
        }
    }

    pub fn color_tracker(&self) -> &ColorTracker {
        &self.color
    }

    pub fn motion_tracker(&self) -> &MotionTracker {
        &self.motion
    }

    pub fn frame_number(&self) -> usize {
        self.frame_number
    }

    pub fn shape(&self) -> Option<FrameShape> {
        self.shape
    }
}
