use log::{debug, info};

use crate::config::FlowConfig;
use crate::detector::Detector;
use crate::error::{Result, TrackError};
use crate::feature::FeaturePoint;
use crate::frame::PyramidFrame;
use crate::image::{FrameShape, Image};
use crate::my_types::*;
use crate::optical_flow::OpticalFlow;

/// Keeps a bounded set of feature points alive across consecutive grayscale
/// frames. Points are only ever dropped between two calls to `initialize`.
///
/// Point lists and pyramids are double buffered: slot `current` holds the
/// live state, the other slot is scratch for the next `advance`, and the
/// two swap roles by flipping `current`.
pub struct FeatureTracker {
    detector: Detector,
    optical_flow: OpticalFlow,
    max_points: usize,
    points: [Vec<FeaturePoint>; 2],
    pyramids: [PyramidFrame; 2],
    current: usize,
    // the pyramid in slot `current` was built from the last `curr` frame
    pyramid_ready: bool,
    shape: Option<FrameShape>,
    status: Vec<bool>,
    corners: Vec<Vector2d>,
}

impl FeatureTracker {
    pub fn new(config: &FlowConfig) -> Self {
        FeatureTracker {
            detector: Detector::new(config),
            optical_flow: OpticalFlow::new(config),
            max_points: config.max_points,
            points: [
                Vec::with_capacity(config.max_points),
                Vec::with_capacity(config.max_points),
            ],
            pyramids: [PyramidFrame::empty(), PyramidFrame::empty()],
            current: 0,
            pyramid_ready: false,
            shape: None,
            status: Vec::with_capacity(config.max_points),
            corners: vec![],
        }
    }

    /// Replace the live set with up to `max_points` corners detected on `frame`.
    /// The first frame fixes the session size.
    pub fn initialize(&mut self, frame: &Image) -> Result<usize> {
        self.check_shape(frame)?;
        self.detector.detect(frame, self.max_points, &mut self.corners);
        let live = &mut self.points[self.current];
        live.clear();
        live.extend(self.corners.iter().map(|&p| FeaturePoint::detected(p)));
        self.status.clear();
        self.pyramid_ready = false;
        info!("detected {} feature points", live.len());
        Ok(live.len())
    }

    /// Drop all points and take frames of `shape` from now on.
    pub fn resize(&mut self, shape: FrameShape) {
        self.clear();
        self.shape = Some(FrameShape { channels: 1, ..shape });
    }

    fn check_shape(&mut self, image: &Image) -> Result<()> {
        let found = gray_shape(image);
        match self.shape {
            None => self.shape = Some(found),
            Some(expected) if expected != found => {
                return Err(TrackError::DimensionMismatch { expected, found })
            }
            _ => {}
        }
        Ok(())
    }

    /// Follow every live point from `prev` into `curr`, dropping the ones the
    /// flow lost. Returns one success flag per point that was live before the
    /// call. With no live points this does nothing.
    ///
    /// The pyramid of `curr` is kept and reused when the next call passes the
    /// same pixels as `prev`.
    pub fn advance(&mut self, prev: &Image, curr: &Image) -> Result<&[bool]> {
        self.check_shape(prev)?;
        self.check_shape(curr)?;
        self.status.clear();
        if self.points[self.current].is_empty() {
            return Ok(&self.status);
        }

        let levels = self.optical_flow.levels();
        let (cur, next) = (self.current, 1 - self.current);
        let prev_pyramid_stale = !self.pyramid_ready || self.pyramids[cur].image != *prev;
        if prev_pyramid_stale {
            self.pyramids[cur].compute(prev, levels);
        }
        self.pyramids[next].compute(curr, levels);

        let [points0, points1] = &mut self.points;
        let (from, to) = if cur == 0 {
            (&*points0, points1)
        } else {
            (&*points1, points0)
        };
        to.clear();
        let [pyramid0, pyramid1] = &self.pyramids;
        let (pyramid_from, pyramid_to) = if cur == 0 {
            (pyramid0, pyramid1)
        } else {
            (pyramid1, pyramid0)
        };
        for feature in from.iter() {
            let tracked = self
                .optical_flow
                .process_point(pyramid_from, pyramid_to, feature.point);
            self.status.push(tracked.is_some());
            if let Some(point) = tracked {
                to.push(FeaturePoint {
                    point,
                    tracked: true,
                });
            }
        }

        debug!(
            "optical flow kept {} of {} points",
            to.len(),
            self.status.len()
        );
        self.current = next;
        self.pyramid_ready = true;
        Ok(&self.status)
    }

    pub fn count(&self) -> usize {
        self.points[self.current].len()
    }

    pub fn points(&self) -> &[FeaturePoint] {
        &self.points[self.current]
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn clear(&mut self) {
        self.points[self.current].clear();
        self.status.clear();
        self.pyramid_ready = false;
    }
}

fn gray_shape(image: &Image) -> FrameShape {
    FrameShape {
        width: image.width,
        height: image.height,
        channels: 1,
    }
}
