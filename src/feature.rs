use serde::{Deserialize, Serialize};

use crate::my_types::*;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeaturePoint {
    pub point: Vector2d,
    /// Whether optical flow followed the point into the current frame. Freshly
    /// detected points have not been tracked yet.
    pub tracked: bool,
}

impl FeaturePoint {
    pub fn detected(point: Vector2d) -> Self {
        FeaturePoint {
            point,
            tracked: false,
        }
    }
}
