use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};

/// Options for the whole tracking core. Passed by reference into every
/// component, nothing is read from globals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, clap::Args)]
#[serde(default)]
pub struct TrackerConfig {
    #[clap(flatten)]
    pub flow: FlowConfig,
    #[clap(flatten)]
    pub motion: MotionConfig,
    #[clap(flatten)]
    pub color: ColorConfig,
    #[clap(flatten)]
    pub focus: FocusConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, clap::Args)]
#[serde(default)]
pub struct FlowConfig {
    /// Upper bound on tracked feature points
    #[clap(long, default_value = "500")]
    pub max_points: usize,

    /// Side of the optical flow and sub-pixel search window
    #[clap(long, default_value = "5")]
    pub window_size: usize,

    #[clap(long, default_value = "3")]
    pub pyramid_levels: usize,

    #[clap(long, default_value = "20")]
    pub lk_iterations: usize,

    #[clap(long, default_value = "0.03")]
    pub lk_epsilon: f64,

    /// Smallest accepted eigenvalue of the flow gradient matrix
    #[clap(long, default_value = "0.0001")]
    pub lk_min_eigenvalue: f64,

    /// Corner strength relative to the strongest corner
    #[clap(long, default_value = "0.01")]
    pub quality_level: f64,

    /// Minimum distance between detected corners
    #[clap(long, default_value = "5")]
    pub min_distance: f64,

    #[clap(long, default_value = "3")]
    pub block_size: usize,

    /// Re-detect feature points every N frames, 0 only when none are left
    #[clap(long, default_value = "0")]
    pub feature_refresh_interval: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_points: 500,
            window_size: 5,
            pyramid_levels: 3,
            lk_iterations: 20,
            lk_epsilon: 0.03,
            lk_min_eigenvalue: 1e-4,
            quality_level: 0.01,
            min_distance: 5.,
            block_size: 3,
            feature_refresh_interval: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, clap::Args)]
#[serde(default)]
pub struct MotionConfig {
    /// Number of frames kept in the difference ring buffer
    #[clap(long, default_value = "4")]
    pub ring_depth: usize,

    /// Seconds a motion stamp stays alive in the history image
    #[clap(long, default_value = "1.0")]
    pub mhi_duration: f64,

    /// Largest stamp gap between neighbours of one motion segment
    #[clap(long, default_value = "0.5")]
    pub max_time_delta: f64,

    /// Stamps this close to the current time seed a segment
    #[clap(long, default_value = "0.05")]
    pub min_time_delta: f64,

    /// Absolute gray level difference counted as motion
    #[clap(long, default_value = "30")]
    pub diff_threshold: u8,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            ring_depth: 4,
            mhi_duration: 1.,
            max_time_delta: 0.5,
            min_time_delta: 0.05,
            diff_threshold: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, clap::Args)]
#[serde(default)]
pub struct ColorConfig {
    #[clap(long, default_value = "16")]
    pub hue_bins: usize,

    #[clap(long, default_value = "30")]
    pub smin: i32,

    #[clap(long, default_value = "10")]
    pub vmin: i32,

    #[clap(long, default_value = "256")]
    pub vmax: i32,

    #[clap(long, default_value = "10")]
    pub meanshift_iterations: usize,

    #[clap(long, default_value = "1.0")]
    pub meanshift_epsilon: f64,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            hue_bins: 16,
            smin: 30,
            vmin: 10,
            vmax: 256,
            meanshift_iterations: 10,
            meanshift_epsilon: 1.,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode {
    /// Compare feature point density of the window and the motion segment
    Density,
    /// Overlap and area fractions only, no feature points needed
    Geometric,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, clap::Args)]
#[serde(default)]
pub struct FocusConfig {
    #[clap(long, value_enum, default_value = "density")]
    pub decision_mode: DecisionMode,

    /// Density mode: tracked window must cover more than this share of the frame
    #[clap(long, default_value = "0.6")]
    pub density_window_fraction: f64,

    /// Density mode: segment/window density ratio that counts as denser
    #[clap(long, default_value = "1.08")]
    pub density_ratio: f64,

    /// Density mode: segment/window point count ratio that counts as denser
    #[clap(long, default_value = "0.6")]
    pub count_ratio: f64,

    /// Density mode: overlap fraction below which the regions have drifted apart
    #[clap(long, default_value = "0.5")]
    pub density_max_overlap: f64,

    #[clap(long, default_value = "0.15")]
    pub geometric_component_overlap: f64,

    #[clap(long, default_value = "0.02")]
    pub geometric_component_fraction: f64,

    #[clap(long, default_value = "0.01")]
    pub geometric_intersection_fraction: f64,

    #[clap(long, default_value = "0.2")]
    pub geometric_window_fraction: f64,

    #[clap(long, default_value = "0.55")]
    pub geometric_window_overlap: f64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            decision_mode: DecisionMode::Density,
            density_window_fraction: 0.6,
            density_ratio: 1.08,
            count_ratio: 0.6,
            density_max_overlap: 0.5,
            geometric_component_overlap: 0.15,
            geometric_component_fraction: 0.02,
            geometric_intersection_fraction: 0.01,
            geometric_window_fraction: 0.2,
            geometric_window_overlap: 0.55,
        }
    }
}

fn invalid(msg: impl Into<String>) -> TrackError {
    TrackError::InvalidConfig(msg.into())
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        let flow = &self.flow;
        if flow.max_points == 0 {
            return Err(invalid("max_points must be positive"));
        }
        if flow.window_size == 0 || flow.window_size % 2 == 0 {
            return Err(invalid("window_size must be odd"));
        }
        if flow.block_size == 0 || flow.block_size % 2 == 0 {
            return Err(invalid("block_size must be odd"));
        }
        if flow.lk_iterations == 0 {
            return Err(invalid("lk_iterations must be positive"));
        }

        let motion = &self.motion;
        if motion.ring_depth < 2 {
            return Err(invalid("ring_depth must be at least 2"));
        }
        if motion.mhi_duration <= 0. || motion.max_time_delta <= 0. || motion.min_time_delta < 0. {
            return Err(invalid("motion history durations must be positive"));
        }
        if motion.min_time_delta > motion.max_time_delta {
            return Err(invalid("min_time_delta exceeds max_time_delta"));
        }

        let color = &self.color;
        if color.hue_bins == 0 || color.hue_bins > 180 {
            return Err(invalid("hue_bins must be in 1..=180"));
        }
        if color.meanshift_iterations == 0 {
            return Err(invalid("meanshift_iterations must be positive"));
        }
        Ok(())
    }
}
