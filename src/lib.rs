pub mod camshift;
pub mod color;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod error;
pub mod feature;
pub mod flow;
pub mod focus;
pub mod frame;
pub mod geometry;
pub mod image;
pub mod motion;
pub mod my_types;
pub mod optical_flow;
pub mod pipeline;
pub mod pyramid;
pub mod visualization;
