use std::fmt;

use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::my_types::*;

/// Row-major single channel image storage
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T = u8> {
    pub data: Vec<T>,
    pub width: usize,
    pub height: usize,
}

impl<T: Copy + Zero> Image<T> {
    /// Create an empty image
    pub fn empty() -> Image<T> {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Create a zero filled image
    pub fn new(width: usize, height: usize) -> Image<T> {
        Image {
            data: vec![T::zero(); width * height],
            width,
            height,
        }
    }

    /// Clear the image storage
    pub fn clear(&mut self) {
        self.data.clear();
        self.width = 0;
        self.height = 0;
    }

    /// Drop the old contents and zero fill to the requested size, reusing the allocation
    pub fn reallocate(&mut self, width: usize, height: usize) {
        self.data.clear();
        self.data.resize(width * height, T::zero());
        self.width = width;
        self.height = height;
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    #[inline(always)]
    pub fn value_i32(&self, x: i32, y: i32) -> T {
        self.data[y as usize * self.width + x as usize]
    }

    /// Sample with coordinates clamped to the border
    #[inline(always)]
    pub fn value_clamped(&self, x: i32, y: i32) -> T {
        let x = x.clamp(0, self.width as i32 - 1);
        let y = y.clamp(0, self.height as i32 - 1);
        self.value_i32(x, y)
    }

    #[inline(always)]
    pub fn set_value(&mut self, x: usize, y: usize, value: T) {
        self.data[y * self.width + x] = value;
    }
}

/// Bilinear interpolation, coordinates outside the image are clamped to the border.
pub fn bilinear(image: &Image, point: Vector2d) -> f64 {
    let x0 = point.x.floor();
    let y0 = point.y.floor();
    let ax = point.x - x0;
    let ay = point.y - y0;
    let (x0, y0) = (x0 as i32, y0 as i32);

    let v00 = image.value_clamped(x0, y0) as f64;
    let v10 = image.value_clamped(x0 + 1, y0) as f64;
    let v01 = image.value_clamped(x0, y0 + 1) as f64;
    let v11 = image.value_clamped(x0 + 1, y0 + 1) as f64;

    (1. - ay) * ((1. - ax) * v00 + ax * v10) + ay * ((1. - ax) * v01 + ax * v11)
}

/// Where row 0 of a frame lives on screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    #[default]
    TopLeft,
    BottomLeft,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameShape {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl FrameShape {
    pub fn area(&self) -> f64 {
        (self.width * self.height) as f64
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Interleaved 8-bit frame as delivered by the acquisition side, either
/// grayscale or RGB.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub origin: Origin,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: usize,
        height: usize,
        channels: usize,
        origin: Origin,
    ) -> Result<Frame> {
        if channels != 1 && channels != 3 {
            return Err(TrackError::UnsupportedChannels(channels));
        }
        let shape = FrameShape {
            width,
            height,
            channels,
        };
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(TrackError::InvalidFrame {
                shape,
                len: data.len(),
                expected,
            });
        }
        Ok(Frame {
            data,
            width,
            height,
            channels,
            origin,
        })
    }

    pub fn gray(data: Vec<u8>, width: usize, height: usize) -> Result<Frame> {
        Frame::new(data, width, height, 1, Origin::TopLeft)
    }

    pub fn rgb(data: Vec<u8>, width: usize, height: usize) -> Result<Frame> {
        Frame::new(data, width, height, 3, Origin::TopLeft)
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape {
            width: self.width,
            height: self.height,
            channels: self.channels,
        }
    }

    #[inline(always)]
    pub fn rgb_at(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * self.channels;
        if self.channels == 1 {
            [self.data[i]; 3]
        } else {
            [self.data[i], self.data[i + 1], self.data[i + 2]]
        }
    }

    /// Convert to grayscale into `out`, reusing its buffer.
    pub fn to_gray_into(&self, out: &mut Image) {
        out.data.clear();
        out.width = self.width;
        out.height = self.height;
        if self.channels == 1 {
            out.data.extend_from_slice(&self.data);
            return;
        }
        out.data.extend(self.data.chunks_exact(3).map(|p| {
            let (r, g, b) = (p[0] as u32, p[1] as u32, p[2] as u32);
            ((r * 299 + g * 587 + b * 114 + 500) / 1000) as u8
        }));
    }

    pub fn to_gray(&self) -> Image {
        let mut out = Image::empty();
        self.to_gray_into(&mut out);
        out
    }
}
