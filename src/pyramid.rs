use crate::image::Image;

const NAIVE_DOWNSCALE: bool = false;

#[derive(Debug)]
pub struct Pyramid {
    pub levels: Vec<Image>,
    pub parent_size: [usize; 2],
}

impl Pyramid {
    pub fn empty() -> Self {
        Self {
            levels: vec![],
            parent_size: [0; 2],
        }
    }

    pub fn compute(&mut self, frame: &Image, level_count: usize) {
        self.compute_levels(frame, level_count);
        self.parent_size = [frame.width, frame.height];
    }

    fn compute_levels(&mut self, frame: &Image, level_count: usize) {
        self.levels.truncate(level_count);
        while self.levels.len() < level_count {
            self.levels.push(Image::empty())
        }
        if level_count == 0 {
            return;
        }
        downscale(frame, &mut self.levels[0]);
        for i in 0..(level_count - 1) {
            let rest = &mut self.levels[i..];
            if let Some((parent, rest)) = rest.split_first_mut() {
                downscale(parent, &mut rest[0]);
            }
        }
    }
}

/// Downscale the parent image by two into child. Odd sizes round up and the
/// last row/column is replicated.
fn downscale(parent: &Image, child: &mut Image) {
    let w = parent.width as i32;
    let h = parent.height as i32;

    let w_half = (w + 1) / 2;
    let h_half = (h + 1) / 2;
    child.data.clear();
    child.width = w_half as usize;
    child.height = h_half as usize;
    if w == 0 || h == 0 {
        return;
    }

    let v = |x: i32, y: i32| -> u16 { parent.value_clamped(x, y) as u16 };

    for y in 0..h_half {
        let y2 = 2 * y;
        for x in 0..w_half {
            let x2 = 2 * x;
            let value = if NAIVE_DOWNSCALE {
                (v(x2, y2) + v(x2 + 1, y2) + v(x2, y2 + 1) + v(x2 + 1, y2 + 1)) / 4
            } else {
                (4 * v(x2, y2)
                    + 2 * (v(x2 + 1, y2) + v(x2 - 1, y2) + v(x2, y2 + 1) + v(x2, y2 - 1))
                    + (v(x2 + 1, y2 + 1)
                        + v(x2 - 1, y2 - 1)
                        + v(x2 - 1, y2 + 1)
                        + v(x2 + 1, y2 - 1))
                    + 8)
                    / 16
            };
            child.data.push(value as u8);
        }
    }
}
