use nalgebra as na;

use crate::config::FlowConfig;
use crate::frame::PyramidFrame;
use crate::image::*;
use crate::my_types::*;

type Range = [[i16; 2]; 2];

/// Pyramidal Lucas-Kanade tracker for single points. The gradient and
/// difference buffers are kept between calls.
pub struct OpticalFlow {
    lk_iters: usize,
    lk_levels: usize,
    lk_win_size: usize,
    lk_term: f64,
    lk_min_eig: f64,
    ix: Matrixd,
    iy: Matrixd,
    it: Matrixd,
    grid: Matrixd,
}

impl OpticalFlow {
    pub fn new(config: &FlowConfig) -> OpticalFlow {
        let lk_win_size = config.window_size;
        OpticalFlow {
            lk_iters: config.lk_iterations,
            lk_levels: config.pyramid_levels,
            lk_win_size,
            lk_term: config.lk_epsilon,
            lk_min_eig: config.lk_min_eigenvalue,
            ix: na::DMatrix::zeros(lk_win_size, lk_win_size),
            iy: na::DMatrix::zeros(lk_win_size, lk_win_size),
            it: na::DMatrix::zeros(lk_win_size, lk_win_size),
            grid: na::DMatrix::zeros(lk_win_size, lk_win_size),
        }
    }

    pub fn levels(&self) -> usize {
        self.lk_levels
    }

    /// Follow `point0` from `pyramid_frame0` into `pyramid_frame1`. Returns
    /// `None` when the point leaves the image or its neighbourhood is too
    /// flat to track.
    ///
    /// ref http://robots.stanford.edu/cs223b04/algo_tracking.pdf
    pub fn process_point(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        point0: Vector2d,
    ) -> Option<Vector2d> {
        let lk_term2 = self.lk_term.powi(2);
        let r = (self.lk_win_size - 1) / 2;
        let levels = self
            .lk_levels
            .min(pyramid_frame0.level_count())
            .min(pyramid_frame1.level_count());

        let mut g = Vector2d::zeros();
        let mut d = Vector2d::zeros();
        for level in (0..levels + 1).rev() {
            let level0 = pyramid_frame0.get_image_at_level(level);
            let level1 = pyramid_frame1.get_image_at_level(level);
            let u = point0 / u32::pow(2, level as u32) as f64;
            let range = integration_range(level0, u, r, 1)?;
            // compute the derivative
            scharr(level0, u, range, &mut self.ix, &mut self.iy, &mut self.grid);
            let gradient = spatial_gradient(&self.ix, &self.iy);
            if gradient.symmetric_eigenvalues().min() < self.lk_min_eig {
                return None;
            }
            let mut nu = Vector2d::zeros();
            for _ in 0..self.lk_iters {
                image_difference(range, r, &self.grid, &mut self.it, level1, u + g + nu)?;
                let eta = flow_vector(&gradient, &self.ix, &self.iy, &self.it)?;
                nu += eta;
                if eta.norm_squared() < lk_term2 {
                    break;
                }
            }

            d = nu;
            if level > 0 {
                g = 2. * (g + d)
            }
        }

        let point1 = point0 + g + d;
        let image1 = &pyramid_frame1.image;
        if !point1.x.is_finite()
            || !point1.y.is_finite()
            || point1.x < 0.
            || point1.y < 0.
            || point1.x > (image1.width - 1) as f64
            || point1.y > (image1.height - 1) as f64
        {
            return None;
        }
        Some(point1)
    }
}

fn flow_vector(gradient: &Matrix2d, ix: &Matrixd, iy: &Matrixd, it: &Matrixd) -> Option<Vector2d> {
    let mut b = Vector2d::zeros();

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            b[0] += it[(y, x)] * ix[(y, x)];
            b[1] += it[(y, x)] * iy[(y, x)];
        }
    }

    gradient.try_inverse().map(|inv_g| inv_g * b)
}

/// `i0` is the padded grid of the first image, the difference is taken on its
/// interior so it lines up with the derivative windows.
fn image_difference(
    prev_range: Range,
    r: usize,
    i0: &Matrixd,
    it: &mut Matrixd,
    level: &Image,
    center: Vector2d,
) -> Option<()> {
    let range = integration_range(level, center, r, 0)?;
    let range = shrink_to(range, prev_range)?;
    fill_grid(level, range, center, it);
    *it *= -1.;
    *it += i0.view((1, 1), (it.nrows(), it.ncols()));
    Some(())
}

/// The window in the second image must cover the same offsets as the one in
/// the first image, otherwise the point has run into the border.
fn shrink_to(range: Range, prev_range: Range) -> Option<Range> {
    for i in 0..2 {
        if range[i][0] > prev_range[i][0] || range[i][1] < prev_range[i][1] {
            return None;
        }
    }
    Some(prev_range)
}

fn spatial_gradient(ix: &Matrixd, iy: &Matrixd) -> Matrix2d {
    debug_assert_eq!(ix.nrows(), iy.nrows());
    debug_assert_eq!(ix.ncols(), iy.ncols());

    let mut x2 = 0.;
    let mut y2 = 0.;
    let mut xy = 0.;

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            x2 += ix[(y, x)] * ix[(y, x)];
            y2 += iy[(y, x)] * iy[(y, x)];
            xy += ix[(y, x)] * iy[(y, x)];
        }
    }

    Matrix2d::new(x2, xy, xy, y2)
}

/// ref https://theailearner.com/tag/scharr-operator/
fn scharr(
    level: &Image,
    center: Vector2d,
    range: Range,
    out_x: &mut Matrixd,
    out_y: &mut Matrixd,
    grid: &mut Matrixd,
) {
    let grange = [
        [range[0][0] - 1, range[0][1] + 1],
        [range[1][0] - 1, range[1][1] + 1],
    ];
    fill_grid(level, grange, center, grid);

    *out_x = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    *out_y = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    for y in 1..(grid.nrows() - 1) {
        for x in 1..(grid.ncols() - 1) {
            out_x[(y - 1, x - 1)] =
                (10. * grid[(y, x + 1)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y - 1, x + 1)]
                    - 10. * grid[(y, x - 1)]
                    - 3. * grid[(y + 1, x - 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
            out_y[(y - 1, x - 1)] =
                (10. * grid[(y + 1, x)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y + 1, x - 1)]
                    - 10. * grid[(y - 1, x)]
                    - 3. * grid[(y - 1, x + 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
        }
    }
}

fn fill_grid(level: &Image, range: Range, center: Vector2d, grid: &mut Matrixd) {
    let rows = (range[1][1] - range[1][0] + 1) as usize;
    let cols = (range[0][1] - range[0][0] + 1) as usize;
    if grid.nrows() != rows || grid.ncols() != cols {
        *grid = na::DMatrix::zeros(rows, cols);
    }

    for (y_ind, y) in (range[1][0]..=range[1][1]).enumerate() {
        for (x_ind, x) in (range[0][0]..=range[0][1]).enumerate() {
            grid[(y_ind, x_ind)] = bilinear(level, center + Vector2d::new(x as f64, y as f64));
        }
    }
}

/// Returns closed range of integer steps that can be taken without going outside
/// the image borders. Returns None if the center point is outside the level
/// boundaries.
fn integration_range(level: &Image, center: Vector2d, r: usize, padding: i16) -> Option<Range> {
    let r = r as i16;
    let mut range = [[0, 0], [0, 0]];
    for i in 0..2 {
        let s = if i == 0 { level.width } else { level.height };
        if !center[i].is_finite() || center[i] < 0. || center[i] > (s as f64 - 1.) {
            return None;
        }
        let n = center[i] as i16;
        let fract = if center[i].fract() > 0. { 1 } else { 0 };
        range[i] = [
            i16::max(-r, -n + padding),
            i16::min(r, s as i16 - n - padding - 1 - fract),
        ];
        if range[i][0] > range[i][1] {
            return None;
        }
    }
    Some(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pyramid_frame(image: &Image, lk_levels: usize) -> PyramidFrame {
        let mut frame = PyramidFrame::empty();
        frame.compute(image, lk_levels);
        frame
    }

    fn textured(width: usize, height: usize, dx: f64, dy: f64) -> Image {
        let mut image = Image::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let (fx, fy) = (x as f64 - dx, y as f64 - dy);
                let v = 128. + 50. * (fx / 7.).sin() * (fy / 9.).cos() + 30. * ((fx + fy) / 13.).sin();
                image.set_value(x, y, v.round() as u8);
            }
        }
        image
    }

    #[test]
    fn test_flow() {
        let config = FlowConfig::default();
        let (dx, dy) = (3., -2.);
        let image0 = textured(128, 128, 0., 0.);
        let image1 = textured(128, 128, dx, dy);

        let pyramid_frame0 = make_pyramid_frame(&image0, config.pyramid_levels);
        let pyramid_frame1 = make_pyramid_frame(&image1, config.pyramid_levels);

        let mut flow = OpticalFlow::new(&config);
        for point0 in [Vector2d::new(64., 64.), Vector2d::new(40.5, 80.25)] {
            let point1 = flow
                .process_point(&pyramid_frame0, &pyramid_frame1, point0)
                .expect("textured point should be tracked");
            let err = (point1 - point0) - Vector2d::new(dx, dy);
            assert!(err.norm() < 0.5, "optical flow err {}", err.norm());
        }
    }

    #[test]
    fn test_flat_region_fails() {
        let config = FlowConfig::default();
        let image = Image {
            data: vec![77; 64 * 64],
            width: 64,
            height: 64,
        };
        let frame = make_pyramid_frame(&image, config.pyramid_levels);
        let mut flow = OpticalFlow::new(&config);
        assert!(flow.process_point(&frame, &frame, Vector2d::new(32., 32.)).is_none());
    }

    #[test]
    fn test_scharr() {
        let mut image = Image {
            data: vec![
                0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            ],
            width: 5,
            height: 5,
        };

        let mut out_x = na::dmatrix!();
        let mut out_y = na::dmatrix!();
        let mut grid = na::dmatrix!();

        let center = Vector2d::new(2.0, 2.0);
        let range = integration_range(&image, center, 1, 1).unwrap();
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        assert_eq!(out_x, na::DMatrix::zeros(3, 3));
        assert_eq!(out_y, na::DMatrix::zeros(3, 3));

        image.data = vec![
            0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4,
        ];
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        assert_eq!(out_x, na::DMatrix::repeat(3, 3, 1.));
        assert_eq!(out_y, na::DMatrix::zeros(3, 3));

        image.data = vec![
            0, 1, 2, 3, 4, 1, 2, 3, 4, 5, 2, 3, 4, 5, 6, 3, 4, 5, 6, 7, 4, 5, 6, 7, 8,
        ];
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        assert_eq!(out_x, na::DMatrix::repeat(3, 3, 1.));
        assert_eq!(out_y, na::DMatrix::repeat(3, 3, 1.));

        image.data = vec![
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
        ];
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        let answer_x = na::dmatrix!(
            2.5, 0., -2.5;
            2.5, 0., -2.5;
            2.5, 0., -2.5;
        );
        assert_eq!(out_x, answer_x);
        assert_eq!(out_y, na::DMatrix::zeros(3, 3));
    }

    #[test]
    fn test_integration_range() {
        // Width and height are pixels. Coordinate (0, 0) means center of top-left
        // pixel. Thus (9, 9) is the center of the bottom-right pixel for 10x10
        // image.
        let image = Image {
            data: vec![],
            width: 10,
            height: 10,
        };
        assert_eq!(integration_range(&image, Vector2d::new(4.5, 4.5), 3, 0).unwrap(), [[-3, 3], [-3, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(1.5, 2.5), 3, 0).unwrap(), [[-1, 3], [-2, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(1.0, 2.0), 3, 0).unwrap(), [[-1, 3], [-2, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(0.9, 1.9), 3, 0).unwrap(), [[0, 3], [-1, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(0.9, 1.9), 3, 1).unwrap(), [[1, 3], [0, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(8.5, 2.0), 3, 0).unwrap(), [[-3, 0], [-2, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(9.5, 2.0), 3, 0), None);
    }
}
