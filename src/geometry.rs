//! Rectangles, oriented boxes and the overlap/containment routines shared by
//! the trackers and the refocus decision.
//!
//! Every polygon produced here is ordered top-left, top-right, bottom-right,
//! bottom-left in image coordinates (y pointing down), which gives a positive
//! shoelace area. Clipping relies on that ordering.

use serde::{Deserialize, Serialize};

use crate::my_types::*;

/// Areas at or below this are treated as empty when used as a divisor.
pub const AREA_EPSILON: f64 = 1e-9;

/// Axis aligned rectangle, width and height are never negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Rect {
        Rect {
            x,
            y,
            width: width.max(0),
            height: height.max(0),
        }
    }

    pub fn from_corners(x0: i32, y0: i32, x1: i32, y1: i32) -> Rect {
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn center(&self) -> Vector2d {
        Vector2d::new(
            self.x as f64 + self.width as f64 / 2.,
            self.y as f64 + self.height as f64 / 2.,
        )
    }

    /// Common part of two rectangles, empty (zero sized) when they do not overlap.
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return Rect::new(x0, y0, 0, 0);
        }
        Rect::from_corners(x0, y0, x1, y1)
    }

    pub fn clip(&self, width: usize, height: usize) -> Rect {
        self.intersection(&Rect::new(0, 0, width as i32, height as i32))
    }

    pub fn inflate(&self, d: i32) -> Rect {
        Rect::new(self.x - d, self.y - d, self.width + 2 * d, self.height + 2 * d)
    }

    /// Half open containment, a point on the right or bottom edge is outside.
    pub fn contains(&self, p: Vector2d) -> bool {
        p.x >= self.x as f64
            && p.y >= self.y as f64
            && p.x < self.right() as f64
            && p.y < self.bottom() as f64
    }

    pub fn vertices(&self) -> [Vector2d; 4] {
        let (x0, y0) = (self.x as f64, self.y as f64);
        let (x1, y1) = (self.right() as f64, self.bottom() as f64);
        [
            Vector2d::new(x0, y0),
            Vector2d::new(x1, y0),
            Vector2d::new(x1, y1),
            Vector2d::new(x0, y1),
        ]
    }
}

/// Oriented box, `angle` in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotatedBox {
    pub center: Vector2d,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl RotatedBox {
    pub fn from_rect(rect: &Rect) -> RotatedBox {
        RotatedBox {
            center: rect.center(),
            width: rect.width as f64,
            height: rect.height as f64,
            angle: 0.,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.) * self.height.max(0.)
    }

    pub fn vertices(&self) -> [Vector2d; 4] {
        let (sn, cs) = self.angle.to_radians().sin_cos();
        let hw = self.width.max(0.) / 2.;
        let hh = self.height.max(0.) / 2.;
        // a rotation keeps the winding of the unrotated corners
        [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)].map(|(dx, dy)| {
            self.center + Vector2d::new(dx * cs - dy * sn, dx * sn + dy * cs)
        })
    }

    /// Smallest integer rectangle containing the box.
    pub fn bounding_rect(&self) -> Rect {
        let v = self.vertices();
        let min_x = v.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = v.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = v.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = v.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        Rect::from_corners(
            min_x.floor() as i32,
            min_y.floor() as i32,
            max_x.ceil() as i32,
            max_y.ceil() as i32,
        )
    }
}

/// A tracked or segmented area, either shape goes through the same
/// intersection and containment code.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Region {
    Rect(Rect),
    Box(RotatedBox),
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::Rect(rect)
    }
}

impl From<RotatedBox> for Region {
    fn from(b: RotatedBox) -> Self {
        Region::Box(b)
    }
}

impl Region {
    pub fn vertices(&self) -> [Vector2d; 4] {
        match self {
            Region::Rect(r) => r.vertices(),
            Region::Box(b) => b.vertices(),
        }
    }

    pub fn area(&self) -> f64 {
        match self {
            Region::Rect(r) => r.area(),
            Region::Box(b) => b.area(),
        }
    }

    pub fn bounding_rect(&self) -> Rect {
        match self {
            Region::Rect(r) => *r,
            Region::Box(b) => b.bounding_rect(),
        }
    }

    pub fn contains(&self, p: Vector2d) -> bool {
        match self {
            Region::Rect(r) => r.contains(p),
            Region::Box(b) => b.area() > AREA_EPSILON && convex_contains(&b.vertices(), p),
        }
    }

    /// Area shared by two regions. Symmetric in its arguments.
    pub fn intersection_area(&self, other: &Region) -> f64 {
        match (self, other) {
            (Region::Rect(a), Region::Rect(b)) => a.intersection(b).area(),
            _ => {
                if self.area() <= AREA_EPSILON || other.area() <= AREA_EPSILON {
                    return 0.;
                }
                let clipped = clip_convex(&self.vertices(), &other.vertices());
                polygon_area(&clipped).max(0.)
            }
        }
    }
}

/// Area of the overlap of two regions.
pub fn overlap(a: &Region, b: &Region) -> f64 {
    a.intersection_area(b)
}

/// `numerator / denominator`, or `None` when the denominator is too small to
/// give a meaningful value.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if !denominator.is_finite() || denominator <= AREA_EPSILON || !numerator.is_finite() {
        return None;
    }
    Some(numerator / denominator)
}

/// Signed shoelace area, positive for the vertex ordering used in this module.
pub fn polygon_area(poly: &[Vector2d]) -> f64 {
    if poly.len() < 3 {
        return 0.;
    }
    let mut sum = 0.;
    for i in 0..poly.len() {
        let a = poly[i];
        let b = poly[(i + 1) % poly.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.
}

#[inline]
fn cross(a: Vector2d, b: Vector2d, p: Vector2d) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn convex_contains(poly: &[Vector2d], p: Vector2d) -> bool {
    (0..poly.len()).all(|i| cross(poly[i], poly[(i + 1) % poly.len()], p) >= 0.)
}

/// Sutherland-Hodgman clipping of `subject` by the convex `clipper`.
fn clip_convex(subject: &[Vector2d], clipper: &[Vector2d]) -> Vec<Vector2d> {
    let mut output: Vec<Vector2d> = subject.to_vec();
    let mut input = Vec::with_capacity(8);

    for i in 0..clipper.len() {
        if output.is_empty() {
            break;
        }
        let a = clipper[i];
        let b = clipper[(i + 1) % clipper.len()];
        std::mem::swap(&mut input, &mut output);
        output.clear();

        for j in 0..input.len() {
            let p = input[j];
            let q = input[(j + 1) % input.len()];
            let cp = cross(a, b, p);
            let cq = cross(a, b, q);
            if cp >= 0. {
                output.push(p);
            }
            if (cp >= 0.) != (cq >= 0.) {
                let t = cp / (cp - cq);
                output.push(p + (q - p) * t);
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_clamps_negative_size() {
        let r = Rect::new(3, 4, -5, 2);
        assert_eq!(r.width, 0);
        assert_eq!(r.area(), 0.);
        assert!(r.is_empty());
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersection(&b), Rect::new(5, 5, 5, 5));
        assert!(a.intersection(&Rect::new(10, 0, 4, 4)).is_empty());
        assert_eq!(Rect::new(-5, -5, 10, 10).clip(4, 4), Rect::new(0, 0, 4, 4));
    }

    #[test]
    fn test_vertices_have_positive_area() {
        let rect = Rect::new(180, 180, 10, 10);
        assert_eq!(polygon_area(&rect.vertices()), 100.);

        for angle in [0., 30., 90., 135., -45.] {
            let b = RotatedBox {
                center: Vector2d::new(50., 40.),
                width: 20.,
                height: 10.,
                angle,
            };
            assert!((polygon_area(&b.vertices()) - 200.).abs() < 1e-9);
        }
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let rects = [
            Rect::new(0, 0, 100, 100),
            Rect::new(50, 20, 30, 200),
            Rect::new(180, 180, 10, 10),
            Rect::new(0, 0, 0, 10),
        ];
        for a in &rects {
            for b in &rects {
                let (ra, rb) = (Region::Rect(*a), Region::Rect(*b));
                assert_eq!(overlap(&ra, &rb), overlap(&rb, &ra));
            }
        }

        let b = Region::Box(RotatedBox {
            center: Vector2d::new(50., 50.),
            width: 60.,
            height: 30.,
            angle: 25.,
        });
        for a in &rects {
            let ra = Region::Rect(*a);
            assert!((overlap(&ra, &b) - overlap(&b, &ra)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_box_rect_overlap() {
        let axis = Region::Box(RotatedBox::from_rect(&Rect::new(0, 0, 10, 10)));
        let r = Region::Rect(Rect::new(5, 5, 10, 10));
        assert!((axis.intersection_area(&r) - 25.).abs() < 1e-9);

        // a square rotated by 45 degrees inside a large rect keeps its area
        let diamond = Region::Box(RotatedBox {
            center: Vector2d::new(50., 50.),
            width: 10.,
            height: 10.,
            angle: 45.,
        });
        let big = Region::Rect(Rect::new(0, 0, 100, 100));
        assert!((diamond.intersection_area(&big) - 100.).abs() < 1e-9);

        // disjoint
        let far = Region::Rect(Rect::new(90, 90, 5, 5));
        assert_eq!(diamond.intersection_area(&far), 0.);
    }

    #[test]
    fn test_region_contains() {
        let r = Region::Rect(Rect::new(0, 0, 10, 10));
        assert!(r.contains(Vector2d::new(0., 0.)));
        assert!(!r.contains(Vector2d::new(10., 5.)));

        let b = Region::Box(RotatedBox {
            center: Vector2d::new(0., 0.),
            width: 10.,
            height: 2.,
            angle: 90.,
        });
        assert!(b.contains(Vector2d::new(0., 4.)));
        assert!(!b.contains(Vector2d::new(4., 0.)));
    }

    #[test]
    fn test_ratio_guards_degenerate_divisor() {
        assert_eq!(ratio(1., 0.), None);
        assert_eq!(ratio(1., f64::NAN), None);
        assert_eq!(ratio(0., 4.), Some(0.));
    }

    #[test]
    fn test_bounding_rect() {
        let b = RotatedBox {
            center: Vector2d::new(10., 10.),
            width: 4.,
            height: 2.,
            angle: 90.,
        };
        assert_eq!(b.bounding_rect(), Rect::new(9, 8, 2, 4));
    }
}
