//! Refocus decision: should color tracking drop its window and restart from
//! the selected motion component?
//!
//! The decision is memoryless, every call looks only at the regions and
//! feature points of the current frame.

use log::debug;
use serde::Serialize;

use crate::config::{DecisionMode, FocusConfig};
use crate::feature::FeaturePoint;
use crate::geometry::{ratio, Rect, Region};
use crate::image::FrameShape;
use crate::motion::ConnectedComponent;

/// Numbers the decision was taken from. Ratios whose denominator is empty
/// are `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DecisionMetrics {
    pub window_area: f64,
    pub component_area: f64,
    pub intersection_area: f64,
    /// share of the window covered by the intersection
    pub window_overlap: Option<f64>,
    /// share of the component covered by the intersection
    pub component_overlap: Option<f64>,
    /// window area over component area
    pub window_component_ratio: Option<f64>,
    /// component area over window area
    pub component_window_ratio: Option<f64>,
    pub window_frame_fraction: Option<f64>,
    pub component_frame_fraction: Option<f64>,
    pub intersection_frame_fraction: Option<f64>,
    pub window_points: usize,
    pub component_points: usize,
    pub window_density: Option<f64>,
    pub component_density: Option<f64>,
    /// component density over window density
    pub density_ratio: Option<f64>,
    /// component point count over window point count
    pub count_ratio: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Decision {
    pub refocus: bool,
    /// rectangle to reseed the color tracker with, set only on refocus
    pub seed: Option<Rect>,
    pub metrics: DecisionMetrics,
}

pub struct FocusEngine {
    config: FocusConfig,
}

impl FocusEngine {
    pub fn new(config: &FocusConfig) -> Self {
        FocusEngine {
            config: config.clone(),
        }
    }

    pub fn mode(&self) -> DecisionMode {
        self.config.decision_mode
    }

    pub fn set_mode(&mut self, mode: DecisionMode) {
        self.config.decision_mode = mode;
    }

    pub fn evaluate(
        &self,
        window: &Region,
        component: &ConnectedComponent,
        points: &[FeaturePoint],
        frame: FrameShape,
    ) -> Decision {
        let metrics = measure(window, &component.rect, points, frame);
        let refocus = match self.config.decision_mode {
            DecisionMode::Density => self.density_trigger(&metrics),
            DecisionMode::Geometric => self.geometric_trigger(&metrics),
        };
        debug!(
            "{:?} decision {refocus}: overlaps {:?}/{:?}, points {}/{}, window fraction {:?}",
            self.config.decision_mode,
            metrics.window_overlap,
            metrics.component_overlap,
            metrics.window_points,
            metrics.component_points,
            metrics.window_frame_fraction,
        );
        Decision {
            refocus,
            seed: refocus.then_some(component.rect),
            metrics,
        }
    }

    /// Large window, drifted apart from the component, and the component
    /// holds relatively more feature points.
    fn density_trigger(&self, m: &DecisionMetrics) -> bool {
        let c = &self.config;
        if m.window_points + m.component_points == 0 {
            return false;
        }
        let large_window = m
            .window_frame_fraction
            .map_or(false, |f| f > c.density_window_fraction);
        if !large_window {
            return false;
        }

        // cross multiplied so an empty window still compares
        let denser = match (m.component_density, m.window_density) {
            (Some(cd), Some(wd)) => cd > c.density_ratio * wd,
            _ => false,
        };
        let more_points = m.component_points as f64 > c.count_ratio * m.window_points as f64;

        let below = |o: Option<f64>| o.map_or(false, |o| o < c.density_max_overlap);
        let drifted = below(m.window_overlap) || below(m.component_overlap);

        (denser || more_points) && drifted
    }

    fn geometric_trigger(&self, m: &DecisionMetrics) -> bool {
        let c = &self.config;
        let above = |v: Option<f64>, t: f64| v.map_or(false, |v| v > t);
        let below = |v: Option<f64>, t: f64| v.map_or(false, |v| v < t);

        let separate_component = below(m.component_overlap, c.geometric_component_overlap)
            && above(m.component_frame_fraction, c.geometric_component_fraction);
        let sliding_window = above(
            m.intersection_frame_fraction,
            c.geometric_intersection_fraction,
        ) && above(m.window_frame_fraction, c.geometric_window_fraction)
            && below(m.window_overlap, c.geometric_window_overlap);

        separate_component || sliding_window
    }
}

/// Overlap, area fractions and point densities of the two regions.
pub fn measure(
    window: &Region,
    component: &Rect,
    points: &[FeaturePoint],
    frame: FrameShape,
) -> DecisionMetrics {
    let component_region = Region::Rect(*component);
    let window_area = window.area();
    let component_area = component.area();
    let intersection_area = window.intersection_area(&component_region);
    let frame_area = frame.area();

    let window_points = count_inside(window, points);
    let component_points = count_inside(&component_region, points);
    let window_density = ratio(window_points as f64, window_area);
    let component_density = ratio(component_points as f64, component_area);

    DecisionMetrics {
        window_area,
        component_area,
        intersection_area,
        window_overlap: ratio(intersection_area, window_area),
        component_overlap: ratio(intersection_area, component_area),
        window_component_ratio: ratio(window_area, component_area),
        component_window_ratio: ratio(component_area, window_area),
        window_frame_fraction: ratio(window_area, frame_area),
        component_frame_fraction: ratio(component_area, frame_area),
        intersection_frame_fraction: ratio(intersection_area, frame_area),
        window_points,
        component_points,
        window_density,
        component_density,
        density_ratio: component_density.zip(window_density).and_then(|(c, w)| ratio(c, w)),
        count_ratio: ratio(component_points as f64, window_points as f64),
    }
}

/// Number of feature points inside `region`.
pub fn count_inside(region: &Region, points: &[FeaturePoint]) -> usize {
    points.iter().filter(|p| region.contains(p.point)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RotatedBox;
    use crate::my_types::*;

    const FRAME: FrameShape = FrameShape {
        width: 200,
        height: 200,
        channels: 3,
    };

    fn component(rect: Rect) -> ConnectedComponent {
        ConnectedComponent {
            rect,
            area: rect.area(),
            label: 1,
        }
    }

    fn grid(rect: Rect, step: i32) -> Vec<FeaturePoint> {
        let mut points = vec![];
        for y in (rect.y..rect.bottom()).step_by(step as usize) {
            for x in (rect.x..rect.right()).step_by(step as usize) {
                points.push(FeaturePoint::detected(Vector2d::new(x as f64 + 0.5, y as f64 + 0.5)));
            }
        }
        points
    }

    fn geometric() -> FocusEngine {
        FocusEngine::new(&FocusConfig {
            decision_mode: DecisionMode::Geometric,
            ..FocusConfig::default()
        })
    }

    #[test]
    fn test_measure_fractions() {
        let window = Region::Rect(Rect::new(0, 0, 100, 100));
        let m = measure(&window, &Rect::new(50, 50, 100, 100), &grid(Rect::new(0, 0, 200, 200), 10), FRAME);
        assert_eq!(m.intersection_area, 2500.);
        assert_eq!(m.window_overlap, Some(0.25));
        assert_eq!(m.component_overlap, Some(0.25));
        assert_eq!(m.window_component_ratio, Some(1.));
        assert_eq!(m.window_frame_fraction, Some(0.25));
        assert_eq!(m.intersection_frame_fraction, Some(2500. / 40000.));
        assert_eq!(m.window_points, 100);
        assert_eq!(m.component_points, 100);
        assert_eq!(m.density_ratio, Some(1.));
        assert_eq!(m.count_ratio, Some(1.));
    }

    #[test]
    fn test_area_ratios() {
        let window = Region::Rect(Rect::new(0, 0, 100, 50));
        let m = measure(&window, &Rect::new(120, 0, 25, 40), &[], FRAME);
        assert_eq!(m.window_component_ratio, Some(5.));
        assert_eq!(m.component_window_ratio, Some(0.2));
        assert_eq!(m.intersection_area, 0.);

        let m = measure(&window, &Rect::new(120, 0, 0, 40), &[], FRAME);
        assert_eq!(m.window_component_ratio, None);
        assert_eq!(m.component_window_ratio, Some(0.));
    }

    #[test]
    fn test_rotated_window_density() {
        // a diamond: the square (50,50)-(150,150) turned by 45 degrees
        let window = Region::Box(RotatedBox {
            center: Vector2d::new(100., 100.),
            width: 100.,
            height: 100.,
            angle: 45.,
        });
        let corners = [(52., 52.), (148., 148.), (52., 148.), (148., 52.)];
        let mut points: Vec<_> = corners
            .iter()
            .map(|&(x, y)| FeaturePoint::detected(Vector2d::new(x, y)))
            .collect();
        points.push(FeaturePoint::detected(Vector2d::new(100., 100.)));

        let m = measure(&window, &Rect::new(0, 0, 10, 10), &points, FRAME);
        assert_eq!(m.window_points, 1);
        assert!((m.window_area - 10000.).abs() < 1e-6);
        assert_eq!(m.intersection_area, 0.);
        assert_eq!(m.component_overlap, Some(0.));
    }

    #[test]
    fn test_degenerate_window_has_no_ratios() {
        let window = Region::Box(RotatedBox {
            center: Vector2d::new(100., 100.),
            width: 0.,
            height: 40.,
            angle: 30.,
        });
        let points = grid(Rect::new(0, 0, 200, 200), 20);
        let m = measure(&window, &Rect::new(90, 90, 20, 20), &points, FRAME);
        assert_eq!(m.window_overlap, None);
        assert_eq!(m.window_density, None);
        assert_eq!(m.density_ratio, None);
        assert_eq!(m.window_frame_fraction, Some(0.));
        assert_eq!(m.window_points, 0);

        let engine = FocusEngine::new(&FocusConfig::default());
        let decision = engine.evaluate(&window, &component(Rect::new(90, 90, 20, 20)), &points, FRAME);
        assert!(!decision.refocus);
        assert_eq!(decision.seed, None);
    }

    #[test]
    fn test_density_needs_points() {
        let engine = FocusEngine::new(&FocusConfig {
            density_window_fraction: 0.5,
            ..FocusConfig::default()
        });
        let window = Region::Rect(Rect::new(0, 0, 150, 150));
        let decision = engine.evaluate(&window, &component(Rect::new(180, 180, 10, 10)), &[], FRAME);
        assert!(!decision.refocus);
        assert_eq!(decision.metrics.window_density, Some(0.));
        assert_eq!(decision.metrics.count_ratio, None);
        assert_eq!(decision.metrics.density_ratio, None);
    }

    #[test]
    fn test_density_requires_drift() {
        let engine = FocusEngine::new(&FocusConfig {
            density_window_fraction: 0.5,
            ..FocusConfig::default()
        });
        let window = Rect::new(0, 0, 160, 160);
        // component sits inside the window and is denser, but fully overlapped
        let inner = Rect::new(10, 10, 60, 60);
        let mut points = grid(window, 20);
        points.extend(grid(inner, 5));
        let decision = engine.evaluate(&Region::Rect(window), &component(inner), &points, FRAME);
        assert_eq!(decision.metrics.component_overlap, Some(1.));
        assert!(decision.metrics.window_overlap.unwrap() < 0.5);
        // window overlap alone is below the threshold
        assert!(decision.refocus);

        let engine = FocusEngine::new(&FocusConfig {
            density_window_fraction: 0.5,
            density_max_overlap: 0.1,
            ..FocusConfig::default()
        });
        let decision = engine.evaluate(&Region::Rect(window), &component(inner), &points, FRAME);
        assert!(!decision.refocus);
    }

    #[test]
    fn test_geometric_separate_component() {
        let window = Region::Rect(Rect::new(0, 0, 50, 50));
        let far = Rect::new(120, 120, 40, 40);
        let decision = geometric().evaluate(&window, &component(far), &[], FRAME);
        assert!(decision.refocus);
        assert_eq!(decision.seed, Some(far));
    }

    #[test]
    fn test_geometric_sliding_window() {
        let window = Region::Rect(Rect::new(0, 0, 100, 100));
        let shifted = Rect::new(60, 60, 100, 100);
        let decision = geometric().evaluate(&window, &component(shifted), &[], FRAME);
        assert_eq!(decision.metrics.component_overlap, Some(0.16));
        assert!(decision.refocus);

        // mostly covered window does not move
        let close = Rect::new(10, 10, 100, 100);
        let decision = geometric().evaluate(&window, &component(close), &[], FRAME);
        assert!(!decision.refocus);
    }
}
