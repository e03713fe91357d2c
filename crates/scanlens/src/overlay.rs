//! Overlay tracker - the most recent detection batch, for tap hit-testing.
//!
//! Purely derived state: each non-empty batch replaces the previous one
//! wholesale, and nothing here touches the capture lifecycle.

use std::sync::Arc;

use crate::types::{Detection, Point};

/// Pick the detection a tap at `point` refers to.
///
/// A detection whose bounds contain the point wins; otherwise the one whose
/// center is nearest (squared Euclidean distance). Ties go to the earlier
/// detection in batch order.
pub fn hit_test(batch: &[Detection], point: Point) -> Option<&Detection> {
    if let Some(hit) = batch.iter().find(|d| d.bounds.contains(point)) {
        return Some(hit);
    }

    let mut best: Option<(&Detection, f32)> = None;
    for detection in batch {
        let distance = detection.bounds.center_distance_sq(point);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((detection, distance)),
        }
    }
    best.map(|(d, _)| d)
}

/// Maps a raw screen position into frame coordinates.
///
/// `origin` is the overlay's on-screen position, the scale factors are
/// overlay size over frame size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayTransform {
    pub origin: Point,
    pub width_scale: f32,
    pub height_scale: f32,
}

impl Default for OverlayTransform {
    fn default() -> Self {
        Self {
            origin: Point::default(),
            width_scale: 1.0,
            height_scale: 1.0,
        }
    }
}

impl OverlayTransform {
    pub fn to_frame(&self, raw: Point) -> Point {
        let sx = if self.width_scale == 0.0 { 1.0 } else { self.width_scale };
        let sy = if self.height_scale == 0.0 { 1.0 } else { self.height_scale };
        Point::new((raw.x - self.origin.x) / sx, (raw.y - self.origin.y) / sy)
    }
}

/// Holds the latest detection batch
#[derive(Debug, Clone)]
pub struct OverlayTracker {
    batch: Arc<[Detection]>,
    generation: u64,
}

impl Default for OverlayTracker {
    fn default() -> Self {
        Self {
            batch: Arc::from(Vec::new()),
            generation: 0,
        }
    }
}

impl OverlayTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held batch. Empty batches are ignored.
    pub fn replace(&mut self, batch: Vec<Detection>) -> bool {
        if batch.is_empty() {
            return false;
        }
        self.batch = batch.into();
        self.generation += 1;
        true
    }

    pub fn clear(&mut self) {
        if !self.batch.is_empty() {
            self.batch = Arc::from(Vec::new());
            self.generation += 1;
        }
    }

    /// Shared handle to the current batch
    pub fn current(&self) -> Arc<[Detection]> {
        Arc::clone(&self.batch)
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Bumped on every replace/clear
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn hit_test(&self, point: Point) -> Option<Detection> {
        hit_test(&self.batch, point).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Rect, Symbology};

    fn det(value: &str, l: f32, t: f32, r: f32, b: f32) -> Detection {
        Detection::new(value, Symbology::QrCode, Rect::new(l, t, r, b))
    }

    fn two_regions() -> Vec<Detection> {
        vec![
            det("first", 0.0, 0.0, 10.0, 10.0),
            det("second", 50.0, 50.0, 60.0, 60.0),
        ]
    }

    #[test]
    fn test_hit_prefers_containing_region() {
        let batch = two_regions();
        let hit = hit_test(&batch, Point::new(5.0, 5.0)).unwrap();
        assert_eq!(hit.raw_value(), Some("first"));
    }

    #[test]
    fn test_hit_falls_back_to_nearest_center() {
        let batch = two_regions();
        let hit = hit_test(&batch, Point::new(48.0, 48.0)).unwrap();
        assert_eq!(hit.raw_value(), Some("second"));
    }

    #[test]
    fn test_containment_beats_nearer_center() {
        // The tap sits inside the big box but right on the small box's center.
        let batch = vec![
            det("small", 20.0, 20.0, 22.0, 22.0),
            det("big", 0.0, 0.0, 100.0, 100.0),
        ];
        let hit = hit_test(&batch, Point::new(21.0, 23.0)).unwrap();
        assert_eq!(hit.raw_value(), Some("big"));
    }

    #[test]
    fn test_overlapping_regions_first_wins() {
        let batch = vec![det("a", 0.0, 0.0, 10.0, 10.0), det("b", 0.0, 0.0, 10.0, 10.0)];
        assert_eq!(
            hit_test(&batch, Point::new(1.0, 1.0)).unwrap().raw_value(),
            Some("a")
        );
    }

    #[test]
    fn test_equal_distance_first_wins() {
        let batch = vec![det("left", 0.0, 0.0, 10.0, 10.0), det("right", 20.0, 0.0, 30.0, 10.0)];
        let hit = hit_test(&batch, Point::new(15.0, 5.0)).unwrap();
        assert_eq!(hit.raw_value(), Some("left"));
    }

    #[test]
    fn test_empty_batch_has_no_hit() {
        assert!(hit_test(&[], Point::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_tracker_replace_and_ignore_empty() {
        let mut tracker = OverlayTracker::new();
        assert!(tracker.replace(two_regions()));
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.generation(), 1);

        assert!(!tracker.replace(Vec::new()));
        assert_eq!(tracker.len(), 2);

        tracker.replace(vec![det("only", 0.0, 0.0, 1.0, 1.0)]);
        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.hit_test(Point::new(40.0, 40.0)).unwrap().raw_value(),
            Some("only")
        );

        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.generation(), 3);
    }

    #[test]
    fn test_transform_to_frame() {
        let t = OverlayTransform {
            origin: Point::new(100.0, 200.0),
            width_scale: 2.0,
            height_scale: 4.0,
        };
        assert_eq!(t.to_frame(Point::new(120.0, 240.0)), Point::new(10.0, 10.0));
        assert_eq!(OverlayTransform::default().to_frame(Point::new(3.0, 4.0)), Point::new(3.0, 4.0));
    }
}
