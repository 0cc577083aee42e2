/// Parameter automation timelines for gain nodes
///
/// The same timeline type is used on both sides of the engine: the render
/// thread evaluates it per sample inside `GainNode`, and the control side keeps
/// a mirror of each note's envelope so it can read back the value a gain is
/// producing at any clock time without asking the audio thread.
use serde::{Deserialize, Serialize};

/// Type of interpolation between a point and the one after it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveType {
    /// Linear interpolation (straight line)
    Linear,
    /// Step (hold value until the next point)
    Step,
}

/// A single automation point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    /// Audio-clock time in seconds
    pub time: f64,
    /// Parameter value at `time`
    pub value: f32,
    /// Curve type to next point
    pub curve: CurveType,
}

impl AutomationPoint {
    /// Create a new automation point
    pub fn new(time: f64, value: f32, curve: CurveType) -> Self {
        Self { time, value, curve }
    }
}

/// Scheduled value changes for one parameter
///
/// Points are kept sorted by time. `linear_ramp_to_value_at_time` turns the
/// preceding point's curve into a ramp, so a ramp always starts from the last
/// point scheduled before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamTimeline {
    default_value: f32,
    points: Vec<AutomationPoint>,
}

impl ParamTimeline {
    /// Create a timeline that reports `default_value` until the first point
    pub fn new(default_value: f32) -> Self {
        Self {
            default_value,
            points: Vec::new(),
        }
    }

    /// Create a timeline with room for `capacity` points, so scheduling on the
    /// render thread doesn't reallocate
    pub fn with_capacity(default_value: f32, capacity: usize) -> Self {
        Self {
            default_value,
            points: Vec::with_capacity(capacity),
        }
    }

    /// Jump to `value` at `time`
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(AutomationPoint::new(time, value, CurveType::Step));
    }

    /// Ramp linearly from the previous point to `value`, arriving at `time`
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        let idx = self.points.partition_point(|p| p.time <= time);
        if idx > 0 {
            self.points[idx - 1].curve = CurveType::Linear;
        }
        self.points.insert(idx, AutomationPoint::new(time, value, CurveType::Step));
    }

    /// Remove every point at or after `time`
    ///
    /// A ramp that was heading towards a removed point holds at its start
    /// value afterwards.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        let idx = self.points.partition_point(|p| p.time < time);
        self.points.truncate(idx);
        if let Some(last) = self.points.last_mut() {
            last.curve = CurveType::Step;
        }
    }

    /// Drop points that can no longer influence values at or after `time`
    ///
    /// The last point at or before `time` is kept as the anchor for whatever
    /// follows it.
    pub fn prune_before(&mut self, time: f64) {
        let idx = self.points.partition_point(|p| p.time <= time);
        if idx > 1 {
            self.points.drain(..idx - 1);
        }
    }

    /// Get value at a specific time with interpolation
    pub fn value_at(&self, time: f64) -> f32 {
        let idx = self.points.partition_point(|p| p.time <= time);
        if idx == 0 {
            return self.default_value;
        }

        let p1 = &self.points[idx - 1];
        match (p1.curve, self.points.get(idx)) {
            (CurveType::Linear, Some(p2)) => interpolate(p1, p2, time),
            _ => p1.value,
        }
    }

    /// Time of the last scheduled point, if any
    pub fn last_time(&self) -> Option<f64> {
        self.points.last().map(|p| p.time)
    }

    /// Get all points
    pub fn points(&self) -> &[AutomationPoint] {
        &self.points
    }

    fn insert(&mut self, point: AutomationPoint) {
        // Later insertions at the same time win, like the Web Audio event list
        let idx = self.points.partition_point(|p| p.time <= point.time);
        self.points.insert(idx, point);
    }
}

/// Interpolate linearly between two automation points
fn interpolate(p1: &AutomationPoint, p2: &AutomationPoint, time: f64) -> f32 {
    if p2.time <= p1.time {
        return p2.value;
    }
    let t = ((time - p1.time) / (p2.time - p1.time)).clamp(0.0, 1.0) as f32;
    p1.value + (p2.value - p1.value) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_before_first_point() {
        let mut timeline = ParamTimeline::new(0.7);
        timeline.set_value_at_time(0.2, 1.0);

        assert_eq!(timeline.value_at(0.5), 0.7);
        assert_eq!(timeline.value_at(1.0), 0.2);
        assert_eq!(timeline.value_at(5.0), 0.2);
    }

    #[test]
    fn test_linear_ramp() {
        let mut timeline = ParamTimeline::new(0.0);
        timeline.set_value_at_time(0.0, 1.0);
        timeline.linear_ramp_to_value_at_time(1.0, 2.0);

        assert_eq!(timeline.value_at(1.0), 0.0);
        assert!((timeline.value_at(1.5) - 0.5).abs() < 1e-6);
        assert_eq!(timeline.value_at(2.0), 1.0);
        assert_eq!(timeline.value_at(3.0), 1.0);
    }

    #[test]
    fn test_cancel_holds_ramp_start() {
        let mut timeline = ParamTimeline::new(0.0);
        timeline.set_value_at_time(0.4, 0.0);
        timeline.linear_ramp_to_value_at_time(1.0, 2.0);

        timeline.cancel_scheduled_values(1.0);

        assert_eq!(timeline.points().len(), 1);
        assert_eq!(timeline.value_at(1.5), 0.4);
    }

    #[test]
    fn test_prune_keeps_anchor() {
        let mut timeline = ParamTimeline::new(0.0);
        timeline.set_value_at_time(0.1, 0.0);
        timeline.set_value_at_time(0.2, 1.0);
        timeline.set_value_at_time(0.3, 2.0);
        timeline.linear_ramp_to_value_at_time(0.9, 4.0);

        timeline.prune_before(2.5);

        assert_eq!(timeline.points().len(), 2);
        assert!((timeline.value_at(3.0) - 0.6).abs() < 1e-6);
    }
}
