use crate::profile::Profile;

/// Direction of a lightness transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rising,
    Falling,
}

/// How a threshold is applied to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// The sample level itself crosses the value.
    Absolute,
    /// The change from the previous sample crosses the value.
    Relative,
}

#[derive(Debug, Clone, Copy)]
pub struct Threshold {
    pub value: f64,
    pub mode: ThresholdMode,
}

impl Threshold {
    pub const fn absolute(value: f64) -> Self {
        Self { value, mode: ThresholdMode::Absolute }
    }

    pub const fn relative(value: f64) -> Self {
        Self { value, mode: ThresholdMode::Relative }
    }
}

/// A detected transition through a threshold. The index is the first sample
/// on the far side of the transition (a crossing from sample i-1 to sample i
/// reports index i).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub index: usize,
    pub direction: Direction,
}

/// Secondary qualification for a crossing: a guard profile must stay above a
/// bound at every index within `window` samples of the crossing index. A dip
/// anywhere in the window disqualifies the crossing.
#[derive(Debug, Clone, Copy)]
pub struct Guard<'a> {
    pub profile: &'a Profile,
    pub min_value: f64,
    pub window: usize,
}

impl Guard<'_> {
    fn holds_at(&self, index: usize) -> bool {
        let lo = index.saturating_sub(self.window);
        let hi = (index + self.window).min(self.profile.len().saturating_sub(1));
        (lo..=hi).all(|i| self.profile.get(i).map_or(false, |v| v > self.min_value))
    }
}

fn crosses_at(profile: &Profile, threshold: &Threshold, direction: Direction, i: usize) -> bool {
    let (Some(prev), Some(curr)) = (profile.get(i.wrapping_sub(1)), profile.get(i)) else {
        return false;
    };
    match (threshold.mode, direction) {
        (ThresholdMode::Absolute, Direction::Rising) => {
            prev < threshold.value && curr >= threshold.value
        }
        (ThresholdMode::Absolute, Direction::Falling) => {
            prev > threshold.value && curr <= threshold.value
        }
        (ThresholdMode::Relative, Direction::Rising) => curr - prev >= threshold.value,
        (ThresholdMode::Relative, Direction::Falling) => prev - curr >= threshold.value,
    }
}

/// Earliest qualifying crossing in the profile.
pub fn first_crossing(
    profile: &Profile,
    threshold: &Threshold,
    direction: Direction,
) -> Option<Crossing> {
    next_crossing(profile, threshold, direction, 0)
}

/// Earliest qualifying crossing strictly after `after`. Pairing a first
/// crossing with the next one bounds a feature between two edges.
pub fn next_crossing(
    profile: &Profile,
    threshold: &Threshold,
    direction: Direction,
    after: usize,
) -> Option<Crossing> {
    ((after + 1)..profile.len())
        .find(|&i| crosses_at(profile, threshold, direction, i))
        .map(|index| Crossing { index, direction })
}

/// Final qualifying crossing in the profile.
pub fn last_crossing(
    profile: &Profile,
    threshold: &Threshold,
    direction: Direction,
) -> Option<Crossing> {
    (1..profile.len())
        .rev()
        .find(|&i| crosses_at(profile, threshold, direction, i))
        .map(|index| Crossing { index, direction })
}

/// Like [`next_crossing`], but a crossing only qualifies while the guard
/// holds near it.
pub fn next_crossing_guarded(
    profile: &Profile,
    threshold: &Threshold,
    direction: Direction,
    after: usize,
    guard: &Guard<'_>,
) -> Option<Crossing> {
    ((after + 1)..profile.len())
        .find(|&i| crosses_at(profile, threshold, direction, i) && guard.holds_at(i))
        .map(|index| Crossing { index, direction })
}

/// Where two profiles separate and where they settle back together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivergenceSpan {
    /// First index where the profiles differ by more than the tolerance.
    pub start: usize,
    /// Last index, after `start`, where they are within tolerance again.
    pub end: usize,
}

/// Dual-profile tracking, kept separate from single-profile crossing: find
/// where `a` and `b` diverge beyond `tolerance` and the last position where
/// they reconverge. A feature block sits between a steady background's
/// profiles pulling apart and coming back together.
pub fn divergence_span(a: &Profile, b: &Profile, tolerance: f64) -> Option<DivergenceSpan> {
    let len = a.len().min(b.len());
    let apart =
        |i: usize| (a.get(i).unwrap_or(0.0) - b.get(i).unwrap_or(0.0)).abs() > tolerance;

    let start = (0..len).find(|&i| apart(i))?;
    let end = (start + 1..len).rev().find(|&i| !apart(i))?;
    Some(DivergenceSpan { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(values: &[f64]) -> Profile {
        Profile::from_samples(values.to_vec())
    }

    #[test]
    fn test_first_falling_absolute() {
        // Falls through 5 between index 3 (value 8) and index 4 (value 2).
        let p = profile(&[10.0, 10.0, 9.0, 8.0, 2.0, 2.0, 3.0, 9.0, 10.0]);
        let c = first_crossing(&p, &Threshold::absolute(5.0), Direction::Falling).unwrap();
        assert_eq!(c.index, 4);
    }

    #[test]
    fn test_first_rising_is_smallest_qualifying_index() {
        let p = profile(&[1.0, 2.0, 6.0, 1.0, 7.0]);
        let c = first_crossing(&p, &Threshold::absolute(5.0), Direction::Rising).unwrap();
        assert_eq!(c.index, 2);
        assert!(p.get(c.index - 1).unwrap() < 5.0);
        assert!(p.get(c.index).unwrap() >= 5.0);
    }

    #[test]
    fn test_next_is_strictly_after() {
        let p = profile(&[1.0, 6.0, 1.0, 6.0, 1.0]);
        let th = Threshold::absolute(5.0);
        let first = first_crossing(&p, &th, Direction::Rising).unwrap();
        assert_eq!(first.index, 1);
        let next = next_crossing(&p, &th, Direction::Rising, first.index).unwrap();
        assert!(next.index > first.index);
        assert_eq!(next.index, 3);
        assert_eq!(next_crossing(&p, &th, Direction::Rising, next.index), None);
    }

    #[test]
    fn test_last_crossing() {
        let p = profile(&[1.0, 6.0, 1.0, 6.0, 1.0]);
        let c = last_crossing(&p, &Threshold::absolute(5.0), Direction::Rising).unwrap();
        assert_eq!(c.index, 3);
    }

    #[test]
    fn test_no_crossing_is_none_not_error() {
        let p = profile(&[1.0, 1.0, 1.0]);
        assert_eq!(first_crossing(&p, &Threshold::absolute(5.0), Direction::Rising), None);
        assert_eq!(last_crossing(&p, &Threshold::absolute(5.0), Direction::Falling), None);
    }

    #[test]
    fn test_relative_mode_applies_to_first_difference() {
        // Levels never exceed 1.0; the jump of 0.6 at index 2 is what
        // crosses a relative threshold of 0.5.
        let p = profile(&[0.1, 0.2, 0.8, 0.9]);
        let c = first_crossing(&p, &Threshold::relative(0.5), Direction::Rising).unwrap();
        assert_eq!(c.index, 2);
        assert_eq!(
            first_crossing(&p, &Threshold::relative(0.5), Direction::Falling),
            None
        );
    }

    #[test]
    fn test_guarded_crossing_skips_unguarded_edges() {
        let p = profile(&[1.0, 6.0, 1.0, 6.0, 1.0]);
        let guard_profile = profile(&[9.0, 0.0, 9.0, 9.0, 9.0]);
        let guard = Guard { profile: &guard_profile, min_value: 5.0, window: 0 };
        let c = next_crossing_guarded(&p, &Threshold::absolute(5.0), Direction::Rising, 0, &guard)
            .unwrap();
        // Index 1 crosses but the guard fails there; index 3 qualifies.
        assert_eq!(c.index, 3);
    }

    #[test]
    fn test_guard_window_covers_every_index_in_it() {
        let p = profile(&[1.0, 6.0, 1.0, 6.0, 1.0]);
        let guard_profile = profile(&[9.0, 9.0, 0.0, 9.0, 9.0]);
        let th = Threshold::absolute(5.0);
        let tight = Guard { profile: &guard_profile, min_value: 5.0, window: 0 };
        let c = next_crossing_guarded(&p, &th, Direction::Rising, 0, &tight).unwrap();
        assert_eq!(c.index, 1);
        // With window 1 the dip at index 2 sits in the window of both
        // crossings, so neither qualifies.
        let wide = Guard { profile: &guard_profile, min_value: 5.0, window: 1 };
        assert_eq!(next_crossing_guarded(&p, &th, Direction::Rising, 0, &wide), None);
    }

    #[test]
    fn test_divergence_and_reconvergence() {
        let min = profile(&[0.9, 0.9, 0.2, 0.1, 0.2, 0.9, 0.9]);
        let mean = profile(&[0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9]);
        let span = divergence_span(&min, &mean, 0.3).unwrap();
        assert_eq!(span.start, 2);
        assert_eq!(span.end, 6);
    }

    #[test]
    fn test_divergence_without_reconvergence_is_none() {
        let a = profile(&[0.9, 0.2, 0.2, 0.2]);
        let b = profile(&[0.9, 0.9, 0.9, 0.9]);
        assert_eq!(divergence_span(&a, &b, 0.3), None);
    }
}
