use crate::profile::Profile;
use tracing::debug;
use war_data::SamplerPreset;

/// Derive a threshold from the data itself instead of a constant.
///
/// The samples are walked greatest to least. Background and noise levels
/// recur across an image while genuine feature edges are rare outliers, so
/// the first value that lands within `epsilon` of one already walked is
/// taken as the threshold. The single greatest sample never participates in
/// repeat detection; it is presumed to be a feature outlier.
///
/// `cutoff` excludes samples at or above a known-uninteresting level (for
/// example the global maximum of a wider region) before the walk. Returns
/// `None` when the walk exhausts without a repeat.
pub fn sample_threshold(profile: &Profile, cutoff: Option<f64>, epsilon: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = profile
        .samples()
        .iter()
        .copied()
        .filter(|v| cutoff.map_or(true, |c| *v < c))
        .collect();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut walked: Vec<f64> = Vec::new();
    for &value in sorted.iter().skip(1) {
        if walked.iter().any(|&seen| (seen - value).abs() <= epsilon) {
            return Some(value);
        }
        walked.push(value);
    }
    None
}

/// Sample with a preset, applying its scale factor and falling back to its
/// configured constant when no repeat is found.
pub fn sample_or(profile: &Profile, cutoff: Option<f64>, preset: &SamplerPreset) -> f64 {
    match sample_threshold(profile, cutoff, preset.epsilon) {
        Some(v) => v * preset.scale,
        None => {
            debug!(
                "Threshold sampling exhausted ({} samples), using fallback {}",
                profile.len(),
                preset.fallback
            );
            preset.fallback
        }
    }
}
