use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Epsilon and scale pair for one adaptive threshold sampling site, plus the
/// constant to fall back to when the sampler finds no repeated value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplerPreset {
    /// Similarity tolerance for the repeat walk.
    pub epsilon: f64,
    /// Applied to the sampled value before use as a threshold.
    pub scale: f64,
    /// Used verbatim when sampling exhausts without a repeat.
    pub fallback: f64,
}

impl SamplerPreset {
    pub const fn new(epsilon: f64, scale: f64, fallback: f64) -> Self {
        Self { epsilon, scale, fallback }
    }
}

/// One entry of the background binarization map: when the sampled background
/// lightness is at least `bound`, the binarization threshold sits `delta`
/// above it. Entries are consulted low bound to high, keeping the tightest
/// matching bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackgroundThreshold {
    pub bound: f64,
    pub delta: f64,
}

/// Tunable processing constants. Lightness values are normalized to
/// [0.0, 1.0]; pixel margins are in source pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Presets {
    // Adaptive threshold sampling sites, named after the measurement each
    // one feeds.
    pub menu_col_avg: SamplerPreset,
    pub menu_row_avg: SamplerPreset,
    pub menu_max_avg: SamplerPreset,
    pub menu_row_min: SamplerPreset,
    pub lines_global_min: SamplerPreset,
    pub lines_local_min: SamplerPreset,
    pub column_sep: SamplerPreset,
    pub rank_name_split: SamplerPreset,
    pub row_gap: SamplerPreset,

    // Fixed lightness bounds.
    pub black: f64,
    pub white: f64,

    // Pixel margins used while measuring.
    pub px_margin: u32,
    pub outlier_margin: u32,
    pub look_ahead_margin: u32,

    // Blob cleaning.
    pub outline_upper: f64,
    pub blob_area_ratio: f64,
    /// (x0, y0, x1, y1) patch a full-width row samples its background from.
    pub line_bg_patch: (u32, u32, u32, u32),
    /// Tighter patch for small crops.
    pub corner_bg_patch: (u32, u32, u32, u32),
    pub background_map: Vec<BackgroundThreshold>,

    // Recognition and resolution.
    pub rank_whitelist: String,
    pub digit_glyphs: HashMap<char, String>,
    pub ally_min_similarity: u32,
    pub enemy_min_similarity: u32,

    /// Tolerance factor for the measurement-log expected-range check; a
    /// measured fraction outside [expected * (2 - m), expected * m] fails.
    pub err_margin: f64,
}

impl Default for Presets {
    fn default() -> Self {
        Self {
            menu_col_avg: SamplerPreset::new(0.2, 0.99, 0.3),
            menu_row_avg: SamplerPreset::new(0.2, 0.99, 0.3),
            menu_max_avg: SamplerPreset::new(0.001, 0.99, 0.9),
            menu_row_min: SamplerPreset::new(0.001, 0.97, 0.9),
            lines_global_min: SamplerPreset::new(0.001, 0.99, 0.9),
            lines_local_min: SamplerPreset::new(0.01, 0.95, 0.9),
            column_sep: SamplerPreset::new(0.0005, 0.99, 0.3),
            rank_name_split: SamplerPreset::new(0.01, 0.99, 0.9),
            row_gap: SamplerPreset::new(0.01, 0.97, 0.9),

            black: 0.01,
            white: 0.99,

            px_margin: 10,
            outlier_margin: 15,
            look_ahead_margin: 100,

            outline_upper: 150.0 / 255.0,
            blob_area_ratio: 0.06,
            line_bg_patch: (50, 20, 60, 30),
            corner_bg_patch: (0, 0, 5, 5),
            background_map: vec![
                BackgroundThreshold { bound: 0.0, delta: 0.11 },
                BackgroundThreshold { bound: 0.62, delta: 0.09 },
                BackgroundThreshold { bound: 0.70, delta: 0.05 },
                BackgroundThreshold { bound: 0.77, delta: 0.03 },
                BackgroundThreshold { bound: 0.80, delta: -0.01 },
            ],

            rank_whitelist: "0123456789lLiIoOsSzZ|".to_string(),
            digit_glyphs: default_digit_glyphs(),
            ally_min_similarity: 65,
            enemy_min_similarity: 65,

            err_margin: 1.2,
        }
    }
}

/// Common single-glyph misreads when the expected output is a digit.
fn default_digit_glyphs() -> HashMap<char, String> {
    [
        ('l', "1"),
        ('I', "1"),
        ('|', "1"),
        ('L', "1"),
        ('T', "1"),
        ('i', "1"),
        ('d', "1"),
        ('g', "9"),
        ('O', "0"),
        ('o', "0"),
        ('S', "5"),
        ('s', "5"),
        ('B', "8"),
        ('W', "11"),
        ('Z', "2"),
        ('z', "2"),
        ('e', "2"),
        ('a', "4"),
    ]
    .into_iter()
    .map(|(c, s)| (c, s.to_string()))
    .collect()
}

impl Presets {
    /// Load presets from a JSON file, falling back to defaults when the file
    /// is absent. Unknown keys in the file are ignored; missing keys keep
    /// their default.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("No presets file at {}. Using defaults.", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read presets file {}", path.display()))?;
        let presets: Presets = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse presets file {}", path.display()))?;
        tracing::info!("Loaded presets from {}", path.display());
        Ok(presets)
    }

    /// Pick the binarization delta for a sampled background lightness: the
    /// tightest map entry whose bound the lightness reaches.
    pub fn background_delta(&self, bg_lightness: f64) -> f64 {
        let mut delta = self
            .background_map
            .first()
            .map(|t| t.delta)
            .unwrap_or(0.11);
        for entry in &self.background_map {
            if bg_lightness >= entry.bound {
                delta = entry.delta;
            }
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let presets = Presets::load(Path::new("/nonexistent/presets.json")).unwrap();
        assert_eq!(presets.px_margin, 10);
        assert_eq!(presets.ally_min_similarity, 65);
    }

    #[test]
    fn test_background_delta_picks_tightest_bound() {
        let presets = Presets::default();
        assert!((presets.background_delta(0.5) - 0.11).abs() < 1e-9);
        assert!((presets.background_delta(0.75) - 0.05).abs() < 1e-9);
        assert!((presets.background_delta(0.95) + 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_digit_glyphs_cover_common_misreads() {
        let presets = Presets::default();
        assert_eq!(presets.digit_glyphs.get(&'l').map(String::as_str), Some("1"));
        assert_eq!(presets.digit_glyphs.get(&'B').map(String::as_str), Some("8"));
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let dir = std::env::temp_dir().join("warline_presets_test");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("presets.json");
        std::fs::write(&path, r#"{"px_margin": 4}"#).unwrap();
        let presets = Presets::load(&path).unwrap();
        assert_eq!(presets.px_margin, 4);
        assert_eq!(presets.outlier_margin, 15);
    }
}
