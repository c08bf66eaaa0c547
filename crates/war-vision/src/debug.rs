//! Diagnostic artifacts: region crops and profile plots saved to a debug
//! directory on request. A side channel only; failures here are logged and
//! never affect extraction results.

use crate::profile::Profile;
use image::{GrayImage, Luma};
use std::path::PathBuf;
use tracing::{debug, warn};

const PLOT_HEIGHT: u32 = 100;

/// Sink for intermediate artifacts. With no directory configured every call
/// is a no-op.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSink {
    dir: Option<PathBuf>,
}

impl ArtifactSink {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Save a region crop as `<name>.png`.
    pub fn save_region(&self, name: &str, region: &GrayImage) {
        let Some(dir) = &self.dir else { return };
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Failed to create debug directory {}: {}", dir.display(), e);
            return;
        }
        let path = dir.join(format!("{name}.png"));
        match region.save(&path) {
            Ok(()) => debug!("Saved debug region to {}", path.display()),
            Err(e) => warn!("Failed to save debug region {}: {}", path.display(), e),
        }
    }

    /// Render a profile as an oscilloscope trace, one column per sample,
    /// with vertical marker lines at the given cut positions.
    pub fn save_oscilloscope(&self, name: &str, profile: &Profile, markers: &[u32]) {
        if self.dir.is_none() || profile.is_empty() {
            return;
        }
        let w = profile.len() as u32;
        let mut plot = GrayImage::from_pixel(w, PLOT_HEIGHT, Luma([255]));
        for (i, &v) in profile.samples().iter().enumerate() {
            let y = ((1.0 - v.clamp(0.0, 1.0)) * (PLOT_HEIGHT - 1) as f64) as u32;
            plot.put_pixel(i as u32, y, Luma([0]));
        }
        for &marker in markers {
            if marker < w {
                for y in 0..PLOT_HEIGHT {
                    plot.put_pixel(marker, y, Luma([128]));
                }
            }
        }
        self.save_region(name, &plot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_sink_is_noop() {
        let sink = ArtifactSink::default();
        assert!(!sink.enabled());
        // Must not touch the filesystem or panic.
        sink.save_region("never", &GrayImage::new(4, 4));
        sink.save_oscilloscope("never", &Profile::from_samples(vec![0.5]), &[0]);
    }

    #[test]
    fn test_oscilloscope_writes_plot() {
        let dir = std::env::temp_dir().join("warline_debug_test");
        let sink = ArtifactSink::new(Some(dir.clone()));
        assert!(sink.enabled());
        let profile = Profile::from_samples(vec![0.0, 0.5, 1.0, 0.5]);
        sink.save_oscilloscope("trace", &profile, &[2]);
        assert!(dir.join("trace.png").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
