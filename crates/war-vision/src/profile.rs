use image::{GrayImage, RgbaImage};

/// Scan axis for a profile: one sample per row or one per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Col,
}

/// Aggregate statistic taken across the off-axis extent of each row/column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Min,
    Max,
    Mean,
}

/// Ordered sequence of normalized lightness statistics, one per row or
/// column of a region. Sample order is spatial: index 0 is the top row or
/// leftmost column of the scanned region.
#[derive(Debug, Clone)]
pub struct Profile {
    samples: Vec<f64>,
}

/// HLS lightness plane of an RGBA frame: L = (max(R,G,B) + min(R,G,B)) / 2.
/// The alpha channel is ignored.
pub fn lightness_plane(frame: &RgbaImage) -> GrayImage {
    let (w, h) = frame.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let px = frame.get_pixel(x, y);
        let max = px[0].max(px[1]).max(px[2]) as u16;
        let min = px[0].min(px[1]).min(px[2]) as u16;
        image::Luma([((max + min) / 2) as u8])
    })
}

impl Profile {
    /// Measure a statistic along an axis over the full lightness plane.
    pub fn measure(plane: &GrayImage, axis: Axis, stat: Stat) -> Self {
        Self::measure_region(plane, axis, stat, 0, 0, plane.width(), plane.height())
    }

    /// Measure over a sub-rectangle, allowing repeated profiling at
    /// increasing focus without copying pixels. The rectangle is clamped to
    /// the plane bounds.
    pub fn measure_region(
        plane: &GrayImage,
        axis: Axis,
        stat: Stat,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Self {
        let (pw, ph) = plane.dimensions();
        let x0 = x.min(pw);
        let y0 = y.min(ph);
        let x1 = (x0 + w).min(pw);
        let y1 = (y0 + h).min(ph);

        let (outer, inner): (std::ops::Range<u32>, std::ops::Range<u32>) = match axis {
            Axis::Row => (y0..y1, x0..x1),
            Axis::Col => (x0..x1, y0..y1),
        };

        let samples = outer
            .map(|o| {
                let mut min = u8::MAX;
                let mut max = u8::MIN;
                let mut sum = 0u64;
                let mut count = 0u64;
                for i in inner.clone() {
                    let v = match axis {
                        Axis::Row => plane.get_pixel(i, o)[0],
                        Axis::Col => plane.get_pixel(o, i)[0],
                    };
                    min = min.min(v);
                    max = max.max(v);
                    sum += v as u64;
                    count += 1;
                }
                if count == 0 {
                    return 0.0;
                }
                match stat {
                    Stat::Min => min as f64 / 255.0,
                    Stat::Max => max as f64 / 255.0,
                    Stat::Mean => sum as f64 / count as f64 / 255.0,
                }
            })
            .collect();

        Self { samples }
    }

    pub fn from_samples(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        self.samples.get(i).copied()
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// First differences: d[i] = p[i+1] - p[i]. One sample shorter than the
    /// source profile.
    pub fn differences(&self) -> Profile {
        let samples = self
            .samples
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect();
        Profile { samples }
    }

    /// Spatially reversed copy, for scanning a region right-to-left or
    /// bottom-to-top. An index i in the result maps back to
    /// `len - 1 - i` in the source.
    pub fn reversed(&self) -> Profile {
        let mut samples = self.samples.clone();
        samples.reverse();
        Profile { samples }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient_frame() -> RgbaImage {
        // Columns get brighter left to right; rows are uniform.
        RgbaImage::from_fn(10, 4, |x, _| {
            let v = (x * 25) as u8;
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn test_lightness_plane_is_hls_lightness() {
        let mut frame = RgbaImage::new(1, 1);
        frame.put_pixel(0, 0, Rgba([200, 100, 0, 255]));
        let plane = lightness_plane(&frame);
        assert_eq!(plane.get_pixel(0, 0)[0], 100); // (200 + 0) / 2
    }

    #[test]
    fn test_profile_length_matches_axis_extent() {
        let plane = lightness_plane(&gradient_frame());
        assert_eq!(Profile::measure(&plane, Axis::Col, Stat::Mean).len(), 10);
        assert_eq!(Profile::measure(&plane, Axis::Row, Stat::Mean).len(), 4);
    }

    #[test]
    fn test_col_profile_is_spatially_ordered() {
        let plane = lightness_plane(&gradient_frame());
        let profile = Profile::measure(&plane, Axis::Col, Stat::Mean);
        let s = profile.samples();
        assert!(s[0] < s[9]);
        assert!(s.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_min_max_stats() {
        let mut frame = RgbaImage::from_pixel(2, 2, Rgba([100, 100, 100, 255]));
        frame.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        let plane = lightness_plane(&frame);
        let min = Profile::measure(&plane, Axis::Col, Stat::Min);
        let max = Profile::measure(&plane, Axis::Col, Stat::Max);
        assert_eq!(min.get(0), Some(0.0));
        assert_eq!(max.get(0), Some(100.0 / 255.0));
        assert_eq!(min.get(1), Some(100.0 / 255.0));
    }

    #[test]
    fn test_region_profile_clamps_and_crops() {
        let plane = lightness_plane(&gradient_frame());
        let profile = Profile::measure_region(&plane, Axis::Col, Stat::Mean, 5, 0, 100, 100);
        assert_eq!(profile.len(), 5);
    }

    #[test]
    fn test_differences() {
        let p = Profile::from_samples(vec![0.1, 0.4, 0.2]);
        let d = p.differences();
        assert_eq!(d.len(), 2);
        assert!((d.get(0).unwrap() - 0.3).abs() < 1e-12);
        assert!((d.get(1).unwrap() + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_reversed_round_trip() {
        let p = Profile::from_samples(vec![0.1, 0.2, 0.3]);
        assert_eq!(p.reversed().samples(), &[0.3, 0.2, 0.1]);
    }
}
