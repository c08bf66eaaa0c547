//! Statistical feature localization for clan-war results screenshots.
//!
//! Nothing in here uses fixed pixel coordinates. Regions are found by
//! profiling lightness statistics per row or column, deriving thresholds
//! from the image's own distribution, and measuring where the profiles
//! cross them.

pub mod cleanup;
pub mod debug;
pub mod layout;
pub mod measure;
pub mod profile;
pub mod threshold;

pub use cleanup::{clean_region, is_blank};
pub use debug::ArtifactSink;
pub use layout::{
    analyze, crop_plane, split_rank_name, Columns, MeasurementLog, Rect, RowBand, ScreenLayout,
    Span,
};
pub use measure::{
    divergence_span, first_crossing, last_crossing, next_crossing, Crossing, Direction,
    DivergenceSpan, Guard, Threshold, ThresholdMode,
};
pub use profile::{lightness_plane, Axis, Profile, Stat};
pub use threshold::{sample_or, sample_threshold};
