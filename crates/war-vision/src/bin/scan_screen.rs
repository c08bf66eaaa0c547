//! Diagnostic tool: run region extraction on a single screenshot, print the
//! detected layout as JSON, and optionally dump debug artifacts.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use war_data::Presets;
use war_vision::{analyze, crop_plane, lightness_plane, ArtifactSink, Axis, MeasurementLog, Profile, Stat};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(image_path) = args.next() else {
        bail!("Usage: scan_screen <screenshot> [debug-dir]");
    };
    let debug_dir = args.next().map(PathBuf::from);

    let frame = image::open(&image_path)
        .with_context(|| format!("Failed to open {image_path}"))?
        .to_rgba8();
    let presets = Presets::default();
    let plane = lightness_plane(&frame);
    let mut log = MeasurementLog::default();
    let layout = analyze(&plane, &presets, &mut log)?;

    println!("{}", serde_json::to_string_pretty(&layout)?);

    let sink = ArtifactSink::new(debug_dir);
    if sink.enabled() {
        let menu = crop_plane(&plane, &layout.menu);
        sink.save_region("menu", &menu);
        sink.save_oscilloscope(
            "menu_row_min",
            &Profile::measure(&menu, Axis::Row, Stat::Min),
            &[layout.header_end],
        );
        let lines = crop_plane(&menu, &layout.lines);
        sink.save_region("attack_lines", &lines);
        sink.save_oscilloscope(
            "lines_col_mean",
            &Profile::measure(&lines, Axis::Col, Stat::Mean),
            &[
                layout.columns.rank.end,
                layout.columns.level.end,
                layout.columns.player.end,
                layout.columns.enemy.begin,
                layout.columns.enemy.end,
            ],
        );
    }
    Ok(())
}
