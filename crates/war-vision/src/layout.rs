//! Progressive region extraction for a war results screenshot.
//!
//! A single global threshold is unreliable across the whole screen because
//! background and contrast vary regionally, so extraction narrows in stages:
//! menu against the war background, header and attack-lines block within the
//! menu, data columns within the attack lines, then one row band per player.
//! Each stage re-samples its thresholds from the region it is about to cut.

use crate::measure::{
    first_crossing, last_crossing, next_crossing, next_crossing_guarded, Direction, Guard,
    Threshold,
};
use crate::profile::{Axis, Profile, Stat};
use crate::threshold::sample_or;
use anyhow::{bail, Context, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};
use war_data::Presets;

/// Safety cap on the row walk; a real results screen has far fewer rows.
const MAX_ROWS: usize = 64;

/// Half-open horizontal extent of one data column, in attack-lines
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub begin: u32,
    pub end: u32,
}

impl Span {
    pub fn width(&self) -> u32 {
        self.end.saturating_sub(self.begin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// One player row within the attack lines, top inclusive, bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBand {
    pub top: u32,
    pub bottom: u32,
}

impl RowBand {
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Data columns of the attack lines, left to right.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Columns {
    pub rank: Span,
    pub level: Span,
    pub player: Span,
    pub enemy: Span,
    pub percentage: Span,
}

/// Everything the extractor locates in one screenshot. `lines` is relative
/// to `menu`; columns and rows are relative to `lines`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenLayout {
    pub menu: Rect,
    pub header_end: u32,
    pub lines: Rect,
    pub columns: Columns,
    pub rows: Vec<RowBand>,
}

pub fn crop_plane(plane: &GrayImage, rect: &Rect) -> GrayImage {
    image::imageops::crop_imm(plane, rect.x, rect.y, rect.w, rect.h).to_image()
}

/// A cut recorded from the last image where it was measured successfully.
/// The fraction is relative to the parent extent so the check survives
/// resolution changes between screenshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoggedCut {
    pub cut: u32,
    pub fraction: f64,
}

/// Per-batch log of successful cuts, used as the fallback when a later
/// image's measurement lands outside the expected range or degenerates to a
/// region edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementLog {
    cuts: HashMap<String, LoggedCut>,
}

impl MeasurementLog {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No measurement log at {}. Starting empty.", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read measurement log {}", path.display()))?;
        let log = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse measurement log {}", path.display()))?;
        Ok(log)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write measurement log {}", path.display()))
    }

    fn outside_range(&self, name: &str, fraction: f64, err_margin: f64) -> bool {
        match self.cuts.get(name) {
            Some(logged) => {
                let hi = logged.fraction * err_margin;
                let lo = logged.fraction * (2.0 - err_margin);
                fraction < lo || fraction > hi
            }
            None => false,
        }
    }

    /// Validate a measured cut against the log. A cut that is missing, sits
    /// on the region edge, or falls outside the expected range is replaced
    /// by the logged cut when one exists; a good cut updates the log.
    pub fn resolve(
        &mut self,
        name: &str,
        measured: Option<u32>,
        extent: u32,
        err_margin: f64,
    ) -> Option<u32> {
        let usable = measured.filter(|&cut| cut > 0 && cut + 1 < extent);
        if let Some(cut) = usable {
            let fraction = cut as f64 / extent.max(1) as f64;
            if !self.outside_range(name, fraction, err_margin) {
                self.cuts.insert(name.to_string(), LoggedCut { cut, fraction });
                return Some(cut);
            }
            warn!("Measured {name} at {cut} is outside the expected range");
        }
        match self.cuts.get(name) {
            Some(logged) => {
                // The logged fraction, not the absolute cut: the previous
                // image may have had a different resolution, and the
                // fallback must land inside the current region.
                let cut = ((logged.fraction * extent as f64).round() as u32)
                    .min(extent.saturating_sub(1));
                warn!("Could not detect {name}, trying previous cut at {cut}");
                Some(cut)
            }
            None => measured,
        }
    }
}

/// Absolute first differences with flat steps dropped, for sampling a
/// relative threshold. A zero step carries no edge information and would
/// otherwise dominate the repeat walk on clean regions.
fn edge_samples(profile: &Profile) -> Profile {
    Profile::from_samples(
        profile
            .differences()
            .samples()
            .iter()
            .map(|v| v.abs())
            .filter(|v| *v > 0.0)
            .collect(),
    )
}

/// Accumulates column spans left to right. A measurement taken relative to
/// the previous column's end advances the cursor by its width.
#[derive(Debug, Default)]
struct ColumnCursor {
    pos: u32,
}

impl ColumnCursor {
    fn advance(&mut self, width: u32) -> Span {
        self.advance_from(0, width)
    }

    fn advance_from(&mut self, offset: u32, width: u32) -> Span {
        let begin = self.pos + offset;
        let end = begin + width;
        self.pos = end;
        Span { begin, end }
    }
}

/// Locate the results menu against the war background: the first rise and
/// last fall in mean lightness along each axis.
pub fn find_menu(
    plane: &GrayImage,
    presets: &Presets,
    log: &mut MeasurementLog,
) -> Result<Rect> {
    let (w, h) = plane.dimensions();
    let row_mean = Profile::measure(plane, Axis::Row, Stat::Mean);
    let col_mean = Profile::measure(plane, Axis::Col, Stat::Mean);

    let row_th = sample_or(&edge_samples(&row_mean), None, &presets.menu_row_avg);
    let col_th = sample_or(&edge_samples(&col_mean), None, &presets.menu_col_avg);
    debug!("Menu margin thresholds: row {:.4}, col {:.4}", row_th, col_th);

    let m = presets.err_margin;
    let top = first_crossing(&row_mean, &Threshold::relative(row_th), Direction::Rising)
        .map(|c| c.index as u32);
    let bottom = last_crossing(&row_mean, &Threshold::relative(row_th), Direction::Falling)
        .map(|c| c.index as u32);
    let left = first_crossing(&col_mean, &Threshold::relative(col_th), Direction::Rising)
        .map(|c| c.index as u32);
    let right = last_crossing(&col_mean, &Threshold::relative(col_th), Direction::Falling)
        .map(|c| c.index as u32);

    let top = log.resolve("menu_top", top, h, m);
    let bottom = log.resolve("menu_bottom", bottom, h, m);
    let left = log.resolve("menu_left", left, w, m);
    let right = log.resolve("menu_right", right, w, m);

    let (Some(top), Some(bottom), Some(left), Some(right)) = (top, bottom, left, right) else {
        bail!("Could not locate the results menu margins");
    };
    if bottom <= top || right <= left {
        bail!("Degenerate menu margins: rows {top}..{bottom}, cols {left}..{right}");
    }
    Ok(Rect { x: left, y: top, w: right - left, h: bottom - top })
}

/// Within the menu, cut past the header to the top of the first attack line
/// and find the left/right extent of the attack-lines block.
pub fn find_header_and_lines(
    menu_plane: &GrayImage,
    presets: &Presets,
    log: &mut MeasurementLog,
) -> Result<(u32, Rect)> {
    let (mw, mh) = menu_plane.dimensions();
    let m = presets.err_margin;

    let row_min = Profile::measure(menu_plane, Axis::Row, Stat::Min);
    let row_min_th = sample_or(&row_min, None, &presets.menu_row_min);

    // Header text is the first dark block below the top margin; the second
    // fall in minimum lightness is the top of the first line.
    let clipped = Profile::measure_region(
        menu_plane,
        Axis::Row,
        Stat::Min,
        0,
        presets.px_margin,
        mw,
        mh.saturating_sub(presets.px_margin),
    );
    let th = Threshold::absolute(row_min_th);
    let header_end = first_crossing(&clipped, &th, Direction::Falling)
        .and_then(|c| next_crossing(&clipped, &th, Direction::Falling, c.index))
        .map(|c| c.index as u32 + presets.px_margin);
    let header_end = log
        .resolve("header_end", header_end, mh, m)
        .context("Could not detect the header end")?;

    let col_mean = Profile::measure(menu_plane, Axis::Col, Stat::Mean);
    let col_mean_th = sample_or(&col_mean, None, &presets.menu_max_avg);
    let below = Profile::measure_region(
        menu_plane,
        Axis::Col,
        Stat::Mean,
        0,
        header_end,
        mw,
        mh.saturating_sub(header_end),
    );
    let th = Threshold::absolute(col_mean_th);
    let line_begin =
        first_crossing(&below, &th, Direction::Falling).map(|c| c.index as u32);
    let line_end = last_crossing(&below, &th, Direction::Rising).map(|c| c.index as u32);

    let line_begin = log
        .resolve("line_begin", line_begin, mw, m)
        .context("Could not detect the attack lines left edge")?;
    let line_end = log
        .resolve("line_end", line_end, mw, m)
        .context("Could not detect the attack lines right edge")?;
    if line_end <= line_begin {
        bail!("Degenerate attack lines extent: cols {line_begin}..{line_end}");
    }

    let lines = Rect {
        x: line_begin,
        y: header_end,
        w: line_end - line_begin,
        h: mh.saturating_sub(header_end),
    };
    Ok((header_end, lines))
}

/// Locate the data columns within the attack lines, left to right: rank,
/// level, player, enemy (rank plus name), percentage. The enemy column
/// starts at the first presence of black after the player column, ends when
/// minimum lightness returns to the local background level, and is centered
/// against the percentage column.
pub fn detect_columns(
    plane: &GrayImage,
    presets: &Presets,
    log: &mut MeasurementLog,
) -> Result<Columns> {
    let (w, h) = plane.dimensions();
    let m = presets.err_margin;
    let margin = presets.outlier_margin;
    let inner_w = w.saturating_sub(2 * margin);

    // Global thresholds for the whole block, sampled clear of the edges.
    let col_min_inner = Profile::measure_region(plane, Axis::Col, Stat::Min, margin, 0, inner_w, h);
    let col_mean_inner =
        Profile::measure_region(plane, Axis::Col, Stat::Mean, margin, 0, inner_w, h);
    let global_min_th = sample_or(&col_min_inner, None, &presets.lines_global_min);
    let sep_th = sample_or(&edge_samples(&col_mean_inner), None, &presets.column_sep);
    debug!("Column thresholds: global min {:.4}, separator {:.4}", global_min_th, sep_th);

    let black = Threshold::absolute(presets.black);
    let sep = Threshold::relative(sep_th);
    let mut cursor = ColumnCursor::default();

    // Rank ends at the first explicit column separator.
    let col_mean = Profile::measure(plane, Axis::Col, Stat::Mean);
    let rank_end = first_crossing(&col_mean, &sep, Direction::Falling)
        .and_then(|c| next_crossing(&col_mean, &sep, Direction::Rising, c.index))
        .map(|c| c.index as u32);
    let rank_end = log
        .resolve("rank_end", rank_end, w, m)
        .context("Could not detect the rank column")?;
    let rank = cursor.advance(rank_end);

    // Level ends at the second presence of black after the rank column.
    let after_rank =
        Profile::measure_region(plane, Axis::Col, Stat::Min, rank.end, 0, w - rank.end, h);
    let level_end = first_crossing(&after_rank, &black, Direction::Falling)
        .and_then(|c| next_crossing(&after_rank, &black, Direction::Falling, c.index))
        .map(|c| c.index as u32);
    let level_end = log
        .resolve("level_end", level_end, w, m)
        .context("Could not detect the level column")?;
    let level = cursor.advance(level_end);

    // Player ends at the next separator, looking past the level padding.
    let player_from = (level.end + presets.look_ahead_margin).min(w);
    let after_level =
        Profile::measure_region(plane, Axis::Col, Stat::Mean, player_from, 0, w - player_from, h);
    let player_end =
        first_crossing(&after_level, &sep, Direction::Falling).map(|c| c.index as u32);
    let player_end = log
        .resolve("player_end", player_end, w, m)
        .context("Could not detect the player column")?;
    let player = cursor.advance(player_end + presets.look_ahead_margin);

    // Enemy starts at the first presence of black after the player column.
    let after_player =
        Profile::measure_region(plane, Axis::Col, Stat::Min, player.end, 0, w - player.end, h);
    let enemy_start =
        first_crossing(&after_player, &black, Direction::Rising).map(|c| c.index as u32);
    let enemy_start = log
        .resolve("enemy_start", enemy_start, w, m)
        .context("Could not detect the enemy column start")?;

    // The far edge of the stars block: the last separator rise where the
    // column minimum is still near the global background level.
    let stars_from = (player.end + presets.px_margin).min(w);
    let far_mean =
        Profile::measure_region(plane, Axis::Col, Stat::Mean, stars_from, 0, w - stars_from, h);
    let far_min =
        Profile::measure_region(plane, Axis::Col, Stat::Min, stars_from, 0, w - stars_from, h);
    let guard = Guard { profile: &far_min, min_value: global_min_th * 0.95, window: 0 };
    let stars_col_end = next_crossing_guarded(&far_mean, &sep, Direction::Rising, 0, &guard)
        .map(|c| stars_from + c.index as u32);
    let stars_col_end = log
        .resolve("stars_col_end", stars_col_end, w, m)
        .unwrap_or_else(|| {
            warn!("Could not detect the stars column end, using the block edge");
            w.saturating_sub(margin)
        });

    // Local background between the enemy text and the stars block, with the
    // global level excluded so the local one can surface.
    let local_from = (player.end + enemy_start + presets.px_margin).min(w);
    let local_to = stars_col_end.saturating_sub(presets.px_margin).max(local_from);
    let local_profile = Profile::measure_region(
        plane,
        Axis::Col,
        Stat::Min,
        local_from,
        0,
        local_to - local_from,
        h,
    );
    let local_min_th = sample_or(&local_profile, Some(global_min_th), &presets.lines_local_min);

    // Enemy ends when minimum lightness returns to the local level. The
    // look-ahead skips the widest enemy rank spacing.
    let enemy_from = (player.end + enemy_start + presets.look_ahead_margin).min(w);
    let after_enemy =
        Profile::measure_region(plane, Axis::Col, Stat::Min, enemy_from, 0, w - enemy_from, h);
    let local = Threshold::absolute(local_min_th);
    let enemy_end = first_crossing(&after_enemy, &local, Direction::Rising)
        .map(|c| enemy_from + c.index as u32);
    let enemy_end = log
        .resolve("enemy_end", enemy_end, w, m)
        .context("Could not detect the enemy column end")?;
    let enemy_begin = player.end + enemy_start;
    let mut enemy = cursor.advance_from(enemy_start, enemy_end.saturating_sub(enemy_begin));

    // Percentage begins at the next dark block after the enemy column; the
    // gap between them is split to center the enemy column.
    let after =
        Profile::measure_region(plane, Axis::Col, Stat::Min, enemy.end, 0, w - enemy.end, h);
    let p_begin = first_crossing(&after, &local, Direction::Falling).map(|c| c.index as u32);
    let percentage = match log.resolve("percentage_begin", p_begin, w, m) {
        Some(p_begin) => {
            let center = p_begin / 2 + 1;
            enemy.end += center;
            cursor.pos += center;
            let p_begin_abs = (enemy.end + (p_begin - p_begin / 2)).min(w);

            // The first star is the first presence of white past the
            // percentage text; the stars begin where a backwards scan from
            // it first returns to the local background.
            let after_p = Profile::measure_region(
                plane,
                Axis::Col,
                Stat::Max,
                p_begin_abs,
                0,
                w - p_begin_abs,
                h,
            );
            let white = Threshold::absolute(presets.white);
            let first_star = first_crossing(&after_p, &white, Direction::Rising)
                .map(|c| c.index as u32);
            match log.resolve("first_star", first_star, w, m) {
                Some(first_star) => {
                    let first_star_abs = (p_begin_abs + first_star).min(w);
                    let rev = Profile::measure_region(
                        plane,
                        Axis::Col,
                        Stat::Min,
                        p_begin_abs,
                        0,
                        first_star_abs - p_begin_abs,
                        h,
                    )
                    .reversed();
                    let stars_begin = first_crossing(&rev, &local, Direction::Rising)
                        .map(|c| first_star_abs.saturating_sub(c.index as u32));
                    match log.resolve("stars_begin", stars_begin, w, m) {
                        Some(stars_begin) => {
                            Span { begin: enemy.end, end: stars_begin.max(enemy.end) }
                        }
                        None => {
                            warn!("Could not bound the percentage column, skipping it");
                            Span { begin: enemy.end, end: enemy.end }
                        }
                    }
                }
                None => {
                    warn!("Could not detect the first star, skipping the percentage column");
                    Span { begin: enemy.end, end: enemy.end }
                }
            }
        }
        None => {
            warn!("Could not detect the percentage column start, skipping it");
            Span { begin: enemy.end, end: enemy.end }
        }
    };

    Ok(Columns { rank, level, player, enemy, percentage })
}

/// Walk down the attack lines, one band per player row. A band ends where
/// minimum lightness rises into the gap below the row; the next band starts
/// where it falls again. Whitespace after the final row stays in its band.
pub fn row_bands(plane: &GrayImage, presets: &Presets) -> Result<Vec<RowBand>> {
    let (w, h) = plane.dimensions();
    let row_min = Profile::measure(plane, Axis::Row, Stat::Min);
    let gap_th = sample_or(&row_min, None, &presets.row_gap);
    let th = Threshold::absolute(gap_th);
    debug!("Row gap threshold: {:.4}", gap_th);

    let mut bands = Vec::new();
    let mut top = 0u32;
    while bands.len() < MAX_ROWS {
        let from = top + presets.px_margin;
        if from >= h {
            break;
        }
        let slice = Profile::measure_region(plane, Axis::Row, Stat::Min, 0, from, w, h - from);
        let Some(rise) = first_crossing(&slice, &th, Direction::Rising) else {
            break;
        };
        match next_crossing(&slice, &th, Direction::Falling, rise.index) {
            Some(fall) => {
                let bottom = from + rise.index as u32;
                let band = RowBand { top, bottom };
                let height = band.height();
                bands.push(band);
                if bottom + height >= h {
                    break;
                }
                top = from + fall.index as u32;
            }
            None => {
                // No further row, keep the trailing whitespace in this band.
                bands.push(RowBand { top, bottom: h });
                break;
            }
        }
    }

    if bands.is_empty() {
        bail!("Could not detect any player rows");
    }
    debug!("Detected {} player row(s)", bands.len());
    Ok(bands)
}

/// Split an attack sub-row into the enemy rank glyph and the enemy name
/// text: the first dark block is the rank, the name starts past it.
pub fn split_rank_name(crop: &GrayImage, presets: &Presets) -> Option<(u32, u32)> {
    let col_min = Profile::measure(crop, Axis::Col, Stat::Min);
    let th = Threshold::absolute(sample_or(&col_min, None, &presets.rank_name_split));
    let rank_begin = first_crossing(&col_min, &th, Direction::Falling)?;
    let name_begin = next_crossing(&col_min, &th, Direction::Rising, rank_begin.index)?;
    Some((rank_begin.index as u32, name_begin.index as u32))
}

/// Full progressive extraction for one lightness plane.
pub fn analyze(plane: &GrayImage, presets: &Presets, log: &mut MeasurementLog) -> Result<ScreenLayout> {
    let menu = find_menu(plane, presets, log)?;
    let menu_plane = crop_plane(plane, &menu);
    let (header_end, lines) = find_header_and_lines(&menu_plane, presets, log)?;
    let lines_plane = crop_plane(&menu_plane, &lines);
    let columns = detect_columns(&lines_plane, presets, log)?;
    let rows = row_bands(&lines_plane, presets)?;
    Ok(ScreenLayout { menu, header_end, lines, columns, rows })
}
