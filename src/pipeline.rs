//! Batch pipeline: screenshots in, resolved player records out.
//!
//! Each image's vision and recognition work runs on a blocking task. The
//! measurement log chains cut expectations from one image to the next and
//! the session's fallback resolution depends on what came before, so images
//! are scanned and applied strictly in filename order.

use anyhow::{bail, Context, Result};
use image::GrayImage;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use war_data::{AliasBook, Presets, Roster};
use war_ocr::{RawToken, SegmentationMode, TesseractEngine, TextRecognizer};
use war_resolve::{
    resolve_ally_name, resolve_enemy_name, resolve_enemy_rank, resolve_player_rank,
    translate_rank,
};
use war_state::{AttackRecord, ImageSummary, PlayerRecord, RankSource, Team, WarSession};
use war_vision::{
    analyze, clean_region, crop_plane, is_blank, lightness_plane, split_rank_name, ArtifactSink,
    MeasurementLog, Rect, RowBand, Span,
};

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub images_dir: PathBuf,
    pub roster_path: PathBuf,
    pub alias_path: PathBuf,
    pub presets_path: Option<PathBuf>,
    pub measurements_path: Option<PathBuf>,
    pub debug_dir: Option<PathBuf>,
    pub team_size: u32,
}

/// Raw per-attack observations from one half of a row band.
#[derive(Debug, Clone)]
pub struct RawAttack {
    pub used: bool,
    pub rank_token: Option<RawToken>,
    pub name_token: Option<RawToken>,
}

/// Raw observations for one player row, before resolution.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub rank_token: Option<RawToken>,
    pub name_token: Option<RawToken>,
    pub attacks: Vec<RawAttack>,
}

#[derive(Debug, Clone)]
pub struct ImageObservation {
    pub image: String,
    pub rows: Vec<RawRow>,
}

fn crop_cell(plane: &GrayImage, band: &RowBand, span: &Span) -> GrayImage {
    let (w, h) = plane.dimensions();
    let x = span.begin.min(w);
    let y = band.top.min(h);
    let cw = span.end.min(w).saturating_sub(x);
    let ch = band.bottom.min(h).saturating_sub(y);
    crop_plane(plane, &Rect { x, y, w: cw, h: ch })
}

/// Upper or lower half of a row band; each player row holds two attacks.
fn attack_band(band: &RowBand, attack: usize) -> RowBand {
    let mid = band.top + band.height() / 2;
    if attack == 0 {
        RowBand { top: band.top, bottom: mid }
    } else {
        RowBand { top: mid, bottom: band.bottom }
    }
}

/// Blocking stage for one screenshot: locate regions, clean them, and read
/// raw tokens. Resolution happens later, in batch order.
pub fn scan_image(
    path: &Path,
    presets: &Presets,
    log: &mut MeasurementLog,
    engine: &dyn TextRecognizer,
    sink: &ArtifactSink,
) -> Result<ImageObservation> {
    let image_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let frame = image::open(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?
        .to_rgba8();

    let plane = lightness_plane(&frame);
    let layout = analyze(&plane, presets, log)?;
    let menu_plane = crop_plane(&plane, &layout.menu);
    let lines_plane = crop_plane(&menu_plane, &layout.lines);

    let mut rows = Vec::with_capacity(layout.rows.len());
    for (row_idx, band) in layout.rows.iter().enumerate() {
        let rank_crop = crop_cell(&lines_plane, band, &layout.columns.rank);
        let rank_clean = clean_region(&rank_crop, presets, false);
        let rank_token = engine.recognize(
            &rank_clean,
            SegmentationMode::SingleGlyph,
            Some(&presets.rank_whitelist),
        );
        if rank_token.is_none() {
            sink.save_region(&format!("{image_name}_row{row_idx}_rank_miss"), &rank_clean);
        }

        let player_crop = crop_cell(&lines_plane, band, &layout.columns.player);
        let player_clean = clean_region(&player_crop, presets, true);
        let name_token = engine.recognize(&player_clean, SegmentationMode::SingleLine, None);
        if name_token.is_none() {
            sink.save_region(&format!("{image_name}_row{row_idx}_player_miss"), &player_clean);
        }

        let mut attacks = Vec::with_capacity(2);
        for attack in 0..2 {
            let half = attack_band(band, attack);
            let enemy_crop = crop_cell(&lines_plane, &half, &layout.columns.enemy);
            let cleaned = clean_region(&enemy_crop, presets, false);
            if is_blank(&cleaned) {
                attacks.push(RawAttack { used: false, rank_token: None, name_token: None });
                continue;
            }

            // The enemy cell holds a rank glyph followed by the name text;
            // split before recognition so each part gets the right
            // segmentation mode.
            match split_rank_name(&enemy_crop, presets) {
                Some((rank_begin, name_begin)) => {
                    let (cw, ch) = cleaned.dimensions();
                    let rank_begin = rank_begin.min(cw);
                    let name_begin = name_begin.min(cw);
                    let rank_part = crop_plane(
                        &cleaned,
                        &Rect { x: rank_begin, y: 0, w: name_begin - rank_begin, h: ch },
                    );
                    let name_part = crop_plane(
                        &cleaned,
                        &Rect { x: name_begin, y: 0, w: cw - name_begin, h: ch },
                    );
                    attacks.push(RawAttack {
                        used: true,
                        rank_token: engine.recognize(
                            &rank_part,
                            SegmentationMode::SingleGlyph,
                            Some(&presets.rank_whitelist),
                        ),
                        name_token: engine.recognize(
                            &name_part,
                            SegmentationMode::SingleLine,
                            None,
                        ),
                    });
                }
                None => {
                    warn!(
                        "Could not split enemy rank and name in {} row {} attack {}",
                        image_name, row_idx, attack
                    );
                    sink.save_region(
                        &format!("{image_name}_row{row_idx}_attack{attack}_split_miss"),
                        &enemy_crop,
                    );
                    attacks.push(RawAttack {
                        used: true,
                        rank_token: None,
                        name_token: engine.recognize(
                            &cleaned,
                            SegmentationMode::SingleLine,
                            None,
                        ),
                    });
                }
            }
        }

        rows.push(RawRow { rank_token, name_token, attacks });
    }

    info!("Scanned {}: {} row(s)", image_name, rows.len());
    Ok(ImageObservation { image: image_name, rows })
}

/// Apply one image's raw observations to the session. Per row the name
/// resolves first, then the rank, then the row's two attacks (enemy name,
/// then enemy rank), so rank fallback can lean on the resolved identity.
pub fn apply_observation(
    obs: &ImageObservation,
    session: &mut WarSession,
    roster: &Roster,
    aliases: &AliasBook,
    presets: &Presets,
) -> (Vec<PlayerRecord>, ImageSummary) {
    let mut summary = ImageSummary::new(obs.image.clone());
    let mut records = Vec::new();
    let mut taken: HashSet<u32> = HashSet::new();

    for row in &obs.rows {
        let Some(name_token) = &row.name_token else {
            warn!("No player name read in {}, skipping the row", obs.image);
            continue;
        };
        let rank_token = row.rank_token.as_ref().map(|t| t.text.as_str());
        let read_rank = rank_token.and_then(|t| translate_rank(t, &presets.digit_glyphs));

        let Some(resolved_name) = resolve_ally_name(
            &name_token.text,
            read_rank,
            roster,
            aliases,
            session,
            presets.ally_min_similarity,
        ) else {
            continue;
        };
        let resolved_rank = resolve_player_rank(
            rank_token,
            &resolved_name.name,
            session,
            &taken,
            &presets.digit_glyphs,
        );
        taken.insert(resolved_rank.rank);
        session.assign_player(&resolved_name.name, resolved_rank.rank);

        let mut attacks = Vec::with_capacity(row.attacks.len());
        for raw in &row.attacks {
            if !raw.used {
                attacks.push(AttackRecord::unused());
                continue;
            }
            let enemy = raw.name_token.as_ref().and_then(|t| {
                resolve_enemy_name(&t.text, session, presets.enemy_min_similarity)
            });
            match enemy {
                Some(enemy) => {
                    let rank = resolve_enemy_rank(
                        raw.rank_token.as_ref().map(|t| t.text.as_str()),
                        &enemy.name,
                        session,
                        &presets.digit_glyphs,
                    );
                    session.assign_enemy(&enemy.name, rank.rank);
                    attacks.push(AttackRecord {
                        enemy_rank: Some(rank.rank),
                        enemy_name: Some(enemy.name),
                        rank_source: Some(rank.source),
                        name_source: Some(enemy.source),
                    });
                }
                None => {
                    // Attack was used but the enemy name is unreadable.
                    // Keep whatever the rank token says.
                    let rank = raw
                        .rank_token
                        .as_ref()
                        .and_then(|t| translate_rank(&t.text, &presets.digit_glyphs));
                    attacks.push(AttackRecord {
                        enemy_rank: rank,
                        enemy_name: None,
                        rank_source: rank.map(|_| RankSource::Read),
                        name_source: None,
                    });
                }
            }
        }

        let needs_review =
            resolved_name.needs_review || resolved_rank.source == RankSource::Estimated;
        let record = PlayerRecord {
            team: Team::Ally,
            rank: resolved_rank.rank,
            name: resolved_name.name,
            rank_source: resolved_rank.source,
            name_source: resolved_name.source,
            needs_review,
            attacks,
        };
        summary.tally(&record);
        records.push(record);
    }

    (records, summary)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read images directory {}", dir.display()))?;
    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_ascii_lowercase())
                    .as_deref(),
                Some("png" | "jpg" | "jpeg")
            )
        })
        .collect();
    images.sort();
    if images.is_empty() {
        bail!("No screenshots found in {}", dir.display());
    }
    Ok(images)
}

/// Run the whole batch. Resolved records and per-image summaries go to
/// stdout as JSON lines; a failed image is reported and skipped, never
/// aborting the batch.
pub async fn run_batch(config: BatchConfig) -> Result<()> {
    let presets = match &config.presets_path {
        Some(path) => Presets::load(path)?,
        None => Presets::default(),
    };
    let roster = Roster::load(&config.roster_path)?;
    if roster.is_empty() {
        warn!("Roster is empty, every own-team name will be accepted as read");
    }
    let aliases = AliasBook::load(&config.alias_path)?;
    let mut log = match &config.measurements_path {
        Some(path) => MeasurementLog::load(path)?,
        None => MeasurementLog::default(),
    };
    let sink = ArtifactSink::new(config.debug_dir.clone());
    let engine = Arc::new(TesseractEngine::new());
    let mut session = WarSession::new(config.team_size);

    let images = list_images(&config.images_dir)?;
    info!("Processing {} screenshot(s) from {}", images.len(), config.images_dir.display());

    for path in images {
        let presets_task = presets.clone();
        let sink_task = sink.clone();
        let engine_task = engine.clone();
        let mut log_task = log.clone();
        let path_task = path.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let result = scan_image(
                &path_task,
                &presets_task,
                &mut log_task,
                engine_task.as_ref(),
                &sink_task,
            );
            (result, log_task)
        })
        .await;
        // A panicking image fails like any other: the batch moves on with
        // the log state from before that image.
        let (result, updated_log) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Vision task for {} failed: {}", path.display(), e);
                continue;
            }
        };
        log = updated_log;

        match result {
            Ok(obs) => {
                let (records, summary) =
                    apply_observation(&obs, &mut session, &roster, &aliases, &presets);
                for record in &records {
                    println!("{}", serde_json::to_string(record)?);
                }
                println!("{}", serde_json::to_string(&summary)?);
            }
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
            }
        }
    }

    if let Some(path) = &config.measurements_path {
        log.save(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use war_state::NameSource;

    fn token(text: &str) -> Option<RawToken> {
        Some(RawToken { text: text.to_string(), confidence: 90.0 })
    }

    fn fixtures() -> (Roster, AliasBook, Presets) {
        let roster = Roster::from_names(vec!["Alice".into(), "Bob".into(), "Carol".into()]);
        (roster, AliasBook::default(), Presets::default())
    }

    #[test]
    fn test_apply_resolves_rows_in_order() {
        let (roster, aliases, presets) = fixtures();
        let mut session = WarSession::new(3);
        let obs = ImageObservation {
            image: "war_01.png".to_string(),
            rows: vec![
                RawRow {
                    rank_token: token("3"),
                    name_token: token("Alice"),
                    attacks: vec![
                        RawAttack { used: true, rank_token: token("2"), name_token: token("Mallory") },
                        RawAttack { used: false, rank_token: None, name_token: None },
                    ],
                },
                RawRow {
                    rank_token: token("?"),
                    name_token: token("B0b"),
                    attacks: vec![
                        RawAttack { used: false, rank_token: None, name_token: None },
                        RawAttack { used: false, rank_token: None, name_token: None },
                    ],
                },
            ],
        };

        let (records, summary) = apply_observation(&obs, &mut session, &roster, &aliases, &presets);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Alice");
        assert_eq!(records[0].rank, 3);
        assert_eq!(records[0].rank_source, RankSource::Read);
        assert_eq!(records[1].name, "Bob");
        assert_eq!(records[1].name_source, NameSource::Fuzzy);
        // Unreadable rank token falls to the highest free rank.
        assert_eq!(records[1].rank, 2);
        assert_eq!(records[1].rank_source, RankSource::Estimated);
        assert!(records[1].needs_review);

        assert_eq!(records[0].attacks[0].enemy_name.as_deref(), Some("Mallory"));
        assert_eq!(records[0].attacks[0].enemy_rank, Some(2));
        assert!(!records[0].attacks[1].is_used());

        assert_eq!(summary.players, 2);
        assert_eq!(summary.ranks_read, 1);
        assert_eq!(summary.ranks_estimated, 1);
        assert_eq!(summary.review_flags, 1);
    }

    #[test]
    fn test_ranks_stay_unique_within_one_image() {
        let (roster, aliases, presets) = fixtures();
        let mut session = WarSession::new(3);
        // Both rows misread as rank 3; the second must not duplicate it.
        let rows = ["Alice", "Bob"]
            .iter()
            .map(|name| RawRow {
                rank_token: token("3"),
                name_token: token(name),
                attacks: vec![],
            })
            .collect();
        let obs = ImageObservation { image: "war_02.png".to_string(), rows };
        let (records, _) = apply_observation(&obs, &mut session, &roster, &aliases, &presets);
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].rank, records[1].rank);
    }

    #[test]
    fn test_recalled_rank_on_second_image() {
        let (roster, aliases, presets) = fixtures();
        let mut session = WarSession::new(3);
        let first = ImageObservation {
            image: "war_01.png".to_string(),
            rows: vec![RawRow { rank_token: token("2"), name_token: token("Carol"), attacks: vec![] }],
        };
        apply_observation(&first, &mut session, &roster, &aliases, &presets);

        let second = ImageObservation {
            image: "war_02.png".to_string(),
            rows: vec![RawRow { rank_token: None, name_token: token("Carol"), attacks: vec![] }],
        };
        let (records, summary) =
            apply_observation(&second, &mut session, &roster, &aliases, &presets);
        assert_eq!(records[0].rank, 2);
        assert_eq!(records[0].rank_source, RankSource::Recalled);
        assert_eq!(summary.ranks_recalled, 1);
    }

    #[test]
    fn test_row_without_name_is_skipped() {
        let (roster, aliases, presets) = fixtures();
        let mut session = WarSession::new(3);
        let obs = ImageObservation {
            image: "war_03.png".to_string(),
            rows: vec![RawRow { rank_token: token("1"), name_token: None, attacks: vec![] }],
        };
        let (records, summary) = apply_observation(&obs, &mut session, &roster, &aliases, &presets);
        assert!(records.is_empty());
        assert_eq!(summary.players, 0);
    }

    #[test]
    fn test_attack_band_splits_row_in_half() {
        let band = RowBand { top: 10, bottom: 30 };
        assert_eq!(attack_band(&band, 0), RowBand { top: 10, bottom: 20 });
        assert_eq!(attack_band(&band, 1), RowBand { top: 20, bottom: 30 });
    }

    #[tokio::test]
    async fn test_batch_survives_a_failing_image_and_saves_the_log() {
        let dir = std::env::temp_dir().join("warline_run_batch_test");
        let _ = std::fs::remove_dir_all(&dir);
        let images = dir.join("images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("broken.png"), b"not a png").unwrap();
        let roster = dir.join("players.txt");
        std::fs::write(&roster, "Alice\n").unwrap();
        let measurements = dir.join("measurements.json");

        let config = BatchConfig {
            images_dir: images,
            roster_path: roster,
            alias_path: dir.join("aliases.json"),
            presets_path: None,
            measurements_path: Some(measurements.clone()),
            debug_dir: None,
            team_size: 3,
        };
        run_batch(config).await.unwrap();
        assert!(measurements.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_list_images_sorts_and_filters() {
        let dir = std::env::temp_dir().join("warline_list_images_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.png", "a.jpg", "notes.txt", "c.JPEG"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        let images = list_images(&dir).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.JPEG"]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
