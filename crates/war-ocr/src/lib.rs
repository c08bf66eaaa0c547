//! Recognition adapter boundary: cleaned region in, raw token out.
//!
//! The engine behind the boundary is a black box to the rest of the
//! workspace. The Tesseract implementation shells out to the `tesseract`
//! binary and degrades to "not recognized" when it is missing or fails;
//! resolution fallbacks handle the rest.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Expected text layout of a region, constraining the engine's page
/// segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    /// One rank glyph.
    SingleGlyph,
    /// One line of name text.
    SingleLine,
}

impl SegmentationMode {
    fn psm(self) -> &'static str {
        match self {
            SegmentationMode::SingleGlyph => "10",
            SegmentationMode::SingleLine => "7",
        }
    }
}

/// Recognized text with the engine's mean word confidence (0-100).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToken {
    pub text: String,
    pub confidence: f32,
}

pub trait TextRecognizer: Send + Sync {
    /// Recognize text in a cleaned region. `None` means nothing usable was
    /// read; it is never an error.
    fn recognize(
        &self,
        region: &GrayImage,
        mode: SegmentationMode,
        whitelist: Option<&str>,
    ) -> Option<RawToken>;
}

static CALL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Tesseract-backed recognizer. Falls back gracefully when Tesseract is not
/// installed.
pub struct TesseractEngine {
    available: bool,
    temp_dir: PathBuf,
}

impl TesseractEngine {
    pub fn new() -> Self {
        let available = check_tesseract();
        if available {
            debug!("Tesseract OCR available");
        } else {
            warn!("Tesseract not found. Recognition disabled; all tokens fall back.");
        }

        let temp_dir = std::env::temp_dir().join("warline_ocr");
        let _ = std::fs::create_dir_all(&temp_dir);

        Self { available, temp_dir }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    fn run_tesseract(
        &self,
        region: &GrayImage,
        mode: SegmentationMode,
        whitelist: Option<&str>,
    ) -> Option<RawToken> {
        // Regions from parallel images must not clobber each other's input.
        let seq = CALL_SEQ.fetch_add(1, Ordering::Relaxed);
        let temp_path = self.temp_dir.join(format!("region_{}_{seq}.png", std::process::id()));
        if let Err(e) = region.save(&temp_path) {
            warn!("Failed to save recognition input: {}", e);
            return None;
        }

        let mut command = Command::new("tesseract");
        command
            .arg(&temp_path)
            .arg("stdout")
            .arg("--psm")
            .arg(mode.psm());
        if let Some(whitelist) = whitelist {
            command
                .arg("-c")
                .arg(format!("tessedit_char_whitelist={whitelist}"));
        }
        command.arg("tsv");

        let output = command.output();
        let _ = std::fs::remove_file(&temp_path);

        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!("Tesseract exited with {}", output.status);
                return None;
            }
            Err(e) => {
                warn!("Failed to invoke Tesseract: {}", e);
                return None;
            }
        };

        let tsv = String::from_utf8_lossy(&output.stdout);
        let token = parse_tsv(&tsv)?;
        debug!("Recognized '{}' at confidence {:.0}", token.text, token.confidence);
        Some(token)
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for TesseractEngine {
    fn recognize(
        &self,
        region: &GrayImage,
        mode: SegmentationMode,
        whitelist: Option<&str>,
    ) -> Option<RawToken> {
        if !self.available || region.width() == 0 || region.height() == 0 {
            return None;
        }
        self.run_tesseract(region, mode, whitelist)
    }
}

/// Parse Tesseract TSV output into one token: word-level entries joined with
/// spaces, confidence averaged over them.
///
/// TSV fields: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Level 5 is a word.
fn parse_tsv(tsv: &str) -> Option<RawToken> {
    let mut words: Vec<&str> = Vec::new();
    let mut conf_sum = 0.0f32;

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        let level: i32 = fields[0].parse().unwrap_or(-1);
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        let text = fields[11].trim();
        if level != 5 || conf < 0.0 || text.is_empty() {
            continue;
        }
        words.push(text);
        conf_sum += conf;
    }

    if words.is_empty() {
        return None;
    }
    let confidence = conf_sum / words.len() as f32;
    Some(RawToken { text: words.join(" "), confidence })
}

/// Check if Tesseract is installed and accessible.
fn check_tesseract() -> bool {
    Command::new("tesseract")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word_row(conf: &str, text: &str) -> String {
        format!("5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn test_parse_tsv_joins_words_and_averages_confidence() {
        let tsv = format!(
            "{HEADER}\n{}\n{}\n",
            word_row("90", "Clan"),
            word_row("70", "Boss")
        );
        let token = parse_tsv(&tsv).unwrap();
        assert_eq!(token.text, "Clan Boss");
        assert!((token.confidence - 80.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_tsv_skips_non_word_levels_and_empty_text() {
        let tsv = format!(
            "{HEADER}\n4\t1\t1\t1\t1\t0\t0\t0\t10\t10\t-1\t\n{}\n",
            word_row("-1", "ghost")
        );
        assert!(parse_tsv(&tsv).is_none());
    }

    #[test]
    fn test_parse_tsv_single_glyph() {
        let tsv = format!("{HEADER}\n{}\n", word_row("55", "3"));
        let token = parse_tsv(&tsv).unwrap();
        assert_eq!(token.text, "3");
        assert!((token.confidence - 55.0).abs() < 1e-6);
    }

    #[test]
    fn test_segmentation_modes_map_to_psm() {
        assert_eq!(SegmentationMode::SingleGlyph.psm(), "10");
        assert_eq!(SegmentationMode::SingleLine.psm(), "7");
    }

    #[test]
    fn test_unavailable_engine_returns_none() {
        let engine = TesseractEngine { available: false, temp_dir: std::env::temp_dir() };
        let region = GrayImage::new(10, 10);
        assert!(engine
            .recognize(&region, SegmentationMode::SingleLine, None)
            .is_none());
    }
}
