//! Rank resolution: recognized token first, the session's memory of the
//! player second, and a descending fill over still-free ranks last.

use std::collections::{HashMap, HashSet};
use tracing::debug;
use war_state::{RankSource, WarSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRank {
    pub rank: u32,
    pub source: RankSource,
}

/// Translate a raw rank token to an integer, substituting common
/// digit-shaped misreads through the injected glyph table. Anything else in
/// the token is dropped.
pub fn translate_rank(token: &str, glyphs: &HashMap<char, String>) -> Option<u32> {
    let mut digits = String::new();
    for c in token.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if let Some(replacement) = glyphs.get(&c) {
            digits.push_str(replacement);
        }
    }
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Highest rank not yet taken in this image or earlier in the batch. When
/// every slot up to the team size is occupied the fill continues past the
/// top, so an oversized screenshot degrades instead of failing.
fn next_free_descending(team_size: u32, batch: &HashSet<u32>, image: &HashSet<u32>) -> u32 {
    for rank in (1..=team_size).rev() {
        if !batch.contains(&rank) && !image.contains(&rank) {
            return rank;
        }
    }
    batch.union(image).max().copied().unwrap_or(0) + 1
}

/// Resolve a player's rank. `taken_in_image` holds ranks already given out
/// for this team in the current image; the caller inserts the result into
/// it, which is what keeps ranks unique per team per image.
pub fn resolve_player_rank(
    token: Option<&str>,
    name: &str,
    session: &WarSession,
    taken_in_image: &HashSet<u32>,
    glyphs: &HashMap<char, String>,
) -> ResolvedRank {
    if let Some(rank) = token.and_then(|t| translate_rank(t, glyphs)) {
        if !taken_in_image.contains(&rank) {
            return ResolvedRank { rank, source: RankSource::Read };
        }
        debug!("Rank {rank} read for {name} is already taken in this image");
    }

    if let Some(rank) = session.player_rank(name) {
        if !taken_in_image.contains(&rank) {
            return ResolvedRank { rank, source: RankSource::Recalled };
        }
    }

    let rank =
        next_free_descending(session.team_size(), &session.assigned_player_ranks(), taken_in_image);
    debug!("Estimating rank for {} as {rank}", name.trim());
    ResolvedRank { rank, source: RankSource::Estimated }
}

/// Resolve an attacked enemy's rank. Without a token or a remembered rank
/// for the name, the highest free enemy rank is assumed.
pub fn resolve_enemy_rank(
    token: Option<&str>,
    name: &str,
    session: &WarSession,
    glyphs: &HashMap<char, String>,
) -> ResolvedRank {
    if let Some(rank) = token.and_then(|t| translate_rank(t, glyphs)) {
        return ResolvedRank { rank, source: RankSource::Read };
    }
    if let Some(rank) = session.enemy_rank(name) {
        return ResolvedRank { rank, source: RankSource::Recalled };
    }
    let rank =
        next_free_descending(session.team_size(), &session.assigned_enemy_ranks(), &HashSet::new());
    debug!("Estimating enemy rank for {} as {rank}", name.trim());
    ResolvedRank { rank, source: RankSource::Estimated }
}
