//! Session state for one screenshot batch.
//!
//! A `WarSession` is created empty at batch start, updated as each image's
//! rows resolve, and discarded (or persisted forward for a chained run) at
//! batch end. It is the only state shared across images, so updates must be
//! applied in a fixed image order for deterministic fallback resolution.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which side of the war a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Team {
    Ally,
    Enemy,
}

/// How a rank was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankSource {
    /// Translated directly from the recognized token.
    Read,
    /// Reused from an earlier image in the batch.
    Recalled,
    /// Filled from the next available rank; may be wrong.
    Estimated,
}

/// How a name was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameSource {
    /// Exact roster or observed-set match.
    Exact,
    /// Similarity match above the minimum.
    Fuzzy,
    /// Accepted as read, first observation of an unknown name.
    Verbatim,
    /// Chosen from a multi-account alias group.
    Alias,
}

/// One attack sub-row. `enemy_name` of `None` means the attack was not used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackRecord {
    pub enemy_rank: Option<u32>,
    pub enemy_name: Option<String>,
    pub rank_source: Option<RankSource>,
    pub name_source: Option<NameSource>,
}

impl AttackRecord {
    pub fn unused() -> Self {
        Self { enemy_rank: None, enemy_name: None, rank_source: None, name_source: None }
    }

    pub fn is_used(&self) -> bool {
        self.enemy_name.is_some()
    }
}

/// Final output for one player row: resolved once per image, immutable
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub team: Team,
    pub rank: u32,
    pub name: String,
    pub rank_source: RankSource,
    pub name_source: NameSource,
    /// Set on estimated ranks and ambiguous alias picks; surfaced for
    /// manual review instead of being silently trusted.
    pub needs_review: bool,
    pub attacks: Vec<AttackRecord>,
}

/// Per-image confidence summary, emitted with the image's records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageSummary {
    pub image: String,
    pub players: u32,
    pub ranks_read: u32,
    pub ranks_recalled: u32,
    pub ranks_estimated: u32,
    pub names_exact: u32,
    pub names_fuzzy: u32,
    pub names_verbatim: u32,
    pub review_flags: u32,
}

impl ImageSummary {
    pub fn new(image: impl Into<String>) -> Self {
        Self { image: image.into(), ..Self::default() }
    }

    pub fn tally(&mut self, record: &PlayerRecord) {
        self.players += 1;
        match record.rank_source {
            RankSource::Read => self.ranks_read += 1,
            RankSource::Recalled => self.ranks_recalled += 1,
            RankSource::Estimated => self.ranks_estimated += 1,
        }
        match record.name_source {
            NameSource::Exact => self.names_exact += 1,
            NameSource::Fuzzy | NameSource::Alias => self.names_fuzzy += 1,
            NameSource::Verbatim => self.names_verbatim += 1,
        }
        if record.needs_review {
            self.review_flags += 1;
        }
    }
}

/// Accumulating per-batch state consumed by the resolvers: ranks and names
/// already assigned, observed enemy names, and which aliases of each
/// multi-account family have been handed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarSession {
    team_size: u32,
    player_ranks: HashMap<String, u32>,
    rank_holders: HashMap<u32, String>,
    enemies_seen: HashSet<String>,
    enemy_ranks: HashMap<String, u32>,
    enemy_rank_holders: HashMap<u32, String>,
    used_aliases: HashMap<String, HashSet<String>>,
}

impl WarSession {
    pub fn new(team_size: u32) -> Self {
        Self {
            team_size,
            player_ranks: HashMap::new(),
            rank_holders: HashMap::new(),
            enemies_seen: HashSet::new(),
            enemy_ranks: HashMap::new(),
            enemy_rank_holders: HashMap::new(),
            used_aliases: HashMap::new(),
        }
    }

    pub fn team_size(&self) -> u32 {
        self.team_size
    }

    pub fn seen_player(&self, name: &str) -> bool {
        self.player_ranks.contains_key(name)
    }

    pub fn player_rank(&self, name: &str) -> Option<u32> {
        self.player_ranks.get(name).copied()
    }

    /// Name currently holding a rank slot on the own team.
    pub fn rank_holder(&self, rank: u32) -> Option<&str> {
        self.rank_holders.get(&rank).map(String::as_str)
    }

    pub fn assign_player(&mut self, name: &str, rank: u32) {
        self.player_ranks.insert(name.to_string(), rank);
        self.rank_holders.insert(rank, name.to_string());
    }

    pub fn assigned_player_ranks(&self) -> HashSet<u32> {
        self.rank_holders.keys().copied().collect()
    }

    pub fn seen_enemy(&self, name: &str) -> bool {
        self.enemies_seen.contains(name)
    }

    pub fn enemy_rank(&self, name: &str) -> Option<u32> {
        self.enemy_ranks.get(name).copied()
    }

    pub fn assign_enemy(&mut self, name: &str, rank: u32) {
        self.enemies_seen.insert(name.to_string());
        self.enemy_ranks.insert(name.to_string(), rank);
        self.enemy_rank_holders.insert(rank, name.to_string());
    }

    /// Record an enemy observed without a usable rank yet.
    pub fn observe_enemy(&mut self, name: &str) {
        self.enemies_seen.insert(name.to_string());
    }

    pub fn assigned_enemy_ranks(&self) -> HashSet<u32> {
        self.enemy_rank_holders.keys().copied().collect()
    }

    /// Observed enemy names, for matching later tokens against.
    pub fn enemy_names(&self) -> impl Iterator<Item = &str> {
        self.enemies_seen.iter().map(String::as_str)
    }

    pub fn alias_used(&self, family: &str, alias: &str) -> bool {
        self.used_aliases
            .get(family)
            .map(|used| used.contains(alias))
            .unwrap_or(false)
    }

    pub fn mark_alias_used(&mut self, family: &str, alias: &str) {
        self.used_aliases
            .entry(family.to_string())
            .or_default()
            .insert(alias.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_tracks_player_ranks() {
        let mut session = WarSession::new(30);
        assert!(!session.seen_player("Alice"));
        session.assign_player("Alice", 5);
        assert!(session.seen_player("Alice"));
        assert_eq!(session.player_rank("Alice"), Some(5));
        assert_eq!(session.rank_holder(5), Some("Alice"));
        assert!(session.assigned_player_ranks().contains(&5));
    }

    #[test]
    fn test_session_tracks_enemies_separately() {
        let mut session = WarSession::new(30);
        session.assign_player("Alice", 5);
        assert!(!session.seen_enemy("Alice"));
        session.assign_enemy("Mallory", 5);
        assert_eq!(session.enemy_rank("Mallory"), Some(5));
        assert_eq!(session.player_rank("Mallory"), None);
    }

    #[test]
    fn test_observed_enemy_without_rank_is_seen() {
        let mut session = WarSession::new(30);
        session.observe_enemy("Mallory");
        assert!(session.seen_enemy("Mallory"));
        assert!(session.enemy_names().any(|n| n == "Mallory"));
    }

    #[test]
    fn test_alias_bookkeeping() {
        let mut session = WarSession::new(30);
        assert!(!session.alias_used("ClanBoss", "Alice"));
        session.mark_alias_used("ClanBoss", "Alice");
        assert!(session.alias_used("ClanBoss", "Alice"));
        assert!(!session.alias_used("ClanBoss", "Bob"));
    }

    #[test]
    fn test_summary_tally() {
        let mut summary = ImageSummary::new("war_01.png");
        let record = PlayerRecord {
            team: Team::Ally,
            rank: 3,
            name: "Alice".to_string(),
            rank_source: RankSource::Estimated,
            name_source: NameSource::Fuzzy,
            needs_review: true,
            attacks: vec![AttackRecord::unused()],
        };
        summary.tally(&record);
        assert_eq!(summary.players, 1);
        assert_eq!(summary.ranks_estimated, 1);
        assert_eq!(summary.names_fuzzy, 1);
        assert_eq!(summary.review_flags, 1);
    }
}
