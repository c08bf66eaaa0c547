//! Name resolution: roster fuzzy matching for the own team, an accumulating
//! observed set for the enemy team, and multi-account alias handling.

use crate::similarity::{best_match, clean};
use tracing::{debug, warn};
use war_data::{AliasBook, Roster};
use war_state::{NameSource, WarSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub name: String,
    pub source: NameSource,
    pub needs_review: bool,
}

/// Resolve an own-team name token.
///
/// The token is matched against the roster first. If the result belongs to
/// a tracked multi-account family, the family member already holding this
/// row's rank slot is reused; otherwise the strongest alias not yet handed
/// out in this batch is taken and flagged for review. A family whose
/// aliases are exhausted yields `None` and the row is skipped.
pub fn resolve_ally_name(
    token: &str,
    read_rank: Option<u32>,
    roster: &Roster,
    aliases: &AliasBook,
    session: &mut WarSession,
    min_similarity: u32,
) -> Option<ResolvedName> {
    let cleaned = clean(token);
    if cleaned.is_empty() {
        return None;
    }

    let (name, source, mut needs_review) =
        match best_match(token, roster.names().iter().map(String::as_str), min_similarity) {
            Some((matched, 100)) => (matched.to_string(), NameSource::Exact, false),
            Some((matched, score)) => {
                debug!("Matched '{}' to roster name '{}' at {}", cleaned, matched, score);
                (matched.to_string(), NameSource::Fuzzy, false)
            }
            None => {
                warn!("No roster match for '{}', accepting it as read", cleaned);
                (token.trim().to_string(), NameSource::Verbatim, true)
            }
        };

    let Some(family) = aliases.family_of(&name).map(str::to_string) else {
        return Some(ResolvedName { name, source, needs_review });
    };

    // Same rank slot already occupied by this family: the row is the same
    // account seen before.
    if let Some(rank) = read_rank {
        if let Some(holder) = session.rank_holder(rank) {
            if aliases.family_of(holder) == Some(family.as_str()) {
                let holder = holder.to_string();
                return Some(ResolvedName {
                    name: holder,
                    source: NameSource::Alias,
                    needs_review: false,
                });
            }
        }
    }

    // Otherwise hand out the strongest alias still unused in this batch.
    let members = aliases.members(&family)?;
    match members.iter().find(|m| !session.alias_used(&family, m)) {
        Some(alias) => {
            let alias = alias.clone();
            session.mark_alias_used(&family, &alias);
            needs_review = true;
            debug!("Token '{}' resolved to alias '{}' of {}", cleaned, alias, family);
            Some(ResolvedName { name: alias, source: NameSource::Alias, needs_review })
        }
        None => {
            warn!("Every alias of {} is already used, skipping this row", family);
            None
        }
    }
}

/// Resolve an enemy name token. The first token for an unknown enemy is
/// accepted verbatim into the session's observed set; later tokens are
/// matched against that set, since only internal consistency matters for
/// the opposing team.
pub fn resolve_enemy_name(
    token: &str,
    session: &mut WarSession,
    min_similarity: u32,
) -> Option<ResolvedName> {
    let cleaned = clean(token);
    if cleaned.is_empty() {
        return None;
    }

    let matched = best_match(token, session.enemy_names(), min_similarity)
        .map(|(name, score)| (name.to_string(), score));
    match matched {
        Some((name, 100)) => {
            Some(ResolvedName { name, source: NameSource::Exact, needs_review: false })
        }
        Some((name, score)) => {
            debug!("Matched enemy '{}' to observed '{}' at {}", cleaned, name, score);
            Some(ResolvedName { name, source: NameSource::Fuzzy, needs_review: false })
        }
        None => {
            let name = token.trim().to_string();
            session.observe_enemy(&name);
            Some(ResolvedName { name, source: NameSource::Verbatim, needs_review: false })
        }
    }
}
