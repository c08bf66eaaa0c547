//! String similarity for noisy recognized names: a normalized Levenshtein
//! ratio (0-100) over case-folded alphanumeric text.

/// Canonical comparison form of a token: lowercased, with every
/// non-alphanumeric run collapsed to a single space.
pub fn clean(token: &str) -> String {
    token
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_lowercase().next().unwrap_or(c) } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Similarity ratio between two tokens after cleaning, 0 (unrelated) to 100
/// (identical).
pub fn ratio(a: &str, b: &str) -> u32 {
    let a: Vec<char> = clean(a).chars().collect();
    let b: Vec<char> = clean(b).chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 100;
    }
    let dist = levenshtein(&a, &b);
    (100.0 * (1.0 - dist as f64 / max_len as f64)).round() as u32
}

/// Candidate scoring at least `min_similarity` against the token, highest
/// ratio first.
pub fn best_match<'a, I>(token: &str, candidates: I, min_similarity: u32) -> Option<(&'a str, u32)>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .map(|candidate| (candidate, ratio(token, candidate)))
        .max_by_key(|&(_, score)| score)
        .filter(|&(_, score)| score >= min_similarity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_folds_case_and_symbols() {
        assert_eq!(clean("  Clan-Boss!! "), "clan boss");
        assert_eq!(clean("★★★"), "");
    }

    #[test]
    fn test_identical_after_cleaning_is_100() {
        assert_eq!(ratio("Alice", "alice"), 100);
        assert_eq!(ratio("Clan Boss", "clan-boss"), 100);
    }

    #[test]
    fn test_single_misread_scores_high() {
        // One substituted character out of five.
        assert_eq!(ratio("A1ice", "Alice"), 80);
    }

    #[test]
    fn test_unrelated_names_score_low() {
        assert!(ratio("Alice", "Zorblax") < 30);
        assert_eq!(ratio("", "Alice"), 0);
    }

    #[test]
    fn test_best_match_picks_highest_above_minimum() {
        let roster = ["Alice", "Alicia", "Bob"];
        let (name, score) = best_match("Alise", roster.iter().copied(), 65).unwrap();
        assert_eq!(name, "Alice");
        assert!(score >= 65);
        assert!(best_match("Zorblax", roster.iter().copied(), 65).is_none());
    }
}
