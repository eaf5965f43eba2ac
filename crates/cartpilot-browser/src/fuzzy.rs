//! Approximate string equality for reconciling requested item names with
//! on-page listings. Pure and deterministic, no shared state.

/// Lowercase, strip non-alphanumeric/non-space characters, collapse
/// internal whitespace.
pub fn normalize(s: &str) -> String {
    let stripped: String = s
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Does the candidate's display name match the requested item name?
///
/// True iff the normalized strings are equal, one contains the other, or at
/// least 70% of the query's words longer than 2 characters overlap
/// (substring containment, either direction) with some candidate word.
pub fn is_match(candidate: &str, query: &str) -> bool {
    let candidate = normalize(candidate);
    let query = normalize(query);
    if candidate.is_empty() || query.is_empty() {
        return false;
    }
    if candidate == query || candidate.contains(&query) || query.contains(&candidate) {
        return true;
    }

    let candidate_words: Vec<&str> = candidate.split(' ').collect();
    let significant: Vec<&str> = query.split(' ').filter(|w| w.len() > 2).collect();
    if significant.is_empty() {
        return false;
    }

    let overlapping = significant
        .iter()
        .filter(|qw| {
            candidate_words
                .iter()
                .any(|cw| cw.contains(*qw) || qw.contains(cw))
        })
        .count();

    (overlapping as f64 / significant.len() as f64) >= 0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("Chicken Bowl!"), "chicken bowl");
        assert_eq!(normalize("  Spicy   Tuna-Roll  "), "spicy tunaroll");
        assert_eq!(normalize("Café au Lait"), "café au lait");
    }

    #[test]
    fn test_exact_and_substring() {
        assert!(is_match("Chicken Bowl", "chicken bowl!"));
        assert!(is_match("Large Chicken Bowl Combo", "Chicken Bowl"));
        assert!(is_match("Bowl", "Chicken Bowl")); // query contains candidate
    }

    #[test]
    fn test_word_overlap() {
        // "chicken" and "bowl" both overlap words of the candidate.
        assert!(is_match("Chicken Burrito Bowl", "Chicken Bowl"));
    }

    #[test]
    fn test_no_match() {
        assert!(!is_match("Salad", "Burger"));
        assert!(!is_match("", "Burger"));
        assert!(!is_match("Salad", ""));
    }

    #[test]
    fn test_short_words_ignored() {
        // Only words longer than 2 chars count toward the 70% bar.
        assert!(is_match("Fresh Orange Juice Box", "an orange juice"));
    }

    #[test]
    fn test_below_threshold() {
        // One of three significant words overlaps — 33%, below 70%.
        assert!(!is_match("Chicken Wrap", "chicken noodle casserole"));
    }
}
