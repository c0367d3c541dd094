//! String similarity used by every fuzzy merge step.

use rapidfuzz::fuzz;

/// Normalized indel similarity in `[0, 100]`.
///
/// `100 * 2 * LCS(a, b) / (|a| + |b|)` over characters; two empty strings
/// are identical.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    100.0 * fuzz::ratio(a.chars(), b.chars())
}

/// Index and score of the best match for `query` among `candidates`.
///
/// Ties keep the earliest candidate.
pub fn best_match<'a, I>(query: &str, candidates: I) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.into_iter().enumerate() {
        let score = ratio(query, candidate);
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((idx, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_identical_and_empty() {
        assert!((ratio("acme", "acme") - 100.0).abs() < EPSILON);
        assert!((ratio("", "") - 100.0).abs() < EPSILON);
        assert!(ratio("acme", "").abs() < EPSILON);
    }

    #[test]
    fn test_known_ratios() {
        // LCS("technology company", "tech company") = 12 -> 24 / 30
        assert!((ratio("technology company", "tech company") - 80.0).abs() < EPSILON);
        // LCS = 5 -> 10 / 15
        assert!((ratio("apple inc.", "apple") - 200.0 / 3.0).abs() < EPSILON);
        assert!((ratio("abc", "xyz")).abs() < EPSILON);
    }

    #[test]
    fn test_ratio_is_symmetric_and_char_based() {
        assert!((ratio("straße", "strasse") - ratio("strasse", "straße")).abs() < EPSILON);
        // accented é is a different char: LCS = 3 -> 6 / 8
        assert!((ratio("café", "cafe") - 75.0).abs() < EPSILON);
    }

    #[test]
    fn test_best_match_prefers_first_on_ties() {
        let candidates = ["abcd", "abce", "zzzz"];
        let (idx, score) = best_match("abcx", candidates.iter().copied()).unwrap();
        assert_eq!(idx, 0);
        assert!((score - 75.0).abs() < EPSILON);
        assert!(best_match("abc", std::iter::empty()).is_none());
    }
}
