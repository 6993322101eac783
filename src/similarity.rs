//! Name similarity with categorical bonuses.
//!
//! Scores are unbounded above 1.0: an exact name match is pinned to 1.0 and
//! the identifier and type bonuses are added on top. Treat 1.0 as a match
//! floor, not a ceiling.

use std::collections::{BTreeSet, HashMap};

use crate::normalize::{extension, normalize};

/// Exclusive lower bound for accepting a candidate.
pub const MATCH_THRESHOLD: f64 = 0.3;

const IDENTIFIER_BONUS: f64 = 0.2;
const TYPE_MATCH_BONUS: f64 = 0.3;
const TYPE_MISMATCH_PENALTY: f64 = 0.2;

/// File extensions implied by a declared type hint.
pub fn extensions_for_type(declared: &str) -> &'static [&'static str] {
    match declared.to_lowercase().as_str() {
        "google docs" | "google doc" | "document" => &[".docx", ".doc", ".txt"],
        "pdf" => &[".pdf"],
        "video" => &[".mp4", ".avi", ".mov", ".mkv", ".wmv"],
        "google sheets" | "google sheet" | "spreadsheet" => &[".xlsx", ".xls", ".csv"],
        "google slides" | "google slide" | "presentation" => &[".pptx", ".ppt"],
        _ => &[],
    }
}

/// Similarity ratio `2 * M / T` where `M` is the number of characters in
/// matching blocks and `T` the combined length. Matching blocks are found by
/// recursively taking the longest common substring, leftmost on ties.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_chars(&a, &b);
    2.0 * matched as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest block `a[i..i+k] == b[j..j+k]` inside the given windows.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
    // j2len[j] = length of the match ending at a[i-1], b[j]
    let mut j2len: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| j2len.get(&prev))
                    .copied()
                    .unwrap_or(0)
                    + 1;
                next.insert(j, k);
                if k > best_k {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_k = k;
                }
            }
        }
        j2len = next;
    }

    (best_i, best_j, best_k)
}

/// Ranking score of a local file against a target document.
///
/// Order of adjustments: base ratio over normalized names, exact-match
/// override to 1.0, identifier containment bonus, declared-type bonus or
/// penalty.
pub fn score(
    target_name: &str,
    identifier: Option<&str>,
    declared_types: &BTreeSet<String>,
    candidate_filename: &str,
) -> f64 {
    let target = normalize(target_name);
    let candidate = normalize(candidate_filename);

    let mut score = sequence_ratio(&target, &candidate);
    if target == candidate {
        score = 1.0;
    }

    if let Some(id) = identifier.filter(|id| !id.is_empty()) {
        if candidate_filename.to_lowercase().contains(&id.to_lowercase()) {
            score += IDENTIFIER_BONUS;
        }
    }

    if !declared_types.is_empty() {
        let ext = extension(candidate_filename);
        let type_match = declared_types
            .iter()
            .any(|t| extensions_for_type(t).contains(&ext.as_str()));
        if type_match {
            score += TYPE_MATCH_BONUS;
        } else {
            score -= TYPE_MISMATCH_PENALTY;
        }
    }

    score
}

/// Whether a score clears the acceptance threshold.
pub fn accepts(score: f64) -> bool {
    score > MATCH_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sequence_ratio_known_values() {
        assert_eq!(sequence_ratio("", ""), 1.0);
        assert_eq!(sequence_ratio("abc", ""), 0.0);
        assert_eq!(sequence_ratio("abcd", "abcd"), 1.0);
        // "abcd" vs "bcde": block "bcd" -> 2*3/8
        assert!((sequence_ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
        // Blocks "a" and "c" around the mismatch -> 2*2/6
        assert!((sequence_ratio("abc", "axc") - 4.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_sequence_ratio_matches_recursive_blocks() {
        // Longest block "dney", then "sy" on the left: M = 6, T = 13
        let r = sequence_ratio("sydney", "syxdney");
        assert!((r - 12.0 / 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_identity_scores_exactly_one() {
        let none = BTreeSet::new();
        for s in ["Syllabus", "Week 1 notes.pdf", "", "x"] {
            assert_eq!(score(s, None, &none, s), 1.0);
        }
    }

    #[test]
    fn test_exact_normalized_match_overrides_ratio() {
        let none = BTreeSet::new();
        assert_eq!(score("Lab Report!", None, &none, "lab report.docx"), 1.0);
    }

    #[test]
    fn test_identifier_bonus_stacks_above_one() {
        let none = BTreeSet::new();
        let s = score("Notes", Some("AbC123"), &none, "Notes_abc123.pdf");
        let base = score("Notes", None, &none, "Notes_abc123.pdf");
        assert!((s - base - 0.2).abs() < 1e-9);

        let exact = score("notes", Some("notes"), &none, "notes.pdf");
        assert!((exact - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_type_bonus_and_penalty() {
        let pdf = types(&["pdf"]);
        let hit = score("Chapter 1", None, &pdf, "Chapter 1.pdf");
        let miss = score("Chapter 1", None, &pdf, "Chapter 1.docx");
        assert!((hit - 1.3).abs() < 1e-9);
        assert!((miss - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_declared_type_counts_as_mismatch() {
        let odd = types(&["hologram"]);
        assert!((score("a", None, &odd, "a.pdf") - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(!accepts(0.30));
        assert!(!accepts(MATCH_THRESHOLD));
        assert!(accepts(0.31));
    }

    #[test]
    fn test_extensions_for_type() {
        assert_eq!(extensions_for_type("Google Docs"), &[".docx", ".doc", ".txt"]);
        assert_eq!(extensions_for_type("presentation"), &[".pptx", ".ppt"]);
        assert!(extensions_for_type("link").is_empty());
    }
}
