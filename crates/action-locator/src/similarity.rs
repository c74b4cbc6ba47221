//! Pluggable text similarity metrics used by label-based healing.

use std::collections::BTreeSet;

/// Deterministic similarity score in `[0, 1]`; 1 means identical.
pub trait TextSimilarity: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, expected: &str, actual: &str) -> f64;
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `1 - levenshtein / max_len` over case- and whitespace-normalized text.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizedLevenshtein;

impl TextSimilarity for NormalizedLevenshtein {
    fn name(&self) -> &'static str {
        "normalized_levenshtein"
    }

    fn score(&self, expected: &str, actual: &str) -> f64 {
        let a: Vec<char> = normalize(expected).chars().collect();
        let b: Vec<char> = normalize(actual).chars().collect();
        let longest = a.len().max(b.len());
        if longest == 0 {
            return 1.0;
        }
        1.0 - levenshtein(&a, &b) as f64 / longest as f64
    }
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            row[j + 1] = substitution.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Jaccard overlap of lowercase alphanumeric tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenOverlap;

impl TextSimilarity for TokenOverlap {
    fn name(&self) -> &'static str {
        "token_overlap"
    }

    fn score(&self, expected: &str, actual: &str) -> f64 {
        let tokens = |s: &str| -> BTreeSet<String> {
            s.split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .map(str::to_lowercase)
                .collect()
        };
        let a = tokens(expected);
        let b = tokens(actual);
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        let shared = a.intersection(&b).count();
        let union = a.union(&b).count();
        shared as f64 / union as f64
    }
}
