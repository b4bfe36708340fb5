//! Transcript text similarity
//!
//! Similarity is `1 - normalized edit distance` over normalized text:
//! lowercase, whitespace and punctuation removed, so "你好，世界" and "你好世界"
//! compare equal.

use crate::types::PairSimilarity;

/// Lowercase and strip whitespace and punctuation (ASCII and CJK)
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !is_punctuation(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c,
            '，' | '。' | '、' | '；' | '：' | '？' | '！' | '“' | '”' | '‘' | '’'
            | '（' | '）' | '《' | '》' | '【' | '】' | '…' | '—' | '·' | '～')
}

/// Similarity in `[0, 1]`; two empty texts are identical
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize(a), &normalize(b))
}

/// Similarity of every unordered pair, in input order
pub fn pairwise(texts: &[(&str, &str)]) -> Vec<PairSimilarity> {
    let mut pairs = Vec::with_capacity(texts.len() * texts.len().saturating_sub(1) / 2);
    for (i, (id_a, text_a)) in texts.iter().enumerate() {
        for (id_b, text_b) in texts.iter().skip(i + 1) {
            pairs.push(PairSimilarity {
                a: id_a.to_string(),
                b: id_b.to_string(),
                similarity: similarity(text_a, text_b),
            });
        }
    }
    pairs
}
