//! Fluency rubric
//!
//! Four independent issue detectors evaluated in fixed order. The score is a
//! multiplier of the criterion maximum chosen by how many detectors fired.
//! Speech rate is reported as an advisory band and never changes the score.

use super::{triggered_labels, IssueRule};
use crate::criteria::Criterion;
use crate::types::{AcousticFeatureSet, CriterionScore};

pub const WRONG_PAUSES: &str = "ngat_nghi_sai";
pub const HESITATION: &str = "ngap_ngung";
pub const UNSTABLE_TEMPO: &str = "toc_do_khong_on_dinh";
pub const REPETITION: &str = "lap_tu";

const PAUSE_RATIO_LIMIT: f64 = 0.25;
const LONG_PAUSE_SECS: f64 = 0.6;
const HESITATION_PAUSE_COUNT: u32 = 10;
const HESITATION_PAUSE_SECS: f64 = 0.5;
/// Syllables per minute
const TEMPO_GAP_LIMIT: f64 = 50.0;

pub const FLUENCY_RULES: [IssueRule; 4] = [
    IssueRule {
        label: WRONG_PAUSES,
        predicate: |f, _| f.pause_ratio > PAUSE_RATIO_LIMIT || f.mean_pause_duration > LONG_PAUSE_SECS,
    },
    IssueRule {
        label: HESITATION,
        predicate: |f, _| {
            f.num_pauses > HESITATION_PAUSE_COUNT && f.mean_pause_duration < HESITATION_PAUSE_SECS
        },
    },
    IssueRule {
        label: UNSTABLE_TEMPO,
        predicate: |f, _| (f.articulation_rate - f.speech_rate).abs() > TEMPO_GAP_LIMIT,
    },
    IssueRule {
        label: REPETITION,
        predicate: |_, transcript| transcript.map(has_repetition).unwrap_or(false),
    },
];

/// Score multiplier by number of triggered issues
pub fn multiplier(issue_count: usize) -> f64 {
    match issue_count {
        0 => 1.0,
        1 => 0.75,
        2 => 0.5,
        _ => 0.25,
    }
}

/// Advisory speech-rate band (syllables per minute)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateBand {
    VerySlow,
    Slow,
    Ideal,
    Fast,
    VeryFast,
}

impl RateBand {
    pub fn from_rate(rate: f64) -> Self {
        if rate < 100.0 {
            RateBand::VerySlow
        } else if rate < 150.0 {
            RateBand::Slow
        } else if rate <= 220.0 {
            RateBand::Ideal
        } else if rate <= 280.0 {
            RateBand::Fast
        } else {
            RateBand::VeryFast
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateBand::VerySlow => "very_slow",
            RateBand::Slow => "slow",
            RateBand::Ideal => "ideal",
            RateBand::Fast => "fast",
            RateBand::VeryFast => "very_fast",
        }
    }
}

pub fn score(
    criterion: &Criterion,
    features: &AcousticFeatureSet,
    transcript: Option<&str>,
) -> CriterionScore {
    let issues = triggered_labels(&FLUENCY_RULES, features, transcript);
    let raw = criterion.max_score * multiplier(issues.len());
    let band = RateBand::from_rate(features.speech_rate);

    CriterionScore::scored(criterion, raw, feedback(&issues, band, features))
        .with_issues(issues.iter().copied())
        .with_detail("issue_count", issues.len())
        .with_detail("speech_rate", features.speech_rate)
        .with_detail("speech_rate_band", band.as_str())
        .with_detail("pause_ratio", features.pause_ratio)
        .with_detail("num_pauses", features.num_pauses)
        .with_detail("mean_pause_duration", features.mean_pause_duration)
        .with_detail("transcript_checked", transcript.is_some())
}

fn feedback(issues: &[&str], band: RateBand, features: &AcousticFeatureSet) -> String {
    let mut parts: Vec<String> = Vec::new();
    if issues.is_empty() {
        parts.push("Speech flows naturally with well-placed pauses.".to_string());
    }
    for issue in issues {
        parts.push(
            match *issue {
                WRONG_PAUSES => format!(
                    "Pauses are too long or too frequent ({:.0}% of the recording is silence).",
                    features.pause_ratio * 100.0
                ),
                HESITATION => format!(
                    "Many short hesitations ({} pauses); try to speak in complete phrases.",
                    features.num_pauses
                ),
                UNSTABLE_TEMPO => "Tempo is uneven between speaking and pausing.".to_string(),
                REPETITION => "Words or phrases are repeated.".to_string(),
                other => other.to_string(),
            },
        );
    }
    match band {
        RateBand::VerySlow => parts.push("Speaking rate is very slow.".to_string()),
        RateBand::Slow => parts.push("Speaking rate is a little slow.".to_string()),
        RateBand::Ideal => {}
        RateBand::Fast => parts.push("Speaking rate is a little fast.".to_string()),
        RateBand::VeryFast => parts.push("Speaking rate is very fast.".to_string()),
    }
    parts.join(" ")
}

// ============================================================================
// Repetition detection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Han(char),
}

fn is_han(c: char) -> bool {
    matches!(c as u32,
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2FA1F)
}

/// Words split on whitespace and punctuation; Han characters are single tokens
fn tokenize(text: &str) -> Vec<Token> {
    fn flush(word: &mut String, tokens: &mut Vec<Token>) {
        if !word.is_empty() {
            tokens.push(Token::Word(word.to_lowercase()));
            word.clear();
        }
    }

    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if is_han(c) {
            flush(&mut word, &mut tokens);
            tokens.push(Token::Han(c));
        } else if c.is_alphanumeric() || c == '\'' {
            word.push(c);
        } else {
            flush(&mut word, &mut tokens);
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

/// Whether `tokens[i..i+n]` repeats immediately
fn repeats_at(tokens: &[Token], i: usize, n: usize) -> bool {
    i + 2 * n <= tokens.len() && tokens[i..i + n] == tokens[i + n..i + 2 * n]
}

/// Two-character verbs whose ABAB doubling (讨论讨论, "discuss a bit") is ordinary Chinese
const REDUPLICATED_VERBS: &[&str] = &[
    "讨论", "休息", "研究", "学习", "考虑", "商量", "介绍", "打扫", "收拾", "整理", "练习", "准备",
    "检查", "锻炼", "活动", "了解", "认识", "参观", "复习", "打听", "安排", "放松",
];

/// ABAB doubling of a listed verb, not followed by a third AB
fn is_verb_reduplication(tokens: &[Token], i: usize) -> bool {
    let pair: String = tokens[i..i + 2]
        .iter()
        .filter_map(|t| match t {
            Token::Han(c) => Some(*c),
            Token::Word(_) => None,
        })
        .collect();
    REDUPLICATED_VERBS.contains(&pair.as_str()) && !repeats_at(tokens, i + 2, 2)
}

/// Immediately repeated n-gram: 1..=3 words, or 2..=4 Han characters.
/// A single Han character only counts when it occurs three times in a row,
/// since doubling (谢谢, 看看) is ordinary Chinese; the same holds for ABAB
/// doubling of the verbs in `REDUPLICATED_VERBS`. Reduplication of verbs
/// outside that list is still reported.
pub fn has_repetition(text: &str) -> bool {
    let tokens = tokenize(text);
    (0..tokens.len()).any(|i| {
        let han = matches!(tokens[i], Token::Han(_));
        if han && i + 2 < tokens.len() && tokens[i] == tokens[i + 1] && tokens[i] == tokens[i + 2] {
            return true;
        }
        let sizes = if han { 2..=4 } else { 1..=3 };
        sizes.into_iter().any(|n| {
            let uniform = tokens[i..(i + n).min(tokens.len())]
                .iter()
                .all(|t| matches!(t, Token::Han(_)) == han);
            uniform
                && repeats_at(&tokens, i, n)
                && !(han && n == 2 && is_verb_reduplication(&tokens, i))
        })
    })
}
