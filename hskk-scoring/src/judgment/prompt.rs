//! Judge prompt rendering

use crate::criteria::CriterionKind;
use crate::types::{AgreementClass, JudgmentRequest};
use std::fmt::Write;

/// What the judge evaluates for each criterion
pub fn rubric_for(kind: CriterionKind, has_reference: bool) -> &'static str {
    match (kind, has_reference) {
        (CriterionKind::TaskAchievement, true) => {
            "Compare what the student said with the reference text. Award full marks when every \
             part of the reference is reproduced with the same meaning; deduct for omitted, added \
             or changed content."
        }
        (CriterionKind::TaskAchievement, false) => {
            "Judge whether the answer responds to the task completely and relevantly: enough \
             content, on topic, and appropriate for the exam level."
        }
        (CriterionKind::Grammar, _) => {
            "Judge grammatical accuracy: word order, measure words, aspect particles, complements \
             and sentence patterns expected at the exam level."
        }
        (CriterionKind::Vocabulary, _) => {
            "Judge vocabulary range and precision: variety of words, correct collocations, and \
             level-appropriate word choice."
        }
        (CriterionKind::Coherence, _) => {
            "Judge logical flow: ideas follow in a clear order and connectives link sentences \
             into a coherent answer."
        }
        // Acoustic criteria never reach the judge
        (CriterionKind::Pronunciation, _) | (CriterionKind::Fluency, _) => {
            "Judge the overall spoken quality of the answer."
        }
    }
}

/// How the judge should read the transcript given the agreement between recognizers
pub fn consensus_guidance(class: AgreementClass) -> &'static str {
    match class {
        AgreementClass::Consistent => {
            "All speech recognizers agree. Treat the transcript as what the student actually said."
        }
        AgreementClass::PhoneticAmbiguous => {
            "The speech recognizers disagree with each other. Differences between transcripts come \
             from unclear pronunciation, not from the student's grammar. Do not penalise grammar or \
             vocabulary for words that only some recognizers heard."
        }
        AgreementClass::GrammarSuspect => {
            "Most speech recognizers converge on the same wording. Errors present in that wording \
             are evidence of the student's own construction mistakes."
        }
        AgreementClass::InsufficientData => {
            "Only one transcript is available. Judge it, but be cautious where a recognition error \
             is a plausible explanation."
        }
    }
}

const STRICT_FORMAT: &str = "Your previous answer could not be parsed. Reply with exactly one JSON \
object and nothing else: no Markdown, no code fences, no commentary.";

/// System prompt shared by every criterion
pub fn system_prompt(request: &JudgmentRequest) -> String {
    let mut prompt = format!(
        "You are a professional examiner for the HSKK Chinese speaking test. You score one \
         criterion of one answer.\n\nReturn a JSON object: {{\"score\": <number from 0 to {max}>, \
         \"feedback\": \"<feedback in Vietnamese>\", \"issues\": [\"<short issue label>\", ...]}}",
        max = request.max_score
    );
    if request.strict_format {
        prompt.push_str("\n\n");
        prompt.push_str(STRICT_FORMAT);
    }
    prompt
}

/// User prompt carrying the evidence for one criterion
pub fn user_prompt(request: &JudgmentRequest) -> String {
    let mut prompt = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(
        prompt,
        "Exam level: {} ({})\nTask: {} {}\n",
        request.exam_level.code(),
        request.exam_level.name(),
        request.task_code,
        request.task_name
    );
    let _ = writeln!(
        prompt,
        "Criterion: {} ({}), maximum {} points\nRubric: {}\n",
        request.criterion.id(),
        request.criterion_name,
        request.max_score,
        request.rubric
    );
    let _ = writeln!(prompt, "Canonical transcript:\n{}\n", request.canonical_transcript);

    if request.transcripts.len() > 1 {
        let _ = writeln!(prompt, "All transcripts:");
        for (provider, text) in &request.transcripts {
            let _ = writeln!(prompt, "- {}: {}", provider, text);
        }
        let _ = writeln!(prompt);
    }

    let _ = writeln!(
        prompt,
        "Recognizer agreement: {}\n{}",
        request.consensus,
        consensus_guidance(request.consensus)
    );

    if let Some(reference) = &request.reference_text {
        let _ = writeln!(prompt, "\nReference text:\n{}", reference);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::ExamLevel;

    fn request(strict: bool) -> JudgmentRequest {
        JudgmentRequest {
            criterion: CriterionKind::Grammar,
            criterion_name: "Độ chính xác ngữ pháp".to_string(),
            max_score: 4.0,
            rubric: rubric_for(CriterionKind::Grammar, false).to_string(),
            canonical_transcript: "我昨天去了商店".to_string(),
            consensus: AgreementClass::GrammarSuspect,
            transcripts: vec![
                ("whisper".to_string(), "我昨天去了商店".to_string()),
                ("gemini".to_string(), "我昨天去了商店。".to_string()),
            ],
            reference_text: None,
            exam_level: ExamLevel::Advanced,
            task_code: "HSKKCC3".to_string(),
            task_name: "Trả lời câu hỏi".to_string(),
            strict_format: strict,
        }
    }

    #[test]
    fn test_strict_format_only_on_retry() {
        assert!(!system_prompt(&request(false)).contains("could not be parsed"));
        assert!(system_prompt(&request(true)).contains("could not be parsed"));
        assert!(system_prompt(&request(false)).contains("from 0 to 4"));
    }

    #[test]
    fn test_user_prompt_carries_evidence() {
        let prompt = user_prompt(&request(false));
        assert!(prompt.contains("grammar (Độ chính xác ngữ pháp)"));
        assert!(prompt.contains("- gemini: 我昨天去了商店。"));
        assert!(prompt.contains("grammar_suspect"));
        assert!(!prompt.contains("Reference text"));
    }

    #[test]
    fn test_reference_changes_task_rubric() {
        assert_ne!(
            rubric_for(CriterionKind::TaskAchievement, true),
            rubric_for(CriterionKind::TaskAchievement, false)
        );
    }
}
