//! Context assembly, extractive answering, and confidence scoring

use crate::document::SearchResult;
use crate::retrieval::keywords;

pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 4000;

/// Minimum leftover budget worth filling with a truncated entry
const MIN_TRUNCATED_BUDGET: usize = 100;

/// Answer returned when retrieval finds nothing above the threshold
pub const NO_RESULTS_MESSAGE: &str =
    "I could not find any relevant information in the knowledge base to answer your question.";

/// Answer returned when no context sentence matches the question
pub const NO_MATCHING_SENTENCES_MESSAGE: &str =
    "The retrieved information doesn't directly address your question. \
     Try rephrasing or asking about a related topic.";

const SHORT_ANSWER_CHARS: usize = 50;
const SHORT_ANSWER_MULTIPLIER: f32 = 0.8;
const DONT_KNOW_MULTIPLIER: f32 = 0.6;
const FALLBACK_MULTIPLIER: f32 = 0.3;

/// Phrases marking an answer as a non-answer
const DONT_KNOW_PHRASES: &[&str] = &[
    "not enough information",
    "i don't know",
    "i do not know",
    "cannot answer",
    "can't answer",
    "no information",
    "unable to answer",
    "not sure",
];

/// Concatenate `"[Source N] content"` entries in rank order under a
/// character budget (separators included). When the next entry would
/// overflow but at least 100 characters of budget remain, a truncated
/// `...`-suffixed slice of it becomes the final entry.
pub fn assemble_context(results: &[SearchResult], max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut used = 0usize;

    for (i, result) in results.iter().enumerate() {
        let entry = format!("[Source {}] {}", i + 1, result.document.content);
        let entry_len = entry.chars().count();
        let separator = if parts.is_empty() { 0 } else { 2 };

        if used + separator + entry_len <= max_chars {
            used += separator + entry_len;
            parts.push(entry);
        } else {
            let remaining = max_chars.saturating_sub(used + separator);
            if remaining >= MIN_TRUNCATED_BUDGET {
                let slice: String = entry.chars().take(remaining.saturating_sub(3)).collect();
                parts.push(format!("{}...", slice));
            }
            break;
        }
    }

    parts.join("\n\n")
}

/// Split on sentence terminators followed by whitespace
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if let Some(next) = chars.peek() {
                if next.is_whitespace() {
                    let sentence = current.trim().to_string();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    current.clear();
                }
            }
        }
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Pick the three sentences matching the most question keywords and
/// join them in their original order; a context with no matching
/// sentence yields the fixed fallback message
pub fn extractive_answer(question: &str, context: &str) -> String {
    let question_keywords = keywords::extract_keywords(question);
    let sentences = split_sentences(context);

    let mut scored: Vec<(usize, usize)> = sentences
        .iter()
        .enumerate()
        .map(|(i, sentence)| {
            let lower = sentence.to_lowercase();
            let score = question_keywords
                .iter()
                .filter(|k| lower.contains(k.as_str()))
                .count();
            (i, score)
        })
        .filter(|(_, score)| *score > 0)
        .collect();

    if scored.is_empty() {
        return NO_MATCHING_SENTENCES_MESSAGE.to_string();
    }

    // Top 3 by score, then back to reading order among the winners
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(3);
    scored.sort_by_key(|&(i, _)| i);

    scored
        .into_iter()
        .map(|(i, _)| sentences[i].clone())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Average retrieval score times multiplicative response-quality
/// penalties: x0.8 for answers under 50 chars, x0.6 for an explicit
/// don't-know phrase, x0.3 when generation was attempted and failed
pub fn score_confidence(results: &[SearchResult], answer: &str, generation_failed: bool) -> f32 {
    if results.is_empty() {
        return 0.0;
    }

    let avg = results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32;
    let mut confidence = avg;

    if answer.chars().count() < SHORT_ANSWER_CHARS {
        confidence *= SHORT_ANSWER_MULTIPLIER;
    }
    let lower = answer.to_lowercase();
    if DONT_KNOW_PHRASES.iter().any(|p| lower.contains(p)) {
        confidence *= DONT_KNOW_MULTIPLIER;
    }
    if generation_failed {
        confidence *= FALLBACK_MULTIPLIER;
    }

    confidence.clamp(0.0, 1.0)
}
