//! Tokenization, keyword extraction, and word-overlap measures
//!
//! Every strategy that mixes lexical evidence into vector scores goes
//! through these helpers so "keyword" and "word overlap" mean the same
//! thing across hybrid boosting, MMR similarity, reranking, and
//! diversification.

use ahash::AHashSet;

/// Common English words excluded from keyword extraction
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "will", "would", "could", "should", "may",
    "might", "shall", "can", "this", "that", "these", "those", "with", "for", "from", "into",
    "about", "over", "under", "between", "what", "which", "who", "whom", "how", "when", "where",
    "why", "not", "all", "each", "its", "his", "her", "their", "our", "your", "you", "they",
];

/// Lowercase alphanumeric tokens in order of appearance
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Query keywords: lowercase tokens longer than two characters with
/// stopwords removed, deduplicated in order of first appearance
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = AHashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() > 2 && !STOPWORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Distinct lowercase words of a text
pub fn word_set(text: &str) -> AHashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Jaccard similarity of two word sets, 0.0 when both are empty
pub fn jaccard(a: &AHashSet<String>, b: &AHashSet<String>) -> f32 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Fraction of `keywords` literally contained in `content`
/// (case-insensitive substring match), 0.0 for an empty keyword list
pub fn contained_fraction(keywords: &[String], content: &str) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }
    let haystack = content.to_lowercase();
    let matched = keywords
        .iter()
        .filter(|k| haystack.contains(k.as_str()))
        .count();
    matched as f32 / keywords.len() as f32
}

/// Fraction of the query's distinct words that appear among the
/// content's words
pub fn word_overlap(query: &str, content: &str) -> f32 {
    let query_words = word_set(query);
    if query_words.is_empty() {
        return 0.0;
    }
    let content_words = word_set(content);
    let matched = query_words
        .iter()
        .filter(|w| content_words.contains(*w))
        .count();
    matched as f32 / query_words.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("What's Rust-lang, really?"),
            vec!["what", "s", "rust", "lang", "really"]
        );
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_extract_keywords_filters_and_dedupes() {
        let keywords = extract_keywords("What is the Python python interpreter?");
        assert_eq!(keywords, vec!["python", "interpreter"]);
    }

    #[test]
    fn test_extract_keywords_drops_short_tokens() {
        // "ai" has length 2 and is dropped even though it is meaningful
        assert!(extract_keywords("ai").is_empty());
        assert_eq!(extract_keywords("llm inference"), vec!["llm", "inference"]);
    }

    #[test]
    fn test_jaccard() {
        let a = word_set("the quick brown fox");
        let b = word_set("the quick brown fox");
        let c = word_set("a slow red turtle crawls");

        assert!((jaccard(&a, &b) - 1.0).abs() < 1e-6);
        assert_eq!(jaccard(&a, &c), 0.0);

        // {the,quick,brown,fox} vs {the,quick,fox}: 3 shared of 4 total
        let d = word_set("the quick fox");
        assert!((jaccard(&a, &d) - 0.75).abs() < 1e-6);

        let empty = AHashSet::new();
        assert_eq!(jaccard(&empty, &empty), 0.0);
    }

    #[test]
    fn test_contained_fraction() {
        let keywords = vec!["python".to_string(), "interpreter".to_string()];
        assert!((contained_fraction(&keywords, "The Python runtime") - 0.5).abs() < 1e-6);
        assert!((contained_fraction(&keywords, "Python interpreter internals") - 1.0).abs() < 1e-6);
        assert_eq!(contained_fraction(&keywords, "unrelated"), 0.0);
        assert_eq!(contained_fraction(&[], "anything"), 0.0);
    }

    #[test]
    fn test_word_overlap() {
        assert!((word_overlap("rust memory safety", "Rust guarantees memory safety") - 1.0).abs() < 1e-6);
        assert!((word_overlap("rust memory safety", "memory allocation") - (1.0 / 3.0)).abs() < 1e-6);
        assert_eq!(word_overlap("", "anything"), 0.0);
    }
}
