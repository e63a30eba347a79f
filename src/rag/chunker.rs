//! Sentence-aware chunking and metadata enrichment
//!
//! Long documents are split with a sliding window that advances by
//! `chunk_size - overlap` characters. When a window edge would cut
//! mid-sentence, the cut snaps back to the nearest `.` inside the
//! overlap region. Offsets are character offsets, so multi-byte text
//! is never split inside a code point.

use crate::document::{Document, MetadataValue};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Tokens suggesting the content is source code
const CODE_TOKENS: &[&str] = &[
    "def ", "class ", "import ", "function ", "fn ", "#include", "=>", "let ",
];

/// Split one document into overlapping chunk documents
///
/// Content of `chunk_size` characters or fewer yields exactly one
/// chunk: the unmodified document. Each chunk is an ordinary document
/// whose id is `{parent_id}_{index}` and whose metadata extends the
/// parent's with `chunk_id`, `chunk_index`, `parent_document_id`, and
/// the `chunk_start`/`chunk_end` character offsets.
pub fn chunk_document(document: &Document, chunk_size: usize, overlap: usize) -> Vec<Document> {
    let chars: Vec<char> = document.content.chars().collect();
    if chars.len() <= chunk_size || chunk_size == 0 {
        return vec![document.clone()];
    }

    let overlap = overlap.min(chunk_size.saturating_sub(1));
    let stride = chunk_size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());
        let at_end = end == chars.len();

        if !at_end {
            // Snap back to the nearest sentence terminator inside the
            // overlap window; the window never reaches back to `start`,
            // so chunks cannot collapse to nothing
            let window_start = end.saturating_sub(overlap).max(start + 1);
            if let Some(pos) = (window_start..end).rev().find(|&i| chars[i] == '.') {
                end = pos + 1;
            }
        }

        let text: String = chars[start..end].iter().collect();
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            let chunk_id = format!("{}_{}", document.id, index);
            let mut chunk = Document {
                id: chunk_id.clone(),
                content: trimmed.to_string(),
                metadata: document.metadata.clone(),
                source: document.source.clone(),
                created_at: document.created_at,
            };
            chunk
                .metadata
                .insert("chunk_id".to_string(), MetadataValue::from(chunk_id));
            chunk
                .metadata
                .insert("chunk_index".to_string(), MetadataValue::from(index));
            chunk.metadata.insert(
                "parent_document_id".to_string(),
                MetadataValue::from(document.id.clone()),
            );
            chunk
                .metadata
                .insert("chunk_start".to_string(), MetadataValue::from(start));
            chunk
                .metadata
                .insert("chunk_end".to_string(), MetadataValue::from(end));
            chunks.push(chunk);
            index += 1;
        }

        if at_end {
            break;
        }
        start += stride;
    }

    chunks
}

/// Attach derived signals: word/char counts, a code heuristic, and a
/// coarse language hint. Runs before chunking so every chunk inherits
/// the same signals.
pub fn enrich_metadata(document: &mut Document) {
    let word_count = document.content.split_whitespace().count();
    let char_count = document.char_count();
    let contains_code = CODE_TOKENS.iter().any(|t| document.content.contains(t));
    let language = language_hint(&document.content);

    document
        .metadata
        .insert("word_count".to_string(), MetadataValue::from(word_count));
    document
        .metadata
        .insert("char_count".to_string(), MetadataValue::from(char_count));
    document.metadata.insert(
        "contains_code".to_string(),
        MetadataValue::from(contains_code),
    );
    document
        .metadata
        .insert("language".to_string(), MetadataValue::from(language));
}

/// Very coarse language guess from common function words
fn language_hint(content: &str) -> &'static str {
    let lower = format!(" {} ", content.to_lowercase());
    let hits = |words: &[&str]| words.iter().filter(|w| lower.contains(*w)).count();

    let german = hits(&[" der ", " die ", " das ", " und ", " ist ", " nicht "]);
    let spanish = hits(&[" el ", " los ", " una ", " es ", " que ", " para "]);
    let french = hits(&[" le ", " les ", " est ", " une ", " dans ", " pas "]);

    if german >= 2 && german >= spanish && german >= french {
        "de"
    } else if spanish >= 2 && spanish >= french {
        "es"
    } else if french >= 2 {
        "fr"
    } else {
        "en"
    }
}
