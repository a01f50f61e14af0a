// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between the pure domain and the outside world.
// The data layer builds topics through these traits only, so
// tests can swap in tiny in-memory implementations.

use anyhow::Result;

use crate::domain::{document::Document, mention::GoldMention};

// ─── CorpusSource ─────────────────────────────────────────────────────────────
/// Anything that can provide the documents and gold mentions of a split.
///
/// Implementations:
///   - JsonCorpusLoader → `<split>.json` + `<split>_<mention_type>.json`
pub trait CorpusSource {
    /// All documents of the split, in a stable order.
    fn load_documents(&self) -> Result<Vec<Document>>;

    /// Gold mentions of the split. Missing annotations are an error.
    fn load_mentions(&self) -> Result<Vec<GoldMention>>;
}

// ─── SubwordTokenizer ─────────────────────────────────────────────────────────
/// Splits already-segmented words into encoder vocabulary ids.
///
/// Implementations:
///   - tokenizers::Tokenizer (see infra::tokenizer_store)
pub trait SubwordTokenizer {
    /// Returns one id list per input word, in order. A word may map to
    /// zero ids (e.g. stray whitespace) but the outer length must equal
    /// `words.len()`.
    fn tokenize_words(&self, words: &[&str]) -> Result<Vec<Vec<u32>>>;
}
