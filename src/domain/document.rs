// ============================================================
// Layer 3 — Document Domain Type
// ============================================================
// A document as it arrives from the corpus files: an id and its
// sentences, each sentence an ordered list of word tokens.
//
// The on-disk row for one token is
//   [sentence_id, token_id, token_text, selected_flag]
// and consecutive rows with the same sentence_id form one sentence.

use serde::{Deserialize, Serialize};

/// One row of the documents file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToken(pub u32, pub u32, pub String, pub bool);

/// A word token inside a sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Position of the word inside its sentence, as annotated
    pub token_id: u32,
    pub text:     String,
}

/// A sentence of word tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub sentence_id: u32,
    /// Set for sentences the annotators actually covered
    pub selected:    bool,
    pub tokens:      Vec<Token>,
}

/// A raw, untokenized document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id:    String,
    pub sentences: Vec<Sentence>,
}

impl Document {
    /// Build a document from the flat row list of the documents file.
    ///
    /// Rows are grouped into sentences in order of appearance; a change in
    /// sentence_id starts a new sentence.
    pub fn from_rows(doc_id: impl Into<String>, rows: Vec<RawToken>) -> Self {
        let mut sentences: Vec<Sentence> = Vec::new();

        for RawToken(sentence_id, token_id, text, selected) in rows {
            match sentences.last_mut() {
                Some(s) if s.sentence_id == sentence_id => {
                    s.selected |= selected;
                    s.tokens.push(Token { token_id, text });
                }
                _ => sentences.push(Sentence {
                    sentence_id,
                    selected,
                    tokens: vec![Token { token_id, text }],
                }),
            }
        }

        Self { doc_id: doc_id.into(), sentences }
    }
}
