// Test-only builders shared by the data and ml tests.

use anyhow::Result;

use crate::domain::{
    document::{Document, Sentence, Token},
    traits::SubwordTokenizer,
};

/// One subword per started group of three characters; ids are the
/// word length so they stay small.
pub struct CharTokenizer;

impl SubwordTokenizer for CharTokenizer {
    fn tokenize_words(&self, words: &[&str]) -> Result<Vec<Vec<u32>>> {
        Ok(words
            .iter()
            .map(|w| {
                let n = w.chars().count();
                vec![n as u32; (n + 2) / 3]
            })
            .collect())
    }
}

/// A document whose sentences are all selected, word ids 0..n.
pub fn doc(doc_id: &str, sentences: &[&[&str]]) -> Document {
    Document {
        doc_id: doc_id.to_string(),
        sentences: sentences
            .iter()
            .enumerate()
            .map(|(s, words)| Sentence {
                sentence_id: s as u32,
                selected:    true,
                tokens: words
                    .iter()
                    .enumerate()
                    .map(|(i, w)| Token { token_id: i as u32, text: w.to_string() })
                    .collect(),
            })
            .collect(),
    }
}
