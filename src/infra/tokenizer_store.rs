// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads `tokenizer.json` from the encoder directory, or builds
// a word-level vocabulary from the training texts and writes it
// there so training and prediction share the same ids.
//
// Built vocabularies are contiguous:
//   [PAD] = 0, [UNK] = 1, corpus pieces from 2 by frequency
// so the encoder's embedding table needs exactly
// `get_vocab_size(true)` rows.
//
// In tokenizers 0.15, train_from_files requires Trainer::Model
// to equal ModelWrapper, so the JSON is written directly and
// loaded back instead of going through a trainer.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::domain::traits::SubwordTokenizer;

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Load the stored tokenizer, or build one from `texts`.
    pub fn load_or_build(&self, texts: &[String]) -> Result<Tokenizer> {
        if self.path().exists() {
            tracing::info!("Loading tokenizer from '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("No tokenizer in '{}': building a word-level vocabulary", self.dir.display());
            self.build_and_save(texts)
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    fn build_and_save(&self, texts: &[String]) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for piece in text.split_whitespace().flat_map(pre_tokenize) {
                *freq.entry(piece.to_lowercase()).or_insert(0) += 1;
            }
        }

        // Most frequent first, ties alphabetical
        let mut pieces: Vec<(String, usize)> = freq.into_iter().collect();
        pieces.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut vocab = serde_json::json!({ "[PAD]": 0, "[UNK]": 1 });
        let mut next_id = 2usize;
        for (piece, _) in &pieces {
            if vocab.get(piece).is_none() {
                vocab[piece] = serde_json::json!(next_id);
                next_id += 1;
            }
        }

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 1, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": {
                "type": "BertNormalizer",
                "clean_text": true,
                "handle_chinese_chars": true,
                "strip_accents": null,
                "lowercase": true
            },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": "[UNK]"
            }
        });

        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write tokenizer JSON '{}'", path.display()))?;
        tracing::info!("Tokenizer built with {} entries, saved to '{}'", next_id, path.display());

        self.load()
    }
}

/// Splits like the `Whitespace` pre-tokenizer: runs of word characters
/// and runs of other non-space characters.
fn pre_tokenize(word: &str) -> Vec<&str> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut pieces = Vec::new();
    let mut start  = 0;
    let mut kind: Option<bool> = None;

    for (i, c) in word.char_indices() {
        let k = is_word(c);
        if kind.is_some_and(|prev| prev != k) {
            pieces.push(&word[start..i]);
            start = i;
        }
        kind = Some(k);
    }
    if start < word.len() {
        pieces.push(&word[start..]);
    }
    pieces
}

impl SubwordTokenizer for Tokenizer {
    fn tokenize_words(&self, words: &[&str]) -> Result<Vec<Vec<u32>>> {
        let mut out = vec![Vec::new(); words.len()];
        if words.is_empty() {
            return Ok(out);
        }

        let encoding = self
            .encode(words.to_vec(), false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
        for (&id, word) in encoding.get_ids().iter().zip(encoding.get_word_ids()) {
            if let Some(slot) = word.and_then(|w| out.get_mut(w as usize)) {
                slot.push(id);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts() -> Vec<String> {
        vec!["The bomb exploded in the U.S. embassy".into(), "the police arrived".into()]
    }

    #[test]
    fn test_pre_tokenize_splits_punctuation_runs() {
        assert_eq!(pre_tokenize("U.S."), vec!["U", ".", "S", "."]);
        assert_eq!(pre_tokenize("don't"), vec!["don", "'", "t"]);
        assert_eq!(pre_tokenize("bomb"), vec!["bomb"]);
    }

    #[test]
    fn test_built_vocabulary_is_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let tok = TokenizerStore::new(dir.path()).load_or_build(&texts()).unwrap();

        // pad, unk + the, bomb, exploded, in, u, ., s, embassy, police, arrived
        assert_eq!(tok.get_vocab_size(true), 12);
        assert_eq!(tok.token_to_id("[PAD]"), Some(0));
        // "the" is the most frequent piece
        assert_eq!(tok.token_to_id("the"), Some(2));
    }

    #[test]
    fn test_words_map_to_their_pieces() {
        let dir = tempfile::tempdir().unwrap();
        let tok = TokenizerStore::new(dir.path()).load_or_build(&texts()).unwrap();

        let pieces = tok.tokenize_words(&["The", "U.S.", "zebra"]).unwrap();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0], vec![2]);
        assert_eq!(pieces[1].len(), 4);
        assert_eq!(pieces[2], vec![1]);
        assert!(tok.tokenize_words(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_existing_tokenizer_is_reused() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        store.load_or_build(&texts()).unwrap();

        let again = store.load_or_build(&["completely different words".into()]).unwrap();
        assert_eq!(again.get_vocab_size(true), 12);
    }
}
