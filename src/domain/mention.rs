// ============================================================
// Layer 3 — Mention Domain Types
// ============================================================
// A gold mention is a contiguous word range inside one sentence.
// Candidate spans carry the same four coordinates (SpanMeta) so
// a label is a plain set-membership test on SpanKey.

use serde::{Deserialize, Serialize};

/// One entry of the mentions file. Unknown keys (cluster ids,
/// topic, mention text, ...) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldMention {
    pub doc_id:      String,
    pub sentence_id: u32,
    /// Word ids of the mention inside its sentence
    pub tokens_ids:  Vec<u32>,
}

impl GoldMention {
    /// The (doc, sentence, start, end) key, or None for an empty mention.
    pub fn key(&self) -> Option<SpanKey> {
        let start = *self.tokens_ids.iter().min()?;
        let end   = *self.tokens_ids.iter().max()?;
        Some(SpanKey {
            doc_id:      self.doc_id.clone(),
            sentence_id: self.sentence_id,
            start,
            end,
        })
    }
}

/// Identity of a span for label lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpanKey {
    pub doc_id:      String,
    pub sentence_id: u32,
    /// First word id (inclusive)
    pub start:       u32,
    /// Last word id (inclusive)
    pub end:         u32,
}

/// Bookkeeping for one candidate span. Never fed to the model.
pub type SpanMeta = SpanKey;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_uses_min_and_max_word_ids() {
        let m = GoldMention {
            doc_id:      "4_2ecbplus".into(),
            sentence_id: 3,
            tokens_ids:  vec![9, 7, 8],
        };
        let k = m.key().unwrap();
        assert_eq!((k.start, k.end), (7, 9));
    }

    #[test]
    fn test_empty_mention_has_no_key() {
        let m = GoldMention { doc_id: "d".into(), sentence_id: 0, tokens_ids: vec![] };
        assert!(m.key().is_none());
    }

    #[test]
    fn test_extra_json_keys_are_ignored() {
        let json = r#"{"doc_id": "1_1ecb", "sentence_id": 2, "tokens_ids": [4, 5],
                       "tokens": "was shot", "cluster_id": 17, "topic": "1"}"#;
        let m: GoldMention = serde_json::from_str(json).unwrap();
        assert_eq!(m.tokens_ids, vec![4, 5]);
    }
}
