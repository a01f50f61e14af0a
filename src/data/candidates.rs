// ============================================================
// Layer 4 — Candidate Span Enumeration
// ============================================================
// Every contiguous word range inside one sentence, up to
// `max_width` words, is a candidate mention. Each candidate
// carries:
//
//   meta         (doc, sentence, first word id, last word id)
//   start, end   inclusive positions in the topic's flat subword
//                buffer (documents concatenated in topic order)
//
// The subword span is what the model sees, so the span width
// fed to the embedder is end - start + 1 in subword units.
//
// Candidates, labels and (later) embeddings of a topic are
// always produced in this enumeration order and stay aligned.

use crate::data::corpus::Topic;
use crate::domain::mention::SpanMeta;

/// One candidate span of a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub meta:  SpanMeta,
    /// First subword, flat topic position
    pub start: usize,
    /// Last subword (inclusive), flat topic position
    pub end:   usize,
}

impl Candidate {
    pub fn width(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Enumerate the candidates of a topic in document, sentence, start
/// word, width order.
pub fn enumerate_candidates(topic: &Topic, max_width: usize) -> Vec<Candidate> {
    let mut out = Vec::new();

    for (doc, offset) in topic.documents().iter().zip(topic.doc_offsets()) {
        for sentence in doc.sentences.iter().filter(|s| topic.is_eligible(s)) {
            let words = &sentence.words;
            for i in 0..words.len() {
                if words[i].subwords.is_empty() {
                    continue;
                }
                let last = (i + max_width).min(words.len());
                for j in i..last {
                    if words[j].subwords.is_empty() {
                        continue;
                    }
                    out.push(Candidate {
                        meta: SpanMeta {
                            doc_id:      doc.doc_id.clone(),
                            sentence_id: sentence.sentence_id,
                            start:       words[i].token_id,
                            end:         words[j].token_id,
                        },
                        start: offset + words[i].subwords.start,
                        end:   offset + words[j].subwords.end - 1,
                    });
                }
            }
        }
    }

    out
}

/// Gold label of each candidate, index-aligned with `candidates`.
pub fn candidate_labels(topic: &Topic, candidates: &[Candidate]) -> Vec<bool> {
    candidates.iter().map(|c| topic.is_gold(&c.meta)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::corpus::{Corpus, CorpusOptions};
    use crate::data::fixtures::{doc, CharTokenizer};
    use crate::domain::mention::GoldMention;

    fn corpus(mentions: &[GoldMention]) -> Corpus {
        let docs = vec![
            doc("1_1ecb", &[&["The", "bomb", "exploded"], &["Many", "died"]]),
            doc("1_2ecb", &[&["Police", "investigate"]]),
        ];
        Corpus::build(docs, mentions, &CharTokenizer, CorpusOptions::default()).unwrap()
    }

    #[test]
    fn test_all_spans_up_to_max_width_are_enumerated() {
        let c     = corpus(&[]);
        let topic = &c.topics()[0];

        // sentence of 3 words: 3 + 2 + 1, sentence of 2: 2 + 1, doc 2: 2 + 1
        assert_eq!(enumerate_candidates(topic, 10).len(), 6 + 3 + 3);
        // width capped at 1 word
        assert_eq!(enumerate_candidates(topic, 1).len(), 3 + 2 + 2);
    }

    #[test]
    fn test_spans_never_cross_sentences() {
        let c = corpus(&[]);
        for cand in enumerate_candidates(&c.topics()[0], 10) {
            assert!(cand.meta.start <= cand.meta.end);
            assert!(cand.meta.end - cand.meta.start < 3);
        }
    }

    #[test]
    fn test_width_matches_subword_positions() {
        let c     = corpus(&[]);
        let topic = &c.topics()[0];
        let cands = enumerate_candidates(topic, 10);

        // "The bomb exploded" → 1 + 2 + 3 subwords
        let full = cands
            .iter()
            .find(|x| x.meta.doc_id == "1_1ecb" && x.meta.sentence_id == 0 && x.meta.start == 0 && x.meta.end == 2)
            .unwrap();
        assert_eq!((full.start, full.end), (0, 5));
        assert_eq!(full.width(), 6);

        for cand in &cands {
            assert_eq!(cand.width(), cand.end - cand.start + 1);
            assert!(cand.end < topic.total_subwords());
        }
    }

    #[test]
    fn test_second_document_is_offset_in_flat_buffer() {
        let c     = corpus(&[]);
        let topic = &c.topics()[0];
        let first = enumerate_candidates(topic, 10)
            .into_iter()
            .find(|x| x.meta.doc_id == "1_2ecb")
            .unwrap();
        // doc 1 has 1+2+3 + 2+2 = 10 subwords
        assert_eq!(first.start, 10);
    }

    #[test]
    fn test_labels_follow_gold_mentions() {
        let gold = vec![GoldMention { doc_id: "1_1ecb".into(), sentence_id: 1, tokens_ids: vec![1] }];
        let c     = corpus(&gold);
        let topic = &c.topics()[0];
        let cands = enumerate_candidates(topic, 10);
        let labels = candidate_labels(topic, &cands);

        assert_eq!(labels.len(), cands.len());
        assert_eq!(labels.iter().filter(|&&l| l).count(), 1);
        let pos = labels.iter().position(|&l| l).unwrap();
        assert_eq!(cands[pos].meta.sentence_id, 1);
        assert_eq!((cands[pos].meta.start, cands[pos].meta.end), (1, 1));
    }

    #[test]
    fn test_words_without_subwords_are_skipped() {
        struct Gappy;
        impl crate::domain::traits::SubwordTokenizer for Gappy {
            fn tokenize_words(&self, words: &[&str]) -> anyhow::Result<Vec<Vec<u32>>> {
                Ok(words.iter().map(|w| if *w == "_" { vec![] } else { vec![1] }).collect())
            }
        }
        let docs = vec![doc("1_1ecb", &[&["a", "_", "b"]])];
        let c    = Corpus::build(docs, &[], &Gappy, CorpusOptions::default()).unwrap();
        let cands = enumerate_candidates(&c.topics()[0], 10);

        // a, a.._.. b, b  (nothing starts or ends on "_")
        assert_eq!(cands.len(), 3);
        assert!(cands.iter().all(|x| x.meta.start != 1 && x.meta.end != 1));
    }
}
