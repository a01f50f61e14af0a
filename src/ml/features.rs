// ============================================================
// Layer 5 — Topic Features
// ============================================================
// Everything the trainer needs about one topic, computed once
// per visit:
//
//   1. split every document into encoder windows
//   2. run the frozen encoder, concatenate the valid rows
//      → flat [T, H] token matrix (T = topic subwords)
//   3. enumerate candidates and their gold labels
//
// Mini-batches are then contiguous index ranges over the
// candidate list, so scores stay aligned with labels.

use anyhow::{ensure, Result};
use burn::{prelude::*, tensor::backend::AutodiffBackend};
use std::ops::Range;

use crate::data::{
    batcher::{SpanBatch, SpanBatcher},
    candidates::{candidate_labels, enumerate_candidates, Candidate},
    corpus::Topic,
};
use crate::ml::encoder::TokenEmbedder;

/// Encoder windows sent per call.
const ENCODER_BATCH: usize = 8;

pub struct TopicFeatures<B: Backend> {
    batcher:    SpanBatcher<B>,
    candidates: Vec<Candidate>,
    labels:     Vec<bool>,
    num_tokens: usize,
}

impl<B: Backend> TopicFeatures<B> {
    /// Encode a topic. Returns `None` when it yields no candidates.
    pub fn encode(
        encoder:   &impl TokenEmbedder<B>,
        topic:     &Topic,
        max_span:  usize,
        window:    usize,
        device:    &B::Device,
    ) -> Result<Option<Self>> {
        let candidates = enumerate_candidates(topic, max_span);
        if candidates.is_empty() {
            return Ok(None);
        }
        let labels = candidate_labels(topic, &candidates);

        let window   = window.min(encoder.max_positions());
        ensure!(window > 0, "Encoder window must be positive");
        let segments = topic.segments(window);

        let mut rows = Vec::with_capacity(segments.len().div_ceil(ENCODER_BATCH));
        for group in segments.chunks(ENCODER_BATCH) {
            rows.push(encoder.embed(group, device)?.flatten()?);
        }
        let tokens = Tensor::cat(rows, 0);

        let [t, h] = tokens.dims();
        ensure!(
            t == topic.total_subwords(),
            "Encoder returned {} token vectors for the {} subwords of topic '{}'",
            t, topic.total_subwords(), topic.key()
        );
        ensure!(h == encoder.hidden_size(), "Encoder returned {} wide vectors, expected {}", h, encoder.hidden_size());

        Self::new(SpanBatcher::new(tokens), candidates, labels, topic.num_tokens()).map(Some)
    }

    pub fn new(
        batcher:    SpanBatcher<B>,
        candidates: Vec<Candidate>,
        labels:     Vec<bool>,
        num_tokens: usize,
    ) -> Result<Self> {
        ensure!(
            labels.len() == candidates.len(),
            "{} labels for {} candidate spans", labels.len(), candidates.len()
        );
        if let Some(c) = candidates.iter().find(|c| c.end >= batcher.num_rows()) {
            anyhow::bail!("Candidate {:?} ends past the {} encoded tokens", c.meta, batcher.num_rows());
        }
        Ok(Self { batcher, candidates, labels, num_tokens })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn labels(&self) -> &[bool] {
        &self.labels
    }

    /// Words in eligible sentences; the base of the rank cutoffs.
    pub fn num_tokens(&self) -> usize {
        self.num_tokens
    }

    pub fn batch(&self, range: Range<usize>) -> Result<SpanBatch<B>> {
        ensure!(range.end <= self.len(), "Batch {:?} past the {} candidates", range, self.len());
        self.batcher.batch(&self.candidates[range])
    }

    pub fn label_tensor(&self, range: Range<usize>, device: &B::Device) -> Tensor<B, 1, Int> {
        let labels: Vec<i32> = self.labels[range].iter().map(|&l| l as i32).collect();
        Tensor::from_ints(labels.as_slice(), device)
    }

    /// Move the token matrix into the autodiff graph as a constant.
    pub fn lift<AB>(self) -> TopicFeatures<AB>
    where
        AB: AutodiffBackend<InnerBackend = B>,
    {
        TopicFeatures {
            batcher:    self.batcher.map_tokens(Tensor::from_inner),
            candidates: self.candidates,
            labels:     self.labels,
            num_tokens: self.num_tokens,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::corpus::{Corpus, CorpusOptions};
    use crate::data::fixtures::{doc, CharTokenizer};
    use crate::domain::mention::GoldMention;
    use crate::ml::encoder::EncodedBatch;
    use burn::backend::NdArray;

    type B = NdArray;

    /// Each subword becomes [id, position-in-window, 1, 0].
    pub(crate) struct FakeEncoder {
        pub max_positions: usize,
    }

    impl<B: Backend> TokenEmbedder<B> for FakeEncoder {
        fn hidden_size(&self) -> usize {
            4
        }

        fn max_positions(&self) -> usize {
            self.max_positions
        }

        fn embed(&self, sequences: &[Vec<u32>], device: &B::Device) -> Result<EncodedBatch<B>> {
            let longest = sequences.iter().map(Vec::len).max().unwrap_or(0);
            let mut data = Vec::with_capacity(sequences.len() * longest * 4);
            for seq in sequences {
                assert!(seq.len() <= self.max_positions);
                for p in 0..longest {
                    match seq.get(p) {
                        Some(&id) => data.extend([id as f32, p as f32, 1.0, 0.0]),
                        None      => data.extend([0.0; 4]),
                    }
                }
            }
            let embeddings = Tensor::from_data(TensorData::new(data, [sequences.len(), longest, 4]), device);
            Ok(EncodedBatch { embeddings, lengths: sequences.iter().map(Vec::len).collect() })
        }
    }

    fn corpus() -> Corpus {
        let docs = vec![
            doc("1_1ecb", &[&["The", "bomb", "exploded"], &["Many", "died"]]),
            doc("1_2ecb", &[&["Police", "investigate"]]),
        ];
        let gold = vec![GoldMention { doc_id: "1_1ecb".into(), sentence_id: 0, tokens_ids: vec![2] }];
        Corpus::build(docs, &gold, &CharTokenizer, CorpusOptions::default()).unwrap()
    }

    #[test]
    fn test_encode_covers_every_subword() {
        let c     = corpus();
        let topic = &c.topics()[0];
        // window of 4 forces several segments per document
        let enc   = FakeEncoder { max_positions: 4 };
        let f     = TopicFeatures::<B>::encode(&enc, topic, 10, 512, &Default::default()).unwrap().unwrap();

        assert_eq!(f.len(), enumerate_candidates(topic, 10).len());
        assert_eq!(f.labels().iter().filter(|&&l| l).count(), 1);
        assert_eq!(f.num_tokens(), 7);

        // "exploded" holds 3 subwords of id 8
        let pos   = f.labels().iter().position(|&l| l).unwrap();
        let batch = f.batch(pos..pos + 1).unwrap();
        assert_eq!(batch.widths(), &[3]);
        let first: Vec<f32> = batch.start_end().into_data().to_vec::<f32>().unwrap();
        assert_eq!(first[0], 8.0);
    }

    #[test]
    fn test_label_tensor_matches_labels() {
        let c = corpus();
        let f = TopicFeatures::<B>::encode(&FakeEncoder { max_positions: 64 }, &c.topics()[0], 10, 64, &Default::default())
            .unwrap()
            .unwrap();
        let t: Vec<i64> = f
            .label_tensor(0..f.len(), &Default::default())
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .unwrap();
        let expected: Vec<i64> = f.labels().iter().map(|&l| l as i64).collect();
        assert_eq!(t, expected);
    }

    #[test]
    fn test_label_count_mismatch_is_rejected() {
        let device  = Default::default();
        let batcher = SpanBatcher::<B>::new(Tensor::zeros([3, 2], &device));
        let c       = corpus();
        let cands   = enumerate_candidates(&c.topics()[0], 1);
        assert!(TopicFeatures::new(batcher, cands, vec![true], 7).is_err());
    }

    #[test]
    fn test_candidates_must_fit_the_token_matrix() {
        let device = Default::default();
        let c      = corpus();
        let cands  = enumerate_candidates(&c.topics()[0], 1);
        let labels = vec![false; cands.len()];

        let short = SpanBatcher::<B>::new(Tensor::zeros([3, 2], &device));
        let err   = TopicFeatures::new(short, cands.clone(), labels.clone(), 7).err().unwrap();
        assert!(err.to_string().contains("3 encoded tokens"));

        let full = SpanBatcher::<B>::new(Tensor::zeros([c.topics()[0].total_subwords(), 2], &device));
        assert!(TopicFeatures::new(full, cands, labels, 7).is_ok());
    }

    #[test]
    fn test_topic_without_candidates_is_skipped() {
        let docs = vec![doc("2_1ecb", &[&[]])];
        let c    = Corpus::build(docs, &[], &CharTokenizer, CorpusOptions::default()).unwrap();
        let f    = TopicFeatures::<B>::encode(&FakeEncoder { max_positions: 8 }, &c.topics()[0], 10, 8, &Default::default()).unwrap();
        assert!(f.is_none());
    }
}
