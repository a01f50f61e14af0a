// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Loads the best checkpoint of an experiment, scores every
// candidate span of a split and keeps the top
// round(k × tokens) spans, pooled over the split, as the
// mentions handed to the downstream stage.

use anyhow::Result;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::corpus::Corpus;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    compute::ComputeContext,
    encoder::TokenEmbedder,
    evaluation::{rank_cutoff, top_k_indices, Evaluation},
    features::TopicFeatures,
    model::MentionExtractor,
    trainer::score_topic,
};

/// One predicted mention, word ids inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSpan {
    pub doc_id:      String,
    pub sentence_id: u32,
    pub start:       u32,
    pub end:         u32,
    pub score:       f32,
}

#[derive(Debug, Clone)]
pub struct Prediction {
    /// Best first
    pub spans:      Vec<ScoredSpan>,
    /// Against gold mentions, when the split has any
    pub evaluation: Option<Evaluation>,
}

pub struct Inferencer<B: Backend> {
    model:            MentionExtractor<B>,
    max_mention_span: usize,
    segment_window:   usize,
    batch_size:       usize,
}

impl<B: Backend> Inferencer<B> {
    /// Rebuild the saved architecture for an encoder of width
    /// `hidden_size` and load its weights.
    pub fn from_checkpoint(ckpt: &CheckpointManager, hidden_size: usize, device: &B::Device) -> Result<Self> {
        let cfg   = ckpt.load_config()?;
        let model = ckpt.load(cfg.model_config(hidden_size).init::<B>(device), device)?;
        if let Some(best) = ckpt.load_best()? {
            tracing::info!(
                "Loaded checkpoint: recall {:.4} at epoch {} (k = {})",
                best.recall, best.epoch, best.fraction
            );
        }
        Ok(Self::new(model, cfg.max_mention_span, cfg.segment_window, cfg.batch_size))
    }

    pub fn new(model: MentionExtractor<B>, max_mention_span: usize, segment_window: usize, batch_size: usize) -> Self {
        Self { model, max_mention_span, segment_window, batch_size }
    }

    /// Keep the best `round(fraction × tokens)` spans of `corpus`.
    pub fn predict(
        &self,
        encoder:  &impl TokenEmbedder<B>,
        corpus:   &Corpus,
        fraction: f64,
        ctx:      &ComputeContext<B>,
    ) -> Result<Prediction> {
        let mut spans      = Vec::new();
        let mut labels     = Vec::new();
        let mut num_tokens = 0usize;
        let mut has_gold   = false;

        for topic in corpus.topics() {
            let _scope   = ctx.topic_scope(topic.key());
            let features = TopicFeatures::<B>::encode(
                encoder, topic, self.max_mention_span, self.segment_window, ctx.device(),
            )?;
            let Some(features) = features else { continue };

            let scores = score_topic(&self.model, &features, self.batch_size)?;
            spans.extend(features.candidates().iter().zip(scores).map(|(c, score)| ScoredSpan {
                doc_id:      c.meta.doc_id.clone(),
                sentence_id: c.meta.sentence_id,
                start:       c.meta.start,
                end:         c.meta.end,
                score,
            }));
            labels.extend_from_slice(features.labels());
            num_tokens += features.num_tokens();
            has_gold   |= topic.gold_count() > 0;
        }

        let scores: Vec<f32> = spans.iter().map(|s| s.score).collect();
        let keep  = top_k_indices(&scores, rank_cutoff(fraction, num_tokens));
        tracing::info!("Selected {} of {} candidate spans (k = {})", keep.len(), spans.len(), fraction);

        let evaluation = if has_gold {
            let mut predicted = vec![false; spans.len()];
            for &i in &keep {
                predicted[i] = true;
            }
            Some(Evaluation::new(&predicted, &labels)?)
        } else {
            None
        };

        let selected = keep.into_iter().map(|i| spans[i].clone()).collect();
        Ok(Prediction { spans: selected, evaluation })
    }
}
