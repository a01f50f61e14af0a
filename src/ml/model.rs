// ============================================================
// Layer 5 — Mention Extractor
// ============================================================
// The trainable part of the system:
//
//   SpanBatch ──► SpanEmbedder ──► [N, D] ──► SpanScorer ──► [N] logits
//
// Both halves live in one Module so a single optimizer updates
// them together; they are still checkpointed to separate files
// (see infra::checkpoint).
//
// Loss over logits x and labels y ∈ {0, 1}:
//   bce     binary cross-entropy with logits
//   hinge   mean(max(0, 1 - s·x)),  s = 2y - 1

use burn::{
    nn::loss::BinaryCrossEntropyLossConfig,
    prelude::*,
    tensor::activation::relu,
};
use serde::{Deserialize, Serialize};

use crate::data::batcher::SpanBatch;
use crate::ml::span_embedder::{SpanEmbedder, SpanEmbedderConfig};
use crate::ml::span_scorer::{SpanScorer, SpanScorerConfig};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct MentionExtractorConfig {
    pub span_repr:   SpanEmbedderConfig,
    #[config(default = 1024)]
    pub hidden:      usize,
    #[config(default = 0.3)]
    pub dropout:     f64,
}

impl MentionExtractorConfig {
    pub fn scorer_config(&self) -> SpanScorerConfig {
        SpanScorerConfig::new(self.span_repr.output_dim())
            .with_hidden(self.hidden)
            .with_dropout(self.dropout)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> MentionExtractor<B> {
        MentionExtractor {
            span_repr:   self.span_repr.init(device),
            span_scorer: self.scorer_config().init(device),
        }
    }
}

/// Training objective, `loss` in the experiment config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    Bce,
    Hinge,
}

impl LossKind {
    /// Mean loss of a batch of logits.
    pub fn forward<B: Backend>(self, logits: Tensor<B, 1>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        match self {
            Self::Bce => BinaryCrossEntropyLossConfig::new()
                .with_logits(true)
                .init(&logits.device())
                .forward(logits, targets),
            Self::Hinge => {
                let signs = targets.float().mul_scalar(2.0).sub_scalar(1.0);
                relu(signs.mul(logits).neg().add_scalar(1.0)).mean()
            }
        }
    }
}

#[derive(Module, Debug)]
pub struct MentionExtractor<B: Backend> {
    pub span_repr:   SpanEmbedder<B>,
    pub span_scorer: SpanScorer<B>,
}

impl<B: Backend> MentionExtractor<B> {
    /// One logit per span, aligned with the batch.
    pub fn forward(&self, batch: &SpanBatch<B>) -> Tensor<B, 1> {
        self.span_scorer.forward(self.span_repr.forward(batch))
    }

    /// Mean loss of the batch plus the raw logits.
    pub fn forward_loss(
        &self,
        batch:   &SpanBatch<B>,
        targets: Tensor<B, 1, Int>,
        loss:    LossKind,
    ) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let logits = self.forward(batch);
        (loss.forward(logits.clone(), targets), logits)
    }
}
