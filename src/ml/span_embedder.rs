// ============================================================
// Layer 5 — Span Embedder
// ============================================================
// Maps a batch of variable-width spans to fixed-size vectors:
//
//   [ start ‖ end ]      2H   boundary token embeddings
//   width bucket          E   learned, one row per log-width bucket
//   attention pooling     H   softmax-weighted sum of interior tokens
//
// Padded interior positions get a large negative logit, so their
// softmax weight is exactly zero and the pooled vector equals
// pooling over the unpadded sequence. A width-1 span pools to its
// single token.

use burn::{
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{relu, softmax},
};

use crate::data::batcher::SpanBatch;

/// Logit given to padded interior positions.
const MASKED_LOGIT: f32 = -1.0e9;

/// Bucket of a span width: widths 1..=5 get their own bucket, longer
/// spans share log2-sized buckets, the last bucket takes everything
/// beyond. Non-decreasing in `width`.
pub fn width_bucket(width: usize, num_buckets: usize) -> usize {
    let distance = width.saturating_sub(1);
    let bucket = if distance <= 4 {
        distance
    } else {
        (usize::BITS - 1 - distance.leading_zeros()) as usize + 3
    };
    bucket.min(num_buckets.saturating_sub(1))
}

#[derive(Config, Debug)]
pub struct SpanEmbedderConfig {
    /// Encoder hidden size H
    pub hidden_size:      usize,
    #[config(default = 20)]
    pub width_dim:        usize,
    #[config(default = 10)]
    pub width_buckets:    usize,
    #[config(default = 1024)]
    pub attention_hidden: usize,
    #[config(default = true)]
    pub with_width:       bool,
    #[config(default = true)]
    pub with_attention:   bool,
    #[config(default = 0.3)]
    pub dropout:          f64,
}

impl SpanEmbedderConfig {
    /// Size of the vector produced for every span.
    pub fn output_dim(&self) -> usize {
        let mut dim = 2 * self.hidden_size;
        if self.with_width {
            dim += self.width_dim;
        }
        if self.with_attention {
            dim += self.hidden_size;
        }
        dim
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> SpanEmbedder<B> {
        let width_embedding = self
            .with_width
            .then(|| EmbeddingConfig::new(self.width_buckets, self.width_dim).init(device));
        let attention = self.with_attention.then(|| AttentionHead {
            dropout: DropoutConfig::new(self.dropout).init(),
            hidden:  LinearConfig::new(self.hidden_size, self.attention_hidden).init(device),
            score:   LinearConfig::new(self.attention_hidden, 1).init(device),
        });
        SpanEmbedder {
            width_embedding,
            attention,
            width_buckets: self.width_buckets,
            width_dim:     self.width_dim,
        }
    }
}

/// Scores each interior token: dropout → linear → ReLU → linear.
#[derive(Module, Debug)]
pub struct AttentionHead<B: Backend> {
    dropout: Dropout,
    hidden:  Linear<B>,
    score:   Linear<B>,
}

impl<B: Backend> AttentionHead<B> {
    /// [N, L, H] → [N, L]
    fn logits(&self, tokens: Tensor<B, 3>) -> Tensor<B, 2> {
        let [n, l, _] = tokens.dims();
        let x = relu(self.hidden.forward(self.dropout.forward(tokens)));
        self.score.forward(x).reshape([n, l])
    }
}

#[derive(Module, Debug)]
pub struct SpanEmbedder<B: Backend> {
    width_embedding: Option<Embedding<B>>,
    attention:       Option<AttentionHead<B>>,
    width_buckets:   usize,
    width_dim:       usize,
}

impl<B: Backend> SpanEmbedder<B> {
    /// One fixed-size vector per span, in batch order: [N, output_dim].
    pub fn forward(&self, batch: &SpanBatch<B>) -> Tensor<B, 2> {
        let mut parts = vec![batch.start_end()];

        if let Some(table) = &self.width_embedding {
            parts.push(self.width_features(table, batch));
        }
        if let Some(head) = &self.attention {
            parts.push(Self::attention_pool(head, batch));
        }

        Tensor::cat(parts, 1)
    }

    fn width_features(&self, table: &Embedding<B>, batch: &SpanBatch<B>) -> Tensor<B, 2> {
        let n = batch.len();
        let buckets: Vec<i32> = batch
            .widths()
            .iter()
            .map(|&w| width_bucket(w, self.width_buckets) as i32)
            .collect();
        let ids = Tensor::<B, 1, Int>::from_ints(buckets.as_slice(), &batch.device()).reshape([n, 1]);
        table.forward(ids).reshape([n, self.width_dim])
    }

    fn attention_pool(head: &AttentionHead<B>, batch: &SpanBatch<B>) -> Tensor<B, 2> {
        let tokens = batch.continuous();
        let [n, l, h] = tokens.dims();

        // Every span is a single token
        if l == 1 {
            return tokens.reshape([n, h]);
        }

        let logits  = head.logits(tokens.clone()).mask_fill(batch.padding_mask(), MASKED_LOGIT);
        let weights = softmax(logits, 1);
        (weights.unsqueeze_dim::<3>(2).expand([n, l, h]) * tokens)
            .sum_dim(1)
            .reshape([n, h])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    const H: usize = 4;

    fn embedder(with_width: bool, with_attention: bool) -> (SpanEmbedderConfig, SpanEmbedder<B>) {
        let cfg = SpanEmbedderConfig::new(H)
            .with_width_dim(3)
            .with_attention_hidden(8)
            .with_with_width(with_width)
            .with_with_attention(with_attention);
        let model = cfg.init(&Default::default());
        (cfg, model)
    }

    fn seq(rows: usize, seed: f32) -> Tensor<B, 2> {
        let data: Vec<f32> = (0..rows * H).map(|i| ((i as f32 + seed) * 0.37).sin()).collect();
        Tensor::from_data(TensorData::new(data, [rows, H]), &Default::default())
    }

    fn batch(widths: &[usize]) -> SpanBatch<B> {
        let seqs: Vec<Tensor<B, 2>> = widths.iter().enumerate().map(|(i, &w)| seq(w, i as f32)).collect();
        let se = Tensor::cat(
            seqs.iter().map(|s| {
                let w = s.dims()[0];
                Tensor::cat(vec![s.clone().slice([0..1, 0..H]), s.clone().slice([w - 1..w, 0..H])], 1)
            }).collect(),
            0,
        );
        SpanBatch::from_sequences(se, seqs, widths.to_vec()).unwrap()
    }

    fn values<const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_width_bucket_is_monotonic() {
        let buckets: Vec<usize> = (1..=80).map(|w| width_bucket(w, 10)).collect();
        assert!(buckets.windows(2).all(|p| p[0] <= p[1]));
        assert_eq!(&buckets[..6], &[0, 1, 2, 3, 4, 5]);
        assert_eq!(width_bucket(8, 10), 5);
        assert_eq!(width_bucket(9, 10), 6);
        assert_eq!(width_bucket(1000, 10), 9);
        assert_eq!(width_bucket(1000, 4), 3);
    }

    #[test]
    fn test_output_dim_is_constant_across_widths() {
        let (cfg, model) = embedder(true, true);
        assert_eq!(cfg.output_dim(), 2 * H + 3 + H);

        for widths in [vec![1], vec![1, 3, 5], vec![7, 2]] {
            let out = model.forward(&batch(&widths));
            assert_eq!(out.dims(), [widths.len(), cfg.output_dim()]);
        }
    }

    #[test]
    fn test_optional_parts_change_output_dim() {
        let (cfg, model) = embedder(false, false);
        assert_eq!(cfg.output_dim(), 2 * H);
        assert_eq!(model.forward(&batch(&[2, 3])).dims(), [2, 2 * H]);

        let (cfg, model) = embedder(true, false);
        assert_eq!(model.forward(&batch(&[2])).dims(), [1, cfg.output_dim()]);
    }

    #[test]
    fn test_width_one_pools_to_its_token() {
        let (_, model) = embedder(false, true);
        let b   = batch(&[1, 4, 2]);
        let out = model.forward(&b);

        let pooled = values(out.slice([0..1, 2 * H..3 * H]));
        assert_eq!(pooled, values(seq(1, 0.0)));
    }

    #[test]
    fn test_padding_does_not_change_pooling() {
        let (_, model) = embedder(false, true);
        let alone  = values(model.forward(&batch(&[3])));
        let padded = values(model.forward(&batch(&[3, 6])).slice([0..1, 0..3 * H]));

        for (a, p) in alone.iter().zip(&padded) {
            assert!((a - p).abs() < 1e-6, "{a} vs {p}");
        }
    }

    #[test]
    fn test_equal_widths_share_width_features() {
        let (_, model) = embedder(true, false);
        let out = model.forward(&batch(&[3, 3, 1]));
        let w0 = values(out.clone().slice([0..1, 2 * H..2 * H + 3]));
        let w1 = values(out.clone().slice([1..2, 2 * H..2 * H + 3]));
        let w2 = values(out.slice([2..3, 2 * H..2 * H + 3]));
        assert_eq!(w0, w1);
        assert_ne!(w0, w2);
    }
}
