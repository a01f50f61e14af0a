// ============================================================
// Layer 4 — Span Batcher
// ============================================================
// Turns candidate spans into the three tensors the span
// embedder consumes:
//
//   start_end   [N, 2H]    embeddings of first and last subword
//   continuous  [N, L, H]  interior subwords, zero padded to L
//   widths      N          subword count of each span
//
// Interior sequences differ in length, so they are stored as an
// arena: the topic's flat token matrix [T, H] plus one extra
// all-zero row at index T. A span of width w gathers rows
// start..start+w and then L-w copies of the zero row, all in a
// single `select`, so padded positions are exactly zero.
//
// Example with T = 6, spans (0..=0) and (2..=4), L = 3:
//   gather indices = [0, 6, 6,  2, 3, 4]  → reshape [2, 3, H]

use anyhow::{ensure, Result};
use burn::prelude::*;

use crate::data::candidates::Candidate;

// ─── SpanBatch ────────────────────────────────────────────────────────────────
/// A validated batch of span inputs. Construct it through `new`,
/// `SpanBatcher::batch` (or `from_sequences` in tests), never by hand.
#[derive(Debug, Clone)]
pub struct SpanBatch<B: Backend> {
    start_end:  Tensor<B, 2>,
    continuous: Tensor<B, 3>,
    widths:     Vec<usize>,
}

impl<B: Backend> SpanBatch<B> {
    /// Validate already padded inputs.
    ///
    /// Rejects empty batches, mismatched counts, boundary vectors that are
    /// not 2×H wide, widths of zero and padding longer than the widest span.
    pub fn new(start_end: Tensor<B, 2>, continuous: Tensor<B, 3>, widths: Vec<usize>) -> Result<Self> {
        let [n, two_h] = start_end.dims();
        let [cn, l, h] = continuous.dims();

        ensure!(n > 0, "Span batch is empty");
        ensure!(
            cn == n && widths.len() == n,
            "Span batch counts disagree: {} boundary rows, {} interior sequences, {} widths",
            n, cn, widths.len()
        );
        ensure!(two_h == 2 * h, "Boundary embedding has {} columns, expected 2 x {}", two_h, h);
        if let Some(i) = widths.iter().position(|&w| w == 0 || w > l) {
            anyhow::bail!("Span {} has width {} but interior sequences hold {} positions", i, widths[i], l);
        }
        let widest = widths.iter().copied().max().unwrap_or(0);
        ensure!(widest == l, "Interior sequences padded to {} but the widest span is {}", l, widest);

        Ok(Self { start_end, continuous, widths })
    }

    /// Build a batch from one unpadded interior sequence per span.
    /// Each sequence must hold exactly `width` rows.
    #[cfg(test)]
    pub fn from_sequences(
        start_end: Tensor<B, 2>,
        sequences: Vec<Tensor<B, 2>>,
        widths:    Vec<usize>,
    ) -> Result<Self> {
        ensure!(
            sequences.len() == widths.len(),
            "{} interior sequences for {} widths", sequences.len(), widths.len()
        );
        ensure!(!sequences.is_empty(), "Span batch is empty");

        let hidden = sequences[0].dims()[1];
        for (i, (seq, &w)) in sequences.iter().zip(&widths).enumerate() {
            let [len, h] = seq.dims();
            ensure!(len == w, "Span {} has width {} but {} interior embeddings", i, w, len);
            ensure!(h == hidden, "Span {} interior embeddings are {} wide, expected {}", i, h, hidden);
        }

        let longest = widths.iter().copied().max().unwrap_or(0);
        let padded: Vec<Tensor<B, 3>> = sequences
            .into_iter()
            .map(|seq| {
                let [len, h] = seq.dims();
                let seq = if len < longest {
                    let pad = Tensor::zeros([longest - len, h], &seq.device());
                    Tensor::cat(vec![seq, pad], 0)
                } else {
                    seq
                };
                seq.unsqueeze_dim::<3>(0)
            })
            .collect();

        Self::new(start_end, Tensor::cat(padded, 0), widths)
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn start_end(&self) -> Tensor<B, 2> {
        self.start_end.clone()
    }

    pub fn continuous(&self) -> Tensor<B, 3> {
        self.continuous.clone()
    }

    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    pub fn device(&self) -> B::Device {
        self.start_end.device()
    }

    /// [N, L] mask, true on padded positions.
    pub fn padding_mask(&self) -> Tensor<B, 2, Bool> {
        let [n, l, _] = self.continuous.dims();
        let valid: Vec<i32> = self
            .widths
            .iter()
            .flat_map(|&w| (0..l).map(move |p| (p < w) as i32))
            .collect();
        Tensor::<B, 1, Int>::from_ints(valid.as_slice(), &self.device())
            .reshape([n, l])
            .equal_elem(0)
    }
}

// ─── SpanBatcher ──────────────────────────────────────────────────────────────
/// Gathers span batches out of one topic's flat token matrix.
#[derive(Debug, Clone)]
pub struct SpanBatcher<B: Backend> {
    /// [T + 1, H], the last row is all zeros
    tokens:    Tensor<B, 2>,
    pad_index: usize,
}

impl<B: Backend> SpanBatcher<B> {
    /// Wrap a [T, H] token matrix.
    pub fn new(tokens: Tensor<B, 2>) -> Self {
        let [t, h] = tokens.dims();
        let zero   = Tensor::zeros([1, h], &tokens.device());
        Self { tokens: Tensor::cat(vec![tokens, zero], 0), pad_index: t }
    }

    /// Number of real token rows.
    pub fn num_rows(&self) -> usize {
        self.pad_index
    }

    pub fn hidden_size(&self) -> usize {
        self.tokens.dims()[1]
    }

    /// Same arena, different tensor (e.g. lifted onto another backend).
    pub fn map_tokens<B2: Backend>(self, f: impl FnOnce(Tensor<B, 2>) -> Tensor<B2, 2>) -> SpanBatcher<B2> {
        SpanBatcher { tokens: f(self.tokens), pad_index: self.pad_index }
    }

    /// Build the batch for `spans`, keeping their order.
    pub fn batch(&self, spans: &[Candidate]) -> Result<SpanBatch<B>> {
        ensure!(!spans.is_empty(), "Span batch is empty");
        if let Some(bad) = spans.iter().find(|s| s.end < s.start || s.end >= self.pad_index) {
            anyhow::bail!(
                "Span {}..={} is outside the {} token rows of its topic",
                bad.start, bad.end, self.pad_index
            );
        }

        let device  = self.tokens.device();
        let hidden  = self.hidden_size();
        let n       = spans.len();
        let widths: Vec<usize> = spans.iter().map(Candidate::width).collect();
        let longest = widths.iter().copied().max().unwrap_or(1);

        let starts: Vec<i32> = spans.iter().map(|s| s.start as i32).collect();
        let ends:   Vec<i32> = spans.iter().map(|s| s.end as i32).collect();
        let mut gather: Vec<i32> = Vec::with_capacity(n * longest);
        for span in spans {
            for p in 0..longest {
                let row = if p < span.width() { span.start + p } else { self.pad_index };
                gather.push(row as i32);
            }
        }

        let index = |v: &[i32]| Tensor::<B, 1, Int>::from_ints(v, &device);
        let start_end = Tensor::cat(
            vec![
                self.tokens.clone().select(0, index(&starts)),
                self.tokens.clone().select(0, index(&ends)),
            ],
            1,
        );
        let continuous = self
            .tokens
            .clone()
            .select(0, index(&gather))
            .reshape([n, longest, hidden]);

        SpanBatch::new(start_end, continuous, widths)
    }
}
