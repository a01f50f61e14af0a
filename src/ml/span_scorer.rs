// ============================================================
// Layer 5 — Span Scorer
// ============================================================
// Feed-forward head mapping span vectors to one mention logit
// each. Positive logit = predicted mention.

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

#[derive(Config, Debug)]
pub struct SpanScorerConfig {
    pub input_dim: usize,
    #[config(default = 1024)]
    pub hidden:    usize,
    #[config(default = 0.3)]
    pub dropout:   f64,
}

impl SpanScorerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpanScorer<B> {
        SpanScorer {
            dropout: DropoutConfig::new(self.dropout).init(),
            input:   LinearConfig::new(self.input_dim, self.hidden).init(device),
            hidden:  LinearConfig::new(self.hidden, self.hidden).init(device),
            output:  LinearConfig::new(self.hidden, 1).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct SpanScorer<B: Backend> {
    dropout: Dropout,
    input:   Linear<B>,
    hidden:  Linear<B>,
    output:  Linear<B>,
}

impl<B: Backend> SpanScorer<B> {
    /// [N, D] → [N] logits, row order preserved.
    pub fn forward(&self, spans: Tensor<B, 2>) -> Tensor<B, 1> {
        let [n, _] = spans.dims();
        let x = relu(self.input.forward(self.dropout.forward(spans)));
        let x = relu(self.hidden.forward(self.dropout.forward(x)));
        self.output.forward(x).reshape([n])
    }
}
