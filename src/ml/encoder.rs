// ============================================================
// Layer 5 — Contextual Token Encoder
// ============================================================
// The span scorer never depends on a concrete encoder: the
// training loop only sees the TokenEmbedder trait, which maps a
// batch of subword id sequences to per-token vectors plus the
// valid length of each sequence.
//
// TransformerEncoder is the bundled implementation: token and
// position embeddings, a stack of self-attention blocks (GELU
// feed-forward, post-norm residuals) and a final layer norm.
// Its assets live in one directory:
//
//   encoder_config.json   architecture (burn Config)
//   encoder.mpk.gz        weights (full precision, gzipped)
//   tokenizer.json        vocabulary (see infra::tokenizer_store)
//
// The encoder is frozen during span-scorer training; it runs on
// the non-autodiff backend.

use anyhow::{ensure, Context, Result};
use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};
use std::path::Path;

use crate::infra::checkpoint::WeightsRecorder;

// ─── TokenEmbedder ────────────────────────────────────────────────────────────
/// Output of one encoder call.
#[derive(Debug, Clone)]
pub struct EncodedBatch<B: Backend> {
    /// [S, L, H], rows past `lengths[s]` are padding
    pub embeddings: Tensor<B, 3>,
    pub lengths:    Vec<usize>,
}

impl<B: Backend> EncodedBatch<B> {
    /// Concatenate the valid rows of every sequence into one [T, H] matrix.
    pub fn flatten(self) -> Result<Tensor<B, 2>> {
        let [s, _, h] = self.embeddings.dims();
        ensure!(s == self.lengths.len(), "{} encoded sequences but {} lengths", s, self.lengths.len());

        let rows: Vec<Tensor<B, 2>> = self
            .lengths
            .iter()
            .enumerate()
            .filter(|(_, &len)| len > 0)
            .map(|(i, &len)| {
                self.embeddings
                    .clone()
                    .slice([i..i + 1, 0..len, 0..h])
                    .reshape([len, h])
            })
            .collect();
        ensure!(!rows.is_empty(), "Encoded batch holds no tokens");
        Ok(Tensor::cat(rows, 0))
    }
}

/// A pretrained contextual encoder, treated as a pure function of its
/// weights and input ids.
pub trait TokenEmbedder<B: Backend> {
    /// Width H of every token vector
    fn hidden_size(&self) -> usize;

    /// Longest sequence one call accepts
    fn max_positions(&self) -> usize;

    /// Encode each id sequence. Sequences may differ in length.
    fn embed(&self, sequences: &[Vec<u32>], device: &B::Device) -> Result<EncodedBatch<B>>;
}

// ─── TransformerEncoder ───────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct TransformerEncoderConfig {
    pub vocab_size:  usize,
    #[config(default = 512)]
    pub max_seq_len: usize,
    #[config(default = 256)]
    pub d_model:     usize,
    #[config(default = 8)]
    pub num_heads:   usize,
    #[config(default = 6)]
    pub num_layers:  usize,
    #[config(default = 1024)]
    pub d_ff:        usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl TransformerEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransformerEncoder<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.d_model).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        TransformerEncoder {
            token_embedding, position_embedding, layers, final_norm, dropout,
            vocab_size:  self.vocab_size,
            max_seq_len: self.max_seq_len,
            d_model:     self.d_model,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// x: [batch, seq, d_model], mask_pad: [batch, seq] true on padding
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let input = MhaInput::self_attn(x.clone()).mask_pad(mask_pad);
        let attn_output = self.self_attn.forward(input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct TransformerEncoder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub dropout:            Dropout,
    pub vocab_size:         usize,
    pub max_seq_len:        usize,
    pub d_model:            usize,
}

impl<B: Backend> TransformerEncoder<B> {
    /// input_ids: [batch, seq_len] → [batch, seq_len, d_model]
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();

        let tok_emb = self.token_embedding.forward(input_ids);
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(tok_emb + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone());
        }
        self.final_norm.forward(x)
    }

    /// Load the encoder stored in `dir`, or create, save and return a
    /// freshly initialised one sized for `vocab_size` ids.
    pub fn load_or_init(dir: &Path, vocab_size: usize, device: &B::Device) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create encoder directory '{}'", dir.display()))?;

        let config_path = dir.join("encoder_config.json");
        let config = if config_path.exists() {
            TransformerEncoderConfig::load(&config_path)
                .map_err(|e| anyhow::anyhow!("Cannot read '{}': {e:?}", config_path.display()))?
        } else {
            let config = TransformerEncoderConfig::new(vocab_size);
            config
                .save(&config_path)
                .with_context(|| format!("Cannot write '{}'", config_path.display()))?;
            config
        };
        ensure!(
            config.vocab_size >= vocab_size,
            "Encoder vocabulary ({}) is smaller than the tokenizer's ({})",
            config.vocab_size, vocab_size
        );

        let encoder  = config.init::<B>(device);
        let weights  = dir.join("encoder");
        let recorder = WeightsRecorder::new();
        if dir.join("encoder.mpk.gz").exists() {
            tracing::info!("Loading encoder weights from '{}'", dir.display());
            encoder
                .load_file(weights.clone(), &recorder, device)
                .with_context(|| format!("Cannot load encoder weights '{}'", weights.display()))
        } else {
            tracing::warn!(
                "No encoder weights in '{}': initialising a new encoder and saving it there",
                dir.display()
            );
            encoder
                .clone()
                .save_file(weights.clone(), &recorder)
                .with_context(|| format!("Cannot save encoder weights '{}'", weights.display()))?;
            Ok(encoder)
        }
    }
}

impl<B: Backend> TokenEmbedder<B> for TransformerEncoder<B> {
    fn hidden_size(&self) -> usize {
        self.d_model
    }

    fn max_positions(&self) -> usize {
        self.max_seq_len
    }

    fn embed(&self, sequences: &[Vec<u32>], device: &B::Device) -> Result<EncodedBatch<B>> {
        ensure!(!sequences.is_empty(), "Nothing to encode");
        let lengths: Vec<usize> = sequences.iter().map(Vec::len).collect();
        let longest = lengths.iter().copied().max().unwrap_or(0);
        ensure!(longest > 0, "All sequences are empty");
        ensure!(
            longest <= self.max_seq_len,
            "Sequence of {} ids exceeds the encoder limit of {}", longest, self.max_seq_len
        );
        if let Some(id) = sequences.iter().flatten().find(|&&id| id as usize >= self.vocab_size) {
            anyhow::bail!("Token id {} is outside the encoder vocabulary ({})", id, self.vocab_size);
        }

        // Pad with id 0 and mark padding in the mask
        let batch = sequences.len();
        let mut ids   = Vec::with_capacity(batch * longest);
        let mut valid = Vec::with_capacity(batch * longest);
        for seq in sequences {
            ids.extend(seq.iter().map(|&x| x as i32));
            ids.extend(std::iter::repeat(0).take(longest - seq.len()));
            valid.extend(std::iter::repeat(1).take(seq.len()));
            valid.extend(std::iter::repeat(0).take(longest - seq.len()));
        }

        let input_ids = Tensor::<B, 1, Int>::from_ints(ids.as_slice(), device)
            .reshape([batch, longest]);
        let mask_pad = Tensor::<B, 1, Int>::from_ints(valid.as_slice(), device)
            .reshape([batch, longest])
            .equal_elem(0);

        Ok(EncodedBatch { embeddings: self.forward(input_ids, mask_pad), lengths })
    }
}
