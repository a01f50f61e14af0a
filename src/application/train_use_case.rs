// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a span-scorer training run in order:
//
//   Step 1: Read train + dev splits     (Layer 4 - data)
//   Step 2: Load / build tokenizer      (Layer 6 - infra)
//   Step 3: Build topic corpora         (Layer 4 - data)
//   Step 4: Pick backend from gpu_num   (Layer 5 - ml)
//   Step 5: Load the frozen encoder     (Layer 5 - ml)
//   Step 6: Save config for prediction  (Layer 6 - infra)
//   Step 7: Run the training loop       (Layer 5 - ml)

use anyhow::{ensure, Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

use crate::data::{
    corpus::{Corpus, CorpusOptions},
    loader::JsonCorpusLoader,
};
use crate::domain::{document::Document, traits::CorpusSource};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    compute::{ComputeContext, DeviceSpec},
    encoder::TransformerEncoder,
    evaluation::{eval_fractions, BestRecall},
    model::MentionExtractorConfig,
    span_embedder::SpanEmbedderConfig,
    trainer::TrainingSession,
};

// ─── Training Configuration ──────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
}

pub use crate::ml::model::LossKind;

/// Experiment configuration, read from a JSON file. Every key is
/// optional and falls back to `Default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub save_path:               String,
    pub model_path:              String,
    /// Negative selects the CPU
    pub gpu_num:                 i64,
    pub random_seed:             u64,
    /// Directory with tokenizer.json, encoder_config.json, encoder.mpk.gz
    pub roberta_model:           String,
    pub mention_type:            String,
    pub epochs:                  usize,
    pub batch_size:              usize,
    #[serde(deserialize_with = "string_or_number")]
    pub exp_num:                 String,
    pub optimizer:               OptimizerKind,
    pub loss:                    LossKind,
    pub learning_rate:           f64,
    pub weight_decay:            f64,
    pub dropout:                 f64,
    pub hidden_layer:            usize,
    /// Size of the width-bucket embedding
    pub embedding_dimension:     usize,
    pub width_buckets:           usize,
    pub max_mention_span:        usize,
    pub with_mention_width:      bool,
    pub with_head_attention:     bool,
    pub segment_window:          usize,
    pub use_subtopics:           bool,
    pub selected_sentences_only: bool,
    pub eval_fractions:          Option<Vec<f64>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            save_path:               "models/span_scorer".to_string(),
            model_path:              "models/span_scorer".to_string(),
            gpu_num:                 -1,
            random_seed:             0,
            roberta_model:           "models/encoder".to_string(),
            mention_type:            "events".to_string(),
            epochs:                  20,
            batch_size:              32,
            exp_num:                 "0".to_string(),
            optimizer:               OptimizerKind::Adam,
            loss:                    LossKind::Bce,
            learning_rate:           1e-4,
            weight_decay:            0.0,
            dropout:                 0.3,
            hidden_layer:            1024,
            embedding_dimension:     20,
            width_buckets:           10,
            max_mention_span:        10,
            with_mention_width:      true,
            with_head_attention:     true,
            segment_window:          512,
            use_subtopics:           true,
            selected_sentences_only: false,
            eval_fractions:          None,
        }
    }
}

/// `exp_num` may be written as `3` or `"3"`.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s)   => s,
        Raw::Number(n) => n.to_string(),
    })
}

impl TrainConfig {
    /// Read and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&json)
            .with_context(|| format!("Malformed config file '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.epochs > 0, "epochs must be positive");
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.max_mention_span > 0, "max_mention_span must be positive");
        ensure!(self.segment_window > 0, "segment_window must be positive");
        ensure!(self.width_buckets > 0, "width_buckets must be positive");
        ensure!(self.hidden_layer > 0, "hidden_layer must be positive");
        ensure!(!self.mention_type.is_empty(), "mention_type is empty");
        ensure!(self.learning_rate > 0.0, "learning_rate must be positive, got {}", self.learning_rate);
        ensure!(self.weight_decay >= 0.0, "weight_decay must not be negative");
        ensure!((0.0..1.0).contains(&self.dropout), "dropout must be in [0, 1), got {}", self.dropout);
        if let Some(fractions) = &self.eval_fractions {
            ensure!(!fractions.is_empty(), "eval_fractions is empty");
            ensure!(
                fractions.iter().all(|k| k.is_finite() && *k > 0.0),
                "eval_fractions must be positive, got {:?}", fractions
            );
        }
        Ok(())
    }

    /// Rank fractions evaluated on the dev split.
    pub fn fractions(&self) -> Vec<f64> {
        self.eval_fractions
            .clone()
            .unwrap_or_else(|| eval_fractions(&self.mention_type))
    }

    pub fn corpus_options(&self) -> CorpusOptions {
        CorpusOptions {
            use_subtopics:           self.use_subtopics,
            selected_sentences_only: self.selected_sentences_only,
        }
    }

    /// Mention extractor architecture for an encoder of width `hidden_size`.
    pub fn model_config(&self, hidden_size: usize) -> MentionExtractorConfig {
        let span_repr = SpanEmbedderConfig::new(hidden_size)
            .with_width_dim(self.embedding_dimension)
            .with_width_buckets(self.width_buckets)
            .with_attention_hidden(self.hidden_layer)
            .with_with_width(self.with_mention_width)
            .with_with_attention(self.with_head_attention)
            .with_dropout(self.dropout);
        MentionExtractorConfig::new(span_repr)
            .with_hidden(self.hidden_layer)
            .with_dropout(self.dropout)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config:      TrainConfig,
    data_folder: PathBuf,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig, data_folder: impl AsRef<Path>) -> Self {
        Self { config, data_folder: data_folder.as_ref().to_path_buf() }
    }

    /// Execute the full training pipeline end to end.
    pub fn execute(&self) -> Result<BestRecall> {
        let cfg = &self.config;
        cfg.validate()?;
        std::fs::create_dir_all(&cfg.save_path)
            .with_context(|| format!("Cannot create save_path '{}'", cfg.save_path))?;
        tracing::info!("Configuration:\n{}", serde_json::to_string_pretty(cfg)?);

        // ── Step 1: Read the train split ──────────────────────────────────────
        // Its words seed the vocabulary when no tokenizer exists yet
        tracing::info!("Processing train set");
        let train_source   = self.source("train");
        let train_docs     = train_source.load_documents()?;
        let train_mentions = train_source.load_mentions()?;

        // ── Step 2: Tokenizer ─────────────────────────────────────────────────
        let tokenizer = TokenizerStore::new(&cfg.roberta_model).load_or_build(&texts(&train_docs))?;

        // ── Step 3: Topics ────────────────────────────────────────────────────
        let options = cfg.corpus_options();
        let train   = Corpus::build(train_docs, &train_mentions, &tokenizer, options)?;
        tracing::info!("Processing dev set");
        let dev     = Corpus::from_source(&self.source("dev"), &tokenizer, options)?;
        ensure!(!train.is_empty(), "Train split in '{}' has no documents", self.data_folder.display());

        // ── Step 4: Backend ───────────────────────────────────────────────────
        let spec = DeviceSpec::select(cfg.gpu_num);
        tracing::info!("Using device: {}", spec);
        match spec {
            DeviceSpec::Cpu    => self.train_on::<Autodiff<NdArray>>(NdArrayDevice::Cpu, &tokenizer, &train, &dev),
            DeviceSpec::Gpu(n) => self.train_on::<Autodiff<Wgpu>>(WgpuDevice::DiscreteGpu(n), &tokenizer, &train, &dev),
        }
    }

    fn source(&self, split: &str) -> JsonCorpusLoader {
        JsonCorpusLoader::new(&self.data_folder, split, self.config.mention_type.as_str())
    }

    fn train_on<B: AutodiffBackend>(
        &self,
        device:    B::Device,
        tokenizer: &Tokenizer,
        train:     &Corpus,
        dev:       &Corpus,
    ) -> Result<BestRecall> {
        let cfg = &self.config;

        // ── Step 5: Frozen encoder on the inner backend ───────────────────────
        let encoder = TransformerEncoder::<B::InnerBackend>::load_or_init(
            Path::new(&cfg.roberta_model),
            tokenizer.get_vocab_size(true),
            &device,
        )?;

        // ── Step 6: Save config for prediction ────────────────────────────────
        let ckpt = CheckpointManager::new(&cfg.model_path, &cfg.mention_type, &cfg.exp_num)?;
        ckpt.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.save_path)?;
        tracing::info!("Logging metrics to '{}'", metrics.csv_path().display());

        // ── Step 7: Training loop (Layer 5) ───────────────────────────────────
        let ctx = ComputeContext::<B::InnerBackend>::new(device);
        TrainingSession::<B, _> { cfg, encoder: &encoder, ctx: &ctx, ckpt: &ckpt, metrics: &metrics }
            .run(train, dev)
    }
}

/// Whitespace-joined sentences, the input of a built vocabulary.
pub fn texts(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .flat_map(|d| d.sentences.iter())
        .map(|s| s.tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" "))
        .collect()
}
