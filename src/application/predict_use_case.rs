// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Scores one split with the best checkpoint of an experiment
// and writes the selected spans as JSON:
//
//   Step 1: Load tokenizer and split     (Layer 6, Layer 4)
//   Step 2: Pick backend from gpu_num    (Layer 5 - ml)
//   Step 3: Load encoder + checkpoint    (Layer 5, Layer 6)
//   Step 4: Score, keep top fraction     (Layer 5 - ml)
//   Step 5: Write <output> JSON

use anyhow::{ensure, Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::Backend,
};
use std::path::{Path, PathBuf};

use crate::application::train_use_case::TrainConfig;
use crate::data::{corpus::Corpus, loader::JsonCorpusLoader};
use crate::infra::{checkpoint::CheckpointManager, tokenizer_store::TokenizerStore};
use crate::ml::{
    compute::{ComputeContext, DeviceSpec},
    encoder::{TokenEmbedder, TransformerEncoder},
    inferencer::{Inferencer, Prediction},
};

pub struct PredictUseCase {
    config:      TrainConfig,
    data_folder: PathBuf,
    split:       String,
    fraction:    f64,
    output:      PathBuf,
}

impl PredictUseCase {
    pub fn new(
        config:      TrainConfig,
        data_folder: impl AsRef<Path>,
        split:       impl Into<String>,
        fraction:    f64,
        output:      impl AsRef<Path>,
    ) -> Self {
        Self {
            config,
            data_folder: data_folder.as_ref().to_path_buf(),
            split:       split.into(),
            fraction,
            output:      output.as_ref().to_path_buf(),
        }
    }

    pub fn execute(&self) -> Result<Prediction> {
        let cfg = &self.config;
        ensure!(
            self.fraction.is_finite() && self.fraction > 0.0,
            "fraction must be positive, got {}", self.fraction
        );

        // ── Step 1: Tokenizer and split ───────────────────────────────────────
        // Prediction never builds a vocabulary: ids must match training
        let tokenizer = TokenizerStore::new(&cfg.roberta_model).load()?;
        let source    = JsonCorpusLoader::new(&self.data_folder, self.split.as_str(), cfg.mention_type.as_str())
            .optional_mentions();
        let corpus    = Corpus::from_source(&source, &tokenizer, cfg.corpus_options())?;
        ensure!(!corpus.is_empty(), "Split '{}' has no documents", self.split);

        // ── Step 2: Backend ───────────────────────────────────────────────────
        let vocab_size = tokenizer.get_vocab_size(true);
        let prediction = match DeviceSpec::select(cfg.gpu_num) {
            DeviceSpec::Cpu    => self.predict_on::<NdArray>(NdArrayDevice::Cpu, vocab_size, &corpus)?,
            DeviceSpec::Gpu(n) => self.predict_on::<Wgpu>(WgpuDevice::DiscreteGpu(n), vocab_size, &corpus)?,
        };

        if let Some(eval) = &prediction.evaluation {
            tracing::info!(
                "K = {}, Recall: {:.6}, Precision: {:.6}, F1: {:.6}",
                self.fraction, eval.recall(), eval.precision(), eval.f1()
            );
        }

        // ── Step 5: Write output ──────────────────────────────────────────────
        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        std::fs::write(&self.output, serde_json::to_string_pretty(&prediction.spans)?)
            .with_context(|| format!("Cannot write predictions to '{}'", self.output.display()))?;
        tracing::info!("Wrote {} spans to '{}'", prediction.spans.len(), self.output.display());

        Ok(prediction)
    }

    fn predict_on<B: Backend>(&self, device: B::Device, vocab_size: usize, corpus: &Corpus) -> Result<Prediction> {
        let cfg = &self.config;

        // ── Step 3: Encoder and checkpoint ────────────────────────────────────
        let encoder    = TransformerEncoder::<B>::load_or_init(Path::new(&cfg.roberta_model), vocab_size, &device)?;
        let ckpt       = CheckpointManager::new(&cfg.model_path, &cfg.mention_type, &cfg.exp_num)?;
        let inferencer = Inferencer::<B>::from_checkpoint(&ckpt, encoder.hidden_size(), &device)?;

        // ── Step 4: Score ─────────────────────────────────────────────────────
        let ctx = ComputeContext::<B>::new(device);
        inferencer.predict(&encoder, corpus, self.fraction, &ctx)
    }
}
