// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Persists the mention extractor of one experiment. The two
// halves are written to separate files so the downstream stage
// can load the span representation on its own:
//
//   <model_path>/
//     events_span_repr_0.mpk.gz     span embedder weights
//     events_span_scorer_0.mpk.gz   scorer weights
//     events_config_0.json          effective TrainConfig
//     events_best_0.json            best recall, epoch, fraction
//
// Weights are stored at full precision so a reload scores
// exactly like the saved model.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder},
};
use std::{fs, path::{Path, PathBuf}};

use crate::application::train_use_case::TrainConfig;
use crate::ml::{evaluation::BestRecall, model::MentionExtractor};

/// Recorder used for every weight file of the crate.
pub type WeightsRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

pub struct CheckpointManager {
    dir:          PathBuf,
    mention_type: String,
    exp_num:      String,
}

impl CheckpointManager {
    /// Creates `dir` if needed.
    pub fn new(dir: impl AsRef<Path>, mention_type: &str, exp_num: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create model directory '{}'", dir.display()))?;
        Ok(Self { dir, mention_type: mention_type.to_string(), exp_num: exp_num.to_string() })
    }

    fn file(&self, part: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{}_{}_{}{}", self.mention_type, part, self.exp_num, extension))
    }

    /// Weight file of the span embedder, without the recorder's extension.
    pub fn span_repr_path(&self) -> PathBuf {
        self.file("span_repr", "")
    }

    /// Weight file of the scorer, without the recorder's extension.
    pub fn span_scorer_path(&self) -> PathBuf {
        self.file("span_scorer", "")
    }

    pub fn config_path(&self) -> PathBuf {
        self.file("config", ".json")
    }

    pub fn best_path(&self) -> PathBuf {
        self.file("best", ".json")
    }

    pub fn save<B: Backend>(&self, model: &MentionExtractor<B>) -> Result<()> {
        let recorder = WeightsRecorder::new();
        let repr     = self.span_repr_path();
        let scorer   = self.span_scorer_path();

        model
            .span_repr
            .clone()
            .save_file(repr.clone(), &recorder)
            .with_context(|| format!("Failed to save span representation to '{}'", repr.display()))?;
        model
            .span_scorer
            .clone()
            .save_file(scorer.clone(), &recorder)
            .with_context(|| format!("Failed to save span scorer to '{}'", scorer.display()))?;

        tracing::debug!("Saved checkpoint to '{}'", self.dir.display());
        Ok(())
    }

    /// Load saved weights into `template`, which must have the saved
    /// architecture.
    pub fn load<B: Backend>(&self, template: MentionExtractor<B>, device: &B::Device) -> Result<MentionExtractor<B>> {
        let recorder = WeightsRecorder::new();
        let repr     = self.span_repr_path();
        let scorer   = self.span_scorer_path();

        let span_repr = template
            .span_repr
            .load_file(repr.clone(), &recorder, device)
            .with_context(|| format!("Cannot load span representation '{}'. Has training run?", repr.display()))?;
        let span_scorer = template
            .span_scorer
            .load_file(scorer.clone(), &recorder, device)
            .with_context(|| format!("Cannot load span scorer '{}'. Has training run?", scorer.display()))?;

        Ok(MentionExtractor { span_repr, span_scorer })
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        write_json(&self.config_path(), cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        read_json(&self.config_path())
    }

    pub fn save_best(&self, best: &BestRecall) -> Result<()> {
        write_json(&self.best_path(), best)
    }

    /// `None` until a first checkpoint has been written.
    pub fn load_best(&self) -> Result<Option<BestRecall>> {
        let path = self.best_path();
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path).with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Cannot parse '{}'", path.display()))
}
