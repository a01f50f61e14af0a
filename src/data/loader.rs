// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads one split of the corpus from a data folder:
//
//   <data_folder>/<split>.json                 documents
//   <data_folder>/<split>_<mention_type>.json  gold mentions
//
// The documents file maps doc_id → token rows; serde_json gives
// us the object sorted by key, so document order is stable.
// Test splits may ship without a mentions file: a loader built
// with `optional_mentions` then yields no gold instead of failing.

use anyhow::{Context, Result};
use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};

use crate::domain::document::{Document, RawToken};
use crate::domain::mention::GoldMention;
use crate::domain::traits::CorpusSource;

/// Loads the documents and mentions of one split from JSON files.
pub struct JsonCorpusLoader {
    data_folder:  PathBuf,
    split:        String,
    mention_type: String,
    optional:     bool,
}

impl JsonCorpusLoader {
    pub fn new(
        data_folder:  impl AsRef<Path>,
        split:        impl Into<String>,
        mention_type: impl Into<String>,
    ) -> Self {
        Self {
            data_folder:  data_folder.as_ref().to_path_buf(),
            split:        split.into(),
            mention_type: mention_type.into(),
            optional:     false,
        }
    }

    /// Treat a missing mentions file as a split without gold.
    pub fn optional_mentions(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn documents_path(&self) -> PathBuf {
        self.data_folder.join(format!("{}.json", self.split))
    }

    pub fn mentions_path(&self) -> PathBuf {
        self.data_folder.join(format!("{}_{}.json", self.split, self.mention_type))
    }
}

impl CorpusSource for JsonCorpusLoader {
    fn load_documents(&self) -> Result<Vec<Document>> {
        let path = self.documents_path();
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read documents file '{}'", path.display()))?;
        let raw: BTreeMap<String, Vec<RawToken>> = serde_json::from_str(&json)
            .with_context(|| format!("Malformed documents file '{}'", path.display()))?;

        let docs: Vec<Document> = raw
            .into_iter()
            .map(|(doc_id, rows)| Document::from_rows(doc_id, rows))
            .collect();

        tracing::debug!("Read {} documents from '{}'", docs.len(), path.display());
        Ok(docs)
    }

    fn load_mentions(&self) -> Result<Vec<GoldMention>> {
        let path = self.mentions_path();
        if self.optional && !path.exists() {
            tracing::info!("No gold mentions at '{}', scoring without evaluation", path.display());
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read mentions file '{}'", path.display()))?;
        let mentions: Vec<GoldMention> = serde_json::from_str(&json)
            .with_context(|| format!("Malformed mentions file '{}'", path.display()))?;

        tracing::debug!("Read {} gold mentions from '{}'", mentions.len(), path.display());
        Ok(mentions)
    }
}
