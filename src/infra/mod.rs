// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence concerns shared by training and prediction:
//
//   checkpoint.rs      — span embedder / scorer weights, the
//                        effective config and the best result
//                        of an experiment
//
//   tokenizer_store.rs — loads or builds tokenizer.json in the
//                        encoder directory; adapts it to the
//                        SubwordTokenizer trait
//
//   metrics.rs         — per-epoch, per-cutoff CSV log

/// Experiment checkpoints
pub mod checkpoint;

/// Tokenizer loading and building
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;
