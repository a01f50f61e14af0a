// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here.
//
//   encoder.rs       — TokenEmbedder trait + bundled transformer
//                      encoder (frozen, inner backend)
//   span_embedder.rs — boundary + width bucket + attention pooling
//   span_scorer.rs   — feed-forward head, one logit per span
//   model.rs         — MentionExtractor = embedder + scorer
//   features.rs      — per-topic token matrix, candidates, labels
//   compute.rs       — backend/device choice, per-topic scope
//   evaluation.rs    — strict / top-k P, R, F1 and best recall
//   trainer.rs       — epoch → topic → mini-batch loop
//   inferencer.rs    — score a split from a saved checkpoint
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Contextual token encoder
pub mod encoder;

/// Span representation
pub mod span_embedder;

/// Span scoring head
pub mod span_scorer;

/// Trainable mention extractor
pub mod model;

/// Per-topic encoded features
pub mod features;

/// Device selection and topic scopes
pub mod compute;

/// Dev-set metrics
pub mod evaluation;

/// Full training loop with dev evaluation and checkpointing
pub mod trainer;

/// Prediction from a checkpoint
pub mod inferencer;
