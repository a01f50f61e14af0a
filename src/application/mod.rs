// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: each use case wires the data,
// ml and infra layers together for one command.
//
//   train_use_case.rs   — TrainConfig + a full training run
//   predict_use_case.rs — score a split from a checkpoint
//
// No model math and no printing here.

// The training workflow and its configuration
pub mod train_use_case;

// Span selection with a trained checkpoint
pub mod predict_use_case;
