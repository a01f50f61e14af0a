// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the corpus JSON files to the tensors the
// span embedder consumes.
//
//   <split>.json + <split>_<type>.json
//       │
//       ▼
//   JsonCorpusLoader  → documents and gold mentions
//       │
//       ▼
//   Corpus            → topics, subword tokenization, gold keys
//       │
//       ▼
//   candidates        → every span up to max width, with labels
//       │
//       ▼
//   SpanBatcher       → start/end, padded interior, widths
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Reads `<split>.json` and `<split>_<mention_type>.json`
pub mod loader;

/// Topics of a split, tokenized into subwords
pub mod corpus;

/// Candidate span enumeration and gold labels
pub mod candidates;

/// Gathers span tensors from a topic's token matrix
pub mod batcher;

/// Tiny in-memory documents and a tokenizer for tests
#[cfg(test)]
pub mod fixtures;
