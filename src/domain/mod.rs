// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits: documents, gold mentions and
// span identities. No Burn types and no file I/O in here.

// A raw document: sentences of word tokens
pub mod document;

// Gold mentions and span keys
pub mod mention;

// Core abstractions other layers implement
pub mod traits;
