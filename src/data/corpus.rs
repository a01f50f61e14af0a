// ============================================================
// Layer 4 — Corpus and Topics
// ============================================================
// A Corpus is the ordered list of Topics of one split. A Topic
// groups the documents believed to describe the same event
// cluster, already tokenized into encoder subwords, together
// with the gold mention keys of those documents.
//
// Subword positions are document-relative. Every word keeps the
// half-open range of subwords it produced, so a word span maps
// to exactly one contiguous subword span.
//
//   doc "1_1ecb":   Police  arrested   him
//   subwords:       [0]     [1, 2]     [3]
//
// Topic keys come from the doc id prefix: "36_4ecbplus" belongs
// to topic "36", or to sub-topic "36_ecbplus" when sub-topics
// are enabled.

use anyhow::{ensure, Result};
use std::{
    collections::{BTreeMap, HashSet},
    ops::Range,
};

use crate::domain::{
    document::Document,
    mention::{GoldMention, SpanKey},
    traits::{CorpusSource, SubwordTokenizer},
};

/// Options that shape how topics are built.
#[derive(Debug, Clone, Copy)]
pub struct CorpusOptions {
    /// Split each topic by ECB / ECB+ origin of the documents
    pub use_subtopics:           bool,
    /// Only sentences flagged as annotated produce candidates
    pub selected_sentences_only: bool,
}

impl Default for CorpusOptions {
    fn default() -> Self {
        Self { use_subtopics: true, selected_sentences_only: false }
    }
}

/// A word and the subwords it was split into.
#[derive(Debug, Clone)]
pub struct Word {
    pub token_id: u32,
    pub subwords: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct TokenizedSentence {
    pub sentence_id: u32,
    pub selected:    bool,
    pub words:       Vec<Word>,
    pub subwords:    Range<usize>,
}

#[derive(Debug, Clone)]
pub struct TokenizedDocument {
    pub doc_id:      String,
    pub sentences:   Vec<TokenizedSentence>,
    pub subword_ids: Vec<u32>,
}

impl TokenizedDocument {
    fn tokenize(doc: &Document, tokenizer: &impl SubwordTokenizer) -> Result<Self> {
        let mut subword_ids = Vec::new();
        let mut sentences   = Vec::with_capacity(doc.sentences.len());

        for sentence in &doc.sentences {
            let words: Vec<&str> = sentence.tokens.iter().map(|t| t.text.as_str()).collect();
            let pieces = tokenizer.tokenize_words(&words)?;
            ensure!(
                pieces.len() == words.len(),
                "Tokenizer returned {} pieces for {} words in '{}' sentence {}",
                pieces.len(), words.len(), doc.doc_id, sentence.sentence_id
            );

            let sentence_start = subword_ids.len();
            let mut tokenized  = Vec::with_capacity(words.len());
            for (token, ids) in sentence.tokens.iter().zip(pieces) {
                let start = subword_ids.len();
                subword_ids.extend(ids);
                tokenized.push(Word { token_id: token.token_id, subwords: start..subword_ids.len() });
            }

            sentences.push(TokenizedSentence {
                sentence_id: sentence.sentence_id,
                selected:    sentence.selected,
                words:       tokenized,
                subwords:    sentence_start..subword_ids.len(),
            });
        }

        Ok(Self { doc_id: doc.doc_id.clone(), sentences, subword_ids })
    }

    /// Split the document into encoder windows of at most `window`
    /// subwords, cutting at sentence boundaries when possible.
    /// Concatenating the returned segments gives back `subword_ids`.
    pub fn segments(&self, window: usize) -> Vec<Vec<u32>> {
        let mut segments = Vec::new();
        let mut current: Vec<u32> = Vec::new();

        for sentence in &self.sentences {
            let ids = &self.subword_ids[sentence.subwords.clone()];
            if !current.is_empty() && current.len() + ids.len() > window {
                segments.push(std::mem::take(&mut current));
            }
            if ids.len() > window {
                // Over-long sentence: hard split
                for chunk in ids.chunks(window) {
                    segments.push(chunk.to_vec());
                }
            } else {
                current.extend_from_slice(ids);
            }
        }
        if !current.is_empty() {
            segments.push(current);
        }
        segments
    }
}

/// One topic: its tokenized documents and gold mention keys.
#[derive(Debug, Clone)]
pub struct Topic {
    key:           String,
    documents:     Vec<TokenizedDocument>,
    gold:          HashSet<SpanKey>,
    selected_only: bool,
}

impl Topic {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn documents(&self) -> &[TokenizedDocument] {
        &self.documents
    }

    pub fn gold_count(&self) -> usize {
        self.gold.len()
    }

    pub fn is_gold(&self, key: &SpanKey) -> bool {
        self.gold.contains(key)
    }

    /// Whether candidates may be drawn from this sentence.
    pub fn is_eligible(&self, sentence: &TokenizedSentence) -> bool {
        !self.selected_only || sentence.selected
    }

    /// Offset of each document inside the topic's flat subword buffer.
    pub fn doc_offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.documents
            .iter()
            .map(|d| {
                let o = offset;
                offset += d.subword_ids.len();
                o
            })
            .collect()
    }

    pub fn total_subwords(&self) -> usize {
        self.documents.iter().map(|d| d.subword_ids.len()).sum()
    }

    /// Encoder input for the whole topic, document-major.
    pub fn segments(&self, window: usize) -> Vec<Vec<u32>> {
        self.documents.iter().flat_map(|d| d.segments(window)).collect()
    }

    /// Number of words the rank thresholds are measured against.
    pub fn num_tokens(&self) -> usize {
        self.documents
            .iter()
            .flat_map(|d| d.sentences.iter())
            .filter(|s| self.is_eligible(s))
            .map(|s| s.words.len())
            .sum()
    }
}

/// The ordered topics of one split.
#[derive(Debug, Clone)]
pub struct Corpus {
    topics: Vec<Topic>,
}

impl Corpus {
    /// Load a split through `source` and build its topics.
    pub fn from_source(
        source:    &impl CorpusSource,
        tokenizer: &impl SubwordTokenizer,
        options:   CorpusOptions,
    ) -> Result<Self> {
        let documents = source.load_documents()?;
        let mentions  = source.load_mentions()?;
        Self::build(documents, &mentions, tokenizer, options)
    }

    /// Tokenize every document and group documents and mentions by topic.
    pub fn build(
        documents: Vec<Document>,
        mentions:  &[GoldMention],
        tokenizer: &impl SubwordTokenizer,
        options:   CorpusOptions,
    ) -> Result<Self> {
        let mut grouped: BTreeMap<String, Vec<TokenizedDocument>> = BTreeMap::new();
        for doc in &documents {
            let key = topic_key(&doc.doc_id, options.use_subtopics);
            grouped.entry(key).or_default().push(TokenizedDocument::tokenize(doc, tokenizer)?);
        }

        let mut gold: BTreeMap<String, HashSet<SpanKey>> = BTreeMap::new();
        let mut orphans = 0usize;
        for mention in mentions {
            let key = topic_key(&mention.doc_id, options.use_subtopics);
            match (mention.key(), grouped.contains_key(&key)) {
                (Some(span), true) => {
                    gold.entry(key).or_default().insert(span);
                }
                _ => orphans += 1,
            }
        }
        if orphans > 0 {
            tracing::warn!("{} gold mentions have no matching document or no tokens", orphans);
        }

        let topics = grouped
            .into_iter()
            .map(|(key, documents)| Topic {
                gold: gold.remove(&key).unwrap_or_default(),
                key,
                documents,
                selected_only: options.selected_sentences_only,
            })
            .collect::<Vec<_>>();

        tracing::info!(
            "Built {} topics from {} documents and {} mentions",
            topics.len(), documents.len(), mentions.len()
        );
        Ok(Self { topics })
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Topic key of a document id such as "36_4ecbplus".
pub fn topic_key(doc_id: &str, use_subtopics: bool) -> String {
    let topic = doc_id.split('_').next().unwrap_or(doc_id);
    if !use_subtopics {
        return topic.to_string();
    }
    let origin = if doc_id.contains("plus") { "ecbplus" } else { "ecb" };
    format!("{topic}_{origin}")
}
