// ============================================================
// Layer 5 — Training Loop
// ============================================================
// epoch → topic → mini-batch, all sequential:
//
//   for each epoch
//     shuffle topic order (StdRng seeded with random_seed + epoch)
//     for each topic                        [TopicScope alive]
//       encode with the frozen encoder      (inner backend)
//       lift token matrix into autodiff graph
//       for each mini-batch, in enumeration order
//         forward → loss (bce | hinge) → backward → optimizer step
//     score the whole dev split with model.valid()
//     strict + top-k evaluation, CSV rows, checkpoint on new best
//
// Key Burn 0.20 insight:
//   - Training uses B (Autodiff<..>) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - The encoder runs on B::InnerBackend; its output enters the
//     graph through Tensor::from_inner, so it gets no gradient
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, AdamWConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::application::train_use_case::{OptimizerKind, TrainConfig};
use crate::data::corpus::Corpus;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{Cutoff, EpochMetrics, MetricsLogger},
};
use crate::ml::{
    compute::ComputeContext,
    encoder::TokenEmbedder,
    evaluation::{ensure_finite, rank_cutoff, strict_predictions, top_k_predictions, BestRecall, Evaluation},
    features::TopicFeatures,
    model::{LossKind, MentionExtractor},
};

/// Run one topic's mini-batches. Returns the updated model and the
/// summed batch losses.
pub fn train_topic<B, O>(
    mut model:  MentionExtractor<B>,
    optim:      &mut O,
    features:   &TopicFeatures<B>,
    loss_kind:  LossKind,
    batch_size: usize,
    lr:         f64,
) -> Result<(MentionExtractor<B>, f64)>
where
    B: AutodiffBackend,
    O: Optimizer<MentionExtractor<B>, B>,
{
    let mut topic_loss = 0.0f64;

    for start in (0..features.len()).step_by(batch_size.max(1)) {
        let range   = start..(start + batch_size).min(features.len());
        let batch   = features.batch(range.clone())?;
        let targets = features.label_tensor(range, &batch.device());

        let (loss, _) = model.forward_loss(&batch, targets, loss_kind);
        topic_loss += loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(lr, model, grads);
    }

    Ok((model, topic_loss))
}

/// Logits of every candidate of a topic, in candidate order.
pub fn score_topic<B: Backend>(
    model:      &MentionExtractor<B>,
    features:   &TopicFeatures<B>,
    batch_size: usize,
) -> Result<Vec<f32>> {
    let mut scores = Vec::with_capacity(features.len());
    for start in (0..features.len()).step_by(batch_size.max(1)) {
        let range  = start..(start + batch_size).min(features.len());
        let logits = model.forward(&features.batch(range)?);
        let values = logits
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read scores: {e:?}"))?;
        scores.extend(values);
    }
    ensure_finite(&scores)?;
    Ok(scores)
}

/// Scores and labels of a whole split, pooled over topics.
#[derive(Debug, Clone, Default)]
pub struct SplitScores {
    pub scores:     Vec<f32>,
    pub labels:     Vec<bool>,
    pub num_tokens: usize,
}

/// Everything one training run reads but never mutates.
pub struct TrainingSession<'a, B: AutodiffBackend, E> {
    pub cfg:     &'a TrainConfig,
    pub encoder: &'a E,
    pub ctx:     &'a ComputeContext<B::InnerBackend>,
    pub ckpt:    &'a CheckpointManager,
    pub metrics: &'a MetricsLogger,
}

impl<'a, B, E> TrainingSession<'a, B, E>
where
    B: AutodiffBackend,
    E: TokenEmbedder<B::InnerBackend>,
{
    /// Train for `cfg.epochs` epochs and return the best dev recall.
    pub fn run(&self, train: &Corpus, dev: &Corpus) -> Result<BestRecall> {
        let cfg       = self.cfg;
        let model_cfg = cfg.model_config(self.encoder.hidden_size());
        let model: MentionExtractor<B> = model_cfg.init(self.ctx.device());
        tracing::info!("Number of parameters of mention extractor: {}", model.num_params());
        tracing::info!("Number of topics: {}", train.len());

        let decay = (cfg.weight_decay > 0.0).then(|| WeightDecayConfig::new(cfg.weight_decay as f32));
        match cfg.optimizer {
            OptimizerKind::Adam  => self.fit(model, AdamConfig::new().with_weight_decay(decay).init(), train, dev),
            OptimizerKind::AdamW => self.fit(
                model,
                AdamWConfig::new().with_weight_decay(cfg.weight_decay as f32).init(),
                train,
                dev,
            ),
            OptimizerKind::Sgd   => self.fit(model, SgdConfig::new().with_weight_decay(decay).init(), train, dev),
        }
    }

    fn fit<O>(&self, mut model: MentionExtractor<B>, mut optim: O, train: &Corpus, dev: &Corpus) -> Result<BestRecall>
    where
        O: Optimizer<MentionExtractor<B>, B>,
    {
        let cfg       = self.cfg;
        let fractions = cfg.fractions();
        let mut best  = BestRecall::default();

        for epoch in 1..=cfg.epochs {
            tracing::info!("Epoch: {}/{}", epoch, cfg.epochs);

            let mut order: Vec<usize> = (0..train.len()).collect();
            order.shuffle(&mut StdRng::seed_from_u64(cfg.random_seed.wrapping_add(epoch as u64)));

            let mut epoch_loss = 0.0f64;
            for &i in &order {
                let topic  = &train.topics()[i];
                let _scope = self.ctx.topic_scope(topic.key());

                let features = TopicFeatures::<B::InnerBackend>::encode(
                    self.encoder, topic, cfg.max_mention_span, cfg.segment_window, self.ctx.device(),
                )?;
                let Some(features) = features else {
                    tracing::debug!("Topic {} has no candidate spans, skipping", topic.key());
                    continue;
                };

                let (updated, loss) = train_topic(
                    model, &mut optim, &features.lift::<B>(), cfg.loss, cfg.batch_size, cfg.learning_rate,
                )?;
                model       = updated;
                epoch_loss += loss;
            }
            tracing::info!("Accumulate loss: {:.6}", epoch_loss);

            tracing::info!("Evaluate on the dev set");
            let dev_scores = self.score_split(&model.valid(), dev)?;
            if self.evaluate(epoch, epoch_loss, &dev_scores, &fractions, &mut best)? {
                self.ckpt.save(&model)?;
                self.ckpt.save_best(&best)?;
                tracing::info!("New best recall {:.4} (k = {}), checkpoint saved", best.recall, best.fraction);
            }
        }

        tracing::info!("Best Performance: ({:.6}, {})", best.recall, best.epoch);
        Ok(best)
    }

    /// Score every candidate of `corpus` without tracking gradients.
    pub fn score_split(&self, model: &MentionExtractor<B::InnerBackend>, corpus: &Corpus) -> Result<SplitScores> {
        let mut out = SplitScores::default();
        for topic in corpus.topics() {
            let _scope   = self.ctx.topic_scope(topic.key());
            let features = TopicFeatures::<B::InnerBackend>::encode(
                self.encoder, topic, self.cfg.max_mention_span, self.cfg.segment_window, self.ctx.device(),
            )?;
            let Some(features) = features else { continue };

            out.scores.extend(score_topic(model, &features, self.cfg.batch_size)?);
            out.labels.extend_from_slice(features.labels());
            out.num_tokens += features.num_tokens();
        }
        Ok(out)
    }

    /// Log and record strict and top-k results. Returns true when some
    /// fraction beat the best recall so far.
    fn evaluate(
        &self,
        epoch:     usize,
        loss:      f64,
        dev:       &SplitScores,
        fractions: &[f64],
        best:      &mut BestRecall,
    ) -> Result<bool> {
        let strict = Evaluation::new(&strict_predictions(&dev.scores), &dev.labels)?;
        tracing::info!(
            "Recall: {:.6}, Precision: {:.6}, F1: {:.6}",
            strict.recall(), strict.precision(), strict.f1()
        );
        self.metrics.log(&EpochMetrics { epoch, cutoff: Cutoff::Strict, evaluation: strict, train_loss: loss })?;

        let mut improved = false;
        for &k in fractions {
            let preds = top_k_predictions(&dev.scores, rank_cutoff(k, dev.num_tokens));
            let eval  = Evaluation::new(&preds, &dev.labels)?;
            improved |= best.observe(eval.recall(), epoch, k);
            tracing::info!(
                "K = {}, Recall: {:.6}, Precision: {:.6}, F1: {:.6}",
                k, eval.recall(), eval.precision(), eval.f1()
            );
            self.metrics.log(&EpochMetrics { epoch, cutoff: Cutoff::Fraction(k), evaluation: eval, train_loss: loss })?;
        }
        Ok(improved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::SpanBatcher;
    use crate::data::candidates::Candidate;
    use crate::data::corpus::CorpusOptions;
    use crate::data::fixtures::{doc, CharTokenizer};
    use crate::domain::mention::{GoldMention, SpanMeta};
    use crate::ml::features::tests::FakeEncoder;
    use crate::ml::{model::MentionExtractorConfig, span_embedder::SpanEmbedderConfig};
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray>;

    fn span(start: usize, end: usize) -> Candidate {
        Candidate {
            meta: SpanMeta { doc_id: "d".into(), sentence_id: 0, start: start as u32, end: end as u32 },
            start,
            end,
        }
    }

    /// Widths 1, 3 and 5 over a [10, 4] token matrix; only the middle span is gold.
    fn three_spans<BK: Backend>(device: &BK::Device) -> TopicFeatures<BK> {
        let data: Vec<f32> = (0..40).map(|i| (i as f32 * 0.29).cos()).collect();
        let tokens = Tensor::<BK, 2>::from_data(TensorData::new(data, [10, 4]), device);
        let spans  = vec![span(0, 0), span(1, 3), span(5, 9)];
        TopicFeatures::new(SpanBatcher::new(tokens), spans, vec![false, true, false], 10).unwrap()
    }

    #[test]
    fn test_one_step_on_three_spans() {
        let device = Default::default();
        let model  = MentionExtractorConfig::new(SpanEmbedderConfig::new(4).with_attention_hidden(8))
            .with_hidden(8)
            .init::<B>(&device);

        let features = three_spans::<B>(&device);
        assert_eq!(features.batch(0..3).unwrap().widths(), &[1, 3, 5]);

        let mut optim = AdamConfig::new().init();
        let (model, loss) = train_topic(model, &mut optim, &features, LossKind::Bce, 3, 1e-3).unwrap();
        assert!(loss.is_finite() && loss >= 0.0);

        // batch scores line up with one-span scores
        let valid  = model.valid();
        let inner  = three_spans::<NdArray>(&device);
        let all    = score_topic(&valid, &inner, 3).unwrap();
        let single = score_topic(&valid, &inner, 1).unwrap();
        assert_eq!(all.len(), 3);
        for (a, s) in all.iter().zip(&single) {
            assert!((a - s).abs() < 1e-5);
        }
    }

    #[test]
    fn test_small_run_writes_metrics_and_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            save_path:           dir.path().join("logs").display().to_string(),
            model_path:          dir.path().join("models").display().to_string(),
            epochs:              2,
            batch_size:          4,
            hidden_layer:        8,
            embedding_dimension: 3,
            dropout:             0.0,
            learning_rate:       1e-3,
            eval_fractions:      Some(vec![0.5, 5.0]),
            ..TrainConfig::default()
        };

        let opts  = CorpusOptions::default();
        let train = Corpus::build(
            vec![doc("1_1ecb", &[&["The", "bomb", "exploded"]]), doc("2_1ecb", &[&["Police", "came"]])],
            &[GoldMention { doc_id: "1_1ecb".into(), sentence_id: 0, tokens_ids: vec![2] }],
            &CharTokenizer,
            opts,
        )
        .unwrap();
        let dev = Corpus::build(
            vec![doc("3_1ecb", &[&["Fire", "spread", "fast"]])],
            &[GoldMention { doc_id: "3_1ecb".into(), sentence_id: 0, tokens_ids: vec![1] }],
            &CharTokenizer,
            opts,
        )
        .unwrap();

        let encoder = FakeEncoder { max_positions: 16 };
        let ctx     = ComputeContext::<NdArray>::new(Default::default());
        let ckpt    = CheckpointManager::new(&cfg.model_path, &cfg.mention_type, &cfg.exp_num).unwrap();
        let metrics = MetricsLogger::new(&cfg.save_path).unwrap();
        let session = TrainingSession::<B, _> { cfg: &cfg, encoder: &encoder, ctx: &ctx, ckpt: &ckpt, metrics: &metrics };

        let best = session.run(&train, &dev).unwrap();

        // k = 5.0 keeps every span, so recall 1 is reached in epoch 1
        assert_eq!(best.recall, 1.0);
        assert_eq!(best.epoch, 1);
        assert!(ckpt.span_repr_path().with_extension("mpk.gz").exists());
        assert_eq!(ckpt.load_best().unwrap(), Some(best));

        let csv = std::fs::read_to_string(metrics.csv_path()).unwrap();
        // header + 2 epochs × (strict + 2 fractions)
        assert_eq!(csv.lines().count(), 1 + 2 * 3);
    }
}
