//! Training driver for noisy, class-imbalanced data
//!
//! Each run goes through two phases:
//! - **warmup**: supervised epochs on the whole train split with its noisy
//!   labels (skipped when starting from a pretrained checkpoint)
//! - **semi-supervised**: every epoch the train split is re-divided into clean
//!   (labeled) and noisy (unlabeled) samples; the labeled loss is combined with
//!   a confidence-masked pseudo-label loss on strong views of the unlabeled
//!   samples
//!
//! After every epoch the evaluation model (the EMA copy when enabled) is
//! scored on the test split, scalars are appended to the run directory and the
//! `best`/`last` checkpoints are refreshed.

use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion, Tensor},
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::{AugmentingBatcher, BatchLoader, DatasetBundle, FeatureAugmenter, FeatureBatch};
use crate::inference::predictor::evaluate;
use crate::model::checkpoint::{save_checkpoint, CheckpointMeta};
use crate::model::config::ExperimentConfig;
use crate::model::ema::ModelEma;
use crate::model::mlp::{MlpNet, MlpNetConfig};
use crate::training::imbalance::ImbalanceHandler;
use crate::training::loss::masked_cross_entropy;
use crate::training::noise_detect::{CleanSplit, NoiseDetector, NoiseReport};
use crate::training::pseudo_label::{PseudoLabelConfig, PseudoLabeler};
use crate::training::scheduler::LrScheduler;
use crate::utils::error::{NoisyMatchError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{AverageMeter, Metrics};
use crate::utils::summary::SummaryWriter;

/// File the run summary is written to
pub const SUMMARY_FILE: &str = "summary.json";

/// Training state for monitoring
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    /// Current epoch (0-indexed)
    pub epoch: usize,
    /// Optimizer steps taken so far
    pub iteration: usize,
    /// Best test accuracy seen so far
    pub best_accuracy: f64,
    /// Epoch of the best test accuracy
    pub best_epoch: usize,
    /// Training loss history (per epoch)
    pub train_losses: Vec<f64>,
    /// Test accuracy history (per epoch)
    pub test_accuracies: Vec<f64>,
}

impl TrainingState {
    /// Record the results of the current epoch; returns whether it is a new best
    pub fn record_epoch(&mut self, train_loss: f64, accuracy: f64) -> bool {
        self.train_losses.push(train_loss);
        self.test_accuracies.push(accuracy);

        let improved = self.test_accuracies.len() == 1 || accuracy > self.best_accuracy;
        if improved {
            self.best_accuracy = accuracy;
            self.best_epoch = self.epoch;
        }
        improved
    }
}

/// Outcome of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub best_accuracy: f64,
    pub best_epoch: usize,
    pub final_accuracy: f64,
    pub final_balanced_accuracy: f64,
    pub final_macro_f1: f64,
    pub epochs: usize,
    /// Fraction of corrupted train labels
    pub noise_rate: f64,
}

impl RunSummary {
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Semi-supervised trainer over an autodiff backend `B` with optimizer `O`
pub struct OurMatch<B: AutodiffBackend, O: Optimizer<MlpNet<B>, B>> {
    model: MlpNet<B>,
    ema: Option<ModelEma<B::InnerBackend>>,
    optimizer: O,
    scheduler: LrScheduler,
    logdir: PathBuf,
    /// Class prior used to align pseudo-labels
    dist: Vec<f64>,
    config: ExperimentConfig,
    model_config: MlpNetConfig,
    device: B::Device,
    pretrained: bool,
    state: TrainingState,
    augmenter: FeatureAugmenter,
    rng: ChaCha8Rng,
}

impl<B: AutodiffBackend, O: Optimizer<MlpNet<B>, B>> OurMatch<B, O> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: MlpNet<B>,
        ema_model: Option<ModelEma<B::InnerBackend>>,
        optimizer: O,
        scheduler: LrScheduler,
        logdir: PathBuf,
        dist: Vec<f64>,
        config: ExperimentConfig,
        device: B::Device,
    ) -> Self {
        let model_config = config.model_config();
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            model,
            ema: ema_model,
            optimizer,
            scheduler,
            logdir,
            dist,
            config,
            model_config,
            device,
            pretrained: false,
            state: TrainingState::default(),
            augmenter: FeatureAugmenter::default(),
            rng,
        }
    }

    /// Mark the model as initialized from a pretrained checkpoint
    pub fn with_pretrained(mut self, pretrained: bool) -> Self {
        self.pretrained = pretrained;
        self
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn model(&self) -> &MlpNet<B> {
        &self.model
    }

    /// Model used for evaluation and noise detection
    pub fn eval_model(&self) -> MlpNet<B::InnerBackend> {
        match &self.ema {
            Some(ema) => ema.model().clone(),
            None => self.model.valid(),
        }
    }

    /// Train on `bundle` for the configured number of epochs
    pub fn run(&mut self, bundle: &DatasetBundle) -> Result<RunSummary> {
        if bundle.train.is_empty() {
            return Err(NoisyMatchError::Training("train split is empty".to_string()));
        }

        let num_classes = bundle.num_classes;
        let epochs = self.config.epochs;
        let mut writer = SummaryWriter::new(&self.logdir)?;
        let mut logger = TrainingLogger::new(epochs);

        let imbalance = ImbalanceHandler::new(
            self.config.imb_method,
            &bundle.train.class_counts(num_classes),
            self.config.alpha,
        );
        let detector = NoiseDetector::from_config(&self.config);
        let mut pseudo = PseudoLabeler::new(
            PseudoLabelConfig::from_experiment(&self.config, &self.dist),
            num_classes,
        );

        info!(
            "Training {} epochs ({} warmup), schedule {}, imbalance {}, clean selection {}",
            epochs,
            if self.pretrained { 0 } else { self.config.warmup },
            self.scheduler.schedule().description(),
            imbalance.method(),
            detector.method()
        );

        if self.pretrained {
            let (_, report) = self.detect(bundle, &detector)?;
            info!("Pretrained model noise detection: {}", report);
        }

        let mut last_metrics = Metrics::from_predictions(&[], &[], num_classes);

        for epoch in 0..epochs {
            self.state.epoch = epoch;
            let supervised = !self.pretrained && epoch < self.config.warmup;
            logger.start_epoch(epoch, if supervised { "warmup" } else { "semi-supervised" });

            let train_loss = if supervised {
                self.train_supervised_epoch(bundle, &imbalance)?
            } else {
                let (split, report) = self.detect(bundle, &detector)?;
                info!("Noise detection: {}", report);
                writer.add_scalar("detect/num_clean", report.num_clean as f64, epoch)?;
                writer.add_scalar("detect/precision", report.precision, epoch)?;
                writer.add_scalar("detect/recall", report.recall, epoch)?;

                let loss = self.train_fixmatch_epoch(bundle, &split, &imbalance, &mut pseudo)?;
                let stats = pseudo.stats();
                info!("{}", stats);
                writer.add_scalar("train/pseudo_acceptance", stats.acceptance_rate(), epoch)?;
                writer.add_scalar("train/pseudo_accuracy", stats.accuracy(), epoch)?;
                pseudo.reset_stats();
                loss
            };

            let lr = self.scheduler.lr();
            if !self.scheduler.is_per_iteration() {
                self.scheduler.step();
            }

            let eval_model = self.eval_model();
            let metrics = evaluate(&eval_model, &bundle.test, num_classes, &self.device)?;
            logger.end_epoch(train_loss, metrics.accuracy, lr);

            writer.add_scalar("train/loss", train_loss, epoch)?;
            writer.add_scalar("train/lr", lr, epoch)?;
            writer.add_scalar("test/accuracy", metrics.accuracy, epoch)?;
            writer.add_scalar("test/balanced_accuracy", metrics.balanced_accuracy, epoch)?;
            if let Some(loss) = metrics.average_loss {
                writer.add_scalar("test/loss", loss, epoch)?;
            }
            writer.flush()?;

            if self.state.record_epoch(train_loss, metrics.accuracy) {
                logger.log_new_best(metrics.accuracy);
                self.save(&eval_model, "best", metrics.accuracy)?;
            }
            self.save(&eval_model, "last", metrics.accuracy)?;

            last_metrics = metrics;
        }

        logger.log_complete(self.state.best_accuracy);
        debug!("Per-class results of the final epoch:\n{}", last_metrics);

        let summary = RunSummary {
            best_accuracy: self.state.best_accuracy,
            best_epoch: self.state.best_epoch,
            final_accuracy: last_metrics.accuracy,
            final_balanced_accuracy: last_metrics.balanced_accuracy,
            final_macro_f1: last_metrics.macro_f1,
            epochs,
            noise_rate: bundle.noise_rate(),
        };
        summary.save(&self.logdir.join(SUMMARY_FILE))?;
        Ok(summary)
    }

    fn save(&self, model: &MlpNet<B::InnerBackend>, name: &str, accuracy: f64) -> Result<PathBuf> {
        let meta = CheckpointMeta::new(
            self.state.epoch,
            accuracy,
            self.state.best_accuracy,
            self.model_config.num_classes,
        );
        save_checkpoint(model, &self.model_config, &meta, &self.logdir, name)
    }

    /// Divide the train split into clean and noisy samples
    fn detect(
        &mut self,
        bundle: &DatasetBundle,
        detector: &NoiseDetector,
    ) -> Result<(CleanSplit, NoiseReport)> {
        let model = self.eval_model();
        let split = detector.detect(&model, &bundle.train, &self.augmenter, &mut self.rng, &self.device)?;
        let report = NoiseReport::new(&split, &bundle.noisy_targets, &bundle.clean_targets);
        Ok((split, report))
    }

    fn epoch_seed(&self) -> u64 {
        self.config.seed.wrapping_add(self.state.epoch as u64 * 7919)
    }

    /// Backward pass, optimizer step, scheduler and EMA updates; returns the loss
    fn step(&mut self, loss: Tensor<B, 1>) -> f64 {
        let loss_value: f64 = loss.clone().into_scalar().elem();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optimizer.step(self.scheduler.lr(), self.model.clone(), grads);

        if self.scheduler.is_per_iteration() {
            self.scheduler.step();
        }
        if let Some(ema) = self.ema.as_mut() {
            ema.update(&self.model.valid());
        }
        self.state.iteration += 1;

        loss_value
    }

    /// Supervised epoch over the whole train split with its noisy labels
    fn train_supervised_epoch(
        &mut self,
        bundle: &DatasetBundle,
        imbalance: &ImbalanceHandler,
    ) -> Result<f64> {
        let train = &bundle.train;
        let seed = self.epoch_seed();
        let mut loader = BatchLoader::new(train.len(), self.config.batch_size, true, seed);
        if imbalance.wants_resampling() {
            loader = loader.with_class_balance(train.labels(), bundle.num_classes);
        }
        let batcher = AugmentingBatcher::weak(self.augmenter.clone(), seed);

        let batches = loader.batches();
        let progress = epoch_progress(batches.len(), self.state.epoch);
        let mut meter = AverageMeter::new();

        for positions in batches {
            let items = train.gather(&positions);
            let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
            let batch: FeatureBatch<B> = batcher.batch(items, &self.device);

            let loss = imbalance.labeled_loss(&self.model, batch.features, &labels, &mut self.rng, &self.device)?;
            let value = self.step(loss);
            meter.update(value, labels.len());

            progress.set_message(format!("loss {:.4}", meter.avg));
            progress.inc(1);
        }
        progress.finish_and_clear();

        Ok(meter.avg)
    }

    /// Semi-supervised epoch: labeled loss on clean samples plus the masked
    /// pseudo-label loss on the noisy ones
    fn train_fixmatch_epoch(
        &mut self,
        bundle: &DatasetBundle,
        split: &CleanSplit,
        imbalance: &ImbalanceHandler,
        pseudo: &mut PseudoLabeler,
    ) -> Result<f64> {
        let labeled = bundle.train.subset(&split.clean);
        let unlabeled = bundle.train.subset(&split.noisy);
        if labeled.is_empty() {
            return Err(NoisyMatchError::Training("no clean samples were selected".to_string()));
        }
        if unlabeled.is_empty() {
            warn!("No noisy samples selected; training on labeled data only");
        }

        let seed = self.epoch_seed();
        let mut loader = BatchLoader::new(labeled.len(), self.config.batch_size, true, seed);
        if imbalance.wants_resampling() {
            loader = loader.with_class_balance(labeled.labels(), bundle.num_classes);
        }
        let unlabeled_batches =
            BatchLoader::new(unlabeled.len(), self.config.unlabeled_batch_size(), true, seed ^ 1).batches();

        let weak = AugmentingBatcher::weak(self.augmenter.clone(), seed);
        let strong = AugmentingBatcher::strong(self.augmenter.clone(), seed ^ 2);
        let lambda_u = self.config.lambda_u as f32;

        let batches = loader.batches();
        let progress = epoch_progress(batches.len(), self.state.epoch);
        let mut meter = AverageMeter::new();
        let mut labeled_meter = AverageMeter::new();

        for (iter, positions) in batches.into_iter().enumerate() {
            let items = labeled.gather(&positions);
            let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
            let batch_x: FeatureBatch<B> = weak.batch(items, &self.device);

            let loss_x =
                imbalance.labeled_loss(&self.model, batch_x.features, &labels, &mut self.rng, &self.device)?;
            labeled_meter.update(loss_x.clone().into_scalar().elem(), labels.len());

            let loss = if unlabeled_batches.is_empty() {
                loss_x
            } else {
                let u_items = unlabeled.gather(&unlabeled_batches[iter % unlabeled_batches.len()]);
                let clean: Vec<usize> = u_items
                    .iter()
                    .map(|item| bundle.clean_targets[item.index])
                    .collect();
                let batch_w: FeatureBatch<B> = weak.batch(u_items.clone(), &self.device);
                let batch_s: FeatureBatch<B> = strong.batch(u_items, &self.device);

                let targets = pseudo.generate(self.model.forward(batch_w.features).detach())?;
                pseudo.record(&targets.labels, &targets.accepted, &clean);

                let loss_u =
                    masked_cross_entropy(self.model.forward(batch_s.features), targets.targets, targets.mask);
                loss_x + loss_u.mul_scalar(lambda_u)
            };

            let value = self.step(loss);
            meter.update(value, labels.len());

            progress.set_message(format!("loss {:.4} (labeled {:.4})", meter.avg, labeled_meter.avg));
            progress.inc(1);
        }
        progress.finish_and_clear();

        Ok(meter.avg)
    }
}

fn epoch_progress(num_batches: usize, epoch: usize) -> ProgressBar {
    let progress = ProgressBar::new(num_batches as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    progress.set_prefix(format!("epoch {}", epoch + 1));
    progress
}
