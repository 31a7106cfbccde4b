//! noisymatch CLI
//!
//! Entry point for training on noisy, class-imbalanced feature data, generating
//! synthetic datasets and evaluating checkpoints.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{
    data::dataloader::Dataset,
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, momentum::MomentumConfig, AdamConfig, Optimizer, SgdConfig},
};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use noisymatch::backend::{backend_name, device, DefaultBackend, DefaultDevice, TrainingBackend};
use noisymatch::dataset::loader::{default_distribution, get_dataset, read_split_csv, write_split_csv};
use noisymatch::dataset::synthetic::{generate, SyntheticConfig};
use noisymatch::inference::evaluate;
use noisymatch::model::checkpoint::{
    checkpoint_base, load_checkpoint, load_meta, load_pretrained, meta_path,
};
use noisymatch::model::config::{
    CleanMethod, ExperimentConfig, ImbalanceMethod, LrScheduleKind, NoiseType, OptimizerKind,
    WarmupKind,
};
use noisymatch::model::{MlpNet, ModelEma};
use noisymatch::training::{LrScheduler, OurMatch, RunSummary};
use noisymatch::utils::logging::{init_logging, LogConfig};
use noisymatch::utils::{make_timestamp, run_dir};
use noisymatch::DatasetBundle;

/// Semi-supervised learning on noisy, class-imbalanced feature data
#[derive(Parser, Debug)]
#[command(name = "noisymatch")]
#[command(version)]
#[command(about = "Semi-supervised training on noisy labels with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false", global = true)]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
enum Commands {
    /// Train a classifier
    Train(TrainArgs),

    /// Write a synthetic imbalanced dataset as CSV
    Generate {
        /// Dataset root directory
        #[arg(long, default_value = "./data")]
        root: String,

        /// Dataset name (sub-directory of the root)
        #[arg(long, default_value = "synthetic")]
        name: String,

        /// Feature dimension
        #[arg(long = "input_dim", alias = "input-dim", default_value = "1024")]
        input_dim: usize,

        /// Number of classes
        #[arg(long = "num_class", alias = "num-class", default_value = "12")]
        num_class: usize,

        /// Train split size
        #[arg(long = "train_size", alias = "train-size", default_value = "4000")]
        train_size: usize,

        /// Test split size
        #[arg(long = "test_size", alias = "test-size", default_value = "1000")]
        test_size: usize,

        /// Random seed
        #[arg(long, default_value = "1")]
        seed: u64,
    },

    /// Evaluate a checkpoint on a test split
    Evaluate {
        /// Checkpoint base path (without extension)
        #[arg(short, long)]
        checkpoint: String,

        /// Dataset root directory
        #[arg(long = "data_root", alias = "data-root", default_value = "./data")]
        data_root: String,

        /// Dataset name
        #[arg(long, default_value = "malware")]
        dataset: String,

        /// Accelerator index (CUDA backend only)
        #[arg(long = "gpu_index", alias = "gpu-index", default_value = "0")]
        gpu_index: usize,
    },
}

/// Hyperparameters of `train`
#[derive(Args, Debug)]
struct TrainArgs {
    /// Load the whole configuration from a TOML file instead of the flags below
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base learning rate
    #[arg(long, default_value = "1e-3")]
    lr: f64,

    /// Labeled batch size
    #[arg(long = "batch_size", alias = "batch-size", default_value = "128")]
    batch_size: usize,

    /// SGD momentum
    #[arg(long, default_value = "0.9")]
    momentum: f64,

    /// Weight decay
    #[arg(long = "weight_decay", alias = "weight-decay", default_value = "2e-4")]
    weight_decay: f64,

    /// Nesterov momentum for SGD
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    nesterov: bool,

    /// Feature dimension
    #[arg(long = "input_dim", alias = "input-dim", default_value = "1024")]
    input_dim: usize,

    /// Decay factor of the exponential schedule
    #[arg(long, default_value = "0.95")]
    gamma: f64,

    /// Dataset name (`synthetic` is generated in memory)
    #[arg(long, default_value = "malware")]
    dataset: String,

    /// Dataset root directory
    #[arg(long = "data_root", alias = "data-root", default_value = "./data")]
    data_root: String,

    /// Training epochs
    #[arg(long, default_value = "120")]
    epochs: usize,

    /// Supervised warmup epochs
    #[arg(long, default_value = "10")]
    warmup: usize,

    /// Optimizer
    #[arg(long, default_value = "adam", ignore_case = true)]
    optimizer: OptimizerKind,

    /// Accelerator index (CUDA backend only)
    #[arg(long = "gpu_index", alias = "gpu-index", default_value = "0")]
    gpu_index: usize,

    /// Number of classes
    #[arg(long = "num_class", alias = "num-class", default_value = "12")]
    num_class: usize,

    /// Random seed
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Label corruption rate in [0, 1)
    #[arg(long = "noise_rate", alias = "noise-rate", default_value = "0.5")]
    noise_rate: f64,

    /// Label noise type
    #[arg(long = "noise_type", alias = "noise-type", default_value = "none", ignore_case = true)]
    noise_type: NoiseType,

    /// Unlabeled loss coefficient
    #[arg(long = "lambda_u", alias = "lambda-u", default_value = "1.0")]
    lambda_u: f64,

    /// Pseudo-label temperature
    #[arg(long = "T", default_value = "0.5")]
    temperature: f64,

    /// Pseudo-label confidence threshold
    #[arg(long, default_value = "0.95")]
    threshold: f64,

    /// Unlabeled to labeled batch size ratio
    #[arg(long, default_value = "1")]
    mu: usize,

    /// Initialize from `--pretrain_path` when given
    #[arg(long = "use_pretrain", alias = "use-pretrain", default_value_t = true, action = ArgAction::Set)]
    use_pretrain: bool,

    /// Evaluate with an EMA copy of the model
    #[arg(long = "use-ema", alias = "use_ema", default_value = "false")]
    use_ema: bool,

    /// EMA decay
    #[arg(long = "ema-decay", alias = "ema_decay", default_value = "0.999")]
    ema_decay: f64,

    /// Clean sample selection
    #[arg(long = "clean_method", alias = "clean-method", default_value = "consistency", ignore_case = true)]
    clean_method: CleanMethod,

    /// Clean selection confidence
    #[arg(long = "clean_theta", alias = "clean-theta", default_value = "0.95")]
    clean_theta: f64,

    /// Imbalance handling
    #[arg(long = "imb_method", alias = "imb-method", default_value = "ldam", ignore_case = true)]
    imb_method: ImbalanceMethod,

    /// Mixup Beta(alpha, alpha) parameter
    #[arg(long, default_value = "10")]
    alpha: f64,

    /// Checkpoint to initialize from
    #[arg(long = "pretrain_path", alias = "pretrain-path")]
    pretrain_path: Option<String>,

    /// Align pseudo-labels to the known class distribution
    #[arg(long = "use_true_distribution", alias = "use-true-distribution", default_value_t = true, action = ArgAction::Set)]
    use_true_distribution: bool,

    /// Number of k-means clusters
    #[arg(long, default_value = "10")]
    k: usize,

    /// Learning rate schedule
    #[arg(long = "lr_schedule", alias = "lr-schedule", default_value = "multistep", ignore_case = true)]
    lr_schedule: LrScheduleKind,

    /// Multi-step milestones (epochs)
    #[arg(long, value_delimiter = ',', default_value = "10,90")]
    milestones: Vec<usize>,

    /// Multi-step decay factor
    #[arg(long = "milestone_gamma", alias = "milestone-gamma", default_value = "0.3")]
    milestone_gamma: f64,

    /// Starting ratio of the warmup ramp
    #[arg(long = "warmup_ratio", alias = "warmup-ratio", default_value = "5e-4")]
    warmup_ratio: f64,

    /// Warmup ramp shape
    #[arg(long = "warmup_kind", alias = "warmup-kind", default_value = "exp", ignore_case = true)]
    warmup_kind: WarmupKind,

    /// Root of run directories
    #[arg(long = "out_dir", alias = "out-dir", default_value = "output")]
    out_dir: String,
}

impl TrainArgs {
    fn into_config(self) -> Result<ExperimentConfig> {
        if let Some(path) = &self.config {
            return ExperimentConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()));
        }

        let config = ExperimentConfig {
            lr: self.lr,
            batch_size: self.batch_size,
            momentum: self.momentum,
            weight_decay: self.weight_decay,
            nesterov: self.nesterov,
            input_dim: self.input_dim,
            gamma: self.gamma,
            dataset: self.dataset,
            data_root: self.data_root,
            epochs: self.epochs,
            warmup: self.warmup,
            optimizer: self.optimizer,
            gpu_index: self.gpu_index,
            num_class: self.num_class,
            seed: self.seed,
            noise_rate: self.noise_rate,
            noise_type: self.noise_type,
            lambda_u: self.lambda_u,
            temperature: self.temperature,
            threshold: self.threshold,
            mu: self.mu,
            use_pretrain: self.use_pretrain,
            use_ema: self.use_ema,
            ema_decay: self.ema_decay,
            clean_method: self.clean_method,
            clean_theta: self.clean_theta,
            imb_method: self.imb_method,
            alpha: self.alpha,
            pretrain_path: self.pretrain_path,
            use_true_distribution: self.use_true_distribution,
            k: self.k,
            lr_schedule: self.lr_schedule,
            milestones: self.milestones,
            milestone_gamma: self.milestone_gamma,
            warmup_ratio: self.warmup_ratio,
            warmup_kind: self.warmup_kind,
            out_dir: self.out_dir,
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train(args) => {
            let config = args.into_config()?;
            cmd_train(config)?;
        }

        Commands::Generate {
            root,
            name,
            input_dim,
            num_class,
            train_size,
            test_size,
            seed,
        } => {
            let mut synthetic = SyntheticConfig::new(input_dim, default_distribution(num_class), seed);
            synthetic.train_size = train_size;
            synthetic.test_size = test_size;
            cmd_generate(Path::new(&root), &name, &synthetic)?;
        }

        Commands::Evaluate {
            checkpoint,
            data_root,
            dataset,
            gpu_index,
        } => {
            cmd_evaluate(Path::new(&checkpoint), Path::new(&data_root), &dataset, device(gpu_index))?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║   noisymatch                                                 ║
 ║   Semi-supervised learning on noisy labels with Burn + Rust  ║
 ╚══════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(config: ExperimentConfig) -> Result<()> {
    let device = device(config.gpu_index);

    let logdir = run_dir(Path::new(&config.out_dir), &make_timestamp(), config.seed);
    std::fs::create_dir_all(&logdir)
        .with_context(|| format!("Failed to create run directory {}", logdir.display()))?;
    config.save_json(&logdir.join("config.json"))?;

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Backend:        {} ({:?})", backend_name(), device);
    println!("  Dataset:        {} ({})", config.dataset, config.data_root);
    println!("  Noise:          {} at {}", config.noise_type, config.noise_rate);
    println!("  Epochs:         {} ({} warmup)", config.epochs, config.warmup);
    println!("  Batch size:     {} (mu {})", config.batch_size, config.mu);
    println!("  Optimizer:      {} (lr {})", config.optimizer, config.lr);
    println!("  Imbalance:      {}", config.imb_method);
    println!("  Clean method:   {}", config.clean_method);
    println!("  Run directory:  {}", logdir.display());
    println!();

    let bundle = get_dataset(Path::new(&config.data_root), &config.dataset, &config)?;

    let mut model = config.model_config().init::<TrainingBackend>(&device);
    let mut pretrained = false;
    if let Some(path) = config.pretrained_checkpoint() {
        let (loaded, copied) = load_pretrained(model, Path::new(path), &device)?;
        model = loaded;
        pretrained = copied > 0;
    }

    let ema = config
        .use_ema
        .then(|| ModelEma::new(model.valid(), config.ema_decay));

    // Warmup + cosine spans the iterations of full-split epochs
    let iters_per_epoch = bundle.train.len().div_ceil(config.batch_size);
    let scheduler = LrScheduler::from_config(&config, iters_per_epoch);
    let dist = bundle.class_distribution();
    let weight_decay = Some(WeightDecayConfig::new(config.weight_decay as f32));

    let summary = match config.optimizer {
        OptimizerKind::Adam => {
            let optimizer = AdamConfig::new().with_weight_decay(weight_decay).init();
            run_training(model, ema, optimizer, scheduler, logdir.clone(), dist, config, device, pretrained, &bundle)?
        }
        OptimizerKind::Sgd => {
            let momentum = MomentumConfig::new()
                .with_momentum(config.momentum)
                .with_dampening(0.0)
                .with_nesterov(config.nesterov);
            let optimizer = SgdConfig::new()
                .with_weight_decay(weight_decay)
                .with_momentum(Some(momentum))
                .init();
            run_training(model, ema, optimizer, scheduler, logdir.clone(), dist, config, device, pretrained, &bundle)?
        }
    };

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!(
        "  Best accuracy:  {:.2}% (epoch {})",
        summary.best_accuracy * 100.0,
        summary.best_epoch + 1
    );
    println!(
        "  Final accuracy: {:.2}% (balanced {:.2}%)",
        summary.final_accuracy * 100.0,
        summary.final_balanced_accuracy * 100.0
    );
    println!("  Outputs:        {}", logdir.display());

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_training<O>(
    model: MlpNet<TrainingBackend>,
    ema: Option<ModelEma<DefaultBackend>>,
    optimizer: O,
    scheduler: LrScheduler,
    logdir: PathBuf,
    dist: Vec<f64>,
    config: ExperimentConfig,
    device: DefaultDevice,
    pretrained: bool,
    bundle: &DatasetBundle,
) -> Result<RunSummary>
where
    O: Optimizer<MlpNet<TrainingBackend>, TrainingBackend>,
{
    let mut trainer = OurMatch::new(model, ema, optimizer, scheduler, logdir, dist, config, device)
        .with_pretrained(pretrained);
    Ok(trainer.run(bundle)?)
}

fn cmd_generate(root: &Path, name: &str, config: &SyntheticConfig) -> Result<()> {
    info!(
        "Generating synthetic dataset '{}': {} features, {} classes",
        name,
        config.num_features,
        config.num_classes()
    );

    let (train, test) = generate(config)?;
    let dir = root.join(name);
    std::fs::create_dir_all(&dir)?;
    write_split_csv(&dir.join("train.csv"), &train)?;
    write_split_csv(&dir.join("test.csv"), &test)?;

    println!("{}", "Dataset written:".green().bold());
    println!("  Train: {} samples -> {}", train.len(), dir.join("train.csv").display());
    println!("  Test:  {} samples -> {}", test.len(), dir.join("test.csv").display());
    println!("  Class counts: {:?}", train.class_counts(config.num_classes()));

    Ok(())
}

fn cmd_evaluate(checkpoint: &Path, data_root: &Path, dataset: &str, device: DefaultDevice) -> Result<()> {
    let (model, model_config) = load_checkpoint::<DefaultBackend>(checkpoint, &device)
        .with_context(|| format!("Failed to load checkpoint {}", checkpoint.display()))?;

    if meta_path(&checkpoint_base(checkpoint)).exists() {
        let meta = load_meta(checkpoint)?;
        info!(
            "Checkpoint from epoch {} (accuracy {:.2}%, saved {})",
            meta.epoch + 1,
            meta.accuracy * 100.0,
            meta.timestamp
        );
    }

    let test_path = data_root.join(dataset).join("test.csv");
    let test = read_split_csv(&test_path, model_config.input_dim, model_config.num_classes)?;
    let metrics = evaluate(&model, &test, model_config.num_classes, &device)?;

    println!("{}", metrics.display());
    Ok(())
}
