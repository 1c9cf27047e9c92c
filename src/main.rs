//! CultureScreen CLI
//!
//! Entry point for the staged culture plate classification pipeline:
//! dataset statistics, single-stage training, the full staged pipeline,
//! and evaluation of a trained checkpoint.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use culturescreen::backend::{backend_name, default_device, TrainingBackend};
use culturescreen::utils::logging::{init_logging, LogConfig};

/// Culture plate screening with staged transfer learning
///
/// Trains a binary classifier separating culture-positive from
/// culture-negative plate images with the Burn framework.
#[derive(Parser, Debug)]
#[command(name = "culturescreen")]
#[command(version)]
#[command(about = "Staged transfer-learning for culture plate classification", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full staged pipeline: feature extraction, fine-tuning,
    /// hyperparameter search, best-epoch estimation, and final refit
    Pipeline {
        /// Path to the dataset directory (negative/ and positive/ subdirs)
        #[arg(short, long, default_value = "data/plates")]
        data_dir: String,

        /// Output directory for checkpoints, logs, and search artifacts
        #[arg(short, long, default_value = "output")]
        output_dir: String,

        /// Optional pipeline configuration JSON; CLI flags below are
        /// ignored when this is given
        #[arg(short, long)]
        config: Option<String>,

        /// Pretrained backbone weights
        #[arg(long)]
        pretrained: Option<String>,

        /// Number of hyperparameter search trials
        #[arg(long, default_value = "20")]
        trials: usize,

        /// Trainings averaged per search trial
        #[arg(long, default_value = "1")]
        executions_per_trial: usize,

        /// Batch size for every stage
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Train only the frozen-backbone feature-extraction stage
    Train {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/plates")]
        data_dir: String,

        /// Output directory for the checkpoint and logs
        #[arg(short, long, default_value = "output")]
        output_dir: String,

        /// Number of training epochs
        #[arg(short, long, default_value = "30")]
        epochs: usize,

        /// Batch size
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Learning rate
        #[arg(short, long, default_value = "0.001")]
        learning_rate: f64,

        /// Early-stopping patience in epochs
        #[arg(long, default_value = "5")]
        patience: usize,

        /// Pretrained backbone weights
        #[arg(long)]
        pretrained: Option<String>,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Evaluate a trained checkpoint against a dataset directory
    Evaluate {
        /// Path to the model checkpoint (.mpk)
        #[arg(short, long)]
        model: String,

        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/plates")]
        data_dir: String,

        /// Batch size for evaluation
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Fβ beta
        #[arg(long, default_value = "1.0")]
        beta: f64,

        /// Decision threshold for the positive class
        #[arg(long, default_value = "0.5")]
        threshold: f64,

        /// Output JSON file for the report
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Show dataset statistics
    Stats {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/plates")]
        data_dir: String,
    },
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
        Commands::Pipeline {
            data_dir,
            output_dir,
            config,
            pretrained,
            trials,
            executions_per_trial,
            batch_size,
            seed,
        } => {
            cmd_pipeline(
                &data_dir,
                &output_dir,
                config.as_deref(),
                pretrained.as_deref(),
                trials,
                executions_per_trial,
                batch_size,
                seed,
            )?;
        }

        Commands::Train {
            data_dir,
            output_dir,
            epochs,
            batch_size,
            learning_rate,
            patience,
            pretrained,
            seed,
        } => {
            cmd_train(
                &data_dir,
                &output_dir,
                epochs,
                batch_size,
                learning_rate,
                patience,
                pretrained.as_deref(),
                seed,
            )?;
        }

        Commands::Evaluate {
            model,
            data_dir,
            batch_size,
            beta,
            threshold,
            output,
        } => {
            cmd_evaluate(
                &model,
                &data_dir,
                batch_size,
                beta,
                threshold,
                output.as_deref(),
            )?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔═══════════════════════════════════════════════════════╗
 ║   🧫 CultureScreen                                    ║
 ║   Culture Plate Classification with Burn + Rust       ║
 ╚═══════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

#[allow(clippy::too_many_arguments)]
fn cmd_pipeline(
    data_dir: &str,
    output_dir: &str,
    config_path: Option<&str>,
    pretrained: Option<&str>,
    trials: usize,
    executions_per_trial: usize,
    batch_size: usize,
    seed: u64,
) -> Result<()> {
    use culturescreen::pipeline::{run_pipeline, PipelineConfig};

    let config = match config_path {
        Some(path) => {
            info!("Loading pipeline configuration from: {}", path);
            PipelineConfig::load(std::path::Path::new(path))?
        }
        None => PipelineConfig {
            data_dir: PathBuf::from(data_dir),
            output_dir: PathBuf::from(output_dir),
            pretrained_backbone: pretrained.map(PathBuf::from),
            search_trials: trials,
            executions_per_trial,
            batch_size,
            seed,
            ..PipelineConfig::default()
        },
    };

    println!("{}", "Pipeline Configuration:".cyan().bold());
    println!("  📁 Data directory:   {:?}", config.data_dir);
    println!("  💾 Output directory: {:?}", config.output_dir);
    println!("  🔍 Search trials:    {}", config.search_trials);
    println!("  🎲 Seed:             {}", config.seed);
    println!("  🖥️  Backend:          {}", backend_name());

    let device = default_device();
    let report = run_pipeline::<TrainingBackend>(&config, &device)?;

    println!();
    println!("{}", "Pipeline complete!".green().bold());
    println!(
        "  Test Fβ={:.1}: {:.4} | AUC: {:.4} | accuracy: {:.4}",
        report.beta, report.fbeta, report.auc, report.accuracy
    );

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_train(
    data_dir: &str,
    output_dir: &str,
    epochs: usize,
    batch_size: usize,
    learning_rate: f64,
    patience: usize,
    pretrained: Option<&str>,
    seed: u64,
) -> Result<()> {
    use culturescreen::dataset::burn_dataset::CultureImageDataset;
    use culturescreen::model::backbone::BackboneConfig;
    use culturescreen::model::builder::StagedModelBuilder;
    use culturescreen::training::callbacks::{Callback, CallbackPolicy, Monitor};
    use culturescreen::training::class_weights::ClassWeights;
    use culturescreen::training::stage_runner::{StageConfig, TrainingStageRunner};
    use culturescreen::{CultureDataset, DatasetSplits, SplitConfig, IMAGE_SIZE};

    info!("Training feature-extraction stage");
    info!("  Data: {}", data_dir);
    info!("  Epochs: {}, batch size: {}, lr: {}", epochs, batch_size, learning_rate);

    std::fs::create_dir_all(output_dir)?;
    let output = PathBuf::from(output_dir);

    let dataset = CultureDataset::new(data_dir)?;
    dataset.get_stats().print();

    let splits = DatasetSplits::from_samples(
        dataset.samples.clone(),
        SplitConfig {
            seed,
            ..SplitConfig::default()
        },
    )?;
    println!("{}", splits.stats());

    let class_weights = ClassWeights::estimate(splits.train_set.iter().map(|s| s.label))?;
    let train_set = CultureImageDataset::from_samples(&splits.train_set, IMAGE_SIZE);
    let val_set = CultureImageDataset::from_samples(&splits.validation_set, IMAGE_SIZE);

    let mut builder = StagedModelBuilder::new(BackboneConfig::new());
    if let Some(path) = pretrained {
        builder = builder.with_pretrained(PathBuf::from(path));
    }

    let device = default_device();
    let model = builder.build_feature_extractor::<TrainingBackend>(&device)?;

    let policy = CallbackPolicy::default()
        .push(Callback::EarlyStop {
            monitor: Monitor::ValLoss,
            patience,
        })
        .push(Callback::Checkpoint {
            path: output.join("feat_extractor_checkpoint.mpk"),
            monitor: Monitor::ValLoss,
            save_best_only: true,
        })
        .push(Callback::CsvLog {
            path: output.join("training_log.csv"),
        });

    let config = StageConfig {
        max_epochs: epochs,
        batch_size,
        learning_rate,
        seed,
        ..StageConfig::feature_extraction()
    };
    let runner = TrainingStageRunner::new(config);
    let (_, history) = runner.run(model, &train_set, &val_set, &class_weights, policy, &device)?;

    println!();
    println!("{}", "Training complete!".green().bold());
    println!(
        "  Best val_loss {:.4} at epoch {}",
        history.best_val_loss()?,
        history.best_epoch()?
    );

    Ok(())
}

fn cmd_evaluate(
    model_path: &str,
    data_dir: &str,
    batch_size: usize,
    beta: f64,
    threshold: f64,
    output: Option<&str>,
) -> Result<()> {
    use burn::module::AutodiffModule;
    use culturescreen::dataset::burn_dataset::CultureImageDataset;
    use culturescreen::model::backbone::BackboneConfig;
    use culturescreen::model::builder::StagedModelBuilder;
    use culturescreen::training::stage_runner::evaluate;
    use culturescreen::{CultureDataset, IMAGE_SIZE};

    info!("Evaluating checkpoint: {}", model_path);
    println!("{}", "Evaluation Configuration:".cyan().bold());
    println!("  🧠 Model:   {}", model_path);
    println!("  📁 Data:    {}", data_dir);
    println!("  🖥️  Backend: {}", backend_name());

    let device = default_device();
    let builder = StagedModelBuilder::new(BackboneConfig::new());
    let model = builder
        .build_feature_extractor::<TrainingBackend>(&device)?
        .load(std::path::Path::new(model_path), &device)?;
    let model = model.valid();

    let dataset = CultureDataset::new(data_dir)?;
    dataset.get_stats().print();

    let pairs: Vec<_> = dataset
        .samples
        .iter()
        .map(|s| (s.path.clone(), s.label))
        .collect();
    let eval_set = CultureImageDataset::new(pairs, IMAGE_SIZE);

    let report = evaluate(
        &model,
        &eval_set,
        batch_size,
        IMAGE_SIZE,
        beta,
        threshold,
        &device,
    )?;
    println!("{}", report);

    if let Some(path) = output {
        report.save(std::path::Path::new(path))?;
        println!("Report written to: {}", path);
    }

    Ok(())
}

fn cmd_stats(data_dir: &str) -> Result<()> {
    use culturescreen::{CultureDataset, DatasetSplits, SplitConfig};

    info!("Computing dataset statistics for: {}", data_dir);

    let dataset = CultureDataset::new(data_dir)?;
    dataset.get_stats().print();

    let splits = DatasetSplits::from_samples(dataset.samples.clone(), SplitConfig::default())?;
    println!();
    println!("{}", splits.stats());

    Ok(())
}
