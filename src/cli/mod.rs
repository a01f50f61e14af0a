// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and routes to Layer 2.
//
//   1. `train`   — train the span scorer, checkpoint the best
//                  dev recall
//   2. `predict` — write the top-k spans of a split as JSON
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

use crate::application::train_use_case::TrainConfig;

#[derive(Parser, Debug)]
#[command(
    name = "span-scorer",
    version = "0.1.0",
    about = "Train a candidate-mention span scorer and select high-recall mention spans."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = TrainConfig::from_file(&args.config)?;
    tracing::info!("Training on data in '{}'", args.data_folder.display());

    let best = TrainUseCase::new(config, &args.data_folder).execute()?;
    println!("Training complete. Best recall {:.4} at epoch {} (k = {}).", best.recall, best.epoch, best.fraction);
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let config     = TrainConfig::from_file(&args.config)?;
    let use_case   = PredictUseCase::new(config, &args.data_folder, args.split, args.fraction, &args.output);
    let prediction = use_case.execute()?;
    println!("Wrote {} spans to {}", prediction.spans.len(), args.output.display());
    Ok(())
}
