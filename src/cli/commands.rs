// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Two subcommands, `train` and `predict`. Hyper-parameters live
// in the JSON config file; the command line only says where
// things are.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the span scorer on the train split, evaluating on dev
    Train(TrainArgs),

    /// Select candidate mentions of a split with a trained checkpoint
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Experiment configuration (JSON)
    #[arg(long, default_value = "configs/config_span_scorer.json")]
    pub config: PathBuf,

    /// Folder holding <split>.json and <split>_<mention_type>.json
    #[arg(long, default_value = "data/ecb/mentions")]
    pub data_folder: PathBuf,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Configuration used for training (JSON)
    #[arg(long, default_value = "configs/config_span_scorer.json")]
    pub config: PathBuf,

    #[arg(long, default_value = "data/ecb/mentions")]
    pub data_folder: PathBuf,

    /// Split to score, e.g. dev or test
    #[arg(long, default_value = "test")]
    pub split: String,

    /// Spans kept per token of the split
    #[arg(long, default_value_t = 0.25)]
    pub fraction: f64,

    /// Where the selected spans are written
    #[arg(long, default_value = "predicted_mentions.json")]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_predict_arguments_parse() {
        let cli = Cli::try_parse_from([
            "span-scorer", "predict", "--config", "c.json", "--split", "dev", "--fraction", "0.3",
        ])
        .unwrap();
        match cli.command {
            Commands::Predict(args) => {
                assert_eq!(args.config, PathBuf::from("c.json"));
                assert_eq!(args.split, "dev");
                assert_eq!(args.fraction, 0.3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_train_defaults() {
        let cli = Cli::try_parse_from(["span-scorer", "train"]).unwrap();
        match cli.command {
            Commands::Train(args) => assert_eq!(args.data_folder, PathBuf::from("data/ecb/mentions")),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
