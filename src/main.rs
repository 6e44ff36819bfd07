// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Prequential evaluation CLI
//!
//! Usage:
//!   prequential-eval --arff flows.arff --p-class M --weighting inverse --out runs/
//!   prequential-eval --synthetic 10000 --learner majority --json results.json
//!   prequential-eval --arff load.arff --mode regression --learner target-mean --threshold 0.5

use anyhow::{bail, Result};
use clap::Parser;
use prequential_eval::config::{parse_threshold, EvaluationConfig, Mode};
use prequential_eval::learners::LearnerKind;
use prequential_eval::pipeline::{EvaluationLoop, EvaluationResults};
use prequential_eval::sink::CsvSink;
use prequential_eval::stream::{ArffStream, MemoryStream, RecordStream};
use prequential_eval::weighting::Weighting;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "prequential-eval")]
#[command(about = "Test-then-train evaluation of online learners over labeled record streams")]
#[command(version)]
struct Args {
    /// ARFF input file (label and marker columns included)
    #[arg(short, long, conflicts_with = "synthetic", required_unless_present_any = ["synthetic", "list_learners"])]
    arff: Option<PathBuf>,

    /// Evaluate on a seeded synthetic stream of this many records
    #[arg(long)]
    synthetic: Option<usize>,

    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CSV output file or directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Also save the full results as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    learner: Option<LearnerKind>,

    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Label attribute index (default: second-to-last)
    #[arg(long)]
    idx_class: Option<usize>,

    /// Marker attribute index (default: last)
    #[arg(long)]
    idx_train: Option<usize>,

    /// Class value counted as positive
    #[arg(short, long)]
    p_class: Option<String>,

    /// Train only on records of this class (others are counted as filtered)
    #[arg(long)]
    normal_class: Option<String>,

    /// Sample weighting (default, constant, inverse)
    #[arg(short, long)]
    weighting: Option<String>,

    #[arg(long)]
    pos_weight: Option<f64>,

    #[arg(long)]
    neg_weight: Option<f64>,

    /// Regression: train only on labels above this value
    #[arg(short, long)]
    threshold: Option<String>,

    /// Regression: apply the adjusted log transform with this minimum
    #[arg(long)]
    log_min: Option<f64>,

    /// Random seed for synthetic streams
    #[arg(short, long)]
    seed: Option<u64>,

    /// Write only the header and summary rows
    #[arg(long)]
    no_rows: bool,

    /// List built-in learners and exit
    #[arg(long)]
    list_learners: bool,
}

impl Args {
    /// Merge the JSON config (if any) with flag overrides.
    ///
    /// Cross-checks against the stream schema happen later, in `EvaluationLoop::new`.
    fn into_config(self) -> Result<EvaluationConfig> {
        let mut config = match &self.config {
            Some(path) => EvaluationConfig::from_json_file(path)?,
            None => EvaluationConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(learner) = self.learner {
            config.learner = learner;
        } else if self.config.is_none() && config.mode == Mode::Regression {
            config.learner = LearnerKind::TargetMean;
        }
        if self.p_class.is_some() {
            config.positive_class = self.p_class;
        }
        if self.normal_class.is_some() {
            config.normal_class = self.normal_class;
        }
        if self.idx_class.is_some() {
            config.label_index = self.idx_class;
        }
        if self.idx_train.is_some() {
            config.marker_index = self.idx_train;
        }
        if let Some(name) = &self.weighting {
            config.weighting = Weighting::from_options(name, self.pos_weight, self.neg_weight)?;
        } else if self.pos_weight.is_some() || self.neg_weight.is_some() {
            bail!("--pos-weight / --neg-weight require --weighting");
        }
        if let Some(raw) = &self.threshold {
            config.train_threshold = Some(parse_threshold(raw)?);
        }
        if self.log_min.is_some() {
            config.log_min = self.log_min;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.no_rows {
            config.emit_rows = false;
        }
        Ok(config)
    }
}

/// Positive class of the synthetic stream when none is given
const SYNTHETIC_POSITIVE_CLASS: &str = "M";

fn open_stream(
    arff: Option<PathBuf>,
    synthetic: Option<usize>,
    config: &mut EvaluationConfig,
) -> Result<Box<dyn RecordStream>> {
    match (arff, synthetic) {
        (Some(path), _) => {
            tracing::info!("Input: {}", path.display());
            Ok(Box::new(ArffStream::open(&path, config.label_index, true)?))
        }
        (None, Some(size)) => {
            tracing::info!("Input: synthetic stream of {} records (seed {})", size, config.seed);
            if config.positive_class.is_none() && config.mode == Mode::Classification {
                config.positive_class = Some(SYNTHETIC_POSITIVE_CLASS.to_string());
            }
            Ok(Box::new(MemoryStream::synthetic(size, config.seed)))
        }
        (None, None) => bail!("either --arff or --synthetic is required"),
    }
}

/// Run one evaluation.
///
/// The output file is only created once the configuration has been
/// accepted against the stream schema.
fn execute(mut args: Args) -> Result<EvaluationResults> {
    let arff = args.arff.take();
    let synthetic = args.synthetic;
    let out = args.out.clone();
    let json = args.json.clone();

    let mut config = args.into_config()?;
    let mut stream = open_stream(arff, synthetic, &mut config)?;
    let relation = stream.schema().relation.clone();
    let mut evaluation = EvaluationLoop::new(config.clone(), stream.schema(), config.learner.build())?;

    tracing::info!("Learner: {}", config.learner);
    tracing::info!("Mode: {}", config.mode);

    let mut sink = CsvSink::create(&out, config.mode)?;
    let report = evaluation.run(stream.as_mut(), &mut sink)?;
    let results = EvaluationResults::from_run(&evaluation, &relation, report);

    println!("\n{}", results.report.format());

    if let Some(path) = json {
        EvaluationLoop::save_results(&results, &path)?;
        println!("JSON results saved to: {}", path.display());
    }

    Ok(results)
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list_learners {
        println!("{:<14} {:<28} Description", "Learner", "Modes");
        println!("{:-<70}", "");
        for kind in LearnerKind::ALL {
            let learner = kind.build();
            let modes: Vec<String> = [Mode::Classification, Mode::Regression]
                .into_iter()
                .filter(|m| learner.supports(*m))
                .map(|m| m.to_string())
                .collect();
            println!("{:<14} {:<28} {}", kind.name(), modes.join(", "), learner.description());
        }
        return Ok(());
    }

    execute(args)?;
    Ok(())
}
