//! lbx-fusion - one fusion pass over a captured page dump
//!
//! Reads a capture JSON (HTML, markdown, API responses), runs the built-in
//! strategies and prints the fused result as JSON on stdout. Logs go to
//! stderr.

use anyhow::{Context, Result};
use clap::Parser;
use lbx_common::config::{load_json, resolve_config_path, CONFIG_ENV_VAR};
use lbx_common::logging::init_tracing;
use lbx_fusion::{
    AppConfig, FusedResult, FusionEngine, LearnedPattern, PageCapture, QualityContext,
    QualityScoreReport, QualityScorer, StrategyRegistry, TeacherHints, TeacherVerification,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "lbx-fusion", version, about = "Fuse leaderboard extractions from a captured page")]
struct Args {
    /// Captured page (JSON: html, markdown, api_calls, api_responses, leaderboard_name)
    #[arg(long)]
    capture: PathBuf,

    /// Teacher layout hints (JSON)
    #[arg(long)]
    hints: Option<PathBuf>,

    /// Learned site pattern (JSON)
    #[arg(long)]
    learned: Option<PathBuf>,

    /// Previous fused result of the same leaderboard (JSON)
    #[arg(long)]
    previous: Option<PathBuf>,

    /// Teacher verification of this run (JSON)
    #[arg(long)]
    teacher_verification: Option<PathBuf>,

    /// Config file (TOML)
    #[arg(long, env = "LBX_CONFIG")]
    config: Option<PathBuf>,

    /// Also grade the fused result
    #[arg(long)]
    quality: bool,
}

/// `--quality` output
#[derive(Serialize)]
struct GradedOutput<'a> {
    result: &'a FusedResult,
    quality: QualityScoreReport,
}

fn load_optional<T: serde::de::DeserializeOwned>(path: Option<&PathBuf>, what: &str) -> Result<Option<T>> {
    path.map(|p| load_json(p).with_context(|| format!("Failed to read {} from {}", what, p.display())))
        .transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!("Starting lbx-fusion v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    let capture: PageCapture = load_json(&args.capture)
        .with_context(|| format!("Failed to read capture from {}", args.capture.display()))?;
    let hints: Option<TeacherHints> = load_optional(args.hints.as_ref(), "teacher hints")?;
    let learned: Option<LearnedPattern> = load_optional(args.learned.as_ref(), "learned pattern")?;

    let engine = FusionEngine::new(StrategyRegistry::with_defaults(), config.fusion.clone());
    let fused = engine.run(&capture, hints.as_ref(), learned.as_ref()).await;

    let output = if args.quality {
        let previous: Option<FusedResult> = load_optional(args.previous.as_ref(), "previous result")?;
        let verification: Option<TeacherVerification> =
            load_optional(args.teacher_verification.as_ref(), "teacher verification")?;

        let mut context = QualityContext {
            learned,
            teacher_verification: verification,
            ..Default::default()
        };
        if let Some(previous) = &previous {
            context = context.with_previous_result(previous);
        }
        let report = QualityScorer::new(config.quality.clone()).score(&fused, &context);
        info!(overall = report.overall, status = %report.status, "Quality graded");
        serde_json::to_string_pretty(&GradedOutput {
            result: &fused,
            quality: report,
        })
    } else {
        serde_json::to_string_pretty(&fused)
    }
    .context("Failed to serialize output")?;

    println!("{}", output);
    Ok(())
}
