//! replyguide - guideline compliance scoring for review replies
//!
//! ## Commands
//!
//! - `score`: score CSV columns against a guideline set and write a report
//! - `measure`: score one text and print the raw result
//! - `guidelines`: list the configured guidelines and their digest

mod input;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use replyguide_core::{
    scorer_for, write_report_json, write_table_md, BatchEvaluator, BatchReportArtifact,
    ComplianceMetric, FailurePolicy, GuidelineSet, MultiGuidelineComplianceMetric, Outcome,
    RunConfig, ScoreBatching,
};
use replyguide_llm::{CallGauge, ChatModel, GaugedModel, OpenAiChatClient};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "replyguide")]
#[command(version = replyguide_core::VERSION)]
#[command(about = "Score review replies for guideline compliance with an LLM judge", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score CSV columns against the configured guidelines
    Score {
        #[command(flatten)]
        run: RunArgs,

        /// CSV file with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Column to score (repeatable; overrides the config file)
        #[arg(short, long = "column")]
        columns: Vec<String>,

        /// One call per guideline (single) or per text (multi)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Maximum model calls in flight
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Measurements per cell
        #[arg(long)]
        samples: Option<usize>,

        /// What to do with measurements that failed to score
        #[arg(long, value_enum)]
        failure_policy: Option<PolicyArg>,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write a Markdown table
        #[arg(long)]
        markdown: Option<PathBuf>,
    },

    /// Score a single text and print the result as JSON
    Measure {
        #[command(flatten)]
        run: RunArgs,

        /// Text to score
        #[arg(long, conflicts_with = "text_file", required_unless_present = "text_file")]
        text: Option<String>,

        /// Read the text to score from a file
        #[arg(long)]
        text_file: Option<PathBuf>,

        /// Score this instruction alone instead of the guideline set
        #[arg(long)]
        instruction: Option<String>,
    },

    /// List guidelines from a config file with the set digest
    Guidelines {
        /// TOML run configuration
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// TOML run configuration
    #[arg(short = 'C', long)]
    config: PathBuf,

    /// API key for the model endpoint
    #[arg(long, env = "REPLYGUIDE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Override the model endpoint base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Restrict scoring to these guideline titles (repeatable)
    #[arg(short, long = "guideline")]
    guidelines: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Single,
    Multi,
}

impl From<ModeArg> for ScoreBatching {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => ScoreBatching::PerGuideline,
            ModeArg::Multi => ScoreBatching::AllGuidelines,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Exclude,
    Substitute,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Exclude => FailurePolicy::Exclude,
            PolicyArg::Substitute => FailurePolicy::Substitute,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    replyguide_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Score {
            run,
            input,
            columns,
            mode,
            max_concurrent,
            samples,
            failure_policy,
            output,
            markdown,
        } => {
            let mut config = load_run_config(&run)?;
            if !columns.is_empty() {
                config.batch.columns = columns;
            }
            if let Some(mode) = mode {
                config.batch.mode = mode.into();
            }
            if let Some(n) = max_concurrent {
                config.batch.max_concurrent = n;
            }
            if let Some(n) = samples {
                config.batch.samples = n;
            }
            if let Some(policy) = failure_policy {
                config.batch.failure_policy = policy.into();
            }
            config.validate().context("invalid run configuration")?;

            let (model, gauge) = connect(&config, &run)?;
            cmd_score(
                model,
                Some(gauge),
                &config,
                &input,
                output.as_deref(),
                markdown.as_deref(),
            )
            .await
        }
        Commands::Measure {
            run,
            text,
            text_file,
            instruction,
        } => {
            let config = load_run_config(&run)?;
            let text = match (text, text_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("read {:?}", path))?,
                (None, None) => return Err(anyhow!("pass --text or --text-file")),
            };
            let (model, _gauge) = connect(&config, &run)?;
            let rendered = cmd_measure(model, &config, &text, instruction.as_deref()).await?;
            println!("{rendered}");
            Ok(())
        }
        Commands::Guidelines { config } => {
            let config = RunConfig::load(&config)
                .with_context(|| format!("load config {:?}", config))?;
            print!("{}", cmd_guidelines(&config.guidelines)?);
            Ok(())
        }
    }
}

/// Load the run file and narrow its guideline set to `--guideline` titles.
fn load_run_config(run: &RunArgs) -> Result<RunConfig> {
    let mut config =
        RunConfig::load(&run.config).with_context(|| format!("load config {:?}", run.config))?;
    if let Some(url) = &run.base_url {
        config.model.base_url = Some(url.clone());
    }
    if !run.guidelines.is_empty() {
        config.guidelines = config
            .guidelines
            .select(&run.guidelines)
            .context("select guidelines")?;
    }
    Ok(config)
}

/// Build the HTTP client, wrapped so in-flight calls are counted.
fn connect(config: &RunConfig, run: &RunArgs) -> Result<(Arc<dyn ChatModel>, Arc<CallGauge>)> {
    let api_key = run
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("missing API key: pass --api-key or set REPLYGUIDE_API_KEY"))?;
    let client = OpenAiChatClient::new(config.model_config(api_key))
        .context("failed to build model client")?;
    info!(model_id = %client.model_id(), endpoint = %client.endpoint(), "model client ready");

    let gauged = GaugedModel::new(client);
    let gauge = gauged.gauge();
    Ok((Arc::new(gauged), gauge))
}

async fn cmd_score(
    model: Arc<dyn ChatModel>,
    gauge: Option<Arc<CallGauge>>,
    config: &RunConfig,
    input: &Path,
    output: Option<&Path>,
    markdown: Option<&Path>,
) -> Result<()> {
    let table = input::load_csv(input)?;
    info!(
        rows = table.rows.len(),
        headers = table.headers.len(),
        "loaded {:?}",
        input
    );

    let scorer = scorer_for(config.batch.mode, model, config.model.max_tokens);
    let mut evaluator = BatchEvaluator::new(scorer).with_config(config.batch.batch_config());
    if let Some(gauge) = gauge {
        evaluator = evaluator.with_gauge(gauge);
    }

    let report = evaluator
        .evaluate(&table.rows, &config.batch.columns, &config.guidelines)
        .await
        .context("batch evaluation failed")?;

    let artifact =
        BatchReportArtifact::from_report(&report, &config.model.model_id, &config.guidelines)?;

    match output {
        Some(path) => {
            write_report_json(path, &artifact)?;
            info!("report written to {:?}", path);
        }
        None => println!(
            "{}",
            serde_json::to_string_pretty(&artifact).context("serialize batch report")?
        ),
    }
    if let Some(path) = markdown {
        write_table_md(path, &report.table)?;
        info!("markdown table written to {:?}", path);
    }

    info!(
        measurements = report.measurements,
        failures = report.failures,
        excluded = report.excluded,
        peak_in_flight = report.peak_in_flight.unwrap_or(0),
        "scoring complete"
    );
    if report.measurements > 0 && report.failures == report.measurements {
        tracing::warn!("every measurement failed; check the model endpoint and API key");
    }
    Ok(())
}

/// Score one text; returns the result as pretty JSON.
///
/// Without `--instruction` the configured mode decides the call shape:
/// `single` prints one normalized result per guideline title, `multi`
/// prints the raw per-guideline detail.
async fn cmd_measure(
    model: Arc<dyn ChatModel>,
    config: &RunConfig,
    text: &str,
    instruction: Option<&str>,
) -> Result<String> {
    let tokens = config.model.max_tokens;
    let value = match (instruction, config.batch.mode) {
        (Some(instruction), ScoreBatching::PerGuideline) => {
            let mut metric = ComplianceMetric::new(model);
            if let Some(n) = tokens {
                metric = metric.with_max_tokens(n);
            }
            serde_json::to_value(metric.measure(instruction, text).await)?
        }
        (Some(instruction), ScoreBatching::AllGuidelines) => {
            let mut metric = MultiGuidelineComplianceMetric::new(model);
            if let Some(n) = tokens {
                metric = metric.with_max_tokens(n);
            }
            serde_json::to_value(metric.measure(instruction, text).await)?
        }
        (None, ScoreBatching::PerGuideline) => {
            let guidelines = config.guidelines.as_slice();
            let scorer = scorer_for(config.batch.mode, model, tokens);
            let results = scorer.score(guidelines, text).await;
            let mut by_title = serde_json::Map::new();
            for (g, result) in guidelines.iter().zip(results) {
                by_title.insert(g.title.clone(), serde_json::to_value(result)?);
            }
            serde_json::Value::Object(by_title)
        }
        (None, ScoreBatching::AllGuidelines) => {
            let mut metric = MultiGuidelineComplianceMetric::new(model);
            if let Some(n) = tokens {
                metric = metric.with_max_tokens(n);
            }
            let multi = metric.measure_all(config.guidelines.as_slice(), text).await;
            outcome_json(multi.outcome())?
        }
    };
    serde_json::to_string_pretty(&value).context("serialize measurement")
}

fn outcome_json(outcome: Outcome) -> Result<serde_json::Value> {
    Ok(match outcome {
        Outcome::Score(score) => serde_json::json!(score),
        Outcome::NoSamples => serde_json::Value::Null,
        Outcome::SeeDetail(detail) => serde_json::to_value(detail)?,
    })
}

fn cmd_guidelines(guidelines: &GuidelineSet) -> Result<String> {
    let mut out = String::new();
    for (i, g) in guidelines.iter().enumerate() {
        out.push_str(&format!("{:>3}. {}\n     {}\n", i + 1, g.title, g.instruction));
    }
    out.push_str(&format!("digest: {}\n", guidelines.digest()?));
    Ok(out)
}
