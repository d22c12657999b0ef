//! examscore - score exam answer sheets with an LLM examiner
//!
//! ## Commands
//!
//! - `score`: score a `;`-separated answer sheet and write the annotated copy
//! - `auth-check`: obtain a credential once and report how it was obtained
//! - `prompt`: print the prompt that would be sent for one answer

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, Level};

use examscore_core::config::DEFAULT_MODEL;
use examscore_core::{
    build_prompt, BatchPipeline, ChannelSink, CredentialProvider, CredentialSource, GraderConfig,
    JobEvent, JobInput, MissingScorePolicy, PipelineOptions, Row, TableFormat, TracingSink,
    YandexGptClient,
};

const EVENT_BUFFER: usize = 64;

#[derive(Parser)]
#[command(name = "examscore")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Score free-text exam answers with an LLM examiner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and progress events
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every valid row of an answer sheet
    Score {
        /// Input sheet
        input: PathBuf,

        /// Where to write the scored sheet (default: timestamped name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Field delimiter of the input and output sheets
        #[arg(long, default_value_t = ';')]
        delimiter: char,

        /// Write 0 instead of leaving unscored rows blank
        #[arg(long)]
        fill_unscored: bool,

        /// Log progress through tracing instead of printing it
        #[arg(long)]
        log_progress: bool,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Obtain a credential and report whether it was cached, issued or degraded
    AuthCheck {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Print the scoring prompt for one answer
    Prompt {
        /// Question number (1 and 3 are scored 0..1, others 0..2)
        #[arg(short = 'n', long)]
        question_number: i64,

        /// Question text
        #[arg(short, long)]
        question: String,

        /// Transcribed answer
        #[arg(short, long)]
        answer: String,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Cloud folder that owns the model
    #[arg(long, env = "EXAMSCORE_FOLDER_ID")]
    folder_id: String,

    /// Model name
    #[arg(long, env = "EXAMSCORE_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Long-lived key exchanged for short-lived IAM tokens
    #[arg(long, env = "EXAMSCORE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Pre-issued IAM token, used when no API key is given
    #[arg(long, env = "IAM_TOKEN", hide_env_values = true)]
    iam_token: Option<String>,

    /// Override the IAM token endpoint
    #[arg(long, env = "EXAMSCORE_IAM_ENDPOINT")]
    iam_endpoint: Option<String>,

    /// Override the completion endpoint
    #[arg(long, env = "EXAMSCORE_COMPLETION_ENDPOINT")]
    completion_endpoint: Option<String>,

    /// Override the credential probe endpoint
    #[arg(long, env = "EXAMSCORE_PROBE_ENDPOINT")]
    probe_endpoint: Option<String>,

    /// Per-request timeout for scoring and token calls, in seconds
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=30))]
    timeout_secs: u64,
}

impl ModelArgs {
    fn to_config(&self) -> Result<GraderConfig> {
        let source = match (&self.api_key, &self.iam_token) {
            (Some(key), _) if !key.is_empty() => CredentialSource::ApiKey(key.clone()),
            (_, Some(token)) if !token.is_empty() => CredentialSource::StaticToken(token.clone()),
            _ => bail!("set EXAMSCORE_API_KEY (or --api-key) or IAM_TOKEN (or --iam-token)"),
        };

        let mut config = GraderConfig::new(&self.folder_id)
            .with_model(&self.model)
            .with_credential_source(source)
            .with_request_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(endpoint) = &self.iam_endpoint {
            config = config.with_iam_endpoint(endpoint)?;
        }
        if let Some(endpoint) = &self.completion_endpoint {
            config = config.with_completion_endpoint(endpoint)?;
        }
        if let Some(endpoint) = &self.probe_endpoint {
            config = config.with_probe_endpoint(endpoint)?;
        }
        config.validate().context("Invalid scoring configuration")?;
        Ok(config)
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
    examscore_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Score {
            input,
            output,
            delimiter,
            fill_unscored,
            log_progress,
            model,
        } => {
            let opts = ScoreOpts {
                delimiter,
                fill_unscored,
                log_progress,
                json: cli.json,
            };
            cmd_score(&input, output.as_deref(), &opts, &model).await
        }
        Commands::AuthCheck { model } => cmd_auth_check(&model).await,
        Commands::Prompt {
            question_number,
            question,
            answer,
        } => cmd_prompt(question_number, question, answer),
    }
}

/// Output and table switches of the `score` command
struct ScoreOpts {
    delimiter: char,
    fill_unscored: bool,
    log_progress: bool,
    json: bool,
}

/// Score an answer sheet from disk
async fn cmd_score(
    input: &Path,
    output: Option<&Path>,
    opts: &ScoreOpts,
    model: &ModelArgs,
) -> Result<()> {
    let delimiter = u8::try_from(opts.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| {
            format!(
                "Delimiter {:?} must be a single ASCII character",
                opts.delimiter
            )
        })?;

    let config = model.to_config()?;
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let provider = Arc::new(
        CredentialProvider::from_config(&config).context("Failed to set up credential provider")?,
    );
    let client = Arc::new(YandexGptClient::new(&config).context("Failed to set up model client")?);
    let options = PipelineOptions {
        input_format: TableFormat::input().with_delimiter(delimiter),
        output_format: TableFormat::output().with_delimiter(delimiter),
        missing_score: if opts.fill_unscored {
            MissingScorePolicy::Zero
        } else {
            MissingScorePolicy::Blank
        },
        temp_root: None,
    };
    let pipeline = BatchPipeline::new(provider, client).with_options(options);

    info!(input = %input.display(), "Scoring answer sheet");

    let job = JobInput::new(filename, bytes);
    let result = if opts.log_progress {
        pipeline.run(job, &TracingSink).await
    } else {
        let (sink, rx) = ChannelSink::channel(EVENT_BUFFER);
        let printer = tokio::spawn(print_events(rx, opts.json));
        let result = pipeline.run(job, &sink).await;
        drop(sink);
        printer.await.context("Progress printer task failed")?;
        result
    };

    let artifact = result.context("Scoring failed")?;
    let destination = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(&artifact.filename),
    };
    tokio::fs::write(&destination, &artifact.data)
        .await
        .with_context(|| format!("Failed to write {}", destination.display()))?;

    println!(
        "Scored {} of {} rows -> {}",
        artifact.summary.rows_scored,
        artifact.summary.rows_total,
        destination.display()
    );
    Ok(())
}

/// Render job events on stderr until the job drops its sink
async fn print_events(mut rx: mpsc::Receiver<JobEvent>, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            let line = match &event {
                JobEvent::FileReady { filename, data } => serde_json::json!({
                    "type": "file_ready",
                    "filename": filename,
                    "size_bytes": data.len(),
                })
                .to_string(),
                other => serde_json::to_string(other).unwrap_or_default(),
            };
            eprintln!("{line}");
            continue;
        }

        match event {
            JobEvent::Progress(p) => match (p.current, p.total) {
                (Some(current), Some(total)) => {
                    eprintln!("[{:>3}%] scored {current}/{total}", p.percent)
                }
                _ => eprintln!(
                    "[{:>3}%] {}",
                    p.percent,
                    p.stage.map(|s| s.as_str()).unwrap_or("")
                ),
            },
            JobEvent::Error { message } => eprintln!("error: {message}"),
            JobEvent::FileReady { filename, data } => {
                eprintln!("ready: {filename} ({} bytes)", data.len())
            }
        }
    }
}

/// Obtain one credential and report its freshness
async fn cmd_auth_check(model: &ModelArgs) -> Result<()> {
    let config = model.to_config()?;
    let provider =
        CredentialProvider::from_config(&config).context("Failed to set up credential provider")?;

    let grant = provider
        .get_credential()
        .await
        .context("Could not obtain a credential")?;

    println!("Credential: {}", grant.freshness.as_str());
    println!("Issued at:  {}", grant.credential.issued_at().to_rfc3339());
    if let Some(expires_at) = grant.credential.expires_at() {
        println!("Trusted until: {}", expires_at.to_rfc3339());
    }
    Ok(())
}

/// Print the prompt for one answer
fn cmd_prompt(question_number: i64, question: String, answer: String) -> Result<()> {
    let row = Row {
        question_number,
        question_text: question,
        answer_text: answer,
    };
    println!("{}", build_prompt(&row));
    Ok(())
}
