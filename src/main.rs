//! Boardroom - AI executive analysis for business documents
//!
//! A CLI that submits one document to the analysis pipeline, waits for
//! the three executive analysts and the synthesis step to finish, and
//! writes the composed report.
//!
//! Exit codes:
//!   0 - Success (request completed, report written)
//!   1 - Runtime error, validation failure, or terminal failed state

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use boardroom::admission::AdmissionController;
use boardroom::cli::{Args, OutputFormat};
use boardroom::config::Config;
use boardroom::documents::FsDocumentStore;
use boardroom::gateway::{AnalysisGateway, GatewayConfig, HttpInferenceBackend};
use boardroom::orchestrator::{Orchestrator, ReportOutcome};
use boardroom::report;
use boardroom::store::Database;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Boardroom v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .boardroom.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".boardroom.toml");

    if path.exists() {
        eprintln!("⚠️  .boardroom.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .boardroom.toml")?;

    println!("✅ Created .boardroom.toml with default settings.");
    println!("   Edit it to customize the model, backend, and rate limits.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run one submission end to end. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let file = args
        .file
        .clone()
        .context("an input file is required")?;
    let file_key = file
        .file_name()
        .and_then(|name| name.to_str())
        .context("input path has no usable filename")?
        .to_string();
    let root = file
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    println!("🤖 Initializing analysis pipeline...");
    println!("   Model: {}", config.model.name);
    println!("   Backend: {}", config.model.backend_url);
    println!(
        "   Rate limit: {} requests / {} min",
        config.admission.max_requests, config.admission.window_minutes
    );

    // Compose the pipeline. The backend client is constructed here and
    // injected - its lifetime is the process, not a module global.
    let store = Database::new(config.storage.db_path.clone().into())?;
    let admission = AdmissionController::new(
        store.clone(),
        config.admission.max_requests,
        ChronoDuration::minutes(config.admission.window_minutes),
    );
    let backend = Arc::new(HttpInferenceBackend::new(
        config.model.backend_url.clone(),
        args.api_key.clone(),
        config.model.timeout_seconds,
    )?);
    let gateway = AnalysisGateway::new(
        backend,
        GatewayConfig {
            model: config.model.name.clone(),
            temperature: config.model.temperature,
            max_retries: config.model.retries,
            attempt_timeout: Duration::from_secs(config.model.timeout_seconds),
            retry_delay: Duration::from_millis(500),
        },
    );
    let documents = Arc::new(FsDocumentStore::new(root));

    let orchestrator = Orchestrator::new(store, admission, gateway, documents);

    // Submit and wait for the terminal state.
    println!("\n📥 Submitting document: {}", file.display());
    let request_id = orchestrator.submit(&args.user, &file_key).await?;
    println!("   Request id: {}", request_id);

    println!("\n🔬 Running role analyses (CFO, CMO, COO in parallel)...");
    orchestrator.wait_for(&request_id).await;

    let status = orchestrator.get_status(&request_id).await?;
    for (role, progress) in &status.progress {
        let mark = match progress {
            boardroom::RoleProgress::Completed => "✅",
            boardroom::RoleProgress::Pending => "⚠️ ",
        };
        println!("   {} {}", mark, role.title());
    }

    match orchestrator.get_report(&request_id).await? {
        ReportOutcome::Ready(analysis_report) => {
            let output_path = std::path::PathBuf::from(&config.general.output);
            let rendered = match args.format {
                OutputFormat::Markdown => report::generate_markdown_report(&analysis_report),
                OutputFormat::Json => report::generate_json_report(&analysis_report)?,
            };

            std::fs::write(&output_path, &rendered)
                .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

            println!("\n📊 Synthesis:");
            println!(
                "   Consolidated insights: {}",
                analysis_report.synthesis.consolidated_insights.len()
            );
            println!(
                "   Action items: {}",
                analysis_report.synthesis.action_items.len()
            );
            println!(
                "\n✅ Analysis complete! Report saved to: {}",
                output_path.display()
            );
            Ok(0)
        }
        ReportOutcome::Failed { error } => {
            eprintln!("\n⛔ Analysis failed: {}", error);
            Ok(1)
        }
        ReportOutcome::InProgress { status } => {
            // wait_for returned, so this should not happen; report it
            // honestly rather than spinning.
            eprintln!("\n⚠️  Request still {} after pipeline task finished", status);
            Ok(1)
        }
        ReportOutcome::Unavailable => {
            eprintln!("\n⚠️  Request completed but the report is no longer available");
            Ok(1)
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .boardroom.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
