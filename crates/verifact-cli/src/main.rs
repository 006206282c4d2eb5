use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio::runtime::Runtime;
use tracing::{info, warn};
use verifact_core::{
    AgentRuntime, CheckReport, CheckRequest, ConfigLoader, FactChecker, OfflineBackend, Pipeline,
    Settings, TelemetryOptions, VerifactError, extract_text, init_telemetry,
};

#[derive(Parser, Debug)]
#[command(name = "verifact-cli", version, about = "Fact-check claims, URLs and documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fact check and print the final report.
    Check(InputArgs),
    /// Show which tasks and agents a check would use, without running it.
    Plan(InputArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Claim to verify.
    #[arg(long)]
    claim: Option<String>,

    /// Web page to summarise and verify.
    #[arg(long)]
    url: Option<String>,

    /// Document (.txt, .pdf, .docx) whose text is checked.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Settings file (defaults to $VERIFACT_CONFIG, then ./verifact.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let args = match &cli.command {
        Command::Check(args) | Command::Plan(args) => args,
    };

    let settings = ConfigLoader::load(args.config.clone());
    let options = settings
        .as_ref()
        .map(|settings| TelemetryOptions::from_logging(&settings.logging))
        .unwrap_or_default();
    init_telemetry(options)?;

    let settings = match settings {
        Ok(settings) => settings,
        Err(err) => {
            report_failure(&err);
            return Ok(());
        }
    };

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Check(args) => check_command(settings, args).await,
            Command::Plan(args) => plan_command(settings, args),
        }
    });

    Ok(())
}

async fn check_command(settings: Settings, args: InputArgs) {
    let Some(request) = resolve_request(&args) else {
        return;
    };

    let outcome = match Pipeline::new(settings) {
        Ok(pipeline) => FactChecker::new(pipeline).check(request).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(report) => print_report(&report),
        Err(err) => report_failure(&err),
    }
}

fn plan_command(settings: Settings, args: InputArgs) {
    let Some(request) = resolve_request(&args) else {
        return;
    };

    // building a plan never calls a backend, so no credentials are needed
    let pipeline = Pipeline::with_runtime(settings, AgentRuntime::new(Arc::new(OfflineBackend)));
    let inputs = request.inputs();
    let crew = match pipeline.build_crew(inputs) {
        Ok(crew) => crew,
        Err(err) => {
            report_failure(&err);
            return;
        }
    };

    println!("Mode: {}", request.mode().as_str());
    for (index, task) in crew.crew().tasks().iter().enumerate() {
        println!(
            "{}. {} [{}] -> {} ({})",
            index + 1,
            task.name,
            task.kind.as_str(),
            task.agent.name,
            task.agent.role
        );
    }
}

fn resolve_request(args: &InputArgs) -> Option<CheckRequest> {
    if let Some(path) = args.file.as_ref() {
        if args.claim.is_some() || args.url.is_some() {
            warn!("--file given; ignoring --claim and --url");
        }
        return match read_document(path) {
            Ok(text) if text.trim().is_empty() => {
                println!("Warning: {} contains no text to check.", path.display());
                None
            }
            Ok(text) => Some(CheckRequest::Topic { text }),
            Err(err) => {
                report_failure(&err);
                None
            }
        };
    }

    let claim = non_empty(args.claim.as_deref());
    let url = non_empty(args.url.as_deref());
    if claim.is_some() || url.is_some() {
        return Some(CheckRequest::ClaimOrUrl { claim, url });
    }

    match prompt_claim() {
        Some(claim) => Some(CheckRequest::ClaimOrUrl {
            claim: Some(claim),
            url: None,
        }),
        None => {
            println!("Warning: please enter a claim to fact-check.");
            None
        }
    }
}

fn read_document(path: &Path) -> Result<String, VerifactError> {
    let bytes = std::fs::read(path).map_err(|err| {
        VerifactError::Document(format!("failed to read {}: {err}", path.display()))
    })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    info!(file = %path.display(), bytes = bytes.len(), "extracting document text");
    extract_text(file_name, &bytes)
}

fn prompt_claim() -> Option<String> {
    print!("Enter a claim to fact-check: ");
    let _ = io::stdout().flush();

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    non_empty(Some(&line))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn print_report(report: &CheckReport) {
    println!("{}", report.result);
    println!();
    println!("Verdict: {}", report.verdict.label());
    println!("Check: {} ({} ms)", report.check_id, report.duration_ms);
}

fn report_failure(err: &VerifactError) {
    eprintln!("error [{}]: {err}", err.kind());
}
