//! Operator CLI
//!
//! Drives the automation engine against the clinical records tab through the
//! browser extension bridge, or runs extraction offline over a saved page.
//!
//! Usage:
//!   operator serve                      # JSON-lines requests on stdin
//!   operator run extractPatient         # one action against the live tab
//!   operator run insertText -p '{"fieldType":"background","text":"HTN"}'
//!   operator extract page.html patient  # offline, from a saved page
//!   operator profiles                   # list system profiles
//!   operator actions                    # list dispatchable actions

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use operator::capture::{
    CapturePayload, CaptureProvider, CaptureRequest, PresentationBundle, PresentationProvider,
};
use operator::{
    dispatch, ActionRequest, ActionResponse, AutomationError, BridgePage, EngineConfig, MemoryPage,
    PageDriver, Session, ACTIONS,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

mod logging;

#[derive(Parser)]
#[command(name = "operator")]
#[command(about = "Automation and extraction for the clinical records web app")]
struct Cli {
    /// Engine config (timings and extra profiles)
    #[clap(long, global = true, env = "OPERATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[clap(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct CollaboratorArgs {
    /// Shell command producing capture content on stdout
    #[clap(long)]
    capture_cmd: Option<String>,

    /// Shell command rendering a presentation from JSON on stdin
    #[clap(long)]
    present_cmd: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExtractKind {
    Patient,
    Appointments,
    Fields,
    Investigations,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-lines action requests from stdin through the extension bridge
    Serve {
        #[command(flatten)]
        collaborators: CollaboratorArgs,
    },
    /// Run a single action against the live tab
    Run {
        action: String,
        /// JSON payload
        #[clap(long, short, default_value = "{}")]
        payload: String,
        #[command(flatten)]
        collaborators: CollaboratorArgs,
    },
    /// Extract records from a saved HTML page
    Extract {
        file: PathBuf,
        #[clap(value_enum)]
        kind: ExtractKind,
        /// Address the page was saved from; selects the profile
        #[clap(long, default_value = "https://my.xestro.com/")]
        url: String,
        /// Fields to read for `fields` and `investigations`
        #[clap(long = "field", short)]
        fields: Vec<String>,
    },
    /// List system profiles
    Profiles,
    /// List dispatchable actions
    Actions,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("operator")
        .join("config.yaml")
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    EngineConfig::load(&path).with_context(|| format!("Failed to load config {}", path.display()))
}

/// Runs a shell command per capture and inserts its stdout.
struct CommandCapture {
    command: String,
}

#[async_trait::async_trait]
impl CaptureProvider for CommandCapture {
    async fn capture(&self, request: &CaptureRequest) -> Result<CapturePayload, AutomationError> {
        let kind = serde_json::to_value(request.kind)?;
        let output = shell(&self.command)
            .env("OPERATOR_CAPTURE_KIND", kind.as_str().unwrap_or_default())
            .env("OPERATOR_CAPTURE_FIELD", &request.field)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AutomationError::Collaborator(format!("capture command: {e}")))?;
        if !output.status.success() {
            return Err(AutomationError::Collaborator(format!(
                "capture command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(CapturePayload {
            content: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            mime: Some("text/plain".to_string()),
        })
    }
}

/// Pipes the bundle as JSON into a shell command and returns its output,
/// parsed as JSON when possible.
struct CommandPresenter {
    command: String,
}

#[async_trait::async_trait]
impl PresentationProvider for CommandPresenter {
    async fn present(&self, bundle: &PresentationBundle) -> Result<Value, AutomationError> {
        let input = serde_json::to_vec(bundle)?;
        let mut child = shell(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AutomationError::Collaborator(format!("present command: {e}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .await
                .map_err(|e| AutomationError::Collaborator(format!("present command stdin: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AutomationError::Collaborator(format!("present command: {e}")))?;
        if !output.status.success() {
            return Err(AutomationError::Collaborator(format!(
                "present command exited with {}",
                output.status
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout).to_string();
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

fn shell(command: &str) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C");
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c");
        c
    };
    cmd.arg(command);
    cmd
}

fn build_session(
    driver: Arc<dyn PageDriver>,
    config: &EngineConfig,
    collaborators: &CollaboratorArgs,
) -> Result<Session> {
    let mut session = Session::from_config(driver, config).context("Failed to build session")?;
    if let Some(command) = &collaborators.capture_cmd {
        session = session.with_capture(Arc::new(CommandCapture {
            command: command.clone(),
        }));
    }
    if let Some(command) = &collaborators.present_cmd {
        session = session.with_presenter(Arc::new(CommandPresenter {
            command: command.clone(),
        }));
    }
    Ok(session)
}

async fn live_session(config: &EngineConfig, collaborators: &CollaboratorArgs) -> Result<Session> {
    let page = BridgePage::connect()
        .await
        .context("Failed to start the extension bridge")?;
    info!(addr = %page.bridge().local_addr(), "Waiting for the browser extension");
    build_session(Arc::new(page), config, collaborators)
}

fn print_response(response: &ActionResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

async fn serve(session: Session) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("Reading action requests from stdin");

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ActionRequest>(line) {
            Ok(request) => dispatch(&session, request).await,
            Err(e) => {
                warn!("Malformed request: {}", e);
                ActionResponse::failure(&AutomationError::InvalidArgument(format!(
                    "malformed request: {e}"
                )))
            }
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }
    info!("stdin closed, shutting down");
    Ok(())
}

async fn extract(
    file: &Path,
    kind: ExtractKind,
    url: &str,
    fields: Vec<String>,
    config: &EngineConfig,
) -> Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let page = Arc::new(MemoryPage::from_html(url, &html));
    let session = build_session(page, config, &CollaboratorArgs::default())?;

    let request = match kind {
        ExtractKind::Patient => ActionRequest::new("extractPatient", Value::Null),
        ExtractKind::Appointments => ActionRequest::new("extractAppointments", Value::Null),
        ExtractKind::Fields => {
            if fields.is_empty() {
                bail!("--field is required for fields extraction");
            }
            ActionRequest::new("extractFields", serde_json::json!({ "fields": fields }))
        }
        ExtractKind::Investigations => {
            let field = fields
                .first()
                .cloned()
                .unwrap_or_else(|| "investigation-summary".to_string());
            let request = ActionRequest::new("extractField", serde_json::json!({ "field": field }));
            let response = dispatch(&session, request).await;
            let text = response
                .data
                .as_ref()
                .and_then(|d| d.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if !response.success {
                print_response(&response)?;
                bail!("extraction failed");
            }
            ActionRequest::new("segmentInvestigations", serde_json::json!({ "text": text }))
        }
    };
    debug!(action = %request.action_name, "Offline extraction");
    let response = dispatch(&session, request).await;
    print_response(&response)?;
    if !response.success {
        bail!("extraction failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(cli.verbose)?;
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { collaborators } => {
            let session = live_session(&config, &collaborators).await?;
            serve(session).await?;
        }
        Commands::Run {
            action,
            payload,
            collaborators,
        } => {
            let payload: Value =
                serde_json::from_str(&payload).context("--payload must be valid JSON")?;
            let session = live_session(&config, &collaborators).await?;
            let response = dispatch(&session, ActionRequest::new(action, payload)).await;
            print_response(&response)?;
            if !response.success {
                bail!("action failed");
            }
        }
        Commands::Extract {
            file,
            kind,
            url,
            fields,
        } => {
            extract(&file, kind, &url, fields, &config).await?;
        }
        Commands::Profiles => {
            let registry = config.registry()?;
            for profile in registry.profiles() {
                println!(
                    "{:<16} {:<48} {} fields, {} workflow selectors",
                    profile.name,
                    profile.base_url_pattern,
                    profile.fields.len(),
                    profile.workflow_selectors.len()
                );
            }
        }
        Commands::Actions => {
            for action in ACTIONS {
                println!("{:<22} {:<36} {}", action.name, action.payload, action.summary);
            }
        }
    }
    Ok(())
}
