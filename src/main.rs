use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info};

use realm_launcher::commands::{self, SharedState};
use realm_launcher::core::auth::AuthenticatedUser;
use realm_launcher::core::cancel::CancelFlag;
use realm_launcher::core::error::LauncherError;
use realm_launcher::core::integrity::VerifyProgress;
use realm_launcher::core::launch::LaunchEvent;
use realm_launcher::core::state::{default_data_dir, AppState, SettingUpdate};

#[derive(Parser)]
#[command(name = "realm-launcher", version, about = "Verify and launch the game client")]
struct Cli {
    /// Launcher data directory (settings and manifest)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Hash a clean Data folder into a manifest
    GenerateManifest {
        #[arg(long)]
        data: PathBuf,
        /// Defaults to the manifest the launcher verifies against
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Verify the configured installation against the manifest
    Verify,
    /// Validate, authorize, verify, configure and start the client
    Launch {
        #[arg(long, requires = "account_id")]
        username: Option<String>,
        #[arg(long, requires = "username")]
        account_id: Option<u64>,
    },
    /// Probe the auth and world servers
    Status,
    /// Change one setting, e.g. `set realmlist logon.example.org`
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    realm_launcher::init_tracing();
    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let state = match AppState::new(data_dir) {
        Ok(state) => commands::shared(state),
        Err(err) => return fail(&err),
    };

    match run(&state, cli.cmd).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => fail(&err),
    }
}

/// `Ok(false)` when the command ran but its printed result is a failure.
async fn run(state: &SharedState, cmd: Cmd) -> Result<bool, LauncherError> {
    match cmd {
        Cmd::GenerateManifest { data, output } => {
            let output = match output {
                Some(path) => path,
                None => state.lock().await.manifest_path().to_path_buf(),
            };
            let entries = commands::generate_manifest(data, output.clone()).await?;
            print_json(&serde_json::json!({ "entries": entries, "manifest": output }))?;
            Ok(true)
        }
        Cmd::Verify => {
            let (tx, mut rx) = mpsc::unbounded_channel::<VerifyProgress>();
            let printer = tokio::spawn(async move {
                while let Some(progress) = rx.recv().await {
                    info!("{}", progress_line(&progress));
                }
            });
            let report = commands::verify_installation(state, CancelFlag::new(), Some(tx)).await?;
            let _ = printer.await;
            print_json(&report)?;
            Ok(report.passed())
        }
        Cmd::Launch {
            username,
            account_id,
        } => {
            let identity = username
                .zip(account_id)
                .map(|(username, account_id)| AuthenticatedUser {
                    username,
                    account_id,
                });

            let (tx, mut rx) = mpsc::unbounded_channel::<LaunchEvent>();
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        LaunchEvent::StateChanged(state) => info!("State: {:?}", state),
                        LaunchEvent::Verification(p) => info!("Verifying {:>5.1}%", p.percent()),
                    }
                }
            });
            let outcome = commands::launch_game(state, identity, Some(tx)).await;
            let _ = printer.await;
            print_json(&outcome)?;
            Ok(outcome.is_launched())
        }
        Cmd::Status => {
            let status = commands::server_status(state).await;
            print_json(&status)?;
            Ok(status.all_online())
        }
        Cmd::Set { key, value } => {
            let update = SettingUpdate::parse(&key, &value)?;
            let settings = commands::update_setting(state, update).await?;
            print_json(&settings)?;
            Ok(true)
        }
    }
}

fn progress_line(progress: &VerifyProgress) -> String {
    let path = progress.current_path.as_deref().unwrap_or_default();
    format!("{:>5.1}% {}", progress.percent(), path)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), LauncherError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn fail(err: &LauncherError) -> ExitCode {
    error!("{}", err);
    if let Ok(json) = serde_json::to_string_pretty(err) {
        eprintln!("{json}");
    }
    ExitCode::FAILURE
}
