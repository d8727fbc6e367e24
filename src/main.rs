#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

use std::sync::Arc;

use clap::Parser;
use liveclass::logging::Logger;
use liveclass::net::api::{ApiClient, ApiError, JoinDecision};
use liveclass::net::client::{SessionClient, SessionConfig};
use liveclass::state::SubmitError;
use liveclass::store::{ContextStore, JoinContext, MemoryStore};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("join rejected: {message}")]
    Rejected { message: String },
    #[error("stdin read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "liveclass", about = "Join a live classroom session as a participant")]
struct Cli {
    /// Class code shown by the presenter.
    class_code: String,

    /// Display name to join with.
    #[arg(long)]
    name: String,

    /// Username; defaults to the display name.
    #[arg(long)]
    username: Option<String>,

    /// Stable participant id; generated when omitted.
    #[arg(long, env = "LIVECLASS_PARTICIPANT_ID")]
    participant_id: Option<String>,

    /// Override the hub WebSocket URL (testing).
    #[arg(long, env = "LIVECLASS_HUB_URL")]
    hub_url: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run(Cli::parse()).await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let logger = Logger::new();
    let api = ApiClient::new();

    let info = api.resolve_class_code(&cli.class_code).await?;
    eprintln!(
        "class {} in region {} (presenter {})",
        info.class_code, info.cpcs_region, info.presenter_email
    );

    let participant_id = cli
        .participant_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let participant_username = cli.username.unwrap_or_else(|| cli.name.clone());

    let decision = api
        .validate_join(&info, &participant_id, &participant_username)
        .await?;
    let session_id = match decision {
        JoinDecision::Accepted { session_id } => session_id,
        JoinDecision::Rejected { message, .. } => return Err(CliError::Rejected { message }),
    };

    let ctx = JoinContext {
        cpcs_region: info.cpcs_region.clone(),
        presenter_email: info.presenter_email.clone(),
        class_code: info.class_code.clone(),
        participant_id,
        participant_username,
        participant_name: cli.name,
        class_session_id: session_id,
    };

    let store: Arc<dyn ContextStore> = Arc::new(MemoryStore::new());
    store.write(&ctx);

    if let Some(profile) = api.fetch_presenter_profile(&info.presenter_email).await {
        if !profile.first_name.is_empty() {
            eprintln!("presenter: {} {}", profile.first_name, profile.last_name);
        }
    }

    let config = cli
        .hub_url
        .map_or_else(|| SessionConfig::for_region(&info.cpcs_region), SessionConfig::for_url);
    let client = SessionClient::new(config, ctx, store, logger);
    client.acquire();

    let feed = tokio::spawn(print_feed(client.clone()));

    eprintln!("commands: /submit a,b  /short <text>  /draw <text>  /reveal  /reconnect  /leave");
    command_loop(&client, BufReader::new(tokio::io::stdin())).await?;

    client.leave().await;
    feed.abort();
    Ok(())
}

/// Drive stdin commands until leave, EOF, or removal. Removal must unblock
/// the loop immediately, not on the next keypress, so the line read races
/// the client's change notifications.
async fn command_loop<R>(client: &SessionClient, reader: R) -> Result<(), CliError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut changes = client.subscribe();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/leave" {
                    break;
                }
                handle_command(client, line);
            }
            changed = changes.changed() => {
                if changed.is_err() || client.with_state(|state| state.removed_from_class) {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn handle_command(client: &SessionClient, line: &str) {
    let outcome: Result<(), SubmitError> = if let Some(rest) = line.strip_prefix("/submit ") {
        let selections: Vec<String> = rest
            .split(',')
            .map(str::trim)
            .filter(|choice| !choice.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        client.submit_choices(&selections)
    } else if let Some(text) = line.strip_prefix("/short ") {
        client.submit_short(text)
    } else if let Some(data) = line.strip_prefix("/draw ") {
        client.submit_drawing(data.as_bytes())
    } else if line == "/reveal" {
        client.toggle_reveal();
        Ok(())
    } else if line == "/reconnect" {
        client.force_reconnect();
        Ok(())
    } else {
        eprintln!("unknown command: {line}");
        Ok(())
    };

    if let Err(error) = outcome {
        eprintln!("rejected: {error}");
    }
}

/// Print status transitions and new feed entries as the reducer applies
/// events.
async fn print_feed(client: SessionClient) {
    let mut changes = client.subscribe();
    let mut last_status = None;
    let mut printed = 0;

    loop {
        if changes.changed().await.is_err() {
            break;
        }

        let (status, entries, stars, level) = client.with_state(|state| {
            let fresh: Vec<String> = state.messages[printed.min(state.messages.len())..]
                .iter()
                .map(|message| format!("[{}] {}", message.ts, message.event))
                .collect();
            (state.status, fresh, state.stars, state.level())
        });

        if last_status != Some(status) {
            eprintln!("status: {}", status.as_str());
            last_status = Some(status);
        }
        for entry in &entries {
            eprintln!("{entry}  (stars {stars}, level {level})");
        }
        printed += entries.len();

        if client.with_state(|state| state.duplicate_connection) {
            eprintln!("another tab is connected; /reconnect to take over");
        }
    }
}
