use std::{
    io::{self, Write as _},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Result;
use clap::Parser;
use client_core::{
    transport::connect_channel, ClientEvent, HttpBackendApi, RuntimeConfig, SessionRuntime,
};
use shared::{domain::UserId, protocol::ChannelNamespace};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod view;

use config::{load_settings, DEFAULT_CONFIG_FILE};
use view::{metrics_summary, render, Output};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    history_limit: Option<u32>,
    /// Reuse an identifier from an earlier signup instead of registering.
    #[arg(long)]
    user_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (mut settings, config_warnings) = load_settings(&args.config);
    if let Some(v) = args.server_url {
        settings.server_url = v;
    }
    if let Some(v) = args.api_base {
        settings.api_base = Some(v);
    }
    if let Some(v) = args.history_limit {
        settings.history_limit = v;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    for warning in &config_warnings {
        warning.log();
    }

    let (session_out, session_reader) =
        connect_channel(&settings.server_url, ChannelNamespace::Session).await?;
    let dashboard_reader =
        match connect_channel(&settings.server_url, ChannelNamespace::Dashboard).await {
            Ok((_, reader)) => Some(reader),
            Err(err) => {
                warn!(error = %err, "dashboard unavailable; continuing without metrics");
                None
            }
        };

    let backend = HttpBackendApi::new(settings.api_base())
        .with_signup_email_domain(settings.signup_email_domain.clone());
    let runtime = SessionRuntime::spawn(
        RuntimeConfig {
            history_limit: settings.history_limit,
            user_id: args.user_id.map(UserId),
        },
        Arc::new(backend),
        Arc::new(session_out),
    );
    let handle = runtime.handle();

    let printer = tokio::spawn(print_updates(handle.subscribe()));
    let mut readers = vec![session_reader.spawn(handle.clone())];
    if let Some(reader) = dashboard_reader {
        readers.push(reader.spawn(handle.clone()));
    }

    info!(server_url = %settings.server_url, "connected; type a message, /quit to exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim() == "/quit" {
                    break;
                }
                if handle.submit(line).is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(handle);
    for reader in &readers {
        reader.abort();
    }
    let snapshot = runtime.join().await?;
    let _ = printer.await;
    info!(
        entries = snapshot.session.entries().len(),
        dashboard_points = snapshot.metrics.confidence().len(),
        user_id = ?snapshot.user_id,
        "session closed"
    );
    Ok(())
}

async fn print_updates(mut events: tokio::sync::broadcast::Receiver<ClientEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "display fell behind; updates were lost");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            ClientEvent::Session(delta) => match render(&delta) {
                Some(Output::Line(line)) => print!("\n{line}"),
                Some(Output::Append(text)) => print!("{text}"),
                None => continue,
            },
            ClientEvent::Metrics(delta) => print!("\n{}", metrics_summary(&delta)),
            ClientEvent::IdentityAssigned(user_id) => print!("\nregistered as {user_id}"),
        }
        let _ = io::stdout().flush();
    }
    println!();
}
