use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::RandomPlaceholder;
use shared::domain::UserId;

mod replay;

use replay::{render_text, replay_capture};

#[derive(Parser, Debug)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fold a JSON-lines frame capture through the client reducers.
    Replay {
        capture: PathBuf,
        /// Identifier assumed to be known while folding.
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            capture,
            user_id,
            json,
        } => {
            let file = File::open(&capture)
                .with_context(|| format!("failed to open capture {}", capture.display()))?;
            let user_id = user_id.map(UserId);
            let outcome = replay_capture(
                BufReader::new(file),
                user_id.as_ref(),
                &mut RandomPlaceholder,
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", render_text(&outcome));
            }
        }
    }

    Ok(())
}
