mod bot;
mod config;
mod terminal_output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use banter_config::load_and_prepare;
use banter_nlc::{Dispatch, Engine};

use bot::{BotState, FALLBACK_REPLY, Replies, build_engine};
use config::{Settings, resolve_config_path};
use terminal_output::{format_reply, note_error, note_success, note_warn, prompt, render_table};

#[derive(Parser)]
#[command(name = "banter")]
#[command(about = "Banter: a chat bot that understands plain-English commands")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the bot on stdin/stdout
    Chat {
        /// Config file (defaults to ~/.banter/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// User to chat as; switch with `/as NAME`
        #[arg(short, long, default_value = "me")]
        user: String,
    },
    /// Validate the config and the bot's intents and questions
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat { config, user } => {
            let settings = prepare(config, true).await?;
            let engine = build_engine(settings.dialog.clone(), Arc::new(BotState::default()))?;
            chat(&engine, user).await?;
        }
        Commands::Check { config } => {
            let settings = prepare(config, false).await?;
            check(&settings)?;
        }
    }

    Ok(())
}

/// Load the config and start logging. With `strict`, an invalid config is an
/// error; otherwise its problems are printed.
async fn prepare(path: Option<PathBuf>, strict: bool) -> Result<Settings> {
    let path = resolve_config_path(path.as_deref());
    let (config, report) = load_and_prepare(&path).await?;
    let settings = Settings::from_config(&config);

    banter_logging::init_logger(settings.log_dir.as_deref(), &settings.log_level, settings.log_json)?;
    info!(config = %path.display(), "Starting Banter");

    for warning in &report.warnings {
        note_warn(&warning.to_string());
    }
    for problem in &report.errors {
        note_error(&problem.to_string());
    }
    if strict && !report.is_valid() {
        bail!("invalid config at {}", path.display());
    }
    Ok(settings)
}

fn check(settings: &Settings) -> Result<()> {
    let engine = build_engine(settings.dialog.clone(), Arc::new(BotState::default()))?;

    let rows: Vec<Vec<String>> = engine
        .intents()
        .all()
        .iter()
        .map(|intent| {
            let slots: Vec<String> = intent.slots.iter().map(|s| format!("{}:{}", s.name, s.slot_type)).collect();
            vec![intent.name.clone(), slots.join(", "), intent.utterances.len().to_string()]
        })
        .collect();
    println!("{}", render_table(&["Intent", "Slots", "Utterances"], &rows));

    let mut questions: Vec<&str> = engine.question_names().collect();
    questions.sort_unstable();
    println!("\n  Questions: {}", questions.join(", "));

    note_success(&format!(
        "{} intents ({} utterances), {} questions, all slot types registered",
        engine.intents().all().len(),
        engine.intents().matcher_count(),
        questions.len()
    ));
    Ok(())
}

/// Read messages from stdin until EOF or `/quit`.
async fn chat(engine: &Engine<Replies>, mut user: String) -> Result<()> {
    let (replies, mut rx) = Replies::channel();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(prompt(&user).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else { break };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }
        if let Some(name) = text.strip_prefix("/as ") {
            user = name.trim().to_string();
            continue;
        }

        match engine.receive(&user, text, &replies).await {
            Ok(Dispatch::NoMatch) => replies.send(FALLBACK_REPLY)?,
            Ok(_) => {}
            Err(e) => {
                error!("[Bot] Failed to handle {:?} from {}: {}", text, user, e);
                replies.send("Something went wrong, sorry.")?;
            }
        }

        while let Ok(reply) = rx.try_recv() {
            stdout.write_all(format!("{}\n", format_reply(&reply)).as_bytes()).await?;
        }
    }
    Ok(())
}
