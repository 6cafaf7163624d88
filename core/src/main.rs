/// Atrium chat demo - interactive session over an in-process room
use atrium_core::{Config, LoopbackRoom, Role, Session, SessionEvent};
use colored::*;
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let room = Arc::new(LoopbackRoom::new());
    let session = Arc::new(Session::new(config.clone(), room.clone()));
    session.start().await
        .map_err(|e| anyhow::anyhow!("Session error: {}", e))?;

    print_banner(&config);

    // Surface mirror activity while the user types
    let mut events = session.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::MessageMirrored { message_id } => {
                    println!(
                        "{} reply {} mirrored to the room",
                        "✓".green().bold(),
                        short_id(&message_id).dimmed()
                    );
                }
                SessionEvent::MirrorFailed { message_id } => {
                    println!(
                        "{} mirror failed for {}",
                        "✗".red().bold(),
                        short_id(&message_id).dimmed()
                    );
                }
                _ => {}
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "/quit" {
            break;
        }
        if line == "/transcript" {
            render_transcript(&session).await;
            continue;
        }
        if let Some(rest) = line.strip_prefix("/as ") {
            match (session.room_id(), rest.split_once(' ')) {
                (Some(room_id), Some((who, text))) => {
                    room.post_as(room_id, who, None, text).await;
                }
                (None, _) => {
                    eprintln!("{}", "✗ Solo session, no room to post into".yellow());
                }
                (_, None) => {
                    eprintln!("{}", "Usage: /as <external_id> <text>".yellow());
                }
            }
            continue;
        }

        session.append_user(line).await;
        let reply = canned_reply(line);
        println!("{} {}", "assistant>".magenta().bold(), reply);
        session.append_assistant(reply).await;
    }

    session.stop().await;
    Ok(())
}

fn print_banner(config: &Config) {
    println!("{}", "⚡ Atrium Chat".bright_cyan().bold());
    let who = config
        .display_name
        .as_deref()
        .unwrap_or(&config.local_user_id);
    match &config.room_id {
        Some(room) => println!("  room {} as {}", room.cyan(), who.cyan()),
        None => println!("  {}", "solo session (no room)".dimmed()),
    }
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {}                   Show the merged transcript", "/transcript".cyan());
    println!(
        "  {} <id> <text>              Post into the room as a collaborator",
        "/as".cyan()
    );
    println!("  {}                         Exit", "/quit".cyan());
    println!("  anything else becomes your message, answered locally");
    println!();
}

async fn render_transcript(session: &Session) {
    let messages = session.transcript().await;
    println!(
        "{}",
        format!("Transcript ({} messages)", messages.len())
            .bright_cyan()
            .bold()
    );
    for message in &messages {
        let role = match message.role {
            Role::User => "user".cyan(),
            Role::Assistant => "assistant".magenta(),
            Role::System => "system".yellow(),
        };
        let who = message
            .sender
            .as_ref()
            .map(|s| {
                s.display_name
                    .clone()
                    .unwrap_or_else(|| s.external_id.clone())
            })
            .unwrap_or_else(|| "local".to_string());
        let mirrored = if session.is_mirrored(&message.id).await {
            " ✓".green().to_string()
        } else {
            String::new()
        };
        println!(
            "  [{}] {:>9} ({}) {}{}",
            message.created,
            role,
            who.dimmed(),
            message.concat_text(),
            mirrored
        );
    }
}

/// Stand-in for the real assistant, which lives outside this crate
fn canned_reply(input: &str) -> String {
    format!("Noted: \"{}\"", input)
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}
