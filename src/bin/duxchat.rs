//! Terminal front-end for the analysis endpoint.
//!
//! Plain lines are sent as messages. `/attach <path>` attaches an image to the
//! next message, `/prompt <n>` sends one of the quick prompts, `/quit` exits.

use std::env;

use dotenv::dotenv;
use log::error;
use tokio::io::{AsyncBufReadExt, BufReader};

use profdux_radiology::client::{
    Attachment, ChatSession, HttpTransport, Lifecycle, Turn, DEFAULT_ENDPOINT, QUICK_PROMPTS,
};
use profdux_radiology::conversation::Role;

fn print_turn(turn: &Turn) {
    let speaker = match turn.message.role {
        Role::User => "you",
        Role::Assistant => "dux",
    };
    let marker = if turn.lifecycle == Lifecycle::Failed { " (failed)" } else { "" };
    println!("{}{}: {}", speaker, marker, turn.message.content);
    if turn.message.role == Role::User {
        if let Some(image) = turn.message.image.as_deref().filter(|image| !image.starts_with("data:")) {
            println!("    image: {}", image);
        }
    }
}

fn print_help() {
    println!("commands: /attach <path>, /prompt <n>, /quit");
    for (i, prompt) in QUICK_PROMPTS.iter().enumerate() {
        println!("  /prompt {}  {}", i + 1, prompt);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));

    let endpoint = env::var("DUX_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
    let transport = HttpTransport::new(endpoint);
    let mut session = ChatSession::default();

    for turn in session.turns() {
        print_turn(turn);
    }
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let seen = session.turns().len();

        if line == "/quit" {
            break;
        } else if line == "/help" {
            print_help();
            continue;
        } else if let Some(path) = line.strip_prefix("/attach ") {
            match Attachment::from_path(path.trim()).await {
                Ok(attachment) => {
                    println!("attached {} ({} bytes)", attachment.file_name, attachment.bytes.len());
                    session.attach(attachment);
                }
                Err(e) => error!("Failed to read {}: {}", path.trim(), e),
            }
            continue;
        } else if let Some(choice) = line.strip_prefix("/prompt ") {
            let prompt = choice
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| QUICK_PROMPTS.get(i));
            match prompt {
                Some(prompt) => {
                    session.select_quick_prompt(&transport, prompt).await;
                }
                None => {
                    print_help();
                    continue;
                }
            }
        } else {
            session.set_input(line);
            session.submit(&transport, line).await;
        }

        for turn in session.turns().iter().skip(seen) {
            print_turn(turn);
        }
    }

    Ok(())
}
