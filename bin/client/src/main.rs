//! srpchat interactive terminal client.
//!
//! ```bash
//! srpchat-client 127.0.0.1 8888 alice
//! ```
//!
//! Prompts for the password on stdin, offers registration when the server
//! does not know the username, then drops into the chat loop. Lines starting
//! with `/` are local commands (`/help` lists them).

use std::env;
use std::io::{self, BufRead, Write};
use std::process;
use std::sync::Arc;

use srpchat::client::{format_timestamp, ChatClient, ChatUi};
use srpchat::types::{ChatMessage, User};
use tracing_subscriber::EnvFilter;

const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

const BANNER: &str = r#"
  ___ _ __ _ __   ___| |__   __ _| |_
 / __| '__| '_ \ / __| '_ \ / _` | __|
 \__ \ |  | |_) | (__| | | | (_| | |_
 |___/_|  | .__/ \___|_| |_|\__,_|\__|
          |_|       encrypted chat
"#;

/// ANSI terminal renderer: clears the prompt line before printing so
/// asynchronous messages do not mangle user input.
struct AnsiUi {
    own_username: String,
}

impl AnsiUi {
    fn colour_for(&self, username: &str) -> &'static str {
        if username == self.own_username {
            GREEN
        } else {
            CYAN
        }
    }
}

impl ChatUi for AnsiUi {
    fn render(&self, messages: &[ChatMessage], users: &[User]) {
        println!("{BANNER}");

        let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        println!("Online users: {}", names.join(", "));
        println!("{}", "-".repeat(70));

        let start = messages.len().saturating_sub(20);
        for msg in &messages[start..] {
            println!(
                "[{}] {}{}{}: {}",
                format_timestamp(msg.timestamp),
                self.colour_for(&msg.username),
                msg.username,
                RESET,
                msg.text
            );
        }
        println!("{}", "-".repeat(70));
    }

    fn print_line(&self, line: &str) {
        // clear the pending prompt, print, restore the prompt
        print!("\r{}\r", " ".repeat(80));
        if line.starts_with("***") {
            let colour = if line.contains("joined") { YELLOW } else { RED };
            println!("{colour}{line}{RESET}");
        } else if let Some((prefix, rest)) = line.split_once(": ") {
            // "[HH:MM:SS] username: text"
            match prefix.rsplit_once(' ') {
                Some((time, username)) => println!(
                    "{time} {}{}{}: {rest}",
                    self.colour_for(username),
                    username,
                    RESET
                ),
                None => println!("{line}"),
            }
        } else {
            println!("{RED}{line}{RESET}");
        }
        print!("> ");
        let _ = io::stdout().flush();
    }
}

fn prompt(text: &str) -> String {
    print!("{text}");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
    line.trim_end_matches(['\r', '\n']).to_string()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: {} <host> <port> <username>", args[0]);
        eprintln!("Example: {} 127.0.0.1 8888 alice", args[0]);
        process::exit(1);
    }

    let host = &args[1];
    let port: u16 = match args[2].parse() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("Invalid port: {}", args[2]);
            process::exit(1);
        }
    };
    let username = &args[3];

    let password = prompt("Password: ");

    println!("Connecting to {host}:{port}...");
    let mut confirm = || {
        let answer = prompt("User not found. Register? (y/n): ");
        if !matches!(answer.as_str(), "y" | "Y") {
            return false;
        }
        let confirmation = prompt("Confirm password: ");
        if confirmation != password {
            eprintln!("Passwords do not match");
            return false;
        }
        true
    };

    let mut client = match ChatClient::connect(host, port, username, &password, &mut confirm) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    println!("Authentication successful! Joined the chat");
    println!("\nType /help for commands\n");

    let ui = Arc::new(AnsiUi {
        own_username: username.clone(),
    });
    if let Err(e) = client.start_receive_loop(ui.clone()) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    ui.render(&client.messages(), &client.users());

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            if !client.is_connected() {
                break;
            }
            continue;
        }

        match line {
            "/quit" | "/q" => break,
            "/clear" => {
                client.clear_history();
                ui.render(&client.messages(), &client.users());
            }
            "/help" => {
                println!("\nCommands:");
                println!("  /quit, /q  - Quit the chat");
                println!("  /clear     - Clear message history");
                println!("  /help      - Show this help\n");
            }
            text => {
                if let Err(e) = client.send_message(text) {
                    eprintln!("Error sending message: {e}");
                    break;
                }
            }
        }
    }

    client.disconnect();
}
