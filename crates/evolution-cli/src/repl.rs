//! Interactive read-eval loop around the orchestrator.

use crate::console::{self, ConsoleSink, InputCommand};
use anyhow::Context;
use evolution_core::{BackgroundMemoryProcessor, Orchestrator, Session, consume};
use evolution_protocol::SessionId;
use log::{info, warn};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Releases the session store on every exit path.
pub struct SessionCleanup<'a> {
    orchestrator: &'a Orchestrator,
}

impl<'a> SessionCleanup<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }
}

impl Drop for SessionCleanup<'_> {
    fn drop(&mut self) {
        match self.orchestrator.sessions().cleanup() {
            Ok(()) => info!("session store released"),
            Err(err) => warn!("failed to release session store (err={})", err),
        }
    }
}

enum TurnOutcome {
    Completed,
    Interrupted,
}

fn prompt() {
    print!("\nYou: ");
    let _ = std::io::stdout().flush();
}

/// Read prompts until an exit word, EOF or Ctrl-C.
pub async fn run(
    orchestrator: &Orchestrator,
    background: Option<&BackgroundMemoryProcessor>,
    session: &Session,
) -> anyhow::Result<()> {
    print!("{}", console::banner(session.id.as_str(), session.turns.len()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted. Goodbye!");
                return Ok(());
            }
        };
        let Some(line) = line else {
            println!("\nGoodbye!");
            return Ok(());
        };
        match console::parse_input(&line) {
            InputCommand::Exit => {
                println!("Goodbye!");
                return Ok(());
            }
            InputCommand::Empty => {
                println!("Please enter a message or type 'exit' to quit.");
            }
            InputCommand::ListSessions => match orchestrator.sessions().list_sessions() {
                Ok(sessions) => {
                    print!("{}", console::session_listing(session.id.as_str(), &sessions));
                }
                Err(err) => println!("[ERROR] Failed to list sessions: {err}"),
            },
            InputCommand::Message(input) => {
                match run_turn(orchestrator, background, &session.id, input).await {
                    TurnOutcome::Completed => {}
                    TurnOutcome::Interrupted => {
                        println!("\nInterrupted. Goodbye!");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn run_turn(
    orchestrator: &Orchestrator,
    background: Option<&BackgroundMemoryProcessor>,
    session_id: &SessionId,
    input: String,
) -> TurnOutcome {
    println!("\n[AI] Processing your request...");
    println!("{}", console::heavy_rule());

    let mut stream = match orchestrator.run_streamed(session_id, input.clone()) {
        Ok(stream) => stream,
        Err(err) => {
            print_stream_error(&err.to_string());
            return TurnOutcome::Completed;
        }
    };
    let sink = ConsoleSink::stdout();
    let consumed = tokio::select! {
        result = consume(&mut stream.events, &sink) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(consumed) = consumed else {
        stream.abort();
        warn!("turn interrupted (session_id={})", session_id);
        return TurnOutcome::Interrupted;
    };

    match consumed {
        Ok(_) => match stream.finish().await {
            Ok(result) => {
                println!("\n{}", console::heavy_rule());
                if let Some(background) = background {
                    background.dispatch(&input, &result.response);
                }
            }
            Err(err) => print_stream_error(&err.to_string()),
        },
        Err(err) => {
            print_stream_error(&err.to_string());
            if let Err(err) = stream.finish().await {
                info!("turn ended with error (session_id={}, err={})", session_id, err);
            }
        }
    }
    TurnOutcome::Completed
}

fn print_stream_error(message: &str) {
    println!("\n[ERROR] Streaming error occurred: {message}");
    println!("Please check your request and try again.");
}
