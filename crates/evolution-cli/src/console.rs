//! Terminal rendering for the interactive loop.

use evolution_core::SessionSummary;
use evolution_protocol::{ChannelEvent, ChannelSink};
use log::debug;
use parking_lot::Mutex;
use std::io::{self, Write};

const GRAY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";
const RULE_WIDTH: usize = 60;

const EXIT_WORDS: [&str; 4] = ["exit", "quit", "bye", "q"];

/// What a line typed at the prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Exit,
    Empty,
    ListSessions,
    Message(String),
}

/// Classify a prompt line. Exit words match case-insensitively.
pub fn parse_input(line: &str) -> InputCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InputCommand::Empty;
    }
    let lowered = trimmed.to_lowercase();
    if EXIT_WORDS.contains(&lowered.as_str()) {
        return InputCommand::Exit;
    }
    if lowered == "/sessions" {
        return InputCommand::ListSessions;
    }
    InputCommand::Message(trimmed.to_string())
}

pub fn heavy_rule() -> String {
    "=".repeat(RULE_WIDTH)
}

pub fn light_rule() -> String {
    "-".repeat(RULE_WIDTH)
}

pub fn banner(session_id: &str, prior_turns: usize) -> String {
    let mut text = format!(
        "{rule}\nEvolution Agent\n{rule}\nType 'exit', 'quit', 'bye' or 'q' to end the conversation.\n\
         Type '/sessions' to list stored sessions.\n\nSession: {session_id}\n",
        rule = heavy_rule()
    );
    if prior_turns > 0 {
        text.push_str(&format!("Resumed with {prior_turns} previous turns.\n"));
    }
    text
}

/// Itemized report printed when required settings are absent.
pub fn missing_env_report(missing: &[String]) -> String {
    let mut text = String::from("Missing required environment variables:\n");
    for name in missing {
        text.push_str(&format!("  - {name}\n"));
    }
    text.push_str("Set them in your shell or in a .env file and try again.\n");
    text
}

pub fn session_listing(current: &str, sessions: &[SessionSummary]) -> String {
    if sessions.is_empty() {
        return "No stored sessions.\n".to_string();
    }
    let mut text = String::new();
    for summary in sessions {
        let marker = if summary.id.as_str() == current { "*" } else { " " };
        text.push_str(&format!(
            "{marker} {} (turns={}, updated={})\n",
            summary.id,
            summary.turn_count,
            summary.updated_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    text
}

/// Writes classified channel events as they arrive.
///
/// Reasoning is printed in gray under a `[REASONING]` header; the answer
/// follows under `[RESPONSE]`.
pub struct ConsoleSink<W> {
    out: Mutex<W>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

fn render(event: &ChannelEvent) -> String {
    match event {
        ChannelEvent::ReasoningOpened => {
            format!("\n{GRAY}[REASONING] Reasoning Process:\n{}\n", light_rule())
        }
        ChannelEvent::Reasoning(text) => text.clone(),
        ChannelEvent::ReasoningClosed => format!("{RESET}\n"),
        ChannelEvent::ResponseOpened => format!(
            "{RESET}\n{}\n[RESPONSE] Agent Response:\n{}\n",
            heavy_rule(),
            light_rule()
        ),
        ChannelEvent::Response(text) => text.clone(),
    }
}

impl<W: Write + Send> ChannelSink for ConsoleSink<W> {
    fn emit(&self, event: ChannelEvent) {
        let mut out = self.out.lock();
        let result = out
            .write_all(render(&event).as_bytes())
            .and_then(|()| out.flush());
        if let Err(err) = result {
            debug!("failed to write channel event (err={})", err);
        }
    }
}
