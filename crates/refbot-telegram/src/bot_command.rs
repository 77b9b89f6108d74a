//! Stateless command parsing and reply rendering. Each inbound command maps
//! 1:1 to one engine call; malformed commands are rejected here and never
//! reach the engine.

use refbot_engine::{AddResult, FillResult};

const ADD_USAGE: &str = "usage: /add_references <doi> [doi...]";
const FILL_USAGE: &str = "usage: /fill_incomplete_references (no arguments)";

const HELP_TEXT: &str = "\
I keep the reference database tidy.

/add_references <doi> [doi...] - add references by DOI (metadata is filled later)
/fill_incomplete_references - fetch metadata for all references that have a DOI but no title
/help - show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `BotCommand` values.
pub enum BotCommand {
    AddReferences { dois: Vec<String> },
    FillIncomplete,
    Start,
    Help,
    Invalid { message: String },
    Unknown,
}

/// Parses one inbound message. A `@botname` suffix on the command token is
/// stripped before matching, as Telegram appends it in group chats.
pub fn parse_bot_command(text: &str) -> BotCommand {
    let mut parts = text.split_whitespace();
    let Some(head) = parts.next() else {
        return BotCommand::Unknown;
    };
    if !head.starts_with('/') {
        return BotCommand::Unknown;
    }
    let command = head.trim_start_matches('/');
    let command = command.split('@').next().unwrap_or(command);
    let args = parts.map(str::to_string).collect::<Vec<_>>();

    match command {
        "add_references" | "add" => {
            if args.is_empty() {
                BotCommand::Invalid {
                    message: ADD_USAGE.to_string(),
                }
            } else {
                BotCommand::AddReferences { dois: args }
            }
        }
        "fill_incomplete_references" | "fill" => {
            if args.is_empty() {
                BotCommand::FillIncomplete
            } else {
                BotCommand::Invalid {
                    message: FILL_USAGE.to_string(),
                }
            }
        }
        "start" => BotCommand::Start,
        "help" => BotCommand::Help,
        _ => BotCommand::Unknown,
    }
}

pub fn help_text() -> &'static str {
    HELP_TEXT
}

fn push_section(lines: &mut Vec<String>, label: &str, dois: &[String]) {
    if dois.is_empty() {
        return;
    }
    lines.push(format!("{label}:"));
    for doi in dois {
        lines.push(format!("* {doi}"));
    }
}

fn push_failed_section(lines: &mut Vec<String>, failed: &[refbot_engine::FailedReference]) {
    if failed.is_empty() {
        return;
    }
    lines.push("failed:".to_string());
    for failure in failed {
        lines.push(format!("* {} ({})", failure.doi, failure.reason));
    }
}

/// One line per DOI, grouped by outcome category.
pub fn render_add_result(result: &AddResult) -> String {
    if result.is_empty() {
        return "nothing to add.".to_string();
    }
    let mut lines = Vec::new();
    push_section(&mut lines, "created", &result.created);
    push_section(&mut lines, "already existed", &result.already_existed);
    push_failed_section(&mut lines, &result.failed);
    lines.join("\n")
}

pub fn render_fill_result(result: &FillResult) -> String {
    if result.is_empty() {
        return "no incomplete references to fill.".to_string();
    }
    let mut lines = Vec::new();
    push_section(&mut lines, "filled", &result.filled);
    push_section(&mut lines, "unresolved", &result.unresolved);
    push_failed_section(&mut lines, &result.failed);
    lines.join("\n")
}
