use medchat::Chat;
use std::path::PathBuf;

pub const HELP: &str = "\
Commands:
  <text>            send a message in the active chat
  /new              start a new chat
  /chats            show the chat list
  /open <n|id>      open a chat by list number or id
  /delete <n|id>    delete a chat
  /upload <path>    upload a medical report image
  /refresh          reload the chat list from the server
  /dismiss          hide the error banner
  /help             show this help
  /quit             exit
";

pub const DELETE_PROMPT: &str = "Are you sure you want to delete this chat? [y/N] ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    Chats,
    Open(String),
    Delete(String),
    Upload(PathBuf),
    Refresh,
    Dismiss,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MissingArgument(&'static str),
    Unknown(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingArgument(usage) => write!(f, "usage: {}", usage),
            ParseError::Unknown(name) => write!(f, "unknown command /{} (try /help)", name),
        }
    }
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Result<Command, ParseError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Ok(Command::Send(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "new" => Ok(Command::New),
        "chats" | "ls" => Ok(Command::Chats),
        "open" => required(arg, "/open <n|id>").map(Command::Open),
        "delete" | "rm" => required(arg, "/delete <n|id>").map(Command::Delete),
        "upload" => required(arg, "/upload <path>").map(|path| Command::Upload(path.into())),
        "refresh" => Ok(Command::Refresh),
        "dismiss" => Ok(Command::Dismiss),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    };
    Some(command)
}

fn required(arg: &str, usage: &'static str) -> Result<String, ParseError> {
    if arg.is_empty() {
        Err(ParseError::MissingArgument(usage))
    } else {
        Ok(arg.to_string())
    }
}

/// Resolve a 1-based list number or a literal chat id against the sidebar.
pub fn resolve_chat<'a>(target: &str, chats: &'a [Chat]) -> Option<&'a Chat> {
    if let Ok(index) = target.parse::<usize>() {
        if let Some(chat) = index.checked_sub(1).and_then(|i| chats.get(i)) {
            return Some(chat);
        }
    }
    chats.iter().find(|chat| chat.id == target)
}

pub fn is_confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
