//! Line commands understood by the interactive prompt.

use std::path::PathBuf;

pub const HELP: &str = "\
Type a question to ask it, or one of:
  /send                      send the pending input
  /followup N                put suggestion N of the last answer into the input
  /image PATH                ask about an image
  /upload PATH...            upload local files
  /url TEXT                  ingest a URL
  /cloud FILE_ID TOKEN NAME  import a cloud-picked document
  /remove ID                 remove an upload (id prefix)
  /uploads                   list uploads
  /template [TEXT]           set the prompt template (empty restores the default)
  /lang CODE                 switch language
  /listen                    start or stop dictation
  /speak ID                  read a message aloud, or stop reading
  /cancel                    stop the answer being revealed
  /quit                      exit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Send,
    Followup(usize),
    Image(PathBuf),
    Upload(Vec<PathBuf>),
    Url(String),
    Cloud {
        file_id: String,
        token: String,
        name: String,
    },
    Remove(String),
    Uploads,
    Template(String),
    Lang(String),
    Listen,
    Speak(u64),
    Cancel,
    Help,
    Quit,
    Empty,
    /// Malformed command; carries the usage line.
    Invalid(&'static str),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Ask(line.to_string());
    };
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        "send" => Command::Send,
        "followup" => match args.parse::<usize>() {
            Ok(n) if n > 0 => Command::Followup(n),
            _ => Command::Invalid("/followup N"),
        },
        "image" if !args.is_empty() => Command::Image(PathBuf::from(args)),
        "image" => Command::Invalid("/image PATH"),
        "upload" if !args.is_empty() => {
            Command::Upload(args.split_whitespace().map(PathBuf::from).collect())
        }
        "upload" => Command::Invalid("/upload PATH..."),
        "url" => Command::Url(args.to_string()),
        "cloud" => {
            let mut parts = args.splitn(3, char::is_whitespace);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(file_id), Some(token), Some(name))
                    if !file_id.is_empty() && !name.trim().is_empty() =>
                {
                    Command::Cloud {
                        file_id: file_id.to_string(),
                        token: token.to_string(),
                        name: name.trim().to_string(),
                    }
                }
                _ => Command::Invalid("/cloud FILE_ID TOKEN NAME"),
            }
        }
        "remove" if !args.is_empty() => Command::Remove(args.to_string()),
        "remove" => Command::Invalid("/remove ID"),
        "uploads" => Command::Uploads,
        "template" => Command::Template(args.to_string()),
        "lang" if !args.is_empty() => Command::Lang(args.to_string()),
        "lang" => Command::Invalid("/lang CODE"),
        "listen" => Command::Listen,
        "speak" => match args.parse::<u64>() {
            Ok(id) => Command::Speak(id),
            Err(_) => Command::Invalid("/speak ID"),
        },
        "cancel" => Command::Cancel,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Invalid("/help lists the commands"),
    }
}
