//! Typed-line parsing
//!
//! Lines starting with `:` drive the client itself (`:connect`,
//! `:quit`, ...). Everything else is a command for the server. A leading
//! `::` escapes the prefix and sends the rest starting with a single `:`.

/// Prefix for client-local commands
pub const LOCAL_PREFIX: char = ':';

/// A typed line, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Text to send to the server (line ending not yet applied)
    Remote(String),
    /// A command for the client itself
    Local(LocalCommand),
}

/// Client-local commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    /// Open a new session (the landing screen's connect action)
    Connect,
    /// Close the current session
    Disconnect,
    /// Resubmit input retained after a failed send
    Retry,
    /// Show connection status
    Status,
    /// Show available local commands
    Help,
    /// Disconnect and exit
    Quit,
}

/// Error parsing a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing was typed
    Empty,
    /// `:name` that is not a known local command
    UnknownCommand(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty input"),
            ParseError::UnknownCommand(name) => {
                write!(f, "unknown command ':{}' (try :help)", name)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Help text listing local commands
pub const HELP: &str = "\
:connect     connect to the server
:disconnect  close the connection
:retry       resend the last command that failed to send
:status      show connection status
:quit        disconnect and exit
::text       send ':text' to the server";

/// Classify a typed line
///
/// # Examples
///
/// ```ignore
/// assert_eq!(parse_line("ls -la"), Ok(Line::Remote("ls -la".into())));
/// assert_eq!(parse_line(":quit"), Ok(Line::Local(LocalCommand::Quit)));
/// assert_eq!(parse_line("::q"), Ok(Line::Remote(":q".into())));
/// ```
pub fn parse_line(input: &str) -> Result<Line, ParseError> {
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let Some(rest) = input.strip_prefix(LOCAL_PREFIX) else {
        return Ok(Line::Remote(input.to_string()));
    };

    if rest.starts_with(LOCAL_PREFIX) {
        return Ok(Line::Remote(rest.to_string()));
    }

    let name = rest.trim().to_lowercase();
    let command = match name.as_str() {
        "connect" | "c" => LocalCommand::Connect,
        "disconnect" | "d" => LocalCommand::Disconnect,
        "retry" | "r" => LocalCommand::Retry,
        "status" | "s" => LocalCommand::Status,
        "help" | "h" | "?" => LocalCommand::Help,
        "quit" | "q" | "exit" => LocalCommand::Quit,
        _ => return Err(ParseError::UnknownCommand(name)),
    };

    Ok(Line::Local(command))
}
