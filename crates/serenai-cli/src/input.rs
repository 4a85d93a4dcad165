//! Parsing of lines typed at the prompt.

/// What a line of input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Plain text to send as a chat message.
    Submit(String),
    /// `/typing on|off`
    Typing(bool),
    /// `/reconnect`
    Reconnect,
    /// `/login <token>`
    Login(String),
    /// `/logout`
    Logout,
    /// `/help`
    Help,
    /// `/quit` or `/exit`
    Quit,
    /// A slash command that was not understood, with the reason.
    Invalid(String),
}

/// Help text listing the commands.
pub const HELP: &str = "\
Commands:
  /typing on|off   tell the assistant whether you are typing
  /reconnect       reconnect now with a fresh retry budget
  /login <token>   sign in with a bearer token
  /logout          sign out and clear the conversation
  /quit            leave
Anything else is sent as a message.";

/// Interpret one input line.
///
/// Lines starting with `/` are commands; `//` escapes a message that
/// starts with a slash.
pub fn parse(line: &str) -> InputAction {
    let trimmed = line.trim();
    if let Some(escaped) = trimmed.strip_prefix("//") {
        return InputAction::Submit(format!("/{escaped}"));
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return InputAction::Submit(line.to_string());
    };

    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default();
    let arg = words.next();
    match (name, arg) {
        ("typing", Some("on")) => InputAction::Typing(true),
        ("typing", Some("off")) => InputAction::Typing(false),
        ("typing", _) => InputAction::Invalid("usage: /typing on|off".into()),
        ("reconnect", None) => InputAction::Reconnect,
        ("login", Some(token)) => InputAction::Login(token.to_string()),
        ("login", None) => InputAction::Invalid("usage: /login <token>".into()),
        ("logout", None) => InputAction::Logout,
        ("help", _) => InputAction::Help,
        ("quit" | "exit", _) => InputAction::Quit,
        _ => InputAction::Invalid(format!("unknown command /{name}, try /help")),
    }
}
