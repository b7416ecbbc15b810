pub const HELP_TEXT: &str = "\
Commands:
  /help          show this help
  /clear         forget the conversation history
  /allow <dir>   let the agent's tools access <dir>
  /history       summarize the conversation history
  /quit          exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    Allow(Option<String>),
    History,
    Quit,
    Unknown(String),
}

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };

    let parsed = match command {
        "/help" => SlashCommand::Help,
        "/clear" => SlashCommand::Clear,
        "/allow" => SlashCommand::Allow((!rest.is_empty()).then(|| rest.to_string())),
        "/history" => SlashCommand::History,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}
