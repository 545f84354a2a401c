//! Line command parsing.

use crate::error::CommandError;

/// One line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `:connect [target]`. The target is kept untrimmed so the session
    /// can log exactly what was typed.
    Connect(Option<String>),
    Disconnect,
    Fetch,
    Commit,
    Rollback,
    Help,
    Quit,
    /// Anything that is not a `:` command.
    Sql(String),
    /// Blank line.
    Empty,
}

impl Command {
    /// Parse one input line. Only the line terminator is stripped from a
    /// `:connect` argument; any other surrounding whitespace is kept.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Command::Empty);
        }
        let Some(rest) = line.trim_start().strip_prefix(':') else {
            return Ok(Command::Sql(trimmed.to_string()));
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, Some(argument)),
            None => (rest, None),
        };
        let bare = |command: &'static str, parsed: Command| match argument {
            Some(arg) if !arg.trim().is_empty() => Err(CommandError::UnexpectedArgument { command }),
            _ => Ok(parsed),
        };

        match name {
            "connect" | "c" => Ok(Command::Connect(
                argument
                    .filter(|arg| !arg.trim().is_empty())
                    .map(str::to_string),
            )),
            "disconnect" | "d" => bare("disconnect", Command::Disconnect),
            "fetch" | "f" => bare("fetch", Command::Fetch),
            "commit" => bare("commit", Command::Commit),
            "rollback" => bare("rollback", Command::Rollback),
            "help" | "h" => bare("help", Command::Help),
            "quit" | "q" | "exit" => bare("quit", Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

pub const HELP: &str = "\
:connect [target]  open a database file, or :memory: (default target if omitted)
:disconnect        close the connection
:fetch             load the next batch of rows
:commit            commit the open transaction
:rollback          roll back the open transaction
:quit              leave
anything else      run as SQL";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  ").unwrap(), Command::Empty);
        assert_eq!(Command::parse(":fetch").unwrap(), Command::Fetch);
        assert_eq!(Command::parse(":f").unwrap(), Command::Fetch);
        assert_eq!(Command::parse(":commit").unwrap(), Command::Commit);
        assert_eq!(Command::parse(":rollback").unwrap(), Command::Rollback);
        assert_eq!(Command::parse(":q").unwrap(), Command::Quit);
        assert_eq!(Command::parse(":disconnect").unwrap(), Command::Disconnect);
    }

    #[test]
    fn test_parse_connect_keeps_raw_target() {
        assert_eq!(Command::parse(":connect").unwrap(), Command::Connect(None));
        assert_eq!(
            Command::parse(":connect  data.db").unwrap(),
            Command::Connect(Some(" data.db".to_string()))
        );
        assert_eq!(
            Command::parse("  :connect  data.db  \n").unwrap(),
            Command::Connect(Some(" data.db  ".to_string()))
        );
        assert_eq!(Command::parse(":connect   \r\n").unwrap(), Command::Connect(None));
        assert_eq!(Command::parse(":fetch \n").unwrap(), Command::Fetch);
    }

    #[test]
    fn test_parse_sql() {
        assert_eq!(
            Command::parse(" SELECT 1 ").unwrap(),
            Command::Sql("SELECT 1".to_string())
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Command::parse(":frobnicate").unwrap_err(),
            CommandError::Unknown("frobnicate".to_string())
        );
        assert_eq!(
            Command::parse(":commit now").unwrap_err(),
            CommandError::UnexpectedArgument { command: "commit" }
        );
    }
}
