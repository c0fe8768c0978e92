//! Line commands for the console front end.
//!
//! One command per line, case-insensitive keyword, whitespace separated:
//!
//! | Input          | Command                         |
//! |----------------|---------------------------------|
//! | `start`        | [`Command::Start`]              |
//! | `stop`         | [`Command::Stop`]               |
//! | `rate <hz>`    | [`Command::SetUpdateRate`]      |
//! | `history <n>`  | [`Command::SetHistoryLength`]   |
//! | `status`       | [`Command::Status`]             |
//! | `help` / `?`   | [`Command::Help`]               |
//! | `quit` / `q`   | [`Command::Quit`]               |
//!
//! ```
//! use audio_jack_streamer::console::Command;
//!
//! assert_eq!("rate 25".parse::<Command>(), Ok(Command::SetUpdateRate(25.0)));
//! assert_eq!("HISTORY 8000".parse::<Command>(), Ok(Command::SetHistoryLength(8_000)));
//! assert!("rate fast".parse::<Command>().is_err());
//! ```

use std::str::FromStr;

use thiserror::Error;

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Stop,
    SetUpdateRate(f64),
    SetHistoryLength(usize),
    Status,
    Help,
    Quit,
}

/// Why a line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?} (try `help`)")]
    Unknown(String),

    #[error("`{0}` expects one argument")]
    MissingArgument(&'static str),

    #[error("`{command}` got an invalid argument {value:?}")]
    InvalidArgument { command: &'static str, value: String },
}

impl Command {
    pub const HELP: &'static str = "commands: start | stop | rate <hz> | history <samples> | status | help | quit";
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let keyword = words.next().ok_or(ParseCommandError::Empty)?;
        let argument = words.next();
        if words.next().is_some() {
            return Err(ParseCommandError::Unknown(line.trim().to_string()));
        }

        let no_argument = |command: Command| match argument {
            None => Ok(command),
            Some(_) => Err(ParseCommandError::Unknown(line.trim().to_string())),
        };

        match keyword.to_ascii_lowercase().as_str() {
            "start" => no_argument(Command::Start),
            "stop" => no_argument(Command::Stop),
            "status" => no_argument(Command::Status),
            "help" | "?" => no_argument(Command::Help),
            "quit" | "exit" | "q" => no_argument(Command::Quit),
            "rate" => {
                let value = argument.ok_or(ParseCommandError::MissingArgument("rate"))?;
                value
                    .parse::<f64>()
                    .map(Command::SetUpdateRate)
                    .map_err(|_| ParseCommandError::InvalidArgument {
                        command: "rate",
                        value: value.to_string(),
                    })
            }
            "history" => {
                let value = argument.ok_or(ParseCommandError::MissingArgument("history"))?;
                value
                    .parse::<usize>()
                    .map(Command::SetHistoryLength)
                    .map_err(|_| ParseCommandError::InvalidArgument {
                        command: "history",
                        value: value.to_string(),
                    })
            }
            _ => Err(ParseCommandError::Unknown(keyword.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
