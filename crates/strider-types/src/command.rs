//! Motor command codes and their display strings.
//!
//! The integer codes and both string tables are consumed by external tooling
//! that parses supervisor logs, so they must not change.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A command the robot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Command {
    NoOp,
    Forward,
    Left,
    Right,
    Blink,
    AdjustLeft,
    AdjustRight,
    Song,
}

impl Command {
    /// Commands the selector may choose between (codes 1 through 6).
    pub const SELECTABLE: [Command; 6] = [
        Command::Forward,
        Command::Left,
        Command::Right,
        Command::Blink,
        Command::AdjustLeft,
        Command::AdjustRight,
    ];

    /// Wire code of this command.
    pub fn code(self) -> i32 {
        match self {
            Command::NoOp => 0,
            Command::Forward => 1,
            Command::Left => 2,
            Command::Right => 3,
            Command::Blink => 4,
            Command::AdjustLeft => 5,
            Command::AdjustRight => 6,
            Command::Song => 7,
        }
    }

    /// Decode a wire code.  Returns `None` for unknown codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Command::NoOp),
            1 => Some(Command::Forward),
            2 => Some(Command::Left),
            3 => Some(Command::Right),
            4 => Some(Command::Blink),
            5 => Some(Command::AdjustLeft),
            6 => Some(Command::AdjustRight),
            7 => Some(Command::Song),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(interpret_command_short(self.code()))
    }
}

/// Human-readable name of a command code.
pub fn interpret_command(code: i32) -> &'static str {
    match code {
        0 => "no operation",
        1 => "forward",
        2 => "left",
        3 => "right",
        4 => "blink",
        5 => "adjust left",
        6 => "adjust right",
        7 => "song",
        _ => "invalid command",
    }
}

/// Two-letter abbreviation of a command code.
pub fn interpret_command_short(code: i32) -> &'static str {
    match code {
        0 => "NO",
        1 => "FW",
        2 => "LT",
        3 => "RT",
        4 => "BL",
        5 => "AL",
        6 => "AR",
        7 => "SN",
        _ => "??",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip_through_from_code() {
        for code in 0..=7 {
            let cmd = Command::from_code(code).expect("known code");
            assert_eq!(cmd.code(), code);
        }
        assert_eq!(Command::from_code(8), None);
        assert_eq!(Command::from_code(-1), None);
    }

    #[test]
    fn interpret_tables_are_exact() {
        assert_eq!(interpret_command(0), "no operation");
        assert_eq!(interpret_command(1), "forward");
        assert_eq!(interpret_command(5), "adjust left");
        assert_eq!(interpret_command(42), "invalid command");
        assert_eq!(interpret_command_short(3), "RT");
        assert_eq!(interpret_command_short(7), "SN");
        assert_eq!(interpret_command_short(-9), "??");
    }

    #[test]
    fn selectable_excludes_noop_and_song() {
        assert!(!Command::SELECTABLE.contains(&Command::NoOp));
        assert!(!Command::SELECTABLE.contains(&Command::Song));
        assert_eq!(Command::SELECTABLE.len(), 6);
    }

    #[test]
    fn display_uses_short_form() {
        assert_eq!(Command::AdjustRight.to_string(), "AR");
    }
}
