//! Client input management with sequencing
//!
//! Input arrives as text lines (one command per line) and is turned into
//! sequenced [`InputEvent`]s for the predictor.

use shared::{Command, Direction, MAX_HEALTH};

/// A single user action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Goes through the predictor and the shared rules
    Game(Command),
    /// Debug health override; sent straight to the server
    SetHealth(u8),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub sequence: u32,
    pub command: ClientCommand,
}

/// Turns text lines into sequenced commands
pub struct InputManager {
    next_sequence: u32,
}

impl InputManager {
    pub fn new() -> Self {
        Self { next_sequence: 1 }
    }

    /// Parses one line. Blank or unrecognised lines yield `None` and do not
    /// consume a sequence number.
    pub fn parse_line(&mut self, line: &str) -> Option<InputEvent> {
        let command = Self::parse_command(line)?;
        let event = InputEvent {
            sequence: self.next_sequence,
            command,
        };
        self.next_sequence += 1;
        Some(event)
    }

    fn parse_command(line: &str) -> Option<ClientCommand> {
        let line = line.trim().to_ascii_lowercase();
        let mut words = line.split_whitespace();
        let head = words.next()?;

        let command = match head {
            "dash" | "e" => ClientCommand::Game(Command::Dash(Direction::parse(words.next()?)?)),
            "heal" | "q" => ClientCommand::Game(Command::CastHeal),
            "hp" => {
                let value: u8 = words.next()?.parse().ok()?;
                ClientCommand::SetHealth(value.min(MAX_HEALTH))
            }
            "quit" | "exit" => ClientCommand::Quit,
            other => ClientCommand::Game(Command::Move(Direction::parse(other)?)),
        };

        if words.next().is_some() {
            return None;
        }
        Some(command)
    }

    pub fn help() -> &'static str {
        "w/a/s/d or up/down/left/right to move, dash <dir>, heal, hp <0-3>, quit"
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_manager_creation() {
        let input_manager = InputManager::new();
        assert_eq!(input_manager.next_sequence, 1);
    }

    #[test]
    fn test_movement_keys_and_words() {
        let mut input = InputManager::new();
        let expect = |dir| Some(ClientCommand::Game(Command::Move(dir)));

        assert_eq!(input.parse_line("w").map(|e| e.command), expect(Direction::Up));
        assert_eq!(input.parse_line("A").map(|e| e.command), expect(Direction::Left));
        assert_eq!(input.parse_line(" down ").map(|e| e.command), expect(Direction::Down));
        assert_eq!(input.parse_line("right").map(|e| e.command), expect(Direction::Right));
    }

    #[test]
    fn test_ability_commands() {
        let mut input = InputManager::new();
        assert_eq!(
            input.parse_line("dash left").map(|e| e.command),
            Some(ClientCommand::Game(Command::Dash(Direction::Left)))
        );
        assert_eq!(
            input.parse_line("heal").map(|e| e.command),
            Some(ClientCommand::Game(Command::CastHeal))
        );
        assert_eq!(
            input.parse_line("hp 9").map(|e| e.command),
            Some(ClientCommand::SetHealth(MAX_HEALTH))
        );
        assert_eq!(input.parse_line("quit").map(|e| e.command), Some(ClientCommand::Quit));
    }

    #[test]
    fn test_rejects_garbage_without_consuming_sequence() {
        let mut input = InputManager::new();
        assert!(input.parse_line("").is_none());
        assert!(input.parse_line("jump").is_none());
        assert!(input.parse_line("dash").is_none());
        assert!(input.parse_line("dash sideways").is_none());
        assert!(input.parse_line("hp lots").is_none());
        assert!(input.parse_line("w w").is_none());

        assert_eq!(input.parse_line("s").map(|e| e.sequence), Some(1));
        assert_eq!(input.parse_line("s").map(|e| e.sequence), Some(2));
    }
}
