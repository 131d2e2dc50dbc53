use crate::devices::DeviceId;
use heapless::String;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use tracing::trace;

pub const MAX_TOKEN_LEN: usize = 32;
pub const DELIMITER: u8 = b',';
pub const TERMINATOR: u8 = b'\n';

// Must hold at least u32::MAX in decimal.
const_assert!(MAX_TOKEN_LEN >= 10);

/// A complete `<deviceId>,<value>` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub device_id: DeviceId,
    pub value: u32,
}

impl Command {
    pub fn new(device_id: u16, value: u32) -> Self {
        Self {
            device_id: DeviceId(device_id),
            value,
        }
    }

    /// Wire form, including the terminator.
    pub fn to_line(&self) -> alloc::string::String {
        alloc::format!("{},{}\n", self.device_id.0, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Empty,
    HaveId(DeviceId),
    /// Token overflowed; bytes are dropped until the next terminator.
    Discarding,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParserStats {
    pub commands_parsed: u32,
    pub lines_dropped: u32,
    pub overflows: u32,
}

/// Byte-at-a-time parser for the `<deviceId>,<value>\n` serial protocol.
///
/// Malformed lines (no delimiter, two delimiters, empty id or value) are
/// dropped without any error reaching the caller. Feeding a line in one
/// chunk or byte by byte gives the same result.
#[derive(Debug)]
pub struct CommandParser {
    state: ParseState,
    token: String<MAX_TOKEN_LEN>,
    max_token_len: usize,
    stats: ParserStats,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::with_token_limit(MAX_TOKEN_LEN)
    }

    /// Caps tokens at `max_token_len` bytes (at most [`MAX_TOKEN_LEN`]).
    pub fn with_token_limit(max_token_len: usize) -> Self {
        Self {
            state: ParseState::Empty,
            token: String::new(),
            max_token_len: max_token_len.clamp(1, MAX_TOKEN_LEN),
            stats: ParserStats::default(),
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<Command> {
        match (byte, self.state) {
            (TERMINATOR, ParseState::Discarding) => {
                self.reset();
                None
            }
            (_, ParseState::Discarding) => None,
            (DELIMITER, ParseState::Empty) if !self.token.is_empty() => {
                let id = parse_lenient(&self.token).min(u32::from(u16::MAX)) as u16;
                self.token.clear();
                self.state = ParseState::HaveId(DeviceId(id));
                None
            }
            (DELIMITER, _) => {
                trace!(state = ?self.state, "dropping line: unexpected delimiter");
                self.drop_line();
                None
            }
            (TERMINATOR, ParseState::HaveId(device_id)) if !self.token.is_empty() => {
                let value = parse_lenient(&self.token);
                self.reset();
                self.stats.commands_parsed += 1;
                Some(Command { device_id, value })
            }
            (TERMINATOR, ParseState::Empty) if self.token.is_empty() => None,
            (TERMINATOR, _) => {
                trace!(state = ?self.state, "dropping incomplete line");
                self.drop_line();
                None
            }
            (byte, _) => {
                let fits = self.token.len() < self.max_token_len;
                if !fits || self.token.push(char::from(byte)).is_err() {
                    trace!("token overflow, discarding rest of line");
                    self.token.clear();
                    self.state = ParseState::Discarding;
                    self.stats.overflows += 1;
                    self.stats.lines_dropped += 1;
                }
                None
            }
        }
    }

    /// Feeds a chunk of input, yielding every command it completes.
    pub fn feed<'a>(&'a mut self, bytes: &'a [u8]) -> impl Iterator<Item = Command> + 'a {
        bytes.iter().filter_map(move |&b| self.push(b))
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn pending_token(&self) -> &str {
        &self.token
    }

    pub fn get_stats(&self) -> &ParserStats {
        &self.stats
    }

    fn drop_line(&mut self) {
        self.stats.lines_dropped += 1;
        self.reset();
    }

    fn reset(&mut self) {
        self.token.clear();
        self.state = ParseState::Empty;
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Leading-digits integer parse, `atol` style without sign handling.
///
/// Leading whitespace is skipped, parsing stops at the first non-digit, no
/// digits at all yields `0`, and overflow saturates.
pub fn parse_lenient(token: &str) -> u32 {
    token
        .trim_start()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |acc, d| {
            acc.saturating_mul(10).saturating_add(u32::from(d - b'0'))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut CommandParser, input: &[u8]) -> alloc::vec::Vec<Command> {
        parser.feed(input).collect()
    }

    #[test]
    fn test_parser_initial_state() {
        let parser = CommandParser::new();
        assert_eq!(parser.state(), ParseState::Empty);
        assert_eq!(parser.pending_token(), "");
    }

    #[test]
    fn test_state_transitions() {
        let mut parser = CommandParser::new();

        assert_eq!(parser.push(b'9'), None);
        assert_eq!(parser.state(), ParseState::Empty);
        assert_eq!(parser.push(b','), None);
        assert_eq!(parser.state(), ParseState::HaveId(DeviceId(9)));
        assert_eq!(parser.push(b'9'), None);
        assert_eq!(parser.push(b'0'), None);
        assert_eq!(parser.push(b'\n'), Some(Command::new(9, 90)));
        assert_eq!(parser.state(), ParseState::Empty);
    }

    #[test]
    fn test_lenient_integers() {
        assert_eq!(parse_lenient("42"), 42);
        assert_eq!(parse_lenient(""), 0);
        assert_eq!(parse_lenient("abc"), 0);
        assert_eq!(parse_lenient("12x"), 12);
        assert_eq!(parse_lenient(" 7"), 7);
        assert_eq!(parse_lenient("-5"), 0);
        assert_eq!(parse_lenient("99999999999"), u32::MAX);
    }

    #[test]
    fn test_carriage_return_is_tolerated() {
        let mut parser = CommandParser::new();
        assert_eq!(collect(&mut parser, b"5,1\r\n"), vec![Command::new(5, 1)]);
    }

    #[test]
    fn test_empty_value_is_dropped() {
        let mut parser = CommandParser::new();
        assert!(collect(&mut parser, b"5,\n").is_empty());
        assert_eq!(parser.get_stats().lines_dropped, 1);
    }

    #[test]
    fn test_leading_delimiter_is_dropped() {
        let mut parser = CommandParser::new();
        assert!(collect(&mut parser, b",5\n").is_empty());
        assert_eq!(parser.state(), ParseState::Empty);
    }

    #[test]
    fn test_blank_line_is_not_counted() {
        let mut parser = CommandParser::new();
        assert!(collect(&mut parser, b"\n\n").is_empty());
        assert_eq!(parser.get_stats().lines_dropped, 0);
    }

    #[test]
    fn test_overflow_discards_whole_line() {
        let mut parser = CommandParser::with_token_limit(4);
        let cmds = collect(&mut parser, b"123456789,5\n7,1\n");

        assert_eq!(cmds, vec![Command::new(7, 1)]);
        assert_eq!(parser.get_stats().overflows, 1);
        assert_eq!(parser.get_stats().lines_dropped, 1);
    }

    #[test]
    fn test_id_saturates_to_u16() {
        let mut parser = CommandParser::new();
        let cmds = collect(&mut parser, b"70000,1\n");
        assert_eq!(cmds, vec![Command::new(u16::MAX, 1)]);
    }

    #[test]
    fn test_command_to_line() {
        assert_eq!(Command::new(11, 1).to_line(), "11,1\n");
    }
}
