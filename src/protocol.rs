//! Relay command parser.
//!
//! The wire protocol has no framing beyond three literals:
//!
//! ```text
//! Keep-alive: \r\n
//! Retrieve:   GET\n\n   -> server streams the stored file, no length prefix
//! Upload:     PUT\n\n   -> server writes every following byte until EOF
//! ```
//!
//! Commands are matched against an accumulated buffer rather than a single
//! `recv()` result, so a command split across TCP segments still matches.

/// Keep-alive line.
pub const KEEP_ALIVE: &[u8] = b"\r\n";
/// Retrieve the stored payload.
pub const GET: &[u8] = b"GET\n\n";
/// Upload a file to the fixed destination.
pub const PUT: &[u8] = b"PUT\n\n";

const LITERALS: [(&[u8], Command); 3] = [
    (KEEP_ALIVE, Command::KeepAlive),
    (GET, Command::Get),
    (PUT, Command::Put),
];

/// Parsed relay command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Bare `\r\n`, ignored.
    KeepAlive,
    /// Send the payload.
    Get,
    /// Receive an upload.
    Put,
    /// Anything else, ignored.
    Unknown,
}

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// Parsed command with bytes consumed.
    Complete(Command, usize),
    /// Buffer is a prefix of a known command; need more data.
    Incomplete,
}

/// Parse one command from the front of the input buffer.
pub fn parse(input: &[u8]) -> ParseResult {
    if input.is_empty() {
        return ParseResult::Incomplete;
    }

    for (literal, command) in LITERALS {
        if input.starts_with(literal) {
            return ParseResult::Complete(command, literal.len());
        }
    }

    if LITERALS
        .iter()
        .any(|(literal, _)| literal.starts_with(input))
    {
        return ParseResult::Incomplete;
    }

    // Drop the unrecognized line so it can't shadow a later command
    let consumed = input
        .iter()
        .position(|&b| b == b'\n')
        .map_or(input.len(), |pos| pos + 1);
    ParseResult::Complete(Command::Unknown, consumed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse(b"\r\n"), ParseResult::Complete(Command::KeepAlive, 2));
        assert_eq!(parse(b"GET\n\n"), ParseResult::Complete(Command::Get, 5));
        assert_eq!(parse(b"PUT\n\n"), ParseResult::Complete(Command::Put, 5));
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(parse(b""), ParseResult::Incomplete);
        assert_eq!(parse(b"\r"), ParseResult::Incomplete);
        assert_eq!(parse(b"GE"), ParseResult::Incomplete);
        assert_eq!(parse(b"PUT\n"), ParseResult::Incomplete);
    }

    #[test]
    fn test_trailing_bytes_left_in_buffer() {
        // Upload data coalesced with the command
        assert_eq!(
            parse(b"PUT\n\nMThd\x00\x00"),
            ParseResult::Complete(Command::Put, 5)
        );
        assert_eq!(
            parse(b"\r\nGET\n\n"),
            ParseResult::Complete(Command::KeepAlive, 2)
        );
    }

    #[test]
    fn test_commands_are_case_sensitive() {
        assert_eq!(parse(b"get\n\n"), ParseResult::Complete(Command::Unknown, 4));
    }

    #[test]
    fn test_unknown_consumes_one_line() {
        let input = b"GET /index.html HTTP/1.1\n\nGET\n\n";
        match parse(input) {
            ParseResult::Complete(Command::Unknown, n) => {
                assert_eq!(n, 25);
                assert_eq!(parse(&input[n..]), ParseResult::Complete(Command::Unknown, 1));
                assert_eq!(parse(&input[n + 1..]), ParseResult::Complete(Command::Get, 5));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_without_newline_consumes_all() {
        assert_eq!(parse(b"hello"), ParseResult::Complete(Command::Unknown, 5));
    }
}
