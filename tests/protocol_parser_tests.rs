use ctrlbus::devices::DeviceId;
use ctrlbus::protocol::*;
use proptest::prelude::*;

fn parse_all(parser: &mut CommandParser, input: &[u8]) -> Vec<Command> {
    parser.feed(input).collect()
}

#[test]
fn test_single_command() {
    let mut parser = CommandParser::new();
    assert_eq!(parse_all(&mut parser, b"11,1\n"), vec![Command::new(11, 1)]);
    assert_eq!(parser.get_stats().commands_parsed, 1);
}

#[test]
fn test_byte_by_byte_matches_single_chunk() {
    let input = b"11,1\n9,90\n5,0\n";

    let mut chunked = CommandParser::new();
    let whole = parse_all(&mut chunked, input);

    let mut bytewise = CommandParser::new();
    let mut split = Vec::new();
    for &byte in input.iter() {
        if let Some(command) = bytewise.push(byte) {
            split.push(command);
        }
    }

    assert_eq!(whole, split);
    assert_eq!(whole.len(), 3);
}

#[test]
fn test_partial_line_waits_for_terminator() {
    let mut parser = CommandParser::new();

    assert!(parse_all(&mut parser, b"1").is_empty());
    assert!(parse_all(&mut parser, b"1,").is_empty());
    assert_eq!(parser.state(), ParseState::HaveId(DeviceId(11)));
    assert!(parse_all(&mut parser, b"0").is_empty());
    assert_eq!(parser.pending_token(), "0");
    assert_eq!(parse_all(&mut parser, b"\n"), vec![Command::new(11, 0)]);
}

#[test]
fn test_line_without_delimiter_is_dropped() {
    let mut parser = CommandParser::new();

    assert!(parse_all(&mut parser, b"42\n").is_empty());
    assert_eq!(parser.state(), ParseState::Empty);
    assert_eq!(parser.get_stats().lines_dropped, 1);
}

#[test]
fn test_double_delimiter_is_dropped() {
    let mut parser = CommandParser::new();

    assert!(parse_all(&mut parser, b"3,4,5\n").is_empty());
    assert_eq!(parser.state(), ParseState::Empty);

    // The parser recovers on the next line
    assert_eq!(parse_all(&mut parser, b"3,4\n"), vec![Command::new(3, 4)]);
}

#[test]
fn test_lenient_tokens() {
    let mut parser = CommandParser::new();

    let commands = parse_all(&mut parser, b"abc,1\n5,xyz\n6,12abc\n");
    assert_eq!(
        commands,
        vec![Command::new(0, 1), Command::new(5, 0), Command::new(6, 12)]
    );
}

#[test]
fn test_overflowing_value_discards_line() {
    let mut parser = CommandParser::with_token_limit(10);

    let commands = parse_all(&mut parser, b"5,12345678901234\n5,1\n");
    assert_eq!(commands, vec![Command::new(5, 1)]);
    assert_eq!(parser.get_stats().overflows, 1);
}

#[test]
fn test_token_limit_is_capped() {
    let mut parser = CommandParser::with_token_limit(10_000);
    let long_value = "9".repeat(MAX_TOKEN_LEN + 1);
    let line = format!("5,{}\n", long_value);

    assert!(parse_all(&mut parser, line.as_bytes()).is_empty());
    assert_eq!(parser.get_stats().overflows, 1);
}

#[test]
fn test_maximum_value_fits() {
    let mut parser = CommandParser::new();
    let line = format!("1,{}\n", u32::MAX);
    assert_eq!(parse_all(&mut parser, line.as_bytes()), vec![Command::new(1, u32::MAX)]);
}

fn command_strategy() -> impl Strategy<Value = Command> {
    (any::<u16>(), any::<u32>()).prop_map(|(id, value)| Command::new(id, value))
}

proptest! {
    #[test]
    fn prop_chunking_does_not_change_result(
        commands in prop::collection::vec(command_strategy(), 0..20),
        noise in prop::collection::vec(prop::sample::select(vec![&b"\n"[..], &b"7\n"[..], &b"1,2,3\n"[..], &b",\n"[..]]), 0..5),
        split_points in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let mut input = Vec::new();
        for noise_line in &noise {
            input.extend_from_slice(noise_line);
        }
        for command in &commands {
            input.extend_from_slice(command.to_line().as_bytes());
        }

        let mut reference = CommandParser::new();
        let expected: Vec<Command> = reference.feed(&input).collect();
        prop_assert_eq!(&expected, &commands);

        let mut cuts: Vec<usize> = split_points.iter().map(|i| i.index(input.len() + 1)).collect();
        cuts.sort_unstable();

        let mut parser = CommandParser::new();
        let mut actual = Vec::new();
        let mut start = 0;
        for cut in cuts.into_iter().chain(std::iter::once(input.len())) {
            actual.extend(parser.feed(&input[start..cut]));
            start = cut;
        }

        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_garbage_never_panics(input in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut parser = CommandParser::with_token_limit(16);
        let _ = parser.feed(&input).count();
        prop_assert!(parser.pending_token().len() <= 16);
    }

    #[test]
    fn prop_lenient_parse_matches_digits(value in any::<u32>(), suffix in "[a-z ]{0,4}") {
        let token = format!("{}{}", value, suffix);
        prop_assert_eq!(parse_lenient(&token), value);
    }
}
