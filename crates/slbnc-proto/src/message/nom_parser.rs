//! Nom-based IRC message parser.
//!
//! Produces borrowed slices into the input line; [`super::parse`] turns them
//! into an owned [`Message`](super::Message).

use nom::{
    bytes::complete::{take_until, take_while1},
    character::complete::{char, space0, space1},
    combinator::opt,
    error::ErrorKind,
    sequence::{preceded, terminated},
    IResult,
};
use smallvec::SmallVec;

/// Maximum number of parameters a message may carry.
pub(crate) const MAX_PARAMS: usize = 15;

/// Parse IRCv3 message tags (the part after `@` and before the first space).
fn parse_tags(input: &str) -> IResult<&str, &str> {
    terminated(preceded(char('@'), take_until(" ")), space1)(input)
}

/// Parse message prefix (the part after `:` and before the first space).
fn parse_prefix(input: &str) -> IResult<&str, &str> {
    terminated(preceded(char(':'), take_while1(|c| c != ' ')), space1)(input)
}

/// Parse the command name (1*letter or 3digit).
fn parse_command(input: &str) -> IResult<&str, &str> {
    let (rest, cmd) = take_while1(|c: char| c.is_ascii_alphanumeric())(input)?;

    let is_all_letters = cmd.chars().all(|c| c.is_ascii_alphabetic());
    let is_three_digits = cmd.len() == 3 && cmd.chars().all(|c| c.is_ascii_digit());

    if is_all_letters || is_three_digits {
        Ok((rest, cmd))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::AlphaNumeric,
        )))
    }
}

/// Split the parameter section.
///
/// Consecutive spaces count as one separator. Once fourteen middle
/// parameters have been read the remainder is the final parameter, with or
/// without a leading `:`.
fn parse_params(input: &str) -> SmallVec<[&str; MAX_PARAMS]> {
    let mut params: SmallVec<[&str; MAX_PARAMS]> = SmallVec::new();
    let mut rest = input.trim_end_matches(['\r', '\n']);

    loop {
        let trimmed = rest.trim_start_matches(' ');
        if trimmed.len() == rest.len() {
            // end of input, or no separator before the next token
            break;
        }
        rest = trimmed;
        if rest.is_empty() {
            break;
        }

        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            break;
        }

        if params.len() == MAX_PARAMS - 1 {
            params.push(rest);
            break;
        }

        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    params
}

/// A parsed IRC message with borrowed string slices.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedMessage<'a> {
    /// Raw tags string (without the leading `@`), if present.
    pub tags: Option<&'a str>,
    /// Raw prefix string (without the leading `:`), if present.
    pub prefix: Option<&'a str>,
    /// The command name.
    pub command: &'a str,
    /// Command parameters, including trailing.
    pub params: SmallVec<[&'a str; MAX_PARAMS]>,
}

/// Parse a complete IRC message into its components.
///
/// ```text
/// [@tags] [:prefix] <command> [params...] [:trailing]
/// ```
pub(crate) fn parse_message(input: &str) -> IResult<&str, ParsedMessage<'_>> {
    let (input, _) = space0(input)?;
    let (input, tags) = opt(parse_tags)(input)?;
    let (input, prefix) = opt(parse_prefix)(input)?;
    let (rest, command) = parse_command(input)?;
    let params = parse_params(rest);

    Ok((
        "",
        ParsedMessage {
            tags,
            prefix,
            command,
            params,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ParsedMessage<'_> {
        parse_message(input).map(|(_, m)| m).unwrap()
    }

    #[test]
    fn test_parse_full() {
        let msg = parse("@a=b;c :nick!u@h PRIVMSG #chan :hello world\r\n");
        assert_eq!(msg.tags, Some("a=b;c"));
        assert_eq!(msg.prefix, Some("nick!u@h"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params.as_slice(), &["#chan", "hello world"]);
    }

    #[test]
    fn test_parse_multiple_spaces() {
        let msg = parse("MODE   #chan   +o  nick");
        assert_eq!(msg.params.as_slice(), &["#chan", "+o", "nick"]);
    }

    #[test]
    fn test_parse_empty_trailing() {
        let msg = parse("TOPIC #chan :");
        assert_eq!(msg.params.as_slice(), &["#chan", ""]);
    }

    #[test]
    fn test_parse_fifteenth_param_without_colon() {
        let line = "CMD a b c d e f g h i j k l m n o p q";
        let msg = parse(line);
        assert_eq!(msg.params.len(), MAX_PARAMS);
        assert_eq!(msg.params[14], "o p q");
    }

    #[test]
    fn test_reject_bad_command() {
        assert!(parse_message("12 foo").is_err());
        assert!(parse_message("PRIV1MSG foo").is_err());
        assert!(parse_message(":prefix.only").is_err());
    }
}
