use std::str::FromStr;

use super::nom_parser::parse_message;
use super::tags::unescape_tag_value;
use super::types::{Message, Tag};
use crate::error::{MessageParseError, ProtocolError};
use crate::prefix::Prefix;

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let invalid = |cause| ProtocolError::InvalidMessage {
            string: s.to_owned(),
            cause,
        };

        if s.trim_end_matches(['\r', '\n']).trim().is_empty() {
            return Err(invalid(MessageParseError::EmptyMessage));
        }

        let (_, parsed) =
            parse_message(s).map_err(|_| invalid(MessageParseError::InvalidCommand))?;

        let tags = parsed.tags.map(parse_tag_list);
        let prefix = parsed
            .prefix
            .map(Prefix::try_from_str)
            .transpose()
            .map_err(invalid)?;

        Ok(Message {
            tags,
            prefix,
            command: parsed.command.to_ascii_uppercase(),
            params: parsed.params.iter().map(|p| (*p).to_owned()).collect(),
        })
    }
}

fn parse_tag_list(raw: &str) -> Vec<Tag> {
    raw.split(';')
        .filter(|t| !t.is_empty())
        .map(|t| match t.split_once('=') {
            Some((key, value)) if !value.is_empty() => {
                Tag::new(key, Some(unescape_tag_value(value)))
            }
            Some((key, _)) => Tag::new(key, None),
            None => Tag::new(t, None),
        })
        .collect()
}
