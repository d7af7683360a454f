//! IRC case-mapping functions (`rfc1459`).

/// Convert a single character to IRC lowercase.
///
/// In addition to ASCII lowercase conversion, this maps `[]\~` to `{}|^`.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Convert a string to IRC lowercase.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Compare two strings using IRC case-insensitive comparison.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.chars()
            .zip(b.chars())
            .all(|(ca, cb)| irc_lower_char(ca) == irc_lower_char(cb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irc_to_lower() {
        assert_eq!(irc_to_lower("HELLO"), "hello");
        assert_eq!(irc_to_lower("#Channel[1]"), "#channel{1}");
        assert_eq!(irc_to_lower("Test~Name"), "test^name");
    }

    #[test]
    fn test_irc_eq() {
        assert!(irc_eq("#channel[1]", "#CHANNEL{1}"));
        assert!(irc_eq("nick\\test", "NICK|TEST"));
        assert!(!irc_eq("short", "longer"));
    }
}
