//! IRC numeric reply codes.
//!
//! Only the numerics a bouncer emits to its clients or interprets from an
//! upstream server are listed.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol
//! - Modern IRC documentation: <https://modern.ircdocs.horse/>

#![allow(non_camel_case_types)]

mod constructors;

use std::fmt;

/// IRC server response code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    // === Connection Registration (001-099) ===
    /// 001 - Welcome to the IRC network
    RPL_WELCOME = 1,
    /// 002 - Your host is running version
    RPL_YOURHOST = 2,
    /// 003 - Server creation date
    RPL_CREATED = 3,
    /// 004 - Server info (name, version, user modes, channel modes)
    RPL_MYINFO = 4,
    /// 005 - Server supported features (ISUPPORT)
    RPL_ISUPPORT = 5,

    // === Command Responses (200-399) ===
    /// 331 - No topic is set
    RPL_NOTOPIC = 331,
    /// 332 - Channel topic
    RPL_TOPIC = 332,
    /// 333 - Who set the topic and when
    RPL_TOPICWHOTIME = 333,
    /// 353 - Names list
    RPL_NAMREPLY = 353,
    /// 366 - End of names list
    RPL_ENDOFNAMES = 366,
    /// 372 - MOTD line
    RPL_MOTD = 372,
    /// 375 - MOTD start
    RPL_MOTDSTART = 375,
    /// 376 - End of MOTD
    RPL_ENDOFMOTD = 376,

    // === Errors (400-599) ===
    /// 401 - No such nick/channel
    ERR_NOSUCHNICK = 401,
    /// 403 - No such channel
    ERR_NOSUCHCHANNEL = 403,
    /// 410 - Invalid CAP subcommand
    ERR_INVALIDCAPCMD = 410,
    /// 421 - Unknown command
    ERR_UNKNOWNCOMMAND = 421,
    /// 422 - MOTD file is missing
    ERR_NOMOTD = 422,
    /// 431 - No nickname given
    ERR_NONICKNAMEGIVEN = 431,
    /// 432 - Erroneous nickname
    ERR_ERRONEUSNICKNAME = 432,
    /// 433 - Nickname is already in use
    ERR_NICKNAMEINUSE = 433,
    /// 437 - Nick/channel temporarily unavailable
    ERR_UNAVAILRESOURCE = 437,
    /// 451 - You have not registered
    ERR_NOTREGISTERED = 451,
    /// 461 - Not enough parameters
    ERR_NEEDMOREPARAMS = 461,
    /// 462 - You may not reregister
    ERR_ALREADYREGISTRED = 462,
    /// 464 - Password incorrect
    ERR_PASSWDMISMATCH = 464,

    // === SASL (900-999) ===
    /// 900 - You are now logged in
    RPL_LOGGEDIN = 900,
    /// 903 - SASL authentication successful
    RPL_SASLSUCCESS = 903,
    /// 904 - SASL authentication failed
    ERR_SASLFAIL = 904,
    /// 905 - SASL message too long
    ERR_SASLTOOLONG = 905,
    /// 906 - SASL authentication aborted
    ERR_SASLABORTED = 906,
    /// 907 - Already authenticated
    ERR_SASLALREADY = 907,
    /// 908 - Available SASL mechanisms
    RPL_SASLMECHS = 908,
}

impl Response {
    /// Numeric value of this reply.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Look up a reply by its numeric value.
    pub fn from_code(code: u16) -> Option<Response> {
        use Response::*;
        Some(match code {
            1 => RPL_WELCOME,
            2 => RPL_YOURHOST,
            3 => RPL_CREATED,
            4 => RPL_MYINFO,
            5 => RPL_ISUPPORT,
            331 => RPL_NOTOPIC,
            332 => RPL_TOPIC,
            333 => RPL_TOPICWHOTIME,
            353 => RPL_NAMREPLY,
            366 => RPL_ENDOFNAMES,
            372 => RPL_MOTD,
            375 => RPL_MOTDSTART,
            376 => RPL_ENDOFMOTD,
            401 => ERR_NOSUCHNICK,
            403 => ERR_NOSUCHCHANNEL,
            410 => ERR_INVALIDCAPCMD,
            421 => ERR_UNKNOWNCOMMAND,
            422 => ERR_NOMOTD,
            431 => ERR_NONICKNAMEGIVEN,
            432 => ERR_ERRONEUSNICKNAME,
            433 => ERR_NICKNAMEINUSE,
            437 => ERR_UNAVAILRESOURCE,
            451 => ERR_NOTREGISTERED,
            461 => ERR_NEEDMOREPARAMS,
            462 => ERR_ALREADYREGISTRED,
            464 => ERR_PASSWDMISMATCH,
            900 => RPL_LOGGEDIN,
            903 => RPL_SASLSUCCESS,
            904 => ERR_SASLFAIL,
            905 => ERR_SASLTOOLONG,
            906 => ERR_SASLABORTED,
            907 => ERR_SASLALREADY,
            908 => RPL_SASLMECHS,
            _ => return None,
        })
    }

    /// True for 400-599 error numerics.
    pub fn is_error(self) -> bool {
        (400..600).contains(&self.code())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_three_digits() {
        assert_eq!(Response::RPL_WELCOME.to_string(), "001");
        assert_eq!(Response::ERR_NEEDMOREPARAMS.to_string(), "461");
    }

    #[test]
    fn test_from_code_roundtrip() {
        for r in [
            Response::RPL_ISUPPORT,
            Response::RPL_ENDOFNAMES,
            Response::ERR_PASSWDMISMATCH,
            Response::RPL_SASLMECHS,
        ] {
            assert_eq!(Response::from_code(r.code()), Some(r));
        }
        assert_eq!(Response::from_code(999), None);
    }

    #[test]
    fn test_is_error() {
        assert!(Response::ERR_UNKNOWNCOMMAND.is_error());
        assert!(!Response::RPL_TOPIC.is_error());
    }
}
