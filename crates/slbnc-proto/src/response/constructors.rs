//! Constructors for the numeric replies sent to clients.
//!
//! The first parameter is always the target nickname (`*` before one is
//! known). Callers set the server prefix.

use super::Response;
use crate::message::Message;

impl Response {
    /// 461 ERR_NEEDMOREPARAMS
    pub fn err_needmoreparams(nick: &str, command: &str) -> Message {
        Message::response(
            Response::ERR_NEEDMOREPARAMS,
            [nick, command, "Not enough parameters"],
        )
    }

    /// 421 ERR_UNKNOWNCOMMAND
    pub fn err_unknowncommand(nick: &str, command: &str) -> Message {
        Message::response(
            Response::ERR_UNKNOWNCOMMAND,
            [nick, command, "Unknown command"],
        )
    }

    /// 410 ERR_INVALIDCAPCMD
    pub fn err_invalidcapcmd(nick: &str, subcommand: &str) -> Message {
        Message::response(
            Response::ERR_INVALIDCAPCMD,
            [nick, subcommand, "Unknown CAP command"],
        )
    }

    /// 462 ERR_ALREADYREGISTRED
    pub fn err_alreadyregistred(nick: &str) -> Message {
        Message::response(
            Response::ERR_ALREADYREGISTRED,
            [nick, "You may not reregister"],
        )
    }

    /// 464 ERR_PASSWDMISMATCH
    pub fn err_passwdmismatch(nick: &str) -> Message {
        Message::response(
            Response::ERR_PASSWDMISMATCH,
            [nick, "Invalid username or password"],
        )
    }

    /// 451 ERR_NOTREGISTERED
    pub fn err_notregistered(nick: &str) -> Message {
        Message::response(
            Response::ERR_NOTREGISTERED,
            [nick, "You have not registered"],
        )
    }

    /// 431 ERR_NONICKNAMEGIVEN
    pub fn err_nonicknamegiven(nick: &str) -> Message {
        Message::response(Response::ERR_NONICKNAMEGIVEN, [nick, "No nickname given"])
    }

    /// 401 ERR_NOSUCHNICK
    pub fn err_nosuchnick(nick: &str, target: &str) -> Message {
        Message::response(
            Response::ERR_NOSUCHNICK,
            [nick, target, "No such nick/channel"],
        )
    }

    /// 422 ERR_NOMOTD
    pub fn err_nomotd(nick: &str) -> Message {
        Message::response(Response::ERR_NOMOTD, [nick, "No MOTD"])
    }

    /// 900 RPL_LOGGEDIN
    pub fn rpl_loggedin(nick: &str, mask: &str, account: &str) -> Message {
        let text = format!("You are now logged in as {}", account);
        Message::response(Response::RPL_LOGGEDIN, [nick, mask, account, &text])
    }

    /// 903 RPL_SASLSUCCESS
    pub fn rpl_saslsuccess(nick: &str) -> Message {
        Message::response(
            Response::RPL_SASLSUCCESS,
            [nick, "SASL authentication successful"],
        )
    }

    /// 904 ERR_SASLFAIL
    pub fn err_saslfail(nick: &str) -> Message {
        Message::response(
            Response::ERR_SASLFAIL,
            [nick, "SASL authentication failed"],
        )
    }

    /// 905 ERR_SASLTOOLONG
    pub fn err_sasltoolong(nick: &str) -> Message {
        Message::response(Response::ERR_SASLTOOLONG, [nick, "SASL message too long"])
    }

    /// 906 ERR_SASLABORTED
    pub fn err_saslaborted(nick: &str) -> Message {
        Message::response(
            Response::ERR_SASLABORTED,
            [nick, "SASL authentication aborted"],
        )
    }

    /// 907 ERR_SASLALREADY
    pub fn err_saslalready(nick: &str) -> Message {
        Message::response(
            Response::ERR_SASLALREADY,
            [nick, "You have already authenticated using SASL"],
        )
    }

    /// 908 RPL_SASLMECHS
    pub fn rpl_saslmechs(nick: &str, mechanisms: &str) -> Message {
        Message::response(
            Response::RPL_SASLMECHS,
            [nick, mechanisms, "are available SASL mechanisms"],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needmoreparams_shape() {
        let msg = Response::err_needmoreparams("*", "USER");
        assert_eq!(msg.to_string(), "461 * USER :Not enough parameters\r\n");
    }

    #[test]
    fn test_passwdmismatch_text() {
        let msg = Response::err_passwdmismatch("*");
        assert_eq!(msg.param(1), Some("Invalid username or password"));
    }
}
