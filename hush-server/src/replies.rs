//! Numeric reply catalog.
//!
//! Every status the server can emit has a three-digit code and a canonical
//! reason string. Error replies are formatted as
//! `:<code> [context…] :<reason>`; informational replies that carry data
//! (353 member lists, 332 topics) are built at the call site.

pub const RPL_WELCOME: &str = "001";
pub const RPL_WHOISINFO: &str = "312";
pub const RPL_NOTOPIC: &str = "331";
pub const RPL_TOPIC: &str = "332";
pub const RPL_NAMREPLY: &str = "353";
pub const RPL_ENDOFNAMES: &str = "366";

pub const ERR_NOSUCHNICK: &str = "401";
pub const ERR_NOSUCHCHANNEL: &str = "403";
pub const ERR_CANNOTSENDTOCHAN: &str = "404";
pub const ERR_UNKNOWNCOMMAND: &str = "421";
pub const ERR_NICKNAMEINUSE: &str = "433";
pub const ERR_USERNOTINCHANNEL: &str = "441";
pub const ERR_NOTONCHANNEL: &str = "442";
pub const ERR_NOTREGISTERED: &str = "451";
pub const ERR_NEEDMOREPARAMS: &str = "461";
pub const ERR_UNKNOWNMODE: &str = "472";
pub const ERR_CHANOPRIVSNEEDED: &str = "482";
pub const ERR_USERSDONTMATCH: &str = "502";

/// Canonical reason text for a numeric code.
pub fn reason(code: &str) -> &'static str {
    match code {
        RPL_WELCOME => "Welcome to the hush relay",
        RPL_WHOISINFO => "Whois information",
        RPL_NOTOPIC => "No topic is set",
        RPL_TOPIC => "The topic is",
        RPL_NAMREPLY => "Channel member list",
        RPL_ENDOFNAMES => "End of member list",
        ERR_NOSUCHNICK => "No such nick/channel",
        ERR_NOSUCHCHANNEL => "No such channel",
        ERR_CANNOTSENDTOCHAN => "Cannot send to channel",
        ERR_UNKNOWNCOMMAND => "Unknown command",
        ERR_NICKNAMEINUSE => "Nickname is already in use",
        ERR_USERNOTINCHANNEL => "They aren't on that channel",
        ERR_NOTONCHANNEL => "You're not on that channel",
        ERR_NOTREGISTERED => "You have not registered",
        ERR_NEEDMOREPARAMS => "Not enough parameters",
        ERR_UNKNOWNMODE => "Unknown mode flag",
        ERR_CHANOPRIVSNEEDED => "You're not channel operator",
        ERR_USERSDONTMATCH => "Users can only change modes for themselves",
        _ => "Unknown reply",
    }
}

/// Build a numeric reply line: `:<code> [context] :<reason>`.
pub fn numeric(code: &str, context: &str) -> String {
    if context.is_empty() {
        format!(":{code} :{}", reason(code))
    } else {
        format!(":{code} {context} :{}", reason(code))
    }
}
