//! Wire strings for every numeric reply the server emits.
//!
//! Each function returns the complete `\r\n`-terminated line. The source
//! of server-origin messages is the fixed token `ircserver`; the `*`
//! placeholder appears where a numeric does not address the client by
//! nickname.

/// Prefix used for messages that originate from a client.
pub fn client_prefix(nick: &str, user: &str) -> String {
    format!("{nick}!{user}@localhost")
}

/* =============================
 *        ERROR NUMERICS
 * ============================= */

pub fn err_need_more_params(cmd: &str) -> String {
    format!(":ircserver 461 {cmd} :Not enough parameters\r\n")
}

pub fn err_already_registered(nick: &str) -> String {
    format!(":ircserver 462 {nick} :You may not reregister\r\n")
}

pub fn err_password_mismatch() -> String {
    ":ircserver 464 * :Password incorrect\r\n".to_string()
}

pub fn err_no_nickname_given() -> String {
    ":ircserver 431 * :No nickname given\r\n".to_string()
}

pub fn err_nickname_in_use(nick: &str) -> String {
    format!(":ircserver 433 * {nick} :Nickname is already in use\r\n")
}

pub fn err_no_such_nick(nick: &str) -> String {
    format!(":ircserver 401 * {nick} :No such nick\r\n")
}

pub fn err_not_on_channel(chan: &str) -> String {
    format!(":ircserver 442 * {chan} :You're not on that channel\r\n")
}

pub fn err_not_registered() -> String {
    ":ircserver 451 * :You have not registered\r\n".to_string()
}

pub fn err_no_recipient() -> String {
    ":ircserver 411 * :No recipient given (PRIVMSG)\r\n".to_string()
}

pub fn err_no_text_to_send() -> String {
    ":ircserver 412 * :No text to send\r\n".to_string()
}

/* =============================
 *    CHANNEL ERROR NUMERICS
 * ============================= */

pub fn err_no_such_channel(chan: &str) -> String {
    format!(":ircserver 403 * {chan} :No such channel\r\n")
}

pub fn err_cannot_send_to_chan(chan: &str) -> String {
    format!(":ircserver 404 * {chan} :Cannot send to channel\r\n")
}

pub fn err_channel_is_full(chan: &str) -> String {
    format!(":ircserver 471 * {chan} :Cannot join channel (+l)\r\n")
}

pub fn err_invite_only_chan(chan: &str) -> String {
    format!(":ircserver 473 * {chan} :Cannot join channel (+i)\r\n")
}

pub fn err_bad_channel_key(chan: &str) -> String {
    format!(":ircserver 475 * {chan} :Cannot join channel (+k)\r\n")
}

pub fn err_chan_op_privs_needed(chan: &str) -> String {
    format!(":ircserver 482 * {chan} :You're not channel operator\r\n")
}

pub fn err_topic_too_long(nick: &str, chan: &str) -> String {
    format!(":ircserver 422 {nick} {chan} :Topic is too long (maximum 300 characters)\r\n")
}

/* =============================
 *    REGISTRATION NUMERICS
 * ============================= */

pub fn rpl_welcome(nick: &str) -> String {
    format!(":ircserver 001 {nick} :Welcome to the IRC server\r\n")
}

pub fn rpl_name_reply(nick: &str, chan: &str, names: &str) -> String {
    format!(":ircserver 353 {nick} = {chan} :{names}\r\n")
}

pub fn rpl_end_of_names(nick: &str, chan: &str) -> String {
    format!(":ircserver 366 {nick} {chan} :End of NAMES list\r\n")
}

/* =============================
 *      CHANNEL NUMERICS
 * ============================= */

pub fn rpl_inviting(nick: &str, chan: &str) -> String {
    format!(":ircserver 341 * {nick} {chan} :You have been invited\r\n")
}

pub fn rpl_no_topic(nick: &str, chan: &str) -> String {
    format!(":ircserver 331 {nick} {chan} :No topic is set\r\n")
}

pub fn rpl_topic(nick: &str, chan: &str, topic: &str) -> String {
    format!(":ircserver 332 {nick} {chan} :{topic}\r\n")
}

pub fn rpl_channel_mode_is(nick: &str, chan: &str, modes: &str) -> String {
    format!(":ircserver 324 {nick} {chan} {modes}\r\n")
}
