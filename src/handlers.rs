//! Command dispatch and per-command semantics.
//!
//! Handlers validate parameters, mutate client/channel state, and queue
//! replies; nothing here touches a socket directly. Protocol errors are
//! numeric replies and leave the connection open, with one exception:
//! PASS without a parameter drops the client.

use mio::Token;

use crate::message::Command;
use crate::replies;
use crate::server::Server;

/// Parse one line and route it to its handler.
///
/// Command names are case-insensitive. Before registration completes,
/// everything outside the always-allowed set draws `451`; names that
/// match no handler are dropped.
pub(crate) fn dispatch(server: &mut Server, token: Token, line: &str) {
    if !server.clients.contains_key(&token) {
        return;
    }

    let cmd = Command::parse(line);
    let name = cmd.name.to_ascii_uppercase();
    tracing::trace!(token = token.0, command = %name, "dispatching");

    let always_allowed = matches!(
        name.as_str(),
        "PASS" | "NICK" | "USER" | "PING" | "PONG" | "QUIT"
    );
    if !always_allowed {
        let authed = server
            .clients
            .get(&token)
            .is_some_and(|c| c.is_authenticated());
        if !authed {
            server.queue_to(token, &replies::err_not_registered());
            return;
        }
    }

    match name.as_str() {
        "PASS" => pass(server, token, &cmd),
        "NICK" => nick(server, token, &cmd),
        "USER" => user(server, token, &cmd),
        "JOIN" => join(server, token, &cmd),
        "PART" => part(server, token, &cmd),
        "PRIVMSG" => privmsg(server, token, &cmd),
        "PING" => ping(server, token, &cmd),
        "PONG" => {}
        "KICK" => kick(server, token, &cmd),
        "MODE" => mode(server, token, &cmd),
        "TOPIC" => topic(server, token, &cmd),
        "INVITE" => invite(server, token, &cmd),
        "QUIT" => quit(server, token),
        _ => {}
    }
}

/* =============================
 *        REGISTRATION
 * ============================= */

fn pass(server: &mut Server, token: Token, cmd: &Command) {
    if cmd.params.is_empty() {
        // The one malformed command that costs the connection.
        server.queue_to(token, &replies::err_need_more_params("PASS"));
        server.disconnect(token);
        return;
    }
    if is_authenticated(server, token) {
        let nick = nickname_of(server, token);
        server.queue_to(token, &replies::err_already_registered(&nick));
        return;
    }
    if cmd.params[0] != server.password() {
        server.queue_to(token, &replies::err_password_mismatch());
        return;
    }
    if let Some(client) = server.clients.get_mut(&token) {
        client.set_valid_pass(true);
    }
    server.try_register(token);
}

fn nick(server: &mut Server, token: Token, cmd: &Command) {
    let Some(wanted) = cmd.params.first() else {
        server.queue_to(token, &replies::err_no_nickname_given());
        return;
    };
    if server.nickname_in_use(wanted, token) {
        server.queue_to(token, &replies::err_nickname_in_use(wanted));
        return;
    }
    let wanted = wanted.clone();
    if let Some(client) = server.clients.get_mut(&token) {
        client.set_nickname(&wanted);
    }
    server.try_register(token);
}

fn user(server: &mut Server, token: Token, cmd: &Command) {
    if cmd.params.len() < 3 || cmd.trailing.is_empty() {
        server.queue_to(token, &replies::err_need_more_params("USER"));
        return;
    }
    if is_authenticated(server, token) {
        let nick = nickname_of(server, token);
        server.queue_to(token, &replies::err_already_registered(&nick));
        return;
    }
    if let Some(client) = server.clients.get_mut(&token) {
        client.set_username(&cmd.params[0]);
        client.set_realname(&cmd.trailing);
    }
    server.try_register(token);
}

fn quit(server: &mut Server, token: Token) {
    let (hostmask, joined) = match server.clients.get(&token) {
        Some(client) => (client.hostmask(), client.joined().to_vec()),
        None => return,
    };
    let msg = format!(":{hostmask} QUIT :Quit\r\n");
    for name in joined {
        server.broadcast(&name, &msg, Some(token));
        if let Some(channel) = server.channels.get_mut(&name) {
            channel.remove_member(token);
        }
        if let Some(client) = server.clients.get_mut(&token) {
            client.leave_channel(&name);
        }
        server.cleanup_channel(&name);
    }
    server.disconnect(token);
}

/* =============================
 *      CHANNEL COMMANDS
 * ============================= */

fn join(server: &mut Server, token: Token, cmd: &Command) {
    let Some(raw_names) = cmd.params.first() else {
        server.queue_to(token, &replies::err_need_more_params("JOIN"));
        return;
    };
    let names = split_comma_list(raw_names);
    let keys = cmd
        .params
        .get(1)
        .map(|k| split_comma_list(k))
        .unwrap_or_default();

    let (nick, hostmask) = match server.clients.get(&token) {
        Some(client) => (client.nickname().to_string(), client.hostmask()),
        None => return,
    };

    for (idx, raw) in names.iter().enumerate() {
        let chan_name = ensure_channel_prefix(raw);
        if chan_name.is_empty() {
            continue;
        }
        server.get_or_create_channel(&chan_name);
        let provided = keys.get(idx).map(String::as_str).unwrap_or("");

        let rejection = {
            let Some(channel) = server.channels.get(&chan_name) else {
                continue;
            };
            if channel.key().is_some_and(|key| key != provided) {
                Some(replies::err_bad_channel_key(&chan_name))
            } else if channel.is_invite_only()
                && !channel.is_invited(&nick)
                && !channel.is_operator(token)
            {
                Some(replies::err_invite_only_chan(&chan_name))
            } else if channel.is_full() && !channel.is_operator(token) {
                Some(replies::err_channel_is_full(&chan_name))
            } else {
                None
            }
        };
        if let Some(reply) = rejection {
            server.queue_to(token, &reply);
            server.cleanup_channel(&chan_name);
            continue;
        }

        let already = server
            .channels
            .get(&chan_name)
            .is_none_or(|channel| channel.has_member(token));
        if already {
            continue;
        }

        if let Some(channel) = server.channels.get_mut(&chan_name) {
            channel.add_member(token);
            channel.remove_invited(&nick);
            if channel.member_count() == 1 {
                channel.add_operator(token);
            }
        }
        if let Some(client) = server.clients.get_mut(&token) {
            client.join_channel(&chan_name);
        }

        server.broadcast(&chan_name, &format!(":{hostmask} JOIN {chan_name}\r\n"), None);

        let names_list = member_nicks(server, &chan_name).join(" ");
        server.queue_to(token, &replies::rpl_name_reply(&nick, &chan_name, &names_list));
        server.queue_to(token, &replies::rpl_end_of_names(&nick, &chan_name));

        let topic = server
            .channels
            .get(&chan_name)
            .map(|channel| channel.topic().to_string())
            .unwrap_or_default();
        if topic.is_empty() {
            server.queue_to(token, &replies::rpl_no_topic(&nick, &chan_name));
        } else {
            server.queue_to(token, &replies::rpl_topic(&nick, &chan_name, &topic));
        }
    }
}

fn part(server: &mut Server, token: Token, cmd: &Command) {
    let Some(raw) = cmd.params.first() else {
        server.queue_to(token, &replies::err_need_more_params("PART"));
        return;
    };
    let chan_name = ensure_channel_prefix(raw);
    if !server.channels.contains_key(&chan_name) {
        server.queue_to(token, &replies::err_no_such_channel(&chan_name));
        return;
    }
    let member = server
        .channels
        .get(&chan_name)
        .is_some_and(|channel| channel.has_member(token));
    if !member {
        server.queue_to(token, &replies::err_not_on_channel(&chan_name));
        return;
    }

    let hostmask = match server.clients.get(&token) {
        Some(client) => client.hostmask(),
        None => return,
    };
    if let Some(channel) = server.channels.get_mut(&chan_name) {
        channel.remove_member(token);
    }
    if let Some(client) = server.clients.get_mut(&token) {
        client.leave_channel(&chan_name);
    }
    // The parting client is already gone, so only the others hear it.
    server.broadcast(&chan_name, &format!(":{hostmask} PART {chan_name}\r\n"), None);
    server.cleanup_channel(&chan_name);
}

fn privmsg(server: &mut Server, token: Token, cmd: &Command) {
    let Some(target) = cmd.params.first() else {
        server.queue_to(token, &replies::err_no_recipient());
        return;
    };
    if cmd.trailing.is_empty() {
        server.queue_to(token, &replies::err_no_text_to_send());
        return;
    }
    let target = target.clone();
    let hostmask = match server.clients.get(&token) {
        Some(client) => client.hostmask(),
        None => return,
    };
    let msg = format!(":{hostmask} PRIVMSG {target} :{}\r\n", cmd.trailing);

    if target.starts_with('#') {
        if !server.channels.contains_key(&target) {
            server.queue_to(token, &replies::err_no_such_channel(&target));
            return;
        }
        let member = server
            .channels
            .get(&target)
            .is_some_and(|channel| channel.has_member(token));
        if !member {
            server.queue_to(token, &replies::err_cannot_send_to_chan(&target));
            return;
        }
        server.broadcast(&target, &msg, Some(token));
    } else {
        match server.token_by_nick(&target) {
            Some(recipient) => server.queue_to(recipient, &msg),
            None => server.queue_to(token, &replies::err_no_such_nick(&target)),
        }
    }
}

fn ping(server: &mut Server, token: Token, cmd: &Command) {
    let Some(payload) = cmd.params.first() else {
        server.queue_to(token, &replies::err_need_more_params("PING"));
        return;
    };
    let reply = format!("PONG :{payload}\r\n");
    server.queue_to(token, &reply);
}

fn kick(server: &mut Server, token: Token, cmd: &Command) {
    if cmd.params.len() < 2 {
        server.queue_to(token, &replies::err_need_more_params("KICK"));
        return;
    }
    let chan_name = ensure_channel_prefix(&cmd.params[0]);
    let target_nick = cmd.params[1].clone();

    if !server.channels.contains_key(&chan_name) {
        server.queue_to(token, &replies::err_no_such_channel(&chan_name));
        return;
    }
    let (is_op, is_member) = server
        .channels
        .get(&chan_name)
        .map(|channel| (channel.is_operator(token), channel.has_member(token)))
        .unwrap_or((false, false));
    if !is_op {
        server.queue_to(token, &replies::err_chan_op_privs_needed(&chan_name));
        return;
    }
    if !is_member {
        server.queue_to(token, &replies::err_not_on_channel(&chan_name));
        return;
    }

    let Some(target) = server.token_by_nick(&target_nick) else {
        server.queue_to(token, &replies::err_no_such_nick(&target_nick));
        return;
    };
    let target_member = server
        .channels
        .get(&chan_name)
        .is_some_and(|channel| channel.has_member(target));
    if !target_member {
        server.queue_to(token, &replies::err_not_on_channel(&chan_name));
        return;
    }

    let hostmask = match server.clients.get(&token) {
        Some(client) => client.hostmask(),
        None => return,
    };
    server.broadcast(
        &chan_name,
        &format!(":{hostmask} KICK {chan_name} {target_nick}\r\n"),
        None,
    );
    if let Some(channel) = server.channels.get_mut(&chan_name) {
        channel.remove_member(target);
    }
    if let Some(client) = server.clients.get_mut(&target) {
        client.leave_channel(&chan_name);
    }
    server.cleanup_channel(&chan_name);
}

fn mode(server: &mut Server, token: Token, cmd: &Command) {
    if cmd.params.is_empty() {
        server.queue_to(token, &replies::err_need_more_params("MODE"));
        return;
    }
    let chan_name = ensure_channel_prefix(&cmd.params[0]);
    if !server.channels.contains_key(&chan_name) {
        server.queue_to(token, &replies::err_no_such_channel(&chan_name));
        return;
    }
    let member = server
        .channels
        .get(&chan_name)
        .is_some_and(|channel| channel.has_member(token));
    if !member {
        server.queue_to(token, &replies::err_not_on_channel(&chan_name));
        return;
    }

    let (nick, hostmask) = match server.clients.get(&token) {
        Some(client) => (client.nickname().to_string(), client.hostmask()),
        None => return,
    };

    let flags = cmd.params.get(1).cloned().unwrap_or_default();
    if flags.is_empty() {
        let modes = server
            .channels
            .get(&chan_name)
            .map(|channel| channel.mode_string())
            .unwrap_or_else(|| "+".to_string());
        server.queue_to(token, &replies::rpl_channel_mode_is(&nick, &chan_name, &modes));
        return;
    }

    let is_op = server
        .channels
        .get(&chan_name)
        .is_some_and(|channel| channel.is_operator(token));
    if !is_op {
        server.queue_to(token, &replies::err_chan_op_privs_needed(&chan_name));
        return;
    }

    let adding = flags.starts_with('+');
    let sign = if adding { '+' } else { '-' };
    let arg = cmd.params.get(2).cloned().unwrap_or_default();

    let line = match flags.chars().nth(1) {
        Some('o') => {
            if arg.is_empty() {
                server.queue_to(token, &replies::err_need_more_params("MODE"));
                return;
            }
            let Some(target) = server.token_by_nick(&arg) else {
                server.queue_to(token, &replies::err_no_such_nick(&arg));
                return;
            };
            if let Some(channel) = server.channels.get_mut(&chan_name) {
                if adding {
                    channel.add_operator(target);
                } else {
                    channel.remove_operator(target);
                }
            }
            format!(":{hostmask} MODE {chan_name} {sign}o {arg}\r\n")
        }
        Some('k') => {
            if adding {
                if arg.is_empty() {
                    server.queue_to(token, &replies::err_need_more_params("MODE"));
                    return;
                }
                if let Some(channel) = server.channels.get_mut(&chan_name) {
                    channel.set_key(&arg);
                }
                format!(":{hostmask} MODE {chan_name} +k {arg}\r\n")
            } else {
                if let Some(channel) = server.channels.get_mut(&chan_name) {
                    channel.clear_key();
                }
                format!(":{hostmask} MODE {chan_name} -k\r\n")
            }
        }
        Some('i') => {
            if let Some(channel) = server.channels.get_mut(&chan_name) {
                channel.set_invite_only(adding);
            }
            format!(":{hostmask} MODE {chan_name} {sign}i\r\n")
        }
        Some('l') => {
            if adding {
                let limit = match arg.parse::<usize>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        server.queue_to(token, &replies::err_need_more_params("MODE"));
                        return;
                    }
                };
                if let Some(channel) = server.channels.get_mut(&chan_name) {
                    channel.set_limit(limit);
                }
                format!(":{hostmask} MODE {chan_name} +l {arg}\r\n")
            } else {
                if let Some(channel) = server.channels.get_mut(&chan_name) {
                    channel.clear_limit();
                }
                format!(":{hostmask} MODE {chan_name} -l\r\n")
            }
        }
        Some('t') => {
            if let Some(channel) = server.channels.get_mut(&chan_name) {
                channel.set_topic_protected(adding);
            }
            format!(":{hostmask} MODE {chan_name} {sign}t\r\n")
        }
        _ => {
            // Unknown flag: inform the sender, change nothing.
            let echo = format!(":{hostmask} MODE {chan_name} {flags}\r\n");
            server.queue_to(token, &echo);
            return;
        }
    };

    server.broadcast(&chan_name, &line, None);
}

fn topic(server: &mut Server, token: Token, cmd: &Command) {
    if cmd.params.is_empty() {
        server.queue_to(token, &replies::err_need_more_params("TOPIC"));
        return;
    }
    let chan_name = ensure_channel_prefix(&cmd.params[0]);
    if !server.channels.contains_key(&chan_name) {
        server.queue_to(token, &replies::err_no_such_channel(&chan_name));
        return;
    }
    let member = server
        .channels
        .get(&chan_name)
        .is_some_and(|channel| channel.has_member(token));
    if !member {
        server.queue_to(token, &replies::err_not_on_channel(&chan_name));
        return;
    }

    let (nick, hostmask) = match server.clients.get(&token) {
        Some(client) => (client.nickname().to_string(), client.hostmask()),
        None => return,
    };

    if cmd.trailing.is_empty() {
        let current = server
            .channels
            .get(&chan_name)
            .map(|channel| channel.topic().to_string())
            .unwrap_or_default();
        if current.is_empty() {
            server.queue_to(token, &replies::rpl_no_topic(&nick, &chan_name));
        } else {
            server.queue_to(token, &replies::rpl_topic(&nick, &chan_name, &current));
        }
        return;
    }

    let (protected, is_op) = server
        .channels
        .get(&chan_name)
        .map(|channel| (channel.is_topic_protected(), channel.is_operator(token)))
        .unwrap_or((false, false));
    if protected && !is_op {
        server.queue_to(token, &replies::err_chan_op_privs_needed(&chan_name));
        return;
    }
    if cmd.trailing.len() > 300 {
        server.queue_to(token, &replies::err_topic_too_long(&nick, &chan_name));
        return;
    }

    if let Some(channel) = server.channels.get_mut(&chan_name) {
        channel.set_topic(&cmd.trailing);
    }
    server.broadcast(
        &chan_name,
        &format!(":{hostmask} TOPIC {chan_name} :{}\r\n", cmd.trailing),
        None,
    );
    server.queue_to(token, &replies::rpl_topic(&nick, &chan_name, &cmd.trailing));
}

fn invite(server: &mut Server, token: Token, cmd: &Command) {
    if cmd.params.len() < 2 {
        server.queue_to(token, &replies::err_need_more_params("INVITE"));
        return;
    }
    let target_nick = cmd.params[0].clone();
    let chan_name = ensure_channel_prefix(&cmd.params[1]);

    if !server.channels.contains_key(&chan_name) {
        server.queue_to(token, &replies::err_no_such_channel(&chan_name));
        return;
    }
    let member = server
        .channels
        .get(&chan_name)
        .is_some_and(|channel| channel.has_member(token));
    if !member {
        server.queue_to(token, &replies::err_not_on_channel(&chan_name));
        return;
    }
    let Some(target) = server.token_by_nick(&target_nick) else {
        server.queue_to(token, &replies::err_no_such_nick(&target_nick));
        return;
    };
    let is_op = server
        .channels
        .get(&chan_name)
        .is_some_and(|channel| channel.is_operator(token));
    if !is_op {
        server.queue_to(token, &replies::err_chan_op_privs_needed(&chan_name));
        return;
    }

    if let Some(channel) = server.channels.get_mut(&chan_name) {
        channel.invite(&target_nick);
    }
    let hostmask = match server.clients.get(&token) {
        Some(client) => client.hostmask(),
        None => return,
    };
    server.queue_to(
        target,
        &format!(":{hostmask} INVITE {target_nick} {chan_name}\r\n"),
    );
    server.queue_to(token, &replies::rpl_inviting(&target_nick, &chan_name));
}

/* =============================
 *           HELPERS
 * ============================= */

fn ensure_channel_prefix(name: &str) -> String {
    if name.is_empty() || name.starts_with('#') {
        name.to_string()
    } else {
        format!("#{name}")
    }
}

fn split_comma_list(list: &str) -> Vec<String> {
    list.split(',').map(str::to_string).collect()
}

fn member_nicks(server: &Server, chan_name: &str) -> Vec<String> {
    server
        .channels
        .get(chan_name)
        .map(|channel| {
            channel
                .members()
                .iter()
                .filter_map(|member| {
                    server
                        .clients
                        .get(member)
                        .map(|client| client.nickname().to_string())
                })
                .collect()
        })
        .unwrap_or_default()
}

fn is_authenticated(server: &Server, token: Token) -> bool {
    server
        .clients
        .get(&token)
        .is_some_and(|client| client.is_authenticated())
}

fn nickname_of(server: &Server, token: Token) -> String {
    server
        .clients
        .get(&token)
        .map(|client| client.nickname().to_string())
        .unwrap_or_default()
}
