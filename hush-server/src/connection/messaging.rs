//! PRIVMSG and NOTICE delivery.

use std::sync::Arc;

use crate::proto;
use crate::replies as rpl;
use crate::server::SharedState;

use super::helpers::{broadcast_to_channel, send_to_session};

enum Delivery {
    ToUser { session: String },
    ToChannel,
    NotMember,
    Moderated,
    NoSuchTarget,
}

/// PRIVMSG/NOTICE: `<target> <text…>`. The target is resolved as a nick
/// first, then as a channel, so a nick shadows a channel of the same
/// name. Channel delivery requires membership and, on `+m` channels,
/// operator status; the sender never receives its own message back.
pub(super) fn handle_privmsg(
    command: &str,
    argument: &str,
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let (target, text) = proto::split_arg(argument);
    if target.is_empty() || text.is_empty() {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, command),
        );
        return;
    }

    let (delivery, sender_nick) = {
        let registry = state.registry.lock();
        let Some(session) = registry.session(session_id) else {
            return;
        };
        let sender_nick = session.nick.clone();
        let delivery = if let Some(sid) = registry.session_id_for_nick(target) {
            Delivery::ToUser {
                session: sid.to_string(),
            }
        } else if let Some(ch) = registry.channels.get(target) {
            if !ch.is_member(session_id) {
                Delivery::NotMember
            } else if ch.moderated && !ch.is_operator(session_id) {
                Delivery::Moderated
            } else {
                Delivery::ToChannel
            }
        } else {
            Delivery::NoSuchTarget
        };
        (delivery, sender_nick)
    };

    let line = if command == "NOTICE" {
        format!(":{sender_nick} NOTICE {target} {text}")
    } else {
        format!(":{sender_nick}! PRIVMSG {target} :{text}")
    };

    match delivery {
        Delivery::ToUser { session } => {
            send_to_session(state, &session, &line);
            send(state, session_id, format!("Message sent to {target}"));
        }
        Delivery::ToChannel => {
            broadcast_to_channel(state, target, &line, Some(session_id));
            send(state, session_id, format!("Message sent to {target}"));
        }
        Delivery::NotMember => send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NOTONCHANNEL, target),
        ),
        Delivery::Moderated => send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_CHANOPRIVSNEEDED, target),
        ),
        Delivery::NoSuchTarget => send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NOSUCHNICK, target),
        ),
    }
}
