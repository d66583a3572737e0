//! MODE handling for channels (+o/-o, +t/-t, +m/-m) and users (+i/-i).

use std::sync::Arc;

use crate::proto;
use crate::replies as rpl;
use crate::server::SharedState;

use super::helpers::send_to_session;

/// MODE: `<target> <sign><flag> [param]`. A target beginning with the
/// channel sigil routes to channel modes, anything else to user modes.
///
/// Validation order is fixed: argument shape, then flag recognition,
/// then target lookups, then authorization. A failure at any step
/// leaves all state untouched.
pub(super) fn handle_mode(
    argument: &str,
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let parts: Vec<&str> = argument.split_whitespace().collect();
    if parts.len() < 2 {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "MODE"),
        );
        return;
    }
    let (target, mode) = (parts[0], parts[1]);
    let param = parts.get(2).copied();

    let mut chars = mode.chars();
    let (sign, flag) = (chars.next(), chars.next());
    let adding = match sign {
        Some('+') => true,
        Some('-') => false,
        _ => {
            send(
                state,
                session_id,
                rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "MODE"),
            );
            return;
        }
    };
    let Some(flag) = flag else {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "MODE"),
        );
        return;
    };
    if chars.next().is_some() {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "MODE"),
        );
        return;
    }

    if proto::is_channel(target) {
        handle_channel_mode(target, adding, flag, param, state, session_id, send);
    } else {
        handle_user_mode(target, adding, flag, state, session_id, send);
    }
}

enum ModeOutcome {
    Applied,
    OperatorToggled {
        actor: String,
        target_session: String,
    },
    Error(String),
}

#[allow(clippy::too_many_arguments)]
fn handle_channel_mode(
    channel: &str,
    adding: bool,
    flag: char,
    param: Option<&str>,
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    if !matches!(flag, 'o' | 't' | 'm') {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_UNKNOWNMODE, &flag.to_string()),
        );
        return;
    }
    if flag == 'o' && param.is_none() {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "MODE"),
        );
        return;
    }

    let outcome = {
        let mut registry = state.registry.lock();
        let Some(session) = registry.session(session_id) else {
            return;
        };
        let actor = session.nick.clone();
        let target_session =
            param.and_then(|nick| registry.session_id_for_nick(nick).map(str::to_string));
        match registry.channels.get_mut(channel) {
            None => ModeOutcome::Error(rpl::numeric(rpl::ERR_NOSUCHCHANNEL, channel)),
            Some(ch) => match flag {
                'o' => {
                    let nick = param.unwrap_or_default();
                    match target_session {
                        None => ModeOutcome::Error(rpl::numeric(rpl::ERR_NOSUCHNICK, nick)),
                        Some(ts) if !ch.is_member(&ts) => ModeOutcome::Error(rpl::numeric(
                            rpl::ERR_USERNOTINCHANNEL,
                            &format!("{nick} {channel}"),
                        )),
                        Some(_) if !ch.is_operator(session_id) => {
                            ModeOutcome::Error(rpl::numeric(rpl::ERR_CHANOPRIVSNEEDED, channel))
                        }
                        Some(ts) => {
                            if adding {
                                ch.operators.insert(ts.clone());
                            } else {
                                ch.operators.remove(&ts);
                            }
                            ModeOutcome::OperatorToggled {
                                actor,
                                target_session: ts,
                            }
                        }
                    }
                }
                't' | 'm' => {
                    if !ch.is_operator(session_id) {
                        ModeOutcome::Error(rpl::numeric(rpl::ERR_CHANOPRIVSNEEDED, channel))
                    } else {
                        if flag == 't' {
                            ch.topic_locked = adding;
                        } else {
                            ch.moderated = adding;
                        }
                        ModeOutcome::Applied
                    }
                }
                _ => unreachable!("flag validated above"),
            },
        }
    };

    match outcome {
        ModeOutcome::Applied => send(state, session_id, "Mode applied".to_string()),
        ModeOutcome::OperatorToggled {
            actor,
            target_session,
        } => {
            let notice = if adding {
                format!("{actor} has granted you operator status on {channel}")
            } else {
                format!("{actor} has revoked your operator status on {channel}")
            };
            send_to_session(state, &target_session, &notice);
            send(state, session_id, "Mode applied".to_string());
        }
        ModeOutcome::Error(reply) => send(state, session_id, reply),
    }
}

fn handle_user_mode(
    target: &str,
    adding: bool,
    flag: char,
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    if flag != 'i' {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_UNKNOWNMODE, &flag.to_string()),
        );
        return;
    }

    let reply = {
        let mut registry = state.registry.lock();
        match registry.session_id_for_nick(target).map(str::to_string) {
            None => rpl::numeric(rpl::ERR_NOSUCHNICK, target),
            Some(ts) if ts != session_id => rpl::numeric(rpl::ERR_USERSDONTMATCH, target),
            Some(_) => {
                if let Some(session) = registry.sessions.get_mut(session_id) {
                    // +i makes the session invisible.
                    session.visible = !adding;
                }
                "Mode applied".to_string()
            }
        }
    };
    send(state, session_id, reply);
}
