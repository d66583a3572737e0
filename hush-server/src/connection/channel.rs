//! Channel lifecycle and roster commands: JOIN, PART, LIST, NAMES,
//! KICK, TOPIC.

use std::sync::Arc;

use crate::proto;
use crate::replies as rpl;
use crate::server::{ChannelState, SharedState};

use super::helpers::{broadcast_to_channel, send_to_session};

enum JoinOutcome {
    Created,
    Joined { nick: String },
    AlreadyMember,
}

/// JOIN: enter a channel, creating it on first use. The creator of a new
/// channel becomes both member and operator.
pub(super) fn handle_join(
    argument: &str,
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let Some(channel) = argument.split_whitespace().next() else {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "JOIN"),
        );
        return;
    };

    let outcome = {
        let mut registry = state.registry.lock();
        let Some(session) = registry.session(session_id) else {
            return;
        };
        let nick = session.nick.clone();
        match registry.channels.get_mut(channel) {
            None => {
                let mut created = ChannelState::default();
                created.members.insert(session_id.to_string());
                created.operators.insert(session_id.to_string());
                registry.channels.insert(channel.to_string(), created);
                JoinOutcome::Created
            }
            Some(ch) if ch.is_member(session_id) => JoinOutcome::AlreadyMember,
            Some(ch) => {
                ch.members.insert(session_id.to_string());
                JoinOutcome::Joined { nick }
            }
        }
    };

    match outcome {
        JoinOutcome::Created => {
            send(state, session_id, format!("You have joined {channel}"));
        }
        JoinOutcome::Joined { nick } => {
            broadcast_to_channel(
                state,
                channel,
                &format!(":{nick}! JOIN {channel}"),
                Some(session_id),
            );
            send(state, session_id, format!("You have joined {channel}"));
        }
        JoinOutcome::AlreadyMember => {
            send(state, session_id, format!("You are already on {channel}"));
        }
    }
}

/// PART: leave a channel. Operator status goes with the membership.
pub(super) fn handle_part(
    argument: &str,
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let Some(channel) = argument.split_whitespace().next() else {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "PART"),
        );
        return;
    };

    let nick = {
        let mut registry = state.registry.lock();
        let Some(session) = registry.session(session_id) else {
            return;
        };
        let nick = session.nick.clone();
        let was_member = registry
            .channels
            .get_mut(channel)
            .map(|ch| ch.remove_member(session_id))
            .unwrap_or(false);
        if !was_member {
            drop(registry);
            send(
                state,
                session_id,
                rpl::numeric(rpl::ERR_NOTONCHANNEL, channel),
            );
            return;
        }
        nick
    };

    broadcast_to_channel(state, channel, &format!(":{nick}! PART {channel}"), None);
    send(state, session_id, format!("You have left {channel}"));
}

/// LIST: all channel names, space-joined. Empty channels are listed too,
/// since channels are never pruned.
pub(super) fn handle_list(
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let mut names: Vec<String> = state.registry.lock().channels.keys().cloned().collect();
    names.sort();
    send(state, session_id, format!("Channels: {}", names.join(" ")));
}

/// NAMES: the member nicks of one channel.
pub(super) fn handle_names(
    argument: &str,
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let Some(channel) = argument.split_whitespace().next() else {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "NAMES"),
        );
        return;
    };

    let reply = {
        let registry = state.registry.lock();
        match registry.channels.get(channel) {
            None => None,
            Some(ch) => {
                let mut nicks: Vec<&str> = ch
                    .members
                    .iter()
                    .filter_map(|sid| registry.session(sid).map(|s| s.nick.as_str()))
                    .collect();
                nicks.sort_unstable();
                Some(nicks.join(" "))
            }
        }
    };

    match reply {
        Some(nicks) => {
            send(
                state,
                session_id,
                format!(":{} {channel} :{nicks}", rpl::RPL_NAMREPLY),
            );
            send(state, session_id, rpl::numeric(rpl::RPL_ENDOFNAMES, channel));
        }
        None => send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NOSUCHCHANNEL, channel),
        ),
    }
}

enum KickOutcome {
    Kicked {
        kicker: String,
        target_nick: String,
        target_session: String,
    },
    Error(String),
}

/// KICK: an operator ejects a member. Argument is
/// `<channel> <nick> [reason…]`.
pub(super) fn handle_kick(
    argument: &str,
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let (channel, rest) = proto::split_arg(argument);
    let (target, reason) = proto::split_arg(rest);
    if channel.is_empty() || target.is_empty() {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "KICK"),
        );
        return;
    }
    let reason = if reason.is_empty() { "Kicked" } else { reason };

    // Lookups before authorization; an authorization failure must leave
    // the roster untouched.
    let outcome = {
        let mut registry = state.registry.lock();
        let Some(session) = registry.session(session_id) else {
            return;
        };
        let kicker = session.nick.clone();
        let target_session = registry
            .session_id_for_nick(target)
            .map(str::to_string);
        match registry.channels.get_mut(channel) {
            None => KickOutcome::Error(rpl::numeric(rpl::ERR_NOSUCHCHANNEL, channel)),
            Some(ch) if !ch.is_member(session_id) => {
                KickOutcome::Error(rpl::numeric(rpl::ERR_NOTONCHANNEL, channel))
            }
            Some(ch) => match target_session {
                Some(ts) if ch.is_member(&ts) => {
                    if !ch.is_operator(session_id) {
                        KickOutcome::Error(rpl::numeric(rpl::ERR_CHANOPRIVSNEEDED, channel))
                    } else {
                        ch.remove_member(&ts);
                        KickOutcome::Kicked {
                            kicker,
                            target_nick: target.to_string(),
                            target_session: ts,
                        }
                    }
                }
                _ => KickOutcome::Error(rpl::numeric(
                    rpl::ERR_USERNOTINCHANNEL,
                    &format!("{target} {channel}"),
                )),
            },
        }
    };

    match outcome {
        KickOutcome::Kicked {
            kicker,
            target_nick,
            target_session,
        } => {
            send_to_session(
                state,
                &target_session,
                &format!("You have been kicked from {channel}: {reason}"),
            );
            let line = format!(":{kicker}! KICK {channel} {target_nick} :{reason}");
            broadcast_to_channel(state, channel, &line, Some(session_id));
            send(state, session_id, line);
        }
        KickOutcome::Error(reply) => send(state, session_id, reply),
    }
}

enum TopicOutcome {
    Current(String),
    NoTopic,
    Set { nick: String },
    Error(String),
}

/// TOPIC: query with `<channel>`, set with `<channel> <topic…>`. Setting
/// on a `+t` channel requires operator status.
pub(super) fn handle_topic(
    argument: &str,
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let (channel, new_topic) = proto::split_arg(argument);
    if channel.is_empty() {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "TOPIC"),
        );
        return;
    }

    let outcome = {
        let mut registry = state.registry.lock();
        let Some(session) = registry.session(session_id) else {
            return;
        };
        let nick = session.nick.clone();
        match registry.channels.get_mut(channel) {
            None => TopicOutcome::Error(rpl::numeric(rpl::ERR_NOSUCHCHANNEL, channel)),
            Some(ch) if new_topic.is_empty() => {
                if ch.topic.is_empty() {
                    TopicOutcome::NoTopic
                } else {
                    TopicOutcome::Current(ch.topic.clone())
                }
            }
            Some(ch) if !ch.is_member(session_id) => {
                TopicOutcome::Error(rpl::numeric(rpl::ERR_NOTONCHANNEL, channel))
            }
            Some(ch) if ch.topic_locked && !ch.is_operator(session_id) => {
                TopicOutcome::Error(rpl::numeric(rpl::ERR_CHANOPRIVSNEEDED, channel))
            }
            Some(ch) => {
                ch.topic = new_topic.to_string();
                TopicOutcome::Set { nick }
            }
        }
    };

    match outcome {
        TopicOutcome::Current(topic) => send(
            state,
            session_id,
            format!(":{} {channel} :{topic}", rpl::RPL_TOPIC),
        ),
        TopicOutcome::NoTopic => send(state, session_id, rpl::numeric(rpl::RPL_NOTOPIC, channel)),
        TopicOutcome::Set { nick } => {
            let line = format!(":{nick}! TOPIC {channel} :{new_topic}");
            broadcast_to_channel(state, channel, &line, Some(session_id));
            send(state, session_id, line);
        }
        TopicOutcome::Error(reply) => send(state, session_id, reply),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{attach, drain, send_fn, test_state};
    use super::*;

    #[test]
    fn join_creates_channel_with_creator_as_member_and_operator() {
        let state = test_state();
        let send = send_fn();
        let mut rx = attach(&state, "s1", "alice", 4001);

        handle_join("#rust", &state, "s1", &send);

        assert_eq!(drain(&mut rx), vec!["You have joined #rust".to_string()]);
        let registry = state.registry.lock();
        let ch = &registry.channels["#rust"];
        assert!(ch.is_member("s1"));
        assert!(ch.is_operator("s1"));
    }

    #[test]
    fn join_existing_channel_announces_to_members_not_joiner() {
        let state = test_state();
        let send = send_fn();
        let mut alice_rx = attach(&state, "s1", "alice", 4001);
        let mut bob_rx = attach(&state, "s2", "bob", 4002);
        handle_join("#rust", &state, "s1", &send);
        drain(&mut alice_rx);

        handle_join("#rust", &state, "s2", &send);

        assert_eq!(drain(&mut alice_rx), vec![":bob! JOIN #rust".to_string()]);
        assert_eq!(drain(&mut bob_rx), vec!["You have joined #rust".to_string()]);
        // Late joiners are plain members, not operators.
        let registry = state.registry.lock();
        assert!(!registry.channels["#rust"].is_operator("s2"));
    }

    #[test]
    fn join_is_idempotent_per_member() {
        let state = test_state();
        let send = send_fn();
        let mut rx = attach(&state, "s1", "alice", 4001);
        handle_join("#rust", &state, "s1", &send);
        drain(&mut rx);

        handle_join("#rust", &state, "s1", &send);

        assert_eq!(drain(&mut rx), vec!["You are already on #rust".to_string()]);
        let registry = state.registry.lock();
        assert_eq!(registry.channels["#rust"].members.len(), 1);
        // Re-joining does not grant operator status on an existing channel.
        assert!(registry.channels["#rust"].is_operator("s1"));
    }

    #[test]
    fn racing_first_joins_create_one_channel_with_one_operator() {
        let state = test_state();
        let mut alice_rx = attach(&state, "s1", "alice", 4001);
        let mut bob_rx = attach(&state, "s2", "bob", 4002);

        std::thread::scope(|scope| {
            for session_id in ["s1", "s2"] {
                let state = state.clone();
                scope.spawn(move || {
                    let send = send_fn();
                    handle_join("#race", &state, session_id, &send);
                });
            }
        });

        let registry = state.registry.lock();
        let ch = &registry.channels["#race"];
        assert!(ch.is_member("s1"));
        assert!(ch.is_member("s2"));
        // Whichever join was ordered first created the channel and is
        // its only operator.
        assert_eq!(ch.operators.len(), 1);
        assert!(ch.operators.iter().all(|sid| ch.members.contains(sid)));
        drop(registry);

        for rx in [&mut alice_rx, &mut bob_rx] {
            let lines = drain(rx);
            assert!(
                lines.iter().any(|l| l == "You have joined #race"),
                "missing join confirmation in {lines:?}"
            );
        }
    }

    #[test]
    fn part_requires_membership() {
        let state = test_state();
        let send = send_fn();
        let mut rx = attach(&state, "s1", "alice", 4001);

        handle_part("#nope", &state, "s1", &send);
        assert_eq!(
            drain(&mut rx),
            vec![":442 #nope :You're not on that channel".to_string()]
        );
    }

    #[test]
    fn part_removes_membership_and_operator_status() {
        let state = test_state();
        let send = send_fn();
        let mut alice_rx = attach(&state, "s1", "alice", 4001);
        let mut bob_rx = attach(&state, "s2", "bob", 4002);
        handle_join("#rust", &state, "s1", &send);
        handle_join("#rust", &state, "s2", &send);
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        handle_part("#rust", &state, "s1", &send);

        assert_eq!(drain(&mut bob_rx), vec![":alice! PART #rust".to_string()]);
        assert_eq!(drain(&mut alice_rx), vec!["You have left #rust".to_string()]);
        let registry = state.registry.lock();
        let ch = &registry.channels["#rust"];
        assert!(!ch.is_member("s1"));
        assert!(!ch.is_operator("s1"));
        // The channel survives its creator leaving.
        assert!(registry.channels.contains_key("#rust"));
    }

    #[test]
    fn list_reports_all_channels() {
        let state = test_state();
        let send = send_fn();
        let mut rx = attach(&state, "s1", "alice", 4001);
        handle_join("#rust", &state, "s1", &send);
        drain(&mut rx);

        handle_list(&state, "s1", &send);

        assert_eq!(
            drain(&mut rx),
            vec!["Channels: #General #rust".to_string()]
        );
    }

    #[test]
    fn names_lists_members_or_403() {
        let state = test_state();
        let send = send_fn();
        let mut rx = attach(&state, "s1", "alice", 4001);
        let _bob = attach(&state, "s2", "bob", 4002);

        handle_names("#General", &state, "s1", &send);
        assert_eq!(
            drain(&mut rx),
            vec![
                ":353 #General :alice bob".to_string(),
                ":366 #General :End of member list".to_string(),
            ]
        );

        handle_names("#nope", &state, "s1", &send);
        assert_eq!(
            drain(&mut rx),
            vec![":403 #nope :No such channel".to_string()]
        );
    }

    #[test]
    fn kick_requires_operator_and_does_not_mutate_on_failure() {
        let state = test_state();
        let send = send_fn();
        let mut alice_rx = attach(&state, "s1", "alice", 4001);
        let mut bob_rx = attach(&state, "s2", "bob", 4002);
        handle_join("#rust", &state, "s1", &send);
        handle_join("#rust", &state, "s2", &send);
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        // bob is not an operator
        handle_kick("#rust alice spam", &state, "s2", &send);
        assert_eq!(
            drain(&mut bob_rx),
            vec![":482 #rust :You're not channel operator".to_string()]
        );
        assert!(state.registry.lock().channels["#rust"].is_member("s1"));
    }

    #[test]
    fn kick_removes_target_and_notifies_everyone() {
        let state = test_state();
        let send = send_fn();
        let mut alice_rx = attach(&state, "s1", "alice", 4001);
        let mut bob_rx = attach(&state, "s2", "bob", 4002);
        let mut carol_rx = attach(&state, "s3", "carol", 4003);
        handle_join("#rust", &state, "s1", &send);
        handle_join("#rust", &state, "s2", &send);
        handle_join("#rust", &state, "s3", &send);
        drain(&mut alice_rx);
        drain(&mut bob_rx);
        drain(&mut carol_rx);

        handle_kick("#rust bob flooding the channel", &state, "s1", &send);

        assert_eq!(
            drain(&mut bob_rx),
            vec!["You have been kicked from #rust: flooding the channel".to_string()]
        );
        assert_eq!(
            drain(&mut carol_rx),
            vec![":alice! KICK #rust bob :flooding the channel".to_string()]
        );
        assert_eq!(
            drain(&mut alice_rx),
            vec![":alice! KICK #rust bob :flooding the channel".to_string()]
        );
        let registry = state.registry.lock();
        let ch = &registry.channels["#rust"];
        assert!(!ch.is_member("s2"));
        assert!(!ch.is_operator("s2"));
    }

    #[test]
    fn kick_unknown_target_is_441() {
        let state = test_state();
        let send = send_fn();
        let mut rx = attach(&state, "s1", "alice", 4001);
        handle_join("#rust", &state, "s1", &send);
        drain(&mut rx);

        handle_kick("#rust ghost", &state, "s1", &send);
        assert_eq!(
            drain(&mut rx),
            vec![":441 ghost #rust :They aren't on that channel".to_string()]
        );
    }

    #[test]
    fn topic_query_reports_331_then_current_topic() {
        let state = test_state();
        let send = send_fn();
        let mut rx = attach(&state, "s1", "alice", 4001);

        handle_topic("#General", &state, "s1", &send);
        assert_eq!(
            drain(&mut rx),
            vec![":331 #General :No topic is set".to_string()]
        );

        handle_topic("#General all things hush", &state, "s1", &send);
        drain(&mut rx);
        handle_topic("#General", &state, "s1", &send);
        assert_eq!(
            drain(&mut rx),
            vec![":332 #General :all things hush".to_string()]
        );
    }

    #[test]
    fn topic_set_broadcasts_to_other_members() {
        let state = test_state();
        let send = send_fn();
        let mut alice_rx = attach(&state, "s1", "alice", 4001);
        let mut bob_rx = attach(&state, "s2", "bob", 4002);

        handle_topic("#General welcome in", &state, "s1", &send);

        assert_eq!(
            drain(&mut bob_rx),
            vec![":alice! TOPIC #General :welcome in".to_string()]
        );
        assert_eq!(
            drain(&mut alice_rx),
            vec![":alice! TOPIC #General :welcome in".to_string()]
        );
    }

    #[test]
    fn locked_topic_rejects_non_operators_without_mutating() {
        let state = test_state();
        let send = send_fn();
        let mut alice_rx = attach(&state, "s1", "alice", 4001);
        let mut bob_rx = attach(&state, "s2", "bob", 4002);
        handle_join("#rust", &state, "s1", &send);
        handle_join("#rust", &state, "s2", &send);
        handle_topic("#rust original", &state, "s1", &send);
        state
            .registry
            .lock()
            .channels
            .get_mut("#rust")
            .unwrap()
            .topic_locked = true;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        handle_topic("#rust hijacked", &state, "s2", &send);

        assert_eq!(
            drain(&mut bob_rx),
            vec![":482 #rust :You're not channel operator".to_string()]
        );
        assert_eq!(
            state.registry.lock().channels["#rust"].topic,
            "original".to_string()
        );

        // The operator can still change it.
        handle_topic("#rust updated", &state, "s1", &send);
        assert_eq!(state.registry.lock().channels["#rust"].topic, "updated");
    }
}
