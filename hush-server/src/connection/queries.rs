//! WHOIS lookups.

use std::sync::Arc;

use crate::replies as rpl;
use crate::server::SharedState;

/// WHOIS: report a session's remote address and nick. An invisible
/// target (`+i`) is indistinguishable from an unknown nick to everyone
/// but itself.
pub(super) fn handle_whois(
    argument: &str,
    state: &Arc<SharedState>,
    session_id: &str,
    send: &impl Fn(&Arc<SharedState>, &str, String),
) {
    let Some(target) = argument.split_whitespace().next() else {
        send(
            state,
            session_id,
            rpl::numeric(rpl::ERR_NEEDMOREPARAMS, "WHOIS"),
        );
        return;
    };

    let reply = {
        let registry = state.registry.lock();
        match registry.session_id_for_nick(target) {
            Some(sid) => match registry.session(sid) {
                Some(session) if session.visible || sid == session_id => Some(format!(
                    ":{} host:{} nick:{}",
                    rpl::RPL_WHOISINFO,
                    session.addr.ip(),
                    session.nick
                )),
                _ => None,
            },
            None => None,
        }
    };

    match reply {
        Some(line) => send(state, session_id, line),
        None => send(state, session_id, rpl::numeric(rpl::ERR_NOSUCHNICK, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{attach, drain, send_fn, test_state};
    use super::*;

    #[test]
    fn reports_target_address_and_nick() {
        let state = test_state();
        let send = send_fn();
        let mut alice_rx = attach(&state, "s1", "alice", 4001);
        let _bob_rx = attach(&state, "s2", "bob", 4002);

        handle_whois("bob", &state, "s1", &send);
        assert_eq!(
            drain(&mut alice_rx),
            vec![":312 host:127.0.0.1 nick:bob".to_string()]
        );
    }

    #[test]
    fn unknown_nick_is_401() {
        let state = test_state();
        let send = send_fn();
        let mut rx = attach(&state, "s1", "alice", 4001);

        handle_whois("ghost", &state, "s1", &send);
        assert_eq!(
            drain(&mut rx),
            vec![":401 ghost :No such nick/channel".to_string()]
        );
    }

    #[test]
    fn invisible_target_looks_unknown_except_to_itself() {
        let state = test_state();
        let send = send_fn();
        let mut alice_rx = attach(&state, "s1", "alice", 4001);
        let mut bob_rx = attach(&state, "s2", "bob", 4002);
        state
            .registry
            .lock()
            .sessions
            .get_mut("s2")
            .unwrap()
            .visible = false;

        handle_whois("bob", &state, "s1", &send);
        assert_eq!(
            drain(&mut alice_rx),
            vec![":401 bob :No such nick/channel".to_string()]
        );

        handle_whois("bob", &state, "s2", &send);
        assert_eq!(
            drain(&mut bob_rx),
            vec![":312 host:127.0.0.1 nick:bob".to_string()]
        );
    }

    #[test]
    fn whois_needs_a_target() {
        let state = test_state();
        let send = send_fn();
        let mut rx = attach(&state, "s1", "alice", 4001);

        handle_whois("", &state, "s1", &send);
        assert_eq!(
            drain(&mut rx),
            vec![":461 WHOIS :Not enough parameters".to_string()]
        );
    }
}
