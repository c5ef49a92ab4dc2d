//! Join gate: hold channel joins until we're identified.

use tracing::info;

use crate::action::{Action, Outbound};
use crate::config::ServicesConfig;
use crate::session::Session;

/// Pass `out` through, or withhold it if it is a join and the policy says
/// to wait for identification.
pub fn out_filter(
    config: &ServicesConfig,
    session: &mut Session,
    out: Outbound,
) -> Option<Outbound> {
    if out.is_join() && !session.identified() && config.hold_joins_until_identified {
        if let Action::Join { channel } = &out.action {
            info!(%channel, "Holding JOIN until identified");
        }
        session.queue_join(out);
        return None;
    }
    Some(out)
}

/// Release every withheld join in insertion order. Leaves the queue empty.
pub fn release(session: &mut Session) -> Vec<Outbound> {
    session.take_queued_joins()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuthState;

    fn join(channel: &str) -> Outbound {
        Outbound::now(Action::Join { channel: channel.into() })
    }

    fn holding() -> ServicesConfig {
        ServicesConfig {
            hold_joins_until_identified: true,
            ..Default::default()
        }
    }

    #[test]
    fn holds_joins_while_unidentified() {
        let cfg = holding();
        let mut session = Session::new();
        assert_eq!(out_filter(&cfg, &mut session, join("#a")), None);
        assert_eq!(out_filter(&cfg, &mut session, join("#b")), None);

        let nick = Outbound::now(Action::Nick { nick: "Bot".into() });
        assert_eq!(out_filter(&cfg, &mut session, nick.clone()), Some(nick));

        assert_eq!(release(&mut session), vec![join("#a"), join("#b")]);
        assert!(release(&mut session).is_empty());
    }

    #[test]
    fn passes_joins_when_policy_off_or_identified() {
        let mut session = Session::new();
        let off = ServicesConfig::default();
        assert_eq!(out_filter(&off, &mut session, join("#a")), Some(join("#a")));

        let cfg = holding();
        session.set_state(AuthState::Identified);
        assert_eq!(out_filter(&cfg, &mut session, join("#a")), Some(join("#a")));
        assert_eq!(session.queued_joins().count(), 0);
    }
}
