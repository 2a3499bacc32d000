//! Envelope to action translation.

use crate::Action;
use pbftviz_types::{Envelope, EventType, Participant, ReplicaId, SessionConfig};
use std::time::Duration;
use tracing::debug;

impl Action {
    /// Translate a wire envelope into a reducer action.
    ///
    /// `at` is the local time the message is shown at; `current` supplies `n`/`f`
    /// when a `SessionStart` payload omits them. Returns `None` for envelopes
    /// that cannot name the replica they are about (e.g. a `Prepare` sent by the
    /// client), which are dropped.
    pub fn from_envelope(env: &Envelope, at: Duration, current: SessionConfig) -> Option<Action> {
        let eid = env.eid;

        let action = match env.event_type {
            EventType::SessionStart => {
                let n = env.data_i64("n").unwrap_or(i64::from(current.n()));
                let f = env.data_i64("f").unwrap_or(i64::from(current.f()));
                Action::SessionStart {
                    config: SessionConfig::from_requested(n, f),
                }
            }
            EventType::PrimaryElected => Action::PrimaryElected,
            EventType::ClientRequest => Action::ClientRequest {
                to: replicas(&env.to)
                    .into_iter()
                    .next()
                    .unwrap_or(ReplicaId::PRIMARY),
                at,
                eid,
            },
            EventType::PrePrepare => Action::PrePrepare {
                seq: env.seq,
                from: env.sender_replica().unwrap_or(ReplicaId::PRIMARY),
                to: replicas(&env.to),
                at,
                eid,
            },
            EventType::Prepare => Action::Prepare {
                from: sender(env)?,
                to: replicas(&env.to),
                at,
                eid,
            },
            EventType::Commit => Action::Commit {
                from: sender(env)?,
                to: replicas(&env.to),
                at,
                eid,
            },
            EventType::Reply => Action::Reply {
                from: sender(env)?,
                at,
                eid,
            },
        };

        Some(action)
    }
}

fn sender(env: &Envelope) -> Option<ReplicaId> {
    let from = env.sender_replica();
    if from.is_none() {
        debug!(
            eid = env.eid.0,
            event_type = env.event_type.as_str(),
            from = env.from,
            "Dropping replica message without a replica sender"
        );
    }
    from
}

fn replicas(to: &[i64]) -> Vec<ReplicaId> {
    to.iter()
        .filter_map(|&v| Participant::from_wire(v).replica())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbftviz_types::{EventId, SeqNum, MAX_REPLICAS};
    use serde_json::json;

    fn env(event_type: EventType, from: i64, to: &[i64]) -> Envelope {
        let mut env = Envelope::new(
            event_type,
            EventId(7),
            SeqNum(3),
            Participant::from_wire(from),
            &[],
        );
        env.to = to.to_vec();
        env
    }

    #[test]
    fn test_session_start_uses_payload_and_clamps() {
        let e = env(EventType::SessionStart, -1, &[]).with_data(json!({ "n": 4, "f": 5 }));
        let action = Action::from_envelope(&e, Duration::ZERO, SessionConfig::default());
        assert_eq!(
            action,
            Some(Action::SessionStart {
                config: SessionConfig::new(4, 1)
            })
        );
    }

    #[test]
    fn test_session_start_with_huge_n_is_capped() {
        let e = env(EventType::SessionStart, -1, &[])
            .with_data(json!({ "n": 4_000_000_000u64, "f": 0 }));
        let action = Action::from_envelope(&e, Duration::ZERO, SessionConfig::default());
        let Some(Action::SessionStart { config }) = action else {
            panic!("expected SessionStart, got {action:?}");
        };
        assert_eq!(config.n(), MAX_REPLICAS);

        let state = crate::ProtocolState::new().reduce(Action::SessionStart { config });
        assert_eq!(state.node_phase().len(), MAX_REPLICAS as usize);
    }

    #[test]
    fn test_session_start_falls_back_to_current() {
        let e = env(EventType::SessionStart, -1, &[]);
        let current = SessionConfig::new(10, 3);
        let action = Action::from_envelope(&e, Duration::ZERO, current);
        assert_eq!(action, Some(Action::SessionStart { config: current }));
    }

    #[test]
    fn test_pre_prepare_keeps_sequence_and_targets() {
        let e = env(EventType::PrePrepare, 0, &[1, 2, 3, -1]);
        let at = Duration::from_millis(12);
        let action = Action::from_envelope(&e, at, SessionConfig::default());
        assert_eq!(
            action,
            Some(Action::PrePrepare {
                seq: SeqNum(3),
                from: ReplicaId(0),
                to: vec![ReplicaId(1), ReplicaId(2), ReplicaId(3)],
                at,
                eid: EventId(7),
            })
        );
    }

    #[test]
    fn test_client_request_targets_primary() {
        let e = env(EventType::ClientRequest, -1, &[]);
        let action = Action::from_envelope(&e, Duration::ZERO, SessionConfig::default());
        assert!(matches!(
            action,
            Some(Action::ClientRequest { to, .. }) if to == ReplicaId::PRIMARY
        ));
    }

    #[test]
    fn test_replica_messages_require_replica_sender() {
        let config = SessionConfig::default();
        for event_type in [EventType::Prepare, EventType::Commit, EventType::Reply] {
            assert!(Action::from_envelope(&env(event_type, -1, &[]), Duration::ZERO, config).is_none());
            let action = Action::from_envelope(&env(event_type, 2, &[]), Duration::ZERO, config);
            assert_eq!(action.and_then(|a| a.eid()), Some(EventId(7)));
        }
    }

    #[test]
    fn test_primary_elected_is_informational() {
        let e = env(EventType::PrimaryElected, -1, &[]).with_data(json!({ "primary": 0 }));
        let action = Action::from_envelope(&e, Duration::ZERO, SessionConfig::default());
        assert_eq!(action, Some(Action::PrimaryElected));
    }
}
