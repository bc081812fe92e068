use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::ids::{new_opaque_id, new_session_code};
use super::{
    end_after, Participant, ParticipantInput, ParticipantStatus, Session, SessionState,
    SessionUpdate, SessionView,
};
use crate::error::{ProctorError, Result};
use crate::hub::{HubHandle, Notification};
use crate::persistence::{PersistQueue, RegistrySnapshot, SessionStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub code: String,
    /// False when the durable save failed; the session still exists in memory
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Joined {
    pub participant_id: String,
    pub already_joined: bool,
}

/// Authoritative store of every session and its participants.
///
/// Mutations hold the write lock only for in-memory work. Before the lock is
/// released it is downgraded to a read lock while the snapshot is queued for
/// persistence and the hub is notified, so both see commits in order without
/// blocking readers.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    hub: HubHandle,
    persist: PersistQueue,
}

impl SessionRegistry {
    pub fn new(snapshot: RegistrySnapshot, hub: HubHandle, persist: PersistQueue) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(snapshot),
            hub,
            persist,
        })
    }

    /// Restores the registry from `store`, starting empty when it holds nothing
    pub async fn load(store: Arc<dyn SessionStore>, hub: HubHandle) -> Result<Arc<Self>> {
        let reader = store.clone();
        let snapshot = tokio::task::spawn_blocking(move || reader.load())
            .await
            .map_err(|e| ProctorError::internal(format!("load task failed: {}", e)))??
            .unwrap_or_default();

        tracing::info!(sessions = snapshot.len(), "Session registry restored");
        Ok(Self::new(snapshot, hub, PersistQueue::new(store)))
    }

    /// Create a new session in the Waiting state
    pub async fn create_session(&self, name: String, host_id: String, secret: String) -> SessionCreated {
        let mut sessions = self.sessions.write().await;

        let code = loop {
            let candidate = new_session_code();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
            tracing::debug!(code = %candidate, "Session code collision, regenerating");
        };

        sessions.insert(code.clone(), Session::new(code.clone(), name, host_id, secret));
        tracing::info!(code = %code, "Session created");

        let sessions = sessions.downgrade();
        let ack = self.persist.enqueue_durable((*sessions).clone());
        self.hub.publish(Notification::list_changed());
        drop(sessions);

        let persisted = match ack.await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(code = %code, error = %e, "New session not persisted");
                false
            }
            Err(_) => false,
        };

        SessionCreated { code, persisted }
    }

    /// Move a Waiting session to Active, returning its start and optional end
    pub async fn start_session(
        &self,
        code: &str,
        secret: &str,
    ) -> Result<(DateTime<Utc>, Option<DateTime<Utc>>)> {
        let mut sessions = self.sessions.write().await;
        let session = authorized(&mut sessions, code, secret)?;

        if session.state != SessionState::Waiting {
            return Err(ProctorError::InvalidState {
                code: code.to_string(),
                state: session.state,
            });
        }

        let now = Utc::now();
        session.activate(now)?;
        let end_time = session.end_time;
        let view = session.view();
        tracing::info!(code = %code, end_time = ?end_time, "Session started");

        let sessions = sessions.downgrade();
        self.after_commit(
            &sessions,
            [Notification::session_changed(view), Notification::list_changed()],
        );

        Ok((now, end_time))
    }

    /// Apply the supplied fields of `update`. State changes are not validated
    /// beyond deriving timestamps for Waiting -> Active.
    pub async fn update_session(&self, code: &str, secret: &str, update: SessionUpdate) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = authorized(&mut sessions, code, secret)?;

        // Everything that can fail is checked before the first field changes.
        let now = Utc::now();
        let activating =
            update.state == Some(SessionState::Active) && session.state == SessionState::Waiting;
        let retimed = update.time_allocated_secs.is_some() && session.state == SessionState::Active;
        let new_end = if activating || update.time_allocated_secs.is_some() {
            let secs = update.time_allocated_secs.unwrap_or(session.time_allocated_secs);
            let start = if activating { now } else { session.start_time.unwrap_or(now) };
            Some(end_after(start, secs)?)
        } else {
            None
        };

        if let Some(name) = update.name {
            session.name = name;
        }
        if let Some(sets) = update.sets {
            session.sets = sets;
        }
        if let Some(secs) = update.time_allocated_secs {
            session.time_allocated_secs = secs;
        }
        if activating {
            session.state = SessionState::Active;
            session.start_time = Some(now);
            session.end_time = new_end.flatten();
        } else {
            if retimed {
                session.end_time = new_end.flatten();
            }
            if let Some(state) = update.state {
                session.state = state;
            }
        }

        let view = session.view();
        tracing::info!(code = %code, state = ?view.state, "Session updated");

        let sessions = sessions.downgrade();
        self.after_commit(
            &sessions,
            [Notification::session_changed(view), Notification::list_changed()],
        );
        Ok(())
    }

    /// Join a session; repeated joins by the same user id or registration
    /// number return the existing participant
    pub async fn join_session(
        &self,
        code: &str,
        input: ParticipantInput,
        origin_address: &str,
    ) -> Result<Joined> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(code)
            .ok_or_else(|| ProctorError::SessionNotFound(code.to_string()))?;

        if let Some(existing) = session.find_existing(&input) {
            tracing::debug!(code = %code, participant_id = %existing.id, "Participant already in session");
            return Ok(Joined {
                participant_id: existing.id.clone(),
                already_joined: true,
            });
        }

        let participant = Participant {
            id: new_opaque_id(),
            user_id: input.user_id,
            username: input.username,
            reg_no: input.reg_no,
            status: ParticipantStatus::Online,
            selected_set: input.selected_set,
            origin_address: origin_address.to_string(),
            last_seen: Utc::now(),
            score: None,
        };
        let participant_id = participant.id.clone();
        tracing::info!(
            code = %code,
            participant_id = %participant_id,
            user_id = %participant.user_id,
            origin = %origin_address,
            "Participant joined session"
        );
        session.participants.push(participant);
        let view = session.view();

        let sessions = sessions.downgrade();
        self.after_commit(&sessions, [Notification::session_changed(view)]);

        Ok(Joined {
            participant_id,
            already_joined: false,
        })
    }

    /// Admin override of a participant's status, matched by external user id
    pub async fn set_participant_status(
        &self,
        code: &str,
        secret: &str,
        user_id: &str,
        status: ParticipantStatus,
    ) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = authorized(&mut sessions, code, secret)?;

        let participant = session
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| ProctorError::ParticipantNotFound(user_id.to_string()))?;
        participant.status = status;
        tracing::info!(code = %code, user_id = %user_id, status = ?status, "Participant status set");
        let view = session.view();

        let sessions = sessions.downgrade();
        self.after_commit(&sessions, [Notification::session_changed(view)]);
        Ok(())
    }

    /// Liveness ping from a participant. Refreshes last-seen and brings an
    /// Offline participant back Online. Not persisted.
    pub async fn record_ping(&self, code: &str, participant_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(code)
            .ok_or_else(|| ProctorError::SessionNotFound(code.to_string()))?;
        let participant = session
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
            .ok_or_else(|| ProctorError::ParticipantNotFound(participant_id.to_string()))?;

        participant.last_seen = Utc::now();
        if participant.status == ParticipantStatus::Offline {
            participant.status = ParticipantStatus::Online;
        }
        let view = session.view();

        let _sessions = sessions.downgrade();
        self.hub.publish(Notification::session_changed(view));
        Ok(())
    }

    pub async fn get_session(&self, code: &str) -> Result<SessionView> {
        let sessions = self.sessions.read().await;
        sessions
            .get(code)
            .map(Session::view)
            .ok_or_else(|| ProctorError::SessionNotFound(code.to_string()))
    }

    /// Every known session regardless of state, ordered by code
    pub async fn list_sessions(&self) -> Vec<SessionView> {
        let sessions = self.sessions.read().await;
        let mut views: Vec<SessionView> = sessions.values().map(Session::view).collect();
        views.sort_by(|a, b| a.code.cmp(&b.code));
        views
    }

    /// Writes the current registry and waits for the store to confirm
    pub async fn flush(&self) -> Result<()> {
        let ack = {
            let sessions = self.sessions.read().await;
            self.persist.enqueue_durable((*sessions).clone())
        };
        match ack.await {
            Ok(result) => result.map_err(ProctorError::Io),
            Err(_) => Err(ProctorError::Io("persistence writer stopped".to_string())),
        }
    }

    fn after_commit<I>(&self, sessions: &RegistrySnapshot, notifications: I)
    where
        I: IntoIterator<Item = Notification>,
    {
        self.persist.enqueue(sessions.clone());
        for notification in notifications {
            self.hub.publish(notification);
        }
    }
}

/// Looks up `code` and checks `secret`, in that order
fn authorized<'a>(
    sessions: &'a mut HashMap<String, Session>,
    code: &str,
    secret: &str,
) -> Result<&'a mut Session> {
    let session = sessions
        .get_mut(code)
        .ok_or_else(|| ProctorError::SessionNotFound(code.to_string()))?;
    if !session.authorize(secret) {
        tracing::warn!(code = %code, "Rejected admin request with invalid secret");
        return Err(ProctorError::Unauthorized(code.to_string()));
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Frame, Hub, NotificationKind, Topic};
    use crate::persistence::MemoryStore;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn registry_with(store: Arc<MemoryStore>) -> (Arc<SessionRegistry>, HubHandle) {
        let hub = Hub::spawn();
        let registry = SessionRegistry::new(
            RegistrySnapshot::new(),
            hub.clone(),
            PersistQueue::new(store),
        );
        (registry, hub)
    }

    fn registry() -> Arc<SessionRegistry> {
        registry_with(Arc::new(MemoryStore::new())).0
    }

    fn student(user_id: &str, reg_no: &str) -> ParticipantInput {
        ParticipantInput {
            user_id: user_id.to_string(),
            username: format!("Student {}", user_id),
            reg_no: reg_no.to_string(),
            selected_set: "SetA".to_string(),
        }
    }

    async fn create(registry: &SessionRegistry) -> String {
        registry
            .create_session("Algo101".into(), "P1".into(), "k1".into())
            .await
            .code
    }

    async fn next(rx: &mut mpsc::Receiver<Frame>) -> Notification {
        let frame = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("viewer queue closed");
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_exam_room_scenario() {
        let registry = registry();
        let code = create(&registry).await;
        assert_eq!(code.len(), 6);

        let first = registry.join_session(&code, student("u1", "R1"), "10.0.0.2:4000").await.unwrap();
        assert!(!first.already_joined);
        let again = registry.join_session(&code, student("u1", "R1"), "10.0.0.2:4001").await.unwrap();
        assert_eq!(again.participant_id, first.participant_id);
        assert!(again.already_joined);
        assert_eq!(registry.get_session(&code).await.unwrap().participants.len(), 1);

        let (start, _) = registry.start_session(&code, "k1").await.unwrap();
        let view = registry.get_session(&code).await.unwrap();
        assert_eq!(view.state, SessionState::Active);
        assert_eq!(view.start_time, Some(start));

        let err = registry.start_session(&code, "k1").await.unwrap_err();
        assert!(matches!(err, ProctorError::InvalidState { state: SessionState::Active, .. }));

        let err = registry
            .set_participant_status(&code, "wrong", "u1", ParticipantStatus::Flagged)
            .await
            .unwrap_err();
        assert!(matches!(err, ProctorError::Unauthorized(_)));
        let view = registry.get_session(&code).await.unwrap();
        assert_eq!(view.participants[0].status, ParticipantStatus::Online);
    }

    #[tokio::test]
    async fn test_join_dedup_by_reg_no() {
        let registry = registry();
        let code = create(&registry).await;

        let a = registry.join_session(&code, student("u1", "R1"), "addr").await.unwrap();
        let b = registry.join_session(&code, student("u2", "R1"), "addr").await.unwrap();
        assert_eq!(a.participant_id, b.participant_id);

        // Empty registration numbers never collide.
        registry.join_session(&code, student("u3", ""), "addr").await.unwrap();
        registry.join_session(&code, student("u4", ""), "addr").await.unwrap();

        let view = registry.get_session(&code).await.unwrap();
        let users: Vec<&str> = view.participants.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(users, vec!["u1", "u3", "u4"]);
    }

    #[tokio::test]
    async fn test_join_captures_origin_and_defaults() {
        let registry = registry();
        let code = create(&registry).await;
        let joined = registry.join_session(&code, student("u1", "R1"), "192.168.1.20:53211").await.unwrap();

        let view = registry.get_session(&code).await.unwrap();
        let p = &view.participants[0];
        assert_eq!(p.id, joined.participant_id);
        assert_eq!(p.origin_address, "192.168.1.20:53211");
        assert_eq!(p.status, ParticipantStatus::Online);
        assert_eq!(p.selected_set, "SetA");
        assert!(p.score.is_none());
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let registry = registry();
        assert!(matches!(
            registry.join_session("NOPE00", student("u1", ""), "addr").await,
            Err(ProctorError::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.start_session("NOPE00", "k1").await,
            Err(ProctorError::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.get_session("NOPE00").await,
            Err(ProctorError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_start_rejected_outside_waiting() {
        let registry = registry();
        for state in [
            SessionState::Active,
            SessionState::NetworkLoss,
            SessionState::Paused,
            SessionState::Complete,
        ] {
            let code = create(&registry).await;
            registry.start_session(&code, "k1").await.unwrap();
            let update = SessionUpdate {
                state: Some(state),
                ..Default::default()
            };
            registry.update_session(&code, "k1", update).await.unwrap();
            let before = registry.get_session(&code).await.unwrap();

            let err = registry.start_session(&code, "k1").await.unwrap_err();
            assert!(matches!(err, ProctorError::InvalidState { state: s, .. } if s == state));
            assert_eq!(registry.get_session(&code).await.unwrap(), before);
        }
    }

    #[tokio::test]
    async fn test_start_end_time_follows_allotted_duration() {
        let registry = registry();

        let bounded = create(&registry).await;
        let update = SessionUpdate {
            time_allocated_secs: Some(5400),
            ..Default::default()
        };
        registry.update_session(&bounded, "k1", update).await.unwrap();
        let (start, end) = registry.start_session(&bounded, "k1").await.unwrap();
        assert_eq!(end, Some(start + chrono::Duration::seconds(5400)));

        let unbounded = create(&registry).await;
        let (_, end) = registry.start_session(&unbounded, "k1").await.unwrap();
        assert_eq!(end, None);
        assert_eq!(registry.get_session(&unbounded).await.unwrap().end_time, None);
    }

    #[tokio::test]
    async fn test_wrong_secret_never_applies_update() {
        let registry = registry();
        let code = create(&registry).await;
        registry.join_session(&code, student("u1", "R1"), "addr").await.unwrap();
        let before = registry.get_session(&code).await.unwrap();

        let update = SessionUpdate {
            name: Some("Hijacked".into()),
            time_allocated_secs: Some(60),
            state: Some(SessionState::Complete),
            ..Default::default()
        };
        for secret in ["", "k2", "K1", "k1\n"] {
            assert!(matches!(
                registry.update_session(&code, secret, update.clone()).await,
                Err(ProctorError::Unauthorized(_))
            ));
            assert!(matches!(
                registry
                    .set_participant_status(&code, secret, "u1", ParticipantStatus::Flagged)
                    .await,
                Err(ProctorError::Unauthorized(_))
            ));
        }
        assert_eq!(registry.get_session(&code).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_update_applies_only_supplied_fields() {
        let registry = registry();
        let code = create(&registry).await;

        let mut sets = HashMap::new();
        sets.insert("SetA".to_string(), "http://lan/a.pdf".to_string());
        let update = SessionUpdate {
            sets: Some(sets.clone()),
            ..Default::default()
        };
        registry.update_session(&code, "k1", update).await.unwrap();

        let view = registry.get_session(&code).await.unwrap();
        assert_eq!(view.name, "Algo101");
        assert_eq!(view.sets, sets);
        assert_eq!(view.state, SessionState::Waiting);
        assert_eq!(view.time_allocated_secs, 0);
    }

    #[tokio::test]
    async fn test_update_to_active_from_waiting_sets_times() {
        let registry = registry();
        let code = create(&registry).await;

        let update = SessionUpdate {
            time_allocated_secs: Some(600),
            state: Some(SessionState::Active),
            ..Default::default()
        };
        registry.update_session(&code, "k1", update).await.unwrap();

        let view = registry.get_session(&code).await.unwrap();
        let start = view.start_time.unwrap();
        assert_eq!(view.state, SessionState::Active);
        assert_eq!(view.end_time, Some(start + chrono::Duration::seconds(600)));
    }

    #[tokio::test]
    async fn test_duration_change_while_active_moves_end_time() {
        let registry = registry();
        let code = create(&registry).await;
        let update = SessionUpdate {
            time_allocated_secs: Some(3600),
            ..Default::default()
        };
        registry.update_session(&code, "k1", update).await.unwrap();
        let (start, _) = registry.start_session(&code, "k1").await.unwrap();

        let shorten = SessionUpdate {
            time_allocated_secs: Some(1800),
            ..Default::default()
        };
        registry.update_session(&code, "k1", shorten).await.unwrap();
        let view = registry.get_session(&code).await.unwrap();
        assert_eq!(view.start_time, Some(start));
        assert_eq!(view.end_time, Some(start + chrono::Duration::seconds(1800)));

        let unbounded = SessionUpdate {
            time_allocated_secs: Some(0),
            ..Default::default()
        };
        registry.update_session(&code, "k1", unbounded).await.unwrap();
        assert_eq!(registry.get_session(&code).await.unwrap().end_time, None);
    }

    #[tokio::test]
    async fn test_out_of_range_duration_rejected_without_partial_update() {
        let registry = registry();
        let code = create(&registry).await;
        let (start, _) = registry.start_session(&code, "k1").await.unwrap();

        for secs in [10_000_000_000_000, u64::MAX] {
            let update = SessionUpdate {
                name: Some("Renamed".into()),
                time_allocated_secs: Some(secs),
                ..Default::default()
            };
            let err = registry.update_session(&code, "k1", update).await.unwrap_err();
            assert!(matches!(err, ProctorError::InvalidDuration(v) if v == secs));

            let view = registry.get_session(&code).await.unwrap();
            assert_eq!(view.name, "Algo101");
            assert_eq!(view.time_allocated_secs, 0);
            assert_eq!(view.start_time, Some(start));
            assert_eq!(view.end_time, None);
        }
    }

    #[tokio::test]
    async fn test_waiting_session_rejects_out_of_range_duration() {
        let registry = registry();
        let code = create(&registry).await;
        let update = SessionUpdate {
            time_allocated_secs: Some(u64::MAX),
            ..Default::default()
        };
        let err = registry.update_session(&code, "k1", update).await.unwrap_err();
        assert_eq!(err.status_code(), warp::http::StatusCode::BAD_REQUEST);

        let (start, end) = registry.start_session(&code, "k1").await.unwrap();
        assert_eq!(end, None);
        assert_eq!(registry.get_session(&code).await.unwrap().start_time, Some(start));
    }

    #[tokio::test]
    async fn test_admin_transitions_are_permissive() {
        let registry = registry();
        let code = create(&registry).await;
        registry.start_session(&code, "k1").await.unwrap();

        for state in [SessionState::Complete, SessionState::Waiting, SessionState::Paused] {
            let update = SessionUpdate {
                state: Some(state),
                ..Default::default()
            };
            registry.update_session(&code, "k1", update).await.unwrap();
            assert_eq!(registry.get_session(&code).await.unwrap().state, state);
        }
    }

    #[tokio::test]
    async fn test_status_set_unconditionally() {
        let registry = registry();
        let code = create(&registry).await;
        registry.join_session(&code, student("u1", "R1"), "addr").await.unwrap();

        for status in [
            ParticipantStatus::Submitted,
            ParticipantStatus::Flagged,
            ParticipantStatus::Online,
            ParticipantStatus::Offline,
        ] {
            registry.set_participant_status(&code, "k1", "u1", status).await.unwrap();
            assert_eq!(registry.get_session(&code).await.unwrap().participants[0].status, status);
        }

        assert!(matches!(
            registry
                .set_participant_status(&code, "k1", "ghost", ParticipantStatus::Flagged)
                .await,
            Err(ProctorError::ParticipantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ping_revives_offline_participant() {
        let registry = registry();
        let code = create(&registry).await;
        let joined = registry.join_session(&code, student("u1", "R1"), "addr").await.unwrap();
        let before = registry.get_session(&code).await.unwrap().participants[0].last_seen;

        registry
            .set_participant_status(&code, "k1", "u1", ParticipantStatus::Offline)
            .await
            .unwrap();
        registry.record_ping(&code, &joined.participant_id).await.unwrap();

        let p = registry.get_session(&code).await.unwrap().participants[0].clone();
        assert_eq!(p.status, ParticipantStatus::Online);
        assert!(p.last_seen >= before);

        registry
            .set_participant_status(&code, "k1", "u1", ParticipantStatus::Flagged)
            .await
            .unwrap();
        registry.record_ping(&code, &joined.participant_id).await.unwrap();
        assert_eq!(
            registry.get_session(&code).await.unwrap().participants[0].status,
            ParticipantStatus::Flagged
        );

        assert!(matches!(
            registry.record_ping(&code, "deadbeef").await,
            Err(ProctorError::ParticipantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_returns_every_state() {
        let registry = registry();
        let a = create(&registry).await;
        let b = create(&registry).await;
        registry.start_session(&b, "k1").await.unwrap();

        let list = registry.list_sessions().await;
        let mut codes: Vec<String> = list.iter().map(|v| v.code.clone()).collect();
        let mut expected = vec![a, b];
        codes.sort();
        expected.sort();
        assert_eq!(codes, expected);
    }

    #[tokio::test]
    async fn test_create_is_durable_before_returning() {
        let store = Arc::new(MemoryStore::new());
        let (registry, _hub) = registry_with(store.clone());

        let created = registry
            .create_session("Algo101".into(), "P1".into(), "k1".into())
            .await;
        assert!(created.persisted);

        let saved = store.current().unwrap();
        assert_eq!(saved[&created.code].secret, "k1");
    }

    #[tokio::test]
    async fn test_failed_save_keeps_memory_state() {
        let (registry, _hub) = registry_with(Arc::new(MemoryStore::failing()));

        let created = registry
            .create_session("Algo101".into(), "P1".into(), "k1".into())
            .await;
        assert!(!created.persisted);
        assert!(registry.get_session(&created.code).await.is_ok());
        assert!(matches!(registry.flush().await, Err(ProctorError::Io(_))));
    }

    #[tokio::test]
    async fn test_reload_after_flush_restores_sessions() {
        let store = Arc::new(MemoryStore::new());
        let (registry, hub) = registry_with(store.clone());
        let code = create(&registry).await;
        registry.join_session(&code, student("u1", "R1"), "addr").await.unwrap();
        registry.join_session(&code, student("u2", "R2"), "addr").await.unwrap();
        registry.start_session(&code, "k1").await.unwrap();
        registry.flush().await.unwrap();

        let restored = SessionRegistry::load(store, hub).await.unwrap();
        assert_eq!(
            restored.get_session(&code).await.unwrap(),
            registry.get_session(&code).await.unwrap()
        );
        assert!(restored.start_session(&code, "k1").await.is_err());
    }

    #[tokio::test]
    async fn test_mutations_notify_hub() {
        let (registry, hub) = registry_with(Arc::new(MemoryStore::new()));
        let (tx, mut rx) = mpsc::channel(32);
        let viewer = hub.register(tx);
        hub.subscribe(viewer, Topic::All);

        let code = create(&registry).await;
        assert_eq!(next(&mut rx).await.kind, NotificationKind::ListChanged);

        hub.subscribe(viewer, Topic::session(code.clone()));
        registry.join_session(&code, student("u1", "R1"), "addr").await.unwrap();
        let joined = next(&mut rx).await;
        assert_eq!(joined.kind, NotificationKind::SessionChanged);
        assert_eq!(joined.target, Topic::session(code.clone()));
        assert_eq!(joined.payload.unwrap().participants.len(), 1);

        let update = SessionUpdate {
            name: Some("Algo102".into()),
            ..Default::default()
        };
        registry.update_session(&code, "k1", update).await.unwrap();
        let changed = next(&mut rx).await;
        assert_eq!(changed.payload.unwrap().name, "Algo102");
        assert_eq!(next(&mut rx).await.kind, NotificationKind::ListChanged);
    }
}
