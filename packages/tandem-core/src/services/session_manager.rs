//! Session lifecycle: create, join, leave and host migration.
//!
//! Every mutation is a full read-modify-write of the session record under
//! the per-session lock, so concurrent joins and leaves on one session are
//! applied in sequence. Sessions whose roster becomes empty are deleted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::error::{TandemError, TandemResult};
use crate::events::{EndReason, EventEmitter, SessionEvent};
use crate::services::{require_field, session_code, ServiceDeps, StalenessReclaimer};
use crate::session::{Participant, Session};
use crate::state::Config;
use crate::store::{SessionLocks, SessionStore};
use crate::utils::generate_session_code;

/// Produces a candidate session code of the requested length.
pub type CodeGenerator = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// Result of a leave.
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    /// The caller left; the session lives on with this record.
    Left(Session),
    /// The caller was the last participant; the session was deleted.
    Ended,
}

/// Reply body of the session action endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionReply {
    /// Session is gone after the action (`{"ended": true}`).
    Ended { ended: bool },
    /// Session after the action.
    Session(Box<Session>),
}

impl From<LeaveOutcome> for SessionReply {
    fn from(outcome: LeaveOutcome) -> Self {
        match outcome {
            LeaveOutcome::Left(session) => SessionReply::Session(Box::new(session)),
            LeaveOutcome::Ended => SessionReply::Ended { ended: true },
        }
    }
}

/// Closed set of session actions accepted on `POST /api/sessions`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    Create {
        user_id: String,
        user_name: String,
    },
    Join {
        session_id: String,
        user_id: String,
        user_name: String,
        avatar: Option<String>,
    },
    Leave {
        session_id: String,
        user_id: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    user_id: String,
    user_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinBody {
    session_id: String,
    user_id: String,
    user_name: String,
    #[serde(default)]
    avatar: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaveBody {
    session_id: String,
    user_id: String,
}

fn fields<T: serde::de::DeserializeOwned>(action: &str, body: &Value) -> TandemResult<T> {
    serde_json::from_value(body.clone())
        .map_err(|e| TandemError::InvalidRequest(format!("{}: {}", action, e)))
}

impl SessionAction {
    /// Parses a request body of the form `{"action": "...", ...fields}`.
    pub fn from_json(body: &Value) -> TandemResult<Self> {
        let action = body
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| TandemError::InvalidRequest("missing action".into()))?;

        match action {
            "create" => {
                let b: CreateBody = fields(action, body)?;
                Ok(Self::Create {
                    user_id: b.user_id,
                    user_name: b.user_name,
                })
            }
            "join" => {
                let b: JoinBody = fields(action, body)?;
                Ok(Self::Join {
                    session_id: b.session_id,
                    user_id: b.user_id,
                    user_name: b.user_name,
                    avatar: b.avatar,
                })
            }
            "leave" => {
                let b: LeaveBody = fields(action, body)?;
                Ok(Self::Leave {
                    session_id: b.session_id,
                    user_id: b.user_id,
                })
            }
            other => Err(TandemError::InvalidAction(other.to_string())),
        }
    }

    /// Wire form, the inverse of [`from_json`](Self::from_json).
    pub fn to_json(&self) -> Value {
        match self {
            Self::Create { user_id, user_name } => serde_json::json!({
                "action": "create",
                "userId": user_id,
                "userName": user_name,
            }),
            Self::Join {
                session_id,
                user_id,
                user_name,
                avatar,
            } => serde_json::json!({
                "action": "join",
                "sessionId": session_id,
                "userId": user_id,
                "userName": user_name,
                "avatar": avatar,
            }),
            Self::Leave {
                session_id,
                user_id,
            } => serde_json::json!({
                "action": "leave",
                "sessionId": session_id,
                "userId": user_id,
            }),
        }
    }
}

/// Owns the session state machine.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    emitter: Arc<dyn EventEmitter>,
    clock: Arc<dyn Clock>,
    reclaimer: Arc<StalenessReclaimer>,
    code_length: usize,
    max_code_attempts: u32,
    generate_code: CodeGenerator,
}

impl SessionManager {
    pub fn new(deps: ServiceDeps, reclaimer: Arc<StalenessReclaimer>, config: &Config) -> Self {
        Self {
            store: deps.store,
            locks: deps.locks,
            emitter: deps.emitter,
            clock: deps.clock,
            reclaimer,
            code_length: config.code_length,
            max_code_attempts: config.max_code_attempts.max(1),
            generate_code: Arc::new(generate_session_code),
        }
    }

    /// Replaces the session code source.
    #[must_use]
    pub fn with_code_generator<F>(mut self, generate: F) -> Self
    where
        F: Fn(usize) -> String + Send + Sync + 'static,
    {
        self.generate_code = Arc::new(generate);
        self
    }

    /// Store backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Runs a parsed session action.
    pub async fn dispatch(&self, action: SessionAction) -> TandemResult<SessionReply> {
        match action {
            SessionAction::Create { user_id, user_name } => self
                .create_session(&user_id, &user_name)
                .await
                .map(|s| SessionReply::Session(Box::new(s))),
            SessionAction::Join {
                session_id,
                user_id,
                user_name,
                avatar,
            } => self
                .join_session(&session_id, &user_id, &user_name, avatar)
                .await
                .map(|s| SessionReply::Session(Box::new(s))),
            SessionAction::Leave {
                session_id,
                user_id,
            } => self
                .leave_session(&session_id, &user_id)
                .await
                .map(SessionReply::from),
        }
    }

    /// Creates a session with the caller as sole participant and host.
    ///
    /// Each candidate code is checked against the store under its lock
    /// before the first write; a collision draws a new code.
    pub async fn create_session(&self, user_id: &str, user_name: &str) -> TandemResult<Session> {
        require_field("userId", user_id)?;
        require_field("userName", user_name)?;

        self.reclaimer.sweep_opportunistic().await;

        for attempt in 1..=self.max_code_attempts {
            let code = (self.generate_code)(self.code_length);
            let guard = self.locks.lock(&code).await;

            if self.reclaimer.load_live_locked(&code).await?.is_some() {
                drop(guard);
                log::debug!(
                    "[SessionManager] Code {} already live (attempt {}/{})",
                    code,
                    attempt,
                    self.max_code_attempts
                );
                continue;
            }

            let now = self.clock.now_millis();
            let session = Session::new(code.clone(), user_id, user_name, now);
            self.store.set(&code, &session).await?;
            drop(guard);

            log::info!("[SessionManager] Session {} created by {}", code, user_id);
            self.emitter.emit_session(SessionEvent::Created {
                session_id: code,
                host_id: user_id.to_string(),
                timestamp: now,
            });
            return Ok(session);
        }

        log::warn!(
            "[SessionManager] No free session code after {} attempts",
            self.max_code_attempts
        );
        Err(TandemError::CodeSpaceExhausted {
            attempts: self.max_code_attempts,
        })
    }

    /// Adds the caller to a session.
    ///
    /// Joining a session the caller is already in returns it unchanged; the
    /// supplied name and avatar are not applied.
    pub async fn join_session(
        &self,
        session_id: &str,
        user_id: &str,
        user_name: &str,
        avatar: Option<String>,
    ) -> TandemResult<Session> {
        require_field("userId", user_id)?;
        require_field("userName", user_name)?;
        let code = session_code(session_id)?;

        let _guard = self.locks.lock(&code).await;
        let mut session = self
            .reclaimer
            .load_live_locked(&code)
            .await?
            .ok_or_else(|| TandemError::SessionNotFound(code.clone()))?;

        if session.is_member(user_id) {
            log::debug!("[SessionManager] {} already in {}", user_id, code);
            return Ok(session);
        }

        let now = self.clock.now_millis();
        let participant = Participant::new(user_id, user_name, avatar, now);
        session.add_participant(participant.clone());
        session.touch(now);
        self.store.set(&code, &session).await?;

        log::info!(
            "[SessionManager] {} joined {} ({} participants)",
            user_id,
            code,
            session.participants.len()
        );
        self.emitter.emit_session(SessionEvent::ParticipantJoined {
            session_id: code,
            participant,
            timestamp: now,
        });
        Ok(session)
    }

    /// Removes the caller from a session.
    ///
    /// When the host leaves, the participant now at roster index 0 becomes
    /// host. When the last participant leaves, the session is deleted and
    /// [`LeaveOutcome::Ended`] is returned. Leaving a session the caller is
    /// not in returns it unchanged.
    pub async fn leave_session(&self, session_id: &str, user_id: &str) -> TandemResult<LeaveOutcome> {
        require_field("userId", user_id)?;
        let code = session_code(session_id)?;

        let guard = self.locks.lock(&code).await;
        let mut session = self
            .reclaimer
            .load_live_locked(&code)
            .await?
            .ok_or_else(|| TandemError::SessionNotFound(code.clone()))?;

        let was_host = session.is_host(user_id);
        if session.remove_participant(user_id).is_none() {
            log::debug!("[SessionManager] {} not in {}, nothing to leave", user_id, code);
            return Ok(LeaveOutcome::Left(session));
        }

        let now = self.clock.now_millis();

        if session.participants.is_empty() {
            self.store.delete(&code).await?;
            drop(guard);
            self.locks.release(&code);

            log::info!("[SessionManager] Last participant left {}, session ended", code);
            self.emitter.emit_session(SessionEvent::ParticipantLeft {
                session_id: code.clone(),
                user_id: user_id.to_string(),
                timestamp: now,
            });
            self.emitter.emit_session(SessionEvent::Ended {
                session_id: code,
                reason: EndReason::LastParticipantLeft,
                timestamp: now,
            });
            return Ok(LeaveOutcome::Ended);
        }

        let new_host = if was_host {
            session.promote_first().map(|p| p.id.clone())
        } else {
            None
        };
        session.touch(now);
        self.store.set(&code, &session).await?;
        drop(guard);

        log::info!("[SessionManager] {} left {}", user_id, code);
        self.emitter.emit_session(SessionEvent::ParticipantLeft {
            session_id: code.clone(),
            user_id: user_id.to_string(),
            timestamp: now,
        });
        if let Some(new_host_id) = new_host {
            log::info!(
                "[SessionManager] Host of {} moved from {} to {}",
                code,
                user_id,
                new_host_id
            );
            self.emitter.emit_session(SessionEvent::HostChanged {
                session_id: code,
                previous_host_id: user_id.to_string(),
                new_host_id,
                timestamp: now,
            });
        }
        Ok(LeaveOutcome::Left(session))
    }

    /// Fetches the full session record.
    pub async fn get_session(&self, session_id: &str) -> TandemResult<Session> {
        let code = session_code(session_id)?;
        self.reclaimer
            .load_live(&code)
            .await?
            .ok_or(TandemError::SessionNotFound(code))
    }

    /// Every live session the user hosts or belongs to, most recently
    /// updated first.
    pub async fn sessions_for_user(&self, user_id: &str) -> TandemResult<Vec<Session>> {
        require_field("userId", user_id)?;
        self.reclaimer.sweep_opportunistic().await;

        let mut sessions: Vec<Session> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|s| !self.reclaimer.is_stale(s))
            .filter(|s| s.is_host(user_id) || s.is_member(user_id))
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    /// Number of stored sessions, including any not yet reclaimed.
    pub async fn session_count(&self) -> TandemResult<usize> {
        Ok(self.store.list_all().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Harness;
    use crate::services::{SyncAction, SyncPush};
    use crate::session::Track;

    fn ids(session: &Session) -> Vec<&str> {
        session.participants.iter().map(|p| p.id.as_str()).collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Creation
    // ─────────────────────────────────────────────────────────────────────

    mod create {
        use super::*;

        #[tokio::test]
        async fn creator_is_sole_host_participant() {
            let h = Harness::with_codes(&["AB12CD"]);

            let session = h.manager.create_session("host", "Hana").await.unwrap();

            assert_eq!(session.id, "AB12CD");
            assert_eq!(session.host_id, "host");
            assert_eq!(session.host_name, "Hana");
            assert_eq!(session.participants.len(), 1);
            assert!(session.participants[0].is_host);
            assert!(session.check_invariants().is_ok());
            assert_eq!(h.store.get("AB12CD").await.unwrap(), Some(session));
        }

        #[tokio::test]
        async fn generated_codes_use_configured_length() {
            let h = Harness::new();
            let session = h.manager.create_session("host", "Hana").await.unwrap();
            assert_eq!(session.id.len(), 6);
            assert!(session
                .id
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase()));
        }

        #[tokio::test]
        async fn collision_draws_a_new_code() {
            let h = Harness::with_codes(&["AB12CD", "AB12CD", "ZZ99ZZ"]);
            h.manager.create_session("a", "A").await.unwrap();

            let second = h.manager.create_session("b", "B").await.unwrap();

            assert_eq!(second.id, "ZZ99ZZ");
            assert_eq!(h.manager.get_session("AB12CD").await.unwrap().host_id, "a");
        }

        #[tokio::test]
        async fn exhausted_code_space_is_an_error() {
            let config = Config {
                max_code_attempts: 2,
                ..Default::default()
            };
            let h = Harness::build(config, &["AB12CD", "AB12CD", "AB12CD"]);
            h.manager.create_session("a", "A").await.unwrap();

            let err = h.manager.create_session("b", "B").await.unwrap_err();

            assert!(matches!(err, TandemError::CodeSpaceExhausted { attempts: 2 }));
            assert_eq!(h.store.len(), 1);
        }

        #[tokio::test]
        async fn stale_code_can_be_reused() {
            let h = Harness::with_codes(&["AB12CD", "AB12CD"]);
            h.manager.create_session("a", "A").await.unwrap();
            h.expire();

            let session = h.manager.create_session("b", "B").await.unwrap();
            assert_eq!(session.id, "AB12CD");
            assert_eq!(session.host_id, "b");
        }

        #[tokio::test]
        async fn empty_identity_is_rejected() {
            let h = Harness::new();
            assert!(matches!(
                h.manager.create_session("", "Name").await,
                Err(TandemError::InvalidRequest(_))
            ));
            assert!(matches!(
                h.manager.create_session("id", "  ").await,
                Err(TandemError::InvalidRequest(_))
            ));
            assert!(h.store.is_empty());
        }

        #[tokio::test]
        async fn emits_created_event() {
            let h = Harness::with_codes(&["AB12CD"]);
            h.manager.create_session("host", "Hana").await.unwrap();
            assert!(matches!(
                h.emitter.session_events().as_slice(),
                [SessionEvent::Created { session_id, host_id, .. }]
                    if session_id == "AB12CD" && host_id == "host"
            ));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Join
    // ─────────────────────────────────────────────────────────────────────

    mod join {
        use super::*;

        #[tokio::test]
        async fn joiner_is_appended_as_non_host() {
            let h = Harness::with_codes(&["AB12CD"]);
            h.manager.create_session("host", "Hana").await.unwrap();
            h.clock.advance_secs(5);

            let session = h
                .manager
                .join_session("AB12CD", "x", "Xavi", Some("x.png".into()))
                .await
                .unwrap();

            assert_eq!(ids(&session), ["host", "x"]);
            assert!(!session.participants[1].is_host);
            assert_eq!(session.participants[1].avatar.as_deref(), Some("x.png"));
            assert_eq!(session.updated_at, session.created_at + 5_000);
            assert!(session.check_invariants().is_ok());
        }

        #[tokio::test]
        async fn code_is_normalized() {
            let h = Harness::with_codes(&["AB12CD"]);
            h.manager.create_session("host", "Hana").await.unwrap();

            let session = h.manager.join_session(" ab12cd ", "x", "X", None).await.unwrap();
            assert_eq!(session.id, "AB12CD");
        }

        #[tokio::test]
        async fn unknown_session_is_not_found() {
            let h = Harness::new();
            assert!(matches!(
                h.manager.join_session("NOPE00", "x", "X", None).await,
                Err(TandemError::SessionNotFound(code)) if code == "NOPE00"
            ));
            assert!(matches!(
                h.manager.join_session("not a code!", "x", "X", None).await,
                Err(TandemError::SessionNotFound(_))
            ));
        }

        #[tokio::test]
        async fn rejoin_is_a_no_op() {
            let h = Harness::with_codes(&["AB12CD"]);
            h.manager.create_session("host", "Hana").await.unwrap();
            let first = h.manager.join_session("AB12CD", "x", "Xavi", None).await.unwrap();
            h.clock.advance_secs(10);

            let again = h
                .manager
                .join_session("AB12CD", "x", "Renamed", Some("new.png".into()))
                .await
                .unwrap();

            assert_eq!(again, first);
            assert_eq!(again.participant("x").unwrap().name, "Xavi");
            let joins = h
                .emitter
                .session_events()
                .into_iter()
                .filter(|e| matches!(e, SessionEvent::ParticipantJoined { .. }))
                .count();
            assert_eq!(joins, 1);
        }

        #[tokio::test]
        async fn host_rejoin_keeps_single_entry() {
            let h = Harness::with_codes(&["AB12CD"]);
            h.manager.create_session("host", "Hana").await.unwrap();

            let session = h.manager.join_session("AB12CD", "host", "Hana", None).await.unwrap();
            assert_eq!(ids(&session), ["host"]);
        }

        #[tokio::test]
        async fn stale_session_cannot_be_joined() {
            let h = Harness::with_codes(&["AB12CD"]);
            h.manager.create_session("host", "Hana").await.unwrap();
            h.expire();

            assert!(matches!(
                h.manager.join_session("AB12CD", "x", "X", None).await,
                Err(TandemError::SessionNotFound(_))
            ));
            assert!(h.store.is_empty());
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Leave and host migration
    // ─────────────────────────────────────────────────────────────────────

    mod leave {
        use super::*;

        async fn session_with(h: &Harness, guests: &[&str]) {
            h.manager.create_session("host", "Hana").await.unwrap();
            for guest in guests {
                h.manager
                    .join_session("AB12CD", guest, &guest.to_uppercase(), None)
                    .await
                    .unwrap();
            }
        }

        #[tokio::test]
        async fn guest_leave_keeps_host() {
            let h = Harness::with_codes(&["AB12CD"]);
            session_with(&h, &["x", "y"]).await;

            let outcome = h.manager.leave_session("AB12CD", "x").await.unwrap();

            let LeaveOutcome::Left(session) = outcome else {
                panic!("expected Left");
            };
            assert_eq!(ids(&session), ["host", "y"]);
            assert_eq!(session.host_id, "host");
            assert!(session.check_invariants().is_ok());
        }

        #[tokio::test]
        async fn host_leave_promotes_index_zero() {
            let h = Harness::with_codes(&["AB12CD"]);
            session_with(&h, &["x", "y", "z"]).await;

            let LeaveOutcome::Left(session) =
                h.manager.leave_session("AB12CD", "host").await.unwrap()
            else {
                panic!("expected Left");
            };

            assert_eq!(session.host_id, "x");
            assert_eq!(session.host_name, "X");
            assert_eq!(ids(&session), ["x", "y", "z"]);
            assert!(session.check_invariants().is_ok());
            assert!(h.emitter.session_events().iter().any(|e| matches!(
                e,
                SessionEvent::HostChanged { previous_host_id, new_host_id, .. }
                    if previous_host_id == "host" && new_host_id == "x"
            )));
        }

        #[tokio::test]
        async fn successor_follows_roster_order_after_churn() {
            let h = Harness::with_codes(&["AB12CD"]);
            session_with(&h, &["x", "y", "z"]).await;
            h.manager.leave_session("AB12CD", "x").await.unwrap();

            let LeaveOutcome::Left(session) =
                h.manager.leave_session("AB12CD", "host").await.unwrap()
            else {
                panic!("expected Left");
            };
            assert_eq!(session.host_id, "y");
        }

        #[tokio::test]
        async fn last_leave_ends_session() {
            let h = Harness::with_codes(&["AB12CD"]);
            session_with(&h, &[]).await;

            let outcome = h.manager.leave_session("AB12CD", "host").await.unwrap();

            assert_eq!(outcome, LeaveOutcome::Ended);
            assert!(h.store.is_empty());
            assert!(matches!(
                h.emitter.session_events().last(),
                Some(SessionEvent::Ended {
                    reason: EndReason::LastParticipantLeft,
                    ..
                })
            ));
        }

        #[tokio::test]
        async fn non_member_leave_is_idempotent() {
            let h = Harness::with_codes(&["AB12CD"]);
            session_with(&h, &["x"]).await;
            let before = h.manager.get_session("AB12CD").await.unwrap();

            let outcome = h.manager.leave_session("AB12CD", "ghost").await.unwrap();

            assert_eq!(outcome, LeaveOutcome::Left(before));
        }

        #[tokio::test]
        async fn leave_of_missing_session_is_not_found() {
            let h = Harness::new();
            assert!(matches!(
                h.manager.leave_session("AB12CD", "x").await,
                Err(TandemError::SessionNotFound(_))
            ));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    mod queries {
        use super::*;

        #[tokio::test]
        async fn sessions_for_user_sorted_by_recent_update() {
            let h = Harness::with_codes(&["AAAAAA", "BBBBBB", "CCCCCC"]);
            h.manager.create_session("u", "U").await.unwrap();
            h.clock.advance_secs(1);
            h.manager.create_session("other", "O").await.unwrap();
            h.clock.advance_secs(1);
            h.manager.create_session("other", "O").await.unwrap();
            h.clock.advance_secs(1);
            h.manager.join_session("BBBBBB", "u", "U", None).await.unwrap();

            let sessions = h.manager.sessions_for_user("u").await.unwrap();

            let codes: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(codes, ["BBBBBB", "AAAAAA"]);
        }

        #[tokio::test]
        async fn sessions_for_user_skips_reclaimed() {
            let h = Harness::with_codes(&["AAAAAA"]);
            h.manager.create_session("u", "U").await.unwrap();
            h.expire();

            assert!(h.manager.sessions_for_user("u").await.unwrap().is_empty());
            assert!(h.store.is_empty());
        }

        #[tokio::test]
        async fn stale_session_reads_as_not_found() {
            let h = Harness::with_codes(&["AB12CD"]);
            h.manager.create_session("host", "Hana").await.unwrap();
            h.expire();

            assert!(matches!(
                h.manager.get_session("AB12CD").await,
                Err(TandemError::SessionNotFound(_))
            ));
            assert!(matches!(
                h.emitter.session_events().last(),
                Some(SessionEvent::Ended {
                    reason: EndReason::Reclaimed,
                    ..
                })
            ));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scenarios
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn full_session_lifecycle() {
        let h = Harness::with_codes(&["AB12CD"]);

        // A: host creates
        let session = h.manager.create_session("host", "Hana").await.unwrap();
        assert_eq!(session.id, "AB12CD");
        assert_eq!(session.participants.len(), 1);
        assert!(session.participants[0].is_host);

        // B: X joins
        let session = h.manager.join_session("AB12CD", "x", "Xavi", None).await.unwrap();
        assert_eq!(session.participants.len(), 2);
        assert!(!session.participant("x").unwrap().is_host);

        // Playback state to carry across the migration
        h.engine
            .push(SyncPush::new("AB12CD", "host", SyncAction::PlayPause(true)))
            .await
            .unwrap();
        h.engine
            .push(SyncPush::new("AB12CD", "host", SyncAction::UpdateTime(97.5)))
            .await
            .unwrap();

        // D: host leaves, X becomes host with playback untouched
        let LeaveOutcome::Left(session) =
            h.manager.leave_session("AB12CD", "host").await.unwrap()
        else {
            panic!("expected Left");
        };
        assert_eq!(session.host_id, "x");
        assert!(session.participants[0].is_host);
        assert!(session.is_playing);
        assert_eq!(session.current_time, 97.5);

        // The promoted host can now drive playback
        h.engine
            .push(SyncPush::new(
                "AB12CD",
                "x",
                SyncAction::ChangeTrack(Track::with_id("T2")),
            ))
            .await
            .unwrap();

        // E: last participant leaves
        assert_eq!(
            h.manager.leave_session("AB12CD", "x").await.unwrap(),
            LeaveOutcome::Ended
        );
        assert!(matches!(
            h.manager.get_session("AB12CD").await,
            Err(TandemError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn roster_invariants_hold_across_churn() {
        let h = Harness::with_codes(&["AB12CD"]);
        h.manager.create_session("u0", "U0").await.unwrap();

        // Deterministic interleaving of joins, re-joins and leaves.
        let script: &[(&str, &str)] = &[
            ("join", "u1"),
            ("join", "u2"),
            ("leave", "u0"),
            ("join", "u3"),
            ("join", "u1"),
            ("leave", "u2"),
            ("leave", "u1"),
            ("join", "u0"),
            ("leave", "u3"),
            ("leave", "ghost"),
        ];

        for (op, user) in script {
            let session = match *op {
                "join" => h.manager.join_session("AB12CD", user, user, None).await.unwrap(),
                _ => match h.manager.leave_session("AB12CD", user).await.unwrap() {
                    LeaveOutcome::Left(s) => s,
                    LeaveOutcome::Ended => panic!("roster should not empty here"),
                },
            };
            assert!(
                session.check_invariants().is_ok(),
                "after {} {}: {:?}",
                op,
                user,
                session.check_invariants()
            );
            let stored = h.store.get("AB12CD").await.unwrap().unwrap();
            assert_eq!(stored, session);
        }

        let session = h.manager.get_session("AB12CD").await.unwrap();
        assert_eq!(ids(&session), ["u0"]);
        assert_eq!(session.host_id, "u0");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Concurrency
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_are_all_kept() {
        let h = Harness::with_codes(&["AB12CD"]);
        h.manager.create_session("host", "Hana").await.unwrap();

        let tasks: Vec<_> = (0..24)
            .map(|i| {
                let manager = Arc::clone(&h.manager);
                tokio::spawn(async move {
                    let id = format!("user-{}", i);
                    manager.join_session("AB12CD", &id, &id, None).await
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let session = h.manager.get_session("AB12CD").await.unwrap();
        assert_eq!(session.participants.len(), 25);
        assert!(session.check_invariants().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_leaves_and_joins_converge() {
        let h = Harness::with_codes(&["AB12CD"]);
        h.manager.create_session("host", "Hana").await.unwrap();
        for i in 0..10 {
            let id = format!("old-{}", i);
            h.manager.join_session("AB12CD", &id, &id, None).await.unwrap();
        }

        let mut tasks = Vec::new();
        for i in 0..10 {
            let manager = Arc::clone(&h.manager);
            tasks.push(tokio::spawn(async move {
                manager
                    .leave_session("AB12CD", &format!("old-{}", i))
                    .await
                    .map(|_| ())
            }));
            let manager = Arc::clone(&h.manager);
            tasks.push(tokio::spawn(async move {
                let id = format!("new-{}", i);
                manager.join_session("AB12CD", &id, &id, None).await.map(|_| ())
            }));
        }
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let session = h.manager.get_session("AB12CD").await.unwrap();
        assert_eq!(session.participants[0].id, "host");
        let mut remaining: Vec<&str> = ids(&session)[1..].to_vec();
        remaining.sort_unstable();
        let mut expected: Vec<String> = (0..10).map(|i| format!("new-{}", i)).collect();
        expected.sort_unstable();
        assert_eq!(remaining, expected);
        assert!(session.check_invariants().is_ok());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Action parsing
    // ─────────────────────────────────────────────────────────────────────

    mod actions {
        use super::*;
        use serde_json::json;

        #[test]
        fn parses_each_action() {
            assert_eq!(
                SessionAction::from_json(&json!({"action": "create", "userId": "u", "userName": "U"}))
                    .unwrap(),
                SessionAction::Create {
                    user_id: "u".into(),
                    user_name: "U".into()
                }
            );
            assert_eq!(
                SessionAction::from_json(&json!({
                    "action": "join", "sessionId": "AB12CD", "userId": "u", "userName": "U"
                }))
                .unwrap(),
                SessionAction::Join {
                    session_id: "AB12CD".into(),
                    user_id: "u".into(),
                    user_name: "U".into(),
                    avatar: None,
                }
            );
            assert_eq!(
                SessionAction::from_json(&json!({"action": "leave", "sessionId": "AB12CD", "userId": "u"}))
                    .unwrap(),
                SessionAction::Leave {
                    session_id: "AB12CD".into(),
                    user_id: "u".into()
                }
            );
        }

        #[test]
        fn unknown_action_is_invalid_action() {
            assert!(matches!(
                SessionAction::from_json(&json!({"action": "kick", "userId": "u"})),
                Err(TandemError::InvalidAction(a)) if a == "kick"
            ));
        }

        #[test]
        fn missing_fields_are_invalid_request() {
            assert!(matches!(
                SessionAction::from_json(&json!({"action": "join", "userId": "u"})),
                Err(TandemError::InvalidRequest(_))
            ));
            assert!(matches!(
                SessionAction::from_json(&json!({"userId": "u"})),
                Err(TandemError::InvalidRequest(_))
            ));
        }

        #[test]
        fn wire_form_round_trips() {
            let action = SessionAction::Join {
                session_id: "AB12CD".into(),
                user_id: "u".into(),
                user_name: "U".into(),
                avatar: Some("a.png".into()),
            };
            assert_eq!(SessionAction::from_json(&action.to_json()).unwrap(), action);
        }

        #[tokio::test]
        async fn leave_reply_serializes_ended_flag() {
            let h = Harness::with_codes(&["AB12CD"]);
            h.manager.create_session("host", "Hana").await.unwrap();

            let reply = h
                .manager
                .dispatch(SessionAction::Leave {
                    session_id: "AB12CD".into(),
                    user_id: "host".into(),
                })
                .await
                .unwrap();

            assert_eq!(serde_json::to_value(&reply).unwrap(), json!({"ended": true}));
        }
    }
}
