//! Session data model.
//!
//! A [`Session`] is the single persisted record per listening session. It is
//! always read and written whole; the store has no notion of partial updates.

use serde::{Deserialize, Serialize};

/// Reference to a catalog track.
///
/// Opaque to the sync protocol beyond its `id`: two tracks are the same track
/// iff their ids match, regardless of the other fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Catalog track id.
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    /// Artwork reference (URL or catalog key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork: Option<String>,
    /// Audio reference the playback engine loads.
    #[serde(default)]
    pub audio_url: String,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: f64,
}

impl Track {
    /// Creates a track carrying only an id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Returns true if both references point at the same catalog track.
    #[must_use]
    pub fn is_same_track(&self, other: &Track) -> bool {
        self.id == other.id
    }
}

/// A member of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Unix timestamp in milliseconds.
    pub joined_at: u64,
    /// Denormalized copy of `session.host_id == id`.
    pub is_host: bool,
}

impl Participant {
    /// Creates a non-host participant.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        avatar: Option<String>,
        joined_at: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar,
            joined_at,
            is_host: false,
        }
    }
}

/// Persisted listening session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session code; also the store key and join handle.
    pub id: String,
    pub host_id: String,
    pub host_name: String,
    pub current_track: Option<Track>,
    pub is_playing: bool,
    /// Host playhead in seconds.
    pub current_time: f64,
    /// Roster in join order. Index 0 is the host migration successor.
    pub participants: Vec<Participant>,
    /// Unix timestamp in milliseconds.
    pub created_at: u64,
    /// Unix timestamp in milliseconds, refreshed on every mutation.
    pub updated_at: u64,
}

impl Session {
    /// Creates a session with the creator as sole participant and host.
    pub fn new(
        id: impl Into<String>,
        host_id: impl Into<String>,
        host_name: impl Into<String>,
        now: u64,
    ) -> Self {
        let host_id = host_id.into();
        let host_name = host_name.into();
        let mut host = Participant::new(host_id.clone(), host_name.clone(), None, now);
        host.is_host = true;

        Self {
            id: id.into(),
            host_id,
            host_name,
            current_track: None,
            is_playing: false,
            current_time: 0.0,
            participants: vec![host],
            created_at: now,
            updated_at: now,
        }
    }

    /// Looks up a participant by user id.
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == user_id)
    }

    /// Returns true if the user is in the roster.
    #[must_use]
    pub fn is_member(&self, user_id: &str) -> bool {
        self.participant(user_id).is_some()
    }

    /// Returns true if the user is the current host.
    #[must_use]
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    /// Appends a participant unless one with the same id already exists.
    ///
    /// Returns `false` (and leaves the roster untouched) for a duplicate id.
    pub fn add_participant(&mut self, participant: Participant) -> bool {
        if self.is_member(&participant.id) {
            return false;
        }
        self.participants.push(participant);
        true
    }

    /// Removes a participant by id, preserving the order of the rest.
    pub fn remove_participant(&mut self, user_id: &str) -> Option<Participant> {
        let index = self.participants.iter().position(|p| p.id == user_id)?;
        Some(self.participants.remove(index))
    }

    /// Promotes the participant at roster index 0 to host.
    ///
    /// Rewrites `host_id`/`host_name` and the denormalized `is_host` flags in
    /// one step. Returns the new host, or `None` for an empty roster.
    pub fn promote_first(&mut self) -> Option<&Participant> {
        let successor = self.participants.first()?;
        self.host_id = successor.id.clone();
        self.host_name = successor.name.clone();

        for participant in &mut self.participants {
            participant.is_host = participant.id == self.host_id;
        }
        self.participants.first()
    }

    /// Refreshes `updated_at`.
    pub fn touch(&mut self, now: u64) {
        self.updated_at = now;
    }

    /// Returns true if the session has not been mutated within `idle_millis`.
    #[must_use]
    pub fn is_stale(&self, now: u64, idle_millis: u64) -> bool {
        now.saturating_sub(self.updated_at) > idle_millis
    }

    /// Returns the playback + roster view participants pull.
    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            current_track: self.current_track.clone(),
            is_playing: self.is_playing,
            current_time: self.current_time,
            participants: self.participants.clone(),
        }
    }

    /// Verifies the roster invariants of a persisted session.
    ///
    /// - the roster is non-empty
    /// - participant ids are unique
    /// - exactly one participant is flagged host and it matches `host_id`
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.participants.is_empty() {
            return Err(format!("session {} has an empty roster", self.id));
        }

        for (i, participant) in self.participants.iter().enumerate() {
            if self.participants[..i].iter().any(|p| p.id == participant.id) {
                return Err(format!(
                    "session {} lists participant {} twice",
                    self.id, participant.id
                ));
            }
        }

        let hosts: Vec<&Participant> = self.participants.iter().filter(|p| p.is_host).collect();
        match hosts.as_slice() {
            [host] if host.id == self.host_id => Ok(()),
            [host] => Err(format!(
                "session {} flags {} as host but host_id is {}",
                self.id, host.id, self.host_id
            )),
            _ => Err(format!(
                "session {} has {} participants flagged host",
                self.id,
                hosts.len()
            )),
        }
    }
}

/// What participants pull on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub current_time: f64,
    pub participants: Vec<Participant>,
}

impl SyncSnapshot {
    /// Returns the participant flagged as host, if any.
    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_host)
    }

    /// Returns true if the user is in the roster.
    #[must_use]
    pub fn contains(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }
}
