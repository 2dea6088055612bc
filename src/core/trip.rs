//! Trip records: the trail left by one attempted transition request.

use super::token::VisitToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One step on a trip's route.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Waypoint {
    State(String),
    Transition(String),
    Trigger(String),
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(name) => write!(f, "[{name}]"),
            Self::Transition(name) => write!(f, "--{name}-->"),
            Self::Trigger(name) => write!(f, "<{name}>"),
        }
    }
}

/// What started a trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cause {
    /// Explicit `signal(origin)` call.
    Signal(String),
    /// A trigger fired.
    Trigger(String),
    /// `try_transition_to` on a specific target.
    Direct(String),
    /// Administrative `jump_to`, including initial-state entry.
    Jump,
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(origin) => write!(f, "signal({origin})"),
            Self::Trigger(name) => write!(f, "trigger({name})"),
            Self::Direct(target) => write!(f, "direct({target})"),
            Self::Jump => f.write_str("jump"),
        }
    }
}

/// Append-only record of one transition request.
///
/// Carries the visit token of the state that was current when the request
/// was created; a revoked token marks the trip as stale.
#[derive(Clone, Debug, Serialize)]
pub struct Trip {
    id: Uuid,
    cause: Cause,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<VisitToken>,
    trail: Vec<Waypoint>,
    started_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(cause: Cause, token: Option<VisitToken>) -> Self {
        Self {
            id: Uuid::new_v4(),
            cause,
            token,
            trail: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn token(&self) -> Option<&VisitToken> {
        self.token.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// True once the originating visit has ended.
    pub fn is_stale(&self) -> bool {
        self.token.as_ref().is_some_and(VisitToken::is_revoked)
    }

    pub fn trail(&self) -> &[Waypoint] {
        &self.trail
    }

    pub(crate) fn push(&mut self, waypoint: Waypoint) {
        self.trail.push(waypoint);
    }

    /// Name of the trigger that started this trip, if any.
    pub fn trigger(&self) -> Option<&str> {
        self.trail.iter().find_map(|w| match w {
            Waypoint::Trigger(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Number of transitions this trip has passed through.
    pub fn transitions_taken(&self) -> usize {
        self.trail
            .iter()
            .filter(|w| matches!(w, Waypoint::Transition(_)))
            .count()
    }

    /// Continue the same trip under a new visit, keeping its trail.
    pub(crate) fn rebind(&mut self, token: Option<VisitToken>) {
        self.token = token;
    }

    /// Render the trail as a compact route string.
    pub fn route(&self) -> String {
        self.trail
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_without_token_is_never_stale() {
        let trip = Trip::new(Cause::Jump, None);
        assert!(!trip.is_stale());
    }

    #[test]
    fn trip_turns_stale_when_visit_ends() {
        let token = VisitToken::mint();
        let trip = Trip::new(Cause::Signal("test".into()), Some(token.clone()));

        assert!(!trip.is_stale());
        token.revoke();
        assert!(trip.is_stale());
    }

    #[test]
    fn trail_records_route_in_order() {
        let mut trip = Trip::new(Cause::Trigger("tick".into()), None);
        trip.push(Waypoint::Trigger("tick".into()));
        trip.push(Waypoint::Transition("A->B".into()));
        trip.push(Waypoint::State("B".into()));

        assert_eq!(trip.trigger(), Some("tick"));
        assert_eq!(trip.transitions_taken(), 1);
        assert_eq!(trip.route(), "<tick> --A->B--> [B]");
    }

    #[test]
    fn rebind_keeps_identity_and_trail() {
        let old = VisitToken::mint();
        let mut trip = Trip::new(Cause::Signal("go".into()), Some(old.clone()));
        trip.push(Waypoint::State("A".into()));
        let id = trip.id();

        old.revoke();
        trip.rebind(Some(VisitToken::mint()));

        assert_eq!(trip.id(), id);
        assert_eq!(trip.trail().len(), 1);
        assert!(!trip.is_stale());
    }

    #[test]
    fn trip_serializes_token_as_visit_id() {
        let token = VisitToken::mint();
        let trip = Trip::new(Cause::Jump, Some(token.clone()));
        let json = serde_json::to_value(&trip).unwrap();

        assert_eq!(json["token"], serde_json::json!(token.id()));
        assert_eq!(json["cause"], serde_json::json!("Jump"));
    }
}
