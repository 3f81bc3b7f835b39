use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The event payload tagged union (§9 "Aggregate variant union").
///
/// `MatchStateUpdated` and `TrainerMetricsCaptured` are the two kinds known
/// to the system; anything else passes through as `Generic` so ingestion
/// never has to reject an event whose kind it doesn't recognise.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    MatchStateUpdated,
    TrainerMetricsCaptured,
    Generic(String),
}

impl EventKind {
    /// Matches `kind` case-insensitively against the known set, per §6.
    pub fn parse(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case("MatchStateUpdated") {
            EventKind::MatchStateUpdated
        } else if kind.eq_ignore_ascii_case("TrainerMetricsCaptured") {
            EventKind::TrainerMetricsCaptured
        } else {
            EventKind::Generic(kind.to_string())
        }
    }

    /// Canonical wire representation stored in `EventDoc::kind`.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::MatchStateUpdated => "MatchStateUpdated",
            EventKind::TrainerMetricsCaptured => "TrainerMetricsCaptured",
            EventKind::Generic(s) => s,
        }
    }
}

/// One event as submitted to the append API, before `seq`/`ts` are assigned.
///
/// Wire shape: `{ id: string, kind: string, payload: JSON }` (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEvent {
    pub id: String,
    pub kind: String,
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds_case_insensitively() {
        assert_eq!(EventKind::parse("matchstateupdated"), EventKind::MatchStateUpdated);
        assert_eq!(EventKind::parse("TRAINERMETRICSCAPTURED"), EventKind::TrainerMetricsCaptured);
        assert_eq!(EventKind::parse("TrainerMetricsCaptured"), EventKind::TrainerMetricsCaptured);
    }

    #[test]
    fn unknown_kind_passes_through_as_generic() {
        let kind = EventKind::parse("WeatherUpdated");
        assert_eq!(kind, EventKind::Generic("WeatherUpdated".to_string()));
        assert_eq!(kind.as_str(), "WeatherUpdated");
    }
}
