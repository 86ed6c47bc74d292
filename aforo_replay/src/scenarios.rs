//! Replay scenarios for the ordering and idempotence checks.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayScenario {
    /// Events recorded in input order (the baseline itself)
    InOrder,

    /// Events recorded back to front
    Reversed,

    /// Events recorded in a seeded random order
    Shuffled,

    /// Every event delivered twice, redeliveries interleaved at random
    Duplicated,

    /// Shuffled run, reset, then a second shuffled run
    ResetReplay,

    /// Random seeks and ticks across the recording
    Scrub,
}

impl ReplayScenario {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ReplayScenario> {
        vec![
            ReplayScenario::InOrder,
            ReplayScenario::Reversed,
            ReplayScenario::Shuffled,
            ReplayScenario::Duplicated,
            ReplayScenario::ResetReplay,
            ReplayScenario::Scrub,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ReplayScenario::InOrder => "in_order",
            ReplayScenario::Reversed => "reversed",
            ReplayScenario::Shuffled => "shuffled",
            ReplayScenario::Duplicated => "duplicated",
            ReplayScenario::ResetReplay => "reset_replay",
            ReplayScenario::Scrub => "scrub",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ReplayScenario::InOrder => "Record every event once in input order",
            ReplayScenario::Reversed => "Record every event once in reverse order",
            ReplayScenario::Shuffled => "Record every event once in a seeded random order",
            ReplayScenario::Duplicated => "Deliver every event twice, counts must not change",
            ReplayScenario::ResetReplay => "Reset mid-session and replay, counts must match a fresh run",
            ReplayScenario::Scrub => "Seek and tick the playback cursor at random, counts untouched",
        }
    }

    /// Returns true if the scenario draws from the seeded RNG.
    pub fn is_randomized(&self) -> bool {
        !matches!(self, ReplayScenario::InOrder | ReplayScenario::Reversed)
    }
}

impl std::fmt::Display for ReplayScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ReplayScenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_order" | "inorder" | "baseline" => Ok(ReplayScenario::InOrder),
            "reversed" | "reverse" => Ok(ReplayScenario::Reversed),
            "shuffled" | "shuffle" => Ok(ReplayScenario::Shuffled),
            "duplicated" | "duplicate" | "redeliver" => Ok(ReplayScenario::Duplicated),
            "reset_replay" | "resetreplay" | "reset" => Ok(ReplayScenario::ResetReplay),
            "scrub" | "playback" => Ok(ReplayScenario::Scrub),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
