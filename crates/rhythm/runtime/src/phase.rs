use serde::{Deserialize, Serialize};

/// Lifecycle phase of the controller.
///
/// A run walks `AwaitingKindred → Loading → Init → Iterating → Finalizing →
/// Reporting` and returns to `Idle`. Failures jump straight to `Reporting`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    AwaitingKindred,
    Loading,
    Init,
    Iterating,
    Finalizing,
    Reporting,
}

impl Phase {
    pub fn is_running(&self) -> bool {
        !matches!(self, Phase::Idle)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::AwaitingKindred => "awaiting_kindred",
            Phase::Loading => "loading",
            Phase::Init => "init",
            Phase::Iterating => "iterating",
            Phase::Finalizing => "finalizing",
            Phase::Reporting => "reporting",
        };
        f.write_str(name)
    }
}
