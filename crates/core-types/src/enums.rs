use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of an evolution campaign.
///
/// `Stopped` is a resumable checkpoint: starting again re-enters `Running`.
/// `Completed` is the only state from which nothing moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionStatus {
    Created,
    Running,
    Paused,
    Completed,
    Stopped,
}

impl EvolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionStatus::Created => "created",
            EvolutionStatus::Running => "running",
            EvolutionStatus::Paused => "paused",
            EvolutionStatus::Completed => "completed",
            EvolutionStatus::Stopped => "stopped",
        }
    }

    /// Returns true if the controller may move from `self` to `next`.
    /// Re-asserting the current state is always allowed except out of `Completed`.
    pub fn can_transition_to(&self, next: EvolutionStatus) -> bool {
        use EvolutionStatus::*;
        match (self, next) {
            (Completed, _) => false,
            (a, b) if *a == b => true,
            (Created, Running | Paused | Stopped) => true,
            (Running, Paused | Completed | Stopped) => true,
            // A paused loop still finishes the iteration already in flight.
            (Paused, Running | Completed | Stopped) => true,
            (Stopped, Running) => true,
            _ => false,
        }
    }
}

impl fmt::Display for EvolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvolutionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(EvolutionStatus::Created),
            "running" => Ok(EvolutionStatus::Running),
            "paused" => Ok(EvolutionStatus::Paused),
            "completed" => Ok(EvolutionStatus::Completed),
            "stopped" => Ok(EvolutionStatus::Stopped),
            other => Err(CoreError::UnknownVariant {
                kind: "evolution status",
                value: other.to_string(),
            }),
        }
    }
}

/// Progress of a single version inside an evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationStatus {
    Pending,
    Backtest,
    Evaluating,
    Optimizing,
    Completed,
    Failed,
}

impl IterationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IterationStatus::Pending => "pending",
            IterationStatus::Backtest => "backtest",
            IterationStatus::Evaluating => "evaluating",
            IterationStatus::Optimizing => "optimizing",
            IterationStatus::Completed => "completed",
            IterationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IterationStatus::Completed | IterationStatus::Failed)
    }

    /// The iteration transition table.
    ///
    /// Any unfinished version may be sent back to `Backtest` when its job is
    /// restarted, including a `Failed` one being retried in place. A
    /// `Completed` record is frozen.
    pub fn can_transition_to(&self, next: IterationStatus) -> bool {
        use IterationStatus::*;
        match (self, next) {
            (Completed, _) => false,
            (_, Backtest) => true,
            (Pending, Failed) => true,
            (Backtest, Evaluating | Failed) => true,
            (Evaluating, Optimizing | Failed) => true,
            (Optimizing, Completed | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IterationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IterationStatus::Pending),
            // Older rows were written with the long spelling.
            "backtest" | "backtesting" => Ok(IterationStatus::Backtest),
            "evaluating" => Ok(IterationStatus::Evaluating),
            "optimizing" => Ok(IterationStatus::Optimizing),
            "completed" => Ok(IterationStatus::Completed),
            "failed" => Ok(IterationStatus::Failed),
            other => Err(CoreError::UnknownVariant {
                kind: "iteration status",
                value: other.to_string(),
            }),
        }
    }
}

/// State of a simulation job as reported by the backtest engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacktestState {
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl BacktestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BacktestState::Running => "running",
            BacktestState::Paused => "paused",
            BacktestState::Completed => "completed",
            BacktestState::Failed => "failed",
            BacktestState::Stopped => "stopped",
        }
    }

    /// Running or paused jobs still own a runner on the engine side.
    pub fn is_live(&self) -> bool {
        matches!(self, BacktestState::Running | BacktestState::Paused)
    }
}

impl fmt::Display for BacktestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BacktestState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(BacktestState::Running),
            "paused" => Ok(BacktestState::Paused),
            "completed" => Ok(BacktestState::Completed),
            "failed" => Ok(BacktestState::Failed),
            "stopped" => Ok(BacktestState::Stopped),
            other => Err(CoreError::UnknownVariant {
                kind: "backtest state",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVOLUTION_STATES: [EvolutionStatus; 5] = [
        EvolutionStatus::Created,
        EvolutionStatus::Running,
        EvolutionStatus::Paused,
        EvolutionStatus::Completed,
        EvolutionStatus::Stopped,
    ];

    const ITERATION_STATES: [IterationStatus; 6] = [
        IterationStatus::Pending,
        IterationStatus::Backtest,
        IterationStatus::Evaluating,
        IterationStatus::Optimizing,
        IterationStatus::Completed,
        IterationStatus::Failed,
    ];

    #[test]
    fn test_evolution_transition_table() {
        use EvolutionStatus::*;
        let allowed = [
            (Created, Running),
            (Created, Paused),
            (Created, Stopped),
            (Running, Paused),
            (Running, Completed),
            (Running, Stopped),
            (Paused, Running),
            (Paused, Completed),
            (Paused, Stopped),
            (Stopped, Running),
        ];

        for from in EVOLUTION_STATES {
            for to in EVOLUTION_STATES {
                let expected = if from == Completed {
                    false
                } else {
                    from == to || allowed.contains(&(from, to))
                };
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_completed_evolution_is_final() {
        for to in EVOLUTION_STATES {
            assert!(!EvolutionStatus::Completed.can_transition_to(to));
        }
    }

    #[test]
    fn test_stopped_evolution_can_only_restart() {
        assert!(EvolutionStatus::Stopped.can_transition_to(EvolutionStatus::Running));
        assert!(!EvolutionStatus::Stopped.can_transition_to(EvolutionStatus::Completed));
        assert!(!EvolutionStatus::Stopped.can_transition_to(EvolutionStatus::Paused));
    }

    #[test]
    fn test_iteration_transition_table() {
        use IterationStatus::*;
        let allowed = [
            (Pending, Backtest),
            (Pending, Failed),
            (Backtest, Backtest),
            (Backtest, Evaluating),
            (Backtest, Failed),
            (Evaluating, Backtest),
            (Evaluating, Optimizing),
            (Evaluating, Failed),
            (Optimizing, Backtest),
            (Optimizing, Completed),
            (Optimizing, Failed),
            (Failed, Backtest),
        ];

        for from in ITERATION_STATES {
            for to in ITERATION_STATES {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_iteration_cannot_skip_pipeline_steps() {
        assert!(!IterationStatus::Backtest.can_transition_to(IterationStatus::Completed));
        assert!(!IterationStatus::Evaluating.can_transition_to(IterationStatus::Completed));
        assert!(!IterationStatus::Pending.can_transition_to(IterationStatus::Optimizing));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in EVOLUTION_STATES {
            assert_eq!(status.as_str().parse::<EvolutionStatus>().unwrap(), status);
        }
        for status in ITERATION_STATES {
            assert_eq!(status.as_str().parse::<IterationStatus>().unwrap(), status);
        }
        assert_eq!(
            "backtesting".parse::<IterationStatus>().unwrap(),
            IterationStatus::Backtest
        );
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let err = "exploded".parse::<BacktestState>().unwrap_err();
        assert_eq!(
            err,
            CoreError::UnknownVariant {
                kind: "backtest state",
                value: "exploded".to_string()
            }
        );
    }

    #[test]
    fn test_backtest_state_serde_is_lowercase() {
        let json = serde_json::to_string(&BacktestState::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
        assert!(BacktestState::Paused.is_live());
        assert!(!BacktestState::Stopped.is_live());
    }
}
