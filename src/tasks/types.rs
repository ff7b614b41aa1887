use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle states of a sync task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTaskStatus {
    /// Created, waiting for a worker.
    Pending,
    /// A worker is executing the sync.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl SyncTaskStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Active states block duplicate submissions of the same task type.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for SyncTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SyncTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid sync task status: {s}")),
        }
    }
}

/// What a sync task pulls from the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTaskType {
    Orders,
    Products,
    Financial,
    Returns,
    /// Full sync across data domains.
    All,
}

impl fmt::Display for SyncTaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orders => write!(f, "orders"),
            Self::Products => write!(f, "products"),
            Self::Financial => write!(f, "financial"),
            Self::Returns => write!(f, "returns"),
            Self::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for SyncTaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orders" => Ok(Self::Orders),
            "products" => Ok(Self::Products),
            "financial" => Ok(Self::Financial),
            "returns" => Ok(Self::Returns),
            "all" => Ok(Self::All),
            _ => Err(format!("Invalid sync task type: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn terminal_states() {
        assert!(!SyncTaskStatus::Pending.is_terminal());
        assert!(!SyncTaskStatus::Running.is_terminal());
        assert!(SyncTaskStatus::Completed.is_terminal());
        assert!(SyncTaskStatus::Failed.is_terminal());
    }

    #[test]
    fn active_states() {
        assert!(SyncTaskStatus::Pending.is_active());
        assert!(SyncTaskStatus::Running.is_active());
        assert!(!SyncTaskStatus::Completed.is_active());
        assert!(!SyncTaskStatus::Failed.is_active());
    }

    #[test]
    fn status_round_trips_through_string() {
        for status in [
            SyncTaskStatus::Pending,
            SyncTaskStatus::Running,
            SyncTaskStatus::Completed,
            SyncTaskStatus::Failed,
        ] {
            assert_eq!(
                SyncTaskStatus::from_str(&status.to_string()).unwrap(),
                status
            );
        }
    }

    #[test]
    fn type_round_trips_through_string() {
        for task_type in [
            SyncTaskType::Orders,
            SyncTaskType::Products,
            SyncTaskType::Financial,
            SyncTaskType::Returns,
            SyncTaskType::All,
        ] {
            assert_eq!(
                SyncTaskType::from_str(&task_type.to_string()).unwrap(),
                task_type
            );
        }
    }
}
