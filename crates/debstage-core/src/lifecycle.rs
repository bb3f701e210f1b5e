use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Progress of a [`PackageEnvironment`](crate::PackageEnvironment) through
/// the staging pipeline. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Uninitialized,
    Initialized,
    Trusted,
    Configured,
    Updated,
    Downloaded,
    Installed,
    Failed,
}

impl Stage {
    /// Name of the phase whose success leads to this stage.
    pub fn phase_name(self) -> &'static str {
        match self {
            Self::Uninitialized => "none",
            Self::Initialized => "setup",
            Self::Trusted => "add-keys",
            Self::Configured => "add-repos",
            Self::Updated => "update",
            Self::Downloaded => "download",
            Self::Installed => "install",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Trusted => "trusted",
            Self::Configured => "configured",
            Self::Updated => "updated",
            Self::Downloaded => "downloaded",
            Self::Installed => "installed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Trust and repository configuration may each be skipped, so `Configured`
/// and `Updated` are reachable from more than one predecessor.
pub fn validate_transition(from: Stage, to: Stage) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (Stage::Uninitialized, Stage::Initialized)
            | (Stage::Initialized, Stage::Trusted)
            | (Stage::Initialized | Stage::Trusted, Stage::Configured)
            | (
                Stage::Initialized | Stage::Trusted | Stage::Configured,
                Stage::Updated
            )
            | (Stage::Updated, Stage::Downloaded)
            | (Stage::Downloaded, Stage::Installed)
    ) || (to == Stage::Failed && from != Stage::Failed);

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(Stage::Uninitialized, Stage::Initialized).is_ok());
        assert!(validate_transition(Stage::Initialized, Stage::Trusted).is_ok());
        assert!(validate_transition(Stage::Initialized, Stage::Configured).is_ok());
        assert!(validate_transition(Stage::Trusted, Stage::Configured).is_ok());
        assert!(validate_transition(Stage::Initialized, Stage::Updated).is_ok()); // keys and repos skipped
        assert!(validate_transition(Stage::Trusted, Stage::Updated).is_ok());
        assert!(validate_transition(Stage::Configured, Stage::Updated).is_ok());
        assert!(validate_transition(Stage::Updated, Stage::Downloaded).is_ok());
        assert!(validate_transition(Stage::Downloaded, Stage::Installed).is_ok());
        assert!(validate_transition(Stage::Updated, Stage::Failed).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(Stage::Uninitialized, Stage::Trusted).is_err());
        assert!(validate_transition(Stage::Initialized, Stage::Downloaded).is_err());
        assert!(validate_transition(Stage::Configured, Stage::Trusted).is_err());
        assert!(validate_transition(Stage::Updated, Stage::Installed).is_err());
        assert!(validate_transition(Stage::Installed, Stage::Initialized).is_err());
        assert!(validate_transition(Stage::Initialized, Stage::Initialized).is_err());
    }

    #[test]
    fn failed_is_terminal() {
        for to in [
            Stage::Initialized,
            Stage::Trusted,
            Stage::Configured,
            Stage::Updated,
            Stage::Downloaded,
            Stage::Installed,
            Stage::Failed,
        ] {
            assert!(validate_transition(Stage::Failed, to).is_err(), "failed -> {to}");
        }
    }

    #[test]
    fn phase_names() {
        assert_eq!(Stage::Trusted.phase_name(), "add-keys");
        assert_eq!(Stage::Installed.phase_name(), "install");
    }
}
