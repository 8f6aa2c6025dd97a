//! Update state machine.
//!
//! The coordinator owns exactly one [`UpdateState`] and only ever changes it
//! through [`UpdateState::apply`]. Every transition that is not listed below
//! is rejected, which is what keeps checks and patches from overlapping:
//!
//! ```text
//!                 StartCheck                 AwaitConfirmation(v)
//!   Idle ───────────────────────► Checking ───────────────────────► AwaitingConfirmation(v)
//!    ▲ ▲                            │  │                               │   │
//!    │ └──────── FinishCheck ───────┘  │ ApplyDetected(v)      Confirm │   │ StartCheck
//!    │                                 ▼                               ▼   └──► Checking(v)
//!    │                           Downloading(v) ◄──────────────────────┘
//!    │                                 │            (StartPatch(v) from Idle too)
//!    │                   FinishDownload│
//!    │                                 ▼
//!    └──────── FinishInstall ──── Installing(v)
//!
//!   Abort: Checking | Downloading | Installing ──► Idle
//! ```
//!
//! A check started while a prompt is pending remembers the offered version.
//! If that check ends without a newer offer (`FinishCheck` or `Abort`), the
//! prompt is restored, and `Confirm` is accepted while the check is still
//! running.

use std::fmt;
use thiserror::Error;

/// Where the coordinator is in an update cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdateState {
    /// Nothing in flight. Initial and terminal state of every cycle.
    #[default]
    Idle,
    /// A version check round-trip is in flight. `pending` is the version
    /// the user was already asked about, if any.
    Checking { pending: Option<String> },
    /// An automatic check found a new version and the user has been asked.
    AwaitingConfirmation { target_version: String },
    /// The patch archive is being downloaded.
    Downloading { target_version: String },
    /// The companion has been told to exit and the archive is being applied.
    Installing { target_version: String },
}

impl UpdateState {
    /// A version check is in flight.
    #[must_use]
    pub const fn is_checking(&self) -> bool {
        matches!(self, Self::Checking { .. })
    }

    /// A patch is in flight (download or install).
    #[must_use]
    pub const fn is_patching(&self) -> bool {
        matches!(self, Self::Downloading { .. } | Self::Installing { .. })
    }

    /// Version being offered or applied, if any.
    #[must_use]
    pub fn target_version(&self) -> Option<&str> {
        match self {
            Self::AwaitingConfirmation { target_version }
            | Self::Downloading { target_version }
            | Self::Installing { target_version } => Some(target_version),
            Self::Checking { pending } => pending.as_deref(),
            Self::Idle => None,
        }
    }

    /// Compute the state reached by `transition`, or why it is not allowed.
    ///
    /// Pure: the caller decides whether to store the result.
    pub fn apply(&self, transition: Transition) -> Result<Self, Rejection> {
        use Transition as T;
        use UpdateState as S;

        match (self, transition) {
            (S::Idle, T::StartCheck) => Ok(S::Checking { pending: None }),
            (S::AwaitingConfirmation { target_version }, T::StartCheck) => Ok(S::Checking {
                pending: Some(target_version.clone()),
            }),
            (S::Checking { .. }, T::StartCheck) => Err(Rejection::AlreadyChecking),

            (S::Checking { pending }, T::FinishCheck | T::Abort) => Ok(match pending {
                Some(target_version) => S::AwaitingConfirmation {
                    target_version: target_version.clone(),
                },
                None => S::Idle,
            }),
            (S::Checking { .. }, T::AwaitConfirmation(target_version)) => {
                Ok(S::AwaitingConfirmation { target_version })
            }
            (S::Checking { .. }, T::ApplyDetected(target_version)) => {
                Ok(S::Downloading { target_version })
            }

            (S::Idle | S::AwaitingConfirmation { .. }, T::StartPatch(target_version)) => {
                Ok(S::Downloading { target_version })
            }
            (S::Checking { .. }, T::StartPatch(_)) => Err(Rejection::AlreadyChecking),

            (
                S::AwaitingConfirmation { target_version }
                | S::Checking {
                    pending: Some(target_version),
                },
                T::Confirm,
            ) => Ok(S::Downloading {
                target_version: target_version.clone(),
            }),
            (S::Idle | S::Checking { pending: None }, T::Confirm) => {
                Err(Rejection::NothingToConfirm)
            }

            (S::Downloading { target_version }, T::FinishDownload) => Ok(S::Installing {
                target_version: target_version.clone(),
            }),
            (S::Installing { .. }, T::FinishInstall) => Ok(S::Idle),

            (S::Downloading { .. } | S::Installing { .. }, T::Abort) => Ok(S::Idle),

            (S::Downloading { .. } | S::Installing { .. }, _) => Err(Rejection::AlreadyPatching),

            (from, transition) => Err(Rejection::InvalidTransition {
                from: from.name(),
                transition: transition.name(),
            }),
        }
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking { .. } => "checking",
            Self::AwaitingConfirmation { .. } => "awaiting-confirmation",
            Self::Downloading { .. } => "downloading",
            Self::Installing { .. } => "installing",
        }
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target_version() {
            Some(version) => write!(f, "{} ({version})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// Requested change of [`UpdateState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Begin a version check.
    StartCheck,
    /// The check ended without starting a patch (up to date or nothing
    /// published).
    FinishCheck,
    /// An automatic check found `version` and the user must confirm.
    AwaitConfirmation(String),
    /// A manual check found `version`; patch without asking.
    ApplyDetected(String),
    /// Start patching to `version` from outside a check.
    StartPatch(String),
    /// The user accepted the pending version.
    Confirm,
    /// The archive is on disk.
    FinishDownload,
    /// The archive has been applied.
    FinishInstall,
    /// The current step failed.
    Abort,
}

impl Transition {
    const fn name(&self) -> &'static str {
        match self {
            Self::StartCheck => "start-check",
            Self::FinishCheck => "finish-check",
            Self::AwaitConfirmation(_) => "await-confirmation",
            Self::ApplyDetected(_) => "apply-detected",
            Self::StartPatch(_) => "start-patch",
            Self::Confirm => "confirm",
            Self::FinishDownload => "finish-download",
            Self::FinishInstall => "finish-install",
            Self::Abort => "abort",
        }
    }
}

/// Why a transition was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("an update check is already in progress")]
    AlreadyChecking,

    #[error("an update is already being applied")]
    AlreadyPatching,

    #[error("no update is waiting for confirmation")]
    NothingToConfirm,

    #[error("cannot {transition} while {from}")]
    InvalidTransition {
        from: &'static str,
        transition: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn awaiting(v: &str) -> UpdateState {
        UpdateState::AwaitingConfirmation {
            target_version: v.to_string(),
        }
    }

    fn downloading(v: &str) -> UpdateState {
        UpdateState::Downloading {
            target_version: v.to_string(),
        }
    }

    fn installing(v: &str) -> UpdateState {
        UpdateState::Installing {
            target_version: v.to_string(),
        }
    }

    fn checking(pending: Option<&str>) -> UpdateState {
        UpdateState::Checking {
            pending: pending.map(str::to_string),
        }
    }

    #[test]
    fn test_full_confirmed_cycle() {
        let state = UpdateState::Idle;
        let state = state.apply(Transition::StartCheck).unwrap();
        assert!(state.is_checking());

        let state = state.apply(Transition::AwaitConfirmation("2.0".into())).unwrap();
        assert_eq!(state, awaiting("2.0"));
        assert!(!state.is_checking());
        assert!(!state.is_patching());

        let state = state.apply(Transition::Confirm).unwrap();
        assert_eq!(state, downloading("2.0"));
        assert!(state.is_patching());

        let state = state.apply(Transition::FinishDownload).unwrap();
        assert_eq!(state, installing("2.0"));
        assert!(state.is_patching());

        let state = state.apply(Transition::FinishInstall).unwrap();
        assert_eq!(state, UpdateState::Idle);
    }

    #[test]
    fn test_manual_detection_goes_straight_to_download() {
        let state = checking(None)
            .apply(Transition::ApplyDetected("2.0".into()))
            .unwrap();
        assert_eq!(state, downloading("2.0"));
        assert!(!state.is_checking());
    }

    #[test]
    fn test_overlapping_checks_rejected() {
        for state in [checking(None), checking(Some("2.0"))] {
            assert_eq!(
                state.apply(Transition::StartCheck),
                Err(Rejection::AlreadyChecking)
            );
        }
    }

    #[test]
    fn test_patching_blocks_everything_but_progress() {
        for state in [downloading("2.0"), installing("2.0")] {
            for transition in [
                Transition::StartCheck,
                Transition::StartPatch("3.0".into()),
                Transition::Confirm,
                Transition::FinishCheck,
            ] {
                assert_eq!(state.apply(transition), Err(Rejection::AlreadyPatching));
            }
        }
    }

    #[test]
    fn test_confirm_without_pending_version() {
        assert_eq!(
            UpdateState::Idle.apply(Transition::Confirm),
            Err(Rejection::NothingToConfirm)
        );
        assert_eq!(
            checking(None).apply(Transition::Confirm),
            Err(Rejection::NothingToConfirm)
        );
    }

    #[test]
    fn test_external_patch_rejected_during_check() {
        assert_eq!(
            checking(Some("2.0")).apply(Transition::StartPatch("2.0".into())),
            Err(Rejection::AlreadyChecking)
        );
    }

    #[test]
    fn test_check_over_pending_prompt_keeps_offer() {
        let state = awaiting("2.0").apply(Transition::StartCheck).unwrap();
        assert_eq!(state, checking(Some("2.0")));
        assert!(state.is_checking());
        assert_eq!(state.target_version(), Some("2.0"));

        // Nothing newer found, or the check failed: the prompt stands.
        assert_eq!(state.apply(Transition::FinishCheck), Ok(awaiting("2.0")));
        assert_eq!(state.apply(Transition::Abort), Ok(awaiting("2.0")));

        // A newer offer replaces it.
        assert_eq!(
            state.apply(Transition::AwaitConfirmation("3.0".into())),
            Ok(awaiting("3.0"))
        );
    }

    #[test]
    fn test_confirm_accepted_during_recheck() {
        assert_eq!(
            checking(Some("2.0")).apply(Transition::Confirm),
            Ok(downloading("2.0"))
        );
    }

    #[test]
    fn test_abort_returns_to_idle() {
        for state in [checking(None), downloading("2.0"), installing("2.0")] {
            assert_eq!(state.apply(Transition::Abort), Ok(UpdateState::Idle));
        }
    }

    #[test]
    fn test_out_of_order_transitions_rejected() {
        let err = UpdateState::Idle.apply(Transition::FinishDownload).unwrap_err();
        assert_eq!(
            err,
            Rejection::InvalidTransition {
                from: "idle",
                transition: "finish-download"
            }
        );
        assert!(UpdateState::Idle.apply(Transition::Abort).is_err());
        assert!(awaiting("2.0").apply(Transition::FinishInstall).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(UpdateState::Idle.to_string(), "idle");
        assert_eq!(downloading("2.0").to_string(), "downloading (2.0)");
        assert_eq!(checking(None).to_string(), "checking");
    }
}
