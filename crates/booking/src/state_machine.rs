use serde::{Deserialize, Serialize};

use adspace_core::error::{MarketError, MarketResult};
use adspace_core::types::BookingStatus;

/// Describes a single valid state transition for a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub trigger: &'static str,
}

/// Guards the booking lifecycle by enforcing a finite set of valid state
/// transitions. The happy path is linear; `Disputed` is a side track that
/// resolves back into the graph, and cancellation is only legal before
/// installation.
#[derive(Debug, Clone)]
pub struct BookingStateMachine {
    transitions: Vec<StateTransition>,
}

impl BookingStateMachine {
    /// Creates the machine with all valid transitions pre-configured.
    pub fn new() -> Self {
        use BookingStatus::*;

        let mut transitions = vec![
            // Happy path
            StateTransition {
                from: PendingApproval,
                to: Approved,
                trigger: "owner_approve",
            },
            StateTransition {
                from: PendingApproval,
                to: Rejected,
                trigger: "owner_reject",
            },
            StateTransition {
                from: Approved,
                to: Paid,
                trigger: "payment_captured",
            },
            StateTransition {
                from: Paid,
                to: FileDownloaded,
                trigger: "file_downloaded",
            },
            StateTransition {
                from: FileDownloaded,
                to: Installed,
                trigger: "installed",
            },
            StateTransition {
                from: Installed,
                to: Verified,
                trigger: "proof_approved",
            },
            StateTransition {
                from: Verified,
                to: Completed,
                trigger: "campaign_ended",
            },
            // Dispute resolution outcomes
            StateTransition {
                from: Disputed,
                to: Installed,
                trigger: "dispute_uphold_owner",
            },
            StateTransition {
                from: Disputed,
                to: Verified,
                trigger: "dispute_uphold_owner",
            },
            StateTransition {
                from: Disputed,
                to: Completed,
                trigger: "dispute_resolved",
            },
            StateTransition {
                from: Disputed,
                to: Cancelled,
                trigger: "dispute_uphold_advertiser",
            },
        ];

        // Any non-terminal state can enter the dispute side-track, and a
        // completed booking can be disputed within the grace window (the
        // grace check itself lives in the dispute resolver).
        for from in [
            PendingApproval,
            Approved,
            Paid,
            FileDownloaded,
            Installed,
            Verified,
            Completed,
        ] {
            transitions.push(StateTransition {
                from,
                to: Disputed,
                trigger: "dispute_opened",
            });
        }

        // Administrative / automatic cancellation, pre-installation only.
        for from in [PendingApproval, Approved, Paid, FileDownloaded] {
            transitions.push(StateTransition {
                from,
                to: Cancelled,
                trigger: "cancelled",
            });
        }

        Self { transitions }
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: BookingStatus, to: BookingStatus) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.to == to)
    }

    /// Checks that `from -> to` is legal, returning a `StateViolation` that
    /// names the attempted action otherwise.
    pub fn assert_transition(
        &self,
        from: BookingStatus,
        to: BookingStatus,
        action: &'static str,
    ) -> MarketResult<()> {
        if self.can_transition(from, to) {
            Ok(())
        } else {
            Err(MarketError::StateViolation { from, action })
        }
    }
}

impl Default for BookingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    #[test]
    fn test_happy_path_is_legal() {
        let m = BookingStateMachine::new();
        let path = [
            PendingApproval,
            Approved,
            Paid,
            FileDownloaded,
            Installed,
            Verified,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(m.can_transition(pair[0], pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_skipping_ahead() {
        let m = BookingStateMachine::new();
        assert!(!m.can_transition(PendingApproval, Paid));
        assert!(!m.can_transition(Approved, Installed));
        assert!(!m.can_transition(Paid, Verified));
        assert!(!m.can_transition(Installed, Completed));
    }

    #[test]
    fn test_no_reversing() {
        let m = BookingStateMachine::new();
        assert!(!m.can_transition(Paid, Approved));
        assert!(!m.can_transition(Verified, Installed));
        assert!(!m.can_transition(Completed, Verified));
    }

    #[test]
    fn test_terminal_states_are_dead_ends() {
        let m = BookingStateMachine::new();
        for to in [
            PendingApproval,
            Approved,
            Paid,
            FileDownloaded,
            Installed,
            Verified,
            Completed,
        ] {
            assert!(!m.can_transition(Rejected, to));
            assert!(!m.can_transition(Cancelled, to));
        }
        // Completed is terminal for progression but may still be disputed
        // within the grace window.
        assert!(m.can_transition(Completed, Disputed));
    }

    #[test]
    fn test_cancellation_only_before_installation() {
        let m = BookingStateMachine::new();
        assert!(m.can_transition(Paid, Cancelled));
        assert!(m.can_transition(FileDownloaded, Cancelled));
        assert!(!m.can_transition(Installed, Cancelled));
        assert!(!m.can_transition(Verified, Cancelled));
        // ...except via dispute resolution.
        assert!(m.can_transition(Disputed, Cancelled));
    }

    #[test]
    fn test_dispute_side_track_resolves_back() {
        let m = BookingStateMachine::new();
        assert!(m.can_transition(Verified, Disputed));
        assert!(m.can_transition(Disputed, Verified));
        assert!(m.can_transition(Disputed, Completed));
        assert!(m.can_transition(Disputed, Cancelled));
        assert!(!m.can_transition(Disputed, Paid));
    }

    #[test]
    fn test_assert_transition_reports_source_state() {
        let m = BookingStateMachine::new();
        let err = m
            .assert_transition(Installed, Cancelled, "cancel_booking")
            .unwrap_err();
        match err {
            MarketError::StateViolation { from, action } => {
                assert_eq!(from, Installed);
                assert_eq!(action, "cancel_booking");
            }
            other => panic!("expected StateViolation, got {:?}", other),
        }
    }
}
