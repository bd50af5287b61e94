//! Payment-processing collaborator seam.
//!
//! The core never talks to a payment provider directly; it calls this trait
//! and records the typed outcome. Swap `MockPaymentGateway` for a Stripe /
//! Adyen adapter in production.

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

/// Outcome of a charge capture against the advertiser.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Captured { reference: String },
    Failed { reason: String },
}

/// Outcome of a payment reversal.
#[derive(Debug, Clone, PartialEq)]
pub enum RefundOutcome {
    Issued { reference: String },
    Failed { reason: String },
    /// The call's effect is unknown (e.g. network timeout). Must be parked
    /// for manual reconciliation; retrying could double-refund.
    Ambiguous { reason: String },
}

/// Outcome of a transfer to a space owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Settled {
        reference: String,
    },
    /// Part of a split transfer settled while the rest failed. Distinct
    /// from full failure for reconciliation.
    PartiallySettled {
        reference: String,
        settled_amount: f64,
    },
    Failed {
        reason: String,
    },
}

/// Payment-processing collaborator. Implementations return typed outcomes
/// with external reference ids; they never panic across this boundary.
pub trait PaymentGateway: Send + Sync {
    fn capture(&self, booking_id: Uuid, amount: f64) -> CaptureOutcome;
    fn refund(&self, booking_id: Uuid, amount: f64) -> RefundOutcome;
    fn transfer_to_owner(&self, booking_id: Uuid, owner_id: Uuid, amount: f64) -> TransferOutcome;
}

/// Generate a provider-style external reference, e.g. `tr_h3x9k2m4p7q1`.
pub fn external_ref(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("{}_{}", prefix, suffix.to_lowercase())
}

/// Scripted behavior for the next capture call on the mock gateway.
#[derive(Debug, Clone)]
pub enum CaptureBehavior {
    Capture,
    Fail(String),
}

/// Scripted behavior for the next transfer call on the mock gateway.
#[derive(Debug, Clone)]
pub enum TransferBehavior {
    Settle,
    SettlePartially(f64),
    Fail(String),
}

/// Scripted behavior for the next refund call on the mock gateway.
#[derive(Debug, Clone)]
pub enum RefundBehavior {
    Issue,
    Fail(String),
    Ambiguous(String),
}

/// In-memory gateway for development and tests. Calls succeed unless a
/// behavior has been scripted; scripted behaviors are consumed in order.
#[derive(Default)]
pub struct MockPaymentGateway {
    capture_script: Mutex<VecDeque<CaptureBehavior>>,
    transfer_script: Mutex<VecDeque<TransferBehavior>>,
    refund_script: Mutex<VecDeque<RefundBehavior>>,
    captures_performed: Mutex<u64>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_capture(&self, behavior: CaptureBehavior) {
        self.capture_script
            .lock()
            .expect("gateway mutex poisoned")
            .push_back(behavior);
    }

    /// Number of successful captures performed, for double-charge checks.
    pub fn captures_performed(&self) -> u64 {
        *self.captures_performed.lock().expect("gateway mutex poisoned")
    }

    pub fn script_transfer(&self, behavior: TransferBehavior) {
        self.transfer_script
            .lock()
            .expect("gateway mutex poisoned")
            .push_back(behavior);
    }

    pub fn script_refund(&self, behavior: RefundBehavior) {
        self.refund_script
            .lock()
            .expect("gateway mutex poisoned")
            .push_back(behavior);
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn capture(&self, _booking_id: Uuid, _amount: f64) -> CaptureOutcome {
        let scripted = self
            .capture_script
            .lock()
            .expect("gateway mutex poisoned")
            .pop_front();
        match scripted {
            None | Some(CaptureBehavior::Capture) => {
                *self.captures_performed.lock().expect("gateway mutex poisoned") += 1;
                CaptureOutcome::Captured {
                    reference: external_ref("pi"),
                }
            }
            Some(CaptureBehavior::Fail(reason)) => CaptureOutcome::Failed { reason },
        }
    }

    fn refund(&self, _booking_id: Uuid, _amount: f64) -> RefundOutcome {
        let scripted = self
            .refund_script
            .lock()
            .expect("gateway mutex poisoned")
            .pop_front();
        match scripted {
            None | Some(RefundBehavior::Issue) => RefundOutcome::Issued {
                reference: external_ref("re"),
            },
            Some(RefundBehavior::Fail(reason)) => RefundOutcome::Failed { reason },
            Some(RefundBehavior::Ambiguous(reason)) => RefundOutcome::Ambiguous { reason },
        }
    }

    fn transfer_to_owner(&self, _booking_id: Uuid, _owner_id: Uuid, amount: f64) -> TransferOutcome {
        let scripted = self
            .transfer_script
            .lock()
            .expect("gateway mutex poisoned")
            .pop_front();
        match scripted {
            None | Some(TransferBehavior::Settle) => TransferOutcome::Settled {
                reference: external_ref("tr"),
            },
            Some(TransferBehavior::SettlePartially(settled)) => TransferOutcome::PartiallySettled {
                reference: external_ref("tr"),
                settled_amount: settled.min(amount),
            },
            Some(TransferBehavior::Fail(reason)) => TransferOutcome::Failed { reason },
        }
    }
}
