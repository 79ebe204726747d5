//! # Checkout Phase Machine
//!
//! The phases a sale moves through, and the only edges allowed between them.
//!
//! ## Transition Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │                  ┌──────────────┐                                       │
//! │      ┌──────────►│METHOD_SELECT │◄───────────────────────┐              │
//! │      │           └──────┬───────┘                        │              │
//! │      │        cash ┌────┴─────┐ card / transfer / wallet │              │
//! │      │             ▼          ▼                          │              │
//! │      │  ┌──────────────┐ ┌───────────────┐               │              │
//! │      ├──│METHOD_DETAILS│ │CONFIRM_PAYMENT│──┐            │              │
//! │      │  └──────┬───────┘ └───────┬───────┘  │ (back)     │              │
//! │      │         └───────┬─────────┘          │            │              │
//! │      │                 ▼                    │            │              │
//! │      │           ┌──────────┐               │            │              │
//! │      ├───────────│  REVIEW  │◄──────────────┘            │              │
//! │      │   (back)  └────┬─────┘                            │              │
//! │      │                ▼                                  │              │
//! │      │          ┌────────────┐   no cancel, no re-entry  │              │
//! │      │          │ PROCESSING │                           │              │
//! │      │          └─────┬──────┘                           │              │
//! │      │          ┌─────┴─────┐                            │              │
//! │      │          ▼           ▼                            │              │
//! │      │    ┌─────────┐  ┌─────────┐                       │              │
//! │      └────│ SUCCESS │  │  ERROR  │───────────────────────┘              │
//! │ new sale  └─────────┘  └─────────┘  manual retry only                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Guards that need the cart or the tender (non-empty cart, sufficient
//! cash) live in the checkout executor; this module only knows edges.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Phases
// =============================================================================

/// A checkout phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutPhase {
    MethodSelect,
    MethodDetails,
    ConfirmPayment,
    Review,
    Processing,
    Success,
    Error,
}

/// Every edge of the machine. Anything else is illegal.
const TRANSITIONS: &[(CheckoutPhase, CheckoutPhase)] = &[
    (CheckoutPhase::MethodSelect, CheckoutPhase::MethodDetails),
    (CheckoutPhase::MethodSelect, CheckoutPhase::ConfirmPayment),
    (CheckoutPhase::MethodDetails, CheckoutPhase::Review),
    (CheckoutPhase::MethodDetails, CheckoutPhase::MethodSelect),
    (CheckoutPhase::ConfirmPayment, CheckoutPhase::Review),
    (CheckoutPhase::ConfirmPayment, CheckoutPhase::MethodSelect),
    (CheckoutPhase::Review, CheckoutPhase::Processing),
    (CheckoutPhase::Review, CheckoutPhase::MethodSelect),
    (CheckoutPhase::Processing, CheckoutPhase::Success),
    (CheckoutPhase::Processing, CheckoutPhase::Error),
    (CheckoutPhase::Success, CheckoutPhase::MethodSelect),
    (CheckoutPhase::Error, CheckoutPhase::MethodSelect),
];

impl CheckoutPhase {
    pub const ALL: [CheckoutPhase; 7] = [
        CheckoutPhase::MethodSelect,
        CheckoutPhase::MethodDetails,
        CheckoutPhase::ConfirmPayment,
        CheckoutPhase::Review,
        CheckoutPhase::Processing,
        CheckoutPhase::Success,
        CheckoutPhase::Error,
    ];

    pub fn can_transition_to(self, next: CheckoutPhase) -> bool {
        TRANSITIONS.contains(&(self, next))
    }

    /// Phases in which the sale may still be discarded.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            CheckoutPhase::MethodSelect
                | CheckoutPhase::MethodDetails
                | CheckoutPhase::ConfirmPayment
                | CheckoutPhase::Review
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckoutPhase::MethodSelect => "METHOD_SELECT",
            CheckoutPhase::MethodDetails => "METHOD_DETAILS",
            CheckoutPhase::ConfirmPayment => "CONFIRM_PAYMENT",
            CheckoutPhase::Review => "REVIEW",
            CheckoutPhase::Processing => "PROCESSING",
            CheckoutPhase::Success => "SUCCESS",
            CheckoutPhase::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a commit landed in `ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutErrorKind {
    /// A line asked for more than the latest known stock.
    #[serde(rename = "STOCK_SYNC_ERROR")]
    StockSync,
    /// Records could not be written to the local cache.
    #[serde(rename = "PERSISTENCE_ERROR")]
    Persistence,
}

impl std::fmt::Display for CheckoutErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckoutErrorKind::StockSync => write!(f, "STOCK_SYNC_ERROR"),
            CheckoutErrorKind::Persistence => write!(f, "PERSISTENCE_ERROR"),
        }
    }
}

// =============================================================================
// Machine
// =============================================================================

/// Current phase plus the error kind when the phase is `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutMachine {
    phase: CheckoutPhase,
    error: Option<CheckoutErrorKind>,
}

impl CheckoutMachine {
    pub fn new() -> Self {
        CheckoutMachine {
            phase: CheckoutPhase::MethodSelect,
            error: None,
        }
    }

    pub fn phase(&self) -> CheckoutPhase {
        self.phase
    }

    pub fn error_kind(&self) -> Option<CheckoutErrorKind> {
        self.error
    }

    /// Takes one edge of the table.
    ///
    /// Entering `Error` this way records no kind; use [`Self::fail`].
    pub fn transition(&mut self, next: CheckoutPhase) -> CoreResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(CoreError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        if next != CheckoutPhase::Error {
            self.error = None;
        }
        Ok(())
    }

    /// `PROCESSING → ERROR` with a kind.
    pub fn fail(&mut self, kind: CheckoutErrorKind) -> CoreResult<()> {
        self.transition(CheckoutPhase::Error)?;
        self.error = Some(kind);
        Ok(())
    }

    /// Returns to `METHOD_SELECT` from any cancellable phase.
    pub fn cancel(&mut self) -> CoreResult<()> {
        if !self.phase.is_cancellable() {
            return Err(CoreError::IllegalTransition {
                from: self.phase,
                to: CheckoutPhase::MethodSelect,
            });
        }
        self.phase = CheckoutPhase::MethodSelect;
        self.error = None;
        Ok(())
    }
}

impl Default for CheckoutMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_happy_path_cash() {
        let mut m = CheckoutMachine::new();
        m.transition(CheckoutPhase::MethodDetails).unwrap();
        m.transition(CheckoutPhase::Review).unwrap();
        m.transition(CheckoutPhase::Processing).unwrap();
        m.transition(CheckoutPhase::Success).unwrap();
        assert_eq!(m.phase(), CheckoutPhase::Success);
    }

    #[test]
    fn test_processing_cannot_be_reentered_or_cancelled() {
        let mut m = CheckoutMachine::new();
        m.transition(CheckoutPhase::ConfirmPayment).unwrap();
        m.transition(CheckoutPhase::Review).unwrap();
        m.transition(CheckoutPhase::Processing).unwrap();

        assert!(m.transition(CheckoutPhase::Processing).is_err());
        assert!(m.transition(CheckoutPhase::MethodSelect).is_err());
        assert!(m.cancel().is_err());
        assert_eq!(m.phase(), CheckoutPhase::Processing);
    }

    #[test]
    fn test_error_only_exits_to_method_select() {
        let mut m = CheckoutMachine::new();
        m.transition(CheckoutPhase::ConfirmPayment).unwrap();
        m.transition(CheckoutPhase::Review).unwrap();
        m.transition(CheckoutPhase::Processing).unwrap();
        m.fail(CheckoutErrorKind::StockSync).unwrap();
        assert_eq!(m.error_kind(), Some(CheckoutErrorKind::StockSync));

        for next in CheckoutPhase::ALL {
            let allowed = m.phase().can_transition_to(next);
            assert_eq!(allowed, next == CheckoutPhase::MethodSelect, "{next}");
        }

        m.transition(CheckoutPhase::MethodSelect).unwrap();
        assert_eq!(m.error_kind(), None);
    }

    #[test]
    fn test_fail_outside_processing_is_illegal() {
        let mut m = CheckoutMachine::new();
        let err = m.fail(CheckoutErrorKind::StockSync).unwrap_err();
        assert!(matches!(err, CoreError::IllegalTransition { .. }));
        assert_eq!(m.error_kind(), None);
    }

    #[test]
    fn test_every_phase_reachable_from_method_select() {
        let mut seen = HashSet::from([CheckoutPhase::MethodSelect]);
        let mut frontier = vec![CheckoutPhase::MethodSelect];
        while let Some(phase) = frontier.pop() {
            for next in CheckoutPhase::ALL {
                if phase.can_transition_to(next) && seen.insert(next) {
                    frontier.push(next);
                }
            }
        }
        assert_eq!(seen.len(), CheckoutPhase::ALL.len());
    }

    #[test]
    fn test_cancel_before_processing() {
        for phase in [
            CheckoutPhase::MethodDetails,
            CheckoutPhase::ConfirmPayment,
            CheckoutPhase::Review,
        ] {
            assert!(phase.is_cancellable());
        }
        assert!(!CheckoutPhase::Success.is_cancellable());

        let mut m = CheckoutMachine::new();
        m.transition(CheckoutPhase::MethodDetails).unwrap();
        m.transition(CheckoutPhase::Review).unwrap();
        m.cancel().unwrap();
        assert_eq!(m.phase(), CheckoutPhase::MethodSelect);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&CheckoutPhase::MethodSelect).unwrap(),
            "\"METHOD_SELECT\""
        );
        assert_eq!(
            serde_json::to_string(&CheckoutErrorKind::StockSync).unwrap(),
            "\"STOCK_SYNC_ERROR\""
        );
        assert_eq!(CheckoutErrorKind::StockSync.to_string(), "STOCK_SYNC_ERROR");
    }
}
