use crate::error::EngineError;
use chrono::{DateTime, Utc};
use core_types::{Party, TradeRecord, TradeStatus};
use std::fmt;

/// An action a participant takes on an existing trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Accept,
    Reject,
    Cancel,
    Counter,
    Confirm,
    Unconfirm,
}

impl Transition {
    /// The status a trade must be in for this action.
    fn required_status(&self) -> TradeStatus {
        match self {
            Transition::Accept | Transition::Reject | Transition::Cancel | Transition::Counter => {
                TradeStatus::Pending
            }
            Transition::Confirm | Transition::Unconfirm => TradeStatus::Accepted,
        }
    }

    /// The only party allowed to take this action, if it is restricted.
    fn required_party(&self) -> Option<Party> {
        match self {
            Transition::Accept | Transition::Reject | Transition::Counter => Some(Party::Recipient),
            Transition::Cancel => Some(Party::Initiator),
            Transition::Confirm | Transition::Unconfirm => None,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Transition::Accept => "accept",
            Transition::Reject => "reject",
            Transition::Cancel => "cancel",
            Transition::Counter => "counter",
            Transition::Confirm => "confirm",
            Transition::Unconfirm => "unconfirm",
        };
        f.write_str(verb)
    }
}

/// The validated result of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The record as it should be stored, with its version already bumped.
    pub next: TradeRecord,
    /// The role the actor plays.
    pub party: Party,
    /// True when this transition completes the trade and items must move.
    pub settle: bool,
}

/// The single place where trade lifecycle rules live.
///
/// ```text
/// pending ──accept──▶ accepted ──confirm (both sides)──▶ completed
///    │
///    ├──reject──▶ rejected
///    ├──cancel──▶ cancelled
///    └──counter─▶ countered   (a new pending record continues the chain)
/// ```
pub struct TradeStateMachine;

impl TradeStateMachine {
    /// Checks `transition` by `actor` against `trade` and returns the record
    /// it produces. Nothing is written.
    pub fn transition(
        trade: &TradeRecord,
        transition: Transition,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Outcome, EngineError> {
        let party = trade.party_of(actor).ok_or_else(|| {
            EngineError::Forbidden(format!("user {actor} is not a participant in trade {}", trade.trade_id))
        })?;
        if let Some(required) = transition.required_party() {
            if party != required {
                return Err(EngineError::Forbidden(format!(
                    "only the {} can {transition} this trade",
                    party_label(required)
                )));
            }
        }
        if trade.status != transition.required_status() {
            return Err(EngineError::InvalidState(format!(
                "cannot {transition} a trade that is {}",
                trade.status
            )));
        }

        let mut next = trade.clone();
        next.version += 1;
        next.updated_at = now;
        let mut settle = false;

        match transition {
            Transition::Accept => {
                next.status = TradeStatus::Accepted;
                next.set_confirmed(Party::Recipient, Some(now));
            }
            Transition::Reject => Self::resolve(&mut next, TradeStatus::Rejected, now),
            Transition::Cancel => Self::resolve(&mut next, TradeStatus::Cancelled, now),
            Transition::Counter => Self::resolve(&mut next, TradeStatus::Countered, now),
            Transition::Confirm => {
                if trade.is_confirmed_by(party) {
                    return Err(EngineError::InvalidState(format!(
                        "the {} has already confirmed this trade",
                        party_label(party)
                    )));
                }
                next.set_confirmed(party, Some(now));
                if next.both_confirmed() {
                    Self::resolve(&mut next, TradeStatus::Completed, now);
                    settle = true;
                }
            }
            Transition::Unconfirm => {
                if !trade.is_confirmed_by(party) {
                    return Err(EngineError::InvalidState(format!(
                        "the {} has not confirmed this trade",
                        party_label(party)
                    )));
                }
                if trade.is_confirmed_by(party.opposite()) {
                    return Err(EngineError::InvalidState(
                        "cannot unconfirm once both parties have confirmed".to_string(),
                    ));
                }
                next.set_confirmed(party, None);
            }
        }

        Ok(Outcome { next, party, settle })
    }

    /// The record of a self-transfer: complete on creation, both sides confirmed.
    pub fn complete_self_transfer(trade: &TradeRecord, now: DateTime<Utc>) -> TradeRecord {
        let mut next = trade.clone();
        next.set_confirmed(Party::Initiator, Some(now));
        next.set_confirmed(Party::Recipient, Some(now));
        Self::resolve(&mut next, TradeStatus::Completed, now);
        next
    }

    fn resolve(record: &mut TradeRecord, status: TradeStatus, now: DateTime<Utc>) {
        record.status = status;
        record.resolved_at = Some(now);
    }
}

fn party_label(party: Party) -> &'static str {
    match party {
        Party::Initiator => "initiator",
        Party::Recipient => "recipient",
    }
}
