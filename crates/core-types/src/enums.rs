use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Lifecycle status of a single trade offer.
///
/// `Pending` and `Accepted` are the only live states. Everything else is terminal
/// for the record that carries it; `Countered` hands the negotiation over to a
/// fresh `Pending` record in the same chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Accepted,
    Countered,
    Rejected,
    Cancelled,
    Completed,
}

impl TradeStatus {
    /// Returns true once no further action may be taken on the record.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Pending | TradeStatus::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Accepted => "accepted",
            TradeStatus::Countered => "countered",
            TradeStatus::Rejected => "rejected",
            TradeStatus::Cancelled => "cancelled",
            TradeStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TradeStatus::Pending),
            "accepted" => Ok(TradeStatus::Accepted),
            "countered" => Ok(TradeStatus::Countered),
            "rejected" => Ok(TradeStatus::Rejected),
            "cancelled" => Ok(TradeStatus::Cancelled),
            "completed" => Ok(TradeStatus::Completed),
            other => Err(CoreError::InvalidInput("status".to_string(), other.to_string())),
        }
    }
}

/// Every action recorded in the negotiation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Created,
    Accepted,
    Rejected,
    Cancelled,
    CounterOffered,
    Confirmed,
    Unconfirmed,
    Completed,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Created => "created",
            TradeAction::Accepted => "accepted",
            TradeAction::Rejected => "rejected",
            TradeAction::Cancelled => "cancelled",
            TradeAction::CounterOffered => "counter_offered",
            TradeAction::Confirmed => "confirmed",
            TradeAction::Unconfirmed => "unconfirmed",
            TradeAction::Completed => "completed",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(TradeAction::Created),
            "accepted" => Ok(TradeAction::Accepted),
            "rejected" => Ok(TradeAction::Rejected),
            "cancelled" => Ok(TradeAction::Cancelled),
            "counter_offered" => Ok(TradeAction::CounterOffered),
            "confirmed" => Ok(TradeAction::Confirmed),
            "unconfirmed" => Ok(TradeAction::Unconfirmed),
            "completed" => Ok(TradeAction::Completed),
            other => Err(CoreError::InvalidInput("action".to_string(), other.to_string())),
        }
    }
}

/// Which side of a trade a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    /// Offered by the initiator, moves to the recipient.
    Escrow,
    /// Asked of the recipient, moves to the initiator.
    Requested,
}

/// The part a user plays in a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Initiator,
    Recipient,
}

impl Party {
    /// Returns the other side of the trade.
    pub fn opposite(&self) -> Self {
        match self {
            Party::Initiator => Party::Recipient,
            Party::Recipient => Party::Initiator,
        }
    }
}

/// Role filter used when listing a user's trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleFilter {
    Initiator,
    Recipient,
    #[default]
    Any,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_and_accepted_are_live() {
        assert!(!TradeStatus::Pending.is_terminal());
        assert!(!TradeStatus::Accepted.is_terminal());
        for status in [
            TradeStatus::Countered,
            TradeStatus::Rejected,
            TradeStatus::Cancelled,
            TradeStatus::Completed,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }

    #[test]
    fn status_parses_its_own_display() {
        let parsed: TradeStatus = TradeStatus::Countered.to_string().parse().unwrap();
        assert_eq!(parsed, TradeStatus::Countered);
        assert!("expired".parse::<TradeStatus>().is_err());
    }

    #[test]
    fn action_serializes_snake_case() {
        let json = serde_json::to_string(&TradeAction::CounterOffered).unwrap();
        assert_eq!(json, "\"counter_offered\"");
        assert_eq!("counter_offered".parse::<TradeAction>(), Ok(TradeAction::CounterOffered));
    }
}
