use crate::error::EngineError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use store::TradeStore;

/// What a cleanup pass found, and removed unless it was a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub retention_days: u32,
    pub dry_run: bool,
    pub cutoff: DateTime<Utc>,
    pub trades_affected: u64,
    pub escrow_lines: u64,
    pub requested_lines: u64,
}

/// Batch janitor for the line items of long-resolved trades.
///
/// Only lines go. Trade records and history rows are kept as the audit trail,
/// and trades without a resolution time are never looked at.
#[derive(Clone)]
pub struct RetentionCleanup {
    trades: Arc<dyn TradeStore>,
}

impl RetentionCleanup {
    pub fn new(trades: Arc<dyn TradeStore>) -> Self {
        Self { trades }
    }

    pub async fn run(
        &self,
        retention_days: u32,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, EngineError> {
        if retention_days < 1 {
            return Err(EngineError::Validation(
                "retention_days must be at least 1".to_string(),
            ));
        }
        let cutoff = Duration::try_days(i64::from(retention_days))
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                EngineError::Validation(format!("retention_days {retention_days} is out of range"))
            })?;
        let mut report = CleanupReport {
            retention_days,
            dry_run,
            cutoff,
            trades_affected: 0,
            escrow_lines: 0,
            requested_lines: 0,
        };

        for trade in self.trades.resolved_before(cutoff).await? {
            // resolved_at is only set on terminal records; check anyway so a
            // live trade never loses its lines.
            if !trade.status.is_terminal() {
                continue;
            }
            let counts = if dry_run {
                self.trades.count_lines(trade.trade_id).await?
            } else {
                self.trades.delete_lines(trade.trade_id).await?
            };
            if counts.total() == 0 {
                continue;
            }
            report.trades_affected += 1;
            report.escrow_lines += counts.escrow;
            report.requested_lines += counts.requested;
        }

        tracing::info!(
            retention_days,
            dry_run,
            %cutoff,
            trades_affected = report.trades_affected,
            escrow_lines = report.escrow_lines,
            requested_lines = report.requested_lines,
            "Retention cleanup finished."
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{TradeLine, TradeLines, TradeRecord, TradeStatus};
    use store::MemoryStore;
    use uuid::Uuid;

    async fn resolved(store: &MemoryStore, status: TradeStatus, age_days: i64) -> TradeRecord {
        let mut trade = TradeRecord::new_offer("alice", Uuid::new_v4(), "bob", Uuid::new_v4(), None);
        trade.status = status;
        let lines = TradeLines::new(
            vec![TradeLine::new("OGN-001", 1), TradeLine::new("OGN-002", 2)],
            vec![TradeLine::new("SFD-010", 1)],
        );
        store.insert_trade(&trade, &lines).await.unwrap();
        if status.is_terminal() {
            store.set_resolved_at(trade.trade_id, Utc::now() - Duration::days(age_days)).await;
        }
        trade
    }

    #[tokio::test]
    async fn out_of_range_retention_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        resolved(&store, TradeStatus::Completed, 45).await;
        let cleanup = RetentionCleanup::new(store);

        let err = cleanup.run(100_000_000, true, Utc::now()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let err = cleanup.run(u32::MAX, false, Utc::now()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn dry_run_counts_without_deleting() {
        let store = Arc::new(MemoryStore::new());
        let old = resolved(&store, TradeStatus::Completed, 45).await;
        resolved(&store, TradeStatus::Cancelled, 5).await;
        let cleanup = RetentionCleanup::new(store.clone());

        let now = Utc::now();
        let report = cleanup.run(30, true, now).await.unwrap();
        assert_eq!((report.trades_affected, report.escrow_lines, report.requested_lines), (1, 2, 1));
        assert_eq!(store.count_lines(old.trade_id).await.unwrap().total(), 3);

        // A dry run is repeatable.
        assert_eq!(cleanup.run(30, true, now).await.unwrap(), report);
    }

    #[tokio::test]
    async fn execute_deletes_lines_but_keeps_the_trade() {
        let store = Arc::new(MemoryStore::new());
        let old = resolved(&store, TradeStatus::Rejected, 90).await;
        let live = resolved(&store, TradeStatus::Pending, 0).await;
        let cleanup = RetentionCleanup::new(store.clone());

        let report = cleanup.run(30, false, Utc::now()).await.unwrap();
        assert_eq!(report.trades_affected, 1);
        assert_eq!(store.count_lines(old.trade_id).await.unwrap().total(), 0);
        assert!(store.get_trade(old.trade_id).await.unwrap().is_some());
        assert_eq!(store.count_lines(live.trade_id).await.unwrap().total(), 3);

        let again = cleanup.run(30, false, Utc::now()).await.unwrap();
        assert_eq!(again.trades_affected, 0);
    }

    #[tokio::test]
    async fn zero_day_retention_is_rejected() {
        let cleanup = RetentionCleanup::new(Arc::new(MemoryStore::new()));
        let err = cleanup.run(0, true, Utc::now()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
