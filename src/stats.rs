//! Running per-community counters.
//!
//! A [`StatsDocument`] is the aggregate of every event a community ever
//! reported. Discrete events are folded in one at a time and only the
//! aggregate is persisted; there is no event log to replay.
//!
//! Counters only ever grow, with one exception: `openTickets` goes down when
//! a ticket closes, clamped at zero so duplicate or out-of-order close
//! events cannot drive it negative.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::event::{ModEvent, ModEventKind, TicketAction};

/// Aggregate counters for one community.
///
/// The zero-valued default stands in for communities that never reported
/// anything; reading stats is never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatsDocument {
    /// Tickets currently open.
    pub open_tickets: u64,

    /// Tickets ever opened.
    pub total_tickets: u64,

    /// Violation counts keyed by rule label.
    pub violations: BTreeMap<String, u64>,

    /// RFC 3339 timestamp of the last fold, absent until the first one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl StatsDocument {
    /// Fold one event into the counters.
    ///
    /// Close events saturate at zero; a close with no matching open is
    /// treated as a duplicate and dropped on the floor.
    pub fn fold(&mut self, event: &ModEvent) {
        match &event.kind {
            ModEventKind::Violation { label } => {
                *self.violations.entry(label.clone()).or_insert(0) += 1;
            }
            ModEventKind::Ticket(TicketAction::Open) => {
                self.open_tickets += 1;
                self.total_tickets += 1;
            }
            ModEventKind::Ticket(TicketAction::Close) => {
                self.open_tickets = self.open_tickets.saturating_sub(1);
            }
        }
        self.updated_at = Some(Utc::now().to_rfc3339());
    }

    /// Total violations across all rules.
    pub fn total_violations(&self) -> u64 {
        self.violations.values().sum()
    }
}
