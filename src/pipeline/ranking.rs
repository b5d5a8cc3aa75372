//! Result ranking — most recent first.
//!
//! Messages whose date could not be parsed are ranked as if they arrived
//! "now", which puts them at the top.

use chrono::{DateTime, FixedOffset, Utc};

use crate::pipeline::types::RankedMessage;

/// Rank by effective date, descending. Unparsed dates count as now.
pub fn rank(results: Vec<RankedMessage>) -> Vec<RankedMessage> {
    rank_at(results, Utc::now().fixed_offset())
}

/// [`rank`] with an explicit "now". Equal dates keep their input order.
pub fn rank_at(mut results: Vec<RankedMessage>, now: DateTime<FixedOffset>) -> Vec<RankedMessage> {
    results.sort_by(|a, b| effective_date(b, now).cmp(&effective_date(a, now)));
    results
}

fn effective_date(item: &RankedMessage, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    item.message.date.unwrap_or(now)
}
