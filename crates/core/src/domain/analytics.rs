use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

/// Daily rollup for one (tenant, date). Produced by full recompute from the
/// conversation and message rows, never by incrementing counters, so a rerun
/// for the same day always yields the same row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyAnalytics {
    pub tenant_id: TenantId,
    pub date: NaiveDate,
    pub total_conversations: i64,
    pub resolved_conversations: i64,
    pub escalated_conversations: i64,
    pub total_messages: i64,
    pub avg_response_time_ms: Option<f64>,
    pub avg_csat_score: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

impl DailyAnalytics {
    pub fn empty(tenant_id: TenantId, date: NaiveDate, computed_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            date,
            total_conversations: 0,
            resolved_conversations: 0,
            escalated_conversations: 0,
            total_messages: 0,
            avg_response_time_ms: None,
            avg_csat_score: None,
            computed_at,
        }
    }

    pub fn escalation_rate_pct(&self) -> f64 {
        if self.total_conversations == 0 {
            return 0.0;
        }
        (self.escalated_conversations as f64 / self.total_conversations as f64 * 1000.0).round()
            / 10.0
    }
}
