use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::Arc;
use storage::RowStore;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaStatus {
    pub tokens_used: u64,
    pub tokens_limit: u64,
    pub tokens_remaining: u64,
    pub cost_used: f64,
    pub cost_limit: f64,
    pub cost_remaining: f64,
    pub exceeded: bool,
    pub reset_time: DateTime<Utc>,
}

/// Daily tenant caps on tokens and cost, derived from persisted interactions
/// since UTC midnight. Store failures fail open.
pub struct QuotaManager {
    rows: Arc<dyn RowStore>,
    daily_token_limit: u64,
    daily_cost_limit: f64,
}

impl QuotaManager {
    pub fn new(rows: Arc<dyn RowStore>, daily_token_limit: u64, daily_cost_limit: f64) -> Self {
        Self {
            rows,
            daily_token_limit,
            daily_cost_limit,
        }
    }

    pub async fn check(&self, tenant_id: &str) -> QuotaStatus {
        let now = Utc::now();
        let start_of_day = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let reset_time = start_of_day + Duration::days(1);

        let usage = match self.rows.usage_since(tenant_id, start_of_day).await {
            Ok(usage) => usage,
            Err(err) => {
                error!(tenant_id, error = %err, "quota store unreachable, failing open");
                return QuotaStatus {
                    tokens_used: 0,
                    tokens_limit: self.daily_token_limit,
                    tokens_remaining: self.daily_token_limit,
                    cost_used: 0.0,
                    cost_limit: self.daily_cost_limit,
                    cost_remaining: self.daily_cost_limit,
                    exceeded: false,
                    reset_time,
                };
            }
        };

        let exceeded = usage.total_tokens >= self.daily_token_limit
            || usage.total_cost >= self.daily_cost_limit;

        let status = QuotaStatus {
            tokens_used: usage.total_tokens,
            tokens_limit: self.daily_token_limit,
            tokens_remaining: self.daily_token_limit.saturating_sub(usage.total_tokens),
            cost_used: usage.total_cost,
            cost_limit: self.daily_cost_limit,
            cost_remaining: (self.daily_cost_limit - usage.total_cost).max(0.0),
            exceeded,
            reset_time,
        };

        if exceeded {
            warn!(
                tenant_id,
                tokens_used = status.tokens_used,
                cost_used = status.cost_used,
                reset = %status.reset_time,
                "daily quota exceeded"
            );
        } else {
            debug!(
                tenant_id,
                tokens_remaining = status.tokens_remaining,
                "quota check passed"
            );
        }

        status
    }
}
