use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::cache::GetOptions;
use crate::cached_api::CachedApi;
use crate::error::Result;

const SUMMARY_TTL: Duration = Duration::from_secs(60);
const RECENT_TTL: Duration = Duration::from_secs(30);
const TREND_DAYS: u64 = 30;
const TOP_CATEGORIES: usize = 6;

/// Everything the overview screen shows.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub summary: Option<Value>,
    pub recent_transactions: Vec<Value>,
    pub recent_p2p: Vec<Value>,
    pub p2p_summary: Option<Value>,
    pub categories: Vec<Value>,
    pub trends: Vec<Value>,
}

impl Dashboard {
    /// Fetch all sections concurrently.
    ///
    /// A failure in any request yields an empty dashboard rather than an error.
    pub async fn load(api: &CachedApi) -> Self {
        let today = Utc::now().date_naive();
        match Self::fetch(api, today).await {
            Ok(dashboard) => dashboard,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load dashboard");
                Self::default()
            }
        }
    }

    async fn fetch(api: &CachedApi, today: NaiveDate) -> Result<Self> {
        let start = today.checked_sub_days(Days::new(TREND_DAYS)).unwrap_or(today);
        let trend_path = format!(
            "/analytics/by-date?startDate={start}&endDate={today}&groupBy=day"
        );

        let (summary, transactions, p2p, p2p_summary, categories, trends) = futures_util::try_join!(
            api.get("/analytics/summary", GetOptions::ttl(SUMMARY_TTL)),
            api.get("/transactions?limit=5", GetOptions::ttl(RECENT_TTL)),
            api.get("/transactions/p2p?limit=3", GetOptions::ttl(RECENT_TTL)),
            api.get("/transactions/p2p/summary", GetOptions::ttl(SUMMARY_TTL)),
            api.get("/analytics/by-category", GetOptions::ttl(SUMMARY_TTL)),
            api.get(&trend_path, GetOptions::ttl(SUMMARY_TTL)),
        )?;

        let mut categories = list(&categories, "categories");
        categories.truncate(TOP_CATEGORIES);

        Ok(Self {
            summary: summary.get("summary").cloned(),
            recent_transactions: list(&transactions, "transactions"),
            recent_p2p: list(&p2p, "transactions"),
            p2p_summary: p2p_summary.get("summary").cloned(),
            categories,
            trends: list(&trends, "trends"),
        })
    }
}

fn list(body: &Value, field: &str) -> Vec<Value> {
    body.get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
