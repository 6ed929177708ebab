use axum::{
    Extension, Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::Checks;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::{DateRange, GroupBy, TransactionType};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub group_by: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<String>,
}

/// Validated analytics parameters.
struct Params {
    range: DateRange,
    group_by: GroupBy,
    kind: TransactionType,
    limit: usize,
}

impl AnalyticsQuery {
    fn params(&self) -> Result<Params, ApiError> {
        let mut checks = Checks::default();
        let range = checks.range(self.start_date.as_deref(), self.end_date.as_deref());
        let group_by = checks
            .optional("groupBy", self.group_by.as_deref())
            .unwrap_or(GroupBy::Day);
        let kind = checks
            .optional("type", self.kind.as_deref())
            .unwrap_or(TransactionType::Expense);
        let limit = checks.bounded("limit", self.limit.as_deref(), 1, 20, 5);
        checks.finish()?;
        Ok(Params {
            range,
            group_by,
            kind,
            limit,
        })
    }
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let params = query.params()?;
    Ok(Json(json!({ "summary": state.ledger.summary(user.id, params.range) })))
}

pub async fn by_category(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let params = query.params()?;
    let categories = state.ledger.by_category(user.id, params.range, params.kind);
    Ok(Json(json!({ "categories": categories })))
}

pub async fn by_date(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let params = query.params()?;
    let trends = state.ledger.by_date(user.id, params.range, params.group_by);
    Ok(Json(json!({ "trends": trends })))
}

pub async fn top_categories(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let params = query.params()?;
    let mut categories = state.ledger.by_category(user.id, params.range, params.kind);
    categories.truncate(params.limit);
    Ok(Json(json!({ "categories": categories })))
}

pub async fn categories(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Json<Value> {
    Json(json!({ "categories": state.ledger.category_usage(user.id) }))
}

/// Full dump for download. Carries a timestamp, so it is never cached.
pub async fn export(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let params = query.params()?;
    Ok(Json(json!({
        "exportedAt": chrono::Utc::now(),
        "summary": state.ledger.summary(user.id, params.range),
        "transactions": state.ledger.export(user.id, params.range),
    })))
}
