use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::{Checks, parse_id};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::{NewTransaction, TransactionFilter, TransactionType};
use crate::server::AppState;

/// Largest number of ids accepted by one bulk delete.
const MAX_BULK_IDS: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    #[serde(alias = "categoryId")]
    pub category: Option<String>,
    pub date: Option<String>,
}

impl TransactionBody {
    fn validate(&self) -> Result<NewTransaction, ApiError> {
        let mut checks = Checks::default();
        let kind: Option<TransactionType> = checks.required("type", self.kind.as_deref());
        let amount = checks.amount("amount", self.amount);
        let description = checks.text("description", self.description.as_deref(), 1, 200);
        let category_id = if self.category.as_deref().map(str::trim).is_none_or(str::is_empty) {
            checks.fail("category", "category is required");
            None
        } else {
            checks.uuid("category", self.category.as_deref())
        };
        let date = checks.required_date("date", self.date.as_deref());
        match (kind, amount, description, category_id, date) {
            (Some(kind), Some(amount), Some(description), Some(category_id), Some(date))
                if checks.is_ok() =>
            {
                Ok(NewTransaction {
                    kind,
                    amount,
                    description,
                    category_id,
                    date,
                })
            }
            _ => Err(checks.into_error()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteBody {
    pub ids: Option<Vec<String>>,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let mut checks = Checks::default();
    let filter = TransactionFilter {
        page: checks.bounded("page", query.page.as_deref(), 1, 10_000, 1),
        limit: checks.bounded("limit", query.limit.as_deref(), 1, 100, 20),
        kind: checks.optional("type", query.kind.as_deref()),
        category_id: checks.uuid("category", query.category.as_deref()),
        range: checks.range(query.start_date.as_deref(), query.end_date.as_deref()),
        search: query
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    };
    checks.finish()?;

    let page = state.ledger.list_transactions(user.id, &filter);
    Ok(Json(json!(page)))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<TransactionBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let input = body.validate()?;
    let transaction = state.ledger.create_transaction(user.id, input)?;
    tracing::debug!(transaction_id = %transaction.id, "Transaction created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Transaction created successfully",
            "transaction": transaction,
        })),
    ))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "Transaction")?;
    let transaction = state.ledger.transaction(user.id, id)?;
    Ok(Json(json!({ "transaction": transaction })))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Result<Json<TransactionBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "Transaction")?;
    let Json(body) = body?;
    let input = body.validate()?;
    let transaction = state.ledger.update_transaction(user.id, id, input)?;
    Ok(Json(json!({
        "message": "Transaction updated successfully",
        "transaction": transaction,
    })))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "Transaction")?;
    state.ledger.delete_transaction(user.id, id)?;
    Ok(Json(json!({ "message": "Transaction deleted successfully" })))
}

pub async fn bulk_delete_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<BulkDeleteBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let ids = parse_bulk_ids(body.ids.unwrap_or_default())?;
    let deleted = state.ledger.bulk_delete(user.id, &ids);
    Ok(Json(json!({
        "message": format!("{deleted} transactions deleted successfully"),
        "deletedCount": deleted,
    })))
}

fn parse_bulk_ids(raw: Vec<String>) -> Result<Vec<Uuid>, ApiError> {
    if raw.is_empty() || raw.len() > MAX_BULK_IDS {
        return Err(ApiError::invalid_field(
            "ids",
            format!("ids must contain between 1 and {MAX_BULK_IDS} entries"),
        ));
    }
    raw.iter()
        .map(|id| Uuid::parse_str(id.trim()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ApiError::invalid_field("ids", "ids must be valid transaction ids"))
}
