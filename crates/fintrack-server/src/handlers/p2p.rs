//! Money lent to and borrowed from other people.

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

use super::{Checks, parse_id};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::{NewP2p, P2pDirection, P2pStatus};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct P2pBody {
    #[serde(alias = "personName")]
    pub counterparty: Option<String>,
    pub direction: Option<String>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub date: Option<String>,
}

impl P2pBody {
    fn validate(&self) -> Result<NewP2p, ApiError> {
        let mut checks = Checks::default();
        let counterparty = checks.text("counterparty", self.counterparty.as_deref(), 1, 100);
        let direction: Option<P2pDirection> = checks.required("direction", self.direction.as_deref());
        let amount = checks.amount("amount", self.amount);
        let description = checks
            .text("description", self.description.as_deref(), 0, 200)
            .unwrap_or_default();
        let date = checks
            .date("date", self.date.as_deref())
            .unwrap_or_else(|| chrono::Utc::now().date_naive());
        match (counterparty, direction, amount) {
            (Some(counterparty), Some(direction), Some(amount)) if checks.is_ok() => Ok(NewP2p {
                counterparty,
                direction,
                amount,
                description,
                date,
            }),
            _ => Err(checks.into_error()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct P2pQuery {
    pub status: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: Option<String>,
}

pub async fn create_p2p(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<P2pBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let input = body.validate()?;
    let transaction = state.ledger.create_p2p(user.id, input);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "P2P transaction created successfully",
            "transaction": transaction,
        })),
    ))
}

pub async fn list_p2p(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<P2pQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let mut checks = Checks::default();
    let status: Option<P2pStatus> = checks.optional("status", query.status.as_deref());
    let limit = checks.bounded("limit", query.limit.as_deref(), 1, 100, 20);
    checks.finish()?;

    let transactions = state.ledger.p2p_transactions(user.id, status, limit);
    Ok(Json(json!({ "transactions": transactions })))
}

pub async fn p2p_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Json<Value> {
    Json(json!({ "summary": state.ledger.p2p_summary(user.id) }))
}

pub async fn update_p2p_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "P2P transaction")?;
    let Json(body) = body?;
    let mut checks = Checks::default();
    let status: Option<P2pStatus> = checks.required("status", body.status.as_deref());
    let Some(status) = status.filter(|_| checks.is_ok()) else {
        return Err(checks.into_error());
    };

    let transaction = state.ledger.update_p2p_status(user.id, id, status)?;
    Ok(Json(json!({
        "message": "P2P transaction status updated",
        "transaction": transaction,
    })))
}
