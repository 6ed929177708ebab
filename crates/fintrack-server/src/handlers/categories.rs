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
use crate::ledger::{NewCategory, TransactionType};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryBody {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub color: Option<String>,
}

impl CategoryBody {
    fn validate(&self) -> Result<NewCategory, ApiError> {
        let mut checks = Checks::default();
        let name = checks.text("name", self.name.as_deref(), 1, 50);
        let kind: Option<TransactionType> = checks.required("type", self.kind.as_deref());
        let color = self.color.as_deref().map(str::trim).filter(|c| !c.is_empty());
        if let Some(color) = color {
            if !is_hex_color(color) {
                checks.fail("color", "color must be a hex value like #22c55e");
            }
        }
        match (name, kind) {
            (Some(name), Some(kind)) if checks.is_ok() => Ok(NewCategory {
                name,
                kind,
                color: color.map(str::to_string),
            }),
            _ => Err(checks.into_error()),
        }
    }
}

/// `GET /api/categories` and `GET /api/transactions/categories`.
pub async fn list_categories(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<CategoryQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let mut checks = Checks::default();
    let kind: Option<TransactionType> = checks.optional("type", query.kind.as_deref());
    checks.finish()?;

    let categories = state.ledger.categories(user.id, kind);
    Ok(Json(json!({ "categories": categories })))
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<CategoryBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let input = body.validate()?;
    let category = state.ledger.create_category(user.id, input)?;
    tracing::debug!(category_id = %category.id, "Category created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Category created successfully",
            "category": category,
        })),
    ))
}

pub async fn update_category(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Result<Json<CategoryBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "Category")?;
    let Json(body) = body?;
    let input = body.validate()?;
    let category = state.ledger.update_category(user.id, id, input)?;
    Ok(Json(json!({
        "message": "Category updated successfully",
        "category": category,
    })))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "Category")?;
    state.ledger.delete_category(user.id, id)?;
    Ok(Json(json!({ "message": "Category deleted successfully" })))
}

fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_validation() {
        let ok = CategoryBody {
            name: Some(" Rent ".into()),
            kind: Some("expense".into()),
            color: Some("#aabbcc".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(ok.name, "Rent");

        let bad = CategoryBody {
            name: Some("x".repeat(51)),
            kind: Some("savings".into()),
            color: Some("red".into()),
        }
        .validate();
        match bad {
            Err(ApiError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
