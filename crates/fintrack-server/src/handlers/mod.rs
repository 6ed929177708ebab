//! HTTP handlers.
//!
//! Handlers know nothing about caching: the response cache and invalidation
//! layers are attached around them in `routes`.

pub mod analytics;
pub mod auth;
pub mod categories;
pub mod p2p;
pub mod transactions;

use std::str::FromStr;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, FieldError};
use crate::ledger::DateRange;
use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    cache: CacheStatus,
}

#[derive(Serialize)]
struct CacheStatus {
    mode: String,
    available: bool,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Always ready: the cache is optional, so its state is reported
/// but never fails the check.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let cache = CacheStatus {
        mode: state.store.mode().to_string(),
        available: state.store.is_available().await,
    };
    (
        StatusCode::OK,
        Json(ReadyResponse {
            status: "ready",
            cache,
        }),
    )
}

/// Record ids that do not parse can't exist, so they are reported as missing.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(format!("{what} not found")))
}

/// Collects field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub(crate) struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    pub(crate) fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub(crate) fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn into_error(self) -> ApiError {
        ApiError::validation(self.errors)
    }

    pub(crate) fn finish(self) -> Result<(), ApiError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }

    /// Parse a required value.
    pub(crate) fn required<T>(&mut self, field: &str, value: Option<&str>) -> Option<T>
    where
        T: FromStr<Err = String>,
    {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.optional(field, Some(v)),
            None => {
                self.fail(field, format!("{field} is required"));
                None
            }
        }
    }

    /// Parse a value that may be absent.
    pub(crate) fn optional<T>(&mut self, field: &str, value: Option<&str>) -> Option<T>
    where
        T: FromStr<Err = String>,
    {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(message) => {
                self.fail(field, message);
                None
            }
        }
    }

    pub(crate) fn date(&mut self, field: &str, value: Option<&str>) -> Option<NaiveDate> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.fail(field, format!("{field} must be a date in YYYY-MM-DD format"));
                None
            }
        }
    }

    pub(crate) fn required_date(&mut self, field: &str, value: Option<&str>) -> Option<NaiveDate> {
        if value.map(str::trim).is_none_or(str::is_empty) {
            self.fail(field, format!("{field} is required"));
            return None;
        }
        self.date(field, value)
    }

    /// `startDate`/`endDate` pair; start must not come after end.
    pub(crate) fn range(&mut self, start: Option<&str>, end: Option<&str>) -> DateRange {
        let range = DateRange {
            start: self.date("startDate", start),
            end: self.date("endDate", end),
        };
        if let (Some(s), Some(e)) = (range.start, range.end) {
            if s > e {
                self.fail("endDate", "endDate must not be before startDate");
            }
        }
        range
    }

    pub(crate) fn uuid(&mut self, field: &str, value: Option<&str>) -> Option<Uuid> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        match Uuid::parse_str(value) {
            Ok(id) => Some(id),
            Err(_) => {
                self.fail(field, format!("{field} must be a valid id"));
                None
            }
        }
    }

    /// Integer within `min..=max`; `default` when absent.
    pub(crate) fn bounded(
        &mut self,
        field: &str,
        value: Option<&str>,
        min: usize,
        max: usize,
        default: usize,
    ) -> usize {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return default;
        };
        match value.parse::<usize>() {
            Ok(n) if (min..=max).contains(&n) => n,
            _ => {
                self.fail(field, format!("{field} must be between {min} and {max}"));
                default
            }
        }
    }

    /// Trimmed text of `min..=max` characters.
    pub(crate) fn text(
        &mut self,
        field: &str,
        value: Option<&str>,
        min: usize,
        max: usize,
    ) -> Option<String> {
        let value = value.map(str::trim).unwrap_or_default();
        let len = value.chars().count();
        if len < min || len > max {
            if min > 0 && len == 0 {
                self.fail(field, format!("{field} is required"));
            } else {
                self.fail(field, format!("{field} must be between {min} and {max} characters"));
            }
            return None;
        }
        Some(value.to_string())
    }

    pub(crate) fn amount(&mut self, field: &str, value: Option<f64>) -> Option<f64> {
        match value {
            Some(v) if v.is_finite() && v > 0.0 => Some(v),
            Some(_) => {
                self.fail(field, format!("{field} must be greater than 0"));
                None
            }
            None => {
                self.fail(field, format!("{field} is required"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionType;

    #[test]
    fn collects_every_error() {
        let mut checks = Checks::default();
        let kind: Option<TransactionType> = checks.required("type", Some("transfer"));
        let amount = checks.amount("amount", Some(-3.0));
        let date = checks.required_date("date", None);
        assert!(kind.is_none() && amount.is_none() && date.is_none());
        match checks.into_error() {
            ApiError::Validation(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn range_rejects_inverted_dates() {
        let mut checks = Checks::default();
        checks.range(Some("2024-05-01"), Some("2024-04-01"));
        assert!(!checks.is_ok());

        let mut checks = Checks::default();
        let range = checks.range(Some("2024-04-01"), None);
        assert!(checks.is_ok());
        assert!(range.end.is_none());
    }

    #[test]
    fn bounded_limits() {
        let mut checks = Checks::default();
        assert_eq!(checks.bounded("limit", None, 1, 100, 20), 20);
        assert_eq!(checks.bounded("limit", Some("5"), 1, 100, 20), 5);
        assert!(checks.is_ok());
        checks.bounded("limit", Some("0"), 1, 100, 20);
        checks.bounded("limit", Some("abc"), 1, 100, 20);
        assert!(!checks.is_ok());
    }

    #[test]
    fn malformed_ids_are_not_found() {
        let err = parse_id("not-a-uuid", "Transaction").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
