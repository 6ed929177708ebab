//! In-memory ledger: users, categories, transactions and the analytics
//! computed over them.
//!
//! All reads return owned view types ready for serialization. Records owned
//! by another user are indistinguishable from missing ones.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            LedgerError::Conflict(msg) => ApiError::conflict(msg),
            LedgerError::Invalid { field, message } => ApiError::invalid_field(field, message),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            other => Err(format!("type must be income or expense, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum P2pDirection {
    /// Money given to the counterparty.
    Lent,
    /// Money received from the counterparty.
    Borrowed,
}

impl FromStr for P2pDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lent" => Ok(P2pDirection::Lent),
            "borrowed" => Ok(P2pDirection::Borrowed),
            other => Err(format!("direction must be lent or borrowed, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum P2pStatus {
    Pending,
    Settled,
}

impl FromStr for P2pStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(P2pStatus::Pending),
            "settled" => Ok(P2pStatus::Settled),
            other => Err(format!("status must be pending or settled, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Day,
    Month,
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(GroupBy::Day),
            "month" => Ok(GroupBy::Month),
            other => Err(format!("groupBy must be day or month, got '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Records and views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub currency: String,
    pub timezone: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
}

/// Public part of a user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for Profile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            preferences: user.preferences.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub color: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct P2pDetails {
    pub counterparty: String,
    pub direction: P2pDirection,
    pub status: P2pStatus,
}

#[derive(Debug, Clone)]
struct Transaction {
    id: Uuid,
    user_id: Uuid,
    kind: TransactionType,
    amount: f64,
    description: String,
    category_id: Option<Uuid>,
    date: NaiveDate,
    p2p: Option<P2pDetails>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryRef {
    pub id: Uuid,
    pub name: String,
}

/// A transaction as returned by the API, with its category resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,
    pub description: String,
    pub category: Option<CategoryRef>,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p2p: Option<P2pDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_income: f64,
    pub total_expense: f64,
    pub balance: f64,
    pub transaction_count: usize,
    pub period: Period,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category_id: Option<Uuid>,
    pub name: String,
    pub total: f64,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrendPoint {
    pub date: String,
    pub income: f64,
    pub expense: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUsage {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub transaction_count: usize,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct P2pSummary {
    pub total_lent: f64,
    pub total_borrowed: f64,
    pub pending_lent: f64,
    pub pending_borrowed: f64,
    /// Pending lent minus pending borrowed: what others still owe the user.
    pub net_balance: f64,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub kind: TransactionType,
    pub color: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub kind: TransactionType,
    pub amount: f64,
    pub description: String,
    pub category_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct NewP2p {
    pub counterparty: String,
    pub direction: P2pDirection,
    pub amount: f64,
    pub description: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub currency: Option<String>,
    pub timezone: Option<String>,
}

/// Inclusive date range; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }

    fn period(&self) -> Period {
        Period {
            start_date: self.start,
            end_date: self.end,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub kind: Option<TransactionType>,
    pub category_id: Option<Uuid>,
    pub range: DateRange,
    pub search: Option<String>,
    pub page: usize,
    pub limit: usize,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            kind: None,
            category_id: None,
            range: DateRange::default(),
            search: None,
            page: 1,
            limit: 20,
        }
    }
}

/// Categories every new account starts with.
const DEFAULT_CATEGORIES: &[(&str, TransactionType, &str)] = &[
    ("Salary", TransactionType::Income, "#22c55e"),
    ("Freelance", TransactionType::Income, "#10b981"),
    ("Food", TransactionType::Expense, "#f97316"),
    ("Transport", TransactionType::Expense, "#3b82f6"),
    ("Shopping", TransactionType::Expense, "#a855f7"),
    ("Bills", TransactionType::Expense, "#ef4444"),
    ("Entertainment", TransactionType::Expense, "#ec4899"),
    ("Health", TransactionType::Expense, "#14b8a6"),
];

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerState {
    users: HashMap<Uuid, User>,
    emails: HashMap<String, Uuid>,
    categories: HashMap<Uuid, Category>,
    transactions: HashMap<Uuid, Transaction>,
}

impl LedgerState {
    fn category_for(&self, user_id: Uuid, id: Uuid) -> Option<&Category> {
        self.categories.get(&id).filter(|c| c.user_id == user_id)
    }

    fn transaction_for(&self, user_id: Uuid, id: Uuid) -> Option<&Transaction> {
        self.transactions.get(&id).filter(|t| t.user_id == user_id)
    }

    fn view(&self, tx: &Transaction) -> TransactionView {
        let category = tx
            .category_id
            .and_then(|id| self.categories.get(&id))
            .map(|c| CategoryRef {
                id: c.id,
                name: c.name.clone(),
            });
        TransactionView {
            id: tx.id,
            kind: tx.kind,
            amount: tx.amount,
            description: tx.description.clone(),
            category,
            date: tx.date,
            p2p: tx.p2p.clone(),
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }

    /// Newest first: by date, then by creation time.
    fn sorted_for<'a>(
        &'a self,
        user_id: Uuid,
        mut keep: impl FnMut(&Transaction) -> bool,
    ) -> Vec<&'a Transaction> {
        let mut rows: Vec<&Transaction> = self
            .transactions
            .values()
            .filter(|t| t.user_id == user_id && keep(t))
            .collect();
        rows.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        rows
    }

    /// Transactions that count towards analytics: regular entries in range.
    fn analytics_rows(&self, user_id: Uuid, range: DateRange) -> impl Iterator<Item = &Transaction> {
        self.transactions
            .values()
            .filter(move |t| t.user_id == user_id && t.p2p.is_none() && range.contains(t.date))
    }

    fn check_category(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        kind: TransactionType,
    ) -> LedgerResult<()> {
        let category = self
            .category_for(user_id, category_id)
            .ok_or(LedgerError::Invalid {
                field: "category",
                message: "category does not exist".to_string(),
            })?;
        if category.kind != kind {
            return Err(LedgerError::Invalid {
                field: "category",
                message: format!("category '{}' is for {} transactions", category.name, category.kind),
            });
        }
        Ok(())
    }

    fn name_taken(&self, user_id: Uuid, name: &str, kind: TransactionType, except: Option<Uuid>) -> bool {
        self.categories.values().any(|c| {
            c.user_id == user_id
                && c.kind == kind
                && c.name.eq_ignore_ascii_case(name)
                && Some(c.id) != except
        })
    }
}

#[derive(Default)]
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // --- users -------------------------------------------------------------

    /// Register an account and seed its default categories.
    pub fn create_user(&self, name: &str, email: &str, password_hash: String) -> LedgerResult<User> {
        let email = normalize_email(email);
        let mut state = self.state.write();
        if state.emails.contains_key(&email) {
            return Err(LedgerError::Conflict(format!("email {email} is already registered")));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            email: email.clone(),
            password_hash,
            preferences: Preferences::default(),
            created_at: now,
        };
        for (category_name, kind, color) in DEFAULT_CATEGORIES {
            let category = Category {
                id: Uuid::new_v4(),
                user_id: user.id,
                name: (*category_name).to_string(),
                kind: *kind,
                color: Some((*color).to_string()),
                is_default: true,
                created_at: now,
            };
            state.categories.insert(category.id, category);
        }
        state.emails.insert(email, user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.state.read().users.get(&id).cloned()
    }

    pub fn user_by_email(&self, email: &str) -> Option<User> {
        let state = self.state.read();
        let id = state.emails.get(&normalize_email(email))?;
        state.users.get(id).cloned()
    }

    pub fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> LedgerResult<Profile> {
        let mut state = self.state.write();
        let user = state.users.get_mut(&id).ok_or(LedgerError::NotFound("User"))?;
        if let Some(name) = update.name {
            user.name = name.trim().to_string();
        }
        if let Some(currency) = update.currency {
            user.preferences.currency = currency;
        }
        if let Some(timezone) = update.timezone {
            user.preferences.timezone = timezone;
        }
        Ok(Profile::from(&*user))
    }

    // --- categories --------------------------------------------------------

    /// Categories sorted by type (income first), then name.
    pub fn categories(&self, user_id: Uuid, kind: Option<TransactionType>) -> Vec<Category> {
        let state = self.state.read();
        let mut categories: Vec<Category> = state
            .categories
            .values()
            .filter(|c| c.user_id == user_id && kind.is_none_or(|k| c.kind == k))
            .cloned()
            .collect();
        categories.sort_by(|a, b| {
            (a.kind == TransactionType::Expense)
                .cmp(&(b.kind == TransactionType::Expense))
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        categories
    }

    pub fn create_category(&self, user_id: Uuid, input: NewCategory) -> LedgerResult<Category> {
        let mut state = self.state.write();
        if state.name_taken(user_id, &input.name, input.kind, None) {
            return Err(LedgerError::Conflict(format!(
                "category '{}' already exists",
                input.name
            )));
        }
        let category = Category {
            id: Uuid::new_v4(),
            user_id,
            name: input.name,
            kind: input.kind,
            color: input.color,
            is_default: false,
            created_at: Utc::now(),
        };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    pub fn update_category(&self, user_id: Uuid, id: Uuid, input: NewCategory) -> LedgerResult<Category> {
        let mut state = self.state.write();
        let current_kind = state
            .category_for(user_id, id)
            .map(|c| c.kind)
            .ok_or(LedgerError::NotFound("Category"))?;
        if state.name_taken(user_id, &input.name, input.kind, Some(id)) {
            return Err(LedgerError::Conflict(format!(
                "category '{}' already exists",
                input.name
            )));
        }
        if current_kind != input.kind
            && state
                .transactions
                .values()
                .any(|t| t.category_id == Some(id))
        {
            return Err(LedgerError::Conflict(
                "cannot change the type of a category that has transactions".to_string(),
            ));
        }
        let category = state
            .categories
            .get_mut(&id)
            .ok_or(LedgerError::NotFound("Category"))?;
        category.name = input.name;
        category.kind = input.kind;
        category.color = input.color;
        Ok(category.clone())
    }

    pub fn delete_category(&self, user_id: Uuid, id: Uuid) -> LedgerResult<()> {
        let mut state = self.state.write();
        if state.category_for(user_id, id).is_none() {
            return Err(LedgerError::NotFound("Category"));
        }
        if state.transactions.values().any(|t| t.category_id == Some(id)) {
            return Err(LedgerError::Conflict(
                "category is used by existing transactions".to_string(),
            ));
        }
        state.categories.remove(&id);
        Ok(())
    }

    // --- transactions ------------------------------------------------------

    pub fn list_transactions(&self, user_id: Uuid, filter: &TransactionFilter) -> TransactionPage {
        let state = self.state.read();
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        let rows = state.sorted_for(user_id, |t| {
            filter.kind.is_none_or(|k| t.kind == k)
                && filter.category_id.is_none_or(|c| t.category_id == Some(c))
                && filter.range.contains(t.date)
                && search
                    .as_deref()
                    .is_none_or(|s| t.description.to_lowercase().contains(s))
        });
        let total = rows.len();
        let limit = filter.limit.max(1);
        let page = filter.page.max(1);
        let transactions = rows
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .map(|t| state.view(t))
            .collect();
        TransactionPage {
            transactions,
            pagination: Pagination {
                page,
                limit,
                total,
                pages: total.div_ceil(limit),
            },
        }
    }

    pub fn transaction(&self, user_id: Uuid, id: Uuid) -> LedgerResult<TransactionView> {
        let state = self.state.read();
        state
            .transaction_for(user_id, id)
            .map(|t| state.view(t))
            .ok_or(LedgerError::NotFound("Transaction"))
    }

    pub fn create_transaction(&self, user_id: Uuid, input: NewTransaction) -> LedgerResult<TransactionView> {
        let mut state = self.state.write();
        state.check_category(user_id, input.category_id, input.kind)?;
        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id,
            kind: input.kind,
            amount: input.amount,
            description: input.description,
            category_id: Some(input.category_id),
            date: input.date,
            p2p: None,
            created_at: now,
            updated_at: now,
        };
        let view = state.view(&tx);
        state.transactions.insert(tx.id, tx);
        Ok(view)
    }

    pub fn update_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: NewTransaction,
    ) -> LedgerResult<TransactionView> {
        let mut state = self.state.write();
        if state.transaction_for(user_id, id).is_none() {
            return Err(LedgerError::NotFound("Transaction"));
        }
        state.check_category(user_id, input.category_id, input.kind)?;
        let tx = state
            .transactions
            .get_mut(&id)
            .ok_or(LedgerError::NotFound("Transaction"))?;
        tx.kind = input.kind;
        tx.amount = input.amount;
        tx.description = input.description;
        tx.category_id = Some(input.category_id);
        tx.date = input.date;
        tx.updated_at = Utc::now();
        let tx = tx.clone();
        Ok(state.view(&tx))
    }

    pub fn delete_transaction(&self, user_id: Uuid, id: Uuid) -> LedgerResult<()> {
        let mut state = self.state.write();
        if state.transaction_for(user_id, id).is_none() {
            return Err(LedgerError::NotFound("Transaction"));
        }
        state.transactions.remove(&id);
        Ok(())
    }

    /// Delete the caller's transactions among `ids`. Returns how many went.
    pub fn bulk_delete(&self, user_id: Uuid, ids: &[Uuid]) -> usize {
        let mut state = self.state.write();
        let mut deleted = 0;
        for id in ids {
            if state.transaction_for(user_id, *id).is_some() {
                state.transactions.remove(id);
                deleted += 1;
            }
        }
        deleted
    }

    // --- peer-to-peer ------------------------------------------------------

    /// Record money lent to or borrowed from someone.
    ///
    /// Lending is booked as an expense and borrowing as income; neither is
    /// counted in analytics.
    pub fn create_p2p(&self, user_id: Uuid, input: NewP2p) -> TransactionView {
        let mut state = self.state.write();
        let now = Utc::now();
        let kind = match input.direction {
            P2pDirection::Lent => TransactionType::Expense,
            P2pDirection::Borrowed => TransactionType::Income,
        };
        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount: input.amount,
            description: input.description,
            category_id: None,
            date: input.date,
            p2p: Some(P2pDetails {
                counterparty: input.counterparty,
                direction: input.direction,
                status: P2pStatus::Pending,
            }),
            created_at: now,
            updated_at: now,
        };
        let view = state.view(&tx);
        state.transactions.insert(tx.id, tx);
        view
    }

    pub fn p2p_transactions(
        &self,
        user_id: Uuid,
        status: Option<P2pStatus>,
        limit: usize,
    ) -> Vec<TransactionView> {
        let state = self.state.read();
        state
            .sorted_for(user_id, |t| {
                t.p2p
                    .as_ref()
                    .is_some_and(|p| status.is_none_or(|s| p.status == s))
            })
            .into_iter()
            .take(limit)
            .map(|t| state.view(t))
            .collect()
    }

    pub fn p2p_summary(&self, user_id: Uuid) -> P2pSummary {
        let state = self.state.read();
        let mut summary = P2pSummary {
            total_lent: 0.0,
            total_borrowed: 0.0,
            pending_lent: 0.0,
            pending_borrowed: 0.0,
            net_balance: 0.0,
            count: 0,
        };
        for tx in state.transactions.values().filter(|t| t.user_id == user_id) {
            let Some(p2p) = &tx.p2p else { continue };
            summary.count += 1;
            let pending = p2p.status == P2pStatus::Pending;
            match p2p.direction {
                P2pDirection::Lent => {
                    summary.total_lent += tx.amount;
                    if pending {
                        summary.pending_lent += tx.amount;
                    }
                }
                P2pDirection::Borrowed => {
                    summary.total_borrowed += tx.amount;
                    if pending {
                        summary.pending_borrowed += tx.amount;
                    }
                }
            }
        }
        summary.total_lent = round2(summary.total_lent);
        summary.total_borrowed = round2(summary.total_borrowed);
        summary.pending_lent = round2(summary.pending_lent);
        summary.pending_borrowed = round2(summary.pending_borrowed);
        summary.net_balance = round2(summary.pending_lent - summary.pending_borrowed);
        summary
    }

    pub fn update_p2p_status(&self, user_id: Uuid, id: Uuid, status: P2pStatus) -> LedgerResult<TransactionView> {
        let mut state = self.state.write();
        let tx = state
            .transactions
            .get_mut(&id)
            .filter(|t| t.user_id == user_id)
            .ok_or(LedgerError::NotFound("P2P transaction"))?;
        let p2p = tx.p2p.as_mut().ok_or(LedgerError::NotFound("P2P transaction"))?;
        p2p.status = status;
        tx.updated_at = Utc::now();
        let tx = tx.clone();
        Ok(state.view(&tx))
    }

    // --- analytics ---------------------------------------------------------

    pub fn summary(&self, user_id: Uuid, range: DateRange) -> Summary {
        let state = self.state.read();
        let mut income = 0.0;
        let mut expense = 0.0;
        let mut count = 0;
        for tx in state.analytics_rows(user_id, range) {
            count += 1;
            match tx.kind {
                TransactionType::Income => income += tx.amount,
                TransactionType::Expense => expense += tx.amount,
            }
        }
        Summary {
            total_income: round2(income),
            total_expense: round2(expense),
            balance: round2(income - expense),
            transaction_count: count,
            period: range.period(),
        }
    }

    /// Totals per category for one transaction type, largest first.
    pub fn by_category(&self, user_id: Uuid, range: DateRange, kind: TransactionType) -> Vec<CategoryTotal> {
        let state = self.state.read();
        let mut totals: HashMap<Option<Uuid>, (f64, usize)> = HashMap::new();
        let mut grand_total = 0.0;
        for tx in state.analytics_rows(user_id, range).filter(|t| t.kind == kind) {
            let entry = totals.entry(tx.category_id).or_insert((0.0, 0));
            entry.0 += tx.amount;
            entry.1 += 1;
            grand_total += tx.amount;
        }
        let mut rows: Vec<CategoryTotal> = totals
            .into_iter()
            .map(|(category_id, (total, count))| CategoryTotal {
                category_id,
                name: category_id
                    .and_then(|id| state.categories.get(&id))
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "Uncategorized".to_string()),
                total: round2(total),
                count,
                percentage: if grand_total > 0.0 {
                    round2(total / grand_total * 100.0)
                } else {
                    0.0
                },
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| a.name.cmp(&b.name))
        });
        rows
    }

    /// Income and expense per day (`YYYY-MM-DD`) or month (`YYYY-MM`), oldest first.
    pub fn by_date(&self, user_id: Uuid, range: DateRange, group: GroupBy) -> Vec<TrendPoint> {
        let state = self.state.read();
        let mut buckets: BTreeMap<String, (f64, f64)> = BTreeMap::new();
        for tx in state.analytics_rows(user_id, range) {
            let bucket = match group {
                GroupBy::Day => tx.date.format("%Y-%m-%d").to_string(),
                GroupBy::Month => format!("{:04}-{:02}", tx.date.year(), tx.date.month()),
            };
            let entry = buckets.entry(bucket).or_insert((0.0, 0.0));
            match tx.kind {
                TransactionType::Income => entry.0 += tx.amount,
                TransactionType::Expense => entry.1 += tx.amount,
            }
        }
        buckets
            .into_iter()
            .map(|(date, (income, expense))| TrendPoint {
                date,
                income: round2(income),
                expense: round2(expense),
            })
            .collect()
    }

    /// Every category with its all-time usage.
    pub fn category_usage(&self, user_id: Uuid) -> Vec<CategoryUsage> {
        let categories = self.categories(user_id, None);
        let state = self.state.read();
        categories
            .into_iter()
            .map(|c| {
                let (count, total) = state
                    .analytics_rows(user_id, DateRange::default())
                    .filter(|t| t.category_id == Some(c.id))
                    .fold((0, 0.0), |(n, sum), t| (n + 1, sum + t.amount));
                CategoryUsage {
                    id: c.id,
                    name: c.name,
                    kind: c.kind,
                    transaction_count: count,
                    total: round2(total),
                }
            })
            .collect()
    }

    /// Every transaction in range, newest first, including P2P entries.
    pub fn export(&self, user_id: Uuid, range: DateRange) -> Vec<TransactionView> {
        let state = self.state.read();
        state
            .sorted_for(user_id, |t| range.contains(t.date))
            .into_iter()
            .map(|t| state.view(t))
            .collect()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
