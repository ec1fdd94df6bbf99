//! Input validation.
//!
//! Raw request DTOs are turned into typed commands here, before any side
//! effect. Every failure is a [`DomainError::Validation`].

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, Utc};
use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::{AccountId, Currency, GlAccount};
use crate::dto::{
    CreditAccountRequest, JournalEntriesQuery, ManualJournalEntryRequest, PostPaymentRequest,
    StatementQuery,
};
use crate::error::DomainError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 200;
pub const MAX_JOURNAL_WINDOW_DAYS: i64 = 90;
pub const MAX_STATEMENT_WINDOW_DAYS: i64 = 180;

static IDEMPOTENCY_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:-]{7,127}$").expect("static regex"));
static ACTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9:_@./-]{1,200}$").expect("static regex"));
static EXTERNAL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9:_@./#-]{1,140}$").expect("static regex"));
static REASON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]{2,64}$").expect("static regex"));
// 20 integer digits, up to 6 decimals.
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:0|[1-9]\d{0,19})(?:\.\d{1,6})?$").expect("static regex")
});

fn invalid(msg: impl Into<String>) -> DomainError {
    DomainError::Validation(msg.into())
}

fn has_control_chars(s: &str) -> bool {
    s.chars().any(|c| c <= '\u{1f}' || c == '\u{7f}')
}

pub fn require_non_blank(raw: &str, field: &str, max_len: usize) -> Result<String, DomainError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(invalid(format!("{field} is required")));
    }
    if has_control_chars(s) {
        return Err(invalid(format!("{field} contains invalid characters")));
    }
    if s.chars().count() > max_len {
        return Err(invalid(format!("{field} too long")));
    }
    Ok(s.to_string())
}

pub fn optional_trim(
    raw: Option<&str>,
    field: &str,
    max_len: usize,
) -> Result<Option<String>, DomainError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => require_non_blank(s, field, max_len).map(Some),
    }
}

pub fn idempotency_key(raw: &str) -> Result<String, DomainError> {
    let s = require_non_blank(raw, "idempotency_key", 128)?;
    if !IDEMPOTENCY_KEY.is_match(&s) {
        return Err(invalid("idempotency_key invalid"));
    }
    Ok(s)
}

pub fn account_id(raw: &str, field: &str) -> Result<AccountId, DomainError> {
    let s = require_non_blank(raw, field, 64)?;
    AccountId::from_str(&s).map_err(|_| invalid(format!("{field} must be a UUID")))
}

pub fn currency(raw: &str) -> Result<Currency, DomainError> {
    let s = require_non_blank(raw, "currency", 3)?;
    Currency::parse(&s).map_err(|_| invalid("currency must be ISO-4217 (e.g., USD)"))
}

/// Parses a strictly positive decimal string.
pub fn amount(raw: &str, field: &str) -> Result<Decimal, DomainError> {
    let value = decimal(raw, field)?;
    if value.is_zero() {
        return Err(DomainError::InvalidAmount(format!("{field} must be positive")));
    }
    Ok(value)
}

/// Parses a non-negative decimal string (max 20,6).
pub fn decimal(raw: &str, field: &str) -> Result<Decimal, DomainError> {
    let s = require_non_blank(raw, field, 32)?;
    if !AMOUNT.is_match(&s) {
        return Err(DomainError::InvalidAmount(format!(
            "{field} must be a decimal string (max 20,6)"
        )));
    }
    Decimal::from_str(&s).map_err(|_| DomainError::InvalidAmount(format!("{field} out of range")))
}

pub fn actor(raw: &str) -> Result<String, DomainError> {
    let s = require_non_blank(raw, "initiated_by", 200)?;
    if !ACTOR.is_match(&s) {
        return Err(invalid("initiated_by invalid"));
    }
    Ok(s)
}

pub fn external_ref(raw: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(s) = optional_trim(raw, "external_ref", 140)? else {
        return Ok(None);
    };
    if !EXTERNAL_REF.is_match(&s) {
        return Err(invalid("external_ref invalid"));
    }
    Ok(Some(s))
}

pub fn reason(raw: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(s) = optional_trim(raw, "reason", 64)? else {
        return Ok(None);
    };
    let s = s.to_lowercase();
    if !REASON.is_match(&s) {
        return Err(invalid("reason invalid"));
    }
    Ok(Some(s))
}

fn timestamp(ts: DateTime<Utc>, field: &str) -> Result<DateTime<Utc>, DomainError> {
    if !(2000..=2100).contains(&ts.year()) {
        return Err(invalid(format!("{field} out of range")));
    }
    Ok(ts)
}

pub fn time_window(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    max_days: i64,
) -> Result<(DateTime<Utc>, DateTime<Utc>), DomainError> {
    let from = timestamp(from, "from")?;
    let to = timestamp(to, "to")?;
    if to < from {
        return Err(invalid("to must be >= from"));
    }
    if to - from > Duration::days(max_days) {
        return Err(invalid(format!("time range too large (max {max_days} days)")));
    }
    Ok((from, to))
}

/// 1-based page and bounded size.
pub fn page(page: Option<u32>, size: Option<u32>) -> Result<(u32, u32), DomainError> {
    let page = page.filter(|p| *p > 0).unwrap_or(1);
    let size = size.filter(|s| *s > 0).unwrap_or(DEFAULT_PAGE_SIZE);
    if size > MAX_PAGE_SIZE {
        return Err(invalid(format!("size max {MAX_PAGE_SIZE}")));
    }
    Ok((page, size))
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PostPaymentCommand {
    pub idempotency_key: String,
    pub source: AccountId,
    pub destination: AccountId,
    pub currency: Currency,
    pub amount: Decimal,
    pub initiated_by: String,
    pub customer_id: Option<String>,
}

impl TryFrom<&PostPaymentRequest> for PostPaymentCommand {
    type Error = DomainError;

    fn try_from(req: &PostPaymentRequest) -> Result<Self, Self::Error> {
        let idempotency_key = idempotency_key(&req.idempotency_key)?;
        let source = account_id(&req.source_account_id, "source_account_id")?;
        let destination = account_id(&req.destination_account_id, "destination_account_id")?;
        if source == destination {
            return Err(invalid(
                "source_account_id must be different from destination_account_id",
            ));
        }
        let customer_id = match optional_trim(req.customer_id.as_deref(), "customer_id", 64)? {
            Some(c) => Some(account_id(&c, "customer_id")?.to_string()),
            None => None,
        };
        Ok(Self {
            idempotency_key,
            source,
            destination,
            currency: currency(&req.currency)?,
            amount: amount(&req.amount, "amount")?,
            initiated_by: actor(&req.initiated_by)?,
            customer_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditAccountCommand {
    pub idempotency_key: String,
    pub account: AccountId,
    pub currency: Currency,
    pub amount: Decimal,
    pub initiated_by: String,
    pub external_ref: String,
}

impl TryFrom<&CreditAccountRequest> for CreditAccountCommand {
    type Error = DomainError;

    fn try_from(req: &CreditAccountRequest) -> Result<Self, Self::Error> {
        let idempotency_key = idempotency_key(&req.idempotency_key)?;
        let account = account_id(&req.account_id, "account_id")?;
        let currency = currency(&req.currency)?;
        let amount = amount(&req.amount, "amount")?;
        let initiated_by = actor(&req.initiated_by)?;
        let external_ref = external_ref(req.external_ref.as_deref())?.unwrap_or_default();
        // Validated for shape only; the journal does not carry them.
        reason(req.reason.as_deref())?;
        if let Some(c) = optional_trim(req.customer_id.as_deref(), "customer_id", 64)? {
            account_id(&c, "customer_id")?;
        }
        Ok(Self {
            idempotency_key,
            account,
            currency,
            amount,
            initiated_by,
            external_ref,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManualLine {
    pub gl_account: GlAccount,
    pub counterparty: Option<AccountId>,
    pub debit: Decimal,
    pub credit: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManualJournalCommand {
    pub currency: Currency,
    pub initiated_by: String,
    pub external_ref: String,
    pub lines: Vec<ManualLine>,
}

impl TryFrom<&ManualJournalEntryRequest> for ManualJournalCommand {
    type Error = DomainError;

    fn try_from(req: &ManualJournalEntryRequest) -> Result<Self, Self::Error> {
        if req.lines.len() > 100 {
            return Err(invalid("too many lines (max 100)"));
        }
        let mut lines = Vec::with_capacity(req.lines.len());
        for (i, line) in req.lines.iter().enumerate() {
            let code = require_non_blank(&line.gl_account_code, "gl_account_code", 64)?;
            let counterparty =
                match optional_trim(line.counterparty_ref.as_deref(), "counterparty_ref", 64)? {
                    Some(c) => Some(account_id(&c, "counterparty_ref")?),
                    None => None,
                };
            let side = |raw: &Option<String>, name: &str| match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(Decimal::ZERO),
                Some(s) => decimal(s, &format!("lines[{i}].{name}")),
            };
            lines.push(ManualLine {
                gl_account: GlAccount::from_code(&code)?,
                counterparty,
                debit: side(&line.debit, "debit")?,
                credit: side(&line.credit, "credit")?,
            });
        }
        Ok(Self {
            currency: currency(&req.currency)?,
            initiated_by: actor(&req.initiated_by)?,
            external_ref: external_ref(req.external_ref.as_deref())?.unwrap_or_default(),
            lines,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntriesCommand {
    pub account: AccountId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub page: u32,
    pub size: u32,
}

impl JournalEntriesCommand {
    pub fn parse(account: &str, q: &JournalEntriesQuery) -> Result<Self, DomainError> {
        let account = account_id(account, "account_id")?;
        let (from, to) = time_window(q.from, q.to, MAX_JOURNAL_WINDOW_DAYS)?;
        let (page, size) = page(q.page, q.size)?;
        Ok(Self {
            account,
            from,
            to,
            page,
            size,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementCommand {
    pub account: AccountId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub page: u32,
    pub size: u32,
    pub include_counterparty: bool,
}

impl StatementCommand {
    pub fn parse(account: &str, q: &StatementQuery) -> Result<Self, DomainError> {
        let account = account_id(account, "account_id")?;
        let (from, to) = time_window(q.from, q.to, MAX_STATEMENT_WINDOW_DAYS)?;
        let (page, size) = page(q.page, q.size)?;
        Ok(Self {
            account,
            from,
            to,
            page,
            size,
            include_counterparty: q.include_counterparty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::ManualLineRequest;

    fn payment_request() -> PostPaymentRequest {
        PostPaymentRequest {
            idempotency_key: "abc-12345678".into(),
            source_account_id: AccountId::new().to_string(),
            destination_account_id: AccountId::new().to_string(),
            currency: "usd".into(),
            amount: "50.00".into(),
            initiated_by: "user:alice".into(),
            customer_id: None,
        }
    }

    #[test]
    fn test_valid_payment_request() {
        let cmd = PostPaymentCommand::try_from(&payment_request()).unwrap();
        assert_eq!(cmd.currency.as_str(), "USD");
        assert_eq!(cmd.amount, Decimal::from_str("50.00").unwrap());
    }

    #[test]
    fn test_same_source_and_destination_rejected() {
        let mut req = payment_request();
        req.destination_account_id = req.source_account_id.clone();
        assert!(PostPaymentCommand::try_from(&req).is_err());
    }

    #[test]
    fn test_idempotency_key_rules() {
        assert!(idempotency_key("short").is_err());
        assert!(idempotency_key("-leading-dash").is_err());
        assert!(idempotency_key("order:2024.01_abc").is_ok());
        assert!(idempotency_key("has space in it").is_err());
    }

    #[test]
    fn test_amount_rules() {
        assert!(amount("0", "amount").is_err());
        assert!(amount("-1", "amount").is_err());
        assert!(amount("1.1234567", "amount").is_err());
        assert!(amount("01.5", "amount").is_err());
        assert!(amount("1e3", "amount").is_err());
        assert_eq!(
            amount("0.000001", "amount").unwrap(),
            Decimal::from_str("0.000001").unwrap()
        );
    }

    #[test]
    fn test_control_chars_rejected() {
        assert!(actor("user\u{0007}").is_err());
        assert!(external_ref(Some("ref\nnext")).is_err());
        assert_eq!(external_ref(Some("  ")).unwrap(), None);
    }

    #[test]
    fn test_window_and_paging() {
        let to = Utc::now();
        assert!(time_window(to - Duration::days(91), to, MAX_JOURNAL_WINDOW_DAYS).is_err());
        assert!(time_window(to - Duration::days(91), to, MAX_STATEMENT_WINDOW_DAYS).is_ok());
        assert!(time_window(to, to - Duration::days(1), 90).is_err());

        assert_eq!(page(None, None).unwrap(), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(page(Some(0), Some(0)).unwrap(), (1, DEFAULT_PAGE_SIZE));
        assert!(page(Some(1), Some(201)).is_err());
    }

    #[test]
    fn test_manual_entry_parsing() {
        let req = ManualJournalEntryRequest {
            currency: "USD".into(),
            initiated_by: "ops:bob".into(),
            external_ref: Some("adj#1".into()),
            lines: vec![
                ManualLineRequest {
                    gl_account_code: "GL_SYSTEM_FUND".into(),
                    counterparty_ref: None,
                    debit: Some("100.00".into()),
                    credit: None,
                },
                ManualLineRequest {
                    gl_account_code: "GL_NOPE".into(),
                    counterparty_ref: None,
                    debit: None,
                    credit: Some("100.00".into()),
                },
            ],
        };
        assert!(matches!(
            ManualJournalCommand::try_from(&req),
            Err(DomainError::UnknownGlAccount(_))
        ));
    }
}
