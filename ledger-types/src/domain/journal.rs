//! Double-entry journal model.
//!
//! A journal entry is a set of lines whose debits and credits sum to the
//! same amount. Entries are immutable once committed and are always written
//! together with all of their lines.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{AccountId, JournalId, PaymentId};
use super::money::Currency;
use crate::error::DomainError;

/// Fixed chart of general-ledger accounts used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlAccount {
    /// Funds leaving a customer account through a payment.
    GlOut,
    /// Funds arriving at a customer account through a payment.
    GlIn,
    /// Platform funding source for administrative top-ups.
    GlSystemFund,
    /// Customer cash credited by top-ups.
    GlCustomerCash,
}

impl GlAccount {
    pub const ALL: [GlAccount; 4] = [
        GlAccount::GlOut,
        GlAccount::GlIn,
        GlAccount::GlSystemFund,
        GlAccount::GlCustomerCash,
    ];

    /// Stable identifier persisted on every entry line.
    pub const fn id(self) -> Uuid {
        match self {
            GlAccount::GlOut => Uuid::from_u128(0x1),
            GlAccount::GlIn => Uuid::from_u128(0x2),
            GlAccount::GlSystemFund => Uuid::from_u128(0x3),
            GlAccount::GlCustomerCash => Uuid::from_u128(0x4),
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            GlAccount::GlOut => "GL_OUT",
            GlAccount::GlIn => "GL_IN",
            GlAccount::GlSystemFund => "GL_SYSTEM_FUND",
            GlAccount::GlCustomerCash => "GL_CUSTOMER_CASH",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, DomainError> {
        Self::ALL
            .into_iter()
            .find(|gl| gl.code() == code)
            .ok_or_else(|| DomainError::UnknownGlAccount(code.to_string()))
    }
}

impl std::fmt::Display for GlAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Posted,
    Reversed,
    Void,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Posted => "posted",
            JournalStatus::Reversed => "reversed",
            JournalStatus::Void => "void",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "posted" => Ok(JournalStatus::Posted),
            "reversed" => Ok(JournalStatus::Reversed),
            "void" => Ok(JournalStatus::Void),
            other => Err(DomainError::Validation(format!(
                "unknown journal status: {other}"
            ))),
        }
    }
}

/// One side of a double-entry posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryLine {
    pub id: Uuid,
    pub journal_id: JournalId,
    pub gl_account: GlAccount,
    /// Customer account this line is booked against, if any.
    pub counterparty: Option<AccountId>,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl EntryLine {
    pub fn debit(
        journal_id: JournalId,
        gl_account: GlAccount,
        counterparty: Option<AccountId>,
        amount: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            journal_id,
            gl_account,
            counterparty,
            debit: amount,
            credit: Decimal::ZERO,
        }
    }

    pub fn credit(
        journal_id: JournalId,
        gl_account: GlAccount,
        counterparty: Option<AccountId>,
        amount: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            journal_id,
            gl_account,
            counterparty,
            debit: Decimal::ZERO,
            credit: amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalId,
    pub external_ref: String,
    pub booked_at: DateTime<Utc>,
    pub created_by: String,
    pub status: JournalStatus,
    pub currency: Currency,
    pub lines: Vec<EntryLine>,
}

impl JournalEntry {
    /// Builds a posted journal, rejecting it unless the lines balance.
    pub fn posted(
        id: JournalId,
        external_ref: impl Into<String>,
        booked_at: DateTime<Utc>,
        created_by: impl Into<String>,
        currency: Currency,
        lines: Vec<EntryLine>,
    ) -> Result<Self, DomainError> {
        ensure_balanced(&lines)?;
        Ok(Self {
            id,
            external_ref: external_ref.into(),
            booked_at,
            created_by: created_by.into(),
            status: JournalStatus::Posted,
            currency,
            lines,
        })
    }

    /// Payment journal: `GL_OUT` debited against the source account and
    /// `GL_IN` credited against the destination account.
    #[allow(clippy::too_many_arguments)]
    pub fn for_payment(
        id: JournalId,
        payment_id: PaymentId,
        source: AccountId,
        destination: AccountId,
        currency: Currency,
        amount: Decimal,
        booked_at: DateTime<Utc>,
        created_by: &str,
    ) -> Result<Self, DomainError> {
        let lines = vec![
            EntryLine::debit(id, GlAccount::GlOut, Some(source), amount),
            EntryLine::credit(id, GlAccount::GlIn, Some(destination), amount),
        ];
        Self::posted(
            id,
            format!("payment:{payment_id}"),
            booked_at,
            created_by,
            currency,
            lines,
        )
    }

    /// Top-up journal: `GL_SYSTEM_FUND` debited, `GL_CUSTOMER_CASH` credited
    /// against the customer account.
    pub fn for_top_up(
        id: JournalId,
        account: AccountId,
        currency: Currency,
        amount: Decimal,
        external_ref: &str,
        booked_at: DateTime<Utc>,
        created_by: &str,
    ) -> Result<Self, DomainError> {
        let lines = vec![
            EntryLine::debit(id, GlAccount::GlSystemFund, None, amount),
            EntryLine::credit(id, GlAccount::GlCustomerCash, Some(account), amount),
        ];
        Self::posted(id, external_ref, booked_at, created_by, currency, lines)
    }

    pub fn total_debit(&self) -> Decimal {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credit(&self) -> Decimal {
        self.lines.iter().map(|l| l.credit).sum()
    }
}

/// Checks the double-entry invariant.
///
/// Every line must carry exactly one strictly positive side, there must be
/// at least two lines, and total debits must equal total credits exactly.
pub fn ensure_balanced(lines: &[EntryLine]) -> Result<(), DomainError> {
    if lines.len() < 2 {
        return Err(DomainError::InvalidLine(
            "a journal needs at least two lines".into(),
        ));
    }

    let mut debit = Decimal::ZERO;
    let mut credit = Decimal::ZERO;
    for (i, line) in lines.iter().enumerate() {
        if line.debit.is_sign_negative() || line.credit.is_sign_negative() {
            return Err(DomainError::InvalidLine(format!("line {i} is negative")));
        }
        let has_debit = !line.debit.is_zero();
        let has_credit = !line.credit.is_zero();
        if has_debit == has_credit {
            return Err(DomainError::InvalidLine(format!(
                "line {i} must carry exactly one of debit or credit"
            )));
        }
        debit += line.debit;
        credit += line.credit;
    }

    if debit != credit {
        return Err(DomainError::Unbalanced { debit, credit });
    }
    Ok(())
}
