//! Account statement projection over journal entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{AccountId, JournalId};
use super::journal::JournalEntry;
use super::money::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Transfer,
    Bonus,
    Other,
}

impl StatementKind {
    /// Classifies a journal by its external reference.
    pub fn from_memo(memo: &str) -> Self {
        if memo.starts_with("payment:") {
            StatementKind::Transfer
        } else if memo.starts_with("bonus:") || memo.contains("registration_bonus") {
            StatementKind::Bonus
        } else {
            StatementKind::Other
        }
    }
}

/// One journal as seen from a single customer account.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementLine {
    pub journal_id: JournalId,
    pub booked_at: DateTime<Utc>,
    pub currency: Currency,
    pub direction: Direction,
    /// Absolute net movement on the account.
    pub amount: Decimal,
    pub kind: StatementKind,
    pub memo: String,
    /// First other customer account referenced by the journal.
    pub counterparty: Option<AccountId>,
}

impl StatementLine {
    /// Nets credits minus debits over the lines booked against `account`.
    pub fn project(entry: &JournalEntry, account: AccountId) -> Self {
        let mut credit = Decimal::ZERO;
        let mut debit = Decimal::ZERO;
        let mut counterparty = None;

        for line in &entry.lines {
            match line.counterparty {
                Some(cp) if cp == account => {
                    credit += line.credit;
                    debit += line.debit;
                }
                Some(cp) if counterparty.is_none() => counterparty = Some(cp),
                _ => {}
            }
        }

        let net = credit - debit;
        let (direction, amount) = if net.is_sign_negative() && !net.is_zero() {
            (Direction::Debit, net.abs())
        } else {
            (Direction::Credit, net)
        };

        Self {
            journal_id: entry.id,
            booked_at: entry.booked_at,
            currency: entry.currency.clone(),
            direction,
            amount,
            kind: StatementKind::from_memo(&entry.external_ref),
            memo: entry.external_ref.clone(),
            counterparty,
        }
    }
}
