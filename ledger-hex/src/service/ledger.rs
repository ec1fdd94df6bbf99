//! Ledger application service: top-ups, manual journal entries and
//! account activity queries.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use uuid::Uuid;

use ledger_types::domain::{StatementLine, event_types, format_amount, operations};
use ledger_types::ports::{AccountSummary, AuditRecord};
use ledger_types::validation::{
    CreditAccountCommand, JournalEntriesCommand, ManualJournalCommand, StatementCommand,
};
use ledger_types::{
    AccountId, AccountsGateway, AppError, AuditPort, CreditAccountRequest, EntryLine,
    IdempotencyRecord, JournalEntriesPage, JournalEntriesQuery, JournalEntry, JournalId,
    JournalPostedResponse, ManualJournalEntryRequest, OutboxEvent, RepoError, StatementItemView,
    StatementPage, StatementQuery, UnitOfWorkManager,
};

use super::{audit_record, record_audit};

const POSTED: &str = "posted";

pub struct LedgerService<U: UnitOfWorkManager> {
    uow: Arc<U>,
    accounts: Arc<dyn AccountsGateway>,
    audit: Arc<dyn AuditPort>,
}

impl<U: UnitOfWorkManager> LedgerService<U> {
    pub fn new(uow: Arc<U>, accounts: Arc<dyn AccountsGateway>, audit: Arc<dyn AuditPort>) -> Self {
        Self {
            uow,
            accounts,
            audit,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Postings
    // ─────────────────────────────────────────────────────────────────────────────

    /// Administrative top-up: `GL_SYSTEM_FUND` debit, `GL_CUSTOMER_CASH`
    /// credit against the customer account. Idempotent per key.
    #[tracing::instrument(skip_all, fields(idempotency_key = %req.idempotency_key, account_id = %req.account_id))]
    pub async fn credit_account(
        &self,
        req: &CreditAccountRequest,
    ) -> Result<JournalPostedResponse, AppError> {
        let cmd = CreditAccountCommand::try_from(req)?;

        if let Some(cached) = self.cached_credit(&cmd.idempotency_key).await? {
            tracing::info!(journal_id = %cached.journal_id, "idempotent replay");
            return Ok(cached);
        }

        let validation = self
            .accounts
            .validate_accounts_and_limits(cmd.account, cmd.account, &cmd.currency, cmd.amount)
            .await?;
        if !validation.ok {
            return Err(AppError::Rejected(format!(
                "accounts validation failed: {}",
                validation.reason.unwrap_or_default()
            )));
        }

        let now = Utc::now();
        let journal_id = JournalId::new();
        let journal = JournalEntry::for_top_up(
            journal_id,
            cmd.account,
            cmd.currency.clone(),
            cmd.amount,
            &cmd.external_ref,
            now,
            &cmd.initiated_by,
        )?;
        let event = OutboxEvent::pending(
            "ledger",
            journal_id.into_uuid(),
            event_types::LEDGER_POSTED,
            json!({
                "journal_id": journal_id,
                "account_id": cmd.account,
                "currency": cmd.currency,
                "amount": format_amount(cmd.amount),
                "occurred_at": now.to_rfc3339_opts(SecondsFormat::Nanos, true),
            }),
            now,
        );
        let response = JournalPostedResponse {
            journal_id,
            status: POSTED.to_string(),
        };
        let record = IdempotencyRecord::new(
            &cmd.idempotency_key,
            operations::CREDIT_ACCOUNT,
            &response,
            now,
        )?;

        let written = self
            .uow
            .do_write(move |repos| {
                Box::pin(async move {
                    repos.journals().insert_journal(&journal).await?;
                    repos.outbox().insert(&event).await?;
                    repos.idempotency().put(&record).await?;
                    Ok(response)
                })
            })
            .await;

        let response = match written {
            Ok(response) => response,
            Err(RepoError::Conflict(msg)) => {
                // Lost a race against the same key.
                return match self.cached_credit(&cmd.idempotency_key).await? {
                    Some(cached) => Ok(cached),
                    None => Err(AppError::Conflict(msg)),
                };
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(journal_id = %journal_id, "account credited");
        record_audit(
            self.audit.as_ref(),
            audit_record(
                "ledger.credit",
                &cmd,
                journal_id.to_string(),
                now,
                json!({
                    "account_id": cmd.account,
                    "currency": cmd.currency,
                    "amount": format_amount(cmd.amount),
                }),
            ),
        )
        .await;
        Ok(response)
    }

    /// Posts caller-supplied lines as one journal. Every call creates a new
    /// journal; there is no idempotency key.
    #[tracing::instrument(skip_all, fields(lines = req.lines.len()))]
    pub async fn create_manual_journal_entry(
        &self,
        req: &ManualJournalEntryRequest,
    ) -> Result<JournalPostedResponse, AppError> {
        let cmd = ManualJournalCommand::try_from(req)?;

        let now = Utc::now();
        let journal_id = JournalId::new();
        let lines = cmd
            .lines
            .iter()
            .map(|l| EntryLine {
                id: Uuid::new_v4(),
                journal_id,
                gl_account: l.gl_account,
                counterparty: l.counterparty,
                debit: l.debit,
                credit: l.credit,
            })
            .collect();
        let journal = JournalEntry::posted(
            journal_id,
            cmd.external_ref.clone(),
            now,
            cmd.initiated_by.clone(),
            cmd.currency.clone(),
            lines,
        )?;
        let total = journal.total_debit();

        let event = OutboxEvent::pending(
            "ledger",
            journal_id.into_uuid(),
            event_types::LEDGER_MANUAL_POSTED,
            json!({
                "journal_id": journal_id,
                "currency": cmd.currency,
                "total": format_amount(total),
                "line_count": journal.lines.len(),
                "external_ref": cmd.external_ref,
                "created_by": cmd.initiated_by,
                "occurred_at": now.to_rfc3339_opts(SecondsFormat::Nanos, true),
            }),
            now,
        );

        self.uow
            .do_write(move |repos| {
                Box::pin(async move {
                    repos.journals().insert_journal(&journal).await?;
                    repos.outbox().insert(&event).await
                })
            })
            .await?;

        tracing::info!(journal_id = %journal_id, "manual journal posted");
        record_audit(
            self.audit.as_ref(),
            audit_record(
                "ledger.manual_entry",
                &cmd,
                journal_id.to_string(),
                now,
                json!({
                    "currency": cmd.currency,
                    "total": format_amount(total),
                    "line_count": cmd.lines.len(),
                }),
            ),
        )
        .await;

        Ok(JournalPostedResponse {
            journal_id,
            status: POSTED.to_string(),
        })
    }

    async fn cached_credit(&self, key: &str) -> Result<Option<JournalPostedResponse>, AppError> {
        let key = key.to_string();
        let record = self
            .uow
            .do_read(move |repos| Box::pin(async move { repos.idempotency().get(&key).await }))
            .await?;
        record
            .map(|r| r.replay(operations::CREDIT_ACCOUNT))
            .transpose()
            .map_err(AppError::from)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────────

    /// Journals touching `account` within the window, newest first.
    #[tracing::instrument(skip(self, query))]
    pub async fn list_account_journal_entries(
        &self,
        account: &str,
        query: &JournalEntriesQuery,
    ) -> Result<JournalEntriesPage, AppError> {
        let cmd = JournalEntriesCommand::parse(account, query)?;
        let JournalEntriesCommand {
            account,
            from,
            to,
            page,
            size,
        } = cmd;

        let entries = self
            .uow
            .do_read(move |repos| {
                Box::pin(async move {
                    repos
                        .journals()
                        .list_activity_by_account(account, from, to, page, size)
                        .await
                })
            })
            .await?;

        Ok(JournalEntriesPage {
            entries: entries.into_iter().map(Into::into).collect(),
            page,
            size,
        })
    }

    /// Statement view of the account's journals, optionally enriched with
    /// counterparty summaries from the accounts service.
    #[tracing::instrument(skip(self, query))]
    pub async fn list_account_statement(
        &self,
        account: &str,
        query: &StatementQuery,
    ) -> Result<StatementPage, AppError> {
        let cmd = StatementCommand::parse(account, query)?;
        let StatementCommand {
            account,
            from,
            to,
            page,
            size,
            include_counterparty,
        } = cmd;

        let entries = self
            .uow
            .do_read(move |repos| {
                Box::pin(async move {
                    repos
                        .journals()
                        .list_activity_by_account(account, from, to, page, size)
                        .await
                })
            })
            .await?;

        let mut items: Vec<StatementItemView> = entries
            .iter()
            .map(|entry| StatementLine::project(entry, account).into())
            .collect();

        if include_counterparty {
            self.enrich_counterparties(&mut items).await;
        }

        record_audit(
            self.audit.as_ref(),
            AuditRecord {
                action: "ledger.statement".to_string(),
                entity: "accounts".to_string(),
                entity_id: account.to_string(),
                actor: "system".to_string(),
                at: Utc::now(),
                details: json!({
                    "from": from,
                    "to": to,
                    "page": page,
                    "size": size,
                    "include_counterparty": include_counterparty,
                }),
            },
        )
        .await;

        Ok(StatementPage { items, page, size })
    }

    /// One batch lookup per page. A gateway failure leaves items as they are.
    async fn enrich_counterparties(&self, items: &mut [StatementItemView]) {
        let ids: Vec<AccountId> = items
            .iter()
            .filter_map(|i| i.counterparty_account_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return;
        }

        let summaries = match self.accounts.batch_get_account_summaries(&ids).await {
            Ok(summaries) => summaries,
            Err(e) => {
                tracing::warn!(error = %e, "counterparty enrichment unavailable, returning plain statement");
                return;
            }
        };

        let lookup: HashMap<AccountId, AccountSummary> = summaries
            .into_iter()
            .map(|s| (s.account_id, s))
            .collect();
        for item in items.iter_mut() {
            if let Some(id) = item.counterparty_account_id {
                item.counterparty = lookup.get(&id).cloned();
            }
        }
    }
}
