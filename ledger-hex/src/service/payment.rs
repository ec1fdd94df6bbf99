//! Payment application service: the `post_payment` saga.
//!
//! The hold reservation happens outside any local transaction. Everything
//! after it (payment row, journal, step log, outbox event, idempotency
//! record) commits in one write. If that write fails the hold is released
//! as a best-effort compensation.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use ledger_types::domain::{event_types, format_amount, operations, steps};
use ledger_types::ports::HoldRequest;
use ledger_types::validation::PostPaymentCommand;
use ledger_types::{
    AccountsGateway, AppError, AuditPort, IdempotencyRecord, JournalEntry, JournalId,
    OutboxEvent, Payment, PaymentId, PaymentResponse, PaymentStatus, PaymentStep,
    PostPaymentRequest, PostPaymentResponse, RepoError, UnitOfWorkManager,
};

use super::{audit_record, record_audit};

/// Application service for payment operations.
///
/// Generic over `U: UnitOfWorkManager` so the storage adapter is picked at
/// compile time; collaborators are trait objects so they can be swapped at
/// runtime.
pub struct PaymentService<U: UnitOfWorkManager> {
    uow: Arc<U>,
    accounts: Arc<dyn AccountsGateway>,
    audit: Arc<dyn AuditPort>,
}

impl<U: UnitOfWorkManager> PaymentService<U> {
    pub fn new(uow: Arc<U>, accounts: Arc<dyn AccountsGateway>, audit: Arc<dyn AuditPort>) -> Self {
        Self {
            uow,
            accounts,
            audit,
        }
    }

    /// Returns a reference to the underlying unit-of-work manager.
    pub fn uow(&self) -> &Arc<U> {
        &self.uow
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // PostPayment
    // ─────────────────────────────────────────────────────────────────────────────

    /// Moves `amount` from the source to the destination account.
    ///
    /// Retries with the same idempotency key return the first result without
    /// touching the accounts service or the database again.
    #[tracing::instrument(skip_all, fields(idempotency_key = %req.idempotency_key))]
    pub async fn post_payment(
        &self,
        req: &PostPaymentRequest,
    ) -> Result<PostPaymentResponse, AppError> {
        let cmd = PostPaymentCommand::try_from(req)?;

        if let Some(cached) = self.cached_result(&cmd.idempotency_key).await? {
            tracing::info!(payment_id = %cached.payment_id, "idempotent replay");
            return Ok(cached);
        }

        let validation = self
            .accounts
            .validate_accounts_and_limits(cmd.source, cmd.destination, &cmd.currency, cmd.amount)
            .await?;
        if !validation.ok {
            let reason = validation.reason.unwrap_or_default();
            tracing::info!(reason = %reason, "payment refused by accounts validation");
            return Err(AppError::Rejected(format!(
                "accounts validation failed: {reason}"
            )));
        }

        let payment_id = PaymentId::new();
        let hold = HoldRequest {
            account_id: cmd.source,
            currency: cmd.currency.clone(),
            amount: cmd.amount,
            hold_id: payment_id,
            idempotency_key: format!("{}:reserve_hold", cmd.idempotency_key),
            reason: Some("payment".to_string()),
        };
        let reserved = self.accounts.reserve_hold(&hold).await?;
        if !reserved.ok {
            return Err(AppError::Rejected(format!(
                "reserve hold failed status={}",
                reserved.status
            )));
        }
        tracing::info!(payment_id = %payment_id, "hold reserved");

        let now = Utc::now();
        match self.persist(&cmd, payment_id, now).await {
            Ok(response) => {
                tracing::info!(payment_id = %payment_id, "payment posted");
                record_audit(
                    self.audit.as_ref(),
                    audit_record(
                        "payments.post",
                        &cmd,
                        payment_id.to_string(),
                        now,
                        json!({
                            "currency": cmd.currency,
                            "amount": format_amount(cmd.amount),
                        }),
                    ),
                )
                .await;
                Ok(response)
            }
            Err(err) => {
                tracing::error!(payment_id = %payment_id, error = %err, "payment write failed");
                let compensated = self.release_hold(&cmd, payment_id).await;
                record_audit(
                    self.audit.as_ref(),
                    audit_record(
                        "payments.post.failed",
                        &cmd,
                        payment_id.to_string(),
                        Utc::now(),
                        json!({
                            "error": err.to_string(),
                            "compensated": compensated,
                        }),
                    ),
                )
                .await;

                // A concurrent request with the same key committed first.
                if matches!(err, RepoError::Conflict(_)) {
                    if let Some(cached) = self.cached_result(&cmd.idempotency_key).await? {
                        return Ok(cached);
                    }
                }
                Err(err.into())
            }
        }
    }

    async fn persist(
        &self,
        cmd: &PostPaymentCommand,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> Result<PostPaymentResponse, RepoError> {
        let journal_id = JournalId::new();
        let journal = JournalEntry::for_payment(
            journal_id,
            payment_id,
            cmd.source,
            cmd.destination,
            cmd.currency.clone(),
            cmd.amount,
            now,
            &cmd.initiated_by,
        )?;

        let payment = Payment {
            id: payment_id,
            idempotency_key: cmd.idempotency_key.clone(),
            source_account: cmd.source,
            destination_account: cmd.destination,
            amount: cmd.amount,
            currency: cmd.currency.clone(),
            status: PaymentStatus::Posted,
            customer_id: cmd.customer_id.clone(),
            journal_id: Some(journal_id),
            created_at: now,
            updated_at: now,
        };

        let step_log = vec![
            PaymentStep::ok(
                payment_id,
                steps::RESERVE_HOLD,
                json!({ "hold_id": payment_id }),
                now,
            ),
            PaymentStep::ok(
                payment_id,
                steps::POST_LEDGER,
                json!({ "journal_id": journal_id, "hold_id": payment_id }),
                now,
            ),
        ];

        let event = OutboxEvent::pending(
            "payment",
            payment_id.into_uuid(),
            event_types::PAYMENT_POSTED,
            json!({
                "payment_id": payment_id,
                "source_account_id": cmd.source,
                "destination_account_id": cmd.destination,
                "currency": cmd.currency,
                "amount": format_amount(cmd.amount),
                "hold_id": payment_id,
                "journal_id": journal_id,
                "occurred_at": now.to_rfc3339_opts(SecondsFormat::Nanos, true),
            }),
            now,
        );

        let response = PostPaymentResponse {
            payment_id,
            status: PaymentStatus::Posted,
        };
        let record =
            IdempotencyRecord::new(&cmd.idempotency_key, operations::POST_PAYMENT, &response, now)?;

        self.uow
            .do_write(move |repos| {
                Box::pin(async move {
                    repos.payments().insert(&payment).await?;
                    repos.journals().insert_journal(&journal).await?;
                    for step in &step_log {
                        repos.payments().insert_step(step).await?;
                    }
                    repos.outbox().insert(&event).await?;
                    repos.idempotency().put(&record).await?;
                    Ok(response)
                })
            })
            .await
    }

    /// Releases the hold placed for `payment_id`. Never retried.
    async fn release_hold(&self, cmd: &PostPaymentCommand, payment_id: PaymentId) -> bool {
        let req = HoldRequest {
            account_id: cmd.source,
            currency: cmd.currency.clone(),
            amount: cmd.amount,
            hold_id: payment_id,
            idempotency_key: format!("{}:release_hold", cmd.idempotency_key),
            reason: Some("payment-compensation".to_string()),
        };
        match self.accounts.release_hold(&req).await {
            Ok(outcome) if outcome.ok => {
                tracing::warn!(payment_id = %payment_id, "hold released after failed write");
                true
            }
            Ok(outcome) => {
                tracing::error!(
                    payment_id = %payment_id,
                    status = %outcome.status,
                    "compensating release_hold refused"
                );
                false
            }
            Err(e) => {
                tracing::error!(payment_id = %payment_id, error = %e, "compensating release_hold failed");
                false
            }
        }
    }

    async fn cached_result(&self, key: &str) -> Result<Option<PostPaymentResponse>, AppError> {
        let key = key.to_string();
        let record = self
            .uow
            .do_read(move |repos| Box::pin(async move { repos.idempotency().get(&key).await }))
            .await?;
        record
            .map(|r| r.replay(operations::POST_PAYMENT))
            .transpose()
            .map_err(AppError::from)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // GetPayment
    // ─────────────────────────────────────────────────────────────────────────────

    /// Payment with its step log, oldest step first.
    #[tracing::instrument(skip(self), fields(payment_id = %id))]
    pub async fn get_payment(&self, id: PaymentId) -> Result<PaymentResponse, AppError> {
        let found = self
            .uow
            .do_read(move |repos| {
                Box::pin(async move {
                    let Some(payment) = repos.payments().find_by_id(id).await? else {
                        return Ok(None);
                    };
                    let steps = repos.payments().list_steps(id).await?;
                    Ok(Some(PaymentResponse::from_parts(payment, steps)))
                })
            })
            .await?;
        found.ok_or_else(|| AppError::NotFound(format!("Payment {id}")))
    }
}

