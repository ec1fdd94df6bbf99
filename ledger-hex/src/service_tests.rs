//! Service and outbox worker tests against the in-memory Unit of Work.

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use serde_json::Value;

    use ledger_repo::InMemoryUow;
    use ledger_types::domain::{Direction, GlAccount, event_types, steps};
    use ledger_types::ports::{
        AccountSummary, AuditError, AuditRecord, GatewayError, HoldOutcome, HoldRequest,
        PublishError, ValidationOutcome,
    };
    use ledger_types::{
        AccountId, AccountsGateway, AppError, AuditPort, CreditAccountRequest, Currency,
        EventPublisher, JournalEntriesQuery, ManualJournalEntryRequest, ManualLineRequest,
        PaymentId, PaymentStatus, PostPaymentRequest, StatementQuery,
    };

    use crate::outbound::UnavailableAccountsGateway;
    use crate::{LedgerService, OutboxConfig, OutboxWorker, PaymentService, RunOutcome};

    // ─────────────────────────────────────────────────────────────────────────
    // Stub ports
    // ─────────────────────────────────────────────────────────────────────────

    pub struct StubAccounts {
        validation: ValidationOutcome,
        hold_ok: bool,
        summaries_fail: bool,
        summaries: Vec<AccountSummary>,
        pub reserves: Mutex<Vec<HoldRequest>>,
        pub releases: Mutex<Vec<HoldRequest>>,
        pub validations: AtomicUsize,
        pub summary_calls: AtomicUsize,
    }

    impl StubAccounts {
        pub fn ok() -> Self {
            Self {
                validation: ValidationOutcome::accepted(),
                hold_ok: true,
                summaries_fail: false,
                summaries: Vec::new(),
                reserves: Mutex::new(Vec::new()),
                releases: Mutex::new(Vec::new()),
                validations: AtomicUsize::new(0),
                summary_calls: AtomicUsize::new(0),
            }
        }

        fn refusing(reason: &str) -> Self {
            Self {
                validation: ValidationOutcome::refused(reason),
                ..Self::ok()
            }
        }

        fn hold_refused() -> Self {
            Self {
                hold_ok: false,
                ..Self::ok()
            }
        }

        fn with_summaries(summaries: Vec<AccountSummary>) -> Self {
            Self {
                summaries,
                ..Self::ok()
            }
        }

        fn summaries_down() -> Self {
            Self {
                summaries_fail: true,
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl AccountsGateway for StubAccounts {
        async fn validate_accounts_and_limits(
            &self,
            _source: AccountId,
            _destination: AccountId,
            _currency: &Currency,
            _amount: Decimal,
        ) -> Result<ValidationOutcome, GatewayError> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            Ok(self.validation.clone())
        }

        async fn reserve_hold(&self, req: &HoldRequest) -> Result<HoldOutcome, GatewayError> {
            self.reserves.lock().unwrap().push(req.clone());
            Ok(HoldOutcome {
                ok: self.hold_ok,
                status: (if self.hold_ok { "held" } else { "insufficient_funds" }).to_string(),
                new_hold: self.hold_ok.then_some(req.amount),
            })
        }

        async fn release_hold(&self, req: &HoldRequest) -> Result<HoldOutcome, GatewayError> {
            self.releases.lock().unwrap().push(req.clone());
            Ok(HoldOutcome {
                ok: true,
                status: "released".to_string(),
                new_hold: Some(Decimal::ZERO),
            })
        }

        async fn batch_get_account_summaries(
            &self,
            ids: &[AccountId],
        ) -> Result<Vec<AccountSummary>, GatewayError> {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            if self.summaries_fail {
                return Err(GatewayError::CircuitOpen);
            }
            Ok(self
                .summaries
                .iter()
                .filter(|s| ids.contains(&s.account_id))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    pub struct RecordingAudit {
        pub records: Mutex<Vec<AuditRecord>>,
    }

    impl RecordingAudit {
        fn actions(&self) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.action.clone())
                .collect()
        }
    }

    #[async_trait]
    impl AuditPort for RecordingAudit {
        async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    /// Fails the calls whose 1-based ordinal is queued in `failures`.
    #[derive(Default)]
    pub struct ScriptedPublisher {
        calls: AtomicUsize,
        failures: Mutex<VecDeque<usize>>,
        pub published: Mutex<Vec<(String, String, Value)>>,
    }

    impl ScriptedPublisher {
        fn failing_on(calls: &[usize]) -> Self {
            Self {
                failures: Mutex::new(calls.iter().copied().collect()),
                ..Self::default()
            }
        }

        fn topics(&self) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|(t, _, _)| t.clone())
                .collect()
        }
    }

    #[async_trait]
    impl EventPublisher for ScriptedPublisher {
        async fn publish(
            &self,
            topic: &str,
            key: &str,
            payload: &Value,
        ) -> Result<(), PublishError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut failures = self.failures.lock().unwrap();
            if failures.front() == Some(&n) {
                failures.pop_front();
                return Err(PublishError::Transport("broker down".into()));
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), key.to_string(), payload.clone()));
            Ok(())
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fixtures
    // ─────────────────────────────────────────────────────────────────────────

    struct Harness {
        uow: Arc<InMemoryUow>,
        accounts: Arc<StubAccounts>,
        audit: Arc<RecordingAudit>,
        payments: PaymentService<InMemoryUow>,
        ledger: LedgerService<InMemoryUow>,
    }

    fn harness(accounts: StubAccounts) -> Harness {
        let uow = Arc::new(InMemoryUow::new());
        let accounts = Arc::new(accounts);
        let audit = Arc::new(RecordingAudit::default());
        Harness {
            payments: PaymentService::new(uow.clone(), accounts.clone(), audit.clone()),
            ledger: LedgerService::new(uow.clone(), accounts.clone(), audit.clone()),
            uow,
            accounts,
            audit,
        }
    }

    fn payment_request(key: &str, source: AccountId, destination: AccountId) -> PostPaymentRequest {
        PostPaymentRequest {
            idempotency_key: key.to_string(),
            source_account_id: source.to_string(),
            destination_account_id: destination.to_string(),
            currency: "USD".to_string(),
            amount: "50.00".to_string(),
            initiated_by: "user:alice".to_string(),
            customer_id: None,
        }
    }

    fn credit_request(key: &str, account: AccountId, amount: &str) -> CreditAccountRequest {
        CreditAccountRequest {
            idempotency_key: key.to_string(),
            account_id: account.to_string(),
            currency: "USD".to_string(),
            amount: amount.to_string(),
            initiated_by: "ops:bob".to_string(),
            external_ref: Some(format!("topup:{key}")),
            reason: Some("manual_topup".to_string()),
            customer_id: None,
        }
    }

    fn manual_line(code: &str, counterparty: Option<AccountId>, debit: &str, credit: &str) -> ManualLineRequest {
        ManualLineRequest {
            gl_account_code: code.to_string(),
            counterparty_ref: counterparty.map(|a| a.to_string()),
            debit: Some(debit.to_string()),
            credit: Some(credit.to_string()),
        }
    }

    fn journal_window() -> JournalEntriesQuery {
        let now = Utc::now();
        JournalEntriesQuery {
            from: now - Duration::hours(1),
            to: now + Duration::hours(1),
            page: None,
            size: None,
        }
    }

    fn statement_window(include_counterparty: bool) -> StatementQuery {
        let now = Utc::now();
        StatementQuery {
            from: now - Duration::hours(1),
            to: now + Duration::hours(1),
            page: None,
            size: None,
            include_counterparty,
        }
    }

    fn worker(uow: Arc<InMemoryUow>, publisher: Arc<ScriptedPublisher>) -> OutboxWorker<InMemoryUow> {
        OutboxWorker::new(
            uow,
            publisher,
            OutboxConfig {
                worker_id: "worker-test".to_string(),
                ..OutboxConfig::default()
            },
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // PostPayment
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_post_payment_end_to_end() {
        let h = harness(StubAccounts::ok());
        let (a, b) = (AccountId::new(), AccountId::new());

        let resp = h
            .payments
            .post_payment(&payment_request("abc12345-0001", a, b))
            .await
            .unwrap();
        assert_eq!(resp.status, PaymentStatus::Posted);

        let payments = h.uow.payments().await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].id, resp.payment_id);
        assert_eq!(payments[0].status, PaymentStatus::Posted);

        let journals = h.uow.journals().await;
        assert_eq!(journals.len(), 1);
        let journal = &journals[0];
        assert_eq!(payments[0].journal_id, Some(journal.id));
        assert_eq!(journal.total_debit(), journal.total_credit());
        let debit = journal.lines.iter().find(|l| l.debit > Decimal::ZERO).unwrap();
        let credit = journal.lines.iter().find(|l| l.credit > Decimal::ZERO).unwrap();
        assert_eq!(debit.debit, Decimal::new(5000, 2));
        assert_eq!(debit.counterparty, Some(a));
        assert_eq!(debit.gl_account, GlAccount::GlOut);
        assert_eq!(credit.credit, Decimal::new(5000, 2));
        assert_eq!(credit.counterparty, Some(b));
        assert_eq!(credit.gl_account, GlAccount::GlIn);

        let events = h.uow.outbox_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, event_types::PAYMENT_POSTED);
        assert_eq!(events[0].aggregate_id, resp.payment_id.into_uuid());
        assert!(!events[0].published);
        assert_eq!(events[0].payload["amount"], "50.000000");

        let records = h.uow.idempotency_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "abc12345-0001");

        let reserves = h.accounts.reserves.lock().unwrap().clone();
        assert_eq!(reserves.len(), 1);
        assert_eq!(reserves[0].account_id, a);
        assert_eq!(reserves[0].hold_id, resp.payment_id);
        assert_eq!(reserves[0].idempotency_key, "abc12345-0001:reserve_hold");
        assert!(h.accounts.releases.lock().unwrap().is_empty());
        assert_eq!(h.audit.actions(), vec!["payments.post"]);
    }

    #[tokio::test]
    async fn test_post_payment_is_idempotent() {
        let h = harness(StubAccounts::ok());
        let req = payment_request("retry-key-0001", AccountId::new(), AccountId::new());

        let first = h.payments.post_payment(&req).await.unwrap();
        let second = h.payments.post_payment(&req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.accounts.reserves.lock().unwrap().len(), 1);
        assert_eq!(h.accounts.validations.load(Ordering::SeqCst), 1);
        assert_eq!(h.uow.journals().await.len(), 1);
        assert_eq!(h.uow.outbox_events().await.len(), 1);
        assert_eq!(h.uow.idempotency_records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_key_reused_for_other_operation_conflicts() {
        let h = harness(StubAccounts::ok());
        let account = AccountId::new();
        h.ledger
            .credit_account(&credit_request("shared-key-0001", account, "10"))
            .await
            .unwrap();

        let err = h
            .payments
            .post_payment(&payment_request("shared-key-0001", account, AccountId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(h.accounts.reserves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_request_has_no_side_effects() {
        let h = harness(StubAccounts::ok());
        let mut req = payment_request("bad-amount-0001", AccountId::new(), AccountId::new());
        req.amount = "12.5e3".to_string();

        let err = h.payments.post_payment(&req).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(h.accounts.validations.load(Ordering::SeqCst), 0);
        assert!(h.uow.payments().await.is_empty());
        assert!(h.audit.actions().is_empty());
    }

    #[tokio::test]
    async fn test_validation_refusal_is_rejected() {
        let h = harness(StubAccounts::refusing("daily limit exceeded"));

        let err = h
            .payments
            .post_payment(&payment_request("refused-0001", AccountId::new(), AccountId::new()))
            .await
            .unwrap_err();
        match err {
            AppError::Rejected(msg) => assert!(msg.contains("daily limit exceeded")),
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(h.accounts.reserves.lock().unwrap().is_empty());
        assert!(h.uow.payments().await.is_empty());
    }

    #[tokio::test]
    async fn test_hold_refusal_is_rejected_without_compensation() {
        let h = harness(StubAccounts::hold_refused());

        let err = h
            .payments
            .post_payment(&payment_request("no-funds-0001", AccountId::new(), AccountId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));
        assert!(h.accounts.releases.lock().unwrap().is_empty());
        assert!(h.uow.journals().await.is_empty());
        assert!(h.uow.outbox_events().await.is_empty());
    }

    #[tokio::test]
    async fn test_gateway_unavailable() {
        let uow = Arc::new(InMemoryUow::new());
        let service = PaymentService::new(
            uow.clone(),
            Arc::new(UnavailableAccountsGateway),
            Arc::new(RecordingAudit::default()),
        );

        let err = service
            .post_payment(&payment_request("offline-0001", AccountId::new(), AccountId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
        assert!(uow.payments().await.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_releases_hold() {
        let h = harness(StubAccounts::ok());
        let (a, b) = (AccountId::new(), AccountId::new());
        let req = payment_request("compensate-0001", a, b);
        h.uow.fail_next_write();

        let err = h.payments.post_payment(&req).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let reserves = h.accounts.reserves.lock().unwrap().clone();
        let releases = h.accounts.releases.lock().unwrap().clone();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].account_id, a);
        assert_eq!(releases[0].currency, reserves[0].currency);
        assert_eq!(releases[0].amount, reserves[0].amount);
        assert_eq!(releases[0].hold_id, reserves[0].hold_id);
        assert_eq!(releases[0].idempotency_key, "compensate-0001:release_hold");

        assert!(h.uow.payments().await.is_empty());
        assert!(h.uow.journals().await.is_empty());
        assert!(h.uow.outbox_events().await.is_empty());
        assert!(h.uow.idempotency_records().await.is_empty());

        let records = h.audit.records.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "payments.post.failed");
        assert_eq!(records[0].details["compensated"], true);

        // The key was not consumed, so a retry goes through.
        let resp = h.payments.post_payment(&req).await.unwrap();
        assert_eq!(resp.status, PaymentStatus::Posted);
        assert_eq!(h.uow.journals().await.len(), 1);
    }

    #[tokio::test]
    async fn test_get_payment_with_steps() {
        let h = harness(StubAccounts::ok());
        let resp = h
            .payments
            .post_payment(&payment_request("lookup-0001", AccountId::new(), AccountId::new()))
            .await
            .unwrap();

        let payment = h.payments.get_payment(resp.payment_id).await.unwrap();
        assert_eq!(payment.payment_id, resp.payment_id);
        assert_eq!(payment.hold_id, resp.payment_id);
        assert_eq!(payment.amount, "50.000000");
        let names: Vec<&str> = payment.steps.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(names, vec![steps::RESERVE_HOLD, steps::POST_LEDGER]);

        let err = h.payments.get_payment(PaymentId::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_credit_account_posts_top_up_once() {
        let h = harness(StubAccounts::ok());
        let account = AccountId::new();
        let req = credit_request("topup-0001", account, "100.00");

        let first = h.ledger.credit_account(&req).await.unwrap();
        let second = h.ledger.credit_account(&req).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.status, "posted");

        let journals = h.uow.journals().await;
        assert_eq!(journals.len(), 1);
        let lines = &journals[0].lines;
        assert!(lines.iter().any(|l| l.gl_account == GlAccount::GlSystemFund
            && l.debit == Decimal::ONE_HUNDRED
            && l.counterparty.is_none()));
        assert!(lines.iter().any(|l| l.gl_account == GlAccount::GlCustomerCash
            && l.credit == Decimal::ONE_HUNDRED
            && l.counterparty == Some(account)));

        let events = h.uow.outbox_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, event_types::LEDGER_POSTED);
        assert_eq!(h.audit.actions(), vec!["ledger.credit"]);
    }

    #[tokio::test]
    async fn test_unbalanced_manual_entry_rejected() {
        let h = harness(StubAccounts::ok());
        let req = ManualJournalEntryRequest {
            currency: "USD".to_string(),
            initiated_by: "ops:bob".to_string(),
            external_ref: Some("adj-1".to_string()),
            lines: vec![
                manual_line("GL_SYSTEM_FUND", None, "100.00", ""),
                manual_line("GL_CUSTOMER_CASH", Some(AccountId::new()), "", "90.00"),
            ],
        };

        let err = h.ledger.create_manual_journal_entry(&req).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(h.uow.journals().await.is_empty());
        assert!(h.uow.outbox_events().await.is_empty());
        assert!(h.audit.actions().is_empty());
    }

    #[tokio::test]
    async fn test_manual_entry_posts_every_time() {
        let h = harness(StubAccounts::ok());
        let req = ManualJournalEntryRequest {
            currency: "EUR".to_string(),
            initiated_by: "ops:bob".to_string(),
            external_ref: None,
            lines: vec![
                manual_line("GL_SYSTEM_FUND", None, "25.50", ""),
                manual_line("GL_CUSTOMER_CASH", Some(AccountId::new()), "", "25.50"),
            ],
        };

        let first = h.ledger.create_manual_journal_entry(&req).await.unwrap();
        let second = h.ledger.create_manual_journal_entry(&req).await.unwrap();
        assert_ne!(first.journal_id, second.journal_id);

        let events = h.uow.outbox_events().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == event_types::LEDGER_MANUAL_POSTED));
        assert_eq!(events[0].payload["line_count"], 2);
    }

    #[tokio::test]
    async fn test_journal_entries_paginated_newest_first() {
        let h = harness(StubAccounts::ok());
        let account = AccountId::new();
        for i in 0..5 {
            h.ledger
                .credit_account(&credit_request(&format!("page-key-{i:04}"), account, "1"))
                .await
                .unwrap();
        }
        // Another account's activity stays out of the listing.
        h.ledger
            .credit_account(&credit_request("other-key-0001", AccountId::new(), "1"))
            .await
            .unwrap();

        let mut query = journal_window();
        query.page = Some(1);
        query.size = Some(2);
        let page = h
            .ledger
            .list_account_journal_entries(&account.to_string(), &query)
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 2);
        assert!(page.entries[0].booked_at >= page.entries[1].booked_at);
        assert_eq!(page.entries[0].external_ref, "topup:page-key-0004");

        query.page = Some(3);
        let last = h
            .ledger
            .list_account_journal_entries(&account.to_string(), &query)
            .await
            .unwrap();
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.entries[0].external_ref, "topup:page-key-0000");
    }

    #[tokio::test]
    async fn test_journal_entries_rejects_bad_account() {
        let h = harness(StubAccounts::ok());
        let err = h
            .ledger
            .list_account_journal_entries("not-a-uuid", &journal_window())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_statement_enriches_counterparties_in_one_call() {
        let (a, b) = (AccountId::new(), AccountId::new());
        let h = harness(StubAccounts::with_summaries(vec![AccountSummary {
            account_id: b,
            account_number: "ACC-0002".to_string(),
            display_name: "Bob".to_string(),
            account_type: "personal".to_string(),
        }]));
        h.ledger
            .credit_account(&credit_request("stmt-topup-0001", a, "100"))
            .await
            .unwrap();
        h.payments
            .post_payment(&payment_request("stmt-pay-0001", a, b))
            .await
            .unwrap();
        h.payments
            .post_payment(&payment_request("stmt-pay-0002", a, b))
            .await
            .unwrap();

        let statement = h
            .ledger
            .list_account_statement(&a.to_string(), &statement_window(true))
            .await
            .unwrap();
        assert_eq!(statement.items.len(), 3);
        assert_eq!(h.accounts.summary_calls.load(Ordering::SeqCst), 1);

        let transfers: Vec<_> = statement
            .items
            .iter()
            .filter(|i| i.counterparty_account_id == Some(b))
            .collect();
        assert_eq!(transfers.len(), 2);
        for item in transfers {
            assert_eq!(item.direction, Direction::Debit);
            assert_eq!(item.amount, "50.000000");
            assert_eq!(item.counterparty.as_ref().unwrap().display_name, "Bob");
        }

        let top_up = statement
            .items
            .iter()
            .find(|i| i.counterparty_account_id.is_none())
            .unwrap();
        assert_eq!(top_up.direction, Direction::Credit);
        assert!(h.audit.actions().contains(&"ledger.statement".to_string()));
    }

    #[tokio::test]
    async fn test_statement_degrades_when_summaries_unavailable() {
        let (a, b) = (AccountId::new(), AccountId::new());
        let h = harness(StubAccounts::summaries_down());
        h.payments
            .post_payment(&payment_request("degrade-0001", a, b))
            .await
            .unwrap();

        let statement = h
            .ledger
            .list_account_statement(&a.to_string(), &statement_window(true))
            .await
            .unwrap();
        assert_eq!(statement.items.len(), 1);
        assert_eq!(statement.items[0].counterparty_account_id, Some(b));
        assert!(statement.items[0].counterparty.is_none());
    }

    #[tokio::test]
    async fn test_statement_skips_lookup_unless_asked() {
        let (a, b) = (AccountId::new(), AccountId::new());
        let h = harness(StubAccounts::ok());
        h.payments
            .post_payment(&payment_request("plain-0001", a, b))
            .await
            .unwrap();

        let statement = h
            .ledger
            .list_account_statement(&b.to_string(), &statement_window(false))
            .await
            .unwrap();
        assert_eq!(statement.items[0].direction, Direction::Credit);
        assert_eq!(h.accounts.summary_calls.load(Ordering::SeqCst), 0);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Outbox worker
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_outbox_publishes_then_idles() {
        let h = harness(StubAccounts::ok());
        let resp = h
            .payments
            .post_payment(&payment_request("outbox-0001", AccountId::new(), AccountId::new()))
            .await
            .unwrap();
        let publisher = Arc::new(ScriptedPublisher::default());
        let worker = worker(h.uow.clone(), publisher.clone());

        assert_eq!(worker.run_once().await, RunOutcome::Published(1));
        assert_eq!(worker.run_once().await, RunOutcome::Idle);

        let published = publisher.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, event_types::PAYMENT_POSTED);
        assert_eq!(published[0].1, resp.payment_id.to_string());

        let events = h.uow.outbox_events().await;
        assert!(events[0].published);
        assert!(events[0].published_at.is_some());
        assert!(!events[0].processing);
    }

    #[tokio::test]
    async fn test_outbox_failure_leaves_event_for_retry() {
        let h = harness(StubAccounts::ok());
        h.ledger
            .credit_account(&credit_request("retry-pub-0001", AccountId::new(), "5"))
            .await
            .unwrap();
        let publisher = Arc::new(ScriptedPublisher::failing_on(&[1]));
        let worker = worker(h.uow.clone(), publisher.clone());

        assert_eq!(
            worker.run_once().await,
            RunOutcome::Partial {
                published: 0,
                failed: 1
            }
        );
        let events = h.uow.outbox_events().await;
        assert!(!events[0].published);
        assert!(!events[0].processing);

        assert_eq!(worker.run_once().await, RunOutcome::Published(1));
        assert!(h.uow.outbox_events().await[0].published);
    }

    #[tokio::test]
    async fn test_outbox_marks_only_the_published_prefix() {
        let h = harness(StubAccounts::ok());
        let account = AccountId::new();
        for i in 0..3 {
            h.ledger
                .credit_account(&credit_request(&format!("prefix-key-{i:04}"), account, "1"))
                .await
                .unwrap();
        }
        let publisher = Arc::new(ScriptedPublisher::failing_on(&[2]));
        let worker = worker(h.uow.clone(), publisher.clone());

        assert_eq!(
            worker.run_once().await,
            RunOutcome::Partial {
                published: 1,
                failed: 2
            }
        );
        let published = h
            .uow
            .outbox_events()
            .await
            .iter()
            .filter(|e| e.published)
            .count();
        assert_eq!(published, 1);

        assert_eq!(worker.run_once().await, RunOutcome::Published(2));
        assert_eq!(publisher.topics().len(), 3);
        assert!(h.uow.outbox_events().await.iter().all(|e| e.published));
    }

    #[tokio::test]
    async fn test_outbox_worker_stops_on_shutdown() {
        let uow = Arc::new(InMemoryUow::new());
        let publisher = Arc::new(ScriptedPublisher::default());
        let worker = worker(uow, publisher);
        let (tx, rx) = tokio::sync::watch::channel(false);

        let handle = tokio::spawn(worker.run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
