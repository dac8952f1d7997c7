use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::domain::{
    expected_totals, reconcile, settlement_state, verify_contiguous, AdjunctFee, Cents,
    Consultation, ConsultationId, CountedAmounts, CountedDraft, Expense, ExpenseId,
    ExpectedTotals, IntegrityReport, LineItem, LineItemId, PaymentChannel, RegisterChannel,
    ServiceCategory, SettlementRecord, SettlementState,
};
use crate::storage::Repository;

use super::{AppError, CategorySection, DaySummary, SettlementReport};

/// Application service providing high-level operations for the register.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
pub struct RegisterService {
    repo: Repository,
}

impl RegisterService {
    /// Create a new register service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    fn check_not_future(date: NaiveDate) -> Result<(), AppError> {
        if date > Utc::now().date_naive() {
            return Err(AppError::FutureDate(date));
        }
        Ok(())
    }

    // ========================
    // Consultation operations
    // ========================

    /// Register a new consultation at intake. Regular consultations
    /// receive the next daily sequence number; mobile ones stay unnumbered.
    pub async fn register_consultation(
        &self,
        date: NaiveDate,
        category: ServiceCategory,
        channel: PaymentChannel,
        line_items: Vec<(String, Cents)>,
    ) -> Result<Consultation, AppError> {
        Self::check_not_future(date)?;

        for (description, amount_cents) in &line_items {
            if *amount_cents <= 0 {
                return Err(AppError::InvalidAmount(format!(
                    "Line item '{}' must have a positive amount",
                    description
                )));
            }
        }

        let mut consultation = Consultation::new(date, category, channel);
        for (description, amount_cents) in line_items {
            consultation = consultation.with_line_item(description, amount_cents);
        }

        self.repo.save_consultation(&mut consultation).await?;
        Ok(consultation)
    }

    /// Get a consultation by ID.
    pub async fn get_consultation(&self, id: ConsultationId) -> Result<Consultation, AppError> {
        self.repo
            .get_consultation(id)
            .await?
            .ok_or_else(|| AppError::ConsultationNotFound(id.to_string()))
    }

    /// List a date's consultations in intake order.
    pub async fn list_consultations(
        &self,
        date: NaiveDate,
        include_cancelled: bool,
    ) -> Result<Vec<Consultation>, AppError> {
        Ok(self.repo.list_consultations(date, include_cancelled).await?)
    }

    async fn get_editable(&self, id: ConsultationId) -> Result<Consultation, AppError> {
        let consultation = self.get_consultation(id).await?;
        if consultation.is_cancelled() {
            return Err(AppError::ConsultationCancelled(id.to_string()));
        }
        Ok(consultation)
    }

    /// Add a line item to a consultation, recomputing its total.
    pub async fn add_line_item(
        &self,
        id: ConsultationId,
        description: String,
        amount_cents: Cents,
    ) -> Result<Consultation, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Line item amount must be positive".to_string(),
            ));
        }

        self.get_editable(id).await?;
        let item = LineItem::new(description, amount_cents);
        self.repo.add_line_item(id, &item).await?;
        self.get_consultation(id).await
    }

    /// Remove a line item from a consultation, recomputing its total.
    pub async fn remove_line_item(
        &self,
        id: ConsultationId,
        line_item_id: LineItemId,
    ) -> Result<Consultation, AppError> {
        self.get_editable(id).await?;

        let removed = self.repo.remove_line_item(id, line_item_id).await?;
        if !removed {
            return Err(AppError::LineItemNotFound(line_item_id.to_string()));
        }
        self.get_consultation(id).await
    }

    /// Attach an adjunct fee (mobile consultations only).
    pub async fn add_adjunct_fee(
        &self,
        id: ConsultationId,
        name: String,
        amount_cents: Cents,
    ) -> Result<Consultation, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Adjunct fee amount must be positive".to_string(),
            ));
        }

        let consultation = self.get_editable(id).await?;
        if consultation.category != ServiceCategory::Mobile {
            return Err(AppError::AdjunctFeeOnRegular(id.to_string()));
        }

        let fee = AdjunctFee::new(name, amount_cents);
        self.repo.add_adjunct_fee(id, &fee).await?;
        self.get_consultation(id).await
    }

    /// Cancel a consultation. Clears its sequence number and shifts every
    /// later number on the date down by one, atomically.
    pub async fn cancel_consultation(
        &self,
        id: ConsultationId,
        reason: String,
        cancelled_by: String,
    ) -> Result<Consultation, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::MissingCancellationReason);
        }

        let consultation = self.get_consultation(id).await?;
        if consultation.is_cancelled() {
            return Err(AppError::ConsultationCancelled(id.to_string()));
        }

        self.repo
            .cancel_consultation(id, reason.trim(), &cancelled_by, Utc::now())
            .await?;

        info!(
            target: "audit",
            consultation = %id,
            date = %consultation.date,
            freed_sequence = ?consultation.sequence(),
            cancelled_by = %cancelled_by,
            "consultation cancelled"
        );

        self.get_consultation(id).await
    }

    /// Repair a date's numbering: reassign 1..N by intake order.
    /// Idempotent; safe to run on an already-correct date.
    pub async fn renumber_day(&self, date: NaiveDate) -> Result<u64, AppError> {
        let renumbered = self.repo.renumber_day(date).await?;
        self.verify_day_sequence(date).await?;

        info!(
            target: "audit",
            date = %date,
            consultations = renumbered,
            "sequence numbers repaired"
        );

        Ok(renumbered)
    }

    /// Verify that a date's numbering forms exactly {1..N}.
    pub async fn verify_day_sequence(&self, date: NaiveDate) -> Result<(), AppError> {
        let sequences = self.repo.sequences_for_date(date).await?;
        verify_contiguous(&sequences)
            .map_err(|defect| AppError::SequenceCorrupted { date, defect })
    }

    // ========================
    // Expense operations
    // ========================

    /// Record an operating expense paid out of the register.
    pub async fn record_expense(
        &self,
        date: NaiveDate,
        concept: String,
        amount_cents: Cents,
    ) -> Result<Expense, AppError> {
        Self::check_not_future(date)?;
        if concept.trim().is_empty() {
            return Err(AppError::MissingExpenseConcept);
        }
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Expense amount must be positive".to_string(),
            ));
        }

        let expense = Expense::new(date, concept.trim(), amount_cents);
        self.repo.save_expense(&expense).await?;
        Ok(expense)
    }

    /// Void an expense by appending a reversal entry. The original stays
    /// in the ledger; the day's net total drops by its amount.
    pub async fn void_expense(&self, id: ExpenseId) -> Result<Expense, AppError> {
        let original = self
            .repo
            .get_expense(id)
            .await?
            .ok_or_else(|| AppError::ExpenseNotFound(id.to_string()))?;

        if original.is_reversal() {
            return Err(AppError::CannotVoidReversal(id.to_string()));
        }
        if self.repo.expense_has_reversal(id).await? {
            return Err(AppError::ExpenseAlreadyVoided(id.to_string()));
        }

        let reversal = original.create_reversal();
        self.repo.save_expense(&reversal).await?;

        info!(
            target: "audit",
            expense = %id,
            reversal = %reversal.id,
            date = %original.date,
            "expense voided"
        );

        Ok(reversal)
    }

    /// List a date's expense entries, most recently recorded first.
    pub async fn list_expenses(&self, date: NaiveDate) -> Result<Vec<Expense>, AppError> {
        Ok(self.repo.list_expenses(date).await?)
    }

    /// Net expense total for a date.
    pub async fn expense_total(&self, date: NaiveDate) -> Result<Cents, AppError> {
        Ok(self.repo.expense_total(date).await?)
    }

    // ========================
    // Settlement operations
    // ========================

    /// Expected register amounts for a date, derived from regular-category
    /// revenue net of expenses. Mobile revenue never enters this figure.
    pub async fn expected_totals(&self, date: NaiveDate) -> Result<ExpectedTotals, AppError> {
        let regular = self
            .repo
            .revenue_totals(date, ServiceCategory::Regular)
            .await?;
        let expense_total = self.repo.expense_total(date).await?;
        Ok(expected_totals(&regular, expense_total))
    }

    /// Where a date's settlement stands, given the counted amounts entered
    /// so far (pass an empty draft when nothing has been counted).
    pub async fn settlement_state(
        &self,
        date: NaiveDate,
        draft: &CountedDraft,
    ) -> Result<SettlementState, AppError> {
        let record_exists = self.repo.get_settlement(date).await?.is_some();
        Ok(settlement_state(record_exists, draft))
    }

    /// Pre-close view of a day: both category sections, the expense
    /// ledger and the expected register amounts.
    pub async fn day_summary(&self, date: NaiveDate) -> Result<DaySummary, AppError> {
        let regular = self
            .repo
            .revenue_totals(date, ServiceCategory::Regular)
            .await?;
        let mobile = self
            .repo
            .revenue_totals(date, ServiceCategory::Mobile)
            .await?;
        let expenses = self.repo.list_expenses(date).await?;
        let expense_total = self.repo.expense_total(date).await?;
        let expected = expected_totals(&regular, expense_total);
        let state = self.settlement_state(date, &CountedDraft::default()).await?;

        Ok(DaySummary {
            date,
            regular: CategorySection::from_totals(ServiceCategory::Regular, &regular),
            mobile: CategorySection::from_totals(ServiceCategory::Mobile, &mobile),
            expenses,
            expense_total_cents: expense_total,
            expected_cash_cents: expected.cash_cents,
            expected_card_cents: expected.card_cents,
            expected_deposit_cents: expected.deposit_cents,
            state,
        })
    }

    /// Close the register for a date: reconcile counted against expected,
    /// persist the settlement record and return the assembled report.
    ///
    /// A discrepant count still closes; the differences and the operator's
    /// note travel with the record. Only validation failures and detected
    /// ledger corruption block the close.
    pub async fn close_register(
        &self,
        date: NaiveDate,
        counted: CountedDraft,
        observations: Option<String>,
        closed_by: String,
    ) -> Result<SettlementReport, AppError> {
        Self::check_not_future(date)?;
        if closed_by.trim().is_empty() {
            return Err(AppError::MissingClosingUser);
        }

        if self.repo.get_settlement(date).await?.is_some() {
            return Err(AppError::SettlementAlreadyClosed(date));
        }

        fn take(channel: RegisterChannel, entered: Option<Cents>) -> Result<Cents, AppError> {
            match entered {
                None => Err(AppError::MissingCountedAmount(channel)),
                Some(amount_cents) if amount_cents < 0 => Err(AppError::NegativeCountedAmount {
                    channel,
                    amount_cents,
                }),
                Some(amount_cents) => Ok(amount_cents),
            }
        }
        let counted = CountedAmounts {
            cash_cents: take(RegisterChannel::Cash, counted.cash_cents)?,
            card_cents: take(RegisterChannel::Card, counted.card_cents)?,
            deposit_cents: take(RegisterChannel::Deposit, counted.deposit_cents)?,
        };

        // Detected corruption blocks the close; it is a defect signal,
        // not a cash discrepancy.
        self.verify_day_sequence(date).await?;
        for consultation in self.repo.list_consultations(date, false).await? {
            if !consultation.total_is_consistent() {
                return Err(AppError::TotalMismatch {
                    consultation: consultation.id.to_string(),
                    stored: consultation.total_cents,
                    computed: consultation.computed_total(),
                });
            }
        }

        let regular = self
            .repo
            .revenue_totals(date, ServiceCategory::Regular)
            .await?;
        let mobile = self
            .repo
            .revenue_totals(date, ServiceCategory::Mobile)
            .await?;
        let expense_total = self.repo.expense_total(date).await?;
        let expected = expected_totals(&regular, expense_total);
        let reconciliation = reconcile(&expected, &counted);

        let record = SettlementRecord {
            date,
            counted,
            status: reconciliation.status,
            observations: observations.filter(|o| !o.trim().is_empty()),
            closed_by: closed_by.trim().to_string(),
            closed_at: Utc::now(),
        };
        self.repo.save_settlement(&record).await?;

        info!(
            target: "audit",
            date = %date,
            status = %record.status,
            closed_by = %record.closed_by,
            "register closed"
        );

        Ok(SettlementReport::assemble(
            &record,
            reconciliation,
            &regular,
            &mobile,
            expense_total,
        ))
    }

    /// Re-assemble the settlement report for an already-closed date.
    pub async fn settlement_report(&self, date: NaiveDate) -> Result<SettlementReport, AppError> {
        let record = self
            .repo
            .get_settlement(date)
            .await?
            .ok_or(AppError::SettlementNotFound(date))?;

        let regular = self
            .repo
            .revenue_totals(date, ServiceCategory::Regular)
            .await?;
        let mobile = self
            .repo
            .revenue_totals(date, ServiceCategory::Mobile)
            .await?;
        let expense_total = self.repo.expense_total(date).await?;
        let expected = expected_totals(&regular, expense_total);
        let reconciliation = reconcile(&expected, &record.counted);

        Ok(SettlementReport::assemble(
            &record,
            reconciliation,
            &regular,
            &mobile,
            expense_total,
        ))
    }

    // ========================
    // Integrity operations
    // ========================

    /// Scan the whole ledger for defects: sequence gaps or duplicates per
    /// date, stored totals that disagree with their parts, and the
    /// zero-total census.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.get_integrity_stats().await?;

        let mut sequence_defects = Vec::new();
        for date in self.repo.dates_with_sequences().await? {
            let sequences = self.repo.sequences_for_date(date).await?;
            if let Err(defect) = verify_contiguous(&sequences) {
                sequence_defects.push((date, defect));
            }
        }

        Ok(IntegrityReport {
            consultation_count: stats.consultation_count,
            expense_count: stats.expense_count,
            sequence_defects,
            total_mismatches: stats.total_mismatch_ids,
            zero_total_consultations: stats.zero_total_consultations,
        })
    }
}
