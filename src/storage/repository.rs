use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    AdjunctFee, CategoryTotals, Cents, Consultation, ConsultationId, ConsultationStatus,
    CountedAmounts, Expense, ExpenseId, LineItem, LineItemId, PaymentChannel, ServiceCategory,
    SettlementRecord, SettlementStatus,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_EXPENSES, MIGRATION_003_SETTLEMENTS};

/// Raw counts for ledger integrity verification. Per-date sequence checks
/// are layered on top by the service using `sequences_for_date`.
#[derive(Debug, Clone)]
pub struct IntegrityStats {
    pub consultation_count: i64,
    pub expense_count: i64,
    pub total_mismatch_ids: Vec<ConsultationId>,
    pub zero_total_consultations: i64,
}

/// Repository for persisting and querying consultations, expenses and
/// settlement records.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_EXPENSES)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        sqlx::query(MIGRATION_003_SETTLEMENTS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 003")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Consultation operations
    // ========================

    /// Save a new consultation together with its initial line items.
    ///
    /// For regular consultations the daily sequence number is assigned by
    /// the INSERT itself (max-plus-one subquery with RETURNING), so two
    /// concurrent intakes can never compute the same number. Mobile
    /// consultations are stored unnumbered.
    pub async fn save_consultation(&self, consultation: &mut Consultation) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let date_str = consultation.date.to_string();

        match consultation.category {
            ServiceCategory::Regular => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO consultations (id, date, category, channel, sequence, cancelled, total_cents, created_at)
                    VALUES (?, ?, 'regular', ?,
                        (SELECT COALESCE(MAX(sequence), 0) + 1
                         FROM consultations
                         WHERE date = ? AND category = 'regular' AND cancelled = 0),
                        0, ?, ?)
                    RETURNING sequence
                    "#,
                )
                .bind(consultation.id.to_string())
                .bind(&date_str)
                .bind(consultation.channel.as_str())
                .bind(&date_str)
                .bind(consultation.total_cents)
                .bind(consultation.created_at.to_rfc3339())
                .fetch_one(&mut *tx)
                .await
                .context("Failed to save consultation")?;

                let sequence: i64 = row.get("sequence");
                consultation.status = ConsultationStatus::Active {
                    sequence: Some(sequence),
                };
            }
            ServiceCategory::Mobile => {
                sqlx::query(
                    r#"
                    INSERT INTO consultations (id, date, category, channel, sequence, cancelled, total_cents, created_at)
                    VALUES (?, ?, 'mobile', ?, NULL, 0, ?, ?)
                    "#,
                )
                .bind(consultation.id.to_string())
                .bind(&date_str)
                .bind(consultation.channel.as_str())
                .bind(consultation.total_cents)
                .bind(consultation.created_at.to_rfc3339())
                .execute(&mut *tx)
                .await
                .context("Failed to save consultation")?;
            }
        }

        for (position, item) in consultation.line_items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO line_items (id, consultation_id, description, amount_cents, position)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(item.id.to_string())
            .bind(consultation.id.to_string())
            .bind(&item.description)
            .bind(item.amount_cents)
            .bind(position as i64 + 1)
            .execute(&mut *tx)
            .await
            .context("Failed to save line item")?;
        }

        for fee in &consultation.adjunct_fees {
            sqlx::query(
                r#"
                INSERT INTO adjunct_fees (consultation_id, name, amount_cents)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(consultation.id.to_string())
            .bind(&fee.name)
            .bind(fee.amount_cents)
            .execute(&mut *tx)
            .await
            .context("Failed to save adjunct fee")?;
        }

        tx.commit().await.context("Failed to commit consultation")?;
        Ok(())
    }

    /// Get a consultation by ID, with its line items and adjunct fees.
    pub async fn get_consultation(&self, id: ConsultationId) -> Result<Option<Consultation>> {
        let row = sqlx::query(
            r#"
            SELECT id, date, category, channel, sequence, cancelled, cancel_reason,
                   cancelled_by, cancelled_at, total_cents, created_at
            FROM consultations
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch consultation")?;

        match row {
            Some(row) => {
                let mut consultation = Self::row_to_consultation(&row)?;
                self.load_parts(&mut consultation).await?;
                Ok(Some(consultation))
            }
            None => Ok(None),
        }
    }

    /// List a date's consultations in intake order.
    pub async fn list_consultations(
        &self,
        date: NaiveDate,
        include_cancelled: bool,
    ) -> Result<Vec<Consultation>> {
        let query = if include_cancelled {
            r#"
            SELECT id, date, category, channel, sequence, cancelled, cancel_reason,
                   cancelled_by, cancelled_at, total_cents, created_at
            FROM consultations
            WHERE date = ?
            ORDER BY created_at, id
            "#
        } else {
            r#"
            SELECT id, date, category, channel, sequence, cancelled, cancel_reason,
                   cancelled_by, cancelled_at, total_cents, created_at
            FROM consultations
            WHERE date = ? AND cancelled = 0
            ORDER BY created_at, id
            "#
        };

        let rows = sqlx::query(query)
            .bind(date.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list consultations")?;

        let mut consultations = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut consultation = Self::row_to_consultation(row)?;
            self.load_parts(&mut consultation).await?;
            consultations.push(consultation);
        }
        Ok(consultations)
    }

    /// Append a line item and recompute the stored total in one transaction.
    pub async fn add_line_item(
        &self,
        consultation_id: ConsultationId,
        item: &LineItem,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO line_items (id, consultation_id, description, amount_cents, position)
            VALUES (?, ?, ?, ?,
                (SELECT COALESCE(MAX(position), 0) + 1
                 FROM line_items WHERE consultation_id = ?))
            "#,
        )
        .bind(item.id.to_string())
        .bind(consultation_id.to_string())
        .bind(&item.description)
        .bind(item.amount_cents)
        .bind(consultation_id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to add line item")?;

        Self::recompute_total(&mut tx, consultation_id).await?;

        tx.commit().await.context("Failed to commit line item")?;
        Ok(())
    }

    /// Remove a line item and recompute the stored total in one transaction.
    /// Returns true if a row was deleted.
    pub async fn remove_line_item(
        &self,
        consultation_id: ConsultationId,
        line_item_id: LineItemId,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let result = sqlx::query("DELETE FROM line_items WHERE id = ? AND consultation_id = ?")
            .bind(line_item_id.to_string())
            .bind(consultation_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to remove line item")?;

        Self::recompute_total(&mut tx, consultation_id).await?;

        tx.commit()
            .await
            .context("Failed to commit line item removal")?;
        Ok(result.rows_affected() > 0)
    }

    /// Append an adjunct fee and recompute the stored total in one transaction.
    pub async fn add_adjunct_fee(
        &self,
        consultation_id: ConsultationId,
        fee: &AdjunctFee,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO adjunct_fees (consultation_id, name, amount_cents)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(consultation_id.to_string())
        .bind(&fee.name)
        .bind(fee.amount_cents)
        .execute(&mut *tx)
        .await
        .context("Failed to add adjunct fee")?;

        Self::recompute_total(&mut tx, consultation_id).await?;

        tx.commit().await.context("Failed to commit adjunct fee")?;
        Ok(())
    }

    /// Cancel a consultation and close the gap it leaves.
    ///
    /// One transaction: mark the row cancelled (clearing its sequence),
    /// then a single set-based UPDATE decrements every later sequence on
    /// the date. A failure anywhere rolls the whole shift back; the
    /// numbering is never left half-updated.
    pub async fn cancel_consultation(
        &self,
        id: ConsultationId,
        reason: &str,
        cancelled_by: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let row = sqlx::query("SELECT date, sequence FROM consultations WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&mut *tx)
            .await
            .context("Failed to fetch consultation for cancellation")?;

        let date_str: String = row.get("date");
        let sequence: Option<i64> = row.get("sequence");

        sqlx::query(
            r#"
            UPDATE consultations
            SET cancelled = 1, sequence = NULL, cancel_reason = ?, cancelled_by = ?, cancelled_at = ?
            WHERE id = ?
            "#,
        )
        .bind(reason)
        .bind(cancelled_by)
        .bind(cancelled_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to cancel consultation")?;

        if let Some(freed) = sequence {
            sqlx::query(
                r#"
                UPDATE consultations
                SET sequence = sequence - 1
                WHERE date = ? AND category = 'regular' AND cancelled = 0 AND sequence > ?
                "#,
            )
            .bind(&date_str)
            .bind(freed)
            .execute(&mut *tx)
            .await
            .context("Failed to shift sequence numbers")?;
        }

        tx.commit().await.context("Failed to commit cancellation")?;
        Ok(())
    }

    /// Reassign 1..N to a date's active regular consultations in intake
    /// order. A single set-based statement, idempotent by construction.
    /// Returns the number of rows touched.
    pub async fn renumber_day(&self, date: NaiveDate) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE consultations
            SET sequence = ranked.rn
            FROM (
                SELECT id, ROW_NUMBER() OVER (ORDER BY created_at, id) AS rn
                FROM consultations
                WHERE date = ? AND category = 'regular' AND cancelled = 0
            ) AS ranked
            WHERE consultations.id = ranked.id
            "#,
        )
        .bind(date.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to renumber consultations")?;

        Ok(result.rows_affected())
    }

    /// Sequence numbers currently assigned on a date (active regular only).
    pub async fn sequences_for_date(&self, date: NaiveDate) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence
            FROM consultations
            WHERE date = ? AND category = 'regular' AND cancelled = 0 AND sequence IS NOT NULL
            ORDER BY sequence
            "#,
        )
        .bind(date.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch sequence numbers")?;

        Ok(rows.iter().map(|row| row.get("sequence")).collect())
    }

    // ========================
    // Revenue aggregation
    // ========================

    /// Per-channel count and sum over a date's non-cancelled consultations
    /// of one category, computed in SQL. Stored totals already fold in
    /// adjunct fees, so mobile sums include them.
    pub async fn revenue_totals(
        &self,
        date: NaiveDate,
        category: ServiceCategory,
    ) -> Result<CategoryTotals> {
        let rows = sqlx::query(
            r#"
            SELECT channel, COUNT(*) as count, COALESCE(SUM(total_cents), 0) as total
            FROM consultations
            WHERE date = ? AND category = ? AND cancelled = 0
            GROUP BY channel
            "#,
        )
        .bind(date.to_string())
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute revenue totals")?;

        let mut totals = CategoryTotals::default();
        for row in rows {
            let channel_str: String = row.get("channel");
            let channel = PaymentChannel::from_str(&channel_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid payment channel: {}", channel_str))?;
            let tally = totals.channel_mut(channel);
            tally.count = row.get("count");
            tally.total_cents = row.get("total");
        }

        Ok(totals)
    }

    // ========================
    // Expense operations
    // ========================

    /// Save a new expense entry (original or reversal).
    pub async fn save_expense(&self, expense: &Expense) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO expenses (id, date, concept, amount_cents, reverses, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(expense.id.to_string())
        .bind(expense.date.to_string())
        .bind(&expense.concept)
        .bind(expense.amount_cents)
        .bind(expense.reverses.map(|id| id.to_string()))
        .bind(expense.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save expense")?;
        Ok(())
    }

    /// Get an expense by ID.
    pub async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>> {
        let row = sqlx::query(
            r#"
            SELECT id, date, concept, amount_cents, reverses, recorded_at
            FROM expenses
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch expense")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_expense(&row)?)),
            None => Ok(None),
        }
    }

    /// List a date's expense entries, most recently recorded first.
    pub async fn list_expenses(&self, date: NaiveDate) -> Result<Vec<Expense>> {
        let rows = sqlx::query(
            r#"
            SELECT id, date, concept, amount_cents, reverses, recorded_at
            FROM expenses
            WHERE date = ?
            ORDER BY recorded_at DESC, id DESC
            "#,
        )
        .bind(date.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list expenses")?;

        rows.iter().map(Self::row_to_expense).collect()
    }

    /// Net expense total for a date (reversal entries subtract).
    pub async fn expense_total(&self, date: NaiveDate) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN reverses IS NULL THEN amount_cents ELSE -amount_cents END), 0) as total
            FROM expenses
            WHERE date = ?
            "#,
        )
        .bind(date.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute expense total")?;

        Ok(row.get("total"))
    }

    /// True if a reversal entry already points at this expense.
    pub async fn expense_has_reversal(&self, id: ExpenseId) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM expenses WHERE reverses = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to check for expense reversal")?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    // ========================
    // Settlement operations
    // ========================

    /// Persist a settlement record. One per date; the primary key rejects
    /// a second close even if the prior existence check raced.
    pub async fn save_settlement(&self, record: &SettlementRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settlements (date, counted_cash_cents, counted_card_cents,
                                     counted_deposit_cents, status, observations, closed_by, closed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.date.to_string())
        .bind(record.counted.cash_cents)
        .bind(record.counted.card_cents)
        .bind(record.counted.deposit_cents)
        .bind(record.status.as_str())
        .bind(&record.observations)
        .bind(&record.closed_by)
        .bind(record.closed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save settlement")?;
        Ok(())
    }

    /// Get the settlement record for a date, if the register was closed.
    pub async fn get_settlement(&self, date: NaiveDate) -> Result<Option<SettlementRecord>> {
        let row = sqlx::query(
            r#"
            SELECT date, counted_cash_cents, counted_card_cents, counted_deposit_cents,
                   status, observations, closed_by, closed_at
            FROM settlements
            WHERE date = ?
            "#,
        )
        .bind(date.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch settlement")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_settlement(&row)?)),
            None => Ok(None),
        }
    }

    // ========================
    // Integrity checks
    // ========================

    /// Distinct dates holding active regular consultations.
    pub async fn dates_with_sequences(&self) -> Result<Vec<NaiveDate>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT date
            FROM consultations
            WHERE category = 'regular' AND cancelled = 0
            ORDER BY date
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list dates")?;

        rows.iter()
            .map(|row| {
                let date_str: String = row.get("date");
                NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").context("Invalid date")
            })
            .collect()
    }

    /// Get statistics for integrity checking.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let consultation_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM consultations")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let expense_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM expenses")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        // Stored totals that disagree with the sum of their parts
        let mismatch_rows = sqlx::query(
            r#"
            SELECT id
            FROM consultations c
            WHERE total_cents !=
                (SELECT COALESCE(SUM(amount_cents), 0) FROM line_items WHERE consultation_id = c.id)
              + (SELECT COALESCE(SUM(amount_cents), 0) FROM adjunct_fees WHERE consultation_id = c.id)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let total_mismatch_ids = mismatch_rows
            .iter()
            .map(|row| {
                let id_str: String = row.get("id");
                Uuid::parse_str(&id_str).context("Invalid consultation ID")
            })
            .collect::<Result<Vec<_>>>()?;

        let zero_total_consultations: i64 = sqlx::query(
            "SELECT COUNT(*) as count FROM consultations WHERE cancelled = 0 AND total_cents = 0",
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(IntegrityStats {
            consultation_count,
            expense_count,
            total_mismatch_ids,
            zero_total_consultations,
        })
    }

    // ========================
    // Row mappers
    // ========================

    async fn load_parts(&self, consultation: &mut Consultation) -> Result<()> {
        let item_rows = sqlx::query(
            r#"
            SELECT id, description, amount_cents
            FROM line_items
            WHERE consultation_id = ?
            ORDER BY position
            "#,
        )
        .bind(consultation.id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch line items")?;

        consultation.line_items = item_rows
            .iter()
            .map(|row| {
                let id_str: String = row.get("id");
                Ok(LineItem {
                    id: Uuid::parse_str(&id_str).context("Invalid line item ID")?,
                    description: row.get("description"),
                    amount_cents: row.get("amount_cents"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let fee_rows = sqlx::query(
            r#"
            SELECT name, amount_cents
            FROM adjunct_fees
            WHERE consultation_id = ?
            "#,
        )
        .bind(consultation.id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch adjunct fees")?;

        consultation.adjunct_fees = fee_rows
            .iter()
            .map(|row| AdjunctFee {
                name: row.get("name"),
                amount_cents: row.get("amount_cents"),
            })
            .collect();

        Ok(())
    }

    fn row_to_consultation(row: &sqlx::sqlite::SqliteRow) -> Result<Consultation> {
        let id_str: String = row.get("id");
        let date_str: String = row.get("date");
        let category_str: String = row.get("category");
        let channel_str: String = row.get("channel");
        let created_at_str: String = row.get("created_at");
        let cancelled = row.get::<i64, _>("cancelled") != 0;

        let status = if cancelled {
            let cancelled_at_str: String = row.get("cancelled_at");
            ConsultationStatus::Cancelled {
                reason: row.get("cancel_reason"),
                cancelled_by: row.get("cancelled_by"),
                cancelled_at: DateTime::parse_from_rfc3339(&cancelled_at_str)
                    .context("Invalid cancelled_at timestamp")?
                    .with_timezone(&Utc),
            }
        } else {
            ConsultationStatus::Active {
                sequence: row.get("sequence"),
            }
        };

        Ok(Consultation {
            id: Uuid::parse_str(&id_str).context("Invalid consultation ID")?,
            date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").context("Invalid date")?,
            category: ServiceCategory::from_str(&category_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid service category: {}", category_str))?,
            channel: PaymentChannel::from_str(&channel_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid payment channel: {}", channel_str))?,
            status,
            line_items: Vec::new(),
            adjunct_fees: Vec::new(),
            total_cents: row.get("total_cents"),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    fn row_to_expense(row: &sqlx::sqlite::SqliteRow) -> Result<Expense> {
        let id_str: String = row.get("id");
        let date_str: String = row.get("date");
        let reverses_str: Option<String> = row.get("reverses");
        let recorded_at_str: String = row.get("recorded_at");

        Ok(Expense {
            id: Uuid::parse_str(&id_str).context("Invalid expense ID")?,
            date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").context("Invalid date")?,
            concept: row.get("concept"),
            amount_cents: row.get("amount_cents"),
            reverses: reverses_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid reverses ID")?,
            recorded_at: DateTime::parse_from_rfc3339(&recorded_at_str)
                .context("Invalid recorded_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    fn row_to_settlement(row: &sqlx::sqlite::SqliteRow) -> Result<SettlementRecord> {
        let date_str: String = row.get("date");
        let status_str: String = row.get("status");
        let closed_at_str: String = row.get("closed_at");

        let status = match status_str.as_str() {
            "correct" => SettlementStatus::Correct,
            "discrepant" => SettlementStatus::Discrepant,
            other => anyhow::bail!("Invalid settlement status: {}", other),
        };

        Ok(SettlementRecord {
            date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").context("Invalid date")?,
            counted: CountedAmounts {
                cash_cents: row.get("counted_cash_cents"),
                card_cents: row.get("counted_card_cents"),
                deposit_cents: row.get("counted_deposit_cents"),
            },
            status,
            observations: row.get("observations"),
            closed_by: row.get("closed_by"),
            closed_at: DateTime::parse_from_rfc3339(&closed_at_str)
                .context("Invalid closed_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    async fn recompute_total(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        consultation_id: ConsultationId,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE consultations
            SET total_cents =
                (SELECT COALESCE(SUM(amount_cents), 0) FROM line_items WHERE consultation_id = ?)
              + (SELECT COALESCE(SUM(amount_cents), 0) FROM adjunct_fees WHERE consultation_id = ?)
            WHERE id = ?
            "#,
        )
        .bind(consultation_id.to_string())
        .bind(consultation_id.to_string())
        .bind(consultation_id.to_string())
        .execute(&mut **tx)
        .await
        .context("Failed to recompute consultation total")?;
        Ok(())
    }
}
