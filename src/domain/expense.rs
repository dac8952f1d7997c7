use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type ExpenseId = Uuid;

/// An operating expense paid out of the register.
/// The ledger is append-only: entries are never deleted, a mistaken expense
/// is voided by appending a reversal entry that points back at it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub date: NaiveDate,
    /// What the money was spent on (e.g. "cleaning supplies")
    pub concept: String,
    /// Amount in centavos (always positive, also on reversals)
    pub amount_cents: Cents,
    /// If this entry is a reversal, points to the original expense
    pub reverses: Option<ExpenseId>,
    pub recorded_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(date: NaiveDate, concept: impl Into<String>, amount_cents: Cents) -> Self {
        assert!(amount_cents > 0, "Expense amount must be positive");
        Self {
            id: Uuid::new_v4(),
            date,
            concept: concept.into(),
            amount_cents,
            reverses: None,
            recorded_at: Utc::now(),
        }
    }

    /// Returns true if this entry is a reversal of another expense
    pub fn is_reversal(&self) -> bool {
        self.reverses.is_some()
    }

    /// Create a reversal entry for this expense. The reversal carries the
    /// same date and amount so the day's net total returns to what it was
    /// before the original entry.
    pub fn create_reversal(&self) -> Self {
        let mut reversal = Expense::new(
            self.date,
            format!("Reversal of: {}", self.concept),
            self.amount_cents,
        );
        reversal.reverses = Some(self.id);
        reversal
    }

    /// Contribution of this entry to the day's net expense total.
    pub fn signed_amount(&self) -> Cents {
        if self.is_reversal() {
            -self.amount_cents
        } else {
            self.amount_cents
        }
    }
}

/// Net expense total over a list of entries (reversals subtract).
pub fn net_expense_total(expenses: &[Expense]) -> Cents {
    expenses.iter().map(|e| e.signed_amount()).sum()
}
