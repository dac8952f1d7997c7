use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{Cents, RegisterChannel, SequenceDefect};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Consultation not found: {0}")]
    ConsultationNotFound(String),

    #[error("Line item not found: {0}")]
    LineItemNotFound(String),

    #[error("Expense not found: {0}")]
    ExpenseNotFound(String),

    #[error("No settlement recorded for {0}")]
    SettlementNotFound(NaiveDate),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("A cancellation requires a reason")]
    MissingCancellationReason,

    #[error("An expense requires a concept")]
    MissingExpenseConcept,

    #[error("Closing the register requires the closing user's name")]
    MissingClosingUser,

    #[error("Operation requested for a future date: {0}")]
    FutureDate(NaiveDate),

    #[error("Missing counted amount for the {0} channel")]
    MissingCountedAmount(RegisterChannel),

    #[error("Counted amount for the {channel} channel cannot be negative: {amount_cents}")]
    NegativeCountedAmount {
        channel: RegisterChannel,
        amount_cents: Cents,
    },

    #[error("Consultation is cancelled: {0}")]
    ConsultationCancelled(String),

    #[error("Adjunct fees only apply to mobile consultations: {0}")]
    AdjunctFeeOnRegular(String),

    #[error("Expense has already been voided: {0}")]
    ExpenseAlreadyVoided(String),

    #[error("Cannot void a reversal entry: {0}")]
    CannotVoidReversal(String),

    #[error("Register already closed for {0}")]
    SettlementAlreadyClosed(NaiveDate),

    #[error("Sequence numbering corrupted on {date}: {defect}")]
    SequenceCorrupted {
        date: NaiveDate,
        defect: SequenceDefect,
    },

    #[error("Stored total for consultation {consultation} is {stored} but its items sum to {computed}")]
    TotalMismatch {
        consultation: String,
        stored: Cents,
        computed: Cents,
    },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
