mod repository;

pub use repository::*;

/// SQL migration for consultations, line items and adjunct fees
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration for the expense ledger
pub const MIGRATION_002_EXPENSES: &str = include_str!("migrations/002_expenses.sql");

/// SQL migration for settlement records
pub const MIGRATION_003_SETTLEMENTS: &str = include_str!("migrations/003_settlements.sql");
