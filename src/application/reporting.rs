use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CategoryTotals, Cents, Expense, PaymentChannel, Reconciliation, ServiceCategory,
    SettlementRecord, SettlementState, SettlementStatus,
};

/// Count and sum for one payment channel within a category section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelBreakdown {
    pub channel: PaymentChannel,
    pub count: i64,
    pub total_cents: Cents,
}

/// Revenue breakdown for one service category. The regular and mobile
/// sections of a settlement are built separately and never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySection {
    pub category: ServiceCategory,
    pub channels: Vec<ChannelBreakdown>,
    pub patient_count: i64,
    pub total_cents: Cents,
}

impl CategorySection {
    pub fn from_totals(category: ServiceCategory, totals: &CategoryTotals) -> Self {
        let channels = PaymentChannel::ALL
            .iter()
            .map(|&channel| {
                let tally = totals.channel(channel);
                ChannelBreakdown {
                    channel,
                    count: tally.count,
                    total_cents: tally.total_cents,
                }
            })
            .collect();

        Self {
            category,
            channels,
            patient_count: totals.patient_count(),
            total_cents: totals.grand_total(),
        }
    }
}

/// The assembled end-of-day settlement, handed to the export renderer.
/// The renderer owns serialization to a document; this is structure only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    pub date: NaiveDate,
    /// Per register channel: expected, counted, difference, status
    pub reconciliation: Reconciliation,
    pub status: SettlementStatus,
    pub regular: CategorySection,
    pub mobile: CategorySection,
    pub expense_total_cents: Cents,
    pub observations: Option<String>,
    pub closed_by: String,
    pub closed_at: DateTime<Utc>,
}

impl SettlementReport {
    pub fn assemble(
        record: &SettlementRecord,
        reconciliation: Reconciliation,
        regular: &CategoryTotals,
        mobile: &CategoryTotals,
        expense_total_cents: Cents,
    ) -> Self {
        let status = reconciliation.status;
        Self {
            date: record.date,
            reconciliation,
            status,
            regular: CategorySection::from_totals(ServiceCategory::Regular, regular),
            mobile: CategorySection::from_totals(ServiceCategory::Mobile, mobile),
            expense_total_cents,
            observations: record.observations.clone(),
            closed_by: record.closed_by.clone(),
            closed_at: record.closed_at,
        }
    }
}

/// Pre-close view of a day: both category sections, the expense ledger
/// and the expected register amounts, before anything is counted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub regular: CategorySection,
    pub mobile: CategorySection,
    pub expenses: Vec<Expense>,
    pub expense_total_cents: Cents,
    pub expected_cash_cents: Cents,
    pub expected_card_cents: Cents,
    pub expected_deposit_cents: Cents,
    pub state: SettlementState,
}
