use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, PaymentChannel};

/// Counted/expected differences below this threshold (0.01 GTQ) are
/// treated as rounding noise rather than a real discrepancy.
pub const TOLERANCE_CENTS: Cents = 1;

/// Count and sum of consultations on one payment channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTally {
    pub count: i64,
    pub total_cents: Cents,
}

/// Per-channel revenue totals for one service category on one date.
/// One field per payment channel so the partition is exhaustive by
/// construction; nothing can be silently dropped or double-counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub cash: ChannelTally,
    pub card: ChannelTally,
    pub cash_invoiced: ChannelTally,
    pub transfer: ChannelTally,
}

impl CategoryTotals {
    pub fn channel(&self, channel: PaymentChannel) -> ChannelTally {
        match channel {
            PaymentChannel::Cash => self.cash,
            PaymentChannel::Card => self.card,
            PaymentChannel::CashInvoiced => self.cash_invoiced,
            PaymentChannel::Transfer => self.transfer,
        }
    }

    pub fn channel_mut(&mut self, channel: PaymentChannel) -> &mut ChannelTally {
        match channel {
            PaymentChannel::Cash => &mut self.cash,
            PaymentChannel::Card => &mut self.card,
            PaymentChannel::CashInvoiced => &mut self.cash_invoiced,
            PaymentChannel::Transfer => &mut self.transfer,
        }
    }

    /// Total revenue across all channels.
    pub fn grand_total(&self) -> Cents {
        PaymentChannel::ALL
            .iter()
            .map(|&ch| self.channel(ch).total_cents)
            .sum()
    }

    /// Number of consultations across all channels.
    pub fn patient_count(&self) -> i64 {
        PaymentChannel::ALL
            .iter()
            .map(|&ch| self.channel(ch).count)
            .sum()
    }
}

/// The three buckets an operator physically counts at closing time.
/// The four payment channels fold into these: cash stays cash, card stays
/// card, and invoiced cash plus bank transfers both land in the deposit
/// bucket (neither is in the drawer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterChannel {
    Cash,
    Card,
    Deposit,
}

impl RegisterChannel {
    pub const ALL: [RegisterChannel; 3] = [
        RegisterChannel::Cash,
        RegisterChannel::Card,
        RegisterChannel::Deposit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterChannel::Cash => "cash",
            RegisterChannel::Card => "card",
            RegisterChannel::Deposit => "deposit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cash" => Some(RegisterChannel::Cash),
            "card" => Some(RegisterChannel::Card),
            "deposit" => Some(RegisterChannel::Deposit),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegisterChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Amounts the register should hold per bucket at closing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedTotals {
    pub cash_cents: Cents,
    pub card_cents: Cents,
    pub deposit_cents: Cents,
}

impl ExpectedTotals {
    pub fn channel(&self, channel: RegisterChannel) -> Cents {
        match channel {
            RegisterChannel::Cash => self.cash_cents,
            RegisterChannel::Card => self.card_cents,
            RegisterChannel::Deposit => self.deposit_cents,
        }
    }
}

/// Derive expected register amounts from regular-category revenue and the
/// day's net expenses. Mobile-category totals never enter this computation;
/// they are reported in their own section of the settlement.
pub fn expected_totals(regular: &CategoryTotals, expense_total: Cents) -> ExpectedTotals {
    ExpectedTotals {
        // Expenses are paid out of the cash drawer
        cash_cents: regular.cash.total_cents - expense_total,
        card_cents: regular.card.total_cents,
        deposit_cents: regular.cash_invoiced.total_cents + regular.transfer.total_cents,
    }
}

/// Amounts the operator physically counted per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountedAmounts {
    pub cash_cents: Cents,
    pub card_cents: Cents,
    pub deposit_cents: Cents,
}

impl CountedAmounts {
    pub fn channel(&self, channel: RegisterChannel) -> Cents {
        match channel {
            RegisterChannel::Cash => self.cash_cents,
            RegisterChannel::Card => self.card_cents,
            RegisterChannel::Deposit => self.deposit_cents,
        }
    }
}

/// Counted amounts while the operator is still entering them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountedDraft {
    pub cash_cents: Option<Cents>,
    pub card_cents: Option<Cents>,
    pub deposit_cents: Option<Cents>,
}

impl CountedDraft {
    pub fn is_empty(&self) -> bool {
        self.cash_cents.is_none() && self.card_cents.is_none() && self.deposit_cents.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.cash_cents.is_some() && self.card_cents.is_some() && self.deposit_cents.is_some()
    }

    /// Promote to final counted amounts once all three buckets are entered.
    pub fn complete(&self) -> Option<CountedAmounts> {
        Some(CountedAmounts {
            cash_cents: self.cash_cents?,
            card_cents: self.card_cents?,
            deposit_cents: self.deposit_cents?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Match,
    Mismatch,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Match => "match",
            ChannelStatus::Mismatch => "mismatch",
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall settlement outcome. `Discrepant` is a legitimate business
/// result, not an error: the settlement still closes, carrying the
/// differences and the operator's note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Correct,
    Discrepant,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Correct => "correct",
            SettlementStatus::Discrepant => "discrepant",
        }
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Comparison outcome for a single register bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReconciliation {
    pub channel: RegisterChannel,
    pub expected_cents: Cents,
    pub counted_cents: Cents,
    /// counted - expected; negative means the register is short
    pub difference_cents: Cents,
    pub status: ChannelStatus,
}

/// Full counted-vs-expected comparison for a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub channels: Vec<ChannelReconciliation>,
    pub status: SettlementStatus,
}

impl Reconciliation {
    pub fn channel(&self, channel: RegisterChannel) -> Option<&ChannelReconciliation> {
        self.channels.iter().find(|c| c.channel == channel)
    }
}

/// Compare expected against counted amounts, bucket by bucket.
/// Pure function: no side effects, nothing persisted.
pub fn reconcile(expected: &ExpectedTotals, counted: &CountedAmounts) -> Reconciliation {
    let channels: Vec<ChannelReconciliation> = RegisterChannel::ALL
        .iter()
        .map(|&channel| {
            let expected_cents = expected.channel(channel);
            let counted_cents = counted.channel(channel);
            let difference_cents = counted_cents - expected_cents;
            let status = if difference_cents.abs() < TOLERANCE_CENTS {
                ChannelStatus::Match
            } else {
                ChannelStatus::Mismatch
            };
            ChannelReconciliation {
                channel,
                expected_cents,
                counted_cents,
                difference_cents,
                status,
            }
        })
        .collect();

    let status = if channels.iter().all(|c| c.status == ChannelStatus::Match) {
        SettlementStatus::Correct
    } else {
        SettlementStatus::Discrepant
    };

    Reconciliation { channels, status }
}

/// The persisted end-of-day record. Created once per date when the
/// register closes; there is no transition out of the closed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub date: NaiveDate,
    pub counted: CountedAmounts,
    pub status: SettlementStatus,
    pub observations: Option<String>,
    pub closed_by: String,
    pub closed_at: DateTime<Utc>,
}

/// Where a date's settlement stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    /// Activity exists, nothing counted yet
    Open,
    /// Some but not all counted amounts entered
    PendingCount,
    /// All counted amounts entered, status computable, not yet persisted
    Reconciled,
    /// Record persisted; terminal
    Closed,
}

/// Derive the settlement state for a date from what is known about it.
pub fn settlement_state(record_exists: bool, draft: &CountedDraft) -> SettlementState {
    if record_exists {
        SettlementState::Closed
    } else if draft.is_complete() {
        SettlementState::Reconciled
    } else if draft.is_empty() {
        SettlementState::Open
    } else {
        SettlementState::PendingCount
    }
}
