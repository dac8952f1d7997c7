use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type ConsultationId = Uuid;
pub type LineItemId = Uuid;

/// Payment channel for a consultation. Closed enumeration: adding a channel
/// is a compile-time change and every match over it is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel {
    /// Cash taken at the register
    Cash,
    /// Card terminal payment
    Card,
    /// Cash payment with a tax invoice issued (banked, not kept in the drawer)
    CashInvoiced,
    /// Direct bank transfer or deposit
    Transfer,
}

impl PaymentChannel {
    pub const ALL: [PaymentChannel; 4] = [
        PaymentChannel::Cash,
        PaymentChannel::Card,
        PaymentChannel::CashInvoiced,
        PaymentChannel::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentChannel::Cash => "cash",
            PaymentChannel::Card => "card",
            PaymentChannel::CashInvoiced => "cash_invoiced",
            PaymentChannel::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cash" => Some(PaymentChannel::Cash),
            "card" => Some(PaymentChannel::Card),
            "cash_invoiced" => Some(PaymentChannel::CashInvoiced),
            "transfer" => Some(PaymentChannel::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Service category. Regular consultations receive a daily sequence number;
/// mobile (home-visit) consultations are tracked but never numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Regular,
    Mobile,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Regular => "regular",
            ServiceCategory::Mobile => "mobile",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "regular" => Some(ServiceCategory::Regular),
            "mobile" => Some(ServiceCategory::Mobile),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a consultation. Modelled as a variant so code cannot
/// read a sequence number off a cancelled record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ConsultationStatus {
    /// Live consultation. `sequence` is `Some` for regular consultations
    /// and `None` for mobile ones.
    Active { sequence: Option<i64> },
    /// Cancelled consultation. Carries no sequence number.
    Cancelled {
        reason: String,
        cancelled_by: String,
        cancelled_at: DateTime<Utc>,
    },
}

impl ConsultationStatus {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConsultationStatus::Cancelled { .. })
    }

    /// The sequence number, if this consultation is active and numbered.
    pub fn sequence(&self) -> Option<i64> {
        match self {
            ConsultationStatus::Active { sequence } => *sequence,
            ConsultationStatus::Cancelled { .. } => None,
        }
    }
}

/// A single billed service line on a consultation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub description: String,
    /// Amount in centavos (always positive)
    pub amount_cents: Cents,
}

impl LineItem {
    pub fn new(description: impl Into<String>, amount_cents: Cents) -> Self {
        assert!(amount_cents > 0, "Line item amount must be positive");
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            amount_cents,
        }
    }
}

/// A named surcharge outside the normal line-item list. Only mobile
/// consultations carry adjunct fees (e.g. a travel surcharge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjunctFee {
    pub name: String,
    pub amount_cents: Cents,
}

impl AdjunctFee {
    pub fn new(name: impl Into<String>, amount_cents: Cents) -> Self {
        assert!(amount_cents > 0, "Adjunct fee amount must be positive");
        Self {
            name: name.into(),
            amount_cents,
        }
    }
}

/// A patient consultation: the unit of revenue in the register.
/// The stored total is recomputed on every line-item or fee mutation and
/// must always equal the sum of line items plus adjunct fees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: ConsultationId,
    pub date: NaiveDate,
    pub category: ServiceCategory,
    pub channel: PaymentChannel,
    pub status: ConsultationStatus,
    pub line_items: Vec<LineItem>,
    pub adjunct_fees: Vec<AdjunctFee>,
    /// Denormalized total in centavos, kept in lockstep with the items
    pub total_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl Consultation {
    /// Create a new consultation. For regular consultations the sequence
    /// number is assigned by the repository at insert time; mobile
    /// consultations stay unnumbered for their whole life.
    pub fn new(date: NaiveDate, category: ServiceCategory, channel: PaymentChannel) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            category,
            channel,
            status: ConsultationStatus::Active { sequence: None },
            line_items: Vec::new(),
            adjunct_fees: Vec::new(),
            total_cents: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_line_item(mut self, description: impl Into<String>, amount_cents: Cents) -> Self {
        self.line_items.push(LineItem::new(description, amount_cents));
        self.total_cents = self.computed_total();
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.is_cancelled()
    }

    pub fn sequence(&self) -> Option<i64> {
        self.status.sequence()
    }

    /// Total derived from the parts: line items plus adjunct fees.
    pub fn computed_total(&self) -> Cents {
        let items: Cents = self.line_items.iter().map(|li| li.amount_cents).sum();
        let fees: Cents = self.adjunct_fees.iter().map(|f| f.amount_cents).sum();
        items + fees
    }

    /// True when the stored total matches the derived one. A false here is
    /// a defect signal, not a business discrepancy.
    pub fn total_is_consistent(&self) -> bool {
        self.total_cents == self.computed_total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
    }

    #[test]
    fn test_channel_roundtrip() {
        for channel in PaymentChannel::ALL {
            let parsed = PaymentChannel::from_str(channel.as_str()).unwrap();
            assert_eq!(channel, parsed);
        }
    }

    #[test]
    fn test_category_roundtrip() {
        for category in [ServiceCategory::Regular, ServiceCategory::Mobile] {
            let parsed = ServiceCategory::from_str(category.as_str()).unwrap();
            assert_eq!(category, parsed);
        }
    }

    #[test]
    fn test_new_consultation_is_active_and_unnumbered() {
        let c = Consultation::new(sample_date(), ServiceCategory::Regular, PaymentChannel::Cash);
        assert!(!c.is_cancelled());
        assert_eq!(c.sequence(), None);
        assert_eq!(c.total_cents, 0);
    }

    #[test]
    fn test_total_tracks_line_items() {
        let c = Consultation::new(sample_date(), ServiceCategory::Regular, PaymentChannel::Cash)
            .with_line_item("General consultation", 10000)
            .with_line_item("Injection", 3000);

        assert_eq!(c.total_cents, 13000);
        assert!(c.total_is_consistent());
    }

    #[test]
    fn test_total_includes_adjunct_fees() {
        let mut c =
            Consultation::new(sample_date(), ServiceCategory::Mobile, PaymentChannel::Cash)
                .with_line_item("Home visit", 15000);
        c.adjunct_fees.push(AdjunctFee::new("Travel surcharge", 2500));

        assert_eq!(c.computed_total(), 17500);
    }

    #[test]
    fn test_cancelled_status_exposes_no_sequence() {
        let status = ConsultationStatus::Cancelled {
            reason: "duplicate entry".into(),
            cancelled_by: "reception".into(),
            cancelled_at: Utc::now(),
        };
        assert!(status.is_cancelled());
        assert_eq!(status.sequence(), None);
    }

    #[test]
    #[should_panic(expected = "Line item amount must be positive")]
    fn test_line_item_requires_positive_amount() {
        LineItem::new("Free sample", 0);
    }
}
