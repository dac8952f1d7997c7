use chrono::{DateTime, NaiveDate, Utc};

use super::{Consultation, ConsultationId, ServiceCategory};

/// A defect found in a day's sequence numbering. This is a corruption
/// signal, distinct from a cash discrepancy at settlement time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceDefect {
    /// An expected number in 1..=N is missing
    Gap { missing: i64 },
    /// Two consultations share the same number
    Duplicate { sequence: i64 },
    /// A number below 1 (zero or negative)
    OutOfRange { sequence: i64 },
}

impl std::fmt::Display for SequenceDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceDefect::Gap { missing } => write!(f, "missing sequence number {}", missing),
            SequenceDefect::Duplicate { sequence } => {
                write!(f, "duplicate sequence number {}", sequence)
            }
            SequenceDefect::OutOfRange { sequence } => {
                write!(f, "sequence number {} out of range", sequence)
            }
        }
    }
}

impl std::error::Error for SequenceDefect {}

/// Verify that the assigned numbers form exactly {1..N}.
/// Returns the first defect in ascending sequence order.
pub fn verify_contiguous(sequences: &[i64]) -> Result<(), SequenceDefect> {
    let mut sorted = sequences.to_vec();
    sorted.sort_unstable();

    for (i, &seq) in sorted.iter().enumerate() {
        if seq < 1 {
            return Err(SequenceDefect::OutOfRange { sequence: seq });
        }
        if i > 0 && seq == sorted[i - 1] {
            return Err(SequenceDefect::Duplicate { sequence: seq });
        }
        // Sorted, distinct and >= 1, so seq can only meet or overshoot its slot
        let expected = i as i64 + 1;
        if seq > expected {
            return Err(SequenceDefect::Gap { missing: expected });
        }
    }

    Ok(())
}

/// The numbering a repair pass should produce: non-cancelled regular
/// consultations in intake order, assigned 1..N. Applying this twice
/// yields the same assignments (the ordering key never changes).
pub fn renumbering_plan(consultations: &[Consultation]) -> Vec<(ConsultationId, i64)> {
    let mut active: Vec<(&ConsultationId, &DateTime<Utc>)> = consultations
        .iter()
        .filter(|c| c.category == ServiceCategory::Regular && !c.is_cancelled())
        .map(|c| (&c.id, &c.created_at))
        .collect();

    // Intake order; id breaks ties deterministically
    active.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));

    active
        .into_iter()
        .zip(1i64..)
        .map(|((id, _), seq)| (*id, seq))
        .collect()
}

/// Result of a full-ledger integrity scan.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub consultation_count: i64,
    pub expense_count: i64,
    /// Dates whose active regular consultations do not number {1..N}
    pub sequence_defects: Vec<(NaiveDate, SequenceDefect)>,
    /// Consultations whose stored total disagrees with their line items
    pub total_mismatches: Vec<ConsultationId>,
    /// Active consultations with no line items and no fees. Counted in
    /// reconciliation denominators; listed here so they stay visible.
    pub zero_total_consultations: i64,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.sequence_defects.is_empty() && self.total_mismatches.is_empty()
    }
}
