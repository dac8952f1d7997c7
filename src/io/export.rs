use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::{RegisterService, SettlementReport};
use crate::domain::{Consultation, Expense};

/// Full-day snapshot for JSON export. The settlement section is present
/// only once the register has been closed for the date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub date: NaiveDate,
    pub consultations: Vec<Consultation>,
    pub expenses: Vec<Expense>,
    pub settlement: Option<SettlementReport>,
}

/// Exporter for turning register data into downloadable documents.
/// The core defines the structures; this module owns their serialization.
pub struct Exporter<'a> {
    service: &'a RegisterService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a RegisterService) -> Self {
        Self { service }
    }

    /// Export a closed settlement to CSV format (one row per register channel).
    pub async fn export_settlement_csv<W: Write>(
        &self,
        date: NaiveDate,
        writer: W,
    ) -> Result<usize> {
        let report = self.service.settlement_report(date).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record([
            "channel",
            "expected_cents",
            "counted_cents",
            "difference_cents",
            "status",
        ])?;

        let mut count = 0;
        for channel in &report.reconciliation.channels {
            csv_writer.write_record([
                channel.channel.as_str().to_string(),
                channel.expected_cents.to_string(),
                channel.counted_cents.to_string(),
                channel.difference_cents.to_string(),
                channel.status.as_str().to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export a date's consultations to CSV format.
    pub async fn export_consultations_csv<W: Write>(
        &self,
        date: NaiveDate,
        writer: W,
    ) -> Result<usize> {
        let consultations = self.service.list_consultations(date, true).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record([
            "id",
            "sequence",
            "category",
            "channel",
            "cancelled",
            "total_cents",
            "created_at",
        ])?;

        let mut count = 0;
        for consultation in &consultations {
            csv_writer.write_record([
                consultation.id.to_string(),
                consultation
                    .sequence()
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                consultation.category.as_str().to_string(),
                consultation.channel.as_str().to_string(),
                consultation.is_cancelled().to_string(),
                consultation.total_cents.to_string(),
                consultation.created_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export a date's expense ledger to CSV format.
    pub async fn export_expenses_csv<W: Write>(
        &self,
        date: NaiveDate,
        writer: W,
    ) -> Result<usize> {
        let expenses = self.service.list_expenses(date).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        // Write header
        csv_writer.write_record(["id", "concept", "amount_cents", "reverses", "recorded_at"])?;

        let mut count = 0;
        for expense in &expenses {
            csv_writer.write_record([
                expense.id.to_string(),
                expense.concept.clone(),
                expense.amount_cents.to_string(),
                expense
                    .reverses
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                expense.recorded_at.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export a full day as a JSON snapshot.
    pub async fn export_day_json<W: Write>(
        &self,
        date: NaiveDate,
        mut writer: W,
    ) -> Result<DaySnapshot> {
        let consultations = self.service.list_consultations(date, true).await?;
        let expenses = self.service.list_expenses(date).await?;
        let settlement = match self.service.settlement_report(date).await {
            Ok(report) => Some(report),
            Err(crate::application::AppError::SettlementNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let snapshot = DaySnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            date,
            consultations,
            expenses,
            settlement,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
