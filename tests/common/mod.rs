// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use arqueo::application::RegisterService;
use arqueo::domain::{Cents, Consultation, PaymentChannel, ServiceCategory};
use chrono::NaiveDate;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(RegisterService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = RegisterService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into NaiveDate
pub fn parse_date(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Test fixture: common intake shapes
pub struct ClinicDay;

impl ClinicDay {
    /// Register a regular consultation with a single line item
    pub async fn intake_regular(
        service: &RegisterService,
        date: NaiveDate,
        channel: PaymentChannel,
        amount_cents: Cents,
    ) -> Result<Consultation> {
        let consultation = service
            .register_consultation(
                date,
                ServiceCategory::Regular,
                channel,
                vec![("General consultation".to_string(), amount_cents)],
            )
            .await?;
        Ok(consultation)
    }

    /// Register a mobile consultation with a single line item
    pub async fn intake_mobile(
        service: &RegisterService,
        date: NaiveDate,
        channel: PaymentChannel,
        amount_cents: Cents,
    ) -> Result<Consultation> {
        let consultation = service
            .register_consultation(
                date,
                ServiceCategory::Mobile,
                channel,
                vec![("Home visit".to_string(), amount_cents)],
            )
            .await?;
        Ok(consultation)
    }

    /// The worked example used across the settlement tests: cash Q100,
    /// card Q50, cash Q30, plus a Q20 expense. Expected cash = Q110,
    /// expected card = Q50.
    pub async fn example_day(service: &RegisterService, date: NaiveDate) -> Result<()> {
        Self::intake_regular(service, date, PaymentChannel::Cash, 10000).await?;
        Self::intake_regular(service, date, PaymentChannel::Card, 5000).await?;
        Self::intake_regular(service, date, PaymentChannel::Cash, 3000).await?;
        service
            .record_expense(date, "Cleaning supplies".to_string(), 2000)
            .await?;
        Ok(())
    }
}
