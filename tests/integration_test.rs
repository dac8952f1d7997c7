mod common;

use anyhow::Result;
use arqueo::application::AppError;
use arqueo::domain::{CountedDraft, PaymentChannel, SettlementStatus};
use arqueo::io::Exporter;
use common::{parse_date, test_service, ClinicDay};

fn counted(cash: i64, card: i64, deposit: i64) -> CountedDraft {
    CountedDraft {
        cash_cents: Some(cash),
        card_cents: Some(card),
        deposit_cents: Some(deposit),
    }
}

#[tokio::test]
async fn test_full_clinic_day() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    // Morning intakes across channels
    let c1 = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    let c2 = ClinicDay::intake_regular(&service, date, PaymentChannel::Card, 5000).await?;
    let c3 = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 3000).await?;
    let c4 =
        ClinicDay::intake_regular(&service, date, PaymentChannel::CashInvoiced, 8000).await?;
    assert_eq!(c4.sequence(), Some(4));

    // A home visit with a travel surcharge
    let visit = ClinicDay::intake_mobile(&service, date, PaymentChannel::Cash, 15000).await?;
    service
        .add_adjunct_fee(visit.id, "Travel surcharge".to_string(), 2500)
        .await?;

    // An extra service added after intake
    service
        .add_line_item(c1.id, "Injection".to_string(), 2000)
        .await?;

    // A no-show cancellation; later numbers shift down
    service
        .cancel_consultation(c2.id, "no-show".to_string(), "reception".to_string())
        .await?;
    assert_eq!(service.get_consultation(c3.id).await?.sequence(), Some(2));
    assert_eq!(service.get_consultation(c4.id).await?.sequence(), Some(3));

    // Expenses, one of them recorded by mistake
    service
        .record_expense(date, "Cleaning supplies".to_string(), 2000)
        .await?;
    let mistake = service
        .record_expense(date, "Duplicate entry".to_string(), 7000)
        .await?;
    service.void_expense(mistake.id).await?;

    // Expected: cash 120+30-20 = Q130, card 0 (cancelled), deposit Q80
    let expected = service.expected_totals(date).await?;
    assert_eq!(expected.cash_cents, 13000);
    assert_eq!(expected.card_cents, 0);
    assert_eq!(expected.deposit_cents, 8000);

    // Close the register with an exact count
    let report = service
        .close_register(
            date,
            counted(13000, 0, 8000),
            None,
            "dra. lopez".to_string(),
        )
        .await?;
    assert_eq!(report.status, SettlementStatus::Correct);
    assert_eq!(report.regular.patient_count, 3);
    assert_eq!(report.mobile.patient_count, 1);
    assert_eq!(report.mobile.total_cents, 17500);

    // The ledger stays clean end to end
    let integrity = service.check_integrity().await?;
    assert!(integrity.is_clean());
    Ok(())
}

#[tokio::test]
async fn test_editing_cancelled_consultation_fails() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let c = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    service
        .cancel_consultation(c.id, "duplicate".to_string(), "reception".to_string())
        .await?;

    let result = service
        .add_line_item(c.id, "Late addition".to_string(), 1000)
        .await;
    assert!(matches!(result, Err(AppError::ConsultationCancelled(_))));
    Ok(())
}

#[tokio::test]
async fn test_adjunct_fee_rejected_on_regular_consultation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let c = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    let result = service
        .add_adjunct_fee(c.id, "Travel surcharge".to_string(), 2500)
        .await;

    assert!(matches!(result, Err(AppError::AdjunctFeeOnRegular(_))));
    Ok(())
}

#[tokio::test]
async fn test_settlement_csv_export() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");
    ClinicDay::example_day(&service, date).await?;

    service
        .close_register(
            date,
            counted(11000, 5000, 0),
            None,
            "dra. lopez".to_string(),
        )
        .await?;

    let exporter = Exporter::new(&service);
    let mut buffer = Vec::new();
    let count = exporter.export_settlement_csv(date, &mut buffer).await?;
    assert_eq!(count, 3, "one row per register channel");

    let csv = String::from_utf8(buffer)?;
    assert!(csv.starts_with("channel,expected_cents,counted_cents,difference_cents,status"));
    assert!(csv.contains("cash,11000,11000,0,match"));
    assert!(csv.contains("card,5000,5000,0,match"));
    Ok(())
}

#[tokio::test]
async fn test_day_json_snapshot() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");
    ClinicDay::example_day(&service, date).await?;

    let exporter = Exporter::new(&service);

    // Before closing: no settlement section
    let mut buffer = Vec::new();
    let snapshot = exporter.export_day_json(date, &mut buffer).await?;
    assert_eq!(snapshot.consultations.len(), 3);
    assert_eq!(snapshot.expenses.len(), 1);
    assert!(snapshot.settlement.is_none());

    service
        .close_register(
            date,
            counted(11000, 5000, 0),
            None,
            "dra. lopez".to_string(),
        )
        .await?;

    let mut buffer = Vec::new();
    let snapshot = exporter.export_day_json(date, &mut buffer).await?;
    let settlement = snapshot.settlement.expect("settlement after close");
    assert_eq!(settlement.status, SettlementStatus::Correct);

    // The buffer holds valid JSON
    let parsed: serde_json::Value = serde_json::from_slice(&buffer)?;
    assert_eq!(parsed["date"], "2024-03-11");
    Ok(())
}

#[tokio::test]
async fn test_consultations_csv_includes_cancelled() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    let doomed = ClinicDay::intake_regular(&service, date, PaymentChannel::Card, 5000).await?;
    service
        .cancel_consultation(doomed.id, "walked out".to_string(), "reception".to_string())
        .await?;

    let exporter = Exporter::new(&service);
    let mut buffer = Vec::new();
    let count = exporter.export_consultations_csv(date, &mut buffer).await?;
    assert_eq!(count, 2);

    let csv = String::from_utf8(buffer)?;
    assert!(csv.contains("true"), "cancelled flag present in export");
    Ok(())
}
