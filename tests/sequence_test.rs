mod common;

use anyhow::Result;
use arqueo::application::AppError;
use arqueo::domain::PaymentChannel;
use common::{parse_date, test_service, ClinicDay};

#[tokio::test]
async fn test_sequences_are_contiguous_from_one() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let mut sequences = Vec::new();
    for _ in 0..4 {
        let c = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
        sequences.push(c.sequence().unwrap());
    }

    assert_eq!(sequences, vec![1, 2, 3, 4]);
    service.verify_day_sequence(date).await?;
    Ok(())
}

#[tokio::test]
async fn test_cancel_shifts_later_numbers_down() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    // Four consultations numbered {1,2,3,4}
    let c1 = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    let c2 = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    let c3 = ClinicDay::intake_regular(&service, date, PaymentChannel::Card, 5000).await?;
    let c4 = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 3000).await?;

    // Cancel #2: the rest renumber to {1,2,3} preserving relative order
    service
        .cancel_consultation(c2.id, "patient left".to_string(), "reception".to_string())
        .await?;

    assert_eq!(service.get_consultation(c1.id).await?.sequence(), Some(1));
    assert_eq!(service.get_consultation(c3.id).await?.sequence(), Some(2));
    assert_eq!(service.get_consultation(c4.id).await?.sequence(), Some(3));

    service.verify_day_sequence(date).await?;
    Ok(())
}

#[tokio::test]
async fn test_cancelled_consultation_has_no_sequence() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let c = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    assert_eq!(c.sequence(), Some(1));

    let cancelled = service
        .cancel_consultation(c.id, "duplicate entry".to_string(), "reception".to_string())
        .await?;

    assert!(cancelled.is_cancelled());
    assert_eq!(cancelled.sequence(), None);
    Ok(())
}

#[tokio::test]
async fn test_mobile_consultations_are_never_numbered() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let r1 = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    let m = ClinicDay::intake_mobile(&service, date, PaymentChannel::Cash, 15000).await?;
    let r2 = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;

    // The mobile consultation is tracked but takes no number
    assert_eq!(m.sequence(), None);
    assert_eq!(r1.sequence(), Some(1));
    assert_eq!(r2.sequence(), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_dates_number_independently() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let monday = parse_date("2024-03-11");
    let tuesday = parse_date("2024-03-12");

    ClinicDay::intake_regular(&service, monday, PaymentChannel::Cash, 10000).await?;
    let first_tuesday =
        ClinicDay::intake_regular(&service, tuesday, PaymentChannel::Cash, 10000).await?;

    assert_eq!(first_tuesday.sequence(), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_cancel_requires_reason() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let c = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    let result = service
        .cancel_consultation(c.id, "   ".to_string(), "reception".to_string())
        .await;

    assert!(matches!(result, Err(AppError::MissingCancellationReason)));
    Ok(())
}

#[tokio::test]
async fn test_cancel_twice_fails() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let c = ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    service
        .cancel_consultation(c.id, "patient left".to_string(), "reception".to_string())
        .await?;

    let result = service
        .cancel_consultation(c.id, "again".to_string(), "reception".to_string())
        .await;

    assert!(matches!(result, Err(AppError::ConsultationCancelled(_))));
    Ok(())
}

#[tokio::test]
async fn test_renumber_is_idempotent() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    for _ in 0..5 {
        ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    }
    let consultations = service.list_consultations(date, false).await?;
    service
        .cancel_consultation(
            consultations[2].id,
            "no-show".to_string(),
            "reception".to_string(),
        )
        .await?;

    service.renumber_day(date).await?;
    let first_pass: Vec<_> = service
        .list_consultations(date, false)
        .await?
        .iter()
        .map(|c| (c.id, c.sequence()))
        .collect();

    service.renumber_day(date).await?;
    let second_pass: Vec<_> = service
        .list_consultations(date, false)
        .await?
        .iter()
        .map(|c| (c.id, c.sequence()))
        .collect();

    assert_eq!(first_pass, second_pass);
    service.verify_day_sequence(date).await?;
    Ok(())
}

#[tokio::test]
async fn test_integrity_check_clean_after_cancellations() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    for _ in 0..3 {
        ClinicDay::intake_regular(&service, date, PaymentChannel::Cash, 10000).await?;
    }
    let consultations = service.list_consultations(date, false).await?;
    service
        .cancel_consultation(
            consultations[0].id,
            "walked out".to_string(),
            "reception".to_string(),
        )
        .await?;

    let report = service.check_integrity().await?;
    assert!(report.is_clean(), "expected a clean ledger after cancel");
    assert_eq!(report.consultation_count, 3);
    Ok(())
}
