mod common;

use anyhow::Result;
use arqueo::application::AppError;
use common::{parse_date, test_service};

#[tokio::test]
async fn test_record_and_sum_expenses() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    service
        .record_expense(date, "Cleaning supplies".to_string(), 2000)
        .await?;
    service
        .record_expense(date, "Printer paper".to_string(), 4500)
        .await?;

    assert_eq!(service.expense_total(date).await?, 6500);

    let expenses = service.list_expenses(date).await?;
    assert_eq!(expenses.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_expenses_are_scoped_to_their_date() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let monday = parse_date("2024-03-11");
    let tuesday = parse_date("2024-03-12");

    service
        .record_expense(monday, "Taxi".to_string(), 3000)
        .await?;
    service
        .record_expense(tuesday, "Courier".to_string(), 1500)
        .await?;

    assert_eq!(service.expense_total(monday).await?, 3000);
    assert_eq!(service.expense_total(tuesday).await?, 1500);
    assert_eq!(service.list_expenses(monday).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_void_appends_reversal_and_nets_to_zero() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let expense = service
        .record_expense(date, "Wrong amount".to_string(), 9999)
        .await?;
    let reversal = service.void_expense(expense.id).await?;

    assert_eq!(reversal.reverses, Some(expense.id));
    assert!(reversal.is_reversal());
    assert_eq!(service.expense_total(date).await?, 0);

    // Both entries stay in the ledger; nothing is deleted
    let expenses = service.list_expenses(date).await?;
    assert_eq!(expenses.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_void_twice_fails() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let expense = service
        .record_expense(date, "Taxi".to_string(), 3000)
        .await?;
    service.void_expense(expense.id).await?;

    let result = service.void_expense(expense.id).await;
    assert!(matches!(result, Err(AppError::ExpenseAlreadyVoided(_))));
    Ok(())
}

#[tokio::test]
async fn test_voiding_a_reversal_fails() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let expense = service
        .record_expense(date, "Taxi".to_string(), 3000)
        .await?;
    let reversal = service.void_expense(expense.id).await?;

    let result = service.void_expense(reversal.id).await;
    assert!(matches!(result, Err(AppError::CannotVoidReversal(_))));
    Ok(())
}

#[tokio::test]
async fn test_expense_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    let no_concept = service.record_expense(date, "  ".to_string(), 1000).await;
    assert!(matches!(no_concept, Err(AppError::MissingExpenseConcept)));

    let zero = service.record_expense(date, "Nothing".to_string(), 0).await;
    assert!(matches!(zero, Err(AppError::InvalidAmount(_))));

    let negative = service
        .record_expense(date, "Refund?".to_string(), -500)
        .await;
    assert!(matches!(negative, Err(AppError::InvalidAmount(_))));
    Ok(())
}

#[tokio::test]
async fn test_voided_expense_restores_expected_cash() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let date = parse_date("2024-03-11");

    common::ClinicDay::intake_regular(
        &service,
        date,
        arqueo::domain::PaymentChannel::Cash,
        10000,
    )
    .await?;
    let expense = service
        .record_expense(date, "Mistaken entry".to_string(), 4000)
        .await?;
    assert_eq!(service.expected_totals(date).await?.cash_cents, 6000);

    service.void_expense(expense.id).await?;
    assert_eq!(service.expected_totals(date).await?.cash_cents, 10000);
    Ok(())
}
