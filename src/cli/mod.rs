use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{DaySummary, RegisterService, SettlementReport};
use crate::domain::{
    format_cents, parse_cents, Cents, Consultation, CountedDraft, PaymentChannel, ServiceCategory,
};

/// Arqueo - Clinic Register & Daily Settlement
#[derive(Parser)]
#[command(name = "arqueo")]
#[command(about = "A clinic register and daily cash-settlement ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "arqueo.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Register a consultation at intake
    Intake {
        /// Payment channel: cash, card, cash_invoiced, transfer
        #[arg(short = 'c', long)]
        channel: String,

        /// Service category: regular, mobile
        #[arg(long, default_value = "regular")]
        category: String,

        /// Line items as "description=amount" (repeatable)
        #[arg(short, long = "item")]
        items: Vec<String>,

        /// Date of the consultation (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Line item management commands
    #[command(subcommand)]
    Item(ItemCommands),

    /// Attach an adjunct fee to a mobile consultation
    Fee {
        /// Consultation ID
        consultation: String,

        /// Fee name (e.g. "travel surcharge")
        name: String,

        /// Fee amount (e.g. "25.00")
        amount: String,
    },

    /// Cancel a consultation and close the sequence gap it leaves
    Cancel {
        /// Consultation ID
        id: String,

        /// Reason for the cancellation
        #[arg(short, long)]
        reason: String,

        /// User performing the cancellation
        #[arg(long)]
        by: String,
    },

    /// List a date's consultations
    Consultations {
        /// Date (YYYY-MM-DD, defaults to today)
        date: Option<String>,

        /// Include cancelled consultations
        #[arg(long)]
        all: bool,
    },

    /// Expense ledger commands
    #[command(subcommand)]
    Expense(ExpenseCommands),

    /// Show the day summary: revenue breakdowns and expected register amounts
    Report {
        /// Date (YYYY-MM-DD, defaults to today)
        date: Option<String>,
    },

    /// Close the register: reconcile counted against expected and settle the day
    Close {
        /// Counted cash (e.g. "110.00")
        #[arg(long)]
        cash: String,

        /// Counted card total
        #[arg(long)]
        card: String,

        /// Counted deposit total (invoiced cash + transfers)
        #[arg(long)]
        deposit: String,

        /// Closing user
        #[arg(long)]
        by: String,

        /// Free-text observations (e.g. explaining a discrepancy)
        #[arg(short, long)]
        observations: Option<String>,

        /// Date to close (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Show the settlement report for a closed date
    Show {
        /// Date (YYYY-MM-DD, defaults to today)
        date: Option<String>,
    },

    /// Repair a date's sequence numbering (reassign 1..N by intake order)
    Renumber {
        /// Date (YYYY-MM-DD)
        date: String,
    },

    /// Verify ledger integrity
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: settlement, consultations, expenses, day
        export_type: String,

        /// Date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ItemCommands {
    /// Add a line item to a consultation
    Add {
        /// Consultation ID
        consultation: String,

        /// Item description
        description: String,

        /// Item amount (e.g. "100.00")
        amount: String,
    },

    /// Remove a line item from a consultation
    Remove {
        /// Consultation ID
        consultation: String,

        /// Line item ID
        item: String,
    },
}

#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// Record an operating expense
    Add {
        /// What the money was spent on
        concept: String,

        /// Expense amount (e.g. "20.00")
        amount: String,

        /// Date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Void an expense by appending a reversal entry
    Void {
        /// Expense ID
        id: String,
    },

    /// List a date's expense entries
    List {
        /// Date (YYYY-MM-DD, defaults to today)
        date: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        init_tracing(self.verbose);

        match self.command {
            Commands::Init => {
                RegisterService::init(&self.database).await?;
                println!("Initialized database: {}", self.database);
            }

            Commands::Intake {
                channel,
                category,
                items,
                date,
            } => {
                let service = RegisterService::connect(&self.database).await?;
                let channel = parse_channel(&channel)?;
                let category = parse_category(&category)?;
                let date = resolve_date(date.as_deref())?;
                let line_items = items
                    .iter()
                    .map(|spec| parse_line_item(spec))
                    .collect::<Result<Vec<_>>>()?;

                let consultation = service
                    .register_consultation(date, category, channel, line_items)
                    .await?;
                print_consultation(&consultation);
            }

            Commands::Item(cmd) => {
                let service = RegisterService::connect(&self.database).await?;
                run_item_command(&service, cmd).await?;
            }

            Commands::Fee {
                consultation,
                name,
                amount,
            } => {
                let service = RegisterService::connect(&self.database).await?;
                let id = parse_id(&consultation)?;
                let amount_cents = parse_amount(&amount)?;
                let updated = service.add_adjunct_fee(id, name, amount_cents).await?;
                print_consultation(&updated);
            }

            Commands::Cancel { id, reason, by } => {
                let service = RegisterService::connect(&self.database).await?;
                let id = parse_id(&id)?;
                let cancelled = service.cancel_consultation(id, reason, by).await?;
                println!("Cancelled consultation {}", cancelled.id);
            }

            Commands::Consultations { date, all } => {
                let service = RegisterService::connect(&self.database).await?;
                let date = resolve_date(date.as_deref())?;
                let consultations = service.list_consultations(date, all).await?;

                if consultations.is_empty() {
                    println!("No consultations on {}.", date);
                } else {
                    println!(
                        "{:<5} {:<36} {:<8} {:<14} {:>10} {:<10}",
                        "SEQ", "ID", "CATEGORY", "CHANNEL", "TOTAL", "STATUS"
                    );
                    println!("{}", "-".repeat(88));
                    for c in consultations {
                        let seq = c
                            .sequence()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "-".to_string());
                        let status = if c.is_cancelled() { "cancelled" } else { "active" };
                        println!(
                            "{:<5} {:<36} {:<8} {:<14} {:>10} {:<10}",
                            seq,
                            c.id,
                            c.category,
                            c.channel,
                            format_cents(c.total_cents),
                            status
                        );
                    }
                }
            }

            Commands::Expense(cmd) => {
                let service = RegisterService::connect(&self.database).await?;
                run_expense_command(&service, cmd).await?;
            }

            Commands::Report { date } => {
                let service = RegisterService::connect(&self.database).await?;
                let date = resolve_date(date.as_deref())?;
                let summary = service.day_summary(date).await?;
                print_day_summary(&summary);
            }

            Commands::Close {
                cash,
                card,
                deposit,
                by,
                observations,
                date,
            } => {
                let service = RegisterService::connect(&self.database).await?;
                let date = resolve_date(date.as_deref())?;
                let counted = CountedDraft {
                    cash_cents: Some(parse_amount(&cash)?),
                    card_cents: Some(parse_amount(&card)?),
                    deposit_cents: Some(parse_amount(&deposit)?),
                };

                let report = service.close_register(date, counted, observations, by).await?;
                print_settlement_report(&report);
            }

            Commands::Show { date } => {
                let service = RegisterService::connect(&self.database).await?;
                let date = resolve_date(date.as_deref())?;
                let report = service.settlement_report(date).await?;
                print_settlement_report(&report);
            }

            Commands::Renumber { date } => {
                let service = RegisterService::connect(&self.database).await?;
                let date = parse_date(&date)?;
                let count = service.renumber_day(date).await?;
                println!("Renumbered {} consultations on {}", count, date);
            }

            Commands::Check => {
                let service = RegisterService::connect(&self.database).await?;
                let report = service.check_integrity().await?;

                println!("Consultations: {}", report.consultation_count);
                println!("Expenses:      {}", report.expense_count);
                if report.zero_total_consultations > 0 {
                    println!(
                        "Zero-total consultations: {} (counted in reconciliation)",
                        report.zero_total_consultations
                    );
                }

                if report.is_clean() {
                    println!("Integrity check passed.");
                } else {
                    for (date, defect) in &report.sequence_defects {
                        println!("DEFECT {}: {}", date, defect);
                    }
                    for id in &report.total_mismatches {
                        println!("DEFECT consultation {}: stored total disagrees with items", id);
                    }
                    anyhow::bail!("Integrity check failed");
                }
            }

            Commands::Export {
                export_type,
                date,
                output,
            } => {
                let service = RegisterService::connect(&self.database).await?;
                let date = resolve_date(date.as_deref())?;
                run_export_command(&service, &export_type, date, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_item_command(service: &RegisterService, cmd: ItemCommands) -> Result<()> {
    match cmd {
        ItemCommands::Add {
            consultation,
            description,
            amount,
        } => {
            let id = parse_id(&consultation)?;
            let amount_cents = parse_amount(&amount)?;
            let updated = service.add_line_item(id, description, amount_cents).await?;
            print_consultation(&updated);
        }

        ItemCommands::Remove { consultation, item } => {
            let id = parse_id(&consultation)?;
            let item_id = parse_id(&item)?;
            let updated = service.remove_line_item(id, item_id).await?;
            print_consultation(&updated);
        }
    }
    Ok(())
}

async fn run_expense_command(service: &RegisterService, cmd: ExpenseCommands) -> Result<()> {
    match cmd {
        ExpenseCommands::Add {
            concept,
            amount,
            date,
        } => {
            let date = resolve_date(date.as_deref())?;
            let amount_cents = parse_amount(&amount)?;
            let expense = service.record_expense(date, concept, amount_cents).await?;
            println!(
                "Recorded expense {} ({}): Q{}",
                expense.id,
                expense.concept,
                format_cents(expense.amount_cents)
            );
        }

        ExpenseCommands::Void { id } => {
            let id = parse_id(&id)?;
            let reversal = service.void_expense(id).await?;
            println!("Voided expense {} (reversal {})", id, reversal.id);
        }

        ExpenseCommands::List { date } => {
            let date = resolve_date(date.as_deref())?;
            let expenses = service.list_expenses(date).await?;
            let total = service.expense_total(date).await?;

            if expenses.is_empty() {
                println!("No expenses on {}.", date);
            } else {
                println!("{:<36} {:<30} {:>10}", "ID", "CONCEPT", "AMOUNT");
                println!("{}", "-".repeat(78));
                for e in &expenses {
                    let sign = if e.is_reversal() { "-" } else { "" };
                    println!(
                        "{:<36} {:<30} {:>10}",
                        e.id,
                        e.concept,
                        format!("{}{}", sign, format_cents(e.amount_cents))
                    );
                }
                println!("{}", "-".repeat(78));
                println!("{:<67} {:>10}", "Net total", format_cents(total));
            }
        }
    }
    Ok(())
}

async fn run_export_command(
    service: &RegisterService,
    export_type: &str,
    date: NaiveDate,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    // Determine output writer
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "settlement" => {
            let count = exporter.export_settlement_csv(date, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} settlement channels", count);
            }
        }
        "consultations" => {
            let count = exporter.export_consultations_csv(date, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} consultations", count);
            }
        }
        "expenses" => {
            let count = exporter.export_expenses_csv(date, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} expense entries", count);
            }
        }
        "day" => {
            let snapshot = exporter.export_day_json(date, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported {}: {} consultations, {} expenses, settlement {}",
                    snapshot.date,
                    snapshot.consultations.len(),
                    snapshot.expenses.len(),
                    if snapshot.settlement.is_some() {
                        "closed"
                    } else {
                        "open"
                    }
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: settlement, consultations, expenses, day",
                export_type
            );
        }
    }

    Ok(())
}

// ========================
// Parsing helpers
// ========================

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD)", date_str))
}

fn resolve_date(date_str: Option<&str>) -> Result<NaiveDate> {
    match date_str {
        Some(s) => parse_date(s),
        None => Ok(Utc::now().date_naive()),
    }
}

fn parse_id(id_str: &str) -> Result<Uuid> {
    Uuid::parse_str(id_str).with_context(|| format!("Invalid ID '{}'", id_str))
}

fn parse_amount(amount_str: &str) -> Result<Cents> {
    parse_cents(amount_str).with_context(|| format!("Invalid amount '{}'", amount_str))
}

fn parse_channel(channel_str: &str) -> Result<PaymentChannel> {
    PaymentChannel::from_str(channel_str).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid channel '{}'. Valid channels: cash, card, cash_invoiced, transfer",
            channel_str
        )
    })
}

fn parse_category(category_str: &str) -> Result<ServiceCategory> {
    ServiceCategory::from_str(category_str).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid category '{}'. Valid categories: regular, mobile",
            category_str
        )
    })
}

/// Parse a line item spec of the form "description=amount".
fn parse_line_item(spec: &str) -> Result<(String, Cents)> {
    let (description, amount) = spec
        .rsplit_once('=')
        .ok_or_else(|| anyhow::anyhow!("Invalid item '{}' (expected description=amount)", spec))?;
    Ok((description.trim().to_string(), parse_amount(amount)?))
}

// ========================
// Output helpers
// ========================

fn print_consultation(c: &Consultation) {
    println!("Consultation: {}", c.id);
    println!("  Date:     {}", c.date);
    println!("  Category: {}", c.category);
    println!("  Channel:  {}", c.channel);
    match c.sequence() {
        Some(seq) => println!("  Sequence: {}", seq),
        None => println!("  Sequence: -"),
    }
    if !c.line_items.is_empty() {
        println!("  Items:");
        for item in &c.line_items {
            println!(
                "    {}  {:<30} {:>10}",
                item.id,
                item.description,
                format_cents(item.amount_cents)
            );
        }
    }
    if !c.adjunct_fees.is_empty() {
        println!("  Adjunct fees:");
        for fee in &c.adjunct_fees {
            println!("    {:<30} {:>10}", fee.name, format_cents(fee.amount_cents));
        }
    }
    println!("  Total:    Q{}", format_cents(c.total_cents));
}

fn print_day_summary(summary: &DaySummary) {
    println!("Day summary for {}", summary.date);
    println!();

    for section in [&summary.regular, &summary.mobile] {
        println!(
            "{} ({} patients, Q{})",
            section.category,
            section.patient_count,
            format_cents(section.total_cents)
        );
        for channel in &section.channels {
            if channel.count > 0 {
                println!(
                    "  {:<14} {:>4} {:>12}",
                    channel.channel.to_string(),
                    channel.count,
                    format_cents(channel.total_cents)
                );
            }
        }
        println!();
    }

    println!("Expenses (net): Q{}", format_cents(summary.expense_total_cents));
    println!();
    println!("Expected at close:");
    println!("  {:<10} {:>12}", "cash", format_cents(summary.expected_cash_cents));
    println!("  {:<10} {:>12}", "card", format_cents(summary.expected_card_cents));
    println!("  {:<10} {:>12}", "deposit", format_cents(summary.expected_deposit_cents));
    println!();
    println!("State: {:?}", summary.state);
}

fn print_settlement_report(report: &SettlementReport) {
    println!("Settlement for {}", report.date);
    println!(
        "{:<10} {:>12} {:>12} {:>12} {:<10}",
        "CHANNEL", "EXPECTED", "COUNTED", "DIFFERENCE", "STATUS"
    );
    println!("{}", "-".repeat(60));
    for channel in &report.reconciliation.channels {
        println!(
            "{:<10} {:>12} {:>12} {:>12} {:<10}",
            channel.channel.to_string(),
            format_cents(channel.expected_cents),
            format_cents(channel.counted_cents),
            format_cents(channel.difference_cents),
            channel.status.to_string()
        );
    }
    println!("{}", "-".repeat(60));
    println!("Overall status: {}", report.status);
    println!();
    println!(
        "Regular: {} patients, Q{}",
        report.regular.patient_count,
        format_cents(report.regular.total_cents)
    );
    println!(
        "Mobile:  {} patients, Q{} (reported separately)",
        report.mobile.patient_count,
        format_cents(report.mobile.total_cents)
    );
    println!("Expenses (net): Q{}", format_cents(report.expense_total_cents));
    if let Some(obs) = &report.observations {
        println!("Observations: {}", obs);
    }
    println!(
        "Closed by {} at {}",
        report.closed_by,
        report.closed_at.format("%Y-%m-%d %H:%M:%S")
    );
}
