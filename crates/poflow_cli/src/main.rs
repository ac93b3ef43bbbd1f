use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use poflow_cli::api::{AppState, router};
use poflow_cli::logging::init_tracing;
use poflow_import::report::{save_errors, save_row_log};
use poflow_import::source::read_path;
use poflow_import::{
    ApplyObserver, ImportError, ImportOptions, ImportResult, Importer, PlanAction, RowAction,
    RowLogEntry,
};
use poflow_model::{OrderId, OrderStatus};
use poflow_runtime::{
    DeliveryLedger, DeliveryOutcome, OrderEdit, OrderService, OrderStore, RuntimeContext, RuntimeError, StoreError,
    init_store,
};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "poflow")]
#[command(about = "Purchase-order follow-up: spreadsheet imports, deliveries and edits")]
#[command(version)]
struct Cli {
    /// `sqlite://path/to/file.db`, `sqlite::memory:` or `memory`
    #[arg(long, env = "POFLOW_DATABASE_URL", default_value = "sqlite://poflow.db", global = true)]
    database_url: String,
    #[arg(long, env = "POFLOW_TENANT", default_value = "default", global = true)]
    tenant: String,
    #[arg(long, env = "POFLOW_ACTOR", default_value = "cli", global = true)]
    actor: String,
    #[arg(long, env = "POFLOW_ACTOR_EMAIL", global = true)]
    actor_email: Option<String>,
    #[arg(long, env = "POFLOW_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ImportArgs {
    /// CSV, XLSX, XLS or ODS file
    file: PathBuf,
    /// On existing orders, only update status, dates, quantity, total, department and supplier
    #[arg(long)]
    conservative: bool,
    /// Leave orders whose key already exists untouched
    #[arg(long)]
    skip_existing: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a spreadsheet into the order base
    Import {
        #[command(flatten)]
        args: ImportArgs,
        /// Write the per-row log as CSV
        #[arg(long)]
        log_csv: Option<PathBuf>,
        /// Write row errors (validation or apply) as CSV
        #[arg(long)]
        errors_csv: Option<PathBuf>,
        #[arg(long, default_value = "50")]
        progress_every: usize,
    },
    /// Show what an import would do, without writing
    Preview {
        #[command(flatten)]
        args: ImportArgs,
    },
    /// Register a partial delivery
    Deliver {
        id: String,
        quantity: Decimal,
        /// Delivery date (YYYY-MM-DD); today when absent
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Edit fields of an order
    Edit {
        id: String,
        #[arg(long)]
        requisition: Option<String>,
        #[arg(long)]
        po: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        quantity: Option<Decimal>,
        /// Code or spreadsheet label, e.g. `InTransit` or `Em Transporte`
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        expected_delivery: Option<NaiveDate>,
        #[arg(long)]
        value_total: Option<Decimal>,
        #[arg(long)]
        expected_version: Option<i64>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Print an order with its audit trail and deliveries
    Show { id: String },
    /// List the tenant's orders
    Orders,
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value = "3000")]
        port: u16,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("{0}")]
    Usage(String),
    #[error("report not written: {0}")]
    Report(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Reports progress on stderr.
struct ConsoleProgress;

impl ApplyObserver for ConsoleProgress {
    fn on_row(&self, entry: &RowLogEntry) {
        if matches!(entry.action, RowAction::Rejected | RowAction::Error) {
            eprintln!("  line {}: {}", entry.line, entry.message);
        }
    }

    fn on_progress(&self, done: usize, total: usize) {
        eprintln!("  {}/{} rows", done, total);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if let CliError::Import(ImportError::Validation(report)) = &e {
                for row in &report.errors {
                    eprintln!("  line {}: {}", row.line, row.message);
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let store = init_store(&cli.database_url, None).await?;
    let mut ctx = RuntimeContext::new(cli.tenant.as_str(), cli.actor.as_str());
    if let Some(email) = &cli.actor_email {
        ctx = ctx.with_email(email.as_str());
    }

    match cli.command {
        Commands::Import {
            args,
            log_csv,
            errors_csv,
            progress_every,
        } => {
            let options = ImportOptions {
                conservative: args.conservative,
                skip_existing: args.skip_existing,
                progress_every,
            };
            import(store, &ctx, &args, options, log_csv, errors_csv).await
        }
        Commands::Preview { args } => preview(store, &ctx, &args).await,
        Commands::Deliver {
            id,
            quantity,
            date,
            note,
        } => {
            let ledger = DeliveryLedger::new(store);
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let result = ledger
                .register_delivery(&ctx, &OrderId::from(id), quantity, date, note.as_deref())
                .await;
            let outcome = DeliveryOutcome::from(&result);
            let receipt = result?;
            println!("{}", outcome.message);
            for warning in &receipt.warnings {
                println!("  warning: {}", warning);
            }
            Ok(())
        }
        Commands::Edit {
            id,
            requisition,
            po,
            description,
            department,
            quantity,
            status,
            expected_delivery,
            value_total,
            expected_version,
            reason,
        } => {
            let status = status
                .map(|raw| OrderStatus::parse(&raw).ok_or_else(|| CliError::Usage(format!("unknown status '{}'", raw))))
                .transpose()?;
            let edit = OrderEdit {
                requisition_number: requisition,
                purchase_order_number: po,
                description,
                department,
                quantity_requested: quantity,
                status,
                expected_delivery_date: expected_delivery,
                value_total,
                expected_version,
                reason,
                ..Default::default()
            };
            let order = OrderService::new(store)
                .edit_order(&ctx, &OrderId::from(id), &edit)
                .await?;
            println!("order {} now at version {} ({})", order.id, order.version, order.fields.status);
            Ok(())
        }
        Commands::Show { id } => {
            let service = OrderService::new(store);
            let id = OrderId::from(id);
            let order = service.get_order(&ctx, &id).await?;
            let audit = service.audit_trail(&ctx, &id).await?;
            let deliveries = service.delivery_history(&ctx, &id).await?;
            let report = serde_json::json!({
                "order": order,
                "audit": audit,
                "deliveries": deliveries,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Orders => {
            let orders = OrderService::new(store).list_orders(&ctx).await?;
            for order in &orders {
                println!(
                    "{}\t{}\t{}\t{}/{}\t{}",
                    order.id,
                    order.fields.business_key().unwrap_or("-"),
                    order.fields.status,
                    order.fields.quantity_delivered.normalize(),
                    order.fields.quantity_requested.normalize(),
                    order.fields.description
                );
            }
            eprintln!("{} order(s)", orders.len());
            Ok(())
        }
        Commands::Serve { host, port } => {
            let app = router(AppState::new(store));
            let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
            info!(host = %host, port, "serving HTTP API");
            axum::serve(listener, app).await?;
            Ok(())
        }
    }
}

async fn import(
    store: Arc<dyn OrderStore>,
    ctx: &RuntimeContext,
    args: &ImportArgs,
    options: ImportOptions,
    log_csv: Option<PathBuf>,
    errors_csv: Option<PathBuf>,
) -> Result<(), CliError> {
    let batch = read_path(&args.file).map_err(ImportError::from)?;
    let importer = Importer::new(store, options);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current row");
            on_interrupt.cancel();
        }
    });

    let result = match importer.run(ctx, &batch, &ConsoleProgress, &cancel).await {
        Err(ImportError::Validation(report)) => {
            if let Some(path) = &errors_csv {
                save_errors(path, &report.errors).map_err(|e| CliError::Report(e.to_string()))?;
            }
            return Err(ImportError::Validation(report).into());
        }
        other => other?,
    };

    print_summary(&result);
    if let Some(path) = &log_csv {
        save_row_log(path, &result.log).map_err(|e| CliError::Report(e.to_string()))?;
    }
    if let Some(path) = &errors_csv {
        save_errors(path, &result.row_errors).map_err(|e| CliError::Report(e.to_string()))?;
    }
    Ok(())
}

fn print_summary(result: &ImportResult) {
    println!("processed:          {}", result.processed);
    println!("inserted:           {}", result.inserted);
    println!("updated:            {} ({} unchanged)", result.updated, result.unchanged);
    println!("value changed:      {}", result.value_changed);
    println!("rejected:           {}", result.rejected);
    println!("errors:             {}", result.errors);
    println!("skipped duplicate:  {}", result.skipped_duplicate);
    println!("skipped superseded: {}", result.skipped_superseded);
    for warning in &result.warnings {
        println!("  warning line {}: {}", warning.line, warning.message);
    }
    if result.cancelled {
        println!("import cancelled before the last row");
    }
}

async fn preview(store: Arc<dyn OrderStore>, ctx: &RuntimeContext, args: &ImportArgs) -> Result<(), CliError> {
    let batch = read_path(&args.file).map_err(ImportError::from)?;
    let options = ImportOptions {
        conservative: args.conservative,
        skip_existing: args.skip_existing,
        ..Default::default()
    };
    let plan = Importer::new(store, options).preview(ctx, &batch).await?;

    for planned in &plan.rows {
        let key = planned.row.key().unwrap_or("-");
        let action = match &planned.action {
            PlanAction::Insert => "insert".to_string(),
            PlanAction::Update { id, value_will_change, .. } if *value_will_change => {
                format!("update {} (value changes)", id)
            }
            PlanAction::Update { id, .. } => format!("update {}", id),
            PlanAction::Skip { detail, .. } => format!("skip: {}", detail),
        };
        println!("line {}\t{}\t{}", planned.row.line, key, action);
    }
    println!(
        "{} to insert, {} to update ({} with value change), {} to skip",
        plan.summary.to_insert, plan.summary.to_update, plan.summary.value_will_change, plan.summary.to_skip
    );
    Ok(())
}
