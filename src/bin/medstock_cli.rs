use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use medstock_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    services::{allocation::AggregatedLotKey, AppServices},
};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "medstock-cli",
    about = "Maintenance commands for the MedStock inventory database"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every reconciliation check; exits with status 2 on critical findings
    HealthCheck {
        /// Override the configured stale-pending threshold
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=3650))]
        stale_days: Option<i64>,
    },
    /// Rebuild every product summary from the lots
    BackfillSummaries,
    /// Copy each product's team onto export lines that lack one
    BackfillExportTeams {
        #[arg(long, default_value_t = 500)]
        batch_size: u64,
    },
    /// Apply pending schema migrations
    Migrate,
    /// Preview the FEFO draws for a quantity without writing anything
    PlanExport {
        #[arg(long)]
        product: String,
        #[arg(long)]
        lot: Option<String>,
        #[arg(long)]
        quantity: i64,
    },
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;

        Ok(Self {
            config,
            db: Arc::new(db_pool),
        })
    }

    fn services(&self) -> AppServices {
        AppServices::new(
            self.db.clone(),
            self.config.summary_batch_size,
            self.config.stale_pending_days,
        )
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::HealthCheck { stale_days } => {
            let report = context
                .services()
                .reconciliation
                .run(stale_days)
                .await
                .context("health check failed to run")?;
            if cli.json {
                print_json(&report)?;
            } else {
                print!("{}", report.render_text());
            }
            if report.critical_count > 0 {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::BackfillSummaries => {
            let report = context
                .services()
                .summaries
                .backfill_all()
                .await
                .context("summary backfill failed")?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "{}: {} ({} summaries from {} lots in {} batches)",
                    report.status,
                    report.message,
                    report.summaries_written,
                    report.lots_scanned,
                    report.batches
                );
            }
        }
        Commands::BackfillExportTeams { batch_size } => {
            let report = context
                .services()
                .team_backfill
                .run(batch_size)
                .await
                .context("export team backfill failed")?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "Scanned {} export lines, updated {}, {} without a product",
                    report.lines_scanned, report.lines_updated, report.lines_without_product
                );
            }
        }
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::PlanExport {
            product,
            lot,
            quantity,
        } => {
            let key = AggregatedLotKey::new(&product, lot.as_deref());
            let plan = context
                .services()
                .allocation
                .plan(&key, quantity)
                .await
                .context("could not plan the export")?;
            if cli.json {
                print_json(&plan)?;
            } else {
                println!("{} x{}", product, plan.requested);
                for draw in &plan.draws {
                    println!(
                        "- lot {} ({}) expiring {}: {}",
                        draw.lot_id,
                        draw.lot_number,
                        draw
                            .expiry_date
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| "never".to_string()),
                        draw.quantity
                    );
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
