use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use recurbot::config::Settings;
use recurbot::execution::Orchestrator;
use recurbot::ledger::SheetsLedger;
use recurbot::models::{BatchRequest, Frequency};
use recurbot::notify::{DiscordWebhook, Notifier};
use recurbot::schedule::{DailyTrigger, TradingCalendar};
use recurbot::service::Supervisor;
use recurbot::BrokerClient;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "recurbot")]
#[command(about = "Scheduled recurring share purchases", long_about = None)]
struct Cli {
    /// Settings file (defaults to ./recurbot.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler, health checks, heartbeats and status API
    Serve,
    /// Run one batch now and exit
    Execute {
        /// Apply the calendar instead of running every order
        #[arg(long)]
        scheduled: bool,
        /// Only run orders with this frequency
        #[arg(long)]
        frequency: Option<Frequency>,
    },
    /// Print the valid orders in the ledger
    Orders,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let orchestrator = Arc::new(build_orchestrator(&settings)?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!("🚀 Recurring orders service starting");
            log_configuration(&settings);
            let supervisor = Arc::new(Supervisor::new(orchestrator, &settings.schedule));
            supervisor.run(&settings.server.bind).await?;
        }
        Command::Execute {
            scheduled,
            frequency,
        } => {
            let mut request = if scheduled {
                BatchRequest::scheduled()
            } else {
                BatchRequest::manual()
            };
            if let Some(frequency) = frequency {
                request = request.with_frequency(frequency);
            }

            let supervisor = Supervisor::new(orchestrator, &settings.schedule);
            let result = supervisor.run_batch_now(request).await?;

            println!(
                "Executed {} of {} orders: {} succeeded, {} failed",
                result.executed(),
                result.considered,
                result.succeeded(),
                result.failed()
            );
            for detail in &result.details {
                println!("  {}", recurbot::ledger::format_log_line(detail));
            }
            if let Some(error) = result.ledger_error {
                anyhow::bail!("Ledger unavailable: {}", error);
            }
        }
        Command::Orders => {
            let orders = orchestrator
                .read_orders()
                .await
                .context("Failed to read order ledger")?;
            let now = Utc::now();
            let calendar = orchestrator.calendar();

            println!("{:<5} {:<8} {:>6} {:<10} DUE TODAY", "ROW", "SYMBOL", "QTY", "FREQUENCY");
            for order in &orders {
                println!(
                    "{:<5} {:<8} {:>6} {:<10} {}",
                    order.row,
                    order.symbol,
                    order.quantity,
                    order.frequency.to_string(),
                    if calendar.is_due_today(&order.frequency, now) { "yes" } else { "no" }
                );
            }
            println!("{} valid active orders", orders.len());
        }
    }

    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("recurbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_orchestrator(settings: &Settings) -> anyhow::Result<Orchestrator> {
    let schedule = &settings.schedule;
    let tz = schedule.timezone()?;
    let calendar = TradingCalendar::new(tz, schedule.week_start()?);
    let trigger = DailyTrigger::new(
        schedule.daily_hour,
        schedule.daily_minute,
        tz,
        schedule.misfire_grace(),
    );

    let broker = BrokerClient::new(&settings.broker).context("Failed to create broker client")?;
    let ledger = SheetsLedger::new(&settings.ledger).context("Failed to create ledger client")?;
    let webhook = DiscordWebhook::new(settings.notifications.webhook_url.clone())
        .context("Failed to create webhook client")?;
    let notifier = Notifier::new(
        Arc::new(webhook),
        calendar,
        settings.notifications.username.clone(),
        settings.notifications.display_limit,
    );

    Ok(Orchestrator::new(
        Arc::new(broker),
        Arc::new(ledger),
        settings.ledger.headers.clone(),
        notifier,
        calendar,
        trigger,
        schedule.inter_order_delay(),
    ))
}

fn log_configuration(settings: &Settings) {
    let s = &settings.schedule;
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Broker: {}", settings.broker.base_url);
    tracing::info!("  Ledger: {} / {}", settings.ledger.spreadsheet_id, settings.ledger.sheet_name);
    tracing::info!(
        "  Daily batch: {:02}:{:02} {} (grace {}s)",
        s.daily_hour,
        s.daily_minute,
        s.timezone,
        s.misfire_grace_secs
    );
    tracing::info!("  Weekly orders run on: {}", s.week_start);
    tracing::info!("  Health check every {}s, heartbeat every {}s", s.health_interval_secs, s.heartbeat_interval_secs);
}
