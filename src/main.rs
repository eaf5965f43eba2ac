//! # CartPilot — Scheduled Storefront Ordering Assistant
//!
//! Automates a recurring browser chore: opening a storefront, finding your
//! saved items, and adding them to the cart on schedule. Checkout stays
//! manual, and so does login — CartPilot only waits for it.
//!
//! Usage:
//!   cartpilot serve                      # Gateway + trigger engine
//!   cartpilot order --url ... --item ... # One-shot run
//!   cartpilot schedule list              # Show schedules
//!   cartpilot trigger <id>               # Fire a schedule now
//!   cartpilot snooze <id> --minutes 10   # Suppress refiring

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cartpilot_browser::engine::OrderRequest;
use cartpilot_browser::{AutomationEngine, AutomationError, DriverSelectors};
use cartpilot_core::CartPilotConfig;
use cartpilot_core::outcome::{ExecutionOutcome, TriggeredBy};
use cartpilot_gateway::AppState;
use cartpilot_scheduler::{
    FiredTrigger, HistoryDb, OrderTemplate, ScheduleDefinition, SchedulerEngine,
    spawn_scheduler_with_automation,
};

#[derive(Parser)]
#[command(
    name = "cartpilot",
    version,
    about = "🛒 CartPilot — fills your cart while you sleep"
)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway and the trigger engine
    Serve,
    /// Run one order immediately
    Order {
        /// Storefront URL
        #[arg(long)]
        url: String,
        /// Storefront display name
        #[arg(long, default_value = "")]
        name: String,
        /// Item to add (repeatable)
        #[arg(long = "item")]
        items: Vec<String>,
        /// Free-text instructions
        #[arg(long, default_value = "")]
        instructions: String,
        /// Run Chrome without a window
        #[arg(long)]
        headless: bool,
    },
    /// Manage order templates
    #[command(subcommand)]
    Template(TemplateCommand),
    /// Manage schedules
    #[command(subcommand)]
    Schedule(ScheduleCommand),
    /// Fire a schedule now, bypassing its timing
    Trigger { id: String },
    /// Suppress a schedule's refiring for a while
    Snooze {
        id: String,
        #[arg(long, default_value = "10")]
        minutes: i64,
    },
    /// Show recent run outcomes
    History,
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// Save a new order template
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "")]
        store: String,
        #[arg(long = "item")]
        items: Vec<String>,
    },
    /// List templates
    List,
}

#[derive(Subcommand)]
enum ScheduleCommand {
    /// Schedule a template once, at an RFC3339 instant
    Once {
        #[arg(long)]
        template: String,
        /// e.g. 2026-09-01T12:00:00Z
        #[arg(long)]
        at: String,
        /// Reminder lead time in minutes
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Start the run automatically on fire
        #[arg(long)]
        auto_open: bool,
    },
    /// Schedule a template weekly
    Weekly {
        #[arg(long)]
        template: String,
        /// Comma-separated weekdays, e.g. mon,wed,fri
        #[arg(long)]
        days: String,
        /// Time of day, e.g. 12:00
        #[arg(long)]
        time: String,
        #[arg(long, default_value = "0")]
        offset: i64,
        #[arg(long)]
        auto_open: bool,
    },
    /// List schedules
    List,
    /// Remove a schedule
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "cartpilot=debug,tower_http=debug"
    } else {
        "cartpilot=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = CartPilotConfig::load()?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Order {
            url,
            name,
            items,
            instructions,
            headless,
        } => {
            let request = OrderRequest {
                store_url: url,
                store_name: name,
                items,
                special_instructions: instructions,
                headless: headless || config.browser.headless,
                profile_dir: None,
                triggered_by: TriggeredBy::Manual,
            };
            run_once(&config, request).await
        }
        Command::Template(cmd) => template_command(&config, cmd),
        Command::Schedule(cmd) => schedule_command(&config, cmd),
        Command::Trigger { id } => {
            let mut engine = SchedulerEngine::with_defaults(&config.scheduler);
            match engine.trigger_now(&id) {
                Some(trigger) => {
                    println!("🔔 Fired '{}' → '{}'", id, trigger.template.name);
                    let request = request_from(&config, &trigger);
                    run_once(&config, request).await
                }
                None => bail!("Unknown schedule '{id}'"),
            }
        }
        Command::Snooze { id, minutes } => {
            // Snoozes live in the server process; talk to it over the gateway.
            let minutes = minutes.max(1);
            let url = format!(
                "http://{}:{}/api/v1/schedules/{}/snooze",
                config.gateway.host, config.gateway.port, id
            );
            let resp = reqwest::Client::new()
                .post(&url)
                .json(&serde_json::json!({ "minutes": minutes }))
                .send()
                .await
                .context("Could not reach the server — is `cartpilot serve` running?")?;
            if !resp.status().is_success() {
                bail!("Snooze failed: HTTP {}", resp.status());
            }
            println!("😴 Snoozed '{}' for {} minute(s)", id, minutes);
            Ok(())
        }
        Command::History => {
            let db = HistoryDb::open(&history_path())?;
            for o in db.recent(20)? {
                println!(
                    "{}  {:?}  {}/{}  {}",
                    o.timestamp.format("%Y-%m-%d %H:%M"),
                    o.status,
                    o.items_fulfilled,
                    o.items_requested,
                    o.message.unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

fn history_path() -> PathBuf {
    CartPilotConfig::home_dir().join("history.db")
}

fn load_selectors() -> DriverSelectors {
    // Optional per-site selector table at ~/.cartpilot/driver.toml.
    let path = CartPilotConfig::home_dir().join("driver.toml");
    if let Ok(content) = std::fs::read_to_string(&path) {
        match toml::from_str(&content) {
            Ok(selectors) => return selectors,
            Err(e) => tracing::warn!("⚠️ Ignoring bad driver.toml: {e}"),
        }
    }
    DriverSelectors::default()
}

fn request_from(config: &CartPilotConfig, trigger: &FiredTrigger) -> OrderRequest {
    OrderRequest {
        store_url: trigger.template.store_url.clone(),
        store_name: trigger.template.store_name.clone(),
        items: trigger.template.items.clone(),
        special_instructions: trigger.template.special_instructions.clone(),
        headless: config.browser.headless,
        profile_dir: None,
        triggered_by: TriggeredBy::Schedule,
    }
}

/// Execute one run and record its outcome.
async fn run_once(config: &CartPilotConfig, request: OrderRequest) -> Result<()> {
    let automation = AutomationEngine::new(config.browser.clone(), load_selectors());
    let db = HistoryDb::open(&history_path())?;
    let requested = request.items.len();
    let triggered_by = request.triggered_by;

    match automation.execute(request).await {
        Ok(outcome) => {
            db.record(&outcome)?;
            println!(
                "🛒 {:?}: {} of {} item(s) in the cart — review and check out in the open browser.",
                outcome.status, outcome.items_fulfilled, outcome.items_requested
            );
            Ok(())
        }
        Err(e) => {
            let outcome = ExecutionOutcome::session_failure(requested, triggered_by, e.to_string());
            db.record(&outcome)?;
            bail!("Order run failed: {e}")
        }
    }
}

/// Gateway + trigger engine, until the process exits.
async fn serve(config: CartPilotConfig) -> Result<()> {
    let scheduler = Arc::new(tokio::sync::Mutex::new(SchedulerEngine::with_defaults(
        &config.scheduler,
    )));
    let history = Arc::new(std::sync::Mutex::new(HistoryDb::open(&history_path())?));
    let automation = Arc::new(AutomationEngine::new(
        config.browser.clone(),
        load_selectors(),
    ));

    // The process just came up — catch up on anything recently missed.
    {
        let mut eng = scheduler.lock().await;
        let recovered = eng.recover_missed();
        for trigger in recovered {
            tracing::info!("⏪ Recovered missed trigger for '{}'", trigger.template.name);
        }
    }

    // Poll loop: fired auto_open triggers run as detached tasks. The
    // callback owns the audit decision — a rejected concurrent run records
    // nothing, a run that started and failed records a Failed row.
    {
        let scheduler = scheduler.clone();
        let history = history.clone();
        let automation = automation.clone();
        let cfg = config.clone();
        let interval = config.scheduler.poll_interval_secs;
        tokio::spawn(async move {
            spawn_scheduler_with_automation(
                scheduler,
                history,
                move |trigger: FiredTrigger| {
                    let automation = automation.clone();
                    let request = request_from(&cfg, &trigger);
                    async move {
                        let requested = request.items.len();
                        match automation.execute(request).await {
                            Ok(outcome) => Some(outcome),
                            Err(AutomationError::AlreadyRunning) => {
                                tracing::warn!(
                                    "⚠️ Skipping scheduled run — another one is in flight"
                                );
                                None
                            }
                            Err(e) => {
                                tracing::warn!("⚠️ Scheduled order run aborted: {}", e);
                                Some(ExecutionOutcome::session_failure(
                                    requested,
                                    TriggeredBy::Schedule,
                                    e.to_string(),
                                ))
                            }
                        }
                    }
                },
                interval,
            )
            .await;
        });
    }

    let state = AppState {
        gateway_config: config.gateway.clone(),
        browser_config: config.browser.clone(),
        scheduler,
        automation,
        history,
    };
    cartpilot_gateway::serve(state)
        .await
        .context("Gateway server failed")
}

fn template_command(config: &CartPilotConfig, cmd: TemplateCommand) -> Result<()> {
    let mut engine = SchedulerEngine::with_defaults(&config.scheduler);
    match cmd {
        TemplateCommand::Add {
            name,
            url,
            store,
            items,
        } => {
            let tmpl = OrderTemplate::new(&name, &url, &store, items);
            println!("📦 Template '{}' saved ({})", tmpl.name, tmpl.id);
            engine.add_template(tmpl);
        }
        TemplateCommand::List => {
            for t in engine.list_templates() {
                println!("{}  {}  {} item(s)  {}", t.id, t.name, t.items.len(), t.store_url);
            }
        }
    }
    Ok(())
}

fn schedule_command(config: &CartPilotConfig, cmd: ScheduleCommand) -> Result<()> {
    let mut engine = SchedulerEngine::with_defaults(&config.scheduler);
    match cmd {
        ScheduleCommand::Once {
            template,
            at,
            offset,
            auto_open,
        } => {
            let at: DateTime<Utc> = DateTime::parse_from_rfc3339(&at)
                .context("`--at` must be RFC3339, e.g. 2026-09-01T12:00:00Z")?
                .with_timezone(&Utc);
            let mut sched = ScheduleDefinition::once(&template, at, offset);
            sched.auto_open = auto_open;
            println!("📅 Schedule '{}' added (next: {:?})", sched.id, at - chrono::Duration::minutes(offset));
            engine.add_schedule(sched);
        }
        ScheduleCommand::Weekly {
            template,
            days,
            time,
            offset,
            auto_open,
        } => {
            let weekdays: Vec<Weekday> = days
                .split(',')
                .map(|d| Weekday::from_str(d.trim()).map_err(|_| anyhow::anyhow!("Bad weekday '{d}'")))
                .collect::<Result<_>>()?;
            let time = NaiveTime::parse_from_str(&time, "%H:%M")
                .context("`--time` must be HH:MM, e.g. 12:00")?;
            let mut sched = ScheduleDefinition::recurring(&template, weekdays, time, offset);
            sched.auto_open = auto_open;
            engine.add_schedule(sched);
            if let Some(added) = engine.list_schedules().last() {
                println!("📅 Schedule '{}' added (next: {:?})", added.id, added.next_trigger_at);
            }
        }
        ScheduleCommand::List => {
            for s in engine.list_schedules() {
                println!(
                    "{}  template={}  enabled={}  auto_open={}  next={:?}",
                    s.id, s.template_id, s.enabled, s.auto_open, s.next_trigger_at
                );
            }
        }
        ScheduleCommand::Remove { id } => {
            if engine.remove_schedule(&id) {
                println!("🗑️ Removed '{}'", id);
            } else {
                bail!("Unknown schedule '{id}'");
            }
        }
    }
    Ok(())
}
