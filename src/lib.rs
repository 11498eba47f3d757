pub mod chat;
pub mod cli;
pub mod core;
pub mod poller;
pub mod providers;
pub mod rates;
pub mod registry;
pub mod scheduler;
pub mod store;

use crate::chat::{ChatService, CommandTable};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::AppConfig;
use crate::core::subscription::UserId;
use crate::poller::IngestPoller;
use crate::providers::{CoinGeckoProvider, TelegramNotifier};
use crate::rates::RateStore;
use crate::registry::SubscriptionRegistry;
use crate::scheduler::{DeliveryScheduler, SchedulerSettings};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Commands dispatched by the binary once the configuration is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Seed,
    Ingest,
    Rates { query: Option<String> },
    Currencies,
    Subscribe { user_id: UserId, interval_minutes: u32 },
    Unsubscribe { user_id: UserId },
    Chat { user_id: UserId, text: String },
    Run,
}

/// Shared services over one opened store.
pub struct App {
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub rates: Arc<RateStore>,
    pub registry: Arc<SubscriptionRegistry>,
}

impl App {
    pub fn open(config: AppConfig) -> Result<Self> {
        let store = store::open(&config)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(Self {
            rates: Arc::new(RateStore::new(store.clone(), clock.clone())),
            registry: Arc::new(SubscriptionRegistry::new(store)),
            clock,
            config,
        })
    }

    /// Writes the configured currencies into the store.
    pub fn seed(&self) -> Result<usize> {
        self.rates
            .seed(&self.config.currencies)
            .context("Failed to seed currencies")?;
        Ok(self.config.currencies.len())
    }

    pub fn poller(&self) -> Result<IngestPoller> {
        let feed = CoinGeckoProvider::new(self.config.coingecko_url())?;
        Ok(IngestPoller::new(
            Arc::new(feed),
            self.rates.clone(),
            self.clock.clone(),
            self.config.poller.interval(),
        ))
    }

    pub fn scheduler(&self) -> Result<DeliveryScheduler> {
        let token = self.config.telegram_token()?;
        let notifier = TelegramNotifier::new(self.config.telegram_url(), &token)?;
        Ok(DeliveryScheduler::new(
            self.rates.clone(),
            self.registry.clone(),
            Arc::new(notifier),
            self.clock.clone(),
            SchedulerSettings::from(&self.config.scheduler),
        ))
    }

    pub fn chat(&self) -> Result<ChatService> {
        let table = CommandTable::standard().context("Invalid command table")?;
        Ok(ChatService::new(
            self.rates.clone(),
            self.registry.clone(),
            table,
        ))
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let app = App::open(config)?;

    match command {
        AppCommand::Seed => {
            let count = app.seed()?;
            println!("Seeded {count} currencies");
        }
        AppCommand::Ingest => {
            let poller = app.poller()?;
            let pb = cli::ui::new_spinner("Fetching prices...");
            let result = poller.poll_once().await;
            pb.finish_and_clear();
            let count = result?;
            println!("Stored {count} prices");
        }
        AppCommand::Rates { query } => {
            cli::rates::display_rates(&app.rates, query.as_deref())?;
        }
        AppCommand::Currencies => {
            cli::rates::display_currencies(&app.rates.currencies()?);
        }
        AppCommand::Subscribe {
            user_id,
            interval_minutes,
        } => {
            let subscription = app.registry.subscribe(user_id, interval_minutes)?;
            cli::rates::display_subscription(&subscription);
        }
        AppCommand::Unsubscribe { user_id } => {
            app.registry.unsubscribe(user_id)?;
            match app.registry.get(user_id)? {
                Some(subscription) => cli::rates::display_subscription(&subscription),
                None => println!("User {user_id} has no subscription"),
            }
        }
        AppCommand::Chat { user_id, text } => {
            if let Some(reply) = app.chat()?.handle(user_id, &text) {
                println!("{reply}");
            }
        }
        AppCommand::Run => run_service(&app).await?,
    }
    Ok(())
}

/// Runs the poller and the delivery scheduler until Ctrl-C.
async fn run_service(app: &App) -> Result<()> {
    info!("cryptorate starting...");
    app.seed()?;
    let poller = app.poller()?;
    let scheduler = app.scheduler()?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
        }
        info!("Shutting down");
        let _ = stop_tx.send(true);
    };

    tokio::join!(poller.run(stop_rx.clone()), scheduler.run(stop_rx), stop);
    Ok(())
}
