//! Chat commands: maps user text onto rate queries and subscription changes

use crate::core::subscription::{MIN_INTERVAL_MINUTES, RegistryError, UserId};
use crate::rates::RateStore;
use crate::registry::SubscriptionRegistry;
use crate::scheduler::digest::RateSummary;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Rates,
    Currencies,
    StartAuto,
    StopAuto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    /// Optional currency symbol or name.
    Rates(Option<String>),
    Currencies,
    /// Raw interval argument, validated when handled.
    StartAuto(Option<String>),
    StopAuto,
    Unknown(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandTableError {
    #[error("invalid command name: {0:?}")]
    InvalidName(String),
    #[error("command already registered: {0}")]
    Duplicate(String),
}

#[derive(Debug, Default)]
pub struct CommandTable {
    commands: HashMap<String, CommandKind>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bot's command set.
    pub fn standard() -> Result<Self, CommandTableError> {
        let mut table = Self::new();
        table.register("start", CommandKind::Start)?;
        table.register("help", CommandKind::Start)?;
        table.register("rates", CommandKind::Rates)?;
        table.register("currencies", CommandKind::Currencies)?;
        table.register("startauto", CommandKind::StartAuto)?;
        table.register("stopauto", CommandKind::StopAuto)?;
        Ok(table)
    }

    /// Names must be lowercase ASCII letters, digits or `_`, and unique.
    pub fn register(&mut self, name: &str, kind: CommandKind) -> Result<(), CommandTableError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(CommandTableError::InvalidName(name.to_string()));
        }
        if self.commands.contains_key(name) {
            return Err(CommandTableError::Duplicate(name.to_string()));
        }
        self.commands.insert(name.to_string(), kind);
        Ok(())
    }

    /// Parses `/name[@bot] [args]`. Returns `None` for text that is not a
    /// command at all.
    pub fn parse(&self, text: &str) -> Option<Command> {
        let rest = text.trim().strip_prefix('/')?;
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let args = Some(args.trim().to_string()).filter(|a| !a.is_empty());

        let command = match self.commands.get(&name) {
            Some(CommandKind::Start) => Command::Start,
            Some(CommandKind::Rates) => Command::Rates(args),
            Some(CommandKind::Currencies) => Command::Currencies,
            Some(CommandKind::StartAuto) => Command::StartAuto(args),
            Some(CommandKind::StopAuto) => Command::StopAuto,
            None => Command::Unknown(name),
        };
        Some(command)
    }
}

const HELP: &str = "Hi! I track cryptocurrency rates.\n\n\
Commands:\n\
/rates - all rates\n\
/rates [currency] - rate of one currency\n\
/currencies - list of currencies\n\
/startauto [minutes] - automatic updates\n\
/stopauto - stop automatic updates";

const UNKNOWN: &str = "Unknown command. Use /start";

pub struct ChatService {
    rates: Arc<RateStore>,
    registry: Arc<SubscriptionRegistry>,
    table: CommandTable,
}

impl ChatService {
    pub fn new(
        rates: Arc<RateStore>,
        registry: Arc<SubscriptionRegistry>,
        table: CommandTable,
    ) -> Self {
        Self {
            rates,
            registry,
            table,
        }
    }

    /// Reply for one incoming message, `None` when there is nothing to say.
    pub fn handle(&self, user_id: UserId, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        let command = self
            .table
            .parse(text)
            .unwrap_or_else(|| Command::Unknown(String::new()));
        debug!(user_id, ?command, "Handling chat command");

        let reply = match command {
            Command::Start => HELP.to_string(),
            Command::Rates(None) => self.all_rates(),
            Command::Rates(Some(query)) => self.single_rate(&query),
            Command::Currencies => self.currency_list(),
            Command::StartAuto(arg) => self.start_auto(user_id, arg.as_deref()),
            Command::StopAuto => self.stop_auto(user_id),
            Command::Unknown(_) => UNKNOWN.to_string(),
        };
        Some(reply)
    }

    fn all_rates(&self) -> String {
        let rates = match self.rates.latest_all() {
            Ok(rates) => rates,
            Err(e) => {
                error!(error = %e, "Failed to load latest rates");
                return "Failed to load rates".to_string();
            }
        };
        if rates.is_empty() {
            return "No rates yet. Try again later.".to_string();
        }

        let mut text = String::from("📊 Latest rates:\n\n");
        for (currency, point) in rates {
            let _ = writeln!(
                text,
                "• {} ({}): ${:.2} ({})",
                currency.display_name,
                currency.symbol,
                point.price,
                point.observed_at.format("%H:%M")
            );
        }
        text
    }

    fn single_rate(&self, query: &str) -> String {
        let Ok(currency) = self.rates.find_currency(query) else {
            return "Currency not found. Use /currencies for the list".to_string();
        };
        match RateSummary::load(&self.rates, currency) {
            Ok(Some(summary)) => format!(
                "📊 {} ({})\n💵 Price: ${:.2}\n📈 Day: {}\n🕐 Hour: {}\n⏰ Updated: {}",
                summary.currency.display_name,
                summary.currency.symbol,
                summary.latest.price,
                summary.day_range_text(),
                summary.hourly_change,
                summary.latest.observed_at.format("%H:%M UTC"),
            ),
            Ok(None) => "No rates yet for this currency. Try again later.".to_string(),
            Err(e) => {
                error!(error = %e, "Failed to load rate summary");
                "Failed to load rate".to_string()
            }
        }
    }

    fn currency_list(&self) -> String {
        match self.rates.currencies() {
            Ok(currencies) => {
                let mut text = String::from("📋 Available currencies:\n\n");
                for currency in currencies {
                    let _ = writeln!(text, "• {} ({})", currency.display_name, currency.symbol);
                }
                text.push_str("\n💡 Use /rates [symbol] for a rate\nExample: /rates BTC or /rates bitcoin");
                text
            }
            Err(e) => {
                error!(error = %e, "Failed to list currencies");
                "Failed to load the currency list".to_string()
            }
        }
    }

    fn start_auto(&self, user_id: UserId, arg: Option<&str>) -> String {
        let Some(arg) = arg else {
            return "Specify the interval in minutes. Example: /startauto 10".to_string();
        };
        let interval = match arg.parse::<u32>() {
            Ok(interval) if interval > 0 => interval,
            _ => return "The interval must be a positive number of minutes".to_string(),
        };

        match self.registry.subscribe(user_id, interval) {
            Ok(_) => format!(
                "✅ Automatic updates on\n📩 Rates every {interval} minutes\n\n❌ Use /stopauto to turn them off"
            ),
            Err(RegistryError::InvalidInterval(_)) => {
                format!("The minimum interval is {MIN_INTERVAL_MINUTES} minutes")
            }
            Err(e) => {
                error!(user_id, error = %e, "Failed to subscribe");
                "Failed to set up automatic updates".to_string()
            }
        }
    }

    fn stop_auto(&self, user_id: UserId) -> String {
        match self.registry.unsubscribe(user_id) {
            Ok(()) => "✅ Automatic updates off".to_string(),
            Err(e) => {
                error!(user_id, error = %e, "Failed to unsubscribe");
                "Failed to turn off automatic updates".to_string()
            }
        }
    }
}
