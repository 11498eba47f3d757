use super::ui;
use crate::core::currency::Currency;
use crate::core::subscription::Subscription;
use crate::rates::RateStore;
use crate::scheduler::digest::RateSummary;
use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

/// Prints the latest price, day range and hourly change of every currency,
/// or of the one matching `query`.
pub fn display_rates(rates: &RateStore, query: Option<&str>) -> Result<()> {
    let currencies = match query {
        Some(query) => vec![
            rates
                .find_currency(query)
                .with_context(|| format!("No currency matches {query:?}"))?,
        ],
        None => rates.currencies()?,
    };

    let mut summaries = Vec::new();
    for currency in currencies {
        if let Some(summary) = RateSummary::load(rates, currency)? {
            summaries.push(summary);
        }
    }

    if summaries.is_empty() {
        println!(
            "{}",
            ui::style_text("No rates stored yet, run `cryptorate ingest` first", ui::StyleType::Subtle)
        );
        return Ok(());
    }

    println!("{}", ui::style_text("Latest rates", ui::StyleType::Title));
    println!("{}", rates_table(&summaries));
    Ok(())
}

pub fn rates_table(summaries: &[RateSummary]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell("Symbol"),
        ui::header_cell("Price"),
        ui::header_cell("Day min"),
        ui::header_cell("Day max"),
        ui::header_cell("1h"),
        ui::header_cell("Updated"),
    ]);

    for summary in summaries {
        table.add_row(vec![
            Cell::new(&summary.currency.display_name),
            Cell::new(&summary.currency.symbol),
            ui::price_cell(summary.latest.price),
            ui::format_optional_cell(summary.day_range.map(|(min, _)| min), |v| format!("${v:.2}")),
            ui::format_optional_cell(summary.day_range.map(|(_, max)| max), |v| format!("${v:.2}")),
            ui::change_cell(summary.hourly_change),
            Cell::new(summary.latest.observed_at.format("%Y-%m-%d %H:%M UTC")),
        ]);
    }
    table
}

pub fn display_currencies(currencies: &[Currency]) {
    if currencies.is_empty() {
        println!(
            "{}",
            ui::style_text("No currencies stored, run `cryptorate seed` first", ui::StyleType::Subtle)
        );
        return;
    }
    println!("{}", currencies_table(currencies));
}

pub fn currencies_table(currencies: &[Currency]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Name"),
        ui::header_cell("Display name"),
        ui::header_cell("Symbol"),
    ]);
    for currency in currencies {
        table.add_row(vec![
            Cell::new(currency.id),
            Cell::new(&currency.name),
            Cell::new(&currency.display_name),
            Cell::new(&currency.symbol),
        ]);
    }
    table
}

pub fn display_subscription(subscription: &Subscription) {
    let state = if subscription.is_active() {
        ui::style_text(
            &format!("every {} minutes", subscription.interval_minutes),
            ui::StyleType::Success,
        )
    } else {
        ui::style_text("off", ui::StyleType::Error)
    };
    let last_sent = subscription
        .last_sent_at
        .map_or("never".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string());
    println!("User {}: updates {}", subscription.user_id, state);
    println!(
        "{}",
        ui::style_text(&format!("Last digest: {last_sent}"), ui::StyleType::Subtle)
    );
}
