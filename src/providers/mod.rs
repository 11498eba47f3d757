pub mod coingecko;
pub mod telegram;
pub mod util;

pub use coingecko::CoinGeckoProvider;
pub use telegram::TelegramNotifier;
