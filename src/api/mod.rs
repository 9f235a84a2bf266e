pub mod alpha_vantage;
pub mod synthetic;
pub mod yahoo;

pub use alpha_vantage::AlphaVantageClient;
pub use synthetic::SyntheticQuotes;
pub use yahoo::YahooFinanceClient;
