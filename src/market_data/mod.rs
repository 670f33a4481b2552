pub mod aggregator;
pub mod stream;

pub use aggregator::BarAggregator;
pub use stream::{AlpacaStream, MarketDataStream};
