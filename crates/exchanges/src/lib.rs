pub mod binance;
pub mod bitget;
pub mod bybit;
pub mod candle_builder;
pub mod driver;
pub mod gate;
pub mod hyperliquid;
pub mod pool;
pub mod rate_limiter;
pub mod registry;
pub mod symbol_utils;
pub mod types;
pub mod utils;

pub use candle_builder::CandleBuilder;
pub use driver::ExchangeDriver;
pub use pool::{ConnectionPool, ConnectionState, PoolStatistics};
pub use rate_limiter::RateLimiter;
pub use registry::{RegistryError, SymbolRegistry};
pub use types::{Candle, CandleKey, Exchange, Market, StreamEvent, Symbol, Trade};

/// One boxed driver per `(exchange, market)` pair this process ingests.
#[must_use]
pub fn driver_for(exchange: Exchange, market: Market) -> Box<dyn ExchangeDriver> {
	match (exchange, market) {
		(Exchange::Binance, Market::Spot) => Box::new(binance::BinanceDriver::spot()),
		(Exchange::Binance, Market::Linear) => Box::new(binance::BinanceDriver::linear()),
		(Exchange::Bybit, Market::Spot) => Box::new(bybit::BybitDriver::spot()),
		(Exchange::Bybit, Market::Linear) => Box::new(bybit::BybitDriver::linear()),
		(Exchange::Bitget, Market::Spot) => Box::new(bitget::BitgetDriver::spot()),
		(Exchange::Bitget, Market::Linear) => Box::new(bitget::BitgetDriver::linear()),
		(Exchange::Gate, Market::Spot) => Box::new(gate::GateDriver::spot()),
		(Exchange::Gate, Market::Linear) => Box::new(gate::GateDriver::linear()),
		(Exchange::Hyperliquid, Market::Spot) => Box::new(hyperliquid::HyperliquidDriver::spot()),
		(Exchange::Hyperliquid, Market::Linear) => Box::new(hyperliquid::HyperliquidDriver::linear()),
	}
}
