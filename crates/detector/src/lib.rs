pub mod cache;
pub mod conditions;
pub mod detector;
pub mod options;
pub mod series;

pub use cache::{OptionsCache, OptionsSource};
pub use conditions::Condition;
pub use detector::{SpikeDetector, SpikeMatch};
pub use options::{ConditionalTemplate, ExchangeSettings, MarketSettings, PairSettings, Strategy, UserOptions};
