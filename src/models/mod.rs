//! Domain models shared across the scanner, tracker and monitor API.

pub mod market;
pub mod node;
pub mod report;

pub use market::{ContractType, MarketSnapshot, OptionContract};
pub use node::{KingNode, WallType};
pub use report::AssetReport;
