pub mod cache;
pub mod oracle;

pub use cache::{CachedFxOracle, StaticFxOracle};
pub use oracle::FxOracle;
