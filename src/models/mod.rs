mod asset;
mod holding;
mod pool;
mod snapshot;

pub use asset::{Asset, AssetRole};
pub use holding::{AccountId, Holding};
pub use pool::{PoolConfig, PoolId, PoolState, ValuationStrategy};
pub use snapshot::{ParsePortfolioError, PoolContribution, PortfolioName, Snapshot};
