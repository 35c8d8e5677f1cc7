use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{AccountId, PoolConfig, PoolId, PortfolioName};

/// Default reference asset symbol used as the USD pricing bridge.
fn default_reference_symbol() -> String {
    "TWENTIX".to_string()
}

/// Default per-request RPC timeout (10 seconds).
fn default_timeout_secs() -> u64 {
    10
}

/// Display/output formatting configuration.
///
/// Purely a presentation setting; stored figures keep full precision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Values are rounded to this many decimal places when rendered.
    pub currency_decimals: u32,

    /// When true, render values with thousands separators.
    pub currency_grouping: bool,

    /// Optional currency symbol (e.g. "$") for display rendering.
    pub currency_symbol: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            currency_decimals: 2,
            currency_grouping: false,
            currency_symbol: None,
        }
    }
}

/// Data source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// RPC endpoints tried in order until one answers.
    pub endpoints: Vec<String>,

    /// Per-request timeout; a timed-out endpoint counts as failed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Symbol of the volatile asset used to triangulate USD values.
    #[serde(default = "default_reference_symbol")]
    pub reference_symbol: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout_secs: default_timeout_secs(),
            reference_symbol: default_reference_symbol(),
        }
    }
}

/// What happens to a snapshot when one of its pools cannot be priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPoolPolicy {
    /// The whole snapshot fails; a partial total is materially misleading.
    #[default]
    FailFast,
    /// The pool appears in the breakdown with no value and is excluded from
    /// the total. Never a silent zero.
    MarkMissing,
}

/// Pool-id lists per portfolio, in reporting order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioAssignments {
    pub core: Vec<PoolId>,
    pub growth: Vec<PoolId>,
}

/// Application configuration as written in the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file
    /// location. If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    /// Accounts whose share balances are aggregated.
    pub accounts: Vec<AccountId>,

    pub missing_pool_policy: MissingPoolPolicy,

    pub display: DisplayConfig,

    pub source: SourceConfig,

    /// Tracked pools ([[pool]] tables).
    #[serde(rename = "pool")]
    pub pools: Vec<PoolConfig>,

    pub portfolios: PortfolioAssignments,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    /// Validate and resolve into the read-only form the engine runs against.
    pub fn resolve(self, config_path: &Path) -> Result<ResolvedConfig> {
        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let data_dir = match self.data_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        };

        let registry = Registry::new(self.pools)?;

        let portfolios = vec![
            PortfolioDefinition {
                name: PortfolioName::Core,
                pools: self.portfolios.core,
            },
            PortfolioDefinition {
                name: PortfolioName::Growth,
                pools: self.portfolios.growth,
            },
        ];

        let mut assigned: HashSet<&PoolId> = HashSet::new();
        for definition in &portfolios {
            for pool_id in &definition.pools {
                if registry.get(pool_id).is_none() {
                    bail!(
                        "Portfolio {} references unknown pool {}",
                        definition.name,
                        pool_id
                    );
                }
                if !assigned.insert(pool_id) {
                    // A pool in both portfolios would double-count; refuse to guess.
                    bail!("Pool {} is assigned to more than one portfolio", pool_id);
                }
            }
        }

        Ok(ResolvedConfig {
            data_dir,
            accounts: self.accounts,
            missing_pool_policy: self.missing_pool_policy,
            display: self.display,
            source: self.source,
            registry,
            portfolios,
        })
    }
}

/// A named portfolio and the pools it reports on, in configured order.
#[derive(Debug, Clone)]
pub struct PortfolioDefinition {
    pub name: PortfolioName,
    pub pools: Vec<PoolId>,
}

/// Static description of every tracked pool. Owned by configuration, loaded
/// once per run, read-only thereafter.
#[derive(Debug, Clone)]
pub struct Registry {
    pools: Vec<PoolConfig>,
}

impl Registry {
    pub fn new(pools: Vec<PoolConfig>) -> Result<Self> {
        let mut seen: HashSet<&PoolId> = HashSet::new();
        for pool in &pools {
            if pool.asset_a.symbol == pool.asset_b.symbol {
                bail!(
                    "Pool {} pairs asset {} with itself",
                    pool.id,
                    pool.asset_a.symbol
                );
            }
            if !seen.insert(&pool.id) {
                bail!("Duplicate pool id {} in registry", pool.id);
            }
        }
        Ok(Self { pools })
    }

    pub fn get(&self, id: &PoolId) -> Option<&PoolConfig> {
        self.pools.iter().find(|pool| pool.id == *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolConfig> {
        self.pools.iter()
    }

    pub fn price_reference_pools(&self) -> impl Iterator<Item = &PoolConfig> {
        self.pools.iter().filter(|pool| pool.price_reference)
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub accounts: Vec<AccountId>,
    pub missing_pool_policy: MissingPoolPolicy,
    pub display: DisplayConfig,
    pub source: SourceConfig,
    pub registry: Registry,
    pub portfolios: Vec<PortfolioDefinition>,
}

impl ResolvedConfig {
    pub fn load(path: &Path) -> Result<Self> {
        Config::load(path)?.resolve(path)
    }

    /// Load from `path` if it exists, otherwise resolve an empty default
    /// configuration anchored at the same location.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Config::default().resolve(path)
        }
    }

    pub fn portfolio(&self, name: PortfolioName) -> Option<&PortfolioDefinition> {
        self.portfolios.iter().find(|d| d.name == name)
    }

    /// True when the pool belongs to some portfolio; unassigned pools are
    /// excluded from all aggregation.
    pub fn is_assigned(&self, id: &PoolId) -> bool {
        self.portfolios.iter().any(|d| d.pools.contains(id))
    }
}
