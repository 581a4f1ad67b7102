// 7.0 config.rs: every tunable in one place. risk thresholds, market spreads,
// collateral pricing, gossip pacing, store bounds.
// 7.1 loaded from TOML; every section falls back to its defaults when omitted.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::gossip::GossipConfig;
use crate::margin::{CollateralSpec, CollateralTable};
use crate::market::{MarketParams, MarketRegistry};
use crate::risk::RiskParams;
use crate::store::StoreConfig;
use crate::types::{CollateralId, MarketId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    // default directive for the log filter, RUST_LOG wins when set
    pub log_level: String,
    pub risk: RiskParams,
    // markets not listed here run with MarketParams::new defaults
    pub markets: Vec<MarketParams>,
    pub collaterals: Vec<CollateralSpec>,
    pub gossip: GossipConfig,
    pub store: StoreConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            risk: RiskParams::default(),
            markets: vec![MarketParams::new(MarketId(0))],
            collaterals: vec![CollateralSpec {
                id: CollateralId::QUOTE,
                price: Decimal::ONE,
                weight: Decimal::ONE,
            }],
            gossip: GossipConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    // 7.2: testnet. wider liquidation band so thin books still clear underwater positions
    pub fn testnet() -> Self {
        let mut config = Self::default();
        for market in config.markets.iter_mut() {
            market.liquidation_spread_limit = dec!(0.1);
        }
        config.gossip.min_batch_interval_ms = 20;
        config.log_level = "debug".to_string();
        config
    }

    // 7.3: mainnet. tighter fill band, slower gossip cadence
    pub fn mainnet() -> Self {
        let mut config = Self::default();
        for market in config.markets.iter_mut() {
            market.spread_limit = dec!(0.1);
        }
        config.gossip.min_batch_interval_ms = 100;
        config.gossip.tick_interval_ms = 1_000;
        config.log_level = "warn".to_string();
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let risk = &self.risk;
        if risk.maintenance_margin <= Decimal::ZERO || risk.maintenance_margin >= Decimal::ONE {
            return Err(ConfigError::InvalidRisk {
                reason: "maintenance margin must be between 0 and 1".to_string(),
            });
        }
        // MinAllowable gates new risk, so it can't be looser than the liquidation line
        if risk.min_allowable_margin < risk.maintenance_margin {
            return Err(ConfigError::InvalidRisk {
                reason: "min allowable margin below maintenance margin".to_string(),
            });
        }
        if risk.spread_ratio_threshold <= Decimal::ZERO {
            return Err(ConfigError::InvalidRisk {
                reason: "spread ratio threshold must be positive".to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for market in &self.markets {
            if !seen.insert(market.id) {
                return Err(ConfigError::InvalidMarket {
                    reason: format!("{} listed twice", market.id),
                });
            }
            if market.spread_limit <= Decimal::ZERO || market.liquidation_spread_limit <= Decimal::ZERO {
                return Err(ConfigError::InvalidMarket {
                    reason: format!("{}: spread limits must be positive", market.id),
                });
            }
            if market.liquidation_spread_limit > market.spread_limit {
                return Err(ConfigError::InvalidMarket {
                    reason: format!("{}: liquidation band wider than fill band", market.id),
                });
            }
        }

        for collateral in &self.collaterals {
            if collateral.price <= Decimal::ZERO || collateral.weight < Decimal::ZERO || collateral.weight > Decimal::ONE {
                return Err(ConfigError::InvalidCollateral {
                    reason: format!("collateral {}: price must be positive, weight in [0, 1]", collateral.id.0),
                });
            }
        }

        if self.gossip.max_batch_size == 0 || self.gossip.queue_capacity == 0 || self.gossip.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidGossip {
                reason: "batch size, queue capacity and tick interval must be non-zero".to_string(),
            });
        }

        if self.store.max_lifecycle_depth == 0 {
            return Err(ConfigError::InvalidStore {
                reason: "lifecycle depth must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    pub fn market_registry(&self) -> MarketRegistry {
        MarketRegistry::new(self.markets.iter().copied())
    }

    pub fn collateral_table(&self) -> CollateralTable {
        CollateralTable::new(self.collaterals.iter().copied())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid risk params: {reason}")]
    InvalidRisk { reason: String },

    #[error("invalid market params: {reason}")]
    InvalidMarket { reason: String },

    #[error("invalid collateral: {reason}")]
    InvalidCollateral { reason: String },

    #[error("invalid gossip params: {reason}")]
    InvalidGossip { reason: String },

    #[error("invalid store params: {reason}")]
    InvalidStore { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> EngineConfig {
        match self {
            Environment::Development => EngineConfig::default(),
            Environment::Testnet => EngineConfig::testnet(),
            Environment::Mainnet => EngineConfig::mainnet(),
        }
    }
}
