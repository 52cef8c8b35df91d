//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// L1 费用预言机的默认合约地址（OP Stack 预部署地址）
pub const DEFAULT_L1_ORACLE_ADDRESS: &str = "0x420000000000000000000000000000000000000F";

/// SDK 配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub fees: FeeConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_file_logging: bool,
    pub log_file_path: Option<String>,
}

/// HTTP / RPC 网络配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub pool_max_idle_per_host: usize,
}

/// 网络服务商配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// 链 id -> 节点 URL 列表（按优先级排列）
    #[serde(default)]
    pub node_urls: HashMap<String, Vec<String>>,
    /// 链 id -> BlockBook 主机
    #[serde(default)]
    pub blockbook_urls: HashMap<String, String>,
    /// 链 id -> Etherscan 风格浏览器 API
    #[serde(default)]
    pub etherscan_urls: HashMap<String, String>,
    pub etherscan_api_key: Option<String>,
    pub blockbook_api_key: Option<String>,
    pub rosetta_url: Option<String>,
    /// 链 id -> Electrum 端点（host:port）
    #[serde(default)]
    pub electrum_endpoints: HashMap<String, Vec<String>>,
}

/// 费用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// 链 id -> L1 费用倍数，未配置的链为 1.0
    pub l1_fee_multipliers: HashMap<String, f64>,
    pub l1_oracle_address: String,
    /// gas limit 上浮百分比（112 = +12%）
    pub gas_limit_multiplier_percent: u64,
    /// [low, market, fast] 档位倍数
    pub tier_multipliers: [f64; 3],
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
            enable_file_logging: std::env::var("LOG_FILE_ENABLED")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(false),
            log_file_path: std::env::var("LOG_FILE_PATH").ok(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: std::env::var("SDK_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            connect_timeout_secs: std::env::var("SDK_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            max_retries: std::env::var("SDK_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: std::env::var("SDK_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            pool_max_idle_per_host: std::env::var("SDK_POOL_MAX_IDLE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        let mut l1_fee_multipliers = HashMap::new();
        l1_fee_multipliers.insert(
            "cyber".to_string(),
            std::env::var("L1_FEE_MULTIPLIER_CYBER")
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| *v > 0.0 && v.is_finite())
                .unwrap_or(3.0),
        );

        Self {
            l1_fee_multipliers,
            l1_oracle_address: std::env::var("L1_FEE_ORACLE_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_L1_ORACLE_ADDRESS.into()),
            gas_limit_multiplier_percent: std::env::var("GAS_LIMIT_MULTIPLIER_PERCENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(112),
            tier_multipliers: [1.0, 1.2, 1.5],
        }
    }
}

impl FeeConfig {
    /// 获取链的 L1 费用倍数
    pub fn l1_multiplier(&self, chain_id: &str) -> f64 {
        self.l1_fee_multipliers.get(chain_id).copied().unwrap_or(1.0)
    }
}

impl ProviderConfig {
    fn from_env() -> Self {
        let mut config = Self {
            etherscan_api_key: std::env::var("ETHERSCAN_API_KEY").ok(),
            blockbook_api_key: std::env::var("BLOCKBOOK_API_KEY").ok(),
            rosetta_url: std::env::var("ROSETTA_URL").ok(),
            ..Default::default()
        };

        // NODE_URLS_<CHAIN>=url1,url2
        for (key, value) in std::env::vars() {
            if let Some(chain) = key.strip_prefix("NODE_URLS_") {
                let urls = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                config
                    .node_urls
                    .insert(chain.to_lowercase().replace('_', "-"), urls);
            }
        }
        config
    }
}

impl SdkConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            logging: LoggingConfig::default(),
            network: NetworkConfig::default(),
            providers: ProviderConfig::from_env(),
            fees: FeeConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: SdkConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if self.network.request_timeout_secs == 0 || self.network.connect_timeout_secs == 0 {
            anyhow::bail!("network timeouts must be positive");
        }

        for (chain, multiplier) in &self.fees.l1_fee_multipliers {
            if !multiplier.is_finite() || *multiplier <= 0.0 {
                anyhow::bail!("invalid L1 fee multiplier for {}: {}", chain, multiplier);
            }
        }

        if self.fees.tier_multipliers.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            anyhow::bail!("fee tier multipliers must be positive");
        }

        let oracle = self
            .fees
            .l1_oracle_address
            .strip_prefix("0x")
            .unwrap_or(&self.fees.l1_oracle_address);
        let oracle_bytes =
            hex::decode(oracle).with_context(|| "L1 oracle address is not valid hex")?;
        if oracle_bytes.len() != 20 {
            anyhow::bail!("L1 oracle address must be 20 bytes");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_config_from_env() {
        let config = SdkConfig::from_env().unwrap();
        assert_eq!(config.fees.l1_oracle_address, DEFAULT_L1_ORACLE_ADDRESS);
        assert_eq!(config.fees.l1_multiplier("cyber"), 3.0);
        assert_eq!(config.fees.l1_multiplier("optimism"), 1.0);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[logging]
level = "debug"
format = "json"
enable_file_logging = false

[network]
request_timeout_secs = 5
connect_timeout_secs = 2
max_retries = 1
retry_delay_ms = 10
pool_max_idle_per_host = 4

[providers]
rosetta_url = "https://rosetta.example"

[providers.node_urls]
ethereum = ["https://eth.example"]

[fees]
l1_oracle_address = "0x420000000000000000000000000000000000000F"
gas_limit_multiplier_percent = 120
tier_multipliers = [1.0, 1.1, 1.3]

[fees.l1_fee_multipliers]
base = 2.0
"#
        )
        .unwrap();

        let config = SdkConfig::from_file(file.path()).unwrap();
        assert_eq!(config.network.request_timeout_secs, 5);
        assert_eq!(config.fees.l1_multiplier("base"), 2.0);
        assert_eq!(config.fees.l1_multiplier("cyber"), 1.0);
        assert_eq!(
            config.providers.node_urls["ethereum"],
            vec!["https://eth.example".to_string()]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SdkConfig::from_env().unwrap();
        config.logging.level = "info".into();
        config.logging.format = "text".into();
        assert!(config.validate().is_ok());

        config.fees.l1_fee_multipliers.insert("blast".into(), -1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_oracle_address_rejected() {
        let mut config = SdkConfig::default();
        config.logging.level = "info".into();
        config.logging.format = "text".into();
        config.fees.l1_oracle_address = "0x1234".into();
        assert!(config.validate().is_err());
    }
}
