use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    pub batches: Vec<BatchConfig>,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub infra: InfraConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub rules: RuleConfig,
    #[serde(default)]
    pub isolation: IsolationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_true")]
    pub resume: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            resume: true,
        }
    }
}

fn default_input_dir() -> String {
    "data/input".to_string()
}

fn default_output_dir() -> String {
    "data/output".to_string()
}

fn default_true() -> bool {
    true
}

/// One (chain, year, month) scoring run.
#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    pub chain: String,
    pub year: i32,
    pub month: u32,
    pub transfers_path: Option<String>,
}

// ============================================================
// Graph Construction Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default)]
    pub min_amount: u64,
    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_amount: 0,
            blacklist: default_blacklist(),
        }
    }
}

fn default_blacklist() -> Vec<String> {
    vec![
        "0x0000000000000000000000000000000000000000".to_string(),
        "0x000000000000000000000000000000000000dead".to_string(),
        "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfraConfig {
    pub whitelist_path: Option<String>,
    #[serde(default = "default_true")]
    pub include_builtin: bool,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            whitelist_path: None,
            include_builtin: true,
            addresses: Vec::new(),
        }
    }
}

// ============================================================
// Feature Extraction Config
// ============================================================

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractionConfig {
    /// Worker threads for per-node extraction; 0 uses every core.
    #[serde(default)]
    pub workers: usize,
    /// Nodes whose filtered out-degree exceeds this are left out of triangle
    /// enumeration; 0 disables the cap.
    #[serde(default)]
    pub max_triangle_out_degree: usize,
}

impl ExtractionConfig {
    pub fn triangle_cap(&self) -> Option<usize> {
        (self.max_triangle_out_degree > 0).then_some(self.max_triangle_out_degree)
    }
}

// ============================================================
// Anomaly Scoring Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct RuleConfig {
    #[serde(default = "default_quantile")]
    pub quantile: f64,
    #[serde(default = "default_max_low_out_degree")]
    pub max_low_out_degree: u64,
    #[serde(default = "default_max_retention_ratio")]
    pub max_retention_ratio: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            quantile: default_quantile(),
            max_low_out_degree: default_max_low_out_degree(),
            max_retention_ratio: default_max_retention_ratio(),
        }
    }
}

fn default_quantile() -> f64 {
    0.99
}

fn default_max_low_out_degree() -> u64 {
    3
}

fn default_max_retention_ratio() -> f64 {
    0.05
}

#[derive(Debug, Deserialize, Clone)]
pub struct IsolationConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub workers: usize,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_samples: default_max_samples(),
            seed: default_seed(),
            workers: 0,
        }
    }
}

fn default_n_estimators() -> usize {
    300
}

fn default_max_samples() -> usize {
    100_000
}

fn default_seed() -> u64 {
    42
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.batches.is_empty() {
            return Err(eyre::eyre!("At least one batch must be configured"));
        }
        for batch in &self.batches {
            if !(1..=12).contains(&batch.month) {
                return Err(crate::error::ScoringError::InvalidPeriod {
                    year: batch.year,
                    month: batch.month,
                }
                .into());
            }
            if batch.chain.trim().is_empty() {
                return Err(eyre::eyre!("Batch {}-{:02} has an empty chain name", batch.year, batch.month));
            }
        }
        if !(self.rules.quantile > 0.0 && self.rules.quantile < 1.0) {
            return Err(eyre::eyre!(
                "Rule quantile must lie strictly between 0 and 1, got {}",
                self.rules.quantile
            ));
        }
        if self.rules.max_retention_ratio < 0.0 {
            return Err(eyre::eyre!(
                "max_retention_ratio must be non-negative, got {}",
                self.rules.max_retention_ratio
            ));
        }
        if self.isolation.n_estimators == 0 || self.isolation.max_samples == 0 {
            return Err(eyre::eyre!(
                "Isolation forest needs at least one estimator and one sample"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(batches: Vec<BatchConfig>) -> Config {
        Config {
            data: DataConfig::default(),
            batches,
            filter: FilterConfig::default(),
            infra: InfraConfig::default(),
            extraction: ExtractionConfig::default(),
            rules: RuleConfig::default(),
            isolation: IsolationConfig::default(),
        }
    }

    fn batch(month: u32) -> BatchConfig {
        BatchConfig {
            chain: "ethereum".to_string(),
            year: 2023,
            month,
            transfers_path: None,
        }
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[data]
output_dir = "/tmp/out"

[[batches]]
chain = "ethereum"
year = 2023
month = 1

[extraction]
workers = 4
max_triangle_out_degree = 5000

[isolation]
seed = 7
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.batches.len(), 1);
        assert_eq!(config.batches[0].chain, "ethereum");
        assert_eq!(config.data.output_dir, "/tmp/out");
        assert_eq!(config.data.input_dir, "data/input"); // default
        assert!(config.data.resume); // default
        assert_eq!(config.extraction.triangle_cap(), Some(5000));
        assert_eq!(config.isolation.seed, 7);
        assert_eq!(config.isolation.n_estimators, 300); // default
        assert_eq!(config.rules.quantile, 0.99); // default
        assert_eq!(config.rules.max_low_out_degree, 3); // default
        assert_eq!(config.filter.blacklist.len(), 3); // default
        assert!(config.infra.include_builtin); // default
    }

    #[test]
    fn test_triangle_cap_disabled_by_zero() {
        assert_eq!(ExtractionConfig::default().triangle_cap(), None);
    }

    #[test]
    fn test_validate_empty_batches() {
        assert!(minimal(vec![]).validate().is_err());
    }

    #[test]
    fn test_validate_bad_month() {
        assert!(minimal(vec![batch(13)]).validate().is_err());
        assert!(minimal(vec![batch(12)]).validate().is_ok());
    }

    #[test]
    fn test_validate_bad_quantile() {
        let mut config = minimal(vec![batch(1)]);
        config.rules.quantile = 1.0;
        assert!(config.validate().is_err());
    }
}
