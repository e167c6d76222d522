use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub policy: PolicyOverrides,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            limits: Limits::default(),
            policy: PolicyOverrides::default(),
        }
    }
}

/// Numeric bounds that decide which rows survive. One set per deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
    #[serde(default = "default_max_order_qty")]
    pub max_order_qty: u32,
    #[serde(default = "default_max_pack")]
    pub max_pack: u32,
    /// Vertical band (PDF units) inside which fragments share a row.
    #[serde(default = "default_row_tolerance")]
    pub row_tolerance: f32,
    #[serde(default = "default_header_scan_rows")]
    pub header_scan_rows: usize,
    #[serde(default = "default_customer_scan_lines")]
    pub customer_scan_lines: usize,
}

fn default_max_order_qty() -> u32 {
    10_000
}

fn default_max_pack() -> u32 {
    1_000
}

fn default_row_tolerance() -> f32 {
    7.0
}

fn default_header_scan_rows() -> usize {
    50
}

fn default_customer_scan_lines() -> usize {
    40
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_order_qty: default_max_order_qty(),
            max_pack: default_max_pack(),
            row_tolerance: default_row_tolerance(),
            header_scan_rows: default_header_scan_rows(),
            customer_scan_lines: default_customer_scan_lines(),
        }
    }
}

impl Limits {
    pub fn validate(&self) -> Result<(), String> {
        if !(6.0..=9.0).contains(&self.row_tolerance) {
            return Err(format!(
                "limits.row_tolerance must be within 6.0..=9.0, got {}",
                self.row_tolerance
            ));
        }
        if self.max_order_qty == 0 || self.max_pack == 0 {
            return Err("limits.max_order_qty and limits.max_pack must be positive".into());
        }
        Ok(())
    }
}

/// Deployment-specific additions to the built-in word tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default)]
    pub extra_cities: Vec<String>,
    #[serde(default)]
    pub extra_entity_suffixes: Vec<String>,
    #[serde(default)]
    pub extra_banned_keywords: Vec<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&content)?;
        cfg.limits.validate()?;
        Ok(cfg)
    }

    /// Load from `path` when given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.limits.max_order_qty, 10_000);
        assert_eq!(cfg.limits.max_pack, 1_000);
        assert_eq!(cfg.limits.header_scan_rows, 50);
        assert!(cfg.policy.extra_cities.is_empty());
    }

    #[test]
    fn test_partial_override() {
        let cfg: Config = toml::from_str(
            r#"
            [limits]
            max_order_qty = 100000
            max_pack = 2000

            [policy]
            extra_cities = ["Kolhapur"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.limits.max_order_qty, 100_000);
        assert_eq!(cfg.limits.max_pack, 2_000);
        assert_eq!(cfg.limits.row_tolerance, 7.0);
        assert_eq!(cfg.policy.extra_cities, vec!["Kolhapur".to_string()]);
    }

    #[test]
    fn test_limits_validation() {
        assert!(Limits::default().validate().is_ok());
        let cfg: Config = toml::from_str("[limits]\nrow_tolerance = 12.0").unwrap();
        assert!(cfg.limits.validate().is_err());
        let cfg: Config = toml::from_str("[limits]\nmax_pack = 0").unwrap();
        assert!(cfg.limits.validate().is_err());
    }
}
