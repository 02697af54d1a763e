//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use flyer_core::format::PriceFormat;
use flyer_core::placement::PlacementPolicy;
use flyer_core::view::ViewOptions;
use flyer_core::workflow::WorkflowPolicy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Labels and fonts used by the PDF renderer.
#[derive(Clone, Debug)]
pub struct PdfConfig {
    pub font_path: Option<PathBuf>,
    pub bold_font_path: Option<PathBuf>,
    pub timeout: Duration,
    pub price_format: PriceFormat,
    pub recommended_price_label: String,
    pub promo_price_label: String,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            bold_font_path: None,
            timeout: Duration::from_secs(60),
            price_format: PriceFormat::default(),
            recommended_price_label: "Doporučená cena".to_string(),
            promo_price_label: "Akční cena".to_string(),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub public_base_url: String,
    pub blob_root: PathBuf,
    pub cors_origin: String,
    pub workflow: WorkflowPolicy,
    pub placement: PlacementPolicy,
    pub pdf: PdfConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Load Server and Database Settings ---
        let bind_address = parse_var::<SocketAddr>("BIND_ADDRESS", &var("BIND_ADDRESS", "0.0.0.0:3000"))?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let public_base_url = var("PUBLIC_BASE_URL", "http://localhost:3000");
        let blob_root = PathBuf::from(var("BLOB_ROOT", "./uploads"));
        let cors_origin = var("CORS_ORIGIN", "http://localhost:3000");

        // --- Load Workflow and Placement Rules ---
        let pre_approval_tiers = parse_var::<u8>("PRE_APPROVAL_TIERS", &var("PRE_APPROVAL_TIERS", "0"))?;
        if pre_approval_tiers > 1 {
            return Err(ConfigError::InvalidValue(
                "PRE_APPROVAL_TIERS".to_string(),
                "must be 0 or 1".to_string(),
            ));
        }
        let workflow = WorkflowPolicy {
            pre_approval_tiers,
            required_approvers: parse_count("REQUIRED_APPROVERS", &var("REQUIRED_APPROVERS", "1"))?,
            required_pre_approvers: parse_count(
                "REQUIRED_PRE_APPROVERS",
                &var("REQUIRED_PRE_APPROVERS", "1"),
            )?,
            require_action_reference: parse_bool(
                "REQUIRE_ACTION_REFERENCE",
                &var("REQUIRE_ACTION_REFERENCE", "false"),
            )?,
        };
        let placement = PlacementPolicy {
            require_energy_label: parse_bool(
                "REQUIRE_ENERGY_LABEL",
                &var("REQUIRE_ENERGY_LABEL", "false"),
            )?,
        };

        // --- Load PDF Settings ---
        let defaults = PdfConfig::default();
        let timeout_secs = parse_var::<u64>("PDF_TIMEOUT_SECS", &var("PDF_TIMEOUT_SECS", "60"))?;
        let pdf = PdfConfig {
            font_path: lookup("PDF_FONT_PATH").map(PathBuf::from),
            bold_font_path: lookup("PDF_BOLD_FONT_PATH").map(PathBuf::from),
            timeout: Duration::from_secs(timeout_secs),
            price_format: PriceFormat {
                thousands_separator: lookup("THOUSANDS_SEPARATOR")
                    .unwrap_or(defaults.price_format.thousands_separator),
                currency_suffix: lookup("CURRENCY_SUFFIX")
                    .unwrap_or(defaults.price_format.currency_suffix),
                ..defaults.price_format
            },
            recommended_price_label: lookup("RECOMMENDED_PRICE_LABEL")
                .unwrap_or(defaults.recommended_price_label),
            promo_price_label: lookup("PROMO_PRICE_LABEL").unwrap_or(defaults.promo_price_label),
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            public_base_url,
            blob_root,
            cors_origin,
            workflow,
            placement,
            pdf,
        })
    }

    pub fn view_options(&self) -> ViewOptions {
        ViewOptions {
            public_base_url: self.public_base_url.clone(),
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn parse_count(key: &str, raw: &str) -> Result<u32, ConfigError> {
    let count = parse_var::<u32>(key, raw)?;
    if count == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(count)
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/flyers")]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.workflow, WorkflowPolicy::default());
        assert!(!config.placement.require_energy_label);
        assert_eq!(config.pdf.timeout, Duration::from_secs(60));
        assert_eq!(config.pdf.price_format.format(1234.0), "1 234 Kč");
        assert_eq!(
            config.view_options().url("flyers/1/pdf"),
            "http://localhost:3000/flyers/1/pdf"
        );
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn workflow_settings_are_parsed() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/flyers"),
            ("PRE_APPROVAL_TIERS", "1"),
            ("REQUIRED_APPROVERS", "2"),
            ("REQUIRE_ACTION_REFERENCE", "yes"),
            ("REQUIRE_ENERGY_LABEL", "true"),
            ("CURRENCY_SUFFIX", " EUR"),
        ])
        .unwrap();
        assert_eq!(config.workflow.pre_approval_tiers, 1);
        assert_eq!(config.workflow.required_approvers, 2);
        assert!(config.workflow.require_action_reference);
        assert!(config.placement.require_energy_label);
        assert_eq!(config.pdf.price_format.format(5.0), "5 EUR");
    }

    #[test]
    fn invalid_values_name_the_variable() {
        for (key, value) in [
            ("PRE_APPROVAL_TIERS", "2"),
            ("REQUIRED_APPROVERS", "0"),
            ("REQUIRE_ENERGY_LABEL", "maybe"),
            ("BIND_ADDRESS", "nowhere"),
            ("RUST_LOG", "loud"),
        ] {
            let err = load(&[("DATABASE_URL", "postgres://x"), (key, value)]).unwrap_err();
            match err {
                ConfigError::InvalidValue(var, _) => assert_eq!(var, key),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
