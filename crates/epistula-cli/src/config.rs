//! CLI configuration file
//!
//! ```toml
//! [identity]
//! seed_hex = "…64 hex chars…"      # or: seed_file = "validator.seed"
//!
//! [dispatch]
//! neuron_timeout_ms = 20000
//! inference = { connect_ms = 5000, read_ms = 10000 }
//!
//! [[targets]]
//! uid = 1
//! identity = "…64 hex chars…"
//! address = "10.0.0.1:8091"
//! ```

use anyhow::{anyhow, bail, Context, Result};
use epistula_dispatch::{DispatchConfig, DispatchContext, QueryTarget, StaticRegistry};
use epistula_signature::SigningIdentity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the validator's signing seed comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Inline 32-byte seed, hex encoded
    pub seed_hex: Option<String>,
    /// File holding the hex seed; relative paths resolve against the config file
    pub seed_file: Option<PathBuf>,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Signing identity
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Timeouts, paths and auth for outgoing calls
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Static uid table
    #[serde(default)]
    pub targets: Vec<QueryTarget>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl CliConfig {
    /// Parse configuration text. Relative seed paths resolve against `base_dir`.
    pub fn parse(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: CliConfig = toml::from_str(text).context("invalid configuration")?;
        config.base_dir = base_dir.into();
        config.dispatch.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&text, base_dir)
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Resolve the signing identity.
    pub async fn signing_identity(&self) -> Result<SigningIdentity> {
        let seed = match (&self.identity.seed_hex, &self.identity.seed_file) {
            (Some(_), Some(_)) => bail!("set only one of identity.seed_hex and identity.seed_file"),
            (Some(seed), None) => seed.clone(),
            (None, Some(file)) => {
                let path = self.base_dir.join(file);
                tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read seed file {}", path.display()))?
            }
            (None, None) => bail!("no identity configured; run `epistula keygen`"),
        };
        SigningIdentity::from_seed_hex(seed.trim())
            .map_err(|e| anyhow!("invalid identity seed: {e}"))
    }

    /// Build the dispatch context from this configuration.
    pub async fn dispatch_context(&self) -> Result<DispatchContext> {
        let identity = self.signing_identity().await?;
        let registry = StaticRegistry::new(self.targets.iter().cloned());
        Ok(DispatchContext::new(
            Arc::new(identity),
            Arc::new(registry),
            self.dispatch.clone(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(identity_section: &str, target_identity: &str) -> String {
        format!(
            r#"
{identity_section}

[dispatch]
neuron_timeout_ms = 15000
bearer_token = "secret"

[dispatch.inference]
connect_ms = 2000
read_ms = 4000

[[targets]]
uid = 7
identity = "{target_identity}"
address = "127.0.0.1:8091"
"#
        )
    }

    #[tokio::test]
    async fn test_parse_inline_seed() {
        let validator = SigningIdentity::from_seed([1; 32]);
        let miner = SigningIdentity::from_seed([2; 32]).identity();
        let text = sample(
            &format!("[identity]\nseed_hex = \"{}\"", validator.seed_hex()),
            &miner.to_string(),
        );

        let config = CliConfig::parse(&text, ".").unwrap();
        assert_eq!(config.dispatch.neuron_timeout_ms, 15_000);
        assert_eq!(config.dispatch.inference.read_ms, 4_000);
        // Unset sections keep their defaults
        assert_eq!(config.dispatch.availability, DispatchConfig::default().availability);
        assert_eq!(config.dispatch.bearer_token.as_deref(), Some("secret"));
        assert_eq!(config.targets, vec![QueryTarget::new(7, miner, "127.0.0.1:8091")]);

        let identity = config.signing_identity().await.unwrap();
        assert_eq!(identity.identity(), validator.identity());
        assert!(config.dispatch_context().await.is_ok());
    }

    #[tokio::test]
    async fn test_seed_file_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let validator = SigningIdentity::from_seed([3; 32]);
        let seed_path = dir.path().join("validator.seed");
        std::fs::write(seed_path, format!("{}\n", validator.seed_hex())).unwrap();
        let miner = SigningIdentity::from_seed([4; 32]).identity();
        let config_path = dir.path().join("epistula.toml");
        std::fs::write(
            &config_path,
            sample("[identity]\nseed_file = \"validator.seed\"", &miner.to_string()),
        )
        .unwrap();

        let config = CliConfig::load(&config_path).await.unwrap();
        let identity = config.signing_identity().await.unwrap();
        assert_eq!(identity.identity(), validator.identity());
    }

    #[tokio::test]
    async fn test_missing_or_ambiguous_identity() {
        let miner = SigningIdentity::from_seed([5; 32]).identity().to_string();
        let none = CliConfig::parse(&sample("", &miner), ".").unwrap();
        assert!(none.signing_identity().await.is_err());

        let both = CliConfig::parse(
            &sample("[identity]\nseed_hex = \"00\"\nseed_file = \"x\"", &miner),
            ".",
        )
        .unwrap();
        assert!(both.signing_identity().await.is_err());
    }

    #[test]
    fn test_rejects_bad_target_identity() {
        assert!(CliConfig::parse(&sample("", "not-a-key"), ".").is_err());
    }

    #[test]
    fn test_partial_timeout_table() {
        let text = "[dispatch.inference]\nconnect_ms = 2000\n\n\
                    [dispatch.availability]\nread_ms = 900\n";
        let config = CliConfig::parse(text, ".").unwrap();
        assert_eq!(config.dispatch.inference.connect_ms, 2_000);
        assert_eq!(config.dispatch.inference.read_ms, 10_000);
        assert_eq!(config.dispatch.availability.connect_ms, 5_000);
        assert_eq!(config.dispatch.availability.read_ms, 900);
    }

    #[test]
    fn test_rejects_invalid_dispatch_config() {
        let text = "[dispatch]\nneuron_timeout_ms = 0\n";
        assert!(CliConfig::parse(text, ".").is_err());
    }
}
