//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use feedme_cache::Cache;
use feedme_commerce::catalog::parse_price;
use feedme_commerce::{Money, Storefront};
use feedme_db::Db;
use tracing::debug;

use crate::config::CliConfig;
use crate::output::Output;

/// Backend table snapshot.
pub const BACKEND_FILE: &str = "backend.json";
/// Anonymous cart key-value file.
pub const LOCAL_STORAGE_FILE: &str = "local-storage.json";

/// Execution context for CLI commands.
pub struct Context {
    /// CLI configuration.
    pub config: CliConfig,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
    /// Directory holding the state files.
    pub data_dir: PathBuf,
}

impl Context {
    /// Load context from config file.
    pub fn load(
        config_path: Option<&str>,
        data_dir: Option<&str>,
        env: Option<&str>,
        output: Output,
    ) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let mut config = if let Some(path) = config_path {
            CliConfig::load(path)?
        } else {
            Self::find_config(&cwd).unwrap_or_default()
        };

        if let Some(env) = env {
            config = config.for_environment(env)?;
        }

        let data_dir = resolve(&cwd, data_dir.unwrap_or(&config.storage.data_dir));
        output.debug(&format!("Data directory: {}", data_dir.display()));

        Ok(Self {
            config,
            output,
            cwd,
            data_dir,
        })
    }

    /// Find config file in directory tree.
    fn find_config(start: &Path) -> Option<CliConfig> {
        let config_names = ["feedme.toml", ".feedme.toml", "feedme.json"];

        let mut current = start.to_path_buf();
        loop {
            for name in &config_names {
                let config_path = current.join(name);
                if config_path.exists() {
                    if let Ok(config) = CliConfig::load(config_path.to_str()?) {
                        return Some(config);
                    }
                }
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    pub fn backend_path(&self) -> PathBuf {
        self.data_dir.join(BACKEND_FILE)
    }

    pub fn local_storage_path(&self) -> PathBuf {
        self.data_dir.join(LOCAL_STORAGE_FILE)
    }

    /// Open the storefront over the state files, creating the directory if needed.
    pub async fn open(&self) -> Result<Storefront> {
        std::fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("Failed to create data directory: {}", self.data_dir.display())
        })?;

        let db = Db::load(self.backend_path())
            .await
            .with_context(|| format!("Failed to load {}", self.backend_path().display()))?;
        let local = Cache::open(self.local_storage_path()).with_context(|| {
            format!("Failed to open {}", self.local_storage_path().display())
        })?;

        let store = Storefront::open(db, local, self.config.commerce.clone()).await?;
        debug!(data_dir = %self.data_dir.display(), "storefront opened");
        Ok(store)
    }

    /// Write the backend snapshot. Local storage writes through on every change.
    pub async fn save(&self, store: &Storefront) -> Result<()> {
        store
            .db
            .save(self.backend_path())
            .await
            .with_context(|| format!("Failed to write {}", self.backend_path().display()))
    }

    /// Parse an amount like `2500` or `2,500.50` in the configured currency.
    pub fn money(&self, raw: &str) -> Result<Money> {
        parse_price(raw, self.config.commerce.currency)
            .map_err(|reason| anyhow::anyhow!("Invalid amount '{}': {}", raw, reason))
    }

    /// Resolve a path relative to the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        resolve(&self.cwd, path)
    }
}

fn resolve(cwd: &Path, path: &str) -> PathBuf {
    if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        cwd.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedme_commerce::cart::CartLine;
    use feedme_commerce::{Currency, ProductId};

    fn context_in(dir: &Path) -> Context {
        Context::load(None, dir.to_str(), None, Output::new(false, true)).unwrap()
    }

    #[tokio::test]
    async fn test_state_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_in(dir.path());

        let store = ctx.open().await.unwrap();
        let price = ctx.money("1,250").unwrap();
        store
            .anonymous
            .add_item(CartLine::product(ProductId::new("beans"), 2, price), &store.offers)
            .await
            .unwrap();
        ctx.save(&store).await.unwrap();

        assert!(ctx.backend_path().exists());
        assert!(ctx.local_storage_path().exists());

        let reopened = ctx.open().await.unwrap();
        assert_eq!(reopened.anonymous.item_count().unwrap(), 2);
        assert_eq!(
            reopened.anonymous.total().unwrap(),
            Money::from_major(2_500, Currency::NGN)
        );
    }

    #[test]
    fn test_money_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_in(dir.path());
        assert!(ctx.money("abc").is_err());
        assert_eq!(ctx.money("2500").unwrap().amount_minor, 250_000);
    }
}
