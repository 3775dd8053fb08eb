//! Configuração do launchpad carregada a partir de `launchpad.toml`.
//!
//! A struct [`LaunchpadConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `LAUNCHPAD_STORE` tem precedência sobre o arquivo
//! para o caminho do banco de dados; flags da CLI têm precedência sobre ambos.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::LaunchpadError;
use crate::model::RetryConfig;

/// Variável de ambiente que sobrepõe `store_path`.
pub const STORE_ENV: &str = "LAUNCHPAD_STORE";

/// Configuração de nível superior carregada de `launchpad.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchpadConfig {
    /// Arquivo SQLite onde workflows e jobs são persistidos.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Diretório onde os launchers executam as tarefas.
    #[serde(default = "default_launch_dir")]
    pub launch_dir: PathBuf,

    /// Retentativas padrão para jobs que não definem `retries`.
    #[serde(default)]
    pub max_retries: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Intervalo entre verificações enquanto outros launchers seguram jobs RUNNING.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tempo máximo de espera sem progresso no modo rapid-fire.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Filtro de log usado quando `RUST_LOG` não está definida.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Valor padrão para o banco: "launchpad.db".
fn default_store_path() -> PathBuf {
    PathBuf::from("launchpad.db")
}

fn default_launch_dir() -> PathBuf {
    PathBuf::from(".")
}

// Valor padrão para o atraso base: 1000ms.
fn default_base_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_max_wait_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LaunchpadConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            launch_dir: default_launch_dir(),
            max_retries: 0,
            base_delay_ms: default_base_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
            log_level: default_log_level(),
        }
    }
}

impl LaunchpadConfig {
    /// Carrega a configuração de `path`.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<LaunchpadConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_store_override(std::env::var(STORE_ENV).ok());
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    // Variável de ambiente tem precedência sobre o arquivo de configuração.
    fn apply_store_override(&mut self, value: Option<String>) {
        if let Some(path) = value.filter(|p| !p.is_empty()) {
            self.store_path = PathBuf::from(path);
        }
    }

    /// Rejeita valores que deixariam o launcher inutilizável.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.store_path.as_os_str().is_empty() {
            return Err(LaunchpadError::Config("store_path must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(LaunchpadError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if EnvFilter::try_new(&self.log_level).is_err() {
            return Err(LaunchpadError::Config(format!(
                "log_level '{}' is not a valid filter",
                self.log_level
            )));
        }
        Ok(())
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}
