//! Configuração do reelqueue carregada a partir de `reelqueue.toml`.
//!
//! A struct [`QueueConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! Variáveis de ambiente (`DAILY_LIMIT`, `YT_CLIENT_ID`, `YT_CLIENT_SECRET`,
//! `YT_REFRESH_TOKEN`, `REELQUEUE_DATABASE`, `REELQUEUE_MEDIA_DIR`) têm
//! precedência sobre o arquivo.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::metadata::MetadataTemplate;
use crate::state_machine::CleanupPolicy;
use crate::youtube::OAuthCredentials;

/// Configuração de nível superior carregada de `reelqueue.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Máximo de publicações por dia civil local.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Intervalo entre ciclos agendados, em minutos.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Caminho do banco SQLite com os jobs.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Diretório onde os artefatos baixados ficam até a publicação.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub publication: PublicationConfig,

    /// Template de título e descrição aplicado a todo upload.
    #[serde(default)]
    pub metadata: MetadataTemplate,

    #[serde(default)]
    pub cleanup: CleanupPolicy,
}

/// Estratégia de aquisição ativa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum StrategyKind {
    /// Invoca a ferramenta local `yt-dlp`.
    #[default]
    #[serde(rename = "yt-dlp")]
    YtDlp,
    /// Baixa diretamente uma URL de mídia via HTTP.
    #[serde(rename = "http")]
    Http,
}

/// Seção `[acquisition]`.
#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Nome ou caminho do executável do yt-dlp.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Seletor de formato passado ao yt-dlp.
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default)]
    pub proxy: Option<String>,

    /// Arquivo de cookies no formato Netscape.
    #[serde(default)]
    pub cookies: Option<PathBuf>,

    /// Tempo máximo de uma aquisição, em segundos.
    #[serde(default = "default_acquisition_timeout_secs")]
    pub timeout_secs: u64,
}

/// Seção `[publication]`: credenciais OAuth2 e endpoints do YouTube.
#[derive(Debug, Clone, Deserialize)]
pub struct PublicationConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default)]
    pub refresh_token: String,

    /// Endpoint de token; só muda em testes ou com proxies.
    #[serde(default)]
    pub token_url: Option<String>,

    /// Endpoint de upload; idem.
    #[serde(default)]
    pub upload_url: Option<String>,

    /// Tempo máximo de um upload completo, em segundos.
    #[serde(default = "default_upload_timeout_secs")]
    pub timeout_secs: u64,
}

// Valor padrão para o limite diário: 4 publicações.
fn default_daily_limit() -> u32 {
    4
}

// Valor padrão para o intervalo: 30 minutos.
fn default_interval_minutes() -> u64 {
    30
}

// Valor padrão para o banco: "reelqueue.db" no diretório atual.
fn default_database_path() -> PathBuf {
    PathBuf::from("reelqueue.db")
}

// Valor padrão para o diretório de mídia: "media".
fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

// Valor padrão para o executável: "yt-dlp" no PATH.
fn default_binary() -> String {
    "yt-dlp".to_string()
}

// Valor padrão para o formato: melhor mp4 disponível.
fn default_format() -> String {
    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string()
}

// Valor padrão para o timeout da aquisição: 15 minutos.
fn default_acquisition_timeout_secs() -> u64 {
    900
}

// Valor padrão para o timeout do upload: 30 minutos.
fn default_upload_timeout_secs() -> u64 {
    1800
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            binary: default_binary(),
            format: default_format(),
            proxy: None,
            cookies: None,
            timeout_secs: default_acquisition_timeout_secs(),
        }
    }
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            token_url: None,
            upload_url: None,
            timeout_secs: default_upload_timeout_secs(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            interval_minutes: default_interval_minutes(),
            database_path: default_database_path(),
            media_dir: default_media_dir(),
            acquisition: AcquisitionConfig::default(),
            publication: PublicationConfig::default(),
            metadata: MetadataTemplate::default(),
            cleanup: CleanupPolicy::default(),
        }
    }
}

impl QueueConfig {
    /// Carrega a configuração de `path`, aplicando as variáveis de ambiente.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::load_with(path, |key| std::env::var(key).ok())?)
    }

    /// Como [`QueueConfig::load`], mas lendo o ambiente por `env`.
    pub fn load_with(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<QueueConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = var("DAILY_LIMIT") {
            self.daily_limit = parse_daily_limit(&raw)?;
        }
        if let Some(id) = var("YT_CLIENT_ID") {
            self.publication.client_id = id;
        }
        if let Some(secret) = var("YT_CLIENT_SECRET") {
            self.publication.client_secret = secret;
        }
        if let Some(token) = var("YT_REFRESH_TOKEN") {
            self.publication.refresh_token = token;
        }
        if let Some(db) = var("REELQUEUE_DATABASE") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(dir) = var("REELQUEUE_MEDIA_DIR") {
            self.media_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daily_limit == 0 {
            return Err(ConfigError::InvalidDailyLimit(self.daily_limit.to_string()));
        }
        if self.interval_minutes == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        let attempts = self.cleanup.attempts;
        if !(1..=CleanupPolicy::MAX_ATTEMPTS).contains(&attempts) {
            return Err(ConfigError::InvalidCleanupAttempts(attempts));
        }
        Ok(())
    }

    /// Credenciais OAuth2 para o upload; exigidas só por comandos que publicam.
    pub fn credentials(&self) -> Result<OAuthCredentials, ConfigError> {
        let p = &self.publication;
        if p.client_id.is_empty() {
            return Err(ConfigError::MissingCredential("YT_CLIENT_ID"));
        }
        if p.client_secret.is_empty() {
            return Err(ConfigError::MissingCredential("YT_CLIENT_SECRET"));
        }
        if p.refresh_token.is_empty() {
            return Err(ConfigError::MissingCredential("YT_REFRESH_TOKEN"));
        }
        Ok(OAuthCredentials {
            client_id: p.client_id.clone(),
            client_secret: p.client_secret.clone(),
            refresh_token: p.refresh_token.clone(),
        })
    }
}

/// Interpreta um limite diário vindo de texto (ambiente ou CLI).
pub fn parse_daily_limit(raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(ConfigError::InvalidDailyLimit(raw.to_string())),
    }
}
