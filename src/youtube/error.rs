//! Tipos de erro para o cliente da API YouTube Data v3.
//!
//! Define [`YouTubeError`] com variantes para autenticação, cota de upload,
//! erros da API e erros de rede. A conversão para [`PublicationError`]
//! é o que o engine enxerga; os detalhes do YouTube ficam neste módulo.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::PublicationError;

/// Erros que podem ocorrer ao autenticar ou enviar um vídeo ao YouTube.
#[derive(Debug, Error)]
pub enum YouTubeError {
    /// O refresh token foi recusado ou o access token expirou (HTTP 401 / invalid_grant).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// O canal atingiu a cota diária de uploads da API (`quotaExceeded`, `uploadLimitExceeded`).
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Qualquer outro erro HTTP (4xx/5xx) com a mensagem extraída do corpo.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// A iniciação do upload resumível não devolveu o cabeçalho `Location`.
    #[error("upload session URI missing from response")]
    MissingSessionUri,

    /// O arquivo a enviar não existe.
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<YouTubeError> for PublicationError {
    fn from(err: YouTubeError) -> Self {
        match err {
            YouTubeError::Auth(msg) => PublicationError::Auth(msg),
            YouTubeError::QuotaExceeded(msg) => PublicationError::QuotaExceeded(msg),
            YouTubeError::ApiError { status, message } => {
                PublicationError::Rejected { status, message }
            }
            YouTubeError::MissingSessionUri => {
                PublicationError::Unavailable("upload session was not opened".into())
            }
            YouTubeError::MissingFile(path) => PublicationError::MissingArtifact(path),
            YouTubeError::NetworkError(e) => PublicationError::Unavailable(e.to_string()),
            YouTubeError::Io(e) => PublicationError::Io(e),
        }
    }
}
