//! Tipos de dados para o endpoint `videos.insert` e o endpoint de token OAuth2.
//!
//! As structs de requisição serializam em camelCase, como a API espera;
//! as de resposta só declaram os campos que o cliente lê.

use serde::{Deserialize, Serialize};

use crate::publication::{Privacy, VideoMetadata};

/// Corpo JSON enviado ao iniciar um upload resumível.
#[derive(Debug, Clone, Serialize)]
pub struct VideoInsertRequest {
    pub snippet: Snippet,
    pub status: VideoStatus,
}

/// Título, descrição, categoria e tags do vídeo.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: String,
    pub description: String,
    pub category_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Visibilidade do vídeo após o processamento.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    pub privacy_status: Privacy,
    pub self_declared_made_for_kids: bool,
}

impl From<&VideoMetadata> for VideoInsertRequest {
    fn from(meta: &VideoMetadata) -> Self {
        Self {
            snippet: Snippet {
                title: meta.title.clone(),
                description: meta.description.clone(),
                category_id: meta.category_id.clone(),
                tags: meta.tags.clone(),
            },
            status: VideoStatus {
                privacy_status: meta.privacy,
                self_declared_made_for_kids: false,
            },
        }
    }
}

/// Resposta do endpoint de token para o grant `refresh_token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Validade em segundos; ausente em alguns provedores compatíveis.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// O recurso `video` devolvido ao final do upload (apenas o id é usado).
#[derive(Debug, Clone, Deserialize)]
pub struct VideoResource {
    pub id: String,
}

/// Envelope de erro padrão das APIs do Google.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorReason>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorReason {
    #[serde(default)]
    pub reason: String,
}

impl ApiErrorBody {
    pub fn has_reason(&self, reason: &str) -> bool {
        self.error.errors.iter().any(|e| e.reason == reason)
    }
}
