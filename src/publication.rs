//! Publication adapter contract.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PublicationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privacy::Public => write!(f, "public"),
            Privacy::Unlisted => write!(f, "unlisted"),
            Privacy::Private => write!(f, "private"),
        }
    }
}

/// What the destination platform is told about an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub privacy: Privacy,
    pub tags: Vec<String>,
}

/// Acknowledgement of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Platform-assigned id, when the platform returns one.
    pub remote_id: Option<String>,
}

pub trait Publisher {
    /// Upload `artifact` with `metadata`. The adapter owns its authentication.
    async fn publish(
        &self,
        artifact: &Path,
        metadata: &VideoMetadata,
    ) -> Result<PublishReceipt, PublicationError>;
}
