//! Wire models for the destination platform API

use crate::domain::NodeId;
use serde::{Deserialize, Serialize};

/// Body of a hierarchical lookup request
#[derive(Debug, Serialize)]
pub struct LookupRequest<'a> {
    pub path: &'a [String],
}

/// Response carrying the id of a found or created node
#[derive(Debug, Deserialize)]
pub struct NodeIdResponse {
    #[serde(rename = "_id")]
    pub id: NodeId,
}

/// Response of the token endpoint
#[derive(Debug, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
}

/// A file to attach to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}
