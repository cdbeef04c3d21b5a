//! Identity/pseudonymization service integration

pub mod client;

pub use client::HttpIdentityService;

use crate::domain::{MasterCode, Result, SubjectIdentity};
use async_trait::async_trait;

/// Exchanges identity fields for a stable master code
///
/// The service guarantees that the same identity always yields the same code.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn master_code(&self, identity: &SubjectIdentity) -> Result<MasterCode>;
}
