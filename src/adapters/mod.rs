//! External system integrations for hcimport.
//!
//! Each external collaborator sits behind an `async_trait` so the import
//! pipeline can run against in-memory fakes in tests:
//!
//! - [`healthcare`] - the healthcare data store (imaging, messages, resources)
//! - [`platform`] - the destination research-data platform
//! - [`identity`] - the pseudonymization service issuing master codes
//! - [`http`] - shared timeouts, status mapping and retry policy

pub mod healthcare;
pub mod http;
pub mod identity;
pub mod platform;
