//! Two-phase lookup-or-create with an explicit conflict strategy
//!
//! Lookup and create are separate platform calls. When a concurrent importer
//! creates the same node between them, the platform answers the create with
//! a conflict; [`ConflictPolicy`] decides whether that fails the item or
//! triggers a fresh lookup that adopts the other importer's node.

use crate::config::{OnConflict, PlatformConfig};
use crate::domain::{NodeId, Result};
use std::future::Future;

/// What to do when a create call reports a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Propagate the conflict as an error
    #[default]
    Fail,
    /// Look the node up again, up to `attempts` times
    Relookup { attempts: usize },
}

impl From<&PlatformConfig> for ConflictPolicy {
    fn from(config: &PlatformConfig) -> Self {
        match config.on_conflict {
            OnConflict::Fail => ConflictPolicy::Fail,
            OnConflict::Relookup => ConflictPolicy::Relookup {
                attempts: config.conflict_relookups,
            },
        }
    }
}

/// Node id and whether this call created it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResolution {
    pub id: NodeId,
    pub created: bool,
}

impl ConflictPolicy {
    /// Looks the node up and creates it on a miss
    pub async fn lookup_or_create<L, LFut, C, CFut>(
        &self,
        lookup: L,
        create: C,
    ) -> Result<NodeResolution>
    where
        L: Fn() -> LFut,
        LFut: Future<Output = Result<Option<NodeId>>>,
        C: FnOnce() -> CFut,
        CFut: Future<Output = Result<NodeId>>,
    {
        if let Some(id) = lookup().await? {
            return Ok(NodeResolution { id, created: false });
        }
        self.create_or_relookup(create, lookup).await
    }

    /// Creates the node; on conflict, applies the policy
    pub async fn create_or_relookup<L, LFut, C, CFut>(
        &self,
        create: C,
        lookup: L,
    ) -> Result<NodeResolution>
    where
        L: Fn() -> LFut,
        LFut: Future<Output = Result<Option<NodeId>>>,
        C: FnOnce() -> CFut,
        CFut: Future<Output = Result<NodeId>>,
    {
        let conflict = match create().await {
            Ok(id) => return Ok(NodeResolution { id, created: true }),
            Err(e) if e.is_conflict() => e,
            Err(e) => return Err(e),
        };

        let ConflictPolicy::Relookup { attempts } = *self else {
            return Err(conflict);
        };

        for attempt in 1..=attempts {
            tracing::debug!(attempt, attempts, "Create conflicted, looking up again");
            if let Some(id) = lookup().await? {
                return Ok(NodeResolution { id, created: false });
            }
        }
        Err(conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ImportError, UpstreamServiceError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn conflict() -> ImportError {
        UpstreamServiceError::Conflict("exists".to_string()).into()
    }

    #[tokio::test]
    async fn test_found_node_is_reused() {
        let resolution = ConflictPolicy::Fail
            .lookup_or_create(
                || async { Ok(Some(id("s1"))) },
                || async { Err(ImportError::Validation("create called".to_string())) },
            )
            .await
            .unwrap();
        assert_eq!(resolution, NodeResolution { id: id("s1"), created: false });
    }

    #[tokio::test]
    async fn test_missing_node_is_created() {
        let resolution = ConflictPolicy::Fail
            .lookup_or_create(|| async { Ok(None) }, || async { Ok(id("new")) })
            .await
            .unwrap();
        assert!(resolution.created);
    }

    #[tokio::test]
    async fn test_fail_policy_propagates_conflict() {
        let err = ConflictPolicy::Fail
            .lookup_or_create(|| async { Ok(None) }, || async { Err(conflict()) })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_relookup_adopts_concurrent_node() {
        let counter = AtomicU32::new(0);
        let lookups = &counter;
        let resolution = ConflictPolicy::Relookup { attempts: 2 }
            .lookup_or_create(
                move || async move {
                    // first lookup misses, the relookup finds the node
                    if lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                        Ok(None)
                    } else {
                        Ok(Some(id("theirs")))
                    }
                },
                || async { Err(conflict()) },
            )
            .await
            .unwrap();
        assert_eq!(resolution, NodeResolution { id: id("theirs"), created: false });
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_relookup_gives_up_after_attempts() {
        let counter = AtomicU32::new(0);
        let lookups = &counter;
        let err = ConflictPolicy::Relookup { attempts: 3 }
            .lookup_or_create(
                move || async move {
                    lookups.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                },
                || async { Err(conflict()) },
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(lookups.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_relooked() {
        let err = ConflictPolicy::Relookup { attempts: 3 }
            .lookup_or_create(
                || async { Ok(None) },
                || async { Err(ImportError::Validation("bad".to_string())) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Validation(_)));
    }
}
