//! Import coordinator - runs a batch of object references end to end
//!
//! Items are processed one at a time in the order imaging, messaging,
//! resources. Each item runs inside its own `import_item` span and ends as
//! exactly one [`ItemOutcome`]; a failing item never stops the batch.

use super::summary::{ImportSummary, ItemKind, ItemOutcome, ItemStatus};
use super::upload::{Artifact, Uploader};
use crate::adapters::healthcare::{HealthcareStore, HttpHealthcareStore, UidField};
use crate::adapters::identity::{HttpIdentityService, IdentityService};
use crate::adapters::platform::{DestinationPlatform, HttpPlatformClient};
use crate::config::{ImportConfig, ImportSettings};
use crate::core::normalize::normalize;
use crate::core::packaging::{archive_digest, SeriesPackager};
use crate::core::resolve::{ConflictPolicy, HierarchyResolver, SubjectResolver};
use crate::core::sources::{
    CodeTable, CsvCodeTable, FhirAdapter, Hl7Message, IdentificationPolicy,
};
use crate::domain::{
    CanonicalMetadata, HierarchyLevel, ImportError, MessageId, Project, ResolvedPath,
    ResourceRef, Result, SeriesKey, SubjectIdentity,
};
use crate::logging::item_span;
use crate::{log_item_outcome, log_item_start};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::Instrument;

/// Object references to import
///
/// Read from a JSON file such as
/// `{"dicoms": ["1.2.3"], "hl7s": ["msg-1"], "fhirs": ["Observation/obs-1"]}`.
/// Missing keys mean empty lists. References are parsed per item, so one
/// malformed reference fails only its own item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ObjectReferences {
    /// Study or series instance UIDs
    #[serde(default)]
    pub dicoms: Vec<String>,
    /// HL7v2 message ids
    #[serde(default)]
    pub hl7s: Vec<String>,
    /// `Type/id` resource references
    #[serde(default)]
    pub fhirs: Vec<String>,
}

impl ObjectReferences {
    /// Reads references from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ImportError::Configuration(format!(
                "Failed to read object references {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn is_empty(&self) -> bool {
        self.dicoms.is_empty() && self.hl7s.is_empty() && self.fhirs.is_empty()
    }
}

/// Import coordinator
pub struct ImportCoordinator {
    store: Arc<dyn HealthcareStore>,
    platform: Arc<dyn DestinationPlatform>,
    identity: Arc<dyn IdentityService>,
    codes: Arc<dyn CodeTable>,
    project_id: String,
    settings: ImportSettings,
    conflict: ConflictPolicy,
    shutdown: watch::Receiver<bool>,
}

impl ImportCoordinator {
    /// Create a coordinator over explicit collaborators
    ///
    /// Defaults: empty code table, default import settings, fail on create
    /// conflicts and no shutdown signal.
    pub fn new(
        project_id: impl Into<String>,
        store: Arc<dyn HealthcareStore>,
        platform: Arc<dyn DestinationPlatform>,
        identity: Arc<dyn IdentityService>,
    ) -> Self {
        let (_tx, shutdown) = watch::channel(false);
        Self {
            store,
            platform,
            identity,
            codes: Arc::new(CsvCodeTable::default()),
            project_id: project_id.into(),
            settings: ImportSettings::default(),
            conflict: ConflictPolicy::default(),
            shutdown,
        }
    }

    pub fn with_settings(mut self, settings: ImportSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_code_table(mut self, codes: Arc<dyn CodeTable>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_conflict_policy(mut self, conflict: ConflictPolicy) -> Self {
        self.conflict = conflict;
        self
    }

    /// Stop after the current item once `shutdown` turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Create a coordinator backed by the HTTP adapters
    ///
    /// When no healthcare access token is configured, one is fetched from
    /// the platform's token endpoint with `healthcare.auth_token_id`.
    pub async fn from_config(config: &ImportConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let platform = Arc::new(HttpPlatformClient::new(&config.platform)?);

        let token = match (&config.healthcare.access_token, &config.healthcare.auth_token_id) {
            (Some(token), _) => token.clone(),
            (None, Some(token_id)) => {
                tracing::debug!("Fetching healthcare access token from the platform");
                platform.fetch_access_token(token_id).await?
            }
            (None, None) => {
                return Err(ImportError::Configuration(
                    "Either healthcare.access_token or healthcare.auth_token_id must be provided"
                        .to_string(),
                ))
            }
        };
        let store = Arc::new(HttpHealthcareStore::new(&config.healthcare, token)?);

        let identity = Arc::new(HttpIdentityService::new(
            config.identity_base_url(),
            &config.identity,
            config.platform.api_key.clone(),
            &config.platform.retry,
        )?);

        let codes = match &config.import.code_table {
            Some(path) => {
                let table = CsvCodeTable::from_path(path)?;
                tracing::info!(path = %path.display(), codes = table.len(), "Loaded code table");
                table
            }
            None => CsvCodeTable::default(),
        };

        Ok(
            Self::new(config.platform.project_id.clone(), store, platform, identity)
                .with_settings(config.import.clone())
                .with_code_table(Arc::new(codes))
                .with_conflict_policy(ConflictPolicy::from(&config.platform))
                .with_shutdown(shutdown),
        )
    }

    /// Imports every referenced item
    ///
    /// # Errors
    ///
    /// Only when the destination project cannot be resolved; item failures
    /// are recorded in the summary instead.
    pub async fn run(&self, references: &ObjectReferences) -> Result<ImportSummary> {
        let start_time = Instant::now();
        let mut summary = ImportSummary::new();

        let project = self.platform.get_project(&self.project_id).await?;
        tracing::info!(
            project = %project.id,
            dicoms = references.dicoms.len(),
            hl7s = references.hl7s.len(),
            fhirs = references.fhirs.len(),
            "Starting import"
        );

        self.import_imaging(&project, &references.dicoms, &mut summary)
            .await;

        for raw in &references.hl7s {
            if self.stop_requested(&mut summary) {
                break;
            }
            let result = async {
                let id: MessageId = raw.parse().map_err(ImportError::MalformedSourceRecord)?;
                self.import_message(&project, &id).await
            };
            summary.record(self.run_item(ItemKind::Hl7, raw, result).await);
        }

        for raw in &references.fhirs {
            if self.stop_requested(&mut summary) {
                break;
            }
            let result = async {
                let reference: ResourceRef =
                    raw.parse().map_err(ImportError::MalformedSourceRecord)?;
                self.import_resource(&project, &reference).await
            };
            summary.record(self.run_item(ItemKind::Fhir, raw, result).await);
        }

        let summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    async fn import_imaging(&self, project: &Project, uids: &[String], summary: &mut ImportSummary) {
        let mut keys = BTreeSet::new();
        for uid in uids {
            let found = self
                .search_uid(uid)
                .instrument(item_span(ItemKind::Dicom.as_str(), uid))
                .await;
            match found {
                Ok(found) if found.is_empty() => {
                    let status = ItemStatus::Skipped {
                        reason: "no series matched the uid".to_string(),
                    };
                    log_item_outcome!(ItemKind::Dicom.as_str(), uid, status.label(), "no series matched");
                    summary.record(ItemOutcome::new(ItemKind::Dicom, uid.as_str(), status));
                }
                Ok(found) => keys.extend(found),
                Err(e) => {
                    log_item_outcome!(ItemKind::Dicom.as_str(), uid, "failed", e);
                    summary.record(ItemOutcome::new(
                        ItemKind::Dicom,
                        uid.as_str(),
                        ItemStatus::from_error(&e),
                    ));
                }
            }
        }

        for key in &keys {
            if self.stop_requested(summary) {
                return;
            }
            let outcome = self
                .run_item(ItemKind::Dicom, key.series_uid(), self.import_series(project, key))
                .await;
            summary.record(outcome);
        }
    }

    /// Series matching `uid` as a study or a series instance UID
    async fn search_uid(&self, uid: &str) -> Result<BTreeSet<SeriesKey>> {
        let mut keys = BTreeSet::new();
        for field in UidField::ALL {
            keys.extend(self.store.search_series(field, uid).await?);
        }
        tracing::debug!(series = keys.len(), "UID searched");
        Ok(keys)
    }

    async fn run_item<F>(&self, kind: ItemKind, key: &str, work: F) -> ItemOutcome
    where
        F: std::future::Future<Output = Result<ItemStatus>>,
    {
        let span = item_span(kind.as_str(), key);
        async {
            log_item_start!(kind.as_str(), key);
            let status = match work.await {
                Ok(status) => status,
                Err(e) => ItemStatus::from_error(&e),
            };
            match &status {
                ItemStatus::Imported { .. } => {
                    log_item_outcome!(kind.as_str(), key, status.label());
                }
                ItemStatus::Skipped { reason } | ItemStatus::Failed { reason, .. } => {
                    log_item_outcome!(kind.as_str(), key, status.label(), reason);
                }
            }
            ItemOutcome::new(kind, key, status)
        }
        .instrument(span)
        .await
    }

    fn stop_requested(&self, summary: &mut ImportSummary) -> bool {
        if *self.shutdown.borrow() {
            if !summary.interrupted {
                tracing::warn!("Shutdown requested, stopping before the next item");
            }
            summary.interrupted = true;
        }
        summary.interrupted
    }

    async fn import_series(&self, project: &Project, key: &SeriesKey) -> Result<ItemStatus> {
        // removed on drop, whichever way this item ends
        let scratch = self.scratch_dir()?;
        let series_dir = scratch.path().join(key.series_uid());
        fs::create_dir(&series_dir)?;

        let files = self.store.retrieve_series(key, &series_dir).await?;
        tracing::debug!(study = %key.study_uid(), files = files.len(), "Series retrieved");

        let archives = SeriesPackager::new(IdentificationPolicy::from(&self.settings))
            .pack(&series_dir)?;
        if archives.is_empty() {
            return Ok(ItemStatus::Skipped {
                reason: "series has no instances".to_string(),
            });
        }

        let mut digests = Vec::with_capacity(archives.len());
        for (archive, metadata) in archives {
            match self.import_archive(project, &archive, metadata).await {
                Ok(digest) => digests.push(digest),
                Err(e) if digests.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        archive = %archive.display(),
                        uploaded = ?digests,
                        "Series failed after some archives were uploaded"
                    );
                    return Ok(ItemStatus::partially_uploaded(&e, digests));
                }
            }
        }
        Ok(ItemStatus::Imported {
            uploads: digests.len(),
            digests,
        })
    }

    async fn import_archive(
        &self,
        project: &Project,
        archive: &Path,
        metadata: CanonicalMetadata,
    ) -> Result<String> {
        let patient_id = metadata.patient_id.clone().ok_or_else(|| {
            ImportError::MalformedSourceRecord(format!(
                "{} has no patient identifier",
                archive.display()
            ))
        })?;
        let identity = SubjectIdentity::from_patient_id(patient_id);
        let mut metadata = metadata.without_patient_id();

        let path = self.resolve(project, &identity, &mut metadata).await?;
        let digest = archive_digest(archive)?;
        Uploader::new(self.platform.as_ref())
            .upload(
                &path,
                HierarchyLevel::Acquisition,
                Artifact::imaging(archive, &digest)?,
            )
            .await?;
        Ok(digest)
    }

    async fn import_message(&self, project: &Project, id: &MessageId) -> Result<ItemStatus> {
        let message = Hl7Message::from_json(self.store.get_message(id).await?)?;
        let mut metadata = normalize(&message)?;

        let path = self.resolve(project, &message.identity(), &mut metadata).await?;
        Uploader::new(self.platform.as_ref())
            .upload(&path, HierarchyLevel::Acquisition, Artifact::message(&message)?)
            .await?;
        Ok(ItemStatus::imported(1))
    }

    async fn import_resource(&self, project: &Project, reference: &ResourceRef) -> Result<ItemStatus> {
        let record = FhirAdapter::new(self.store.as_ref(), self.codes.as_ref())
            .load(reference)
            .await?;
        let mut metadata = record.metadata()?;

        let path = self.resolve(project, &record.identity(), &mut metadata).await?;
        Uploader::new(self.platform.as_ref())
            .upload(&path, record.placement(), Artifact::resource(&record)?)
            .await?;
        Ok(ItemStatus::imported(1))
    }

    async fn resolve(
        &self,
        project: &Project,
        identity: &SubjectIdentity,
        metadata: &mut CanonicalMetadata,
    ) -> Result<ResolvedPath> {
        let subject = SubjectResolver::new(
            self.identity.as_ref(),
            self.platform.as_ref(),
            self.settings.merge_policy,
        )
        .resolve(identity, project, metadata)
        .await?;

        HierarchyResolver::new(self.platform.as_ref(), project, self.conflict)
            .resolve_path(&subject, metadata)
            .await
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("hcimport-");
        let dir = match &self.settings.work_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}
