use std::sync::Arc;

use certledger_history::{HistoryEntry, HistoryLog, NewEntry};
use certledger_store::{RecordStore, StoreError, StoreResult};
use certledger_types::{Clock, DocumentView, Record, SystemClock, Timestamp, TxId, Version};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::locks::KeyLocks;

/// Caller-supplied fields for a new document. `updatedAt` is assigned by
/// the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub id: String,
    pub organization: String,
    pub document_type: String,
    pub document_name: String,
    pub student_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    pub issue_date: String,
    pub image_hash: String,
    pub owner: String,
}

impl NewDocument {
    fn into_record(self, updated_at: Timestamp) -> Record {
        Record {
            id: self.id,
            organization: self.organization,
            document_type: self.document_type,
            document_name: self.document_name,
            student_name: self.student_name,
            grade: self.grade,
            issue_date: self.issue_date,
            image_hash: self.image_hash,
            owner: self.owner,
            updated_at,
        }
    }
}

/// A partial update.
///
/// `owner` authorizes the change and must equal the stored owner. Every
/// other field that is `Some` replaces the stored value; `None` keeps it.
/// A grade can be set or changed but not removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    pub owner: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub issue_date: Option<String>,
    #[serde(default)]
    pub image_hash: Option<String>,
}

impl DocumentPatch {
    /// Field names accepted by [`set`](Self::set), as they appear in JSON.
    pub const FIELDS: [&'static str; 7] = [
        "organization",
        "documentType",
        "documentName",
        "studentName",
        "grade",
        "issueDate",
        "imageHash",
    ];

    /// An empty patch authorized by `owner`.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..Self::default()
        }
    }

    /// Set one field by its JSON name.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> RegistryResult<()> {
        let slot = match field {
            "organization" => &mut self.organization,
            "documentType" => &mut self.document_type,
            "documentName" => &mut self.document_name,
            "studentName" => &mut self.student_name,
            "grade" => &mut self.grade,
            "issueDate" => &mut self.issue_date,
            "imageHash" => &mut self.image_hash,
            "id" | "owner" | "updatedAt" => {
                return Err(RegistryError::InvalidArgument(format!(
                    "field {field} cannot be updated"
                )))
            }
            other => {
                return Err(RegistryError::InvalidArgument(format!(
                    "unknown field {other}; expected one of {}",
                    Self::FIELDS.join(", ")
                )))
            }
        };
        *slot = Some(value.into());
        Ok(())
    }

    /// `true` if no field would change.
    pub fn is_empty(&self) -> bool {
        self.organization.is_none()
            && self.document_type.is_none()
            && self.document_name.is_none()
            && self.student_name.is_none()
            && self.grade.is_none()
            && self.issue_date.is_none()
            && self.image_hash.is_none()
    }

    fn apply_to(&self, record: &mut Record) {
        fn merge(slot: &mut String, value: &Option<String>) {
            if let Some(v) = value {
                slot.clone_from(v);
            }
        }
        merge(&mut record.organization, &self.organization);
        merge(&mut record.document_type, &self.document_type);
        merge(&mut record.document_name, &self.document_name);
        merge(&mut record.student_name, &self.student_name);
        merge(&mut record.issue_date, &self.issue_date);
        merge(&mut record.image_hash, &self.image_hash);
        if self.grade.is_some() {
            record.grade.clone_from(&self.grade);
        }
    }
}

/// Outcome of [`Registry::seed`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    pub inserted: Vec<String>,
    pub skipped: Vec<String>,
}

/// Documents written by [`Registry::seed`].
pub fn fixtures() -> Vec<NewDocument> {
    vec![NewDocument {
        id: "0001".into(),
        organization: "ISCTEM".into(),
        document_type: "Diploma".into(),
        document_name: "Backend development certification".into(),
        student_name: "Satoshi Nakamoto".into(),
        grade: None,
        issue_date: "Wed Aug 17 2022".into(),
        image_hash: "haldsjfdowiruflakdflkajf".into(),
        owner: "ISCTEM".into(),
    }]
}

/// The document registry.
///
/// Owns no data itself: live records live in `S`, the audit trail in `H`.
/// Records are stored in canonical encoding, so equal records are
/// byte-identical in the store.
pub struct Registry<S, H> {
    store: S,
    history: H,
    clock: Arc<dyn Clock>,
    locks: KeyLocks,
}

impl<S: RecordStore, H: HistoryLog> Registry<S, H> {
    /// Create a registry over `store` and `history` using the system clock.
    pub fn new(store: S, history: H) -> Self {
        Self::with_clock(store, history, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, history: H, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            history,
            clock,
            locks: KeyLocks::default(),
        }
    }

    /// Replace the key-lock table with one of `stripes` mutexes.
    pub fn with_lock_stripes(mut self, stripes: usize) -> Self {
        self.locks = KeyLocks::new(stripes);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a document. Fails if the id is live or a required field is
    /// blank.
    pub fn issue(&self, doc: NewDocument) -> RegistryResult<Record> {
        let record = doc.into_record(self.clock.now());
        record
            .validate()
            .map_err(|e| RegistryError::InvalidArgument(e.to_string()))?;

        let id = record.id.clone();
        let _guard = self.locks.lock(&id);

        if self.store.exists(&id)? {
            return Err(RegistryError::AlreadyExists(id));
        }

        let bytes = certledger_codec::encode(&record)?;
        let version = self
            .store
            .put_if(&id, bytes.clone(), None)
            .map_err(|e| match e {
                StoreError::VersionConflict { .. } => RegistryError::AlreadyExists(id.clone()),
                other => other.into(),
            })?;

        let tx_id = TxId::new();
        self.record_history(
            &id,
            &NewEntry::write(tx_id, version, record.updated_at, bytes),
            || self.store.delete(&id),
        )?;

        info!(id = %id, %version, tx = %tx_id.short_id(), owner = %record.owner, "document issued");
        Ok(record)
    }

    /// Read one live document.
    pub fn read(&self, id: &str) -> RegistryResult<Record> {
        let stored = self.store.get(id).map_err(|e| not_found(id, e))?;
        certledger_codec::decode(&stored.bytes).map_err(|e| RegistryError::Decode {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn exists(&self, id: &str) -> RegistryResult<bool> {
        Ok(self.store.exists(id)?)
    }

    /// Merge `patch` into the live document, if `patch.owner` owns it.
    ///
    /// A rejected update leaves the stored bytes and the history untouched.
    pub fn update(&self, id: &str, patch: DocumentPatch) -> RegistryResult<Record> {
        let _guard = self.locks.lock(id);

        let stored = self.store.get(id).map_err(|e| not_found(id, e))?;
        let current: Record =
            certledger_codec::decode(&stored.bytes).map_err(|e| RegistryError::Decode {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        if !current.is_owned_by(&patch.owner) {
            warn!(id, owner = %patch.owner, "update rejected: owner mismatch");
            return Err(RegistryError::Forbidden {
                id: id.to_string(),
                owner: patch.owner,
            });
        }

        let mut merged = current.clone();
        patch.apply_to(&mut merged);
        merged.updated_at = self.clock.now().strictly_after(current.updated_at);
        merged
            .validate()
            .map_err(|e| RegistryError::InvalidArgument(e.to_string()))?;

        let bytes = certledger_codec::encode(&merged)?;
        let version = self
            .store
            .put_if(id, bytes.clone(), Some(stored.version))
            .map_err(|e| match e {
                StoreError::VersionConflict { .. } => RegistryError::Conflict(id.to_string()),
                other => other.into(),
            })?;

        let tx_id = TxId::new();
        self.record_history(
            id,
            &NewEntry::write(tx_id, version, merged.updated_at, bytes),
            || self.store.put_if(id, stored.bytes.clone(), Some(version)),
        )?;

        info!(id, %version, tx = %tx_id.short_id(), "document updated");
        Ok(merged)
    }

    /// Remove the live document and record a tombstone.
    ///
    /// The tombstone is stamped after the record's `updatedAt`. A record
    /// whose bytes no longer decode is still deletable.
    pub fn delete(&self, id: &str) -> RegistryResult<()> {
        let _guard = self.locks.lock(id);

        let stored = self.store.get(id).map_err(|e| not_found(id, e))?;
        let now = self.clock.now();
        let deleted_at = match certledger_codec::decode::<Record>(&stored.bytes) {
            Ok(current) => now.strictly_after(current.updated_at),
            Err(_) => now,
        };

        let version = self.store.delete(id).map_err(|e| not_found(id, e))?;
        let tx_id = TxId::new();
        self.record_history(
            id,
            &NewEntry::tombstone(tx_id, version, deleted_at),
            || self.store.put_if(id, stored.bytes.clone(), None),
        )?;

        info!(id, %version, tx = %tx_id.short_id(), "document deleted");
        Ok(())
    }

    /// Every live document in id order. Undecodable entries come back as
    /// [`DocumentView::Raw`].
    pub fn list_all(&self) -> RegistryResult<Vec<DocumentView>> {
        let views = self
            .store
            .scan_all()?
            .map(|(id, stored)| match certledger_codec::decode::<Record>(&stored.bytes) {
                Ok(record) => DocumentView::Document(record),
                Err(e) => {
                    warn!(id = %id, error = %e, "undecodable document; returning raw value");
                    DocumentView::Raw(String::from_utf8_lossy(&stored.bytes).into_owned())
                }
            })
            .collect::<Vec<_>>();
        debug!(count = views.len(), "listed documents");
        Ok(views)
    }

    /// Full audit trail of `id`, oldest first. Empty if it never existed.
    pub fn history(&self, id: &str) -> RegistryResult<Vec<HistoryEntry>> {
        Ok(self.history.history(id)?)
    }

    /// Append `entry` to `id`'s history, or run `undo` against the store
    /// and return the history error.
    ///
    /// Called with the key lock held, right after the store commit, so a
    /// failed append never leaves a committed write without its history
    /// entry. `undo` is a compensating write: the key's version still
    /// advances past it.
    fn record_history(
        &self,
        id: &str,
        entry: &NewEntry,
        undo: impl FnOnce() -> StoreResult<Version>,
    ) -> RegistryResult<()> {
        let Err(err) = self.history.append(id, entry) else {
            return Ok(());
        };
        match undo() {
            Ok(version) => {
                warn!(id, %version, error = %err, "history append failed; store write undone");
            }
            Err(undo_err) => {
                error!(
                    id,
                    error = %err,
                    undo_error = %undo_err,
                    "history append failed and the store write could not be undone"
                );
            }
        }
        Err(err.into())
    }

    /// Issue each fixture document that is not already live.
    pub fn seed(&self) -> RegistryResult<SeedReport> {
        let mut report = SeedReport::default();
        for doc in fixtures() {
            let id = doc.id.clone();
            if self.store.exists(&id)? {
                report.skipped.push(id);
                continue;
            }
            match self.issue(doc) {
                Ok(_) => report.inserted.push(id),
                Err(RegistryError::AlreadyExists(_)) => report.skipped.push(id),
                Err(e) => return Err(e),
            }
        }
        info!(
            inserted = report.inserted.len(),
            skipped = report.skipped.len(),
            "ledger seeded"
        );
        Ok(report)
    }
}

impl<S, H> std::fmt::Debug for Registry<S, H>
where
    S: std::fmt::Debug,
    H: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("store", &self.store)
            .field("history", &self.history)
            .field("locks", &self.locks)
            .finish()
    }
}

fn not_found(id: &str, err: StoreError) -> RegistryError {
    match err {
        StoreError::NotFound(_) => RegistryError::NotFound(id.to_string()),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certledger_history::InMemoryHistoryLog;
    use certledger_store::InMemoryRecordStore;
    use certledger_types::ManualClock;

    type TestRegistry = Registry<InMemoryRecordStore, InMemoryHistoryLog>;

    const START_MS: i64 = 1_660_730_400_000;

    fn registry() -> (TestRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(START_MS)));
        let registry = Registry::with_clock(
            InMemoryRecordStore::new(),
            InMemoryHistoryLog::new(),
            clock.clone(),
        );
        (registry, clock)
    }

    fn diploma(id: &str) -> NewDocument {
        NewDocument {
            id: id.into(),
            ..fixtures().remove(0)
        }
    }

    fn patch(owner: &str) -> DocumentPatch {
        DocumentPatch::new(owner)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn full_lifecycle_scenario() {
        let (registry, clock) = registry();

        let issued = registry.issue(diploma("0001")).unwrap();
        assert_eq!(registry.read("0001").unwrap(), issued);

        clock.advance(1_000);
        let err = registry
            .update("0001", DocumentPatch { grade: Some("B".into()), ..patch("OTHER") })
            .unwrap_err();
        assert!(matches!(err, RegistryError::Forbidden { ref owner, .. } if owner == "OTHER"));

        clock.advance(1_000);
        registry
            .update("0001", DocumentPatch { grade: Some("A".into()), ..patch("ISCTEM") })
            .unwrap();
        let updated = registry.read("0001").unwrap();
        assert_eq!(updated.grade.as_deref(), Some("A"));
        assert!(updated.updated_at > issued.updated_at);

        registry.delete("0001").unwrap();
        assert!(matches!(registry.read("0001"), Err(RegistryError::NotFound(_))));

        let history = registry.history("0001").unwrap();
        assert_eq!(history.len(), 3);
        assert!(!history[0].is_delete);
        assert_eq!(
            history[1].value.as_ref().and_then(DocumentView::as_record).and_then(|r| r.grade.as_deref()),
            Some("A")
        );
        assert!(history[2].is_delete);
        assert!(history[2].value.is_none());
    }

    #[test]
    fn issue_assigns_clock_time() {
        let (registry, _clock) = registry();
        let record = registry.issue(diploma("0001")).unwrap();
        assert_eq!(record.updated_at, Timestamp::from_millis(START_MS));
        assert_eq!(record.owner, "ISCTEM");
    }

    #[test]
    fn issue_twice_fails_already_exists() {
        let (registry, _clock) = registry();
        registry.issue(diploma("0001")).unwrap();
        let err = registry.issue(diploma("0001")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(id) if id == "0001"));
        assert_eq!(registry.history("0001").unwrap().len(), 1);
    }

    #[test]
    fn issue_rejects_blank_required_field() {
        let (registry, _clock) = registry();
        let mut doc = diploma("0001");
        doc.image_hash = String::new();
        let err = registry.issue(doc).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(msg) if msg.contains("imageHash")));
        assert!(!registry.exists("0001").unwrap());

        let mut doc = diploma("");
        doc.grade = Some("A".into());
        assert!(matches!(registry.issue(doc), Err(RegistryError::InvalidArgument(_))));
    }

    #[test]
    fn stored_bytes_are_canonical() {
        let (registry, _clock) = registry();
        let record = registry.issue(diploma("0001")).unwrap();
        let stored = registry.store().get("0001").unwrap();
        assert_eq!(stored.bytes, certledger_codec::encode(&record).unwrap());
    }

    #[test]
    fn read_missing_is_not_found() {
        let (registry, _clock) = registry();
        assert!(matches!(registry.read("nope"), Err(RegistryError::NotFound(id)) if id == "nope"));
        assert!(!registry.exists("nope").unwrap());
    }

    #[test]
    fn read_of_corrupt_bytes_is_decode_error() {
        let (registry, _clock) = registry();
        registry.store().put("bad", b"{broken".to_vec()).unwrap();
        assert!(matches!(registry.read("bad"), Err(RegistryError::Decode { .. })));
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    #[test]
    fn update_missing_is_not_found() {
        let (registry, _clock) = registry();
        let err = registry.update("ghost", patch("ISCTEM")).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert!(registry.history("ghost").unwrap().is_empty());
    }

    #[test]
    fn forbidden_update_leaves_record_untouched() {
        let (registry, clock) = registry();
        registry.issue(diploma("0001")).unwrap();
        let before = registry.store().get("0001").unwrap();

        clock.advance(10);
        let err = registry
            .update("0001", DocumentPatch { student_name: Some("Mallory".into()), ..patch("OTHER") })
            .unwrap_err();
        assert!(matches!(err, RegistryError::Forbidden { .. }));

        assert_eq!(registry.store().get("0001").unwrap(), before);
        assert_eq!(registry.history("0001").unwrap().len(), 1);
    }

    #[test]
    fn update_merges_and_preserves_unset_fields() {
        let (registry, clock) = registry();
        let original = registry.issue(diploma("0001")).unwrap();

        clock.advance(5);
        let updated = registry
            .update(
                "0001",
                DocumentPatch {
                    document_name: Some("Frontend certification".into()),
                    ..patch("ISCTEM")
                },
            )
            .unwrap();

        assert_eq!(updated.document_name, "Frontend certification");
        assert_eq!(updated.student_name, original.student_name);
        assert_eq!(updated.image_hash, original.image_hash);
        assert_eq!(updated.id, "0001");
        assert_eq!(updated.owner, "ISCTEM");
        assert_eq!(registry.read("0001").unwrap(), updated);
    }

    #[test]
    fn grade_cannot_be_cleared() {
        let (registry, _clock) = registry();
        let mut doc = diploma("0001");
        doc.grade = Some("A".into());
        registry.issue(doc).unwrap();

        let updated = registry
            .update("0001", DocumentPatch { organization: Some("UEM".into()), ..patch("ISCTEM") })
            .unwrap();
        assert_eq!(updated.grade.as_deref(), Some("A"));
        assert_eq!(updated.organization, "UEM");
    }

    #[test]
    fn update_rejects_blanking_a_required_field() {
        let (registry, _clock) = registry();
        registry.issue(diploma("0001")).unwrap();
        let err = registry
            .update("0001", DocumentPatch { student_name: Some(" ".into()), ..patch("ISCTEM") })
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
        assert_eq!(registry.history("0001").unwrap().len(), 1);
    }

    #[test]
    fn updated_at_strictly_increases_with_stalled_clock() {
        let (registry, clock) = registry();
        let issued = registry.issue(diploma("0001")).unwrap();
        let first = registry.update("0001", patch("ISCTEM")).unwrap();
        let second = registry.update("0001", patch("ISCTEM")).unwrap();
        assert!(first.updated_at > issued.updated_at);
        assert!(second.updated_at > first.updated_at);

        // Clock stepping backwards still moves forward.
        clock.set(Timestamp::from_millis(0));
        let third = registry.update("0001", patch("ISCTEM")).unwrap();
        assert!(third.updated_at > second.updated_at);
    }

    #[test]
    fn patch_set_by_name() {
        let mut p = patch("ISCTEM");
        assert!(p.is_empty());
        p.set("grade", "A").unwrap();
        p.set("issueDate", "Thu Aug 18 2022").unwrap();
        assert_eq!(p.grade.as_deref(), Some("A"));
        assert_eq!(p.issue_date.as_deref(), Some("Thu Aug 18 2022"));
        assert!(!p.is_empty());

        assert!(matches!(p.set("owner", "X"), Err(RegistryError::InvalidArgument(_))));
        assert!(matches!(p.set("id", "X"), Err(RegistryError::InvalidArgument(_))));
        assert!(matches!(p.set("colour", "X"), Err(RegistryError::InvalidArgument(_))));
    }

    // -----------------------------------------------------------------------
    // Delete and versions
    // -----------------------------------------------------------------------

    #[test]
    fn delete_missing_is_not_found() {
        let (registry, _clock) = registry();
        assert!(matches!(registry.delete("ghost"), Err(RegistryError::NotFound(_))));
        assert!(registry.history("ghost").unwrap().is_empty());
    }

    #[test]
    fn versions_are_monotonic_across_delete_and_reissue() {
        let (registry, _clock) = registry();
        registry.issue(diploma("0001")).unwrap();
        registry.update("0001", patch("ISCTEM")).unwrap();
        registry.delete("0001").unwrap();
        registry.issue(diploma("0001")).unwrap();

        let versions: Vec<Version> = registry
            .history("0001")
            .unwrap()
            .iter()
            .map(|e| e.version)
            .collect();
        assert_eq!(
            versions,
            vec![Version::new(1), Version::new(2), Version::new(3), Version::new(4)]
        );
        assert_eq!(registry.store().get("0001").unwrap().version, Version::new(4));
    }

    #[test]
    fn every_commit_gets_its_own_tx_id() {
        let (registry, _clock) = registry();
        registry.issue(diploma("0001")).unwrap();
        registry.update("0001", patch("ISCTEM")).unwrap();
        registry.delete("0001").unwrap();
        let history = registry.history("0001").unwrap();
        assert_ne!(history[0].tx_id, history[1].tx_id);
        assert_ne!(history[1].tx_id, history[2].tx_id);
    }

    #[test]
    fn tombstone_is_stamped_after_last_update_with_stalled_clock() {
        let (registry, clock) = registry();
        registry.issue(diploma("0001")).unwrap();
        let updated = registry.update("0001", patch("ISCTEM")).unwrap();

        clock.set(Timestamp::from_millis(0));
        registry.delete("0001").unwrap();

        let history = registry.history("0001").unwrap();
        assert!(history[2].is_delete);
        assert!(history[2].timestamp > updated.updated_at);
        assert!(history[2].timestamp > history[1].timestamp);
    }

    #[test]
    fn corrupt_document_can_still_be_deleted() {
        let (registry, _clock) = registry();
        registry.store().put("0009", b"not json".to_vec()).unwrap();
        registry.delete("0009").unwrap();
        assert!(!registry.exists("0009").unwrap());
        assert!(registry.history("0009").unwrap()[0].is_delete);
    }

    // -----------------------------------------------------------------------
    // History failures
    // -----------------------------------------------------------------------

    /// History log that rejects appends while `failing` is set.
    #[derive(Default)]
    struct FlakyLog {
        inner: InMemoryHistoryLog,
        failing: std::sync::atomic::AtomicBool,
    }

    impl FlakyLog {
        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl HistoryLog for FlakyLog {
        fn append(&self, key: &str, entry: &NewEntry) -> certledger_history::HistoryResult<()> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(certledger_history::HistoryError::LockPoisoned);
            }
            self.inner.append(key, entry)
        }

        fn history(&self, key: &str) -> certledger_history::HistoryResult<Vec<HistoryEntry>> {
            self.inner.history(key)
        }

        fn entry_count(&self, key: &str) -> certledger_history::HistoryResult<usize> {
            self.inner.entry_count(key)
        }

        fn keys(&self) -> certledger_history::HistoryResult<Vec<String>> {
            self.inner.keys()
        }
    }

    fn flaky_registry() -> Registry<InMemoryRecordStore, FlakyLog> {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(START_MS)));
        Registry::with_clock(InMemoryRecordStore::new(), FlakyLog::default(), clock)
    }

    #[test]
    fn failed_history_append_undoes_issue() {
        let registry = flaky_registry();
        let log = &registry.history;

        log.set_failing(true);
        let err = registry.issue(diploma("0001")).unwrap_err();
        assert!(matches!(err, RegistryError::History(_)));
        assert!(!registry.exists("0001").unwrap());
        assert!(registry.history("0001").unwrap().is_empty());

        log.set_failing(false);
        registry.issue(diploma("0001")).unwrap();
        assert!(registry.exists("0001").unwrap());
        assert_eq!(registry.history("0001").unwrap().len(), 1);
    }

    #[test]
    fn failed_history_append_undoes_update() {
        let registry = flaky_registry();
        let log = &registry.history;
        let issued = registry.issue(diploma("0001")).unwrap();

        log.set_failing(true);
        let err = registry
            .update("0001", DocumentPatch { grade: Some("A".into()), ..patch("ISCTEM") })
            .unwrap_err();
        assert!(matches!(err, RegistryError::History(_)));
        assert_eq!(registry.read("0001").unwrap(), issued);
        assert_eq!(registry.history("0001").unwrap().len(), 1);

        log.set_failing(false);
        let updated = registry
            .update("0001", DocumentPatch { grade: Some("A".into()), ..patch("ISCTEM") })
            .unwrap();
        let history = registry.history("0001").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].version > history[0].version);
        assert_eq!(
            history[1].value.as_ref().and_then(DocumentView::as_record),
            Some(&updated)
        );
    }

    #[test]
    fn failed_history_append_undoes_delete() {
        let registry = flaky_registry();
        let log = &registry.history;
        let issued = registry.issue(diploma("0001")).unwrap();

        log.set_failing(true);
        let err = registry.delete("0001").unwrap_err();
        assert!(matches!(err, RegistryError::History(_)));
        assert_eq!(registry.read("0001").unwrap(), issued);
        assert_eq!(registry.history("0001").unwrap().len(), 1);

        log.set_failing(false);
        registry.delete("0001").unwrap();
        assert!(!registry.exists("0001").unwrap());
        assert!(registry.history("0001").unwrap()[1].is_delete);
    }

    // -----------------------------------------------------------------------
    // Bulk reads
    // -----------------------------------------------------------------------

    #[test]
    fn list_all_empty() {
        let (registry, _clock) = registry();
        assert!(registry.list_all().unwrap().is_empty());
    }

    #[test]
    fn list_all_is_ordered_and_skips_deleted() {
        let (registry, _clock) = registry();
        for id in ["0003", "0001", "0002"] {
            registry.issue(diploma(id)).unwrap();
        }
        registry.delete("0002").unwrap();

        let ids: Vec<String> = registry
            .list_all()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_record().map(|r| r.id.clone()))
            .collect();
        assert_eq!(ids, vec!["0001", "0003"]);
    }

    #[test]
    fn list_all_degrades_corrupt_entry_to_raw() {
        let (registry, _clock) = registry();
        registry.issue(diploma("0001")).unwrap();
        registry.store().put("0002", b"not json".to_vec()).unwrap();
        registry.issue(diploma("0003")).unwrap();

        let views = registry.list_all().unwrap();
        assert_eq!(views.len(), 3);
        assert!(views[0].as_record().is_some());
        assert_eq!(views[1], DocumentView::Raw("not json".into()));
        assert!(views[2].as_record().is_some());
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    #[test]
    fn seed_is_idempotent() {
        let (registry, _clock) = registry();
        let first = registry.seed().unwrap();
        assert_eq!(first.inserted, vec!["0001"]);
        assert!(first.skipped.is_empty());

        let second = registry.seed().unwrap();
        assert!(second.inserted.is_empty());
        assert_eq!(second.skipped, vec!["0001"]);

        assert_eq!(registry.list_all().unwrap().len(), 1);
        assert_eq!(registry.history("0001").unwrap().len(), 1);
        let seeded = registry.read("0001").unwrap();
        assert_eq!(seeded.student_name, "Satoshi Nakamoto");
    }

    #[test]
    fn seed_does_not_overwrite_existing_document() {
        let (registry, _clock) = registry();
        let mut doc = diploma("0001");
        doc.student_name = "Hal Finney".into();
        registry.issue(doc).unwrap();

        let report = registry.seed().unwrap();
        assert_eq!(report.skipped, vec!["0001"]);
        assert_eq!(registry.read("0001").unwrap().student_name, "Hal Finney");
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_updates_never_lose_a_write() {
        let (registry, _clock) = registry();
        registry.issue(diploma("0001")).unwrap();

        let threads = 8;
        let per_thread = 25;
        std::thread::scope(|s| {
            for t in 0..threads {
                let registry = &registry;
                s.spawn(move || {
                    for n in 0..per_thread {
                        let p = DocumentPatch {
                            grade: Some(format!("T{t}-{n}")),
                            ..DocumentPatch::new("ISCTEM")
                        };
                        registry.update("0001", p).unwrap();
                    }
                });
            }
        });

        let history = registry.history("0001").unwrap();
        assert_eq!(history.len(), 1 + threads * per_thread);
        for pair in history.windows(2) {
            assert!(pair[1].version > pair[0].version);
            assert!(pair[1].timestamp > pair[0].timestamp);
        }

        let last = history.last().and_then(|e| e.value.as_ref()).and_then(DocumentView::as_record);
        let current = registry.read("0001").unwrap();
        assert_eq!(last, Some(&current));
    }

    #[test]
    fn concurrent_issues_of_one_id_admit_exactly_one() {
        let (registry, _clock) = registry();
        let results: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let registry = &registry;
                    s.spawn(move || registry.issue(diploma("0007")).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread should not panic"))
                .collect()
        });
        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(registry.history("0007").unwrap().len(), 1);
    }
}
