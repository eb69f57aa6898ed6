use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use super::{CandidatePatch, DocumentStore, StoreError, StoreEvent, WorkflowPatch};
use crate::verification::domain::{
    AuditLogEntry, CandidateId, CandidateProfile, HrProfile, HrProfileId,
};
use crate::verification::workflow::VerificationWorkflow;

const EVENT_CAPACITY: usize = 256;

#[derive(Default)]
struct Collections {
    candidates: HashMap<CandidateId, CandidateProfile>,
    workflows: HashMap<CandidateId, VerificationWorkflow>,
    audit_logs: Vec<AuditLogEntry>,
    hr_profiles: HashMap<HrProfileId, HrProfile>,
}

/// Process-local store used by the service binary and tests.
pub struct MemoryDocumentStore {
    collections: Mutex<Collections>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            collections: Mutex::new(Collections::default()),
            events,
        }
    }
}

impl MemoryDocumentStore {
    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn create_candidate(&self, profile: CandidateProfile) -> Result<CandidateProfile, StoreError> {
        {
            let mut guard = self.lock()?;
            if guard.candidates.contains_key(&profile.id) {
                return Err(StoreError::Conflict);
            }
            guard.candidates.insert(profile.id.clone(), profile.clone());
        }
        self.publish(StoreEvent::CandidateChanged(profile.id.clone()));
        Ok(profile)
    }

    fn merge_candidate(
        &self,
        id: &CandidateId,
        patch: CandidatePatch,
    ) -> Result<CandidateProfile, StoreError> {
        let merged = {
            let mut guard = self.lock()?;
            let profile = guard.candidates.get_mut(id).ok_or(StoreError::NotFound)?;
            if !patch.precondition_holds(profile) {
                return Err(StoreError::PreconditionFailed);
            }
            patch.apply(profile);
            profile.clone()
        };
        self.publish(StoreEvent::CandidateChanged(id.clone()));
        Ok(merged)
    }

    fn candidate(&self, id: &CandidateId) -> Result<Option<CandidateProfile>, StoreError> {
        Ok(self.lock()?.candidates.get(id).cloned())
    }

    fn candidates(&self) -> Result<Vec<CandidateProfile>, StoreError> {
        let mut all: Vec<_> = self.lock()?.candidates.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    fn merge_workflow(
        &self,
        id: &CandidateId,
        patch: WorkflowPatch,
    ) -> Result<VerificationWorkflow, StoreError> {
        let merged = {
            let mut guard = self.lock()?;
            let workflow = guard
                .workflows
                .entry(id.clone())
                .or_insert_with(|| VerificationWorkflow::idle(id.clone(), patch.last_updated_at));
            patch.apply(workflow);
            workflow.clone()
        };
        self.publish(StoreEvent::WorkflowChanged(id.clone()));
        Ok(merged)
    }

    fn workflow(&self, id: &CandidateId) -> Result<Option<VerificationWorkflow>, StoreError> {
        Ok(self.lock()?.workflows.get(id).cloned())
    }

    fn append_audit(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        let id = entry.id.clone();
        {
            let mut guard = self.lock()?;
            if guard.audit_logs.iter().any(|existing| existing.id == entry.id) {
                return Err(StoreError::Conflict);
            }
            guard.audit_logs.push(entry);
        }
        self.publish(StoreEvent::AuditAppended(id));
        Ok(())
    }

    fn audit_log(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        let mut entries = self.lock()?.audit_logs.clone();
        // Stable sort keeps insertion order reversed for identical timestamps.
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    fn create_hr_profile(&self, profile: HrProfile) -> Result<HrProfile, StoreError> {
        {
            let mut guard = self.lock()?;
            if guard.hr_profiles.contains_key(&profile.id) {
                return Err(StoreError::Conflict);
            }
            guard.hr_profiles.insert(profile.id.clone(), profile.clone());
        }
        self.publish(StoreEvent::HrProfileCreated(profile.id.clone()));
        Ok(profile)
    }

    fn hr_profile(&self, id: &HrProfileId) -> Result<Option<HrProfile>, StoreError> {
        Ok(self.lock()?.hr_profiles.get(id).cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::domain::{AuditAction, ProfileStatus, Score};
    use chrono::{Duration, Utc};

    fn profile(id: &str, offset_minutes: i64) -> CandidateProfile {
        CandidateProfile::pending(
            CandidateId(id.to_string()),
            format!("Candidate {id}"),
            format!("{id}@example.com"),
            "Engineer",
            Utc::now() + Duration::minutes(offset_minutes),
        )
    }

    #[test]
    fn merge_only_touches_named_fields() {
        let store = MemoryDocumentStore::default();
        store.create_candidate(profile("a", 0)).expect("created");

        let merged = store
            .merge_candidate(
                &CandidateId("a".to_string()),
                CandidatePatch {
                    trust_score: Score::new(88),
                    ..CandidatePatch::default()
                },
            )
            .expect("merged");

        assert_eq!(merged.trust_score.value(), 88);
        assert_eq!(merged.full_name, "Candidate a");
        assert_eq!(merged.profile_status, ProfileStatus::PendingDocuments);
    }

    #[test]
    fn candidates_are_listed_newest_first() {
        let store = MemoryDocumentStore::default();
        store.create_candidate(profile("old", -10)).expect("created");
        store.create_candidate(profile("new", 10)).expect("created");
        store.create_candidate(profile("mid", 0)).expect("created");

        let ids: Vec<_> = store
            .candidates()
            .expect("listed")
            .into_iter()
            .map(|candidate| candidate.id.0)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn unshortlisted_precondition_blocks_second_write() {
        let store = MemoryDocumentStore::default();
        store.create_candidate(profile("a", 0)).expect("created");
        let id = CandidateId("a".to_string());
        let patch = CandidatePatch {
            is_shortlisted: Some(true),
            require_unshortlisted: true,
            ..CandidatePatch::default()
        };

        store.merge_candidate(&id, patch.clone()).expect("first write");
        assert_eq!(
            store.merge_candidate(&id, patch),
            Err(StoreError::PreconditionFailed)
        );
    }

    #[test]
    fn status_precondition_is_checked_before_merging() {
        let store = MemoryDocumentStore::default();
        store.create_candidate(profile("a", 0)).expect("created");
        let id = CandidateId("a".to_string());
        store
            .merge_candidate(
                &id,
                CandidatePatch {
                    profile_status: Some(ProfileStatus::Rejected),
                    ..CandidatePatch::default()
                },
            )
            .expect("rejected");

        let promote = CandidatePatch {
            is_shortlisted: Some(true),
            require_status: Some(ProfileStatus::Verified),
            ..CandidatePatch::default()
        };
        assert_eq!(
            store.merge_candidate(&id, promote),
            Err(StoreError::PreconditionFailed)
        );
        let stored = store.candidate(&id).expect("read").expect("present");
        assert!(!stored.is_shortlisted);
        assert_eq!(stored.profile_status, ProfileStatus::Rejected);
    }

    #[test]
    fn audit_log_is_newest_first_and_rejects_duplicate_ids() {
        let store = MemoryDocumentStore::default();
        let actor = HrProfileId("hr-1".to_string());
        let now = Utc::now();
        let first = AuditLogEntry::new(actor.clone(), AuditAction::RuleSet, "first", now);
        let second = AuditLogEntry::new(
            actor,
            AuditAction::SystemInitialized,
            "second",
            now + Duration::seconds(1),
        );

        store.append_audit(first.clone()).expect("appended");
        store.append_audit(second).expect("appended");
        assert_eq!(store.append_audit(first), Err(StoreError::Conflict));

        let notes: Vec<_> = store
            .audit_log()
            .expect("listed")
            .into_iter()
            .map(|entry| entry.notes)
            .collect();
        assert_eq!(notes, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn writes_are_pushed_to_subscribers() {
        let store = MemoryDocumentStore::default();
        let mut events = store.subscribe();
        store.create_candidate(profile("a", 0)).expect("created");

        let event = events.recv().await.expect("event delivered");
        assert_eq!(event, StoreEvent::CandidateChanged(CandidateId("a".to_string())));
    }
}
