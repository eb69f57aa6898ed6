//! Auto-shortlist rule and its reactive evaluator.
//!
//! A verified, not-yet-shortlisted candidate whose trust score is at least the minimum and
//! whose fraud risk is at most the maximum gets shortlisted once. The `is_shortlisted ==
//! false` guard makes re-evaluation free of extra writes, so the evaluator can rerun on
//! every candidate or rule change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::domain::{
    AuditAction, AuditLogEntry, CandidateId, CandidateProfile, HrProfileId, ProfileStatus, Score,
};
use super::store::{CandidatePatch, DocumentStore, StoreError};

/// Recruiter-configured thresholds. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoShortlistRule {
    pub min_trust_score: Score,
    pub max_risk_score: Score,
}

impl Default for AutoShortlistRule {
    fn default() -> Self {
        Self {
            min_trust_score: Score::new(80).unwrap_or_default(),
            max_risk_score: Score::new(20).unwrap_or_default(),
        }
    }
}

impl AutoShortlistRule {
    pub fn new(min_trust_score: u8, max_risk_score: u8) -> Result<Self, RuleError> {
        Ok(Self {
            min_trust_score: Score::new(min_trust_score).ok_or(RuleError::OutOfRange {
                field: "minTrustScore",
                value: min_trust_score,
            })?,
            max_risk_score: Score::new(max_risk_score).ok_or(RuleError::OutOfRange {
                field: "maxRiskScore",
                value: max_risk_score,
            })?,
        })
    }

    pub fn clears_thresholds(&self, profile: &CandidateProfile) -> bool {
        profile.trust_score >= self.min_trust_score
            && profile.fraud_risk_score <= self.max_risk_score
    }

    /// Verified, not yet shortlisted, and within both thresholds.
    pub fn is_eligible(&self, profile: &CandidateProfile) -> bool {
        profile.profile_status == ProfileStatus::Verified
            && !profile.is_shortlisted
            && self.clears_thresholds(profile)
    }

    pub fn describe(&self) -> String {
        format!(
            "trust >= {}, risk <= {}",
            self.min_trust_score, self.max_risk_score
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("{field} must be between 0 and 100, got {value}")]
    OutOfRange { field: &'static str, value: u8 },
}

/// Active rule plus the recruiter who saved it; automatic promotions are attributed to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleState {
    pub rule: AutoShortlistRule,
    pub set_by: HrProfileId,
}

pub const SYSTEM_ACTOR: &str = "system";

/// Holder of the current rule, publishing every save to the evaluator.
pub struct ShortlistSettings {
    current: watch::Sender<RuleState>,
}

impl ShortlistSettings {
    pub fn new(rule: AutoShortlistRule) -> Self {
        let (current, _) = watch::channel(RuleState {
            rule,
            set_by: HrProfileId(SYSTEM_ACTOR.to_string()),
        });
        Self { current }
    }

    pub fn rule(&self) -> AutoShortlistRule {
        self.current.borrow().rule
    }

    pub fn state(&self) -> RuleState {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RuleState> {
        self.current.subscribe()
    }

    /// Record a `RULE_SET` entry, then publish the new thresholds.
    pub fn save<S: DocumentStore>(
        &self,
        store: &S,
        actor: &HrProfileId,
        rule: AutoShortlistRule,
        now: DateTime<Utc>,
    ) -> Result<AutoShortlistRule, StoreError> {
        store.append_audit(AuditLogEntry::new(
            actor.clone(),
            AuditAction::RuleSet,
            format!("Auto-shortlist thresholds set: {}", rule.describe()),
            now,
        ))?;
        self.current.send_replace(RuleState {
            rule,
            set_by: actor.clone(),
        });
        info!(hr_profile = %actor, rule = %rule.describe(), "auto-shortlist rule saved");
        Ok(rule)
    }
}

impl Default for ShortlistSettings {
    fn default() -> Self {
        Self::new(AutoShortlistRule::default())
    }
}

/// Applies a rule to the persisted candidate set.
pub struct ShortlistEvaluator<S> {
    store: Arc<S>,
}

impl<S> ShortlistEvaluator<S>
where
    S: DocumentStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// One pass. Returns the candidates promoted by this pass.
    pub fn evaluate(
        &self,
        state: &RuleState,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateId>, StoreError> {
        let mut promoted = Vec::new();
        for candidate in self.store.candidates()? {
            if !state.rule.is_eligible(&candidate) {
                continue;
            }

            let patch = CandidatePatch {
                is_shortlisted: Some(true),
                updated_at: Some(now),
                require_status: Some(ProfileStatus::Verified),
                require_unshortlisted: true,
                ..CandidatePatch::default()
            };
            let updated = match self.store.merge_candidate(&candidate.id, patch) {
                Ok(updated) => updated,
                Err(StoreError::PreconditionFailed) => continue,
                Err(err) => return Err(err),
            };

            self.store.append_audit(
                AuditLogEntry::new(
                    state.set_by.clone(),
                    AuditAction::AutoShortlist,
                    format!(
                        "Auto-shortlisted: trust {} / risk {} met thresholds ({})",
                        updated.trust_score,
                        updated.fraud_risk_score,
                        state.rule.describe()
                    ),
                    now,
                )
                .for_candidate(&updated),
            )?;
            info!(candidate = %updated.id, "candidate auto-shortlisted");
            promoted.push(updated.id);
        }
        Ok(promoted)
    }

    /// Run once now, then again on every candidate change or rule save until shut down.
    pub fn spawn_reactive(self, settings: &ShortlistSettings) -> ShortlistWatcher {
        let mut events = self.store.subscribe();
        let mut rules = settings.subscribe();
        let (shutdown, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let initial = rules.borrow_and_update().clone();
            self.evaluate_logged(&initial);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = events.recv() => match event {
                        Ok(event) if event.touches_candidates() => {}
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "shortlist watcher lagged; re-evaluating");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    changed = rules.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let state = rules.borrow_and_update().clone();
                self.evaluate_logged(&state);
            }
            debug!("shortlist watcher stopped");
        });

        ShortlistWatcher {
            shutdown: Some(shutdown),
            task,
        }
    }

    fn evaluate_logged(&self, state: &RuleState) {
        if let Err(err) = self.evaluate(state, Utc::now()) {
            warn!(error = %err, "auto-shortlist evaluation failed");
        }
    }
}

/// Handle to the reactive evaluator task.
pub struct ShortlistWatcher {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ShortlistWatcher {
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}
