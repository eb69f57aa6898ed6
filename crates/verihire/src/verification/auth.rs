//! Session-scoped authentication context.
//!
//! Roles are not claims on the identity: a uid is HR when an `hr_profiles` record exists for
//! it, a candidate when a candidate profile exists under it, and unassigned otherwise.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::debug;

use super::domain::{AuthenticatedUser, CandidateProfile, HrProfile};
use super::store::{DocumentStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Hr(HrProfile),
    Candidate(CandidateProfile),
    Unassigned,
}

impl Role {
    pub const fn label(&self) -> &'static str {
        match self {
            Role::Hr(_) => "hr",
            Role::Candidate(_) => "candidate",
            Role::Unassigned => "unassigned",
        }
    }
}

pub fn resolve_role<S: DocumentStore + ?Sized>(
    store: &S,
    user: &AuthenticatedUser,
) -> Result<Role, StoreError> {
    if let Some(profile) = store.hr_profile(&user.hr_profile_id())? {
        return Ok(Role::Hr(profile));
    }
    if let Some(profile) = store.candidate(&user.candidate_id())? {
        return Ok(Role::Candidate(profile));
    }
    Ok(Role::Unassigned)
}

/// Gate for recruiter actions.
pub fn require_hr<S: DocumentStore + ?Sized>(
    store: &S,
    user: &AuthenticatedUser,
) -> Result<HrProfile, AuthorizationError> {
    match store.hr_profile(&user.hr_profile_id())? {
        Some(profile) => Ok(profile),
        None => {
            debug!(uid = %user.uid, "recruiter action denied");
            Err(AuthorizationError::NotHr {
                uid: user.uid.clone(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("access restricted: {uid} has no HR profile")]
    NotHr { uid: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Signed-in identity together with its resolved role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: AuthenticatedUser,
    pub role: Role,
}

type Listener = Arc<dyn Fn(Option<&Session>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    session: Option<Session>,
    listeners: BTreeMap<u64, Listener>,
    next_id: u64,
}

/// One per application or session; construct it at the root and pass it down.
pub struct AuthContext<S> {
    store: Arc<S>,
    registry: Arc<Mutex<Registry>>,
}

impl<S> AuthContext<S>
where
    S: DocumentStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn current(&self) -> Option<Session> {
        lock(&self.registry).session.clone()
    }

    pub fn sign_in(&self, user: AuthenticatedUser) -> Result<Session, StoreError> {
        let role = resolve_role(self.store.as_ref(), &user)?;
        let session = Session { user, role };
        lock(&self.registry).session = Some(session.clone());
        self.notify();
        Ok(session)
    }

    /// Re-resolve the role, e.g. after the user registered a profile.
    pub fn refresh(&self) -> Result<Option<Session>, StoreError> {
        match self.current() {
            Some(session) => self.sign_in(session.user).map(Some),
            None => Ok(None),
        }
    }

    pub fn sign_out(&self) {
        lock(&self.registry).session = None;
        self.notify();
    }

    pub fn require_hr(&self) -> Result<HrProfile, AuthorizationError> {
        let session = self.current().ok_or(AuthorizationError::NotSignedIn)?;
        require_hr(self.store.as_ref(), &session.user)
    }

    /// The listener is called right away with the current session, then on every change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Option<&Session>) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let (id, session) = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.insert(id, Arc::clone(&listener));
            (id, registry.session.clone())
        };
        listener(session.as_ref());

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    fn notify(&self) {
        let (session, listeners): (Option<Session>, Vec<Listener>) = {
            let registry = lock(&self.registry);
            (
                registry.session.clone(),
                registry.listeners.values().cloned().collect(),
            )
        };
        for listener in listeners {
            listener(session.as_ref());
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cancellation handle returned by [`AuthContext::subscribe`]. Dropping it also unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.remove(&self.id);
        }
    }
}
