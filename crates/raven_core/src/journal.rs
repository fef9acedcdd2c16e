//! crates/raven_core/src/journal.rs
//!
//! The journal is the explicitly owned state object for one installation: the
//! locally persisted poems with their owners, the signed-in account's cloud
//! poems and the streak record.
//!
//! Every mutation is applied in memory and written to the `LocalStore` before
//! the call returns. Cloud writes are spawned onto a `TaskTracker` and never
//! awaited by the caller; a failed mirror is logged and abandoned until the next
//! triggering event.

use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, FixedOffset, Utc};
use serde::de::DeserializeOwned;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use uuid::Uuid;
use crate::domain::{Feedback, Poem, PoemDraft, StreakRecord, Tally};
use crate::ports::{LocalStore, PoemRepository, PortError};
use crate::{badges, reconcile, streak};

/// Local store key holding the poem list.
pub const POEMS_KEY: &str = "raven-poems";
/// Local store key holding the streak record.
pub const STREAK_KEY: &str = "raven-streak";
/// Local store key mapping poem ids to the user who wrote them signed in.
pub const OWNERS_KEY: &str = "raven-owners";

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Invalid poem: {0}")]
    Invalid(String),
    #[error("Poem {0} not found")]
    PoemNotFound(Uuid),
    #[error("Local store error: {0}")]
    Store(#[from] PortError),
    #[error("Stored document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type JournalResult<T> = Result<T, JournalError>;

/// One installation's journal.
///
/// Only one account is signed in at a time. Its cloud poems are held apart
/// from the local list and never written to the local store, and poems written
/// under an account stay hidden from every other caller. Anonymous poems are
/// shared by whoever uses the installation.
pub struct Journal {
    local: Arc<dyn LocalStore>,
    cloud: Arc<dyn PoemRepository>,
    zone: FixedOffset,
    /// What the local store holds, newest first.
    stored: Vec<Poem>,
    /// Author of each stored poem written while signed in.
    owners: HashMap<Uuid, Uuid>,
    /// The signed-in account and its cloud poems.
    active: Option<Uuid>,
    remote: Vec<Poem>,
    streak: StreakRecord,
    mirror: TaskTracker,
}

impl Journal {
    /// Loads the local documents, defaulting when absent.
    pub fn open(
        local: Arc<dyn LocalStore>,
        cloud: Arc<dyn PoemRepository>,
        zone: FixedOffset,
    ) -> JournalResult<Self> {
        let stored: Vec<Poem> = read_or_default(local.as_ref(), POEMS_KEY)?;
        let owners: HashMap<Uuid, Uuid> = read_or_default(local.as_ref(), OWNERS_KEY)?;
        let streak: StreakRecord = read_or_default(local.as_ref(), STREAK_KEY)?;
        info!(poems = stored.len(), streak = streak.current, "Journal loaded from local store");

        Ok(Self {
            local,
            cloud,
            zone,
            stored,
            owners,
            active: None,
            remote: Vec::new(),
            streak,
            mirror: TaskTracker::new(),
        })
    }

    /// The signed-in account's view, or the anonymous one when nobody is.
    pub fn poems(&self) -> Vec<Poem> {
        self.poems_for(self.active)
    }

    /// The poems a caller with `session` may see. The cloud poems join in only
    /// when `session` is the signed-in account.
    pub fn poems_for(&self, session: Option<Uuid>) -> Vec<Poem> {
        let local = self.local_for(session);
        match session {
            Some(user_id) if self.active == Some(user_id) => {
                reconcile::merge_poems(&local, &self.remote)
            }
            _ => local,
        }
    }

    pub fn active_user(&self) -> Option<Uuid> {
        self.active
    }

    pub fn streak(&self) -> &StreakRecord {
        &self.streak
    }

    pub fn zone(&self) -> FixedOffset {
        self.zone
    }

    pub fn poem(&self, id: Uuid, session: Option<Uuid>) -> Option<Poem> {
        self.poems_for(session).into_iter().find(|p| p.id == id)
    }

    pub fn tally(&self) -> Tally {
        Tally::of(&self.poems())
    }

    //=====================================================================================
    // Poems
    //=====================================================================================

    /// Creates a poem from a draft, stores it locally, and mirrors it to the
    /// cloud when `session` names a signed-in user.
    pub fn add_poem(
        &mut self,
        draft: PoemDraft,
        session: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> JournalResult<Poem> {
        draft.validate().map_err(JournalError::Invalid)?;
        let poem = Poem::from_draft(draft, now);

        self.stored.insert(0, poem.clone());
        self.persist_poems()?;

        if let Some(user_id) = session {
            self.owners.insert(poem.id, user_id);
            self.persist_owners()?;
            self.mirror_one(user_id, poem.clone());
        }
        Ok(poem)
    }

    /// Attaches a critique to a poem `session` can see, the only change a poem
    /// accepts.
    pub fn attach_feedback(
        &mut self,
        id: Uuid,
        feedback: Feedback,
        session: Option<Uuid>,
    ) -> JournalResult<Poem> {
        let mut updated = self
            .poem(id, session)
            .ok_or(JournalError::PoemNotFound(id))?;
        updated.feedback = Some(feedback);

        if let Some(poem) = self.remote.iter_mut().find(|p| p.id == id) {
            *poem = updated.clone();
        }
        if let Some(poem) = self.stored.iter_mut().find(|p| p.id == id) {
            *poem = updated.clone();
            self.persist_poems()?;
        }

        if let Some(user_id) = session {
            self.mirror_one(user_id, updated.clone());
        }
        Ok(updated)
    }

    //=====================================================================================
    // Streak
    //=====================================================================================

    /// Feeds a write event at `now` through the streak reducer, then
    /// re-checks the counter badges and persists the record.
    pub fn record_write(&mut self, now: DateTime<Utc>) -> JournalResult<StreakRecord> {
        let today = streak::calendar_day(now, self.zone);
        let tally = self.tally();
        let mut next = self.streak.record_write(today, tally, now);
        // A same-day write returns the record untouched, but the poem just
        // added can still cross a counter threshold.
        next.badges = badges::evaluate(&next, tally, now);

        if next != self.streak {
            self.streak = next;
            self.persist_streak()?;
        }
        Ok(self.streak.clone())
    }

    /// Re-evaluates badges against the current poem counters.
    pub fn refresh_badges(&mut self, now: DateTime<Utc>) -> JournalResult<&StreakRecord> {
        let badges = badges::evaluate(&self.streak, self.tally(), now);
        if badges != self.streak.badges {
            self.streak.badges = badges;
            self.persist_streak()?;
        }
        Ok(&self.streak)
    }

    //=====================================================================================
    // Session changes
    //=====================================================================================

    /// Reconciles with the cloud after sign-in and returns the merged view.
    ///
    /// Signing in a second account first signs the current one out. A failed
    /// cloud read leaves the view on the local poems. Local poems the cloud
    /// lacks are pushed without waiting for the result.
    pub async fn sign_in(&mut self, user_id: Uuid) -> Vec<Poem> {
        if let Some(previous) = self.active.filter(|id| *id != user_id) {
            info!(%previous, %user_id, "Switching signed-in account");
            self.sign_out(previous);
        }
        self.active = Some(user_id);
        self.remote.clear();

        let cloud = match self.cloud.list_poems_for_user(user_id).await {
            Ok(poems) => poems,
            Err(e) => {
                warn!(%user_id, error = %e, "Failed to load cloud poems, staying on local copy");
                return self.poems();
            }
        };

        let local = self.local_for(Some(user_id));
        let pending = reconcile::local_only(&local, &cloud);
        info!(
            %user_id,
            cloud = cloud.len(),
            local = local.len(),
            pending = pending.len(),
            "Merged local and cloud poems"
        );
        self.remote = cloud;

        if !pending.is_empty() {
            let repo = self.cloud.clone();
            self.mirror.spawn(async move {
                if let Err(e) = repo.upsert_poems(user_id, &pending).await {
                    warn!(%user_id, count = pending.len(), error = %e, "Failed to sync local poems to cloud");
                }
            });
        }
        self.poems()
    }

    /// Drops the cloud poems when `user_id` is the signed-in account, so the
    /// view reverts to the local poems. Any other account is a no-op.
    pub fn sign_out(&mut self, user_id: Uuid) {
        if self.active == Some(user_id) {
            self.active = None;
            self.remote.clear();
        }
    }

    /// Waits for every cloud write spawned so far to finish.
    pub async fn settle(&self) {
        self.mirror.close();
        self.mirror.wait().await;
        self.mirror.reopen();
    }

    //=====================================================================================
    // Internals
    //=====================================================================================

    fn mirror_one(&self, user_id: Uuid, poem: Poem) {
        let repo = self.cloud.clone();
        self.mirror.spawn(async move {
            if let Err(e) = repo.upsert_poem(user_id, &poem).await {
                warn!(%user_id, poem_id = %poem.id, error = %e, "Failed to save poem to cloud");
            }
        });
    }

    /// Stored poems that are anonymous or were written by `session`.
    fn local_for(&self, session: Option<Uuid>) -> Vec<Poem> {
        self.stored
            .iter()
            .filter(|p| match self.owners.get(&p.id) {
                Some(owner) => Some(*owner) == session,
                None => true,
            })
            .cloned()
            .collect()
    }

    fn persist_owners(&self) -> JournalResult<()> {
        self.local.set(OWNERS_KEY, serde_json::to_value(&self.owners)?)?;
        Ok(())
    }

    fn persist_poems(&self) -> JournalResult<()> {
        self.local.set(POEMS_KEY, serde_json::to_value(&self.stored)?)?;
        Ok(())
    }

    fn persist_streak(&self) -> JournalResult<()> {
        self.local.set(STREAK_KEY, serde_json::to_value(&self.streak)?)?;
        Ok(())
    }
}

fn read_or_default<T: DeserializeOwned + Default>(
    store: &dyn LocalStore,
    key: &str,
) -> JournalResult<T> {
    match store.get(key)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(T::default()),
    }
}
