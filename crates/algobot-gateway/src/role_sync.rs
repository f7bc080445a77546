//! Role state synchronizer: keeps the member store in step with role changes.
//!
//! Every transition is a read-modify-write of one member record followed by a
//! full replace-upsert. Writes for the same member id are serialized through a
//! per-member async lock; different members proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use algobot_storage::AlgoBotStorage;
use algobot_types::{Member, MemberProfile, RoleAddEvent, RoleRemoveEvent};

use crate::error::BotError;
use crate::platform::Platform;

/// One async mutex per member id. An entry lives only while some task holds
/// or waits on it.
#[derive(Default)]
struct MemberLocks {
    locks: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
}

impl MemberLocks {
    async fn acquire(&self, member_id: u64) -> MemberGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(member_id).or_default().clone()
        };
        MemberGuard {
            locks: self,
            member_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Held for the duration of one member transition.
struct MemberGuard<'a> {
    locks: &'a MemberLocks,
    member_id: u64,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for MemberGuard<'_> {
    fn drop(&mut self) {
        // Clones are only taken under the map lock, so a count of one here
        // means no other task holds or waits on this entry.
        let mut locks = self.locks.locks.lock().unwrap_or_else(|e| e.into_inner());
        self.guard.take();
        if locks
            .get(&self.member_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.member_id);
        }
    }
}

/// Result of applying a role-remove event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The tracked record was updated.
    Updated(Member),
    /// The member was untracked; a record was created from the platform's view.
    Adopted(Member),
    /// The member is unknown to both the store and the platform.
    Ignored,
}

pub struct RoleSynchronizer {
    storage: Arc<AlgoBotStorage>,
    platform: Arc<dyn Platform>,
    locks: MemberLocks,
}

impl RoleSynchronizer {
    pub fn new(storage: Arc<AlgoBotStorage>, platform: Arc<dyn Platform>) -> Self {
        Self {
            storage,
            platform,
            locks: MemberLocks::default(),
        }
    }

    /// Union the added labels into the member's roles, creating the member on
    /// first observation.
    pub async fn on_role_add(&self, event: &RoleAddEvent) -> Result<Member, BotError> {
        let _guard = self.locks.acquire(event.member_id).await;

        let mut member = match self.storage.find_member(event.member_id).await? {
            Some(member) => member,
            None => {
                info!(
                    member_id = event.member_id,
                    name = %event.display_name,
                    "Tracking new member"
                );
                Member::new(event.member_id, event.display_name.clone())
            }
        };
        member.add_roles(event.added_roles.iter().cloned());
        self.storage.save_member(&member).await?;

        debug!(
            member_id = member.id,
            added = ?event.added_roles,
            roles = ?member.roles,
            "Roles added"
        );
        Ok(member)
    }

    /// Subtract the removed labels from a tracked member.
    ///
    /// An untracked member is looked up on the platform; if found, a record is
    /// created from its current roles minus the removed labels. Otherwise the
    /// event is logged and dropped.
    pub async fn on_role_remove(&self, event: &RoleRemoveEvent) -> Result<RemovalOutcome, BotError> {
        let _guard = self.locks.acquire(event.member_id).await;

        if let Some(mut member) = self.storage.find_member(event.member_id).await? {
            member.remove_roles(&event.removed_roles);
            self.storage.save_member(&member).await?;
            debug!(
                member_id = member.id,
                removed = ?event.removed_roles,
                roles = ?member.roles,
                "Roles removed"
            );
            return Ok(RemovalOutcome::Updated(member));
        }

        match self.platform.resolve_member(event.member_id).await? {
            Some(profile) => {
                let mut member = Member::from(profile);
                member.remove_roles(&event.removed_roles);
                self.storage.save_member(&member).await?;
                info!(
                    member_id = member.id,
                    "Role removal for untracked member; adopted from platform"
                );
                Ok(RemovalOutcome::Adopted(member))
            }
            None => {
                warn!(
                    member_id = event.member_id,
                    removed = ?event.removed_roles,
                    "Role removal for unknown member ignored"
                );
                Ok(RemovalOutcome::Ignored)
            }
        }
    }

    /// Replace a member record with the platform's current view of it.
    pub async fn apply_profile(&self, profile: MemberProfile) -> Result<Member, BotError> {
        let _guard = self.locks.acquire(profile.id).await;

        let member = Member::from(profile);
        self.storage.save_member(&member).await?;
        Ok(member)
    }

    /// Upsert every guild member as the platform currently reports it.
    pub async fn sync_roster(&self) -> Result<usize, BotError> {
        let profiles = self.platform.list_members().await?;
        let total = profiles.len();
        for profile in profiles {
            self.apply_profile(profile).await?;
        }
        info!(members = total, "Roster synchronized");
        Ok(total)
    }
}
