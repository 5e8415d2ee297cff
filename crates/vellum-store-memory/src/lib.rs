//! In-memory [`Store`] implementation.
//!
//! This implementation is suitable for:
//! - Unit and integration tests
//! - Development without a database
//!
//! State lives behind a single mutex in one process and is lost on drop. It
//! is not a production fallback; deployments use the sqlite backend.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use vellum_storage::{
    ActionKind, AddMembershipParams, CreateSpaceParams, Membership, Principal, PrincipalId, Role,
    Space, SpaceId, SpaceRole, SpaceStatus, Store, StoreError, UpsertPrincipalParams, UsageDay,
    UsageRecord,
};

#[derive(Default)]
struct Inner {
    principals: HashMap<PrincipalId, Principal>,
    emails: HashMap<String, PrincipalId>,
    spaces: HashMap<SpaceId, Space>,
    slugs: HashMap<String, SpaceId>,
    // Second tuple element is an insertion sequence number, the tie-breaker
    // when two memberships share a created_at timestamp.
    memberships: HashMap<(SpaceId, PrincipalId), (Membership, u64)>,
    usage: HashMap<(PrincipalId, UsageDay), UsageRecord>,
    next_seq: u64,
}

/// In-memory store backed by a mutex-guarded set of maps.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn insert_membership(
        &mut self,
        space_id: SpaceId,
        principal_id: PrincipalId,
        role: SpaceRole,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = (space_id, principal_id);
        if self.memberships.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.memberships.insert(
            key,
            (
                Membership {
                    space_id,
                    principal_id,
                    role,
                    is_active: true,
                    created_at: now,
                },
                seq,
            ),
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn upsert_principal(
        &self,
        params: &UpsertPrincipalParams,
    ) -> Result<Principal, StoreError> {
        let mut inner = self.lock()?;
        if let Some(id) = inner.emails.get(&params.email) {
            let id = *id;
            return inner
                .principals
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound);
        }
        let now = Utc::now();
        let principal = Principal {
            id: PrincipalId(Uuid::new_v4()),
            email: params.email.clone(),
            role: params.role,
            created_at: now,
            updated_at: now,
        };
        inner.emails.insert(principal.email.clone(), principal.id);
        inner.principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    async fn get_principal(&self, principal_id: &PrincipalId) -> Result<Principal, StoreError> {
        self.lock()?
            .principals
            .get(principal_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_principal_by_email(&self, email: &str) -> Result<Principal, StoreError> {
        let inner = self.lock()?;
        let id = inner.emails.get(email).ok_or(StoreError::NotFound)?;
        inner
            .principals
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn set_principal_role(
        &self,
        principal_id: &PrincipalId,
        role: Role,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let principal = inner
            .principals
            .get_mut(principal_id)
            .ok_or(StoreError::NotFound)?;
        principal.role = role;
        principal.updated_at = Utc::now();
        Ok(())
    }

    async fn create_space(&self, params: &CreateSpaceParams) -> Result<SpaceId, StoreError> {
        let mut inner = self.lock()?;
        if inner.slugs.contains_key(&params.slug) {
            return Err(StoreError::AlreadyExists);
        }
        if !inner.principals.contains_key(&params.created_by) {
            return Err(StoreError::NotFound);
        }
        let now = Utc::now();
        let space = Space {
            id: SpaceId(Uuid::new_v4()),
            slug: params.slug.clone(),
            name: params.name.clone(),
            status: SpaceStatus::Pending,
            created_by: params.created_by,
            created_at: now,
            updated_at: now,
        };
        let id = space.id;
        inner.slugs.insert(space.slug.clone(), id);
        inner.spaces.insert(id, space);
        inner.insert_membership(id, params.created_by, SpaceRole::Owner, now)?;
        Ok(id)
    }

    async fn get_space(&self, space_id: &SpaceId) -> Result<Space, StoreError> {
        self.lock()?
            .spaces
            .get(space_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_space_by_slug(&self, slug: &str) -> Result<Space, StoreError> {
        let inner = self.lock()?;
        let id = inner.slugs.get(slug).ok_or(StoreError::NotFound)?;
        inner.spaces.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn set_space_status(
        &self,
        space_id: &SpaceId,
        status: SpaceStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let space = inner.spaces.get_mut(space_id).ok_or(StoreError::NotFound)?;
        space.status = status;
        space.updated_at = Utc::now();
        Ok(())
    }

    async fn add_membership(&self, params: &AddMembershipParams) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if !inner.spaces.contains_key(&params.space_id) {
            return Err(StoreError::NotFound);
        }
        if !inner.principals.contains_key(&params.principal_id) {
            return Err(StoreError::NotFound);
        }
        inner.insert_membership(params.space_id, params.principal_id, params.role, Utc::now())
    }

    async fn get_membership(
        &self,
        space_id: &SpaceId,
        principal_id: &PrincipalId,
    ) -> Result<Membership, StoreError> {
        self.lock()?
            .memberships
            .get(&(*space_id, *principal_id))
            .map(|(m, _)| m.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn set_membership_active(
        &self,
        space_id: &SpaceId,
        principal_id: &PrincipalId,
        is_active: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let (membership, _) = inner
            .memberships
            .get_mut(&(*space_id, *principal_id))
            .ok_or(StoreError::NotFound)?;
        membership.is_active = is_active;
        Ok(())
    }

    async fn list_memberships(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<(Membership, Space)>, StoreError> {
        let inner = self.lock()?;
        let mut rows: Vec<(Membership, u64)> = inner
            .memberships
            .values()
            .filter(|(m, _)| m.principal_id == *principal_id)
            .cloned()
            .collect();
        rows.sort_by_key(|(m, seq)| (m.created_at, *seq));
        rows.into_iter()
            .map(|(membership, _)| {
                let space = inner
                    .spaces
                    .get(&membership.space_id)
                    .cloned()
                    .ok_or(StoreError::NotFound)?;
                Ok((membership, space))
            })
            .collect()
    }

    async fn get_usage(
        &self,
        principal_id: &PrincipalId,
        day: UsageDay,
    ) -> Result<UsageRecord, StoreError> {
        self.lock()?
            .usage
            .get(&(*principal_id, day))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn ensure_usage(
        &self,
        principal_id: &PrincipalId,
        day: UsageDay,
        seed: &[(ActionKind, i64)],
    ) -> Result<UsageRecord, StoreError> {
        let mut inner = self.lock()?;
        let record = inner
            .usage
            .entry((*principal_id, day))
            .or_insert_with(|| UsageRecord {
                principal_id: *principal_id,
                day,
                counters: seed.iter().copied().collect(),
                estimated_cost: 0.0,
                created_at: Utc::now(),
            });
        Ok(record.clone())
    }

    async fn increment_usage(
        &self,
        principal_id: &PrincipalId,
        day: UsageDay,
        action: ActionKind,
        amount: i64,
        estimated_cost: f64,
    ) -> Result<i64, StoreError> {
        let mut inner = self.lock()?;
        let record = inner
            .usage
            .entry((*principal_id, day))
            .or_insert_with(|| UsageRecord {
                principal_id: *principal_id,
                day,
                counters: HashMap::new(),
                estimated_cost: 0.0,
                created_at: Utc::now(),
            });
        record.estimated_cost += estimated_cost;
        let counter = record.counters.entry(action).or_insert(0);
        *counter += amount;
        Ok(*counter)
    }
}
