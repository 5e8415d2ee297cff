//! Per-principal daily usage metering.
//!
//! Gates rate-limited actions before they run and records them after they
//! complete successfully. All counter mutation goes through the store's
//! atomic upsert-increment; the meter itself never does a local
//! read-modify-write. The check → act → increment sequence is deliberately
//! not transactional, so the cap is soft: concurrent requests at the limit
//! boundary can overshoot by the number in flight.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vellum_storage::{ActionKind, Principal, PrincipalId, Role, Store, StoreError, UsageDay};

use crate::error::GuardError;

/// Sentinel limit meaning "no cap".
pub const UNLIMITED: i64 = -1;

/// Daily limits keyed by (role, action). Pairs absent from the table are
/// unmetered.
#[derive(Clone, Debug)]
pub struct LimitTable {
    limits: HashMap<(Role, ActionKind), i64>,
}

impl LimitTable {
    pub fn empty() -> Self {
        Self {
            limits: HashMap::new(),
        }
    }

    /// The shipped limit table. Admin is unlimited across the board.
    pub fn builtin() -> Self {
        use ActionKind::*;
        Self::empty()
            .with_limit(Role::User, ConceptCreate, 20)
            .with_limit(Role::User, RecordCreate, 5)
            .with_limit(Role::User, DraftAssist, 0)
            .with_limit(Role::Premium, ConceptCreate, 100)
            .with_limit(Role::Premium, RecordCreate, 50)
            .with_limit(Role::Premium, DraftAssist, 25)
            .with_limit(Role::Moderator, ConceptCreate, 200)
            .with_limit(Role::Moderator, RecordCreate, 100)
            .with_limit(Role::Moderator, DraftAssist, 50)
            .with_limit(Role::Admin, ConceptCreate, UNLIMITED)
            .with_limit(Role::Admin, RecordCreate, UNLIMITED)
            .with_limit(Role::Admin, DraftAssist, UNLIMITED)
    }

    pub fn with_limit(mut self, role: Role, action: ActionKind, limit: i64) -> Self {
        self.limits.insert((role, action), limit);
        self
    }

    pub fn limit(&self, role: Role, action: ActionKind) -> i64 {
        self.limits
            .get(&(role, action))
            .copied()
            .unwrap_or(UNLIMITED)
    }
}

/// Authoritative source for actions already completed today, used to seed a
/// lazily-created day bucket so it stays consistent with reality instead of
/// starting at zero incorrectly. Implemented by the surrounding application
/// over its own tables.
#[async_trait]
pub trait UsageBackfill: Send + Sync {
    async fn completed_today(
        &self,
        principal_id: &PrincipalId,
        day: UsageDay,
        action: ActionKind,
    ) -> Result<i64, GuardError>;
}

/// Backfill that knows nothing; new buckets start at zero.
pub struct NoBackfill;

#[async_trait]
impl UsageBackfill for NoBackfill {
    async fn completed_today(
        &self,
        _principal_id: &PrincipalId,
        _day: UsageDay,
        _action: ActionKind,
    ) -> Result<i64, GuardError> {
        Ok(0)
    }
}

/// Gates and records rate-limited actions per (principal, calendar day).
pub struct UsageMeter {
    store: Arc<dyn Store>,
    limits: LimitTable,
    backfill: Arc<dyn UsageBackfill>,
}

impl UsageMeter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            limits: LimitTable::builtin(),
            backfill: Arc::new(NoBackfill),
        }
    }

    pub fn with_limits(mut self, limits: LimitTable) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_backfill(mut self, backfill: Arc<dyn UsageBackfill>) -> Self {
        self.backfill = backfill;
        self
    }

    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    /// Gate an action against today's bucket.
    pub async fn check(&self, principal: &Principal, action: ActionKind) -> Result<(), GuardError> {
        self.check_for_day(principal, action, UsageDay::today()).await
    }

    /// Gate an action against a specific day bucket (injected for tests).
    pub async fn check_for_day(
        &self,
        principal: &Principal,
        action: ActionKind,
        day: UsageDay,
    ) -> Result<(), GuardError> {
        let limit = self.limits.limit(principal.role, action);
        if limit == UNLIMITED {
            return Ok(());
        }

        let record = match self.store.get_usage(&principal.id, day).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                // First metered action of the day: create the bucket, seeded
                // from whatever already completed today.
                let mut seed = Vec::with_capacity(ActionKind::ALL.len());
                for kind in ActionKind::ALL {
                    let n = self
                        .backfill
                        .completed_today(&principal.id, day, kind)
                        .await?;
                    if n > 0 {
                        seed.push((kind, n));
                    }
                }
                self.store.ensure_usage(&principal.id, day, &seed).await?
            }
            Err(e) => return Err(e.into()),
        };

        let current = record.count(action);
        if current >= limit {
            debug!(
                principal = %principal.id,
                action = action.as_str(),
                current,
                limit,
                "usage limit exceeded"
            );
            return Err(GuardError::UsageLimitExceeded { current, limit });
        }
        Ok(())
    }

    /// Record a successfully completed action against today's bucket.
    /// Returns the new counter value.
    pub async fn record(
        &self,
        principal_id: &PrincipalId,
        action: ActionKind,
        amount: i64,
        estimated_cost: f64,
    ) -> Result<i64, GuardError> {
        self.record_for_day(principal_id, action, amount, estimated_cost, UsageDay::today())
            .await
    }

    /// Record against a specific day bucket (injected for tests).
    pub async fn record_for_day(
        &self,
        principal_id: &PrincipalId,
        action: ActionKind,
        amount: i64,
        estimated_cost: f64,
        day: UsageDay,
    ) -> Result<i64, GuardError> {
        Ok(self
            .store
            .increment_usage(principal_id, day, action, amount, estimated_cost)
            .await?)
    }
}
