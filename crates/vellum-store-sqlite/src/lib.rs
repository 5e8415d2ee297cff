use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;
use vellum_storage::{
    ActionKind, AddMembershipParams, CreateSpaceParams, Membership, Principal, PrincipalId, Role,
    Space, SpaceId, SpaceRole, SpaceStatus, Store, StoreError, UpsertPrincipalParams, UsageDay,
    UsageRecord,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// `~/.vellum/store.db` (creates dir with 0700 perms on unix)
    pub async fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| StoreError::Backend("no home dir".into()))?
            .join(".vellum");
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Backend(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let path = dir.join("store.db");
        let url = format!("sqlite://{}?mode=rwc", path.to_string_lossy());
        Self::open(&url).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn unique_or_backend(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        StoreError::AlreadyExists
    } else {
        StoreError::Backend(s)
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(backend)
}

fn parse_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {}", ms)))
}

type PrincipalRow = (String, String, String, i64, i64);

fn principal_from_row(row: PrincipalRow) -> Result<Principal, StoreError> {
    let (id, email, role, created_at, updated_at) = row;
    Ok(Principal {
        id: PrincipalId(parse_uuid(&id)?),
        email,
        role: role.parse::<Role>().map_err(backend)?,
        created_at: parse_millis(created_at)?,
        updated_at: parse_millis(updated_at)?,
    })
}

type SpaceRow = (String, String, String, String, String, i64, i64);

fn space_from_row(row: SpaceRow) -> Result<Space, StoreError> {
    let (id, slug, name, status, created_by, created_at, updated_at) = row;
    Ok(Space {
        id: SpaceId(parse_uuid(&id)?),
        slug,
        name,
        status: status.parse::<SpaceStatus>().map_err(backend)?,
        created_by: PrincipalId(parse_uuid(&created_by)?),
        created_at: parse_millis(created_at)?,
        updated_at: parse_millis(updated_at)?,
    })
}

type MembershipRow = (String, String, String, i64, i64);

fn membership_from_row(row: MembershipRow) -> Result<Membership, StoreError> {
    let (space_id, principal_id, role, is_active, created_at) = row;
    Ok(Membership {
        space_id: SpaceId(parse_uuid(&space_id)?),
        principal_id: PrincipalId(parse_uuid(&principal_id)?),
        role: role.parse::<SpaceRole>().map_err(backend)?,
        is_active: is_active != 0,
        created_at: parse_millis(created_at)?,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Principals ─────────────────────────────

    async fn upsert_principal(
        &self,
        params: &UpsertPrincipalParams,
    ) -> Result<Principal, StoreError> {
        let now = Utc::now().timestamp_millis();
        // DO NOTHING keeps the existing row (including its role); the SELECT
        // below returns whichever row won.
        sqlx::query(
            "INSERT INTO principals(id,email,role,created_at,updated_at)
             VALUES(?,?,?,?,?)
             ON CONFLICT(email) DO NOTHING",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(&params.email)
        .bind(params.role.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        self.get_principal_by_email(&params.email).await
    }

    async fn get_principal(&self, principal_id: &PrincipalId) -> Result<Principal, StoreError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "SELECT id,email,role,created_at,updated_at FROM principals WHERE id=?",
        )
        .bind(principal_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(principal_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn get_principal_by_email(&self, email: &str) -> Result<Principal, StoreError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "SELECT id,email,role,created_at,updated_at FROM principals WHERE email=?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(principal_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn set_principal_role(
        &self,
        principal_id: &PrincipalId,
        role: Role,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE principals SET role=?, updated_at=? WHERE id=?")
            .bind(role.as_str())
            .bind(Utc::now().timestamp_millis())
            .bind(principal_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────── Spaces ─────────────────────────────────

    async fn create_space(&self, params: &CreateSpaceParams) -> Result<SpaceId, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now().timestamp_millis();
        let mut txn = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO spaces(id,slug,name,status,created_by,created_at,updated_at)
             VALUES(?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(&params.slug)
        .bind(&params.name)
        .bind(SpaceStatus::Pending.as_str())
        .bind(params.created_by.0.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut *txn)
        .await
        .map_err(unique_or_backend)?;

        sqlx::query(
            "INSERT INTO memberships(space_id,principal_id,role,is_active,created_at)
             VALUES(?,?,?,1,?)",
        )
        .bind(id.to_string())
        .bind(params.created_by.0.to_string())
        .bind(SpaceRole::Owner.as_str())
        .bind(now)
        .execute(&mut *txn)
        .await
        .map_err(unique_or_backend)?;

        txn.commit().await.map_err(backend)?;
        Ok(SpaceId(id))
    }

    async fn get_space(&self, space_id: &SpaceId) -> Result<Space, StoreError> {
        let row = sqlx::query_as::<_, SpaceRow>(
            "SELECT id,slug,name,status,created_by,created_at,updated_at FROM spaces WHERE id=?",
        )
        .bind(space_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(space_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn get_space_by_slug(&self, slug: &str) -> Result<Space, StoreError> {
        let row = sqlx::query_as::<_, SpaceRow>(
            "SELECT id,slug,name,status,created_by,created_at,updated_at FROM spaces WHERE slug=?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(space_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn set_space_status(
        &self,
        space_id: &SpaceId,
        status: SpaceStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE spaces SET status=?, updated_at=? WHERE id=?")
            .bind(status.as_str())
            .bind(Utc::now().timestamp_millis())
            .bind(space_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────── Memberships ────────────────────────────

    async fn add_membership(&self, params: &AddMembershipParams) -> Result<(), StoreError> {
        self.get_space(&params.space_id).await?;
        self.get_principal(&params.principal_id).await?;

        sqlx::query(
            "INSERT INTO memberships(space_id,principal_id,role,is_active,created_at)
             VALUES(?,?,?,1,?)",
        )
        .bind(params.space_id.0.to_string())
        .bind(params.principal_id.0.to_string())
        .bind(params.role.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(unique_or_backend)?;
        Ok(())
    }

    async fn get_membership(
        &self,
        space_id: &SpaceId,
        principal_id: &PrincipalId,
    ) -> Result<Membership, StoreError> {
        let row = sqlx::query_as::<_, MembershipRow>(
            "SELECT space_id,principal_id,role,is_active,created_at
             FROM memberships WHERE space_id=? AND principal_id=?",
        )
        .bind(space_id.0.to_string())
        .bind(principal_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(membership_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn set_membership_active(
        &self,
        space_id: &SpaceId,
        principal_id: &PrincipalId,
        is_active: bool,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE memberships SET is_active=? WHERE space_id=? AND principal_id=?")
                .bind(is_active as i64)
                .bind(space_id.0.to_string())
                .bind(principal_id.0.to_string())
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_memberships(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<(Membership, Space)>, StoreError> {
        // rowid breaks created_at ties so the fallback tenant choice is
        // deterministic.
        let rows = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                i64,
                i64,
                String,
                String,
                String,
                String,
                String,
                i64,
                i64,
            ),
        >(
            "SELECT m.space_id,m.principal_id,m.role,m.is_active,m.created_at,
                    s.id,s.slug,s.name,s.status,s.created_by,s.created_at,s.updated_at
             FROM memberships m
             JOIN spaces s ON s.id = m.space_id
             WHERE m.principal_id=?
             ORDER BY m.created_at, m.rowid",
        )
        .bind(principal_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut out = Vec::with_capacity(rows.len());
        for (m_space, m_principal, m_role, m_active, m_created, s_id, s_slug, s_name, s_status, s_by, s_created, s_updated) in
            rows
        {
            let membership =
                membership_from_row((m_space, m_principal, m_role, m_active, m_created))?;
            let space =
                space_from_row((s_id, s_slug, s_name, s_status, s_by, s_created, s_updated))?;
            out.push((membership, space));
        }
        Ok(out)
    }

    // ───────────────────────────── Usage ──────────────────────────────────

    async fn get_usage(
        &self,
        principal_id: &PrincipalId,
        day: UsageDay,
    ) -> Result<UsageRecord, StoreError> {
        let row = sqlx::query_as::<_, (f64, i64)>(
            "SELECT estimated_cost,created_at FROM usage_days WHERE principal_id=? AND day=?",
        )
        .bind(principal_id.0.to_string())
        .bind(day.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        let (estimated_cost, created_at) = row.ok_or(StoreError::NotFound)?;

        let counter_rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT action,count FROM usage_counters WHERE principal_id=? AND day=?",
        )
        .bind(principal_id.0.to_string())
        .bind(day.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut counters = std::collections::HashMap::with_capacity(counter_rows.len());
        for (action, count) in counter_rows {
            counters.insert(action.parse::<ActionKind>().map_err(backend)?, count);
        }

        Ok(UsageRecord {
            principal_id: *principal_id,
            day,
            counters,
            estimated_cost,
            created_at: parse_millis(created_at)?,
        })
    }

    async fn ensure_usage(
        &self,
        principal_id: &PrincipalId,
        day: UsageDay,
        seed: &[(ActionKind, i64)],
    ) -> Result<UsageRecord, StoreError> {
        let mut txn = self.pool.begin().await.map_err(backend)?;

        let inserted = sqlx::query(
            "INSERT INTO usage_days(principal_id,day,estimated_cost,created_at)
             VALUES(?,?,0,?)
             ON CONFLICT(principal_id,day) DO NOTHING",
        )
        .bind(principal_id.0.to_string())
        .bind(day.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *txn)
        .await
        .map_err(backend)?
        .rows_affected();

        // Seed only applies to a bucket this call created.
        if inserted == 1 {
            for (action, count) in seed {
                sqlx::query(
                    "INSERT INTO usage_counters(principal_id,day,action,count) VALUES(?,?,?,?)",
                )
                .bind(principal_id.0.to_string())
                .bind(day.to_string())
                .bind(action.as_str())
                .bind(count)
                .execute(&mut *txn)
                .await
                .map_err(backend)?;
            }
        }

        txn.commit().await.map_err(backend)?;
        self.get_usage(principal_id, day).await
    }

    async fn increment_usage(
        &self,
        principal_id: &PrincipalId,
        day: UsageDay,
        action: ActionKind,
        amount: i64,
        estimated_cost: f64,
    ) -> Result<i64, StoreError> {
        let mut txn = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO usage_days(principal_id,day,estimated_cost,created_at)
             VALUES(?,?,?,?)
             ON CONFLICT(principal_id,day)
             DO UPDATE SET estimated_cost = estimated_cost + excluded.estimated_cost",
        )
        .bind(principal_id.0.to_string())
        .bind(day.to_string())
        .bind(estimated_cost)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *txn)
        .await
        .map_err(backend)?;

        let count: i64 = sqlx::query_scalar(
            "INSERT INTO usage_counters(principal_id,day,action,count)
             VALUES(?,?,?,?)
             ON CONFLICT(principal_id,day,action)
             DO UPDATE SET count = count + excluded.count
             RETURNING count",
        )
        .bind(principal_id.0.to_string())
        .bind(day.to_string())
        .bind(action.as_str())
        .bind(amount)
        .fetch_one(&mut *txn)
        .await
        .map_err(backend)?;

        txn.commit().await.map_err(backend)?;
        Ok(count)
    }
}
