use crate::models::address::{Address, AddressKind, Availability};
use crate::services::error::RegistryError;
use crate::services::generator::{random_local_part, sanitize_local_part};
use chrono::Utc;
use inbox::InboxStore;
use rand::Rng;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// How many random candidates to try before giving up. Collisions on 40 bits
/// of entropy mean something is wrong, so the bound is small.
const MAX_ATTEMPTS: usize = 10;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS addresses (
    address      TEXT PRIMARY KEY,
    owner_id     TEXT NOT NULL,
    kind         TEXT NOT NULL,
    starred      INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL,
    last_used_at TEXT NOT NULL
)
"#;

const OWNER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_addresses_owner ON addresses (owner_id)";

/// Opens (creating if missing) the registry database.
pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Durable store of issued addresses.
///
/// The uniqueness guarantee lives in the primary key: issuance is an
/// optimistic insert, and a concurrent claim of the same address surfaces as
/// a unique-constraint violation on exactly one of the writers. No
/// application-level locking, so unrelated addresses never serialize against
/// each other.
#[derive(Clone)]
pub struct Registry {
    pool: SqlitePool,
    domains: Vec<String>,
}

impl Registry {
    /// `domains` is the issuance allow-list, injected at construction.
    pub fn new(pool: SqlitePool, domains: Vec<String>) -> Self {
        let domains = domains.into_iter().map(|d| d.to_lowercase()).collect();
        Self { pool, domains }
    }

    pub async fn migrate(&self) -> Result<(), RegistryError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        sqlx::query(OWNER_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Issues a random address for `owner_id`, retrying generation while the
    /// candidate collides with an existing row.
    pub async fn issue_random(&self, owner_id: &str) -> Result<Address, RegistryError> {
        if owner_id.is_empty() {
            return Err(RegistryError::InvalidInput("device id is required".into()));
        }

        for _ in 0..MAX_ATTEMPTS {
            // Fresh candidate and timestamps on every iteration.
            let domain_idx = rand::thread_rng().gen_range(0..self.domains.len());
            let record = Address {
                address: format!("{}@{}", random_local_part(), self.domains[domain_idx]),
                owner_id: owner_id.to_string(),
                kind: AddressKind::Random,
                starred: false,
                created_at: Utc::now(),
                last_used_at: Utc::now(),
            };

            match self.insert(&record).await {
                Ok(()) => {
                    info!(address = %record.address, "issued random address");
                    return Ok(record);
                }
                // Collision: loop and try again with a new candidate.
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(RegistryError::Database(e)),
            }
        }

        Err(RegistryError::ExhaustedAttempts(MAX_ATTEMPTS))
    }

    /// Issues a caller-chosen address. Existence is checked against both the
    /// registry and the live inbox store, because an inbox can be live for an
    /// address that has no registry row.
    pub async fn issue_custom(
        &self,
        owner_id: &str,
        username: &str,
        domain: &str,
        inbox: &dyn InboxStore,
    ) -> Result<Address, RegistryError> {
        if owner_id.is_empty() {
            return Err(RegistryError::InvalidInput("device id is required".into()));
        }
        let local = sanitize_local_part(username);
        if local.is_empty() {
            return Err(RegistryError::InvalidInput(
                "username has no usable characters".into(),
            ));
        }
        let domain = domain.to_lowercase();
        if !self.domains.contains(&domain) {
            return Err(RegistryError::InvalidDomain);
        }

        let address = format!("{local}@{domain}");
        if self.find(&address).await?.is_some() || inbox.exists(&address).await? {
            return Err(RegistryError::AddressTaken);
        }

        let record = Address {
            address,
            owner_id: owner_id.to_string(),
            kind: AddressKind::Custom,
            starred: false,
            created_at: Utc::now(),
            last_used_at: Utc::now(),
        };

        match self.insert(&record).await {
            Ok(()) => {
                info!(address = %record.address, "issued custom address");
                Ok(record)
            }
            // Lost the race against a concurrent claim of the same address.
            Err(e) if is_unique_violation(&e) => Err(RegistryError::AddressTaken),
            Err(e) => Err(RegistryError::Database(e)),
        }
    }

    async fn insert(&self, record: &Address) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO addresses (address, owner_id, kind, starred, created_at, last_used_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.address)
        .bind(&record.owner_id)
        .bind(record.kind)
        .bind(record.starred)
        .bind(record.created_at)
        .bind(record.last_used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(&self, address: &str) -> Result<Option<Address>, RegistryError> {
        let record = sqlx::query_as::<_, Address>(
            r#"
            SELECT address, owner_id, kind, starred, created_at, last_used_at
            FROM addresses
            WHERE address = ?1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Bumps `last_used_at`. Unknown addresses are a no-op, not an error;
    /// mail can arrive for inboxes that have no registry row.
    pub async fn touch(&self, address: &str) -> Result<(), RegistryError> {
        sqlx::query("UPDATE addresses SET last_used_at = ?1 WHERE address = ?2")
            .bind(Utc::now())
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_starred(&self, address: &str, starred: bool) -> Result<(), RegistryError> {
        let result = sqlx::query("UPDATE addresses SET starred = ?1 WHERE address = ?2")
            .bind(starred)
            .bind(address)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound);
        }
        Ok(())
    }

    /// Pages through an owner's addresses, starred first, then newest first.
    /// `page` and `page_size` are 1-indexed positive integers.
    pub async fn list_for_owner(
        &self,
        owner_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Address>, u64), RegistryError> {
        if page == 0 || page_size == 0 {
            return Err(RegistryError::InvalidInput(
                "page and limit must be positive".into(),
            ));
        }
        let offset = (page as i64 - 1) * page_size as i64;

        let items = sqlx::query_as::<_, Address>(
            r#"
            SELECT address, owner_id, kind, starred, created_at, last_used_at
            FROM addresses
            WHERE owner_id = ?1
            ORDER BY starred DESC, created_at DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(owner_id)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE owner_id = ?1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((items, total as u64))
    }

    pub async fn list_starred_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Address>, RegistryError> {
        let items = sqlx::query_as::<_, Address>(
            r#"
            SELECT address, owner_id, kind, starred, created_at, last_used_at
            FROM addresses
            WHERE owner_id = ?1 AND starred = 1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Removes the record if `owner_id` owns it. Purging the inbox side is a
    /// separate best-effort step done by the caller; there is no cross-store
    /// transaction.
    pub async fn delete_for_owner(
        &self,
        address: &str,
        owner_id: &str,
    ) -> Result<(), RegistryError> {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT owner_id FROM addresses WHERE address = ?1")
                .bind(address)
                .fetch_optional(&self.pool)
                .await?;
        match owner {
            None => Err(RegistryError::NotFound),
            Some(o) if o != owner_id => Err(RegistryError::Forbidden),
            Some(_) => {
                sqlx::query("DELETE FROM addresses WHERE address = ?1 AND owner_id = ?2")
                    .bind(address)
                    .bind(owner_id)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
        }
    }

    /// Dual existence check with OR semantics: a registry row and a live
    /// inbox key are independent predicates with different lifecycles.
    pub async fn check_availability(
        &self,
        address: &str,
        inbox: &dyn InboxStore,
    ) -> Result<Availability, RegistryError> {
        let in_registry = self.find(address).await?.is_some();
        let inbox_live = inbox.exists(address).await?;
        Ok(Availability {
            available: !in_registry && !inbox_live,
            exists: in_registry || inbox_live,
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = e {
        return db_err.is_unique_violation();
    }
    false
}
