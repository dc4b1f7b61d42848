//! SQLite storage implementation.

use color_eyre::eyre::WrapErr as _;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;

use crate::models::*;
use crate::schema::*;
use crate::traits::*;
use nudge_core::{Account, Device};

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

/// SQLite-based storage.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database URL.
    pub fn new(database_url: &str) -> color_eyre::eyre::Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .wrap_err("failed to create connection pool")?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub fn run_migrations(&self) -> color_eyre::eyre::Result<()> {
        use diesel_migrations::MigrationHarness as _;

        let mut conn = self
            .pool
            .get()
            .wrap_err("failed to get connection for migrations")?;

        conn.run_pending_migrations(crate::MIGRATIONS)
            .map_err(|e| color_eyre::eyre::eyre!("migration failed: {}", e))?;

        Ok(())
    }

    fn conn(
        &self,
    ) -> color_eyre::eyre::Result<diesel::r2d2::PooledConnection<ConnectionManager<SqliteConnection>>>
    {
        self.pool
            .get()
            .wrap_err("failed to get database connection")
    }
}

impl AccountStore for SqliteStorage {
    fn account_by_identifier(
        &self,
        identifier: &str,
    ) -> color_eyre::eyre::Result<Option<Account>> {
        let mut conn = self.conn()?;

        let account: Option<AccountRow> = accounts::table
            .find(identifier)
            .first(&mut conn)
            .optional()
            .wrap_err("failed to look up account")?;

        let Some(account) = account else {
            return Ok(None);
        };

        let device_rows: Vec<DeviceRow> = devices::table
            .filter(devices::account_identifier.eq(identifier))
            .order(devices::device_id.asc())
            .load(&mut conn)
            .wrap_err("failed to load devices")?;

        Ok(Some(Account {
            identifier: account.identifier,
            devices: device_rows
                .into_iter()
                .map(|row| Device {
                    id: row.device_id,
                    push_token: row.push_token,
                    last_push_timestamp: row.last_push_timestamp,
                })
                .collect(),
        }))
    }

    fn update(&self, account: &Account) -> color_eyre::eyre::Result<()> {
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().naive_utc();

        let new_account = NewAccount {
            identifier: &account.identifier,
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(accounts::table)
            .values(&new_account)
            .on_conflict(accounts::identifier)
            .do_update()
            .set(accounts::updated_at.eq(now))
            .execute(&mut conn)
            .wrap_err("failed to upsert account")?;

        for device in &account.devices {
            let new_device = NewDevice {
                account_identifier: &account.identifier,
                device_id: device.id,
                push_token: device.push_token.as_deref(),
                last_push_timestamp: device.last_push_timestamp,
            };

            diesel::insert_into(devices::table)
                .values(&new_device)
                .on_conflict((devices::account_identifier, devices::device_id))
                .do_update()
                .set((
                    devices::push_token.eq(device.push_token.as_deref()),
                    devices::last_push_timestamp.eq(device.last_push_timestamp),
                ))
                .execute(&mut conn)
                .wrap_err("failed to upsert device")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (tempfile::TempDir, SqliteStorage) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nudge.db");
        let storage = SqliteStorage::new(path.to_str().unwrap()).unwrap();
        storage.run_migrations().unwrap();
        (dir, storage)
    }

    fn account(identifier: &str) -> Account {
        Account {
            identifier: identifier.into(),
            devices: vec![
                Device {
                    id: 1,
                    push_token: Some("token-1".into()),
                    last_push_timestamp: 0,
                },
                Device {
                    id: 2,
                    push_token: None,
                    last_push_timestamp: 1_700_000_000_000,
                },
            ],
        }
    }

    #[test]
    fn test_account_round_trip() {
        let (_dir, storage) = temp_storage();

        let stored = account("+18005551234");
        storage.update(&stored).unwrap();

        let loaded = storage.account_by_identifier("+18005551234").unwrap().unwrap();
        assert_eq!(loaded, stored);
    }

    #[test]
    fn test_missing_account_is_none() {
        let (_dir, storage) = temp_storage();

        assert!(storage.account_by_identifier("+18005550000").unwrap().is_none());
    }

    #[test]
    fn test_update_replaces_device_state() {
        let (_dir, storage) = temp_storage();

        let mut stored = account("+18005551234");
        storage.update(&stored).unwrap();

        stored.device_mut(1).unwrap().push_token = None;
        stored.device_mut(2).unwrap().push_token = Some("token-2b".into());
        stored.device_mut(2).unwrap().last_push_timestamp = 1_700_000_001_000;
        storage.update(&stored).unwrap();

        let loaded = storage.account_by_identifier("+18005551234").unwrap().unwrap();
        assert!(loaded.device(1).unwrap().push_token.is_none());
        assert_eq!(
            loaded.device(2).unwrap().push_token.as_deref(),
            Some("token-2b")
        );
        assert_eq!(loaded.device(2).unwrap().last_push_timestamp, 1_700_000_001_000);
    }
}
