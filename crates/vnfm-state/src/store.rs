//! RecordStore: redb-backed persistence for instance configurations.
//!
//! Provides get / save (upsert) / delete over [`InstanceConfig`] values
//! keyed by VNF-record ID, plus insert-only `create` for instantiation.
//! Values are JSON-serialized into redb's `&[u8]` value column. Deleting a
//! record writes a tombstone in the same transaction, and both `create` and
//! `save` refuse tombstoned IDs.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory record store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.open_table(RETIRED).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert a new record. Fails if the ID is live or was ever deleted.
    pub fn create(&self, config: &InstanceConfig) -> StateResult<()> {
        self.write(config, true)
    }

    /// Insert or update a record. Fails if the ID was deleted.
    pub fn save(&self, config: &InstanceConfig) -> StateResult<()> {
        self.write(config, false)
    }

    fn write(&self, config: &InstanceConfig, insert_only: bool) -> StateResult<()> {
        let key = config.vnfr_id.as_str();
        let value = serde_json::to_vec(config).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let retired = txn.open_table(RETIRED).map_err(map_err!(Table))?;
            if retired.get(key).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Retired(key.to_string()));
            }
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            if insert_only && table.get(key).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(key.to_string()));
            }
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(vnfr_id = %key, insert_only, "record stored");
        Ok(())
    }

    /// Get a record by ID.
    pub fn get(&self, vnfr_id: &str) -> StateResult<Option<InstanceConfig>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match table.get(vnfr_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let config: InstanceConfig =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// Get a record by ID, failing with `NotFound` when absent.
    pub fn load(&self, vnfr_id: &str) -> StateResult<InstanceConfig> {
        debug!(%vnfr_id, "loading record");
        self.get(vnfr_id)?
            .ok_or_else(|| StateError::NotFound(vnfr_id.to_string()))
    }

    /// Delete a record and retire its ID. Returns true if it existed.
    ///
    /// Deleting an absent ID is a successful no-op.
    pub fn delete(&self, vnfr_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            existed = table.remove(vnfr_id).map_err(map_err!(Write))?.is_some();
            if existed {
                let mut retired = txn.open_table(RETIRED).map_err(map_err!(Table))?;
                retired
                    .insert(vnfr_id, epoch_secs())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%vnfr_id, existed, "record deleted");
        Ok(existed)
    }

    /// Whether `vnfr_id` belonged to a deleted record.
    pub fn is_retired(&self, vnfr_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RETIRED).map_err(map_err!(Table))?;
        Ok(table.get(vnfr_id).map_err(map_err!(Read))?.is_some())
    }

    /// IDs of all live records.
    pub fn list_ids(&self) -> StateResult<Vec<RecordId>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vnfm_catalogue::{VimImage, VimInstance};

    fn full_config(id: &str) -> InstanceConfig {
        let mut cfg = InstanceConfig::new(id, "web", BackendKind::Service);
        cfg.base_hostname = "web-host".to_string();
        cfg.settings = DeploymentSettings {
            command: vec!["nginx".into(), "-g".into(), "daemon off;".into()],
            published_ports: vec![PortSpec(vec!["8080".into(), "80".into()])],
            exposed_ports: vec!["9000".into()],
            restart_policy: RestartPolicy::OnFailure,
            constraints: vec!["node.role==worker".into()],
            mounts: vec!["/data:/data:ro".into()],
            dns: vec!["8.8.8.8".into()],
            hostname: Some("web-host".into()),
            own: BTreeMap::from([("MODE".to_string(), "prod".to_string())]),
        };
        cfg.networks.insert(
            "net-mgmt".into(),
            NetConf {
                ipv4_address: "10.0.0.5".into(),
            },
        );
        cfg.aliases
            .insert("mgmt".into(), vec!["web.mgmt".into(), "web".into()]);
        cfg.append_foreign(
            "db",
            BTreeMap::from([("ip".to_string(), "10.0.0.9".to_string())]),
        );
        let venue = VimInstance {
            id: "vim-1".into(),
            name: "local".into(),
            auth_url: "unix:///var/run/docker.sock".into(),
            tenant: String::new(),
            images: vec![VimImage {
                id: "sha256:1".into(),
                tags: vec!["nginx:latest".into()],
            }],
        };
        let unit = cfg.bind_unit("vdu-1", UnitBinding::new(venue, "nginx:latest"));
        unit.backend_ids.push("svc-1".into());
        unit.service = Some(ServiceState {
            replicas: 2,
            phase: ServicePhase::Scaled,
        });
        cfg
    }

    #[test]
    fn save_and_load_round_trip() {
        let store = RecordStore::open_in_memory().unwrap();
        let cfg = full_config("r1");

        store.save(&cfg).unwrap();
        assert_eq!(store.load("r1").unwrap(), cfg);
    }

    #[test]
    fn round_trip_with_empty_collections() {
        let store = RecordStore::open_in_memory().unwrap();
        let cfg = InstanceConfig::new("empty", "", BackendKind::Container);

        store.save(&cfg).unwrap();
        assert_eq!(store.get("empty").unwrap(), Some(cfg));
    }

    #[test]
    fn save_is_upsert() {
        let store = RecordStore::open_in_memory().unwrap();
        let mut cfg = full_config("r1");
        store.save(&cfg).unwrap();

        cfg.settings.dns.push("1.1.1.1".into());
        store.save(&cfg).unwrap();

        let loaded = store.load("r1").unwrap();
        assert_eq!(loaded.settings.dns, vec!["8.8.8.8", "1.1.1.1"]);
        assert_eq!(store.list_ids().unwrap(), vec!["r1".to_string()]);
    }

    #[test]
    fn create_rejects_live_id() {
        let store = RecordStore::open_in_memory().unwrap();
        store.create(&full_config("r1")).unwrap();

        let err = store.create(&full_config("r1")).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));
    }

    #[test]
    fn deleted_id_cannot_be_reused() {
        let store = RecordStore::open_in_memory().unwrap();
        store.create(&full_config("r1")).unwrap();
        assert!(store.delete("r1").unwrap());
        assert!(store.is_retired("r1").unwrap());

        assert!(matches!(
            store.create(&full_config("r1")).unwrap_err(),
            StateError::Retired(_)
        ));
        assert!(matches!(
            store.save(&full_config("r1")).unwrap_err(),
            StateError::Retired(_)
        ));
    }

    #[test]
    fn delete_twice_is_noop() {
        let store = RecordStore::open_in_memory().unwrap();
        store.save(&full_config("r1")).unwrap();

        assert!(store.delete("r1").unwrap());
        assert!(!store.delete("r1").unwrap());
        assert!(store.get("r1").unwrap().is_none());
    }

    #[test]
    fn load_missing_is_not_found() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(matches!(
            store.load("nope").unwrap_err(),
            StateError::NotFound(_)
        ));
        assert!(!store.is_retired("nope").unwrap());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("vnfm.redb");

        {
            let store = RecordStore::open(&db_path).unwrap();
            store.save(&full_config("r1")).unwrap();
            store.save(&full_config("r2")).unwrap();
            store.delete("r2").unwrap();
        }

        let store = RecordStore::open(&db_path).unwrap();
        assert_eq!(store.load("r1").unwrap(), full_config("r1"));
        assert!(store.is_retired("r2").unwrap());
    }
}
