//! Zone persistence: remote-first writes, cache fallback on read.
//!
//! The remote store is authoritative. A create or delete only touches the
//! in-memory collection and the cache after the remote acknowledged it, so
//! memory never holds a zone whose remote creation failed. Loading prefers
//! the remote listing; when that fails the cached collection is used, minus
//! every zone the remote does not confirm.

mod cache;
mod remote;
mod transfer;

pub use cache::{InMemoryZoneCache, SqliteZoneCache, ZoneCache};
pub use remote::{InMemoryZoneRemote, ZoneRemote};
pub use transfer::{export_file_name, parse_import, ExportedConfig, EXPORT_VERSION};

use anyhow::{Context, Result};

use crate::zone::{Zone, ZoneCollection};
use crate::{ZoneError, ZoneResult};

/// Cache namespace holding the serialized collection.
pub const CACHE_KEY: &str = "motionDetectionZones";

/// Where the last `load_zones` got its data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Remote { count: usize },
    /// Remote listing failed; cached zones were checked one by one.
    Cache { kept: usize, pruned: usize },
    /// Remote listing failed and the cache was absent or unreadable.
    Empty,
}

impl LoadOutcome {
    pub fn from_remote(&self) -> bool {
        matches!(self, LoadOutcome::Remote { .. })
    }
}

pub struct ZoneStore<R, C> {
    remote: R,
    cache: C,
    zones: ZoneCollection,
    last_load: Option<LoadOutcome>,
}

impl<R: ZoneRemote, C: ZoneCache> ZoneStore<R, C> {
    pub fn new(remote: R, cache: C) -> Self {
        Self {
            remote,
            cache,
            zones: ZoneCollection::new(),
            last_load: None,
        }
    }

    pub fn zones(&self) -> &ZoneCollection {
        &self.zones
    }

    pub fn last_load(&self) -> Option<LoadOutcome> {
        self.last_load
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn remote_mut(&mut self) -> &mut R {
        &mut self.remote
    }

    pub fn cache_mut(&mut self) -> &mut C {
        &mut self.cache
    }

    /// Rebuilds the working set. Never fails: it degrades to the cache and
    /// then to an empty set, logging along the way.
    pub fn load_zones(&mut self) -> Vec<Zone> {
        let outcome = match self.remote.list_zones() {
            Ok(zones) => {
                log::info!("loaded {} zones from backend", zones.len());
                let count = zones.len();
                self.zones.replace(zones);
                self.persist();
                LoadOutcome::Remote { count }
            }
            Err(err) => {
                log::warn!("zone listing failed, falling back to cache: {:#}", err);
                self.load_from_cache()
            }
        };
        self.last_load = Some(outcome);
        self.zones.to_vec()
    }

    fn load_from_cache(&mut self) -> LoadOutcome {
        let cached = match self.read_cached() {
            Ok(Some(zones)) => zones,
            Ok(None) => {
                log::info!("no cached zones");
                self.zones.replace(Vec::new());
                return LoadOutcome::Empty;
            }
            Err(err) => {
                log::error!("discarding unreadable zone cache: {:#}", err);
                if let Err(err) = self.cache.clear(CACHE_KEY) {
                    log::warn!("failed to clear zone cache: {:#}", err);
                }
                self.zones.replace(Vec::new());
                return LoadOutcome::Empty;
            }
        };

        let total = cached.len();
        let mut kept = Vec::with_capacity(total);
        for zone in cached {
            match self.remote.zone_exists(&zone.id) {
                Ok(true) => kept.push(zone),
                Ok(false) => log::info!("removing stale zone '{}' ({})", zone.name, zone.id),
                Err(err) => log::info!(
                    "removing unconfirmed zone '{}' ({}): {:#}",
                    zone.name,
                    zone.id,
                    err
                ),
            }
        }
        let outcome = LoadOutcome::Cache {
            kept: kept.len(),
            pruned: total - kept.len(),
        };
        self.zones.replace(kept);
        self.persist();
        outcome
    }

    fn read_cached(&mut self) -> Result<Option<Vec<Zone>>> {
        let Some(text) = self.cache.read(CACHE_KEY)? else {
            return Ok(None);
        };
        let zones = serde_json::from_str(&text).context("parse cached zones")?;
        Ok(Some(zones))
    }

    /// Writes the working set to the cache. Failures are logged only.
    fn persist(&mut self) {
        let result = serde_json::to_string(self.zones.as_slice())
            .context("serialize zones")
            .and_then(|json| self.cache.write(CACHE_KEY, &json));
        if let Err(err) = result {
            log::warn!("zone cache not updated: {:#}", err);
        }
    }

    /// Remote-first create. On failure nothing local changes.
    pub fn create_zone(&mut self, zone: Zone) -> ZoneResult<()> {
        if let Err(err) = self.remote.create_zone(&zone) {
            log::error!("failed to save zone '{}': {:#}", zone.name, err);
            return Err(ZoneError::RemoteSaveFailed(format!("{:#}", err)));
        }
        log::info!("zone '{}' created ({})", zone.name, zone.id);
        self.zones.push(zone);
        self.persist();
        Ok(())
    }

    /// Remote-first delete; the caller has already confirmed with the
    /// operator. Returns the removed local zone, if it was known.
    pub fn delete_zone(&mut self, id: &str) -> ZoneResult<Option<Zone>> {
        if let Err(err) = self.remote.delete_zone(id) {
            log::error!("failed to delete zone {}: {:#}", id, err);
            return Err(ZoneError::RemoteDeleteFailed(format!("{:#}", err)));
        }
        let removed = self.zones.remove(id);
        log::info!("zone {} deleted", id);
        self.persist();
        Ok(removed)
    }

    pub fn export_config(&self) -> ExportedConfig {
        ExportedConfig::new(self.zones.to_vec(), crate::now_iso8601())
    }

    pub fn export_json(&self) -> Result<String> {
        self.export_config()
            .to_json_pretty()
            .context("serialize zone export")
    }

    /// Replaces memory and cache with the file's zones. The backend is not
    /// told; a later remote load will overwrite the import.
    pub fn import_config(&mut self, text: &str) -> ZoneResult<usize> {
        let zones = parse_import(text)?;
        let count = zones.len();
        self.zones.replace(zones);
        self.persist();
        log::warn!(
            "imported {} zones into the local cache only; they are not on the backend",
            count
        );
        Ok(count)
    }
}
