use anyhow::{anyhow, Result};

use crate::zone::Zone;

/// The backend's authoritative zone store.
pub trait ZoneRemote {
    fn list_zones(&mut self) -> Result<Vec<Zone>>;
    fn create_zone(&mut self, zone: &Zone) -> Result<()>;
    /// `Ok(false)` only when the backend positively reports the zone missing.
    fn zone_exists(&mut self, id: &str) -> Result<bool>;
    fn delete_zone(&mut self, id: &str) -> Result<()>;
}

impl<T: ZoneRemote + ?Sized> ZoneRemote for &mut T {
    fn list_zones(&mut self) -> Result<Vec<Zone>> {
        (**self).list_zones()
    }

    fn create_zone(&mut self, zone: &Zone) -> Result<()> {
        (**self).create_zone(zone)
    }

    fn zone_exists(&mut self, id: &str) -> Result<bool> {
        (**self).zone_exists(id)
    }

    fn delete_zone(&mut self, id: &str) -> Result<()> {
        (**self).delete_zone(id)
    }
}

/// Remote kept in process, with switches for the failure modes the store
/// has to survive.
#[derive(Debug, Default)]
pub struct InMemoryZoneRemote {
    zones: Vec<Zone>,
    /// Listing fails (backend down or non-2xx).
    pub fail_list: bool,
    pub fail_create: bool,
    pub fail_delete: bool,
    /// Existence checks error instead of answering.
    pub fail_exists: bool,
    calls: Vec<String>,
}

impl InMemoryZoneRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zones(zones: Vec<Zone>) -> Self {
        Self {
            zones,
            ..Self::default()
        }
    }

    /// Every listing, create and delete fails; existence checks too.
    pub fn set_unreachable(&mut self, down: bool) {
        self.fail_list = down;
        self.fail_create = down;
        self.fail_delete = down;
        self.fail_exists = down;
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Request log, e.g. `["GET /api/zones", "GET /api/zones/7"]`.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Removes a zone behind the client's back.
    pub fn forget(&mut self, id: &str) {
        self.zones.retain(|z| z.id != id);
    }
}

impl ZoneRemote for InMemoryZoneRemote {
    fn list_zones(&mut self) -> Result<Vec<Zone>> {
        self.calls.push("GET /api/zones".to_string());
        if self.fail_list {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.zones.clone())
    }

    fn create_zone(&mut self, zone: &Zone) -> Result<()> {
        self.calls.push("POST /api/zones".to_string());
        if self.fail_create {
            return Err(anyhow!("HTTP 500 Internal Server Error"));
        }
        self.zones.push(zone.clone());
        Ok(())
    }

    fn zone_exists(&mut self, id: &str) -> Result<bool> {
        self.calls.push(format!("GET /api/zones/{}", id));
        if self.fail_exists {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.zones.iter().any(|z| z.id == id))
    }

    fn delete_zone(&mut self, id: &str) -> Result<()> {
        self.calls.push(format!("DELETE /api/zones/{}", id));
        if self.fail_delete {
            return Err(anyhow!("HTTP 500 Internal Server Error"));
        }
        self.zones.retain(|z| z.id != id);
        Ok(())
    }
}
