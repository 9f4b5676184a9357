use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::zone::{next_zone_id, Zone, ZoneCollection};
use crate::{ZoneError, ZoneResult};

pub const EXPORT_VERSION: &str = "1.0";

/// On-disk zone configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportedConfig {
    pub zones: Vec<Zone>,
    pub exported_at: String,
    pub version: String,
}

impl ExportedConfig {
    pub fn new(zones: Vec<Zone>, exported_at: String) -> Self {
        Self {
            zones,
            exported_at,
            version: EXPORT_VERSION.to_string(),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// `zones_config_YYYY-MM-DD.json`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("zones_config_{}.json", date.format("%Y-%m-%d"))
}

/// Validates an import file and returns its zones.
///
/// The top level must hold a `zones` array whose every element has a
/// non-empty string `name` and an array `coordinates`. Other fields are
/// optional and take zone defaults; zones without an id get a fresh one.
pub fn parse_import(text: &str) -> ZoneResult<Vec<Zone>> {
    let root: Value = serde_json::from_str(text)
        .map_err(|err| ZoneError::InvalidImportFormat(format!("not JSON: {}", err)))?;
    let entries = root
        .get("zones")
        .and_then(Value::as_array)
        .ok_or_else(|| ZoneError::InvalidImportFormat("missing 'zones' array".to_string()))?;

    let mut zones = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let named = entry
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| !name.is_empty());
        let has_coordinates = entry.get("coordinates").is_some_and(Value::is_array);
        if !named || !has_coordinates {
            return Err(ZoneError::InvalidImportFormat(format!(
                "zone #{} needs a name and a coordinates array",
                idx + 1
            )));
        }
        let zone: Zone = serde_json::from_value(entry.clone()).map_err(|err| {
            ZoneError::InvalidImportFormat(format!("zone #{}: {}", idx + 1, err))
        })?;
        zones.push(zone);
    }

    let mut seen = ZoneCollection::new();
    for zone in &mut zones {
        if zone.id.is_empty() || seen.contains_id(&zone.id) {
            zone.id = next_zone_id(&seen);
        }
        seen.push(zone.clone());
    }
    Ok(zones)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(export_file_name(date), "zones_config_2026-03-09.json");
    }

    #[test]
    fn rejects_missing_zones_array() {
        for text in ["{}", r#"{"zones": {}}"#, "[]", "not json"] {
            assert!(
                matches!(parse_import(text), Err(ZoneError::InvalidImportFormat(_))),
                "{}",
                text
            );
        }
    }

    #[test]
    fn rejects_zone_without_name_or_coordinates() {
        let no_name = r#"{"zones":[{"name":"","coordinates":[]}]}"#;
        let no_coords = r#"{"zones":[{"name":"A","coordinates":"x"}]}"#;
        assert!(parse_import(no_name).is_err());
        assert!(parse_import(no_coords).is_err());
    }

    #[test]
    fn minimal_zone_gets_defaults_and_id() {
        let zones =
            parse_import(r#"{"zones":[{"name":"A","coordinates":[{"x":1,"y":2}]}]}"#).unwrap();
        assert_eq!(zones.len(), 1);
        assert!(!zones[0].id.is_empty());
        assert_eq!(zones[0].priority, 1);
        assert_eq!(zones[0].coordinates[0].y, 2.0);
    }

    #[test]
    fn import_clamps_foreign_priorities() {
        let text = r#"{"zones":[
            {"name":"Hot","coordinates":[],"priority":300},
            {"name":"Cold","coordinates":[],"priority":-2}
        ]}"#;
        let zones = parse_import(text).unwrap();
        assert_eq!(zones[0].priority, 5);
        assert_eq!(zones[1].priority, 1);
    }

    #[test]
    fn duplicate_ids_are_reassigned() {
        let text = r#"{"zones":[
            {"id":"1","name":"A","coordinates":[]},
            {"id":"1","name":"B","coordinates":[]}
        ]}"#;
        let zones = parse_import(text).unwrap();
        assert_eq!(zones[0].id, "1");
        assert_ne!(zones[1].id, "1");
    }
}
