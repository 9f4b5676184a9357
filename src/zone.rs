//! Detection zones and the in-memory zone collection.

use serde::{Deserialize, Deserializer, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::geometry::{polygon_area, Point};
use crate::{ZoneError, ZoneResult};

/// A polygon needs at least this many vertices.
pub const MIN_ZONE_POINTS: usize = 3;
pub const DEFAULT_ZONE_COLOR: &str = "#FF0000";
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

const DEFAULT_THRESHOLD: i64 = 25;
const DEFAULT_MIN_AREA: i64 = 500;
const DEFAULT_MOTION_FRAMES: i64 = 3;

/// A named polygonal detection region, as stored by the backend.
///
/// Coordinates are image-space pixels; the closing edge from the last vertex
/// back to the first is implicit. `threshold`, `min_area` and `motion_frames`
/// are forwarded to the backend untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub coordinates: Vec<Point>,
    #[serde(default = "default_priority", deserialize_with = "clamped_priority")]
    pub priority: u8,
    #[serde(default = "default_threshold")]
    pub threshold: i64,
    #[serde(default = "default_min_area")]
    pub min_area: i64,
    #[serde(default = "default_motion_frames")]
    pub motion_frames: i64,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub created_at: String,
}

fn default_priority() -> u8 {
    MIN_PRIORITY
}

/// Accepts any JSON number (or null) and clamps it into
/// `MIN_PRIORITY..=MAX_PRIORITY`.
fn clamped_priority<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let Some(raw) = Option::<f64>::deserialize(deserializer)? else {
        return Ok(MIN_PRIORITY);
    };
    let clamped = raw
        .round()
        .clamp(f64::from(MIN_PRIORITY), f64::from(MAX_PRIORITY)) as u8;
    if raw != f64::from(clamped) {
        log::warn!("zone priority {} out of range; using {}", raw, clamped);
    }
    Ok(clamped)
}

fn default_threshold() -> i64 {
    DEFAULT_THRESHOLD
}

fn default_min_area() -> i64 {
    DEFAULT_MIN_AREA
}

fn default_motion_frames() -> i64 {
    DEFAULT_MOTION_FRAMES
}

fn default_color() -> String {
    DEFAULT_ZONE_COLOR.to_string()
}

/// Operator-supplied metadata for a zone being created.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneParams {
    pub name: String,
    pub priority: u8,
    pub threshold: i64,
    pub min_area: i64,
    pub motion_frames: i64,
    pub color: String,
}

impl ZoneParams {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for ZoneParams {
    fn default() -> Self {
        Self {
            name: String::new(),
            priority: MIN_PRIORITY,
            threshold: DEFAULT_THRESHOLD,
            min_area: DEFAULT_MIN_AREA,
            motion_frames: DEFAULT_MOTION_FRAMES,
            color: default_color(),
        }
    }
}

impl Zone {
    /// Validates a finished point sequence plus metadata and builds the zone.
    ///
    /// Checks run in the order the operator sees them: point count, then
    /// name, then uniqueness against `existing`.
    pub fn from_draft(
        points: &[Point],
        params: &ZoneParams,
        existing: &ZoneCollection,
        id: String,
        created_at: String,
    ) -> ZoneResult<Zone> {
        if points.len() < MIN_ZONE_POINTS {
            return Err(ZoneError::InsufficientPoints {
                have: points.len(),
            });
        }
        let name = params.name.trim();
        if name.is_empty() {
            return Err(ZoneError::EmptyName);
        }
        if existing.contains_name(name) {
            return Err(ZoneError::DuplicateName(name.to_string()));
        }
        let color = if parse_hex_rgb(&params.color).is_some() {
            params.color.clone()
        } else {
            log::warn!(
                "zone color '{}' is not #RRGGBB; using {}",
                params.color,
                DEFAULT_ZONE_COLOR
            );
            default_color()
        };
        Ok(Zone {
            id,
            name: name.to_string(),
            coordinates: points.iter().map(|p| p.clamped()).collect(),
            priority: params.priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            threshold: params.threshold,
            min_area: params.min_area,
            motion_frames: params.motion_frames,
            color,
            created_at,
        })
    }

    /// `"{name} (P{priority})"`, the canvas label.
    pub fn label(&self) -> String {
        format!("{} (P{})", self.name, self.priority)
    }

    pub fn is_drawable(&self) -> bool {
        self.coordinates.len() >= MIN_ZONE_POINTS
    }

    pub fn area(&self) -> f64 {
        polygon_area(&self.coordinates)
    }

    pub fn badge_color(&self) -> &'static str {
        priority_color(self.priority)
    }
}

/// Badge color for a priority level. Out-of-range priorities get the
/// highest-priority color.
pub fn priority_color(priority: u8) -> &'static str {
    match priority {
        2 => "#FF8000",
        3 => "#FFFF00",
        4 => "#00FF00",
        5 => "#0000FF",
        _ => "#FF0000",
    }
}

/// Parses `#RRGGBB` into its channels.
pub fn parse_hex_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// Time-based zone id (milliseconds since epoch), bumped until it does not
/// collide with `existing`.
pub fn next_zone_id(existing: &ZoneCollection) -> String {
    let mut millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    loop {
        let id = millis.to_string();
        if !existing.contains_id(&id) {
            return id;
        }
        millis += 1;
    }
}

/// Ordered working set of zones. Iteration order is render order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZoneCollection {
    zones: Vec<Zone>,
}

impl ZoneCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    pub fn as_slice(&self) -> &[Zone] {
        &self.zones
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Zone> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Case-sensitive exact match.
    pub fn contains_name(&self, name: &str) -> bool {
        self.zones.iter().any(|z| z.name == name)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.zones.iter().any(|z| z.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub(crate) fn push(&mut self, zone: Zone) {
        self.zones.push(zone);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Zone> {
        let idx = self.zones.iter().position(|z| z.id == id)?;
        Some(self.zones.remove(idx))
    }

    pub(crate) fn replace(&mut self, zones: Vec<Zone>) {
        self.zones = zones;
    }

    pub fn to_vec(&self) -> Vec<Zone> {
        self.zones.clone()
    }
}

impl<'a> IntoIterator for &'a ZoneCollection {
    type Item = &'a Zone;
    type IntoIter = std::slice::Iter<'a, Zone>;

    fn into_iter(self) -> Self::IntoIter {
        self.zones.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ]
    }

    fn build(name: &str, existing: &ZoneCollection) -> ZoneResult<Zone> {
        Zone::from_draft(
            &triangle(),
            &ZoneParams::named(name),
            existing,
            "1".to_string(),
            "2026-01-01T00:00:00.000Z".to_string(),
        )
    }

    #[test]
    fn builds_zone_with_trimmed_name() {
        let zone = build("  Door  ", &ZoneCollection::new()).unwrap();
        assert_eq!(zone.name, "Door");
        assert_eq!(zone.coordinates.len(), 3);
        assert_eq!(zone.label(), "Door (P1)");
        assert_eq!(zone.area(), 50.0);
    }

    #[test]
    fn rejects_short_polygon_before_name_checks() {
        let err = Zone::from_draft(
            &triangle()[..2],
            &ZoneParams::named(""),
            &ZoneCollection::new(),
            "1".into(),
            String::new(),
        )
        .unwrap_err();
        assert_eq!(err, ZoneError::InsufficientPoints { have: 2 });
    }

    #[test]
    fn rejects_blank_and_duplicate_names() {
        assert_eq!(
            build("   ", &ZoneCollection::new()).unwrap_err(),
            ZoneError::EmptyName
        );
        let existing = ZoneCollection::from_vec(vec![build("A", &ZoneCollection::new()).unwrap()]);
        assert_eq!(
            build("A", &existing).unwrap_err(),
            ZoneError::DuplicateName("A".into())
        );
        // names are case-sensitive
        assert!(build("a", &existing).is_ok());
    }

    #[test]
    fn clamps_priority_and_repairs_color() {
        let params = ZoneParams {
            name: "Gate".into(),
            priority: 9,
            color: "red".into(),
            ..ZoneParams::default()
        };
        let zone = Zone::from_draft(
            &triangle(),
            &params,
            &ZoneCollection::new(),
            "7".into(),
            String::new(),
        )
        .unwrap();
        assert_eq!(zone.priority, MAX_PRIORITY);
        assert_eq!(zone.color, DEFAULT_ZONE_COLOR);
        assert_eq!(zone.badge_color(), "#0000FF");
    }

    #[test]
    fn remote_payload_with_missing_fields_uses_defaults() {
        let zone: Zone = serde_json::from_str(
            r#"{"id":"1","name":"A","coordinates":[{"x":0,"y":0},{"x":10,"y":0},{"x":10,"y":10}],"priority":1}"#,
        )
        .unwrap();
        assert_eq!(zone.color, DEFAULT_ZONE_COLOR);
        assert_eq!(zone.motion_frames, DEFAULT_MOTION_FRAMES);
        assert!(zone.is_drawable());
    }

    #[test]
    fn out_of_range_priority_is_clamped_on_read() {
        let read = |priority: &str| -> Zone {
            serde_json::from_str(&format!(
                r#"{{"name":"A","coordinates":[],"priority":{}}}"#,
                priority
            ))
            .unwrap()
        };
        assert_eq!(read("300").priority, MAX_PRIORITY);
        assert_eq!(read("-2").priority, MIN_PRIORITY);
        assert_eq!(read("0").priority, MIN_PRIORITY);
        assert_eq!(read("3").priority, 3);
        assert_eq!(read("2.0").priority, 2);
        assert_eq!(read("null").priority, MIN_PRIORITY);
        assert!(serde_json::from_str::<Zone>(
            r#"{"name":"A","coordinates":[],"priority":"high"}"#
        )
        .is_err());
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex_rgb("#00ff7F"), Some((0, 255, 127)));
        assert_eq!(parse_hex_rgb("00ff7f"), None);
        assert_eq!(parse_hex_rgb("#abc"), None);
    }

    #[test]
    fn generated_ids_skip_collisions() {
        let first = next_zone_id(&ZoneCollection::new());
        let mut zone = build("A", &ZoneCollection::new()).unwrap();
        zone.id = first.clone();
        let existing = ZoneCollection::from_vec(vec![zone]);
        let second = next_zone_id(&existing);
        assert_ne!(first, second);
    }

    #[test]
    fn collection_lookup_and_removal() {
        let mut zones = ZoneCollection::new();
        let mut a = build("A", &zones).unwrap();
        a.id = "a".into();
        zones.push(a);
        let mut b = build("B", &zones).unwrap();
        b.id = "b".into();
        zones.push(b);
        assert_eq!(zones.get("b").map(|z| z.name.as_str()), Some("B"));
        assert!(zones.remove("a").is_some());
        assert!(zones.remove("a").is_none());
        assert_eq!(zones.len(), 1);
    }
}
