//! Static emitter configuration.
//!
//! Records are loaded once, from short-form descriptors or a JSON catalog,
//! and never change while the world runs.

mod desc;

pub use desc::{ParsedDesc, parse_desc};

use crate::error::Result;
use crate::math::Vec2;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Index of a record in its [`EmitterCatalog`]. Stable for the catalog's
/// lifetime, so policies key their side tables by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RecordId(usize);

impl RecordId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({})", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f32),
    Text(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f32> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{}", value),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// How the visual glow attached to an emitter ramps while it plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlowCurve {
    #[default]
    Normal,
    /// Drones and soft attacks
    Slow,
}

/// One sound emitter placed in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterRecord {
    /// Ground-plane position (`x`, `z`)
    pub position: Vec2,
    /// Short-form descriptor the record was parsed from
    pub desc: String,
    pub patch_name: String,
    pub params: BTreeMap<String, ParamValue>,
    pub param_fragment: String,
    /// Scales every radius of this emitter
    pub reach: f32,
    /// Layer the emitter lives on; only audible from the same floor
    pub floor: i32,
    pub glow_curve: GlowCurve,
    pub intro_location: String,
    pub loop_location: String,
}

impl EmitterRecord {
    /// Parses a short-form descriptor placed at `(x, z)`.
    pub fn parse(desc: &str, x: f32, z: f32) -> Result<Self> {
        let parsed = parse_desc(desc)?;
        Ok(Self {
            position: Vec2::new(x, z),
            desc: desc.to_string(),
            patch_name: parsed.patch_name,
            params: parsed.params,
            param_fragment: parsed.param_fragment,
            reach: parsed.reach.unwrap_or(1.0),
            floor: 0,
            glow_curve: parsed.glow_curve,
            intro_location: format!("{}_intro.mp3", parsed.asset_stem),
            loop_location: format!("{}_loop.mp3", parsed.asset_stem),
        })
    }

    pub fn with_reach(mut self, reach: f32) -> Self {
        self.reach = reach;
        self
    }

    pub fn with_floor(mut self, floor: i32) -> Self {
        self.floor = floor;
        self
    }

    /// Prefixes both asset locations with `root`.
    pub fn with_asset_root(mut self, root: &str) -> Self {
        if root.is_empty() {
            return self;
        }
        let root = root.trim_end_matches('/');
        self.intro_location = format!("{}/{}", root, self.intro_location);
        self.loop_location = format!("{}/{}", root, self.loop_location);
        self
    }

    pub fn number(&self, name: &str) -> Option<f32> {
        self.params.get(name).and_then(ParamValue::as_number)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    asset_root: String,
    emitters: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    desc: String,
    x: f32,
    z: f32,
    #[serde(default)]
    reach: Option<f32>,
    #[serde(default)]
    floor: i32,
}

/// Ordered, immutable set of emitter records.
///
/// ```json
/// {
///   "asset_root": "assets/frozen",
///   "emitters": [
///     { "desc": "vib 2 3 + 1", "x": 120.0, "z": -40.0 },
///     { "desc": "cbass 3/2*3/4 + 0.5 600", "x": 0.0, "z": 300.0, "reach": 1.5, "floor": 1 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct EmitterCatalog {
    records: Vec<EmitterRecord>,
}

impl EmitterCatalog {
    pub fn from_records(records: Vec<EmitterRecord>) -> Self {
        Self { records }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let records = file
            .emitters
            .into_iter()
            .map(|entry| {
                let mut record = EmitterRecord::parse(&entry.desc, entry.x, entry.z)?
                    .with_floor(entry.floor)
                    .with_asset_root(&file.asset_root);
                if let Some(reach) = entry.reach {
                    record = record.with_reach(reach);
                }
                Ok(record)
            })
            .collect::<Result<Vec<_>>>()?;
        log::info!("Loaded emitter catalog with {} records", records.len());
        Ok(Self { records })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn get(&self, id: RecordId) -> Option<&EmitterRecord> {
        self.records.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &EmitterRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| (RecordId(index), record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GardenSonicError;

    #[test]
    fn test_record_asset_locations() {
        let record = EmitterRecord::parse("vib 2 3 + 1", 10.0, -5.0)
            .unwrap()
            .with_asset_root("assets/frozen/");
        assert_eq!(record.position, Vec2::new(10.0, -5.0));
        assert_eq!(record.intro_location, "assets/frozen/vib_2_3_p_1_intro.mp3");
        assert_eq!(record.loop_location, "assets/frozen/vib_2_3_p_1_loop.mp3");
        assert_eq!(record.reach, 1.0);
        assert_eq!(record.floor, 0);
        assert_eq!(record.number("freq2"), Some(300.0));
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"{
            "asset_root": "frozen",
            "emitters": [
                { "desc": "vib 2 3 + 1", "x": 120.0, "z": -40.0 },
                { "desc": "wbell 4 3/2", "x": 0.0, "z": 0.0 },
                { "desc": "cbass 3/2*3/4 + 0.5 600", "x": 0.0, "z": 300.0, "reach": 1.5, "floor": 1 }
            ]
        }"#;
        let catalog = EmitterCatalog::from_json_str(json).unwrap();
        assert_eq!(catalog.len(), 3);

        let ids: Vec<RecordId> = catalog.iter().map(|(id, _)| id).collect();
        let bell = catalog.get(ids[1]).unwrap();
        assert_eq!(bell.reach, 1.7);
        assert_eq!(bell.intro_location, "frozen/wbell_4_3o2_intro.mp3");

        let bass = catalog.get(ids[2]).unwrap();
        assert_eq!(bass.reach, 1.5);
        assert_eq!(bass.floor, 1);
        assert_eq!(bass.patch_name, "contrabass");
    }

    #[test]
    fn test_catalog_surfaces_bad_records() {
        let json = r#"{ "emitters": [ { "desc": "kazoo 1", "x": 0, "z": 0 } ] }"#;
        assert!(matches!(
            EmitterCatalog::from_json_str(json),
            Err(GardenSonicError::RecordParse { .. })
        ));
        assert!(matches!(
            EmitterCatalog::from_json_str("{ not json"),
            Err(GardenSonicError::Catalog(_))
        ));
    }
}
