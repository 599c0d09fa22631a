//! Spatial memory: the places a character knows about.
//!
//! A read-only tree `world → sector → arena → [objects]` loaded from JSON.
//! Addresses are colon-separated paths such as
//! `"the Ville:Hobbs Cafe:cafe"`. Answers are comma-separated lists in
//! the order the tree was written.

use std::fmt::Write as _;
use std::path::Path;

use serde_json::{Map, Value};

use reverie_core::ReverieError;

/// The spatial memory tree of one character.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpatialIndex {
    tree: Map<String, Value>,
}

impl SpatialIndex {
    /// Parse a tree from JSON.
    ///
    /// # Errors
    ///
    /// [`ReverieError::Serialization`] if the JSON is malformed or not
    /// shaped as nested objects ending in arrays of object names.
    pub fn from_json(json: &str) -> Result<Self, ReverieError> {
        let value: Value = serde_json::from_str(json).map_err(|e| ReverieError::Serialization(e.to_string()))?;
        let Value::Object(tree) = value else {
            return Err(ReverieError::Serialization("spatial tree must be an object".into()));
        };
        for (world, sectors) in &tree {
            for (sector, arenas) in children(sectors, world)? {
                for (arena, objects) in children(arenas, sector)? {
                    let valid = objects.as_array().is_some_and(|list| list.iter().all(Value::is_string));
                    if !valid {
                        return Err(ReverieError::Serialization(format!(
                            "objects of arena '{arena}' must be a list of names"
                        )));
                    }
                }
            }
        }
        Ok(Self { tree })
    }

    /// Load a tree from a JSON file. A missing file gives an empty tree.
    ///
    /// # Errors
    ///
    /// I/O failures other than a missing file, or a malformed tree.
    pub fn from_file(path: &Path) -> Result<Self, ReverieError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// The tree as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        Value::Object(self.tree.clone()).to_string()
    }

    /// Sectors of `world`, e.g. `"Hobbs Cafe, Oak Hill College"`.
    #[must_use]
    pub fn accessible_sectors(&self, world: &str) -> Option<String> {
        Some(join_keys(self.tree.get(world)?.as_object()?))
    }

    /// Arenas of a `"world:sector"` address. An empty sector part gives an
    /// empty string.
    #[must_use]
    pub fn accessible_arenas(&self, address: &str) -> Option<String> {
        let (world, sector) = address.split_once(':')?;
        if sector.is_empty() {
            return Some(String::new());
        }
        let arenas = self.tree.get(world)?.get(sector)?.as_object()?;
        Some(join_keys(arenas))
    }

    /// Objects of a `"world:sector:arena"` address. The arena name is
    /// retried lower-cased when the exact name is unknown. An empty arena
    /// part gives an empty string.
    #[must_use]
    pub fn accessible_objects(&self, address: &str) -> Option<String> {
        let mut parts = address.splitn(3, ':');
        let (world, sector, arena) = (parts.next()?, parts.next()?, parts.next()?);
        if arena.is_empty() {
            return Some(String::new());
        }
        let arenas = self.tree.get(world)?.get(sector)?;
        let objects = arenas
            .get(arena)
            .or_else(|| arenas.get(arena.to_lowercase()))?
            .as_array()?;
        let names: Vec<&str> = objects.iter().filter_map(Value::as_str).collect();
        Some(names.join(", "))
    }

    /// An indented outline of the tree, one node per line.
    #[must_use]
    pub fn outline(&self) -> String {
        fn walk(out: &mut String, value: &Value, depth: usize) {
            let dash = " >".repeat(depth);
            match value {
                Value::Object(map) => {
                    for (key, child) in map {
                        if !key.is_empty() {
                            let _ = writeln!(out, "{dash} {key}");
                        }
                        walk(out, child, depth + 1);
                    }
                }
                Value::Array(items) if !items.is_empty() => {
                    let names: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                    let _ = writeln!(out, "{dash} {}", names.join(", "));
                }
                _ => {}
            }
        }

        let mut out = String::new();
        for (world, sectors) in &self.tree {
            let _ = writeln!(out, " {world}");
            walk(&mut out, sectors, 1);
        }
        out
    }
}

fn children<'a>(value: &'a Value, parent: &str) -> Result<&'a Map<String, Value>, ReverieError> {
    value
        .as_object()
        .ok_or_else(|| ReverieError::Serialization(format!("'{parent}' must map names to children")))
}

fn join_keys(map: &Map<String, Value>) -> String {
    map.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const VILLE: &str = r#"{
        "the Ville": {
            "Hobbs Cafe": {
                "cafe": ["cafe customer seating", "cooking area", "kitchen sink"]
            },
            "Oak Hill College": {
                "library": ["library sofa", "bookshelf"],
                "classroom": []
            }
        }
    }"#;

    fn ville() -> SpatialIndex {
        SpatialIndex::from_json(VILLE).expect("valid tree")
    }

    #[test]
    fn sectors_keep_written_order() {
        assert_eq!(
            ville().accessible_sectors("the Ville").as_deref(),
            Some("Hobbs Cafe, Oak Hill College")
        );
        assert_eq!(ville().accessible_sectors("Smallville"), None);
    }

    #[test]
    fn arenas_of_a_sector() {
        let index = ville();
        assert_eq!(
            index.accessible_arenas("the Ville:Oak Hill College").as_deref(),
            Some("library, classroom")
        );
        assert_eq!(index.accessible_arenas("the Ville:").as_deref(), Some(""));
        assert_eq!(index.accessible_arenas("the Ville"), None);
    }

    #[test]
    fn objects_fall_back_to_lowercase_arena() {
        let index = ville();
        assert_eq!(
            index.accessible_objects("the Ville:Hobbs Cafe:cafe").as_deref(),
            Some("cafe customer seating, cooking area, kitchen sink")
        );
        assert_eq!(
            index.accessible_objects("the Ville:Hobbs Cafe:Cafe").as_deref(),
            Some("cafe customer seating, cooking area, kitchen sink")
        );
        assert_eq!(index.accessible_objects("the Ville:Hobbs Cafe:").as_deref(), Some(""));
        assert_eq!(index.accessible_objects("the Ville:Hobbs Cafe:attic"), None);
    }

    #[test]
    fn malformed_trees_are_rejected() {
        assert!(SpatialIndex::from_json("[]").is_err());
        assert!(SpatialIndex::from_json(r#"{"w": {"s": {"a": "bed"}}}"#).is_err());
        assert!(SpatialIndex::from_json(r#"{"w": {"s": ["bed"]}}"#).is_err());
    }

    #[test]
    fn missing_file_is_empty_and_saved_tree_reloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = SpatialIndex::from_file(&dir.path().join("spatial_memory.json")).expect("load");
        assert_eq!(missing, SpatialIndex::default());

        let path = dir.path().join("saved.json");
        std::fs::write(&path, ville().to_json()).expect("write");
        assert_eq!(SpatialIndex::from_file(&path).expect("load"), ville());
    }

    #[test]
    fn outline_indents_by_depth() {
        let outline = ville().outline();
        assert!(outline.contains(" > Hobbs Cafe"));
        assert!(outline.contains(" > > cafe"));
        assert!(outline.contains(" > > > cafe customer seating, cooking area, kitchen sink"));
    }
}
