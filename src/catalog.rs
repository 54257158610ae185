//! Static game-configuration lookup.
//!
//! Read-only data shipped beside the binary: plant display names, the
//! seed/fruit ids that map back to a plant, and growth durations. Lookups
//! never fail; an unknown id degrades to a synthesized placeholder name.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct PlantSpec {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub seed_id: i64,
    #[serde(default)]
    pub fruit: Option<FruitSpec>,
    /// Phase durations as "kind:secs;kind:secs;...".
    #[serde(default)]
    pub grow_phases: String,
    #[serde(default)]
    pub exp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FruitSpec {
    pub id: i64,
    #[serde(default)]
    pub count: i64,
}

/// Indexed, immutable plant catalog.
#[derive(Default)]
pub struct Catalog {
    plants: HashMap<i64, PlantSpec>,
    by_seed: HashMap<i64, i64>,
    by_fruit: HashMap<i64, i64>,
}

impl Catalog {
    /// Load the catalog from a JSON array of plant specs. An absent file
    /// yields an empty catalog; lookups then synthesize names.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<Vec<PlantSpec>>(&content) {
            Ok(specs) => Self::from_specs(specs),
            Err(err) => {
                warn!(path = %path.display(), %err, "malformed plant catalog, continuing without it");
                Self::default()
            }
        }
    }

    pub fn from_specs(specs: Vec<PlantSpec>) -> Self {
        let mut catalog = Self::default();
        for spec in specs {
            if spec.seed_id != 0 {
                catalog.by_seed.insert(spec.seed_id, spec.id);
            }
            if let Some(fruit) = &spec.fruit {
                catalog.by_fruit.insert(fruit.id, spec.id);
            }
            catalog.plants.insert(spec.id, spec);
        }
        catalog
    }

    pub fn plant(&self, plant_id: i64) -> Option<&PlantSpec> {
        self.plants.get(&plant_id)
    }

    pub fn plant_name(&self, plant_id: i64) -> String {
        match self.plants.get(&plant_id) {
            Some(spec) => spec.name.clone(),
            None => format!("plant#{plant_id}"),
        }
    }

    pub fn seed_name(&self, seed_id: i64) -> String {
        match self.by_seed.get(&seed_id).and_then(|id| self.plants.get(id)) {
            Some(spec) => spec.name.clone(),
            None => format!("seed#{seed_id}"),
        }
    }

    pub fn fruit_name(&self, fruit_id: i64) -> String {
        match self.by_fruit.get(&fruit_id).and_then(|id| self.plants.get(id)) {
            Some(spec) => spec.name.clone(),
            None => format!("fruit#{fruit_id}"),
        }
    }

    /// Total growth duration in seconds, summed over the phase table.
    pub fn grow_secs(&self, plant_id: i64) -> i64 {
        let Some(spec) = self.plants.get(&plant_id) else {
            return 0;
        };
        spec.grow_phases
            .split(';')
            .filter(|chunk| !chunk.is_empty())
            .filter_map(|chunk| chunk.split(':').nth(1))
            .filter_map(|secs| secs.parse::<i64>().ok())
            .sum()
    }
}
