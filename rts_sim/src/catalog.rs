use std::{
    collections::BTreeMap,
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use sim_runtime::{BuildingKind, ResourceKind, UnitKind};
use thiserror::Error;

pub const BUILTIN_UNIT_CATALOG: &str = include_str!("data/unit_catalog.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResourceCost {
    pub resource: ResourceKind,
    pub amount: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildingStats {
    pub construction_cost: Vec<ResourceCost>,
    /// Seconds of work for a single worker at the base construction rate.
    pub construction_time: f32,
    /// Edge length of the square footprint.
    pub footprint: f32,
    #[serde(default)]
    pub population_bonus: u32,
    #[serde(default)]
    pub income: Option<ResourceCost>,
    #[serde(default)]
    pub recruits: Vec<UnitKind>,
}

impl BuildingStats {
    pub fn half_extent(&self) -> f32 {
        self.footprint * 0.5
    }

    /// Distance a worker keeps from the building centre when walking up to it.
    pub fn stopping_distance(&self) -> f32 {
        self.half_extent() + 0.5
    }

    pub fn can_recruit(&self, unit: UnitKind) -> bool {
        self.recruits.contains(&unit)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitStats {
    pub recruitment_cost: Vec<ResourceCost>,
    pub recruitment_time: f32,
    pub move_speed: f32,
}

/// Building and unit stat table keyed by kind.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitCatalog {
    buildings: BTreeMap<BuildingKind, BuildingStats>,
    units: BTreeMap<UnitKind, UnitStats>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse unit catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read unit catalog from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unit catalog has no entry for building '{0}'")]
    MissingBuilding(&'static str),
    #[error("unit catalog has no entry for unit '{0}'")]
    MissingUnit(&'static str),
    #[error("building '{0}' has a non-positive footprint")]
    InvalidFootprint(&'static str),
}

impl UnitCatalog {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_UNIT_CATALOG).expect("builtin unit catalog should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let catalog: UnitCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        UnitCatalog::from_json_str(&contents)
    }

    /// Every kind must have an entry so lookups during the tick cannot fail.
    fn validate(&self) -> Result<(), CatalogError> {
        for kind in BuildingKind::VARIANTS {
            let stats = self
                .buildings
                .get(&kind)
                .ok_or(CatalogError::MissingBuilding(kind.as_str()))?;
            if stats.footprint <= 0.0 {
                return Err(CatalogError::InvalidFootprint(kind.as_str()));
            }
        }
        for kind in UnitKind::VARIANTS {
            if !self.units.contains_key(&kind) {
                return Err(CatalogError::MissingUnit(kind.as_str()));
            }
        }
        Ok(())
    }

    pub fn building(&self, kind: BuildingKind) -> Result<&BuildingStats, CatalogError> {
        self.buildings
            .get(&kind)
            .ok_or(CatalogError::MissingBuilding(kind.as_str()))
    }

    pub fn unit(&self, kind: UnitKind) -> Result<&UnitStats, CatalogError> {
        self.units
            .get(&kind)
            .ok_or(CatalogError::MissingUnit(kind.as_str()))
    }

    /// Footprint of `kind`, defaulting to one cell for incomplete tables.
    pub fn footprint(&self, kind: BuildingKind) -> f32 {
        self.building(kind)
            .map(|stats| stats.footprint)
            .unwrap_or(1.0)
    }

    pub fn move_speed(&self, kind: UnitKind) -> f32 {
        self.unit(kind).map(|stats| stats.move_speed).unwrap_or(1.0)
    }
}

#[derive(Resource, Debug, Clone)]
pub struct UnitCatalogHandle(pub Arc<UnitCatalog>);

impl UnitCatalogHandle {
    pub fn new(catalog: Arc<UnitCatalog>) -> Self {
        Self(catalog)
    }

    pub fn get(&self) -> Arc<UnitCatalog> {
        Arc::clone(&self.0)
    }

    pub fn catalog(&self) -> &UnitCatalog {
        &self.0
    }
}

pub fn load_unit_catalog_from_env() -> Arc<UnitCatalog> {
    let override_path = env::var("RTS_CATALOG_PATH").ok().map(PathBuf::from);
    let default_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/unit_catalog.json");
    let path = override_path.unwrap_or(default_path);

    match UnitCatalog::from_file(&path) {
        Ok(catalog) => {
            tracing::info!(
                target: "rts::config",
                path = %path.display(),
                "unit_catalog.loaded=file"
            );
            Arc::new(catalog)
        }
        Err(err) => {
            tracing::warn!(
                target: "rts::config",
                path = %path.display(),
                error = %err,
                "unit_catalog.load_failed"
            );
            tracing::info!(target: "rts::config", "unit_catalog.loaded=builtin");
            UnitCatalog::builtin()
        }
    }
}
