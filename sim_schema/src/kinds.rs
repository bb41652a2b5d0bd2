use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Worker,
    Warrior,
    Archer,
    Ballista,
}

impl UnitKind {
    pub const VARIANTS: [UnitKind; 4] = [
        UnitKind::Worker,
        UnitKind::Warrior,
        UnitKind::Archer,
        UnitKind::Ballista,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Worker => "worker",
            UnitKind::Warrior => "warrior",
            UnitKind::Archer => "archer",
            UnitKind::Ballista => "ballista",
        }
    }
}

impl FromStr for UnitKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker" => Ok(UnitKind::Worker),
            "warrior" => Ok(UnitKind::Warrior),
            "archer" => Ok(UnitKind::Archer),
            "ballista" => Ok(UnitKind::Ballista),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingKind {
    /// Town center: resource drop-off point and worker recruitment.
    Center,
    Barracks,
    House,
    Farm,
}

impl BuildingKind {
    pub const VARIANTS: [BuildingKind; 4] = [
        BuildingKind::Center,
        BuildingKind::Barracks,
        BuildingKind::House,
        BuildingKind::Farm,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            BuildingKind::Center => "center",
            BuildingKind::Barracks => "barracks",
            BuildingKind::House => "house",
            BuildingKind::Farm => "farm",
        }
    }
}

impl FromStr for BuildingKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "center" | "town_center" => Ok(BuildingKind::Center),
            "barracks" => Ok(BuildingKind::Barracks),
            "house" => Ok(BuildingKind::House),
            "farm" => Ok(BuildingKind::Farm),
            _ => Err(()),
        }
    }
}

/// Economy resource categories. `Population` only ever appears in cost lists;
/// workers cannot carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Wood,
    Food,
    Population,
}

impl ResourceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Wood => "wood",
            ResourceKind::Food => "food",
            ResourceKind::Population => "population",
        }
    }

    pub const fn is_carryable(self) -> bool {
        matches!(self, ResourceKind::Wood | ResourceKind::Food)
    }
}

impl FromStr for ResourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wood" => Ok(ResourceKind::Wood),
            "food" => Ok(ResourceKind::Food),
            "population" => Ok(ResourceKind::Population),
            _ => Err(()),
        }
    }
}

/// Replicated summary of a worker's active task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Idle,
    Moving,
    Gathering,
    Storing,
    Constructing,
}

impl TaskKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Idle => "idle",
            TaskKind::Moving => "moving",
            TaskKind::Gathering => "gathering",
            TaskKind::Storing => "storing",
            TaskKind::Constructing => "constructing",
        }
    }
}
