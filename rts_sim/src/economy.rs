//! Per-player economy ledger and the serial playback phase that mutates it.
//!
//! Worker tasks never touch shared state directly. They push
//! [`PendingMutation`]s during the task phase and [`apply_pending_mutations`]
//! replays them one at a time in a deterministic order, so two workers
//! draining the same node or depositing into the same ledger in one tick
//! cannot race.

use std::collections::BTreeMap;

use bevy::prelude::*;
use sim_runtime::{LedgerState, PlayerId, ResourceKind};
use thiserror::Error;

use crate::{
    catalog::{ResourceCost, UnitCatalogHandle},
    components::{
        Building, ConstructionProgress, IncomeTimer, NetworkId, Owner, PassiveEffectsApplied,
        ResourceNode, Worker, WorkerCarry,
    },
    config::SimulationConfig,
    metrics::SimulationMetrics,
    resources::NetworkIds,
    targeting::{InputTarget, ServerTarget},
    workers::{self, CenterRef, GatherTimer, UnitTask, MAX_CARRY},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Population {
    pub current: u32,
    pub max: u32,
}

/// Wood, food and population for one player.
///
/// Population uses `current` as consumed capacity: debiting population
/// reserves capacity and fails past `max`, crediting it raises `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EconomyLedger {
    pub wood: u32,
    pub food: u32,
    pub population: Population,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient {resource}: need {needed}, have {available}")]
    Insufficient {
        resource: &'static str,
        needed: u32,
        available: u32,
    },
    #[error("player {0} has no ledger")]
    UnknownPlayer(PlayerId),
}

impl EconomyLedger {
    pub fn new(wood: u32, food: u32, population_current: u32, population_max: u32) -> Self {
        Self {
            wood,
            food,
            population: Population {
                current: population_current,
                max: population_max,
            },
        }
    }

    pub fn amount(&self, resource: ResourceKind) -> u32 {
        match resource {
            ResourceKind::Wood => self.wood,
            ResourceKind::Food => self.food,
            ResourceKind::Population => self.population.max.saturating_sub(self.population.current),
        }
    }

    pub fn credit(&mut self, resource: ResourceKind, amount: u32) {
        match resource {
            ResourceKind::Wood => self.wood = self.wood.saturating_add(amount),
            ResourceKind::Food => self.food = self.food.saturating_add(amount),
            ResourceKind::Population => {
                self.population.max = self.population.max.saturating_add(amount)
            }
        }
    }

    pub fn debit(&mut self, resource: ResourceKind, amount: u32) -> Result<(), LedgerError> {
        let available = self.amount(resource);
        if available < amount {
            return Err(LedgerError::Insufficient {
                resource: resource.as_str(),
                needed: amount,
                available,
            });
        }
        match resource {
            ResourceKind::Wood => self.wood -= amount,
            ResourceKind::Food => self.food -= amount,
            ResourceKind::Population => self.population.current += amount,
        }
        Ok(())
    }

    pub fn check(&self, costs: &[ResourceCost]) -> Result<(), LedgerError> {
        for cost in costs {
            let available = self.amount(cost.resource);
            if available < cost.amount {
                return Err(LedgerError::Insufficient {
                    resource: cost.resource.as_str(),
                    needed: cost.amount,
                    available,
                });
            }
        }
        Ok(())
    }

    pub fn can_afford(&self, costs: &[ResourceCost]) -> bool {
        self.check(costs).is_ok()
    }

    /// Debit every cost or none of them.
    pub fn charge(&mut self, costs: &[ResourceCost]) -> Result<(), LedgerError> {
        self.check(costs)?;
        for cost in costs {
            self.debit(cost.resource, cost.amount)?;
        }
        Ok(())
    }

    pub fn to_state(&self, player: PlayerId) -> LedgerState {
        LedgerState {
            player,
            wood: self.wood,
            food: self.food,
            population_current: self.population.current,
            population_max: self.population.max,
        }
    }

    pub fn from_state(state: &LedgerState) -> Self {
        Self::new(
            state.wood,
            state.food,
            state.population_current,
            state.population_max,
        )
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct PlayerLedgers {
    ledgers: BTreeMap<PlayerId, EconomyLedger>,
}

impl PlayerLedgers {
    pub fn insert(&mut self, player: PlayerId, ledger: EconomyLedger) {
        self.ledgers.insert(player, ledger);
    }

    pub fn get(&self, player: PlayerId) -> Option<&EconomyLedger> {
        self.ledgers.get(&player)
    }

    pub fn get_mut(&mut self, player: PlayerId) -> Option<&mut EconomyLedger> {
        self.ledgers.get_mut(&player)
    }

    pub fn credit(
        &mut self,
        player: PlayerId,
        resource: ResourceKind,
        amount: u32,
    ) -> Result<(), LedgerError> {
        let ledger = self
            .ledgers
            .get_mut(&player)
            .ok_or(LedgerError::UnknownPlayer(player))?;
        ledger.credit(resource, amount);
        Ok(())
    }

    pub fn debit(
        &mut self,
        player: PlayerId,
        resource: ResourceKind,
        amount: u32,
    ) -> Result<(), LedgerError> {
        self.ledgers
            .get_mut(&player)
            .ok_or(LedgerError::UnknownPlayer(player))?
            .debit(resource, amount)
    }

    pub fn charge(&mut self, player: PlayerId, costs: &[ResourceCost]) -> Result<(), LedgerError> {
        self.ledgers
            .get_mut(&player)
            .ok_or(LedgerError::UnknownPlayer(player))?
            .charge(costs)
    }

    pub fn states(&self) -> Vec<LedgerState> {
        self.ledgers
            .iter()
            .map(|(player, ledger)| ledger.to_state(*player))
            .collect()
    }
}

/// Deferred cross-entity write produced during the task phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PendingMutation {
    Gather {
        worker: Entity,
        resource: Entity,
    },
    Deposit {
        worker: Entity,
        building: Entity,
    },
    Construct {
        worker: Entity,
        building: Entity,
        progress: f32,
    },
    Credit {
        player: PlayerId,
        resource: ResourceKind,
        amount: u32,
    },
}

impl PendingMutation {
    fn sort_key(&self) -> (u8, u64) {
        match self {
            PendingMutation::Gather { worker, .. } => (0, worker.to_bits()),
            PendingMutation::Deposit { worker, .. } => (1, worker.to_bits()),
            PendingMutation::Construct { worker, .. } => (2, worker.to_bits()),
            PendingMutation::Credit { player, .. } => (3, u64::from(player.0)),
        }
    }
}

#[derive(Resource, Debug, Default)]
pub struct PendingMutations {
    queue: Vec<PendingMutation>,
}

impl PendingMutations {
    pub fn push(&mut self, mutation: PendingMutation) {
        self.queue.push(mutation);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn drain_sorted(&mut self) -> Vec<PendingMutation> {
        let mut drained = std::mem::take(&mut self.queue);
        drained.sort_by_key(PendingMutation::sort_key);
        drained
    }
}

type WorkerPlayback<'a> = (
    &'a Transform,
    &'a Owner,
    &'a InputTarget,
    &'a mut WorkerCarry,
    &'a mut UnitTask,
    &'a mut ServerTarget,
    &'a mut GatherTimer,
);

/// Single-writer playback of every mutation queued this tick.
#[allow(clippy::too_many_arguments)]
pub fn apply_pending_mutations(
    mut commands: Commands,
    config: Res<SimulationConfig>,
    catalog: Res<UnitCatalogHandle>,
    mut pending: ResMut<PendingMutations>,
    mut ledgers: ResMut<PlayerLedgers>,
    mut ids: ResMut<NetworkIds>,
    mut metrics: ResMut<SimulationMetrics>,
    mut workers_q: Query<WorkerPlayback, With<Worker>>,
    mut nodes: Query<(&Transform, &mut ResourceNode, &NetworkId)>,
    mut buildings: Query<(
        Entity,
        &Transform,
        &Building,
        &Owner,
        &NetworkId,
        Option<&mut ConstructionProgress>,
    )>,
) {
    for mutation in pending.drain_sorted() {
        match mutation {
            PendingMutation::Gather { worker, resource } => {
                let Ok((transform, owner, input, mut carry, mut task, mut server, mut timer)) =
                    workers_q.get_mut(worker)
                else {
                    continue;
                };

                let gathered = match nodes.get_mut(resource) {
                    Ok((node_transform, mut node, _)) if node.value > 0 => {
                        if carry.kind != Some(node.kind) {
                            if let Some(dropped) = carry.kind.filter(|_| carry.value > 0) {
                                metrics.resources_dropped += u64::from(carry.value);
                                tracing::debug!(
                                    target: "rts::economy",
                                    worker = ?worker,
                                    kind = dropped.as_str(),
                                    amount = carry.value,
                                    "gather.carry_dropped"
                                );
                            }
                            carry.value = 0;
                        }
                        let amount = workers::AMOUNT_TO_GATHER
                            .min(node.value)
                            .min(MAX_CARRY.saturating_sub(carry.value));
                        node.value -= amount;
                        carry.value += amount;
                        carry.kind = Some(node.kind);
                        metrics.resources_gathered += u64::from(amount);
                        Some((node.value == 0, node.kind, node_transform.translation))
                    }
                    _ => None,
                };

                let Some((depleted, kind, node_position)) = gathered else {
                    // Another worker drained the node earlier in this playback.
                    let center = nearest_center(&buildings, &catalog, owner.0, transform.translation);
                    workers::handle_lost_resource(
                        &mut task, &mut carry, &mut server, input, &mut timer, center,
                    );
                    continue;
                };

                if depleted {
                    commands.entity(resource).despawn();
                    ids.release_entity(resource);
                    let replacement = nodes
                        .iter()
                        .filter(|(_, node, _)| node.kind == kind && node.value > 0)
                        .filter(|(t, _, _)| {
                            planar_distance_sq(t.translation, node_position)
                                <= config.fallback_search_radius * config.fallback_search_radius
                        })
                        .min_by(|a, b| {
                            planar_distance_sq(a.0.translation, node_position)
                                .total_cmp(&planar_distance_sq(b.0.translation, node_position))
                                .then(a.2 .0.cmp(&b.2 .0))
                        })
                        .and_then(|(_, _, net)| ids.entity(net.0));
                    carry.previous_resource = replacement;
                    tracing::debug!(
                        target: "rts::workers",
                        worker = ?worker,
                        resource = ?resource,
                        "gather.depleted"
                    );
                } else if carry.value >= MAX_CARRY {
                    carry.previous_resource = Some(resource);
                }

                if depleted || carry.value >= MAX_CARRY {
                    let center = nearest_center(&buildings, &catalog, owner.0, transform.translation);
                    workers::assign_storage(&mut task, &mut server, input, &mut timer, center);
                }
            }
            PendingMutation::Deposit { worker, building } => {
                let Ok((_, owner, input, mut carry, mut task, mut server, mut timer)) =
                    workers_q.get_mut(worker)
                else {
                    continue;
                };
                if !buildings.contains(building) {
                    continue;
                }
                if let (Some(kind), value) = (carry.kind, carry.value) {
                    if value > 0 {
                        if let Err(err) = ledgers.credit(owner.0, kind, value) {
                            tracing::warn!(
                                target: "rts::workers",
                                player = %owner.0,
                                error = %err,
                                "deposit.rejected"
                            );
                            continue;
                        }
                        tracing::debug!(
                            target: "rts::workers",
                            player = %owner.0,
                            resource = kind.as_str(),
                            value,
                            "deposit.applied"
                        );
                    }
                }
                let previous = carry.previous_resource.take();
                carry.kind = None;
                carry.value = 0;

                let resume = previous.and_then(|entity| {
                    nodes
                        .get(entity)
                        .ok()
                        .filter(|(_, node, _)| node.value > 0)
                        .map(|(t, _, net)| (entity, net.0, t.translation))
                });
                match resume {
                    Some((entity, net, position)) => workers::assign_gather(
                        &mut task,
                        &mut server,
                        input,
                        &mut timer,
                        entity,
                        net,
                        position,
                        config.gather_range * 0.5,
                    ),
                    None => {
                        *task = UnitTask::Idle;
                        timer.0 = 0;
                    }
                }
            }
            PendingMutation::Construct {
                worker,
                building,
                progress,
            } => {
                let finished = match buildings.get_mut(building) {
                    Ok((_, _, site, _, _, Some(mut construction))) => {
                        construction.current = (construction.current + progress).min(construction.total);
                        if construction.is_complete() {
                            tracing::info!(
                                target: "rts::workers",
                                building = site.kind.as_str(),
                                "construction.completed"
                            );
                            commands.entity(building).remove::<ConstructionProgress>();
                            true
                        } else {
                            false
                        }
                    }
                    _ => true,
                };
                if finished {
                    if let Ok((_, _, _, _, mut task, _, _)) = workers_q.get_mut(worker) {
                        *task = UnitTask::Idle;
                    }
                }
            }
            PendingMutation::Credit {
                player,
                resource,
                amount,
            } => {
                if let Err(err) = ledgers.credit(player, resource, amount) {
                    tracing::warn!(
                        target: "rts::server",
                        player = %player,
                        error = %err,
                        "income.rejected"
                    );
                }
            }
        }
    }
}

/// Nearest finished Center owned by `player`.
pub(crate) fn nearest_center(
    buildings: &Query<(
        Entity,
        &Transform,
        &Building,
        &Owner,
        &NetworkId,
        Option<&mut ConstructionProgress>,
    )>,
    catalog: &UnitCatalogHandle,
    player: PlayerId,
    from: Vec3,
) -> Option<CenterRef> {
    let candidates = buildings
        .iter()
        .filter(|(_, _, _, _, _, construction)| construction.is_none())
        .map(|(entity, transform, building, owner, net, _)| {
            (entity, transform.translation, building.kind, owner.0, net.0)
        });
    workers::closest_center(candidates, catalog.catalog(), player, from)
}

pub(crate) fn planar_distance_sq(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    dx * dx + dz * dz
}

/// Grant population bonuses once per finished building.
pub fn apply_completion_effects(
    mut commands: Commands,
    catalog: Res<UnitCatalogHandle>,
    mut ledgers: ResMut<PlayerLedgers>,
    finished: Query<
        (Entity, &Building, &Owner),
        (Without<ConstructionProgress>, Without<PassiveEffectsApplied>),
    >,
) {
    let mut completed: Vec<_> = finished.iter().collect();
    completed.sort_by_key(|(entity, _, _)| *entity);
    for (entity, building, owner) in completed {
        let Ok(stats) = catalog.catalog().building(building.kind) else {
            continue;
        };
        if stats.population_bonus > 0 {
            if let Err(err) = ledgers.credit(owner.0, ResourceKind::Population, stats.population_bonus)
            {
                tracing::warn!(
                    target: "rts::server",
                    player = %owner.0,
                    error = %err,
                    "passive_effects.rejected"
                );
            }
        }
        let mut entity_commands = commands.entity(entity);
        entity_commands.insert(PassiveEffectsApplied);
        if stats.income.is_some() {
            entity_commands.insert(IncomeTimer::default());
        }
        tracing::debug!(
            target: "rts::server",
            player = %owner.0,
            building = building.kind.as_str(),
            bonus = stats.population_bonus,
            "passive_effects.applied"
        );
    }
}

/// Queue passive income for finished buildings on the income interval.
pub fn accrue_passive_income(
    config: Res<SimulationConfig>,
    catalog: Res<UnitCatalogHandle>,
    mut pending: ResMut<PendingMutations>,
    mut producers: Query<(&Building, &Owner, &mut IncomeTimer), Without<ConstructionProgress>>,
) {
    let interval = config.income_interval_ticks();
    for (building, owner, mut timer) in producers.iter_mut() {
        let Some(income) = catalog
            .catalog()
            .building(building.kind)
            .ok()
            .and_then(|stats| stats.income)
        else {
            continue;
        };
        timer.0 += 1;
        if timer.0 >= interval {
            timer.0 = 0;
            pending.push(PendingMutation::Credit {
                player: owner.0,
                resource: income.resource,
                amount: income.amount,
            });
        }
    }
}
