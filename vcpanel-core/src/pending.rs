/**
 * PENDING OPERATIONS - Suivi des mutations en attente de confirmation serveur
 *
 * RÔLE :
 * Chaque mutation acceptée par le backend laisse un marqueur indexé par sa
 * cible (VM + alimentation / snapshot). Le marqueur n'est levé que lorsqu'un
 * inventaire récupéré *après* l'écriture confirme l'intention.
 *
 * FONCTIONNEMENT :
 * - `Epoch` : compteur monotone, tamponne chaque fetch (à l'émission) et
 *   chaque écriture optimiste
 * - Un fetch émis avant une écriture ne peut ni lever son marqueur ni
 *   écraser le `power_state` optimiste
 * - Tant qu'un marqueur d'alimentation est ouvert, l'état optimiste est
 *   réappliqué par-dessus les données serveur, fetchs récents compris
 * - La génération de la dernière écriture optimiste par VM survit au
 *   marqueur : un fetch plus ancien qui arrive après la confirmation ne
 *   touche pas non plus à l'alimentation
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::models::{PowerState, VirtualMachine};
use crate::state::{new_state, Shared};

/// Compteur de génération partagé entre l'inventaire et les mutations
#[derive(Clone, Default)]
pub struct Epoch(Arc<AtomicU64>);

impl Epoch {
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PendingTarget {
    Power,
    NewSnapshot(String),
    Snapshot(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub vm: String,
    pub target: PendingTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Power(PowerState),
    CreateSnapshot { name: String, known_ids: Vec<String> },
    RevertSnapshot { id: String },
    DeleteSnapshot { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Settled,
    Outstanding,
    TargetGone,
}

#[derive(Debug, Clone)]
pub struct PendingOp {
    pub id: Uuid,
    pub vm: String,
    pub intent: Intent,
    pub generation: u64,
    /// Dernier état d'alimentation vu côté serveur
    pub observed: Option<PowerState>,
}

impl PendingOp {
    pub fn new(vm: impl Into<String>, intent: Intent, generation: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            vm: vm.into(),
            intent,
            generation,
            observed: None,
        }
    }

    pub fn key(&self) -> PendingKey {
        let target = match &self.intent {
            Intent::Power(_) => PendingTarget::Power,
            Intent::CreateSnapshot { name, .. } => PendingTarget::NewSnapshot(name.clone()),
            Intent::RevertSnapshot { id } | Intent::DeleteSnapshot { id } => PendingTarget::Snapshot(id.clone()),
        };
        PendingKey { vm: self.vm.clone(), target }
    }

    /// Juge un VM récupéré par un fetch émis à la génération `issued`.
    pub fn evaluate(&self, vm: Option<&VirtualMachine>, issued: u64) -> Verdict {
        if issued <= self.generation {
            return Verdict::Outstanding;
        }
        let Some(vm) = vm else { return Verdict::TargetGone };
        let consistent = match &self.intent {
            Intent::Power(target) => vm.power_state == *target,
            Intent::CreateSnapshot { name, known_ids } => vm
                .snapshots
                .iter()
                .any(|s| s.name == *name && !known_ids.contains(&s.id)),
            // rien d'observable côté inventaire, il suffit que la cible existe
            Intent::RevertSnapshot { id } => {
                if vm.snapshot(id).is_none() {
                    return Verdict::TargetGone;
                }
                true
            }
            Intent::DeleteSnapshot { id } => vm.snapshot(id).is_none(),
        };
        if consistent {
            Verdict::Settled
        } else {
            Verdict::Outstanding
        }
    }
}

#[derive(Clone)]
pub struct PendingSet {
    ops: Shared<HashMap<PendingKey, PendingOp>>,
    /// Génération de la dernière écriture optimiste d'alimentation, par VM
    power_writes: Shared<HashMap<String, u64>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self {
            ops: new_state(HashMap::new()),
            power_writes: new_state(HashMap::new()),
        }
    }

    /// Remplace un éventuel marqueur existant sur la même cible
    pub fn insert(&self, op: PendingOp) -> Option<PendingOp> {
        if let Intent::Power(_) = op.intent {
            let mut writes = self.power_writes.lock();
            let last = writes.entry(op.vm.clone()).or_insert(0);
            *last = (*last).max(op.generation);
        }
        self.ops.lock().insert(op.key(), op)
    }

    /// Vrai si un fetch émis à `issued` est antérieur à la dernière écriture
    /// optimiste d'alimentation de `vm`, que son marqueur soit levé ou non.
    pub fn predates_power_write(&self, vm: &str, issued: u64) -> bool {
        self.power_writes
            .lock()
            .get(vm)
            .is_some_and(|generation| issued <= *generation)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.ops.lock().values().any(|op| op.id == id)
    }

    pub fn get(&self, key: &PendingKey) -> Option<PendingOp> {
        self.ops.lock().get(key).cloned()
    }

    pub fn remove(&self, id: Uuid) -> Option<PendingOp> {
        let mut ops = self.ops.lock();
        let key = ops.iter().find(|(_, op)| op.id == id).map(|(k, _)| k.clone())?;
        ops.remove(&key)
    }

    pub fn clear(&self) {
        self.ops.lock().clear();
        self.power_writes.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.ops.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    /// Confronte un inventaire fraîchement récupéré aux marqueurs ouverts.
    /// Lève les marqueurs confirmés et retourne les opérations confirmées.
    ///
    /// Tout marqueur d'alimentation encore ouvert masque le `power_state`
    /// récupéré, y compris quand le fetch est postérieur à l'écriture : une
    /// donnée serveur fraîche mais divergente reste cachée jusqu'à
    /// confirmation ou épuisement des tentatives de réconciliation.
    pub fn apply_to(&self, fetched: &mut [VirtualMachine], issued: u64) -> Vec<PendingOp> {
        let mut settled = Vec::new();
        self.ops.lock().retain(|_, op| {
            let vm = fetched.iter_mut().find(|v| v.name == op.vm);
            if let (Intent::Power(_), Some(v)) = (&op.intent, vm.as_deref()) {
                if issued > op.generation {
                    op.observed = Some(v.power_state);
                }
            }
            match (op.evaluate(vm.as_deref(), issued), vm) {
                (Verdict::Settled, _) => {
                    settled.push(op.clone());
                    false
                }
                (Verdict::TargetGone, _) => {
                    debug!(vm = %op.vm, intent = ?op.intent, "pending target vanished from inventory");
                    false
                }
                (Verdict::Outstanding, Some(v)) => {
                    if let Intent::Power(target) = op.intent {
                        v.power_state = target;
                    }
                    true
                }
                (Verdict::Outstanding, None) => true,
            }
        });
        settled
    }
}

impl Default for PendingSet {
    fn default() -> Self {
        Self::new()
    }
}
