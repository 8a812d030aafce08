//! Validation et réparation incrémentale de plans.

use crate::allocator::{AllocateOptions, Allocation, Allocator};
use crate::changes::{apply_all, Change};
use crate::constraint::{evaluate_plan, pair_is_feasible, ConstraintKind, ConstraintSet, ViolationSet};
use crate::diff::diff;
use crate::error::AllocError;
use crate::model::{Assignment, DemandId, Plan, StaffId};
use crate::store::EntityStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Overlap,
    DoubleAssignment,
    RestViolation,
}

impl ConflictKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::Overlap => "overlap",
            ConflictKind::DoubleAssignment => "double",
            ConflictKind::RestViolation => "rest",
        }
    }
}

/// Conflit entre deux affectations d'un même membre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub staff: StaffId,
    pub demand_a: DemandId,
    pub demand_b: DemandId,
    pub kind: ConflictKind,
}

/// Plan rendu faisable par retraits seuls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restored {
    pub kept: Plan,
    pub removed: Vec<Assignment>,
}

/// Résultat d'une réparation après changements.
#[derive(Debug, Clone)]
pub struct Repair {
    /// Instantané reconstruit après application des changements.
    pub store: EntityStore,
    pub allocation: Allocation,
    pub removed: Vec<Assignment>,
    pub added: Vec<Assignment>,
}

impl Repair {
    pub fn plan(&self) -> &Plan {
        &self.allocation.plan
    }

    pub fn churn(&self) -> usize {
        self.removed.len() + self.added.len()
    }
}

pub struct ConflictResolver<'a> {
    store: &'a EntityStore,
    opts: AllocateOptions,
    constraints: ConstraintSet,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(store: &'a EntityStore, opts: AllocateOptions) -> Self {
        Self {
            store,
            opts,
            constraints: store.constraints().relaxed(&opts),
        }
    }

    /// Toutes les violations du plan ; aucune dure ne doit subsister avant commit.
    pub fn validate(&self, plan: &Plan) -> ViolationSet {
        evaluate_plan(self.store, &self.constraints, plan)
    }

    /// Conflits durs par paires d'affectations d'un même membre.
    pub fn conflicts(&self, plan: &Plan) -> Vec<Conflict> {
        let store = self.store;
        let mut out = Vec::new();
        // un repos souple est scoré par `validate`, jamais levé en conflit
        let rest_minutes = self.constraints.hard_min_rest_minutes();

        let mut per_staff: BTreeMap<&StaffId, Vec<&Assignment>> = BTreeMap::new();
        for a in plan.iter() {
            per_staff.entry(&a.staff).or_default().push(a);
        }

        for (staff, assignments) in per_staff {
            let mut demands: Vec<_> = assignments
                .iter()
                .filter_map(|a| store.find_demand(&a.demand))
                .collect();
            demands.sort_by_key(|d| (d.interval.start, d.id.clone()));

            for (idx, a) in demands.iter().enumerate() {
                for b in demands.iter().skip(idx + 1) {
                    let kind = if a.id == b.id {
                        Some(ConflictKind::DoubleAssignment)
                    } else if a.interval.overlaps(&b.interval) {
                        self.constraints
                            .has(ConstraintKind::NoOverlap)
                            .then_some(ConflictKind::Overlap)
                    } else {
                        let gap = (b.interval.start - a.interval.end).num_minutes();
                        rest_minutes
                            .filter(|&rest| gap < rest)
                            .map(|_| ConflictKind::RestViolation)
                    };
                    if let Some(kind) = kind {
                        out.push(Conflict {
                            staff: staff.clone(),
                            demand_a: a.id.clone(),
                            demand_b: b.id.clone(),
                            kind,
                        });
                    }
                }
            }
        }

        out
    }

    /// Retire le minimum d'affectations pour restaurer la faisabilité dure, en
    /// préservant les plus anciennes et les plus prioritaires.
    pub fn restore(&self, plan: &Plan) -> Restored {
        let store = self.store;
        let mut removed = Vec::new();
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut live: Vec<(usize, usize, &Assignment)> = Vec::new();

        // références, doublons et violations de paire
        for a in plan.iter() {
            let (Some(s), Some(d)) = (store.staff_idx(&a.staff), store.demand_idx(&a.demand)) else {
                removed.push(a.clone());
                continue;
            };
            if !seen.insert((s, d))
                || !pair_is_feasible(&self.constraints, store.staff_at(s), store.demand_at(d))
            {
                removed.push(a.clone());
                continue;
            }
            live.push((s, d, a));
        }

        // sur-remplissage : on garde les plus anciennes
        let mut per_demand: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &(_, d, _)) in live.iter().enumerate() {
            per_demand.entry(d).or_default().push(i);
        }
        let mut dropped: HashSet<usize> = HashSet::new();
        for (d, mut idxs) in per_demand {
            let headcount = store.demand_at(d).headcount as usize;
            if idxs.len() <= headcount {
                continue;
            }
            idxs.sort_by_key(|&i| (live[i].2.created_at, live[i].0));
            dropped.extend(idxs.into_iter().skip(headcount));
        }

        // par membre : conflits de paires puis plafonds de charge
        let mut per_staff: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &(s, _, _)) in live.iter().enumerate() {
            if !dropped.contains(&i) {
                per_staff.entry(s).or_default().push(i);
            }
        }
        for (s, mut idxs) in per_staff {
            while let Some(victim) = self.pick_victim(s, &idxs, &live) {
                idxs.retain(|&i| i != victim);
                dropped.insert(victim);
            }
        }

        let mut kept = Vec::with_capacity(live.len());
        for (i, (_, _, a)) in live.iter().enumerate() {
            if dropped.contains(&i) {
                removed.push((*a).clone());
            } else {
                kept.push((*a).clone());
            }
        }
        removed.sort_by(|a, b| a.key().cmp(&b.key()));

        debug!(kept = kept.len(), removed = removed.len(), "plan restored");
        Restored {
            kept: Plan::new(kept),
            removed,
        }
    }

    /// Choisit l'affectation à retirer pour un membre, `None` s'il est faisable.
    ///
    /// Priorité au plus grand nombre de conflits, puis à la plus récente, puis
    /// à la moins prioritaire.
    fn pick_victim(&self, s: usize, idxs: &[usize], live: &[(usize, usize, &Assignment)]) -> Option<usize> {
        let store = self.store;
        let mut conflicts = vec![0usize; idxs.len()];
        for (x, &i) in idxs.iter().enumerate() {
            for (y, &j) in idxs.iter().enumerate().skip(x + 1) {
                let (da, db) = (store.demand_at(live[i].1), store.demand_at(live[j].1));
                if self.constraints.hard_pair_conflict(da, db).is_some() {
                    conflicts[x] += 1;
                    conflicts[y] += 1;
                }
            }
        }

        let victim_order = |&(x, &i): &(usize, &usize)| {
            let demand = store.demand_at(live[i].1);
            (
                conflicts[x],
                live[i].2.created_at,
                std::cmp::Reverse(demand.priority),
                live[i].1,
            )
        };

        if conflicts.iter().any(|&c| c > 0) {
            return idxs.iter().enumerate().max_by_key(victim_order).map(|(_, &i)| i);
        }

        if !self.constraints.has(ConstraintKind::MaxWorkload) {
            return None;
        }
        let staff = store.staff_at(s);
        let over_count = staff
            .workload
            .max_assignments
            .is_some_and(|m| idxs.len() > m as usize);
        let minutes: i64 = idxs
            .iter()
            .map(|&i| store.demand_at(live[i].1).interval.duration_minutes())
            .sum();
        let over_hours = staff.workload.max_minutes().is_some_and(|m| minutes > m);
        if over_count || over_hours {
            return idxs.iter().enumerate().max_by_key(victim_order).map(|(_, &i)| i);
        }
        None
    }

    /// Applique `changes`, retire les affectations devenues infaisables puis
    /// comble les trous autour des affectations conservées.
    pub fn resolve(&self, plan: &Plan, changes: &[Change]) -> Result<Repair, AllocError> {
        self.resolve_at(plan, changes, Utc::now())
    }

    pub fn resolve_at(
        &self,
        plan: &Plan,
        changes: &[Change],
        at: DateTime<Utc>,
    ) -> Result<Repair, AllocError> {
        let mut roster = self.store.to_roster();
        apply_all(&mut roster, changes)?;
        let store = EntityStore::load_with(
            roster.staff,
            roster.demands,
            roster.constraints,
            self.store.load_options(),
            at,
        )?;

        let restored = ConflictResolver::new(&store, self.opts).restore(plan);
        let allocation = Allocator::new(&store, self.opts).allocate_around(&restored.kept);
        let delta = diff(&restored.kept, &allocation.plan);

        info!(
            changes = changes.len(),
            removed = restored.removed.len(),
            added = delta.added.len(),
            "plan repaired"
        );

        Ok(Repair {
            allocation,
            removed: restored.removed,
            added: delta.added,
            store,
        })
    }
}
