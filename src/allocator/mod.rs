mod candidates;
mod flow;
mod search;
mod types;

pub use types::{
    AllocateOptions, Allocation, CancelToken, Coverage, LoadOptions, OptimizeFor, SearchStatus,
    Underfill, UnderfillCause,
};

use crate::constraint::{evaluate_plan, ConstraintKind, ConstraintSet};
use crate::model::{Assignment, Plan};
use crate::store::EntityStore;
use rayon::prelude::*;
use search::{ComponentOutcome, SearchContext};
use tracing::{info, warn};

/// Allocateur : recherche une affectation staff → demand sur un instantané.
#[derive(Debug, Clone)]
pub struct Allocator<'a> {
    store: &'a EntityStore,
    opts: AllocateOptions,
    constraints: ConstraintSet,
    cancel: Option<CancelToken>,
}

impl<'a> Allocator<'a> {
    pub fn new(store: &'a EntityStore, opts: AllocateOptions) -> Self {
        Self {
            store,
            opts,
            constraints: store.constraints().relaxed(&opts),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &AllocateOptions {
        &self.opts
    }

    /// Contraintes effectives (après `allow_overlap`).
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn allocate(&self) -> Allocation {
        self.allocate_around(&Plan::default())
    }

    /// Alloue les effectifs restants sans toucher aux affectations de `fixed`.
    pub fn allocate_around(&self, fixed: &Plan) -> Allocation {
        let store = self.store;
        let fixed = candidates::Fixed::from_plan(store, fixed);
        let graph = candidates::build(store, &self.constraints, &self.opts, &fixed);
        let components = candidates::components(store, &graph);

        let ctx = SearchContext {
            store,
            constraints: &self.constraints,
            opts: &self.opts,
            fixed: &fixed,
            graph: &graph,
            cancel: self.cancel.as_ref(),
        };
        let outcomes: Vec<ComponentOutcome> = components
            .par_iter()
            .map(|comp| search::solve_component(&ctx, comp))
            .collect();

        let iterations: u64 = outcomes.iter().map(|o| o.iterations).sum();
        let cancelled = outcomes.iter().any(|o| o.cancelled);

        let at = store.snapshot_at();
        let mut assignments = fixed.records.clone();
        assignments.extend(outcomes.iter().flat_map(|o| {
            o.chosen.iter().map(|&(s, d)| {
                let demand = store.demand_at(d);
                Assignment::new(store.staff_at(s).id.clone(), demand.id.clone(), at)
                    .with_status(demand.status)
            })
        }));
        let plan = Plan::new(assignments);

        let underfilled = self.underfilled(&plan, &graph);
        let violations = evaluate_plan(store, &self.constraints, &plan);
        if !violations.is_feasible() {
            // n'arrive que si les affectations fixes étaient déjà infaisables
            warn!(
                hard = violations.hard().count(),
                "allocation carries hard violations from fixed assignments"
            );
        }

        let status = if cancelled {
            warn!(iterations, "allocation search cancelled, returning best plan so far");
            SearchStatus::Cancelled
        } else {
            SearchStatus::Completed
        };

        info!(
            components = components.len(),
            assigned = plan.len(),
            underfilled = underfilled.len(),
            iterations,
            "allocation finished"
        );

        Allocation {
            plan,
            underfilled,
            violations: violations.soft_only(),
            status,
            iterations,
        }
    }

    fn underfilled(&self, plan: &Plan, graph: &candidates::CandidateGraph) -> Vec<Underfill> {
        let store = self.store;
        let universe = store.skill_universe();
        let skills_hard = self
            .constraints
            .iter()
            .any(|c| c.kind() == ConstraintKind::SkillMatch && c.is_hard());

        let mut out = Vec::new();
        for (d, demand) in store.demands().iter().enumerate() {
            let filled = plan.for_demand(&demand.id).count() as u32;
            if filled >= demand.headcount {
                continue;
            }
            let qualified = !skills_hard || demand.skills.iter().all(|s| universe.contains(s.as_str()));
            let cause = if !qualified {
                UnderfillCause::NoQualifiedStaff
            } else if graph.degree[d] == 0 {
                UnderfillCause::NoEligibleStaff
            } else {
                UnderfillCause::CapacityExhausted
            };
            out.push(Underfill {
                demand: demand.id.clone(),
                required: demand.headcount,
                filled,
                cause,
            });
        }
        out.sort_by(|a, b| a.demand.cmp(&b.demand));
        out
    }
}

/// Raccourci : alloue sur `store` avec `opts`.
pub fn allocate(store: &EntityStore, opts: AllocateOptions) -> Allocation {
    Allocator::new(store, opts).allocate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::model::{Demand, DemandId, Interval, Staff, StaffId};
    use chrono::{TimeZone, Utc};

    fn window(h0: u32, h1: u32) -> Interval {
        Interval::new(
            Utc.with_ymd_and_hms(2026, 3, 2, h0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, h1, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn flow_beats_greedy_on_stranded_priority() {
        // "alice" sait tout faire, "bob" seulement le besoin basse priorité ;
        // les deux besoins se chevauchent.
        let staff = vec![
            Staff::new("alice", "Alice")
                .with_skill("a")
                .with_skill("b")
                .with_availability(window(0, 23)),
            Staff::new("bob", "Bob").with_skill("b").with_availability(window(0, 23)),
        ];
        let demands = vec![
            Demand::new("high", "High", window(8, 12))
                .with_skill("a")
                .with_priority(9),
            Demand::new("low", "Low", window(8, 12)).with_skill("b"),
        ];
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let store = EntityStore::load_at(staff, demands, Constraint::default_set(), at).unwrap();
        let alloc = allocate(&store, AllocateOptions::default());

        assert_eq!(alloc.plan.len(), 2);
        assert!(alloc.plan.contains(&StaffId::new("alice"), &DemandId::new("high")));
        assert!(alloc.plan.contains(&StaffId::new("bob"), &DemandId::new("low")));
    }

    #[test]
    fn exhausted_budget_still_returns_feasible_plan() {
        let staff = vec![Staff::new("alice", "Alice").with_availability(window(0, 23))];
        let demands = vec![
            Demand::new("d1", "D1", window(8, 10)),
            Demand::new("d2", "D2", window(9, 11)),
        ];
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let store = EntityStore::load_at(staff, demands, Constraint::default_set(), at).unwrap();
        let opts = AllocateOptions {
            max_search_iterations: 2,
            ..AllocateOptions::default()
        };
        let alloc = allocate(&store, opts);

        assert_eq!(alloc.status, SearchStatus::Cancelled);
        assert_eq!(alloc.plan.len(), 1);
    }
}
