use super::AllocateOptions;
use crate::constraint::{pair_is_feasible, pair_penalty, ConstraintKind, ConstraintSet};
use crate::model::{Assignment, Plan};
use crate::store::EntityStore;
use tracing::warn;

/// Affectations conservées autour desquelles on alloue (réparation incrémentale).
#[derive(Debug, Clone)]
pub(super) struct Fixed {
    pub by_staff: Vec<Vec<usize>>,
    pub by_demand: Vec<Vec<usize>>,
    pub records: Vec<Assignment>,
}

impl Fixed {
    pub(super) fn from_plan(store: &EntityStore, plan: &Plan) -> Self {
        let mut by_staff = vec![Vec::new(); store.staff().len()];
        let mut by_demand = vec![Vec::new(); store.demands().len()];
        let mut records = Vec::with_capacity(plan.len());
        for a in plan.iter() {
            let (Some(s), Some(d)) = (store.staff_idx(&a.staff), store.demand_idx(&a.demand)) else {
                warn!(staff = %a.staff, demand = %a.demand, "ignoring fixed assignment on unknown entity");
                continue;
            };
            if by_staff[s].contains(&d) {
                continue;
            }
            by_staff[s].push(d);
            by_demand[d].push(s);
            records.push(a.clone());
        }
        Self {
            by_staff,
            by_demand,
            records,
        }
    }
}

/// Arête candidate (staff, demand) avec sa valeur (plus haut = mieux).
#[derive(Debug, Clone, Copy)]
pub(super) struct Edge {
    pub staff: usize,
    pub demand: usize,
    pub value: i64,
}

#[derive(Debug, Clone)]
pub(super) struct CandidateGraph {
    pub edges: Vec<Edge>,
    /// Effectif restant à pourvoir par besoin.
    pub need: Vec<u32>,
    /// Nombre d'arêtes par besoin (avant bannissement).
    pub degree: Vec<usize>,
}

/// Construit l'ensemble des arêtes qui ne violent a priori aucune contrainte dure.
pub(super) fn build(
    store: &EntityStore,
    constraints: &ConstraintSet,
    opts: &AllocateOptions,
    fixed: &Fixed,
) -> CandidateGraph {
    let need: Vec<u32> = store
        .demands()
        .iter()
        .enumerate()
        .map(|(d, demand)| demand.headcount.saturating_sub(fixed.by_demand[d].len() as u32))
        .collect();
    let mut degree = vec![0usize; store.demands().len()];
    let mut edges = Vec::new();
    let scale = opts.optimize_for.priority_scale();

    for (s, staff) in store.staff().iter().enumerate() {
        if !fits_fixed_capacity(store, constraints, s, fixed) {
            continue;
        }
        for (d, demand) in store.demands().iter().enumerate() {
            if need[d] == 0 || fixed.by_staff[s].contains(&d) {
                continue;
            }
            if !pair_is_feasible(constraints, staff, demand) {
                continue;
            }
            if !fits(store, constraints, s, &fixed.by_staff[s], d) {
                continue;
            }
            let value = scale * i64::from(demand.priority) - pair_penalty(constraints, staff, demand);
            degree[d] += 1;
            edges.push(Edge {
                staff: s,
                demand: d,
                value,
            });
        }
    }

    CandidateGraph {
        edges,
        need,
        degree,
    }
}

fn fits_fixed_capacity(store: &EntityStore, constraints: &ConstraintSet, s: usize, fixed: &Fixed) -> bool {
    if !constraints.has(ConstraintKind::MaxWorkload) {
        return true;
    }
    let max = store.staff_at(s).workload.max_assignments;
    max.map_or(true, |m| fixed.by_staff[s].len() < m as usize)
}

/// Vrai si `s`, tenant déjà `held`, peut prendre `d` sans violer de contrainte dure.
pub(super) fn fits(
    store: &EntityStore,
    constraints: &ConstraintSet,
    s: usize,
    held: &[usize],
    d: usize,
) -> bool {
    let staff = store.staff_at(s);
    let demand = store.demand_at(d);

    if constraints.has(ConstraintKind::MaxWorkload) {
        if let Some(max) = staff.workload.max_assignments {
            if held.len() + 1 > max as usize {
                return false;
            }
        }
        if let Some(max) = staff.workload.max_minutes() {
            let total: i64 = held
                .iter()
                .map(|&h| store.demand_at(h).interval.duration_minutes())
                .sum::<i64>()
                + demand.interval.duration_minutes();
            if total > max {
                return false;
            }
        }
    }

    held.iter()
        .all(|&h| h != d && constraints.hard_pair_conflict(store.demand_at(h), demand).is_none())
}

/// Sous-problème indépendant : composante connexe du graphe candidat.
#[derive(Debug, Clone, Default)]
pub(super) struct Component {
    pub staff: Vec<usize>,
    pub demands: Vec<usize>,
    pub edges: Vec<usize>,
}

/// Partitionne les arêtes en composantes connexes (aucune arête partagée).
pub(super) fn components(store: &EntityStore, graph: &CandidateGraph) -> Vec<Component> {
    let ns = store.staff().len();
    let nd = store.demands().len();
    let mut uf = UnionFind::new(ns + nd);
    for e in &graph.edges {
        uf.union(e.staff, ns + e.demand);
    }

    let mut slot: Vec<Option<usize>> = vec![None; ns + nd];
    let mut out: Vec<Component> = Vec::new();
    for (i, e) in graph.edges.iter().enumerate() {
        let root = uf.find(e.staff);
        let c = *slot[root].get_or_insert_with(|| {
            out.push(Component::default());
            out.len() - 1
        });
        let comp = &mut out[c];
        comp.edges.push(i);
        if !comp.staff.contains(&e.staff) {
            comp.staff.push(e.staff);
        }
        if !comp.demands.contains(&e.demand) {
            comp.demands.push(e.demand);
        }
    }
    for comp in out.iter_mut() {
        comp.staff.sort_unstable();
        comp.demands.sort_unstable();
    }
    out
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}
