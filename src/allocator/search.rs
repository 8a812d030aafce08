//! Recherche par composante : flot à coût minimal + contraintes paresseuses.
//!
//! 1. Résout le flot relâché (capacités staff/demand seulement).
//! 2. Pour chaque membre, garde les meilleures affectations compatibles
//!    (chevauchement, repos, heures) et bannit les autres.
//! 3. Recommence jusqu'à stabilité, puis complète les besoins restants avec
//!    les arêtes bannies encore compatibles.
//! 4. Échange une affectation bloquante contre plusieurs tant que la
//!    couverture augmente.
//! 5. Si la couverture reste sous la borne du flot relâché, séparation et
//!    évaluation exhaustive sur les petites composantes.

use super::candidates::{fits, CandidateGraph, Component, Fixed};
use super::flow::FlowGraph;
use super::{AllocateOptions, CancelToken};
use crate::constraint::{ConstraintKind, ConstraintSet};
use crate::store::EntityStore;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

/// Taille maximale (en arêtes) d'une composante soumise à la passe exhaustive.
const EXACT_EDGE_LIMIT: usize = 256;

pub(super) struct SearchContext<'a> {
    pub store: &'a EntityStore,
    pub constraints: &'a ConstraintSet,
    pub opts: &'a AllocateOptions,
    pub fixed: &'a Fixed,
    pub graph: &'a CandidateGraph,
    pub cancel: Option<&'a CancelToken>,
}

#[derive(Debug, Clone, Default)]
pub(super) struct ComponentOutcome {
    /// Paires (staff, demand) retenues, hors affectations fixes.
    pub chosen: Vec<(usize, usize)>,
    pub iterations: u64,
    pub cancelled: bool,
}

struct Budget<'a> {
    limit: u64,
    used: u64,
    cancel: Option<&'a CancelToken>,
    stopped: bool,
}

impl Budget<'_> {
    /// Consomme une itération ; faux si la recherche doit s'arrêter.
    fn tick(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        if self.used >= self.limit || self.cancel.is_some_and(CancelToken::is_cancelled) {
            self.stopped = true;
            return false;
        }
        self.used += 1;
        true
    }
}

pub(super) fn solve_component(ctx: &SearchContext<'_>, comp: &Component) -> ComponentOutcome {
    let mut budget = Budget {
        limit: u64::from(ctx.opts.max_search_iterations),
        used: 0,
        cancel: ctx.cancel,
        stopped: false,
    };
    let mut banned: BTreeSet<usize> = BTreeSet::new();
    let mut relaxed_max: Option<usize> = None;

    let chosen = loop {
        let active: Vec<usize> = comp
            .edges
            .iter()
            .copied()
            .filter(|e| !banned.contains(e))
            .collect();
        let flow_edges = run_flow(ctx, comp, &active, &mut budget);
        relaxed_max.get_or_insert(flow_edges.len());
        let (kept, dropped) = enforce_staff_constraints(ctx, &flow_edges);

        if dropped.is_empty() || budget.stopped {
            break kept;
        }
        trace!(dropped = dropped.len(), "banning conflicting candidate edges");
        banned.extend(dropped);
    };

    let mut chosen: Vec<(usize, usize)> = chosen
        .iter()
        .map(|&e| (ctx.graph.edges[e].staff, ctx.graph.edges[e].demand))
        .collect();

    let mut exact_nodes = 0;
    if !budget.stopped {
        fill_remaining(ctx, comp, &mut chosen);
        improve_by_swaps(ctx, comp, &mut chosen, &mut budget);
    }
    let bound = relaxed_max.unwrap_or(0);
    if !budget.stopped && chosen.len() < bound && comp.edges.len() <= EXACT_EDGE_LIMIT {
        let (better, nodes) = exact_cover(ctx, comp, &chosen, bound);
        exact_nodes = nodes;
        if let Some(better) = better {
            trace!(from = chosen.len(), to = better.len(), "exhaustive pass improved coverage");
            chosen = better;
        }
    }
    chosen.sort_unstable();
    let cancelled = budget.stopped || ctx.cancel.is_some_and(CancelToken::is_cancelled);

    debug!(
        staff = comp.staff.len(),
        demands = comp.demands.len(),
        assigned = chosen.len(),
        iterations = budget.used + exact_nodes,
        cancelled,
        "component solved"
    );

    ComponentOutcome {
        chosen,
        iterations: budget.used + exact_nodes,
        cancelled,
    }
}

/// Plus courts chemins successifs sur le graphe de la composante ; renvoie les
/// indices d'arêtes candidates portant du flot.
///
/// Coût lexicographique : couverture d'abord (récompense `cover` par unité), puis
/// priorité / pénalités souples / équité convexe, puis départage (charge totale,
/// puis identité) via `tie_scale`.
fn run_flow(
    ctx: &SearchContext<'_>,
    comp: &Component,
    active: &[usize],
    budget: &mut Budget<'_>,
) -> Vec<usize> {
    let store = ctx.store;
    let ns = comp.staff.len();
    let nd = comp.demands.len();
    let (source, sink) = (0usize, 1usize);
    let staff_node: HashMap<usize, usize> =
        comp.staff.iter().enumerate().map(|(i, &s)| (s, 2 + i)).collect();
    let demand_node: HashMap<usize, usize> =
        comp.demands.iter().enumerate().map(|(i, &d)| (d, 2 + ns + i)).collect();

    let mut per_staff_edges: HashMap<usize, usize> = HashMap::new();
    for &e in active {
        *per_staff_edges.entry(ctx.graph.edges[e].staff).or_default() += 1;
    }

    let fairness = i128::from(ctx.opts.optimize_for.fairness_scale())
        * i128::from(ctx.constraints.fairness_weight());
    let total_staff = store.staff().len() as i128;

    // unités de capacité par membre : (membre, charge déjà portée, nombre d'unités)
    let units: Vec<(usize, i128, usize)> = comp
        .staff
        .iter()
        .map(|&s| {
            let staff = store.staff_at(s);
            let held = ctx.fixed.by_staff[s].len();
            let edges = per_staff_edges.get(&s).copied().unwrap_or(0);
            let mut cap = edges;
            if ctx.constraints.has(ConstraintKind::MaxWorkload) {
                if let Some(max) = staff.workload.max_assignments {
                    cap = cap.min((max as usize).saturating_sub(held));
                }
            }
            let base_load = i128::from(staff.prior_assignments) + held as i128;
            (s, base_load, cap)
        })
        .collect();

    let max_flow: i128 = comp
        .demands
        .iter()
        .map(|&d| i128::from(ctx.graph.need[d]))
        .sum::<i128>()
        .max(1);
    let max_tie: i128 = units
        .iter()
        .map(|&(s, load, cap)| (load + cap as i128) * total_staff + s as i128)
        .max()
        .unwrap_or(0)
        + 1;
    let tie_scale = max_flow * max_tie + 1;

    let secondary: i128 = active
        .iter()
        .map(|&e| i128::from(ctx.graph.edges[e].value).abs())
        .sum::<i128>()
        + units
            .iter()
            .map(|&(_, load, cap)| (fairness * (load + cap as i128)).abs() * cap as i128)
            .sum::<i128>();
    let cover = secondary + 1;

    let mut g = FlowGraph::new(2 + ns + nd);
    for &(s, load, cap) in &units {
        let node = staff_node[&s];
        for k in 0..cap {
            let l = load + k as i128;
            g.add_arc(source, node, 1, fairness * l * tie_scale + l * total_staff + s as i128);
        }
    }
    let mut arc_of_edge = Vec::with_capacity(active.len());
    for &e in active {
        let edge = ctx.graph.edges[e];
        let cost = -(cover + i128::from(edge.value)) * tie_scale;
        let arc = g.add_arc(staff_node[&edge.staff], demand_node[&edge.demand], 1, cost);
        arc_of_edge.push((e, arc));
    }
    for &d in &comp.demands {
        g.add_arc(demand_node[&d], sink, i64::from(ctx.graph.need[d]), 0);
    }

    while budget.tick() {
        match g.shortest_path(source, sink) {
            Some((cost, path)) if cost < 0 => g.augment(&path),
            _ => break,
        }
    }

    arc_of_edge
        .into_iter()
        .filter(|&(_, arc)| g.flow_on(arc) > 0)
        .map(|(e, _)| e)
        .collect()
}

/// Pour chaque membre, conserve greedily ses meilleures arêtes compatibles avec
/// les affectations fixes ; renvoie (gardées, rejetées).
fn enforce_staff_constraints(ctx: &SearchContext<'_>, flow_edges: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut by_staff: HashMap<usize, Vec<usize>> = HashMap::new();
    for &e in flow_edges {
        by_staff.entry(ctx.graph.edges[e].staff).or_default().push(e);
    }

    let mut staff_ids: Vec<usize> = by_staff.keys().copied().collect();
    staff_ids.sort_unstable();

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for s in staff_ids {
        let mut edges = by_staff.remove(&s).unwrap_or_default();
        edges.sort_by(|&a, &b| {
            let (ea, eb) = (ctx.graph.edges[a], ctx.graph.edges[b]);
            eb.value.cmp(&ea.value).then(ea.demand.cmp(&eb.demand))
        });
        let mut held = ctx.fixed.by_staff[s].clone();
        for e in edges {
            let d = ctx.graph.edges[e].demand;
            if fits(ctx.store, ctx.constraints, s, &held, d) {
                held.push(d);
                kept.push(e);
            } else {
                dropped.push(e);
            }
        }
    }
    kept.sort_unstable();
    (kept, dropped)
}

/// Complète les besoins encore ouverts avec toute arête compatible, par priorité
/// décroissante puis en préférant les membres les moins chargés.
fn fill_remaining(ctx: &SearchContext<'_>, comp: &Component, chosen: &mut Vec<(usize, usize)>) {
    let store = ctx.store;
    let mut held: HashMap<usize, Vec<usize>> = comp
        .staff
        .iter()
        .map(|&s| (s, ctx.fixed.by_staff[s].clone()))
        .collect();
    let mut filled: HashMap<usize, u32> = HashMap::new();
    for &(s, d) in chosen.iter() {
        held.entry(s).or_default().push(d);
        *filled.entry(d).or_default() += 1;
    }

    let mut demands = comp.demands.clone();
    demands.sort_by(|&a, &b| {
        store
            .demand_at(b)
            .priority
            .cmp(&store.demand_at(a).priority)
            .then(a.cmp(&b))
    });

    for d in demands {
        let mut open = ctx.graph.need[d].saturating_sub(filled.get(&d).copied().unwrap_or(0));
        if open == 0 {
            continue;
        }
        let mut candidates: Vec<usize> = comp
            .edges
            .iter()
            .map(|&e| ctx.graph.edges[e])
            .filter(|e| e.demand == d)
            .map(|e| e.staff)
            .collect();
        candidates.sort_by_key(|&s| {
            let load = u64::from(store.staff_at(s).prior_assignments)
                + held.get(&s).map_or(0, |h| h.len() as u64);
            (load, s)
        });
        for s in candidates {
            if open == 0 {
                break;
            }
            let current = held.entry(s).or_default();
            if fits(store, ctx.constraints, s, current, d) {
                current.push(d);
                chosen.push((s, d));
                open -= 1;
            }
        }
    }
}

/// Affectations (fixes + choisies) tenues par `s`.
fn held_by(ctx: &SearchContext<'_>, chosen: &[(usize, usize)], s: usize) -> Vec<usize> {
    let mut held = ctx.fixed.by_staff[s].clone();
    held.extend(chosen.iter().filter(|&&(x, _)| x == s).map(|&(_, d)| d));
    held
}

/// Besoins encore ouverts de la composante, par priorité décroissante.
fn open_demands(ctx: &SearchContext<'_>, comp: &Component, chosen: &[(usize, usize)]) -> Vec<usize> {
    let store = ctx.store;
    let mut open: Vec<usize> = comp
        .demands
        .iter()
        .copied()
        .filter(|&d| {
            let filled = chosen.iter().filter(|&&(_, x)| x == d).count() as u32;
            filled < ctx.graph.need[d]
        })
        .collect();
    open.sort_by(|&a, &b| {
        store
            .demand_at(b)
            .priority
            .cmp(&store.demand_at(a).priority)
            .then(a.cmp(&b))
    });
    open
}

/// Recherche locale : pour un besoin ouvert, retire à un candidat l'affectation
/// qui le bloque, lui donne le besoin, puis recomplète. Acceptée seulement si
/// la couverture augmente strictement.
fn improve_by_swaps(
    ctx: &SearchContext<'_>,
    comp: &Component,
    chosen: &mut Vec<(usize, usize)>,
    budget: &mut Budget<'_>,
) {
    let store = ctx.store;
    loop {
        let mut accepted = None;
        'search: for d in open_demands(ctx, comp, chosen) {
            let demand = store.demand_at(d);
            let candidates: Vec<usize> = comp
                .edges
                .iter()
                .map(|&e| ctx.graph.edges[e])
                .filter(|e| e.demand == d)
                .map(|e| e.staff)
                .collect();
            for s in candidates {
                let held = held_by(ctx, chosen, s);
                if held.contains(&d) {
                    continue;
                }
                let movable: Vec<usize> = chosen
                    .iter()
                    .filter(|&&(x, _)| x == s)
                    .map(|&(_, h)| h)
                    .collect();
                let clashing: Vec<usize> = movable
                    .iter()
                    .copied()
                    .filter(|&h| {
                        ctx.constraints
                            .hard_pair_conflict(store.demand_at(h), demand)
                            .is_some()
                    })
                    .collect();
                let blockers = match clashing.len() {
                    0 => movable,
                    1 => clashing,
                    _ => continue,
                };
                for b in blockers {
                    if !budget.tick() {
                        return;
                    }
                    let without: Vec<usize> = held.iter().copied().filter(|&h| h != b).collect();
                    if !fits(store, ctx.constraints, s, &without, d) {
                        continue;
                    }
                    let mut trial: Vec<(usize, usize)> =
                        chosen.iter().copied().filter(|&p| p != (s, b)).collect();
                    trial.push((s, d));
                    fill_remaining(ctx, comp, &mut trial);
                    if trial.len() > chosen.len() {
                        accepted = Some(trial);
                        break 'search;
                    }
                }
            }
        }
        match accepted {
            Some(trial) => *chosen = trial,
            None => return,
        }
    }
}

/// Séparation et évaluation sur la couverture seule, partant de `baseline`.
///
/// Dispose de son propre quota de nœuds (`max_search_iterations`) ; l'épuiser
/// conserve simplement le meilleur plan connu. Le jeton d'annulation reste
/// vérifié à chaque nœud.
fn exact_cover(
    ctx: &SearchContext<'_>,
    comp: &Component,
    baseline: &[(usize, usize)],
    bound: usize,
) -> (Option<Vec<(usize, usize)>>, u64) {
    let store = ctx.store;
    let mut demands: Vec<(usize, u32, Vec<usize>)> = comp
        .demands
        .iter()
        .map(|&d| {
            let mut cands: Vec<(i64, usize)> = comp
                .edges
                .iter()
                .map(|&e| ctx.graph.edges[e])
                .filter(|e| e.demand == d)
                .map(|e| (e.value, e.staff))
                .collect();
            cands.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            (d, ctx.graph.need[d], cands.into_iter().map(|(_, s)| s).collect())
        })
        .collect();
    demands.sort_by(|a, b| {
        store
            .demand_at(b.0)
            .priority
            .cmp(&store.demand_at(a.0).priority)
            .then(a.0.cmp(&b.0))
    });

    let mut suffix = vec![0usize; demands.len() + 1];
    for i in (0..demands.len()).rev() {
        suffix[i] = suffix[i + 1] + (demands[i].1 as usize).min(demands[i].2.len());
    }

    let mut search = Exact {
        ctx,
        held: comp
            .staff
            .iter()
            .map(|&s| (s, ctx.fixed.by_staff[s].clone()))
            .collect(),
        demands,
        suffix,
        current: Vec::new(),
        best: baseline.to_vec(),
        bound,
        nodes: 0,
        limit: u64::from(ctx.opts.max_search_iterations),
        cancel: ctx.cancel,
    };
    let first_need = search.demands.first().map_or(0, |x| x.1);
    search.visit(0, 0, first_need);

    let nodes = search.nodes;
    let improved = (search.best.len() > baseline.len()).then_some(search.best);
    (improved, nodes)
}

struct Exact<'c, 'a> {
    ctx: &'c SearchContext<'a>,
    /// (besoin, effectif à pourvoir, candidats ordonnés)
    demands: Vec<(usize, u32, Vec<usize>)>,
    /// Borne de couverture atteignable à partir du i-ème besoin.
    suffix: Vec<usize>,
    held: HashMap<usize, Vec<usize>>,
    current: Vec<(usize, usize)>,
    best: Vec<(usize, usize)>,
    bound: usize,
    nodes: u64,
    limit: u64,
    cancel: Option<&'a CancelToken>,
}

impl Exact<'_, '_> {
    /// Faux quand la recherche doit s'arrêter (quota, annulation ou borne atteinte).
    fn visit(&mut self, i: usize, pos: usize, open: u32) -> bool {
        if self.nodes >= self.limit || self.cancel.is_some_and(CancelToken::is_cancelled) {
            return false;
        }
        self.nodes += 1;

        if i == self.demands.len() {
            if self.current.len() > self.best.len() {
                self.best = self.current.clone();
            }
            return self.best.len() < self.bound;
        }

        let (d, cands_len, staff) = {
            let entry = &self.demands[i];
            (entry.0, entry.2.len(), entry.2.get(pos).copied())
        };
        let reachable = (open as usize).min(cands_len - pos);
        if self.current.len() + reachable + self.suffix[i + 1] <= self.best.len() {
            return true;
        }

        let Some(s) = staff.filter(|_| open > 0) else {
            let next = self.demands.get(i + 1).map_or(0, |x| x.1);
            return self.visit(i + 1, 0, next);
        };

        let store = self.ctx.store;
        let fits_here = self
            .held
            .get(&s)
            .is_some_and(|held| fits(store, self.ctx.constraints, s, held, d));
        if fits_here {
            if let Some(held) = self.held.get_mut(&s) {
                held.push(d);
            }
            self.current.push((s, d));
            let go_on = self.visit(i, pos + 1, open - 1);
            self.current.pop();
            if let Some(held) = self.held.get_mut(&s) {
                held.pop();
            }
            if !go_on {
                return false;
            }
        }
        self.visit(i, pos + 1, open)
    }
}
