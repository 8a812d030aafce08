//! Graphe résiduel et plus courts chemins successifs (coûts `i128`).

use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct Arc {
    to: usize,
    cap: i64,
    cost: i128,
}

/// Réseau de flot à coût minimal. Chaque arc `e` a son arc inverse en `e ^ 1`.
#[derive(Debug, Clone)]
pub(super) struct FlowGraph {
    adj: Vec<Vec<usize>>,
    arcs: Vec<Arc>,
}

impl FlowGraph {
    pub(super) fn new(nodes: usize) -> Self {
        Self {
            adj: vec![Vec::new(); nodes],
            arcs: Vec::new(),
        }
    }

    pub(super) fn add_arc(&mut self, from: usize, to: usize, cap: i64, cost: i128) -> usize {
        let id = self.arcs.len();
        self.arcs.push(Arc { to, cap, cost });
        self.adj[from].push(id);
        self.arcs.push(Arc {
            to: from,
            cap: 0,
            cost: -cost,
        });
        self.adj[to].push(id + 1);
        id
    }

    /// Flot circulant sur l'arc `id` (capacité résiduelle de son inverse).
    pub(super) fn flow_on(&self, id: usize) -> i64 {
        self.arcs[id ^ 1].cap
    }

    /// Plus court chemin `source -> sink` (Bellman-Ford en file, ordre déterministe).
    /// Renvoie le coût et les arcs du chemin.
    pub(super) fn shortest_path(&self, source: usize, sink: usize) -> Option<(i128, Vec<usize>)> {
        let n = self.adj.len();
        let mut dist: Vec<Option<i128>> = vec![None; n];
        let mut parent: Vec<Option<usize>> = vec![None; n];
        let mut in_queue = vec![false; n];
        let mut relax_count = vec![0usize; n];
        let mut queue = VecDeque::new();

        dist[source] = Some(0);
        queue.push_back(source);
        in_queue[source] = true;

        while let Some(u) = queue.pop_front() {
            in_queue[u] = false;
            let Some(du) = dist[u] else { continue };
            for &e in &self.adj[u] {
                let arc = &self.arcs[e];
                if arc.cap <= 0 {
                    continue;
                }
                let nd = du + arc.cost;
                if dist[arc.to].map_or(true, |dv| nd < dv) {
                    dist[arc.to] = Some(nd);
                    parent[arc.to] = Some(e);
                    if !in_queue[arc.to] {
                        relax_count[arc.to] += 1;
                        // un cycle négatif ne devrait jamais apparaître ; on coupe court
                        if relax_count[arc.to] > n {
                            return None;
                        }
                        in_queue[arc.to] = true;
                        queue.push_back(arc.to);
                    }
                }
            }
        }

        let cost = dist[sink]?;
        let mut path = Vec::new();
        let mut v = sink;
        while v != source {
            let e = parent[v]?;
            path.push(e);
            v = self.arcs[e ^ 1].to;
            if path.len() > n {
                return None;
            }
        }
        path.reverse();
        Some((cost, path))
    }

    /// Pousse une unité le long du chemin.
    pub(super) fn augment(&mut self, path: &[usize]) {
        for &e in path {
            self.arcs[e].cap -= 1;
            self.arcs[e ^ 1].cap += 1;
        }
    }
}
