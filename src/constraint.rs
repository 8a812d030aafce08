//! Contraintes d'allocation et évaluation.
//!
//! Chaque contrainte est une fonction pure de (candidat, contexte). L'évaluation
//! d'un plan renvoie un [`ViolationSet`] trié, indépendant de l'ordre des
//! contraintes fournies.

use crate::allocator::AllocateOptions;
use crate::error::ValidationError;
use crate::model::{Demand, DemandId, Plan, Staff, StaffId};
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Poids d'équité par défaut.
pub const DEFAULT_FAIRNESS_WEIGHT: i64 = 10;

/// Borne des pénalités et poids configurables.
pub const MAX_PENALTY: i64 = 1_000_000_000;

/// Contrainte configurable (JSON : `{"type": "min_rest", "hours": 11}`).
///
/// `Availability`, `SkillMatch` et `MinRest` sont dures sauf si un `penalty`
/// est fourni ; `MaxWorkload` et `NoOverlap` sont toujours dures ; `Fairness`
/// est toujours souple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    Availability {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        penalty: Option<i64>,
    },
    SkillMatch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        penalty: Option<i64>,
    },
    MaxWorkload,
    NoOverlap,
    MinRest {
        hours: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        penalty: Option<i64>,
    },
    Fairness {
        #[serde(default = "default_fairness_weight")]
        weight: i64,
    },
}

fn default_fairness_weight() -> i64 {
    DEFAULT_FAIRNESS_WEIGHT
}

impl Constraint {
    /// Jeu utilisé quand aucune contrainte n'est configurée.
    pub fn default_set() -> Vec<Constraint> {
        vec![
            Constraint::Availability { penalty: None },
            Constraint::SkillMatch { penalty: None },
            Constraint::MaxWorkload,
            Constraint::NoOverlap,
            Constraint::Fairness {
                weight: DEFAULT_FAIRNESS_WEIGHT,
            },
        ]
    }

    pub fn kind(&self) -> ConstraintKind {
        match self {
            Constraint::Availability { .. } => ConstraintKind::Availability,
            Constraint::SkillMatch { .. } => ConstraintKind::SkillMatch,
            Constraint::MaxWorkload => ConstraintKind::MaxWorkload,
            Constraint::NoOverlap => ConstraintKind::NoOverlap,
            Constraint::MinRest { .. } => ConstraintKind::MinRest,
            Constraint::Fairness { .. } => ConstraintKind::Fairness,
        }
    }

    /// Refuse les pénalités négatives ou hors borne.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let value = match self {
            Constraint::Availability { penalty }
            | Constraint::SkillMatch { penalty }
            | Constraint::MinRest { penalty, .. } => *penalty,
            Constraint::Fairness { weight } => Some(*weight),
            Constraint::MaxWorkload | Constraint::NoOverlap => None,
        };
        match value {
            Some(v) if !(0..=MAX_PENALTY).contains(&v) => Err(ValidationError::PenaltyOutOfRange {
                constraint: self.kind(),
                value: v,
                max: MAX_PENALTY,
            }),
            _ => Ok(()),
        }
    }

    pub fn strength(&self) -> Strength {
        match self {
            Constraint::Availability { penalty }
            | Constraint::SkillMatch { penalty }
            | Constraint::MinRest { penalty, .. } => match penalty {
                Some(p) => Strength::Soft(*p),
                None => Strength::Hard,
            },
            Constraint::MaxWorkload | Constraint::NoOverlap => Strength::Hard,
            Constraint::Fairness { weight } => Strength::Soft(*weight),
        }
    }

    pub fn is_hard(&self) -> bool {
        self.strength() == Strength::Hard
    }
}

/// Famille de contrainte ; `Capacity` couvre les violations structurelles d'un plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Capacity,
    Availability,
    SkillMatch,
    MaxWorkload,
    NoOverlap,
    MinRest,
    Fairness,
}

impl ConstraintKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConstraintKind::Capacity => "capacity",
            ConstraintKind::Availability => "availability",
            ConstraintKind::SkillMatch => "skill_match",
            ConstraintKind::MaxWorkload => "max_workload",
            ConstraintKind::NoOverlap => "no_overlap",
            ConstraintKind::MinRest => "min_rest",
            ConstraintKind::Fairness => "fairness",
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Hard,
    Soft(i64),
}

/// Contraintes effectives d'une exécution (après application des options).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    /// Retire `NoOverlap` quand `allow_overlap` est actif.
    pub fn relaxed(&self, opts: &AllocateOptions) -> ConstraintSet {
        let constraints = self
            .constraints
            .iter()
            .filter(|c| !(opts.allow_overlap && c.kind() == ConstraintKind::NoOverlap))
            .cloned()
            .collect();
        ConstraintSet { constraints }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn as_slice(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn has(&self, kind: ConstraintKind) -> bool {
        self.constraints.iter().any(|c| c.kind() == kind)
    }

    pub fn fairness_weight(&self) -> i64 {
        self.constraints
            .iter()
            .map(|c| match c {
                Constraint::Fairness { weight } => *weight,
                _ => 0,
            })
            .sum()
    }

    /// Repos minimal dur le plus exigeant, en minutes.
    pub(crate) fn hard_min_rest_minutes(&self) -> Option<i64> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::MinRest {
                    hours,
                    penalty: None,
                } => Some(i64::from(*hours) * 60),
                _ => None,
            })
            .max()
    }

    /// Conflit dur entre deux besoins tenus par la même personne, s'il existe.
    pub(crate) fn hard_pair_conflict(&self, a: &Demand, b: &Demand) -> Option<ConstraintKind> {
        if self.has(ConstraintKind::NoOverlap) && a.interval.overlaps(&b.interval) {
            return Some(ConstraintKind::NoOverlap);
        }
        let rest = self.hard_min_rest_minutes()?;
        match rest_gap_minutes(a, b) {
            Some(gap) if gap < rest => Some(ConstraintKind::MinRest),
            _ => None,
        }
    }
}

/// Écart entre la fin du premier besoin et le début du suivant, `None` s'ils se chevauchent.
fn rest_gap_minutes(a: &Demand, b: &Demand) -> Option<i64> {
    if a.interval.overlaps(&b.interval) {
        return None;
    }
    let (first, second) = if a.interval.start <= b.interval.start {
        (a, b)
    } else {
        (b, a)
    };
    Some((second.interval.start - first.interval.end).num_minutes())
}

/// Une violation de contrainte.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ConstraintKind,
    pub staff: Option<StaffId>,
    pub demand: Option<DemandId>,
    pub other: Option<DemandId>,
    pub strength: Strength,
    pub detail: String,
}

impl Violation {
    fn new(kind: ConstraintKind, strength: Strength, detail: impl Into<String>) -> Self {
        Self {
            kind,
            staff: None,
            demand: None,
            other: None,
            strength,
            detail: detail.into(),
        }
    }

    fn staff(mut self, staff: &StaffId) -> Self {
        self.staff = Some(staff.clone());
        self
    }

    fn demand(mut self, demand: &DemandId) -> Self {
        self.demand = Some(demand.clone());
        self
    }

    fn other(mut self, other: &DemandId) -> Self {
        self.other = Some(other.clone());
        self
    }

    pub fn is_hard(&self) -> bool {
        self.strength == Strength::Hard
    }

    pub fn penalty(&self) -> i64 {
        match self.strength {
            Strength::Hard => 0,
            Strength::Soft(p) => p,
        }
    }
}

/// Ensemble trié et dédoublonné de violations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationSet {
    violations: Vec<Violation>,
}

impl ViolationSet {
    pub fn new(mut violations: Vec<Violation>) -> Self {
        violations.sort();
        violations.dedup();
        Self { violations }
    }

    pub fn is_feasible(&self) -> bool {
        !self.violations.iter().any(Violation::is_hard)
    }

    pub fn hard(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_hard())
    }

    pub fn soft(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_hard())
    }

    /// Copie limitée aux violations souples.
    pub fn soft_only(&self) -> ViolationSet {
        ViolationSet {
            violations: self.soft().cloned().collect(),
        }
    }

    pub fn total_penalty(&self) -> i64 {
        self.violations
            .iter()
            .map(Violation::penalty)
            .fold(0, i64::saturating_add)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Évalue une paire (staff, demand) isolée, sans tenir compte du reste du plan.
pub fn evaluate_pair(
    store: &EntityStore,
    constraints: &ConstraintSet,
    staff_idx: usize,
    demand_idx: usize,
) -> ViolationSet {
    let mut out = Vec::new();
    pair_violations(
        constraints,
        store.staff_at(staff_idx),
        store.demand_at(demand_idx),
        &mut out,
    );
    ViolationSet::new(out)
}

fn pair_violations(
    constraints: &ConstraintSet,
    staff: &Staff,
    demand: &Demand,
    out: &mut Vec<Violation>,
) {
    if !staff.active {
        out.push(
            Violation::new(ConstraintKind::Availability, Strength::Hard, "staff is inactive")
                .staff(&staff.id)
                .demand(&demand.id),
        );
    }

    for c in constraints.iter() {
        match c {
            Constraint::Availability { .. } => {
                if staff.active && !staff.is_available(&demand.interval) {
                    out.push(
                        Violation::new(
                            ConstraintKind::Availability,
                            c.strength(),
                            "demand falls outside availability windows",
                        )
                        .staff(&staff.id)
                        .demand(&demand.id),
                    );
                }
            }
            Constraint::SkillMatch { .. } => {
                let missing: Vec<&str> = demand
                    .skills
                    .iter()
                    .filter(|s| !staff.has_skill(s))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    out.push(
                        Violation::new(
                            ConstraintKind::SkillMatch,
                            c.strength(),
                            format!("missing skills: {}", missing.join(",")),
                        )
                        .staff(&staff.id)
                        .demand(&demand.id),
                    );
                }
            }
            Constraint::MaxWorkload => {
                let no_slot = staff.workload.max_assignments == Some(0);
                let too_long = staff
                    .workload
                    .max_minutes()
                    .is_some_and(|max| demand.interval.duration_minutes() > max);
                if no_slot || too_long {
                    out.push(
                        Violation::new(
                            ConstraintKind::MaxWorkload,
                            Strength::Hard,
                            "demand alone exceeds workload cap",
                        )
                        .staff(&staff.id)
                        .demand(&demand.id),
                    );
                }
            }
            Constraint::NoOverlap | Constraint::MinRest { .. } | Constraint::Fairness { .. } => {}
        }
    }
}

/// Pénalité souple d'une paire, utilisée pour scorer les arêtes candidates.
pub(crate) fn pair_penalty(constraints: &ConstraintSet, staff: &Staff, demand: &Demand) -> i64 {
    let mut out = Vec::new();
    pair_violations(constraints, staff, demand, &mut out);
    out.iter().map(Violation::penalty).fold(0, i64::saturating_add)
}

/// Vrai si la paire ne viole aucune contrainte dure.
pub(crate) fn pair_is_feasible(constraints: &ConstraintSet, staff: &Staff, demand: &Demand) -> bool {
    let mut out = Vec::new();
    pair_violations(constraints, staff, demand, &mut out);
    !out.iter().any(Violation::is_hard)
}

/// Évalue un plan complet.
pub fn evaluate_plan(store: &EntityStore, constraints: &ConstraintSet, plan: &Plan) -> ViolationSet {
    let mut out = Vec::new();

    // structure : références, doublons, sur-remplissage
    let mut per_demand: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut per_staff: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut seen: HashMap<(usize, usize), usize> = HashMap::new();

    for a in plan.iter() {
        let s = store.staff_idx(&a.staff);
        let d = store.demand_idx(&a.demand);
        let (Some(s), Some(d)) = (s, d) else {
            let mut v = Violation::new(
                ConstraintKind::Capacity,
                Strength::Hard,
                "assignment references unknown entity",
            )
            .staff(&a.staff)
            .demand(&a.demand);
            if s.is_some() {
                v.detail = "assignment references unknown demand".into();
            } else if d.is_some() {
                v.detail = "assignment references unknown staff".into();
            }
            out.push(v);
            continue;
        };
        let count = seen.entry((s, d)).or_insert(0);
        *count += 1;
        if *count > 1 {
            out.push(
                Violation::new(ConstraintKind::Capacity, Strength::Hard, "duplicate assignment")
                    .staff(&a.staff)
                    .demand(&a.demand),
            );
            continue;
        }
        per_demand.entry(d).or_default().push(s);
        per_staff.entry(s).or_default().push(d);
        pair_violations(constraints, store.staff_at(s), store.demand_at(d), &mut out);
    }

    for (&d, staff) in &per_demand {
        let demand = store.demand_at(d);
        if staff.len() > demand.headcount as usize {
            out.push(
                Violation::new(
                    ConstraintKind::Capacity,
                    Strength::Hard,
                    format!("{} assigned for headcount {}", staff.len(), demand.headcount),
                )
                .demand(&demand.id),
            );
        }
    }

    for (&s, demands) in per_staff.iter_mut() {
        let staff = store.staff_at(s);
        demands.sort_by_key(|&d| (store.demand_at(d).interval.start, d));
        staff_violations(store, constraints, staff, demands, &mut out);
    }

    if constraints.has(ConstraintKind::Fairness) {
        fairness_violations(store, constraints, &per_staff, &mut out);
    }

    ViolationSet::new(out)
}

fn staff_violations(
    store: &EntityStore,
    constraints: &ConstraintSet,
    staff: &Staff,
    demands: &[usize],
    out: &mut Vec<Violation>,
) {
    for c in constraints.iter() {
        match c {
            Constraint::MaxWorkload => {
                if let Some(max) = staff.workload.max_assignments {
                    if demands.len() > max as usize {
                        out.push(
                            Violation::new(
                                ConstraintKind::MaxWorkload,
                                Strength::Hard,
                                format!("{} assignments for cap {max}", demands.len()),
                            )
                            .staff(&staff.id),
                        );
                    }
                }
                if let Some(max) = staff.workload.max_minutes() {
                    let total: i64 = demands
                        .iter()
                        .map(|&d| store.demand_at(d).interval.duration_minutes())
                        .sum();
                    if total > max {
                        out.push(
                            Violation::new(
                                ConstraintKind::MaxWorkload,
                                Strength::Hard,
                                format!("{total} minutes for cap {max}"),
                            )
                            .staff(&staff.id),
                        );
                    }
                }
            }
            Constraint::NoOverlap => {
                for (i, &a) in demands.iter().enumerate() {
                    for &b in &demands[i + 1..] {
                        let (da, db) = (store.demand_at(a), store.demand_at(b));
                        if da.interval.overlaps(&db.interval) {
                            out.push(
                                Violation::new(
                                    ConstraintKind::NoOverlap,
                                    Strength::Hard,
                                    "overlapping demands",
                                )
                                .staff(&staff.id)
                                .demand(&da.id)
                                .other(&db.id),
                            );
                        }
                    }
                }
            }
            Constraint::MinRest { hours, .. } => {
                let required = i64::from(*hours) * 60;
                for (i, &a) in demands.iter().enumerate() {
                    for &b in &demands[i + 1..] {
                        let (da, db) = (store.demand_at(a), store.demand_at(b));
                        match rest_gap_minutes(da, db) {
                            Some(gap) if gap < required => out.push(
                                Violation::new(
                                    ConstraintKind::MinRest,
                                    c.strength(),
                                    format!("{gap} minutes of rest, {required} required"),
                                )
                                .staff(&staff.id)
                                .demand(&da.id)
                                .other(&db.id),
                            ),
                            _ => {}
                        }
                    }
                }
            }
            Constraint::Availability { .. }
            | Constraint::SkillMatch { .. }
            | Constraint::Fairness { .. } => {}
        }
    }
}

/// Pénalise les membres dont la charge (antérieure + plan) dépasse la moyenne
/// arrondie au supérieur, à hauteur des affectations du plan seulement.
fn fairness_violations(
    store: &EntityStore,
    constraints: &ConstraintSet,
    per_staff: &BTreeMap<usize, Vec<usize>>,
    out: &mut Vec<Violation>,
) {
    let weight = constraints.fairness_weight();
    let active: Vec<usize> = (0..store.staff().len())
        .filter(|&s| store.staff_at(s).active)
        .collect();
    if active.is_empty() {
        return;
    }

    let load = |s: usize| {
        u64::from(store.staff_at(s).prior_assignments)
            + per_staff.get(&s).map_or(0, |d| d.len() as u64)
    };
    let total: u64 = active.iter().map(|&s| load(s)).sum();
    let n = active.len() as u64;
    let mean_ceil = total.div_ceil(n);

    for &s in &active {
        let in_run = per_staff.get(&s).map_or(0, |d| d.len() as u64);
        let excess = load(s).saturating_sub(mean_ceil).min(in_run);
        if excess > 0 {
            let staff = store.staff_at(s);
            out.push(
                Violation::new(
                    ConstraintKind::Fairness,
                    Strength::Soft(weight.saturating_mul(excess as i64)),
                    format!("load {} above balanced load {mean_ceil}", load(s)),
                )
                .staff(&staff.id),
            );
        }
    }
}
