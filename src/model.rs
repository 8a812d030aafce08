use crate::allocator::{AllocateOptions, LoadOptions};
use crate::constraint::Constraint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifiant fort pour Staff
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StaffId(String);

impl StaffId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StaffId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for StaffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiant fort pour Demand
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DemandId(String);

impl DemandId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DemandId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for DemandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Intervalle UTC semi-ouvert `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Crée un intervalle en validant que `end > start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, String> {
        if end <= start {
            return Err("interval end must be after start".to_string());
        }
        Ok(Self { start, end })
    }

    pub fn is_well_formed(&self) -> bool {
        self.end > self.start
    }

    /// Durée en minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Retire `cut` de l'intervalle ; renvoie 0, 1 ou 2 morceaux.
    pub fn subtract(&self, cut: &Interval) -> Vec<Interval> {
        if !self.overlaps(cut) {
            return vec![*self];
        }
        let mut out = Vec::with_capacity(2);
        if self.start < cut.start {
            out.push(Interval { start: self.start, end: cut.start });
        }
        if cut.end < self.end {
            out.push(Interval { start: cut.end, end: self.end });
        }
        out
    }
}

/// Plafond de charge d'un membre pour une exécution d'allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_assignments: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hours: Option<u32>,
}

impl Workload {
    pub fn max_minutes(&self) -> Option<i64> {
        self.max_hours.map(|h| i64::from(h) * 60)
    }
}

fn default_true() -> bool {
    true
}

/// Membre du personnel (ou ressource planifiable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: StaffId,
    pub name: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub availability: Vec<Interval>,
    #[serde(default)]
    pub workload: Workload,
    #[serde(default)]
    pub prior_assignments: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Tarif journalier facturable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_rate: Option<u32>,
}

impl Staff {
    pub fn new<I: AsRef<str>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: StaffId::new(id),
            name: name.into(),
            skills: Vec::new(),
            availability: Vec::new(),
            workload: Workload::default(),
            prior_assignments: 0,
            active: true,
            day_rate: None,
        }
    }

    pub fn with_day_rate(mut self, rate: u32) -> Self {
        self.day_rate = Some(rate);
        self
    }

    pub fn with_skill<S: Into<String>>(mut self, skill: S) -> Self {
        let skill = skill.into();
        if !self.skills.contains(&skill) {
            self.skills.push(skill);
        }
        self
    }

    pub fn with_availability(mut self, window: Interval) -> Self {
        self.availability.push(window);
        self
    }

    pub fn with_max_assignments(mut self, max: u32) -> Self {
        self.workload.max_assignments = Some(max);
        self
    }

    pub fn with_max_hours(mut self, max: u32) -> Self {
        self.workload.max_hours = Some(max);
        self
    }

    pub fn with_prior_assignments(mut self, prior: u32) -> Self {
        self.prior_assignments = prior;
        self
    }

    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s == skill)
    }

    /// Vrai si l'union des fenêtres de disponibilité couvre entièrement `interval`.
    pub fn is_available(&self, interval: &Interval) -> bool {
        let mut windows: Vec<&Interval> = self
            .availability
            .iter()
            .filter(|w| w.overlaps(interval))
            .collect();
        windows.sort_by_key(|w| w.start);

        let mut covered_until = interval.start;
        for w in windows {
            if w.start > covered_until {
                return false;
            }
            covered_until = covered_until.max(w.end);
            if covered_until >= interval.end {
                return true;
            }
        }
        false
    }
}

/// Besoin daté (créneau, tâche, rôle) à pourvoir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    pub id: DemandId,
    pub name: String,
    pub interval: Interval,
    #[serde(default)]
    pub skills: Vec<String>,
    pub headcount: u32,
    #[serde(default)]
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// Tarif journalier convenu, prioritaire sur celui du membre.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreed_rate: Option<u32>,
    #[serde(default)]
    pub status: Status,
}

impl Demand {
    pub fn new<I: AsRef<str>, N: Into<String>>(id: I, name: N, interval: Interval) -> Self {
        Self {
            id: DemandId::new(id),
            name: name.into(),
            interval,
            skills: Vec::new(),
            headcount: 1,
            priority: 0,
            client: None,
            agreed_rate: None,
            status: Status::Confirmed,
        }
    }

    pub fn with_client<S: Into<String>>(mut self, client: S) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_agreed_rate(mut self, rate: u32) -> Self {
        self.agreed_rate = Some(rate);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_skill<S: Into<String>>(mut self, skill: S) -> Self {
        let skill = skill.into();
        if !self.skills.contains(&skill) {
            self.skills.push(skill);
        }
        self
    }

    pub fn with_headcount(mut self, headcount: u32) -> Self {
        self.headcount = headcount;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// Statut d'engagement d'un besoin ou d'une affectation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Confirmed,
    Provisional,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Confirmed => "confirmed",
            Status::Provisional => "provisional",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "confirmed" => Ok(Status::Confirmed),
            "provisional" => Ok(Status::Provisional),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Affectation d'un membre à un besoin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub staff: StaffId,
    pub demand: DemandId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: Status,
}

impl Assignment {
    pub fn new(staff: StaffId, demand: DemandId, created_at: DateTime<Utc>) -> Self {
        Self {
            staff,
            demand,
            created_at,
            status: Status::Confirmed,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn key(&self) -> (&DemandId, &StaffId) {
        (&self.demand, &self.staff)
    }
}

/// Ensemble des affectations d'une exécution, en ordre canonique (demand, staff).
///
/// La désérialisation repasse par [`Plan::new`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PlanRecord")]
pub struct Plan {
    assignments: Vec<Assignment>,
}

#[derive(Deserialize)]
struct PlanRecord {
    #[serde(default)]
    assignments: Vec<Assignment>,
}

impl From<PlanRecord> for Plan {
    fn from(record: PlanRecord) -> Self {
        Plan::new(record.assignments)
    }
}

impl Plan {
    pub fn new(mut assignments: Vec<Assignment>) -> Self {
        assignments.sort_by(|a, b| a.key().cmp(&b.key()));
        Self { assignments }
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn into_assignments(self) -> Vec<Assignment> {
        self.assignments
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn contains(&self, staff: &StaffId, demand: &DemandId) -> bool {
        self.assignments
            .binary_search_by(|a| a.key().cmp(&(demand, staff)))
            .is_ok()
    }

    pub fn for_staff<'a>(&'a self, staff: &'a StaffId) -> impl Iterator<Item = &'a Assignment> {
        self.assignments.iter().filter(move |a| &a.staff == staff)
    }

    pub fn for_demand<'a>(&'a self, demand: &'a DemandId) -> impl Iterator<Item = &'a Assignment> {
        self.assignments.iter().filter(move |a| &a.demand == demand)
    }
}

impl FromIterator<Assignment> for Plan {
    fn from_iter<T: IntoIterator<Item = Assignment>>(iter: T) -> Self {
        Plan::new(iter.into_iter().collect())
    }
}

/// Données d'entrée complètes : personnel, besoins, contraintes et options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub staff: Vec<Staff>,
    #[serde(default)]
    pub demands: Vec<Demand>,
    #[serde(default = "Constraint::default_set")]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub options: AllocateOptions,
    #[serde(default)]
    pub load: LoadOptions,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            staff: Vec::new(),
            demands: Vec::new(),
            constraints: Constraint::default_set(),
            options: AllocateOptions::default(),
            load: LoadOptions::default(),
        }
    }
}

impl Roster {
    pub fn find_staff<'a>(&'a self, id: &StaffId) -> Option<&'a Staff> {
        self.staff.iter().find(|s| &s.id == id)
    }
    pub fn find_staff_mut(&mut self, id: &StaffId) -> Option<&mut Staff> {
        self.staff.iter_mut().find(|s| &s.id == id)
    }
    pub fn find_demand<'a>(&'a self, id: &DemandId) -> Option<&'a Demand> {
        self.demands.iter().find(|d| &d.id == id)
    }
    pub fn find_demand_mut(&mut self, id: &DemandId) -> Option<&mut Demand> {
        self.demands.iter_mut().find(|d| &d.id == id)
    }
}
