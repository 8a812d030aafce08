use crate::allocator::LoadOptions;
use crate::constraint::{Constraint, ConstraintSet};
use crate::error::{AllocError, ValidationError};
use crate::model::{Demand, DemandId, Interval, Roster, Staff, StaffId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Instantané validé et immuable des entités d'une exécution.
///
/// Le personnel est trié par identifiant et les besoins par (début, identifiant) ;
/// les deux sont adressés par des indices entiers stables.
#[derive(Debug, Clone)]
pub struct EntityStore {
    staff: Vec<Staff>,
    demands: Vec<Demand>,
    constraints: ConstraintSet,
    staff_index: HashMap<StaffId, usize>,
    demand_index: HashMap<DemandId, usize>,
    load: LoadOptions,
    snapshot_at: DateTime<Utc>,
}

impl EntityStore {
    pub fn load(
        staff: Vec<Staff>,
        demands: Vec<Demand>,
        constraints: Vec<Constraint>,
    ) -> Result<Self, AllocError> {
        Self::load_with(staff, demands, constraints, LoadOptions::default(), Utc::now())
    }

    /// Comme [`EntityStore::load`], avec un horodatage d'instantané fixé.
    pub fn load_at(
        staff: Vec<Staff>,
        demands: Vec<Demand>,
        constraints: Vec<Constraint>,
        snapshot_at: DateTime<Utc>,
    ) -> Result<Self, AllocError> {
        Self::load_with(staff, demands, constraints, LoadOptions::default(), snapshot_at)
    }

    pub fn load_with(
        mut staff: Vec<Staff>,
        mut demands: Vec<Demand>,
        constraints: Vec<Constraint>,
        opts: LoadOptions,
        snapshot_at: DateTime<Utc>,
    ) -> Result<Self, AllocError> {
        for c in &constraints {
            c.validate()?;
        }
        for s in staff.iter_mut() {
            validate_staff(s)?;
            s.skills = normalize_tags(&s.skills);
        }
        for d in demands.iter_mut() {
            validate_demand(d)?;
            d.skills = normalize_tags(&d.skills);
        }

        staff.sort_by(|a, b| a.id.cmp(&b.id));
        demands.sort_by(|a, b| (a.interval.start, &a.id).cmp(&(b.interval.start, &b.id)));

        let mut staff_index = HashMap::with_capacity(staff.len());
        for (idx, s) in staff.iter().enumerate() {
            if staff_index.insert(s.id.clone(), idx).is_some() {
                return Err(ValidationError::DuplicateStaff(s.id.clone()).into());
            }
        }
        let mut demand_index = HashMap::with_capacity(demands.len());
        for (idx, d) in demands.iter().enumerate() {
            if demand_index.insert(d.id.clone(), idx).is_some() {
                return Err(ValidationError::DuplicateDemand(d.id.clone()).into());
            }
        }

        let store = Self {
            staff,
            demands,
            constraints: ConstraintSet::new(constraints),
            staff_index,
            demand_index,
            load: opts,
            snapshot_at,
        };

        if opts.strict_capabilities {
            let universe = store.skill_universe();
            for d in &store.demands {
                if let Some(missing) = d.skills.iter().find(|s| !universe.contains(s.as_str())) {
                    return Err(AllocError::InfeasibleInput(format!(
                        "demand {} requires skill {missing} that no staff member has",
                        d.id
                    )));
                }
            }
        }

        debug!(
            staff = store.staff.len(),
            demands = store.demands.len(),
            constraints = store.constraints.as_slice().len(),
            "entity store loaded"
        );
        Ok(store)
    }

    pub fn from_roster(roster: &Roster) -> Result<Self, AllocError> {
        Self::from_roster_at(roster, Utc::now())
    }

    pub fn from_roster_at(roster: &Roster, snapshot_at: DateTime<Utc>) -> Result<Self, AllocError> {
        Self::load_with(
            roster.staff.clone(),
            roster.demands.clone(),
            roster.constraints.clone(),
            roster.load,
            snapshot_at,
        )
    }

    pub fn staff(&self) -> &[Staff] {
        &self.staff
    }
    pub fn demands(&self) -> &[Demand] {
        &self.demands
    }
    pub fn staff_at(&self, idx: usize) -> &Staff {
        &self.staff[idx]
    }
    pub fn demand_at(&self, idx: usize) -> &Demand {
        &self.demands[idx]
    }
    pub fn staff_idx(&self, id: &StaffId) -> Option<usize> {
        self.staff_index.get(id).copied()
    }
    pub fn demand_idx(&self, id: &DemandId) -> Option<usize> {
        self.demand_index.get(id).copied()
    }
    pub fn find_staff(&self, id: &StaffId) -> Option<&Staff> {
        self.staff_idx(id).map(|i| &self.staff[i])
    }
    pub fn find_demand(&self, id: &DemandId) -> Option<&Demand> {
        self.demand_idx(id).map(|i| &self.demands[i])
    }
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }
    pub fn snapshot_at(&self) -> DateTime<Utc> {
        self.snapshot_at
    }
    pub fn load_options(&self) -> LoadOptions {
        self.load
    }

    /// Reconstruit un roster (options d'allocation par défaut) depuis l'instantané.
    pub fn to_roster(&self) -> Roster {
        Roster {
            staff: self.staff.clone(),
            demands: self.demands.clone(),
            constraints: self.constraints.as_slice().to_vec(),
            options: Default::default(),
            load: self.load,
        }
    }

    /// Toutes les compétences détenues par au moins un membre actif.
    pub fn skill_universe(&self) -> BTreeSet<&str> {
        self.staff
            .iter()
            .filter(|s| s.active)
            .flat_map(|s| s.skills.iter().map(String::as_str))
            .collect()
    }
}

fn validate_staff(s: &Staff) -> Result<(), ValidationError> {
    if s.id.as_str().trim().is_empty() {
        return Err(ValidationError::EmptyIdentity("staff"));
    }
    for w in &s.availability {
        check_interval(&format!("staff {}", s.id), w)?;
    }
    Ok(())
}

fn validate_demand(d: &Demand) -> Result<(), ValidationError> {
    if d.id.as_str().trim().is_empty() {
        return Err(ValidationError::EmptyIdentity("demand"));
    }
    check_interval(&format!("demand {}", d.id), &d.interval)?;
    if d.headcount == 0 {
        return Err(ValidationError::ZeroHeadcount(d.id.clone()));
    }
    Ok(())
}

fn check_interval(entity: &str, w: &Interval) -> Result<(), ValidationError> {
    if !w.is_well_formed() {
        return Err(ValidationError::MalformedInterval {
            entity: entity.to_string(),
            start: w.start,
            end: w.end,
        });
    }
    Ok(())
}

/// Supprime espaces et doublons en conservant l'ordre.
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for t in tags {
        let t = t.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}
