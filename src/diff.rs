use crate::model::{Assignment, Plan};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Écart entre deux plans, par clé (demand, staff).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDiff {
    pub added: Vec<Assignment>,
    pub removed: Vec<Assignment>,
    /// Affectations présentes des deux côtés, avec l'horodatage d'origine.
    pub unchanged: Vec<Assignment>,
}

impl PlanDiff {
    /// Vrai si aucun ajout ni retrait.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn churn(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Partitionne les affectations de `old` et `new` en ajoutées / retirées / inchangées.
pub fn diff(old: &Plan, new: &Plan) -> PlanDiff {
    let (old, new) = (old.assignments(), new.assignments());
    let mut out = PlanDiff::default();
    let (mut i, mut j) = (0usize, 0usize);

    while i < old.len() && j < new.len() {
        match old[i].key().cmp(&new[j].key()) {
            Ordering::Less => {
                out.removed.push(old[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                out.added.push(new[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                out.unchanged.push(old[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out.removed.extend(old[i..].iter().cloned());
    out.added.extend(new[j..].iter().cloned());
    out
}

/// Le moteur ne conserve aucun état : renvoie le nouveau plan à persister,
/// les affectations inchangées gardant leur horodatage d'origine.
pub fn apply(diff: &PlanDiff) -> Plan {
    diff.unchanged
        .iter()
        .chain(diff.added.iter())
        .cloned()
        .collect()
}
