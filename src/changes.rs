use crate::error::AllocError;
use crate::model::{Demand, DemandId, Interval, Roster, Staff, StaffId};
use serde::{Deserialize, Serialize};

/// Modification d'entrée survenue depuis la construction d'un plan.
///
/// Format JSON : `{"change": "staff_unavailable", "staff": "ava", "window": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    StaffUpserted { staff: Staff },
    StaffRemoved { staff: StaffId },
    StaffDeactivated { staff: StaffId },
    /// Retire `window` des disponibilités du membre.
    StaffUnavailable { staff: StaffId, window: Interval },
    DemandUpserted { demand: Demand },
    DemandRemoved { demand: DemandId },
    DemandHeadcount { demand: DemandId, headcount: u32 },
}

impl Change {
    pub fn apply(&self, roster: &mut Roster) -> Result<(), AllocError> {
        match self {
            Change::StaffUpserted { staff } => match roster.find_staff_mut(&staff.id) {
                Some(existing) => *existing = staff.clone(),
                None => roster.staff.push(staff.clone()),
            },
            Change::StaffRemoved { staff } => {
                let before = roster.staff.len();
                roster.staff.retain(|s| &s.id != staff);
                if roster.staff.len() == before {
                    return Err(AllocError::UnknownStaff(staff.to_string()));
                }
            }
            Change::StaffDeactivated { staff } => {
                let s = roster
                    .find_staff_mut(staff)
                    .ok_or_else(|| AllocError::UnknownStaff(staff.to_string()))?;
                s.active = false;
            }
            Change::StaffUnavailable { staff, window } => {
                let s = roster
                    .find_staff_mut(staff)
                    .ok_or_else(|| AllocError::UnknownStaff(staff.to_string()))?;
                s.availability = s
                    .availability
                    .iter()
                    .flat_map(|w| w.subtract(window))
                    .collect();
            }
            Change::DemandUpserted { demand } => match roster.find_demand_mut(&demand.id) {
                Some(existing) => *existing = demand.clone(),
                None => roster.demands.push(demand.clone()),
            },
            Change::DemandRemoved { demand } => {
                let before = roster.demands.len();
                roster.demands.retain(|d| &d.id != demand);
                if roster.demands.len() == before {
                    return Err(AllocError::UnknownDemand(demand.to_string()));
                }
            }
            Change::DemandHeadcount { demand, headcount } => {
                let d = roster
                    .find_demand_mut(demand)
                    .ok_or_else(|| AllocError::UnknownDemand(demand.to_string()))?;
                d.headcount = *headcount;
            }
        }
        Ok(())
    }

    /// Texte court pour l'audit.
    pub fn describe(&self) -> String {
        match self {
            Change::StaffUpserted { staff } => format!("staff upserted: {}", staff.id),
            Change::StaffRemoved { staff } => format!("staff removed: {staff}"),
            Change::StaffDeactivated { staff } => format!("staff deactivated: {staff}"),
            Change::StaffUnavailable { staff, window } => format!(
                "staff unavailable: {staff} from {} to {}",
                window.start.to_rfc3339(),
                window.end.to_rfc3339()
            ),
            Change::DemandUpserted { demand } => format!("demand upserted: {}", demand.id),
            Change::DemandRemoved { demand } => format!("demand removed: {demand}"),
            Change::DemandHeadcount { demand, headcount } => {
                format!("demand headcount: {demand} -> {headcount}")
            }
        }
    }
}

/// Applique les changements dans l'ordre ; s'arrête au premier en erreur.
pub fn apply_all(roster: &mut Roster, changes: &[Change]) -> Result<(), AllocError> {
    for change in changes {
        change.apply(roster)?;
    }
    Ok(())
}
