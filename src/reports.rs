//! Rapports de lecture sur un plan.

use crate::model::{Assignment, Demand, Interval, Plan, Staff, StaffId, Status};
use crate::store::EntityStore;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Restreint le plan aux affectations confirmées sur des besoins confirmés,
/// sauf si `include_provisional`.
pub fn scope(store: &EntityStore, plan: &Plan, include_provisional: bool) -> Plan {
    if include_provisional {
        return plan.clone();
    }
    Plan::new(
        plan.iter()
            .filter(|a| {
                a.status == Status::Confirmed
                    && store
                        .find_demand(&a.demand)
                        .is_some_and(|d| d.status == Status::Confirmed)
            })
            .cloned()
            .collect(),
    )
}

/// Membres actifs sans aucune affectation, par identifiant.
pub fn idle_staff<'a>(store: &'a EntityStore, plan: &Plan) -> Vec<&'a Staff> {
    store
        .staff()
        .iter()
        .filter(|s| s.active && plan.for_staff(&s.id).next().is_none())
        .collect()
}

/// Besoins sans aucune affectation, par (début, identifiant).
pub fn unstaffed_demands<'a>(store: &'a EntityStore, plan: &Plan) -> Vec<&'a Demand> {
    store
        .demands()
        .iter()
        .filter(|d| plan.for_demand(&d.id).next().is_none())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtilizationRow {
    pub staff: StaffId,
    pub name: String,
    pub assignments: u32,
    pub minutes: i64,
    pub max_assignments: Option<u32>,
    pub max_hours: Option<u32>,
    pub prior_assignments: u32,
}

impl UtilizationRow {
    /// Part du plafond d'heures consommée, en pourcentage.
    pub fn hours_ratio(&self) -> Option<u32> {
        let cap = self.max_hours? as i64 * 60;
        if cap == 0 {
            return Some(if self.minutes == 0 { 0 } else { 100 });
        }
        Some((self.minutes * 100 / cap) as u32)
    }
}

/// Charge par membre ; les affectations inconnues du store sont ignorées.
pub fn utilization(store: &EntityStore, plan: &Plan) -> Vec<UtilizationRow> {
    let mut totals: HashMap<&StaffId, (u32, i64)> = HashMap::new();
    for a in plan.iter() {
        let Some(demand) = store.find_demand(&a.demand) else {
            continue;
        };
        let entry = totals.entry(&a.staff).or_default();
        entry.0 += 1;
        entry.1 += demand.interval.duration_minutes();
    }

    store
        .staff()
        .iter()
        .map(|s| {
            let (assignments, minutes) = totals.get(&s.id).copied().unwrap_or_default();
            UtilizationRow {
                staff: s.id.clone(),
                name: s.name.clone(),
                assignments,
                minutes,
                max_assignments: s.workload.max_assignments,
                max_hours: s.workload.max_hours,
                prior_assignments: s.prior_assignments,
            }
        })
        .collect()
}

/// Premier et dernier jour calendaires touchés par l'intervalle.
fn calendar_days(interval: &Interval) -> (NaiveDate, NaiveDate) {
    let first = interval.start.date_naive();
    let last = (interval.end - Duration::nanoseconds(1)).date_naive();
    (first, last.max(first))
}

fn days_inclusive(first: NaiveDate, last: NaiveDate) -> u64 {
    ((last - first).num_days() + 1).max(0) as u64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenueRow {
    pub id: String,
    pub name: String,
    pub to_date: u64,
    pub total: u64,
}

/// Revenu d'une affectation : (à date, total).
///
/// Tarif convenu du besoin, sinon tarif journalier du membre ; facturé par jour
/// calendaire inclus. Une affectation qui commence après `as_of` ne compte pas.
fn assignment_revenue(store: &EntityStore, a: &Assignment, as_of: NaiveDate) -> (u64, u64) {
    let (Some(staff), Some(demand)) = (store.find_staff(&a.staff), store.find_demand(&a.demand))
    else {
        return (0, 0);
    };
    let Some(rate) = demand.agreed_rate.or(staff.day_rate) else {
        return (0, 0);
    };
    let (first, last) = calendar_days(&demand.interval);
    if first > as_of {
        return (0, 0);
    }
    let rate = u64::from(rate);
    let to_date = days_inclusive(first, last.min(as_of)) * rate;
    let total = days_inclusive(first, last) * rate;
    (to_date, total)
}

fn revenue_rows<K>(
    store: &EntityStore,
    plan: &Plan,
    as_of: NaiveDate,
    seed: impl Iterator<Item = (String, String)>,
    key: K,
) -> Vec<RevenueRow>
where
    K: Fn(&Assignment) -> Option<String>,
{
    let mut rows: BTreeMap<String, RevenueRow> = seed
        .map(|(id, name)| {
            let row = RevenueRow {
                id: id.clone(),
                name,
                to_date: 0,
                total: 0,
            };
            (id, row)
        })
        .collect();
    for a in plan.iter() {
        let Some(row) = key(a).and_then(|k| rows.get_mut(&k)) else {
            continue;
        };
        let (to_date, total) = assignment_revenue(store, a, as_of);
        row.to_date = row.to_date.saturating_add(to_date);
        row.total = row.total.saturating_add(total);
    }
    let mut out: Vec<RevenueRow> = rows.into_values().collect();
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    out
}

/// Revenu par besoin, lignes à zéro comprises, triées par nom.
pub fn demand_revenue(store: &EntityStore, plan: &Plan, as_of: NaiveDate) -> Vec<RevenueRow> {
    let seed = store
        .demands()
        .iter()
        .map(|d| (d.id.as_str().to_string(), d.name.clone()));
    revenue_rows(store, plan, as_of, seed, |a| Some(a.demand.as_str().to_string()))
}

/// Revenu par client ; les besoins sans client sont ignorés.
pub fn client_revenue(store: &EntityStore, plan: &Plan, as_of: NaiveDate) -> Vec<RevenueRow> {
    let mut clients: Vec<String> = store
        .demands()
        .iter()
        .filter_map(|d| d.client.clone())
        .collect();
    clients.sort();
    clients.dedup();
    let seed = clients.into_iter().map(|c| (c.clone(), c));
    revenue_rows(store, plan, as_of, seed, |a| {
        store.find_demand(&a.demand).and_then(|d| d.client.clone())
    })
}

pub fn staff_revenue(store: &EntityStore, plan: &Plan, as_of: NaiveDate) -> Vec<RevenueRow> {
    let seed = store
        .staff()
        .iter()
        .map(|s| (s.id.as_str().to_string(), s.name.clone()));
    revenue_rows(store, plan, as_of, seed, |a| Some(a.staff.as_str().to_string()))
}

/// Besoins dont le dernier jour tombe dans `[as_of, as_of + within_days]`,
/// par (dernier jour, identifiant).
pub fn ending_soon(
    store: &EntityStore,
    as_of: NaiveDate,
    within_days: u32,
    include_provisional: bool,
) -> Vec<&Demand> {
    let end_by = as_of + Duration::days(i64::from(within_days));
    let mut out: Vec<(NaiveDate, &Demand)> = store
        .demands()
        .iter()
        .filter(|d| include_provisional || d.status == Status::Confirmed)
        .filter_map(|d| {
            let (_, last) = calendar_days(&d.interval);
            (last >= as_of && last <= end_by).then_some((last, d))
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
    out.into_iter().map(|(_, d)| d).collect()
}
