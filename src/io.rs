use crate::allocator::Underfill;
use crate::changes::Change;
use crate::diff::PlanDiff;
use crate::model::{Demand, DemandId, Interval, Plan, Staff, StaffId};
use crate::resolver::Conflict;
use crate::store::EntityStore;
use anyhow::{bail, Context};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Import du personnel depuis CSV :
/// header `id,name,skills,availability,max_assignments,max_hours,prior_assignments,active,day_rate`.
///
/// Seul `name` est obligatoire ; un `id` vide reçoit un identifiant aléatoire.
pub fn import_staff_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Staff>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let name = cell(&rec, 1).context("missing name")?;
        if name.is_empty() {
            bail!("invalid staff row (empty name)");
        }
        let id = match cell(&rec, 0).filter(|id| !id.is_empty()) {
            Some(id) => StaffId::new(id),
            None => StaffId::random(),
        };
        let mut staff = Staff::new(id.as_str(), name);

        if let Some(skills) = cell(&rec, 2) {
            for skill in split_list(skills) {
                staff = staff.with_skill(skill);
            }
        }
        if let Some(windows) = cell(&rec, 3).filter(|s| !s.is_empty()) {
            staff.availability = parse_windows(windows)
                .with_context(|| format!("invalid availability for staff {id}"))?;
        }
        staff.workload.max_assignments = parse_opt_u32(cell(&rec, 4))
            .with_context(|| format!("invalid max_assignments for staff {id}"))?;
        staff.workload.max_hours = parse_opt_u32(cell(&rec, 5))
            .with_context(|| format!("invalid max_hours for staff {id}"))?;
        staff.prior_assignments = parse_opt_u32(cell(&rec, 6))
            .with_context(|| format!("invalid prior_assignments for staff {id}"))?
            .unwrap_or(0);
        if let Some(flag) = cell(&rec, 7).filter(|s| !s.is_empty()) {
            staff.active =
                parse_bool(flag).with_context(|| format!("invalid active value for staff {id}"))?;
        }
        staff.day_rate = parse_opt_u32(cell(&rec, 8))
            .with_context(|| format!("invalid day_rate for staff {id}"))?;
        out.push(staff);
    }
    Ok(out)
}

/// Import des besoins :
/// header `id,name,start,end,skills,headcount,priority,client,agreed_rate,status`.
pub fn import_demands_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Demand>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let name = cell(&rec, 1).context("missing name")?.to_string();
        let start = cell(&rec, 2).context("missing start")?;
        let end = cell(&rec, 3).context("missing end")?;
        let (start, _) = parse_point(start).context("start")?;
        let (mut end, end_was_date) = parse_point(end).context("end")?;
        if end_was_date {
            end += Duration::days(1);
        }
        let interval = Interval::new(start, end).map_err(anyhow::Error::msg)?;

        let id = match cell(&rec, 0).filter(|id| !id.is_empty()) {
            Some(id) => DemandId::new(id),
            None => DemandId::random(),
        };
        let mut demand = Demand::new(id.as_str(), name, interval);
        if let Some(skills) = cell(&rec, 4) {
            for skill in split_list(skills) {
                demand = demand.with_skill(skill);
            }
        }
        if let Some(headcount) = parse_opt_u32(cell(&rec, 5))
            .with_context(|| format!("invalid headcount for demand {id}"))?
        {
            demand.headcount = headcount;
        }
        if let Some(priority) = parse_opt_u32(cell(&rec, 6))
            .with_context(|| format!("invalid priority for demand {id}"))?
        {
            demand.priority = priority;
        }
        demand.client = cell(&rec, 7)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        demand.agreed_rate = parse_opt_u32(cell(&rec, 8))
            .with_context(|| format!("invalid agreed_rate for demand {id}"))?;
        if let Some(status) = cell(&rec, 9).filter(|s| !s.is_empty()) {
            demand.status = status
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid status for demand {id}"))?;
        }
        out.push(demand);
    }
    Ok(out)
}

fn cell(rec: &StringRecord, idx: usize) -> Option<&str> {
    rec.get(idx).map(str::trim)
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(';').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_opt_u32(raw: Option<&str>) -> anyhow::Result<Option<u32>> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => Ok(Some(s.parse().with_context(|| format!("expected integer, got {s}"))?)),
    }
}

fn parse_bool(s: &str) -> anyhow::Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "oui" => Ok(true),
        "false" | "0" | "no" | "n" | "non" => Ok(false),
        _ => bail!("expected boolean"),
    }
}

fn parse_windows(raw: &str) -> anyhow::Result<Vec<Interval>> {
    split_list(raw).map(parse_window_chunk).collect()
}

/// `start/end` (ou `start..end`) ; une date seule couvre la journée entière.
fn parse_window_chunk(chunk: &str) -> anyhow::Result<Interval> {
    if let Some((start_raw, end_raw)) = chunk.split_once('/').or_else(|| chunk.split_once("..")) {
        let (start, _) = parse_point(start_raw.trim())?;
        let (mut end, end_was_date) = parse_point(end_raw.trim())?;
        if end_was_date {
            end += Duration::days(1);
        }
        Interval::new(start, end).map_err(anyhow::Error::msg)
    } else {
        let (start, _) = parse_point(chunk)?;
        Interval::new(start, start + Duration::days(1)).map_err(anyhow::Error::msg)
    }
}

/// Date de référence des rapports (`YYYY-MM-DD` ou horodatage RFC 3339).
pub fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    let (at, _) = parse_point(raw.trim())?;
    Ok(at.date_naive())
}

fn parse_point(raw: &str) -> anyhow::Result<(DateTime<Utc>, bool)> {
    if let Ok(dt) = raw.parse::<DateTime<Utc>>() {
        return Ok((dt, false));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date/datetime: {raw}"))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .context("invalid midnight conversion")?;
    Ok((Utc.from_utc_datetime(&datetime), true))
}

/// Charge une liste de changements JSON.
pub fn load_changes_json<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Change>> {
    let path = path.as_ref();
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing changes {}", path.display()))
}

pub fn load_plan_json<P: AsRef<Path>>(path: P) -> anyhow::Result<Plan> {
    let path = path.as_ref();
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing plan {}", path.display()))
}

/// Export JSON du plan (jolie mise en forme)
pub fn export_plan_json<P: AsRef<Path>>(path: P, plan: &Plan) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(plan)?;
    fs::write(path, s)?;
    Ok(())
}

/// Export CSV du plan : header `demand_id,demand,staff_id,staff,start,end,created_at`.
pub fn write_plan_csv<W: Write>(out: W, store: &EntityStore, plan: &Plan) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(out);
    w.write_record(["demand_id", "demand", "staff_id", "staff", "start", "end", "created_at"])?;
    for a in plan.iter() {
        let demand = store.find_demand(&a.demand);
        let staff_name = store
            .find_staff(&a.staff)
            .map(|s| s.name.as_str())
            .unwrap_or("");
        let (start, end) = demand
            .map(|d| (d.interval.start.to_rfc3339(), d.interval.end.to_rfc3339()))
            .unwrap_or_default();
        let created_at = a.created_at.to_rfc3339();
        w.write_record([
            a.demand.as_str(),
            demand.map(|d| d.name.as_str()).unwrap_or(""),
            a.staff.as_str(),
            staff_name,
            start.as_str(),
            end.as_str(),
            created_at.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_plan_csv<P: AsRef<Path>>(path: P, store: &EntityStore, plan: &Plan) -> anyhow::Result<()> {
    let file = fs::File::create(path)?;
    write_plan_csv(file, store, plan)
}

/// Export CSV du sous-remplissage : header `demand_id,required,filled,missing,cause`.
pub fn write_underfill_csv<W: Write>(out: W, underfilled: &[Underfill]) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(out);
    w.write_record(["demand_id", "required", "filled", "missing", "cause"])?;
    let mut required = itoa::Buffer::new();
    let mut filled = itoa::Buffer::new();
    let mut missing = itoa::Buffer::new();
    for u in underfilled {
        w.write_record([
            u.demand.as_str(),
            required.format(u.required),
            filled.format(u.filled),
            missing.format(u.missing()),
            u.cause.label(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_underfill_csv<P: AsRef<Path>>(path: P, underfilled: &[Underfill]) -> anyhow::Result<()> {
    let file = fs::File::create(path)?;
    write_underfill_csv(file, underfilled)
}

/// Export CSV d'un diff : header `change,demand_id,staff_id`.
pub fn write_diff_csv<W: Write>(out: W, diff: &PlanDiff) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(out);
    w.write_record(["change", "demand_id", "staff_id"])?;
    let rows = diff
        .removed
        .iter()
        .map(|a| ("removed", a))
        .chain(diff.added.iter().map(|a| ("added", a)));
    for (change, a) in rows {
        w.write_record([change, a.demand.as_str(), a.staff.as_str()])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_diff_csv<P: AsRef<Path>>(path: P, diff: &PlanDiff) -> anyhow::Result<()> {
    let file = fs::File::create(path)?;
    write_diff_csv(file, diff)
}

/// Export CSV des conflits : header `staff_id,demand_a,demand_b,kind`.
pub fn write_conflicts_csv<W: Write>(out: W, conflicts: &[Conflict]) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(out);
    w.write_record(["staff_id", "demand_a", "demand_b", "kind"])?;
    for c in conflicts {
        w.write_record([
            c.staff.as_str(),
            c.demand_a.as_str(),
            c.demand_b.as_str(),
            c.kind.label(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_conflicts_csv<P: AsRef<Path>>(path: P, conflicts: &[Conflict]) -> anyhow::Result<()> {
    let file = fs::File::create(path)?;
    write_conflicts_csv(file, conflicts)
}
