#![forbid(unsafe_code)]
use chrono::{TimeZone, Utc};
use std::fs;
use tempfile::tempdir;
use turntabl::{
    allocate, io, AllocateOptions, Change, Constraint, EntityStore, JsonStorage, Status, Storage,
    UnderfillCause, Workspace,
};

const STAFF_CSV: &str = "\
id,name,skills,availability,max_assignments,max_hours,prior_assignments,active
ana,Ana,nursing;triage,2026-03-02T06:00:00Z/2026-03-02T22:00:00Z,2,,1,
ben,Ben,nursing,2026-03-02,,8,,yes
,Temp,,2026-03-02/2026-03-03,,,,false
";

const DEMANDS_CSV: &str = "\
id,name,start,end,skills,headcount,priority
ward-am,Ward AM,2026-03-02T07:00:00Z,2026-03-02T11:00:00Z,nursing,2,3
triage,Triage,2026-03-02T08:00:00Z,2026-03-02T12:00:00Z,triage,,5
xray,X ray,2026-03-02T13:00:00Z,2026-03-02T15:00:00Z,radiology,1,
";

fn load_fixture() -> EntityStore {
    let dir = tempdir().unwrap();
    let staff_path = dir.path().join("staff.csv");
    let demands_path = dir.path().join("demands.csv");
    fs::write(&staff_path, STAFF_CSV).unwrap();
    fs::write(&demands_path, DEMANDS_CSV).unwrap();

    let staff = io::import_staff_csv(&staff_path).unwrap();
    let demands = io::import_demands_csv(&demands_path).unwrap();
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    EntityStore::load_at(staff, demands, Constraint::default_set(), at).unwrap()
}

#[test]
fn staff_csv_import() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("staff.csv");
    fs::write(&path, STAFF_CSV).unwrap();
    let staff = io::import_staff_csv(&path).unwrap();

    assert_eq!(staff.len(), 3);
    assert_eq!(staff[0].skills, ["nursing", "triage"]);
    assert_eq!(staff[0].workload.max_assignments, Some(2));
    assert_eq!(staff[0].prior_assignments, 1);
    assert!(staff[0].active);

    // une date seule couvre la journée entière
    let day = staff[1].availability[0];
    assert_eq!(day.duration_minutes(), 24 * 60);
    assert_eq!(staff[1].workload.max_hours, Some(8));

    // identifiant généré, fin de période inclusive
    assert!(!staff[2].id.as_str().is_empty());
    assert!(!staff[2].active);
    assert_eq!(staff[2].availability[0].duration_minutes(), 2 * 24 * 60);
}

#[test]
fn demands_csv_import_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("demands.csv");
    fs::write(&path, DEMANDS_CSV).unwrap();
    let demands = io::import_demands_csv(&path).unwrap();

    assert_eq!(demands.len(), 3);
    assert_eq!(demands[0].headcount, 2);
    assert_eq!(demands[0].priority, 3);
    assert_eq!(demands[1].headcount, 1);
    assert_eq!(demands[2].priority, 0);
}

#[test]
fn bad_rows_are_rejected_with_context() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("staff.csv");
    fs::write(
        &path,
        "id,name,skills,availability,max_assignments\nana,Ana,,,many\n",
    )
    .unwrap();
    let err = io::import_staff_csv(&path).unwrap_err();
    assert!(format!("{err:#}").contains("max_assignments"));
}

#[test]
fn plan_and_underfill_exports() {
    let store = load_fixture();
    let alloc = allocate(&store, AllocateOptions::default());

    let mut plan_csv = Vec::new();
    io::write_plan_csv(&mut plan_csv, &store, &alloc.plan).unwrap();
    insta::assert_snapshot!(String::from_utf8(plan_csv).unwrap(), @r###"
    demand_id,demand,staff_id,staff,start,end,created_at
    triage,Triage,ana,Ana,2026-03-02T08:00:00+00:00,2026-03-02T12:00:00+00:00,2026-03-01T00:00:00+00:00
    ward-am,Ward AM,ben,Ben,2026-03-02T07:00:00+00:00,2026-03-02T11:00:00+00:00,2026-03-01T00:00:00+00:00
    "###);

    let mut underfill_csv = Vec::new();
    io::write_underfill_csv(&mut underfill_csv, &alloc.underfilled).unwrap();
    insta::assert_snapshot!(String::from_utf8(underfill_csv).unwrap(), @r###"
    demand_id,required,filled,missing,cause
    ward-am,2,1,1,capacity_exhausted
    xray,1,0,1,no_qualified_staff
    "###);
    assert_eq!(alloc.underfilled[1].cause, UnderfillCause::NoQualifiedStaff);
}

#[test]
fn workspace_roundtrip_is_atomic_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("turntabl.json");
    let storage = JsonStorage::open(&path).unwrap();
    assert!(storage.load().is_err());
    assert!(storage.load_or_default().unwrap().committed.is_none());

    let store = load_fixture();
    let alloc = allocate(&store, AllocateOptions::default());
    let ws = Workspace {
        roster: store.to_roster(),
        committed: Some(alloc.plan.clone()),
    };
    storage.save(&ws).unwrap();

    let back = storage.load().unwrap();
    assert_eq!(back.committed, Some(alloc.plan));
    assert_eq!(back.roster.staff, ws.roster.staff);
    assert_eq!(back.roster.constraints, Constraint::default_set());
}

#[test]
fn changes_load_from_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("changes.json");
    fs::write(
        &path,
        r#"[
            {"change": "staff_unavailable", "staff": "ben",
             "window": {"start": "2026-03-02T00:00:00Z", "end": "2026-03-03T00:00:00Z"}},
            {"change": "demand_headcount", "demand": "ward-am", "headcount": 1}
        ]"#,
    )
    .unwrap();

    let changes = io::load_changes_json(&path).unwrap();
    assert_eq!(changes.len(), 2);
    assert!(matches!(changes[0], Change::StaffUnavailable { .. }));
    assert_eq!(changes[1].describe(), "demand headcount: ward-am -> 1");
}

#[test]
fn billing_columns_are_optional() {
    let dir = tempdir().unwrap();
    let staff_path = dir.path().join("staff.csv");
    fs::write(
        &staff_path,
        "id,name,skills,availability,max_assignments,max_hours,prior_assignments,active,day_rate\n\
         ana,Ana,,,,,,,650\n\
         ben,Ben,,,,,,,\n",
    )
    .unwrap();
    let staff = io::import_staff_csv(&staff_path).unwrap();
    assert_eq!(staff[0].day_rate, Some(650));
    assert_eq!(staff[1].day_rate, None);

    let demands_path = dir.path().join("demands.csv");
    fs::write(
        &demands_path,
        "id,name,start,end,skills,headcount,priority,client,agreed_rate,status\n\
         build,Build,2026-03-02,2026-03-06,,,,Acme,800,provisional\n\
         run,Run,2026-03-09,2026-03-13,,,,,,\n",
    )
    .unwrap();
    let demands = io::import_demands_csv(&demands_path).unwrap();
    assert_eq!(demands[0].client.as_deref(), Some("Acme"));
    assert_eq!(demands[0].agreed_rate, Some(800));
    assert_eq!(demands[0].status, Status::Provisional);
    assert_eq!(demands[1].client, None);
    assert_eq!(demands[1].status, Status::Confirmed);

    fs::write(
        &demands_path,
        "id,name,start,end,skills,headcount,priority,client,agreed_rate,status\n\
         x,X,2026-03-02,2026-03-02,,,,,,maybe\n",
    )
    .unwrap();
    let err = io::import_demands_csv(&demands_path).unwrap_err();
    assert!(format!("{err:#}").contains("invalid status for demand x"));

    assert_eq!(
        io::parse_date("2026-03-05").unwrap(),
        chrono::NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()
    );
}
