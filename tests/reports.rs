#![forbid(unsafe_code)]
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use turntabl::{
    reports, Assignment, Constraint, Demand, EntityStore, Interval, Plan, Staff, Status,
};

fn day(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0).unwrap()
}

fn span(d0: u32, h0: u32, d1: u32, h1: u32) -> Interval {
    Interval::new(day(d0, h0), day(d1, h1)).unwrap()
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn agency() -> EntityStore {
    let mut dee = Staff::new("dee", "Dee");
    dee.active = false;
    let staff = vec![
        Staff::new("ana", "Ana").with_day_rate(500),
        Staff::new("ben", "Ben").with_day_rate(400).with_max_hours(40),
        Staff::new("cy", "Cy"),
        dee,
        Staff::new("eve", "Eve").with_max_hours(0),
    ];
    let demands = vec![
        Demand::new("build", "Build", span(2, 9, 6, 17))
            .with_client("Acme")
            .with_agreed_rate(600),
        Demand::new("audit", "Audit", span(5, 0, 7, 0))
            .with_client("Acme")
            .with_status(Status::Provisional),
        Demand::new("support", "Support", span(10, 0, 11, 0)).with_client("Globex"),
        Demand::new("spare", "Spare", span(20, 9, 20, 17)),
    ];
    EntityStore::load_at(staff, demands, Constraint::default_set(), day(1, 0)).unwrap()
}

fn plan() -> Plan {
    let at = day(1, 0);
    Plan::new(vec![
        Assignment::new("ana".into(), "build".into(), at),
        Assignment::new("ana".into(), "support".into(), at),
        Assignment::new("ben".into(), "audit".into(), at),
        Assignment::new("cy".into(), "spare".into(), at).with_status(Status::Provisional),
    ])
}

fn table(rows: &[reports::RevenueRow]) -> String {
    rows.iter()
        .map(|r| format!("{} {} {}\n", r.id, r.to_date, r.total))
        .collect()
}

#[test]
fn revenue_by_demand_client_and_staff() {
    let store = agency();
    let plan = plan();
    let as_of = date(5);

    insta::assert_snapshot!(table(&reports::demand_revenue(&store, &plan, as_of)), @r###"
    audit 400 800
    build 2400 3000
    spare 0 0
    support 0 0
    "###);
    insta::assert_snapshot!(table(&reports::client_revenue(&store, &plan, as_of)), @r###"
    Acme 2800 3800
    Globex 0 0
    "###);
    insta::assert_snapshot!(table(&reports::staff_revenue(&store, &plan, as_of)), @r###"
    ana 2400 3000
    ben 400 800
    cy 0 0
    dee 0 0
    eve 0 0
    "###);

    // une fois terminée, l'affectation compte en entier
    let later = reports::staff_revenue(&store, &plan, date(31));
    assert_eq!((later[0].to_date, later[0].total), (3500, 3500));
}

#[test]
fn confirmed_scope_drops_provisional_work() {
    let store = agency();
    let plan = plan();

    let confirmed = reports::scope(&store, &plan, false);
    assert_eq!(confirmed.len(), 2);
    assert!(confirmed.iter().all(|a| a.demand.as_str() != "audit"));
    assert!(confirmed.iter().all(|a| a.demand.as_str() != "spare"));
    assert_eq!(reports::scope(&store, &plan, true), plan);

    let acme = &reports::client_revenue(&store, &confirmed, date(5))[0];
    assert_eq!((acme.to_date, acme.total), (2400, 3000));

    let unstaffed: Vec<_> = reports::unstaffed_demands(&store, &confirmed)
        .into_iter()
        .map(|d| d.id.as_str())
        .collect();
    assert_eq!(unstaffed, ["audit", "spare"]);
}

#[test]
fn ending_soon_window_and_status_filter() {
    let store = agency();
    let ids = |include_provisional| -> Vec<String> {
        reports::ending_soon(&store, date(5), 7, include_provisional)
            .into_iter()
            .map(|d| d.id.as_str().to_string())
            .collect()
    };
    assert_eq!(ids(true), ["audit", "build", "support"]);
    assert_eq!(ids(false), ["build", "support"]);
    assert!(reports::ending_soon(&store, date(21), 30, true).is_empty());
}

#[test]
fn idle_staff_and_utilization() {
    let store = agency();
    let plan = plan();

    let idle: Vec<_> = reports::idle_staff(&store, &plan)
        .into_iter()
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(idle, ["eve"]);

    let rows = reports::utilization(&store, &plan);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].assignments, 2);
    assert_eq!(rows[0].minutes, (4 * 24 + 8) * 60 + 24 * 60);
    assert_eq!(rows[0].hours_ratio(), None);
    assert_eq!(rows[1].minutes, 2 * 24 * 60);
    assert_eq!(rows[1].hours_ratio(), Some(120));
    assert_eq!(rows[4].hours_ratio(), Some(0));
}
