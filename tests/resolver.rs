#![forbid(unsafe_code)]
use chrono::{DateTime, TimeZone, Utc};
use turntabl::{
    diff, AllocError, AllocateOptions, Assignment, Change, ConflictKind, ConflictResolver,
    Constraint, Demand, DemandId, EntityStore, Interval, Plan, Staff, StaffId,
};

fn mon(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap()
}

fn window(h0: u32, h1: u32) -> Interval {
    Interval::new(mon(h0), mon(h1)).unwrap()
}

fn committed_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 20, 9, 0, 0).unwrap()
}

fn repaired_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap()
}

fn assign(staff: &str, demand: &str, at: DateTime<Utc>) -> Assignment {
    Assignment::new(staff.into(), demand.into(), at)
}

fn ward() -> EntityStore {
    let staff = vec![
        Staff::new("a", "A").with_skill("nursing").with_availability(window(8, 20)),
        Staff::new("b", "B").with_skill("nursing").with_availability(window(8, 20)),
    ];
    let demands = vec![
        Demand::new("d1", "Morning", window(9, 12)).with_skill("nursing"),
        Demand::new("d2", "Afternoon", window(13, 16)).with_skill("nursing"),
    ];
    EntityStore::load_at(staff, demands, Constraint::default_set(), committed_at()).unwrap()
}

fn committed() -> Plan {
    Plan::new(vec![
        assign("a", "d1", committed_at()),
        assign("b", "d2", committed_at()),
    ])
}

#[test]
fn unavailable_staff_is_replaced_without_moving_others() {
    let store = ward();
    let resolver = ConflictResolver::new(&store, AllocateOptions::default());
    let changes = vec![Change::StaffUnavailable {
        staff: "b".into(),
        window: window(12, 20),
    }];

    let repair = resolver
        .resolve_at(&committed(), &changes, repaired_at())
        .unwrap();

    assert_eq!(repair.removed, vec![assign("b", "d2", committed_at())]);
    assert_eq!(repair.added, vec![assign("a", "d2", repaired_at())]);
    assert_eq!(repair.churn(), 2);

    let kept = repair
        .plan()
        .iter()
        .find(|x| x.demand.as_str() == "d1")
        .unwrap();
    assert_eq!(kept.created_at, committed_at());

    let post = ConflictResolver::new(&repair.store, AllocateOptions::default());
    assert!(post.validate(repair.plan()).is_feasible());
}

#[test]
fn headcount_increase_only_adds() {
    let store = ward();
    let resolver = ConflictResolver::new(&store, AllocateOptions::default());
    let changes = vec![Change::DemandHeadcount {
        demand: "d1".into(),
        headcount: 2,
    }];

    let repair = resolver
        .resolve_at(&committed(), &changes, repaired_at())
        .unwrap();
    assert!(repair.removed.is_empty());
    assert_eq!(repair.added, vec![assign("b", "d1", repaired_at())]);
    assert_eq!(repair.plan().len(), 3);
}

#[test]
fn headcount_decrease_keeps_oldest_assignment() {
    let staff = vec![
        Staff::new("a", "A").with_availability(window(0, 23)),
        Staff::new("b", "B").with_availability(window(0, 23)),
    ];
    let demands = vec![Demand::new("d", "D", window(9, 12)).with_headcount(2)];
    let store =
        EntityStore::load_at(staff, demands, Constraint::default_set(), committed_at()).unwrap();
    let plan = Plan::new(vec![
        assign("a", "d", repaired_at()),
        assign("b", "d", committed_at()),
    ]);

    let repair = ConflictResolver::new(&store, AllocateOptions::default())
        .resolve_at(
            &plan,
            &[Change::DemandHeadcount {
                demand: "d".into(),
                headcount: 1,
            }],
            repaired_at(),
        )
        .unwrap();
    assert_eq!(repair.removed, vec![assign("a", "d", repaired_at())]);
    assert!(repair.added.is_empty());
    assert!(repair.plan().contains(&StaffId::new("b"), &DemandId::new("d")));
}

#[test]
fn removed_staff_loses_assignments() {
    let store = ward();
    let repair = ConflictResolver::new(&store, AllocateOptions::default())
        .resolve_at(
            &committed(),
            &[Change::StaffRemoved { staff: "a".into() }],
            repaired_at(),
        )
        .unwrap();

    assert_eq!(repair.removed, vec![assign("a", "d1", committed_at())]);
    assert_eq!(repair.added, vec![assign("b", "d1", repaired_at())]);
}

#[test]
fn unknown_change_target_is_an_error() {
    let store = ward();
    let err = ConflictResolver::new(&store, AllocateOptions::default())
        .resolve(&committed(), &[Change::StaffDeactivated { staff: "zed".into() }])
        .unwrap_err();
    assert!(matches!(err, AllocError::UnknownStaff(ref id) if id == "zed"));
}

#[test]
fn restore_drops_the_most_conflicting_assignment() {
    let staff = vec![Staff::new("a", "A").with_availability(window(0, 23))];
    let demands = vec![
        Demand::new("long", "Long", window(8, 16)),
        Demand::new("am", "AM", window(8, 11)),
        Demand::new("pm", "PM", window(12, 15)),
    ];
    let store =
        EntityStore::load_at(staff, demands, Constraint::default_set(), committed_at()).unwrap();
    let plan = Plan::new(vec![
        assign("a", "long", committed_at()),
        assign("a", "am", committed_at()),
        assign("a", "pm", committed_at()),
    ]);
    let resolver = ConflictResolver::new(&store, AllocateOptions::default());

    let conflicts = resolver.conflicts(&plan);
    assert_eq!(conflicts.len(), 2);
    assert!(conflicts.iter().all(|c| c.kind == ConflictKind::Overlap));

    let restored = resolver.restore(&plan);
    assert_eq!(restored.removed, vec![assign("a", "long", committed_at())]);
    assert_eq!(restored.kept.len(), 2);
    assert!(resolver.validate(&restored.kept).is_feasible());
}

#[test]
fn rest_conflicts_are_reported() {
    let staff = vec![Staff::new("a", "A").with_availability(window(0, 23))];
    let demands = vec![
        Demand::new("early", "Early", window(6, 10)),
        Demand::new("late", "Late", window(12, 16)),
    ];
    let mut constraints = Constraint::default_set();
    constraints.push(Constraint::MinRest {
        hours: 8,
        penalty: None,
    });
    let store = EntityStore::load_at(staff, demands, constraints, committed_at()).unwrap();
    let plan = Plan::new(vec![
        assign("a", "early", committed_at()),
        assign("a", "late", committed_at()),
    ]);
    let resolver = ConflictResolver::new(&store, AllocateOptions::default());

    let conflicts = resolver.conflicts(&plan);
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::RestViolation);
    assert!(!resolver.validate(&plan).is_feasible());
}

#[test]
fn diff_of_identical_plans_is_all_unchanged() {
    let plan = committed();
    let delta = diff(&plan, &plan);
    assert!(delta.added.is_empty());
    assert!(delta.removed.is_empty());
    assert_eq!(delta.unchanged, plan.assignments());
    assert_eq!(turntabl::diff::apply(&delta), plan);
}

#[test]
fn diff_keeps_original_timestamps() {
    let old = committed();
    let new = Plan::new(vec![
        assign("a", "d1", repaired_at()),
        assign("a", "d2", repaired_at()),
    ]);
    let delta = diff(&old, &new);

    assert_eq!(delta.removed, vec![assign("b", "d2", committed_at())]);
    assert_eq!(delta.added, vec![assign("a", "d2", repaired_at())]);
    assert_eq!(delta.unchanged, vec![assign("a", "d1", committed_at())]);
    assert_eq!(delta.churn(), 2);

    let applied = turntabl::diff::apply(&delta);
    assert_eq!(applied.len(), 2);
    assert!(applied.iter().any(|x| x.created_at == committed_at()));
}

#[test]
fn loaded_plan_is_canonical() {
    let raw = r#"{"assignments": [
        {"staff": "b", "demand": "d2", "created_at": "2026-02-20T09:00:00Z"},
        {"staff": "a", "demand": "d1", "created_at": "2026-02-20T09:00:00Z"}
    ]}"#;
    let loaded: Plan = serde_json::from_str(raw).unwrap();

    assert_eq!(loaded, committed());
    assert!(loaded.contains(&StaffId::new("a"), &DemandId::new("d1")));
    let delta = diff(&loaded, &committed());
    assert!(delta.added.is_empty());
    assert!(delta.removed.is_empty());
    assert_eq!(delta.unchanged.len(), 2);
}

#[test]
fn soft_rest_gap_is_scored_not_a_conflict() {
    let staff = vec![Staff::new("a", "A").with_availability(window(0, 23))];
    let demands = vec![
        Demand::new("early", "Early", window(6, 10)),
        Demand::new("late", "Late", window(12, 16)),
    ];
    let mut constraints = Constraint::default_set();
    constraints.push(Constraint::MinRest {
        hours: 8,
        penalty: Some(4),
    });
    let store = EntityStore::load_at(staff, demands, constraints, committed_at()).unwrap();
    let plan = Plan::new(vec![
        assign("a", "early", committed_at()),
        assign("a", "late", committed_at()),
    ]);
    let resolver = ConflictResolver::new(&store, AllocateOptions::default());

    assert!(resolver.conflicts(&plan).is_empty());
    let v = resolver.validate(&plan);
    assert!(v.is_feasible());
    assert_eq!(v.total_penalty(), 4);
}
