#![forbid(unsafe_code)]
use chrono::{DateTime, TimeZone, Utc};
use turntabl::{
    evaluate_pair, evaluate_plan, AllocError, Assignment, Constraint, ConstraintKind,
    ConstraintSet, Demand, EntityStore, Interval, Plan, Staff, Strength, ValidationError,
    MAX_PENALTY,
};

fn at(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap()
}

fn window(h0: u32, h1: u32) -> Interval {
    Interval::new(at(h0), at(h1)).unwrap()
}

fn assign(staff: &str, demand: &str) -> Assignment {
    Assignment::new(staff.into(), demand.into(), at(0))
}

#[test]
fn duplicate_staff_is_rejected() {
    let staff = vec![Staff::new("a", "A"), Staff::new("a", "Again")];
    let err = EntityStore::load(staff, vec![], Constraint::default_set()).unwrap_err();
    assert!(matches!(
        err,
        AllocError::Validation(ValidationError::DuplicateStaff(ref id)) if id.as_str() == "a"
    ));
}

#[test]
fn malformed_and_empty_inputs_are_rejected() {
    let backwards = Interval {
        start: at(12),
        end: at(10),
    };
    let err = EntityStore::load(
        vec![],
        vec![Demand::new("d", "D", backwards)],
        Constraint::default_set(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        AllocError::Validation(ValidationError::MalformedInterval { .. })
    ));

    let err = EntityStore::load(
        vec![],
        vec![Demand::new("d", "D", window(8, 9)).with_headcount(0)],
        Constraint::default_set(),
    )
    .unwrap_err();
    assert!(matches!(err, AllocError::Validation(ValidationError::ZeroHeadcount(_))));

    let err = EntityStore::load(vec![Staff::new(" ", "Nobody")], vec![], Constraint::default_set())
        .unwrap_err();
    assert!(matches!(err, AllocError::Validation(ValidationError::EmptyIdentity("staff"))));
}

#[test]
fn zero_max_hours_loads_but_blocks_assignment() {
    let staff = vec![Staff::new("a", "A").with_availability(window(0, 23)).with_max_hours(0)];
    let demands = vec![Demand::new("d", "D", window(8, 9))];
    let store = EntityStore::load(staff, demands, Constraint::default_set()).unwrap();

    let v = evaluate_pair(&store, store.constraints(), 0, 0);
    assert!(!v.is_feasible());
    assert_eq!(v.hard().next().unwrap().kind, ConstraintKind::MaxWorkload);
}

#[test]
fn store_orders_entities_and_trims_skills() {
    let staff = vec![
        Staff::new("zoe", "Zoe").with_skill(" icu ").with_skill("icu"),
        Staff::new("al", "Al"),
    ];
    let demands = vec![
        Demand::new("b", "B", window(10, 11)),
        Demand::new("a", "A", window(10, 11)),
        Demand::new("c", "C", window(8, 9)),
    ];
    let store = EntityStore::load(staff, demands, Constraint::default_set()).unwrap();

    let staff: Vec<_> = store.staff().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(staff, ["al", "zoe"]);
    let demands: Vec<_> = store.demands().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(demands, ["c", "a", "b"]);
    assert_eq!(store.find_staff(&"zoe".into()).unwrap().skills, ["icu"]);
}

#[test]
fn plan_evaluation_reports_hard_and_soft() {
    let staff = vec![
        Staff::new("a", "A").with_skill("icu").with_availability(window(0, 23)),
        Staff::new("b", "B").with_availability(window(0, 12)),
    ];
    let demands = vec![
        Demand::new("d1", "D1", window(8, 12)),
        Demand::new("d2", "D2", window(10, 14)),
        Demand::new("d3", "D3", window(13, 15)).with_skill("icu"),
    ];
    let constraints = vec![
        Constraint::Availability { penalty: Some(7) },
        Constraint::SkillMatch { penalty: None },
        Constraint::NoOverlap,
    ];
    let store = EntityStore::load(staff, demands, constraints).unwrap();
    let set = ConstraintSet::new(store.constraints().as_slice().to_vec());

    let plan = Plan::new(vec![
        assign("a", "d1"),
        assign("a", "d2"),
        assign("b", "d3"),
        assign("b", "d1"),
    ]);
    let v = evaluate_plan(&store, &set, &plan);

    let hard: Vec<_> = v.hard().map(|v| v.kind).collect();
    assert!(hard.contains(&ConstraintKind::NoOverlap));
    assert!(hard.contains(&ConstraintKind::SkillMatch));
    assert!(hard.contains(&ConstraintKind::Capacity));

    let soft: Vec<_> = v.soft().collect();
    assert_eq!(soft.len(), 1);
    assert_eq!(soft[0].kind, ConstraintKind::Availability);
    assert_eq!(soft[0].strength, Strength::Soft(7));
    assert_eq!(v.total_penalty(), 7);
}

#[test]
fn evaluation_is_independent_of_constraint_order() {
    let staff = vec![Staff::new("a", "A").with_availability(window(0, 10))];
    let demands = vec![
        Demand::new("d1", "D1", window(8, 12)).with_skill("x"),
        Demand::new("d2", "D2", window(9, 11)),
    ];
    let forward = Constraint::default_set();
    let mut backward = forward.clone();
    backward.reverse();
    let store = EntityStore::load(staff, demands, forward.clone()).unwrap();
    let plan = Plan::new(vec![assign("a", "d1"), assign("a", "d2")]);

    let v1 = evaluate_plan(&store, &ConstraintSet::new(forward), &plan);
    let v2 = evaluate_plan(&store, &ConstraintSet::new(backward), &plan);
    assert_eq!(v1, v2);
    assert!(!v1.is_feasible());
}

#[test]
fn unknown_references_are_structural_violations() {
    let store = EntityStore::load(
        vec![Staff::new("a", "A")],
        vec![Demand::new("d", "D", window(8, 9))],
        Constraint::default_set(),
    )
    .unwrap();
    let plan = Plan::new(vec![assign("ghost", "d"), assign("a", "d"), assign("a", "d")]);
    let v = evaluate_plan(&store, store.constraints(), &plan);

    let capacity: Vec<_> = v.hard().filter(|v| v.kind == ConstraintKind::Capacity).collect();
    assert!(capacity.iter().any(|v| v.detail.contains("unknown staff")));
    assert!(capacity.iter().any(|v| v.detail.contains("duplicate")));
}

#[test]
fn constraints_parse_from_tagged_json() {
    let raw = r#"[
        {"type": "availability"},
        {"type": "skill_match", "penalty": 50},
        {"type": "min_rest", "hours": 11},
        {"type": "fairness"}
    ]"#;
    let parsed: Vec<Constraint> = serde_json::from_str(raw).unwrap();
    assert_eq!(parsed[0].strength(), Strength::Hard);
    assert_eq!(parsed[1].strength(), Strength::Soft(50));
    assert_eq!(parsed[2].kind(), ConstraintKind::MinRest);
    assert!(parsed[2].is_hard());
    assert_eq!(parsed[3], Constraint::Fairness { weight: 10 });
}

#[test]
fn out_of_range_penalties_are_rejected_at_load() {
    let pair = || {
        (
            vec![Staff::new("a", "A")],
            vec![Demand::new("d", "D", window(8, 9)).with_skill("icu")],
        )
    };

    let (staff, demands) = pair();
    let huge = vec![
        Constraint::Availability {
            penalty: Some(i64::MAX / 2 + 1),
        },
        Constraint::SkillMatch {
            penalty: Some(i64::MAX / 2 + 1),
        },
    ];
    let err = EntityStore::load(staff, demands, huge).unwrap_err();
    assert!(matches!(
        err,
        AllocError::Validation(ValidationError::PenaltyOutOfRange {
            constraint: ConstraintKind::Availability,
            ..
        })
    ));

    let (staff, demands) = pair();
    let err = EntityStore::load(staff, demands, vec![Constraint::Fairness { weight: -1 }]).unwrap_err();
    assert!(matches!(
        err,
        AllocError::Validation(ValidationError::PenaltyOutOfRange { value: -1, .. })
    ));

    // à la borne, les deux pénalités s'additionnent sans débordement
    let (staff, demands) = pair();
    let capped = vec![
        Constraint::Availability {
            penalty: Some(MAX_PENALTY),
        },
        Constraint::SkillMatch {
            penalty: Some(MAX_PENALTY),
        },
    ];
    let store = EntityStore::load(staff, demands, capped).unwrap();
    let alloc = turntabl::allocate(&store, turntabl::AllocateOptions::default());
    assert_eq!(alloc.plan.len(), 1);
    assert_eq!(alloc.violations.total_penalty(), 2 * MAX_PENALTY);
}
