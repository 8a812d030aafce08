#![forbid(unsafe_code)]
//! Turntabl — moteur d'affectation de personnel à des besoins datés.
//!
//! - Instantané validé des entités (personnel, besoins, contraintes).
//! - Contraintes dures et souples, évaluation déterministe.
//! - Allocation par flot à coût minimal, composantes en parallèle.
//! - Réparation incrémentale après changement, diff de plans.
//! - Tout en UTC ; stockage fichiers (JSON/CSV) en dehors du moteur.

pub mod allocator;
pub mod changes;
pub mod constraint;
pub mod diff;
pub mod error;
pub mod io;
pub mod model;
pub mod reports;
pub mod resolver;
pub mod storage;
pub mod store;

pub use allocator::{
    allocate, AllocateOptions, Allocation, Allocator, CancelToken, Coverage, LoadOptions,
    OptimizeFor, SearchStatus, Underfill, UnderfillCause,
};
pub use changes::{apply_all, Change};
pub use constraint::{
    evaluate_pair, evaluate_plan, Constraint, ConstraintKind, ConstraintSet, Strength, Violation,
    ViolationSet, MAX_PENALTY,
};
pub use diff::{diff, PlanDiff};
pub use error::{AllocError, ValidationError};
pub use model::{
    Assignment, Demand, DemandId, Interval, Plan, Roster, Staff, StaffId, Status, Workload,
};
pub use resolver::{Conflict, ConflictKind, ConflictResolver, Repair, Restored};
pub use storage::{JsonStorage, Storage, Workspace};
pub use store::EntityStore;
