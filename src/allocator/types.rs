use crate::constraint::ViolationSet;
use crate::model::{DemandId, Plan};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pondération des contraintes souples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeFor {
    Priority,
    Fairness,
    #[default]
    Balanced,
}

impl OptimizeFor {
    /// Multiplicateur appliqué à la priorité des besoins.
    pub fn priority_scale(&self) -> i64 {
        match self {
            OptimizeFor::Priority => 10,
            OptimizeFor::Balanced => 10,
            OptimizeFor::Fairness => 1,
        }
    }

    /// Multiplicateur appliqué au poids d'équité.
    pub fn fairness_scale(&self) -> i64 {
        match self {
            OptimizeFor::Priority => 0,
            OptimizeFor::Balanced => 1,
            OptimizeFor::Fairness => 10,
        }
    }
}

/// Options d'allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocateOptions {
    #[serde(alias = "optimizeFor")]
    pub optimize_for: OptimizeFor,
    #[serde(alias = "allowOverlap")]
    pub allow_overlap: bool,
    #[serde(alias = "maxSearchIterations")]
    pub max_search_iterations: u32,
}

impl Default for AllocateOptions {
    fn default() -> Self {
        Self {
            optimize_for: OptimizeFor::Balanced,
            allow_overlap: false,
            max_search_iterations: 10_000,
        }
    }
}

/// Options de chargement de l'[`EntityStore`](crate::store::EntityStore).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Refuse les besoins exigeant une compétence que personne ne possède.
    pub strict_capabilities: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderfillCause {
    /// Aucun membre actif ne possède les compétences requises.
    NoQualifiedStaff,
    /// Des membres qualifiés existent mais tous sont exclus (disponibilité, charge).
    NoEligibleStaff,
    /// Des candidats existent mais leur capacité est déjà consommée.
    CapacityExhausted,
}

impl UnderfillCause {
    pub fn label(&self) -> &'static str {
        match self {
            UnderfillCause::NoQualifiedStaff => "no_qualified_staff",
            UnderfillCause::NoEligibleStaff => "no_eligible_staff",
            UnderfillCause::CapacityExhausted => "capacity_exhausted",
        }
    }
}

/// Besoin non pourvu en totalité.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Underfill {
    pub demand: DemandId,
    pub required: u32,
    pub filled: u32,
    pub cause: UnderfillCause,
}

impl Underfill {
    pub fn missing(&self) -> u32 {
        self.required.saturating_sub(self.filled)
    }
}

/// Avertissement de couverture partielle (non fatal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    Full,
    Partial { missing: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Completed,
    /// Recherche interrompue ; le plan est le meilleur trouvé jusque-là.
    Cancelled,
}

/// Résultat d'une allocation : jamais une erreur, même partiel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub plan: Plan,
    pub underfilled: Vec<Underfill>,
    /// Violations souples du plan (les dures sont exclues par construction).
    pub violations: ViolationSet,
    pub status: SearchStatus,
    pub iterations: u64,
}

impl Allocation {
    pub fn coverage(&self) -> Coverage {
        let missing: u32 = self.underfilled.iter().map(Underfill::missing).sum();
        if missing == 0 {
            Coverage::Full
        } else {
            Coverage::Partial { missing }
        }
    }

    pub fn filled_headcount(&self) -> usize {
        self.plan.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == SearchStatus::Cancelled
    }
}

/// Jeton d'annulation coopérative, vérifié à chaque itération de recherche.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
