#![forbid(unsafe_code)]
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use turntabl::{
    allocator::{AllocateOptions, Allocator, Coverage, OptimizeFor},
    changes::Change,
    diff, io, reports,
    resolver::ConflictResolver,
    storage::{JsonStorage, Storage, Workspace},
    store::EntityStore,
    Plan,
};
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// CLI d'affectation de personnel (sans base de données)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    /// Fichier JSON de travail (roster + plan validé)
    #[arg(long, global = true, default_value = "turntabl.json")]
    workspace: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Importer du personnel depuis un CSV
    ImportStaff {
        #[arg(long)]
        csv: String,
    },

    /// Importer des besoins depuis un CSV
    ImportDemands {
        #[arg(long)]
        csv: String,
    },

    /// Calculer un plan d'affectation
    Allocate {
        #[arg(long, value_enum)]
        optimize_for: Option<OptimizeFor>,
        /// Autorise les chevauchements pour une même personne
        #[arg(long)]
        allow_overlap: bool,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Enregistre le plan comme plan validé
        #[arg(long)]
        commit: bool,
        #[arg(long)]
        out_csv: Option<String>,
        /// Export CSV des besoins non pourvus
        #[arg(long)]
        underfill_csv: Option<String>,
    },

    /// Vérifier le plan validé
    Check {
        /// Export CSV des conflits (optionnel)
        #[arg(long)]
        report: Option<String>,
    },

    /// Réparer le plan validé après des changements (simulation par défaut)
    Resolve {
        /// Fichier JSON de changements
        #[arg(long)]
        changes: String,
        #[arg(long)]
        commit: bool,
    },

    /// Comparer le plan validé à un plan JSON antérieur
    Diff {
        #[arg(long)]
        against: String,
        #[arg(long)]
        out_csv: Option<String>,
    },

    /// Rapports sur le plan validé
    Report {
        #[arg(value_enum)]
        kind: ReportKind,
        /// Date de référence (YYYY-MM-DD), aujourd'hui par défaut
        #[arg(long)]
        as_of: Option<String>,
        /// Horizon du rapport `ending-soon`, en jours
        #[arg(long, default_value_t = 30)]
        within_days: u32,
        /// Regroupement du rapport `revenue`
        #[arg(long, value_enum, default_value_t = RevenueBy::Demand)]
        by: RevenueBy,
        /// Ignore les affectations et besoins provisoires
        #[arg(long)]
        confirmed_only: bool,
    },

    /// Lister et optionnellement exporter le plan validé
    List {
        #[arg(long)]
        out_json: Option<String>,
        #[arg(long)]
        out_csv: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReportKind {
    Idle,
    Unstaffed,
    Utilization,
    Revenue,
    EndingSoon,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RevenueBy {
    Demand,
    Client,
    Staff,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        let _ = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    }

    let storage = JsonStorage::open(&cli.workspace)?;
    let mut ws = storage.load_or_default()?;

    let code = match cli.cmd {
        Commands::ImportStaff { csv } => {
            let staff = io::import_staff_csv(&csv).with_context(|| format!("importing {csv}"))?;
            let count = staff.len();
            for s in staff {
                Change::StaffUpserted { staff: s }.apply(&mut ws.roster)?;
            }
            storage.save(&ws)?;
            println!("{count} staff imported into {}", storage.path().display());
            0
        }
        Commands::ImportDemands { csv } => {
            let demands =
                io::import_demands_csv(&csv).with_context(|| format!("importing {csv}"))?;
            let count = demands.len();
            for d in demands {
                Change::DemandUpserted { demand: d }.apply(&mut ws.roster)?;
            }
            storage.save(&ws)?;
            println!("{count} demands imported into {}", storage.path().display());
            0
        }
        Commands::Allocate {
            optimize_for,
            allow_overlap,
            max_iterations,
            commit,
            out_csv,
            underfill_csv,
        } => {
            let mut opts = ws.roster.options;
            if let Some(o) = optimize_for {
                opts.optimize_for = o;
            }
            opts.allow_overlap |= allow_overlap;
            if let Some(n) = max_iterations {
                opts.max_search_iterations = n;
            }

            let store = EntityStore::from_roster(&ws.roster)?;
            let allocation = Allocator::new(&store, opts).allocate();
            print_plan(&store, &allocation.plan);
            for u in &allocation.underfilled {
                eprintln!(
                    "underfilled {}: {}/{} ({})",
                    u.demand,
                    u.filled,
                    u.required,
                    u.cause.label()
                );
            }
            for v in allocation.violations.iter() {
                eprintln!("soft {}: {} (penalty {})", v.kind, v.detail, v.penalty());
            }
            if allocation.is_cancelled() {
                eprintln!(
                    "search stopped after {} iterations, plan may not be optimal",
                    allocation.iterations
                );
            }

            if let Some(path) = out_csv {
                io::export_plan_csv(path, &store, &allocation.plan)?;
            }
            if let Some(path) = underfill_csv {
                io::export_underfill_csv(path, &allocation.underfilled)?;
            }
            if commit {
                commit_plan(&mut ws, &store, opts, allocation.plan.clone())?;
                storage.save(&ws)?;
            }

            match allocation.coverage() {
                Coverage::Full => 0,
                // Code 2 = WARNING/INCOMPLETE
                Coverage::Partial { .. } => 2,
            }
        }
        Commands::Check { report } => {
            let plan = committed(&ws)?;
            let store = EntityStore::from_roster(&ws.roster)?;
            let resolver = ConflictResolver::new(&store, ws.roster.options);
            let violations = resolver.validate(plan);
            let conflicts = resolver.conflicts(plan);

            if let Some(path) = report {
                io::export_conflicts_csv(path, &conflicts)?;
            }
            for v in violations.iter() {
                let level = if v.is_hard() { "hard" } else { "soft" };
                eprintln!("{level} {}: {}", v.kind, v.detail);
            }
            if violations.is_feasible() && conflicts.is_empty() {
                println!("OK: no conflicts");
                0
            } else {
                eprintln!(
                    "Found {} hard violation(s), {} conflict(s)",
                    violations.hard().count(),
                    conflicts.len()
                );
                2
            }
        }
        Commands::Resolve { changes, commit } => {
            let changes = io::load_changes_json(&changes)?;
            let plan = ws.committed.clone().unwrap_or_default();
            let opts = ws.roster.options;
            let store = EntityStore::from_roster(&ws.roster)?;
            let repair = ConflictResolver::new(&store, opts).resolve(&plan, &changes)?;

            for c in &changes {
                println!("~ {}", c.describe());
            }
            for a in &repair.removed {
                println!("- {} {}", a.demand, a.staff);
            }
            for a in &repair.added {
                println!("+ {} {}", a.demand, a.staff);
            }
            let partial = matches!(repair.allocation.coverage(), Coverage::Partial { .. });

            if commit {
                let mut roster = repair.store.to_roster();
                roster.options = opts;
                ws.roster = roster;
                commit_plan(&mut ws, &repair.store, opts, repair.plan().clone())?;
                storage.save(&ws)?;
            } else {
                println!("dry run: workspace unchanged");
            }
            if partial {
                2
            } else {
                0
            }
        }
        Commands::Diff { against, out_csv } => {
            let previous = io::load_plan_json(&against)?;
            let current = committed(&ws)?;
            let delta = diff::diff(&previous, current);
            for a in &delta.removed {
                println!("- {} {}", a.demand, a.staff);
            }
            for a in &delta.added {
                println!("+ {} {}", a.demand, a.staff);
            }
            println!(
                "{} added, {} removed, {} unchanged",
                delta.added.len(),
                delta.removed.len(),
                delta.unchanged.len()
            );
            if let Some(path) = out_csv {
                io::export_diff_csv(path, &delta)?;
            }
            0
        }
        Commands::Report {
            kind,
            as_of,
            within_days,
            by,
            confirmed_only,
        } => {
            let store = EntityStore::from_roster(&ws.roster)?;
            let plan = ws.committed.clone().unwrap_or_default();
            let plan = reports::scope(&store, &plan, !confirmed_only);
            let as_of = match as_of {
                Some(raw) => io::parse_date(&raw).context("--as-of")?,
                None => Utc::now().date_naive(),
            };
            match kind {
                ReportKind::Idle => {
                    for s in reports::idle_staff(&store, &plan) {
                        println!("{} | {}", s.id, s.name);
                    }
                }
                ReportKind::Unstaffed => {
                    for d in reports::unstaffed_demands(&store, &plan) {
                        println!(
                            "{} | {} → {} | {}",
                            d.id,
                            d.interval.start.to_rfc3339(),
                            d.interval.end.to_rfc3339(),
                            d.name
                        );
                    }
                }
                ReportKind::Utilization => {
                    for row in reports::utilization(&store, &plan) {
                        let cap = match (row.max_hours, row.hours_ratio()) {
                            (Some(h), Some(pct)) => format!("{h}h ({pct}%)"),
                            _ => "-".into(),
                        };
                        println!(
                            "{} | {} assignment(s) | {}min / {} | prior {}",
                            row.staff, row.assignments, row.minutes, cap, row.prior_assignments
                        );
                    }
                }
                ReportKind::Revenue => {
                    let rows = match by {
                        RevenueBy::Demand => reports::demand_revenue(&store, &plan, as_of),
                        RevenueBy::Client => reports::client_revenue(&store, &plan, as_of),
                        RevenueBy::Staff => reports::staff_revenue(&store, &plan, as_of),
                    };
                    for row in rows {
                        println!(
                            "{} | {} | to date {} | total {}",
                            row.id, row.name, row.to_date, row.total
                        );
                    }
                }
                ReportKind::EndingSoon => {
                    for d in reports::ending_soon(&store, as_of, within_days, !confirmed_only) {
                        println!(
                            "{} | {} | {} | {}",
                            d.id,
                            d.interval.end.to_rfc3339(),
                            d.client.as_deref().unwrap_or("-"),
                            d.status.label()
                        );
                    }
                }
            }
            0
        }
        Commands::List { out_json, out_csv } => {
            let store = EntityStore::from_roster(&ws.roster)?;
            let plan = ws.committed.clone().unwrap_or_default();
            if let Some(path) = out_json {
                io::export_plan_json(path, &plan)?;
            }
            if let Some(path) = out_csv {
                io::export_plan_csv(path, &store, &plan)?;
            }
            print_plan(&store, &plan);
            0
        }
    };

    std::process::exit(code);
}

fn committed(ws: &Workspace) -> Result<&Plan> {
    match ws.committed.as_ref() {
        Some(plan) => Ok(plan),
        None => bail!("no committed plan, run `allocate --commit` first"),
    }
}

/// Refuse tout plan portant une violation dure ; les options validées sont
/// conservées avec le plan.
fn commit_plan(ws: &mut Workspace, store: &EntityStore, opts: AllocateOptions, plan: Plan) -> Result<()> {
    let violations = ConflictResolver::new(store, opts).validate(&plan);
    if !violations.is_feasible() {
        bail!(
            "refusing to commit a plan with {} hard violation(s)",
            violations.hard().count()
        );
    }
    ws.roster.options = opts;
    ws.committed = Some(plan);
    Ok(())
}

// impression compacte
fn print_plan(store: &EntityStore, plan: &Plan) {
    for a in plan.iter() {
        let Some(d) = store.find_demand(&a.demand) else {
            continue;
        };
        println!(
            "{} | {} → {} | {}",
            d.id,
            d.interval.start.to_rfc3339(),
            d.interval.end.to_rfc3339(),
            a.staff
        );
    }
}
