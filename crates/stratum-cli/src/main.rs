//! Stratum CLI
//!
//! Front end over a stored model project:
//! - `init` creates a project directory with a starter schema set
//! - `check` loads a repository and re-validates every structural invariant
//! - `inherit` runs one explicit inheritance pass and saves the result
//! - `stats` prints element/category/property counts

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use stratum_engine::EditingSession;
use stratum_model::{
    Arity, CategorySchema, PropertyDef, PropertyKind, Repository, ScalarKind, SchemaSet,
};
use stratum_storage::ProjectLayout;

#[derive(Parser)]
#[command(name = "stratum")]
#[command(author, version, about = "Structural model engine with property inheritance")]
struct Cli {
    /// Raise log verbosity (overridden by RUST_LOG if set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project directory with a starter schema set.
    Init {
        /// Project directory to create
        dir: PathBuf,
    },

    /// Load a repository and re-check every structural invariant.
    Check {
        /// Project directory
        dir: PathBuf,
    },

    /// Run one inheritance pass over the repository and save the result.
    Inherit {
        /// Project directory
        dir: PathBuf,
        /// Report what the pass would do without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Print repository statistics.
    Stats {
        /// Project directory
        dir: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Init { dir } => init_project(dir),
        Commands::Check { dir } => check_project(dir),
        Commands::Inherit { dir, dry_run } => inherit_project(dir, dry_run),
        Commands::Stats { dir } => stats_project(dir),
    }
}

/// Starter schemas for a fresh project; meant to be replaced by the user's
/// own category definitions.
fn starter_schemas() -> SchemaSet {
    SchemaSet::load(vec![CategorySchema {
        id: "core.Parameters".to_string(),
        name: "Parameters".to_string(),
        properties: vec![
            PropertyDef {
                name: "mass".to_string(),
                kind: PropertyKind::Scalar {
                    scalar: ScalarKind::Float,
                },
            },
            PropertyDef {
                name: "cost".to_string(),
                kind: PropertyKind::Scalar {
                    scalar: ScalarKind::Float,
                },
            },
            PropertyDef {
                name: "labels".to_string(),
                kind: PropertyKind::Array {
                    item: Box::new(PropertyKind::Scalar {
                        scalar: ScalarKind::String,
                    }),
                    arity: Arity::Dynamic,
                },
            },
        ],
    }])
    .expect("starter schemas are well formed")
}

fn init_project(dir: PathBuf) -> anyhow::Result<()> {
    let layout = ProjectLayout::new(&dir);
    if layout.exists() {
        anyhow::bail!("{} already contains a repository", dir.display());
    }
    layout.init()?;
    layout.save(&Repository::new(starter_schemas()))?;
    println!(
        "{} project at {}",
        "created".green().bold(),
        dir.display()
    );
    Ok(())
}

fn check_project(dir: PathBuf) -> anyhow::Result<()> {
    let layout = ProjectLayout::new(&dir);
    let repository = layout
        .load()
        .with_context(|| format!("checking {}", dir.display()))?;
    println!(
        "{} {} elements, {} schemas, all invariants hold",
        "ok".green().bold(),
        repository.len(),
        repository.active_schemas.len()
    );
    Ok(())
}

fn inherit_project(dir: PathBuf, dry_run: bool) -> anyhow::Result<()> {
    let layout = ProjectLayout::new(&dir);
    let mut session = EditingSession::new(layout.load()?);

    let report = session
        .perform_inheritance()
        .context("inheritance pass failed")?;

    let summary = format!(
        "{} elements over {} ranks",
        report.elements_processed, report.ranks
    );
    if report.mismatches.is_empty() {
        println!("{} {summary}", "resolved".green().bold());
    } else {
        println!(
            "{} {summary}, {} categories skipped",
            "resolved".yellow().bold(),
            report.mismatches.len()
        );
        for note in &report.mismatches {
            println!("  {} {}: {}", "skipped".yellow(), note.element, note.detail);
        }
    }

    if dry_run {
        println!("{} nothing saved", "dry-run".cyan());
    } else {
        layout.save(session.repository())?;
    }
    Ok(())
}

fn stats_project(dir: PathBuf) -> anyhow::Result<()> {
    let layout = ProjectLayout::new(&dir);
    let repository = layout.load()?;

    let mut categories = 0usize;
    let mut properties = 0usize;
    let mut edges = 0usize;
    for element in repository.elements() {
        edges += element.supers.len();
        for category in &element.categories {
            let (c, p) = count_instances(category);
            categories += c;
            properties += p;
        }
    }

    println!("{}", "repository".bold());
    println!("  roots:               {}", repository.roots().len());
    println!("  elements:            {}", repository.len());
    println!("  inheritance edges:   {edges}");
    println!("  category instances:  {categories}");
    println!("  property instances:  {properties}");
    println!("  active schemas:      {}", repository.active_schemas.len());
    Ok(())
}

/// `(category instances, property instances)` in a category subtree,
/// nested compositions and array items included.
fn count_instances(category: &stratum_model::CategoryInstance) -> (usize, usize) {
    use stratum_model::PropertyValue;

    fn walk_property(property: &stratum_model::PropertyInstance, cats: &mut usize, props: &mut usize) {
        *props += 1;
        match &property.value {
            PropertyValue::Composition { instance } => walk_category(instance, cats, props),
            PropertyValue::Array { array } => {
                for item in array.iter() {
                    walk_property(item, cats, props);
                }
            }
            _ => {}
        }
    }

    fn walk_category(
        category: &stratum_model::CategoryInstance,
        cats: &mut usize,
        props: &mut usize,
    ) {
        *cats += 1;
        for property in &category.properties {
            walk_property(property, cats, props);
        }
    }

    let (mut cats, mut props) = (0, 0);
    walk_category(category, &mut cats, &mut props);
    (cats, props)
}
