/// Dependency management commands
use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use trellis_core::{
    DependencyRecord, DependencyStore, EdgeKind, ProjectId, SaveReport, TaskId, TrellisConfig,
};

use super::{open_editor, open_store, read_tasks};

#[derive(Subcommand)]
pub enum DepsCommands {
    /// List the stored dependencies of a project
    List {
        /// Project identifier
        #[arg(short, long)]
        project: String,

        /// JSON file with the project's tasks, used to show task names
        #[arg(short, long)]
        tasks: Option<PathBuf>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Add or replace a dependency and save the workflow
    Link {
        /// Project identifier
        #[arg(short, long)]
        project: String,

        /// JSON file with the project's tasks
        #[arg(short, long)]
        tasks: PathBuf,

        /// Task that must finish first
        #[arg(long)]
        from: String,

        /// Task that waits
        #[arg(long)]
        to: String,

        /// Condition text; makes the dependency conditional
        #[arg(short, long)]
        condition: Option<String>,
    },

    /// Remove a dependency and save the workflow
    Unlink {
        /// Project identifier
        #[arg(short, long)]
        project: String,

        /// JSON file with the project's tasks
        #[arg(short, long)]
        tasks: PathBuf,

        /// Source task
        #[arg(long)]
        from: String,

        /// Target task
        #[arg(long)]
        to: String,
    },
}

pub async fn execute(config: &TrellisConfig, cmd: &DepsCommands) -> Result<()> {
    match cmd {
        DepsCommands::List {
            project,
            tasks,
            format,
        } => list(config, project, tasks.as_deref(), format).await,
        DepsCommands::Link {
            project,
            tasks,
            from,
            to,
            condition,
        } => link(config, project, tasks, from, to, condition.clone()).await,
        DepsCommands::Unlink {
            project,
            tasks,
            from,
            to,
        } => unlink(config, project, tasks, from, to).await,
    }
}

async fn list(
    config: &TrellisConfig,
    project: &str,
    tasks: Option<&std::path::Path>,
    format: &str,
) -> Result<()> {
    let store = open_store(config).await?;
    let records = store.list_dependencies(&ProjectId::from(project)).await?;

    let names: HashMap<TaskId, String> = match tasks {
        Some(path) => read_tasks(path)?
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect(),
        None => HashMap::new(),
    };

    match format {
        "json" => print_json(&records)?,
        _ => print_table(project, &records, &names),
    }
    Ok(())
}

fn print_table(project: &str, records: &[DependencyRecord], names: &HashMap<TaskId, String>) {
    if records.is_empty() {
        println!("{}", format!("No dependencies for project {}.", project).yellow());
        return;
    }

    let label = |id: &TaskId| match names.get(id) {
        Some(name) => format!("{} ({})", name, id),
        None => id.to_string(),
    };

    println!("\n{}", format!("Dependencies: {}", project).green().bold());
    println!("{}", "─".repeat(100).dimmed());
    println!(
        "{:<36} {:<36} {:<12} {}",
        "FROM".bold(),
        "TO".bold(),
        "KIND".bold(),
        "CONDITION".bold()
    );
    println!("{}", "─".repeat(100).dimmed());

    for record in records {
        let kind = if record.condition.is_some() {
            EdgeKind::Conditional.label().yellow()
        } else {
            EdgeKind::Success.label().green()
        };
        println!(
            "{:<36} {:<36} {:<12} {}",
            label(&record.source_task_id).cyan(),
            label(&record.target_task_id),
            kind.to_string(),
            record.condition.as_deref().unwrap_or("").dimmed()
        );
    }

    println!("{}", "─".repeat(100).dimmed());
    println!("\nTotal: {}", records.len().to_string().cyan());
}

fn print_json(records: &[DependencyRecord]) -> Result<()> {
    let rows: Vec<_> = records
        .iter()
        .map(|r| {
            json!({
                "source_task_id": r.source_task_id,
                "target_task_id": r.target_task_id,
                "condition": r.condition,
                "kind": if r.condition.is_some() { "conditional" } else { "success" },
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn link(
    config: &TrellisConfig,
    project: &str,
    tasks: &std::path::Path,
    from: &str,
    to: &str,
    condition: Option<String>,
) -> Result<()> {
    let store = open_store(config).await?;
    let mut editor = open_editor(config, &store, project, tasks).await?;

    let kind = if condition.as_deref().map_or(false, |c| !c.trim().is_empty()) {
        EdgeKind::Conditional
    } else {
        EdgeKind::Success
    };
    let edge = editor.connect(from.into(), to.into(), kind, condition)?;
    println!(
        "{} {} -> {} ({})",
        "Linked".green().bold(),
        edge.source,
        edge.target,
        edge.kind().label()
    );

    let report = editor.save(&store).await?;
    print_report(&report);
    Ok(())
}

async fn unlink(
    config: &TrellisConfig,
    project: &str,
    tasks: &std::path::Path,
    from: &str,
    to: &str,
) -> Result<()> {
    let store = open_store(config).await?;
    let mut editor = open_editor(config, &store, project, tasks).await?;

    if !editor.remove_dependency(&from.into(), &to.into()) {
        anyhow::bail!("No dependency {} -> {} in project {}", from, to, project);
    }
    println!("{} {} -> {}", "Unlinked".yellow().bold(), from, to);

    let report = editor.save(&store).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SaveReport) {
    println!("{}", report.message());
    if !report.positions_saved {
        println!("{}", "Node positions could not be saved.".yellow());
    }
}
