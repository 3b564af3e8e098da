use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use trellis_core::{NodeView, TrellisConfig};
use tracing::info;

use super::{open_editor, open_store};

pub async fn execute(
    config: &TrellisConfig,
    project: &str,
    tasks: &Path,
    auto: bool,
    save: bool,
    format: &str,
) -> Result<()> {
    let store = open_store(config).await?;
    let mut editor = open_editor(config, &store, project, tasks).await?;

    if auto {
        info!("Discarding saved positions for project {}", project);
        editor.reset_layout();
    }

    let views = editor.node_views();
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&views)?),
        _ => print_table(project, &views),
    }

    if save {
        let report = editor.save(&store).await?;
        if report.positions_saved {
            println!("{}", "Positions saved.".green());
        } else {
            anyhow::bail!("Positions could not be saved");
        }
    }
    Ok(())
}

fn print_table(project: &str, views: &[NodeView]) {
    if views.is_empty() {
        println!("{}", format!("Project {} has no tasks.", project).yellow());
        return;
    }

    println!("\n{}", format!("Layout: {}", project).green().bold());
    println!("{}", "─".repeat(90).dimmed());
    println!(
        "{:<20} {:<30} {:>10} {:>10}  {}",
        "TASK".bold(),
        "NAME".bold(),
        "X".bold(),
        "Y".bold(),
        "FLAGS".bold()
    );
    println!("{}", "─".repeat(90).dimmed());

    for view in views {
        let mut flags = Vec::new();
        if view.critical {
            flags.push("critical".red().to_string());
        }
        if view.bottleneck {
            flags.push("bottleneck".yellow().to_string());
        }
        let name = if view.name.chars().count() > 28 {
            format!("{}...", view.name.chars().take(25).collect::<String>())
        } else {
            view.name.clone()
        };
        println!(
            "{:<20} {:<30} {:>10.1} {:>10.1}  {}",
            view.task_id.to_string().cyan(),
            name,
            view.position.x,
            view.position.y,
            flags.join(" ")
        );
    }
    println!("{}", "─".repeat(90).dimmed());
}
