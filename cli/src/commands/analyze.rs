use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use std::path::Path;
use trellis_core::{TaskId, TrellisConfig, WorkflowEditor};

use super::{open_editor, open_store};

pub async fn execute(
    config: &TrellisConfig,
    project: &str,
    tasks: &Path,
    format: &str,
) -> Result<()> {
    let store = open_store(config).await?;
    let editor = open_editor(config, &store, project, tasks).await?;

    match format {
        "json" => print_json(&editor)?,
        _ => print_text(&editor),
    }
    Ok(())
}

fn print_json(editor: &WorkflowEditor) -> Result<()> {
    let analysis = editor.analysis();
    let output = json!({
        "project": editor.project_id(),
        "critical_path": analysis.critical_path,
        "parallel_groups": analysis.parallel_groups,
        "bottlenecks": analysis.bottlenecks,
        "statistics": editor.statistics(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_text(editor: &WorkflowEditor) {
    let analysis = editor.analysis();
    let stats = editor.statistics();
    let name = |id: &TaskId| {
        editor
            .task(id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| id.to_string())
    };

    println!(
        "\n{}",
        format!("Workflow analysis: {}", editor.project_id())
            .green()
            .bold()
    );
    println!("{}", "─".repeat(60).dimmed());
    println!(
        "Tasks: {}  Dependencies: {} ({} conditional)  Levels: {}",
        stats.node_count.to_string().cyan(),
        stats.edge_count.to_string().cyan(),
        stats.conditional_edge_count,
        analysis.parallel_groups.len()
    );
    if stats.quarantined_edge_count > 0 {
        println!(
            "{}",
            format!(
                "{} stored dependencies reference unknown tasks and were skipped",
                stats.quarantined_edge_count
            )
            .yellow()
        );
    }

    println!("\n{}", "Critical path".bold());
    if analysis.critical_path.is_empty() {
        println!("  {}", "(empty)".dimmed());
    } else {
        let chain: Vec<String> = analysis.critical_path.iter().map(|id| name(id)).collect();
        println!("  {}", chain.join(" → ").red());
    }

    println!("\n{}", "Parallel groups".bold());
    for (level, group) in analysis.parallel_groups.iter().enumerate() {
        let members: Vec<String> = group.iter().map(|id| name(id)).collect();
        println!("  {} {}", format!("L{}", level).cyan(), members.join(", "));
    }

    println!("\n{}", "Bottlenecks".bold());
    if analysis.bottlenecks.is_empty() {
        println!("  {}", "none".dimmed());
    } else {
        for id in &analysis.bottlenecks {
            let graph = editor.graph();
            println!(
                "  {} ({} in, {} out)",
                name(id).yellow(),
                graph.predecessors(id).len(),
                graph.successors(id).len()
            );
        }
    }
    println!();
}
