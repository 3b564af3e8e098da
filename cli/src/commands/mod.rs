pub mod analyze;
pub mod deps;
pub mod init;
pub mod layout;

use anyhow::{Context, Result};
use std::path::Path;
use trellis_core::{
    LayoutEngine, ProjectId, SqliteDependencyStore, Task, TrellisConfig, WorkflowEditor,
};

/// Open the configured database, applying migrations when enabled
pub async fn open_store(config: &TrellisConfig) -> Result<SqliteDependencyStore> {
    let store = SqliteDependencyStore::from_config(&config.storage)
        .await
        .with_context(|| {
            format!(
                "Failed to open database at {}",
                config.storage.database_path().display()
            )
        })?;
    Ok(store)
}

/// Read a JSON array of tasks
pub fn read_tasks(path: &Path) -> Result<Vec<Task>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tasks file {}", path.display()))?;
    let tasks: Vec<Task> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse tasks file {}", path.display()))?;
    Ok(tasks)
}

/// Open an editor on a project, refusing to continue on a degraded load
pub async fn open_editor(
    config: &TrellisConfig,
    store: &SqliteDependencyStore,
    project: &str,
    tasks_path: &Path,
) -> Result<WorkflowEditor> {
    let tasks = read_tasks(tasks_path)?;
    let editor = WorkflowEditor::load(
        store,
        ProjectId::from(project),
        tasks,
        LayoutEngine::new(config.layout),
    )
    .await;

    if let Some(failure) = editor.load_failures().first() {
        anyhow::bail!("{}", failure);
    }
    Ok(editor)
}
