//! Task definition files
//!
//! JSON (`.json`) or YAML (`.yml` / `.yaml`), either a bare list or `{tasks: [...]}`:
//!
//! ```json
//! [
//!   {"priority": 1, "payload": {"action": "send_email", "recipient": "a@example.com"}},
//!   {"priority": 5, "payload": {"action": "fetch_data", "entity": "users"}, "scheduledAt": "2030-01-01T00:00:00Z"}
//! ]
//! ```

use std::fs;
use std::path::Path;

use courier_core::domain::NewTask;
use eyre::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TaskFile {
    List(Vec<NewTask>),
    Wrapped { tasks: Vec<NewTask> },
}

impl TaskFile {
    fn into_tasks(self) -> Vec<NewTask> {
        match self {
            TaskFile::List(tasks) | TaskFile::Wrapped { tasks } => tasks,
        }
    }
}

pub fn load_tasks(path: &Path) -> Result<Vec<NewTask>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file {}", path.display()))?;
    parse_tasks(&content, is_yaml(path))
        .with_context(|| format!("Failed to parse task file {}", path.display()))
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml" | "yaml")
    )
}

fn parse_tasks(content: &str, yaml: bool) -> Result<Vec<NewTask>> {
    let file: TaskFile = if yaml {
        serde_yaml::from_str(content)?
    } else {
        serde_json::from_str(content)?
    };
    Ok(file.into_tasks())
}
