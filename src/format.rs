//! Output formatting utilities for markdown and JSON.

use crate::hierarchy::{FolderNode, Forest};
use crate::toggle::MembershipDelta;
use crate::types::{Profile, TaskResult, Yacht, YachtTask};
use serde::Serialize;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

/// Pretty JSON for any serializable result.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

fn checkbox(done: bool) -> &'static str {
    if done { "[x]" } else { "[ ]" }
}

fn push_folder(md: &mut String, folder: &FolderNode<'_>, depth: usize) {
    let indent = "  ".repeat(depth);
    md.push_str(&format!("{}- **{}**\n", indent, folder.name));
    for view in &folder.tasks {
        md.push_str(&format!(
            "{}  - {} {} `{}`\n",
            indent,
            checkbox(view.completed),
            view.task.description,
            view.task.id
        ));
    }
    for child in &folder.children {
        push_folder(md, child, depth + 1);
    }
}

/// Format the folder forest as a nested markdown list.
pub fn format_forest_markdown(forest: &Forest<'_>) -> String {
    let mut md = String::from("# Task folders\n\n");
    if forest.roots.is_empty() {
        md.push_str("_No folders._\n");
    }
    for root in &forest.roots {
        push_folder(&mut md, root, 0);
    }
    if !forest.unassigned.is_empty() {
        md.push_str("\n## Unassigned\n\n");
        for task in &forest.unassigned {
            md.push_str(&format!("- {} `{}`\n", task.description, task.id));
        }
    }
    md
}

pub fn format_yachts_markdown(yachts: &[Yacht]) -> String {
    let mut md = format!("# Yachts ({})\n\n", yachts.len());
    for yacht in yachts {
        md.push_str(&format!("- **{}** `{}`", yacht.name, yacht.id));
        if let Some(ref model) = yacht.make_model {
            md.push_str(&format!(" {}", model));
        }
        if let Some(ref location) = yacht.location {
            md.push_str(&format!(" @ {}", location));
        }
        md.push('\n');
    }
    md
}

/// Format engineers with a mark for those assigned to the yacht.
pub fn format_engineers_markdown(engineers: &[(Profile, bool)]) -> String {
    let mut md = format!("# Engineers ({})\n\n", engineers.len());
    for (profile, assigned) in engineers {
        md.push_str(&format!(
            "- {} {} `{}`\n",
            checkbox(*assigned),
            profile.display_name(),
            profile.id
        ));
    }
    md
}

pub fn format_yacht_tasks_markdown(tasks: &[YachtTask]) -> String {
    let mut md = format!("# Tasks ({})\n\n", tasks.len());
    for entry in tasks {
        let reading = match entry.measurement {
            Some(ref m) if m.unit.is_empty() => m.name.clone(),
            Some(ref m) => format!("{} ({})", m.name, m.unit),
            None => "inspection".to_string(),
        };
        md.push_str(&format!(
            "- [p{}] {} `{}`: {}\n",
            entry.task.priority, entry.task.description, entry.task.id, reading
        ));
    }
    md
}

pub fn format_result_markdown(result: &TaskResult) -> String {
    let mut md = format!("Recorded `{}` for task `{}`", result.id, result.task_id);
    if let Some(value) = result.measured_value {
        md.push_str(&format!(": {}", value));
    }
    if let Some(ref level) = result.measured_level {
        md.push_str(&format!(": {}", level));
    }
    md.push_str(&format!(" at {}\n", result.recorded_at));
    md
}

pub fn format_delta_markdown(delta: &MembershipDelta) -> String {
    if delta.is_empty() {
        return "No changes.\n".to_string();
    }
    let mut md = String::new();
    if !delta.to_add.is_empty() {
        md.push_str(&format!("Added: {}\n", delta.to_add.join(", ")));
    }
    if !delta.to_remove.is_empty() {
        md.push_str(&format!("Removed: {}\n", delta.to_remove.join(", ")));
    }
    md
}
