//! yacht-maint
//!
//! Command-line front end for the fleet maintenance core.

use anyhow::{Result, anyhow};
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use yacht_maintenance::cli::{Cli, Command, seed};
use yacht_maintenance::config::{Backend, Config};
use yacht_maintenance::error::ActionError;
use yacht_maintenance::fleet::{Fleet, MeasurementInput, SaveOutcome};
use yacht_maintenance::format::{
    OutputFormat, format_delta_markdown, format_engineers_markdown, format_forest_markdown,
    format_result_markdown, format_yacht_tasks_markdown, format_yachts_markdown, to_json,
};
use yacht_maintenance::guard::ViewScope;
use yacht_maintenance::logging::{self, LogTarget};
use yacht_maintenance::store::{DataStore, MemoryStore, SqliteStore};
use yacht_maintenance::toggle::{ReplaceOutcome, ToggleOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, warnings) = match &cli.config {
        Some(path) => {
            let mut config = Config::load(path)?;
            let warnings = config.apply_overrides(|key| std::env::var(key).ok());
            (config, warnings)
        }
        None => Config::load_or_default(),
    };

    // Initialize logging based on --log option
    let directive = logging::default_directive(&config.logging.level, cli.verbose);
    logging::init(&LogTarget::parse(&cli.log), &directive)?;
    for warning in &warnings {
        warn!("{}", warning);
    }

    // Override paths from CLI arguments
    if let Some(db_path) = &cli.database {
        config.store.db_path = db_path.into();
        config.store.backend = Backend::Sqlite;
    }

    let format = OutputFormat::from_str(&cli.format)
        .ok_or_else(|| anyhow!("unknown output format: {}", cli.format))?;

    match config.store.backend {
        Backend::Sqlite => {
            config.ensure_db_dir()?;
            info!(path = %config.store.db_path.display(), "Opening SQLite store");
            let store = SqliteStore::open(&config.store.db_path)?;
            run(Fleet::new(Arc::new(store)), cli.command, format).await
        }
        Backend::Memory => {
            let store = MemoryStore::new();
            // Nothing persists, so start from the demo fleet.
            if !matches!(cli.command, Command::Seed) {
                seed::seed(&store).await?;
            }
            run(Fleet::new(Arc::new(store)), cli.command, format).await
        }
    }
}

fn emit(format: OutputFormat, json: serde_json::Result<String>, markdown: String) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", json?),
        OutputFormat::Markdown => print!("{}", markdown),
    }
    Ok(())
}

async fn run<S: DataStore>(fleet: Fleet<S>, command: Command, format: OutputFormat) -> Result<()> {
    debug!(?command, "Running command");
    match command {
        Command::Yachts { engineer } => {
            let yachts = match engineer {
                Some(id) => fleet.assigned_yachts(&id).await?,
                None => fleet.list_yachts().await?,
            };
            emit(format, to_json(&yachts), format_yachts_markdown(&yachts))?;
        }
        Command::Engineers { yacht } => {
            let assigned = fleet.yacht_engineers(&yacht, ViewScope::new()).await?;
            let engineers: Vec<_> = fleet
                .list_engineers()
                .await?
                .into_iter()
                .map(|p| {
                    let on = assigned.contains(&p.id);
                    (p, on)
                })
                .collect();
            let json_rows: Vec<_> = engineers
                .iter()
                .map(|(p, on)| json!({"profile": p, "assigned": on}))
                .collect();
            emit(format, to_json(&json_rows), format_engineers_markdown(&engineers))?;
        }
        Command::Assign { engineer, yacht } => {
            let assignments = fleet.engineer_yachts(&engineer, ViewScope::new()).await?;
            let outcome = assignments.toggle(&yacht).await?;
            let message = match outcome {
                ToggleOutcome::Added => format!("Assigned {} to {}\n", engineer, yacht),
                ToggleOutcome::Removed => format!("Unassigned {} from {}\n", engineer, yacht),
                ToggleOutcome::Pending | ToggleOutcome::Detached => "Nothing changed.\n".to_string(),
            };
            emit(format, to_json(&json!({"outcome": outcome})), message)?;
        }
        Command::Tree { yacht, report } => {
            let data = match yacht {
                Some(id) => fleet.load_yacht_task_tree(&id).await?,
                None => fleet.load_task_tree().await?,
            };
            let (forest, drops) = data.assemble_with_report();
            let mut markdown = format_forest_markdown(&forest);
            if report {
                for c in drops.dropped_categories() {
                    markdown.push_str(&format!("\nDropped folder `{}`: {:?}", c.category_id, c.placement));
                }
                for l in drops.dropped_links() {
                    markdown.push_str(&format!(
                        "\nDropped link `{}` -> `{}`: {:?}",
                        l.task_id, l.category_id, l.placement
                    ));
                }
                markdown.push('\n');
            }
            let json = if report {
                to_json(&json!({"forest": forest, "report": drops}))
            } else {
                to_json(&forest)
            };
            emit(format, json, markdown)?;
        }
        Command::YachtTasks { yacht } => {
            let tasks = fleet.yacht_tasks(&yacht).await?;
            emit(format, to_json(&tasks), format_yacht_tasks_markdown(&tasks))?;
        }
        Command::Complete { task, category, undo } => {
            fleet.set_link_completed(&task, &category, !undo).await?;
            let message = if undo {
                format!("Reopened {} in {}\n", task, category)
            } else {
                format!("Completed {} in {}\n", task, category)
            };
            emit(format, to_json(&json!({"completed": !undo})), message)?;
        }
        Command::Categories { task, categories } => {
            let links = fleet.task_categories(&task, ViewScope::new()).await?;
            match links.replace_members(&categories).await? {
                ReplaceOutcome::Applied { delta } => {
                    emit(format, to_json(&delta), format_delta_markdown(&delta))?;
                }
                other => emit(format, to_json(&other), "Nothing changed.\n".to_string())?,
            }
        }
        Command::Record {
            yacht,
            task,
            value,
            level,
        } => {
            let entry = fleet
                .yacht_tasks(&yacht)
                .await?
                .into_iter()
                .find(|t| t.task.id == task)
                .ok_or_else(|| ActionError::not_found("Yacht task", &task))?;
            let sheet = fleet.result_sheet(&yacht, ViewScope::new());
            match sheet.record(&entry, MeasurementInput { value, level }).await? {
                SaveOutcome::Saved { result } => {
                    emit(format, to_json(&result), format_result_markdown(&result))?;
                }
                other => emit(format, to_json(&other), "Nothing saved.\n".to_string())?,
            }
        }
        Command::Results { yacht } => {
            let results = fleet.task_results(&yacht).await?;
            let markdown = results.iter().map(format_result_markdown).collect::<String>();
            emit(format, to_json(&results), markdown)?;
        }
        Command::Seed => {
            let count = seed::seed(fleet.store().as_ref()).await?;
            emit(
                format,
                to_json(&json!({"rows": count})),
                format!("Seeded {} rows\n", count),
            )?;
        }
    }
    Ok(())
}
