//! Phase lifecycle plus the roadmap and task views.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use console::style;
use std::fs::OpenOptions;
use std::io::Write;

use super::super::PhaseCommands;
use specflow::config::SpecflowConfig;
use specflow::dag::DagBuilder;
use specflow::parsers::checklist::{CHECKLISTS_DIR, read_checklists};
use specflow::parsers::roadmap::{find_phase, next_open_phase, read_roadmap};
use specflow::parsers::tasks::{TaskProgress, TaskStatus, read_tasks};
use specflow::paths::resolve_active_feature_dir;
use specflow::state::{GateStatus, HistoryEntry, PhaseStatus, StateStore};
use specflow::util::slugify;

pub fn cmd_phase(config: &SpecflowConfig, command: PhaseCommands) -> Result<()> {
    match command {
        PhaseCommands::Start { number } => start_phase(config, number.as_deref()),
        PhaseCommands::Close => close_phase(config),
        PhaseCommands::Gate { status } => record_gate(config, &status),
    }
}

fn start_phase(config: &SpecflowConfig, number: Option<&str>) -> Result<()> {
    let store = config.state_store();
    let state = store.read()?;
    if state.phase.is_active() && state.phase.status != PhaseStatus::Complete {
        bail!(
            "Phase {} is still active. Close it with 'specflow phase close' first.",
            state.phase.number.as_deref().unwrap_or_default()
        );
    }

    let phases = read_roadmap(&config.paths.roadmap)?;
    let row = match number {
        Some(number) => find_phase(&phases, number)
            .with_context(|| format!("Phase {} is not in the roadmap", number))?,
        None => {
            let open: Vec<_> = phases
                .iter()
                .filter(|p| !state.is_phase_archived(&p.number))
                .cloned()
                .collect();
            next_open_phase(&open)
                .and_then(|p| find_phase(&phases, &p.number))
                .context("No open phase left in the roadmap")?
        }
    };
    if state.is_phase_archived(&row.number) {
        bail!("Phase {} is already in history", row.number);
    }

    let branch = format!("{}-{}", row.number, slugify(&row.name));
    let state = store.update(|state| {
        state.start_phase(&row.number, &row.name, Some(&branch), row.has_user_gate);
        if row.has_user_gate {
            state.gates.insert(row.number.clone(), GateStatus::Pending);
        }
    })?;

    println!();
    println!(
        "Started phase {} {}",
        style(&row.number).bold(),
        state.phase.name.as_deref().unwrap_or_default()
    );
    println!("Branch: {}", branch);
    if row.has_user_gate {
        println!("{}", style("This phase ends with a user gate.").yellow());
    }
    println!();
    Ok(())
}

fn append_history(config: &SpecflowConfig, entry: &HistoryEntry) -> Result<()> {
    let path = &config.paths.history_file;
    if !path.exists() {
        return Ok(());
    }
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writeln!(
        file,
        "- {} {} (completed {})",
        entry.phase_number,
        entry.phase_name,
        entry.completed_at.format("%Y-%m-%d")
    )
    .with_context(|| format!("Failed to append to {}", path.display()))
}

fn close_phase(config: &SpecflowConfig) -> Result<()> {
    let store = config.state_store();
    let mut closed = None;
    store.update(|state| closed = state.archive_phase(Utc::now()))?;
    let Some(entry) = closed else {
        bail!("No active phase to close");
    };
    append_history(config, &entry)?;

    println!();
    println!(
        "Closed phase {} {}",
        style(&entry.phase_number).bold(),
        entry.phase_name
    );
    println!("Run 'specflow next' to pick the next phase.");
    println!();
    Ok(())
}

fn record_gate(config: &SpecflowConfig, status: &str) -> Result<()> {
    let gate: GateStatus = status.parse()?;
    let store = config.state_store();
    let state = store.read()?;
    let Some(number) = state.phase.number.clone().filter(|_| state.phase.is_active()) else {
        bail!("No active phase");
    };
    store.update(|state| {
        state.gates.insert(number.clone(), gate);
        if gate == GateStatus::Approved && state.phase.status == PhaseStatus::AwaitingUser {
            state.phase.status = PhaseStatus::InProgress;
        }
    })?;
    println!("Gate for phase {} set to {}", number, gate);
    Ok(())
}

pub fn cmd_roadmap(config: &SpecflowConfig, json: bool) -> Result<()> {
    let phases = read_roadmap(&config.paths.roadmap)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&phases)?);
        return Ok(());
    }

    println!();
    println!("{:<8} {:<30} {:<14} Gate", "Phase", "Name", "Status");
    println!(
        "{:<8} {:<30} {:<14} ----",
        "--------", "------------------------------", "--------------"
    );
    for phase in &phases {
        let gate = match (&phase.verification_gate, phase.has_user_gate) {
            (Some(text), _) => text.clone(),
            (None, true) => "user gate".to_string(),
            (None, false) => String::new(),
        };
        println!(
            "{:<8} {:<30} {:<14} {}",
            phase.number,
            phase.name,
            phase.status.as_str(),
            gate
        );
    }
    println!();
    if let Some(next) = next_open_phase(&phases) {
        println!("Next open phase: {} {}", next.number, next.name);
        println!();
    }
    Ok(())
}

pub fn cmd_tasks(config: &SpecflowConfig, json: bool) -> Result<()> {
    let number = StateStore::new(&config.paths.state)
        .read()
        .ok()
        .and_then(|s| s.phase.number);
    let Some(feature_dir) = resolve_active_feature_dir(&config.paths, number.as_deref()) else {
        bail!("No feature directory found under {}", config.paths.specs_dir.display());
    };
    let tasks_file = feature_dir.join("tasks.md");
    let tasks = read_tasks(&tasks_file)?;
    let progress = TaskProgress::from_tasks(&tasks);
    let graph = DagBuilder::new(&tasks).build();
    let ready = graph.ready_tasks();
    let cycles = graph.find_cycles();
    let unknown = graph.unknown_dependencies();
    let checklists = read_checklists(&feature_dir.join(CHECKLISTS_DIR))?;

    if json {
        let report = serde_json::json!({
            "file": tasks_file,
            "progress": progress,
            "ready": ready,
            "cycles": cycles.iter().map(|c| c.describe()).collect::<Vec<_>>(),
            "unknown_dependencies": unknown,
            "tasks": tasks,
            "checklists": checklists
                .iter()
                .map(|(path, list)| serde_json::json!({"file": path, "checklist": list}))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("Tasks from {}", tasks_file.display());
    println!();
    let mut section: Option<&str> = None;
    for task in &tasks {
        if task.section.as_deref() != section {
            section = task.section.as_deref();
            if let Some(name) = section {
                println!("{}", style(name).bold());
            }
        }
        let marker = match task.status {
            TaskStatus::Done => style("x").green(),
            TaskStatus::Todo => style(" ").dim(),
            TaskStatus::Blocked => style("b").red(),
            TaskStatus::Deferred => style("~").dim(),
        };
        println!("  [{}] {} {}", marker, task.id, task.description);
    }
    println!();
    println!(
        "{} total, {} done, {} todo, {} blocked, {} deferred",
        progress.total, progress.done, progress.todo, progress.blocked, progress.deferred
    );
    if !ready.is_empty() {
        println!("Ready: {}", ready.join(", "));
    }
    for cycle in &cycles {
        println!("{} {}", style("Cycle:").red(), cycle.describe());
    }
    for dep in unknown {
        println!(
            "{} {} depends on unknown {}",
            style("Dangling:").yellow(),
            dep.task,
            dep.missing
        );
    }
    if !checklists.is_empty() {
        println!();
        for (path, list) in &checklists {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            println!(
                "Checklist {} ({:?}): {} of {} open",
                name,
                list.kind,
                list.open_items(),
                list.items().count()
            );
        }
    }
    println!();
    Ok(())
}
