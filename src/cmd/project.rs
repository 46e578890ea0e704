//! Project setup and inspection: `init`, `status`, `migrate`, `detect`.

use anyhow::{Result, bail};
use console::style;

use specflow::config::SpecflowConfig;
use specflow::init::{init_project, is_initialized};
use specflow::migrate::{
    FormatGeneration, MigrationResult, detect_version, migrate_manifest, preview_manifest_migration,
    preview_state_migration, state::migrate_state_into,
};
use specflow::state::StateStore;

pub fn cmd_init(config: &SpecflowConfig) -> Result<()> {
    let result = init_project(config)?;

    println!();
    if result.created {
        println!("Initialized specflow project in {}", result.ops_dir.display());
    } else {
        println!("Project already initialized at {}", result.ops_dir.display());
    }
    if result.created_files.is_empty() {
        println!("Nothing to create; all artifacts are present.");
    } else {
        println!();
        println!("Created:");
        for file in &result.created_files {
            let shown = file.strip_prefix(&config.paths.root).unwrap_or(file);
            println!("  {}", shown.display());
        }
    }
    println!();
    println!("Next: add phases to ROADMAP.md, then run 'specflow next'.");
    println!();
    Ok(())
}

pub fn cmd_status(config: &SpecflowConfig) -> Result<()> {
    println!();
    println!("Specflow Project Status");
    println!("=======================");
    println!();

    if !is_initialized(&config.paths) {
        println!("Project: Not initialized");
        println!();
        if config.paths.legacy_state.exists() {
            println!("Older state found. Run 'specflow migrate' to upgrade it.");
        } else {
            println!("Run 'specflow init' to initialize the project.");
        }
        println!();
        return Ok(());
    }

    let state = StateStore::new(&config.paths.state).read()?;
    println!("Project: {} ({})", state.project.name, state.project.id);
    println!("Schema:  {}", state.schema_version);
    println!();

    if state.phase.is_active() {
        println!(
            "Phase:   {} {} [{}]",
            state.phase.number.as_deref().unwrap_or_default(),
            state.phase.name.as_deref().unwrap_or_default(),
            state.phase.status
        );
        if let Some(branch) = &state.phase.branch {
            println!("Branch:  {}", branch);
        }
        match state.step.current {
            Some(step) => println!(
                "Step:    {} ({}/4) [{}]",
                step,
                step.index() + 1,
                state.step.status
            ),
            None => println!("Step:    (not started)"),
        }
    } else {
        println!("Phase:   (none active)");
    }
    println!("History: {} completed phase(s)", state.actions.history.len());
    println!();

    let health = &state.health;
    let last = health
        .last_check
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "Health:  {} ({} issue(s), last check {})",
        health.status, health.issue_count, last
    );
    println!();
    Ok(())
}

fn print_result(label: &str, result: &MigrationResult) {
    let marker = if result.success {
        style(result.action.to_string()).green()
    } else {
        style(result.action.to_string()).red()
    };
    println!("{:<10} {}", label, marker);
    for detail in &result.details {
        println!("  - {}", detail);
    }
    if let Some(error) = &result.error {
        println!("  {}", style(error).red());
    }
}

pub fn cmd_migrate(config: &SpecflowConfig, dry_run: bool) -> Result<()> {
    let paths = &config.paths;
    let name = config.project_name();
    let detection = detect_version(paths);

    println!();
    println!(
        "Detected format {} ({} confidence)",
        detection.generation, detection.confidence
    );
    if dry_run {
        println!("{}", style("Dry run: nothing will be written").dim());
    }
    println!();

    let (state, manifest) = if dry_run {
        (
            preview_state_migration(paths, &name),
            preview_manifest_migration(paths, Some(&name)),
        )
    } else {
        (
            migrate_state_into(paths, &config.state_store(), &name),
            migrate_manifest(paths, Some(&name)),
        )
    };
    print_result("state", &state);
    print_result("manifest", &manifest);
    println!();

    if !state.success || !manifest.success {
        bail!("Migration failed");
    }
    Ok(())
}

pub fn cmd_detect(config: &SpecflowConfig, json: bool) -> Result<()> {
    let detection = detect_version(&config.paths);
    if json {
        println!("{}", serde_json::to_string_pretty(&detection)?);
        return Ok(());
    }

    println!();
    println!("Format generation: {}", detection.generation);
    println!("Confidence:        {}", detection.confidence);
    if !detection.indicators.is_empty() {
        println!();
        println!("Indicators:");
        for indicator in &detection.indicators {
            println!(
                "  {:<10} {:<14} {}",
                indicator.source, indicator.generation, indicator.detail
            );
        }
    }
    if detection.needs_migration() {
        println!();
        println!("Run 'specflow migrate' to upgrade to {}.", FormatGeneration::CURRENT);
    }
    println!();
    Ok(())
}
