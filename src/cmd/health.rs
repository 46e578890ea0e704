//! `check` and `next`.

use anyhow::{Result, bail};
use console::style;

use specflow::config::SpecflowConfig;
use specflow::health::{
    HealthContext, HealthReport, Severity, SuggestedAction, apply_fixes, check_health,
};
use specflow::next_action::{DecisionInput, decide};
use specflow::state::HealthStatus;
use specflow::tracker::GitBranchProbe;

fn run_checks(config: &SpecflowConfig) -> HealthReport {
    let probe = GitBranchProbe;
    check_health(&HealthContext::from_config(config, &probe))
}

fn print_report(report: &HealthReport) {
    for issue in &report.issues {
        let label = match issue.severity {
            Severity::Error => style("ERROR").red().bold(),
            Severity::Warning => style("WARN ").yellow(),
            Severity::Info => style("INFO ").dim(),
        };
        let fix = if issue.auto_fixable {
            format!(" {}", style("[fixable]").cyan())
        } else {
            String::new()
        };
        println!("{} {:<26} {}{}", label, issue.code.as_str(), issue.message, fix);
        if let Some(hint) = &issue.fix_hint {
            println!("      {}", style(hint).dim());
        }
    }
    if !report.issues.is_empty() {
        println!();
    }

    let status = match report.status {
        HealthStatus::Ready => style("ready").green().bold(),
        HealthStatus::Warning => style("warning").yellow().bold(),
        _ => style("error").red().bold(),
    };
    println!(
        "Status: {} ({} error(s), {} warning(s), {} info)",
        status,
        report.count(Severity::Error),
        report.count(Severity::Warning),
        report.count(Severity::Info)
    );
    match report.suggested_action() {
        SuggestedAction::RunAutofix => println!("Suggested: specflow check --fix"),
        SuggestedAction::ManualFix => println!("Suggested: resolve the issues above manually"),
        SuggestedAction::Nothing => {}
    }
}

pub fn cmd_check(config: &SpecflowConfig, fix: bool, record: bool, json: bool) -> Result<()> {
    let mut report = run_checks(config);

    if fix {
        let outcomes = apply_fixes(config, &report);
        if !json {
            println!();
            if outcomes.is_empty() {
                println!("No automatic fixes apply.");
            }
            for outcome in &outcomes {
                let marker = if outcome.success {
                    style("fixed ").green()
                } else {
                    style("failed").red()
                };
                println!("{} {:<26} {}", marker, outcome.code.as_str(), outcome.message);
            }
        }
        report = run_checks(config);
    }

    if record && config.paths.state.exists() {
        let snapshot = report.snapshot();
        config.state_store().update(|state| state.health = snapshot)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        print_report(&report);
        println!();
    }

    if report.has_errors() {
        bail!(
            "Health check found {} error(s)",
            report.count(Severity::Error)
        );
    }
    Ok(())
}

pub fn cmd_next(config: &SpecflowConfig, json: bool) -> Result<()> {
    let input = DecisionInput::gather(config, &GitBranchProbe)?;
    let action = decide(&input);

    if json {
        let mut value = serde_json::to_value(&action)?;
        if let Some(command) = action.command() {
            value["command"] = serde_json::Value::String(command);
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("Next: {}", style(&action).bold());
    if let Some(command) = action.command() {
        println!("  {}", style(command).cyan());
    }
    println!();
    Ok(())
}
