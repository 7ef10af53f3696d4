//! Display formatting for CLI output
//!
//! Progress and results go to stdout, problems to stderr.

use console::style;
use tasdeploy_core::{Detection, DetectionSource};
use tasdeploy_kube::{ClusterTarget, RemovalFailure, RunReport, Severity, ValidationReport};
use std::fmt::Display;

fn source_label<T>(detection: &Detection<T>) -> String {
    match detection.source {
        DetectionSource::UserSupplied => style("user-supplied").yellow().to_string(),
        DetectionSource::Cluster => style("cluster").green().to_string(),
        DetectionSource::Fallback => style("fallback").dim().to_string(),
    }
}

fn detection_line<T: Display>(label: &str, detection: &Detection<T>) {
    println!(
        "  {:<10} {} ({}, {})",
        label,
        style(&detection.discovered).cyan().bold(),
        source_label(detection),
        detection.reason
    );
}

/// Print the resolved platform and version
pub fn print_target(target: &ClusterTarget) {
    detection_line("platform", &target.platform);
    detection_line("version", &target.version);
}

/// Print what every stage of a run did
pub fn print_run(report: &RunReport, verb: &str) {
    for stage in &report.stages {
        for object in &stage.succeeded {
            println!("  {} {}", style("✓").green(), object);
        }
        for object in &stage.skipped {
            println!("  {} {} {}", style("-").dim(), object, style("(not found)").dim());
        }
        println!(
            "{} {} {}",
            style("✓").green().bold(),
            style(&stage.component).cyan(),
            verb
        );
    }
}

/// Print every removal step that did not complete
pub fn print_removal_failures(failures: &[RemovalFailure]) {
    eprintln!();
    eprintln!("{}", style("Removal failures:").red().bold());
    for failure in failures {
        let component = failure.component.as_deref().unwrap_or("-");
        eprintln!(
            "  {} [{}] {}: {}",
            style("✗").red(),
            style(component).cyan(),
            failure.object,
            failure.message
        );
    }
}

/// Print a validation report grouped as errors then warnings
pub fn print_validation(report: &ValidationReport) {
    println!(
        "{} Checked {} node(s): {}",
        style("→").blue(),
        report.nodes.len(),
        report.nodes.join(", ")
    );

    for result in &report.results {
        let icon = match result.severity {
            Severity::Error => style("✗").red(),
            Severity::Warning => style("⚠").yellow(),
        };
        let node = result
            .node
            .as_deref()
            .map(|n| format!(" on {}", style(n).cyan()))
            .unwrap_or_default();
        println!(
            "  {} {}/{}{}: expected {}, found {}",
            icon,
            result.area,
            result.setting,
            node,
            style(&result.expected).green(),
            style(&result.detected).red()
        );
    }

    let errors = report.errors().count();
    let warnings = report.warnings().count();
    println!();
    if report.is_success() {
        println!(
            "{} Validation passed ({} warning(s))",
            style("✓").green().bold(),
            warnings
        );
    } else {
        println!(
            "{} {} error(s), {} warning(s)",
            style("✗").red().bold(),
            errors,
            warnings
        );
    }
}

/// Print `role  image` rows with aligned columns
pub fn print_images(entries: &[(&str, &str)]) {
    let width = entries.iter().map(|(role, _)| role.len()).max().unwrap_or(0);
    for (role, image) in entries {
        let role = format!("{:<width$}", role, width = width);
        println!("{}  {}", style(role).cyan(), image);
    }
}
