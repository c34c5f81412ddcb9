//! Console output for the arc-fleet CLI.

use colored::{ColoredString, Colorize};

use crate::engine::{ConvergenceReport, NodeStatus};
use crate::graph::{DependencyGraph, ResourceSpec};

/// Leading marker of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Step,
    Done,
    Warn,
    Fail,
}

impl Tone {
    fn marker(self) -> ColoredString {
        match self {
            Self::Step => "→".cyan().bold(),
            Self::Done => "✓".green().bold(),
            Self::Warn => "!".yellow().bold(),
            Self::Fail => "✗".red().bold(),
        }
    }
}

/// Print a heading underlined to its own width.
pub fn heading(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).bright_black());
}

/// Print one status line. Failures go to stderr.
pub fn status(tone: Tone, message: &str) {
    let line = format!("{} {message}", tone.marker());
    if tone == Tone::Fail {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

/// Print an indented output value.
pub fn field(key: &str, value: &str) {
    println!("    {:<24} {value}", key.bright_black());
}

/// Print every node of a planned graph in apply order.
pub fn print_plan(graph: &DependencyGraph) {
    for (position, node) in graph.topological_order().into_iter().enumerate() {
        let target = match &node.spec {
            ResourceSpec::Chart(chart) => {
                format!("{} {}@{}", chart.release, chart.chart.name, chart.chart.version)
            }
            ResourceSpec::Manifest(manifest) => manifest["metadata"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        };
        println!(
            "  {}. {} {} {}",
            (position + 1).to_string().cyan(),
            node.identity.bold(),
            format!("[{}]", node.kind).bright_black(),
            target
        );
        if !node.depends_on.is_empty() {
            let deps: Vec<&str> = node.depends_on.iter().map(String::as_str).collect();
            println!("     {} {}", "after".bright_black(), deps.join(", ").bright_black());
        }
    }
}

/// Print the per-node result of a convergence run.
pub fn print_report(report: &ConvergenceReport) {
    for outcome in &report.outcomes {
        let (tone, detail) = match &outcome.status {
            NodeStatus::Applied => (Tone::Done, String::new()),
            NodeStatus::Failed { cause } => (Tone::Fail, format!(": {cause}")),
            NodeStatus::Blocked { by } => (Tone::Warn, format!(": skipped, {by} unavailable")),
        };
        println!("  {} {}{detail}", tone.marker(), outcome.node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tones_have_distinct_markers() {
        let markers: Vec<String> = [Tone::Step, Tone::Done, Tone::Warn, Tone::Fail]
            .into_iter()
            .map(|tone| tone.marker().input)
            .collect();
        assert_eq!(markers, vec!["→", "✓", "!", "✗"]);
    }
}
