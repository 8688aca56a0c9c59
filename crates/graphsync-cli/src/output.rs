//! Terminal output formatting.

use colored::Colorize;
use graphsync_graph::{GraphCounts, JobSummary, LoadSummary, Statement};

pub fn print_load_summary(summary: &LoadSummary) {
    println!("{}", "Load complete:".green().bold());
    println!("  Nodes merged:         {}", summary.nodes_merged);
    println!("  Relationships merged: {}", summary.relationships_merged);
    println!("  Statements:           {}", summary.statements.to_string().dimmed());
}

pub fn print_job_summary(name: &str, summary: &JobSummary) {
    println!("{} {}", "Job complete:".green().bold(), name.cyan());
    println!("  Statements: {}", summary.statements);
    println!("  Iterations: {}", summary.iterations.to_string().dimmed());
    let affected = if summary.affected == 0 {
        summary.affected.to_string().dimmed()
    } else {
        summary.affected.to_string().yellow()
    };
    println!("  Deleted or updated: {}", affected);
}

/// Print one compiled statement, optionally with its bound parameters.
pub fn print_statement(index: usize, statement: &Statement, show_params: bool) {
    println!(
        "{} {}",
        format!("-- {index}.").dimmed(),
        statement.plan.kind().cyan()
    );
    println!("{};", statement.cypher);
    if show_params && !statement.params.is_empty() {
        for (name, value) in &statement.params {
            println!(
                "{} {} = {}",
                "--".dimmed(),
                format!("${name}").bold(),
                truncate(&value.to_string(), 120)
            );
        }
    }
    println!();
}

pub fn print_counts(counts: &GraphCounts) {
    println!("{}", "Graph Status".bold());
    println!("{}", "─".repeat(30));
    println!("  Nodes:         {}", counts.nodes.to_string().cyan());
    println!("  Relationships: {}", counts.relationships.to_string().cyan());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
