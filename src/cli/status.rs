//! Text output for the `status` and `sync` commands.

use crate::cli::{Client, ClientError};
use crate::http::StatusResponse;
use crate::sync::{SyncBatch, SyncOutcome, SyncResult};

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Print a running service's status.
pub fn print_status(server: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::new(server);
    let status = match client.status() {
        Ok(status) => status,
        Err(ClientError::NotRunning(url)) => {
            println!("Service: not running at {}", url);
            return Ok(());
        }
        Err(e) => return Err(Box::new(e)),
    };

    print!("{}", format_status(client.base_url(), &status));
    Ok(())
}

fn format_status(server: &str, status: &StatusResponse) -> String {
    let catalog = &status.catalog;
    let mut out = String::new();

    out.push_str("Service\n");
    out.push_str(&format!("  Server:     {}\n", server));
    out.push_str(&format!("  Catalog:    {}\n", catalog.base_dir));
    out.push('\n');

    out.push_str("Manifest\n");
    out.push_str(&format!("  Cloned:     {}\n", yes_no(catalog.main_repo_initialized)));
    out.push_str(&format!("  repos.json: {}\n", yes_no(catalog.repos_json_exists)));
    out.push_str(&format!("  Repos:      {}\n", catalog.repos_count));
    if let Some(error) = &catalog.manifest_error {
        out.push_str(&format!("  Error:      {}\n", error));
    }

    if !status.syncing.is_empty() {
        out.push('\n');
        out.push_str(&format!("Syncing ({})\n", status.syncing.len()));
        for name in &status.syncing {
            out.push_str(&format!("  {}\n", name));
        }
    }

    out
}

fn format_row(result: &SyncResult) -> String {
    let (outcome, detail) = match &result.outcome {
        SyncOutcome::Cloned => ("cloned", String::new()),
        SyncOutcome::Updated => ("updated", String::new()),
        SyncOutcome::Failed { kind, reason } => ("FAILED", format!("{}: {}", kind.as_str(), reason)),
    };

    format!(
        "{:<32} {:<8} {:>8}  {}",
        result.repository.local_name.as_str(), outcome, result.attempts, detail
    )
    .trim_end()
    .to_string()
}

/// Print a catalog sync as a table, one row per repository.
pub fn print_sync_results(batch: &SyncBatch) {
    println!("{:<32} {:<8} {:>8}  {}", "REPO", "OUTCOME", "ATTEMPTS", "DETAIL");
    println!("{}", "-".repeat(80));

    for result in &batch.results {
        println!("{}", format_row(result));
    }

    println!();
    println!(
        "{} repositories, {} failed{}",
        batch.results.len(),
        batch.failures(),
        if batch.cancelled { ", cancelled" } else { "" }
    );
}
