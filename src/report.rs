//! CLI output formatting

use std::fmt::Write;

use crate::balance::BalanceSnapshot;
use crate::money::format_units;
use crate::reconcile::ReconciliationReport;
use crate::workflow::WorkflowRun;

/// One block per bucket, one line per token: `token: amount (wei)`
pub fn format_snapshot(snapshot: &BalanceSnapshot, decimals: u32) -> String {
    if snapshot.is_empty() {
        return "  (no balances)\n".to_string();
    }

    let mut out = String::new();
    for (bucket, tokens) in snapshot.buckets() {
        let _ = writeln!(out, "  {}:", bucket.as_str());
        for token in tokens {
            let _ = writeln!(
                out,
                "    {}: {} ({} wei)",
                token.token_address,
                format_units(&token.amount, decimals),
                token.amount
            );
        }
    }
    out
}

/// Stage table with state, duration and error of each stage
pub fn format_run(run: &WorkflowRun) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {} run {} [{}] in {}ms",
        run.workflow,
        run.run_id,
        run.status,
        run.elapsed.as_millis()
    );
    for stage in &run.stages {
        let duration = stage
            .duration
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_else(|| "-".to_string());
        let _ = write!(out, "    {:<20} {:<10} {:>8}", stage.name, stage.state.as_str(), duration);
        if let Some(e) = &stage.error {
            let _ = write!(out, "  {}", e);
        }
        out.push('\n');
    }
    out
}

pub fn format_reconciliation(report: &ReconciliationReport) -> String {
    let mut out = format_run(&report.run);
    let _ = writeln!(
        out,
        "  spent_refreshed={} receive_refreshed={} generation_triggered={}",
        report.state.spent_refreshed,
        report.state.receive_refreshed,
        report.state.generation_triggered
    );
    for warning in &report.warnings {
        let _ = writeln!(out, "  ⚠️ {}: {}", warning.stage, warning.error);
    }
    out
}
