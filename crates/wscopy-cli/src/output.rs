//! Output renderers and formatting helpers for CLI commands.

use std::fmt::Write as _;

use anyhow::anyhow;
use serde_json::{Value, json};
use wscopy_engine::{CopyPlan, LinkSummary, RunSummary};
use wscopy_telemetry::MetricsSnapshot;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

pub(crate) fn render_plan(plan: &CopyPlan, format: OutputFormat) -> CliResult<()> {
    println!("{}", format_plan(plan, format)?);
    Ok(())
}

pub(crate) fn render_run_summary(
    summary: &RunSummary,
    metrics: &MetricsSnapshot,
    format: OutputFormat,
) -> CliResult<()> {
    println!("{}", format_run_summary(summary, metrics, format)?);
    Ok(())
}

pub(crate) fn render_link_summary(
    summary: &LinkSummary,
    metrics: &MetricsSnapshot,
    format: OutputFormat,
) -> CliResult<()> {
    println!("{}", format_link_summary(summary, metrics, format)?);
    Ok(())
}

fn format_plan(plan: &CopyPlan, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => to_json(&json!({
            "source_total": plan.source_total,
            "already_copied": plan.already_copied,
            "pending": plan.pending.iter().map(|info| json!({
                "ref": info.reference.to_string(),
                "name": info.name,
                "type": info.type_string.to_string(),
            })).collect::<Vec<_>>(),
        })),
        OutputFormat::Table => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "source objects: {}  already copied: {}  pending: {}",
                plan.source_total,
                plan.already_copied,
                plan.pending.len()
            );
            let _ = write!(out, "{:<16} {:<40} TYPE", "REF", "NAME");
            for info in &plan.pending {
                let _ = write!(
                    out,
                    "\n{:<16} {:<40} {}",
                    info.reference.to_string(),
                    info.name,
                    info.type_string
                );
            }
            Ok(out)
        }
    }
}

fn format_run_summary(
    summary: &RunSummary,
    metrics: &MetricsSnapshot,
    format: OutputFormat,
) -> CliResult<String> {
    match format {
        OutputFormat::Json => to_json(&json!({
            "planned": summary.planned,
            "already_copied": summary.already_copied,
            "copied": summary.copied.iter().map(|copy| json!({
                "source": copy.source.to_string(),
                "target": copy.target.to_string(),
                "name": copy.name,
            })).collect::<Vec<_>>(),
            "failed": summary.failed.iter().map(|failure| json!({
                "object": failure.object.to_string(),
                "stage": failure.stage.map(|stage| stage.as_str()),
                "reason": failure.reason,
            })).collect::<Vec<_>>(),
            "metrics": metrics,
        })),
        OutputFormat::Table => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "planned: {}  already copied: {}  copied: {}  failed: {}",
                summary.planned,
                summary.already_copied,
                summary.copied.len(),
                summary.failed.len()
            );
            for copy in &summary.copied {
                let _ = writeln!(
                    out,
                    "{:<16} -> {:<16} {}",
                    copy.source.to_string(),
                    copy.target.to_string(),
                    copy.name
                );
            }
            for failure in &summary.failed {
                let stage = failure.stage.map_or("-", |stage| stage.as_str());
                let _ = writeln!(
                    out,
                    "FAILED {:<16} [{stage}] {}",
                    failure.object.to_string(),
                    failure.reason
                );
            }
            let _ = write!(
                out,
                "parents copied: {}  parents reused: {}  blobs: {} ({} bytes)  retries: {}",
                metrics.parents_copied,
                metrics.parents_reused,
                metrics.blobs_transferred,
                metrics.bytes_transferred,
                metrics.transport_retries
            );
            Ok(out)
        }
    }
}

fn format_link_summary(
    summary: &LinkSummary,
    metrics: &MetricsSnapshot,
    format: OutputFormat,
) -> CliResult<String> {
    match format {
        OutputFormat::Json => to_json(&json!({
            "objects": summary.objects,
            "samples_copied": summary.samples_copied,
            "samples_reused": summary.samples_reused,
            "links_created": summary.links_created,
            "links_existing": summary.links_existing,
            "skipped": summary.skipped,
            "transport_retries": metrics.transport_retries,
        })),
        OutputFormat::Table => Ok(format!(
            "objects: {}  skipped: {}\nsamples copied: {}  samples reused: {}\nlinks created: {}  links existing: {}  retries: {}",
            summary.objects,
            summary.skipped,
            summary.samples_copied,
            summary.samples_reused,
            summary.links_created,
            summary.links_existing,
            metrics.transport_retries
        )),
    }
}

fn to_json(value: &Value) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use wscopy_core::ObjectRef;
    use wscopy_engine::{CopiedObject, FailedObject, Stage};

    use super::*;

    fn summary() -> RunSummary {
        RunSummary {
            planned: 2,
            already_copied: 1,
            copied: vec![CopiedObject {
                source: ObjectRef::new(11, 3, 1),
                target: ObjectRef::new(22, 1, 1),
                name: "ecoli".into(),
            }],
            failed: vec![FailedObject {
                object: ObjectRef::new(11, 4, 2),
                stage: Some(Stage::TransferBlobs),
                reason: "checksum mismatch".into(),
            }],
        }
    }

    #[test]
    fn run_summary_table_lists_copies_and_failures() -> anyhow::Result<()> {
        let text = format_run_summary(&summary(), &MetricsSnapshot::default(), OutputFormat::Table)
            .map_err(|err| anyhow!(err.display_message()))?;
        assert!(text.starts_with("planned: 2  already copied: 1  copied: 1  failed: 1"));
        assert!(text.contains("11/3/1"));
        assert!(text.contains("-> 22/1/1"));
        assert!(text.contains("FAILED 11/4/2"));
        assert!(text.contains("[transfer_blobs] checksum mismatch"));
        Ok(())
    }

    #[test]
    fn run_summary_json_carries_stage_labels_and_metrics() -> anyhow::Result<()> {
        let metrics = MetricsSnapshot {
            objects_copied: 1,
            ..MetricsSnapshot::default()
        };
        let text = format_run_summary(&summary(), &metrics, OutputFormat::Json)
            .map_err(|err| anyhow!(err.display_message()))?;
        let value: Value = serde_json::from_str(&text)?;
        assert_eq!(value["failed"][0]["stage"], json!("transfer_blobs"));
        assert_eq!(value["copied"][0]["target"], json!("22/1/1"));
        assert_eq!(value["metrics"]["objects_copied"], json!(1));
        Ok(())
    }

    #[test]
    fn link_summary_json_reports_every_counter() -> anyhow::Result<()> {
        let summary = LinkSummary {
            objects: 3,
            samples_copied: 2,
            samples_reused: 1,
            links_created: 3,
            links_existing: 0,
            skipped: 1,
        };
        let text = format_link_summary(&summary, &MetricsSnapshot::default(), OutputFormat::Json)
            .map_err(|err| anyhow!(err.display_message()))?;
        let value: Value = serde_json::from_str(&text)?;
        assert_eq!(value["samples_copied"], json!(2));
        assert_eq!(value["skipped"], json!(1));
        Ok(())
    }
}
