use anyhow::anyhow;
use tracing::{info, warn};
use wscopy_engine::{Migrator, ProfileRegistry};

use crate::cli::{ObjectsArgs, OutputFormat};
use crate::client::{AppContext, CliError, CliResult};
use crate::output::render_run_summary;

pub(crate) async fn handle_objects(
    ctx: &AppContext,
    args: ObjectsArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let mut settings = ctx.migration_settings();
    settings.continue_on_error |= args.continue_on_error;
    if args.skip_checksums {
        warn!("blob checksum verification disabled");
        settings.verify_checksums = false;
    }

    let migrator = Migrator::new(
        ctx.source.clone(),
        ctx.target.clone(),
        ProfileRegistry::builtin(),
        settings,
    )
    .with_metrics(ctx.metrics.clone());
    let summary = migrator.run().await.map_err(CliError::failure)?;
    info!(
        planned = summary.planned,
        copied = summary.copied.len(),
        failed = summary.failed.len(),
        "object copy finished"
    );
    render_run_summary(&summary, &ctx.metrics.snapshot(), format)?;

    if summary.failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::failure(anyhow!(
            "{} of {} objects failed to copy",
            summary.failed.len(),
            summary.planned
        )))
    }
}
