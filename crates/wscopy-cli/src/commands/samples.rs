use tracing::info;
use wscopy_engine::{Concordance, SampleLinker};

use crate::cli::{OutputFormat, SamplesArgs};
use crate::client::{AppContext, CliError, CliResult};
use crate::output::render_link_summary;

pub(crate) async fn handle_samples(
    ctx: &AppContext,
    args: SamplesArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let path = args
        .concordance
        .unwrap_or_else(|| ctx.config.concordance.clone());
    let mut concordance = Concordance::load(&path)
        .await
        .map_err(CliError::failure)?;
    info!(
        path = %path.display(),
        entries = concordance.len(),
        "concordance loaded"
    );

    let linker = SampleLinker::new(
        ctx.source.clone(),
        ctx.target.clone(),
        ctx.link_settings(),
    )
    .with_metrics(ctx.metrics.clone());
    let summary = linker
        .run(&mut concordance)
        .await
        .map_err(CliError::failure)?;
    render_link_summary(&summary, &ctx.metrics.snapshot(), format)
}
