use wscopy_engine::{Migrator, ProfileRegistry};

use crate::cli::OutputFormat;
use crate::client::{AppContext, CliError, CliResult};
use crate::output::render_plan;

pub(crate) async fn handle_plan(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let migrator = Migrator::new(
        ctx.source.clone(),
        ctx.target.clone(),
        ProfileRegistry::builtin(),
        ctx.migration_settings(),
    );
    let plan = migrator.plan().await.map_err(CliError::failure)?;
    render_plan(&plan, format)
}
