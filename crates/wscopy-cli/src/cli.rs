use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::client::{AppContext, CliError, CliResult, init_logging};
use crate::commands::{handle_objects, handle_plan, handle_samples};

const DEFAULT_CONFIG_PATH: &str = "wscopy.yaml";

/// Parse arguments, run the selected command, and return the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn execute(cli: Cli) -> CliResult<()> {
    let config = wscopy_config::load_config(&cli.config).map_err(CliError::from_config)?;
    init_logging(&config, cli.log_level.as_deref(), cli.log_format)?;
    info!(
        command = cli.command.label(),
        config = %cli.config.display(),
        "starting"
    );
    let ctx = AppContext::connect(config)?;
    dispatch(&ctx, cli.command, cli.output).await
}

pub(crate) async fn dispatch(
    ctx: &AppContext,
    command: Command,
    output: OutputFormat,
) -> CliResult<()> {
    match command {
        Command::Plan => handle_plan(ctx, output).await,
        Command::Objects(args) => handle_objects(ctx, args, output).await,
        Command::Samples(args) => handle_samples(ctx, args, output).await,
    }
}

#[derive(Parser)]
#[command(
    name = "wscopy",
    about = "Copy typed workspace objects, their blobs, and their sample links between environments"
)]
pub(crate) struct Cli {
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "WSCOPY_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        help = "Migration configuration file"
    )]
    pub(crate) config: PathBuf,
    #[arg(
        long,
        global = true,
        env = "WSCOPY_LOG_LEVEL",
        help = "Log filter directive; overrides the configuration file"
    )]
    pub(crate) log_level: Option<String>,
    #[arg(long, global = true, env = "WSCOPY_LOG_FORMAT", value_enum)]
    pub(crate) log_format: Option<LogFormatArg>,
    #[arg(
        long = "output",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for run reports"
    )]
    pub(crate) output: OutputFormat,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// List the objects a copy would create, without changing anything.
    Plan,
    /// Copy pending objects of the configured type.
    Objects(ObjectsArgs),
    /// Propagate sample links onto copied objects.
    Samples(SamplesArgs),
}

impl Command {
    const fn label(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Objects(_) => "objects",
            Self::Samples(_) => "samples",
        }
    }
}

#[derive(Args, Default)]
pub(crate) struct ObjectsArgs {
    #[arg(long, help = "Record per-object failures and keep copying")]
    pub(crate) continue_on_error: bool,
    #[arg(long, help = "Skip comparing target blob checksums with the source")]
    pub(crate) skip_checksums: bool,
}

#[derive(Args, Default)]
pub(crate) struct SamplesArgs {
    #[arg(long, help = "Concordance file; overrides the configuration file")]
    pub(crate) concordance: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormatArg {
    Json,
    Pretty,
}

impl From<LogFormatArg> for wscopy_telemetry::LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Json => Self::Json,
            LogFormatArg::Pretty => Self::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use serde_json::json;
    use wscopy_config::parse_config;
    use wscopy_core::ObjectRef;
    use wscopy_telemetry::Metrics;
    use wscopy_test_support::{FakeEnvironment, data_link, sample_record};

    use super::*;

    const SOURCE: u64 = 11;
    const TARGET: u64 = 22;
    const CONTIGS: &[u8] = b">contig_1\nACGT\n";

    fn config(concordance: &std::path::Path) -> Result<wscopy_config::MigrationConfig> {
        let text = format!(
            "
source:
  url: https://source.test/services
  token_file: source.token
target:
  url: https://target.test/services
  token_file: target.token
containers:
  source: {SOURCE}
  target: {TARGET}
object_type: KBaseGenomeAnnotations.Assembly
concordance: {}
",
            concordance.display()
        );
        Ok(parse_config(&text, "test")?)
    }

    struct Fixture {
        source: Arc<FakeEnvironment>,
        target: Arc<FakeEnvironment>,
        ctx: AppContext,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Result<Fixture> {
        let dir = tempfile::tempdir()?;
        let source = FakeEnvironment::new("https://source.test/services");
        let target = FakeEnvironment::new("https://target.test/services");
        source.register_type("KBaseGenomeAnnotations.Assembly-2.0", "assembly-fp");
        target.register_type("KBaseGenomeAnnotations.Assembly-2.0", "assembly-fp");
        let ctx = AppContext {
            config: config(&dir.path().join("concordance.tsv"))?,
            source: source.environment(),
            target: target.environment(),
            metrics: Metrics::new()?,
        };
        Ok(Fixture {
            source,
            target,
            ctx,
            _dir: dir,
        })
    }

    fn assembly(env: &FakeEnvironment, name: &str) -> ObjectRef {
        let hid = env.put_blob("contigs.fa", CONTIGS);
        env.insert_object(
            SOURCE,
            name,
            "KBaseGenomeAnnotations.Assembly-2.0",
            json!({"assembly_id": name, "fasta_handle_ref": hid}),
        )
        .reference
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() -> Result<()> {
        let cli = Cli::try_parse_from([
            "wscopy",
            "samples",
            "--concordance",
            "links.tsv",
            "--config",
            "prod.yaml",
            "--output",
            "json",
        ])?;
        assert_eq!(cli.config, PathBuf::from("prod.yaml"));
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Command::Samples(SamplesArgs { concordance: Some(ref path) }) if path == &PathBuf::from("links.tsv")
        ));
        Ok(())
    }

    #[test]
    fn objects_flags_default_off() -> Result<()> {
        let cli = Cli::try_parse_from(["wscopy", "objects"])?;
        assert_eq!(cli.command.label(), "objects");
        assert!(matches!(
            cli.command,
            Command::Objects(ObjectsArgs {
                continue_on_error: false,
                skip_checksums: false
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn plan_does_not_touch_the_target() -> Result<()> {
        let fx = fixture()?;
        assembly(&fx.source, "contigs_a");
        dispatch(&fx.ctx, Command::Plan, OutputFormat::Json)
            .await
            .map_err(|err| anyhow::anyhow!(err.display_message()))?;
        assert_eq!(fx.target.calls("save_objects"), 0);
        assert_eq!(fx.target.version_count(TARGET), 0);
        Ok(())
    }

    #[tokio::test]
    async fn objects_then_samples_copy_and_link() -> Result<()> {
        let fx = fixture()?;
        let original = assembly(&fx.source, "contigs_a");
        fx.source.add_sample(sample_record("sample-1", 1, "soil"));
        fx.source.add_link(data_link(original, "sample-1", 1, "root"));

        dispatch(
            &fx.ctx,
            Command::Objects(ObjectsArgs::default()),
            OutputFormat::Table,
        )
        .await
        .map_err(|err| anyhow::anyhow!(err.display_message()))?;
        assert_eq!(fx.target.latest(TARGET).len(), 1);

        dispatch(
            &fx.ctx,
            Command::Samples(SamplesArgs::default()),
            OutputFormat::Table,
        )
        .await
        .map_err(|err| anyhow::anyhow!(err.display_message()))?;
        assert_eq!(fx.target.sample_count(), 1);
        assert_eq!(fx.target.links().len(), 1);
        assert_eq!(fx.ctx.metrics.snapshot().links_created, 1);
        Ok(())
    }

    #[tokio::test]
    async fn recorded_failures_exit_as_operational_errors() -> Result<()> {
        let fx = fixture()?;
        assembly(&fx.source, "contigs_a");
        fx.target.corrupt_uploads();
        let result = dispatch(
            &fx.ctx,
            Command::Objects(ObjectsArgs {
                continue_on_error: true,
                skip_checksums: false,
            }),
            OutputFormat::Table,
        )
        .await;
        let err = result.err().ok_or_else(|| anyhow::anyhow!("expected failure"))?;
        assert_eq!(err.exit_code(), 3);
        assert_eq!(fx.target.latest(TARGET).len(), 0);
        Ok(())
    }
}
