use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod setup;

/// Toolchain profile artifact pipeline driver.
///
/// Decides whether AFDO profiles and orderfiles need building, packages build
/// outputs, uploads new artifacts and publishes verified ones.
///
/// EXAMPLES:
///     afdo --board eve prepare VerifiedKernelAfdoFile
///     afdo --board eve bundle UnverifiedOrderingFile --output-dir out/
///     afdo --board eve publish VerifiedKernelAfdoFile
///     afdo latest gs://chromeos-prebuilt/afdo-job/llvm --family benchmark
///
/// ENVIRONMENT VARIABLES:
///     AFDO_STORE_ROOT   Serve gs:// URLs from this directory (dry runs)
///     AFDO_JSON         Set to '1' for JSON output by default
///     AFDO_OVERLAY      Descriptor overlay (overrides afdo.toml)
///     RUST_LOG          Log filter (default: info)
#[derive(Parser)]
#[command(name = "afdo")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: setup::GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether an artifact needs to be built
    ///
    /// Prints NEEDED, POINTLESS or UNKNOWN. Verifying artifact types patch
    /// build descriptors when a chroot is given.
    ///
    /// EXAMPLES:
    ///     afdo --board eve prepare VerifiedKernelAfdoFile
    ///     afdo prepare VerifiedOrderingFile --input UnverifiedOrderingFile=gs://bucket/orderfiles
    Prepare(commands::prepare::PrepareArgs),

    /// Package build outputs into a directory
    ///
    /// EXAMPLES:
    ///     afdo --chroot ~/chroot --board eve bundle ChromeClangWarningsFile --output-dir out/
    Bundle(commands::bundle::BundleArgs),

    /// Upload bundled files to the unvetted tier
    ///
    /// EXAMPLES:
    ///     afdo upload UnverifiedOrderingFile out/*.xz
    Upload(commands::upload::UploadArgs),

    /// Promote a verified artifact and update its ledger
    ///
    /// EXAMPLES:
    ///     afdo --board eve publish VerifiedKernelAfdoFile
    Publish(commands::publish::PublishArgs),

    /// Print the newest artifact in a location
    ///
    /// EXAMPLES:
    ///     afdo latest gs://chromeos-prebuilt/afdo-job/cwp/chrome/broadwell --family cwp
    ///     afdo latest gs://chromeos-prebuilt/afdo-job/llvm --family benchmark --branch 77
    Latest(commands::latest::LatestArgs),

    /// Generate shell completion script
    ///
    /// EXAMPLES:
    ///     afdo completions bash > /etc/bash_completion.d/afdo
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Prepare(args) => commands::prepare::run(&cli.global, args),
        Commands::Bundle(args) => commands::bundle::run(&cli.global, args),
        Commands::Upload(args) => commands::upload::run(&cli.global, args),
        Commands::Publish(args) => commands::publish::run(&cli.global, args),
        Commands::Latest(args) => commands::latest::run(&cli.global, args),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "afdo", &mut io::stdout());
            Ok(())
        }
    }
}
