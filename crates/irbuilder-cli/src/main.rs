//! IRBuilder round-trip runner
//!
//! The `irbuilder` command reassembles regenerated LLVM IR and checks that
//! it still behaves like the bitcode it was regenerated from.
//!
//! ## Commands
//!
//! - `test32`: Run LLVM 3.2 suites
//! - `test38`: Run LLVM 3.8 suites
//! - `verify`: Verify a single directory
//! - `suites`: List known suites

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use irbuilder_harness::{
    BatchResult, BatchRunner, CancelFlag, CommandCorpusBuilder, ConsoleSummary, CorpusBuilder,
    ExistingCorpus, Lli, LlvmAs, RunConfig, StreamProgress, SuiteDescriptor, SuiteRegistry,
    ToolchainGeneration,
};

#[derive(Parser)]
#[command(name = "irbuilder")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Round-trip verification of regenerated LLVM IR", long_about = None)]
struct Cli {
    /// Show tool output and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// JSON run configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory of the suite caches
    #[arg(long, global = true, env = "IRBUILDER_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Directory searched for llvm-as and lli (repeatable, default: PATH)
    #[arg(long = "tool-dir", global = true)]
    tool_dirs: Vec<PathBuf>,

    /// Kill a tool after this many seconds (0 disables the watchdog)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Write a JSON report of the run to this path
    #[arg(long, global = true)]
    report_json: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the LLVM 3.2 suites (all when none are named)
    Test32 {
        /// Suites to run
        suites: Vec<String>,
    },

    /// Run the LLVM 3.8 suites (all when none are named)
    Test38 {
        /// Suites to run
        suites: Vec<String>,
    },

    /// Verify every artifact below a directory
    Verify {
        /// Directory containing `.out.ll` files and reference bitcode
        dir: PathBuf,

        /// Toolchain generation used for llvm-as and lli
        #[arg(short, long, default_value = "38")]
        generation: ToolchainGeneration,
    },

    /// List the suites of one or both generations
    Suites {
        /// Only list this generation
        #[arg(short, long)]
        generation: Option<ToolchainGeneration>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    irbuilder_harness::init_tracing(cli.json, level);

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Test32 { suites } => {
            cmd_test(
                ToolchainGeneration::Llvm32,
                suites,
                &config,
                cli.report_json.as_deref(),
            )
            .await
        }
        Commands::Test38 { suites } => {
            cmd_test(
                ToolchainGeneration::Llvm38,
                suites,
                &config,
                cli.report_json.as_deref(),
            )
            .await
        }
        Commands::Verify { dir, generation } => {
            cmd_verify(dir, *generation, &config, cli.report_json.as_deref()).await
        }
        Commands::Suites { generation } => cmd_suites(*generation),
    }
}

/// Defaults, then the config file, then command-line overrides.
fn load_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };

    if cli.verbose {
        config.verbose = true;
    }
    if let Some(cache_dir) = &cli.cache_dir {
        config.cache_root = cache_dir.clone();
    }
    if !cli.tool_dirs.is_empty() {
        config.tool_dirs = cli.tool_dirs.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.tool_timeout_secs = secs;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Run the selected registry suites of one generation
async fn cmd_test(
    generation: ToolchainGeneration,
    names: &[String],
    config: &RunConfig,
    report_json: Option<&Path>,
) -> Result<()> {
    let registry = SuiteRegistry::for_generation(generation);
    let suites = registry.select(names)?;

    let corpus: Box<dyn CorpusBuilder> = if config.corpus.is_empty() {
        Box::new(ExistingCorpus)
    } else {
        Box::new(CommandCorpusBuilder::new(config))
    };

    let result = run_batch(generation, &suites, config, corpus.as_ref()).await?;
    finish(generation, &result, report_json)
}

/// Verify one directory as an unnamed suite
async fn cmd_verify(
    dir: &Path,
    generation: ToolchainGeneration,
    config: &RunConfig,
    report_json: Option<&Path>,
) -> Result<()> {
    let dir = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read current directory")?
            .join(dir)
    };
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {}", dir.display());
    }

    let suites = vec![(dir.display().to_string(), SuiteDescriptor::ad_hoc(dir.clone()))];
    let result = run_batch(generation, &suites, config, &ExistingCorpus).await?;
    finish(generation, &result, report_json)
}

async fn run_batch(
    generation: ToolchainGeneration,
    suites: &[(String, SuiteDescriptor)],
    config: &RunConfig,
    corpus: &dyn CorpusBuilder,
) -> Result<BatchResult> {
    let spec = generation.version_spec();
    let assembler = LlvmAs::resolve(&spec, config)
        .await
        .context("Cannot find an assembler")?;
    let interpreter = Lli::resolve(&spec, config)
        .await
        .context("Cannot find an interpreter")?;
    info!(
        assembler = %assembler.tool().display(),
        interpreter = %interpreter.tool().display(),
        generation = %generation,
        "Resolved toolchain"
    );

    let cancel = CancelFlag::new();
    cancel_on_ctrl_c(cancel.clone());

    let runner = BatchRunner::new(generation, config, corpus, &assembler, &interpreter)
        .with_cancel(cancel);

    let mut progress = StreamProgress::stdout();
    let mut summary = ConsoleSummary::stdio();
    let result = runner.run(suites, &mut progress, &mut summary).await?;
    Ok(result)
}

fn cancel_on_ctrl_c(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current artifact");
            cancel.cancel();
        }
    });
}

/// Print the batch summary, write the report, and map failure to an error
fn finish(
    generation: ToolchainGeneration,
    result: &BatchResult,
    report_json: Option<&Path>,
) -> Result<()> {
    if let Some(path) = report_json {
        result
            .to_report(generation)
            .write_json(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    println!();
    println!(
        "{} of {} suites passed (run {})",
        result.passed_count(),
        result.suites.len(),
        result.run_id
    );

    if result.cancelled {
        anyhow::bail!("Round-trip verification interrupted")
    } else if result.success {
        Ok(())
    } else {
        anyhow::bail!("Round-trip verification failed")
    }
}

/// List suite names with their compile targets and cache directories
fn cmd_suites(generation: Option<ToolchainGeneration>) -> Result<()> {
    let generations: Vec<ToolchainGeneration> = match generation {
        Some(g) => vec![g],
        None => ToolchainGeneration::ALL.to_vec(),
    };

    for generation in generations {
        let registry = SuiteRegistry::for_generation(generation);
        println!("LLVM {} ({} suites)", generation, registry.len());
        for (name, descriptor) in registry.iter() {
            println!(
                "  {:<12} {:<14} {}",
                name,
                descriptor.compile_target,
                descriptor.cache_dir.display()
            );
        }
    }
    Ok(())
}
