use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use archio::archive::{read_header_info, ArchiveReader};
use archio::strategy::{AccessPattern, IoMethod, IoStrategy, KernelProfile, OpenMode, StrategyConfig};
use archio::Handle;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "archio", version, about = "Adaptive I/O strategies and archive tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Kernel profile: linux or xnu. Defaults to the host.
    #[arg(long = "profile")]
    profile: Option<KernelProfile>,
    /// Large-file threshold in bytes.
    #[arg(long = "threshold")]
    threshold: Option<u64>,
    /// JSON file holding a StrategyConfig.
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the strategy selected for a file.
    Strategy {
        path: PathBuf,
        #[arg(long = "mode", default_value = "read")]
        mode: OpenMode,
        #[arg(long = "pattern", default_value = "seq")]
        pattern: AccessPattern,
        #[arg(long = "expected")]
        expected: Option<u64>,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print an archive's header.
    Inspect {
        archive: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Decode and print archive elements.
    Dump {
        archive: PathBuf,
        #[arg(long = "limit")]
        limit: Option<u64>,
        #[arg(long = "pattern", default_value = "seq")]
        pattern: AccessPattern,
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut out = io::BufWriter::new(io::stdout());
    match cli.command {
        Commands::Strategy {
            path,
            mode,
            pattern,
            expected,
            config,
        } => cmd_strategy(&path, mode, pattern, expected, &load_config(&config)?, &mut out)?,
        Commands::Inspect { archive, config } => cmd_inspect(&archive, &load_config(&config)?, &mut out)?,
        Commands::Dump {
            archive,
            limit,
            pattern,
            config,
        } => cmd_dump(&archive, limit, pattern, &load_config(&config)?, &mut out)?,
    }
    out.flush()?;
    Ok(())
}

fn load_config(args: &ConfigArgs) -> Result<StrategyConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => StrategyConfig::for_host(),
    };
    if let Some(profile) = args.profile {
        config.profile = profile;
    }
    if let Some(threshold) = args.threshold {
        config.large_file_threshold = threshold;
    }
    Ok(config)
}

fn cmd_strategy(
    path: &Path,
    mode: OpenMode,
    pattern: AccessPattern,
    expected: Option<u64>,
    config: &StrategyConfig,
    out: &mut dyn Write,
) -> Result<()> {
    let strategy = IoStrategy::for_path(path, mode, pattern, expected, config)
        .with_context(|| format!("selecting a strategy for {}", path.display()))?;
    writeln!(out, "path:           {}", path.display())?;
    writeln!(out, "mode:           {mode}")?;
    writeln!(out, "pattern:        {pattern}")?;
    writeln!(out, "profile:        {}", config.profile)?;
    writeln!(out, "threshold:      {}", config.large_file_threshold)?;
    write!(out, "{strategy}")?;
    Ok(())
}

/// Opens `path` read-only for archive access. Archive streams do not use
/// direct I/O, so a direct selection falls back to paged reads.
fn open_archive(path: &Path, pattern: AccessPattern, config: &StrategyConfig) -> Result<Handle> {
    let mut strategy = IoStrategy::for_path(path, OpenMode::Read, pattern, None, config)?;
    if strategy.read_method() == Some(IoMethod::Direct) {
        log::info!("archive reads use paged I/O instead of direct I/O");
        strategy.set_read_method(IoMethod::Paged)?;
    }
    Handle::open(path, OpenMode::Read, &strategy).with_context(|| format!("opening {}", path.display()))
}

fn cmd_inspect(path: &Path, config: &StrategyConfig, out: &mut dyn Write) -> Result<()> {
    let handle = open_archive(path, AccessPattern::Sequential, config)?;
    let info = read_header_info(&handle).with_context(|| format!("reading header of {}", path.display()))?;
    let file_size = fs::metadata(path)?.len();

    writeln!(out, "path:           {}", path.display())?;
    writeln!(out, "version:        {}", info.version)?;
    writeln!(out, "byte order:     {}", info.byte_order)?;
    writeln!(out, "schema:         {}", info.schema)?;
    writeln!(out, "header size:    {}", info.header_size())?;
    writeln!(out, "element size:   {}", info.schema.element_size())?;
    writeln!(out, "elements:       {}", info.element_count)?;
    writeln!(out, "file size:      {file_size}")?;
    match info.data_size() {
        Some(data_size) if file_size < data_size => {
            writeln!(out, "warning:        file is {} bytes shorter than its header declares", data_size - file_size)?;
        }
        Some(_) => {}
        None => writeln!(out, "warning:        element count exceeds any possible file size")?,
    }
    Ok(())
}

fn cmd_dump(
    path: &Path,
    limit: Option<u64>,
    pattern: AccessPattern,
    config: &StrategyConfig,
    out: &mut dyn Write,
) -> Result<()> {
    let handle = open_archive(path, pattern, config)?;
    let mut reader = ArchiveReader::open_inspected(&handle).with_context(|| format!("opening archive {}", path.display()))?;
    writeln!(out, "# {} ({} elements)", reader.schema(), reader.element_count())?;

    let limit = limit.unwrap_or(u64::MAX);
    let mut index = 0u64;
    while index < limit {
        let Some(element) = reader.next_element()? else {
            break;
        };
        write!(out, "{index}: (")?;
        for (i, value) in element.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            write!(out, "{value}")?;
        }
        writeln!(out, ")")?;
        index += 1;
    }
    Ok(())
}
