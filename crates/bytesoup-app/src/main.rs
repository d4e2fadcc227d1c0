use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bytesoup_app::{StatusReporter, WorldStats, load_config};
use bytesoup_core::{Assembly, Engine, HookMode, RunSummary, World};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "bytesoup",
    version,
    about = "Run bytesoup worlds and convert code between bytes and assembly"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Populate a world and advance it for a number of runs.
    Run(RunArgs),
    /// Print the assembly listing of a raw code file.
    Disasm {
        /// Raw code bytes; stdin when omitted.
        input: Option<PathBuf>,
        /// JSON config supplying the command band.
        #[arg(short, long, env = "BYTESOUP_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Assemble a listing into raw code bytes.
    Asm {
        /// Assembly listing; stdin when omitted.
        input: Option<PathBuf>,
        /// Destination file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON config supplying the command band.
        #[arg(short, long, env = "BYTESOUP_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON config file; unspecified fields use defaults.
    #[arg(short, long, env = "BYTESOUP_CONFIG")]
    config: Option<PathBuf>,
    /// Number of engine runs to execute.
    #[arg(long, env = "BYTESOUP_RUNS", default_value_t = 100)]
    runs: u64,
    /// RNG seed override.
    #[arg(long, env = "BYTESOUP_SEED")]
    seed: Option<u64>,
    /// Grid width override.
    #[arg(long, env = "BYTESOUP_WIDTH")]
    width: Option<u32>,
    /// Grid height override.
    #[arg(long, env = "BYTESOUP_HEIGHT")]
    height: Option<u32>,
    /// Initial organism count override.
    #[arg(long, env = "BYTESOUP_ORGANISMS")]
    organisms: Option<usize>,
    /// Initial molecule count override.
    #[arg(long, env = "BYTESOUP_MOLECULES")]
    molecules: Option<usize>,
    /// Assembly file used as every seeded organism's code.
    #[arg(long, env = "BYTESOUP_SEED_PROGRAM")]
    seed_program: Option<PathBuf>,
    /// Log a status line every N runs.
    #[arg(long, env = "BYTESOUP_REPORT_EVERY", default_value_t = 10)]
    report_every: u64,
    /// Print the final summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct FinalReport {
    summary: RunSummary,
    stats: WorldStats,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_command(args),
        Command::Disasm { input, config } => disasm_command(input.as_deref(), config.as_deref()),
        Command::Asm {
            input,
            output,
            config,
        } => asm_command(input.as_deref(), output.as_deref(), config.as_deref()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(seed) = args.seed {
        config.rng_seed = Some(seed);
    }
    if let Some(width) = args.width {
        config.world_width = width;
    }
    if let Some(height) = args.height {
        config.world_height = height;
    }
    if let Some(organisms) = args.organisms {
        config.initial_organisms = organisms;
    }
    if let Some(molecules) = args.molecules {
        config.initial_molecules = molecules;
    }
    if let Some(path) = &args.seed_program {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed program {}", path.display()))?;
        config.seed_program = Some(text);
    }

    let mut world = World::new(config).context("invalid world configuration")?;
    world.populate().context("failed to populate world")?;
    let mut engine = Engine::new(world);
    engine
        .hooks_mut()
        .install(Box::new(StatusReporter::new(args.report_every)), HookMode::Chain);

    info!(runs = args.runs, "starting bytesoup run");
    let mut summary = RunSummary::default();
    for _ in 0..args.runs {
        summary = engine.run();
        if summary.organisms == 0 {
            info!(run = summary.run, "population extinct");
            break;
        }
    }

    let report = FinalReport {
        summary,
        stats: WorldStats::collect(engine.world()),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(
            run = report.summary.run,
            organisms = report.stats.organisms,
            molecules = report.stats.molecules,
            max_generation = report.stats.max_generation,
            "finished"
        );
    }
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn assembly_for(config: Option<&Path>) -> Result<Assembly> {
    let config = load_config(config)?;
    config.validate().context("invalid configuration")?;
    Ok(Assembly::new(config.band()))
}

fn disasm_command(input: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let assembly = assembly_for(config)?;
    let code = read_input(input)?;
    print!("{}", assembly.disassemble(&code));
    Ok(())
}

fn asm_command(input: Option<&Path>, output: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let assembly = assembly_for(config)?;
    let text = String::from_utf8(read_input(input)?).context("listing is not valid UTF-8")?;
    let code = assembly.assemble(&text)?;
    if code.is_empty() {
        bail!("listing contains no instructions");
    }
    match output {
        Some(path) => std::fs::write(path, &code)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => std::io::stdout()
            .write_all(&code)
            .context("failed to write stdout")?,
    }
    Ok(())
}
