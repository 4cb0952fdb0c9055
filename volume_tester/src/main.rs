use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ssnp_volume::core_modules::compute_boundary::{parse_angle, parse_resolution};
use ssnp_volume::core_modules::container_decoder::ContainerDecoder;
use ssnp_volume::core_modules::interchange_writer;
use ssnp_volume::core_modules::page::PageMetadata;
use ssnp_volume::{CommandProcedure, IngestConfig, OutputType, Session, SimulationParams};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "volume_tester")]
#[command(version)]
#[command(about = "Drives the ssnp_volume pipeline against files on disk", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SSNP_LOG", default_value = "info")]
    log_level: String,

    /// Maximum decoded size of a single page, in bytes
    #[arg(long, global = true)]
    buffer_limit: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the metadata of every page in a container
    Inspect {
        input: PathBuf,
        /// Emit JSON instead of one line per page
        #[arg(long)]
        json: bool,
    },
    /// Write the normalized volume as a (D, H, W) float32 .npy array
    Convert { input: PathBuf, output: PathBuf },
    /// Run an external simulation engine on the volume and save its result
    Simulate {
        input: PathBuf,
        /// Simulation executable, invoked as `<engine> [args..] <input.bin> <output.bin> <params>`
        #[arg(long, env = "SSNP_ENGINE")]
        engine: PathBuf,
        /// Extra leading argument for the engine (repeatable)
        #[arg(long = "engine-arg", allow_hyphen_values = true)]
        engine_args: Vec<String>,
        /// Illumination angle as `x,y` (repeatable)
        #[arg(long = "angle", value_parser = parse_angle, allow_hyphen_values = true)]
        angles: Vec<(f32, f32)>,
        /// Resolution as three comma-separated numbers
        #[arg(long, value_parser = parse_resolution, default_value = "0.1,0.1,0.1")]
        res: [f32; 3],
        /// Numerical aperture
        #[arg(long, default_value_t = 0.65)]
        na: f32,
        /// Background refractive index
        #[arg(long, default_value_t = 1.33)]
        n0: f32,
        /// amplitude, intensity or complex
        #[arg(long, default_value = "intensity")]
        output: OutputType,
        /// Destination of the result array
        #[arg(long, default_value = interchange_writer::DEFAULT_FILE_NAME)]
        out: PathBuf,
    },
}

fn init_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")
}

#[derive(serde::Serialize)]
struct InspectReport<'a> {
    pages: &'a [PageMetadata],
}

async fn inspect(input: PathBuf, json: bool, config: &IngestConfig) -> Result<()> {
    let bytes = tokio::fs::read(&input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let container = ContainerDecoder::with_buffer_limit(config.decoding_buffer_limit)
        .decode(&bytes)
        .with_context(|| format!("decoding {}", input.display()))?;

    let pages: Vec<PageMetadata> = container.pages.into_iter().map(|page| page.metadata).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&InspectReport { pages: &pages })?);
        return Ok(());
    }

    for (index, page) in pages.iter().enumerate() {
        println!(
            "page {index}: {}x{}, {} bits, {} samples/pixel, {}, {}",
            page.width,
            page.height,
            page.bits_per_sample,
            page.samples_per_pixel,
            page.sample_encoding,
            page.photometric_name()
        );
    }
    Ok(())
}

async fn convert(input: PathBuf, output: PathBuf, config: &IngestConfig) -> Result<()> {
    let volume = ssnp_volume::ingest_file(&input, config)
        .await
        .with_context(|| format!("ingesting {}", input.display()))?;
    let bytes = interchange_writer::encode_volume(&volume).context("encoding volume")?;
    tokio::fs::write(&output, bytes)
        .await
        .with_context(|| format!("writing {}", output.display()))?;

    info!(
        depth = volume.depth(),
        height = volume.height(),
        width = volume.width(),
        output = %output.display(),
        "volume written"
    );
    Ok(())
}

async fn simulate(
    input: PathBuf,
    procedure: CommandProcedure,
    params: SimulationParams,
    out: PathBuf,
    config: IngestConfig,
) -> Result<()> {
    let mut session = Session::new(config);
    session
        .ingest_file(&input)
        .await
        .with_context(|| format!("ingesting {}", input.display()))?;

    let output = session
        .run(&procedure, &params.encode())
        .await
        .context("running simulation")?;
    println!("range: [{}, {}]", output.range.min, output.range.max);

    let artifact = session
        .export()
        .context("encoding result")?
        .context("no result to export")?;
    artifact
        .save(&out)
        .await
        .with_context(|| format!("writing {}", out.display()))?;
    info!(output = %out.display(), "result written");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = IngestConfig {
        decoding_buffer_limit: args.buffer_limit,
    };

    match args.command {
        Command::Inspect { input, json } => inspect(input, json, &config).await,
        Command::Convert { input, output } => convert(input, output, &config).await,
        Command::Simulate {
            input,
            engine,
            engine_args,
            angles,
            res,
            na,
            n0,
            output,
            out,
        } => {
            let mut params = SimulationParams {
                resolution: res,
                numerical_aperture: na,
                output_type: output,
                background_index: n0,
                ..SimulationParams::default()
            };
            if !angles.is_empty() {
                params.angles = angles;
            }
            params.validate()?;

            let procedure = CommandProcedure::new(engine).with_args(engine_args);
            simulate(input, procedure, params, out, config).await
        }
    }
}
