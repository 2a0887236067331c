//! xrlevel CLI
//!
//! Command-line interface for inspecting, decoding, batch-checking and
//! re-encoding X-Ray engine level files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use xrlevel_core::CompanionKind;
use xrlevel_parsers::logging::{self, TracingConfig};
use xrlevel_parsers::{
    companion_path, decode_batch, peek_version, BatchReport, DecodedLevel, LevelEncoder, LevelParser,
    ParseOptions, Parser as ParserTrait, SchemaRegistry,
};

/// xrlevel - X-Ray engine level file tool
#[derive(Parser)]
#[command(name = "xrlevel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for structured data
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List supported format versions and their chunk tags
    Versions,

    /// Show the header and section counts of a level
    Info(InfoArgs),

    /// Decode a level and print the document or its diagnostics
    Decode(DecodeArgs),

    /// Decode many levels in parallel
    Batch(BatchArgs),

    /// Decode a level and write it back out for a target version
    Reencode(ReencodeArgs),
}

#[derive(Args)]
struct InfoArgs {
    /// Path to the level file
    path: PathBuf,
}

#[derive(Args)]
struct DecodeArgs {
    /// Path to the level file
    path: PathBuf,

    /// Fail on chunks the schema does not account for
    #[arg(long)]
    strict: bool,

    /// Do not read `level.geomx`
    #[arg(long)]
    no_fastpath: bool,

    /// Print the whole document instead of a summary
    #[arg(long)]
    full: bool,
}

#[derive(Args)]
struct BatchArgs {
    /// Level files to decode
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Fail on chunks the schema does not account for
    #[arg(long)]
    strict: bool,
}

#[derive(Args)]
struct ReencodeArgs {
    /// Path to the source level file
    path: PathBuf,

    /// Target format version
    #[arg(short, long)]
    target: u32,

    /// Output level path; companions are written next to it
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with_config(TracingConfig::default().with_verbosity(cli.verbose));

    match cli.command {
        Commands::Versions => cmd_versions(cli.format),
        Commands::Info(args) => cmd_info(args, cli.format),
        Commands::Decode(args) => cmd_decode(args, cli.format),
        Commands::Batch(args) => cmd_batch(args, cli.format),
        Commands::Reencode(args) => cmd_reencode(args),
    }
}

fn cmd_versions(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let versions: Vec<_> = SchemaRegistry::supported_versions()
                .iter()
                .map(|&v| -> Result<serde_json::Value> {
                    let table = SchemaRegistry::resolve(u32::from(v))?;
                    let tags: serde_json::Map<String, serde_json::Value> = table
                        .entries()
                        .map(|(role, tag)| (role.name().to_string(), tag.into()))
                        .collect();
                    Ok(serde_json::json!({ "version": v, "band": table.band, "tags": tags }))
                })
                .collect::<Result<Vec<_>>>()?;
            println!("{}", serde_json::to_string_pretty(&versions)?);
        }
        OutputFormat::Text => {
            for &v in SchemaRegistry::supported_versions() {
                let table = SchemaRegistry::resolve(u32::from(v))?;
                let tags: Vec<String> = table
                    .entries()
                    .map(|(role, tag)| format!("{role}=0x{tag:X}"))
                    .collect();
                println!("v{:<3} {:<8} {}", v, table.band, tags.join(" "));
            }
        }
    }
    Ok(())
}

fn cmd_info(args: InfoArgs, format: OutputFormat) -> Result<()> {
    let path = &args.path;
    if !path.exists() {
        bail!("File not found: {:?}", path);
    }

    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let (version, quality) = peek_version(&data).context("Failed to read level header")?;
    let companions: Vec<(CompanionKind, bool)> = [CompanionKind::Geom, CompanionKind::Geomx]
        .into_iter()
        .map(|kind| (kind, companion_path(path, kind).is_file()))
        .collect();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "path": path,
                "version": version.get(),
                "quality": quality,
                "size": data.len(),
                "splits_geometry": version.splits_geometry_file(),
                "companions": companions
                    .iter()
                    .map(|(kind, present)| (kind.extension().to_string(), serde_json::Value::from(*present)))
                    .collect::<serde_json::Map<_, _>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Level:    {}", path.display());
            println!("Version:  {version}");
            println!("Quality:  {quality}");
            println!("Size:     {} bytes", data.len());
            for (kind, present) in companions {
                let state = if present { "present" } else { "absent" };
                println!("{:<9} {state}", kind.to_string());
            }
        }
    }
    Ok(())
}

fn decode_file(path: &Path, options: &ParseOptions) -> Result<DecodedLevel> {
    info!("Decoding level: {:?}", path);
    let parser = LevelParser::new();
    logging::instrument_parse(parser.name(), || parser.parse_file_with_options(path, options, None))
        .with_context(|| format!("Failed to decode {}", path.display()))
}

fn cmd_decode(args: DecodeArgs, format: OutputFormat) -> Result<()> {
    let options = ParseOptions {
        strict_unknown_chunks: args.strict,
        decode_fastpath: !args.no_fastpath,
        ..ParseOptions::default()
    };
    let decoded = decode_file(&args.path, &options)?;

    match format {
        OutputFormat::Json if args.full => println!("{}", serde_json::to_string_pretty(&decoded)?),
        OutputFormat::Json => {
            let json = serde_json::json!({
                "summary": decoded.document.summary(),
                "diagnostics": decoded.diagnostics,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            let document = &decoded.document;
            let summary = document.summary();
            println!("Version:        {}", document.version);
            println!("Shaders:        {}", summary.shaders);
            if document.textures.is_some() {
                println!("Textures:       {}", summary.textures);
            }
            println!("Vertex buffers: {}", summary.vertex_buffers);
            println!("Index buffers:  {}", summary.index_buffers);
            println!("Visuals:        {} ({} roots)", summary.visuals, document.visuals.roots.len());
            println!("Sectors:        {}", summary.sectors);
            println!("Portals:        {}", summary.portals);
            println!("Glows:          {}", summary.glows);
            println!("Dynamic lights: {}", summary.lights);
            if summary.fastpath {
                println!("Fast path:      present");
            }
            if document.cform.is_some() {
                println!("CFORM:          {} bytes", summary.cform_bytes);
            }
            if args.full {
                for sector in &document.sectors {
                    println!("  {} root={} portals={:?}", sector.name(), sector.root.0, sector.portals);
                }
            }
            for diagnostic in decoded.diagnostics.iter() {
                println!("warning: {diagnostic}");
            }
        }
    }
    Ok(())
}

fn cmd_batch(args: BatchArgs, format: OutputFormat) -> Result<()> {
    let options = ParseOptions {
        strict_unknown_chunks: args.strict,
        ..ParseOptions::default()
    };
    let outcomes = decode_batch(&LevelParser::new(), &args.paths, &options, None);
    let report = BatchReport::from_outcomes(&outcomes);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("Decoded:     {}", report.decoded);
            println!("Failed:      {}", report.failures.len());
            println!("Diagnostics: {}", report.diagnostics);
            println!("Total time:  {:.2?}", report.total_time);
            for (path, error) in &report.failures {
                println!("  {}: {error}", path.display());
            }
        }
    }

    if !report.is_success() {
        bail!("{} of {} levels failed to decode", report.failures.len(), args.paths.len());
    }
    Ok(())
}

fn cmd_reencode(args: ReencodeArgs) -> Result<()> {
    let decoded = decode_file(&args.path, &ParseOptions::default())?;
    let encoded = LevelEncoder::encode(&decoded.document, args.target)
        .with_context(|| format!("Cannot encode {} as v{}", args.path.display(), args.target))?;

    let write = |path: &Path, bytes: &[u8]| -> Result<()> {
        fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {} bytes to {:?}", bytes.len(), path);
        Ok(())
    };
    write(&args.output, &encoded.level)?;
    if let Some(geom) = &encoded.geom {
        write(&companion_path(&args.output, CompanionKind::Geom), geom)?;
    }
    if let Some(geomx) = &encoded.geomx {
        write(&companion_path(&args.output, CompanionKind::Geomx), geomx)?;
    }

    println!(
        "Re-encoded {} from {} to v{}",
        args.path.display(),
        decoded.document.version,
        args.target
    );
    Ok(())
}
