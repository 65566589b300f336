use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use bundlescope::analysis::ExportKey;
use bundlescope::cache::{DiskModuleCache, ModuleSource};
use bundlescope::graph::{CancellationToken, GraphBuilder, LogProgress};
use bundlescope::parser::{LineColumn, ModuleText, PositionIndex, Range, WebpackAst};
use bundlescope::resolve::{ReferenceLocation, WebpackContext};

#[derive(Parser)]
#[command(name = "bundlescope")]
#[command(author = "Zachary Woods <143150513+zach-fau@users.noreply.github.com>")]
#[command(version)]
#[command(about = "Export and reference analysis for webpack bundle modules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a module's export map
    Exports {
        /// Module file
        file: PathBuf,
    },
    /// Print where a module uses an export of another module
    Usages {
        /// Module file to search
        file: PathBuf,
        /// Id of the imported module
        module_id: String,
        /// Export name
        #[arg(required_unless_present = "default")]
        key: Option<String>,
        /// Look for the default export
        #[arg(long, conflicts_with = "key")]
        default: bool,
    },
    /// Scan a module directory into a dependency graph
    Graph {
        #[command(flatten)]
        corpus: CorpusArgs,
    },
    /// Find every reference to the export at a position
    References {
        #[command(flatten)]
        corpus: CorpusArgs,
        /// Id of the module holding the export
        module_id: String,
        /// One-based position, as LINE:COLUMN
        position: String,
    },
}

#[derive(clap::Args)]
struct CorpusArgs {
    /// Directory of <id>.js module files
    #[arg(short, long)]
    modules: PathBuf,

    /// Dependency cache file, written after a full scan
    #[arg(short, long)]
    cache: Option<PathBuf>,

    /// Reuse the cache file instead of scanning
    #[arg(long, requires = "cache")]
    use_cache: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let output = match cli.command {
        Commands::Exports { file } => exports(&file)?,
        Commands::Usages {
            file,
            module_id,
            key,
            default,
        } => {
            let key = match (key, default) {
                (_, true) => ExportKey::Default,
                (Some(name), false) => ExportKey::named(name),
                (None, false) => bail!("an export name or --default is required"),
            };
            usages(&file, &module_id, &key)?
        }
        Commands::Graph { corpus } => graph(&corpus)?,
        Commands::References {
            corpus,
            module_id,
            position,
        } => references(&corpus, &module_id, &position)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_module(file: &Path) -> Result<WebpackAst> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let module = match file.file_stem().and_then(|stem| stem.to_str()) {
        Some(stem) if bundlescope::parser::is_module_id(stem) => ModuleText::with_id(stem, source),
        _ => ModuleText::new(source),
    };
    Ok(WebpackAst::parse(module)?)
}

fn exports(file: &Path) -> Result<Value> {
    let ast = read_module(file)?;
    Ok(json!({
        "module": ast.id(),
        "exports": ast.export_map().to_json(ast.positions()),
    }))
}

fn usages(file: &Path, module_id: &str, key: &ExportKey) -> Result<Value> {
    let ast = read_module(file)?;
    let usages = ast.import_usages(module_id, key)?;
    let ranges: Vec<Value> = usages
        .iter()
        .map(|range| range_json(ast.positions(), *range))
        .collect();
    Ok(json!({ "module": ast.id(), "usages": ranges }))
}

fn build_context(corpus: &CorpusArgs) -> Result<WebpackContext<DiskModuleCache>> {
    let source = DiskModuleCache::new(&corpus.modules);
    let mut builder = GraphBuilder::new(&source).use_cache(corpus.use_cache);
    if let Some(cache) = &corpus.cache {
        builder = builder.cache_file(cache);
    }
    let cache = builder
        .build(&CancellationToken::new(), &mut LogProgress)
        .with_context(|| format!("Failed to scan {}", corpus.modules.display()))?;
    Ok(WebpackContext::new(source, cache))
}

fn graph(corpus: &CorpusArgs) -> Result<Value> {
    let context = build_context(corpus)?;
    let graph = context.graph();
    let cycles: Vec<String> = graph
        .import_cycles()
        .iter()
        .map(|cycle| cycle.cycle_path())
        .collect();

    Ok(json!({
        "modules": graph.module_count(),
        "edges": graph.edge_count(),
        "keyModules": context.key_modules(),
        "importCycles": cycles,
    }))
}

fn references(corpus: &CorpusArgs, module_id: &str, position: &str) -> Result<Value> {
    let position = parse_position(position)?;
    let context = build_context(corpus)?;
    let module = context.source().load(module_id)?;
    let references = context.resolve_at(module, position)?;

    let mut locations = Vec::with_capacity(references.len());
    for ReferenceLocation { module_id, range } in &references {
        let module = context.source().load(module_id)?;
        let positions = PositionIndex::new(module.source());
        let mut location = range_json(&positions, *range);
        location["module"] = json!(module_id);
        locations.push(location);
    }
    Ok(Value::Array(locations))
}

/// `LINE:COLUMN`, both one-based.
fn parse_position(text: &str) -> Result<LineColumn> {
    let (line, column) = text
        .split_once(':')
        .with_context(|| format!("Expected LINE:COLUMN, got {text:?}"))?;
    let line: usize = line.trim().parse().context("Invalid line")?;
    let column: usize = column.trim().parse().context("Invalid column")?;
    if line == 0 || column == 0 {
        bail!("Line and column are one-based");
    }
    Ok(LineColumn {
        line: line - 1,
        column: column - 1,
    })
}

fn range_json(positions: &PositionIndex, range: Range) -> Value {
    let (start, end) = positions.span(range);
    json!({ "start": start, "end": end })
}
