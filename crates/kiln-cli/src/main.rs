use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kiln_config::KilnConfig;
use kiln_enhance::{Build, DirectoryOutput, Enhanced};
use kiln_index::{Index, IndexView, Indexer};
use kiln_types::ClassName;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "kiln", version, about = "Kiln build-time bytecode enhancer")]
struct Cli {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a directory of class files and print the enhancement plan
    Index(IndexArgs),
    /// Print the type arguments a class binds to a generic ancestor
    Resolve(ResolveArgs),
    /// Enhance a directory of class files into an output directory
    Enhance(EnhanceArgs),
}

#[derive(Args)]
struct IndexArgs {
    /// Directory containing `.class` files
    path: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ResolveArgs {
    /// Directory containing `.class` files
    path: PathBuf,
    /// Class to start from (dotted or internal name)
    class: String,
    /// Generic ancestor whose arguments are wanted
    target: String,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct EnhanceArgs {
    /// Directory containing `.class` files
    input: PathBuf,
    /// Directory receiving enhanced and generated classes
    output: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => KilnConfig::load_from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => KilnConfig::default(),
    };
    kiln_config::init_tracing(&config.logging);

    match cli.command {
        Command::Index(args) => {
            let classes = read_classes(&args.path)?;
            let index = index_classes(&classes)?;
            let report = plan_report(&args.path, &index, &config)?;
            if args.json {
                print_json(&report)?;
            } else {
                println!("indexed: {}", report.root.display());
                println!("  classes: {}", report.classes);
                for plan in &report.plan {
                    println!("  {}: {}", plan.class, plan.enhancers.join(", "));
                }
                for slot in &report.storage {
                    println!(
                        "  storage {}: {} -> {} ({})",
                        slot.slot, slot.declaration, slot.generated, slot.value_type
                    );
                }
            }
            Ok(0)
        }
        Command::Resolve(args) => {
            let classes = read_classes(&args.path)?;
            let index = index_classes(&classes)?;
            let report = resolve_report(&index, &config, &args.class, &args.target)?;
            let exit = if report.arguments.is_some() { 0 } else { 1 };
            if args.json {
                print_json(&report)?;
            } else {
                match &report.arguments {
                    Some(arguments) => println!("{}", arguments.join(", ")),
                    None => println!("{} is not a supertype of {}", report.target, report.class),
                }
            }
            Ok(exit)
        }
        Command::Enhance(args) => {
            let classes = read_classes(&args.input)?;
            let index = index_classes(&classes)?;
            let report = enhance(&classes, &index, &config, &args.output)?;
            if args.json {
                print_json(&report)?;
            } else {
                println!("enhanced: {}", report.output.display());
                println!("  classes_read: {}", report.classes_read);
                println!("  enhanced: {}", report.enhanced);
                println!("  generated: {}", report.generated);
            }
            Ok(0)
        }
    }
}

/// Every `.class` file below `root`, in path order.
fn read_classes(root: &Path) -> Result<Vec<(PathBuf, Vec<u8>)>> {
    let mut classes = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("class") {
            continue;
        }
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        classes.push((path.to_path_buf(), bytes));
    }
    tracing::debug!(target = "kiln.index", root = %root.display(), classes = classes.len(), "read class files");
    Ok(classes)
}

fn index_classes(classes: &[(PathBuf, Vec<u8>)]) -> Result<Index> {
    let mut indexer = Indexer::new();
    for (path, bytes) in classes {
        indexer
            .index_class(bytes)
            .with_context(|| format!("failed to index {}", path.display()))?;
    }
    Ok(indexer.complete())
}

#[derive(Debug, Serialize)]
struct PlanReport {
    root: PathBuf,
    classes: usize,
    plan: Vec<ClassPlan>,
    storage: Vec<SlotReport>,
}

#[derive(Debug, Serialize)]
struct ClassPlan {
    class: String,
    enhancers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SlotReport {
    slot: u32,
    declaration: String,
    generated: String,
    value_type: String,
}

fn plan_report(root: &Path, index: &Index, config: &KilnConfig) -> Result<PlanReport> {
    let build = Build::new(index, config)?;
    let plan = build
        .selected()
        .map(|class| ClassPlan {
            class: class.to_string(),
            enhancers: build
                .enhancers_for(class.as_str())
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
        .collect();
    let storage = build
        .storage()
        .slots()
        .iter()
        .map(|slot| SlotReport {
            slot: slot.slot,
            declaration: slot.declaration.to_string(),
            generated: slot.generated.to_string(),
            value_type: slot.value_type.to_string(),
        })
        .collect();
    Ok(PlanReport {
        root: root.to_path_buf(),
        classes: index.len(),
        plan,
        storage,
    })
}

#[derive(Debug, Serialize)]
struct ResolveReport {
    class: String,
    target: String,
    arguments: Option<Vec<String>>,
}

fn resolve_report(index: &Index, config: &KilnConfig, class: &str, target: &str) -> Result<ResolveReport> {
    let class = ClassName::new(class);
    let target = ClassName::new(target);
    if index.class_by_name(class.as_str()).is_none() {
        anyhow::bail!("{class} is not in the index");
    }
    let cx = kiln_enhance::EnhanceContext::new(index, config);
    let arguments = cx
        .resolver()
        .find_arguments_to_super_type(&class, &[], &target)?
        .map(|args| args.iter().map(ToString::to_string).collect());
    Ok(ResolveReport {
        class: class.to_string(),
        target: target.to_string(),
        arguments,
    })
}

#[derive(Debug, Serialize)]
struct EnhanceReport {
    output: PathBuf,
    classes_read: usize,
    enhanced: usize,
    generated: usize,
}

/// Enhances in parallel, then writes only if every class succeeded.
fn enhance(
    classes: &[(PathBuf, Vec<u8>)],
    index: &Index,
    config: &KilnConfig,
    output: &Path,
) -> Result<EnhanceReport> {
    let build = Build::new(index, config)?;
    let enhanced = classes
        .par_iter()
        .map(|(_, bytes)| build.enhance_class(bytes))
        .collect::<Result<Vec<Option<Enhanced>>, _>>()?;
    let enhanced: Vec<Enhanced> = enhanced.into_iter().flatten().collect();

    let sink = DirectoryOutput::new(output);
    let summary = build.finish(enhanced, &sink)?;
    Ok(EnhanceReport {
        output: output.to_path_buf(),
        classes_read: classes.len(),
        enhanced: summary.enhanced,
        generated: summary.generated,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
