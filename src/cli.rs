// Command-line front end for dbpf-merge.
//
// Thin layer over the library: every subcommand loads containers through
// `io`, calls `merge`, and reports. No codec or merge logic lives here.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};

use crate::dbpf::{Container, ResourceKey, SaveOptions};
use crate::io;
use crate::merge::{
    self, MergeEngine, MergeOptions, OutputOptions, SIM_STATE_TYPES, SmartThresholds, Source,
    Strategy, WORLD_TYPES,
};

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// DBPF save-container inspector and merger.
#[derive(Parser, Debug)]
#[command(
    name = "dbpf-merge",
    version,
    about = "Inspect, compare and merge DBPF save containers",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print header, statistics and load warnings for a container.
    Info {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// List every resource.
        #[arg(long)]
        list: bool,
    },
    /// Compare two containers resource by resource.
    Compare {
        #[arg(value_hint = ValueHint::FilePath)]
        newer: PathBuf,
        #[arg(value_hint = ValueHint::FilePath)]
        older: PathBuf,
    },
    /// Merge an older save into a newer one.
    Merge(MergeArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    AddMissing,
    PreferLarger,
    Smart,
    WorkingBase,
    Manual,
}

impl From<StrategyArg> for Strategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::AddMissing => Strategy::AddMissingOnly,
            StrategyArg::PreferLarger => Strategy::PreferLarger,
            StrategyArg::Smart => Strategy::SmartMerge,
            StrategyArg::WorkingBase => Strategy::WorkingBase,
            StrategyArg::Manual => Strategy::Manual,
        }
    }
}

#[derive(clap::Args, Debug)]
struct MergeArgs {
    /// Newer save (Sim progress).
    #[arg(value_hint = ValueHint::FilePath)]
    newer: PathBuf,

    /// Older save (intact world data).
    #[arg(value_hint = ValueHint::FilePath)]
    older: PathBuf,

    /// Output file.
    #[arg(value_hint = ValueHint::FilePath, required_unless_present = "dry_run")]
    output: Option<PathBuf>,

    /// Conflict-resolution strategy.
    #[arg(long, short = 's', value_enum, default_value_t = StrategyArg::AddMissing)]
    strategy: StrategyArg,

    /// Take this key from the older save (TTTTTTTT:GGGGGGGG:IIIIIIIIIIIIIIII).
    #[arg(long = "use-older", value_name = "KEY")]
    use_older: Vec<ResourceKey>,

    /// Take this key from the newer save.
    #[arg(long = "use-newer", value_name = "KEY")]
    use_newer: Vec<ResourceKey>,

    /// Only add these missing keys (default: all).
    #[arg(long = "only-add", value_name = "KEY")]
    only_add: Vec<ResourceKey>,

    /// Do not copy an existing output file aside.
    #[arg(long = "no-backup")]
    no_backup: bool,

    /// Wrap the output in a deflate layer.
    #[arg(long)]
    deflate: bool,

    /// Show what would be merged without writing anything.
    #[arg(long = "dry-run")]
    dry_run: bool,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Info,
    Compare,
    Merge,
    Config,
}

struct Options {
    command: Command,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    list: bool,
    inputs: Vec<PathBuf>,
    output_file: Option<PathBuf>,
    strategy: Strategy,
    merge: MergeOptions,
    backup: bool,
    outer_deflate: bool,
    dry_run: bool,
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        list: false,
        inputs: Vec::new(),
        output_file: None,
        strategy: Strategy::default(),
        merge: MergeOptions::default(),
        backup: true,
        outer_deflate: false,
        dry_run: false,
    };

    match cli.command {
        Cmd::Info { input, list } => {
            opts.command = Command::Info;
            opts.inputs = vec![input];
            opts.list = list;
        }
        Cmd::Compare { newer, older } => {
            opts.command = Command::Compare;
            opts.inputs = vec![newer, older];
        }
        Cmd::Merge(args) => {
            opts.command = Command::Merge;
            opts.inputs = vec![args.newer, args.older];
            opts.output_file = args.output;
            opts.strategy = args.strategy.into();
            // Later flags win when a key is named twice.
            let mut overrides = HashMap::new();
            overrides.extend(args.use_older.into_iter().map(|k| (k, Source::Older)));
            overrides.extend(args.use_newer.into_iter().map(|k| (k, Source::Newer)));
            opts.merge.overrides = overrides;
            if !args.only_add.is_empty() {
                opts.merge.only_add = Some(args.only_add.into_iter().collect::<HashSet<_>>());
            }
            opts.backup = !args.no_backup;
            opts.outer_deflate = args.deflate;
            opts.dry_run = args.dry_run;
        }
        Cmd::Config => {}
    }
    opts
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("dbpf-merge".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

fn print_json(value: &serde_json::Value) {
    if let Ok(text) = serde_json::to_string_pretty(value) {
        eprintln!("{text}");
    }
}

fn load(path: &std::path::Path) -> Option<Container> {
    match io::load_container(path) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("dbpf-merge: {}: {e}", path.display());
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("dbpf-merge version {version} (Rust)");

    let file_io = cfg!(feature = "file-io") as u8;
    let t = SmartThresholds::default();
    let hex_list = |types: &[u32]| {
        types
            .iter()
            .map(|t| format!("{t:08X}"))
            .collect::<Vec<_>>()
            .join(",")
    };

    eprintln!("FILE_IO={file_io}");
    eprintln!("MIN_COMPRESS_SIZE={}", crate::compress::MIN_COMPRESS_SIZE);
    eprintln!("SMART_WORLD_RATIO={}", t.world_ratio);
    eprintln!("SMART_WORLD_SMALL_NEWER={}", t.world_small_newer);
    eprintln!("SMART_WORLD_SMALL_RATIO={}", t.world_small_ratio);
    eprintln!("SMART_MIN_OLDER={}", t.min_older);
    eprintln!("SMART_SHRINK_PERCENT={}", t.shrink_percent);
    eprintln!("WORLD_TYPES={}", hex_list(WORLD_TYPES));
    eprintln!("SIM_STATE_TYPES={}", hex_list(SIM_STATE_TYPES));

    0
}

// ---------------------------------------------------------------------------
// Info command
// ---------------------------------------------------------------------------

fn cmd_info(opts: &Options) -> i32 {
    let path = &opts.inputs[0];
    let Some(container) = load(path) else {
        return 1;
    };
    let stats = container.statistics();

    if !opts.quiet {
        println!("{}", path.display());
        println!("  version:    {}", stats.version);
        println!("  layout:     {:?}", container.layout());
        println!("  resources:  {}", stats.resource_count);
        println!("  total size: {} bytes", stats.total_size);
        for (name, count) in &stats.type_counts {
            println!("    {name:<20} {count}");
        }
        for warning in container.warnings() {
            println!("  warning: {warning}");
        }
        if opts.list {
            for r in container.resources() {
                println!("  {} {:<20} {:>10}", r.key, r.type_name(), r.len());
            }
        }
    }

    if opts.json_output {
        print_json(&serde_json::json!({
            "command": "info",
            "version": stats.version,
            "resources": stats.resource_count,
            "total_size": stats.total_size,
            "types": stats.type_counts,
            "warnings": container.warnings().len(),
        }));
    }

    0
}

// ---------------------------------------------------------------------------
// Compare command
// ---------------------------------------------------------------------------

fn cmd_compare(opts: &Options) -> i32 {
    let (Some(newer), Some(older)) = (load(&opts.inputs[0]), load(&opts.inputs[1])) else {
        return 1;
    };
    let summary = merge::compare(&newer, &older);
    let by_type = summary.by_type();

    if !opts.quiet {
        println!("only in newer: {}", summary.only_a.len());
        println!("only in older: {}", summary.only_b.len());
        println!("identical:     {}", summary.common_same.len());
        println!("different:     {}", summary.common_different.len());
        for (name, count) in &by_type.only_b {
            println!("  missing from newer: {name:<20} {count}");
        }
        for (newer_info, older_info) in merge::conflicting_resources(&summary, &newer, &older) {
            println!(
                "  differs: {} {:<20} newer {:>8} older {:>8}",
                newer_info.key, newer_info.type_name, newer_info.size, older_info.size
            );
        }
        let candidates =
            merge::smart_candidates(&summary, &newer, &older, &MergeOptions::default());
        for c in &candidates {
            println!("  smart-merge candidate: {c}");
        }
    }

    if opts.json_output {
        print_json(&serde_json::json!({
            "command": "compare",
            "only_newer": summary.only_a.len(),
            "only_older": summary.only_b.len(),
            "same": summary.common_same.len(),
            "different": summary.common_different.len(),
            "only_newer_by_type": by_type.only_a,
            "only_older_by_type": by_type.only_b,
            "different_by_type": by_type.common_different,
        }));
    }

    0
}

// ---------------------------------------------------------------------------
// Merge command
// ---------------------------------------------------------------------------

fn cmd_merge(opts: &Options) -> i32 {
    let (Some(newer), Some(older)) = (load(&opts.inputs[0]), load(&opts.inputs[1])) else {
        return 1;
    };

    let show_progress = opts.verbose > 0 && !opts.quiet;
    let mut engine = MergeEngine::with_progress(|message, percent| {
        if show_progress {
            eprintln!("dbpf-merge: [{percent:>3}%] {message}");
        }
    });

    let (_, result) = match (&opts.output_file, opts.dry_run) {
        (Some(path), false) => engine.merge_to_path(
            &newer,
            &older,
            opts.strategy,
            &opts.merge,
            path,
            &OutputOptions {
                backup: opts.backup,
                save: SaveOptions {
                    outer_deflate: opts.outer_deflate,
                },
            },
        ),
        _ => engine.merge_with(&newer, &older, opts.strategy, &opts.merge),
    };

    if !opts.quiet {
        for warning in &result.warnings {
            eprintln!("dbpf-merge: {warning}");
        }
        let verb = if opts.dry_run { "would merge" } else { "merged" };
        eprintln!(
            "dbpf-merge: {verb} {} resources ({} from newer, {} from older) using {}",
            result.total, result.from_newer, result.from_older, opts.strategy
        );
        if let Some(path) = &result.output {
            eprintln!("dbpf-merge: wrote {}", path.display());
        }
    }
    for error in &result.errors {
        eprintln!("dbpf-merge: error: {error}");
    }

    if opts.json_output {
        let sha256 = result
            .saved
            .as_ref()
            .and_then(|s| s.sha256)
            .map(hex::encode);
        print_json(&serde_json::json!({
            "command": "merge",
            "strategy": opts.strategy.name(),
            "success": result.success,
            "from_newer": result.from_newer,
            "from_older": result.from_older,
            "total": result.total,
            "warnings": result.warnings,
            "errors": result.errors,
            "output_size": result.saved.as_ref().map(|s| s.bytes),
            "sha256": sha256,
        }));
    }

    if result.success { 0 } else { 1 }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    let filter = match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match opts.command {
        Command::Info => cmd_info(&opts),
        Command::Compare => cmd_compare(&opts),
        Command::Merge => cmd_merge(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
