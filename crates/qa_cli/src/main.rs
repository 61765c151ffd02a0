use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use qa_cli::{init_project, load_project_config, IdScope};

mod commands;

use commands::{CommandResult, Context};

#[derive(Parser, Debug)]
#[command(
    name = "qa-cli",
    version,
    about = "Test-case identifier allocation, front-matter lint and traceability"
)]
struct Cli {
    /// Project root holding qa.toml
    #[arg(long, global = true, default_value = ".", value_name = "DIR")]
    root: PathBuf,

    /// Corpus directory (overrides [corpus] root)
    #[arg(long, global = true, value_name = "DIR")]
    corpus: Option<PathBuf>,

    /// Log filter, e.g. `warn`, `debug`, `qa_cli=trace`
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Print machine-readable JSON instead of key=value lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scaffold qa.toml, the corpus directory and the schema extension file
    Init(InitArgs),
    /// Lint one draft and print its normalized form
    Lint(LintArgs),
    /// Lint every case in the corpus
    LintCorpus(LintCorpusArgs),
    /// Suggest the next identifier without reserving it
    SuggestId(SuggestIdArgs),
    /// Persist a draft under a freshly allocated identifier
    Allocate(AllocateArgs),
    /// Build the traceability matrix
    Trace(TraceArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    /// Directory to scaffold (defaults to --root)
    path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct LintArgs {
    /// Draft to lint, or `-` for stdin
    pub input: PathBuf,

    /// Write the normalized document here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub write: Option<PathBuf>,

    /// Do not print the normalized document
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub(crate) struct LintCorpusArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,
}

#[derive(Args, Debug)]
pub(crate) struct ScopeArgs {
    /// Enforce identifier uniqueness per area instead of per application
    #[arg(long)]
    pub area_scoped: bool,
}

impl ScopeArgs {
    pub fn scope_override(&self) -> Option<IdScope> {
        self.area_scoped.then_some(IdScope::Area)
    }
}

#[derive(Args, Debug)]
pub(crate) struct SuggestIdArgs {
    #[arg(long)]
    pub app: String,

    #[arg(long)]
    pub area: Option<String>,

    #[command(flatten)]
    pub scope: ScopeArgs,
}

#[derive(Args, Debug)]
pub(crate) struct AllocateArgs {
    /// Draft to persist, or `-` for stdin
    pub input: PathBuf,

    /// Application code (overrides the draft's `app`)
    #[arg(long)]
    pub app: Option<String>,

    /// Area (overrides the draft's `area`)
    #[arg(long)]
    pub area: Option<String>,

    /// Identifier to try before scanning
    #[arg(long, value_name = "ID")]
    pub preferred_id: Option<String>,

    /// Refuse drafts with error findings
    #[arg(long)]
    pub strict: bool,

    /// Reserve-and-verify attempts (overrides [allocation] max_attempts)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    #[command(flatten)]
    pub scope: ScopeArgs,
}

#[derive(Args, Debug)]
pub(crate) struct TraceArgs {
    /// Exit with status 2 when any warning was collected
    #[arg(long)]
    pub strict: bool,

    /// Output directory (overrides [trace] out_dir)
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Timestamp recorded in stats.json (default: now, RFC 3339)
    #[arg(long)]
    pub created_at: Option<String>,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result = match &cli.command {
        Commands::Init(args) => run_init(args, &cli),
        Commands::Lint(args) => with_context(&cli, |ctx| commands::lint::run_lint(args, ctx)),
        Commands::LintCorpus(args) => {
            with_context(&cli, |ctx| commands::lint::run_lint_corpus(args, ctx))
        }
        Commands::SuggestId(args) => {
            with_context(&cli, |ctx| commands::ids::run_suggest_id(args, ctx))
        }
        Commands::Allocate(args) => {
            with_context(&cli, |ctx| commands::ids::run_allocate(args, ctx))
        }
        Commands::Trace(args) => with_context(&cli, |ctx| commands::trace::run_trace(args, ctx)),
    };

    if let Err(failure) = result {
        eprintln!("{}", failure.message());
        std::process::exit(failure.exit_code());
    }
}

fn with_context(cli: &Cli, run: impl FnOnce(&Context) -> CommandResult) -> CommandResult {
    let mut project = load_project_config(&cli.root).map_err(|err| err.to_string())?;
    if let Some(corpus) = &cli.corpus {
        project.config.corpus.root = corpus.clone();
    }
    let ctx = Context {
        project,
        json: cli.json,
    };
    run(&ctx)
}

fn run_init(args: &InitArgs, cli: &Cli) -> CommandResult {
    let root = args.path.clone().unwrap_or_else(|| cli.root.clone());
    let out = init_project(&root).map_err(|err| err.to_string())?;

    if cli.json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "root": out.root,
            "created": out.created,
            "existing": out.existing,
            "next": ["qa-cli lint DRAFT.md", "qa-cli allocate DRAFT.md", "qa-cli trace"]
        }))
        .map_err(|err| format!("json encode: {}", err))?;
        println!("{}", json);
    } else {
        println!("init_root={}", out.root.display());
        println!("created={}", out.created.len());
        for item in &out.created {
            println!("created_item={}", item);
        }
        println!("existing={}", out.existing.len());
        for item in &out.existing {
            println!("existing_item={}", item);
        }
        println!();
        println!("Next:");
        println!("  qa-cli lint DRAFT.md");
        println!("  qa-cli allocate DRAFT.md");
        println!("  qa-cli trace");
    }

    Ok(())
}
