//! tagbind CLI - inspect and resolve the bundled signup schema

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tagbind::executors::{register_builtin, CONFIG_FILE};
use tagbind::{
    executor_fn, BindError, DirectiveRuntime, ExecutorError, FixSuggestion, MapSource, Namespace,
    Options, Record, Resolver, Schema,
};

#[derive(Parser)]
#[command(name = "tagbind")]
#[command(about = "tagbind - resolve tagged records from CLI values, env and config files")]
#[command(version)]
struct Cli {
    /// Log resolution steps (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolver tree of the signup schema
    Layout,

    /// List the directive executors available to the schema
    Executors,

    /// Resolve the signup schema and print it as JSON
    Resolve {
        /// Source value, repeatable (`--set name=Ada --set tag=a --set tag=b`)
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Flat JSON file read by `config=` directives
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Do not descend into records whose field carries its own directives
        #[arg(long)]
        no_nested: bool,
    },
}

// ────────────────────────────────────────────────────────────────
// Demo schema
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize)]
struct Signup {
    name: String,
    age: u32,
    email: Option<String>,
    tags: Vec<String>,
    newsletter: bool,
    address: Option<Address>,
    workspace: Workspace,
}

impl Record for Signup {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("Name", "form=name;default=anonymous", |s| &mut s.name)
            .field("Age", "form=age;default=18", |s| &mut s.age)
            .field("Email", "form=email,mail", |s| &mut s.email)
            .field("Tags", "form=tag", |s| &mut s.tags)
            .field("Newsletter", "env=TAGBIND_NEWSLETTER;form=newsletter;default=false", |s| {
                &mut s.newsletter
            })
            .optional("Address", "", |s| &mut s.address)
            .record("Workspace", "workspace=/srv/shared,team", |s| &mut s.workspace);
    }
}

#[derive(Debug, Default, Serialize)]
struct Address {
    city: String,
    zip: String,
}

impl Record for Address {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("City", "form=city", |a| &mut a.city)
            .field("Zip", "form=zip;default=00000", |a| &mut a.zip);
    }
}

#[derive(Debug, Default, Serialize)]
struct Workspace {
    root: String,
    owner: String,
}

impl Record for Workspace {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("Root", "config=workspace.root;default=/tmp/tagbind", |w| &mut w.root)
            .field("Owner", "config=workspace.owner;default=nobody", |w| &mut w.owner);
    }
}

/// `workspace=root,owner`: fill the whole record at once. The fields' own
/// directives replace it unless `--no-nested` is given.
fn workspace_preset(rt: &mut DirectiveRuntime<'_>) -> Result<(), ExecutorError> {
    let root = rt.directive.arg(0).unwrap_or_default().to_string();
    let owner = rt.directive.arg(1).unwrap_or_default().to_string();
    rt.set_value(Workspace { root, owner })?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Layout => print_layout(),
        Commands::Executors => print_executors(),
        Commands::Resolve {
            set,
            config,
            no_nested,
        } => resolve_signup(&set, config, no_nested),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.downcast_ref::<BindError>().and_then(|err| err.fix_suggestion()) {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn namespace() -> anyhow::Result<Arc<Namespace>> {
    let namespace = Arc::new(Namespace::new());
    register_builtin(&namespace)?;
    namespace.register("workspace", executor_fn(workspace_preset))?;
    Ok(namespace)
}

fn resolver() -> anyhow::Result<Resolver> {
    let options = Options::new().namespace(namespace()?);
    Ok(Resolver::with_options::<Signup>(&options)?)
}

fn print_layout() -> anyhow::Result<()> {
    let resolver = resolver()?;
    println!("{}", resolver.layout_text());
    println!(
        "{} {} nodes",
        "→".cyan(),
        resolver.len().to_string().cyan().bold()
    );
    Ok(())
}

fn print_executors() -> anyhow::Result<()> {
    for name in namespace()?.names() {
        println!("  {} {}", "•".cyan(), name);
    }
    Ok(())
}

fn resolve_signup(pairs: &[String], config: Option<PathBuf>, no_nested: bool) -> anyhow::Result<()> {
    let mut source = MapSource::new();
    for pair in pairs {
        source
            .insert_pair(pair)
            .with_context(|| format!("invalid --set value {pair:?}, expected KEY=VALUE"))?;
    }

    let mut options = Options::new().source(source);
    if let Some(path) = config {
        if !path.is_file() {
            anyhow::bail!("config file {} not found", path.display());
        }
        options = options.value(CONFIG_FILE, path);
    }
    if no_nested {
        options = options.resolve_nested_directives(false);
    }

    let signup: Signup = resolver()?.resolve_as(&options)?;
    println!("{}", serde_json::to_string_pretty(&signup)?);
    eprintln!("{} resolved {}", "✓".green(), "Signup".bold());
    Ok(())
}
