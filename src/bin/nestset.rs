//! Command-line front end for nested-set trees stored in SQLite.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use nestset::{
    nested, step, Direction, MoveAdapter, MoveRequest, NestedItem, NewNode, Node, NodeId,
    SqliteStore, Subject, TreeConfig, TreeEngine, VerifyReport,
};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "nestset",
    version,
    about = "Maintain nested-set trees in a SQLite database",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "NESTSET_DB",
        default_value = "nestset.db",
        value_name = "FILE",
        help = "SQLite database file"
    )]
    db: PathBuf,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "TOML file with tree mode, ranking and column names"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Create the node table and print the active configuration")]
    Init,

    #[command(about = "Create a new root, or detach a stored node as a new forest")]
    Root(SubjectArgs),

    #[command(about = "Place a node as the last child of TARGET")]
    Append(PlaceCmd),

    #[command(about = "Place a node as the first child of TARGET")]
    Prepend(PlaceCmd),

    #[command(about = "Place a node right before TARGET")]
    Before(PlaceCmd),

    #[command(about = "Place a node right after TARGET")]
    After(PlaceCmd),

    #[command(about = "Apply a drop request: before/after sibling or parent")]
    Move(MoveCmd),

    #[command(about = "Swap a node with its neighbouring sibling")]
    Step {
        #[arg(value_name = "ID")]
        id: i64,
        #[arg(value_enum)]
        direction: DirectionArg,
    },

    #[command(about = "Delete a leaf, or a whole subtree with --with-children")]
    Delete {
        #[arg(value_name = "ID")]
        id: i64,
        #[arg(long, help = "Delete the node together with its descendants")]
        with_children: bool,
    },

    #[command(about = "Print every forest as an indented outline")]
    Tree,

    #[command(about = "Write every forest as nested JSON")]
    Export {
        #[arg(long, value_name = "FILE", help = "Write to FILE instead of stdout")]
        output: Option<PathBuf>,
    },

    #[command(about = "Append forests from a nested JSON file")]
    Import {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    #[command(about = "Check interval invariants of every forest")]
    Verify,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("subject").required(true).args(["label", "node"])))]
struct SubjectArgs {
    #[arg(long, help = "Label of a new node")]
    label: Option<String>,

    #[arg(long, value_name = "ID", help = "Id of a stored node to move")]
    node: Option<i64>,
}

impl SubjectArgs {
    fn subject(&self) -> Subject {
        match (&self.node, &self.label) {
            (Some(id), _) => Subject::Existing(NodeId(*id)),
            (None, label) => Subject::New(NewNode::new(label.clone().unwrap_or_default())),
        }
    }
}

#[derive(Args, Debug)]
struct PlaceCmd {
    #[arg(value_name = "TARGET")]
    target: i64,

    #[command(flatten)]
    subject: SubjectArgs,
}

#[derive(Args, Debug)]
struct MoveCmd {
    #[arg(value_name = "ID")]
    subject: i64,

    #[arg(long, value_name = "ID", help = "Sibling the node now precedes")]
    before: Option<i64>,

    #[arg(long, value_name = "ID", help = "Sibling the node now follows")]
    after: Option<i64>,

    #[arg(long, value_name = "ID", help = "New parent")]
    parent: Option<i64>,

    #[arg(long, help = "Never turn a parentless drop into a new root")]
    pinned: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum DirectionArg {
    Up,
    Down,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Up => Direction::Up,
            DirectionArg::Down => Direction::Down,
        }
    }
}

#[derive(Serialize)]
struct Deleted {
    id: NodeId,
    deleted: usize,
}

fn main() {
    install_tracing_subscriber();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn install_tracing_subscriber() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nestset=info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => TreeConfig::load(path)?,
        None => TreeConfig::ranked_forest(),
    };
    let store = SqliteStore::open(&cli.db, &config)?;
    let mut engine = TreeEngine::new(store, config)?;
    let format = cli.format;

    match cli.command {
        Command::Init => {
            let config = engine.config();
            emit(format, config, || {
                println!("initialized {}", cli.db.display());
                print!("{}", config.to_toml_string().unwrap_or_default());
            })?;
        }
        Command::Root(args) => {
            let node = engine.make_root(args.subject())?;
            emit_node(format, &node)?;
        }
        Command::Append(cmd) => {
            let node = engine.append_to(cmd.subject.subject(), NodeId(cmd.target))?;
            emit_node(format, &node)?;
        }
        Command::Prepend(cmd) => {
            let node = engine.prepend_to(cmd.subject.subject(), NodeId(cmd.target))?;
            emit_node(format, &node)?;
        }
        Command::Before(cmd) => {
            let node = engine.insert_before(cmd.subject.subject(), NodeId(cmd.target))?;
            emit_node(format, &node)?;
        }
        Command::After(cmd) => {
            let node = engine.insert_after(cmd.subject.subject(), NodeId(cmd.target))?;
            emit_node(format, &node)?;
        }
        Command::Move(cmd) => {
            let request = MoveRequest {
                subject: NodeId(cmd.subject),
                before: cmd.before.map(NodeId),
                after: cmd.after.map(NodeId),
                parent: cmd.parent.map(NodeId),
            };
            let outcome = MoveAdapter::new(!cmd.pinned).apply(&mut engine, &request);
            // the outcome is a wire payload; always JSON
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.is_updated() {
                std::process::exit(2);
            }
        }
        Command::Step { id, direction } => match step(&mut engine, NodeId(id), direction.into())? {
            Some(node) => emit_node(format, &node)?,
            None => emit(format, &Option::<Node>::None, || {
                println!("node {id} has no neighbour in that direction")
            })?,
        },
        Command::Delete { id, with_children } => {
            let deleted = if with_children {
                engine.delete_with_children(NodeId(id))?
            } else {
                engine.delete(NodeId(id))?;
                1
            };
            let report = Deleted {
                id: NodeId(id),
                deleted,
            };
            emit(format, &report, || println!("deleted {deleted} node(s)"))?;
        }
        Command::Tree => {
            let forests = nested::export_all(&engine.query())?;
            emit(format, &forests, || {
                for item in &forests {
                    print_outline(item, 0);
                }
            })?;
        }
        Command::Export { output } => {
            let forests = nested::export_all(&engine.query())?;
            let json = serde_json::to_string_pretty(&forests)?;
            match output {
                Some(path) => fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Command::Import { input } => {
            let items: Vec<NestedItem> = serde_json::from_str(&fs::read_to_string(input)?)?;
            let roots = nested::rebuild(&mut engine, &items)?;
            emit(format, &roots, || {
                let ids: Vec<String> = roots.iter().map(ToString::to_string).collect();
                println!("imported {} forest(s): {}", roots.len(), ids.join(", "));
            })?;
        }
        Command::Verify => {
            let report = engine.verify()?;
            emit(format, &report, || print_verify_text(&report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
    }
    Ok(())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn emit_node(format: OutputFormat, node: &Node) -> Result<(), Box<dyn Error>> {
    emit(format, node, || {
        print!(
            "node {} [{}, {}] depth={}",
            node.id, node.left, node.right, node.depth
        );
        if let Some(tree) = node.tree {
            print!(" tree={tree}");
        }
        if let Some(order) = node.order {
            print!(" rank={order}");
        }
        println!(" {}", node.label);
    })
}

fn print_outline(item: &NestedItem, level: usize) {
    let id = item.id.map(|id| id.to_string()).unwrap_or_default();
    println!("{}{} ({id})", "  ".repeat(level), item.label);
    for child in &item.children {
        print_outline(child, level + 1);
    }
}

fn print_verify_text(report: &VerifyReport) {
    println!(
        "Verify => success={} nodes_found={} forests_found={} leaves_found={} max_depth={}",
        report.success,
        report.counts.nodes_found,
        report.counts.forests_found,
        report.counts.leaves_found,
        report.counts.max_depth,
    );
    for finding in &report.findings {
        match finding.forest {
            Some(forest) => println!("- {:?} (forest {forest}): {}", finding.severity, finding.message),
            None => println!("- {:?}: {}", finding.severity, finding.message),
        }
    }
}
