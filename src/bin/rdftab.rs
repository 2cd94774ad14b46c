//! Binary entry point for the rdftab CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rdftab::cli::{
    init_store, load_options, run_query, scan_triples, GraphAttachment, InitReport, QueryReport,
    Store, TripleFilter, TripleRow,
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "rdftab",
    version,
    about = "Query RDF triples stored in SQLite property and class tables",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "RDFTAB_CONFIG",
        value_name = "FILE",
        help = "Adapter configuration (TOML)"
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

#[derive(Args, Debug)]
struct StoreArgs {
    #[arg(value_name = "DB")]
    db_path: PathBuf,

    #[arg(
        long = "graph",
        value_name = "NAME=PATH",
        help = "Attach a named graph database (repeatable)"
    )]
    graphs: Vec<GraphAttachment>,
}

#[derive(Args, Debug)]
struct TriplesCmd {
    #[command(flatten)]
    store: StoreArgs,

    #[arg(long = "in-graph", value_name = "ID", help = "Only triples of this graph (0 = default)")]
    graph: Option<i64>,

    #[arg(long, value_name = "ID", help = "Only triples with this subject")]
    subject: Option<i64>,

    #[arg(long, value_name = "ID", help = "Only triples with this predicate")]
    predicate: Option<i64>,

    #[arg(long, value_name = "ID", help = "Exclude triples with this predicate")]
    not_predicate: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Create registry, ontology and graph tables")]
    Init {
        #[command(flatten)]
        store: StoreArgs,
    },

    #[command(about = "Run one SQL statement with the triples table registered")]
    Query {
        #[command(flatten)]
        store: StoreArgs,

        #[arg(value_name = "SQL")]
        sql: String,
    },

    #[command(about = "List triples, optionally restricted by graph, subject or predicate")]
    Triples(TriplesCmd),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    install_tracing_subscriber();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let options = load_options(cli.config.as_deref())?;

    match cli.command {
        Command::Init { store } => {
            let report = init_store(&store.db_path, &options, &store.graphs)?;
            emit(cli.format, &report, || print_init_text(&report))?;
        }
        Command::Query { store, sql } => {
            let store = Store::open(&store.db_path, options, &store.graphs)?;
            let report = run_query(&store, &sql)?;
            emit(cli.format, &report, || print_query_text(&report))?;
        }
        Command::Triples(cmd) => {
            let store = Store::open(&cmd.store.db_path, options, &cmd.store.graphs)?;
            let filter = TripleFilter {
                graph: cmd.graph,
                subject: cmd.subject,
                predicate: cmd.predicate,
                not_predicate: cmd.not_predicate,
            };
            let rows = scan_triples(&store, &filter)?;
            emit(cli.format, &rows, || print_triples_text(&rows))?;
        }
    }
    Ok(())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(),
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

fn print_init_text(report: &InitReport) {
    println!(
        "Initialized {} ({}): classes={} properties={}",
        report.database, report.generation, report.classes, report.properties
    );
    for graph in &report.graphs {
        println!("  graph {graph}");
    }
}

fn print_query_text(report: &QueryReport) {
    if report.columns.is_empty() {
        return;
    }
    println!("{}", report.columns.join("\t"));
    for row in &report.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|value| match value {
                serde_json::Value::Null => "NULL".to_string(),
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
}

fn print_triples_text(rows: &[TripleRow]) {
    for row in rows {
        let graph = row
            .graph
            .map_or_else(|| "default".to_string(), |id| id.to_string());
        println!(
            "{graph}\t{}\t{}\t{}\t{}",
            row.subject,
            row.predicate,
            row.object.as_deref().unwrap_or("NULL"),
            row.object_type
        );
    }
}
