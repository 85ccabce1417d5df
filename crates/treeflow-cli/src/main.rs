//! treeflow CLI.
//!
//! Provides the `treeflow` binary for inspecting value trees given as JSON
//! and for running a small propagation scenario against the in-memory
//! target. Trees use the serialized `Branch` shape:
//! `{"leaves":[{"Number":1.0}],"branches":[...]}`.
//!
//! Log output goes to stderr and honours `RUST_LOG` (default `info`).
//! Engine settings are read from the `TREEFLOW_*` environment variables.

use std::error::Error;
use std::fs;
use std::process;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use treeflow_core::port::PortValue;
use treeflow_core::tree::{find_first_leaf, zip_apply, Branch, ValueTree};
use treeflow_core::value::{LeafValue, ValueKind};
use treeflow_engine::memory::PLACEMENT_FIELD;
use treeflow_engine::nodes::{Constant, InstanceCreator, ParameterMapper};
use treeflow_engine::{EngineConfig, Graph, MemoryTarget};

/// Value-tree tools and propagation demo.
#[derive(Parser)]
#[command(name = "treeflow", about = "Value-tree tools and propagation demo")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the first leaf of a tree (depth first, leaves before branches).
    FirstLeaf {
        /// Tree as JSON, or @path to read it from a file.
        tree: String,
    },
    /// Pair the leaves of two trees by position and print the pairs.
    Zip {
        /// Driving tree; its excess entries are skipped.
        a: String,
        /// Tree supplying the paired values.
        b: String,
    },
    /// Build a creator/mapper graph on the in-memory target and run it.
    Demo,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::FirstLeaf { tree } => run_first_leaf(&tree),
        Commands::Zip { a, b } => run_zip(&a, &b),
        Commands::Demo => run_demo(),
    };
    process::exit(exit_code);
}

/// Reads a tree argument.
///
/// Exit code on failure: 1 = invalid JSON, 3 = I/O error.
fn load_tree(arg: &str) -> Result<ValueTree, i32> {
    let text = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).map_err(|e| {
            eprintln!("Error: failed to read '{}': {}", path, e);
            3
        })?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error: invalid tree JSON: {}", e);
        1
    })
}

fn print_json(value: &serde_json::Value) {
    let text = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", text);
}

fn run_first_leaf(arg: &str) -> i32 {
    let tree = match load_tree(arg) {
        Ok(tree) => tree,
        Err(code) => return code,
    };
    print_json(&json!({ "first_leaf": find_first_leaf(&tree) }));
    0
}

fn run_zip(a: &str, b: &str) -> i32 {
    let (a, b) = match (load_tree(a), load_tree(b)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(code), _) | (_, Err(code)) => return code,
    };

    let mut pairs = Vec::new();
    let summary = zip_apply(&a, &b, |x, y| pairs.push(json!([x, y])));
    print_json(&json!({
        "pairs": pairs,
        "paired_leaves": summary.paired_leaves,
        "paired_branches": summary.paired_branches,
        "skipped_leaves": summary.skipped_leaves,
        "skipped_branches": summary.skipped_branches,
    }));
    0
}

/// Exit code: 0 = every node clean, 1 = graph error, 2 = a node failed or
/// was blocked.
fn run_demo() -> i32 {
    match demo() {
        Ok((output, clean)) => {
            print_json(&output);
            if clean {
                0
            } else {
                2
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Returns the scenario summary and whether the final pass was clean.
fn demo() -> Result<(serde_json::Value, bool), Box<dyn Error>> {
    let mut store = MemoryTarget::new();
    store.register_template(
        "Column",
        ValueKind::Number,
        vec![
            ("Height", LeafValue::Number(3.0), false),
            ("Mark", LeafValue::from(""), false),
            ("Volume", LeafValue::Number(0.0), true),
        ],
    );

    let mut graph = Graph::new(EngineConfig::from_env());
    let placements = ValueTree::from_trunk(
        Branch::with_leaves([0.0f64, 5.0]).with_branch(Branch::with_leaves([10.0f64])),
    );
    let points = graph.create_node(Constant::new(
        ValueKind::Any,
        Some(PortValue::tree(placements)),
    ));
    let template = graph.create_node(Constant::new(
        ValueKind::Text,
        Some(PortValue::scalar("Column")),
    ));
    let creator = graph.create_node(InstanceCreator::new());
    let mapper = graph.create_node(ParameterMapper::new());
    graph.create_connector(points, 0, creator, 0)?;
    graph.create_connector(template, 0, creator, 1)?;
    graph.create_connector(creator, 0, mapper, 0)?;

    let first = graph.run_pass(&mut store);
    info!(recomputed = first.recomputed.len(), "instances created");

    let outcome = graph.remap_ports(mapper, &store)?;
    info!(ports = outcome.added.len(), "mapper ports derived");

    let heights = graph.create_node(Constant::new(
        ValueKind::Any,
        Some(PortValue::tree(ValueTree::from_trunk(
            Branch::with_leaves([4.0f64, 4.5]).with_branch(Branch::with_leaves([6.0f64])),
        ))),
    ));
    let mark = graph.create_node(Constant::new(
        ValueKind::Text,
        Some(PortValue::scalar("C")),
    ));
    for (source, field) in [(heights, "Height"), (mark, "Mark")] {
        let port = graph
            .inputs(mapper)?
            .iter()
            .position(|p| p.spec.name == field)
            .ok_or_else(|| format!("mapper has no '{}' port", field))?;
        graph.create_connector(source, 0, mapper, port)?;
    }

    let report = graph.run_pass(&mut store);
    let instances: Vec<serde_json::Value> = graph
        .query_output(mapper, 0)?
        .map(|value| value.to_tree().leaves().cloned().collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|leaf| leaf.as_external_ref())
        .map(|object| {
            json!({
                "object": object.to_string(),
                "placement": store.field(object, PLACEMENT_FIELD),
                "height": store.field(object, "Height"),
                "mark": store.field(object, "Mark"),
            })
        })
        .collect();

    let ports: Vec<serde_json::Value> = outcome
        .added
        .iter()
        .map(|spec| json!({ "name": spec.name, "nickname": spec.nickname, "kind": spec.kind }))
        .collect();

    let clean = report.is_clean();
    let output = json!({
        "ports": ports,
        "instances": instances,
        "report": report,
        "events": graph.take_events(),
    });
    Ok((output, clean))
}
