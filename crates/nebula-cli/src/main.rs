//! `nebula-explorer` command line driver
//!
//! Runs the explorer headless against the in-memory demo backend:
//! - `tree`: print the visible tree of one or more namespaces
//! - `search`: print the projection for a query
//! - `demo`: run a scripted session of loads and mutations

use anyhow::{ensure, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use nebula_explorer::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    let namespaces = Arg::new("namespace")
        .long("namespace")
        .short('n')
        .action(ArgAction::Append)
        .value_parser(value_parser!(Namespace))
        .help("Namespace to print (repeatable; default all)");

    Command::new("nebula-explorer")
        .version(nebula_explorer::VERSION)
        .about("Project resource explorer")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .help("Log filter, e.g. debug or nebula_explorer=trace (overrides RUST_LOG)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .arg(
            Arg::new("no-latency")
                .long("no-latency")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Answer backend requests immediately"),
        )
        .subcommand(
            Command::new("tree")
                .about("Print the visible tree")
                .arg(namespaces.clone())
                .arg(
                    Arg::new("expand-all")
                        .long("expand-all")
                        .action(ArgAction::SetTrue)
                        .help("Expand every container, loading schema groups"),
                ),
        )
        .subcommand(
            Command::new("search")
                .about("Print the projection for a query")
                .arg(Arg::new("query").required(true).help("Case-insensitive substring"))
                .arg(namespaces)
                .arg(
                    Arg::new("load-groups")
                        .long("load-groups")
                        .action(ArgAction::SetTrue)
                        .help("Load schema groups first so their objects are searchable"),
                ),
        )
        .subcommand(Command::new("demo").about("Run a scripted explorer session"))
}

fn init_tracing(level: Option<&str>, json: bool) {
    let filter = level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(
        matches.get_one::<String>("log-level").map(String::as_str),
        matches.get_flag("log-json"),
    );

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => NebulaConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => NebulaConfig::default(),
    };
    if matches.get_flag("no-latency") {
        config.backend = config.backend.with_latency(0, 0);
    }
    let json = matches.get_flag("json");

    let backend = Arc::new(MemoryBackend::new(config.backend.clone()));
    let explorer = Explorer::new(backend, config.explorer.clone());
    let loaded = explorer.load_all().await.context("loading project")?;
    tracing::info!("project loaded ({} nodes)", loaded);

    match matches.subcommand() {
        Some(("tree", args)) => {
            let namespaces = selected(args);
            if args.get_flag("expand-all") {
                for &namespace in &namespaces {
                    expand_all(&explorer, namespace).await?;
                }
            }
            print_sections(&explorer, &namespaces, json)
        }
        Some(("search", args)) => {
            let namespaces = selected(args);
            if args.get_flag("load-groups") {
                for &namespace in &namespaces {
                    expand_all(&explorer, namespace).await?;
                    collapse_all(&explorer, namespace);
                }
            }
            if let Some(query) = args.get_one::<String>("query") {
                explorer.set_query(query);
            }
            print_sections(&explorer, &namespaces, json)
        }
        Some(("demo", _)) => {
            ensure!(config.backend.seed_demo, "demo needs backend.seed_demo = true");
            demo(&explorer, json).await
        }
        _ => Ok(()),
    }
}

fn selected(args: &ArgMatches) -> Vec<Namespace> {
    match args.get_many::<Namespace>("namespace") {
        Some(values) => values.copied().collect(),
        None => Namespace::ALL.to_vec(),
    }
}

/// Open every container of a namespace, fetching lazy children on the way
async fn expand_all(explorer: &Explorer, namespace: Namespace) -> Result<()> {
    let mut stack = explorer.with_store(|store| store.roots(namespace).to_vec());
    while let Some(id) = stack.pop() {
        if explorer.node(&id).is_some_and(|node| node.is_container()) {
            let children = explorer
                .expand(&id)
                .await
                .with_context(|| format!("expanding {id}"))?;
            stack.extend(children);
        }
    }
    Ok(())
}

fn collapse_all(explorer: &Explorer, namespace: Namespace) {
    let ids: Vec<NodeId> =
        explorer.with_store(|store| store.nodes_in(namespace).map(|node| node.id().clone()).collect());
    for id in &ids {
        explorer.collapse(id);
    }
}

fn print_sections(explorer: &Explorer, namespaces: &[Namespace], json: bool) -> Result<()> {
    if json {
        let sections: Vec<_> = namespaces
            .iter()
            .map(|&namespace| {
                serde_json::json!({
                    "namespace": namespace,
                    "rows": explorer.visible(namespace),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&sections)?);
        return Ok(());
    }
    for &namespace in namespaces {
        print_rows(namespace, &explorer.visible(namespace));
    }
    Ok(())
}

fn print_rows(namespace: Namespace, rows: &[VisibleRow]) {
    println!("{}", namespace.as_str().to_uppercase());
    if rows.is_empty() {
        println!("  (empty)");
    }
    for row in rows {
        let marker = match (row.is_container, row.is_open) {
            (false, _) => " ",
            (true, true) => "v",
            (true, false) => ">",
        };
        let state = match row.load_state {
            LoadState::Unloaded => " (not loaded)",
            LoadState::Loading => " (loading)",
            LoadState::Failed => " (failed)",
            LoadState::Loaded | LoadState::NotLoadable => "",
        };
        let hit = if row.matched { " *" } else { "" };
        println!(
            "{}{} {} [{}]{}{}",
            "  ".repeat(row.depth + 1),
            marker,
            row.name,
            row.kind,
            state,
            hit
        );
    }
}

/// Scripted session over the demo project
async fn demo(explorer: &Explorer, json: bool) -> Result<()> {
    let tables = NodeId::new("db_main_tables");
    explorer.expand(&NodeId::new("db_main")).await?;
    let loaded = explorer.expand(&tables).await?;
    step(json, format!("loaded {} tables", loaded.len()));

    let analytics = explorer
        .create(Namespace::Models, None, NodeDraft::new("Analytics", NodeKind::Folder))
        .await?;
    step(json, format!("created connection {analytics}"));

    let settings = explorer
        .create(Namespace::Pages, None, NodeDraft::new("Settings", NodeKind::Folder))
        .await?;
    explorer.rename(&settings, "Preferences").await?;
    step(json, format!("created and renamed {settings}"));

    explorer
        .move_node(&NodeId::new("p1_2"), &settings)
        .await?;
    step(json, "moved style.css into Preferences".to_string());

    let copy = explorer.copy(&NodeId::new("p1")).await?;
    step(json, format!("copied Home as {copy}"));

    match explorer
        .create(Namespace::Pages, None, NodeDraft::new("Login", NodeKind::Folder))
        .await
    {
        Ok(id) => step(json, format!("unexpectedly created {id}")),
        Err(err) => step(json, format!("duplicate create refused: {err}")),
    }

    let removed = explorer.delete(&NodeId::new("p2")).await?;
    step(json, format!("deleted Login ({} nodes)", removed.len()));

    explorer.set_query("user");
    if json {
        let journal = explorer.journal();
        let report = serde_json::json!({
            "journal": journal,
            "search": explorer.visible(Namespace::Models),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    explorer.clear_query();
    print_sections(explorer, &[Namespace::Pages, Namespace::Models], false)?;
    println!("JOURNAL");
    for record in explorer.journal() {
        let error = record.error.map(|kind| format!(" ({kind:?})")).unwrap_or_default();
        println!(
            "  #{} {} {} -> {:?}{}",
            record.generation,
            record.kind.as_str(),
            record.target,
            record.outcome,
            error
        );
    }
    Ok(())
}

fn step(json: bool, message: String) {
    if json {
        tracing::info!("{}", message);
    } else {
        println!("- {message}");
    }
}
