//! runmesh CLI: validate, explain, and run scripts; inspect stored reports.

mod actions;
mod script;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use runmesh_core::config::NodeConfig;
use runmesh_core::id::{RunId, WorkerNodeId};
use runmesh_core::types::Table;
use runmesh_exec::Engine;
use runmesh_repo::ReportRepository;
use runmesh_store::writers::ExportFormat;
use runmesh_store::FsStorage;

use crate::script::{apply_script_config, Script};

#[derive(Parser)]
#[command(name = "runmesh")]
#[command(about = "runmesh: run multi-action analysis scripts and inspect their reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute every action of a script, in dependency order, on this node
    Run {
        /// Path to the script YAML file
        #[arg(short, long)]
        script: PathBuf,

        /// Run id (overrides the script; generated when neither sets one)
        #[arg(long)]
        run_id: Option<String>,

        /// Store directory (overrides config)
        #[arg(long)]
        store_dir: Option<String>,

        /// Workspace root (overrides config)
        #[arg(long)]
        workspace_root: Option<String>,

        /// Concurrent per-system collections (overrides config)
        #[arg(long)]
        collector_threads: Option<usize>,
    },

    /// Validate a script (syntax and action graph)
    Validate {
        #[arg(short, long)]
        script: PathBuf,
    },

    /// Show the action order of a script
    Explain {
        #[arg(short, long)]
        script: PathBuf,
    },

    /// List report kinds stored for a run
    Kinds {
        #[arg(long)]
        store_dir: String,
        #[arg(long)]
        run_id: String,
    },

    /// Export reports of a run (one kind, one action's kinds, or all kinds joined)
    Export {
        #[arg(long)]
        store_dir: String,
        #[arg(long)]
        run_id: String,
        /// Report kind to dump; all kinds joined when absent
        #[arg(long, conflicts_with = "action")]
        kind: Option<String>,
        /// Write `<kind>_<action>.<ext>` for every kind holding rows of this action
        #[arg(long)]
        action: Option<String>,
        /// Output file (or directory with --action)
        #[arg(short, long)]
        out: PathBuf,
        /// csv or jsonl
        #[arg(long, default_value = "csv")]
        format: ExportFormat,
    },

    /// Run `SELECT cols FROM <kind> [WHERE ..] [ORDER BY ..] [LIMIT n]`
    Select {
        #[arg(long)]
        store_dir: String,
        #[arg(long)]
        run_id: String,
        sql: String,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Run {
            script,
            run_id,
            store_dir,
            workspace_root,
            collector_threads,
        } => run_script(
            &script,
            RunOverrides {
                run_id,
                store_dir,
                workspace_root,
                collector_threads,
            },
        ),
        Commands::Validate { script } => validate_script(&script).map(|n| {
            println!("✓ Script is valid ({} actions)", n);
        }),
        Commands::Explain { script } => explain_script(&script),
        Commands::Kinds { store_dir, run_id } => list_kinds(&store_dir, &run_id),
        Commands::Export {
            store_dir,
            run_id,
            kind,
            action,
            out,
            format,
        } => export_reports(&store_dir, &run_id, kind, action, &out, format),
        Commands::Select {
            store_dir,
            run_id,
            sql,
        } => select_reports(&store_dir, &run_id, &sql),
    };
    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Flags of `run` that take precedence over env and script config.
#[derive(Debug, Default)]
struct RunOverrides {
    run_id: Option<String>,
    store_dir: Option<String>,
    workspace_root: Option<String>,
    collector_threads: Option<usize>,
}

fn apply_overrides(cfg: &mut NodeConfig, flags: &RunOverrides) {
    if let Some(dir) = &flags.store_dir {
        cfg.store_dir = dir.clone();
    }
    if let Some(root) = &flags.workspace_root {
        cfg.workspace_root = root.clone();
    }
    if let Some(n) = flags.collector_threads {
        cfg.collector_threads = n.max(1);
    }
}

fn load_script(path: &Path) -> CliResult<Script> {
    let yaml = fs::read_to_string(path)?;
    Ok(Script::parse(&yaml)?)
}

fn run_script(path: &Path, flags: RunOverrides) -> CliResult<()> {
    let script = load_script(path)?;

    let mut config = NodeConfig::from_env();
    apply_script_config(&mut config, &script.config);
    apply_overrides(&mut config, &flags);

    let run_id = flags
        .run_id
        .clone()
        .or_else(|| script.run_id.clone())
        .map(RunId::new)
        .unwrap_or_else(RunId::generate);
    let node = WorkerNodeId::new(config.worker_node_id.clone());
    let requests = script.requests(&run_id, &node)?;

    let engine = Engine::from_config(config)?;
    actions::register_builtins(engine.action_types());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        for request in requests {
            let name = request.action_name.clone();
            let ctx = engine.execute(request).await?;
            let m = ctx.manifest();
            let status = if m.succeeded { "✓" } else { "✗" };
            println!(
                "{} {} ({}ms, {} collected, {} failed)",
                status,
                name,
                m.duration_ms(),
                m.collected,
                m.failed_collections
            );
            if let Some(err) = &m.error {
                println!("    {}", err);
            }
        }
        Ok::<_, runmesh_exec::ExecError>(())
    })?;

    println!("✓ Run {} finished", run_id);
    Ok(())
}

fn validate_script(path: &Path) -> CliResult<usize> {
    let script = load_script(path)?;
    script.plan().validate()?;
    Ok(script.actions.len())
}

fn explain_script(path: &Path) -> CliResult<()> {
    let script = load_script(path)?;
    let plan = script.plan();
    plan.validate()?;

    println!("Study: {}", plan.study);
    println!("Plan fingerprint: {}", plan.fingerprint()?.short());
    println!();
    println!("Action Execution Order:");
    for (i, node) in plan.topological_order()?.iter().enumerate() {
        let parents: Vec<&str> = plan.parents(&node.name).iter().map(|p| p.name.as_str()).collect();
        println!(
            "  {}. {} [{}] abstractions={:?} after={:?}",
            i + 1,
            node.name,
            node.action_type,
            node.abstractions,
            parents
        );
    }
    Ok(())
}

fn open_reports(store_dir: &str) -> CliResult<ReportRepository> {
    let storage = FsStorage::new(store_dir)?;
    Ok(ReportRepository::new(std::sync::Arc::new(storage)))
}

fn list_kinds(store_dir: &str, run_id: &str) -> CliResult<()> {
    let reports = open_reports(store_dir)?;
    for kind in reports.kinds(&RunId::new(run_id))? {
        println!("{}", kind);
    }
    Ok(())
}

fn export_reports(
    store_dir: &str,
    run_id: &str,
    kind: Option<String>,
    action: Option<String>,
    out: &Path,
    format: ExportFormat,
) -> CliResult<()> {
    let reports = open_reports(store_dir)?;
    let run = RunId::new(run_id);
    if let Some(action) = action {
        for file in reports.export_action(&run, &action, out, format)? {
            println!("{}", file.display());
        }
        return Ok(());
    }
    let table = match kind {
        Some(kind) => reports.to_table(&run, &kind)?,
        None => reports.to_joined_table(&run)?,
    };
    reports.export(&table, out, format)?;
    println!("{} rows -> {}", table.num_rows(), out.display());
    Ok(())
}

fn select_reports(store_dir: &str, run_id: &str, sql: &str) -> CliResult<()> {
    let reports = open_reports(store_dir)?;
    let table = reports.select(&RunId::new(run_id), sql)?;
    print_table(&table);
    Ok(())
}

fn print_table(table: &Table) {
    println!("{}", table.column_names().join("\t"));
    for row in table.rows() {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        println!("{}", cells.join("\t"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptConfig;

    #[test]
    fn cli_overrides_higher_priority_than_config() {
        let mut config = NodeConfig::default();
        let doc = ScriptConfig {
            store_dir: Some("/tmp/script".into()),
            workspace_root: Some("/tmp/script-ws".into()),
            ..Default::default()
        };
        apply_script_config(&mut config, &doc);
        assert_eq!(config.store_dir, "/tmp/script");

        let flags = RunOverrides {
            store_dir: Some("/tmp/cli".into()),
            collector_threads: Some(2),
            ..Default::default()
        };
        apply_overrides(&mut config, &flags);
        assert_eq!(config.store_dir, "/tmp/cli");
        assert_eq!(config.workspace_root, "/tmp/script-ws");
        assert_eq!(config.collector_threads, 2);
    }

    #[test]
    fn runs_a_script_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("script.yaml");
        let store = dir.path().join("store");
        let ws = dir.path().join("ws");
        fs::write(
            &script_path,
            r#"
study: demo
run_id: demo-1
actions:
  - name: import
    type: Import
    abstraction: Stack
    settings:
      systems:
        - { id: s1, data_source: local, attributes: { score: 0.9 } }
        - { id: s2, data_source: local, attributes: { score: 0.2 } }
  - name: keep
    type: Filter
    abstraction: Stack
    depends_on: [import]
    settings: { where: "score > 0.5" }
"#,
        )
        .unwrap();

        assert_eq!(validate_script(&script_path).unwrap(), 2);
        run_script(
            &script_path,
            RunOverrides {
                store_dir: Some(store.display().to_string()),
                workspace_root: Some(ws.display().to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let storage = std::sync::Arc::new(FsStorage::new(&store).unwrap());
        let executables = runmesh_repo::ExecutableRepository::new(storage.clone());
        let run = RunId::new("demo-1");
        assert_eq!(executables.get(&run, "Stack", "import").unwrap().len(), 2);
        let kept = executables.get(&run, "Stack", "keep").unwrap();
        assert_eq!(kept.ids(), vec!["s1"]);

        let reports = ReportRepository::new(storage);
        assert_eq!(reports.kinds(&run).unwrap(), vec![actions::DEFAULT_REPORT_KIND]);
    }
}
