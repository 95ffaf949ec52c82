use anyhow::{Context, Result};
use chartcore::{
    ExecutionEvent, FlowBuilder, FlowError, NodeEvent, RunOutcome, SequentialIds, SpecFlow, Value,
};
use chartnodes::IfConditions;
use chartruntime::{registry, FlowRuntime, NodeRegistry, RuntimeConfig};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowchart")]
#[command(about = "Flowchart CLI", long_about = None)]
struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Runtime config JSON file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Run inputs as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Start node id, overriding the config
        #[arg(long)]
        start: Option<String>,
    },

    /// Validate flow files or directories of flows
    Validate {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Migrate node data to the current schema versions
    Migrate {
        file: PathBuf,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available node types
    Nodes {
        /// Print the full catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create an example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    let registry = registry::install_global(chartnodes::standard_registry()?)?;

    match cli.command {
        Commands::Run { file, input, start } => {
            if start.is_some() {
                config.start_node = start;
            }
            run_flow(registry, config, &file, input).await?;
        }
        Commands::Validate { paths } => {
            validate_flows(FlowRuntime::with_registry(registry, config), &paths)?;
        }
        Commands::Migrate { file, output } => {
            migrate(FlowRuntime::with_registry(registry, config), &file, output)?;
        }
        Commands::Nodes { json } => {
            list_nodes(&registry, json)?;
        }
        Commands::Init { output } => {
            create_example_flow(&output)?;
        }
    }

    Ok(())
}

fn parse_inputs(input: Option<String>) -> Result<HashMap<String, Value>> {
    let Some(input) = input else {
        return Ok(HashMap::new());
    };
    let json: serde_json::Value = serde_json::from_str(&input).context("input is not JSON")?;
    match json {
        serde_json::Value::Object(obj) => Ok(obj.into_iter().map(|(k, v)| (k, v.into())).collect()),
        _ => Err(anyhow::anyhow!("Input must be a JSON object")),
    }
}

fn load(file: &Path) -> Result<SpecFlow> {
    chartruntime::load_flow(file).with_context(|| format!("failed to load {}", file.display()))
}

async fn run_flow(
    registry: Arc<NodeRegistry>,
    config: RuntimeConfig,
    file: &Path,
    input: Option<String>,
) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());
    let flow = load(file)?;
    println!("   Nodes: {}", flow.nodes.len());
    println!("   Edges: {}", flow.edges.len());
    println!();

    let inputs = parse_inputs(input)?;
    let runtime = FlowRuntime::with_registry(registry, config);
    let plan = runtime.resolve(&flow)?;

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(event);
        }
    });

    let result = runtime
        .execute_plan(&plan, inputs, tokio_util::sync::CancellationToken::new())
        .await;

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    let result = match result {
        Ok(result) => result,
        Err(error) => {
            println!();
            println!("💥 Flow failed at node {}: {}", error.node_id, error.cause);
            return Err(FlowError::from(error).into());
        }
    };

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", result.execution_id);
    match &result.outcome {
        RunOutcome::Completed => println!("   Outcome: completed"),
        RunOutcome::Ended { node_id } => println!("   Outcome: ended early at {}", node_id),
    }
    println!("   Visits: {}", result.trace.visits.len());

    if !result.trace.outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        let mut node_ids: Vec<&String> = result.trace.outputs.keys().collect();
        node_ids.sort();
        for node_id in node_ids {
            let outputs = &result.trace.outputs[node_id];
            if outputs.is_empty() {
                continue;
            }
            println!("   Node {}:", node_id);
            for (handle, value) in &outputs.values {
                let handle = if handle.is_empty() { "(out)" } else { handle };
                println!("     {}: {}", handle, value.to_display_string());
            }
        }
    }

    Ok(())
}

fn print_event(event: ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted { start_node, .. } => {
            println!("▶️  Flow started at {}", start_node);
        }
        ExecutionEvent::NodeStarted {
            node_id, node_type, ..
        } => {
            println!("  ⚡ Starting node: {} ({})", node_id, node_type);
        }
        ExecutionEvent::NodeCompleted {
            node_id,
            duration_ms,
            ..
        } => {
            println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
        }
        ExecutionEvent::NodeSkipped { node_id, .. } => {
            println!("  ⏭️  Node {} skipped", node_id);
        }
        ExecutionEvent::NodeFailed { node_id, error, .. } => {
            println!("  ❌ Node {} failed: {}", node_id, error);
        }
        ExecutionEvent::LoopIteration {
            node_id,
            index,
            total,
            ..
        } => {
            println!("  🔁 Loop {} iteration {}/{}", node_id, index + 1, total);
        }
        ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
            NodeEvent::Info { message } => println!("     ℹ️  [{}] {}", node_id, message),
            NodeEvent::Warning { message } => println!("     ⚠️  [{}] {}", node_id, message),
        },
        ExecutionEvent::RunCompleted { duration_ms, .. } => {
            println!("✨ Flow completed successfully in {}ms", duration_ms);
        }
        ExecutionEvent::RunEnded {
            node_id,
            duration_ms,
            ..
        } => {
            println!("🏁 Flow ended at {} after {}ms", node_id, duration_ms);
        }
        ExecutionEvent::RunFailed { duration_ms, .. } => {
            println!("💥 Flow failed after {}ms", duration_ms);
        }
    }
}

fn validate_flows(runtime: FlowRuntime, paths: &[PathBuf]) -> Result<()> {
    let mut flows = Vec::new();
    for path in paths {
        if path.is_dir() {
            flows.extend(
                chartruntime::load_flow_dir(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
            );
        } else {
            flows.push((path.clone(), load(path)?));
        }
    }

    let mut failures = 0;
    for (path, flow) in &flows {
        println!("🔍 Validating flow: {}", path.display());
        match runtime.resolve(flow) {
            Ok(plan) => {
                println!("✅ Flow is valid:");
                println!("   Start: {}", plan.start());
                println!("   Planned nodes: {}/{}", plan.len(), flow.nodes.len());
                println!("   Loops: {}", plan.loops().count());
            }
            Err(error) => {
                failures += 1;
                println!("❌ {}", error);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} flows are invalid", failures, flows.len());
    }
    Ok(())
}

fn migrate(runtime: FlowRuntime, file: &Path, output: Option<PathBuf>) -> Result<()> {
    let flow = load(file)?;
    let migrated = runtime.migrate_flow(&flow)?;
    match output {
        Some(output) => {
            chartruntime::save_flow(&output, &migrated)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("✨ Migrated flow written to: {}", output.display());
        }
        None => println!("{}", migrated.to_json_pretty()?),
    }
    Ok(())
}

fn list_nodes(registry: &NodeRegistry, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&registry.catalog())?);
        return Ok(());
    }

    println!("📦 Available Node Types:");
    println!();
    for info in registry.catalog() {
        println!("  • {} ({}, v{})", info.node_type, info.metadata.category, info.version);
        println!("    {}", info.metadata.description);
    }
    Ok(())
}

fn create_example_flow(output: &Path) -> Result<()> {
    let ids = Arc::new(SequentialIds::new("n"));
    let mut builder = FlowBuilder::new(ids);

    let mut conditions = IfConditions::new(Arc::new(SequentialIds::new("cond")));
    let stop = conditions.add("value == 4.0");

    let start = builder.add_node("start", json!({}));
    let items = builder.add_node("json", json!({ "value": [1, 2, 3, 4, 5] }));
    let each = builder.add_node("forEach", json!({}));
    let check = builder.add_node("if", conditions.to_data());
    let stop_loop = builder.add_node("break", json!({}));
    let double = builder.add_node("math", json!({ "operation": "multiply", "b": 2 }));
    let log_item = builder.add_node("log", json!({ "message": "Doubled" }));
    let log_done = builder.add_node("log", json!({ "message": "Collected" }));

    builder.connect(&start, None, &items, None);
    builder.connect(&items, None, &each, Some("items"));
    builder.connect(&each, Some("item"), &check, None);
    builder.connect(&check, Some(stop.as_str()), &stop_loop, None);
    builder.connect(&check, Some("false"), &double, Some("a"));
    builder.connect(&double, None, &log_item, None);
    builder.connect(&log_item, None, &each, Some("next"));
    builder.connect(&each, Some("done"), &log_done, None);

    chartruntime::save_flow(output, &builder.build())
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  flowchart run --file {}", output.display());

    Ok(())
}
