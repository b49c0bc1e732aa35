//! CLI subcommand handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use protoml_core::config::STATE_DIR;
use protoml_core::orchestrator::LOG_FILE;
use protoml_core::types::{DataType, DatasetFile};
use protoml_core::{
    Catalog, CommandLauncher, GraphBuilder, ProtoMlConfig, RecordKind, RecordStoreExt,
    TaskOrchestrator, TaskPhase, TaskStatus,
};

use crate::{
    Commands, ConfigAction, DataTypeAction, DatasetAction, InduceAction, TransformAction,
};

const WAIT_POLL: Duration = Duration::from_millis(200);

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config: &ProtoMlConfig,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config),
        Commands::Datatype { action } => handle_datatype(action, workspace, config),
        Commands::Transform { action } => handle_transform(action, workspace, config),
        Commands::Dataset { action } => handle_dataset(action, workspace, config),
        Commands::Induce { action } => handle_induce(action, workspace, config),
        Commands::Graph { order } => handle_graph(order, workspace, config),
        Commands::Run { ids, all } => handle_run(ids, all, workspace, config).await,
        Commands::Show { id } => handle_show(&id, workspace, config),
        Commands::Log { id } => handle_log(&id, workspace, config),
    }
}

/// Open the configured store and seed the default data types.
fn open_catalog(workspace: &Path, config: &ProtoMlConfig) -> anyhow::Result<Catalog> {
    let store = config.open_record_store(workspace)?;
    let mut catalog = Catalog::new(store, config.keystore(workspace));
    if let Some(dir) = config.dataset_dir(workspace) {
        catalog = catalog.with_dataset_dir(dir);
    }
    catalog.bootstrap()?;
    Ok(catalog)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let blob = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&blob).with_context(|| format!("Failed to parse {}", path.display()))
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config: &ProtoMlConfig,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(STATE_DIR);
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&ProtoMlConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}

fn handle_datatype(
    action: DataTypeAction,
    workspace: &Path,
    config: &ProtoMlConfig,
) -> anyhow::Result<()> {
    let catalog = open_catalog(workspace, config)?;
    match action {
        DataTypeAction::Add { name, parents } => {
            let id = catalog.add_data_type(DataType::with_parents(name.clone(), parents))?;
            println!("Added data type {name} ({id})");
        }
        DataTypeAction::List => {
            let store = catalog.store();
            for id in store.get_all(RecordKind::DataType)? {
                if let protoml_core::Record::DataType(dtype) =
                    store.get(RecordKind::DataType, &id)?
                {
                    let ancestors = store.data_type_ancestors(&dtype.name)?;
                    if ancestors.is_empty() {
                        println!("{}", dtype.name);
                    } else {
                        println!("{} <- {}", dtype.name, ancestors.join(", "));
                    }
                }
            }
        }
    }
    Ok(())
}

fn handle_transform(
    action: TransformAction,
    workspace: &Path,
    config: &ProtoMlConfig,
) -> anyhow::Result<()> {
    let catalog = open_catalog(workspace, config)?;
    match action {
        TransformAction::Add { file } => {
            let (transform, id) = catalog.add_transform_file(&file)?;
            println!("{id}");
            tracing::info!(
                name = %transform.name,
                functions = transform.functions.len(),
                "Transform registered"
            );
        }
    }
    Ok(())
}

fn handle_dataset(
    action: DatasetAction,
    workspace: &Path,
    config: &ProtoMlConfig,
) -> anyhow::Result<()> {
    let catalog = open_catalog(workspace, config)?;
    match action {
        DatasetAction::Add { file } => {
            let dataset: DatasetFile = read_json(&file)?;
            for id in catalog.add_dataset_file(&dataset)? {
                println!("{id}");
            }
        }
    }
    Ok(())
}

fn handle_induce(
    action: InduceAction,
    workspace: &Path,
    config: &ProtoMlConfig,
) -> anyhow::Result<()> {
    let catalog = open_catalog(workspace, config)?;
    let id = match action {
        InduceAction::Add { file } => catalog.add_induced_transform(read_json(&file)?)?,
        InduceAction::Update { id, file } => {
            catalog.update_induced_transform(&id, read_json(&file)?)?;
            id
        }
    };
    let stored = catalog.store().get_induced_transform(&id)?;
    println!("{id}");
    if !stored.is_valid() {
        eprintln!("warning: {}", stored.error);
    }
    Ok(())
}

fn handle_graph(order: bool, workspace: &Path, config: &ProtoMlConfig) -> anyhow::Result<()> {
    let catalog = open_catalog(workspace, config)?;
    let graph = GraphBuilder::new(catalog.store().as_ref()).build()?;
    if order {
        for id in graph.execution_order()? {
            println!("{id}");
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&graph)?);
    }
    Ok(())
}

fn print_status(status: &TaskStatus) {
    match status.phase {
        TaskPhase::Failed => println!("{}\tfailed\t{}", status.task_id, status.error),
        TaskPhase::Succeeded => println!("{}\tsucceeded", status.task_id),
        TaskPhase::Running => println!("{}\trunning", status.task_id),
        TaskPhase::Unknown => println!("{}\tunknown", status.task_id),
    }
}

async fn handle_run(
    ids: Vec<String>,
    all: bool,
    workspace: &Path,
    config: &ProtoMlConfig,
) -> anyhow::Result<()> {
    let catalog = open_catalog(workspace, config)?;
    let ids = if all {
        GraphBuilder::new(catalog.store().as_ref())
            .build()?
            .execution_order()?
    } else {
        ids
    };
    if ids.is_empty() {
        anyhow::bail!("Nothing to run");
    }

    let orchestrator = TaskOrchestrator::start(
        catalog.store().clone(),
        catalog.keystore().clone(),
        Arc::new(CommandLauncher),
        &config.runner,
    );
    let result = if all {
        run_in_order(&orchestrator, &ids).await
    } else {
        run_together(&orchestrator, &ids).await
    };
    orchestrator.shutdown().await;
    result
}

/// One task at a time; stops at the first failure.
async fn run_in_order(orchestrator: &TaskOrchestrator, ids: &[String]) -> anyhow::Result<()> {
    for id in ids {
        orchestrator.submit(id).await?;
        let status = orchestrator.wait(id, WAIT_POLL).await?;
        print_status(&status);
        if status.phase == TaskPhase::Failed {
            anyhow::bail!("Stopped after {id} failed");
        }
    }
    Ok(())
}

async fn run_together(orchestrator: &TaskOrchestrator, ids: &[String]) -> anyhow::Result<()> {
    for id in ids {
        orchestrator.submit(id).await?;
    }
    let mut failed = 0;
    for id in ids {
        let status = orchestrator.wait(id, WAIT_POLL).await?;
        print_status(&status);
        if status.phase == TaskPhase::Failed {
            failed += 1;
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} tasks failed", ids.len());
    }
    Ok(())
}

fn handle_show(id: &str, workspace: &Path, config: &ProtoMlConfig) -> anyhow::Result<()> {
    let catalog = open_catalog(workspace, config)?;
    let induced = catalog.store().get_induced_transform(id)?;
    println!("{}", serde_json::to_string_pretty(&induced)?);
    Ok(())
}

fn handle_log(id: &str, workspace: &Path, config: &ProtoMlConfig) -> anyhow::Result<()> {
    let path = config
        .keystore(workspace)
        .path_for_file(&protoml_core::keystore::induced_transform_key(id), LOG_FILE);
    let log = std::fs::read_to_string(&path)
        .with_context(|| format!("No run log for {id} at {}", path.display()))?;
    print!("{log}");
    Ok(())
}
