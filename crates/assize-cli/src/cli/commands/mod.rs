use super::args::*;
use assize_core::config::{self, EngineSettings, StorageSettings};
use assize_core::engine::{Collaborators, Orchestrator, RunRequest};
use assize_core::errors::ConfigError;
use assize_core::model::{EvaluationRun, RunStatus};
use assize_core::storage::blob::dataset_key;
use assize_core::storage::events::export_jsonl;
use assize_core::storage::{BlobStore, EventLog, FsBlobStore, GuidelineStore, RunStore, Store};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli, settings: EngineSettings) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Guideline(args) => cmd_guideline(args),
        Command::Run(args) => cmd_run(args, settings).await,
        Command::Status(args) => cmd_status(args),
        Command::Events(args) => cmd_events(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    std::fs::create_dir_all(&args.dir)?;
    let written = config::write_sample_config(&args.dir)?;
    for p in &written {
        eprintln!("created {}", p.display());
    }
    if written.is_empty() {
        eprintln!("note: config files already exist in {}", args.dir.display());
    }

    let blobs = FsBlobStore::new(args.dir.join(".assize/blobs"));
    let key = dataset_key(crate::templates::SAMPLE_DATASET_NAME);
    if blobs.get_text(&key).is_err() {
        blobs.put_text(&key, crate::templates::SAMPLE_DATASET)?;
        eprintln!("created {}", blobs.root().join(&key).display());
    }

    if args.gitignore {
        write_file_if_missing(&args.dir.join(".gitignore"), crate::templates::GITIGNORE)?;
    }
    Ok(exit_codes::OK)
}

fn write_file_if_missing(path: &Path, content: &str) -> anyhow::Result<()> {
    if !path.exists() {
        std::fs::write(path, content)?;
        eprintln!("created {}", path.display());
    } else {
        eprintln!("note: {} already exists (skipped)", path.display());
    }
    Ok(())
}

fn resolve_storage(args: &StoreArgs) -> anyhow::Result<StorageSettings> {
    let mut storage = match &args.config {
        Some(path) => config::load_storage(path)?,
        None if Path::new(config::DEFAULT_CONFIG_FILE).exists() => {
            config::load_storage(Path::new(config::DEFAULT_CONFIG_FILE))?
        }
        None => StorageSettings::default(),
    };
    if let Some(db) = &args.db {
        storage.db = db.to_string_lossy().to_string();
    }
    if let Some(blobs) = &args.blobs {
        storage.blobs = blobs.to_string_lossy().to_string();
    }
    Ok(storage)
}

fn open_store(db: &Path) -> anyhow::Result<Store> {
    ensure_parent_dir(db)?;
    let store = Store::open(db)?;
    store.init_schema()?;
    Ok(store)
}

fn cmd_guideline(args: GuidelineArgs) -> anyhow::Result<i32> {
    let storage = resolve_storage(&args.store)?;
    let store = open_store(Path::new(&storage.db))?;
    match args.cmd {
        GuidelineSub::Add { file } => {
            let guidelines = match config::load_guidelines(&file) {
                Ok(g) => g,
                Err(e) => {
                    eprintln!("config error: {}", e);
                    return Ok(exit_codes::CONFIG_ERROR);
                }
            };
            for g in &guidelines {
                if let Err(e) = store.put_guideline(g) {
                    eprintln!("config error: {:#}", e);
                    return Ok(exit_codes::CONFIG_ERROR);
                }
                eprintln!("guideline added: {} ({})", g.name, g.scale.name());
            }
        }
        GuidelineSub::List => {
            for g in store.list_guidelines()? {
                println!("{}\t{}\t{}", g.name, g.scale.name(), g.category);
            }
        }
    }
    Ok(exit_codes::OK)
}

async fn cmd_run(args: RunArgs, settings: EngineSettings) -> anyhow::Result<i32> {
    let cfg = match config::load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let settings = settings.with_overrides(&cfg.settings);
    if let Err(e) = settings.validate() {
        eprintln!("config error: {}", e);
        return Ok(exit_codes::CONFIG_ERROR);
    }

    let store = open_store(Path::new(&cfg.storage.db))?;
    let blobs = FsBlobStore::new(&cfg.storage.blobs);
    if let Some(path) = &args.dataset_file {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError(format!("failed to read dataset file {}: {}", path.display(), e))
        })?;
        blobs.put_text(&dataset_key(&cfg.dataset.name), &content)?;
        eprintln!("imported dataset {} from {}", cfg.dataset.name, path.display());
    }

    let request = RunRequest {
        owner: settings.owner.clone(),
        dataset: cfg.dataset.name.clone(),
        fields: cfg.dataset.fields.clone(),
        limit: cfg.dataset.limit,
        guidelines: cfg.guidelines.clone(),
        completion_model: cfg.completion.clone(),
        judge_model: cfg.judge.clone(),
    };
    let orchestrator = Orchestrator::new(Collaborators::new(store, Arc::new(blobs)), settings)?;
    let run_id = orchestrator.submit_run(request)?;
    eprintln!("run submitted: {}", run_id);

    let run = orchestrator
        .wait_for_run(&run_id, Duration::from_millis(args.poll_ms.max(10)))
        .await?;
    report(&run, args.json)
}

fn cmd_status(args: StatusArgs) -> anyhow::Result<i32> {
    let storage = resolve_storage(&args.store)?;
    let store = open_store(Path::new(&storage.db))?;
    let run = store.get_run(&args.run_id)?;
    report(&run, args.json)
}

fn cmd_events(args: EventsArgs) -> anyhow::Result<i32> {
    let storage = resolve_storage(&args.store)?;
    let store = open_store(Path::new(&storage.db))?;
    let run = store.get_run(&args.run_id)?;
    let log = EventLog::new(Arc::new(store));
    if args.export {
        let blobs = FsBlobStore::new(&storage.blobs);
        let key = log.export(&blobs, &run.id, &run.completion_model.model, &run.dataset)?;
        println!("{}", blobs.root().join(key).display());
    } else {
        print!("{}", export_jsonl(&log.list(&run.id)?)?);
    }
    Ok(exit_codes::OK)
}

fn report(run: &EvaluationRun, json: bool) -> anyhow::Result<i32> {
    assize_core::report::console::print_summary(run);
    if json {
        println!("{}", serde_json::to_string_pretty(run)?);
    }
    Ok(match run.status {
        RunStatus::Failed => exit_codes::RUN_FAILED,
        RunStatus::Completed | RunStatus::Running => exit_codes::OK,
    })
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
