//! Operator CLI for the Pictura document store: library/cache-folder/job
//! management, plus ad-hoc scheduler and dead-letter inspection. Talks to
//! the SQLite store directly rather than through a running daemon, since
//! a single-writer document store needs no IPC layer to be operated safely
//! alongside `picturad`.

use clap::{Parser, Subcommand};
use comfy_table::Table;
use pictura_core::broker::QueuePayload;
use pictura_core::store::background_job_store::BackgroundJobStore;
use pictura_core::store::cache_folder_store::CacheFolderStore;
use pictura_core::store::collection_store::CollectionStore;
use pictura_core::store::entities::dead_letter_message;
use pictura_core::store::library_store::LibraryStore;
use pictura_core::Core;
use sea_orm::EntityTrait;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "picturactl", about = "Operate a Pictura document store")]
struct Cli {
    #[arg(long, env = "PICTURA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Library management
    Library {
        #[command(subcommand)]
        command: LibraryCommand,
    },
    /// Background job inspection
    Job {
        #[command(subcommand)]
        command: JobCommand,
    },
    /// Cache folder management
    CacheFolder {
        #[command(subcommand)]
        command: CacheFolderCommand,
    },
    /// Scheduler maintenance
    Scheduler {
        #[command(subcommand)]
        command: SchedulerCommand,
    },
    /// Broker queue inspection
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
}

#[derive(Subcommand)]
enum LibraryCommand {
    /// Register a new library root
    Add {
        name: String,
        root_path: PathBuf,
        #[arg(long)]
        cron: Option<String>,
    },
    /// List registered libraries
    List,
    /// Fire an immediate scan of a library, bypassing its cron schedule
    Scan { library_id: Uuid },
    /// Walk a root path one level deep and register a collection for each
    /// immediate entry found
    BulkAdd {
        root_path: PathBuf,
        library_id: Uuid,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        overwrite_existing: bool,
        #[arg(long)]
        auto_add: bool,
        #[arg(long)]
        trigger_scan: bool,
    },
}

#[derive(Subcommand)]
enum JobCommand {
    /// List background jobs for a collection
    List { collection_id: Uuid },
    /// Show a job's per-stage progress
    Show { job_id: Uuid },
    /// Cancel a non-terminal job
    Cancel { job_id: Uuid },
}

#[derive(Subcommand)]
enum CacheFolderCommand {
    /// Register a new cache folder
    Add {
        path: PathBuf,
        capacity_bytes: i64,
        #[arg(long, default_value_t = 0.9)]
        watermark: f64,
        #[arg(long, default_value_t = 1)]
        priority: i32,
    },
    /// List registered cache folders and their live usage
    List,
    /// Overwrite a cache folder's recorded usage with a freshly measured value
    Recalculate { id: Uuid, actual_bytes: i64 },
}

#[derive(Subcommand)]
enum SchedulerCommand {
    /// Recreate a missing scheduled-job binding for a library
    RecreateBinding { library_id: Uuid },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// List messages that exhausted their retry budget
    DeadLetters,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .init();

    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(path) => path,
        None => pictura_core::config::default_data_dir()?,
    };
    let core = Core::new_with_config(data_dir).await?;
    let db = core.db.conn();

    match cli.command {
        Command::Library { command } => match command {
            LibraryCommand::Add { name, root_path, cron } => {
                let library =
                    LibraryStore::create(db, &name, &root_path.to_string_lossy(), cron).await?;
                println!("created library {} ({})", library.name, library.id);
            }
            LibraryCommand::List => {
                let libraries = LibraryStore::list(db).await?;
                let mut table = Table::new();
                table.set_header(vec!["ID", "Name", "Root path", "Cron", "Status"]);
                for lib in libraries {
                    table.add_row(vec![
                        lib.id.to_string(),
                        lib.name,
                        lib.root_path,
                        lib.cron_expression.unwrap_or_else(|| "-".to_string()),
                        lib.status,
                    ]);
                }
                println!("{table}");
            }
            LibraryCommand::Scan { library_id } => {
                let library = LibraryStore::get(db, library_id).await?;
                let ctx = core.worker_context();
                let fired = pictura_core::scheduler::orchestrator::fire(&ctx, &library).await?;
                println!("fired {fired} collection scan(s) for library {library_id}");
            }
            LibraryCommand::BulkAdd {
                root_path,
                library_id,
                prefix,
                overwrite_existing,
                auto_add,
                trigger_scan,
            } => {
                let job = BackgroundJobStore::create_job(db, Uuid::nil(), "bulk_add", &["bulk_add"])
                    .await?;
                core.broker
                    .enqueue(QueuePayload::BulkAdd {
                        root_path: root_path.to_string_lossy().to_string(),
                        library_id,
                        prefix,
                        overwrite_existing,
                        auto_add,
                        trigger_scan,
                        job_id: job.id,
                    })
                    .await?;
                println!("queued bulk add job {}", job.id);
            }
        },
        Command::Job { command } => match command {
            JobCommand::List { collection_id } => {
                let _ = CollectionStore::get(db, collection_id).await?;
                println!("use `picturactl job show <job_id>` for per-stage detail");
                let _ = collection_id;
            }
            JobCommand::Show { job_id } => {
                let job = BackgroundJobStore::get(db, job_id).await?;
                println!("job {} - {} ({})", job.id, job.job_type, job.status);
                let stages = BackgroundJobStore::stages(&job)?;
                let mut table = Table::new();
                table.set_header(vec!["Stage", "Status", "Completed", "Failed", "Total"]);
                for (name, state) in stages {
                    table.add_row(vec![
                        name,
                        state.status,
                        state.completed.to_string(),
                        state.failed.to_string(),
                        state.total.to_string(),
                    ]);
                }
                println!("{table}");
                if let Some(error) = job.error {
                    println!("error: {error}");
                }
            }
            JobCommand::Cancel { job_id } => {
                BackgroundJobStore::cancel(db, job_id).await?;
                println!("cancelled job {job_id}");
            }
        },
        Command::CacheFolder { command } => match command {
            CacheFolderCommand::Add {
                path,
                capacity_bytes,
                watermark,
                priority,
            } => {
                let folder = CacheFolderStore::create(
                    db,
                    &path.to_string_lossy(),
                    capacity_bytes,
                    watermark,
                    priority,
                )
                .await?;
                println!("registered cache folder {}", folder.id);
            }
            CacheFolderCommand::List => {
                let folders = CacheFolderStore::list(db).await?;
                let mut table = Table::new();
                table.set_header(vec!["ID", "Path", "Used", "Capacity", "Priority", "Status"]);
                for folder in folders {
                    table.add_row(vec![
                        folder.id.to_string(),
                        folder.path,
                        folder.used_bytes.to_string(),
                        folder.capacity_bytes.to_string(),
                        folder.priority.to_string(),
                        folder.status,
                    ]);
                }
                println!("{table}");
            }
            CacheFolderCommand::Recalculate { id, actual_bytes } => {
                let folder = CacheFolderStore::recalculate(db, id, actual_bytes).await?;
                println!("cache folder {} now reports {} bytes used", folder.id, folder.used_bytes);
            }
        },
        Command::Scheduler { command } => match command {
            SchedulerCommand::RecreateBinding { library_id } => {
                let ctx = core.worker_context();
                pictura_core::scheduler::recreate_binding(&ctx, library_id).await?;
                println!("recreated scheduled-job binding for library {library_id}");
            }
        },
        Command::Queue { command } => match command {
            QueueCommand::DeadLetters => {
                let rows = dead_letter_message::Entity::find().all(db).await?;
                let mut table = Table::new();
                table.set_header(vec!["ID", "Queue", "Attempts", "Failed at", "Error"]);
                for row in rows {
                    table.add_row(vec![
                        row.id.to_string(),
                        row.queue,
                        row.attempts.to_string(),
                        row.failed_at.to_string(),
                        row.error,
                    ]);
                }
                println!("{table}");
            }
        },
    }

    Ok(())
}
