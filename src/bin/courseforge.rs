//! courseforge CLI — worker daemon plus operator tools for submitting and
//! inspecting generation runs.

use clap::{Parser, Subcommand};
use courseforge::config::Config;
use courseforge::db::Db;
use courseforge::llm::ClaudeGenerator;
use courseforge::model::{JobPayload, JobType, RunId};
use courseforge::queue::JobQueue;
use courseforge::store::{CourseStore, NewRoadmap, RunStore};
use courseforge::telemetry::{TelemetryConfig, init_telemetry};
use courseforge::worker::{Worker, WorkerConfig};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "courseforge", about = "Course generation worker and operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the generation worker daemon
    Serve {
        /// Upper bound (seconds) for one blocking dequeue
        #[arg(long, default_value_t = 30)]
        dequeue_timeout: u64,
    },
    /// Roadmap (source spec) operations
    Roadmap {
        #[command(subcommand)]
        action: RoadmapAction,
    },
    /// Create a queued run and enqueue its generation job
    Submit {
        #[command(subcommand)]
        action: SubmitAction,
    },
    /// Generation run operations
    Run {
        #[command(subcommand)]
        action: RunAction,
    },
}

#[derive(Subcommand)]
enum RoadmapAction {
    /// Create a roadmap to generate from
    Create {
        /// Roadmap title
        title: String,
        /// Subject area, e.g. "applied statistics"
        field: String,
        /// Learner level, e.g. "beginner"
        #[arg(long, default_value = "beginner")]
        level: String,
        #[arg(long, default_value_t = 5)]
        weekly_hours: i32,
        #[arg(long, default_value_t = 8)]
        duration_weeks: i32,
        /// Owner user id (random if omitted)
        #[arg(long)]
        owner: Option<Uuid>,
    },
}

#[derive(Subcommand)]
enum SubmitAction {
    /// Plan the outline and create the course skeleton
    Outline {
        /// Roadmap id to plan from
        roadmap: Uuid,
    },
    /// Fill a course's modules with content
    Content {
        /// Course id to fill
        course: Uuid,
        /// Regenerate modules that already have content
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Subcommand)]
enum RunAction {
    /// Show a run's status projection
    Show {
        /// Run id
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { dequeue_timeout } => cmd_serve(dequeue_timeout).await,
        command => {
            let config = Config::from_env()?;
            let db = Db::connect(config.database_url.expose_secret()).await?;
            db.migrate().await?;

            match command {
                Command::Roadmap {
                    action:
                        RoadmapAction::Create {
                            title,
                            field,
                            level,
                            weekly_hours,
                            duration_weeks,
                            owner,
                        },
                } => {
                    let id = db
                        .create_roadmap(NewRoadmap {
                            owner_id: owner.unwrap_or_else(Uuid::new_v4),
                            title,
                            field,
                            level,
                            weekly_hours,
                            duration_weeks,
                        })
                        .await?;
                    println!("Created roadmap {id}");
                    Ok(())
                }
                Command::Submit { action } => cmd_submit(&db, action).await,
                Command::Run {
                    action: RunAction::Show { id },
                } => cmd_run_show(&db, id).await,
                Command::Serve { .. } => unreachable!("handled above"),
            }
        }
    }
}

async fn cmd_serve(dequeue_timeout: u64) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "courseforge".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;

    let generator = ClaudeGenerator::new(&config.anthropic_api_key, &config.generator_model)?;

    let db = Arc::new(db);
    let worker = Worker::new(
        Arc::clone(&db),
        db,
        Arc::new(generator),
        WorkerConfig {
            dequeue_timeout: Duration::from_secs(dequeue_timeout),
        },
    );

    let handle = worker.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        handle.shutdown();
    });

    worker.run().await?;
    Ok(())
}

async fn cmd_submit(db: &Db, action: SubmitAction) -> anyhow::Result<()> {
    match action {
        SubmitAction::Outline { roadmap } => {
            let spec = db.get_roadmap(roadmap).await?;
            let run_id = db.create_run(spec.owner_id, spec.id).await?;
            let task_id = db
                .enqueue(JobType::Outline, run_id, JobPayload::default())
                .await?;
            println!("Submitted outline job {task_id} for run {}", run_id.0);
        }
        SubmitAction::Content { course, overwrite } => {
            let container = db.get_course(course).await?;
            let run_id = db
                .create_run(container.owner_id, container.roadmap_id)
                .await?;
            let task_id = db
                .enqueue(
                    JobType::Content,
                    run_id,
                    JobPayload {
                        course_id: Some(course),
                        overwrite,
                    },
                )
                .await?;
            println!("Submitted content job {task_id} for run {}", run_id.0);
        }
    }
    Ok(())
}

async fn cmd_run_show(db: &Db, id: Uuid) -> anyhow::Result<()> {
    let view = db.run_status(RunId(id)).await?;

    println!("Run:      {}", view.id.0);
    println!("Status:   {}", view.status);
    println!("Progress: {}%", view.progress);
    println!("Message:  {}", view.message.as_deref().unwrap_or("-"));
    println!("Error:    {}", view.error.as_deref().unwrap_or("-"));
    println!(
        "Course:   {}",
        view.course_id
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(ref result) = view.result {
        println!("Result:   {}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}
