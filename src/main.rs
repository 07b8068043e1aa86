use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use maintenance_workflow::config::DEFAULT_CONFIG_FILE;
use maintenance_workflow::{
    init_telemetry, Action, LogTransport, MailNotifier, MaintenanceWorkflowConfig,
    NewRequestPayload, Principal, PrincipalId, RequestFilter, RequestId, RequestStatus, Role,
    RoleKey, TransitionPayload, WorkflowEngine,
};

#[derive(Parser)]
#[command(name = "maintflow")]
#[command(about = "Maintenance request approval workflow")]
#[command(long_about = "Tracks maintenance requests from submission through production and \
                       maintenance approval, optional engineering management, execution and \
                       completion. Every command prints JSON on stdout.")]
struct Cli {
    /// Configuration file (defaults to ./maintenance-workflow.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Actor {
    /// Id of the principal performing the action
    #[arg(long = "as", value_name = "PRINCIPAL_ID")]
    principal: u64,
}

#[derive(Args)]
struct Decision {
    #[command(flatten)]
    actor: Actor,
    /// Request id
    id: u64,
    /// Comment stored in the history entry
    #[arg(long, default_value = "")]
    comment: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new maintenance request
    Create {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        process: String,
        #[arg(long)]
        equipment: String,
        /// Gravity score (1-5)
        #[arg(long)]
        gravity: u8,
        /// Urgency score (1-5)
        #[arg(long)]
        urgency: u8,
        /// Tendency score (1-5)
        #[arg(long)]
        tendency: u8,
        #[arg(long)]
        photo: Option<String>,
    },
    /// Production supervisor approves an open request
    ApproveProduction(Decision),
    /// Production supervisor rejects an open request
    RejectProduction(Decision),
    /// Maintenance supervisor routes a request as TECHNICAL or ENGINEERING
    ApproveMaintenance {
        #[command(flatten)]
        decision: Decision,
        /// TECHNICAL or ENGINEERING
        #[arg(long = "type", value_name = "TYPE")]
        request_type: Option<String>,
        /// Executor to assign (TECHNICAL only)
        #[arg(long)]
        executor: Option<u64>,
    },
    /// Maintenance supervisor rejects a request
    RejectMaintenance(Decision),
    /// Maintenance manager assigns an engineer to an engineering request
    ApproveManager {
        #[command(flatten)]
        decision: Decision,
        #[arg(long)]
        engineer: Option<u64>,
    },
    /// Assignee records the work done and closes the request
    Finish {
        #[command(flatten)]
        decision: Decision,
        #[arg(long, default_value = "")]
        description: String,
        /// PM04 work-order number (max 50 characters)
        #[arg(long, default_value = "")]
        pm04: String,
        #[arg(long)]
        photo: Option<String>,
    },
    /// Show one request
    Show { id: u64 },
    /// List requests, newest first
    List {
        /// Repeat to match several statuses
        #[arg(long)]
        status: Vec<RequestStatus>,
        #[arg(long)]
        requester: Option<u64>,
        #[arg(long)]
        assigned_to: Option<u64>,
        /// Case-insensitive match on title, equipment, process or status
        #[arg(long)]
        search: Option<String>,
    },
    /// Audit trail of one request
    History { id: u64 },
    /// Counts per stage
    Board,
    /// List principals, optionally of one role
    Principals {
        #[arg(long)]
        role: Option<Role>,
    },
    /// Show or edit the role recipient addresses
    Recipients {
        #[command(subcommand)]
        action: Option<RecipientCommands>,
    },
    /// Write a starter configuration file
    InitConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum RecipientCommands {
    /// Add or replace the address for a role key
    Set {
        key: RoleKey,
        email: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Remove the address for a role key
    Remove { key: RoleKey },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tokio::runtime::Runtime::new()?.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    MaintenanceWorkflowConfig::load_env_file()?;

    if let Commands::InitConfig { path, force } = &cli.command {
        return init_config_command(path, *force);
    }

    let config = MaintenanceWorkflowConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability.log_level, config.observability.json)?;

    if let Commands::Recipients { action } = cli.command {
        let path = cli
            .config
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let output = recipients_command(config, &path, action)?;
        return print_json(&output);
    }

    let engine = build_engine(&config).await?;
    let outcome = execute(&engine, cli.command).await;
    let stats = engine.shutdown().await;
    info!(
        delivered = stats.delivered,
        skipped = stats.skipped,
        failed = stats.failed,
        "Notifications handled"
    );

    print_json(&outcome?)
}

async fn build_engine(config: &MaintenanceWorkflowConfig) -> Result<WorkflowEngine> {
    let store = config.open_store().await?;
    let directory = Arc::new(config.directory());
    let notifier = Arc::new(MailNotifier::new(
        config.notifications.sender.clone(),
        config.notifications.recipient_book()?,
        Arc::new(LogTransport),
    ));

    Ok(WorkflowEngine::new(
        store,
        directory,
        notifier,
        config.notifications.dispatch_settings(),
    ))
}

async fn execute(engine: &WorkflowEngine, command: Commands) -> Result<Value> {
    match command {
        Commands::Create {
            actor,
            title,
            description,
            process,
            equipment,
            gravity,
            urgency,
            tendency,
            photo,
        } => {
            let principal = resolve_actor(engine, &actor).await?;
            let payload = NewRequestPayload {
                title,
                problem_description: description,
                process,
                equipment,
                gravity,
                urgency,
                tendency,
                photo,
            };
            let request = engine.create_request(&principal, payload).await?;
            Ok(serde_json::to_value(request)?)
        }
        Commands::ApproveProduction(decision) => {
            decide(engine, decision, Action::ApproveProduction, TransitionPayload::default()).await
        }
        Commands::RejectProduction(decision) => {
            decide(engine, decision, Action::RejectProduction, TransitionPayload::default()).await
        }
        Commands::ApproveMaintenance {
            decision,
            request_type,
            executor,
        } => {
            let payload = TransitionPayload {
                request_type,
                executor_id: executor.map(PrincipalId),
                ..Default::default()
            };
            decide(engine, decision, Action::ApproveMaintenance, payload).await
        }
        Commands::RejectMaintenance(decision) => {
            decide(engine, decision, Action::RejectMaintenance, TransitionPayload::default()).await
        }
        Commands::ApproveManager { decision, engineer } => {
            let payload = TransitionPayload {
                engineer_id: engineer.map(PrincipalId),
                ..Default::default()
            };
            decide(engine, decision, Action::ApproveManager, payload).await
        }
        Commands::Finish {
            decision,
            description,
            pm04,
            photo,
        } => {
            let payload = TransitionPayload {
                execution_description: Some(description),
                pm04_order: Some(pm04),
                execution_photo: photo,
                ..Default::default()
            };
            decide(engine, decision, Action::FinishExecution, payload).await
        }
        Commands::Show { id } => {
            let request = engine.get_request(RequestId(id)).await?;
            let priority = request.gut.priority();
            let mut value = serde_json::to_value(&request)?;
            value["priority"] = json!(priority);
            value["high_priority"] = json!(request.gut.is_high_priority());
            value["status_label"] = json!(request.status.label());
            Ok(value)
        }
        Commands::List {
            status,
            requester,
            assigned_to,
            search,
        } => {
            let filter = RequestFilter {
                statuses: status,
                requester: requester.map(PrincipalId),
                assigned_to: assigned_to.map(PrincipalId),
                search,
            };
            Ok(serde_json::to_value(engine.list_requests(&filter).await?)?)
        }
        Commands::History { id } => Ok(serde_json::to_value(
            engine.list_history(RequestId(id)).await?,
        )?),
        Commands::Board => Ok(serde_json::to_value(engine.board_summary().await?)?),
        Commands::Principals { role } => {
            Ok(serde_json::to_value(engine.list_principals(role).await?)?)
        }
        Commands::Recipients { .. } | Commands::InitConfig { .. } => {
            Err(anyhow!("command does not use the workflow engine"))
        }
    }
}

async fn decide(
    engine: &WorkflowEngine,
    decision: Decision,
    action: Action,
    mut payload: TransitionPayload,
) -> Result<Value> {
    let principal = resolve_actor(engine, &decision.actor).await?;
    if !decision.comment.is_empty() {
        payload.comment = Some(decision.comment);
    }
    let request = engine
        .transition(&principal, RequestId(decision.id), action, payload)
        .await?;
    Ok(serde_json::to_value(request)?)
}

async fn resolve_actor(engine: &WorkflowEngine, actor: &Actor) -> Result<Principal> {
    engine
        .principal(PrincipalId(actor.principal))
        .await?
        .ok_or_else(|| anyhow!("unknown principal {}", actor.principal))
}

fn recipients_command(
    mut config: MaintenanceWorkflowConfig,
    path: &Path,
    action: Option<RecipientCommands>,
) -> Result<Value> {
    let book = config.notifications.recipient_book()?;

    let changed = match action {
        None => false,
        Some(RecipientCommands::Set {
            key,
            email,
            description,
        }) => {
            book.set(key, &email, &description)?;
            true
        }
        Some(RecipientCommands::Remove { key }) => {
            if book.remove(key).is_none() {
                return Err(anyhow!("no recipient configured for {}", key));
            }
            true
        }
    };

    if changed {
        config.notifications.recipients = book.entries();
        config.save_to_file(path)?;
        info!("Updated recipients in {}", path.display());
    }

    Ok(serde_json::to_value(book.entries())?)
}

fn init_config_command(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    MaintenanceWorkflowConfig::starter().save_to_file(path)?;
    print_json(&json!({ "written": path.display().to_string() }))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
