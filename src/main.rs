use clap::Parser;
use rebanho::cli::{
    handle_delete, handle_init, handle_knowledge_add, handle_knowledge_list, handle_login,
    handle_logout, handle_notices_confirm, handle_notices_list, handle_notices_post,
    handle_radar_add, handle_radar_execute, handle_radar_list, handle_status, handle_tasks_add,
    handle_tasks_complete, handle_tasks_edit, handle_tasks_list, handle_watch, Cli, Commands,
    DeleteTarget, KnowledgeAction, NoticesAction, RadarAction, TasksAction,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // RUST_LOG overrides, e.g. RUST_LOG=rebanho=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rebanho=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Init {
            remote_url,
            remote_key,
        } => handle_init(config, remote_url, remote_key),
        Commands::Login {
            email,
            password_stdin,
        } => handle_login(config, email, password_stdin).await,
        Commands::Logout => handle_logout(config).await,
        Commands::Status { json } => handle_status(config, json).await,
        Commands::Tasks(tasks_cmd) => match tasks_cmd.action {
            TasksAction::List {
                pending,
                date,
                json,
            } => handle_tasks_list(config, pending, date, json).await,
            TasksAction::Add {
                title,
                category,
                date,
                time,
                repeat,
                interval,
                weekdays,
                day_of_month,
                limit,
                assignee,
                instructions,
                target,
                json,
            } => {
                handle_tasks_add(
                    config,
                    title,
                    category,
                    date,
                    time,
                    repeat,
                    interval,
                    weekdays,
                    day_of_month,
                    limit,
                    assignee,
                    instructions,
                    target,
                    json,
                )
                .await
            }
            TasksAction::Edit {
                id,
                title,
                category,
                date,
                time,
                assignee,
                instructions,
                target,
                json,
            } => {
                handle_tasks_edit(
                    config,
                    id,
                    title,
                    category,
                    date,
                    time,
                    assignee,
                    instructions,
                    target,
                    json,
                )
                .await
            }
            TasksAction::Complete { id, notes, json } => {
                handle_tasks_complete(config, id, notes, json).await
            }
            TasksAction::Delete { id, force } => {
                handle_delete(config, DeleteTarget::Task, id, force).await
            }
        },
        Commands::Notices(notices_cmd) => match notices_cmd.action {
            NoticesAction::List { unconfirmed, json } => {
                handle_notices_list(config, unconfirmed, json).await
            }
            NoticesAction::Post {
                title,
                message,
                stdin,
                priority,
                json,
            } => handle_notices_post(config, title, message, stdin, priority, json).await,
            NoticesAction::Confirm { id } => handle_notices_confirm(config, id).await,
            NoticesAction::Delete { id, force } => {
                handle_delete(config, DeleteTarget::Notice, id, force).await
            }
        },
        Commands::Knowledge(knowledge_cmd) => match knowledge_cmd.action {
            KnowledgeAction::List { category, json } => {
                handle_knowledge_list(config, category, json).await
            }
            KnowledgeAction::Add {
                title,
                category,
                content,
                stdin,
                json,
            } => handle_knowledge_add(config, title, category, content, stdin, json).await,
            KnowledgeAction::Delete { id, force } => {
                handle_delete(config, DeleteTarget::Knowledge, id, force).await
            }
        },
        Commands::Radar(radar_cmd) => match radar_cmd.action {
            RadarAction::List { json } => handle_radar_list(config, json).await,
            RadarAction::Add {
                title,
                group,
                scores,
                notes,
                json,
            } => handle_radar_add(config, title, group, scores, notes, json).await,
            RadarAction::Execute { id } => handle_radar_execute(config, id).await,
            RadarAction::Delete { id, force } => {
                handle_delete(config, DeleteTarget::Radar, id, force).await
            }
        },
        Commands::Watch => handle_watch(config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e.user_message());
        eprintln!("  {}", e);
        std::process::exit(1);
    }
}
