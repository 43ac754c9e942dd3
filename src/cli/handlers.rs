use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::commands::TaskTarget;
use crate::app::App;
use crate::auth::Credentials;
use crate::config::{config_path, data_dir, find_project_root, Config, RemoteSection};
use crate::dates;
use crate::entity::{
    KnowledgeEntry, NewKnowledgeEntry, NewNotice, NewRadarAnalysis, NewTask, Notice,
    NoticePriority, RadarAnalysis, Record, Task, TaskPatch,
};
use crate::error::{RebanhoError, Result};
use crate::recurrence::{Frequency, Recurrence};
use crate::storage::{EntityService, SqliteBlobStore};
use crate::sync::{AlertLoop, TerminalBell};
use crate::views::NoticeBoard;

fn find_root() -> Result<PathBuf> {
    let cwd = env::current_dir()?;
    find_project_root(&cwd).ok_or(RebanhoError::NotInitialized)
}

fn load_config(root: &Path, config: Option<&Path>) -> Result<Config> {
    let path = config.map(Path::to_path_buf).unwrap_or_else(|| config_path(root));
    debug!(path = %path.display(), "loading config");
    Ok(Config::load(&path)?.with_env_overrides())
}

fn open_app(config: Option<&Path>) -> Result<App> {
    let root = find_root()?;
    App::open(&root, load_config(&root, config)?)
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut content = String::new();
    io::stdin().read_to_string(&mut content)?;
    Ok(content)
}

fn read_password(from_stdin: bool) -> Result<String> {
    if !from_stdin && atty::is(atty::Stream::Stdin) {
        eprint!("Password: ");
    }
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

/// Ask before deleting unless `force`. Non-interactive runs must pass
/// `--force`.
fn confirm_delete(kind: &str, id: Uuid, title: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }
    eprintln!("Delete {} ({}) - {}? [y/N] ", kind, short_id(id), title);

    if atty::is(atty::Stream::Stdin) {
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(false);
        }
        Ok(true)
    } else {
        Err(RebanhoError::Validation(
            "use --force to delete in non-interactive mode".to_string(),
        ))
    }
}

/// Empty string means "clear the field".
fn optional_edit(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| if v.trim().is_empty() { None } else { Some(v) })
}

fn parse_recurrence(
    repeat: &str,
    interval: u32,
    weekdays: Vec<u8>,
    day_of_month: Option<u32>,
    limit: Option<u32>,
) -> Result<Recurrence> {
    let frequency: Frequency = repeat.parse().map_err(RebanhoError::Validation)?;
    let rule = match frequency {
        Frequency::None => Recurrence::none(),
        Frequency::Daily => {
            if interval == 0 {
                return Err(RebanhoError::Validation("interval must be at least 1".to_string()));
            }
            Recurrence::daily(interval)
        }
        Frequency::Weekly => {
            if weekdays.is_empty() || weekdays.iter().any(|d| *d > 6) {
                return Err(RebanhoError::Validation(
                    "weekly tasks need --weekday values between 0 and 6".to_string(),
                ));
            }
            Recurrence::weekly(weekdays)
        }
        Frequency::Monthly => {
            if day_of_month.is_some_and(|d| d == 0 || d > 31) {
                return Err(RebanhoError::Validation(
                    "--day-of-month must be between 1 and 31".to_string(),
                ));
            }
            Recurrence::monthly(day_of_month)
        }
    };
    Ok(match limit {
        Some(limit) => rule.with_limit(limit),
        None => rule,
    })
}

fn parse_scores(scores: &[String]) -> Result<BTreeMap<String, f64>> {
    scores
        .iter()
        .map(|s| -> Result<(String, f64)> {
            let (axis, value) = s.split_once('=').ok_or_else(|| {
                RebanhoError::Validation(format!("invalid score '{}', expected axis=value", s))
            })?;
            let value: f64 = value.trim().replace(',', ".").parse().map_err(|_| {
                RebanhoError::Validation(format!("invalid score value in '{}'", s))
            })?;
            Ok((axis.trim().to_string(), value))
        })
        .collect()
}

fn print_task(task: &Task) {
    let time = task.planned_time.map(dates::format_time).unwrap_or_default();
    let target = match (&task.group, task.animal_ids.is_empty()) {
        (Some(group), _) => format!(" lote {}", group),
        (None, false) => format!(" animais {}", task.animal_ids.join(",")),
        (None, true) => String::new(),
    };
    println!(
        "  {} {} {:5} [{}] {} ({}) {}{}",
        short_id(task.id),
        dates::format_display(task.planned_date),
        time,
        task.status,
        task.title,
        task.category,
        task.recurrence.describe(),
        target
    );
}

fn print_notice(notice: &Notice, user: &str) {
    let mark = if notice.is_confirmed_by(user) { "✓" } else { " " };
    println!(
        "  {} {} [{}] {} - {} ({}, {} confirmations)",
        mark,
        short_id(notice.id),
        notice.priority,
        notice.title,
        notice.body,
        notice.author,
        notice.confirmations.len()
    );
}

pub fn handle_init(config: Option<PathBuf>, remote_url: Option<String>, remote_key: Option<String>) -> Result<()> {
    let root = env::current_dir()?;
    let dir = data_dir(&root);
    if dir.exists() {
        return Err(RebanhoError::AlreadyInitialized);
    }
    fs::create_dir_all(&dir)?;

    let settings = Config {
        remote: RemoteSection {
            url: remote_url,
            api_key: remote_key,
        },
        ..Default::default()
    };
    let path = config.unwrap_or_else(|| config_path(&root));
    if !path.exists() {
        settings.save(&path)?;
    }
    SqliteBlobStore::open(&dir)?;

    info!(root = %root.display(), "project initialized");
    println!("Initialized rebanho project in {}", root.display());
    println!("  storage: {}", settings.backend_mode());
    Ok(())
}

pub async fn handle_login(config: Option<PathBuf>, email: String, password_stdin: bool) -> Result<()> {
    let mut app = open_app(config.as_deref())?;
    let password = read_password(password_stdin)?;
    let credentials = Credentials::new(&email, &password)?;

    let session = app.sign_in(&credentials).await?;
    println!("Signed in as {} ({})", session.name, session.role);
    Ok(())
}

pub async fn handle_logout(config: Option<PathBuf>) -> Result<()> {
    let mut app = open_app(config.as_deref())?;
    if app.session().is_none() {
        println!("Not signed in.");
        return Ok(());
    }
    app.sign_out().await?;
    println!("Signed out.");
    Ok(())
}

pub async fn handle_status(config: Option<PathBuf>, json: bool) -> Result<()> {
    let app = open_app(config.as_deref())?;

    #[derive(Serialize)]
    struct StatusJson {
        mode: String,
        user: Option<String>,
        role: Option<String>,
        pending_tasks: Option<usize>,
        overdue_tasks: Option<usize>,
        unconfirmed_notices: Option<usize>,
    }

    let mut status = StatusJson {
        mode: app.mode().to_string(),
        user: app.session().map(|s| s.name.clone()),
        role: app.session().map(|s| s.role.to_string()),
        pending_tasks: None,
        overdue_tasks: None,
        unconfirmed_notices: None,
    };

    if let Some(session) = app.session() {
        let tasks = app.tasks().service().get_all().await?;
        let today = dates::today();
        let pending: Vec<&Task> = tasks.iter().filter(|t| !t.is_done()).collect();
        status.pending_tasks = Some(pending.len());
        status.overdue_tasks = Some(pending.iter().filter(|t| t.planned_date < today).count());

        let notices = app.notices().service().get_all().await?;
        status.unconfirmed_notices = Some(
            notices
                .iter()
                .filter(|n| !n.is_confirmed_by(&session.email))
                .count(),
        );
    }

    if json {
        return print_json(&status);
    }

    println!("Storage: {}", status.mode);
    match (&status.user, &status.role) {
        (Some(user), Some(role)) => println!("User:    {} ({})", user, role),
        _ => println!("User:    not signed in"),
    }
    if let (Some(pending), Some(overdue), Some(notices)) =
        (status.pending_tasks, status.overdue_tasks, status.unconfirmed_notices)
    {
        println!("Tasks:   {} pending, {} overdue", pending, overdue);
        println!("Notices: {} unconfirmed", notices);
    }
    Ok(())
}

pub async fn handle_tasks_list(config: Option<PathBuf>, pending: bool, date: Option<String>, json: bool) -> Result<()> {
    let app = open_app(config.as_deref())?;
    app.require_session()?;
    let date = date.as_deref().map(dates::parse_date).transpose()?;

    let tasks: Vec<Task> = app
        .tasks()
        .service()
        .get_all()
        .await?
        .into_iter()
        .filter(|t| !pending || !t.is_done())
        .filter(|t| date.map_or(true, |d| t.planned_date == d))
        .collect();

    if json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }
    println!("Tasks ({}):\n", tasks.len());
    for task in &tasks {
        print_task(task);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_tasks_add(
    config: Option<PathBuf>,
    title: String,
    category: String,
    date: Option<String>,
    time: Option<String>,
    repeat: String,
    interval: u32,
    weekdays: Vec<u8>,
    day_of_month: Option<u32>,
    limit: Option<u32>,
    assignee: Option<String>,
    instructions: Option<String>,
    target: TaskTarget,
    json: bool,
) -> Result<()> {
    let app = open_app(config.as_deref())?;
    app.require_session()?;

    let draft = NewTask {
        title,
        category,
        recurrence: parse_recurrence(&repeat, interval, weekdays, day_of_month, limit)?,
        planned_date: match date {
            Some(d) => dates::parse_date(&d)?,
            None => dates::today(),
        },
        planned_time: time.as_deref().map(dates::parse_time).transpose()?,
        assigned_to: assignee,
        instructions,
        group: target.group,
        animal_ids: target.animals,
    };
    let task = app.tasks().service().create(draft).await?;

    if json {
        return print_json(&task);
    }
    println!(
        "Created task ({}) - {} on {}",
        short_id(task.id),
        task.title,
        dates::format_display(task.planned_date)
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_tasks_edit(
    config: Option<PathBuf>,
    id: String,
    title: Option<String>,
    category: Option<String>,
    date: Option<String>,
    time: Option<String>,
    assignee: Option<String>,
    instructions: Option<String>,
    target: TaskTarget,
    json: bool,
) -> Result<()> {
    let app = open_app(config.as_deref())?;
    let session = app.require_session()?;
    let service = app.tasks().service();
    let task = service.resolve(&id).await?;

    let planned_time = match optional_edit(time) {
        Some(Some(t)) => Some(Some(dates::parse_time(&t)?)),
        Some(None) => Some(None),
        None => None,
    };
    let patch = TaskPatch {
        title,
        category,
        planned_date: date.as_deref().map(dates::parse_date).transpose()?,
        planned_time,
        assigned_to: optional_edit(assignee),
        instructions: optional_edit(instructions),
        group: optional_edit(target.group),
        animal_ids: if target.animals.is_empty() {
            None
        } else {
            Some(target.animals)
        },
        by_manager: session.is_manager(),
        ..Default::default()
    };
    let updated = service.update(task.id, patch).await?;

    if json {
        return print_json(&updated);
    }
    println!("Updated task ({}) - {}", short_id(updated.id), updated.title);
    Ok(())
}

pub async fn handle_tasks_complete(config: Option<PathBuf>, id: String, notes: Option<String>, json: bool) -> Result<()> {
    let app = open_app(config.as_deref())?;
    let session = app.require_session()?;
    let service = app.tasks().service();
    let task = service.resolve(&id).await?;

    let completion = service.complete_task(&task, &session.name, notes).await?;

    if json {
        #[derive(Serialize)]
        struct CompletionJson<'a> {
            completed: &'a Task,
            next: Option<&'a Task>,
        }
        return print_json(&CompletionJson {
            completed: &completion.completed,
            next: completion.next.as_ref(),
        });
    }

    println!(
        "Completed task ({}) - {}",
        short_id(completion.completed.id),
        completion.completed.title
    );
    if let Some(next) = &completion.next {
        println!(
            "  next occurrence ({}) on {}",
            short_id(next.id),
            dates::format_display(next.planned_date)
        );
    }
    Ok(())
}

pub async fn handle_notices_list(config: Option<PathBuf>, unconfirmed: bool, json: bool) -> Result<()> {
    let app = open_app(config.as_deref())?;
    let session = app.require_session()?;

    let notices: Vec<Notice> = app
        .notices()
        .service()
        .get_all()
        .await?
        .into_iter()
        .filter(|n| !unconfirmed || !n.is_confirmed_by(&session.email))
        .collect();

    if json {
        return print_json(&notices);
    }
    if notices.is_empty() {
        println!("No notices.");
        return Ok(());
    }
    for notice in &notices {
        print_notice(notice, &session.email);
    }
    Ok(())
}

pub async fn handle_notices_post(
    config: Option<PathBuf>,
    title: String,
    message: Option<String>,
    stdin: bool,
    priority: String,
    json: bool,
) -> Result<()> {
    let app = open_app(config.as_deref())?;
    let session = app.require_session()?;
    session.require_manager("post notices")?;

    let body = if stdin { read_stdin()? } else { message.unwrap_or_default() };
    let priority: NoticePriority = priority.parse().map_err(RebanhoError::Validation)?;
    let notice = app
        .notices()
        .service()
        .create(NewNotice {
            title,
            body: body.trim().to_string(),
            priority,
            author: session.name.clone(),
        })
        .await?;

    if json {
        return print_json(&notice);
    }
    println!("Posted notice ({}) - {}", short_id(notice.id), notice.title);
    Ok(())
}

pub async fn handle_notices_confirm(config: Option<PathBuf>, id: String) -> Result<()> {
    let app = open_app(config.as_deref())?;
    let session = app.require_session()?;
    let board = app.notices();
    let notice = board.service().resolve(&id).await?;

    board.reload().await?;
    if board.confirm(notice.id, &session.email).await? {
        println!("Confirmed notice ({}) - {}", short_id(notice.id), notice.title);
    } else {
        println!("Already confirmed ({}) - {}", short_id(notice.id), notice.title);
    }
    Ok(())
}

pub async fn handle_knowledge_list(config: Option<PathBuf>, category: Option<String>, json: bool) -> Result<()> {
    let app = open_app(config.as_deref())?;
    app.require_session()?;

    let entries: Vec<KnowledgeEntry> = app
        .knowledge()
        .service()
        .get_all()
        .await?
        .into_iter()
        .filter(|e| {
            category.as_deref().map_or(true, |c| {
                e.category.as_deref().is_some_and(|ec| ec.eq_ignore_ascii_case(c))
            })
        })
        .collect();

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No entries.");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "  {} [{}] {}",
            short_id(entry.id),
            entry.category.as_deref().unwrap_or("-"),
            entry.title
        );
    }
    Ok(())
}

pub async fn handle_knowledge_add(
    config: Option<PathBuf>,
    title: String,
    category: Option<String>,
    content: Option<String>,
    stdin: bool,
    json: bool,
) -> Result<()> {
    let app = open_app(config.as_deref())?;
    let session = app.require_session()?;

    let content = if stdin { read_stdin()? } else { content.unwrap_or_default() };
    let entry = app
        .knowledge()
        .service()
        .create(NewKnowledgeEntry {
            title,
            category,
            content: content.trim().to_string(),
            author: Some(session.name.clone()),
        })
        .await?;

    if json {
        return print_json(&entry);
    }
    println!("Added entry ({}) - {}", short_id(entry.id), entry.title);
    Ok(())
}

pub async fn handle_radar_list(config: Option<PathBuf>, json: bool) -> Result<()> {
    let app = open_app(config.as_deref())?;
    app.require_session()?;
    let analyses = app.radar().service().get_all().await?;

    if json {
        return print_json(&analyses);
    }
    if analyses.is_empty() {
        println!("No radar analyses.");
        return Ok(());
    }
    for a in &analyses {
        let average = a
            .average_score()
            .map(|v| format!("{:.1}", v))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} [{}] {} ({}) avg {}",
            short_id(a.id),
            a.status,
            a.title,
            a.group.as_deref().unwrap_or("-"),
            average
        );
    }
    Ok(())
}

pub async fn handle_radar_add(
    config: Option<PathBuf>,
    title: String,
    group: Option<String>,
    scores: Vec<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let app = open_app(config.as_deref())?;
    app.require_session()?;

    let analysis = app
        .radar()
        .service()
        .create(NewRadarAnalysis {
            title,
            group,
            scores: parse_scores(&scores)?,
            notes,
        })
        .await?;

    if json {
        return print_json(&analysis);
    }
    println!("Recorded analysis ({}) - {}", short_id(analysis.id), analysis.title);
    Ok(())
}

pub async fn handle_radar_execute(config: Option<PathBuf>, id: String) -> Result<()> {
    let app = open_app(config.as_deref())?;
    app.require_session()?;
    let service = app.radar().service();
    let analysis = service.resolve(&id).await?;

    if service.mark_executed(analysis.id).await? {
        println!("Marked executed ({}) - {}", short_id(analysis.id), analysis.title);
    } else {
        println!("Already executed ({}) - {}", short_id(analysis.id), analysis.title);
    }
    Ok(())
}

/// Which collection `rebanho <kind> delete` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    Task,
    Notice,
    Knowledge,
    Radar,
}

async fn delete_entity<E: Record>(service: &EntityService<E>, id: &str, force: bool) -> Result<()> {
    let entity = service.resolve(id).await?;
    if !confirm_delete(E::KIND, entity.id(), entity.title(), force)? {
        return Ok(());
    }
    service.delete(entity.id()).await?;
    println!("Deleted {} ({}) - {}", E::KIND, short_id(entity.id()), entity.title());
    Ok(())
}

pub async fn handle_delete(config: Option<PathBuf>, target: DeleteTarget, id: String, force: bool) -> Result<()> {
    let app = open_app(config.as_deref())?;
    let session = app.require_session()?;

    match target {
        DeleteTarget::Task => delete_entity::<Task>(app.tasks().service(), &id, force).await,
        DeleteTarget::Notice => {
            session.require_manager("delete notices")?;
            delete_entity::<Notice>(app.notices().service(), &id, force).await
        }
        DeleteTarget::Knowledge => {
            delete_entity::<KnowledgeEntry>(app.knowledge().service(), &id, force).await
        }
        DeleteTarget::Radar => {
            delete_entity::<RadarAnalysis>(app.radar().service(), &id, force).await
        }
    }
}

/// Urgent notices `user` still has to confirm. With `reload` the board is
/// refreshed first; a failed refresh keeps the previous snapshot.
async fn poll_urgent(board: &NoticeBoard, user: &str, reload: bool) -> Vec<Notice> {
    if reload {
        if let Err(e) = board.reload().await {
            warn!(error = %e, "notice refresh failed, using last snapshot");
        }
    }
    board.pending_urgent(user)
}

pub async fn handle_watch(config: Option<PathBuf>) -> Result<()> {
    let app = open_app(config.as_deref())?;
    let user = app.require_session()?.email.clone();
    let interval = Duration::from_secs(app.config().alert_interval_secs);

    app.reload_all().await?;

    let feed = app.connect_feed().await?;
    let mut subscriptions = Vec::new();
    if let Some(feed) = &feed {
        subscriptions.push(app.tasks().watch(feed).await?);
        subscriptions.push(app.notices().watch(feed).await?);
        subscriptions.push(app.knowledge().watch(feed).await?);
        subscriptions.push(app.radar().watch(feed).await?);
        println!("Watching remote changes ({}). Press Ctrl-C to stop.", app.mode());
    } else {
        println!("Watching local notices every {}s. Press Ctrl-C to stop.", interval.as_secs());
    }

    let bell = Arc::new(TerminalBell);
    let mut alert: Option<AlertLoop> = None;
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = ticker.tick() => {
                let running = alert.as_ref().is_some_and(AlertLoop::is_running);
                if running {
                    continue;
                }
                let urgent = poll_urgent(app.notices(), &user, feed.is_none()).await;
                if urgent.is_empty() {
                    continue;
                }
                for notice in &urgent {
                    println!("URGENT ({}) - {}: {}", short_id(notice.id), notice.title, notice.body);
                }
                alert = Some(app.notices().alert_until_confirmed(&user, interval, bell.clone()));
            }
        }
    }

    if let Some(alert) = alert {
        alert.stop();
    }
    for subscription in subscriptions {
        subscription.unsubscribe().await;
    }
    println!("Stopped.");
    Ok(())
}
