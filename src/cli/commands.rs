use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rebanho")]
#[command(version, about = "Farm management for sheep husbandry: tasks, notices, knowledge base and radar analyses")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file to use instead of .rebanho/config.yaml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a rebanho project in the current directory
    Init {
        /// Hosted service URL (leave out to work locally)
        #[arg(long)]
        remote_url: Option<String>,

        /// Hosted service API key
        #[arg(long)]
        remote_key: Option<String>,
    },

    /// Sign in
    Login {
        /// Account email
        email: String,

        /// Read the password from stdin instead of prompting
        #[arg(long)]
        password_stdin: bool,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show backend mode, signed-in user and pending work
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scheduled tasks (manejos)
    Tasks(TasksCommand),

    /// Notices (avisos)
    Notices(NoticesCommand),

    /// Knowledge base
    Knowledge(KnowledgeCommand),

    /// Radar analyses
    Radar(RadarCommand),

    /// Follow remote changes and alert on unconfirmed urgent notices
    Watch,
}

#[derive(Args, Debug)]
pub struct TasksCommand {
    #[command(subcommand)]
    pub action: TasksAction,
}

#[derive(Args, Debug, Default)]
pub struct TaskTarget {
    /// Whole animal group (lote) the task applies to
    #[arg(long)]
    pub group: Option<String>,

    /// Animal ids (comma-separated or repeated); ignored with --group
    #[arg(long = "animal", value_delimiter = ',')]
    pub animals: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum TasksAction {
    /// List tasks
    List {
        /// Only pending tasks
        #[arg(long)]
        pending: bool,

        /// Only tasks planned for this date (YYYY-MM-DD or DD/MM/YYYY)
        #[arg(long)]
        date: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Schedule a task
    Add {
        /// Task title
        title: String,

        /// Task type (vacinação, pesagem, ...)
        #[arg(long, short = 'c', default_value = "geral")]
        category: String,

        /// Planned date; defaults to today
        #[arg(long)]
        date: Option<String>,

        /// Planned time (HH:MM)
        #[arg(long)]
        time: Option<String>,

        /// Recurrence (none, daily, weekly, monthly)
        #[arg(long, default_value = "none")]
        repeat: String,

        /// Days between occurrences for daily recurrence
        #[arg(long, default_value_t = 1)]
        interval: u32,

        /// Weekdays for weekly recurrence, 0 = Sunday .. 6 = Saturday
        #[arg(long = "weekday", value_delimiter = ',')]
        weekdays: Vec<u8>,

        /// Day of month for monthly recurrence
        #[arg(long)]
        day_of_month: Option<u32>,

        /// Stop generating occurrences at this count
        #[arg(long)]
        limit: Option<u32>,

        /// Person responsible
        #[arg(long)]
        assignee: Option<String>,

        /// Instructions for whoever executes the task
        #[arg(long)]
        instructions: Option<String>,

        #[command(flatten)]
        target: TaskTarget,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change a task
    Edit {
        /// Task id (UUID or prefix)
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, short = 'c')]
        category: Option<String>,

        #[arg(long)]
        date: Option<String>,

        /// Planned time (HH:MM); empty string clears it
        #[arg(long)]
        time: Option<String>,

        /// Empty string clears it
        #[arg(long)]
        assignee: Option<String>,

        /// Empty string clears it
        #[arg(long)]
        instructions: Option<String>,

        #[command(flatten)]
        target: TaskTarget,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark a task done; recurring tasks schedule their next occurrence
    Complete {
        /// Task id (UUID or prefix)
        id: String,

        /// Notes about the execution
        #[arg(long)]
        notes: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a task
    Delete {
        /// Task id (UUID or prefix)
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct NoticesCommand {
    #[command(subcommand)]
    pub action: NoticesAction,
}

#[derive(Subcommand, Debug)]
pub enum NoticesAction {
    /// List notices
    List {
        /// Only notices you have not confirmed
        #[arg(long)]
        unconfirmed: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Post a notice (managers only)
    Post {
        /// Notice title
        title: String,

        /// Notice text
        #[arg(long, short = 'm')]
        message: Option<String>,

        /// Read the notice text from stdin
        #[arg(long)]
        stdin: bool,

        /// Priority (normal, high, urgent)
        #[arg(long, short = 'p', default_value = "normal")]
        priority: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Confirm you have read a notice
    Confirm {
        /// Notice id (UUID or prefix)
        id: String,
    },

    /// Delete a notice (managers only)
    Delete {
        /// Notice id (UUID or prefix)
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct KnowledgeCommand {
    #[command(subcommand)]
    pub action: KnowledgeAction,
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeAction {
    /// List knowledge-base entries
    List {
        /// Only entries in this category
        #[arg(long, short = 'c')]
        category: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add an entry
    Add {
        /// Entry title
        title: String,

        #[arg(long, short = 'c')]
        category: Option<String>,

        /// Entry text
        #[arg(long)]
        content: Option<String>,

        /// Read the entry text from stdin
        #[arg(long)]
        stdin: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete an entry
    Delete {
        /// Entry id (UUID or prefix)
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct RadarCommand {
    #[command(subcommand)]
    pub action: RadarAction,
}

#[derive(Subcommand, Debug)]
pub enum RadarAction {
    /// List radar analyses
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record an analysis
    Add {
        /// Analysis title
        title: String,

        /// Animal group assessed
        #[arg(long)]
        group: Option<String>,

        /// Axis score as "axis=value" (can be specified multiple times)
        #[arg(long = "score", short = 's')]
        scores: Vec<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark an analysis as executed
    Execute {
        /// Analysis id (UUID or prefix)
        id: String,
    },

    /// Delete an analysis
    Delete {
        /// Analysis id (UUID or prefix)
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}
