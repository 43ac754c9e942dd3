mod commands;
mod handlers;

pub use commands::{
    Cli, Commands, KnowledgeAction, KnowledgeCommand, NoticesAction, NoticesCommand, RadarAction,
    RadarCommand, TaskTarget, TasksAction, TasksCommand,
};
pub use handlers::{
    handle_delete, handle_init, handle_knowledge_add, handle_knowledge_list, handle_login,
    handle_logout, handle_notices_confirm, handle_notices_list, handle_notices_post,
    handle_radar_add, handle_radar_execute, handle_radar_list, handle_status,
    handle_tasks_add, handle_tasks_complete, handle_tasks_edit, handle_tasks_list, handle_watch,
    DeleteTarget,
};
