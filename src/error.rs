use thiserror::Error;

#[derive(Error, Debug)]
pub enum RebanhoError {
    #[error("Not in a rebanho project. Run 'rebanho init' first.")]
    NotInitialized,

    #[error("Already initialized. Remove .rebanho/ to reinitialize.")]
    AlreadyInitialized,

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Ambiguous id '{0}' matches more than one entity")]
    AmbiguousId(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The remote store could not be reached or is misconfigured.
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),

    /// The remote store answered but refused the request (constraint violation, bad filter, ...).
    #[error("Remote store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Not signed in. Run 'rebanho login' first.")]
    NotAuthenticated,

    #[error("Only a manager can {0}")]
    Forbidden(String),

    #[error("Another change is still being saved")]
    MutationInFlight,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl RebanhoError {
    /// Message shown to farm staff. Internal detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            RebanhoError::NotInitialized => "Projeto não inicializado. Execute 'rebanho init'.",
            RebanhoError::AlreadyInitialized => "Projeto já inicializado.",
            RebanhoError::Config(_) | RebanhoError::Yaml(_) => "Configuração inválida.",
            RebanhoError::InvalidCredentials => "Email ou senha incorretos.",
            RebanhoError::AuthFailed(_) => "Erro ao fazer login. Tente novamente.",
            RebanhoError::NotAuthenticated => "Faça login para continuar.",
            RebanhoError::Forbidden(_) => "Apenas gerentes podem realizar esta ação.",
            RebanhoError::EntityNotFound(_) => "Registro não encontrado.",
            RebanhoError::AmbiguousId(_) => "Mais de um registro corresponde a este código.",
            RebanhoError::Validation(_) => "Preencha todos os campos obrigatórios.",
            RebanhoError::MutationInFlight => "Aguarde a conclusão da alteração anterior.",
            RebanhoError::Unreachable(_) => "Sem conexão com o servidor. Tente novamente mais tarde.",
            _ => "Erro ao salvar. Tente novamente.",
        }
    }
}

pub type Result<T> = std::result::Result<T, RebanhoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_have_distinct_messages() {
        let invalid = RebanhoError::InvalidCredentials.user_message();
        let other = RebanhoError::AuthFailed("timeout".to_string()).user_message();
        assert_ne!(invalid, other);
    }

    #[test]
    fn test_rejections_use_generic_message() {
        let err = RebanhoError::Rejected {
            status: 409,
            message: "duplicate key".to_string(),
        };
        assert_eq!(err.user_message(), "Erro ao salvar. Tente novamente.");
        assert!(err.to_string().contains("409"));
    }
}
