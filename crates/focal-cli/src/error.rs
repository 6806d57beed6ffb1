use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] focal_core::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Remote sync is not configured. Set FOCAL_SUPABASE_URL and FOCAL_SUPABASE_ANON_KEY, or point FOCAL_CONFIG at a config file."
    )]
    RemoteNotConfigured,
    #[error("Not signed in. Set FOCAL_ACCESS_TOKEN and FOCAL_USER_ID.")]
    NotSignedIn,
}
