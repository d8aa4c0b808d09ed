use thiserror::Error;

/// Terminal failures for one invocation.
///
/// None of these are retried: each one is reported to the user as its
/// `Display` text and the process exits with a non-zero status.
#[derive(Debug, Error)]
pub enum SssError {
    /// Neither the command line nor the config file supplied both
    /// credentials for an action that needs them.
    #[error("You must supply your username AND password in the program arguments, or a configuration file.")]
    MissingCredentials,

    /// The remote rejected the login exchange.
    #[error("Invalid Username or Password")]
    InvalidCredentials,

    /// The cached session id is missing, expired, or no longer the one
    /// the remote hands back.
    #[error("Invalid session. You must login again.")]
    SessionExpired,

    /// The probe response matched neither the success pattern nor a
    /// known failure pattern.
    #[error("Unrecognized response from SSS: {0}")]
    SessionUnknownFailure(String),

    /// Transport-level failure from the HTTP call.
    #[error("Network failure talking to SSS: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote reported an action-specific error message.
    #[error("SSS reported an error: {0}")]
    Remote(String),
}
