/// Errors returned by dashboard operations. Rejected operations leave all
/// state untouched.
#[derive(Debug, thiserror::Error)]
pub enum DashError {
    #[error("Agent '{0}' not in config")]
    UnknownAgent(String),
    #[error("{0}")]
    MalformedRequest(String),
}
