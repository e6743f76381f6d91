/// Failures surfaced by the chat core.
///
/// None of these are fatal: they are scoped to the current group view and
/// recover by user retry or by the next poll tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Rejected locally before any network call (bad attachment, empty payload).
    #[error("{0}")]
    Validation(String),

    /// The request never produced a usable response.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered, but not with success.
    #[error("Server error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Server {
        status: Option<u16>,
        message: String,
    },
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Server {
                status: Some(status.as_u16()),
                message: e.to_string(),
            },
            None => Self::Network(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ChatError;

    #[test]
    fn server_error_display_includes_status_when_known() {
        let e = ChatError::Server {
            status: Some(503),
            message: "maintenance".into(),
        };
        assert_eq!(e.to_string(), "Server error (503): maintenance");

        let e = ChatError::Server {
            status: None,
            message: "group not found".into(),
        };
        assert_eq!(e.to_string(), "Server error: group not found");
    }
}
