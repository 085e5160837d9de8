/// The single user-facing status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Hidden,
    Info(String),
    Error(String),
}

impl Status {
    pub fn info(message: impl Into<String>) -> Self {
        Status::Info(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Status::Error(message.into())
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Status::Hidden => None,
            Status::Info(message) | Status::Error(message) => Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error(_))
    }
}
