use std::fmt;

/// Failure classes of the transaction record store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// Pool exhausted, closed or the server could not be reached
    Unavailable { message: String },
    /// A record for this processor transaction id already exists
    DuplicateTransaction { transaction_id: String },
    /// The statement was rejected by the server
    Query { message: String },
    /// Invalid connection settings
    Config { message: String },
    Unknown { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub context: Option<String>,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn duplicate_transaction(transaction_id: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::DuplicateTransaction {
            transaction_id: transaction_id.into(),
        })
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Whether a later sweep cycle may succeed where this call failed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Unavailable { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::DuplicateTransaction { .. })
    }

    #[cfg(feature = "database")]
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        let kind = match error {
            sqlx::Error::PoolTimedOut => DatabaseErrorKind::Unavailable {
                message: "connection pool exhausted".to_string(),
            },
            sqlx::Error::PoolClosed => DatabaseErrorKind::Unavailable {
                message: "connection pool is closed".to_string(),
            },
            sqlx::Error::Io(e) => DatabaseErrorKind::Unavailable {
                message: e.to_string(),
            },
            sqlx::Error::Configuration(e) => DatabaseErrorKind::Config {
                message: e.to_string(),
            },
            // 23505: unique_violation; only transaction_id is unique besides the key
            sqlx::Error::Database(e) if e.code().as_deref() == Some("23505") => {
                DatabaseErrorKind::DuplicateTransaction {
                    transaction_id: String::new(),
                }
            }
            sqlx::Error::Database(e) => DatabaseErrorKind::Query {
                message: e.message().to_string(),
            },
            other => DatabaseErrorKind::Unknown {
                message: other.to_string(),
            },
        };
        Self::new(kind)
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DatabaseErrorKind::Unavailable { message } => {
                write!(f, "Database unavailable: {}", message)?
            }
            DatabaseErrorKind::DuplicateTransaction { transaction_id } => write!(
                f,
                "A record for transaction '{}' already exists",
                transaction_id
            )?,
            DatabaseErrorKind::Query { message } => write!(f, "Database query failed: {}", message)?,
            DatabaseErrorKind::Config { message } => {
                write!(f, "Database configuration error: {}", message)?
            }
            DatabaseErrorKind::Unknown { message } => {
                write!(f, "Unknown database error: {}", message)?
            }
        }

        match &self.context {
            Some(context) => write!(f, " ({})", context),
            None => Ok(()),
        }
    }
}

impl std::error::Error for DatabaseError {}
