use std::panic::Location;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error<E = anyhow::Error> {
    #[error("failed to create database connection pool:\n{0}")]
    CreatePool(deadpool_postgres::ConfigError),
    #[error("failed to build database connection pool: {0}")]
    BuildPool(String),
    #[error("failed to get a database connection from pool:\n{0}")]
    GetDbConnection(deadpool_postgres::PoolError),
    #[error("failed to initialize database tables:\n{0}")]
    InitDb(tokio_postgres::Error),
    #[error("failed to execute statement: {error}, context {context:?}, at {location}")]
    Execute {
        #[source]
        error: tokio_postgres::Error,
        context: &'static str,
        location: &'static Location<'static>,
    },
    #[error("failed to parse data: {error}, context {context:?}, at {location}")]
    Data {
        #[source]
        error: tokio_postgres::Error,
        context: &'static str,
        location: &'static Location<'static>,
    },
    #[error("invalid stored value: {message}, context {context:?}, at {location}")]
    Invalid {
        message: String,
        context: &'static str,
        location: &'static Location<'static>,
    },
    #[error("{kind} not found: {id}, at {location}")]
    ResourceNotFound {
        kind: &'static str,
        id: String,
        location: &'static Location<'static>,
    },
    #[error("concurrent update conflict: {context}")]
    Conflict { context: &'static str },
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("no certificate in PEM file")]
    NoCert,
    #[error("failed to add cert to root-ca: {0}")]
    AddCert(String),
    #[error("timeout")]
    Timeout,
    #[error("sled error: {error}, context {context:?}, at {location}")]
    LocalStorage {
        #[source]
        error: kv::Error,
        context: &'static str,
        location: &'static Location<'static>,
    },
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    LogicError(E),
}

pub type Result<T, E = anyhow::Error> = std::result::Result<T, Error<E>>;

impl<E: Into<anyhow::Error>> Error<E> {
    pub fn erase_type(self) -> Error {
        self.map_logic(|e| e.into())
    }
}

impl<E> Error<E> {
    /// Changes the type of [`Error::LogicError`], keeping every other variant.
    pub fn map_logic<F>(self, f: impl FnOnce(E) -> F) -> Error<F> {
        match self {
            Error::LogicError(e) => Error::LogicError(f(e)),
            Error::CreatePool(e) => Error::CreatePool(e),
            Error::BuildPool(e) => Error::BuildPool(e),
            Error::GetDbConnection(e) => Error::GetDbConnection(e),
            Error::InitDb(e) => Error::InitDb(e),
            Error::Execute {
                error,
                context,
                location,
            } => Error::Execute {
                error,
                context,
                location,
            },
            Error::Data {
                error,
                context,
                location,
            } => Error::Data {
                error,
                context,
                location,
            },
            Error::Invalid {
                message,
                context,
                location,
            } => Error::Invalid {
                message,
                context,
                location,
            },
            Error::ResourceNotFound { kind, id, location } => {
                Error::ResourceNotFound { kind, id, location }
            }
            Error::Conflict { context } => Error::Conflict { context },
            Error::Io(e) => Error::Io(e),
            Error::NoCert => Error::NoCert,
            Error::AddCert(e) => Error::AddCert(e),
            Error::Timeout => Error::Timeout,
            Error::LocalStorage {
                error,
                context,
                location,
            } => Error::LocalStorage {
                error,
                context,
                location,
            },
            Error::Join(e) => Error::Join(e),
        }
    }

    /// Retypes an error known not to be a [`Error::LogicError`].
    ///
    /// A logic error of the old type is kept as text inside `Invalid`.
    #[track_caller]
    pub fn retype<F>(self) -> Error<F>
    where
        E: std::fmt::Display,
    {
        let location = Location::caller();
        match self {
            Error::LogicError(e) => Error::Invalid {
                message: e.to_string(),
                context: "retype",
                location,
            },
            other => other.map_logic(|_| unreachable!()),
        }
    }

    /// Local storage (sled) error
    #[track_caller]
    pub fn local(context: &'static str) -> impl FnOnce(kv::Error) -> Self {
        let location = std::panic::Location::caller();

        move |error: kv::Error| Error::LocalStorage {
            context,
            location,
            error,
        }
    }

    /// Error when executing a PG statement.
    #[track_caller]
    pub fn exec(context: &'static str) -> impl FnOnce(tokio_postgres::Error) -> Self {
        let location = std::panic::Location::caller();

        move |error: tokio_postgres::Error| Error::Execute {
            context,
            location,
            error,
        }
    }

    /// Error when reading a column from a row.
    #[track_caller]
    pub fn data(context: &'static str) -> impl FnOnce(tokio_postgres::Error) -> Self {
        let location = std::panic::Location::caller();

        move |error: tokio_postgres::Error| Error::Data {
            context,
            location,
            error,
        }
    }

    /// A stored value failed domain validation.
    #[track_caller]
    pub fn invalid<D: std::fmt::Display>(context: &'static str) -> impl FnOnce(D) -> Self {
        let location = std::panic::Location::caller();

        move |error: D| Error::Invalid {
            message: error.to_string(),
            context,
            location,
        }
    }

    #[track_caller]
    pub fn not_found<I: std::fmt::Display>(kind: &'static str, id: I) -> Self {
        let location = std::panic::Location::caller();

        Error::ResourceNotFound {
            kind,
            location,
            id: id.to_string(),
        }
    }
}
