use thiserror::Error;

/// Failures raised while bringing up or talking to the process
/// infrastructure: the Postgres pools, the ingestion queue, the HTTP
/// listener, and the tracing pipeline.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("database error: {message}")]
    Database { message: String },
    #[error("ingestion queue setup failed: {message}")]
    JobQueue { message: String },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn job_queue(message: impl Into<String>) -> Self {
        Self::JobQueue {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_subsystem() {
        assert_eq!(
            InfraError::database("pool exhausted").to_string(),
            "database error: pool exhausted"
        );
        assert_eq!(
            InfraError::job_queue("missing apalis tables").to_string(),
            "ingestion queue setup failed: missing apalis tables"
        );
        assert_eq!(
            InfraError::configuration("database.url is not set").to_string(),
            "configuration error: database.url is not set"
        );

        let bind = InfraError::Bind {
            addr: "127.0.0.1:3000".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(bind.to_string().starts_with("failed to bind 127.0.0.1:3000"));
    }
}
