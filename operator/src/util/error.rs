use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("Invalid user input: {0}")]
    UserInput(String),

    #[error("Finalizer error: {0}")]
    Finalizer(#[from] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("Json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Parse duration: {source}")]
    ParseDuration {
        #[from]
        source: parse_duration::parse::Error,
    },

    #[error("Script error: {0}")]
    Script(#[from] crate::script::ScriptError),

    #[error("too many missed start times (more than 100) for cron schedule {0:?} — set startingDeadlineSeconds or check clock skew")]
    TooManyMissedSchedules(String),

    #[error("invalid cron schedule {schedule:?}: {source}")]
    InvalidSchedule {
        schedule: String,
        source: cron::error::Error,
    },

    #[error("{0}")]
    Notify(#[from] crate::pipeline::notify::NotifyError),

    #[error("{0}")]
    Store(#[from] crate::pipeline::store::StoreError),

    #[error("one or more resources in this run failed: {0}")]
    Multi(#[from] MultiError),
}

/// An ordered collection of per-object failures, joined into one error value.
///
/// This is how the action pipeline reports "3 out of 10 deletes failed" without
/// aborting the run: every per-object error is collected here and the run's
/// outcome is `Err(Error::Multi(multi))` if and only if `multi` is non-empty.
#[derive(Debug, Default)]
pub struct MultiError {
    pub errors: Vec<Error>,
}

impl MultiError {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn push(&mut self, err: Error) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consumes `self`, returning `Ok(())` if no errors were collected.
    pub fn into_result(self) -> Result<(), Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Multi(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

impl std::error::Error for MultiError {}
