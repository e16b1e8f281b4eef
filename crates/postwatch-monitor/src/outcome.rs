use std::time::Duration;

/// How one pass through a worker's loop ended. Decides the sleep before the
/// next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// No active proxy was available. Retries after the no-credential delay,
    /// which defaults to zero.
    NoCredential,
    /// Every fetch strategy came back without a usable comment.
    NoNewData,
    /// A comment was fanned out to the link's group.
    Ingested,
    /// A store or fetch call failed. Logged and retried after the link delay.
    TransientError,
}

impl IterationOutcome {
    #[must_use]
    pub fn delay(self, link_delay: Duration, no_credential_delay: Duration) -> Duration {
        match self {
            IterationOutcome::NoCredential => no_credential_delay,
            IterationOutcome::NoNewData
            | IterationOutcome::Ingested
            | IterationOutcome::TransientError => link_delay,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IterationOutcome::NoCredential => "no_credential",
            IterationOutcome::NoNewData => "no_new_data",
            IterationOutcome::Ingested => "ingested",
            IterationOutcome::TransientError => "transient_error",
        }
    }
}
