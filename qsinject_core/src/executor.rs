use crate::codec;
use crate::error::JobError;
use crate::input::InputUrl;
use crate::mutator::{Emit, Mutator};

/// How a single mutation job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Ok { emitted: usize },
    /// The job stopped early; the message has already been logged.
    Failed(String),
    /// Nobody is listening for results anymore.
    OutputClosed,
}

impl ExecutionStatus {
    pub fn emitted(&self) -> usize {
        match self {
            ExecutionStatus::Ok { emitted } => *emitted,
            _ => 0,
        }
    }
}

/// Runs one mutation job per URL with a fixed mutator.
///
/// Every failure is contained in the returned status so the calling worker can
/// move straight on to its next job.
#[derive(Debug, Clone, Copy)]
pub struct MutationExecutor<M> {
    mutator: M,
}

impl<M: Mutator> MutationExecutor<M> {
    pub fn new(mutator: M) -> Self {
        Self { mutator }
    }

    pub fn mutator(&self) -> &M {
        &self.mutator
    }

    pub fn execute_sync(&self, target: &InputUrl, emit: &mut Emit<'_>) -> ExecutionStatus {
        let mut emitted = 0usize;
        let mut counting = |line: String| -> Result<(), JobError> {
            emit(line)?;
            emitted += 1;
            Ok(())
        };

        match self.run_job(target, &mut counting) {
            Ok(()) => {
                tracing::debug!(url = %target, emitted, mutator = self.mutator.name(), "Job finished");
                ExecutionStatus::Ok { emitted }
            }
            Err(JobError::OutputClosed) => ExecutionStatus::OutputClosed,
            Err(e) => {
                tracing::error!(url = %target, "{e}");
                ExecutionStatus::Failed(e.to_string())
            }
        }
    }

    fn run_job(&self, target: &InputUrl, emit: &mut Emit<'_>) -> Result<(), JobError> {
        let mut params =
            codec::parse_query(target.raw_query()).map_err(|source| JobError::QueryParse {
                url: target.to_string(),
                source,
            })?;
        self.mutator.mutate(target, &mut params, emit)
    }
}
