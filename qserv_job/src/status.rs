use tracker::TaskState;

/// Coarse lifecycle stage of a [`crate::Job`], independent of how it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryStatus {
    Created,
    InProgress,
    Finished,
}

/// How a finished job finished. `None` while the job hasn't reached [`PrimaryStatus::Finished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedStatus {
    None,
    Success,
    Failed,
    Cancelled,
}

/// The two-dimensional status every job reports, derived from the single-enum
/// [`tracker::TaskState`] the underlying tracker uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    pub primary: PrimaryStatus,
    pub extended: ExtendedStatus,
}

impl From<TaskState> for JobStatus {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Created => JobStatus {
                primary: PrimaryStatus::Created,
                extended: ExtendedStatus::None,
            },
            TaskState::Running => JobStatus {
                primary: PrimaryStatus::InProgress,
                extended: ExtendedStatus::None,
            },
            TaskState::Success => JobStatus {
                primary: PrimaryStatus::Finished,
                extended: ExtendedStatus::Success,
            },
            TaskState::Failed => JobStatus {
                primary: PrimaryStatus::Finished,
                extended: ExtendedStatus::Failed,
            },
            TaskState::Cancelled => JobStatus {
                primary: PrimaryStatus::Finished,
                extended: ExtendedStatus::Cancelled,
            },
        }
    }
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        self.primary == PrimaryStatus::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_maps_to_in_progress_with_no_extended_status() {
        let status: JobStatus = TaskState::Running.into();
        assert_eq!(status.primary, PrimaryStatus::InProgress);
        assert_eq!(status.extended, ExtendedStatus::None);
        assert!(!status.is_finished());
    }

    #[test]
    fn failed_maps_to_finished_with_failed_extended_status() {
        let status: JobStatus = TaskState::Failed.into();
        assert_eq!(status.primary, PrimaryStatus::Finished);
        assert_eq!(status.extended, ExtendedStatus::Failed);
        assert!(status.is_finished());
    }
}
