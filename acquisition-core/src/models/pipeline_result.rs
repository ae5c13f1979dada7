use super::error::AcquisitionError;
use super::frame::{Frame, View};

/// One item delivered by the worker: either a processed frame (with an
/// optional view) or the error that stopped it. Never both.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    sequence_number: u64,
    outcome: Result<(Frame, Option<View>), AcquisitionError>,
}

impl PipelineResult {
    pub fn completed(frame: Frame, view: Option<View>) -> Self {
        Self {
            sequence_number: frame.sequence_number(),
            outcome: Ok((frame, view)),
        }
    }

    pub fn failed(sequence_number: u64, error: AcquisitionError) -> Self {
        Self {
            sequence_number,
            outcome: Err(error),
        }
    }

    /// Sequence number of the frame this result was produced from.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.outcome.as_ref().ok().map(|(frame, _)| frame)
    }

    pub fn view(&self) -> Option<&View> {
        self.outcome.as_ref().ok().and_then(|(_, view)| view.as_ref())
    }

    pub fn error(&self) -> Option<&AcquisitionError> {
        self.outcome.as_ref().err()
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn into_result(self) -> Result<(Frame, Option<View>), AcquisitionError> {
        self.outcome
    }
}

/// Progress of a session replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayProgress {
    pub frames_delivered: usize,
    pub frames_total: usize,
}

impl ReplayProgress {
    pub fn is_complete(&self) -> bool {
        self.frames_delivered >= self.frames_total
    }
}

/// Counters for debugging a running worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerDiagnostics {
    pub frames_processed: u64,
    pub processing_failures: u64,
    pub export_failures: u64,
    pub results_evicted: u64,
    /// Results released after a higher sequence number had gone out.
    pub out_of_sequence_delivered: u64,
    pub callbacks_dispatched: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_result_has_no_error() {
        let result = PipelineResult::completed(Frame::new(3, vec![0; 4]), None);

        assert_eq!(result.sequence_number(), 3);
        assert!(result.frame().is_some());
        assert!(result.error().is_none());
        assert!(result.view().is_none());
    }

    #[test]
    fn failed_result_has_no_frame() {
        let result = PipelineResult::failed(9, AcquisitionError::Export("disk full".into()));

        assert_eq!(result.sequence_number(), 9);
        assert!(result.frame().is_none());
        assert_eq!(
            result.error(),
            Some(&AcquisitionError::Export("disk full".into()))
        );
    }

    #[test]
    fn replay_progress_completion() {
        let progress = ReplayProgress {
            frames_delivered: 19,
            frames_total: 20,
        };
        assert!(!progress.is_complete());
        assert!(ReplayProgress {
            frames_delivered: 20,
            frames_total: 20
        }
        .is_complete());
    }
}
