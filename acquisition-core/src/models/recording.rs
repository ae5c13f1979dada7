use super::frame::Frame;

/// One slot of a recorded session.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedFrame {
    Captured(Frame),
    /// The original capture dropped this frame; only its number survives.
    Dropped { sequence_number: u64 },
}

impl RecordedFrame {
    pub fn sequence_number(&self) -> u64 {
        match self {
            Self::Captured(frame) => frame.sequence_number(),
            Self::Dropped { sequence_number } => *sequence_number,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped { .. })
    }
}

/// A pre-recorded, ordered frame sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    pub name: String,
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: Vec::new(),
        }
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(RecordedFrame::Captured(frame));
    }

    pub fn push_dropped(&mut self, sequence_number: u64) {
        self.frames.push(RecordedFrame::Dropped { sequence_number });
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dropped_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_dropped()).count()
    }

    /// Number of entries a replay delivers.
    pub fn replay_len(&self, skip_dropped: bool) -> usize {
        if skip_dropped {
            self.len() - self.dropped_count()
        } else {
            self.len()
        }
    }

    /// Sequence-number span covered by the recording, used to keep looped
    /// replays monotonic.
    pub fn sequence_span(&self) -> u64 {
        let first = self.frames.iter().map(|f| f.sequence_number()).min();
        let last = self.frames.iter().map(|f| f.sequence_number()).max();
        match (first, last) {
            (Some(first), Some(last)) => last - first + 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Recording {
        let mut recording = Recording::new("sample");
        recording.push_frame(Frame::new(10, vec![1]));
        recording.push_dropped(11);
        recording.push_frame(Frame::new(12, vec![3]));
        recording
    }

    #[test]
    fn counts_dropped_entries() {
        let recording = sample();

        assert_eq!(recording.len(), 3);
        assert_eq!(recording.dropped_count(), 1);
        assert_eq!(recording.replay_len(true), 2);
        assert_eq!(recording.replay_len(false), 3);
    }

    #[test]
    fn sequence_span_covers_gaps() {
        assert_eq!(sample().sequence_span(), 3);
        assert_eq!(Recording::new("empty").sequence_span(), 0);
    }
}
