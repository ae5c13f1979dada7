//! Example processing and view stages for simulated frames.

use acquisition_core::models::error::AcquisitionError;
use acquisition_core::models::frame::{Frame, ProcessingMode, View};
use acquisition_core::traits::processing_stage::{ProcessingStage, ViewGenerator};

use crate::simulated_camera::decode_pixels;

/// Subtracts a constant dark level from every pixel.
#[derive(Debug, Clone, Copy)]
pub struct DarkSubtraction {
    dark_level: u16,
}

impl DarkSubtraction {
    pub fn new(dark_level: u16) -> Self {
        Self { dark_level }
    }
}

impl ProcessingStage for DarkSubtraction {
    fn apply(&self, mut frame: Frame) -> Result<Frame, AcquisitionError> {
        if frame.metadata.processing_mode == ProcessingMode::DarkSubtract {
            return Err(AcquisitionError::Processing(format!(
                "frame {} is already dark subtracted",
                frame.sequence_number()
            )));
        }
        let pixels = decode_pixels(&frame.data)?;
        frame.data = pixels
            .into_iter()
            .flat_map(|p| p.saturating_sub(self.dark_level).to_le_bytes())
            .collect();
        frame.metadata.processing_mode = ProcessingMode::DarkSubtract;
        Ok(frame)
    }
}

/// Renders an 8-bit grayscale preview from the first band.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewViewer;

impl ViewGenerator for PreviewViewer {
    fn render(&self, frame: &Frame) -> Result<View, AcquisitionError> {
        let meta = &frame.metadata;
        let pixels = decode_pixels(&frame.data)?;
        let expected = (meta.width * meta.height * meta.bands) as usize;
        if meta.bands == 0 || pixels.len() != expected {
            return Err(AcquisitionError::Processing(format!(
                "frame {} has {} pixels, expected {}",
                frame.sequence_number(),
                pixels.len(),
                expected
            )));
        }

        // 12-bit to 8-bit
        let data = pixels
            .chunks_exact(meta.bands as usize)
            .map(|bands| (bands[0] >> 4) as u8)
            .collect();
        Ok(View {
            name: "preview".into(),
            width: meta.width,
            height: meta.height,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(pixels: &[u16], width: u32, height: u32, bands: u32) -> Frame {
        let data = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
        Frame::new(0, data).with_dimensions(width, height, bands)
    }

    #[test]
    fn dark_subtraction_clamps_at_zero() {
        let stage = DarkSubtraction::new(10);
        let out = stage.apply(frame(&[5, 10, 300], 3, 1, 1)).unwrap();

        assert_eq!(decode_pixels(&out.data).unwrap(), vec![0, 0, 290]);
        assert_eq!(out.metadata.processing_mode, ProcessingMode::DarkSubtract);
    }

    #[test]
    fn dark_subtraction_runs_once() {
        let stage = DarkSubtraction::new(1);
        let once = stage.apply(frame(&[5], 1, 1, 1)).unwrap();
        assert!(matches!(
            stage.apply(once),
            Err(AcquisitionError::Processing(_))
        ));
    }

    #[test]
    fn odd_payload_fails_processing() {
        let stage = DarkSubtraction::new(1);
        let bad = Frame::new(4, vec![1, 2, 3]);
        assert!(matches!(stage.apply(bad), Err(AcquisitionError::Processing(_))));
    }

    #[test]
    fn preview_takes_first_band() {
        let view = PreviewViewer
            .render(&frame(&[4095, 0, 160, 0], 2, 1, 2))
            .unwrap();

        assert_eq!(view.width, 2);
        assert_eq!(view.height, 1);
        assert_eq!(view.data, vec![255, 10]);
    }

    #[test]
    fn preview_rejects_shape_mismatch() {
        assert!(PreviewViewer.render(&frame(&[1, 2, 3], 2, 2, 1)).is_err());
    }
}
