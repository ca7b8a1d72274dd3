//! Grayscale frame type and pixel-format conversion.

/// Fraction of near-black pixels above which a frame is considered dark
/// (lens covered, lights off) and not worth analyzing.
const DARK_PIXEL_FRACTION: f32 = 0.95;
const DARK_PIXEL_MAX: u8 = 32;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data, `width * height` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Driver-side capture sequence number.
    pub sequence: u32,
}

impl Frame {
    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    /// True when the frame is too dark to be worth analyzing.
    pub fn is_dark(&self) -> bool {
        is_dark(&self.data)
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by taking the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::TruncatedBuffer {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

pub(crate) fn is_dark(gray: &[u8]) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark = gray.iter().filter(|&&p| p < DARK_PIXEL_MAX).count();
    (dark as f32 / gray.len() as f32) > DARK_PIXEL_FRACTION
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("truncated capture buffer: expected {expected} bytes, got {actual}")]
    TruncatedBuffer { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_extracts_y_channel() {
        // 2x1 image: [Y0=50, U, Y1=150, V]
        let yuyv = vec![50, 128, 150, 128];
        assert_eq!(yuyv_to_grayscale(&yuyv, 2, 1).unwrap(), vec![50, 150]);
    }

    #[test]
    fn test_yuyv_short_buffer_errors() {
        let yuyv = vec![50, 128];
        assert!(yuyv_to_grayscale(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_yuyv_ignores_trailing_bytes() {
        let mut yuyv = vec![10, 0, 20, 0];
        yuyv.extend([99, 99]); // driver padding
        assert_eq!(yuyv_to_grayscale(&yuyv, 2, 1).unwrap(), vec![10, 20]);
    }

    #[test]
    fn test_dark_frame_detection() {
        let frame = Frame {
            data: vec![0u8; 100],
            width: 10,
            height: 10,
            sequence: 0,
        };
        assert!(frame.is_dark());

        let lit = Frame {
            data: vec![120u8; 100],
            width: 10,
            height: 10,
            sequence: 0,
        };
        assert!(!lit.is_dark());
    }

    #[test]
    fn test_dark_frame_borderline() {
        // 94% dark is still considered usable.
        let mut data = vec![5u8; 94];
        data.extend(vec![200u8; 6]);
        let frame = Frame {
            data,
            width: 10,
            height: 10,
            sequence: 0,
        };
        assert!(!frame.is_dark());
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame {
            data: vec![0, 100, 200],
            width: 3,
            height: 1,
            sequence: 0,
        };
        assert!((frame.avg_brightness() - 100.0).abs() < 1e-6);
    }
}
