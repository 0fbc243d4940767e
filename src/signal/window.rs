// Window preprocessing
// Resamples a record and pads it into the (1, channels, length) tensor models consume

use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use crate::signal::ingest::SignalError;
use crate::signal::resample::{resample, ResampleMethod};

/// Right-pad `signal` with zeros along time so it holds at least `win_length` samples
/// Longer signals are returned unchanged; nothing is ever truncated
pub fn pad_to_window(signal: ArrayView2<'_, f32>, win_length: usize) -> Array2<f32> {
    let num = signal.ncols();
    if num >= win_length {
        return signal.to_owned();
    }

    let mut padded = Array2::<f32>::zeros((signal.nrows(), win_length));
    padded.slice_mut(s![.., ..num]).assign(&signal);
    padded
}

/// Resample to `tar_fs`, pad to `win_length` and add a leading batch axis
pub fn prepare_window_tensor(
    signal: ArrayView2<'_, f32>,
    win_length: usize,
    src_fs: f64,
    tar_fs: f64,
    method: ResampleMethod,
) -> Result<Array3<f32>, SignalError> {
    let resampled = resample(signal, src_fs, tar_fs, method)?;
    let padded = pad_to_window(resampled.view(), win_length);

    log::debug!(
        "Prepared input tensor: {} channels x {} samples (window {})",
        padded.nrows(),
        padded.ncols(),
        win_length
    );

    Ok(padded.insert_axis(Axis(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_signal_is_zero_padded() {
        let signal = Array2::from_elem((12, 1000), 1.0f32);
        let padded = pad_to_window(signal.view(), 4096);

        assert_eq!(padded.shape(), &[12, 4096]);
        assert_eq!(padded[[5, 999]], 1.0);
        assert_eq!(padded[[5, 1000]], 0.0);
        assert_eq!(padded[[11, 4095]], 0.0);
    }

    #[test]
    fn test_long_signal_is_not_truncated() {
        let signal = Array2::from_elem((12, 5000), 2.0f32);
        let padded = pad_to_window(signal.view(), 4096);
        assert_eq!(padded.shape(), &[12, 5000]);
        assert_eq!(padded, signal);
    }

    #[test]
    fn test_exact_length_unchanged() {
        let signal = Array2::from_elem((12, 4096), 3.0f32);
        assert_eq!(pad_to_window(signal.view(), 4096), signal);
    }

    #[test]
    fn test_prepare_tensor_shape() {
        // 10 s at 500 Hz -> 2570 samples at 257 Hz -> padded to 4096
        let signal = Array2::from_elem((12, 5000), 0.5f32);
        let tensor =
            prepare_window_tensor(signal.view(), 4096, 500.0, 257.0, ResampleMethod::Linear)
                .unwrap();

        assert_eq!(tensor.shape(), &[1, 12, 4096]);
        assert!((tensor[[0, 0, 2569]] - 0.5).abs() < 1e-6);
        assert_eq!(tensor[[0, 0, 2570]], 0.0);
    }

    #[test]
    fn test_prepare_tensor_long_record() {
        // 40 s at 500 Hz -> 10280 samples at 257 Hz, left as-is
        let signal = Array2::from_elem((12, 20000), 0.5f32);
        let tensor =
            prepare_window_tensor(signal.view(), 4096, 500.0, 257.0, ResampleMethod::Linear)
                .unwrap();
        assert_eq!(tensor.shape(), &[1, 12, 10280]);
    }

    #[test]
    fn test_prepare_tensor_rejects_bad_rate() {
        let signal = Array2::from_elem((12, 100), 0.5f32);
        assert!(prepare_window_tensor(signal.view(), 4096, 0.0, 257.0, ResampleMethod::Linear)
            .is_err());
    }
}
