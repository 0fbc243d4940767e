// Multichannel resampling
// Converts a (channels x samples) signal from its recorded rate to the model rate

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

use crate::signal::ingest::SignalError;

/// Resampling algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    /// Linear interpolation between time grids, clamped at the edges
    #[default]
    Linear,

    /// Band-limited resampling in the frequency domain
    Fourier,
}

impl std::str::FromStr for ResampleMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(ResampleMethod::Linear),
            "fourier" | "fft" => Ok(ResampleMethod::Fourier),
            _ => Err(format!("Unknown resample method '{}'. Expected: linear, fourier", s)),
        }
    }
}

/// Number of output samples when converting `n` samples from `src_fs` to `tar_fs`
pub fn resampled_length(n: usize, src_fs: f64, tar_fs: f64) -> usize {
    let duration_secs = n as f64 / src_fs;
    (duration_secs * tar_fs).floor() as usize
}

/// Resample every channel of `signal` from `src_fs` Hz to `tar_fs` Hz
///
/// Returns the input unchanged when the rates already match, so resampling an
/// already-resampled signal to the same target is a no-op.
pub fn resample(
    signal: ArrayView2<'_, f32>,
    src_fs: f64,
    tar_fs: f64,
    method: ResampleMethod,
) -> Result<Array2<f32>, SignalError> {
    if !(src_fs > 0.0) || !(tar_fs > 0.0) {
        return Err(SignalError::InvalidSampleRate { src_fs, tar_fs });
    }

    if src_fs == tar_fs {
        return Ok(signal.to_owned());
    }

    let channels = signal.nrows();
    let n = signal.ncols();
    let m = resampled_length(n, src_fs, tar_fs);

    log::debug!(
        "Resampling {} channels: {} samples @ {} Hz -> {} samples @ {} Hz ({:?})",
        channels,
        n,
        src_fs,
        m,
        tar_fs,
        method
    );

    let mut output = Array2::<f32>::zeros((channels, m));
    if n == 0 || m == 0 {
        return Ok(output);
    }

    match method {
        ResampleMethod::Linear => {
            let src_time = time_grid(n, src_fs);
            let tar_time = time_grid(m, tar_fs);
            for (input, mut out) in signal.axis_iter(Axis(0)).zip(output.axis_iter_mut(Axis(0))) {
                let values = interpolate(&tar_time, &src_time, input);
                out.iter_mut().zip(values).for_each(|(o, v)| *o = v);
            }
        }
        ResampleMethod::Fourier => {
            let mut planner = RealFftPlanner::<f64>::new();
            for (input, mut out) in signal.axis_iter(Axis(0)).zip(output.axis_iter_mut(Axis(0))) {
                let values = fourier_resample(&mut planner, input, m)?;
                out.iter_mut().zip(values).for_each(|(o, v)| *o = v);
            }
        }
    }

    Ok(output)
}

/// `len` evenly spaced points covering [0, len] samples, in seconds
fn time_grid(len: usize, fs: f64) -> Vec<f64> {
    if len == 1 {
        return vec![0.0];
    }
    let step = len as f64 / (len - 1) as f64;
    (0..len).map(|i| i as f64 * step / fs).collect()
}

/// Piecewise-linear interpolation of (xp, fp) at x, clamping outside the range
/// Both grids must be ascending
fn interpolate(x: &[f64], xp: &[f64], fp: ArrayView1<'_, f32>) -> Vec<f32> {
    let last = xp.len() - 1;
    let mut k = 0;

    x.iter()
        .map(|&t| {
            if t <= xp[0] {
                return fp[0];
            }
            if t >= xp[last] {
                return fp[last];
            }
            while k + 1 < last && xp[k + 1] < t {
                k += 1;
            }
            let (x0, x1) = (xp[k], xp[k + 1]);
            let (y0, y1) = (fp[k] as f64, fp[k + 1] as f64);
            let w = (t - x0) / (x1 - x0);
            (y0 + w * (y1 - y0)) as f32
        })
        .collect()
}

/// Resample one channel to `m` samples by truncating or zero-padding its spectrum
fn fourier_resample(
    planner: &mut RealFftPlanner<f64>,
    input: ArrayView1<'_, f32>,
    m: usize,
) -> Result<Vec<f32>, SignalError> {
    let n = input.len();
    if n == 1 {
        return Ok(vec![input[0]; m]);
    }

    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(m);

    let mut buffer: Vec<f64> = input.iter().map(|&v| v as f64).collect();
    let mut spectrum = forward.make_output_vec();
    forward
        .process(&mut buffer, &mut spectrum)
        .map_err(|e| SignalError::InvalidData(format!("forward FFT failed: {}", e)))?;

    let mut resized = inverse.make_input_vec();
    let shared = spectrum.len().min(resized.len());
    resized[..shared].copy_from_slice(&spectrum[..shared]);

    // An even-length input's Nyquist bin is split between +/- frequencies when upsampling
    if n % 2 == 0 && m > n {
        resized[n / 2] = resized[n / 2] * 0.5;
    }

    // Downsampling to an even length folds bins m/2 and n - m/2 into the new Nyquist bin
    if m % 2 == 0 && m < n {
        resized[m / 2] = resized[m / 2] * 2.0;
    }

    // DC and (for even lengths) Nyquist must be real for the inverse transform
    resized[0] = Complex::new(resized[0].re, 0.0);
    if m % 2 == 0 {
        let last = resized.len() - 1;
        resized[last] = Complex::new(resized[last].re, 0.0);
    }

    let mut output = inverse.make_output_vec();
    inverse
        .process(&mut resized, &mut output)
        .map_err(|e| SignalError::InvalidData(format!("inverse FFT failed: {}", e)))?;

    // Unnormalised forward and inverse transforms: divide by the input length
    let scale = 1.0 / n as f64;
    Ok(output.into_iter().map(|v| (v * scale) as f32).collect())
}
