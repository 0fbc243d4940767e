// Window tiling
// Splits a prepared signal into overlapping fixed-length windows

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Which samples the first window covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstWindow {
    /// The whole signal, whatever its length
    #[default]
    FullSignal,
    /// `[0, win_length)` like every other window
    Leading,
}

/// Number of windows needed to cover `val_length` samples
///
/// `ceil(|val_length - win_length| / (win_length - overlap)) + 1`.
/// Callers guarantee `overlap < win_length`.
pub fn patch_number(val_length: usize, win_length: usize, overlap: usize) -> usize {
    let span = val_length.abs_diff(win_length);
    let step = win_length - overlap;
    span.div_ceil(step) + 1
}

/// Offset between the starts of consecutive middle windows
/// Only defined when there is more than one window
pub fn stride(val_length: usize, win_length: usize, patch_number: usize) -> Option<usize> {
    if patch_number > 1 {
        Some(val_length.saturating_sub(win_length) / (patch_number - 1))
    } else {
        None
    }
}

/// Sample ranges of every window, in evaluation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    pub val_length: usize,
    pub win_length: usize,
    pub patch_number: usize,
    pub stride: Option<usize>,
    pub windows: Vec<Range<usize>>,
}

impl WindowPlan {
    /// Lay out windows over a signal of `val_length` samples
    ///
    /// The signal is expected to be at least `win_length` long (the window
    /// preprocessor pads shorter records).
    pub fn new(val_length: usize, win_length: usize, overlap: usize, first: FirstWindow) -> Self {
        let patch_number = patch_number(val_length, win_length, overlap);
        let stride = stride(val_length, win_length, patch_number);
        let last_start = val_length.saturating_sub(win_length);

        let windows = (0..patch_number)
            .map(|i| {
                if i == 0 {
                    match first {
                        FirstWindow::FullSignal => 0..val_length,
                        FirstWindow::Leading => 0..win_length.min(val_length),
                    }
                } else if i == patch_number - 1 {
                    last_start..val_length
                } else {
                    let start = i * stride.unwrap_or(0);
                    start..start + win_length
                }
            })
            .collect();

        WindowPlan {
            val_length,
            win_length,
            patch_number,
            stride,
            windows,
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_number() {
        assert_eq!(patch_number(4096, 4096, 256), 1);
        assert_eq!(patch_number(8192, 4096, 256), 3);
        assert_eq!(patch_number(4097, 4096, 256), 2);
        assert_eq!(patch_number(4096 + 3840, 4096, 256), 2);
        assert_eq!(patch_number(4096 + 3841, 4096, 256), 3);
    }

    #[test]
    fn test_plan_two_windows_of_work() {
        let plan = WindowPlan::new(8192, 4096, 256, FirstWindow::FullSignal);

        assert_eq!(plan.patch_number, 3);
        assert_eq!(plan.stride, Some(2048));
        assert_eq!(plan.windows, vec![0..8192, 2048..6144, 4096..8192]);
    }

    #[test]
    fn test_plan_leading_first_window() {
        let plan = WindowPlan::new(8192, 4096, 256, FirstWindow::Leading);
        assert_eq!(plan.windows, vec![0..4096, 2048..6144, 4096..8192]);
    }

    #[test]
    fn test_plan_exact_length_is_single_window() {
        let plan = WindowPlan::new(4096, 4096, 256, FirstWindow::FullSignal);

        assert_eq!(plan.patch_number, 1);
        assert_eq!(plan.stride, None);
        assert_eq!(plan.windows, vec![0..4096]);
    }

    #[test]
    fn test_plan_windows_stay_in_bounds() {
        for val_length in [4097, 5000, 7936, 10000, 20480, 65537] {
            let plan = WindowPlan::new(val_length, 4096, 256, FirstWindow::Leading);
            assert_eq!(plan.len(), plan.patch_number);
            for window in &plan.windows {
                assert!(window.end <= val_length);
                assert_eq!(window.len(), 4096);
            }
            assert_eq!(plan.windows.last().unwrap().end, val_length);
        }
    }
}
