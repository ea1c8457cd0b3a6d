/*!
Slicing scaled series into supervised training windows
*/
use super::Matrix;
use crate::error::{ForecastError, Result};
use crate::CpuFloat;

/// Input windows and their targets, stored flat.
///
/// Window `i` occupies `inputs[i * p * f..(i + 1) * p * f]`, row-major over `p` time steps
/// and `f` features. Target `i` is a single scaled value of feature 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingWindowSet {
    window_length: usize,
    features: usize,
    inputs: Vec<CpuFloat>,
    targets: Vec<CpuFloat>,
}

impl TrainingWindowSet {
    /// Assemble a window set from flat buffers
    pub fn from_parts(
        window_length: usize,
        features: usize,
        inputs: Vec<CpuFloat>,
        targets: Vec<CpuFloat>,
    ) -> Result<TrainingWindowSet> {
        if inputs.len() != targets.len() * window_length * features {
            return Err(ForecastError::Configuration(format!(
                "{} input values do not make {} windows of {}x{}",
                inputs.len(),
                targets.len(),
                window_length,
                features
            )));
        }
        Ok(TrainingWindowSet {
            window_length,
            features,
            inputs,
            targets,
        })
    }

    /// The number of windows
    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether there are no windows
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The number of time steps in each window
    #[inline]
    pub fn window_length(&self) -> usize {
        self.window_length
    }

    /// The number of features at each time step
    #[inline]
    pub fn features(&self) -> usize {
        self.features
    }

    #[inline]
    fn window_size(&self) -> usize {
        self.window_length * self.features
    }

    /// The flat row-major input window `i`
    #[inline]
    pub fn input(&self, i: usize) -> &[CpuFloat] {
        let size = self.window_size();
        &self.inputs[i * size..(i + 1) * size]
    }

    /// The scaled target of window `i`
    #[inline]
    pub fn target(&self, i: usize) -> CpuFloat {
        self.targets[i]
    }

    /// All inputs, flat
    #[inline]
    pub fn inputs(&self) -> &[CpuFloat] {
        &self.inputs
    }

    /// All targets
    #[inline]
    pub fn targets(&self) -> &[CpuFloat] {
        &self.targets
    }

    /// The windows `[start, end)`, in order
    pub fn slice(&self, start: usize, end: usize) -> TrainingWindowSet {
        let size = self.window_size();
        TrainingWindowSet {
            window_length: self.window_length,
            features: self.features,
            inputs: self.inputs[start * size..end * size].to_vec(),
            targets: self.targets[start..end].to_vec(),
        }
    }

    /// The last `count` windows, or all of them if there are fewer
    pub fn tail(&self, count: usize) -> TrainingWindowSet {
        let start = self.len().saturating_sub(count);
        self.slice(start, self.len())
    }

    /// Split off the trailing `fraction` of windows for validation, keeping order.
    ///
    /// The first `floor(n * (1 - fraction))` windows train. If that leaves nothing to
    /// train on, every window trains and the validation set is empty.
    pub fn split_validation(&self, fraction: f64) -> (TrainingWindowSet, TrainingWindowSet) {
        let n = self.len();
        let split_at = ((n as f64) * (1.0 - fraction.max(0.0).min(1.0))).floor() as usize;
        let split_at = if split_at == 0 { n } else { split_at.min(n) };
        (self.slice(0, split_at), self.slice(split_at, n))
    }
}

/// Builds supervised windows from a scaled series
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct WindowedDatasetBuilder {
    /// Time steps in each input window
    pub step_past: usize,
    /// How far after a window's end its target lies
    pub step_future: usize,
}

impl WindowedDatasetBuilder {
    /// A builder for windows of `step_past` steps with targets `step_future` steps ahead
    pub fn new(step_past: usize, step_future: usize) -> WindowedDatasetBuilder {
        WindowedDatasetBuilder {
            step_past,
            step_future,
        }
    }

    /// The number of windows a series of `rows` rows yields
    pub fn window_count(&self, rows: usize) -> usize {
        (rows + 1).saturating_sub(self.step_past + self.step_future)
    }

    /// Slice `series` into windows.
    ///
    /// For every `i` in `step_past..=rows - step_future`, the input is rows
    /// `[i - step_past, i)` over all columns and the target is column 0 of row
    /// `i + step_future - 1`.
    pub fn build(&self, series: &Matrix) -> Result<TrainingWindowSet> {
        if self.step_past == 0 || self.step_future == 0 {
            return Err(ForecastError::Configuration(
                "step_past and step_future must be positive".into(),
            ));
        }
        let rows = series.rows();
        let required = self.step_past + self.step_future;
        if rows < required {
            return Err(ForecastError::insufficient(rows, required));
        }
        let count = self.window_count(rows);
        let mut inputs = Vec::with_capacity(count * self.step_past * series.cols());
        let mut targets = Vec::with_capacity(count);
        for i in self.step_past..=rows - self.step_future {
            inputs.extend_from_slice(series.row_block(i - self.step_past, i));
            targets.push(series.get(i + self.step_future - 1, 0));
        }
        TrainingWindowSet::from_parts(self.step_past, series.cols(), inputs, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A two-column series whose first column is the row index
    fn series(rows: usize) -> Matrix {
        let data = (0..rows)
            .flat_map(|r| vec![r as CpuFloat, -(r as CpuFloat)])
            .collect();
        Matrix::new(rows, 2, data).unwrap()
    }

    #[test]
    fn window_layout() {
        let windows = WindowedDatasetBuilder::new(3, 2).build(&series(10)).unwrap();
        assert_eq!(windows.len(), 10 - 3 - 2 + 1);
        assert_eq!(windows.window_length(), 3);
        assert_eq!(windows.features(), 2);
        // first window: rows 0..3, target row 3 + 2 - 1 = 4
        assert_eq!(windows.input(0), &[0.0, -0.0, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(windows.target(0), 4.0);
        // last window: rows 5..8, target row 9
        assert_eq!(windows.input(5), &[5.0, -5.0, 6.0, -6.0, 7.0, -7.0]);
        assert_eq!(windows.target(5), 9.0);
    }

    #[test]
    fn counts_match_formula() {
        for rows in 0..40 {
            for p in 1..6 {
                for f in 1..4 {
                    let builder = WindowedDatasetBuilder::new(p, f);
                    let expected = (rows as isize - p as isize - f as isize + 1).max(0) as usize;
                    assert_eq!(builder.window_count(rows), expected);
                    match builder.build(&series(rows)) {
                        Ok(windows) => {
                            assert!(expected > 0);
                            assert_eq!(windows.len(), expected);
                        }
                        Err(ForecastError::InsufficientData { rows: have, required }) => {
                            assert_eq!(expected, 0);
                            assert_eq!((have, required), (rows, p + f));
                        }
                        Err(err) => panic!("unexpected {:?}", err),
                    }
                }
            }
        }
    }

    #[test]
    fn boundary_lengths() {
        let builder = WindowedDatasetBuilder::new(16, 2);
        assert!(builder.build(&series(17)).is_err());
        let windows = builder.build(&series(18)).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows.target(0), 17.0);
    }

    #[test]
    fn deterministic() {
        let builder = WindowedDatasetBuilder::new(4, 3);
        assert_eq!(builder.build(&series(30)).unwrap(), builder.build(&series(30)).unwrap());
    }

    #[test]
    fn zero_steps_are_configuration_errors() {
        assert!(WindowedDatasetBuilder::new(0, 1)
            .build(&series(5))
            .unwrap_err()
            .is_configuration());
        assert!(WindowedDatasetBuilder::new(1, 0)
            .build(&series(5))
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn validation_split_keeps_order() {
        let windows = WindowedDatasetBuilder::new(2, 1).build(&series(22)).unwrap();
        assert_eq!(windows.len(), 20);
        let (train, valid) = windows.split_validation(0.1);
        assert_eq!((train.len(), valid.len()), (18, 2));
        assert_eq!(valid.target(0), windows.target(18));
        assert_eq!(valid.target(1), windows.target(19));

        let single = windows.slice(0, 1);
        let (train, valid) = single.split_validation(0.1);
        assert_eq!((train.len(), valid.len()), (1, 0));
    }

    #[test]
    fn tail_takes_last_windows() {
        let windows = WindowedDatasetBuilder::new(2, 1).build(&series(12)).unwrap();
        let tail = windows.tail(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.targets(), &windows.targets()[windows.len() - 3..]);
        assert_eq!(windows.tail(100).len(), windows.len());
    }
}
