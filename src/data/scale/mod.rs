/*!
Input data scaling
*/
use super::Matrix;
use crate::error::{ForecastError, Result};
use crate::CpuFloat;
use num::{Float, NumCast};
use std::fmt::Debug;

/// Per-column standardization: centre on the column mean, divide by the column's
/// population standard deviation. Constant columns get a scale of one.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler<F = CpuFloat> {
    /// The mean of each fitted column
    pub means: Vec<F>,
    /// The scale (standard deviation, or one for constant columns) of each fitted column
    pub scales: Vec<F>,
}

impl<F> StandardScaler<F>
where
    F: Float + Debug,
{
    /// Fit a scaler to the columns of `data`
    pub fn fit(data: &Matrix<F>) -> Result<StandardScaler<F>> {
        if data.rows() == 0 {
            return Err(ForecastError::insufficient(0, 1));
        }
        let n: F = <F as NumCast>::from(data.rows()).ok_or_else(|| {
            ForecastError::Configuration("row count does not fit the float type".into())
        })?;
        let mut means = Vec::with_capacity(data.cols());
        let mut scales = Vec::with_capacity(data.cols());
        for col in 0..data.cols() {
            let mean = data.column(col).fold(F::zero(), |acc, x| acc + x) / n;
            let var = data
                .column(col)
                .map(|x| (x - mean) * (x - mean))
                .fold(F::zero(), |acc, x| acc + x)
                / n;
            let std = var.sqrt();
            means.push(mean);
            scales.push(if std == F::zero() || !std.is_finite() {
                F::one()
            } else {
                std
            });
        }
        Ok(StandardScaler { means, scales })
    }

    /// The number of columns this scaler was fitted on
    #[inline]
    pub fn features(&self) -> usize {
        self.means.len()
    }

    /// Scale a single value of column `col`
    #[inline]
    pub fn scale(&self, col: usize, val: F) -> F {
        (val - self.means[col]) / self.scales[col]
    }

    /// Undo `scale` for a single value of column `col`
    #[inline]
    pub fn unscale(&self, col: usize, val: F) -> F {
        val * self.scales[col] + self.means[col]
    }

    fn check_width(&self, data: &Matrix<F>) -> Result<()> {
        if data.cols() != self.features() {
            return Err(ForecastError::Configuration(format!(
                "scaler fitted on {} columns applied to {}",
                self.features(),
                data.cols()
            )));
        }
        Ok(())
    }

    /// Standardize every column of `data`
    pub fn transform(&self, data: &Matrix<F>) -> Result<Matrix<F>> {
        self.check_width(data)?;
        Ok(data.map_columns(|col, val| self.scale(col, val)))
    }

    /// Map standardized data back to the original scale
    pub fn inverse_transform(&self, data: &Matrix<F>) -> Result<Matrix<F>> {
        self.check_width(data)?;
        Ok(data.map_columns(|col, val| self.unscale(col, val)))
    }

    /// Map a standardized prediction of the target (column 0) back to the original scale.
    ///
    /// The prediction is replicated into every column of a row, the whole row is
    /// inverse-transformed, and column 0 is read back out.
    pub fn inverse_target(&self, val: F) -> Result<F> {
        let row = Matrix::new(1, self.features(), vec![val; self.features()])?;
        let unscaled = self.inverse_transform(&row)?;
        if unscaled.cols() == 0 {
            return Err(ForecastError::Configuration(
                "scaler was fitted on zero columns".into(),
            ));
        }
        Ok(unscaled.get(0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> Matrix {
        Matrix::from_rows(&[
            vec![1.0, 10.0, 5.0],
            vec![2.0, 30.0, 5.0],
            vec![3.0, 20.0, 5.0],
            vec![6.0, 40.0, 5.0],
        ])
        .unwrap()
    }

    #[test]
    fn fitted_columns_are_standard() {
        let data = sample();
        let scaler = StandardScaler::fit(&data).unwrap();
        assert_relative_eq!(scaler.means[0], 3.0);
        // population standard deviation, as opposed to the sample one
        assert_relative_eq!(scaler.scales[0], 3.5f64.sqrt());
        assert_eq!(scaler.scales[2], 1.0);
        let scaled = scaler.transform(&data).unwrap();
        for col in 0..2 {
            let mean: f64 = scaled.column(col).sum::<f64>() / 4.0;
            let var: f64 = scaled.column(col).map(|x| x * x).sum::<f64>() / 4.0;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-12);
            assert_relative_eq!(var, 1.0, epsilon = 1e-12);
        }
        assert!(scaled.column(2).all(|x| x == 0.0));
    }

    #[test]
    fn inverse_round_trip() {
        let data = sample();
        let scaler = StandardScaler::fit(&data).unwrap();
        let restored = scaler
            .inverse_transform(&scaler.transform(&data).unwrap())
            .unwrap();
        for (a, b) in data.as_slice().iter().zip(restored.as_slice()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-6);
        }
    }

    #[test]
    fn target_inverse_uses_first_column() {
        let scaler = StandardScaler::fit(&sample()).unwrap();
        let scaled = scaler.scale(0, 4.5);
        assert_relative_eq!(scaler.inverse_target(scaled).unwrap(), 4.5, max_relative = 1e-9);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let scaler = StandardScaler::fit(&sample()).unwrap();
        let narrow = Matrix::from_rows(&[vec![1.0, 2.0]]).unwrap();
        assert!(scaler.transform(&narrow).is_err());
    }
}
