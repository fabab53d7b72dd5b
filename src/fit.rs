//! Ordinary least-squares line fit.

use serde::{Deserialize, Serialize};

/// First-degree polynomial `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Fit a line through `(x, y)` points.
    ///
    /// Returns `None` with fewer than two points or when every x is equal.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for &(x, y) in points {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
        }

        if sxx <= f64::EPSILON {
            return None;
        }

        let slope = sxy / sxx;
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// `count` evenly spaced points over `[start, end]`, both ends included.
    pub fn sample(&self, start: f64, end: f64, count: u32) -> Vec<(f64, f64)> {
        match count {
            0 => Vec::new(),
            1 => vec![(start, self.evaluate(start))],
            _ => {
                let step = (end - start) / (count - 1) as f64;
                (0..count)
                    .map(|i| {
                        let x = if i == count - 1 {
                            end
                        } else {
                            start + step * i as f64
                        };
                        (x, self.evaluate(x))
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_points() {
        let fit = LinearFit::fit(&[(30.0, 40.0), (35.0, 50.0)]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.evaluate(30.0) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_noisy_line() {
        let points: Vec<(f64, f64)> = (0..20)
            .map(|i| {
                let x = i as f64;
                let noise = if i % 2 == 0 { 0.1 } else { -0.1 };
                (x, 3.0 * x - 7.0 + noise)
            })
            .collect();
        let fit = LinearFit::fit(&points).unwrap();
        assert!((fit.slope - 3.0).abs() < 0.01);
        assert!((fit.intercept + 7.0).abs() < 0.2);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(LinearFit::fit(&[]).is_none());
        assert!(LinearFit::fit(&[(30.0, 40.0)]).is_none());
        assert!(LinearFit::fit(&[(30.0, 40.0), (30.0, 45.0)]).is_none());
    }

    #[test]
    fn test_sample_linspace() {
        let fit = LinearFit {
            slope: 1.0,
            intercept: 0.0,
        };
        let points = fit.sample(30.0, 45.0, 100);
        assert_eq!(points.len(), 100);
        assert_eq!(points[0], (30.0, 30.0));
        assert_eq!(points[99], (45.0, 45.0));
        assert!(fit.sample(30.0, 45.0, 0).is_empty());
    }
}
