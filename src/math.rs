use std::iter;

pub trait IteratorAvg<T>: Iterator<Item = T> {
    fn avg(self) -> Option<T>;
    fn avg_with_std(self) -> Option<(T, T)>;
    fn std(self) -> Option<T>;
}

macro_rules! impl_avg {
    ($($a:ident)*) => ($(
        impl<I> IteratorAvg<$a> for I
        where
            I: Iterator<Item = $a>,
        {
            fn avg(self) -> Option<$a> {
                iter::zip(self, 1usize..)
                    .reduce(|(sum, _), (next, cnt)| (sum + next, cnt))
                    .map(|(sum, cnt)| sum / cnt as $a)
            }

            /// Mean and population standard deviation.
            fn avg_with_std(self) -> Option<($a, $a)> {
                let values = self.collect::<Vec<_>>();
                let avg = values.iter().copied().avg()?;
                values
                    .into_iter()
                    .map(|x| (x - avg).powi(2))
                    .avg()
                    .map(|std| (avg, std.sqrt()))
            }

            fn std(self) -> Option<$a> {
                self.avg_with_std().map(|(_, std)| std)
            }
        }
    )*)
}

impl_avg! { f32 f64 }

/// Slopes with a smaller magnitude are treated as flat.
const FLAT_SLOPE: f64 = 1e-12;

/// Ordinary least squares fit `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation coefficient, NaN when `y` is constant.
    pub r_value: f64,
}

impl LinearFit {
    /// `None` when there are fewer than two points, the lengths differ, or
    /// all `xs` are equal.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        if xs.len() != ys.len() || xs.len() < 2 {
            return None;
        }
        let x_avg = xs.iter().copied().avg()?;
        let y_avg = ys.iter().copied().avg()?;
        let (s_xx, s_yy, s_xy) = iter::zip(xs, ys).fold((0.0, 0.0, 0.0), |(s_xx, s_yy, s_xy), (x, y)| {
            let d_x = x - x_avg;
            let d_y = y - y_avg;
            (s_xx + d_x * d_x, s_yy + d_y * d_y, s_xy + d_x * d_y)
        });
        if !s_xx.is_normal() {
            return None;
        }
        let slope = s_xy / s_xx;
        Some(Self {
            slope,
            intercept: y_avg - slope * x_avg,
            r_value: s_xy / (s_xx * s_yy).sqrt(),
        })
    }

    #[inline]
    pub fn forward(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// `None` for a flat fit, which has no inverse.
    #[inline]
    pub fn inverse(&self, y: f64) -> Option<f64> {
        if self.is_flat() {
            None
        } else {
            Some((y - self.intercept) / self.slope)
        }
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.slope.abs() < FLAT_SLOPE
    }
}
