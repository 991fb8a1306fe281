//! 缺失值感知统计模块
//!
//! 所有按实验位置对齐的列表都使用 `Option<f64>`：`None` 表示该实验未检出，
//! 与"检出但数值为0"明确区分。统计量只在存在的值上计算（总体标准差，ddof=0）。

/// 存在值上的汇总统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentStats {
    /// 参与计算的值个数
    pub count: usize,
    pub mean: f64,
    /// 总体标准差
    pub stdev: f64,
}

impl PresentStats {
    /// 从按实验对齐的可选值序列计算统计量
    ///
    /// `None` 与 `Some(NaN)` 均视为缺失。没有任何存在值时返回 `None`。
    pub fn from_present<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let present: Vec<f64> = values
            .into_iter()
            .flatten()
            .filter(|v| !v.is_nan())
            .collect();
        Self::from_values(&present)
    }

    /// 从已确定存在的值计算统计量（空切片返回 `None`）
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

        Some(Self {
            count,
            mean,
            stdev: variance.sqrt(),
        })
    }

    /// 相对标准偏差 %RSD = stdev / mean × 100
    ///
    /// 均值为0时返回NaN。
    #[inline]
    pub fn rsd(&self) -> f64 {
        if self.mean == 0.0 {
            f64::NAN
        } else {
            self.stdev / self.mean * 100.0
        }
    }
}

/// 存在值均值（无存在值时为NaN）
#[inline]
pub fn present_mean(values: &[Option<f64>]) -> f64 {
    PresentStats::from_present(values.iter().copied()).map_or(f64::NAN, |s| s.mean)
}

/// 存在值总体标准差（无存在值时为NaN）
#[inline]
pub fn present_stdev(values: &[Option<f64>]) -> f64 {
    PresentStats::from_present(values.iter().copied()).map_or(f64::NAN, |s| s.stdev)
}

/// 存在值个数
#[inline]
pub fn present_count<T>(values: &[Option<T>]) -> usize {
    values.iter().filter(|v| v.is_some()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_values_are_excluded() {
        let with_gaps = [Some(10.0), None, Some(20.0), Some(f64::NAN)];
        let only_present = [10.0, 20.0];

        let a = PresentStats::from_present(with_gaps.iter().copied()).unwrap();
        let b = PresentStats::from_values(&only_present).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.count, 2);
        assert_eq!(a.mean, 15.0);
        assert_eq!(a.stdev, 5.0);
    }

    #[test]
    fn zero_is_present_not_missing() {
        let stats = PresentStats::from_present([Some(0.0), None, Some(4.0)]).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, 2.0);
    }

    #[test]
    fn all_missing_yields_none_and_nan_helpers() {
        assert!(PresentStats::from_present([None, None]).is_none());
        assert!(present_mean(&[None, None]).is_nan());
        assert!(present_stdev(&[]).is_nan());
        assert_eq!(present_count::<f64>(&[None, None]), 0);
    }

    #[test]
    fn rsd_matches_definition() {
        let stats = PresentStats::from_values(&[90.0, 110.0]).unwrap();
        assert!((stats.rsd() - 10.0).abs() < 1e-12);
        assert!(PresentStats::from_values(&[0.0]).unwrap().rsd().is_nan());
    }
}
