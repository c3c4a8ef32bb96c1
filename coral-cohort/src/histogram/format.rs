//! Histogram formatter
//!
//! The numeric query groups rows by a width bucket over the reference min/max. Buckets run
//! `1..=n`; values equal to the maximum land in overflow bucket `n + 1` and values below the
//! minimum in bucket `0`. Formatting folds both into the edge bins, fills empty bins with
//! zero counts and always appends the null bin.

use super::CategoryCount;
use serde::Serialize;

/// A row of the grouped numeric query
#[derive(Debug, Clone, PartialEq)]
pub struct RawBin {
    /// Bucket index, `None` for rows whose value is NULL
    pub bin: Option<i64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: i64,
}

/// A labelled histogram bin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    /// `[lower, upper)`, `[lower, upper]` for the last bin, `None` for the null bin
    pub bin: Option<String>,
    /// `1..=n`, `None` for the null bin
    pub index: Option<i64>,
    pub count: i64,
}

/// Render integral values without a decimal point
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Reconcile grouped rows into exactly `num_bins` labelled bins plus the null bin
///
/// Without reference statistics (empty reference population) only the null bin is
/// returned. A single-valued reference (min equal to max) has zero width: every value lands
/// in the last bin and all labels collapse onto that value, `[v, v)` up to `[v, v]`.
pub fn format_numeric(rows: &[RawBin], num_bins: u32) -> Vec<HistogramBin> {
    let n = i64::from(num_bins.max(1));
    let min = rows.iter().filter_map(|r| r.min).reduce(f64::min);
    let max = rows.iter().filter_map(|r| r.max).reduce(f64::max);
    let null_count: i64 = rows.iter().filter(|r| r.bin.is_none()).map(|r| r.count).sum();

    let null_bin = HistogramBin {
        bin: None,
        index: None,
        count: null_count,
    };
    let (Some(min), Some(max)) = (min, max) else {
        return vec![null_bin];
    };

    let mut counts = vec![0_i64; n as usize];
    for row in rows {
        if let Some(bin) = row.bin {
            let slot = bin.clamp(1, n) - 1;
            counts[slot as usize] += row.count;
        }
    }

    let width = (max - min) / n as f64;
    let mut bins: Vec<HistogramBin> = counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let index = i as i64 + 1;
            let lower = format_number(min + (index - 1) as f64 * width);
            let label = if index == n {
                format!("[{}, {}]", lower, format_number(max))
            } else {
                format!("[{}, {})", lower, format_number(min + index as f64 * width))
            };
            HistogramBin {
                bin: Some(label),
                index: Some(index),
                count,
            }
        })
        .collect();
    bins.push(null_bin);
    bins
}

/// Categories in label order, counts defaulting to zero
pub fn format_categories(rows: Vec<(String, Option<i64>)>) -> Vec<CategoryCount> {
    let mut categories: Vec<CategoryCount> = rows
        .into_iter()
        .map(|(bin, count)| CategoryCount {
            bin,
            count: count.unwrap_or(0),
        })
        .collect();
    categories.sort_by(|a, b| a.bin.cmp(&b.bin));
    categories
}
