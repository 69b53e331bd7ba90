// src/report/summary.rs

use std::fmt;

use crate::classify::{ClassificationResult, SingleYear, YesNo};

/// Aggregate counts over one run's rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub with_map: usize,
    pub published: usize,
    pub single_year: usize,
    pub unknown_years: usize,
}

impl Summary {
    pub fn from_rows(rows: &[ClassificationResult]) -> Self {
        rows.iter().fold(Summary::default(), |mut s, r| {
            s.total += 1;
            s.with_map += usize::from(r.has_map_tab == YesNo::Yes);
            s.published += usize::from(r.is_published);
            s.single_year += usize::from(r.single_year_data == SingleYear::Yes);
            s.unknown_years += usize::from(r.single_year_data == SingleYear::Unknown);
            s
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Statistics ===")?;
        writeln!(f, "Total charts scanned: {}", self.total)?;
        writeln!(f, "Charts with map: {}", self.with_map)?;
        writeln!(f, "Published charts: {}", self.published)?;
        writeln!(f, "Single year maps: {}", self.single_year)?;
        write!(f, "Unknown year coverage: {}", self.unknown_years)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(map: bool, published: bool, single: SingleYear) -> ClassificationResult {
        ClassificationResult {
            chart_id: "1".into(),
            slug: "s".into(),
            title: String::new(),
            url: String::new(),
            has_map_tab: map.into(),
            max_time: None,
            min_time: None,
            default_tab: None,
            is_published: published,
            entity_type: None,
            single_year_data: single,
            len_years: 0,
            has_timeline: YesNo::Yes,
        }
    }

    #[test]
    fn test_counts() {
        let rows = vec![
            row(true, true, SingleYear::Yes),
            row(true, false, SingleYear::No),
            row(false, true, SingleYear::Unknown),
            row(true, true, SingleYear::Unknown),
        ];
        let s = Summary::from_rows(&rows);
        assert_eq!(
            s,
            Summary {
                total: 4,
                with_map: 3,
                published: 3,
                single_year: 1,
                unknown_years: 2,
            }
        );
        assert!(s.to_string().starts_with("=== Statistics ===\nTotal charts scanned: 4"));
        assert_eq!(Summary::from_rows(&[]), Summary::default());
    }
}
