use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative label for a score expressed as a fraction of its cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Grade {
    Excellent,
    Good,
    Moderate,
    Poor,
    VeryPoor,
}

/// The one threshold ladder used everywhere a score is graded.
///
/// | Ratio    | Grade     |
/// |----------|-----------|
/// | >= 0.80  | EXCELLENT |
/// | >= 0.60  | GOOD      |
/// | >= 0.40  | MODERATE  |
/// | >= 0.20  | POOR      |
/// | < 0.20   | VERY_POOR |
pub static GRADE_THRESHOLDS: &[(f64, Grade)] = &[
    (0.80, Grade::Excellent),
    (0.60, Grade::Good),
    (0.40, Grade::Moderate),
    (0.20, Grade::Poor),
];

impl Grade {
    pub const ALL: [Grade; 5] = [
        Grade::Excellent,
        Grade::Good,
        Grade::Moderate,
        Grade::Poor,
        Grade::VeryPoor,
    ];

    /// Grades `ratio` (score divided by its cap) against [`GRADE_THRESHOLDS`].
    pub fn from_ratio(ratio: f64) -> Grade {
        GRADE_THRESHOLDS
            .iter()
            .find(|(threshold, _)| ratio >= *threshold)
            .map(|(_, grade)| *grade)
            .unwrap_or(Grade::VeryPoor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Excellent => "EXCELLENT",
            Grade::Good => "GOOD",
            Grade::Moderate => "MODERATE",
            Grade::Poor => "POOR",
            Grade::VeryPoor => "VERY_POOR",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(Grade::from_ratio(1.00), Grade::Excellent);
        assert_eq!(Grade::from_ratio(0.80), Grade::Excellent);
        assert_eq!(Grade::from_ratio(0.79), Grade::Good);
        assert_eq!(Grade::from_ratio(0.60), Grade::Good);
        assert_eq!(Grade::from_ratio(0.59), Grade::Moderate);
        assert_eq!(Grade::from_ratio(0.40), Grade::Moderate);
        assert_eq!(Grade::from_ratio(0.39), Grade::Poor);
        assert_eq!(Grade::from_ratio(0.20), Grade::Poor);
        assert_eq!(Grade::from_ratio(0.19), Grade::VeryPoor);
        assert_eq!(Grade::from_ratio(0.00), Grade::VeryPoor);
    }

    #[test]
    fn test_nan_grades_lowest() {
        assert_eq!(Grade::from_ratio(f64::NAN), Grade::VeryPoor);
    }

    #[test]
    fn test_serialized_label_matches_as_str() {
        for grade in Grade::ALL {
            let json = serde_json::to_value(grade).unwrap();
            assert_eq!(json, grade.as_str());
        }
    }
}
