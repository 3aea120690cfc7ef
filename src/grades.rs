use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Classwork,
    Midterm,
    Finals,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Classwork, Bucket::Midterm, Bucket::Finals];

    pub fn key(self) -> &'static str {
        match self {
            Bucket::Classwork => "classwork",
            Bucket::Midterm => "midterm",
            Bucket::Finals => "finals",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Bucket::ALL.into_iter().find(|b| b.key() == s)
    }

    /// Assessment name written when an instructor edits this bucket directly.
    pub fn canonical_label(self) -> &'static str {
        match self {
            Bucket::Classwork => "Classwork",
            Bucket::Midterm => "Midterm",
            Bucket::Finals => "Final Exam",
        }
    }

    /// Weight (percent) given to a freshly created canonical assessment.
    pub fn default_weight(self) -> f64 {
        match self {
            Bucket::Classwork => 30.0,
            Bucket::Midterm => 30.0,
            Bucket::Finals => 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentScore {
    pub name: String,
    pub value: f64,
    pub weight: f64,
}

impl AssessmentScore {
    pub fn new(name: impl Into<String>, value: f64, weight: f64) -> Self {
        Self {
            name: name.into(),
            value,
            weight,
        }
    }
}

/// Dashboard grade summary. Serializes with exactly the keys
/// `classwork`, `midterm`, `finals`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GradeSummary {
    pub classwork: f64,
    pub midterm: f64,
    pub finals: f64,
}

impl GradeSummary {
    pub fn set(&mut self, bucket: Bucket, value: f64) {
        match bucket {
            Bucket::Classwork => self.classwork = value,
            Bucket::Midterm => self.midterm = value,
            Bucket::Finals => self.finals = value,
        }
    }
}

/// Keyword rule for a single assessment name. Classwork keywords win over
/// "mid", which wins over "final".
pub fn bucket_for(name: &str) -> Option<Bucket> {
    let label = name.to_lowercase();
    if label.contains("class") || label.contains("assignment") {
        Some(Bucket::Classwork)
    } else if label.contains("mid") {
        Some(Bucket::Midterm)
    } else if label.contains("final") {
        Some(Bucket::Finals)
    } else {
        None
    }
}

/// Buckets scores in input order. A later score overwrites an earlier one in
/// the same bucket; weights are not used. Unrecognized names are skipped.
pub fn classify<'a, I>(scores: I) -> GradeSummary
where
    I: IntoIterator<Item = &'a AssessmentScore>,
{
    let mut summary = GradeSummary::default();
    for score in scores {
        if let Some(bucket) = bucket_for(&score.name) {
            summary.set(bucket, score.value);
        }
    }
    summary
}

/// Two-decimal storage rounding for score and weight columns.
pub fn round_2dp(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Scores and weights must fit five digits with two decimals.
pub fn fits_score_column(x: f64) -> bool {
    x.is_finite() && round_2dp(x).abs() < 1000.0
}
