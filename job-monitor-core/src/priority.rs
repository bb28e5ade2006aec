use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// The stock priority classes: anything at 30 and above is reporting work.
const DEFAULT_THRESHOLDS: &[(&str, i32)] = &[
    ("interactive", 0),
    ("user_visible", 10),
    ("eventual", 20),
    ("reporting", 30),
];

/// A named, half-open priority range `[low, high)`. A `high` of `None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityBucket {
    pub name: String,
    pub low: i32,
    pub high: Option<i32>,
}

impl PriorityBucket {
    pub fn new(name: impl Into<String>, low: i32, high: Option<i32>) -> Self {
        Self {
            name: name.into(),
            low,
            high,
        }
    }

    pub fn contains(&self, priority: i32) -> bool {
        self.low <= priority && self.high.map_or(true, |high| priority < high)
    }

    fn sql_condition(&self, column: &str) -> String {
        match self.high {
            Some(high) => format!("{column} >= {} AND {column} < {high}", self.low),
            None => format!("{column} >= {}", self.low),
        }
    }
}

/// The ordered set of priority buckets jobs are grouped by.
///
/// Construction validates that the buckets are contiguous and that only the last one is
/// unbounded, so every priority at or above the first bucket's lower bound maps to exactly
/// one bucket. Priorities below it are reported as a configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityBuckets {
    buckets: Vec<PriorityBucket>,
}

impl PriorityBuckets {
    pub fn new(buckets: Vec<PriorityBucket>) -> Result<Self, ConfigError> {
        if buckets.is_empty() {
            return Err(ConfigError::NoBuckets);
        }

        let mut previous: Option<&PriorityBucket> = None;
        for (index, bucket) in buckets.iter().enumerate() {
            if bucket.name.is_empty() {
                return Err(ConfigError::EmptyBucketName);
            }
            if buckets[..index].iter().any(|b| b.name == bucket.name) {
                return Err(ConfigError::DuplicateBucket(bucket.name.clone()));
            }
            if let Some(high) = bucket.high {
                if high <= bucket.low {
                    return Err(ConfigError::EmptyRange {
                        name: bucket.name.clone(),
                        low: bucket.low,
                        high,
                    });
                }
            }
            if let Some(previous) = previous {
                match previous.high {
                    None => return Err(ConfigError::UnboundedNotLast(previous.name.clone())),
                    Some(expected) if expected != bucket.low => {
                        return Err(ConfigError::NonContiguous {
                            name: bucket.name.clone(),
                            low: bucket.low,
                            expected,
                        })
                    }
                    Some(_) => {}
                }
            }
            previous = Some(bucket);
        }

        Ok(Self { buckets })
    }

    /// Build buckets from ascending lower thresholds: each bucket runs up to the next
    /// threshold, and the last one is unbounded.
    pub fn from_thresholds<S: AsRef<str>>(thresholds: &[(S, i32)]) -> Result<Self, ConfigError> {
        let buckets = thresholds
            .iter()
            .enumerate()
            .map(|(index, (name, low))| {
                let high = thresholds.get(index + 1).map(|(_, next)| *next);
                PriorityBucket::new(name.as_ref(), *low, high)
            })
            .collect();

        Self::new(buckets)
    }

    pub fn buckets(&self) -> &[PriorityBucket] {
        &self.buckets
    }

    /// Bucket names, in configured order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|bucket| bucket.name.as_str())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Classify a priority. The first bucket containing it wins.
    pub fn bucket_for(&self, priority: i32) -> Result<&str, ConfigError> {
        self.buckets
            .iter()
            .find(|bucket| bucket.contains(priority))
            .map(|bucket| bucket.name.as_str())
            .ok_or(ConfigError::UnbucketedPriority(priority))
    }

    /// Render the classifier as a SQL CASE expression over `column`, for grouping inside the
    /// database. Unmatched priorities evaluate to NULL, which callers must treat as an error.
    pub fn case_expression(&self, column: &str) -> String {
        let arms: Vec<String> = self
            .buckets
            .iter()
            .map(|bucket| {
                format!(
                    "WHEN {} THEN {}",
                    bucket.sql_condition(column),
                    quote_literal(&bucket.name)
                )
            })
            .collect();

        format!("CASE {} END", arms.join(" "))
    }
}

impl Default for PriorityBuckets {
    fn default() -> Self {
        Self::from_thresholds(DEFAULT_THRESHOLDS).expect("default priority buckets are valid")
    }
}

/// Parses `name:threshold` pairs separated by commas, e.g. `interactive:0,eventual:20`.
impl FromStr for PriorityBuckets {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let thresholds = s
            .split(',')
            .map(str::trim)
            .filter(|definition| !definition.is_empty())
            .map(|definition| {
                let (name, threshold) = definition
                    .split_once(':')
                    .ok_or_else(|| ConfigError::InvalidBucketDefinition(definition.to_owned()))?;
                let threshold = threshold
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| ConfigError::InvalidBucketDefinition(definition.to_owned()))?;
                Ok((name.trim().to_owned(), threshold))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Self::from_thresholds(&thresholds)
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
