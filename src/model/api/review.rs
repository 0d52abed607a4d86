use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::db::review::Review;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A review, as submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSpec {
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

impl ReviewSpec {
    pub fn is_valid_rating(&self) -> bool {
        (MIN_RATING..=MAX_RATING).contains(&self.rating)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDescription {
    pub id: String,
    pub user_id: String,
    pub author_name: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl From<Review> for ReviewDescription {
    fn from(review: Review) -> Self {
        Self {
            id: review.id.to_string(),
            user_id: review.user_id.to_string(),
            author_name: review.review.author_name,
            rating: review.review.rating,
            comment: review.review.comment,
            created_at: review.review.created_at,
        }
    }
}

/// Aggregate rating across all reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub count: u64,
    /// Absent when there are no reviews.
    pub average_rating: Option<f64>,
}

impl ReviewSummary {
    pub fn new(ratings: impl IntoIterator<Item = u8>) -> Self {
        let (count, sum) = ratings
            .into_iter()
            .fold((0_u64, 0_u64), |(count, sum), rating| {
                (count + 1, sum + u64::from(rating))
            });
        let average_rating = (count > 0).then(|| sum as f64 / count as f64);
        Self {
            count,
            average_rating,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds() {
        let mut review = ReviewSpec::example();
        assert!(review.is_valid_rating());
        review.rating = 0;
        assert!(!review.is_valid_rating());
        review.rating = 6;
        assert!(!review.is_valid_rating());
        review.rating = 5;
        assert!(review.is_valid_rating());
    }

    #[test]
    fn summary_average() {
        assert_eq!(
            ReviewSummary::new([]),
            ReviewSummary {
                count: 0,
                average_rating: None
            }
        );
        let summary = ReviewSummary::new([5, 4, 3]);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average_rating, Some(4.0));
    }
}
