use chrono::{DateTime, Duration, Utc};

/// Selects ramps whose saga stopped advancing.
///
/// A ramp matches when its current phase is not terminal, it was last updated
/// before `updated_before`, and (unless disabled) its transaction material is
/// attached, meaning the saga actually started.
#[derive(Debug, Clone)]
pub struct StaleRampQuery {
    pub updated_before: DateTime<Utc>,
    pub require_transaction_material: bool,
    pub limit: Option<usize>,
}

impl StaleRampQuery {
    /// Ramps not updated within the last `threshold`.
    pub fn older_than(threshold: Duration) -> Self {
        Self::updated_before(Utc::now() - threshold)
    }

    pub fn updated_before(at: DateTime<Utc>) -> Self {
        Self {
            updated_before: at,
            require_transaction_material: true,
            limit: None,
        }
    }

    /// Also match ramps that have no presigned transactions yet.
    pub fn include_unstarted(mut self) -> Self {
        self.require_transaction_material = false;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_older_than_subtracts_threshold() {
        let before = Utc::now();
        let query = StaleRampQuery::older_than(Duration::minutes(10));
        assert!(query.updated_before <= before - Duration::minutes(10) + Duration::seconds(1));
        assert!(query.require_transaction_material);
        assert_eq!(query.limit, None);
    }

    #[test]
    fn test_builder() {
        let query = StaleRampQuery::updated_before(Utc::now())
            .include_unstarted()
            .limit(5);
        assert!(!query.require_transaction_material);
        assert_eq!(query.limit, Some(5));
    }
}
