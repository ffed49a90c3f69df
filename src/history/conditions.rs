//! Sliding-window revisit heuristics.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One accepted visit, already reduced to its entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityVisit {
    pub entity: String,
    pub timestamp: DateTime<Utc>,
}

impl EntityVisit {
    pub fn new(entity: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            entity: entity.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitCondition {
    /// Window a counter keeps visits for.
    pub period_secs: i64,
    /// Minimum gap to the previous visit of any entity.
    pub timeout_secs: i64,
    /// A visit followed by another one of the same entity sooner than this
    /// is not counted.
    pub entity_timeout_secs: i64,
    pub visit_count: usize,
}

impl VisitCondition {
    /// Regular visits spread over a day.
    pub const LONG: VisitCondition = VisitCondition {
        period_secs: 24 * 3600,
        timeout_secs: 5 * 60,
        entity_timeout_secs: 30 * 60,
        visit_count: 4,
    };

    /// Quick returns within half an hour.
    pub const SHORT: VisitCondition = VisitCondition {
        period_secs: 30 * 60,
        timeout_secs: 30,
        entity_timeout_secs: 2 * 60,
        visit_count: 3,
    };

    /// Entities that qualify over `visits`, which must be sorted by time.
    /// An entity shows up once per completed count.
    pub fn qualifying(&self, visits: &[EntityVisit]) -> Vec<String> {
        let timeout = Duration::seconds(self.timeout_secs);
        let entity_timeout = Duration::seconds(self.entity_timeout_secs);
        let period = Duration::seconds(self.period_secs);

        let mut counters: HashMap<&str, Vec<DateTime<Utc>>> = HashMap::new();
        let mut qualified = Vec::new();

        for (index, visit) in visits.iter().enumerate() {
            if index > 0 && visit.timestamp - visits[index - 1].timestamp < timeout {
                continue;
            }

            let next_same_entity = visits[index + 1..]
                .iter()
                .find(|next| next.entity == visit.entity);
            if matches!(next_same_entity, Some(next) if next.timestamp - visit.timestamp < entity_timeout)
            {
                continue;
            }

            let counter = counters.entry(visit.entity.as_str()).or_default();
            counter.retain(|seen| visit.timestamp - *seen < period);
            counter.push(visit.timestamp);

            if counter.len() >= self.visit_count {
                qualified.push(visit.entity.clone());
                counter.clear();
            }
        }

        qualified
    }
}

/// Long-condition results followed by short-condition results. An entity
/// may appear several times.
pub fn qualifying_entities(
    visits: &[EntityVisit],
    long: &VisitCondition,
    short: &VisitCondition,
) -> Vec<String> {
    let mut entities = long.qualifying(visits);
    entities.extend(short.qualifying(visits));
    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn condition() -> VisitCondition {
        VisitCondition {
            period_secs: 1000,
            timeout_secs: 10,
            entity_timeout_secs: 50,
            visit_count: 3,
        }
    }

    #[test]
    fn qualifies_after_enough_spaced_visits() {
        let visits = vec![
            EntityVisit::new("a.com", at(0)),
            EntityVisit::new("a.com", at(100)),
            EntityVisit::new("a.com", at(200)),
        ];
        assert_eq!(condition().qualifying(&visits), vec!["a.com".to_string()]);
    }

    #[test]
    fn counter_resets_after_qualifying() {
        let visits: Vec<_> = (0..5)
            .map(|i| EntityVisit::new("a.com", at(i * 100)))
            .collect();
        assert_eq!(condition().qualifying(&visits), vec!["a.com".to_string()]);

        let visits: Vec<_> = (0..6)
            .map(|i| EntityVisit::new("a.com", at(i * 100)))
            .collect();
        assert_eq!(condition().qualifying(&visits).len(), 2);
    }

    #[test]
    fn visit_right_after_any_other_is_skipped() {
        let visits = vec![
            EntityVisit::new("a.com", at(0)),
            EntityVisit::new("b.com", at(95)),
            EntityVisit::new("a.com", at(100)),
            EntityVisit::new("a.com", at(200)),
        ];
        // a.com at 100 follows b.com by 5s and does not count.
        assert!(condition().qualifying(&visits).is_empty());
    }

    #[test]
    fn burst_counts_only_its_last_visit() {
        let visits = vec![
            EntityVisit::new("a.com", at(0)),
            EntityVisit::new("a.com", at(20)),
            EntityVisit::new("a.com", at(40)),
            EntityVisit::new("a.com", at(200)),
        ];
        // 0 and 20 are followed by a.com within 50s.
        assert!(condition().qualifying(&visits).is_empty());

        let mut more = visits.clone();
        more.push(EntityVisit::new("a.com", at(300)));
        assert_eq!(condition().qualifying(&more), vec!["a.com".to_string()]);
    }

    #[test]
    fn visits_outside_the_period_expire() {
        let visits = vec![
            EntityVisit::new("a.com", at(0)),
            EntityVisit::new("a.com", at(600)),
            EntityVisit::new("a.com", at(1200)),
        ];
        assert!(condition().qualifying(&visits).is_empty());
    }

    #[test]
    fn long_results_come_before_short_ones() {
        let long = VisitCondition {
            visit_count: 2,
            ..condition()
        };
        let short = VisitCondition {
            visit_count: 1,
            ..condition()
        };
        let visits = vec![
            EntityVisit::new("a.com", at(0)),
            EntityVisit::new("b.com", at(100)),
            EntityVisit::new("a.com", at(200)),
        ];
        assert_eq!(
            qualifying_entities(&visits, &long, &short),
            vec!["a.com", "a.com", "b.com", "a.com"]
        );
    }

    #[test]
    fn same_input_same_result() {
        let visits: Vec<_> = (0..12)
            .map(|i| EntityVisit::new(if i % 2 == 0 { "a.com" } else { "b.com" }, at(i * 400)))
            .collect();
        let first = qualifying_entities(&visits, &VisitCondition::LONG, &VisitCondition::SHORT);
        let second = qualifying_entities(&visits, &VisitCondition::LONG, &VisitCondition::SHORT);
        assert_eq!(first, second);
    }
}
