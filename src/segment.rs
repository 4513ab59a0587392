//! Rule-based segment classification over (R, F, M) score triples

use std::fmt;

use serde::Serialize;

use crate::scoring::{ScoredRecord, ScoredTable};

/// The twelve behavioural segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Segment {
    Champions,
    #[serde(rename = "Loyal Customers")]
    LoyalCustomers,
    #[serde(rename = "Potential Loyalists")]
    PotentialLoyalists,
    #[serde(rename = "New Customers")]
    NewCustomers,
    Promising,
    #[serde(rename = "Needs Attention")]
    NeedsAttention,
    #[serde(rename = "About To Sleep")]
    AboutToSleep,
    #[serde(rename = "Can't Lose Them")]
    CantLoseThem,
    #[serde(rename = "At Risk")]
    AtRisk,
    Hibernating,
    Lost,
    Other,
}

impl Segment {
    pub const ALL: [Segment; 12] = [
        Segment::Champions,
        Segment::LoyalCustomers,
        Segment::PotentialLoyalists,
        Segment::NewCustomers,
        Segment::Promising,
        Segment::NeedsAttention,
        Segment::AboutToSleep,
        Segment::CantLoseThem,
        Segment::AtRisk,
        Segment::Hibernating,
        Segment::Lost,
        Segment::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Champions => "Champions",
            Segment::LoyalCustomers => "Loyal Customers",
            Segment::PotentialLoyalists => "Potential Loyalists",
            Segment::NewCustomers => "New Customers",
            Segment::Promising => "Promising",
            Segment::NeedsAttention => "Needs Attention",
            Segment::AboutToSleep => "About To Sleep",
            Segment::CantLoseThem => "Can't Lose Them",
            Segment::AtRisk => "At Risk",
            Segment::Hibernating => "Hibernating",
            Segment::Lost => "Lost",
            Segment::Other => "Other",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of the classification cascade
pub struct SegmentRule {
    pub segment: Segment,
    pub matches: fn(u8, u8, u8) -> bool,
}

/// Ordered cascade; the first matching rule wins and regions overlap, so
/// the order is part of the contract. Anything unmatched is `Other`.
pub static RULES: [SegmentRule; 11] = [
    SegmentRule {
        segment: Segment::Champions,
        matches: |r, f, m| r >= 4 && f >= 4 && m >= 4,
    },
    SegmentRule {
        segment: Segment::LoyalCustomers,
        matches: |r, f, m| f >= 3 && m >= 3 && r >= 3,
    },
    SegmentRule {
        segment: Segment::PotentialLoyalists,
        matches: |r, f, m| r >= 4 && (2..4).contains(&f) && (2..4).contains(&m),
    },
    SegmentRule {
        segment: Segment::NewCustomers,
        matches: |r, f, _| r >= 4 && f <= 1,
    },
    SegmentRule {
        segment: Segment::Promising,
        matches: |r, f, m| r >= 3 && f <= 2 && m >= 3,
    },
    SegmentRule {
        segment: Segment::NeedsAttention,
        matches: |r, f, m| (2..4).contains(&r) && (2..4).contains(&f) && (2..4).contains(&m),
    },
    SegmentRule {
        segment: Segment::AboutToSleep,
        matches: |r, f, m| r <= 2 && (2..4).contains(&f) && (2..4).contains(&m),
    },
    SegmentRule {
        segment: Segment::CantLoseThem,
        matches: |r, f, m| r <= 2 && f >= 3 && m >= 3,
    },
    SegmentRule {
        segment: Segment::AtRisk,
        matches: |r, f, _| r <= 2 && (2..4).contains(&f),
    },
    SegmentRule {
        segment: Segment::Hibernating,
        matches: |r, f, m| r <= 1 && f <= 2 && m <= 2,
    },
    SegmentRule {
        segment: Segment::Lost,
        matches: |r, f, _| r <= 1 && f <= 1,
    },
];

/// Segment for a single score triple
pub fn classify_scores(r: u8, f: u8, m: u8) -> Segment {
    RULES
        .iter()
        .find(|rule| (rule.matches)(r, f, m))
        .map(|rule| rule.segment)
        .unwrap_or(Segment::Other)
}

/// A scored customer with its segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentedRecord {
    #[serde(flatten)]
    pub scored: ScoredRecord,
    pub segment: Segment,
}

impl SegmentedRecord {
    pub fn customer_id(&self) -> &str {
        &self.scored.customer.customer_id
    }
}

#[derive(Debug, Clone)]
pub struct SegmentedTable {
    records: Vec<SegmentedRecord>,
}

impl SegmentedTable {
    pub fn records(&self) -> &[SegmentedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct segments present, in cascade order
    pub fn present_segments(&self) -> Vec<Segment> {
        Segment::ALL
            .into_iter()
            .filter(|segment| self.records.iter().any(|r| r.segment == *segment))
            .collect()
    }
}

/// Attach a segment to every scored customer
pub fn classify(table: ScoredTable) -> SegmentedTable {
    let records: Vec<SegmentedRecord> = table
        .into_records()
        .into_iter()
        .map(|scored| {
            let segment = classify_scores(scored.r_score, scored.f_score, scored.m_score);
            SegmentedRecord { scored, segment }
        })
        .collect();

    tracing::debug!(customers = records.len(), "classified customers");
    SegmentedTable { records }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CustomerRecord, CustomerTable};
    use crate::scoring::score;

    #[test]
    fn test_rule_order_matches_segment_order() {
        let order: Vec<Segment> = RULES.iter().map(|rule| rule.segment).collect();
        assert_eq!(order, Segment::ALL[..11].to_vec());
    }

    #[test]
    fn test_first_match_wins() {
        // 4,4,4 also satisfies the loyal-customer rule
        assert!((RULES[1].matches)(4, 4, 4));
        assert_eq!(classify_scores(4, 4, 4), Segment::Champions);

        // 4,4,3 is loyal, not a potential loyalist
        assert_eq!(classify_scores(4, 4, 3), Segment::LoyalCustomers);

        // 3,2,2 needs attention; 2,2,2 too, before about-to-sleep
        assert_eq!(classify_scores(3, 2, 2), Segment::NeedsAttention);
        assert_eq!(classify_scores(2, 2, 2), Segment::NeedsAttention);

        // 1,1,1 is hibernating; lost only catches r<=1, f<=1 with m>=3
        assert_eq!(classify_scores(1, 1, 1), Segment::Hibernating);
        assert_eq!(classify_scores(1, 1, 3), Segment::Lost);
    }

    #[test]
    fn test_each_segment_reachable() {
        let cases = [
            ((4, 4, 4), Segment::Champions),
            ((3, 3, 3), Segment::LoyalCustomers),
            ((4, 3, 2), Segment::PotentialLoyalists),
            ((4, 1, 1), Segment::NewCustomers),
            ((3, 2, 4), Segment::Promising),
            ((3, 3, 2), Segment::NeedsAttention),
            ((1, 2, 2), Segment::AboutToSleep),
            ((2, 4, 4), Segment::CantLoseThem),
            ((1, 3, 1), Segment::AtRisk),
            ((1, 1, 2), Segment::Hibernating),
            ((1, 1, 4), Segment::Lost),
            ((3, 1, 1), Segment::Other),
        ];
        for ((r, f, m), expected) in cases {
            assert_eq!(classify_scores(r, f, m), expected, "scores {r}{f}{m}");
        }
    }

    #[test]
    fn test_classify_reference_scenario() {
        let rows = [
            (5, 20.0, 5000.0),
            (20, 10.0, 2500.0),
            (60, 5.0, 1000.0),
            (100, 3.0, 500.0),
            (150, 1.0, 100.0),
        ];
        let records = rows
            .iter()
            .enumerate()
            .map(|(i, &(recency_days, frequency, monetary))| CustomerRecord {
                customer_id: format!("C{:03}", i + 1),
                recency_days,
                frequency,
                monetary,
            })
            .collect();

        let table = classify(score(CustomerTable::from_records(records).unwrap()));
        assert_eq!(table.records()[0].segment, Segment::Champions);
        assert_eq!(table.records()[0].customer_id(), "C001");

        let last = &table.records()[4];
        assert_eq!((last.scored.r_score, last.scored.f_score), (1, 1));
        assert_eq!(last.segment, Segment::Hibernating);
    }

    #[test]
    fn test_segment_labels_serialize() {
        let json = serde_json::to_string(&Segment::CantLoseThem).unwrap();
        assert_eq!(json, "\"Can't Lose Them\"");
        for segment in Segment::ALL {
            let json = serde_json::to_string(&segment).unwrap();
            assert_eq!(json, format!("\"{}\"", segment.label()));
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn classification_is_total(r in 1u8..=4, f in 1u8..=4, m in 1u8..=4) {
            let segment = classify_scores(r, f, m);
            prop_assert!(Segment::ALL.contains(&segment));
        }

        #[test]
        fn classification_picks_first_matching_rule(r in 1u8..=4, f in 1u8..=4, m in 1u8..=4) {
            let segment = classify_scores(r, f, m);
            match RULES.iter().position(|rule| (rule.matches)(r, f, m)) {
                Some(first) => prop_assert_eq!(segment, RULES[first].segment),
                None => prop_assert_eq!(segment, Segment::Other),
            }
        }
    }
}
