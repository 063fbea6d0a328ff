use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};
use serde::Serialize;

pub(crate) const INELIGIBLE_REASON: &str = "Too Late";
pub(crate) const ELIGIBLE_REASON: &str = "Within cancellation window";

/// Result of an eligibility check; the deadline boundary is inclusive.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityDecision {
    pub eligible: bool,
    pub reason: String,
    pub deadline: DateTime<Utc>,
}

/// Pure weekday/weekend window rule, evaluated in store-local time.
///
/// Orders placed Monday through Thursday, or Friday before noon, can be
/// canceled for 24 hours. Orders placed Friday at/after noon or over the
/// weekend can be canceled until the following Monday at noon, when the
/// warehouse works through the backlog.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityEvaluator {
    offset: FixedOffset,
}

impl EligibilityEvaluator {
    pub fn new(store_utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(store_utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
        Self { offset }
    }

    pub fn evaluate(&self, order_created_at: DateTime<Utc>, now: DateTime<Utc>) -> EligibilityDecision {
        let deadline = self.deadline_for(order_created_at);
        let eligible = now <= deadline;
        let reason = if eligible {
            ELIGIBLE_REASON.to_string()
        } else {
            INELIGIBLE_REASON.to_string()
        };
        EligibilityDecision {
            eligible,
            reason,
            deadline,
        }
    }

    fn deadline_for(&self, order_created_at: DateTime<Utc>) -> DateTime<Utc> {
        let local = order_created_at.with_timezone(&self.offset);
        let weekend_window = match local.weekday() {
            Weekday::Sat | Weekday::Sun => true,
            Weekday::Fri => local.time() >= noon(),
            _ => false,
        };
        if !weekend_window {
            return order_created_at + Duration::hours(24);
        }

        let days_to_monday = match local.weekday() {
            Weekday::Fri => 3,
            Weekday::Sat => 2,
            _ => 1,
        };
        let monday_noon = (local.date_naive() + Duration::days(days_to_monday)).and_time(noon());
        // Fixed offsets map local datetimes uniquely.
        match self.offset.from_local_datetime(&monday_noon).single() {
            Some(deadline) => deadline.with_timezone(&Utc),
            None => order_created_at + Duration::hours(24),
        }
    }
}

fn noon() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).expect("noon is a valid time")
}
