// Cadence rules and trigger evaluation
//
// A rule is a cron expression evaluated in UTC plus an optional calendar
// condition. The instants are fixed UTC times: a "20:00 local" target is
// configured as its UTC equivalent, so daylight-saving shifts are not
// compensated.

use crate::config::SchedulerConfig;
use crate::errors::ScheduleError;
use crate::models::Cadence;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;

/// Extra calendar condition checked against a scheduled instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCondition {
    Always,
    /// Fires only when the instant falls on the last day of its month
    TomorrowIsFirstOfMonth,
}

impl RuleCondition {
    pub fn holds(&self, instant: DateTime<Utc>) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::TomorrowIsFirstOfMonth => is_last_day_of_month(instant.date_naive()),
        }
    }
}

/// A (trigger predicate, cadence label) pair
#[derive(Debug, Clone)]
pub struct CadenceRule {
    cadence: Cadence,
    expression: String,
    schedule: CronSchedule,
    condition: RuleCondition,
}

impl CadenceRule {
    pub fn new(
        cadence: Cadence,
        expression: &str,
        condition: RuleCondition,
    ) -> Result<Self, ScheduleError> {
        Ok(Self {
            cadence,
            expression: expression.to_string(),
            schedule: parse_cron_expression(expression)?,
            condition,
        })
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn condition(&self) -> RuleCondition {
        self.condition
    }

    /// Latest scheduled instant in `(from, to]` that satisfies the condition
    ///
    /// Several missed instants collapse into the most recent one.
    pub fn due_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if to <= from {
            return None;
        }

        self.schedule
            .after(&from)
            .take_while(|instant| *instant <= to)
            .filter(|instant| self.condition.holds(*instant))
            .last()
    }

    /// Next instant after `after` that satisfies the condition
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after)
            .take(400)
            .find(|instant| self.condition.holds(*instant))
    }
}

/// Build the daily, weekly and end-of-month rules
///
/// The monthly rule shares the daily instant and only adds the calendar
/// condition, so both are evaluated at the same tick.
pub fn default_rules(config: &SchedulerConfig) -> Result<Vec<CadenceRule>, ScheduleError> {
    Ok(vec![
        CadenceRule::new(Cadence::Daily, &config.daily_cron, RuleCondition::Always)?,
        CadenceRule::new(Cadence::Weekly, &config.weekly_cron, RuleCondition::Always)?,
        CadenceRule::new(
            Cadence::Monthly,
            &config.daily_cron,
            RuleCondition::TomorrowIsFirstOfMonth,
        )?,
    ])
}

/// Parse and validate a cron expression
pub fn parse_cron_expression(expression: &str) -> Result<CronSchedule, ScheduleError> {
    CronSchedule::from_str(expression).map_err(|e| ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// True when tomorrow is the first day of a month
pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    (date + Duration::days(1)).day() == 1
}
