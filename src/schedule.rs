//! Date arithmetic for recurring transactions: computing the next occurrence
//! of a schedule, materializing overdue occurrences as transactions, and
//! splitting definitions into due and upcoming for the digest endpoint.

use chrono::{Datelike, Days, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    category::DatabaseID,
    recurring::{Frequency, RecurringTransaction, list_recurring, set_last_processed},
    transaction::{NewTransaction, Transaction, insert_transaction},
    user::UserID,
};

/// How far ahead, in days, the digest and notification sync look for
/// upcoming occurrences. The horizon is inclusive.
pub const NOTIFICATION_HORIZON_DAYS: i64 = 7;

/// Advance `from` by one period of `frequency`.
///
/// Monthly schedules clamp the day of month to the length of the target
/// month, and the clamped day carries forward to later months. A schedule
/// that starts on the 31st of January therefore continues on the 29th (in a
/// leap year) and stays on the 29th from March onwards.
///
/// Returns `None` if the date cannot be represented, which only happens at
/// the edges of the supported date range.
pub fn advance(frequency: Frequency, from: NaiveDate) -> Option<NaiveDate> {
    match frequency {
        Frequency::Daily => from.checked_add_days(Days::new(1)),
        Frequency::Weekly => from.checked_add_days(Days::new(7)),
        Frequency::Biweekly => from.checked_add_days(Days::new(14)),
        Frequency::Monthly => advance_month(from),
        Frequency::Yearly => advance_year(from),
    }
}

/// The number of days in each month, with February always 29 in years
/// divisible by four. Years like 2100 are not leap years, so the clamp below
/// falls back one day for them.
const DAYS_IN_MONTH: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

fn days_in_month(year: i32, month: u32) -> u32 {
    if month == 2 && year % 4 != 0 {
        28
    } else {
        DAYS_IN_MONTH[(month - 1) as usize]
    }
}

fn advance_month(from: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if from.month() == 12 {
        (from.year() + 1, 1)
    } else {
        (from.year(), from.month() + 1)
    };

    let day = from.day().min(days_in_month(year, month));

    NaiveDate::from_ymd_opt(year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(year, month, day - 1))
}

fn advance_year(from: NaiveDate) -> Option<NaiveDate> {
    // Feb 29 has no anniversary in the following year, settle for Feb 28.
    from.with_year(from.year() + 1)
        .or_else(|| NaiveDate::from_ymd_opt(from.year() + 1, 2, 28))
}

/// Compute the next occurrence of `recurring` after its last materialized
/// occurrence.
///
/// Returns the start date if nothing has been materialized yet, and `None`
/// once the schedule has run past its end date.
pub fn next_occurrence(recurring: &RecurringTransaction) -> Option<NaiveDate> {
    let next = match recurring.last_processed {
        None => recurring.start_date,
        Some(last) => advance(recurring.frequency, last)?,
    };

    match recurring.end_date {
        Some(end) if next > end => None,
        _ => Some(next),
    }
}

/// Materialize every overdue occurrence of `user_id`'s active recurring
/// transactions as concrete transactions, up to and including `today`.
///
/// Each materialized occurrence advances the definition's `last_processed`
/// date, so running this twice on the same day creates nothing new.
pub fn materialize_due(
    connection: &Connection,
    user_id: UserID,
    today: NaiveDate,
) -> Result<Vec<Transaction>, Error> {
    let mut created = Vec::new();

    for mut recurring in list_recurring(connection, user_id)? {
        if !recurring.is_active {
            continue;
        }

        while let Some(next) = next_occurrence(&recurring) {
            if next > today {
                break;
            }

            let transaction = insert_transaction(
                connection,
                user_id,
                &NewTransaction {
                    name: recurring.name.clone(),
                    amount: recurring.amount,
                    category: recurring.category.clone(),
                    is_income: recurring.is_income,
                    date: next,
                    description: format!("Recurring: {}", recurring.description),
                    recurring_id: Some(recurring.id),
                },
            )?;
            created.push(transaction);

            set_last_processed(connection, user_id, recurring.id, next)?;
            recurring.last_processed = Some(next);
        }
    }

    Ok(created)
}

/// A recurring transaction summarized for the due/upcoming digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingRecurring {
    /// The recurring transaction's ID in the application database.
    pub id: DatabaseID,
    /// The recurring transaction's label.
    pub name: String,
    /// The amount of each occurrence.
    pub amount: f64,
    /// The name of the category occurrences belong to.
    pub category: String,
    /// How often the transaction repeats.
    pub frequency: Frequency,
    /// The date of the next occurrence.
    pub next_occurrence: NaiveDate,
    /// Whether occurrences are income.
    pub is_income: bool,
}

/// The response body of the due/upcoming digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringDigest {
    /// Active definitions whose next occurrence is today or earlier.
    pub due: Vec<UpcomingRecurring>,
    /// Active definitions whose next occurrence is within the next week.
    pub upcoming: Vec<UpcomingRecurring>,
}

/// Split active recurring transactions into those due now and those coming
/// up within [NOTIFICATION_HORIZON_DAYS] of `today`.
pub fn split_due_upcoming(
    recurring: &[RecurringTransaction],
    today: NaiveDate,
) -> RecurringDigest {
    let horizon = today + chrono::Duration::days(NOTIFICATION_HORIZON_DAYS);

    let mut due = Vec::new();
    let mut upcoming = Vec::new();

    for definition in recurring {
        if !definition.is_active {
            continue;
        }

        let Some(next) = next_occurrence(definition) else {
            continue;
        };

        let payload = UpcomingRecurring {
            id: definition.id,
            name: definition.name.clone(),
            amount: definition.amount,
            category: definition.category.clone(),
            frequency: definition.frequency,
            next_occurrence: next,
            is_income: definition.is_income,
        };

        if next <= today {
            due.push(payload);
        } else if next <= horizon {
            upcoming.push(payload);
        }
    }

    RecurringDigest { due, upcoming }
}

#[cfg(test)]
mod advance_tests {
    use chrono::NaiveDate;

    use crate::recurring::Frequency;

    use super::advance;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn daily_weekly_biweekly_add_fixed_days() {
        let from = date(2024, 8, 7);

        assert_eq!(advance(Frequency::Daily, from), Some(date(2024, 8, 8)));
        assert_eq!(advance(Frequency::Weekly, from), Some(date(2024, 8, 14)));
        assert_eq!(advance(Frequency::Biweekly, from), Some(date(2024, 8, 21)));
    }

    #[test]
    fn monthly_clamps_to_leap_february_and_drifts() {
        let jan = date(2024, 1, 31);

        let feb = advance(Frequency::Monthly, jan).unwrap();
        assert_eq!(feb, date(2024, 2, 29));

        // The clamp carries forward. March has 31 days but the schedule stays
        // on the 29th.
        let mar = advance(Frequency::Monthly, feb).unwrap();
        assert_eq!(mar, date(2024, 3, 29));
    }

    #[test]
    fn monthly_clamps_to_28_in_non_leap_february() {
        assert_eq!(
            advance(Frequency::Monthly, date(2023, 1, 31)),
            Some(date(2023, 2, 28))
        );
    }

    #[test]
    fn monthly_century_year_is_not_a_leap_year() {
        assert_eq!(
            advance(Frequency::Monthly, date(2100, 1, 31)),
            Some(date(2100, 2, 28))
        );
    }

    #[test]
    fn monthly_wraps_december_into_next_year() {
        assert_eq!(
            advance(Frequency::Monthly, date(2024, 12, 15)),
            Some(date(2025, 1, 15))
        );
    }

    #[test]
    fn yearly_moves_leap_day_to_feb_28() {
        assert_eq!(
            advance(Frequency::Yearly, date(2024, 2, 29)),
            Some(date(2025, 2, 28))
        );
        assert_eq!(
            advance(Frequency::Yearly, date(2024, 6, 1)),
            Some(date(2025, 6, 1))
        );
    }
}
