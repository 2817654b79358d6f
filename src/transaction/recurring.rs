//! Backfills the occurrences of a recurring transaction that fall between its
//! start date and today.

use time::{Date, Month};

use crate::transaction::{Frequency, TransactionBuilder};

/// Generate the occurrences of `template` that were missed between its date and `today`.
///
/// Occurrences are spaced one calendar month or one calendar year apart,
/// starting strictly after the template date. Generation stops at the first
/// date after `today` or after the recurrence end date, so only past
/// occurrences are ever produced. Each occurrence is a copy of the template
/// without the recurrence descriptor.
///
/// A day that does not exist in the target month is clamped to the last day
/// of that month. Every occurrence is computed from the template date, so a
/// series starting on the 31st returns to the 31st whenever the month allows.
///
/// Returns an empty list if `template` does not recur.
pub fn generate_missed_occurrences(
    template: &TransactionBuilder,
    today: Date,
) -> Vec<TransactionBuilder> {
    let Some(recurrence) = template.recurrence else {
        return Vec::new();
    };

    let months_per_step = match recurrence.frequency {
        Frequency::Monthly => 1,
        Frequency::Annual => 12,
    };

    let mut occurrences = Vec::new();

    for step in 1.. {
        let Some(date) = add_months(template.date, step * months_per_step) else {
            break;
        };

        if date > today {
            break;
        }

        if recurrence.end_date.is_some_and(|end_date| date > end_date) {
            break;
        }

        occurrences.push(TransactionBuilder {
            date,
            recurrence: None,
            ..template.clone()
        });
    }

    occurrences
}

/// `date` moved forward by `months` calendar months, or `None` past the supported date range.
fn add_months(date: Date, months: u32) -> Option<Date> {
    let month_index = date.year() * 12 + i32::from(u8::from(date.month())) - 1;
    let target_index = month_index.checked_add(i32::try_from(months).ok()?)?;

    let year = target_index.div_euclid(12);
    let month = Month::try_from(u8::try_from(target_index.rem_euclid(12) + 1).ok()?).ok()?;
    let day = date.day().min(last_day_of_month(year, month));

    Date::from_calendar_date(year, month, day).ok()
}

fn last_day_of_month(year: i32, month: Month) -> u8 {
    match month {
        Month::January
        | Month::March
        | Month::May
        | Month::July
        | Month::August
        | Month::October
        | Month::December => 31,
        Month::April | Month::June | Month::September | Month::November => 30,
        Month::February => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
