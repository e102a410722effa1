use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::Deserialize;
use travel_assistant_core::tool::Error as ToolError;

/// A calendar date of a trip, as the model fills it in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, JsonSchema)]
pub struct TravelDate {
    /// Day of the month.
    #[schemars(range(min = 1, max = 31))]
    pub day: u32,
    /// Month of the year.
    #[schemars(range(min = 1, max = 12))]
    pub month: u32,
    /// Four-digit year.
    #[schemars(range(min = 2025, max = 2050))]
    pub year: i32,
}

impl TravelDate {
    /// Checks the ranges and returns the date if it exists in the calendar.
    pub fn to_naive_date(self) -> Result<NaiveDate, ToolError> {
        let Self { day, month, year } = self;
        if !(1..=31).contains(&day)
            || !(1..=12).contains(&month)
            || !(2025..=2050).contains(&year)
        {
            return Err(ToolError::invalid_input().with_reason(format!(
                "Travel date {year}-{month:02}-{day:02} is out of range"
            )));
        }
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            ToolError::invalid_input().with_reason(format!(
                "Travel date {year}-{month:02}-{day:02} does not exist"
            ))
        })
    }
}
