//! Task entity and the derived predicates and ordering built on it.
//!
//! A [`Task`] is plain data. The store replaces tasks as whole records; the
//! only identity-bearing fields (`id`, `notificationId`) are generated here
//! and never change through an edit.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Display format used when none is configured.
pub const DEFAULT_DATE_FORMAT: &str = "%B %d, %Y at %H:%M";

/// Input format accepted for reminder times.
pub const DUE_DATE_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn title(self) -> &'static str {
        match self {
            Priority::Low => "Low priority",
            Priority::Medium => "Medium priority",
            Priority::High => "High priority",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Medium),
            2 => Ok(Priority::High),
            other => Err(format!("unknown priority {other} (expected 0, 1 or 2)")),
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "l" | "0" => Ok(Priority::Low),
            "medium" | "med" | "m" | "1" => Ok(Priority::Medium),
            "high" | "h" | "2" => Ok(Priority::High),
            other => Err(Error::InvalidArgument(format!(
                "invalid priority '{other}' (expected low|medium|high)"
            ))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Civil date and time with minute precision and no timezone.
///
/// Components are stored as given; they are not required to form a real
/// calendar date. An impossible date is simply never "valid".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DueDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl DueDate {
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
        }
    }

    /// Truncate a timestamp to minute precision.
    pub fn from_naive(value: NaiveDateTime) -> Self {
        Self::new(
            value.year(),
            value.month(),
            value.day(),
            value.hour(),
            value.minute(),
        )
    }

    /// The calendar timestamp, or `None` when the components are impossible.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_opt(
            self.hour,
            self.minute,
            0,
        )
    }

    /// Parse `YYYY-MM-DD HH:MM`.
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed = NaiveDateTime::parse_from_str(raw.trim(), DUE_DATE_INPUT_FORMAT)
            .map_err(|err| {
                Error::InvalidArgument(format!(
                    "invalid date '{raw}': {err} (expected YYYY-MM-DD HH:MM)"
                ))
            })?;
        Ok(Self::from_naive(parsed))
    }

    /// Render with a strftime format, falling back to the raw components
    /// when they do not form a real date or the format is malformed.
    pub fn format(&self, format: &str) -> String {
        use std::fmt::Write;

        let Some(value) = self.to_naive() else {
            return self.raw();
        };
        let mut rendered = String::new();
        if write!(rendered, "{}", value.format(format)).is_err() {
            return self.raw();
        }
        rendered
    }

    fn raw(&self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

/// `dueDate` is always present on disk; "no date" is the all-zero record.
mod due_date_record {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::DueDate;

    const NO_DATE: DueDate = DueDate {
        year: 0,
        month: 0,
        day: 0,
        hour: 0,
        minute: 0,
    };

    pub fn serialize<S>(value: &Option<DueDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.unwrap_or(NO_DATE).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DueDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<DueDate>::deserialize(deserializer)?;
        Ok(value.filter(|due| *due != NO_DATE))
    }
}

impl fmt::Display for DueDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(DEFAULT_DATE_FORMAT))
    }
}

/// One todo entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, with = "due_date_record")]
    pub due_date: Option<DueDate>,
    notification_id: String,
    #[serde(default)]
    pub has_notification: bool,
}

impl Task {
    /// A fresh task with default values and newly generated identifiers.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            is_completed: false,
            due_date: None,
            notification_id: Uuid::new_v4().to_string(),
            has_notification: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_completed(mut self, is_completed: bool) -> Self {
        self.is_completed = is_completed;
        self
    }

    pub fn with_due_date(mut self, due_date: DueDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Set a due date and ask for a reminder at that time.
    pub fn with_reminder(mut self, due_date: DueDate) -> Self {
        self.due_date = Some(due_date);
        self.has_notification = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn notification_id(&self) -> &str {
        &self.notification_id
    }

    pub(crate) fn regenerate_notification_id(&mut self) {
        self.notification_id = Uuid::new_v4().to_string();
    }

    /// True when a due date exists, is a real calendar time, and is not
    /// before `now`.
    pub fn due_date_is_valid(&self, now: NaiveDateTime) -> bool {
        self.due_date
            .and_then(|due| due.to_naive())
            .map(|due| due >= now)
            .unwrap_or(false)
    }

    /// The task has a reminder that has not fired yet.
    pub fn has_active_reminder(&self, now: NaiveDateTime) -> bool {
        self.has_notification && self.due_date_is_valid(now)
    }

    /// Same predicate as [`Task::has_active_reminder`], read from the side of
    /// an edited copy that is about to be stored.
    pub fn wants_reminder(&self, now: NaiveDateTime) -> bool {
        self.has_active_reminder(now)
    }

    /// Case-insensitive substring match on the title. Empty filters match.
    pub fn matches_filter(&self, filter: &str) -> bool {
        let filter = filter.trim();
        if filter.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&filter.to_lowercase())
    }
}

/// Display order: open before completed, then higher priority, then title.
pub fn compare_for_display(left: &Task, right: &Task) -> Ordering {
    left.is_completed
        .cmp(&right.is_completed)
        .then_with(|| right.priority.cmp(&left.priority))
        .then_with(|| left.title.cmp(&right.title))
}

/// Stable sort into display order.
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(compare_for_display);
}

/// Checks applied before an edited task may be committed.
pub fn validate_for_save(task: &Task, now: NaiveDateTime) -> Result<()> {
    if task.title.trim().is_empty() {
        return Err(Error::EmptyTitle);
    }
    if task.has_notification && !task.due_date_is_valid(now) {
        let shown = task
            .due_date
            .map(|due| due.to_string())
            .unwrap_or_else(|| "(none)".to_string());
        return Err(Error::DueDateNotInFuture(shown));
    }
    Ok(())
}

/// Fixed demo data for preview contexts.
pub fn seed_tasks() -> Vec<Task> {
    vec![
        Task::new("Medium priority task")
            .with_description("Description for medium priority task"),
        Task::new("High priority task")
            .with_description("Description for high priority task")
            .with_priority(Priority::High),
        Task::new("Low priority task")
            .with_description("Description for low priority task")
            .with_priority(Priority::Low),
        Task::new("High priority completed")
            .with_description("Description for a completed high priority task")
            .with_priority(Priority::High)
            .with_completed(true),
        Task::new("Task with notification")
            .with_description("Description for a task with a reminder")
            .with_due_date(DueDate::new(2021, 5, 25, 14, 15)),
        Task::new("Task with a long description")
            .with_description(
                "Description for a task with a long description. \
                 This description will span multiple lines on a narrow screen.",
            )
            .with_completed(true),
        Task::new("Medium priority completed")
            .with_description("Description for a completed medium priority task")
            .with_completed(true),
        Task::new("Low priority completed")
            .with_description("Description for a completed low priority task")
            .with_priority(Priority::Low)
            .with_completed(true),
    ]
}
