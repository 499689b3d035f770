use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The status of a monitor check-in.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    /// The job started.
    InProgress,
    /// The job finished successfully.
    Ok,
    /// The job failed.
    Error,
}

/// The unit of an interval schedule.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    /// Minutes.
    Minute,
    /// Hours.
    Hour,
    /// Days.
    Day,
    /// Weeks.
    Week,
    /// Months.
    Month,
    /// Years.
    Year,
}

/// The schedule a monitor is expected to run on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MonitorSchedule {
    /// A crontab expression, e.g. `0 * * * *`.
    Crontab {
        /// The crontab expression.
        value: String,
    },
    /// A fixed interval.
    Interval {
        /// The number of units between runs.
        value: u64,
        /// The unit of `value`.
        unit: IntervalUnit,
    },
}

/// Upserts a monitor together with a check-in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// The expected schedule.
    pub schedule: MonitorSchedule,
    /// Minutes after the expected time a check-in is considered missed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkin_margin: Option<u64>,
    /// Minutes a job may run before it is considered failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runtime: Option<u64>,
    /// The tz database name the schedule is expressed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A monitor check-in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CheckIn {
    /// The check-in id; reuse the id of an `InProgress` check-in to finish it.
    #[serde(serialize_with = "serialize_id")]
    pub check_in_id: Uuid,
    /// The monitor slug.
    pub monitor_slug: String,
    /// The status of the job.
    pub status: CheckInStatus,
    /// The environment the job ran in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// The duration of the job in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Optional monitor configuration to upsert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_config: Option<MonitorConfig>,
}

fn serialize_id<S: serde::Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&uuid.as_simple())
}

impl CheckIn {
    /// Creates a check-in with a fresh id.
    pub fn new(monitor_slug: impl Into<String>, status: CheckInStatus) -> CheckIn {
        CheckIn {
            check_in_id: crate::random_uuid(),
            monitor_slug: monitor_slug.into(),
            status,
            environment: None,
            duration: None,
            monitor_config: None,
        }
    }
}
