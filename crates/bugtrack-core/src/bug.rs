//! Bug and developer data model for bugtrack
//!
//! JSON field names are camelCase and enum values upper-case so the wire
//! format matches what browser clients already send and expect.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Label used wherever a bug has no developer
pub const UNASSIGNED: &str = "Unassigned";

/// Bug status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Closed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "OPEN",
            Status::InProgress => "IN_PROGRESS",
            Status::Closed => "CLOSED",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Status::Open),
            "in_progress" | "in-progress" | "inprogress" => Ok(Status::InProgress),
            "closed" => Ok(Status::Closed),
            _ => Err(crate::Error::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bug priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(crate::Error::InvalidPriority(s.to_string())),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A person who can be assigned bugs and receives notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Developer {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// A tracked bug, with its developer resolved when one is assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bug {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub developer_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub developer: Option<Developer>,
}

impl Bug {
    /// Name of the assigned developer, or "Unassigned"
    pub fn assignee_name(&self) -> &str {
        self.developer
            .as_ref()
            .map_or(UNASSIGNED, |dev| dev.name.as_str())
    }

    /// Email of the assigned developer when it can be used as a recipient
    pub fn assignee_email(&self) -> Option<&str> {
        self.developer
            .as_ref()
            .map(|dev| dev.email.trim())
            .filter(|email| !email.is_empty())
    }
}

impl std::fmt::Display for Bug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} [{}] [{}] {} ({})",
            self.id,
            self.priority,
            self.status,
            self.title,
            self.assignee_name()
        )
    }
}

/// Fields accepted when creating a bug. Status is always OPEN on creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBug {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, deserialize_with = "lenient_developer_id")]
    pub developer_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_due_date")]
    pub due_date: Option<NaiveDate>,
}

impl NewBug {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        require_text("title", &self.title)
    }
}

/// Fields accepted when updating a bug.
///
/// Absent title, description, status and priority keep their prior values.
/// Developer and due date are always replaced: absent or empty means cleared.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BugChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "lenient_developer_id")]
    pub developer_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_due_date")]
    pub due_date: Option<NaiveDate>,
}

impl BugChanges {
    /// Changes that leave every field of `bug` as it is
    pub fn keeping(bug: &Bug) -> Self {
        Self {
            title: None,
            description: None,
            status: None,
            priority: None,
            developer_id: bug.developer_id,
            due_date: bug.due_date,
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        Ok(())
    }
}

/// Fields accepted when creating a developer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDeveloper {
    pub name: String,
    pub email: String,
}

impl NewDeveloper {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        require_text("name", &self.name)?;
        require_text("email", &self.email)?;
        if !self.email.contains('@') {
            return Err(crate::Error::Validation(format!(
                "email must be an address, got {:?}",
                self.email
            )));
        }
        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::Error::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Parse a developer reference as sent by form clients.
///
/// Empty input means "no developer".
pub fn parse_developer_id(input: &str) -> crate::Result<Option<i64>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let id: i64 = input
        .parse()
        .map_err(|_| crate::Error::Validation(format!("invalid developerId: {input:?}")))?;
    check_developer_id(id).map(Some)
}

/// Parse a due date given as `YYYY-MM-DD` or an RFC 3339 timestamp.
///
/// Empty input means "no due date".
pub fn parse_due_date(input: &str) -> crate::Result<Option<NaiveDate>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    DateTime::parse_from_rfc3339(input)
        .map(|ts| Some(ts.with_timezone(&Utc).date_naive()))
        .map_err(|_| crate::Error::Validation(format!("invalid dueDate: {input:?}")))
}

fn check_developer_id(id: i64) -> crate::Result<i64> {
    if id < 1 {
        return Err(crate::Error::Validation(format!(
            "developerId must be positive, got {id}"
        )));
    }
    Ok(id)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDeveloperId {
    Number(i64),
    Text(String),
}

fn lenient_developer_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    match Option::<RawDeveloperId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawDeveloperId::Number(id)) => check_developer_id(id).map(Some).map_err(D::Error::custom),
        Some(RawDeveloperId::Text(text)) => parse_developer_id(&text).map_err(D::Error::custom),
    }
}

fn lenient_due_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(text) => parse_due_date(&text).map_err(D::Error::custom),
    }
}
