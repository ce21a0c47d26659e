//! Mapping between raw store documents and the domain model.
//!
//! The store imposes no schema and the collections carry records written by
//! several generations of clients, so decoding is lenient:
//!
//! - Unknown status strings fall back to [`Status::FIRST`]
//! - Dates are accepted as RFC 3339 or `YYYY-MM-DD` strings, epoch
//!   milliseconds, store-native `{seconds, nanoseconds}` objects, or
//!   `{"$date": ...}` wrappers around any of those
//! - A subtask is completed only when `completed` is the JSON boolean `true`
//!
//! Encoding always writes the canonical shapes.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Value, json};

use crate::domain::{
    Contact, ContactId, ContactPatch, Creator, Priority, Status, Subtask, SubtaskId, Task, TaskId,
    TaskPatch, TaskSource, Timestamp, avatar_color, canonical_email, initials, split_display_name,
};
use crate::infrastructure::{Document, StoredDocument};

const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Enumerations
// =============================================================================

/// Maps a raw status value to a workflow stage.
///
/// Matching is case-insensitive and accepts the legacy spellings written by
/// older clients. Anything unrecognised, including non-strings and absence,
/// maps to [`Status::FIRST`].
#[must_use]
pub fn normalize_status(raw: Option<&Value>) -> Status {
    let Some(text) = raw.and_then(Value::as_str) else {
        return Status::FIRST;
    };
    match text.trim().to_lowercase().as_str() {
        "triage" | "todo" | "to-do" => Status::Todo,
        "in-progress" | "inprogress" | "in progress" => Status::InProgress,
        "await-feedback" | "awaiting-feedback" | "awaiting feedback" | "awaitfeedback" => {
            Status::AwaitFeedback
        }
        "done" | "completed" => Status::Done,
        _ => Status::FIRST,
    }
}

/// Maps a raw priority value. `"high"` is the legacy spelling of urgent.
#[must_use]
pub fn normalize_priority(raw: Option<&Value>) -> Priority {
    match raw
        .and_then(Value::as_str)
        .map(|text| text.trim().to_lowercase())
        .as_deref()
    {
        Some("low") => Priority::Low,
        Some("urgent" | "high") => Priority::Urgent,
        _ => Priority::Medium,
    }
}

fn normalize_source(raw: Option<&Value>) -> TaskSource {
    match raw
        .and_then(Value::as_str)
        .map(|text| text.trim().to_lowercase())
        .as_deref()
    {
        Some("external" | "public") => TaskSource::External,
        _ => TaskSource::Member,
    }
}

// =============================================================================
// Dates
// =============================================================================

/// Converts any supported date representation into a timestamp.
///
/// Returns `None` for absent, null or unparseable values.
#[must_use]
pub fn coerce_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(text) => parse_date_string(text),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                #[allow(clippy::cast_possible_truncation)]
                number.as_f64().map(|millis| millis as i64)
            })
            .and_then(DateTime::from_timestamp_millis)
            .map(Timestamp::from_datetime),
        Value::Object(object) => {
            if let Some(inner) = object.get("$date") {
                return coerce_timestamp(inner);
            }
            let seconds = object
                .get("seconds")
                .or_else(|| object.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanoseconds = object
                .get("nanoseconds")
                .or_else(|| object.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .and_then(|nanos| u32::try_from(nanos).ok())
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, nanoseconds).map(Timestamp::from_datetime)
        }
        _ => None,
    }
}

fn parse_date_string(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(Timestamp::from_datetime(datetime.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Timestamp::from_datetime(naive.and_utc()));
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Timestamp::from_datetime(naive.and_utc()))
}

/// Converts a raw due date into a calendar date.
///
/// Plain `YYYY-MM-DD` strings are taken as-is; every other form goes through
/// [`coerce_timestamp`] and keeps the UTC calendar day.
#[must_use]
pub fn coerce_due_date(value: &Value) -> Option<NaiveDate> {
    if let Some(text) = value.as_str()
        && let Ok(date) = NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
    {
        return Some(date);
    }
    coerce_timestamp(value).map(|timestamp| timestamp.as_datetime().date_naive())
}

/// Encodes a timestamp as a store-native timestamp object.
#[must_use]
pub fn timestamp_to_value(timestamp: Timestamp) -> Value {
    let datetime = timestamp.as_datetime();
    json!({
        "seconds": datetime.timestamp(),
        "nanoseconds": datetime.timestamp_subsec_nanos(),
    })
}

fn due_date_to_value(due_date: Option<NaiveDate>) -> Value {
    due_date.map_or(Value::Null, |date| {
        Value::String(date.format(DATE_FORMAT).to_string())
    })
}

// =============================================================================
// Field Helpers
// =============================================================================

fn text(document: &Document, key: &str) -> String {
    document
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn optional_text(document: &Document, key: &str) -> Option<String> {
    document
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn normalize_assignees(raw: Option<&Value>) -> BTreeSet<ContactId> {
    raw.and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(ContactId::new)
                .collect()
        })
        .unwrap_or_default()
}

/// Decodes a raw subtask list.
///
/// Absent or non-array values yield an empty list. Entries that are not
/// objects are skipped.
#[must_use]
pub fn normalize_subtasks(raw: Option<&Value>) -> Vec<Subtask> {
    let Some(entries) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(Value::as_object)
        .map(|entry| {
            let id = entry
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map_or_else(SubtaskId::generate, SubtaskId::new);
            let title = optional_text(entry, "title")
                .or_else(|| optional_text(entry, "name"))
                .unwrap_or_default();
            let completed = entry.get("completed") == Some(&Value::Bool(true));
            Subtask {
                id,
                title,
                completed,
            }
        })
        .collect()
}

fn subtasks_to_value(subtasks: &[Subtask]) -> Value {
    Value::Array(
        subtasks
            .iter()
            .map(|subtask| {
                json!({
                    "id": subtask.id.as_str(),
                    "title": subtask.title,
                    "completed": subtask.completed,
                })
            })
            .collect(),
    )
}

fn assignees_to_value(assigned_to: &BTreeSet<ContactId>) -> Value {
    Value::Array(
        assigned_to
            .iter()
            .map(|id| Value::String(id.as_str().to_string()))
            .collect(),
    )
}

// =============================================================================
// Tasks
// =============================================================================

/// Decodes a stored task document.
///
/// The document id is authoritative; an `id` field inside the body is
/// ignored. A missing or unreadable `createdAt` becomes the current time.
#[must_use]
pub fn normalize_task(stored: &StoredDocument) -> Task {
    let data = &stored.data;
    let created_at = data
        .get("createdAt")
        .and_then(coerce_timestamp)
        .unwrap_or_else(Timestamp::now);
    let source = normalize_source(data.get("source"));

    Task {
        id: TaskId::new(stored.id.as_str()),
        title: text(data, "title"),
        description: text(data, "description"),
        category: text(data, "category"),
        priority: normalize_priority(data.get("priority")),
        status: normalize_status(data.get("status")),
        assigned_to: normalize_assignees(data.get("assignedTo")),
        due_date: data.get("dueDate").and_then(coerce_due_date),
        subtasks: normalize_subtasks(data.get("subtasks")),
        created_at,
        updated_at: data.get("updatedAt").and_then(coerce_timestamp),
        source,
        creator: Creator {
            created_by: optional_text(data, "createdBy"),
            creator_type: data
                .get("creatorType")
                .map_or(source, |raw| normalize_source(Some(raw))),
            name: optional_text(data, "creatorName"),
            email: optional_text(data, "creatorEmail"),
        },
    }
}

/// Encodes a task as a full document.
///
/// Absent optional fields are omitted rather than written as `null`.
#[must_use]
pub fn task_to_document(task: &Task) -> Document {
    let mut document = Document::new();
    document.insert("title".into(), Value::String(task.title.clone()));
    document.insert("description".into(), Value::String(task.description.clone()));
    document.insert("category".into(), Value::String(task.category.clone()));
    document.insert("priority".into(), Value::String(task.priority.as_str().into()));
    document.insert("status".into(), Value::String(task.status.as_str().into()));
    document.insert("assignedTo".into(), assignees_to_value(&task.assigned_to));
    document.insert("dueDate".into(), due_date_to_value(task.due_date));
    document.insert("subtasks".into(), subtasks_to_value(&task.subtasks));
    document.insert("createdAt".into(), timestamp_to_value(task.created_at));
    if let Some(updated_at) = task.updated_at {
        document.insert("updatedAt".into(), timestamp_to_value(updated_at));
    }
    document.insert("source".into(), Value::String(task.source.as_str().into()));
    document.insert(
        "creatorType".into(),
        Value::String(task.creator.creator_type.as_str().into()),
    );
    if let Some(created_by) = &task.creator.created_by {
        document.insert("createdBy".into(), Value::String(created_by.clone()));
    }
    if let Some(name) = &task.creator.name {
        document.insert("creatorName".into(), Value::String(name.clone()));
    }
    if let Some(email) = &task.creator.email {
        document.insert("creatorEmail".into(), Value::String(email.clone()));
    }
    document
}

/// Encodes the fields a patch changes. Clearing the due date writes `null`.
#[must_use]
pub fn patch_to_document(patch: &TaskPatch) -> Document {
    let mut document = Document::new();
    if let Some(title) = &patch.title {
        document.insert("title".into(), Value::String(title.clone()));
    }
    if let Some(description) = &patch.description {
        document.insert("description".into(), Value::String(description.clone()));
    }
    if let Some(category) = &patch.category {
        document.insert("category".into(), Value::String(category.clone()));
    }
    if let Some(priority) = patch.priority {
        document.insert("priority".into(), Value::String(priority.as_str().into()));
    }
    if let Some(status) = patch.status {
        document.insert("status".into(), Value::String(status.as_str().into()));
    }
    if let Some(assigned_to) = &patch.assigned_to {
        document.insert("assignedTo".into(), assignees_to_value(assigned_to));
    }
    if let Some(due_date) = patch.due_date {
        document.insert("dueDate".into(), due_date_to_value(due_date));
    }
    if let Some(subtasks) = &patch.subtasks {
        document.insert("subtasks".into(), subtasks_to_value(subtasks));
    }
    document
}

/// Encodes a subtask list as a single-field update.
#[must_use]
pub fn subtasks_document(subtasks: &[Subtask]) -> Document {
    let mut document = Document::new();
    document.insert("subtasks".into(), subtasks_to_value(subtasks));
    document
}

// =============================================================================
// Contacts
// =============================================================================

/// Decodes a stored contact document.
///
/// Records that only carry `displayName` are split into first and last
/// name. Missing colour and initials are derived the same way new contacts
/// get them.
#[must_use]
pub fn normalize_contact(stored: &StoredDocument) -> Contact {
    let data = &stored.data;
    let email = text(data, "email");
    let mut first_name = text(data, "firstName");
    let mut last_name = text(data, "lastName");
    if first_name.is_empty()
        && last_name.is_empty()
        && let Some(display_name) = optional_text(data, "displayName")
    {
        (first_name, last_name) = split_display_name(&display_name);
    }
    let initials = optional_text(data, "initials")
        .unwrap_or_else(|| initials(&first_name, &last_name, &email));
    let color = optional_text(data, "color")
        .unwrap_or_else(|| avatar_color(&canonical_email(&email)).to_string());

    Contact {
        id: ContactId::new(stored.id.as_str()),
        phone: text(data, "phone"),
        first_name,
        last_name,
        email,
        color,
        initials,
    }
}

fn display_name(first_name: &str, last_name: &str) -> String {
    format!("{first_name} {last_name}").trim().to_string()
}

/// Encodes a contact as a full document, including `displayName`.
#[must_use]
pub fn contact_to_document(contact: &Contact) -> Document {
    let mut document = Document::new();
    document.insert("firstName".into(), Value::String(contact.first_name.clone()));
    document.insert("lastName".into(), Value::String(contact.last_name.clone()));
    document.insert(
        "displayName".into(),
        Value::String(display_name(&contact.first_name, &contact.last_name)),
    );
    document.insert("email".into(), Value::String(contact.email.clone()));
    document.insert("phone".into(), Value::String(contact.phone.clone()));
    document.insert("color".into(), Value::String(contact.color.clone()));
    document.insert("initials".into(), Value::String(contact.initials.clone()));
    document
}

/// Encodes the fields a contact patch changes.
///
/// When either name changes, `displayName` and `initials` are recomputed
/// from the patched names, taking the unchanged name from `current`.
#[must_use]
pub fn contact_patch_to_document(patch: &ContactPatch, current: Option<&Contact>) -> Document {
    let mut document = Document::new();
    if let Some(first_name) = &patch.first_name {
        document.insert("firstName".into(), Value::String(first_name.clone()));
    }
    if let Some(last_name) = &patch.last_name {
        document.insert("lastName".into(), Value::String(last_name.clone()));
    }
    if let Some(email) = &patch.email {
        document.insert("email".into(), Value::String(email.clone()));
    }
    if let Some(phone) = &patch.phone {
        document.insert("phone".into(), Value::String(phone.clone()));
    }
    if patch.first_name.is_some() || patch.last_name.is_some() {
        let first_name = patch
            .first_name
            .as_deref()
            .or_else(|| current.map(|contact| contact.first_name.as_str()))
            .unwrap_or_default();
        let last_name = patch
            .last_name
            .as_deref()
            .or_else(|| current.map(|contact| contact.last_name.as_str()))
            .unwrap_or_default();
        let email = patch
            .email
            .as_deref()
            .or_else(|| current.map(|contact| contact.email.as_str()))
            .unwrap_or_default();
        document.insert(
            "displayName".into(),
            Value::String(display_name(first_name, last_name)),
        );
        document.insert(
            "initials".into(),
            Value::String(initials(first_name, last_name, email)),
        );
    }
    document
}

// =============================================================================
// Tests
// =============================================================================
