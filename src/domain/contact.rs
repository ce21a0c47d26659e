//! Contact domain model.
//!
//! Contacts are the people tasks can be assigned to. A contact's id, avatar
//! colour and initials are all derived, so saving the same email twice
//! always addresses the same record and renders the same avatar.

use serde::{Deserialize, Serialize};

// =============================================================================
// Avatar Palette
// =============================================================================

/// Avatar colours, indexed by [`avatar_color`].
pub const AVATAR_PALETTE: [&str; 15] = [
    "#FF7A00", "#FF5EB3", "#6E52FF", "#9327FF", "#00BEE8", "#1FD7C1", "#FF745E", "#FFA35E",
    "#FC71FF", "#FFC701", "#0038FF", "#C3FF2B", "#FFE62B", "#FF4646", "#FFBB2B",
];

/// Returns the form of an email address used for ids, colours and lookups:
/// trimmed and lower-cased.
#[must_use]
pub fn canonical_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Returns the avatar colour for an email address.
///
/// The colour is picked by summing the UTF-16 code units of the email and
/// taking the remainder modulo the palette size. Callers pass the
/// [`canonical_email`] so case variants share a colour.
#[must_use]
pub fn avatar_color(email: &str) -> &'static str {
    let hash = email
        .encode_utf16()
        .fold(0_usize, |accumulator, unit| {
            accumulator.wrapping_add(usize::from(unit))
        });
    AVATAR_PALETTE[hash % AVATAR_PALETTE.len()]
}

/// Returns up to two upper-cased initials.
///
/// Uses the first letter of the first two words of the full name, falling
/// back to the first two characters of the email when the name is blank.
#[must_use]
pub fn initials(first_name: &str, last_name: &str, email: &str) -> String {
    let full_name = format!("{first_name} {last_name}");
    let from_name: String = full_name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .collect();
    if from_name.is_empty() {
        email.chars().take(2).collect::<String>().to_uppercase()
    } else {
        from_name.to_uppercase()
    }
}

/// Splits a display name into first and last name on the first space.
#[must_use]
pub fn split_display_name(display_name: &str) -> (String, String) {
    let mut parts = display_name.trim().split(' ');
    let first = parts.next().unwrap_or_default().to_string();
    let rest: Vec<&str> = parts.collect();
    (first, rest.join(" "))
}

// =============================================================================
// Contact Id
// =============================================================================

/// Unique identifier for a contact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(String);

impl ContactId {
    /// Creates a `ContactId` from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the id for an email address.
    ///
    /// The email is trimmed and lower-cased, then every `.` and `@` becomes
    /// `_`. `A.B@x.com` and `a.b@x.com ` both map to `a_b_x_com`.
    #[must_use]
    pub fn from_email(email: &str) -> Self {
        Self(canonical_email(email).replace(['.', '@'], "_"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContactId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for ContactId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// =============================================================================
// Contact
// =============================================================================

/// A person tasks can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Identifier, derived from the email when the contact was added.
    pub id: ContactId,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Email address.
    pub email: String,
    /// Phone number, possibly empty.
    pub phone: String,
    /// Avatar colour as `#RRGGBB`.
    pub color: String,
    /// Avatar initials.
    pub initials: String,
}

impl Contact {
    /// Returns `"first last"`, trimmed.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Fields for adding a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDraft {
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Email address; determines id and colour.
    pub email: String,
    /// Phone number.
    pub phone: String,
}

impl ContactDraft {
    /// Builds the contact this draft describes, deriving id, colour and
    /// initials.
    #[must_use]
    pub fn into_contact(self) -> Contact {
        let id = ContactId::from_email(&self.email);
        let color = avatar_color(&canonical_email(&self.email)).to_string();
        let initials = initials(&self.first_name, &self.last_name, &self.email);
        Contact {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            color,
            initials,
        }
    }
}

/// A partial update to a contact. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactPatch {
    /// New first name.
    pub first_name: Option<String>,
    /// New last name.
    pub last_name: Option<String>,
    /// New email. The id does not change.
    pub email: Option<String>,
    /// New phone number.
    pub phone: Option<String>,
}

impl ContactPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
    }
}

// =============================================================================
// Tests
// =============================================================================
