//! Address input types and local validation.
//!
//! Everything here runs before a remote call is issued, so a rejected input
//! never causes a partial remote mutation.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::address::DEFAULT_LABEL;
use super::id::LocalityId;

/// Errors raised by local address validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The full address is empty or whitespace only.
    #[error("full address cannot be empty")]
    EmptyAddress,
    /// The full address is too long.
    #[error("full address must be at most {max} characters")]
    AddressTooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The label is too long.
    #[error("label must be at most {max} characters")]
    LabelTooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The ward number is outside the accepted range.
    #[error("ward number must be between {min} and {max} (got {got})")]
    WardOutOfRange {
        /// Smallest accepted ward.
        min: i32,
        /// Largest accepted ward.
        max: i32,
        /// Value supplied.
        got: i32,
    },
}

/// A validated, trimmed, non-empty street address.
///
/// ## Examples
///
/// ```
/// use waypoint_core::FullAddress;
///
/// assert_eq!(FullAddress::parse("  12 Palm Rd ").unwrap().as_str(), "12 Palm Rd");
/// assert!(FullAddress::parse("").is_err());
/// assert!(FullAddress::parse("   \t").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct FullAddress(String);

impl FullAddress {
    /// Maximum length in characters, after trimming.
    pub const MAX_LENGTH: usize = 500;

    /// Parse a `FullAddress`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty or longer than
    /// [`Self::MAX_LENGTH`] characters.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AddressError::EmptyAddress);
        }
        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(AddressError::AddressTooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `FullAddress` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for FullAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A short free-text tag such as "Home" or "Work".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    /// Maximum length in characters, after trimming.
    pub const MAX_LENGTH: usize = 40;

    /// Parse a label. Absent or blank input falls back to [`DEFAULT_LABEL`].
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed label is longer than
    /// [`Self::MAX_LENGTH`] characters.
    pub fn parse(s: Option<&str>) -> Result<Self, AddressError> {
        let trimmed = s.map(str::trim).unwrap_or_default();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(AddressError::LabelTooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Label {
    fn default() -> Self {
        Self(DEFAULT_LABEL.to_owned())
    }
}

/// An administrative sub-region number (ward).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct WardNumber(i32);

impl WardNumber {
    /// Smallest accepted ward number.
    pub const MIN: i32 = 1;
    /// Largest accepted ward number.
    pub const MAX: i32 = 999;

    /// Validate a ward number.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::WardOutOfRange`] outside `MIN..=MAX`.
    pub const fn new(value: i32) -> Result<Self, AddressError> {
        if value < Self::MIN || value > Self::MAX {
            return Err(AddressError::WardOutOfRange {
                min: Self::MIN,
                max: Self::MAX,
                got: value,
            });
        }
        Ok(Self(value))
    }

    /// Get the underlying number.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

/// Raw input for creating an address, as submitted by a form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAddress {
    /// Required; rejected when empty after trimming.
    pub full_address: String,
    /// Defaults to "Home" when absent or blank.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub landmark: Option<String>,
    #[serde(default)]
    pub locality_id: Option<LocalityId>,
    #[serde(default)]
    pub ward_number: Option<i32>,
    #[serde(default)]
    pub is_default: bool,
}

impl NewAddress {
    /// Convenience constructor for a plain address with no extras.
    #[must_use]
    pub fn new(full_address: impl Into<String>) -> Self {
        Self {
            full_address: full_address.into(),
            ..Self::default()
        }
    }

    /// Mark the new address as the owner's default.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Validate and normalise the input.
    ///
    /// # Errors
    ///
    /// Returns the first [`AddressError`] found.
    pub fn validate(&self) -> Result<ValidatedNewAddress, AddressError> {
        Ok(ValidatedNewAddress {
            full_address: FullAddress::parse(&self.full_address)?,
            label: Label::parse(self.label.as_deref())?,
            landmark: normalize_optional(self.landmark.as_deref()),
            locality_id: self.locality_id,
            ward_number: self.ward_number.map(WardNumber::new).transpose()?,
            is_default: self.is_default,
        })
    }
}

/// A [`NewAddress`] that passed local validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedNewAddress {
    pub full_address: FullAddress,
    pub label: Label,
    pub landmark: Option<String>,
    pub locality_id: Option<LocalityId>,
    pub ward_number: Option<WardNumber>,
    pub is_default: bool,
}

/// Partial update of an address. `None` leaves the column untouched.
///
/// Clearing an optional column (landmark, locality, ward) is expressed with
/// `Some(None)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressPatch {
    #[serde(default)]
    pub full_address: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub landmark: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub locality_id: Option<Option<LocalityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub ward_number: Option<Option<i32>>,
    #[serde(default)]
    pub is_default: Option<bool>,
}

impl AddressPatch {
    /// A patch that only promotes the address to default.
    #[must_use]
    pub fn promote() -> Self {
        Self {
            is_default: Some(true),
            ..Self::default()
        }
    }

    /// Whether applying this patch requires the clear-then-set promotion.
    #[must_use]
    pub fn promotes(&self) -> bool {
        self.is_default == Some(true)
    }

    /// Validate the patch and render the column changes as a JSON object.
    ///
    /// The caller adds `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns the first [`AddressError`] found.
    pub fn validate(&self) -> Result<serde_json::Map<String, serde_json::Value>, AddressError> {
        use serde_json::{Value, json};

        let mut columns = serde_json::Map::new();
        if let Some(full_address) = &self.full_address {
            let parsed = FullAddress::parse(full_address)?;
            columns.insert("full_address".to_owned(), json!(parsed));
        }
        if let Some(label) = &self.label {
            columns.insert("label".to_owned(), json!(Label::parse(Some(label))?));
        }
        if let Some(landmark) = &self.landmark {
            columns.insert(
                "landmark".to_owned(),
                json!(normalize_optional(landmark.as_deref())),
            );
        }
        if let Some(locality_id) = self.locality_id {
            columns.insert("locality_id".to_owned(), json!(locality_id));
        }
        if let Some(ward_number) = self.ward_number {
            let ward = ward_number.map(WardNumber::new).transpose()?;
            columns.insert("ward_number".to_owned(), json!(ward));
        }
        if let Some(is_default) = self.is_default {
            columns.insert("is_default".to_owned(), Value::Bool(is_default));
        }
        Ok(columns)
    }
}

/// Trim optional free text, mapping blank input to `None`.
fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Distinguish "field absent" from "field set to null" in patches.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option, clippy::option_option)]
    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    #[allow(clippy::option_option)]
    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
