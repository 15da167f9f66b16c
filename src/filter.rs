//! Service-interest filtering.

use crate::device::Device;

/// A stateless predicate over a device's advertised service identifiers.
///
/// An empty filter is the universal match. A non-empty filter matches a
/// device iff any advertised identifier contains any filter string as a
/// substring. Matching ignores ASCII case: users quote short UUIDs the way
/// the Bluetooth SIG lists them (`"180F"`) while the service reports
/// lowercase 128-bit forms (`"0000180f-..."`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    wanted: Vec<String>,
}

impl ServiceFilter {
    /// Creates a filter from the desired-service substrings.
    pub fn new(wanted: impl IntoIterator<Item = impl Into<String>>) -> Self {
        ServiceFilter {
            wanted: wanted.into_iter().map(Into::into).collect(),
        }
    }

    /// The universal match.
    pub fn match_all() -> Self {
        ServiceFilter::default()
    }

    /// Whether this filter matches every device.
    pub fn is_match_all(&self) -> bool {
        self.wanted.is_empty()
    }

    /// The configured substrings.
    pub fn wanted(&self) -> &[String] {
        &self.wanted
    }

    /// Whether `device` advertises any service of interest.
    pub fn matches(&self, device: &Device) -> bool {
        if self.wanted.is_empty() {
            return true;
        }
        self.wanted
            .iter()
            .any(|wanted| device.services.iter().any(|service| contains_ignore_case(service, wanted)))
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}
