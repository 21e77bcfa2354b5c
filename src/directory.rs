//! Regional contact directory.
//!
//! Maps an 8-digit postal code to the contact bundle of the city whose range
//! contains it. The range table is kept sorted by start for lookup, but every
//! range remembers its declaration position: when two ranges contain the same
//! value, the one declared first wins. Overlaps are detected when the table is
//! built and either logged or rejected, see [`OverlapPolicy`].

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::DirectoryError;
use crate::postal_code;
use crate::types::{CityContacts, EmergencyNumber, PhoneEntry, ServiceContact};

/// City name used by the generic bundle
pub const FALLBACK_CITY: &str = "Sua Cidade";

const EMBEDDED_DIRECTORY: &str = include_str!("../data/directory.json");

/// Emergency lines, identical nationwide and never looked up by postal code
pub const EMERGENCY_NUMBERS: [EmergencyNumber; 5] = [
    EmergencyNumber {
        key: "samu",
        number: "192",
        label: "SAMU - Emergência Médica",
    },
    EmergencyNumber {
        key: "policia",
        number: "190",
        label: "Polícia Militar",
    },
    EmergencyNumber {
        key: "bombeiros",
        number: "193",
        label: "Corpo de Bombeiros",
    },
    EmergencyNumber {
        key: "policiaFederal",
        number: "194",
        label: "Polícia Federal",
    },
    EmergencyNumber {
        key: "defesaCivil",
        number: "199",
        label: "Defesa Civil",
    },
];

/// What to do when two declared ranges share postal codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Log each overlap and keep the earliest-declared range authoritative
    #[default]
    Warn,
    /// Refuse to build the table
    Reject,
}

/// An inclusive range of postal codes belonging to one city
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalCodeRange {
    pub start: u32,
    pub end: u32,
    pub city_key: String,
    /// Position in the declared list
    order: usize,
}

impl PostalCodeRange {
    pub fn new(start: u32, end: u32, city_key: &str) -> Self {
        Self {
            start,
            end,
            city_key: city_key.to_string(),
            order: 0,
        }
    }

    pub fn contains(&self, value: u32) -> bool {
        self.start <= value && value <= self.end
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Two declared ranges that share at least one postal code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeOverlap {
    pub earlier: String,
    pub later: String,
    pub start: u32,
    pub end: u32,
}

/// Sorted interval table with earliest-declared-wins tie-breaking
#[derive(Debug, Clone)]
pub struct RangeTable {
    ranges: Vec<PostalCodeRange>,
    overlaps: Vec<RangeOverlap>,
}

impl RangeTable {
    /// Build from ranges in declaration order.
    pub fn new(
        declared: Vec<PostalCodeRange>,
        policy: OverlapPolicy,
    ) -> Result<Self, DirectoryError> {
        let mut ranges: Vec<PostalCodeRange> = declared
            .into_iter()
            .enumerate()
            .map(|(order, range)| PostalCodeRange { order, ..range })
            .collect();

        for range in &ranges {
            if range.start > range.end {
                return Err(DirectoryError::InvalidRange {
                    start: format!("{:08}", range.start),
                    end: format!("{:08}", range.end),
                    reason: "start is after end".to_string(),
                });
            }
        }

        let mut overlaps = Vec::new();
        for (i, earlier) in ranges.iter().enumerate() {
            for later in &ranges[i + 1..] {
                if earlier.overlaps(later) {
                    overlaps.push(RangeOverlap {
                        earlier: earlier.city_key.clone(),
                        later: later.city_key.clone(),
                        start: earlier.start.max(later.start),
                        end: earlier.end.min(later.end),
                    });
                }
            }
        }

        for overlap in &overlaps {
            match policy {
                OverlapPolicy::Reject => {
                    return Err(DirectoryError::Overlap {
                        earlier: overlap.earlier.clone(),
                        later: overlap.later.clone(),
                        start: overlap.start,
                        end: overlap.end,
                    });
                }
                OverlapPolicy::Warn => tracing::warn!(
                    earlier = %overlap.earlier,
                    later = %overlap.later,
                    "postal code ranges overlap on {:08}..={:08}, earlier range wins",
                    overlap.start,
                    overlap.end
                ),
            }
        }

        ranges.sort_by_key(|r| (r.start, r.order));
        Ok(Self { ranges, overlaps })
    }

    /// Range containing `value`; the earliest-declared one if several do
    pub fn find(&self, value: u32) -> Option<&PostalCodeRange> {
        let upper = self.ranges.partition_point(|r| r.start <= value);
        let candidates = &self.ranges[..upper];
        if self.overlaps.is_empty() {
            return candidates.last().filter(|r| r.contains(value));
        }
        candidates
            .iter()
            .filter(|r| r.contains(value))
            .min_by_key(|r| r.order)
    }

    pub fn overlaps(&self) -> &[RangeOverlap] {
        &self.overlaps
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    cities: HashMap<String, CityContacts>,
    ranges: Vec<RangeEntry>,
}

#[derive(Debug, Deserialize)]
struct RangeEntry {
    start: String,
    end: String,
    city: String,
}

fn parse_bound(raw: &str, entry: &RangeEntry) -> Result<u32, DirectoryError> {
    let invalid = |reason: &str| DirectoryError::InvalidRange {
        start: entry.start.clone(),
        end: entry.end.clone(),
        reason: reason.to_string(),
    };
    if raw.len() != 8 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("bounds must be 8 digits"));
    }
    raw.parse().map_err(|_| invalid("bound is not a number"))
}

/// Read-only contact directory, loaded once and shared by reference
#[derive(Debug, Clone)]
pub struct ContactDirectory {
    cities: HashMap<String, CityContacts>,
    ranges: RangeTable,
}

impl ContactDirectory {
    /// Directory compiled into the binary
    pub fn embedded() -> Result<Self, DirectoryError> {
        Self::from_json(EMBEDDED_DIRECTORY, OverlapPolicy::default())
    }

    pub fn from_path(path: &Path, policy: OverlapPolicy) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw, policy)
    }

    pub fn from_json(raw: &str, policy: OverlapPolicy) -> Result<Self, DirectoryError> {
        let file: DirectoryFile = serde_json::from_str(raw)?;

        let mut declared = Vec::with_capacity(file.ranges.len());
        for entry in &file.ranges {
            let start = parse_bound(&entry.start, entry)?;
            let end = parse_bound(&entry.end, entry)?;
            if !file.cities.contains_key(&entry.city) {
                return Err(DirectoryError::UnknownCity {
                    start: entry.start.clone(),
                    end: entry.end.clone(),
                    city: entry.city.clone(),
                });
            }
            declared.push(PostalCodeRange::new(start, end, &entry.city));
        }

        Self::new(file.cities, declared, policy)
    }

    pub fn new(
        cities: HashMap<String, CityContacts>,
        declared: Vec<PostalCodeRange>,
        policy: OverlapPolicy,
    ) -> Result<Self, DirectoryError> {
        let ranges = RangeTable::new(declared, policy)?;
        tracing::debug!(
            cities = cities.len(),
            ranges = ranges.len(),
            "contact directory loaded"
        );
        Ok(Self { cities, ranges })
    }

    /// Contact bundle for a postal code.
    ///
    /// Returns `None` only when the input does not carry exactly 8 digits.
    /// Postal codes outside every declared range get [`fallback_contacts`].
    pub fn lookup(&self, postal_code: &str) -> Option<CityContacts> {
        let digits = postal_code::normalize(postal_code)?;
        let value: u32 = digits.parse().ok()?;

        match self
            .ranges
            .find(value)
            .and_then(|range| self.cities.get(&range.city_key))
        {
            Some(contacts) => Some(contacts.clone()),
            None => {
                tracing::debug!(postal_code = %digits, "no range matched, using generic contacts");
                Some(fallback_contacts())
            }
        }
    }

    pub fn city(&self, key: &str) -> Option<&CityContacts> {
        self.cities.get(key)
    }

    pub fn city_count(&self) -> usize {
        self.cities.len()
    }

    pub fn ranges(&self) -> &RangeTable {
        &self.ranges
    }
}

/// Generic bundle pointing at the national hotlines
pub fn fallback_contacts() -> CityContacts {
    let single = |organization: &str, label: &str, number: &str| ServiceContact {
        organization: organization.to_string(),
        phones: vec![PhoneEntry::new(label, number)],
        website: None,
    };
    CityContacts {
        city: FALLBACK_CITY.to_string(),
        state: String::new(),
        prefeitura: single("Prefeitura Municipal", "Central 156", "156"),
        energia: single("Distribuidora Local", "Aneel", "0800-727-0003"),
        agua: single("Companhia de Água Local", "ANA", "0800-725-2255"),
        gas: None,
    }
}

pub fn emergency_numbers() -> &'static [EmergencyNumber] {
    &EMERGENCY_NUMBERS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> ContactDirectory {
        ContactDirectory::embedded().unwrap()
    }

    fn bundle(city: &str) -> CityContacts {
        let mut contacts = fallback_contacts();
        contacts.city = city.to_string();
        contacts.state = "XX".to_string();
        contacts
    }

    #[test]
    fn test_embedded_directory_is_consistent() {
        let dir = directory();
        assert_eq!(dir.city_count(), 30);
        assert_eq!(dir.ranges().len(), 30);
        assert!(dir.ranges().overlaps().is_empty());
    }

    #[test]
    fn test_sao_paulo_lookup() {
        let contacts = directory().lookup("01310100").unwrap();
        assert_eq!(contacts.city, "São Paulo");
        assert_eq!(contacts.state, "SP");
        assert!(contacts.prefeitura.phones.iter().any(|p| p.number == "156"));
        assert!(contacts.gas.is_some());
    }

    #[test]
    fn test_formatted_input_is_accepted() {
        let dir = directory();
        assert_eq!(dir.lookup("80010-000").unwrap().city, "Curitiba");
        assert_eq!(dir.lookup(" 90.010-150 ").unwrap().city, "Porto Alegre");
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let dir = directory();
        assert_eq!(dir.lookup("89200000").unwrap().city, "Joinville");
        assert_eq!(dir.lookup("89239999").unwrap().city, "Joinville");
        assert_eq!(dir.lookup("89240000").unwrap().city, FALLBACK_CITY);
    }

    #[test]
    fn test_unknown_range_gets_fallback() {
        let contacts = directory().lookup("99999999").unwrap();
        assert_eq!(contacts.city, FALLBACK_CITY);
        assert_eq!(contacts.state, "");
        for (_, service) in contacts.services() {
            assert_eq!(service.phones.len(), 1);
        }
        assert_eq!(contacts.prefeitura.phones[0].number, "156");

        // Gap between the São Paulo and Santos ranges
        assert_eq!(directory().lookup("10000000").unwrap().city, FALLBACK_CITY);
    }

    #[test]
    fn test_malformed_input_returns_none() {
        let dir = directory();
        for input in ["", "0131010", "013101000", "abc", "01310-10x"] {
            assert!(dir.lookup(input).is_none(), "expected None for {:?}", input);
        }
    }

    #[test]
    fn test_overlap_earliest_declared_wins() {
        let cities: HashMap<String, CityContacts> = [
            ("first".to_string(), bundle("First")),
            ("second".to_string(), bundle("Second")),
        ]
        .into_iter()
        .collect();

        let dir = ContactDirectory::new(
            cities.clone(),
            vec![
                PostalCodeRange::new(10_000_000, 10_999_999, "first"),
                PostalCodeRange::new(10_500_000, 11_999_999, "second"),
            ],
            OverlapPolicy::Warn,
        )
        .unwrap();
        assert_eq!(dir.ranges().overlaps().len(), 1);
        assert_eq!(dir.lookup("10600000").unwrap().city, "First");
        assert_eq!(dir.lookup("11000000").unwrap().city, "Second");

        // Same ranges, reversed declaration order
        let dir = ContactDirectory::new(
            cities,
            vec![
                PostalCodeRange::new(10_500_000, 11_999_999, "second"),
                PostalCodeRange::new(10_000_000, 10_999_999, "first"),
            ],
            OverlapPolicy::Warn,
        )
        .unwrap();
        assert_eq!(dir.lookup("10600000").unwrap().city, "Second");
        assert_eq!(dir.lookup("10100000").unwrap().city, "First");
    }

    #[test]
    fn test_overlap_rejected_when_requested() {
        let result = RangeTable::new(
            vec![
                PostalCodeRange::new(1, 100, "a"),
                PostalCodeRange::new(100, 200, "b"),
            ],
            OverlapPolicy::Reject,
        );
        assert!(matches!(
            result,
            Err(DirectoryError::Overlap { start: 100, end: 100, .. })
        ));
    }

    #[test]
    fn test_json_validation() {
        let unknown_city = r#"{"cities":{},"ranges":[{"start":"01000000","end":"01999999","city":"nowhere"}]}"#;
        assert!(matches!(
            ContactDirectory::from_json(unknown_city, OverlapPolicy::Warn),
            Err(DirectoryError::UnknownCity { .. })
        ));

        let short_bound = r#"{"cities":{},"ranges":[{"start":"1000","end":"01999999","city":"x"}]}"#;
        assert!(matches!(
            ContactDirectory::from_json(short_bound, OverlapPolicy::Warn),
            Err(DirectoryError::InvalidRange { .. })
        ));

        let reversed = RangeTable::new(
            vec![PostalCodeRange::new(200, 100, "x")],
            OverlapPolicy::Warn,
        );
        assert!(matches!(reversed, Err(DirectoryError::InvalidRange { .. })));
    }

    #[test]
    fn test_emergency_numbers_are_fixed() {
        let numbers: Vec<&str> = emergency_numbers().iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec!["192", "190", "193", "194", "199"]);
    }
}
