// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test case identities, their static metadata, and loading a suite of them from disk.

use crate::{device::DeviceId, errors::TestSuiteLoadError};
use camino::Utf8Path;
use indexmap::IndexSet;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// The identity of a test: its class and method.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TestIdentifier {
    class: Arc<str>,
    method: Arc<str>,
}

impl TestIdentifier {
    /// Creates a new identifier.
    pub fn new(class: impl AsRef<str>, method: impl AsRef<str>) -> Self {
        Self {
            class: class.as_ref().into(),
            method: method.as_ref().into(),
        }
    }

    /// Returns the test class.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Returns the test method.
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for TestIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class, self.method)
    }
}

/// An executable test case: an identity plus its static metadata.
///
/// Equality and hashing only consider the [`TestIdentifier`]. Two events with the same class and
/// method but different properties are interchangeable in sets, maps and queue bookkeeping.
#[derive(Clone, Debug)]
pub struct TestCaseEvent {
    id: TestIdentifier,
    ignored: bool,
    properties: BTreeMap<String, String>,
    permissions: Vec<String>,
    excluded_devices: BTreeSet<DeviceId>,
}

impl TestCaseEvent {
    /// Creates a new, non-ignored event with no metadata.
    pub fn new(id: TestIdentifier) -> Self {
        Self {
            id,
            ignored: false,
            properties: BTreeMap::new(),
            permissions: Vec::new(),
            excluded_devices: BTreeSet::new(),
        }
    }

    /// Creates a new event with all of its metadata.
    pub fn with_metadata(
        id: TestIdentifier,
        ignored: bool,
        properties: BTreeMap<String, String>,
        permissions: Vec<String>,
        excluded_devices: impl IntoIterator<Item = DeviceId>,
    ) -> Self {
        Self {
            id,
            ignored,
            properties,
            permissions,
            excluded_devices: excluded_devices.into_iter().collect(),
        }
    }

    /// Returns the identity of this test case.
    pub fn id(&self) -> &TestIdentifier {
        &self.id
    }

    /// Returns true if this test case is marked as ignored.
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// Returns the properties attached to this test case.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Returns the permissions to grant before running this test case, in order.
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    /// Returns the devices this test case must not run on.
    pub fn excluded_devices(&self) -> &BTreeSet<DeviceId> {
        &self.excluded_devices
    }

    /// Returns true if this test case may not run on `device`.
    pub fn is_excluded_from(&self, device: &DeviceId) -> bool {
        self.excluded_devices.contains(device)
    }

    /// Returns true if every one of `devices` is excluded for this test case.
    pub fn excludes_all<'a>(&self, mut devices: impl Iterator<Item = &'a DeviceId>) -> bool {
        devices.all(|device| self.is_excluded_from(device))
    }

    /// Adds `device` to the exclusions. Returns false if it was already excluded.
    pub fn exclude_device(&mut self, device: DeviceId) -> bool {
        self.excluded_devices.insert(device)
    }
}

impl PartialEq for TestCaseEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TestCaseEvent {}

impl Hash for TestCaseEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TestCaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

/// The set of test cases to schedule, in load order, with duplicate identities collapsed.
#[derive(Clone, Debug, Default)]
pub struct TestSuite {
    test_cases: IndexSet<TestCaseEvent>,
}

impl TestSuite {
    /// Creates a suite from test cases. The first occurrence of an identity wins.
    pub fn new(test_cases: impl IntoIterator<Item = TestCaseEvent>) -> Self {
        Self {
            test_cases: test_cases.into_iter().collect(),
        }
    }

    /// Reads a JSON test list from `path`.
    pub fn from_path(path: &Utf8Path) -> Result<Self, TestSuiteLoadError> {
        let contents = std::fs::read_to_string(path).map_err(|err| TestSuiteLoadError::Read {
            path: path.to_owned(),
            err,
        })?;
        Self::from_json(path, &contents)
    }

    /// Parses a JSON test list. `path` is used for error messages only.
    pub fn from_json(path: &Utf8Path, contents: &str) -> Result<Self, TestSuiteLoadError> {
        let entries: Vec<TestListEntry> =
            serde_json::from_str(contents).map_err(|err| TestSuiteLoadError::Parse {
                path: path.to_owned(),
                err,
            })?;

        let mut test_cases = IndexSet::with_capacity(entries.len());
        for entry in entries {
            let event = entry.into_event();
            if !test_cases.insert(event.clone()) {
                tracing::debug!("ignoring duplicate test case {event} in {path}");
            }
        }
        Ok(Self { test_cases })
    }

    /// Returns the number of test cases in this suite.
    pub fn len(&self) -> usize {
        self.test_cases.len()
    }

    /// Returns true if this suite has no test cases.
    pub fn is_empty(&self) -> bool {
        self.test_cases.is_empty()
    }

    /// Iterates over the test cases in load order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &TestCaseEvent> + '_ {
        self.test_cases.iter()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TestListEntry {
    class: String,
    method: String,
    #[serde(default)]
    ignored: bool,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    excluded_devices: Vec<String>,
}

impl TestListEntry {
    fn into_event(self) -> TestCaseEvent {
        TestCaseEvent::with_metadata(
            TestIdentifier::new(&self.class, &self.method),
            self.ignored,
            self.properties,
            self.permissions,
            self.excluded_devices.iter().map(DeviceId::new),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn identity_ignores_metadata() {
        let id = TestIdentifier::new("com.example.FooTest", "bar");
        let plain = TestCaseEvent::new(id.clone());
        let with_props = TestCaseEvent::with_metadata(
            id,
            false,
            btreemap! { "size".to_owned() => "large".to_owned() },
            vec!["android.permission.CAMERA".to_owned()],
            [DeviceId::new("emulator-5554")],
        );

        assert_eq!(plain, with_props);

        let mut set = HashSet::new();
        set.insert(plain.clone());
        assert!(!set.insert(with_props.clone()), "same identity collapses in a set");

        let mut failures = HashMap::new();
        failures.insert(plain, 1);
        assert_eq!(failures.get(&with_props), Some(&1));
    }

    #[test]
    fn parse_test_list() {
        let json = indoc! {r#"
            [
                { "class": "com.example.A", "method": "one" },
                {
                    "class": "com.example.A",
                    "method": "two",
                    "ignored": true,
                    "properties": { "owner": "payments" },
                    "permissions": ["android.permission.CAMERA"],
                    "excluded-devices": ["emulator-5556"]
                },
                { "class": "com.example.A", "method": "one", "ignored": true }
            ]
        "#};

        let suite = TestSuite::from_json(Utf8Path::new("tests.json"), json).expect("valid list");
        assert_eq!(suite.len(), 2, "duplicate identity collapsed");

        let events: Vec<_> = suite.iter().collect();
        assert_eq!(events[0].id(), &TestIdentifier::new("com.example.A", "one"));
        assert!(!events[0].is_ignored(), "first occurrence wins");
        assert!(events[1].is_ignored());
        assert_eq!(events[1].properties()["owner"], "payments");
        assert_eq!(events[1].permissions(), ["android.permission.CAMERA"]);
        assert!(events[1].is_excluded_from(&DeviceId::new("emulator-5556")));
    }

    #[test]
    fn parse_test_list_rejects_unknown_fields() {
        let json = r#"[{ "class": "A", "method": "b", "flaky": true }]"#;
        let err = TestSuite::from_json(Utf8Path::new("tests.json"), json)
            .expect_err("unknown field is rejected");
        assert!(matches!(err, TestSuiteLoadError::Parse { .. }), "{err}");
    }

    #[test]
    fn excludes_all() {
        let a = DeviceId::new("a");
        let b = DeviceId::new("b");
        let mut event = TestCaseEvent::new(TestIdentifier::new("A", "b"));
        assert!(!event.excludes_all([&a, &b].into_iter()));
        assert!(event.exclude_device(a.clone()));
        assert!(!event.exclude_device(a.clone()), "already excluded");
        assert!(!event.excludes_all([&a, &b].into_iter()));
        event.exclude_device(b.clone());
        assert!(event.excludes_all([&a, &b].into_iter()));
    }
}
