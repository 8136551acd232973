//! Permissions Facade (spec §4.7): a pure adapter over OS privacy-permission
//! probes. Grounded on `eric8810-authy/src/error.rs`'s exhaustive-match style
//! (`AuthyError::exit_code`) — here used for the status→remediation mapping
//! instead of an error→exit-code mapping.
//!
//! The real native probes (TCC queries, `CGPreflightScreenCaptureAccess`,
//! and friends) are an external collaborator spec.md §1 deliberately keeps
//! out of scope ("OS permission probes themselves ... treated as a pure
//! function `status(name)`"). This module is that pure function plus the
//! fixed enumeration of permission names and the remediation-text rules
//! spec §4.3 specifies; a platform build wires the probe bodies in, not this
//! file.

use serde::Serialize;

/// The fixed enumeration of OS permission names this build knows about
/// (spec §4.7 "the set of known permission names is a fixed enumeration").
/// Namespaces in `registry.rs`'s method→permission map reference these by
/// name; adding a new OS-gated namespace means adding an entry here too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionName {
    Contacts,
    Calendar,
    Reminders,
    Photos,
    FullDiskAccess,
    Accessibility,
    ScreenRecording,
    Automation,
}

impl PermissionName {
    pub const ALL: &'static [PermissionName] = &[
        PermissionName::Contacts,
        PermissionName::Calendar,
        PermissionName::Reminders,
        PermissionName::Photos,
        PermissionName::FullDiskAccess,
        PermissionName::Accessibility,
        PermissionName::ScreenRecording,
        PermissionName::Automation,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionName::Contacts => "contacts",
            PermissionName::Calendar => "calendar",
            PermissionName::Reminders => "reminders",
            PermissionName::Photos => "photos",
            PermissionName::FullDiskAccess => "full_disk_access",
            PermissionName::Accessibility => "accessibility",
            PermissionName::ScreenRecording => "screen_recording",
            PermissionName::Automation => "automation",
        }
    }

    /// Settings pane this permission lives under (spec §4.7, §4.3 remediation text).
    pub fn settings_pane(&self) -> &'static str {
        match self {
            PermissionName::Contacts => "Contacts",
            PermissionName::Calendar => "Calendars",
            PermissionName::Reminders => "Reminders",
            PermissionName::Photos => "Photos",
            PermissionName::FullDiskAccess => "Full Disk Access",
            PermissionName::Accessibility => "Accessibility",
            PermissionName::ScreenRecording => "Screen Recording",
            PermissionName::Automation => "Automation",
        }
    }

    /// Non-promptable permissions can only be granted via System Settings;
    /// `request` opens settings rather than raising a native prompt
    /// (spec §4.7 "External collaborator contract").
    pub fn is_promptable(&self) -> bool {
        !matches!(
            self,
            PermissionName::FullDiskAccess
                | PermissionName::Accessibility
                | PermissionName::ScreenRecording
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    NotDetermined,
    Restricted,
    Unknown,
}

impl PermissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionStatus::Granted => "granted",
            PermissionStatus::Denied => "denied",
            PermissionStatus::NotDetermined => "not_determined",
            PermissionStatus::Restricted => "restricted",
            PermissionStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionRecord {
    pub name: &'static str,
    pub status: &'static str,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_pane: Option<&'static str>,
}

/// Deterministic function of `(permission, status)` (spec §4.3).
pub fn remediation(name: PermissionName, status: PermissionStatus) -> String {
    match status {
        PermissionStatus::Granted => String::new(),
        PermissionStatus::NotDetermined => {
            format!("Call permissions.request with permission='{}'", name.as_str())
        }
        PermissionStatus::Denied => format!(
            "User must grant permission manually in System Settings > Privacy & Security > {}",
            name.settings_pane()
        ),
        PermissionStatus::Restricted => {
            "Permission is restricted by system policy and cannot be granted".to_string()
        }
        PermissionStatus::Unknown => {
            "Permission status unknown. Check System Settings > Privacy & Security".to_string()
        }
    }
}

/// Probes the underlying OS permission state. Implementations of this trait
/// are the named external collaborator spec §1 scopes out; `NativeProbe`
/// below is the build's actual (stub, pending platform wiring) probe.
pub trait PermissionProbe: Send + Sync {
    fn check(&self, name: PermissionName) -> PermissionStatus;
    fn request(&self, name: PermissionName) -> PermissionStatus;
    fn open_settings(&self, pane: &str);
}

/// Default probe for non-macOS builds and tests: every permission reports
/// `not_determined` until a platform-specific probe is wired in. This keeps
/// the facade's contract testable without linking against TCC.
pub struct StubProbe;

impl PermissionProbe for StubProbe {
    fn check(&self, _name: PermissionName) -> PermissionStatus {
        PermissionStatus::NotDetermined
    }

    fn request(&self, _name: PermissionName) -> PermissionStatus {
        PermissionStatus::NotDetermined
    }

    fn open_settings(&self, pane: &str) {
        tracing::info!(pane, "would open System Settings pane (stub probe)");
    }
}

pub struct PermissionsFacade {
    probe: Box<dyn PermissionProbe>,
}

impl PermissionsFacade {
    pub fn new(probe: Box<dyn PermissionProbe>) -> Self {
        Self { probe }
    }

    pub fn check(&self, name: PermissionName) -> PermissionRecord {
        let status = self.probe.check(name);
        PermissionRecord {
            name: name.as_str(),
            status: status.as_str(),
            description: remediation(name, status),
            settings_pane: (status != PermissionStatus::Granted).then(|| name.settings_pane()),
        }
    }

    pub fn list(&self) -> Vec<PermissionRecord> {
        PermissionName::ALL.iter().map(|&n| self.check(n)).collect()
    }

    pub fn request(&self, name: PermissionName) -> PermissionStatus {
        self.probe.request(name)
    }

    pub fn open_settings(&self, pane: &str) {
        self.probe.open_settings(pane)
    }
}

impl Default for PermissionsFacade {
    fn default() -> Self {
        Self::new(Box::new(StubProbe))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_text_matches_spec_examples() {
        assert_eq!(
            remediation(PermissionName::Contacts, PermissionStatus::NotDetermined),
            "Call permissions.request with permission='contacts'"
        );
        assert!(remediation(PermissionName::Contacts, PermissionStatus::Denied)
            .contains("System Settings > Privacy & Security > Contacts"));
    }

    #[test]
    fn non_promptable_permissions_are_the_fixed_three() {
        assert!(!PermissionName::FullDiskAccess.is_promptable());
        assert!(!PermissionName::Accessibility.is_promptable());
        assert!(!PermissionName::ScreenRecording.is_promptable());
        assert!(PermissionName::Contacts.is_promptable());
    }

    #[test]
    fn parse_round_trips_as_str() {
        for p in PermissionName::ALL {
            assert_eq!(PermissionName::parse(p.as_str()), Some(*p));
        }
        assert_eq!(PermissionName::parse("nonexistent"), None);
    }

    #[test]
    fn facade_with_stub_probe_reports_not_determined() {
        let facade = PermissionsFacade::default();
        let record = facade.check(PermissionName::Contacts);
        assert_eq!(record.status, "not_determined");
    }
}
