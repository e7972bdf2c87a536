//! Licensing policies the remote API can attach to a work.

const BADGE_BASE: &str = "https://mirrors.creativecommons.org/presskit/buttons/88x31/png/";

/// One row of the licensing table.
///
/// `statement` may contain `{published_year}` and `{username}`, filled in by
/// [`LicensingPolicy::statement_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicensingPolicy {
    pub id: u8,
    pub name: &'static str,
    pub statement: &'static str,
    pub freedoms: &'static str,
    pub printing: &'static str,
    /// File name of the badge under the Creative Commons press kit.
    badge: Option<&'static str>,
}

impl LicensingPolicy {
    /// Looks up a policy by the identifier the API reports.
    pub fn lookup(id: u8) -> Option<&'static Self> {
        POLICIES.iter().find(|policy| policy.id == id)
    }

    pub fn statement_for(&self, username: &str, published_year: i32) -> String {
        self.statement.replace("{published_year}", &published_year.to_string()).replace("{username}", username)
    }

    pub fn badge_url(&self) -> Option<String> {
        self.badge.map(|file| format!("{BADGE_BASE}{file}"))
    }
}

static POLICIES: [LicensingPolicy; 8] = [
    LicensingPolicy {
        id: 1,
        name: "All Rights Reserved",
        statement: "© {published_year} by {username}. All Rights Reserved.",
        freedoms: "No reuse, redistribution, or modification without permission.",
        printing: "Not allowed without explicit permission.",
        badge: None,
    },
    LicensingPolicy {
        id: 2,
        name: "Public Domain",
        statement: "This work is in the public domain. Originally published in {published_year} by {username}.",
        freedoms: "Free to use for any purpose without permission.",
        printing: "Allowed for personal or commercial purposes.",
        badge: Some("cc-zero.png"),
    },
    LicensingPolicy {
        id: 3,
        name: "Creative Commons Attribution (CC-BY)",
        statement: "© {published_year} by {username}. This work is licensed under a Creative Commons Attribution 4.0 International License.",
        freedoms: "Allows reuse, redistribution, and modification with credit to the author.",
        printing: "Allowed with proper credit.",
        badge: Some("by.png"),
    },
    LicensingPolicy {
        id: 4,
        name: "CC Attribution NonCommercial (CC-BY-NC)",
        statement: "© {published_year} by {username}. This work is licensed under a Creative Commons Attribution-NonCommercial 4.0 International License.",
        freedoms: "Allows reuse and modification for non-commercial purposes with credit.",
        printing: "Allowed for non-commercial purposes with proper credit.",
        badge: Some("by-nc.png"),
    },
    LicensingPolicy {
        id: 5,
        name: "CC Attribution NonCommercial NoDerivs (CC-BY-NC-ND)",
        statement: "© {published_year} by {username}. This work is licensed under a Creative Commons Attribution-NonCommercial-NoDerivs 4.0 International License.",
        freedoms: "Allows sharing in original form for non-commercial purposes with credit; no modifications allowed.",
        printing: "Allowed for non-commercial purposes in original form with proper credit.",
        badge: Some("by-nc-nd.png"),
    },
    LicensingPolicy {
        id: 6,
        name: "CC Attribution NonCommercial ShareAlike (CC-BY-NC-SA)",
        statement: "© {published_year} by {username}. This work is licensed under a Creative Commons Attribution-NonCommercial-ShareAlike 4.0 International License.",
        freedoms: "Allows reuse and modification for non-commercial purposes under the same license, with credit.",
        printing: "Allowed for non-commercial purposes with proper credit under the same license.",
        badge: Some("by-nc-sa.png"),
    },
    LicensingPolicy {
        id: 7,
        name: "CC Attribution ShareAlike (CC-BY-SA)",
        statement: "© {published_year} by {username}. This work is licensed under a Creative Commons Attribution-ShareAlike 4.0 International License.",
        freedoms: "Allows reuse and modification for any purpose under the same license, with credit.",
        printing: "Allowed with proper credit under the same license.",
        badge: Some("by-sa.png"),
    },
    LicensingPolicy {
        id: 8,
        name: "CC Attribution NoDerivs (CC-BY-ND)",
        statement: "© {published_year} by {username}. This work is licensed under a Creative Commons Attribution-NoDerivs 4.0 International License.",
        freedoms: "Allows sharing in original form for any purpose with credit; no modifications allowed.",
        printing: "Allowed in original form with proper credit.",
        badge: Some("by-nd.png"),
    },
];
