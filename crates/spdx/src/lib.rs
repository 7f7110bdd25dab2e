//! Static catalog of common SPDX licenses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub is_osi_approved: bool,
    pub is_fsf_libre: bool,
    pub is_deprecated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub see_also: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comments: String,
    pub category: String,
    pub compatibility: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LicenseError {
    #[error("license not found: {id}")]
    NotFound { id: String },
}

/// Fixed table of license metadata keyed by SPDX identifier.
#[derive(Debug, Clone)]
pub struct LicenseCatalog {
    licenses: Vec<LicenseInfo>,
}

impl Default for LicenseCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseCatalog {
    pub fn new() -> Self {
        let licenses = builtin_licenses();
        tracing::info!(count = licenses.len(), "initialized license catalog");
        Self { licenses }
    }

    pub fn len(&self) -> usize {
        self.licenses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.licenses.is_empty()
    }

    /// Looks up a license by identifier.
    ///
    /// An exact match wins; otherwise the trimmed identifier is compared
    /// case-insensitively.
    pub fn lookup(&self, id: &str) -> Result<&LicenseInfo, LicenseError> {
        tracing::debug!(id, "looking up license");

        if let Some(license) = self.licenses.iter().find(|license| license.id == id) {
            return Ok(license);
        }

        let normalized = id.trim();
        self.licenses
            .iter()
            .find(|license| license.id.eq_ignore_ascii_case(normalized))
            .ok_or_else(|| LicenseError::NotFound { id: id.to_string() })
    }

    /// Returns licenses whose id, name or comments contain the query,
    /// case-insensitively, in catalog order.
    pub fn search(&self, query: &str) -> Vec<&LicenseInfo> {
        let query = query.trim().to_lowercase();
        let results = self
            .licenses
            .iter()
            .filter(|license| {
                license.id.to_lowercase().contains(&query)
                    || license.name.to_lowercase().contains(&query)
                    || license.comments.to_lowercase().contains(&query)
            })
            .collect::<Vec<_>>();
        tracing::debug!(query = %query, results = results.len(), "license search complete");
        results
    }

    /// Distinct non-empty categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for license in &self.licenses {
            let category = license.category.as_str();
            if !category.is_empty() && !categories.contains(&category) {
                categories.push(category);
            }
        }
        categories
    }

    pub fn by_category(&self, category: &str) -> Vec<&LicenseInfo> {
        self.licenses
            .iter()
            .filter(|license| license.category == category)
            .collect()
    }
}

struct Entry {
    id: &'static str,
    name: &'static str,
    osi: bool,
    fsf: bool,
    category: &'static str,
    compatibility: &'static str,
    comments: &'static str,
    see_also: &'static str,
}

const ENTRIES: &[Entry] = &[
    Entry {
        id: "MIT",
        name: "MIT License",
        osi: true,
        fsf: true,
        category: "Permissive",
        compatibility: "Very High",
        comments: "Simple and permissive license allowing almost unrestricted freedom",
        see_also: "https://opensource.org/licenses/MIT",
    },
    Entry {
        id: "Apache-2.0",
        name: "Apache License 2.0",
        osi: true,
        fsf: true,
        category: "Permissive",
        compatibility: "High",
        comments: "Permissive license with patent grant and trademark protection",
        see_also: "https://www.apache.org/licenses/LICENSE-2.0",
    },
    Entry {
        id: "BSD-3-Clause",
        name: "BSD 3-Clause \"New\" or \"Revised\" License",
        osi: true,
        fsf: true,
        category: "Permissive",
        compatibility: "Very High",
        comments: "Permissive license similar to MIT but with explicit non-endorsement clause",
        see_also: "https://opensource.org/licenses/BSD-3-Clause",
    },
    Entry {
        id: "BSD-2-Clause",
        name: "BSD 2-Clause \"Simplified\" License",
        osi: true,
        fsf: true,
        category: "Permissive",
        compatibility: "Very High",
        comments: "Simplified version of BSD license with fewer restrictions",
        see_also: "https://opensource.org/licenses/BSD-2-Clause",
    },
    Entry {
        id: "ISC",
        name: "ISC License",
        osi: true,
        fsf: true,
        category: "Permissive",
        compatibility: "Very High",
        comments: "Functionally equivalent to MIT and BSD 2-Clause",
        see_also: "https://opensource.org/licenses/ISC",
    },
    Entry {
        id: "GPL-3.0",
        name: "GNU General Public License v3.0",
        osi: true,
        fsf: true,
        category: "Copyleft",
        compatibility: "Low",
        comments: "Strong copyleft license requiring source code disclosure",
        see_also: "https://www.gnu.org/licenses/gpl-3.0.html",
    },
    Entry {
        id: "GPL-2.0",
        name: "GNU General Public License v2.0",
        osi: true,
        fsf: true,
        category: "Copyleft",
        compatibility: "Low",
        comments: "Earlier version of GPL with strong copyleft requirements",
        see_also: "https://www.gnu.org/licenses/old-licenses/gpl-2.0.html",
    },
    Entry {
        id: "LGPL-3.0",
        name: "GNU Lesser General Public License v3.0",
        osi: true,
        fsf: true,
        category: "Weak Copyleft",
        compatibility: "Medium",
        comments: "Weaker copyleft allowing dynamic linking without license propagation",
        see_also: "https://www.gnu.org/licenses/lgpl-3.0.html",
    },
    Entry {
        id: "AGPL-3.0",
        name: "GNU Affero General Public License v3.0",
        osi: true,
        fsf: true,
        category: "Strong Copyleft",
        compatibility: "Very Low",
        comments: "Strongest copyleft license including network use trigger",
        see_also: "https://www.gnu.org/licenses/agpl-3.0.html",
    },
    Entry {
        id: "MPL-2.0",
        name: "Mozilla Public License 2.0",
        osi: true,
        fsf: true,
        category: "Weak Copyleft",
        compatibility: "Medium",
        comments: "File-level copyleft license balancing openness and commercial use",
        see_also: "https://www.mozilla.org/MPL/2.0/",
    },
    Entry {
        id: "CC0-1.0",
        name: "Creative Commons Zero v1.0 Universal",
        osi: false,
        fsf: true,
        category: "Public Domain",
        compatibility: "Very High",
        comments: "Public domain dedication for maximum freedom",
        see_also: "https://creativecommons.org/publicdomain/zero/1.0/",
    },
    Entry {
        id: "CC-BY-4.0",
        name: "Creative Commons Attribution 4.0 International",
        osi: false,
        fsf: true,
        category: "Permissive",
        compatibility: "High",
        comments: "Requires attribution but allows commercial use and derivatives",
        see_also: "https://creativecommons.org/licenses/by/4.0/",
    },
    Entry {
        id: "Unlicense",
        name: "The Unlicense",
        osi: false,
        fsf: true,
        category: "Public Domain",
        compatibility: "Very High",
        comments: "Release software into public domain",
        see_also: "http://unlicense.org/",
    },
    Entry {
        id: "WTFPL",
        name: "Do What The F*ck You Want To Public License",
        osi: false,
        fsf: true,
        category: "Public Domain",
        compatibility: "Very High",
        comments: "Extremely permissive public domain-like license",
        see_also: "http://www.wtfpl.net/",
    },
];

fn builtin_licenses() -> Vec<LicenseInfo> {
    ENTRIES
        .iter()
        .map(|entry| LicenseInfo {
            id: entry.id.to_string(),
            name: entry.name.to_string(),
            text: None,
            is_osi_approved: entry.osi,
            is_fsf_libre: entry.fsf,
            is_deprecated: false,
            see_also: vec![entry.see_also.to_string()],
            comments: entry.comments.to_string(),
            category: entry.category.to_string(),
            compatibility: entry.compatibility.to_string(),
        })
        .collect()
}
