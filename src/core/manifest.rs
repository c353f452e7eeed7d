//! Userscript manifest - the metadata block userscript managers read

use std::fmt::Write as _;

use super::config::PackagingSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserscriptManifest {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub description: String,
    pub matches: Vec<String>,
}

impl UserscriptManifest {
    pub fn new(settings: &PackagingSettings, version: &str) -> Self {
        Self {
            name: settings.name.clone(),
            namespace: settings.namespace.clone(),
            version: version.to_string(),
            description: settings.description.clone(),
            matches: settings.matches.clone(),
        }
    }

    /// Manifest for this build
    pub fn current(settings: &PackagingSettings) -> Self {
        Self::new(settings, env!("CARGO_PKG_VERSION"))
    }

    /// Whether the script should start on this page URL
    pub fn permits(&self, url: &str) -> bool {
        self.matches.iter().any(|pattern| glob_match(pattern, url))
    }

    /// The `// ==UserScript==` header block
    pub fn header(&self) -> String {
        let mut out = String::from("// ==UserScript==\n");
        let mut line = |key: &str, value: &str| {
            let _ = writeln!(out, "// @{:<12} {}", key, value);
        };
        line("name", &self.name);
        line("namespace", &self.namespace);
        line("version", &self.version);
        line("description", &self.description);
        for pattern in &self.matches {
            line("match", pattern);
        }
        line("run-at", "document-end");
        line("grant", "none");
        out.push_str("// ==/UserScript==\n");
        out
    }
}

/// `*` matches any run of characters, everything else is literal
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
