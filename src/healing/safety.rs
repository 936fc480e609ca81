//! Node-type safety classifier.
//!
//! Answers one question: may a node of this type be mutated without human
//! review? Destructive node types (shell, database writes, filesystem, ssh)
//! are never auto-fix-safe regardless of the issue; unknown types default to
//! unsafe.

/// Node type fragments that are never safe to touch unattended.
///
/// Matched case-insensitively against the full type string so vendor
/// prefixes (`n8n-nodes-base.`, community packages) don't matter.
const DENYLIST: &[&str] = &[
    "executecommand",
    "ssh",
    "postgres",
    "mysql",
    "mssql",
    "mongodb",
    "redis",
    "readwritefile",
    "filesystem",
    "deletefile",
    "ftp",
    "kubernetes",
    "terraform",
];

/// Base names of node types known to be benign to mutate.
///
/// Compared against the segment after the vendor prefix, exactly.
const ALLOWLIST: &[&str] = &[
    "httprequest",
    "webhook",
    "set",
    "if",
    "switch",
    "merge",
    "noop",
    "wait",
    "filter",
    "itemlists",
    "datetime",
    "splitinbatches",
    "respondtowebhook",
];

/// Whether a node of this type may be auto-fixed without human review.
///
/// Denylist wins; trigger nodes are benign; anything unrecognized is unsafe.
pub fn is_safe_to_auto_fix(node_type: &str) -> bool {
    let full = node_type.to_lowercase();

    if DENYLIST.iter().any(|d| full.contains(d)) {
        return false;
    }

    let base = full.rsplit('.').next().unwrap_or(&full);

    if base.ends_with("trigger") {
        return true;
    }

    ALLOWLIST.contains(&base)
}
