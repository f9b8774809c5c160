use crate::types::NamespaceRef;

/// Name fragments that mark a namespace as operationally important.
pub const PRIORITY_KEYWORDS: [&str; 8] = [
    "default",
    "kube-system",
    "monitoring",
    "logging",
    "ingress",
    "cert-manager",
    "prometheus",
    "grafana",
];

pub const MAX_NAMESPACES: usize = 8;

/// Backfill only runs when the keyword pass selected fewer than this.
const BACKFILL_BELOW: usize = 5;

/// Deterministic namespace selection.
///
/// Keyword matches come first in discovery order. When fewer than five match,
/// the remaining non `kube-` namespaces are appended in discovery order until
/// eight are selected. The result never exceeds eight entries.
pub fn prioritize_namespaces(discovered: &[NamespaceRef]) -> Vec<NamespaceRef> {
    let mut selected: Vec<NamespaceRef> = Vec::new();

    for ns in discovered {
        let lower = ns.to_lowercase();
        if PRIORITY_KEYWORDS.iter().any(|k| lower.contains(k)) && !selected.contains(ns) {
            selected.push(ns.clone());
        }
    }

    if selected.len() < BACKFILL_BELOW {
        for ns in discovered {
            if !selected.contains(ns) && !ns.starts_with("kube-") {
                selected.push(ns.clone());
                if selected.len() >= MAX_NAMESPACES {
                    break;
                }
            }
        }
    }

    selected.truncate(MAX_NAMESPACES);
    selected
}

/// Normalize an operator-supplied namespace list: trimmed, non-empty, first occurrence wins.
pub fn explicit_namespaces(requested: &[String]) -> Vec<NamespaceRef> {
    let mut out: Vec<NamespaceRef> = Vec::new();
    for ns in requested.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !out.iter().any(|existing| existing == ns) {
            out.push(ns.to_string());
        }
    }
    out
}
