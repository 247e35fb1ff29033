//! Malware family attribution.
//!
//! Rules are tried in a fixed order; the first non-empty name wins:
//!
//! 1. first match (severity ascending) declaring families
//! 2. antivirus detection-name consensus (file tasks)
//! 3. IDS trojan alert naming
//! 4. scanner `Win.Trojan.` detection (file tasks)

use super::consensus::{title_case, FamilyConsensus};
use dt_common::{MatchRecord, ResultAggregate, CATEGORY_FILE};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Engine whose detections are counted twice in the consensus vote.
const TRUSTED_VENDOR: &str = "Microsoft";

const ALERT_PREFIXES: [&str; 2] = ["ET TROJAN", "ETPRO TROJAN"];

const SCANNER_PREFIX: &str = "Win.Trojan.";

/// Alert tokens that name a technique or platform rather than a family.
const ALERT_BLOCKLIST: [&str; 20] = [
    "upx", "executable", "potential", "likely", "rogue", "supicious", "generic", "possible", "known",
    "common", "troj", "trojan", "team", "probably", "w2km", "http", "abuse.ch", "win32", "unknown",
    "single",
];

static ALERT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9\.]+").unwrap());

/// Resolve `malfamily` for an aggregate whose `signatures` are already sorted.
pub fn resolve_family(results: &ResultAggregate, consensus: &dyn FamilyConsensus) -> String {
    from_matches(&results.signatures)
        .or_else(|| from_detections(results, consensus))
        .or_else(|| from_alerts(results))
        .or_else(|| from_scanner(results))
        .unwrap_or_default()
}

fn non_empty(name: String) -> Option<String> {
    (!name.is_empty()).then_some(name)
}

fn is_file_task(results: &ResultAggregate) -> bool {
    results.info.category == CATEGORY_FILE
}

fn from_matches(matches: &[MatchRecord]) -> Option<String> {
    matches
        .iter()
        .find_map(|m| m.families.first())
        .and_then(|family| non_empty(title_case(family)))
}

fn from_detections(results: &ResultAggregate, consensus: &dyn FamilyConsensus) -> Option<String> {
    if !is_file_task(results) {
        return None;
    }
    let engines = results
        .enrichment("virustotal")?
        .get("results")?
        .as_array()?;

    let mut names = Vec::new();
    for engine in engines {
        let Some(sig) = engine.get("sig").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
            continue;
        };
        names.push(sig.to_string());
        if engine.get("vendor").and_then(Value::as_str) == Some(TRUSTED_VENDOR) {
            names.push(sig.to_string());
        }
    }
    if names.is_empty() {
        return None;
    }
    non_empty(consensus.consensus(&names))
}

/// Family named by one alert signature, if it follows the trojan naming scheme.
fn alert_family(signature: &str) -> Option<String> {
    if !ALERT_PREFIXES.iter().any(|p| signature.starts_with(p)) {
        return None;
    }
    let words: Vec<&str> = ALERT_TOKEN.find_iter(signature).map(|m| m.as_str()).collect();
    let mut candidate = *words.get(2)?;
    if candidate.eq_ignore_ascii_case("win32") {
        candidate = *words.get(3)?;
    }
    let lowered = candidate.to_ascii_lowercase();
    if ALERT_BLOCKLIST.contains(&lowered.as_str()) {
        return None;
    }
    let family = candidate.split('.').next().unwrap_or_default();
    non_empty(title_case(family))
}

fn from_alerts(results: &ResultAggregate) -> Option<String> {
    let alerts = results.enrichment("suricata")?.get("alerts")?.as_array()?;
    // The last qualifying alert wins.
    alerts
        .iter()
        .filter_map(|alert| alert.get("signature").and_then(Value::as_str))
        .filter_map(alert_family)
        .last()
}

fn from_scanner(results: &ResultAggregate) -> Option<String> {
    if !is_file_task(results) {
        return None;
    }
    let detection = results.target.file.as_ref()?.clamav.as_deref()?;
    detection
        .strip_prefix(SCANNER_PREFIX)
        .and_then(|rest| non_empty(rest.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::TokenConsensus;
    use dt_common::{TargetFile, CATEGORY_URL};
    use serde_json::json;

    #[test]
    fn test_first_declared_family_title_cased() {
        let mut results = ResultAggregate::new(CATEGORY_FILE);
        results.signatures = vec![
            MatchRecord::new("a", 1, 100, 1.0),
            MatchRecord::new("b", 2, 100, 1.0).with_families(vec!["dridex", "cridex"]),
            MatchRecord::new("c", 3, 100, 1.0).with_families(vec!["emotet"]),
        ];
        assert_eq!(resolve_family(&results, &TokenConsensus), "Dridex");
    }

    #[test]
    fn test_alert_family_parsing() {
        assert_eq!(
            alert_family("ET TROJAN Zbot.Variant Checkin").as_deref(),
            Some("Zbot")
        );
        assert_eq!(
            alert_family("ETPRO TROJAN Win32/Ursnif Checkin").as_deref(),
            Some("Ursnif")
        );
        assert_eq!(alert_family("ET TROJAN Generic Checkin"), None);
        assert_eq!(alert_family("ET POLICY Dropbox Checkin"), None);
        assert_eq!(alert_family("ET TROJAN"), None);
    }

    #[test]
    fn test_last_qualifying_alert_wins() {
        let mut results = ResultAggregate::new(CATEGORY_URL);
        results.enrichment.insert(
            "suricata".into(),
            json!({"alerts": [
                {"signature": "ET TROJAN Zbot Checkin"},
                {"signature": "ET TROJAN Possible Malware"},
                {"signature": "ET TROJAN Necurs.B Checkin"},
                {"signature": "ET INFO Something"}
            ]}),
        );
        assert_eq!(resolve_family(&results, &TokenConsensus), "Necurs");
    }

    #[test]
    fn test_scanner_fallback_only_for_files() {
        let mut results = ResultAggregate::new(CATEGORY_FILE);
        results.target.file = Some(TargetFile {
            clamav: Some("Win.Trojan.Agent-12345".into()),
            ..Default::default()
        });
        assert_eq!(resolve_family(&results, &TokenConsensus), "Agent-12345");

        results.info.category = CATEGORY_URL.into();
        assert_eq!(resolve_family(&results, &TokenConsensus), "");
    }

    #[test]
    fn test_trusted_vendor_counted_twice() {
        struct Recorder(std::sync::Mutex<Vec<String>>);
        impl FamilyConsensus for Recorder {
            fn consensus(&self, names: &[String]) -> String {
                self.0.lock().unwrap().extend_from_slice(names);
                String::new()
            }
        }

        let mut results = ResultAggregate::new(CATEGORY_FILE);
        results.enrichment.insert(
            "virustotal".into(),
            json!({"results": [
                {"vendor": "Microsoft", "sig": "Trojan:Win32/Tibs"},
                {"vendor": "Kaspersky", "sig": "Trojan.Win32.Tibs"},
                {"vendor": "ESET", "sig": ""}
            ]}),
        );
        let recorder = Recorder(Default::default());
        assert_eq!(resolve_family(&results, &recorder), "");
        assert_eq!(
            *recorder.0.lock().unwrap(),
            ["Trojan:Win32/Tibs", "Trojan:Win32/Tibs", "Trojan.Win32.Tibs"]
        );
    }
}
