//! Family-name consensus over antivirus detection names.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Picks one family name out of a list of detection names.
///
/// An empty string means no consensus.
pub trait FamilyConsensus: Send + Sync {
    fn consensus(&self, names: &[String]) -> String;
}

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9]+").unwrap());

/// Vendor vocabulary that never names a family.
static GENERIC_TERMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "adware", "agent", "android", "application", "artemis", "attribute", "backdoor", "behaveslike",
        "bitcoinminer", "confidence", "corrupt", "crypt", "cryptor", "downloader", "dropper", "eldorado",
        "exploit", "file", "generic", "genericgb", "generickd", "genetic", "heur", "heuristic", "high",
        "html", "inject", "injector", "kryptik", "linux", "malicious", "malware", "malware2", "msil",
        "other", "packed", "packer", "password", "possible", "program", "ransom", "ransomware", "razy",
        "reputation", "riskware", "risktool", "script", "small", "suspicious", "trojan", "trojandownloader",
        "trojandropper", "trojanspy", "trojware", "unsafe", "variant", "virus", "win32", "win64", "worm",
    ]
    .into_iter()
    .collect()
});

/// Title case per alphabetic run: first letter upper, rest lower.
pub(crate) fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Token-frequency vote over detection names.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenConsensus;

impl TokenConsensus {
    fn admissible(token: &str) -> bool {
        token.len() >= 4
            && token.chars().filter(char::is_ascii_digit).count() <= 2
            && !GENERIC_TERMS.contains(token.to_ascii_lowercase().as_str())
    }

    /// Admissible tokens with their counts, most frequent first, ties in first-seen order.
    fn ranked(names: &[String]) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for name in names {
            for m in TOKEN.find_iter(name) {
                let token = title_case(m.as_str());
                match counts.iter_mut().find(|(t, _)| *t == token) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((token, 1)),
                }
            }
        }
        counts.retain(|(t, _)| Self::admissible(t));
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }
}

impl FamilyConsensus for TokenConsensus {
    fn consensus(&self, names: &[String]) -> String {
        let ranked = Self::ranked(names);
        let Some((top, top_count)) = ranked.first() else {
            return String::new();
        };

        let decided = match ranked.get(1) {
            None => *top_count >= 2,
            Some((_, second)) => {
                *top_count >= second * 2 || *top_count > 8 || (top_count == second && *top_count > 2)
            }
        };

        if decided {
            top.clone()
        } else {
            String::new()
        }
    }
}
