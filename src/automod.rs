//! src/automod.rs
//! Pattern Classifier – stateless text checks behind precompiled tables.
//!
//! Everything here is a pure function over `&str`; no tracker state, no I/O.
//! The leetspeak blocklist expansion is built once at first use (one regex per
//! blocklisted word), never per message.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/* =========================================
   Spam patterns
   ========================================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpamPattern {
    ExcessiveCaps,
    ExcessivePunctuation,
    RepeatedChars,
    MassMentions,
    SuspiciousLinks,
    ZalgoText,
    ExcessiveEmojis,
}

impl SpamPattern {
    pub fn name(self) -> &'static str {
        match self {
            SpamPattern::ExcessiveCaps => "excessive_caps",
            SpamPattern::ExcessivePunctuation => "excessive_punctuation",
            SpamPattern::RepeatedChars => "repeated_chars",
            SpamPattern::MassMentions => "mass_mentions",
            SpamPattern::SuspiciousLinks => "suspicious_links",
            SpamPattern::ZalgoText => "zalgo_text",
            SpamPattern::ExcessiveEmojis => "excessive_emojis",
        }
    }
}

static RE_SPAM: Lazy<Vec<(SpamPattern, Regex)>> = Lazy::new(|| {
    vec![
        (SpamPattern::ExcessiveCaps, Regex::new(r"[A-Z]{10,}").unwrap()),
        (SpamPattern::ExcessivePunctuation, Regex::new(r"[!?]{5,}").unwrap()),
        // Five or more mention tokens back to back; isolated pings are fine.
        (
            SpamPattern::MassMentions,
            Regex::new(r"(?:<@[!&]?\d+>[\s,]*){5,}").unwrap(),
        ),
        (
            SpamPattern::SuspiciousLinks,
            Regex::new(r"(?i)(discord\.gg|bit\.ly|tinyurl|t\.co)/\w+").unwrap(),
        ),
        (
            SpamPattern::ZalgoText,
            Regex::new(
                r"[\x{0300}-\x{036F}\x{1AB0}-\x{1AFF}\x{1DC0}-\x{1DFF}\x{20D0}-\x{20FF}\x{FE20}-\x{FE2F}]",
            )
            .unwrap(),
        ),
        (
            SpamPattern::ExcessiveEmojis,
            Regex::new(
                r"[\x{1F600}-\x{1F64F}\x{1F300}-\x{1F5FF}\x{1F680}-\x{1F6FF}\x{1F1E0}-\x{1F1FF}]{10,}",
            )
            .unwrap(),
        ),
    ]
});

/// 6+ identical consecutive characters ("aaaaaaa", "!!!!!!!").
/// The regex crate has no backreferences, so this one is a plain scan.
fn has_repeated_run(text: &str, min_run: usize) -> bool {
    let mut run = 0usize;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if Some(c) == prev {
            run += 1;
            if run >= min_run {
                return true;
            }
        } else {
            prev = Some(c);
            run = 1;
        }
    }
    false
}

/// Every spam pattern matching anywhere in `text`, order-independent.
pub fn match_spam_patterns(text: &str) -> Vec<SpamPattern> {
    let mut hits: Vec<SpamPattern> = RE_SPAM
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(p, _)| *p)
        .collect();
    if has_repeated_run(text, 6) {
        hits.push(SpamPattern::RepeatedChars);
    }
    hits
}

/* =========================================
   Contextual keyword clusters
   ========================================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextCluster {
    Trading,
    Scam,
    Advertising,
    Begging,
}

impl ContextCluster {
    pub fn name(self) -> &'static str {
        match self {
            ContextCluster::Trading => "trading",
            ContextCluster::Scam => "scam",
            ContextCluster::Advertising => "advertising",
            ContextCluster::Begging => "begging",
        }
    }
}

const CONTEXT_CLUSTERS: &[(ContextCluster, &[&str])] = &[
    (
        ContextCluster::Trading,
        &["trade", "selling", "buying", "robux", "limiteds", "cheap", "free robux"],
    ),
    (
        ContextCluster::Scam,
        &["free", "giveaway", "winner", "click here", "dm me", "trust trade"],
    ),
    (
        ContextCluster::Advertising,
        &["join my", "check out", "subscribe", "follow me", "my channel", "my server"],
    ),
    (
        ContextCluster::Begging,
        &["please give", "can i have", "donate", "gift me", "spare robux"],
    ),
];

/// A cluster matches only when at least two of its keywords appear. One
/// incidental "free" must never raise a contextual alert on its own.
pub fn match_context_clusters(text: &str) -> Vec<(ContextCluster, Vec<&'static str>)> {
    let lower = text.to_lowercase();
    let mut out = Vec::new();
    for (cluster, keywords) in CONTEXT_CLUSTERS {
        let found: Vec<&'static str> = keywords
            .iter()
            .copied()
            .filter(|kw| lower.contains(kw))
            .collect();
        if found.len() >= 2 {
            out.push((*cluster, found));
        }
    }
    out
}

/* =========================================
   Profanity blocklist (multilingual)
   ========================================= */

const BLOCKLIST: &[&str] = &[
    // English
    "fuck", "fucking", "fucked", "fucker", "shit", "shitting", "bitch", "bitches",
    "asshole", "bastard", "slut", "sluts", "whore", "whores", "retard", "retarded",
    "faggot", "nigger", "nigga", "cunt", "cunts", "pussy", "cock",
    // Spanish
    "puta", "putas", "mierda", "joder", "cabron", "cabrón", "pendejo",
    "maricon", "maricón", "hijo de puta", "pinche", "verga", "carajo",
    // Italian
    "merda", "cazzo", "stronzo", "puttana", "troia", "bastardo",
    "coglione", "fanculo", "vaffanculo",
    // French
    "merde", "putain", "salope", "connard", "enculé", "fils de pute",
    "pute", "couille", "connasse",
    // German
    "scheiße", "scheisse", "arschloch", "hurensohn", "fotze",
    "schwuchtel", "wichser",
    // Portuguese
    "porra", "caralho", "filho da puta", "buceta", "cuzão", "otário",
    // Russian (transliterated)
    "blyad", "blyat", "suka", "pizdec", "govno", "mudak", "debil",
    "zasranec", "dolbaeb",
    // Slurs
    "tranny", "dyke", "kike", "spic", "chink", "gook", "towelhead",
    "raghead", "wetback", "beaner",
];

/// Look-alike substitutions tolerated by the second-tier check.
fn leet_expand(word: &str) -> String {
    let mut pattern = String::with_capacity(word.len() * 4);
    for c in word.chars() {
        match c {
            'a' => pattern.push_str("[a@4]"),
            'e' => pattern.push_str("[e3]"),
            'i' => pattern.push_str("[i1!]"),
            'o' => pattern.push_str("[o0]"),
            's' => pattern.push_str("[s5$]"),
            't' => pattern.push_str("[t7]"),
            'u' => pattern.push_str("[u4]"),
            _ => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern
}

static RE_LEET: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    BLOCKLIST
        .iter()
        .map(|w| (*w, Regex::new(&leet_expand(w)).expect("leet pattern")))
        .collect()
});

/// Two-tier check: direct substring containment first (cheap, common case),
/// then the precompiled leetspeak-expanded regexes. Returns the first
/// blocklisted token that matched.
pub fn contains_profanity(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    if let Some(word) = BLOCKLIST.iter().copied().find(|w| lower.contains(w)) {
        return Some(word);
    }
    RE_LEET
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(w, _)| *w)
}

/* =========================================
   Harmful / raid keywords
   ========================================= */

const HARMFUL_KEYWORDS: &[&str] = &[
    "raid", "nuke", "destroy server", "delete everything", "crash bot",
    "mass ban", "exploit", "hack", "ddos", "doxx", "token grab",
    "server crash", "mass kick", "admin panel", "backdoor",
];

/// All harmful keywords present in `text` (substring, case-insensitive).
pub fn find_harmful_keywords(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    HARMFUL_KEYWORDS
        .iter()
        .copied()
        .filter(|kw| lower.contains(kw))
        .collect()
}

/* =========================================
   Invite links
   ========================================= */

static RE_INVITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(discord\.gg/|discordapp\.com/invite/|discord\.com/invite/)").unwrap()
});

pub fn contains_invite_link(text: &str) -> bool {
    RE_INVITE.is_match(text)
}

/* =========================================
   Suspicious usernames
   ========================================= */

static RE_USERNAME: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("digit run", Regex::new(r"[0-9]{4,}").unwrap()),
        ("word + digit run", Regex::new(r"^[a-z]+[0-9]{4,}$").unwrap()),
        (
            "staff impersonation",
            Regex::new(r"discord|admin|mod|staff|owner|bot").unwrap(),
        ),
    ]
});

/// NFKC-fold + lowercase, so confusable glyphs can't dodge the patterns.
fn normalize_username(name: &str) -> String {
    name.nfkc().collect::<String>().to_lowercase()
}

/// First matching pattern label, or `None`. First match wins by contract: one
/// alert per join, never cumulative.
pub fn match_suspicious_username(name: &str) -> Option<&'static str> {
    let norm = normalize_username(name);
    RE_USERNAME
        .iter()
        .find(|(_, re)| re.is_match(&norm))
        .map(|(label, _)| *label)
}

/* =========================================
   Language annotation
   ========================================= */

/// Best-effort language code for alert annotation only; never drives
/// detection. Short or ambiguous input degrades to "unknown".
pub fn detect_language(text: &str) -> &'static str {
    whatlang::detect(text)
        .map(|info| info.lang().code())
        .unwrap_or("unknown")
}
