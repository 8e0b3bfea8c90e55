//! Priority-ordered keyword rules mapping row text to a [`Label`].
//!
//! Rules are evaluated top to bottom and the first match wins. The last rule
//! always matches, so [`evaluate`] is total.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{ItemFields, Label};

/// Domains whose mail is treated as coming from a financial institution.
const BANK_DOMAINS: &[&str] = &[
    "chase.com",
    "bankofamerica.com",
    "wellsfargo.com",
    "citi.com",
    "citibank.com",
    "capitalone.com",
    "usbank.com",
    "americanexpress.com",
    "discover.com",
    "schwab.com",
    "fidelity.com",
    "paypal.com",
    "ally.com",
    "hsbc.com",
    "barclays.co.uk",
];

/// Local parts used by machine senders.
const AUTOMATED_LOCAL_PARTS: &[&str] = &[
    "noreply",
    "no-reply",
    "no_reply",
    "donotreply",
    "do-not-reply",
    "notifications",
    "notification",
    "alerts",
    "alert",
    "mailer-daemon",
    "postmaster",
    "bounce",
    "automated",
];

const NEWSLETTER_LOCAL_PARTS: &[&str] = &[
    "newsletter",
    "newsletters",
    "news",
    "digest",
    "marketing",
    "promo",
    "promotions",
    "deals",
    "offers",
];

static FINANCIAL_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(statements?|balance|transactions?|deposits?|withdrawals?|payments?|transfers?|account ending|credit card|debit card|overdraft|billing|invoice|e-?statement)\b",
    )
    .expect("valid financial regex")
});

static BANKING_PHRASES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(bank statement|account balance|available balance|direct deposit|wire transfer|transaction alert|fraud alert|suspicious activity on your account|your account ending in)\b",
    )
    .expect("valid banking regex")
});

static MEETING_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(meeting|meet up|calendar|invitation|invite|zoom|google meet|microsoft teams|webex|conference call|video call|agenda|rsvp|sync up|1:1|one-on-one)\b",
    )
    .expect("valid meeting regex")
});

static ACTION_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(please (review|confirm|approve|sign|respond|reply|complete|submit|send|fill out|let me know)|action required|response required|requires your|awaiting your|deadline|due (by|on|date)|asap|urgent|by (monday|tuesday|wednesday|thursday|friday|saturday|sunday|tomorrow|today|eod|end of day)|can you|could you)\b",
    )
    .expect("valid action regex")
});

static FOLLOW_UP_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(follow(ing)?[ -]up|checking in|circling back|just a reminder|gentle reminder|friendly reminder|reminder|any update|any news|still waiting|haven't heard back|bumping this)\b",
    )
    .expect("valid follow-up regex")
});

static REPLY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(re|fwd?)\s*:").expect("valid reply prefix regex"));

static NEWSLETTER_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\bunsubscribe\b|\bnewsletter\b|\bweekly digest\b|\bdaily digest\b|\bview (it )?in (your )?browser\b|\bmanage (your )?preferences\b|\bemail preferences\b|\d+\s?% off\b|\bsale\b|\bpromo code\b|\bcoupon\b|\blimited time\b|\bshop now\b)",
    )
    .expect("valid newsletter regex")
});

/// Lower-cased views of the row used by every rule.
#[derive(Debug)]
pub struct Signals {
    /// `subject + " " + snippet`, lower-cased.
    text: String,
    subject: String,
    local_part: String,
    domain: String,
}

impl Signals {
    pub fn from_fields(fields: &ItemFields) -> Self {
        let subject = fields.subject.trim().to_lowercase();
        let snippet = fields.snippet.trim().to_lowercase();
        let text = match (subject.is_empty(), snippet.is_empty()) {
            (false, false) => format!("{subject} {snippet}"),
            (false, true) => subject.clone(),
            (true, _) => snippet,
        };
        let (local_part, domain) = split_address(&fields.sender);
        Self {
            text,
            subject,
            local_part,
            domain,
        }
    }

    fn sender_domain_in(&self, domains: &[&str]) -> bool {
        !self.domain.is_empty()
            && domains.iter().any(|d| {
                self.domain == *d
                    || (self.domain.ends_with(d)
                        && self.domain[..self.domain.len() - d.len()].ends_with('.'))
            })
    }

    fn sender_local_in(&self, prefixes: &[&str]) -> bool {
        !self.local_part.is_empty()
            && prefixes.iter().any(|p| {
                self.local_part == *p
                    || self
                        .local_part
                        .strip_prefix(p)
                        .is_some_and(|rest| rest.starts_with(['+', '-', '.', '_']))
            })
    }
}

/// Splits a sender into lower-cased `(local_part, domain)`.
///
/// Accepts a bare address or `Display Name <address>`. Without an `@` the
/// whole value is returned as the local part.
fn split_address(raw: &str) -> (String, String) {
    let raw = raw.trim();
    let address = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw,
    };
    let address = address.trim().to_lowercase();
    match address.rsplit_once('@') {
        Some((local, domain)) => (local.to_string(), domain.trim_end_matches('.').to_string()),
        None => (address, String::new()),
    }
}

pub struct Rule {
    pub name: &'static str,
    pub label: Label,
    matches: fn(&Signals) -> bool,
}

/// Ordered rule table. Position is priority.
pub static RULES: &[Rule] = &[
    Rule {
        name: "bank",
        label: Label::Bank,
        matches: |s| {
            BANKING_PHRASES.is_match(&s.text)
                || (s.sender_domain_in(BANK_DOMAINS) && FINANCIAL_TERMS.is_match(&s.text))
        },
    },
    Rule {
        name: "automated-sender",
        label: Label::Automated,
        matches: |s| s.sender_domain_in(BANK_DOMAINS) || s.sender_local_in(AUTOMATED_LOCAL_PARTS),
    },
    Rule {
        name: "meeting",
        label: Label::Meeting,
        matches: |s| MEETING_TERMS.is_match(&s.text),
    },
    Rule {
        name: "needs-action",
        label: Label::NeedsAction,
        matches: |s| ACTION_TERMS.is_match(&s.text),
    },
    Rule {
        name: "follow-up",
        label: Label::FollowUp,
        matches: |s| FOLLOW_UP_TERMS.is_match(&s.text) || REPLY_PREFIX.is_match(&s.subject),
    },
    Rule {
        name: "newsletter",
        label: Label::Newsletter,
        matches: |s| {
            NEWSLETTER_TERMS.is_match(&s.text) || s.sender_local_in(NEWSLETTER_LOCAL_PARTS)
        },
    },
    Rule {
        name: "fallback",
        label: Label::Automated,
        matches: |_| true,
    },
];

/// Returns the first rule matching `fields`.
pub fn evaluate(fields: &ItemFields) -> &'static Rule {
    let signals = Signals::from_fields(fields);
    RULES
        .iter()
        .find(|rule| (rule.matches)(&signals))
        .unwrap_or(&RULES[RULES.len() - 1])
}

pub fn classify(fields: &ItemFields) -> Label {
    evaluate(fields).label
}
