//! Preview sanitizer for intent summaries.
//!
//! Masks e-mail addresses, Brazilian tax IDs (CNPJ and CPF) and currency
//! amounts, then caps the result to a fixed number of characters. Every
//! preview shown to a user or written to a log goes through here first.
//!
//! The sanitizer never fails: if its patterns cannot be built it falls back
//! to length truncation only.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::warn;

/// Default preview cap in characters, ellipsis included.
pub const DEFAULT_MAX_PREVIEW_CHARS: usize = 200;

/// Appended when a preview is cut.
pub const ELLIPSIS: char = '…';

/// Replacement for the numeric part of a monetary amount.
pub const AMOUNT_MASK: &str = "***";

const LOCAL_MASK: &str = "***";

/// Upper-case labels that precede identifiers, not amounts.
const NON_CURRENCY_LABELS: [&str; 6] = ["CPF", "CEP", "NCM", "REF", "DOC", "NUM"];

// Masking can expose a new partial match after truncation; a handful of
// passes always reaches the fixed point.
const MAX_PASSES: usize = 16;

/// Outcome of a sanitization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedPreview {
    pub text: String,
    pub masked: usize,
    pub truncated: bool,
}

struct PreviewPatterns {
    email: Regex,
    cnpj: Regex,
    cpf: Regex,
    amount: Regex,
}

impl PreviewPatterns {
    fn build() -> Result<Self, regex::Error> {
        Ok(Self {
            email: Regex::new(
                r"(?P<local>[A-Za-z0-9._%+\-]+)@(?P<domain>[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)+)",
            )?,
            cnpj: Regex::new(r"(?P<first>\d{2})\.\d{3}\.\d{3}/\d{4}-\d{2}")?,
            cpf: Regex::new(r"(?P<first>\d{3})\.\d{3}\.\d{3}-\d{2}")?,
            amount: Regex::new(
                r"(?P<cur>R\$|US\$|€|£|\$|\b[A-Z]{3})(?P<sp>\s*)\d(?:[\d.,]*\d)?",
            )?,
        })
    }
}

fn patterns() -> Option<&'static PreviewPatterns> {
    static PATTERNS: OnceLock<Option<PreviewPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match PreviewPatterns::build() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "Preview patterns unavailable, falling back to truncation only");
                None
            }
        })
        .as_ref()
}

/// Sanitizer with a configurable length cap.
#[derive(Debug, Clone, Copy)]
pub struct PreviewSanitizer {
    max_chars: usize,
}

impl Default for PreviewSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PREVIEW_CHARS)
    }
}

impl PreviewSanitizer {
    /// Create a sanitizer capping output at `max_chars` (minimum 1).
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Mask sensitive values and cap the length.
    ///
    /// Idempotent: `sanitize(sanitize(x)) == sanitize(x)`.
    pub fn sanitize(&self, text: &str) -> String {
        self.sanitize_with_report(text).text
    }

    /// Like [`sanitize`](Self::sanitize), also reporting what was changed.
    pub fn sanitize_with_report(&self, text: &str) -> SanitizedPreview {
        let mut current = text.to_string();
        let mut masked = 0;
        let mut truncated = false;

        for _ in 0..MAX_PASSES {
            let (masked_text, count) = mask_sensitive(&current);
            let (next, cut) = truncate_chars(&masked_text, self.max_chars);
            masked += count;
            truncated |= cut;
            if next == current {
                break;
            }
            current = next;
        }

        SanitizedPreview {
            text: current,
            masked,
            truncated,
        }
    }
}

/// Sanitize with the default length cap.
pub fn sanitize(text: &str) -> String {
    PreviewSanitizer::default().sanitize(text)
}

fn mask_sensitive(text: &str) -> (String, usize) {
    let Some(p) = patterns() else {
        return (text.to_string(), 0);
    };

    let (text, emails) = replace_counted(&p.email, text, |caps| {
        let local = &caps["local"];
        let local_len = local.chars().count();
        let keep = (local_len / 2).clamp(1, 3);
        let kept: String = local.chars().take(keep).collect();
        Some(format!("{}{}@{}", kept, LOCAL_MASK, &caps["domain"]))
    });

    let (text, cnpjs) = replace_bounded(&p.cnpj, &text, |caps| {
        format!("{}.***.***/****-**", &caps["first"])
    });

    let (text, cpfs) = replace_bounded(&p.cpf, &text, |caps| {
        format!("{}.***.***-**", &caps["first"])
    });

    let (text, amounts) = replace_counted(&p.amount, &text, |caps| {
        let cur = &caps["cur"];
        if NON_CURRENCY_LABELS.contains(&cur) {
            return None;
        }
        Some(format!("{}{}{}", cur, &caps["sp"], AMOUNT_MASK))
    });

    (text, emails + cnpjs + cpfs + amounts)
}

/// Replace every match for which `f` returns `Some`, counting replacements.
fn replace_counted<F>(re: &Regex, text: &str, mut f: F) -> (String, usize)
where
    F: FnMut(&Captures<'_>) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut count = 0;
    for caps in re.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        if let Some(replacement) = f(&caps) {
            out.push_str(&text[last..m.start()]);
            out.push_str(&replacement);
            last = m.end();
            count += 1;
        }
    }
    out.push_str(&text[last..]);
    (out, count)
}

/// Tax IDs only count when not glued to further digits on either side.
fn replace_bounded<F>(re: &Regex, text: &str, mut f: F) -> (String, usize)
where
    F: FnMut(&Captures<'_>) -> String,
{
    replace_counted(re, text, |caps| {
        let m = caps.get(0)?;
        digit_bounded(text, m.start(), m.end()).then(|| f(caps))
    })
}

fn digit_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit())
}

fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push(ELLIPSIS);
    (out, true)
}
