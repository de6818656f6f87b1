//! Regex-based classification of confirmation replies.
//!
//! Maps a free-text chat reply ("yes", "pode enviar", "2", "cancelar o 1")
//! to a `Reply`. English and Portuguese vocabulary. Patterns are matched
//! against the whole normalized reply, so "no problem, go ahead" is not a
//! cancellation.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

/// What a reply asks the coordinator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Affirm,
    Cancel,
    /// 1-based choice from a numbered list.
    Choose(usize),
    /// Cancel a single 1-based entry of a numbered list.
    CancelOne(usize),
    Unrecognized,
}

#[derive(Debug, Clone, Copy)]
enum ReplyClass {
    Affirm,
    Cancel,
    Choose,
    CancelOne,
}

struct ReplyPattern {
    regex: Regex,
    class: ReplyClass,
}

/// Compiled reply patterns, checked in order.
struct PatternSet {
    patterns: Vec<ReplyPattern>,
}

const POLITE_SUFFIX: &str =
    r"(?:\s*,?\s*(?:please|thanks|thank you|por favor|obrigad[oa]|valeu))?";

impl PatternSet {
    fn new() -> Self {
        let specs: Vec<(String, ReplyClass)> = vec![
            // =================================================================
            // Single cancellation ("cancel 2", "cancelar o 1")
            // =================================================================
            (
                r"^(?:cancel|cancelar|cancela|cancele|remove|remover|discard|descartar)\s+(?:(?:the|o|a)\s+)?(?:(?:number|option|n[úu]mero|op[çc][ãa]o)\s+)?#?(\d{1,3})$"
                    .to_string(),
                ReplyClass::CancelOne,
            ),
            // =================================================================
            // Numeric choice ("2", "#2", "option 2", "opção 2", "yes, 1")
            // =================================================================
            (
                r"^(?:(?:the|o|a)\s+)?(?:(?:number|option|n[úu]mero|op[çc][ãa]o)\s+)?#?(\d{1,3})(?:st|nd|rd|th|º|ª)?$"
                    .to_string(),
                ReplyClass::Choose,
            ),
            (
                r"^(?:yes|ok|confirm|sim|confirmo|confirmar|pode ser)\s*,?\s+(?:(?:the|o|a)\s+)?(?:(?:number|option|n[úu]mero|op[çc][ãa]o)\s+)?#?(\d{1,3})$"
                    .to_string(),
                ReplyClass::Choose,
            ),
            // =================================================================
            // Cancellation of everything on offer
            // =================================================================
            (
                format!(
                    r"^(?:no|nope|n[ãa]o|cancel|cancel all|cancel everything|cancelar|cancelar tudo|cancelar todos|cancela|cancele|abort|abortar|stop|pare|esquece|desisto|deixa pra l[áa]|n[ãa]o envie|n[ãa]o mande|don'?t|don'?t send|do not send|never ?mind|forget it){}$",
                    POLITE_SUFFIX
                ),
                ReplyClass::Cancel,
            ),
            // =================================================================
            // Affirmation
            // =================================================================
            (
                format!(
                    r"^(?:y|yes|yep|yeah|ok|okay|sure|confirm|confirmed|go ahead|do it|send it|proceed|s|sim|pode|pode sim|pode enviar|pode mandar|pode pagar|pode seguir|pode registrar|confirmo|confirmar|confirma|confirmado|manda|envia|isso|claro|certo|beleza|fechado){}$",
                    POLITE_SUFFIX
                ),
                ReplyClass::Affirm,
            ),
        ];

        let mut patterns = Vec::with_capacity(specs.len());
        for (pattern, class) in specs {
            match Regex::new(&format!("(?i){}", pattern)) {
                Ok(regex) => patterns.push(ReplyPattern { regex, class }),
                Err(e) => warn!(error = %e, "Skipping invalid reply pattern"),
            }
        }
        Self { patterns }
    }

    fn classify(&self, normalized: &str) -> Reply {
        for pattern in &self.patterns {
            let Some(caps) = pattern.regex.captures(normalized) else {
                continue;
            };
            let index = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .filter(|n| *n > 0);
            return match (pattern.class, index) {
                (ReplyClass::Affirm, _) => Reply::Affirm,
                (ReplyClass::Cancel, _) => Reply::Cancel,
                (ReplyClass::Choose, Some(n)) => Reply::Choose(n),
                (ReplyClass::CancelOne, Some(n)) => Reply::CancelOne(n),
                _ => Reply::Unrecognized,
            };
        }
        Reply::Unrecognized
    }
}

fn pattern_set() -> &'static PatternSet {
    static PATTERNS: OnceLock<PatternSet> = OnceLock::new();
    PATTERNS.get_or_init(PatternSet::new)
}

/// Lowercase, collapse whitespace and strip surrounding punctuation.
fn normalize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| matches!(c, '.' | '!' | '?' | '"' | '\'' | '(' | ')'))
        .trim()
        .to_lowercase()
}

/// Classify a user reply.
pub fn classify_reply(text: &str) -> Reply {
    pattern_set().classify(&normalize(text))
}
