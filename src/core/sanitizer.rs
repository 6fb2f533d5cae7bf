//! Symbol Sanitizer - token metadata hygiene
//!
//! Pure and deterministic: strips invisible/bidi control characters, folds
//! homoglyphs to Latin, and measures edit distance against well-known token
//! symbols to flag impersonation.

use serde::{Deserialize, Serialize};

use crate::models::{AppError, AppResult, CheckKind, CheckResult, HygieneConfig, TokenRef};
use crate::utils::constants::{KnownToken, KNOWN_TOKENS};

/// Longest accepted raw symbol, in characters
pub const MAX_SYMBOL_LEN: usize = 32;
/// Longest accepted raw name or pool label, in characters
pub const MAX_NAME_LEN: usize = 128;

/// Zero-width characters and the soft hyphen
fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}')
}

/// Bidirectional embedding/override/isolate controls and marks
fn is_bidi_control(c: char) -> bool {
    matches!(
        c,
        '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}' | '\u{200E}' | '\u{200F}' | '\u{061C}'
    )
}

fn is_invisible(c: char) -> bool {
    is_zero_width(c) || is_bidi_control(c)
}

/// Latin lookalike for Cyrillic, Greek, and fullwidth characters
fn fold_homoglyph(c: char) -> Option<char> {
    let folded = match c {
        // Cyrillic
        'А' | 'а' => 'A',
        'В' | 'в' => 'B',
        'С' | 'с' => 'C',
        'Е' | 'е' | 'Ё' | 'ё' => 'E',
        'Н' | 'н' | 'һ' => 'H',
        'І' | 'і' | 'Ӏ' => 'I',
        'Ј' | 'ј' => 'J',
        'К' | 'к' => 'K',
        'М' | 'м' => 'M',
        'О' | 'о' => 'O',
        'Р' | 'р' => 'P',
        'Ѕ' | 'ѕ' => 'S',
        'Т' | 'т' => 'T',
        'Х' | 'х' => 'X',
        'У' | 'у' | 'Ү' | 'ү' => 'Y',
        'Ԁ' | 'ԁ' => 'D',
        'Ԛ' | 'ԛ' => 'Q',
        'Ԝ' | 'ԝ' => 'W',
        // Greek
        'Α' | 'α' => 'A',
        'Β' | 'β' => 'B',
        'Ε' | 'ε' => 'E',
        'Ζ' => 'Z',
        'Η' => 'H',
        'Ι' | 'ι' => 'I',
        'Κ' | 'κ' => 'K',
        'Μ' => 'M',
        'Ν' | 'ν' => 'N',
        'Ο' | 'ο' => 'O',
        'Ρ' | 'ρ' => 'P',
        'Τ' | 'τ' => 'T',
        'Υ' | 'υ' => 'Y',
        'Χ' | 'χ' => 'X',
        // Fullwidth forms
        '\u{FF21}'..='\u{FF3A}' => char::from(b'A' + (c as u32 - 0xFF21) as u8),
        '\u{FF41}'..='\u{FF5A}' => char::from(b'A' + (c as u32 - 0xFF41) as u8),
        '\u{FF10}'..='\u{FF19}' => char::from(b'0' + (c as u32 - 0xFF10) as u8),
        _ => return None,
    };
    Some(folded)
}

/// Strip invisible characters, trim, collapse internal whitespace.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let visible: String = raw.chars().filter(|c| !is_invisible(*c)).collect();
    visible.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison form: homoglyphs folded, ASCII uppercase, alphanumerics only
pub fn skeleton(text: &str) -> String {
    text.chars()
        .filter(|c| !is_invisible(*c))
        .map(|c| fold_homoglyph(c).unwrap_or(c))
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Levenshtein distance over chars
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Reject empty (after stripping invisibles) or oversized text
pub fn validate_text(raw: &str, field: &str, max_len: usize) -> AppResult<()> {
    let len = raw.chars().count();
    if len > max_len {
        return Err(AppError::invalid_symbol(format!(
            "{} is {} characters, max {}",
            field, len, max_len
        )));
    }
    if normalize(raw).is_empty() {
        return Err(AppError::invalid_symbol(format!("{} is empty", field)));
    }
    Ok(())
}

/// Like [`validate_text`], and the uppercased form must fit too.
/// Uppercasing can lengthen text ('ß' becomes "SS"), so the cleaned
/// symbol is measured as well as the raw one.
pub fn validate_symbol_text(raw: &str, field: &str, max_len: usize) -> AppResult<()> {
    validate_text(raw, field, max_len)?;
    let cleaned_len = normalize(raw).to_uppercase().chars().count();
    if cleaned_len > max_len {
        return Err(AppError::invalid_symbol(format!(
            "{} is {} characters once uppercased, max {}",
            field, cleaned_len, max_len
        )));
    }
    Ok(())
}

/// Closest well-known symbol to a skeleton
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearestKnown {
    pub symbol: String,
    pub distance: usize,
}

/// Sanitized view of a token's metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedSymbol {
    /// Normalized, uppercased symbol
    pub symbol: String,
    /// Normalized name
    pub name: String,
    /// Homoglyph-folded comparison form of the symbol
    pub skeleton: String,
    pub impersonation: bool,
    pub nearest: Option<NearestKnown>,
    pub invisible_stripped: usize,
    pub homoglyphs_folded: usize,
    pub findings: Vec<String>,
}

fn nearest_known(skeleton: &str) -> Option<(&'static KnownToken, usize)> {
    KNOWN_TOKENS
        .iter()
        .map(|known| (known, edit_distance(skeleton, known.symbol)))
        .min_by_key(|(_, distance)| *distance)
}

/// Stateless symbol hygiene checker
#[derive(Debug, Clone, Default)]
pub struct SymbolSanitizer {
    config: HygieneConfig,
}

impl SymbolSanitizer {
    pub fn new(config: HygieneConfig) -> Self {
        Self { config }
    }

    /// Validate a token's raw symbol and name
    pub fn validate(&self, token: &TokenRef) -> AppResult<()> {
        validate_symbol_text(&token.symbol, "symbol", MAX_SYMBOL_LEN)?;
        validate_text(&token.name, "name", MAX_NAME_LEN)
    }

    /// Clean a token's metadata. Canonical deployments never impersonate.
    pub fn clean(&self, token: &TokenRef) -> AppResult<CleanedSymbol> {
        self.validate(token)?;
        Ok(self.clean_text(token.chain_id, Some(&token.address), &token.symbol, &token.name))
    }

    /// Clean a pool label (no contract address to vouch for it)
    pub fn clean_label(&self, chain_id: u64, label: &str) -> AppResult<CleanedSymbol> {
        validate_symbol_text(label, "label", MAX_NAME_LEN)?;
        Ok(self.clean_text(chain_id, None, label, label))
    }

    fn clean_text(
        &self,
        chain_id: u64,
        address: Option<&str>,
        raw_symbol: &str,
        raw_name: &str,
    ) -> CleanedSymbol {
        let invisible_stripped = raw_symbol.chars().filter(|c| is_invisible(*c)).count()
            + raw_name.chars().filter(|c| is_invisible(*c)).count();
        let homoglyphs_folded = raw_symbol.chars().filter(|c| fold_homoglyph(*c).is_some()).count();

        let symbol = normalize(raw_symbol).to_uppercase();
        let name = normalize(raw_name);
        let skeleton = skeleton(&symbol);

        let mut findings = Vec::new();
        if invisible_stripped > 0 {
            findings.push(format!("stripped {} invisible/bidi characters", invisible_stripped));
        }
        if homoglyphs_folded > 0 {
            findings.push(format!("{} lookalike characters in symbol", homoglyphs_folded));
        }

        let canonical = address
            .map(|addr| KNOWN_TOKENS.iter().any(|k| k.is_canonical(chain_id, addr)))
            .unwrap_or(false);

        let nearest = nearest_known(&skeleton);
        let impersonation = match nearest {
            Some((known, distance)) if !canonical && distance <= self.config.impersonation_distance => {
                findings.push(format!(
                    "symbol {} resembles {} ({}) at edit distance {}",
                    symbol, known.symbol, known.name, distance
                ));
                true
            }
            _ => false,
        };
        if canonical {
            findings.push("canonical deployment of a known token".to_string());
        }

        CleanedSymbol {
            symbol,
            name,
            skeleton,
            impersonation,
            nearest: nearest.map(|(known, distance)| NearestKnown {
                symbol: known.symbol.to_string(),
                distance,
            }),
            invisible_stripped,
            homoglyphs_folded,
            findings,
        }
    }

    /// Hygiene check result for a cleaned symbol
    pub fn assess(&self, cleaned: &CleanedSymbol) -> CheckResult {
        let findings = cleaned.findings.clone();
        if cleaned.impersonation {
            let exact = cleaned.nearest.as_ref().map(|n| n.distance == 0).unwrap_or(false);
            return if exact {
                CheckResult::fail(CheckKind::Hygiene, 10.0, 0.9, findings)
            } else {
                CheckResult::fail(CheckKind::Hygiene, 20.0, 0.7, findings)
            };
        }

        let mut score: f64 = 100.0;
        if cleaned.invisible_stripped > 0 {
            score -= 10.0;
        }
        if cleaned.homoglyphs_folded > 0 {
            score -= 15.0;
        }
        CheckResult::pass(CheckKind::Hygiene, score, 0.9, findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
    const RANDOM: &str = "0x1111111111111111111111111111111111111111";

    fn sanitizer() -> SymbolSanitizer {
        SymbolSanitizer::new(HygieneConfig::default())
    }

    #[test]
    fn test_normalize_strips_invisible_and_collapses() {
        assert_eq!(normalize("  US\u{200B}DC\u{202E}  "), "USDC");
        assert_eq!(normalize("Wrapped \t  Ether"), "Wrapped Ether");
        assert_eq!(normalize("\u{200B}\u{FEFF}"), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["  U\u{200B}SDT ", "Ｐ Ｅ Ｐ Ｅ", "\u{2066}a\u{2069}  b", "plain"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_skeleton_folds_homoglyphs() {
        // Cyrillic С and Т
        assert_eq!(skeleton("USD\u{0421}"), "USDC");
        assert_eq!(skeleton("USD\u{0422}"), "USDT");
        assert_eq!(skeleton("ＵＳＤＣ"), "USDC");
        assert_eq!(skeleton("u.s.d.c"), "USDC");
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("USDC", "USDC"), 0);
        assert_eq!(edit_distance("USDCC", "USDC"), 1);
        assert_eq!(edit_distance("USDT", "USDC"), 1);
        assert_eq!(edit_distance("", "DAI"), 3);
        assert_eq!(edit_distance("KITTEN", "SITTING"), 3);
    }

    #[test]
    fn test_validation_rejects_empty_and_oversized() {
        let s = sanitizer();
        let empty = TokenRef::new(1, RANDOM, "\u{200B}", "Name", 18);
        assert_eq!(s.clean(&empty).unwrap_err().code_str(), "VAL_INVALID_SYMBOL");

        let long = TokenRef::new(1, RANDOM, "X".repeat(MAX_SYMBOL_LEN + 1), "Name", 18);
        assert!(s.clean(&long).unwrap_err().is_validation());
    }

    #[test]
    fn test_symbol_that_grows_when_uppercased_is_rejected() {
        let s = sanitizer();
        let sharp = TokenRef::new(1, RANDOM, "ß".repeat(20), "Name", 18);
        let err = s.clean(&sharp).unwrap_err();
        assert_eq!(err.code_str(), "VAL_INVALID_SYMBOL");

        let fits = TokenRef::new(1, RANDOM, "ß".repeat(16), "Name", 18);
        assert_eq!(s.clean(&fits).unwrap().symbol, "SS".repeat(16));
    }

    #[test]
    fn test_homoglyph_impersonation_flagged() {
        let s = sanitizer();
        let fake = TokenRef::new(1, RANDOM, "USD\u{0421}", "USD Coin", 6);
        let cleaned = s.clean(&fake).unwrap();
        assert!(cleaned.impersonation);
        assert_eq!(cleaned.nearest.as_ref().unwrap().symbol, "USDC");

        let result = s.assess(&cleaned);
        assert_eq!(result.outcome, crate::models::CheckOutcome::Fail);
        assert!(result.confidence >= 0.9);
        assert!(result.evidence.iter().any(|e| e.contains("USDC")));
    }

    #[test]
    fn test_canonical_token_is_clean() {
        let s = sanitizer();
        let usdc = TokenRef::new(1, USDC, "USDC", "USD Coin", 6);
        let cleaned = s.clean(&usdc).unwrap();
        assert!(!cleaned.impersonation);

        let result = s.assess(&cleaned);
        assert_eq!(result.outcome, crate::models::CheckOutcome::Pass);
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn test_unrelated_symbol_passes() {
        let s = sanitizer();
        let token = TokenRef::new(1, RANDOM, "FROGCOIN", "Frog Coin", 18);
        let cleaned = s.clean(&token).unwrap();
        assert!(!cleaned.impersonation);
        assert_eq!(cleaned.symbol, "FROGCOIN");
    }

    #[test]
    fn test_pool_label_cleaning() {
        let s = sanitizer();
        let cleaned = s.clean_label(1, "USDC / WETH").unwrap();
        assert!(!cleaned.impersonation);
        assert_eq!(cleaned.symbol, "USDC / WETH");
        assert!(s.clean_label(1, "   ").is_err());
    }
}
