//! Scalar field extraction: regex-search the PDF's text layer for labeled
//! numeric values.
//!
//! Each field carries an **ordered list of patterns, most specific first**;
//! the first pattern that yields a valid number wins, and within a pattern
//! the **first occurrence** in the text wins — labels near the top of the
//! device report are the authoritative summary values, repeats further down
//! come from verbose dumps and are not reliable.
//!
//! Two device quirks every pattern must absorb:
//!
//! * The `NO` in labels is sometimes rendered with a zero instead of the
//!   letter O (`FeN050` for `FeNO50`), so every label accepts `[O0]`.
//! * Decimal values appear with either a period or a comma
//!   (`22.4` / `22,4`); commas are normalised to periods.
//!
//! A match whose captured value is empty or non-numeric counts as
//! **no match**, and a field with no match at all gets the sentinel — never
//! an error. New firmware changing its label wording is handled by
//! appending a pattern to the right list, nothing else.

use crate::fields::{ExtractedRecord, SENTINEL};
use once_cell::sync::Lazy;
use regex::Regex;

/// Numeric capture appended to every label pattern: integer or decimal
/// with period or comma separator.
const NUM: &str = r"([0-9]+(?:[.,][0-9]+)?)";

fn compile(label_patterns: &[&str]) -> Vec<Regex> {
    label_patterns
        .iter()
        .map(|s| Regex::new(&format!("{s}{NUM}")).expect("field pattern must compile"))
        .collect()
}

static FENO50: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)FeN[O0]\s*50\s*[:=]?\s*",
        // Older firmware labels the primary result bare "FeNO".
        r"(?i)FeN[O0]\s*[:=]\s*",
    ])
});

static FENO200: Lazy<Vec<Regex>> = Lazy::new(|| compile(&[r"(?i)FeN[O0]\s*200\s*[:=]?\s*"]));

static CANO: Lazy<Vec<Regex>> = Lazy::new(|| compile(&[r"(?i)Ca\s*N[O0]\s*[:=]?\s*"]));

static TEMPERATURE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)Temperatura\s*[:=]?\s*",
        r"(?i)\bTemp\.?\s*[:=]\s*",
    ])
});

static PRESSURE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)Presi[o\u{f3}]n\s*[:=]?\s*",
        r"(?i)\bPres\.?\s*[:=]\s*",
    ])
});

static FLOW_RATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)Tasa\s+de\s+flujo\s*[:=]?\s*",
        r"(?i)\bFlujo\s*[:=]?\s*",
    ])
});

/// Run every field's pattern list over the concatenated page text.
///
/// Curve fields of the returned record are `None`; cropping is a separate
/// stage.
pub fn extract_scalars(text: &str) -> ExtractedRecord {
    ExtractedRecord {
        feno50: find_field(text, &FENO50),
        feno200: find_field(text, &FENO200),
        cano: find_field(text, &CANO),
        temperature: find_field(text, &TEMPERATURE),
        pressure: find_field(text, &PRESSURE),
        flow_rate: find_field(text, &FLOW_RATE),
        exhalation_curve: None,
        analysis_curve: None,
    }
}

/// Try each pattern in order; first valid occurrence wins; sentinel on a
/// total miss.
fn find_field(text: &str, patterns: &[Regex]) -> String {
    for re in patterns {
        for caps in re.captures_iter(text) {
            if let Some(value) = caps.get(1).and_then(|m| normalise_value(m.as_str())) {
                return value;
            }
        }
    }
    SENTINEL.to_string()
}

/// Normalise a captured value: comma → period, strip anything non-numeric,
/// reject what does not parse as a number.
fn normalise_value(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<f64>().ok()?;
    Some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feno50_with_letter_o() {
        let r = extract_scalars("FeNO50: 38 ppb");
        assert_eq!(r.feno50, "38");
    }

    #[test]
    fn feno50_with_zero_spelling() {
        let r = extract_scalars("FeN050: 38 ppb");
        assert_eq!(r.feno50, "38");
    }

    #[test]
    fn feno50_bare_label_fallback() {
        let r = extract_scalars("FeNO: 41");
        assert_eq!(r.feno50, "41");
    }

    #[test]
    fn feno50_does_not_steal_feno200() {
        let r = extract_scalars("FeNO200: 15");
        assert_eq!(r.feno50, SENTINEL);
        assert_eq!(r.feno200, "15");
    }

    #[test]
    fn comma_decimal_normalised() {
        let r = extract_scalars("Temperatura: 22,4 \u{b0}C");
        assert_eq!(r.temperature, "22.4");
    }

    #[test]
    fn period_decimal_kept() {
        let r = extract_scalars("Presi\u{f3}n: 13.3 cmH2O");
        assert_eq!(r.pressure, "13.3");
    }

    #[test]
    fn unaccented_label_variant() {
        let r = extract_scalars("Presion = 12");
        assert_eq!(r.pressure, "12");
    }

    #[test]
    fn flow_rate_full_and_short_label() {
        assert_eq!(extract_scalars("Tasa de Flujo: 52 ml/s").flow_rate, "52");
        assert_eq!(extract_scalars("Flujo 48").flow_rate, "48");
    }

    #[test]
    fn missing_label_yields_sentinel() {
        let r = extract_scalars("FeNO50: 42\nPresi\u{f3}n: 13.3");
        assert_eq!(r.temperature, SENTINEL);
        assert_eq!(r.flow_rate, SENTINEL);
    }

    #[test]
    fn first_occurrence_wins() {
        let r = extract_scalars("FeNO50: 42\n...verbose dump...\nFeNO50: 9999");
        assert_eq!(r.feno50, "42");
    }

    #[test]
    fn label_without_value_skipped_for_later_occurrence() {
        // The first "Temperatura:" has no number after it; the scan moves
        // on to the next occurrence instead of reporting an empty value.
        let r = extract_scalars("Temperatura: ---\nTemperatura: 23.1");
        assert_eq!(r.temperature, "23.1");
    }

    #[test]
    fn scenario_a_full_report() {
        let text = "Informe CA2122\nFeNO50: 42\nTemperatura: 22.4\nPresi\u{f3}n: 13.3\nTasa de flujo: 52";
        let r = extract_scalars(text);
        assert_eq!(r.feno50, "42");
        assert_eq!(r.temperature, "22.4");
        assert_eq!(r.pressure, "13.3");
        assert_eq!(r.flow_rate, "52");
        assert_eq!(r.scalar_hits(), 4);
    }

    #[test]
    fn empty_text_is_all_sentinel() {
        assert_eq!(extract_scalars(""), ExtractedRecord::missing());
    }

    #[test]
    fn normalise_rejects_garbage() {
        assert_eq!(normalise_value(""), None);
        assert_eq!(normalise_value("   "), None);
        assert_eq!(normalise_value("1.2.3"), None);
        assert_eq!(normalise_value("12,5"), Some("12.5".to_string()));
    }

    #[test]
    fn cano_label() {
        let r = extract_scalars("CaNO: 4.5 ppb");
        assert_eq!(r.cano, "4.5");
        let r = extract_scalars("CaN0 3");
        assert_eq!(r.cano, "3");
    }
}
