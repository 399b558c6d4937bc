//! Short-form emitter descriptors.
//!
//! A descriptor names a patch by its short name followed by its harmonic
//! parameters in units of 100 Hz, optionally a `+`, and after it extra
//! parameters taken literally:
//!
//! ```text
//! vib 2 3 + 1        -> vibraphones { freq1: 200, freq2: 300, impact: 1 }
//! cbass 3/2*3/4 + 0.5 600
//! ```
//!
//! Harmonic tokens may be products and quotients of plain numbers (`8/3`,
//! `3*8/5*3/4`). Tokens containing letters are kept as text.

use super::{GlowCurve, ParamValue};
use crate::error::{GardenSonicError, Result};
use std::collections::BTreeMap;

/// What a descriptor expands to.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDesc {
    pub patch_name: String,
    pub params: BTreeMap<String, ParamValue>,
    /// `name=100*2&...` form used to link back to the patch sandbox
    pub param_fragment: String,
    pub glow_curve: GlowCurve,
    /// Some patches carry a larger reach than the default
    pub reach: Option<f32>,
    /// File-name-safe form of the descriptor, the stem of rendered assets
    pub asset_stem: String,
}

struct PatchSpec {
    short: &'static str,
    name: &'static str,
    params: &'static [&'static str],
}

const PATCHES: &[PatchSpec] = &[
    PatchSpec { short: "cbass", name: "contrabass", params: &["freq1", "flatten", "lp1"] },
    PatchSpec { short: "hseri", name: "harmonic-series", params: &["freq1"] },
    PatchSpec { short: "mbottl", name: "melodic-bottle", params: &["freq1", "freq2"] },
    PatchSpec { short: "msop", name: "melodic-soprano", params: &["freq1", "freq2"] },
    PatchSpec { short: "ssop", name: "sparse-soprano", params: &["freq1"] },
    PatchSpec { short: "rdrone", name: "resonant-drone", params: &["freq1", "freq2", "freq3", "impact"] },
    PatchSpec { short: "sdrone", name: "sine-drone", params: &["freq1", "freq2"] },
    PatchSpec { short: "vib", name: "vibraphones", params: &["freq1", "freq2", "impact"] },
    PatchSpec { short: "vtone", name: "vocal-overtones", params: &["freq1", "freq2"] },
    PatchSpec { short: "wbell", name: "water-bell", params: &["freq1", "interval"] },
];

/// Expands a short-form descriptor.
pub fn parse_desc(desc: &str) -> Result<ParsedDesc> {
    let fail = |reason: String| GardenSonicError::RecordParse {
        desc: desc.to_string(),
        reason,
    };

    let mut tokens: Vec<&str> = desc.split_whitespace().collect();
    let short = *tokens.first().ok_or_else(|| fail("empty descriptor".into()))?;
    let spec = PATCHES
        .iter()
        .find(|spec| spec.short == short)
        .ok_or_else(|| fail(format!("unknown patch '{}'", short)))?;

    let extra_from = match tokens.iter().position(|tok| *tok == "+") {
        Some(index) => {
            tokens.remove(index);
            index
        }
        None => usize::MAX,
    };
    if tokens.len() > spec.params.len() + 1 {
        return Err(fail(format!(
            "{} takes at most {} parameters",
            spec.short,
            spec.params.len()
        )));
    }

    let mut params = BTreeMap::new();
    let mut fragments = Vec::new();
    for (i, token) in tokens.iter().enumerate().skip(1) {
        let name = spec.params[i - 1];
        let is_extra = i >= extra_from;
        let value = parse_token(token, is_extra).map_err(|reason| fail(reason))?;
        params.insert(name.to_string(), value);
        let scale = if is_extra { "" } else { "100*" };
        fragments.push(format!("{}={}{}", name, scale, token));
    }

    let has_impact = params
        .get("impact")
        .and_then(ParamValue::as_number)
        .is_some_and(|impact| impact != 0.0);
    let glow_curve = match spec.short {
        "cbass" | "hseri" | "sdrone" => GlowCurve::Slow,
        "rdrone" | "vib" if !has_impact => GlowCurve::Slow,
        _ => GlowCurve::Normal,
    };

    if spec.short == "vtone" {
        let voices = if params.contains_key("freq2") { 2.0 } else { 1.0 };
        params.insert("num".to_string(), ParamValue::Number(voices));
    }

    Ok(ParsedDesc {
        patch_name: spec.name.to_string(),
        params,
        param_fragment: fragments.join("&"),
        glow_curve,
        reach: (spec.short == "wbell").then_some(1.7),
        asset_stem: asset_stem(desc),
    })
}

fn parse_token(token: &str, is_extra: bool) -> std::result::Result<ParamValue, String> {
    if token.chars().any(|c| c.is_ascii_alphabetic()) {
        return Ok(ParamValue::Text(token.to_string()));
    }
    if is_extra {
        return token
            .parse::<f32>()
            .map(ParamValue::Number)
            .map_err(|e| format!("bad extra parameter '{}': {}", token, e));
    }
    eval_product(token).map(|value| ParamValue::Number(100.0 * value))
}

/// Evaluates `a*b/c...` left to right.
fn eval_product(expr: &str) -> std::result::Result<f32, String> {
    let mut value = 1.0f64;
    let mut op = '*';
    let mut operand = String::new();

    let mut apply = |op: char, operand: &str, value: &mut f64| -> std::result::Result<(), String> {
        let n: f64 = operand
            .parse()
            .map_err(|_| format!("bad number '{}' in '{}'", operand, expr))?;
        match op {
            '*' => *value *= n,
            _ if n == 0.0 => return Err(format!("division by zero in '{}'", expr)),
            _ => *value /= n,
        }
        Ok(())
    };

    for c in expr.chars() {
        if c == '*' || c == '/' {
            apply(op, &operand, &mut value)?;
            operand.clear();
            op = c;
        } else {
            operand.push(c);
        }
    }
    apply(op, &operand, &mut value)?;
    Ok(value as f32)
}

fn asset_stem(desc: &str) -> String {
    desc.chars()
        .map(|c| match c {
            '/' => 'o',
            '+' => 'p',
            '*' => 'x',
            c if c.is_ascii_alphanumeric() => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(parsed: &ParsedDesc, name: &str) -> f32 {
        parsed.params[name].as_number().unwrap()
    }

    #[test]
    fn test_harmonic_and_extra_params() {
        let parsed = parse_desc("vib 2 3 + 1").unwrap();
        assert_eq!(parsed.patch_name, "vibraphones");
        assert_eq!(number(&parsed, "freq1"), 200.0);
        assert_eq!(number(&parsed, "freq2"), 300.0);
        assert_eq!(number(&parsed, "impact"), 1.0);
        assert_eq!(parsed.param_fragment, "freq1=100*2&freq2=100*3&impact=1");
        assert_eq!(parsed.glow_curve, GlowCurve::Normal);
    }

    #[test]
    fn test_products_and_quotients() {
        let parsed = parse_desc("cbass 3/2*3/4 + 0.5 600").unwrap();
        assert!((number(&parsed, "freq1") - 112.5).abs() < 1e-3);
        assert_eq!(number(&parsed, "flatten"), 0.5);
        assert_eq!(number(&parsed, "lp1"), 600.0);
        assert_eq!(parsed.glow_curve, GlowCurve::Slow);
    }

    #[test]
    fn test_asset_stem_is_file_safe() {
        let parsed = parse_desc("vib 8/3 16/3 + 1").unwrap();
        assert_eq!(parsed.asset_stem, "vib_8o3_16o3_p_1");
    }

    #[test]
    fn test_patch_specific_defaults() {
        let bell = parse_desc("wbell 4 3/2").unwrap();
        assert_eq!(bell.reach, Some(1.7));

        let tone = parse_desc("vtone 5").unwrap();
        assert_eq!(number(&tone, "num"), 1.0);
        let duet = parse_desc("vtone 5 7").unwrap();
        assert_eq!(number(&duet, "num"), 2.0);

        let quiet = parse_desc("rdrone 1 1 7/4").unwrap();
        assert_eq!(quiet.glow_curve, GlowCurve::Slow);
    }

    #[test]
    fn test_rejects_bad_descriptors() {
        assert!(parse_desc("").is_err());
        assert!(parse_desc("kazoo 1").is_err());
        assert!(parse_desc("hseri 1 2").is_err());
        assert!(parse_desc("sdrone 1/0 2").is_err());
        assert!(parse_desc("sdrone 1 + x2").is_ok());
    }
}
