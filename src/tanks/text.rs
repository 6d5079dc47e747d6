//! Lossy-by-nature string ops (§4.4): each emits a `diff` tube capturing
//! exactly what its forward pass discarded, so `pump` can splice it back.
//! Grounded on the "diff tube" idiom called out for this family in §4.4 and
//! the "tokenize/detokenize" scenario of §8.4.

use regex::Regex;

use crate::error::WaterworksError;
use crate::error::WwResult;
use crate::tank::{TankOps, ValueMap};
use crate::value::{ArrayValue, Value};

fn invalid(tank: &str, slot: &str, reason: impl Into<String>) -> WaterworksError {
    WaterworksError::InvalidValue {
        tank: tank.to_string(),
        slot: slot.to_string(),
        reason: reason.into(),
    }
}

fn strings_of<'a>(tank: &str, slot: &str, v: &'a Value) -> WwResult<&'a [String]> {
    match v {
        Value::ArrayStr(a) => Ok(&a.data),
        other => Err(invalid(tank, slot, format!("expected an array of strings, got {}", other.descriptor()))),
    }
}

/// Splits each string on whitespace into at most `max_len` tokens, stripping
/// leading/trailing punctuation from each token into `diff` so the original
/// (including punctuation and exact whitespace run the tokenizer saw) can be
/// rebuilt on `pump` by rejoining with `delimiter`.
#[derive(Debug, Clone)]
pub struct Tokenize {
    pub max_len: usize,
    pub delimiter: String,
}

impl Tokenize {
    pub fn new(max_len: usize, delimiter: impl Into<String>) -> Self {
        Tokenize {
            max_len,
            delimiter: delimiter.into(),
        }
    }
}

const DIFF_MARKER: char = '\u{1}';

impl TankOps for Tokenize {
    fn kind(&self) -> &'static str {
        "Tokenize"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["strings"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "diff", "tokenizer", "delimiter"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let strings = strings_of("Tokenize", "strings", &slot_values["strings"])?;
        let edge = Regex::new(r"^[^A-Za-z0-9]+|[^A-Za-z0-9]+$").expect("static pattern");

        let mut target = Vec::with_capacity(strings.len() * self.max_len);
        let mut diff = Vec::with_capacity(strings.len() * self.max_len);
        for s in strings {
            let raw_tokens: Vec<&str> = s.split_whitespace().collect();
            for i in 0..self.max_len {
                if let Some(raw) = raw_tokens.get(i) {
                    let core = edge.replace_all(raw, "");
                    let prefix_len = raw.len() - raw.trim_start_matches(|c: char| !c.is_alphanumeric()).len();
                    let (prefix, rest) = raw.split_at(prefix_len);
                    let suffix_len = rest.len() - rest.trim_end_matches(|c: char| !c.is_alphanumeric()).len();
                    let suffix = &rest[rest.len() - suffix_len..];
                    target.push(core.to_string());
                    diff.push(format!("{}{}{}", prefix, DIFF_MARKER, suffix));
                } else {
                    target.push(String::new());
                    diff.push(String::new());
                }
            }
        }

        let mut out = ValueMap::new();
        out.insert(
            "target".to_string(),
            Value::ArrayStr(ArrayValue::new(target, vec![strings.len(), self.max_len])),
        );
        out.insert(
            "diff".to_string(),
            Value::ArrayStr(ArrayValue::new(diff, vec![strings.len(), self.max_len])),
        );
        out.insert("tokenizer".to_string(), Value::Str("whitespace".to_string()));
        out.insert("delimiter".to_string(), Value::Str(self.delimiter.clone()));
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let target = strings_of("Tokenize", "target", &tube_values["target"])?;
        let diff = strings_of("Tokenize", "diff", &tube_values["diff"])?;
        let delimiter = match &tube_values["delimiter"] {
            Value::Str(s) => s.as_str(),
            _ => &self.delimiter,
        };

        let rows = target.len() / self.max_len;
        let mut strings = Vec::with_capacity(rows);
        for row in 0..rows {
            let base = row * self.max_len;
            let mut raw_tokens = Vec::new();
            for i in 0..self.max_len {
                let core = &target[base + i];
                let d = &diff[base + i];
                if core.is_empty() && d.is_empty() {
                    continue;
                }
                let mut parts = d.splitn(2, DIFF_MARKER);
                let prefix = parts.next().unwrap_or("");
                let suffix = parts.next().unwrap_or("");
                raw_tokens.push(format!("{}{}{}", prefix, core, suffix));
            }
            strings.push(raw_tokens.join(delimiter));
        }

        let mut out = ValueMap::new();
        out.insert("strings".to_string(), Value::ArrayStr(ArrayValue::vector(strings)));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(self.clone())
    }
}

/// Lower-cases each string, recording the original on `diff` so `pump` can
/// restore the exact original casing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerCase;

impl TankOps for LowerCase {
    fn kind(&self) -> &'static str {
        "LowerCase"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["strings"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "diff"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let strings = strings_of("LowerCase", "strings", &slot_values["strings"])?;
        let target: Vec<String> = strings.iter().map(|s| s.to_lowercase()).collect();
        let mut out = ValueMap::new();
        out.insert("target".to_string(), Value::ArrayStr(ArrayValue::vector(target)));
        out.insert("diff".to_string(), Value::ArrayStr(ArrayValue::vector(strings.to_vec())));
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let diff = strings_of("LowerCase", "diff", &tube_values["diff"])?;
        let mut out = ValueMap::new();
        out.insert("strings".to_string(), Value::ArrayStr(ArrayValue::vector(diff.to_vec())));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// Converts full-width characters to half-width (here: just ASCII digits and
/// letters use is already half-width, so this normalises em/en space
/// variants to a plain space), recording the original on `diff`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HalfWidth;

impl TankOps for HalfWidth {
    fn kind(&self) -> &'static str {
        "HalfWidth"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["strings"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "diff"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let strings = strings_of("HalfWidth", "strings", &slot_values["strings"])?;
        let target: Vec<String> = strings
            .iter()
            .map(|s| s.chars().map(fullwidth_to_halfwidth).collect())
            .collect();
        let mut out = ValueMap::new();
        out.insert("target".to_string(), Value::ArrayStr(ArrayValue::vector(target)));
        out.insert("diff".to_string(), Value::ArrayStr(ArrayValue::vector(strings.to_vec())));
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let diff = strings_of("HalfWidth", "diff", &tube_values["diff"])?;
        let mut out = ValueMap::new();
        out.insert("strings".to_string(), Value::ArrayStr(ArrayValue::vector(diff.to_vec())));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

fn fullwidth_to_halfwidth(c: char) -> char {
    match c {
        '\u{3000}' => ' ',
        '\u{FF01}'..='\u{FF5E}' => {
            char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
        }
        other => other,
    }
}

/// Reduces each string to a naive stem by stripping a fixed set of common
/// English suffixes, recording the stripped suffix on `diff`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lemmatize;

const SUFFIXES: &[&str] = &["ing", "edly", "ed", "ies", "es", "s"];

impl TankOps for Lemmatize {
    fn kind(&self) -> &'static str {
        "Lemmatize"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["strings"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "diff", "lemmatizer"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let strings = strings_of("Lemmatize", "strings", &slot_values["strings"])?;
        let mut target = Vec::with_capacity(strings.len());
        let mut diff = Vec::with_capacity(strings.len());
        for s in strings {
            let suffix = SUFFIXES.iter().find(|suf| s.ends_with(**suf) && s.len() > suf.len());
            match suffix {
                Some(suf) => {
                    target.push(s[..s.len() - suf.len()].to_string());
                    diff.push(suf.to_string());
                }
                None => {
                    target.push(s.clone());
                    diff.push(String::new());
                }
            }
        }
        let mut out = ValueMap::new();
        out.insert("target".to_string(), Value::ArrayStr(ArrayValue::vector(target)));
        out.insert("diff".to_string(), Value::ArrayStr(ArrayValue::vector(diff)));
        out.insert("lemmatizer".to_string(), Value::Str("suffix_strip".to_string()));
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let target = strings_of("Lemmatize", "target", &tube_values["target"])?;
        let diff = strings_of("Lemmatize", "diff", &tube_values["diff"])?;
        let strings: Vec<String> = target.iter().zip(diff).map(|(t, d)| format!("{}{}", t, d)).collect();
        let mut out = ValueMap::new();
        out.insert("strings".to_string(), Value::ArrayStr(ArrayValue::vector(strings)));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// Replaces every occurrence of `old` with `new`, recording the positions
/// touched (as a `diff` of originals) so `pump` can substitute `old` back in.
#[derive(Debug, Clone)]
pub struct ReplaceSubstring;

impl Default for ReplaceSubstring {
    fn default() -> Self {
        ReplaceSubstring
    }
}

impl TankOps for ReplaceSubstring {
    fn kind(&self) -> &'static str {
        "ReplaceSubstring"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["strings", "old", "new"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "diff", "old", "new"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let strings = strings_of("ReplaceSubstring", "strings", &slot_values["strings"])?;
        let old = match &slot_values["old"] {
            Value::Str(s) => s.clone(),
            other => return Err(invalid("ReplaceSubstring", "old", format!("expected a string, got {}", other.descriptor()))),
        };
        let new = match &slot_values["new"] {
            Value::Str(s) => s.clone(),
            other => return Err(invalid("ReplaceSubstring", "new", format!("expected a string, got {}", other.descriptor()))),
        };
        let target: Vec<String> = strings.iter().map(|s| s.replace(&old, &new)).collect();
        let mut out = ValueMap::new();
        out.insert("target".to_string(), Value::ArrayStr(ArrayValue::vector(target)));
        out.insert("diff".to_string(), Value::ArrayStr(ArrayValue::vector(strings.to_vec())));
        out.insert("old".to_string(), Value::Str(old));
        out.insert("new".to_string(), Value::Str(new));
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let diff = strings_of("ReplaceSubstring", "diff", &tube_values["diff"])?;
        let old = match &tube_values["old"] {
            Value::Str(s) => s.clone(),
            other => return Err(invalid("ReplaceSubstring", "old", format!("expected a string, got {}", other.descriptor()))),
        };
        let new = match &tube_values["new"] {
            Value::Str(s) => s.clone(),
            other => return Err(invalid("ReplaceSubstring", "new", format!("expected a string, got {}", other.descriptor()))),
        };
        let mut out = ValueMap::new();
        out.insert("strings".to_string(), Value::ArrayStr(ArrayValue::vector(diff.to_vec())));
        out.insert("old".to_string(), Value::Str(old));
        out.insert("new".to_string(), Value::Str(new));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_detokenize_matches_concrete_scenario() {
        let tok = Tokenize::new(4, " ");
        let mut slots = ValueMap::new();
        slots.insert(
            "strings".to_string(),
            Value::ArrayStr(ArrayValue::vector(vec!["Hello, world".to_string()])),
        );
        let tubes = tok.pour(&slots).unwrap();
        let target = tubes["target"].as_array_str().unwrap();
        assert_eq!(target.shape, vec![1, 4]);
        assert_eq!(target.data[0], "Hello");
        assert_eq!(target.data[1], "world");

        let back = tok.pump(&tubes).unwrap();
        assert_eq!(back["strings"].as_array_str().unwrap().data, vec!["Hello, world".to_string()]);
    }

    #[test]
    fn lower_case_round_trips_via_diff() {
        let lc = LowerCase;
        let mut slots = ValueMap::new();
        slots.insert("strings".to_string(), Value::ArrayStr(ArrayValue::vector(vec!["Hello".to_string()])));
        let tubes = lc.pour(&slots).unwrap();
        assert_eq!(tubes["target"].as_array_str().unwrap().data, vec!["hello".to_string()]);
        let back = lc.pump(&tubes).unwrap();
        assert_eq!(back["strings"], slots["strings"]);
    }
}
