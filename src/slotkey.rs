use serde_json::Value as JsonValue;
use std::fmt;

/// Canonical time-slot identifier.
///
/// Clients historically send slot ids as JSON numbers and strings
/// interchangeably (`3` vs `"3"` vs `"03"`). Every id is folded into one
/// comparable spelling at the protocol boundary, so the store and the claim
/// tables only ever contain canonical keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(String);

impl SlotKey {
    /// Canonicalize a textual id. Numeric spellings collapse to their plain
    /// decimal form; anything else is kept verbatim (trimmed).
    pub fn from_raw(raw: &str) -> SlotKey {
        let t = raw.trim();
        if !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()) {
            let stripped = t.trim_start_matches('0');
            if stripped.is_empty() {
                return SlotKey("0".to_string());
            }
            return SlotKey(stripped.to_string());
        }
        SlotKey(t.to_string())
    }

    /// Canonicalize a JSON id value. Returns `None` for shapes that cannot
    /// name a slot (missing, null, objects, fractional numbers, empty text).
    pub fn from_value(v: &JsonValue) -> Option<SlotKey> {
        match v {
            JsonValue::Number(n) => n.as_i64().map(|i| SlotKey(i.to_string())),
            JsonValue::String(s) => {
                let key = SlotKey::from_raw(s);
                if key.0.is_empty() {
                    None
                } else {
                    Some(key)
                }
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Day indices follow the same loose-typing rule as slot ids: number or
/// numeric string, valid range 0..=6.
pub fn day_index_from_value(v: Option<&JsonValue>) -> Option<i64> {
    let n = match v? {
        JsonValue::Number(n) => n.as_i64()?,
        JsonValue::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if (0..=6).contains(&n) {
        Some(n)
    } else {
        None
    }
}
