use std::collections::BTreeMap;

pub type AttributeMap = BTreeMap<String, i32>;

pub fn encode(map: &AttributeMap, separator: char) -> String {
    let mut out = String::new();
    for (name, value) in map {
        if !out.is_empty() {
            out.push(separator);
        }
        out.push_str(name);
        out.push('=');
        out.push_str(&value.to_string());
    }
    out
}

/// Fields without `=`, with an empty name or with a non-integer value are
/// skipped.
pub fn decode(s: &str, separator: char) -> AttributeMap {
    let mut map = AttributeMap::new();
    for field in s.split(separator) {
        let Some((name, value)) = field.split_once('=') else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let Ok(value) = value.parse::<i32>() else {
            continue;
        };
        // later duplicates win, same as successive `set`s
        map.insert(name.to_string(), value);
    }
    map
}
