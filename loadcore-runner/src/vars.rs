//! # Variable Resolution
//!
//! Purpose: the global < scenario variable merge and `{{var}}` placeholder
//! substitution applied to request templates before they reach a
//! `RequestExecutor`.
//!
//! Stage-level variable overrides are part of the configuration schema
//! (`Stage::variables`) but are not threaded through here: the executor's
//! `IterationRunner` contract has no notion of "current stage" at the point
//! an iteration runs, so wiring stage-awareness through would mean
//! reworking that already-settled trait for overrides that only ever
//! apply within a single ramping stage's lifetime. See DESIGN.md.

use std::collections::HashMap;

/// Merges variable maps in increasing priority order — later maps win.
pub fn merge(levels: &[&HashMap<String, String>]) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for level in levels {
        for (k, v) in level.iter() {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Replaces every `{{key}}` occurrence in `input` with `vars[key]`.
/// Unknown keys are left untouched rather than erroring — a missing
/// variable is not this crate's problem to police.
pub fn substitute(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        match rest.find("}}") {
            Some(end) => {
                let key = rest[..end].trim();
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(&rest[..end]);
                        out.push_str("}}");
                    }
                }
                rest = &rest[end + 2..];
            }
            None => {
                out.push_str("{{");
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_level_wins_over_global() {
        let global = HashMap::from([("host".to_string(), "global.example".to_string())]);
        let scenario = HashMap::from([("host".to_string(), "scenario.example".to_string())]);
        let merged = merge(&[&global, &scenario]);
        assert_eq!(merged.get("host").unwrap(), "scenario.example");
    }

    #[test]
    fn substitutes_known_placeholders() {
        let vars = HashMap::from([("id".to_string(), "42".to_string())]);
        assert_eq!(substitute("/users/{{id}}/profile", &vars), "/users/42/profile");
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let vars = HashMap::new();
        assert_eq!(substitute("/users/{{id}}", &vars), "/users/{{id}}");
    }

    #[test]
    fn tolerates_an_unterminated_placeholder() {
        let vars = HashMap::new();
        assert_eq!(substitute("broken {{oops", &vars), "broken {{oops");
    }
}
