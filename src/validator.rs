//! Step Validator — static analysis gating every generated step before it
//! reaches the sandbox.
//!
//! Steps are authored as small scripts in an embedded scripting language
//! (rhai) rather than literal Rust source: this gives the validator a real
//! parser and function-metadata surface to inspect, the same role Python's
//! `ast` module plays for a text-based agent, without ever compiling or
//! `rustc`-invoking anything at request time.
//!
//! The eight rules below are the execution precondition; they are the
//! contract, not a reference implementation detail.

use once_cell_lite::Lazy;
use regex::Regex;
use rhai::Engine;
use std::collections::HashSet;

use crate::domain::CarryDict;

/// Minimal `Lazy<T>` so we don't need to pull in `once_cell` just for this.
mod once_cell_lite {
    use std::sync::OnceLock;

    pub struct Lazy<T> {
        cell: OnceLock<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Lazy { cell: OnceLock::new(), init }
        }
    }

    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}

/// Names bound into every step's namespace by the executor, independent of
/// the tool catalog or the predecessor's carry dictionary.
pub const AMBIENT_NAMES: &[&str] = &["logger", "session_id", "socketio", "error"];

/// Calls a step is never allowed to make, regardless of its tool's import
/// allow-list: dynamic script evaluation, shell execution, unsafe blob
/// deserialization.
const DANGEROUS_CALLS: &[&str] = &["eval", "exec", "shell_exec", "Command", "deserialize_unsafe"];

/// Module prefixes every step may use regardless of its chosen tool —
/// the "safe standard library" half of the import allow-list.
const SAFE_MODULES: &[&str] = &["math", "string", "array", "timestamp"];

static CARRY_PREAMBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"let\s+updated_dict\s*=\s*previous_output\.copy\(\)\s*;").unwrap());
static IMPORT_STMT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s+"([^"]+)"\s+as\s+(\w+)\s*;"#).unwrap());
static LET_BINDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:let|const)\s+(\w+)").unwrap());
static FOR_BINDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfor\s+(\w+)\s+in\b").unwrap());
static CATCH_BINDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bcatch\s*\(\s*(\w+)\s*\)").unwrap());
static CLOSURE_PARAMS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|([^|]*)\|").unwrap());
static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z_]\w*\b").unwrap());
static FN_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfn\s+(\w+)\s*\(").unwrap());
static CARRY_GET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"updated_dict\.get\(\s*"([^"]+)"\s*(?:,[^)]*)?\)"#).unwrap());

const RHAI_KEYWORDS: &[&str] = &[
    "let", "const", "fn", "if", "else", "while", "loop", "for", "in", "return", "break",
    "continue", "true", "false", "throw", "try", "catch", "switch", "import", "as", "export",
    "private", "global", "this", "is_shared", "and", "or", "not",
];

/// Result of validating one step's source text.
pub enum Validation {
    Ok { canonical_source: String },
    Err(Vec<String>),
}

/// Validates step sources against a tool's allowed libraries and, once
/// produced, rewrites the outer callable's name to match the step.
pub struct StepValidator {
    engine: Engine,
}

impl Default for StepValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl StepValidator {
    pub fn new() -> Self {
        StepValidator { engine: Engine::new() }
    }

    /// Validate `source` for step `step_index` (0-based) named `step_name`,
    /// whose chosen tool permits importing from `allowed_libraries`. When
    /// `predecessor_output` is `Some`, the carry-key contract (rule 8) is
    /// enforced against it.
    pub fn validate(
        &self,
        step_index: usize,
        step_name: &str,
        allowed_libraries: &[String],
        source: &str,
        predecessor_output: Option<&CarryDict>,
    ) -> Validation {
        let mut errors = Vec::new();

        // Rule 1: parseable.
        let ast = match self.engine.compile(source) {
            Ok(ast) => ast,
            Err(e) => {
                errors.push(format!("parse error: {e}"));
                return Validation::Err(errors);
            }
        };

        // Rule 3: exactly one top-level callable.
        let functions: Vec<_> = ast.iter_functions().collect();
        if functions.len() != 1 {
            errors.push(format!(
                "expected exactly one top-level callable, found {}",
                functions.len()
            ));
        }
        let meta = functions.first();

        if let Some(meta) = meta {
            let params: Vec<&str> = meta.params.iter().map(|p| p.as_ref()).collect();
            if step_index == 0 {
                if !params.is_empty() {
                    errors.push(
                        "step 0 must take no required parameters (all positional params defaulted)"
                            .into(),
                    );
                }
            } else {
                if params.len() != 1 || params[0] != "previous_output" {
                    errors.push(
                        "steps after the first must declare exactly one parameter, `previous_output`"
                            .into(),
                    );
                }
                // Rule 4: carry preamble.
                if !CARRY_PREAMBLE.is_match(source) {
                    errors.push(
                        "missing required preamble: let updated_dict = previous_output.copy();"
                            .into(),
                    );
                }
            }
        }

        // Rule 2: import allow-list, no relative imports.
        let mut imported_aliases = HashSet::new();
        for cap in IMPORT_STMT.captures_iter(source) {
            let module = &cap[1];
            let alias = cap[2].to_string();
            imported_aliases.insert(alias);
            if module.starts_with('.') {
                errors.push(format!("relative import forbidden: {module}"));
                continue;
            }
            let allowed = SAFE_MODULES.iter().any(|m| module == *m)
                || allowed_libraries.iter().any(|lib| module.starts_with(lib.as_str()));
            if !allowed {
                errors.push(format!("import not in allow-list: {module}"));
            }
        }

        // Rule 6: nesting depth <= 1 (outer callable is level 0).
        if let Some(depth_err) = check_nesting_depth(source) {
            errors.push(depth_err);
        }

        // Rule 7: dangerous-call denylist.
        for ident in IDENT.find_iter(source) {
            if DANGEROUS_CALLS.contains(&ident.as_str()) {
                errors.push(format!("call to disallowed function: {}", ident.as_str()));
            }
        }

        // Rule 5: name resolution (heuristic, text-scope based — see module docs).
        errors.extend(check_name_resolution(
            source,
            meta.map(|m| m.params.iter().map(|p| p.to_string()).collect()).unwrap_or_default(),
            &imported_aliases,
            allowed_libraries,
        ));

        // Rule 8: carry-key contract.
        if let Some(predecessor) = predecessor_output {
            for cap in CARRY_GET.captures_iter(source) {
                let key = &cap[1];
                if !predecessor.contains_key(key) {
                    errors.push(format!(
                        "carry-key contract violation: predecessor output has no key \"{key}\""
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Validation::Err(errors);
        }

        let canonical = rename_outer_callable(source, meta.map(|m| m.name).unwrap_or(""), step_name);
        Validation::Ok { canonical_source: canonical }
    }
}

/// Tracks brace depth to find `fn` definitions nested more than one level
/// inside the outer callable. The outer function itself sits at depth 0;
/// its immediate body is depth 1 (where level-1 inner functions live);
/// anything declared at depth 2+ is rejected.
fn check_nesting_depth(source: &str) -> Option<String> {
    let mut depth: i32 = 0;
    let mut fn_depths = Vec::new();
    let mut chars = source.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            'f' if source[i..].starts_with("fn ") || source[i..].starts_with("fn(") => {
                fn_depths.push(depth);
            }
            _ => {}
        }
    }
    // The outer function declaration itself occurs at depth 0; its body
    // runs at depth 1. A second `fn` found at depth 1 is a level-1 inner
    // function (allowed); one found at depth >= 2 is nested two deep.
    if fn_depths.iter().filter(|&&d| d >= 2).count() > 0 {
        return Some("function nesting exceeds one level".into());
    }
    None
}

fn check_name_resolution(
    source: &str,
    params: Vec<String>,
    imported_aliases: &HashSet<String>,
    allowed_libraries: &[String],
) -> Vec<String> {
    let mut defined: HashSet<String> = HashSet::new();
    defined.extend(params);
    defined.extend(AMBIENT_NAMES.iter().map(|s| s.to_string()));
    defined.extend(imported_aliases.iter().cloned());
    defined.extend(allowed_libraries.iter().cloned());
    for cap in LET_BINDING.captures_iter(source) {
        defined.insert(cap[1].to_string());
    }
    for cap in FOR_BINDING.captures_iter(source) {
        defined.insert(cap[1].to_string());
    }
    for cap in CATCH_BINDING.captures_iter(source) {
        defined.insert(cap[1].to_string());
    }
    for cap in CLOSURE_PARAMS.captures_iter(source) {
        for p in cap[1].split(',') {
            let p = p.trim();
            if !p.is_empty() {
                defined.insert(p.to_string());
            }
        }
    }
    for cap in FN_KEYWORD.captures_iter(source) {
        defined.insert(cap[1].to_string());
    }

    let mut errors = Vec::new();
    let mut seen_unresolved = HashSet::new();
    for m in IDENT.find_iter(source) {
        let name = m.as_str();
        if RHAI_KEYWORDS.contains(&name) || defined.contains(name) {
            continue;
        }
        // A method/property access (`thing.name`) is never a free name load,
        // so it gets no separate resolution check, matching how Python's ast
        // only visits the receiver as a Name, not the attribute. A bare call
        // target (`name(` or `name::`) gets none of that exemption: if it
        // didn't resolve against `defined` above, it's an undefined call.
        let before = source[..m.start()].trim_end();
        if before.ends_with('.') {
            continue;
        }
        if name.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            continue;
        }
        if seen_unresolved.insert(name.to_string()) {
            errors.push(format!("unresolved name: {name}"));
        }
    }
    errors
}

fn rename_outer_callable(source: &str, original_name: &str, step_name: &str) -> String {
    if original_name.is_empty() || original_name == step_name {
        return source.to_string();
    }
    let pattern = Regex::new(&format!(r"\bfn\s+{}\s*\(", regex::escape(original_name))).unwrap();
    pattern.replace(source, format!("fn {step_name}(")).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CarryDict;

    fn validator() -> StepValidator {
        StepValidator::new()
    }

    #[test]
    fn first_step_rejects_required_params() {
        let v = validator();
        let src = "fn compute_mean(values) {\n    let sum = 0;\n    sum\n}";
        match v.validate(0, "compute_mean", &[], src, None) {
            Validation::Err(errs) => assert!(errs.iter().any(|e| e.contains("no required parameters"))),
            Validation::Ok { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn first_step_happy_path_renames_callable() {
        let v = validator();
        let src = "fn step() {\n    let mean = 2.0;\n    mean\n}";
        match v.validate(0, "compute_mean", &[], src, None) {
            Validation::Ok { canonical_source } => {
                assert!(canonical_source.contains("fn compute_mean("));
            }
            Validation::Err(errs) => panic!("unexpected errors: {errs:?}"),
        }
    }

    #[test]
    fn later_step_requires_carry_preamble() {
        let v = validator();
        let src = "fn format_output(previous_output) {\n    previous_output\n}";
        match v.validate(1, "format_output", &[], src, None) {
            Validation::Err(errs) => assert!(errs.iter().any(|e| e.contains("preamble"))),
            Validation::Ok { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn later_step_with_preamble_passes() {
        let v = validator();
        let src = concat!(
            "fn format_output(previous_output) {\n",
            "    let updated_dict = previous_output.copy();\n",
            "    updated_dict\n",
            "}"
        );
        match v.validate(1, "format_output", &[], src, None) {
            Validation::Ok { .. } => {}
            Validation::Err(errs) => panic!("unexpected errors: {errs:?}"),
        }
    }

    #[test]
    fn import_outside_allow_list_rejected() {
        let v = validator();
        let src = "import \"requests\" as requests;\nfn step() {\n    0\n}";
        match v.validate(0, "step", &["bs4".to_string()], src, None) {
            Validation::Err(errs) => assert!(errs.iter().any(|e| e.contains("allow-list"))),
            Validation::Ok { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn dangerous_call_rejected() {
        let v = validator();
        let src = "fn step() {\n    eval(\"1+1\")\n}";
        match v.validate(0, "step", &[], src, None) {
            Validation::Err(errs) => assert!(errs.iter().any(|e| e.contains("disallowed"))),
            Validation::Ok { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn carry_key_contract_checks_literal_keys_only() {
        let v = validator();
        let mut predecessor = CarryDict::new();
        predecessor.insert("coordinates".to_string(), serde_json::json!([1.0, 2.0]));
        let src = concat!(
            "fn format_output(previous_output) {\n",
            "    let updated_dict = previous_output.copy();\n",
            "    let missing = updated_dict.get(\"not_present\", ());\n",
            "    updated_dict\n",
            "}"
        );
        match v.validate(1, "format_output", &[], src, Some(&predecessor)) {
            Validation::Err(errs) => assert!(errs.iter().any(|e| e.contains("not_present"))),
            Validation::Ok { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn undefined_function_call_is_flagged() {
        let v = validator();
        let src = "fn step() {\n    hallucinated_helper(1, 2)\n}";
        match v.validate(0, "step", &[], src, None) {
            Validation::Err(errs) => {
                assert!(errs.iter().any(|e| e.contains("unresolved name: hallucinated_helper")))
            }
            Validation::Ok { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn method_call_on_a_known_receiver_is_not_flagged() {
        let v = validator();
        let src = "fn step() {\n    let values = [1, 2, 3];\n    values.len()\n}";
        match v.validate(0, "step", &[], src, None) {
            Validation::Ok { .. } => {}
            Validation::Err(errs) => panic!("unexpected errors: {errs:?}"),
        }
    }

    #[test]
    fn nesting_depth_two_rejected() {
        let v = validator();
        let src = concat!(
            "fn step() {\n",
            "    fn inner() {\n",
            "        fn too_deep() {\n",
            "            1\n",
            "        }\n",
            "        too_deep()\n",
            "    }\n",
            "    inner()\n",
            "}"
        );
        match v.validate(0, "step", &[], src, None) {
            Validation::Err(errs) => assert!(errs.iter().any(|e| e.contains("nesting"))),
            Validation::Ok { .. } => panic!("expected rejection"),
        }
    }
}
