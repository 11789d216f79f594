//! Static inspection of a Rhythm without running it.

use rhai::Engine;
use serde::Serialize;

use crate::error::SandboxError;

/// Script function found in a Rhythm.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<String>,
}

/// What a Rhythm defines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RhythmOutline {
    pub has_init: bool,
    pub has_main: bool,
    pub has_finalize: bool,
    pub functions: Vec<FunctionSignature>,
    /// Hook names defined with the wrong number of parameters.
    pub warnings: Vec<String>,
}

impl RhythmOutline {
    /// Whether the Rhythm would load.
    pub fn is_runnable(&self) -> bool {
        self.has_main
    }
}

const HOOKS: [(&str, usize); 3] = [("init", 0), ("main", 1), ("finalize", 1)];

/// Compile `source` and describe its hooks.
///
/// Top-level statements are not evaluated.
pub fn outline(source: &str) -> Result<RhythmOutline, SandboxError> {
    let mut engine = Engine::new_raw();
    engine.disable_symbol("eval");
    let ast = engine
        .compile(source)
        .map_err(|e| SandboxError::Eval(e.to_string()))?;

    let mut outline = RhythmOutline::default();
    for f in ast.iter_functions() {
        let arity = f.params.len();
        match (f.name, arity) {
            ("init", 0) => outline.has_init = true,
            ("main", 1) => outline.has_main = true,
            ("finalize", 1) => outline.has_finalize = true,
            _ => {
                if let Some((hook, expected)) = HOOKS.iter().find(|(hook, _)| *hook == f.name) {
                    outline.warnings.push(format!(
                        "{hook} takes {expected} parameter(s), found {arity}; it will not be called"
                    ));
                }
            }
        }
        outline.functions.push(FunctionSignature {
            name: f.name.to_string(),
            params: f.params.iter().map(|p| p.to_string()).collect(),
        });
    }
    if !outline.has_main {
        outline
            .warnings
            .push("main(post) is not defined; the Rhythm will not load".to_string());
    }
    Ok(outline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_present_hooks() {
        let outline = outline(
            r#"
            fn helper(a, b) { a + b }
            fn init() { }
            fn main(post) { set_sort(helper(1, 2)); }
            "#,
        )
        .unwrap();

        assert!(outline.has_init && outline.has_main && !outline.has_finalize);
        assert!(outline.is_runnable());
        assert!(outline.warnings.is_empty());
        assert_eq!(outline.functions.len(), 3);
    }

    #[test]
    fn wrong_arity_hooks_are_flagged() {
        let outline = outline("fn main() { } fn finalize(a, b) { }").unwrap();
        assert!(!outline.is_runnable());
        assert_eq!(outline.warnings.len(), 3);
    }

    #[test]
    fn syntax_errors_fail() {
        assert!(matches!(outline("fn main(post {"), Err(SandboxError::Eval(_))));
    }
}
