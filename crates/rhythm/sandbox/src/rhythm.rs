use std::sync::{Arc, Mutex};
use std::time::Duration;

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FuncArgs, Map, Scope, AST};
use rhythm_types::{Post, RhythmSource};
use tracing::{debug, instrument};

use crate::capability::CapabilityHost;
use crate::context::{lock, Decision, RhythmContext};
use crate::engine::{build_engine, DEADLINE_EXCEEDED};
use crate::error::{Hook, SandboxError};
use crate::limits::SandboxLimits;

/// The three lifecycle hooks of a loaded Rhythm.
///
/// Calls block; run them off the async executor.
pub trait Rhythm: Send + Sync {
    fn init(&self) -> Result<(), SandboxError>;

    /// Score or skip one post. Returns [`Decision::Pending`] when the hook
    /// did neither.
    fn main(&self, post: &Post) -> Result<Decision, SandboxError>;

    fn finalize(&self, posts: Vec<Post>) -> Result<Vec<Post>, SandboxError>;
}

/// A Rhythm compiled from Rhai source into its own restricted engine.
pub struct ScriptRhythm {
    identity: String,
    engine: Engine,
    ast: AST,
    context: Arc<RhythmContext>,
    /// Object bound to `this` in every hook.
    state: Mutex<Dynamic>,
    hook_budget: Option<Duration>,
    has_init: bool,
    has_finalize: bool,
}

impl std::fmt::Debug for ScriptRhythm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRhythm")
            .field("identity", &self.identity)
            .field("has_init", &self.has_init)
            .field("has_finalize", &self.has_finalize)
            .finish_non_exhaustive()
    }
}

fn defines(ast: &AST, name: &str, arity: usize) -> bool {
    ast.iter_functions()
        .any(|f| f.name == name && f.params.len() == arity)
}

fn root_cause(err: EvalAltResult) -> EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => root_cause(*inner),
        other => other,
    }
}

impl ScriptRhythm {
    /// Compile `source`, run its top-level statements once and check that
    /// `main(post)` exists.
    ///
    /// `hook_budget` bounds the wall-clock time of each hook call.
    #[instrument(skip_all, fields(rhythm = %source.identity()))]
    pub fn load(
        source: &RhythmSource,
        context: Arc<RhythmContext>,
        host: Arc<dyn CapabilityHost>,
        limits: &SandboxLimits,
        hook_budget: Option<Duration>,
    ) -> Result<Self, SandboxError> {
        let engine = build_engine(limits, &context, &host);
        let ast = engine
            .compile(&source.source)
            .map_err(|e| SandboxError::Eval(e.to_string()))?;

        if let Some(budget) = hook_budget {
            context.arm_deadline(budget);
        }
        let mut scope = Scope::new();
        let evaluated = engine.run_ast_with_scope(&mut scope, &ast);
        context.disarm_deadline();
        context.take_fault();
        evaluated.map_err(|e| SandboxError::Eval(root_cause(*e).to_string()))?;

        if !defines(&ast, "main", 1) {
            return Err(SandboxError::MainMissing);
        }

        let has_init = defines(&ast, "init", 0);
        let has_finalize = defines(&ast, "finalize", 1);
        debug!(has_init, has_finalize, "Rhythm loaded");

        Ok(Self {
            identity: source.identity(),
            engine,
            ast,
            context,
            state: Mutex::new(Dynamic::from_map(Map::new())),
            hook_budget,
            has_init,
            has_finalize,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn context(&self) -> &Arc<RhythmContext> {
        &self.context
    }

    fn call_hook(&self, hook: Hook, args: impl FuncArgs) -> Result<Dynamic, SandboxError> {
        self.context.take_fault();
        if let Some(budget) = self.hook_budget {
            self.context.arm_deadline(budget);
        }

        let mut scope = Scope::new();
        let result = {
            let mut state = lock(&self.state);
            let options = CallFnOptions::new()
                .eval_ast(false)
                .rewind_scope(true)
                .bind_this_ptr(&mut state);
            self.engine.call_fn_with_options::<Dynamic>(
                options,
                &mut scope,
                &self.ast,
                hook.name(),
                args,
            )
        };

        self.context.disarm_deadline();
        result.map_err(|err| self.classify(hook, *err))
    }

    /// Attribute a failed hook to the capability that raised it, the time
    /// budget, or the hook itself.
    fn classify(&self, hook: Hook, err: EvalAltResult) -> SandboxError {
        let root = root_cause(err);
        let fault = self.context.take_fault();

        match (&root, fault) {
            (EvalAltResult::ErrorRuntime(value, _), Some(report))
                if value.clone().into_string().ok().as_deref() == Some(report.code.as_str()) =>
            {
                SandboxError::Capability(report)
            }
            (EvalAltResult::ErrorTerminated(token, _), _)
                if token.clone().into_string().ok().as_deref() == Some(DEADLINE_EXCEEDED) =>
            {
                SandboxError::Timeout { hook }
            }
            _ => SandboxError::Hook {
                hook,
                message: root.to_string(),
            },
        }
    }
}

impl Rhythm for ScriptRhythm {
    fn init(&self) -> Result<(), SandboxError> {
        if !self.has_init {
            return Ok(());
        }
        self.call_hook(Hook::Init, ()).map(|_| ())
    }

    fn main(&self, post: &Post) -> Result<Decision, SandboxError> {
        let arg = rhai::serde::to_dynamic(post).map_err(|e| SandboxError::Hook {
            hook: Hook::Main,
            message: e.to_string(),
        })?;

        self.context.begin_item(post.id);
        let result = self.call_hook(Hook::Main, (arg,));
        let decision = self.context.end_item();
        result.map(|_| decision)
    }

    fn finalize(&self, posts: Vec<Post>) -> Result<Vec<Post>, SandboxError> {
        if !self.has_finalize {
            return Ok(posts);
        }

        let invalid = |message: String| SandboxError::InvalidReturn {
            hook: Hook::Finalize,
            message,
        };

        let arg = rhai::serde::to_dynamic(&posts).map_err(|e| invalid(e.to_string()))?;
        let returned = self.call_hook(Hook::Finalize, (arg,))?;

        if returned.is_unit() {
            return Ok(posts);
        }
        if !returned.is_array() {
            return Err(invalid(format!(
                "expected an array of posts, got {}",
                returned.type_name()
            )));
        }

        let value = serde_json::to_value(&returned).map_err(|e| invalid(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
    }
}
