use std::sync::Arc;

use rhai::module_resolvers::DummyModuleResolver;
use rhai::Engine;
use tracing::{debug, info};

use crate::capability::{self, CapabilityHost};
use crate::context::RhythmContext;
use crate::limits::SandboxLimits;

/// How often the progress callback consults the deadline.
const DEADLINE_CHECK_INTERVAL: u64 = 128;

pub(crate) const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// Build the restricted engine a single Rhythm runs in.
pub(crate) fn build_engine(
    limits: &SandboxLimits,
    context: &Arc<RhythmContext>,
    host: &Arc<dyn CapabilityHost>,
) -> Engine {
    let mut engine = Engine::new();

    engine
        .set_max_operations(limits.max_operations)
        .set_max_call_levels(limits.max_call_levels)
        .set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth)
        .set_max_string_size(limits.max_string_size)
        .set_max_array_size(limits.max_array_size)
        .set_max_map_size(limits.max_map_size)
        .set_module_resolver(DummyModuleResolver::new());

    engine.disable_symbol("eval");

    engine.on_print(|text| info!(target: "rhythm::script", "{}", text));
    engine.on_debug(|text, source, pos| {
        debug!(target: "rhythm::script", source = source.unwrap_or(""), position = %pos, "{}", text)
    });

    let ctx = Arc::clone(context);
    engine.on_progress(move |ops| {
        if ops % DEADLINE_CHECK_INTERVAL != 0 || !ctx.deadline_passed() {
            return None;
        }
        Some(DEADLINE_EXCEEDED.into())
    });

    capability::register(&mut engine, context, host, limits);
    engine
}
