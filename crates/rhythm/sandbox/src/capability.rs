//! The script-visible capability surface.
//!
//! Every function validates its arguments and raises its own error code on a
//! type mismatch instead of coercing. A raised capability error is recorded on
//! the [`RhythmContext`] so the run reports the capability's code rather than
//! the generic hook code.

use std::sync::Arc;

use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Position, INT};
use rhythm_types::{ErrorCode, ErrorReport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::context::{Decision, RhythmContext};
use crate::limits::SandboxLimits;

/// Requests a Rhythm can make of the trusted domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityRequest {
    FetchTakes { field_id: i64 },
    FetchTakesForUser { user: String, field_id: i64 },
    GetMiscData { url: String },
    StoreData { data: String },
    GetStoredData,
}

impl CapabilityRequest {
    fn failure_code(&self) -> ErrorCode {
        match self {
            CapabilityRequest::FetchTakes { .. } => ErrorCode::FetchTakesFailed,
            CapabilityRequest::FetchTakesForUser { .. } => ErrorCode::FetchUserTakesFailed,
            CapabilityRequest::GetMiscData { .. } => ErrorCode::GetMiscDataFailed,
            CapabilityRequest::StoreData { .. } => ErrorCode::StoreDataFailed,
            CapabilityRequest::GetStoredData => ErrorCode::GetStoredDataFailed,
        }
    }
}

/// Blocking bridge from a running script to the trusted domain.
///
/// Called from the hook's thread; implementations may block on I/O.
pub trait CapabilityHost: Send + Sync {
    fn call(&self, request: CapabilityRequest) -> Result<Value, ErrorReport>;
}

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Record `report` on the context and turn it into a script error.
fn raise(context: &RhythmContext, report: ErrorReport) -> Box<EvalAltResult> {
    let code = report.code.clone();
    context.record_fault(report);
    EvalAltResult::ErrorRuntime(code.into(), Position::NONE).into()
}

fn invalid(context: &RhythmContext, code: ErrorCode, message: String) -> Box<EvalAltResult> {
    raise(context, ErrorReport::with_message(code, message))
}

fn to_script(value: &Value) -> ScriptResult<Dynamic> {
    rhai::serde::to_dynamic(value)
}

fn call_host(
    context: &RhythmContext,
    host: &dyn CapabilityHost,
    request: CapabilityRequest,
) -> ScriptResult<Dynamic> {
    let code = request.failure_code();
    match host.call(request) {
        Ok(value) => to_script(&value),
        Err(remote) => Err(raise(
            context,
            ErrorReport::new(
                code,
                json!({ "message": remote.to_string(), "source": remote }),
            ),
        )),
    }
}

fn as_score(value: &Dynamic) -> Option<f64> {
    let score = if value.is_int() {
        value.as_int().ok().map(|v| v as f64)
    } else if value.is_float() {
        value.as_float().ok()
    } else {
        None
    };
    score.filter(|s| s.is_finite())
}

pub(crate) fn register(
    engine: &mut Engine,
    context: &Arc<RhythmContext>,
    host: &Arc<dyn CapabilityHost>,
    limits: &SandboxLimits,
) {
    register_decisions(engine, context);
    register_settings(engine, context, limits);
    register_data(engine, context, host);
    register_session(engine, context);
}

fn register_decisions(engine: &mut Engine, context: &Arc<RhythmContext>) {
    let ctx = Arc::clone(context);
    engine.register_fn("set_sort", move |score: Dynamic| -> ScriptResult<()> {
        let Some(score) = as_score(&score) else {
            return Err(invalid(
                &ctx,
                ErrorCode::SetSortValueInvalid,
                format!("set_sort expects a finite number, got {}", score.type_name()),
            ));
        };
        if !ctx.decide(Decision::Scored(score)) {
            return Err(invalid(
                &ctx,
                ErrorCode::SetSortOutOfPhase,
                "set_sort called outside main".to_string(),
            ));
        }
        Ok(())
    });

    let ctx = Arc::clone(context);
    engine.register_fn("skip", move || -> ScriptResult<()> {
        if !ctx.decide(Decision::Skipped) {
            return Err(invalid(
                &ctx,
                ErrorCode::SetSortOutOfPhase,
                "skip called outside main".to_string(),
            ));
        }
        Ok(())
    });
}

fn register_settings(engine: &mut Engine, context: &Arc<RhythmContext>, limits: &SandboxLimits) {
    let ctx = Arc::clone(context);
    let max_posts = limits.max_posts;
    engine.register_fn("set_post_quantity", move |qty: Dynamic| -> ScriptResult<()> {
        let qty = qty
            .as_int()
            .ok()
            .filter(|q| *q >= 1 && (*q as u64) <= max_posts as u64)
            .ok_or_else(|| {
                invalid(
                    &ctx,
                    ErrorCode::SetPostQuantityValueInvalid,
                    format!("set_post_quantity expects an integer between 1 and {max_posts}"),
                )
            })?;
        ctx.update_settings("set_post_quantity", |s| s.qty = Some(qty as usize));
        Ok(())
    });

    let ctx = Arc::clone(context);
    engine.register_fn(
        "set_time_window",
        move |from: Dynamic, to: Dynamic| -> ScriptResult<()> {
            let bound = |v: &Dynamic| -> Result<Option<i64>, ()> {
                if v.is_unit() {
                    Ok(None)
                } else {
                    v.as_int().map(Some).map_err(|_| ())
                }
            };
            let window = match (bound(&from), bound(&to)) {
                (Ok(Some(f)), Ok(Some(t))) if f > t => None,
                (Ok(f), Ok(t)) => Some((f, t)),
                _ => None,
            };
            let (from_ts, to_ts) = window.ok_or_else(|| {
                invalid(
                    &ctx,
                    ErrorCode::SetTimeWindowValueInvalid,
                    "set_time_window expects integer timestamps (or ()) with from <= to"
                        .to_string(),
                )
            })?;
            ctx.update_settings("set_time_window", |s| {
                s.window_declared = true;
                s.from_ts = from_ts;
                s.to_ts = to_ts;
            });
            Ok(())
        },
    );

    let ctx = Arc::clone(context);
    engine.register_fn(
        "set_search",
        move |phrase: Dynamic, title: Dynamic, other: Dynamic| -> ScriptResult<()> {
            if !phrase.is_string() || !title.is_bool() || !other.is_bool() {
                return Err(invalid(
                    &ctx,
                    ErrorCode::SetSearchValueInvalid,
                    "set_search expects (string, bool, bool)".to_string(),
                ));
            }
            let phrase = phrase.into_string().unwrap_or_default();
            let search_title = title.as_bool().unwrap_or(false);
            let search_other = other.as_bool().unwrap_or(false);
            ctx.update_settings("set_search", |s| {
                s.search_phrase = Some(phrase).filter(|p| !p.trim().is_empty());
                s.search_title = search_title;
                s.search_other_fields = search_other;
            });
            Ok(())
        },
    );

    let ctx = Arc::clone(context);
    engine.register_fn("set_with_content", move |flag: Dynamic| -> ScriptResult<()> {
        let flag = flag.as_bool().map_err(|_| {
            invalid(
                &ctx,
                ErrorCode::SetWithContentValueInvalid,
                "set_with_content expects a bool".to_string(),
            )
        })?;
        ctx.update_settings("set_with_content", |s| s.with_content = flag);
        Ok(())
    });
}

fn register_data(
    engine: &mut Engine,
    context: &Arc<RhythmContext>,
    host: &Arc<dyn CapabilityHost>,
) {
    let (ctx, h) = (Arc::clone(context), Arc::clone(host));
    engine.register_fn("fetch_takes", move |field_id: Dynamic| -> ScriptResult<Dynamic> {
        let field_id = field_id.as_int().map_err(|_| {
            invalid(
                &ctx,
                ErrorCode::FetchTakesValueInvalid,
                "fetch_takes expects an integer field id".to_string(),
            )
        })?;
        call_host(&ctx, h.as_ref(), CapabilityRequest::FetchTakes { field_id })
    });

    let (ctx, h) = (Arc::clone(context), Arc::clone(host));
    engine.register_fn(
        "fetch_user_takes",
        move |user: Dynamic, field_id: Dynamic| -> ScriptResult<Dynamic> {
            if !user.is_string() || !field_id.is_int() {
                return Err(invalid(
                    &ctx,
                    ErrorCode::FetchUserTakesValueInvalid,
                    "fetch_user_takes expects (string, integer)".to_string(),
                ));
            }
            let request = CapabilityRequest::FetchTakesForUser {
                user: user.into_string().unwrap_or_default(),
                field_id: field_id.as_int().unwrap_or_default(),
            };
            call_host(&ctx, h.as_ref(), request)
        },
    );

    let (ctx, h) = (Arc::clone(context), Arc::clone(host));
    engine.register_fn("get_misc_data", move |url: Dynamic| -> ScriptResult<Dynamic> {
        let url = url.into_string().map_err(|_| {
            invalid(
                &ctx,
                ErrorCode::GetMiscDataValueInvalid,
                "get_misc_data expects a url string".to_string(),
            )
        })?;
        call_host(&ctx, h.as_ref(), CapabilityRequest::GetMiscData { url })
    });

    let (ctx, h) = (Arc::clone(context), Arc::clone(host));
    engine.register_fn("store_data", move |data: Dynamic| -> ScriptResult<()> {
        let data = if data.is_string() {
            data.into_string().unwrap_or_default()
        } else if data.is_map() || data.is_array() {
            serde_json::to_string(&data).map_err(|e| {
                invalid(&ctx, ErrorCode::StoreDataValueInvalid, e.to_string())
            })?
        } else {
            return Err(invalid(
                &ctx,
                ErrorCode::StoreDataValueInvalid,
                format!("store_data expects a string or map, got {}", data.type_name()),
            ));
        };
        call_host(&ctx, h.as_ref(), CapabilityRequest::StoreData { data }).map(|_| ())
    });

    let (ctx, h) = (Arc::clone(context), Arc::clone(host));
    engine.register_fn("get_stored_data", move || -> ScriptResult<Dynamic> {
        call_host(&ctx, h.as_ref(), CapabilityRequest::GetStoredData)
    });
}

fn register_session(engine: &mut Engine, context: &Arc<RhythmContext>) {
    let ctx = Arc::clone(context);
    engine.register_fn("kindred", move |username: ImmutableString| -> INT {
        ctx.kindred().score(username.as_str())
    });

    let ctx = Arc::clone(context);
    engine.register_fn(
        "client_param",
        move |name: ImmutableString| -> ScriptResult<Dynamic> {
            match ctx.client_param(name.as_str()) {
                Some(value) => to_script(value),
                None => Ok(Dynamic::UNIT),
            }
        },
    );

    engine.register_fn("log", |message: Dynamic| {
        debug!(target: "rhythm::script", message = %message, "rhythm log");
    });
}
