//! FFI layer between Rust and scripts
//!
//! Values cross the boundary as JSON: everything a smart function receives
//! or returns is plain data. Console calls are the one exception, because
//! scripts log values JSON cannot represent (functions, errors, cycles).

use crate::console::{ConsoleLog, ConsoleMode, LogLevel};
use dtm_core::DTM_RUNTIME;
use rquickjs::function::Rest;
use rquickjs::{Coerced, Ctx, Function, Object, Value};
use serde_json::{Map, Value as Json};
use std::cell::RefCell;
use std::rc::Rc;

/// Console entries recorded in capture mode, drained by the runtime after
/// every evaluation or call.
pub(crate) type LogBuffer = Rc<RefCell<Vec<ConsoleLog>>>;

pub(crate) fn to_js<'js>(ctx: &Ctx<'js>, value: &Json) -> rquickjs::Result<Value<'js>> {
    ctx.json_parse(value.to_string())
}

/// `undefined`, functions and symbols become `null`, like a top-level
/// `JSON.stringify`.
pub(crate) fn from_js<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<Json> {
    if value.is_undefined() || value.is_function() || value.is_symbol() {
        return Ok(Json::Null);
    }
    let Some(text) = ctx.json_stringify(value)? else {
        return Ok(Json::Null);
    };
    serde_json::from_str(&text.to_string()?)
        .map_err(|e| rquickjs::Error::new_from_js_message("value", "JSON", e.to_string()))
}

/// A console argument as it is recorded.
pub(crate) fn console_arg<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Json {
    if let Some(text) = value.as_string() {
        return text.to_string().map(Json::String).unwrap_or(Json::Null);
    }
    if value.is_undefined() {
        return Json::Null;
    }
    if value.is_function() {
        return Json::String("[Function]".into());
    }
    if let Some(error) = value.as_exception() {
        let name = error
            .get::<_, Coerced<String>>("name")
            .map(|n| n.0)
            .unwrap_or_else(|_| "Error".into());
        return Json::String(format!("{name}: {}", error.message().unwrap_or_default()));
    }
    match from_js(ctx, value.clone()) {
        Ok(json) => json,
        Err(_) => {
            // cyclic objects and BigInt make JSON.stringify throw
            let _ = ctx.catch();
            value
                .get::<Coerced<String>>()
                .map(|s| Json::String(s.0))
                .unwrap_or(Json::Null)
        }
    }
}

/// Text of a thrown value that is not an `Error` instance.
pub(crate) fn thrown_value_message<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> String {
    match console_arg(ctx, value) {
        Json::String(s) => s,
        other => other.to_string(),
    }
}

/// Builds the `console` object, one method per [`LogLevel`] name, and sets
/// it as a global.
pub(crate) fn install_console<'js>(
    ctx: &Ctx<'js>,
    mode: &ConsoleMode,
    buffer: &LogBuffer,
) -> rquickjs::Result<Object<'js>> {
    let console = Object::new(ctx.clone())?;
    for level in LogLevel::ALL {
        for &method in level.methods() {
            let function = match mode {
                ConsoleMode::Capture => {
                    let buffer = buffer.clone();
                    Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
                        let args = args.0.into_iter().map(|a| console_arg(&ctx, a)).collect();
                        buffer.borrow_mut().push(ConsoleLog::new(level, args));
                    })?
                }
                ConsoleMode::PassThrough(sink) => {
                    let sink = sink.clone();
                    Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
                        let args: Vec<Json> =
                            args.0.into_iter().map(|a| console_arg(&ctx, a)).collect();
                        sink.emit(level, &args);
                    })?
                }
            };
            function.set_name(method)?;
            console.set(method, function)?;
        }
    }
    ctx.globals().set("console", console.clone())?;
    Ok(console)
}

/// The second argument of a smart function call.
///
/// Without a caller context a fresh one is built. A caller object gets
/// `runtime` and `params` only where it has none; `console` is always the
/// sandbox console. Anything that is not an object is passed as is.
pub(crate) fn prepare_context<'js>(
    ctx: &Ctx<'js>,
    context: Option<&Json>,
    params: Option<&Map<String, Json>>,
    console: &Object<'js>,
) -> rquickjs::Result<Value<'js>> {
    let object = match context {
        None => Object::new(ctx.clone())?,
        Some(json) if json.is_object() => match to_js(ctx, json)?.into_object() {
            Some(object) => object,
            None => return to_js(ctx, json),
        },
        Some(json) => return to_js(ctx, json),
    };

    if !object.contains_key("runtime")? {
        object.set("runtime", DTM_RUNTIME)?;
    }
    if let Some(params) = params {
        if !object.contains_key("params")? {
            object.set("params", to_js(ctx, &Json::Object(params.clone()))?)?;
        }
    }
    object.set("console", console.clone())?;
    Ok(object.into_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};
    use serde_json::json;

    fn with_ctx<R>(f: impl for<'js> FnOnce(Ctx<'js>) -> R) -> R {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(f)
    }

    #[test]
    fn json_round_trips_through_the_engine() {
        with_ctx(|ctx| {
            let input = json!({ "a": [1, 2.5, "x", null, true], "b": { "c": {} } });
            let value = to_js(&ctx, &input).unwrap();
            assert_eq!(from_js(&ctx, value).unwrap(), input);
        });
    }

    #[test]
    fn undefined_and_functions_become_null() {
        with_ctx(|ctx| {
            let value: Value = ctx.eval("undefined").unwrap();
            assert_eq!(from_js(&ctx, value).unwrap(), Json::Null);
            let value: Value = ctx.eval("(function () {})").unwrap();
            assert_eq!(from_js(&ctx, value).unwrap(), Json::Null);
        });
    }

    #[test]
    fn console_args_render_like_a_terminal() {
        with_ctx(|ctx| {
            let values: Vec<Value> = ctx
                .eval(
                    "(() => { const o = { n: 1 }; const c = {}; c.self = c; \
                     return ['text', 3, o, undefined, () => 1, new TypeError('bad'), c]; })()",
                )
                .unwrap();
            let rendered: Vec<Json> = values.into_iter().map(|v| console_arg(&ctx, v)).collect();
            assert_eq!(rendered[0], json!("text"));
            assert_eq!(rendered[1], json!(3));
            assert_eq!(rendered[2], json!({ "n": 1 }));
            assert_eq!(rendered[3], Json::Null);
            assert_eq!(rendered[4], json!("[Function]"));
            assert_eq!(rendered[5], json!("TypeError: bad"));
            assert_eq!(rendered[6], json!("[object Object]"));
        });
    }

    #[test]
    fn captured_console_keeps_call_order() {
        let buffer: LogBuffer = Rc::default();
        with_ctx(|ctx| {
            install_console(&ctx, &ConsoleMode::Capture, &buffer).unwrap();
            ctx.eval::<(), _>("console.log('a', 1); console.warn('b'); console.info('c');")
                .unwrap();
        });
        let logs = buffer.borrow();
        let levels: Vec<LogLevel> = logs.iter().map(|l| l.level).collect();
        assert_eq!(levels, [LogLevel::Log, LogLevel::Warn, LogLevel::Log]);
        assert_eq!(logs[0].args, [json!("a"), json!(1)]);
        assert_eq!(logs[2].message(), "c");
    }

    #[test]
    fn context_is_completed_not_overwritten() {
        let buffer: LogBuffer = Rc::default();
        with_ctx(|ctx| {
            let console = install_console(&ctx, &ConsoleMode::Capture, &buffer).unwrap();
            let params = Map::from_iter([("limit".to_string(), json!(5))]);

            let built = prepare_context(&ctx, None, Some(&params), &console).unwrap();
            let object = built.as_object().unwrap();
            assert_eq!(object.get::<_, String>("runtime").unwrap(), DTM_RUNTIME);
            assert!(object.get::<_, Value>("console").unwrap().is_object());
            assert_eq!(
                from_js(&ctx, object.get("params").unwrap()).unwrap(),
                json!({ "limit": 5 })
            );

            let given = json!({ "runtime": "custom", "params": { "limit": 1 } });
            let merged = prepare_context(&ctx, Some(&given), Some(&params), &console).unwrap();
            let object = merged.as_object().unwrap();
            assert_eq!(object.get::<_, String>("runtime").unwrap(), "custom");
            assert_eq!(
                from_js(&ctx, object.get("params").unwrap()).unwrap(),
                json!({ "limit": 1 })
            );

            let scalar = prepare_context(&ctx, Some(&json!(7)), None, &console).unwrap();
            assert_eq!(scalar.as_int(), Some(7));
        });
    }
}
