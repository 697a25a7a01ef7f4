//! Tests for script execution and isolation
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::*;
use serde_json::json;

fn sandbox() -> ScriptSandbox {
    ScriptSandbox::default()
}

fn limited(timeout_ms: u64, memory_limit_bytes: usize) -> ScriptSandbox {
    ScriptSandbox::new(SandboxLimits {
        timeout: Duration::from_millis(timeout_ms),
        memory_limit_bytes,
        max_nesting: 64,
    })
}

async fn run(code: &str, input: Value) -> Result<Value, SandboxError> {
    sandbox().execute(code, &input).await
}

#[tokio::test]
async fn test_returns_transformed_value() {
    assert_eq!(run("return value.toUpperCase()", json!("abc")).await.unwrap(), json!("ABC"));
    assert_eq!(run("return input * 2", json!(21)).await.unwrap(), json!(42));
    assert_eq!(
        run("return value.split(',').map(s => s.trim())", json!("a, b ,c")).await.unwrap(),
        json!(["a", "b", "c"])
    );
}

#[tokio::test]
async fn test_completion_value_without_return() {
    assert_eq!(run("value + 1", json!(1)).await.unwrap(), json!(2));
    assert_eq!(run("let x = 1;", json!(null)).await.unwrap(), json!(null));
}

#[tokio::test]
async fn test_control_flow_and_objects() {
    let code = r#"
        const out = { count: 0, names: [] };
        for (const item of value) {
            if (item.active) {
                out.count += 1;
                out.names.push(item.name);
            }
        }
        let i = 0;
        while (true) { i++; if (i >= 3) break; }
        out.loops = i;
        return out;
    "#;
    let input = json!([
        {"name": "a", "active": true},
        {"name": "b", "active": false},
        {"name": "c", "active": true}
    ]);
    assert_eq!(
        run(code, input).await.unwrap(),
        json!({"count": 2, "names": ["a", "c"], "loops": 3})
    );
}

#[tokio::test]
async fn test_input_is_not_mutated() {
    let input = json!({"items": [1, 2, 3]});
    let out = sandbox()
        .execute("value.items.push(4); value.extra = true; return value", &input)
        .await
        .unwrap();
    assert_eq!(out, json!({"items": [1, 2, 3, 4], "extra": true}));
    assert_eq!(input, json!({"items": [1, 2, 3]}));
}

#[tokio::test]
async fn test_host_globals_are_unavailable() {
    for name in ["process", "require", "globalThis", "fetch", "setTimeout", "Date", "eval"] {
        let out = run(&format!("return typeof {}", name), json!(null)).await.unwrap();
        assert_eq!(out, json!("undefined"), "{} should not be reachable", name);

        let err = run(&format!("return {}", name), json!(null)).await.unwrap_err();
        assert_eq!(err.kind(), "reference");
    }
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let started = std::time::Instant::now();
    let err = limited(100, 1 << 20)
        .execute("while (true) {}", &json!(null))
        .await
        .unwrap_err();
    assert_eq!(err, SandboxError::Timeout { timeout_ms: 100 });
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_memory_limit() {
    let code = "let s = 'x'; while (true) { s = s + s; }";
    let err = limited(5_000, 64 * 1024).execute(code, &json!(null)).await.unwrap_err();
    assert_eq!(err, SandboxError::MemoryLimit { limit_bytes: 64 * 1024 });

    let code = "const a = []; for (let i = 0; i < 1e9; i++) a.push(i);";
    let err = limited(5_000, 64 * 1024).execute(code, &json!(null)).await.unwrap_err();
    assert_eq!(err.kind(), "memory_limit");
}

#[tokio::test]
async fn test_error_classification() {
    let err = run("return (", json!(null)).await.unwrap_err();
    assert_eq!(err.kind(), "syntax");

    let err = run("return missing + 1", json!(null)).await.unwrap_err();
    assert_eq!(err, SandboxError::Reference { name: "missing".to_string() });

    let err = run("return value.name.first", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), "type");

    let err = run("throw new_value", json!(null)).await.unwrap_err();
    assert_eq!(err.kind(), "reference");

    let err = run("throw Error('bad input')", json!(null)).await.unwrap_err();
    assert_eq!(err, SandboxError::Thrown { message: "Error: bad input".to_string() });
    assert_eq!(err.to_string(), "Uncaught Error: bad input");

    let err = run("const x = 1; x = 2;", json!(null)).await.unwrap_err();
    assert_eq!(err.kind(), "type");
}

#[tokio::test]
async fn test_runaway_recursion_is_bounded() {
    let err = run("const f = n => f(n + 1); return f(0)", json!(null)).await.unwrap_err();
    assert_eq!(err.kind(), "type");
}

#[tokio::test]
async fn test_builtins() {
    let out = run(
        "return [Math.max(1, 5, 3), parseInt('42px'), Number('3.5'), (1.005).toFixed(2), JSON.stringify({a: [1]})]",
        json!(null),
    )
    .await
    .unwrap();
    assert_eq!(out, json!([5, 42, 3.5, "1.00", "{\"a\":[1]}"]));

    let out = run(
        "return Object.keys(value).sort().reduce((acc, k) => acc + k, '')",
        json!({"b": 1, "a": 2}),
    )
    .await
    .unwrap();
    assert_eq!(out, json!("ab"));
}

#[tokio::test]
async fn test_nan_and_undefined_become_null() {
    assert_eq!(run("return 0 / 0", json!(null)).await.unwrap(), json!(null));
    assert_eq!(run("return [undefined, 1]", json!(null)).await.unwrap(), json!([null, 1]));
    assert_eq!(run("return { a: undefined, b: 1 }", json!(null)).await.unwrap(), json!({"b": 1}));
}

#[test]
fn test_compile_checks_syntax_only() {
    let sandbox = sandbox();
    assert!(sandbox.compile("return notDefinedYet").is_ok());
    assert!(sandbox.compile("return )").is_err());
}

#[test]
fn test_limits_from_config() {
    let config = SandboxConfig {
        timeout_ms: 250,
        memory_limit_bytes: 1024,
        max_nesting: 8,
    };
    let limits = SandboxLimits::from(&config);
    assert_eq!(limits.timeout, Duration::from_millis(250));
    assert_eq!(limits.memory_limit_bytes, 1024);
    assert_eq!(limits.max_nesting, 8);
}
