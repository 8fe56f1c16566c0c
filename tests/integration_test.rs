use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use script_bridge::config::DuplicatePolicy;
use script_bridge::{
    Bridge, BridgeConfig, BridgeError, ControllerState, QuickJsHost, ResolutionHandle, ScriptCall,
};

const PATIENCE: Duration = Duration::from_secs(5);

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct CustomType {
    a: i32,
    b: String,
}

fn attached(config: BridgeConfig) -> anyhow::Result<(Bridge, QuickJsHost)> {
    let bridge = Bridge::new(config)?;
    let mut host = QuickJsHost::new()?;
    host.attach(&bridge);
    host.run_until_idle(&bridge);
    Ok((bridge, host))
}

/// Service the bridge until `expression` is defined, then return it
fn settled(host: &mut QuickJsHost, bridge: &Bridge, expression: &str) -> anyhow::Result<Value> {
    let defined = host.run_until(bridge, PATIENCE, |host| {
        matches!(host.eval_json(expression), Ok(Some(_)))
    });
    anyhow::ensure!(defined, "`{expression}` never settled");
    host.eval_json(expression)?
        .ok_or_else(|| anyhow::anyhow!("`{expression}` is undefined"))
}

#[test]
fn test_add_round_trip() -> anyhow::Result<()> {
    let bridge = Bridge::with_defaults()?;
    bridge.expose_sync("add", |a: i64, b: i64| a + b)?;
    let mut host = QuickJsHost::new()?;
    host.attach(&bridge);
    host.run_until_idle(&bridge);
    assert_eq!(bridge.state(), ControllerState::Ready);

    host.eval("add(2, 3).then(v => { globalThis.sum = v; });")?;
    assert_eq!(settled(&mut host, &bridge, "sum")?, json!(5));

    host.eval("add(2).then(v => { globalThis.partial = v; });")?;
    assert_eq!(settled(&mut host, &bridge, "partial")?, json!(2));
    Ok(())
}

#[test]
fn test_unicode_names() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    bridge.expose_sync("größe", |text: String| text.chars().count())?;
    host.run_until_idle(&bridge);

    host.eval("größe('straße').then(v => { globalThis.länge = v; });")?;
    assert_eq!(settled(&mut host, &bridge, "länge")?, json!(6));

    host.eval("globalThis.計算 = (x) => x + 1;")?;
    let pending = bridge.call::<i64>(ScriptCall::new("計算").arg(&41)?)?;
    host.run_until_idle(&bridge);
    assert_eq!(pending.wait_timeout(PATIENCE)?, 42);
    Ok(())
}

#[test]
fn test_custom_types_cross_the_bridge() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    bridge.expose_sync("returnCustomType", |a: i32, b: String| CustomType { a, b })?;
    bridge.expose_sync("takeCustomType", |custom: CustomType| custom.a)?;
    host.run_until_idle(&bridge);

    host.eval(
        r#"
        returnCustomType(1, "one").then(v => { globalThis.made = v; });
        takeCustomType({ a: 7, b: "seven" }).then(v => { globalThis.taken = v; });
        "#,
    )?;
    assert_eq!(settled(&mut host, &bridge, "made")?, json!({"a": 1, "b": "one"}));
    assert_eq!(settled(&mut host, &bridge, "taken")?, json!(7));
    Ok(())
}

#[test]
fn test_strings_survive_escaping() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    bridge.expose_sync("echo", |text: String| text)?;
    host.run_until_idle(&bridge);

    host.eval(
        r#"
        globalThis.input = "quote\" backslash\\ newline\n tab\t sep\u2028 end </script>";
        echo(input).then(v => { globalThis.same = (v === input); });
        "#,
    )?;
    assert_eq!(settled(&mut host, &bridge, "same")?, json!(true));
    Ok(())
}

#[test]
fn test_async_function_resolves_once() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    bridge.expose_async("later", move |handle: ResolutionHandle, n: i32| {
        std::thread::sleep(Duration::from_millis(20));
        let first = handle.resolve(&(n + 10));
        let second = handle.resolve(&0);
        let _ = tx.lock().map(|tx| tx.send((first.is_ok(), second)));
    })?;
    host.run_until_idle(&bridge);

    host.eval("later(1).then(v => { globalThis.result = v; });")?;
    assert_eq!(settled(&mut host, &bridge, "result")?, json!(11));

    let (first_ok, second) = rx.recv_timeout(PATIENCE)?;
    assert!(first_ok);
    assert!(matches!(second, Err(BridgeError::AlreadyResolved(_))));
    Ok(())
}

#[test]
fn test_discard_resolves_undefined() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    bridge.expose_async("nothing", |handle: ResolutionHandle| {
        let _ = handle.resolve_optional::<i32>(None);
    })?;
    host.run_until_idle(&bridge);

    host.eval("nothing().then(v => { globalThis.wasUndefined = (v === undefined); });")?;
    assert_eq!(settled(&mut host, &bridge, "wasUndefined")?, json!(true));
    Ok(())
}

#[test]
fn test_concurrent_async_calls_keep_their_results() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    bridge.expose_async("slowId", |handle: ResolutionHandle, id: u64| {
        std::thread::sleep(Duration::from_millis((10 - id) * 3));
        let _ = handle.resolve(&id);
    })?;
    host.run_until_idle(&bridge);

    host.eval(
        r#"
        Promise.all([0, 1, 2, 3, 4, 5, 6, 7, 8, 9].map(i => slowId(i)))
            .then(all => { globalThis.ids = all; });
        "#,
    )?;
    assert_eq!(
        settled(&mut host, &bridge, "ids")?,
        json!([0, 1, 2, 3, 4, 5, 6, 7, 8, 9])
    );
    Ok(())
}

#[test]
fn test_native_calls_math_max() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;

    let pending = bridge.call::<i64>(ScriptCall::new("Math.max").arg(&3)?.arg(&7)?)?;
    host.run_until_idle(&bridge);
    assert_eq!(pending.wait_timeout(PATIENCE)?, 7);
    assert_eq!(bridge.pending_calls(), 0);
    Ok(())
}

#[test]
fn test_native_awaits_script_promise() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    host.eval("globalThis.slowDouble = async (x) => x * 2;")?;

    let pending = bridge.call::<i64>(ScriptCall::new("slowDouble").arg(&21)?)?;
    host.run_until_idle(&bridge);
    assert_eq!(pending.wait_timeout(PATIENCE)?, 42);
    Ok(())
}

#[test]
fn test_script_exception_discards_call() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    host.eval("globalThis.explode = () => { throw new Error('boom'); };")?;

    let thrown = bridge.call::<i64>(ScriptCall::new("explode"))?;
    let missing = bridge.call::<i64>(ScriptCall::new("doesNotExist"))?;
    host.run_until_idle(&bridge);

    assert!(matches!(
        thrown.wait_timeout(PATIENCE),
        Err(BridgeError::Discarded { .. })
    ));
    assert!(matches!(
        missing.wait_timeout(PATIENCE),
        Err(BridgeError::Discarded { .. })
    ));
    Ok(())
}

#[test]
fn test_async_function_calls_back_into_script() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    let weak = bridge.downgrade();
    bridge.expose_async("pow", move |handle: ResolutionHandle, a: f64, b: f64| {
        let Some(bridge) = weak.upgrade() else {
            return;
        };
        let result = ScriptCall::new("Math.pow")
            .arg(&a)
            .and_then(|call| call.arg(&b))
            .and_then(|call| bridge.call::<f64>(call))
            .and_then(|pending| pending.wait());
        let _ = match result {
            Ok(value) => handle.resolve(&value),
            Err(error) => handle.reject(error.to_string()),
        };
    })?;
    host.run_until_idle(&bridge);

    host.eval("pow(2, 10).then(v => { globalThis.power = v; });")?;
    assert_eq!(settled(&mut host, &bridge, "power")?.as_f64(), Some(1024.0));
    Ok(())
}

#[test]
fn test_work_queued_before_context_exists() -> anyhow::Result<()> {
    let bridge = Bridge::with_defaults()?;
    bridge.execute("globalThis.early = 'queued';");
    bridge.expose_sync("ping", || "pong")?;

    let mut host = QuickJsHost::new()?;
    assert_eq!(host.run_until_idle(&bridge), 0);
    assert_eq!(host.eval_json("typeof ping")?, Some(json!("undefined")));

    host.attach(&bridge);
    host.run_until_idle(&bridge);
    assert_eq!(host.eval_json("early")?, Some(json!("queued")));
    assert_eq!(host.eval_json("typeof ping")?, Some(json!("function")));
    Ok(())
}

#[test]
fn test_navigation_rebootstraps_context() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    bridge.expose_sync("add", |a: i64, b: i64| a + b)?;
    bridge.inject("globalThis.injected = (globalThis.injected || 0) + 1;");
    host.run_until_idle(&bridge);

    host.eval("add(1, 1).then(v => { globalThis.before = v; });")?;
    assert_eq!(settled(&mut host, &bridge, "before")?, json!(2));

    host.navigate(&bridge)?;
    host.run_until_idle(&bridge);
    assert_eq!(host.eval_json("typeof before")?, Some(json!("undefined")));
    assert_eq!(host.eval_json("injected")?, Some(json!(1)));

    host.eval("add(20, 22).then(v => { globalThis.after = v; });")?;
    assert_eq!(settled(&mut host, &bridge, "after")?, json!(42));
    Ok(())
}

#[test]
fn test_late_resolution_does_not_reach_next_context() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    bridge.expose_async("park", move |handle: ResolutionHandle| {
        let _ = tx.lock().map(|tx| tx.send(handle));
    })?;
    host.run_until_idle(&bridge);

    host.eval("park();")?;
    host.run_until_idle(&bridge);
    let stale = rx.recv_timeout(PATIENCE)?;

    host.navigate(&bridge)?;
    host.run_until_idle(&bridge);
    host.eval("park().then(v => { globalThis.parked = v; });")?;
    host.run_until_idle(&bridge);
    let current = rx.recv_timeout(PATIENCE)?;
    assert_eq!(stale.seq(), current.seq());

    stale.resolve(&"from the previous page")?;
    host.run_until(&bridge, Duration::from_millis(50), |_| false);
    assert_eq!(host.eval_json("globalThis.parked")?, None);

    current.resolve(&"mine")?;
    assert_eq!(settled(&mut host, &bridge, "parked")?, json!("mine"));
    Ok(())
}

#[test]
fn test_malformed_messages_keep_outbound_call_pending() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    host.eval("globalThis.later = () => new Promise(r => { globalThis.finish = r; });")?;

    let pending = bridge.call::<i64>(ScriptCall::new("later"))?;
    host.run_until_idle(&bridge);
    let seq = pending.seq();

    for text in [
        format!(r#"{{"seq":{seq},"result":"#),
        "[1, 2]".to_string(),
        r#"{"seq":4000,"result":1}"#.to_string(),
        format!(r#"{{"seq":"{seq}","result":2}}"#),
        format!(r#"{{"seq":{seq},"function":"nothing","params":[]}}"#),
    ] {
        bridge.on_inbound_message(&text);
    }
    host.run_until_idle(&bridge);
    assert_eq!(bridge.pending_calls(), 1);

    host.eval("finish(12);")?;
    host.run_until_idle(&bridge);
    assert_eq!(pending.wait_timeout(PATIENCE)?, 12);
    assert_eq!(bridge.pending_calls(), 0);
    Ok(())
}

#[test]
fn test_malformed_messages_are_ignored() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    bridge.expose_sync("add", |a: i64, b: i64| a + b)?;
    host.run_until_idle(&bridge);

    host.eval(
        r#"
        window.external.invoke("garbage");
        window.external.invoke("[1, 2]");
        window.external.invoke('{"seq": 999, "result": 1}');
        window.external.invoke('{"seq": 1, "function": "add", "params": [1,');
        "#,
    )?;
    host.run_until_idle(&bridge);

    host.eval("add(4, 4).then(v => { globalThis.still = v; });")?;
    assert_eq!(settled(&mut host, &bridge, "still")?, json!(8));
    Ok(())
}

#[test]
fn test_unknown_function_policies() -> anyhow::Result<()> {
    // a stub whose function the connected bridge never exposed
    let ghost_stub = Bridge::with_defaults()?.expose_sync("ghost", || 0)?;

    let (silent, mut host) = attached(BridgeConfig::default())?;
    host.eval(&ghost_stub)?;
    host.eval("ghost().then(() => { globalThis.outcome = 'resolved'; }, () => { globalThis.outcome = 'rejected'; });")?;
    host.run_until_idle(&silent);
    assert_eq!(host.eval_json("globalThis.outcome")?, None);

    let mut config = BridgeConfig::default();
    config.dispatch.reject_unknown_functions = true;
    let (strict, mut host) = attached(config)?;
    host.eval(&ghost_stub)?;
    host.eval("ghost().catch(e => { globalThis.reason = e.message; });")?;
    assert_eq!(
        settled(&mut host, &strict, "reason")?,
        json!("Function not exposed: ghost")
    );
    Ok(())
}

#[test]
fn test_duplicate_policy_reject() -> anyhow::Result<()> {
    let mut config = BridgeConfig::default();
    config.dispatch.duplicate_policy = DuplicatePolicy::Reject;
    let bridge = Bridge::new(config)?;
    bridge.expose_sync("once", || 1)?;
    assert!(matches!(
        bridge.expose_sync("once", || 2),
        Err(BridgeError::DuplicateFunction(_))
    ));
    assert!(matches!(
        bridge.expose_sync("not valid", || 2),
        Err(BridgeError::InvalidFunctionName(_))
    ));
    Ok(())
}

#[test]
fn test_when_all_ready_fires_after_last_response() -> anyhow::Result<()> {
    let (bridge, mut host) = attached(BridgeConfig::default())?;
    let fired = Arc::new(Mutex::new(0));
    let counter = fired.clone();
    bridge.when_all_ready(move || {
        if let Ok(mut count) = counter.lock() {
            *count += 1;
        }
    });

    let a = bridge.call::<i64>(ScriptCall::new("Math.abs").arg(&-1)?)?;
    let b = bridge.call::<i64>(ScriptCall::new("Math.abs").arg(&-2)?)?;
    host.run_until_idle(&bridge);

    assert_eq!(a.wait_timeout(PATIENCE)?, 1);
    assert_eq!(b.wait_timeout(PATIENCE)?, 2);
    assert_eq!(*fired.lock().map_err(|e| anyhow::anyhow!("{e}"))?, 1);
    Ok(())
}

#[test]
fn test_config_file_drives_script_names() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bridge.toml");
    std::fs::write(
        &path,
        r#"
[dispatch]
worker_threads = 2

[script]
resolver_table = "window.pendingCalls"
sequence_counter = "window.callSeq"
post_message = "window.external.invoke"
"#,
    )?;

    let config = BridgeConfig::from_toml_file(&path)?;
    assert_eq!(config.dispatch.worker_threads, 2);
    let (bridge, mut host) = attached(config)?;
    bridge.expose_sync("add", |a: i64, b: i64| a + b)?;
    host.run_until_idle(&bridge);

    assert_eq!(host.eval_json("typeof window.pendingCalls")?, Some(json!("object")));
    host.eval("add(5, 6).then(v => { globalThis.total = v; });")?;
    assert_eq!(settled(&mut host, &bridge, "total")?, json!(11));
    assert_eq!(host.eval_json("window.callSeq")?, Some(json!(1)));
    Ok(())
}
