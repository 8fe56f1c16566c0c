use serde::{Deserialize, Serialize};
use std::time::Duration;

use script_bridge::{
    init_logging, Bridge, BridgeConfig, BridgeError, BridgeResult, QuickJsHost, ResolutionHandle,
    ScriptCall,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CustomType {
    a: i32,
    b: String,
}

const DEMO: &str = r#"
(async () => {
    console.log("test(5) =", await test(5));
    console.log("returnCustomType(1, 'one') =", JSON.stringify(await returnCustomType(1, "one")));
    console.log("takeCustomType({a: 7}) =", await takeCustomType({ a: 7, b: "seven" }));
    console.log("asyncTest(1) =", await asyncTest(1));
    console.log("pow(2, 10) =", await pow(2, 10));
})().then(
    () => { globalThis.demoFinished = true; },
    (error) => { console.error(String(error)); globalThis.demoFinished = true; }
);
"#;

fn run() -> BridgeResult<()> {
    let mut config = BridgeConfig::load_or_default();
    config.apply_env_overrides();
    init_logging(&config.logging);

    let bridge = Bridge::new(config)?;

    bridge.expose_sync("test", |some_int: i32| some_int + 10)?;
    bridge.expose_async("asyncTest", |promise: ResolutionHandle, some_int: i32| {
        std::thread::sleep(Duration::from_millis(500));
        if let Err(error) = promise.resolve(&(some_int + 10)) {
            tracing::error!("asyncTest: {}", error);
        }
    })?;
    bridge.expose_sync("returnCustomType", |a: i32, b: String| CustomType { a, b })?;
    bridge.expose_sync("takeCustomType", |custom: CustomType| custom.a)?;

    // Script functions must only be awaited off the script thread.
    let weak = bridge.downgrade();
    bridge.expose_async("pow", move |promise: ResolutionHandle, a: f64, b: f64| {
        let result = weak
            .upgrade()
            .ok_or(BridgeError::Closed)
            .and_then(|bridge| {
                let call = ScriptCall::new("Math.pow").arg(&a)?.arg(&b)?;
                bridge.call::<f64>(call)
            })
            .and_then(|pending| pending.wait());
        let settled = match result {
            Ok(value) => promise.resolve(&value),
            Err(error) => promise.reject(error.to_string()),
        };
        if let Err(error) = settled {
            tracing::error!("pow: {}", error);
        }
    })?;

    let mut host = QuickJsHost::new()?;
    host.attach(&bridge);
    host.run_until_idle(&bridge);
    host.eval(DEMO)?;

    let finished = host.run_until(&bridge, Duration::from_secs(10), |host| {
        matches!(
            host.eval_json("globalThis.demoFinished === true"),
            Ok(Some(serde_json::Value::Bool(true)))
        )
    });
    if !finished {
        tracing::warn!("Demo did not finish in time");
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Bridge demo failed: {}", e);
        std::process::exit(1);
    }
}
