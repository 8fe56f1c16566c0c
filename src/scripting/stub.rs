//! Script-side code generation
//!
//! Every piece of script text the bridge sends into the hosted context is
//! rendered here from a fixed template. Dynamic data only ever enters a
//! template through [`Codec::script_string`] or [`Codec::script_literal`].

use serde_json::Value;

use crate::bindings::protocol::{CallResponse, Codec};
use crate::config::ScriptConfig;

const BOOTSTRAP: &str = r#"
if (typeof {table} !== "object" || {table} === null) {
    {table} = {};
}
if (typeof {counter} !== "number") {
    {counter} = 0;
}
"#;

const FUNCTION_STUB: &str = r#"
globalThis[{name}] = async function (...params) {
    const seq = ++{counter};
    const promise = new Promise((resolve, reject) => {
        {table}[seq] = { resolve: resolve, reject: reject };
    });
    {post}(JSON.stringify({
        "seq": seq,
        "function": {name},
        "params": params
    }));
    const payload = await promise;
    return payload === undefined ? undefined : JSON.parse(payload);
};
"#;

const REMOVE_STUB: &str = r#"
delete globalThis[{name}];
"#;

const SETTLE: &str = r#"
(function (entry) {
    if (entry) {
        delete {table}[{seq}];
        entry.{method}({payload});
    }
})(typeof {table} === "object" && {table} !== null ? {table}[{seq}] : undefined);
"#;

const OUTBOUND_CALL: &str = r#"
(function (seq) {
    const send = (message) => {post}(JSON.stringify(message));
    try {
        Promise.resolve({call}).then(
            (result) => send({ "seq": seq, "result": result === undefined ? null : result, "present": true }),
            () => send({ "seq": seq, "present": false })
        );
    } catch (error) {
        send({ "seq": seq, "present": false });
    }
})({seq});
"#;

/// Generates the script snippets for one bridge instance
#[derive(Debug, Clone)]
pub struct ScriptStubs {
    table: String,
    counter: String,
    post: String,
}

impl ScriptStubs {
    pub fn new(config: &ScriptConfig) -> Self {
        Self {
            table: config.resolver_table.clone(),
            counter: config.sequence_counter.clone(),
            post: config.post_message.clone(),
        }
    }

    /// Establishes the resolver table and sequence counter. Safe to run again
    /// in a context that already has them.
    pub fn bootstrap(&self) -> String {
        render(
            BOOTSTRAP,
            &[("{table}", &self.table), ("{counter}", &self.counter)],
        )
    }

    /// The callable stand-in for an exposed native function. `name` must
    /// already be a validated identifier.
    pub fn function_stub(&self, name: &str) -> String {
        render(
            FUNCTION_STUB,
            &[
                ("{table}", &self.table),
                ("{counter}", &self.counter),
                ("{post}", &self.post),
                ("{name}", &Codec::script_string(name)),
            ],
        )
    }

    /// Removes the stand-in installed by [`ScriptStubs::function_stub`]
    pub fn remove_stub(&self, name: &str) -> String {
        render(REMOVE_STUB, &[("{name}", &Codec::script_string(name))])
    }

    /// Settles the script-side promise for `response.seq` and forgets its
    /// resolver. A discarded response resolves with `undefined`.
    pub fn resolution(&self, response: &CallResponse) -> String {
        let payload = if response.present {
            Codec::script_string(&response.result.to_string())
        } else {
            "undefined".to_string()
        };
        self.settle(response.seq, "resolve", &payload)
    }

    /// Rejects the script-side promise for `seq` with an `Error`
    pub fn rejection(&self, seq: u32, message: &str) -> String {
        let payload = format!("new Error({})", Codec::script_string(message));
        self.settle(seq, "reject", &payload)
    }

    fn settle(&self, seq: u32, method: &str, payload: &str) -> String {
        render(
            SETTLE,
            &[
                ("{table}", &self.table),
                ("{seq}", &seq.to_string()),
                ("{method}", method),
                ("{payload}", payload),
            ],
        )
    }

    /// Invokes a script function and reports its (awaited) result back as a
    /// response for `seq`. The call expression is `function(arg1,arg2,...)`.
    pub fn outbound_call(&self, seq: u32, function: &str, arguments: &[Value]) -> String {
        let arguments = arguments
            .iter()
            .map(Codec::script_literal)
            .collect::<Vec<_>>()
            .join(",");
        let call = format!("{function}({arguments})");

        render(
            OUTBOUND_CALL,
            &[
                ("{post}", &self.post),
                ("{seq}", &seq.to_string()),
                ("{call}", &call),
            ],
        )
    }
}

/// Substitutes placeholders in order. Data-bearing placeholders go last so
/// their contents are never scanned for further placeholders.
fn render(template: &str, substitutions: &[(&str, &str)]) -> String {
    substitutions
        .iter()
        .fold(template.trim().to_string(), |code, (placeholder, value)| {
            code.replace(placeholder, value)
        })
}
