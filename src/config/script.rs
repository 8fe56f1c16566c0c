use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 脚本侧命名配置
///
/// Global names used by the generated script snippets. Each one must be a
/// property path such as `window._rpc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Resolver table, keyed by sequence number
    pub resolver_table: String,

    /// Script-side sequence counter
    pub sequence_counter: String,

    /// The single message-send primitive provided by the host
    pub post_message: String,
}

impl_default!(ScriptConfig {
    resolver_table: "window._rpc".to_string(),
    sequence_counter: "window._rpc_seq".to_string(),
    post_message: "window.external.invoke".to_string(),
});

impl ScriptConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, path) in [
            ("resolver_table", &self.resolver_table),
            ("sequence_counter", &self.sequence_counter),
            ("post_message", &self.post_message),
        ] {
            if !is_property_path(path) {
                return Err(ConfigError::ValidationError(format!(
                    "{field} is not a valid property path: {path:?}"
                )));
            }
        }
        if self.resolver_table == self.sequence_counter {
            return Err(ConfigError::ValidationError(
                "resolver_table and sequence_counter must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// `a.b.c` where every segment is a script identifier.
pub(crate) fn is_property_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(is_identifier)
}

/// Script identifier: a letter, `_` or `$`, followed by letters, digits,
/// `_`, `$` or the zero-width joiners. Letters and digits are Unicode, so
/// `größe` and `計算` qualify. Punctuation, whitespace and line terminators
/// never do.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '\u{200C}' | '\u{200D}'))
}
