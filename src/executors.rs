//! Reference executors
//!
//! Ready-made behaviours for the common directives. None of them is
//! registered automatically; call [`register_builtin`] on a namespace (or on
//! the default one through [`register_builtin_defaults`]) to get:
//!
//! | directive                | executor             | fills the field from            |
//! |--------------------------|----------------------|---------------------------------|
//! | `env=NAME[,NAME...]`     | [`EnvExecutor`]      | first set environment variable  |
//! | `form=key[,key...]`      | [`SourceExecutor`]   | first key found in the source   |
//! | `config=dotted.key`      | [`ConfigExecutor`]   | env override, then JSON file    |
//! | `default=v[,v...]`       | [`DefaultExecutor`]  | the arguments, when still unset |
//!
//! Values are decoded into the field according to its type: `String`, `bool`,
//! `char`, integers, floats, plus `Option<_>` and `Vec<_>` of those.

use std::any::{type_name, Any};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::context::{ContextKey, USER_SCOPE};
use crate::error::{BindError, ExecutorError};
use crate::executor::{DirectiveExecutor, DirectiveRuntime};
use crate::namespace::{default_namespace, Namespace};

/// Context key holding the JSON config file path (`PathBuf` or `String`).
pub const CONFIG_FILE: ContextKey = ContextKey::scoped(USER_SCOPE, "config-file");

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot decode into field of type {type_name}")]
    Unsupported { type_name: &'static str },

    #[error("invalid {type_name} value {value:?}: {source}")]
    Parse {
        value: String,
        type_name: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config file {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Register every reference executor in `namespace`.
pub fn register_builtin(namespace: &Namespace) -> Result<(), BindError> {
    namespace.register("env", EnvExecutor)?;
    namespace.register("form", SourceExecutor)?;
    namespace.register("config", ConfigExecutor::new("TAGBIND"))?;
    namespace.register("default", DefaultExecutor)?;
    Ok(())
}

/// [`register_builtin`] on the default namespace.
pub fn register_builtin_defaults() -> Result<(), BindError> {
    register_builtin(&default_namespace())
}

// ============================================================================
// DECODING
// ============================================================================

fn parse_one<T>(value: &str) -> Result<T, DecodeError>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse::<T>().map_err(|err| DecodeError::Parse {
        value: value.to_string(),
        type_name: type_name::<T>(),
        source: Box::new(err),
    })
}

macro_rules! decode_as {
    ($slot:expr, $values:expr; $($ty:ty),+ $(,)?) => {
        $(
            if let Some(field) = $slot.downcast_mut::<$ty>() {
                *field = parse_one::<$ty>(&$values[0])?;
                return Ok(());
            }
            if let Some(field) = $slot.downcast_mut::<Option<$ty>>() {
                *field = Some(parse_one::<$ty>(&$values[0])?);
                return Ok(());
            }
            if let Some(field) = $slot.downcast_mut::<Vec<$ty>>() {
                *field = $values
                    .iter()
                    .map(|value| parse_one::<$ty>(value))
                    .collect::<Result<_, _>>()?;
                return Ok(());
            }
        )+
    };
}

/// Decode `values` into `slot`; a single-valued field takes the first value.
///
/// Strings are stored verbatim, every other type is trimmed before parsing.
/// An empty `values` leaves the field untouched.
pub fn decode_into(slot: &mut dyn Any, values: &[String]) -> Result<(), DecodeError> {
    if values.is_empty() {
        return Ok(());
    }
    if let Some(field) = slot.downcast_mut::<String>() {
        field.clone_from(&values[0]);
        return Ok(());
    }
    if let Some(field) = slot.downcast_mut::<Option<String>>() {
        *field = Some(values[0].clone());
        return Ok(());
    }
    if let Some(field) = slot.downcast_mut::<Vec<String>>() {
        *field = values.to_vec();
        return Ok(());
    }
    decode_as!(slot, values; bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

    Err(DecodeError::Unsupported {
        type_name: "<unknown>",
    })
}

/// Decode into the runtime's field and mark it set.
fn assign(rt: &mut DirectiveRuntime<'_>, values: &[String]) -> Result<(), ExecutorError> {
    decode_into(rt.value_any(), values).map_err(|err| match err {
        DecodeError::Unsupported { .. } => DecodeError::Unsupported {
            type_name: rt.resolver.type_name(),
        },
        other => other,
    })?;
    rt.mark_value_set();
    Ok(())
}

// ============================================================================
// EXECUTORS
// ============================================================================

/// `env=NAME[,NAME...]`: first environment variable that is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvExecutor;

impl DirectiveExecutor for EnvExecutor {
    fn execute(&self, rt: &mut DirectiveRuntime<'_>) -> Result<(), ExecutorError> {
        let found = rt
            .directive
            .argv
            .iter()
            .find_map(|name| std::env::var(name.trim()).ok());
        match found {
            Some(value) => assign(rt, &[value]),
            None => Ok(()),
        }
    }
}

/// `form=key[,key...]`: first key present in the attached source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceExecutor;

impl DirectiveExecutor for SourceExecutor {
    fn execute(&self, rt: &mut DirectiveRuntime<'_>) -> Result<(), ExecutorError> {
        let Some(source) = rt.source() else {
            tracing::trace!(path = %rt.resolver.path_string(), "no source attached");
            return Ok(());
        };
        let found = rt
            .directive
            .argv
            .iter()
            .find_map(|key| source.lookup(key))
            .filter(|values| !values.is_empty());
        match found {
            Some(values) => assign(rt, &values),
            None => Ok(()),
        }
    }
}

/// `default=v[,v...]`: fill the field when no former directive set it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExecutor;

impl DirectiveExecutor for DefaultExecutor {
    fn execute(&self, rt: &mut DirectiveRuntime<'_>) -> Result<(), ExecutorError> {
        if rt.is_value_set() {
            return Ok(());
        }
        let values = rt.directive.argv.clone();
        assign(rt, &values)
    }
}

/// `config=dotted.key`: `<PREFIX>_DOTTED_KEY` env override, else JSON file.
///
/// The file path comes from the [`CONFIG_FILE`] context value; without one
/// only the environment is consulted. The file is a flat JSON object and
/// non-string values are rendered as JSON text.
///
/// A parsed file is kept until its size or modification time changes, so a
/// record with many `config=` fields reads the file once. Clones share the
/// cache.
#[derive(Debug, Clone)]
pub struct ConfigExecutor {
    env_prefix: String,
    cache: Arc<DashMap<PathBuf, CachedConfig>>,
}

#[derive(Debug)]
struct CachedConfig {
    modified: Option<SystemTime>,
    len: u64,
    values: Arc<FxHashMap<String, String>>,
}

impl ConfigExecutor {
    pub fn new(env_prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: env_prefix.into(),
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Environment variable that overrides `key`.
    pub fn override_var(&self, key: &str) -> String {
        format!("{}_{}", self.env_prefix, key.replace('.', "_")).to_uppercase()
    }

    /// Number of config files currently held parsed.
    pub fn cached_files(&self) -> usize {
        self.cache.len()
    }

    fn config_path(rt: &DirectiveRuntime<'_>) -> Option<PathBuf> {
        rt.lookup::<PathBuf>(&CONFIG_FILE)
            .cloned()
            .or_else(|| rt.lookup::<String>(&CONFIG_FILE).map(PathBuf::from))
    }

    fn load(&self, path: &Path) -> Result<Arc<FxHashMap<String, String>>, DecodeError> {
        let metadata = std::fs::metadata(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let modified = metadata.modified().ok();
        let len = metadata.len();

        if let Some(cached) = self.cache.get(path) {
            if cached.modified == modified && cached.len == len {
                return Ok(Arc::clone(&cached.values));
            }
        }

        let values = Arc::new(load_config_file(path)?);
        tracing::debug!(path = %path.display(), keys = values.len(), "loaded config file");
        self.cache.insert(
            path.to_path_buf(),
            CachedConfig {
                modified,
                len,
                values: Arc::clone(&values),
            },
        );
        Ok(values)
    }
}

/// Read a flat JSON config file into string values.
pub fn load_config_file(path: &Path) -> Result<FxHashMap<String, String>, DecodeError> {
    let text = std::fs::read_to_string(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: FxHashMap<String, serde_json::Value> =
        serde_json::from_str(&text).map_err(|source| DecodeError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

impl DirectiveExecutor for ConfigExecutor {
    fn execute(&self, rt: &mut DirectiveRuntime<'_>) -> Result<(), ExecutorError> {
        let Some(key) = rt.directive.arg(0).map(str::to_string) else {
            return Ok(());
        };

        if let Ok(value) = std::env::var(self.override_var(&key)) {
            return assign(rt, &[value]);
        }

        let Some(path) = Self::config_path(rt) else {
            tracing::trace!(path = %rt.resolver.path_string(), "no config file attached");
            return Ok(());
        };
        let config = self.load(&path)?;
        match config.get(&key) {
            Some(value) => assign(rt, &[value.clone()]),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_decode_scalars() {
        let mut age = 0_u32;
        decode_into(&mut age, &strings(&[" 42 "])).unwrap();
        assert_eq!(age, 42);

        let mut flag = false;
        decode_into(&mut flag, &strings(&["true"])).unwrap();
        assert!(flag);

        let mut name = String::new();
        decode_into(&mut name, &strings(&[" Ada "])).unwrap();
        assert_eq!(name, " Ada ");
    }

    #[test]
    fn test_decode_option_and_vec() {
        let mut maybe: Option<i64> = None;
        decode_into(&mut maybe, &strings(&["-7"])).unwrap();
        assert_eq!(maybe, Some(-7));

        let mut list: Vec<u8> = Vec::new();
        decode_into(&mut list, &strings(&["1", "2", "3"])).unwrap();
        assert_eq!(list, vec![1, 2, 3]);

        let mut tags: Vec<String> = Vec::new();
        decode_into(&mut tags, &strings(&["a", "b"])).unwrap();
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[test]
    fn test_decode_errors() {
        let mut age = 0_u8;
        let err = decode_into(&mut age, &strings(&["300"])).unwrap_err();
        assert!(matches!(err, DecodeError::Parse { type_name: "u8", .. }));

        let mut unsupported = std::time::Duration::ZERO;
        let err = decode_into(&mut unsupported, &strings(&["1"])).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported { .. }));
    }

    #[test]
    fn test_decode_empty_values_is_noop() {
        let mut name = "keep".to_string();
        decode_into(&mut name, &[]).unwrap();
        assert_eq!(name, "keep");
    }

    #[test]
    fn test_override_var() {
        let exe = ConfigExecutor::new("myapp");
        assert_eq!(exe.override_var("workspace.root"), "MYAPP_WORKSPACE_ROOT");
    }

    #[test]
    fn test_register_builtin() {
        let ns = Namespace::new();
        register_builtin(&ns).unwrap();
        assert_eq!(ns.names(), vec!["config", "default", "env", "form"]);
        assert!(register_builtin(&ns).is_err());
    }
}
