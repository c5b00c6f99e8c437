//! Literal context values.
//!
//! A literal is first expanded against the handler's symbol table
//! (`${name}`, `${path}`, `${work}`, `${temp}`, `${uri}`) and then
//! converted to its target: a built-in scalar, or a value type loaded
//! through the context class loader.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ControlError, ControlResult};
use crate::info::AnyArc;
use crate::loader::ClassLoader;

/// Replaces `${symbol}` references. Unknown symbols are left untouched.
pub(crate) fn expand_symbols(text: &str, symbols: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match symbols.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + end + 3]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Converts an expanded literal to `target`.
pub(crate) fn convert(target: &str, text: &str) -> ControlResult<AnyArc> {
    let failure = |reason: String| ControlError::Value {
        value: text.to_string(),
        target: target.to_string(),
        reason,
    };
    let value: AnyArc = match target {
        "string" | "str" | "uri" | "url" => Arc::new(text.to_string()),
        "int" | "integer" | "long" | "i64" => Arc::new(text.trim().parse::<i64>().map_err(|e| failure(e.to_string()))?),
        "float" | "double" | "f64" => Arc::new(text.trim().parse::<f64>().map_err(|e| failure(e.to_string()))?),
        "boolean" | "bool" => Arc::new(parse_bool(text).ok_or_else(|| failure("expected true or false".to_string()))?),
        "path" | "file" => Arc::new(PathBuf::from(text)),
        classname => {
            let loader = ClassLoader::context().ok_or_else(|| failure("no context class loader".to_string()))?;
            let ty = loader.load_class(classname)?;
            let parser = ty
                .value_parser()
                .ok_or_else(|| failure(format!("class [{}] is not a value type", classname)))?;
            parser(text).map_err(|e| failure(e.to_string()))?
        }
    };
    Ok(value)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
