//! Convenience macros for plugin development.

/// Builds a [`HookTable`](crate::HookTable) from `hook => handler` pairs.
///
/// # Example
/// ```rust,ignore
/// let hooks = hook_table! {
///     "config" => handler_fn(|config, _| async move { Ok(config) }),
///     "paths" => handler_fn(|paths, _| async move { Ok(paths) }),
/// };
/// ```
#[macro_export]
macro_rules! hook_table {
    () => {
        $crate::HookTable::new()
    };
    ($($hook:expr => $handler:expr),+ $(,)?) => {{
        let mut table = $crate::HookTable::new();
        $(
            table.insert($hook, $handler);
        )+
        table
    }};
}

/// Reads a typed argument out of a JSON args record, falling back to a default.
///
/// # Example
/// ```rust,ignore
/// let port: u16 = arg_or!(args, "port", 3000);
/// ```
#[macro_export]
macro_rules! arg_or {
    ($args:expr, $key:expr, $default:expr) => {
        $args
            .get($key)
            .cloned()
            .and_then(|value| $crate::__private::serde_json::from_value(value).ok())
            .unwrap_or($default)
    };
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::traits::handler_fn;

    #[test]
    fn test_hook_table_macro_keeps_order() {
        let table = hook_table! {
            "size" => handler_fn(|v, _| async move { Ok(v) }),
            "report" => handler_fn(|v, _| async move { Ok(v) }),
        };
        assert_eq!(table.hook_names(), vec!["size", "report"]);
        assert!(hook_table!().is_empty());
    }

    #[test]
    fn test_arg_or() {
        let args = json!({"port": 8080, "open": "yes"});
        let port: u16 = arg_or!(args, "port", 3000);
        let open: bool = arg_or!(args, "open", false);
        let host: String = arg_or!(args, "host", "0.0.0.0".to_string());
        assert_eq!(port, 8080);
        assert!(!open);
        assert_eq!(host, "0.0.0.0");
    }
}
