//! Owner-side hook objects with typed dispatch.
//!
//! The plugin that creates one of these keeps it to fire the hook and
//! registers [`binder`](TransformHook::binder) so other plugins can tap it.
//! Values cross the handler boundary as JSON; the typed wrappers convert on
//! the way in and out.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use kiln_core::{AppError, AppResult};

use super::definitions::{HookBinder, HookKind, HookTap};
use super::dispatcher::{self, TapList};

fn decode<T: DeserializeOwned>(hook: &str, value: Value) -> AppResult<T> {
    serde_json::from_value(value).map_err(|e| {
        AppError::with_source(
            kiln_core::ErrorKind::Hook,
            format!("hook {hook} produced a value of the wrong shape: {e}"),
            e,
        )
    })
}

macro_rules! hook_object {
    ($name:ident, $kind:expr) => {
        impl<T> $name<T> {
            /// Creates a hook with no taps.
            pub fn new(name: impl Into<String>) -> Self {
                Self {
                    name: name.into(),
                    taps: TapList::new(),
                    _marker: PhantomData,
                }
            }

            /// The hook name.
            pub fn name(&self) -> &str {
                &self.name
            }

            /// Names of the tapping plugins, in dispatch order.
            pub async fn contributors(&self) -> Vec<String> {
                self.taps.contributors().await
            }
        }

        impl<T: 'static> $name<T> {
            /// Binder to hand to `add_new_hook`; taps land on this hook.
            pub fn binder(&self) -> Arc<dyn HookBinder> {
                Arc::new(self.clone())
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                Self {
                    name: self.name.clone(),
                    taps: self.taps.clone(),
                    _marker: PhantomData,
                }
            }
        }

        impl<T> std::fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("name", &self.name)
                    .finish_non_exhaustive()
            }
        }

        #[async_trait]
        impl<T: 'static> HookBinder for $name<T> {
            fn kind(&self) -> HookKind {
                $kind
            }

            async fn bind(&self, tap: HookTap) {
                self.taps.push(tap).await;
            }
        }
    };
}

/// A hook whose handlers rewrite a value in sequence.
pub struct TransformHook<T> {
    name: String,
    taps: TapList,
    _marker: PhantomData<fn() -> T>,
}

hook_object!(TransformHook, HookKind::Transform);

impl<T: Serialize + DeserializeOwned> TransformHook<T> {
    /// Runs every tap in order, each consuming the previous output.
    pub async fn call(&self, initial: T, args: Value) -> AppResult<T> {
        let seed = serde_json::to_value(initial)?;
        let result = dispatcher::transform(&self.name, &self.taps, seed, &args).await?;
        decode(&self.name, result)
    }
}

/// A hook whose handlers each contribute one list item.
pub struct AccumulateHook<T> {
    name: String,
    taps: TapList,
    _marker: PhantomData<fn() -> T>,
}

hook_object!(AccumulateHook, HookKind::Accumulate);

impl<T: Serialize + DeserializeOwned> AccumulateHook<T> {
    /// Appends each tap's output to `initial`, in order.
    pub async fn call(&self, initial: Vec<T>, args: Value) -> AppResult<Vec<T>> {
        let seed = initial
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let items = dispatcher::accumulate(&self.name, &self.taps, seed, &args).await?;
        items.into_iter().map(|item| decode(&self.name, item)).collect()
    }

    /// Collects the taps' outputs starting from an empty list.
    pub async fn collect(&self, args: Value) -> AppResult<Vec<T>> {
        self.call(Vec::new(), args).await
    }
}

/// A hook whose handlers are told about a subject and return nothing useful.
pub struct NotifyHook<T> {
    name: String,
    taps: TapList,
    _marker: PhantomData<fn() -> T>,
}

hook_object!(NotifyHook, HookKind::Notify);

impl<T: Serialize> NotifyHook<T> {
    /// Runs every tap in order with the same subject.
    pub async fn call(&self, subject: &T, args: Value) -> AppResult<()> {
        let subject = serde_json::to_value(subject)?;
        dispatcher::notify(&self.name, &self.taps, &subject, &args).await
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::traits::handler_fn;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Banner {
        text: String,
    }

    #[tokio::test]
    async fn test_typed_transform() {
        let hook: TransformHook<Banner> = TransformHook::new("banner");
        hook.bind(HookTap::new(
            "upper",
            handler_fn(|mut v, _| async move {
                let text = v["text"].as_str().unwrap_or_default().to_uppercase();
                v["text"] = json!(text);
                Ok(v)
            }),
        ))
        .await;
        hook.bind(HookTap::new(
            "suffix",
            handler_fn(|mut v, args| async move {
                let text = format!("{}{}", v["text"].as_str().unwrap_or_default(), args["suffix"].as_str().unwrap_or_default());
                v["text"] = json!(text);
                Ok(v)
            }),
        ))
        .await;

        let out = hook
            .call(Banner { text: "hi".into() }, json!({"suffix": "!"}))
            .await
            .unwrap();
        assert_eq!(out, Banner { text: "HI!".into() });
    }

    #[tokio::test]
    async fn test_wrong_shape_is_a_hook_error() {
        let hook: TransformHook<Banner> = TransformHook::new("banner");
        hook.bind(HookTap::new("broken", handler_fn(|_, _| async move { Ok(json!(42)) })))
            .await;

        let err = hook.call(Banner { text: "x".into() }, Value::Null).await.unwrap_err();
        assert_eq!(err.kind, kiln_core::ErrorKind::Hook);
        assert!(err.message.contains("banner"));
    }

    #[tokio::test]
    async fn test_accumulate_preserves_order() {
        let hook: AccumulateHook<String> = AccumulateHook::new("names");
        hook.bind(HookTap::new("a", handler_fn(|_, _| async move { Ok(json!("a")) })))
            .await;
        hook.bind(HookTap::new("b", handler_fn(|_, _| async move { Ok(json!("b")) })))
            .await;

        assert_eq!(hook.collect(Value::Null).await.unwrap(), vec!["a", "b"]);
        assert_eq!(
            hook.call(vec!["seed".to_string()], Value::Null).await.unwrap(),
            vec!["seed", "a", "b"]
        );
    }

    #[tokio::test]
    async fn test_binder_reports_kind() {
        assert_eq!(TransformHook::<Value>::new("t").binder().kind(), HookKind::Transform);
        assert_eq!(AccumulateHook::<Value>::new("a").binder().kind(), HookKind::Accumulate);
        assert_eq!(NotifyHook::<Value>::new("n").binder().kind(), HookKind::Notify);
    }
}
