#![forbid(unsafe_code)]

//! Prop-diff interceptors: the extension point for auxiliary subsystems.
//!
//! An animation layer, for example, may know that a large payload prop only
//! needs re-sending when a small token prop changes. Rather than teaching the
//! reconciler about every such subsystem, subsystems register a
//! [`PropDiffInterceptor`] with the [`ExtensionRegistry`] and get a chance to
//! shrink each computed [`PropPatch`] before it is batched.
//!
//! # Contract
//!
//! Interceptors filter; they never invent data. After each interceptor runs
//! its output is checked against the node's new props:
//!
//! - every `Set(k, v)` entry must have `k` present in the new (non-handler)
//!   props with exactly the value `v`;
//! - every `Removed` entry must name a key absent from the new props.
//!
//! A patch violating this is a programming error in the interceptor. Its
//! mutation is discarded, the patch as it stood before that interceptor is
//! kept, and a warning is logged.
//!
//! # Registration
//!
//! Registration is append-only and lives as long as the registry. Interceptors
//! run in registration order. Registering the same interceptor twice runs it
//! twice; avoiding that is the caller's job.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use dcf_core::value::{PropMap, PropValue};

use crate::prop_diff::{PatchValue, PropPatch};

/// Hook that may rewrite a node's prop patch.
pub trait PropDiffInterceptor {
    /// Name used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this interceptor applies to the node.
    fn should_handle(&self, element_type: &str, old_props: &PropMap, new_props: &PropMap)
    -> bool;

    /// Rewrite the patch. Typically removes entries.
    fn intercept(
        &self,
        element_type: &str,
        old_props: &PropMap,
        new_props: &PropMap,
        patch: PropPatch,
    ) -> PropPatch;
}

/// Process-scoped registry of prop-diff interceptors.
///
/// Construct one at startup and share it (`Rc<ExtensionRegistry>`) with the
/// reconciler. Independent registries can coexist, which keeps tests isolated.
#[derive(Default)]
pub struct ExtensionRegistry {
    interceptors: RefCell<Vec<Rc<dyn PropDiffInterceptor>>>,
    rejected: Cell<u64>,
}

impl ExtensionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interceptor. There is no unregistration path.
    pub fn register_prop_diff_interceptor(&self, interceptor: impl PropDiffInterceptor + 'static) {
        self.interceptors.borrow_mut().push(Rc::new(interceptor));
    }

    /// Number of registered interceptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.borrow().len()
    }

    /// Whether no interceptor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.borrow().is_empty()
    }

    /// Number of interceptor mutations discarded for breaking the contract.
    #[must_use]
    pub fn rejected_count(&self) -> u64 {
        self.rejected.get()
    }

    /// Run every matching interceptor over `patch`, in registration order.
    #[must_use]
    pub fn apply(
        &self,
        element_type: &str,
        old_props: &PropMap,
        new_props: &PropMap,
        patch: PropPatch,
    ) -> PropPatch {
        // Snapshot so an interceptor registering another one cannot alias the borrow.
        let interceptors: Vec<_> = self.interceptors.borrow().iter().cloned().collect();
        let mut patch = patch;
        for interceptor in interceptors {
            if !interceptor.should_handle(element_type, old_props, new_props) {
                continue;
            }
            let candidate =
                interceptor.intercept(element_type, old_props, new_props, patch.clone());
            match validate(&candidate, new_props) {
                Ok(()) => patch = candidate,
                Err(key) => {
                    self.rejected.set(self.rejected.get() + 1);
                    tracing::warn!(
                        interceptor = interceptor.name(),
                        element_type,
                        key = %key,
                        "interceptor produced a patch entry not derivable from new props; discarding its mutation"
                    );
                }
            }
        }
        patch
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("interceptors", &self.len())
            .field("rejected", &self.rejected.get())
            .finish()
    }
}

/// Check the "filter, don't invent" contract. Returns the offending key.
fn validate(patch: &PropPatch, new_props: &PropMap) -> Result<(), String> {
    for (key, entry) in patch.iter() {
        let current = new_props.get(key).filter(|v| !v.is_handler());
        let ok = match (entry, current) {
            (PatchValue::Set(value), Some(current)) => value == current,
            (PatchValue::Set(_), None) => false,
            (PatchValue::Removed, current) => current.is_none(),
        };
        if !ok {
            return Err(key.to_owned());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// IdentityTokenInterceptor
// ---------------------------------------------------------------------------

/// Suppresses payload props while a derived token prop is unchanged.
///
/// Animation configurations and shader sources are large; their owners attach
/// a small token (a hash or version) next to them. When the token is equal on
/// both renders, the payload keys are dropped from the patch even if the
/// payload values compare unequal (e.g. rebuilt closures serialized
/// differently).
#[derive(Debug, Clone)]
pub struct IdentityTokenInterceptor {
    element_types: Vec<String>,
    token_key: String,
    payload_keys: Vec<String>,
}

impl IdentityTokenInterceptor {
    /// Suppress `payload_keys` while `token_key` is unchanged.
    pub fn new(
        token_key: impl Into<String>,
        payload_keys: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            element_types: Vec::new(),
            token_key: token_key.into(),
            payload_keys: payload_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Restrict to these element types (default: all).
    #[must_use]
    pub fn for_element_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.element_types = types.into_iter().map(Into::into).collect();
        self
    }

    fn token<'a>(&self, props: &'a PropMap) -> Option<&'a PropValue> {
        props.get(&self.token_key).filter(|v| !v.is_handler())
    }
}

impl PropDiffInterceptor for IdentityTokenInterceptor {
    fn name(&self) -> &str {
        "identity-token"
    }

    fn should_handle(&self, element_type: &str, old_props: &PropMap, new_props: &PropMap) -> bool {
        let type_matches =
            self.element_types.is_empty() || self.element_types.iter().any(|t| t == element_type);
        type_matches && self.token(old_props).is_some() && self.token(new_props).is_some()
    }

    fn intercept(
        &self,
        _element_type: &str,
        old_props: &PropMap,
        new_props: &PropMap,
        mut patch: PropPatch,
    ) -> PropPatch {
        if self.token(old_props) == self.token(new_props) {
            patch.retain(|key, entry| {
                !(matches!(entry, PatchValue::Set(_)) && self.payload_keys.iter().any(|k| k == key))
            });
        }
        patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prop_diff::diff;

    fn props(entries: &[(&str, PropValue)]) -> PropMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    struct DropKey(&'static str);

    impl PropDiffInterceptor for DropKey {
        fn should_handle(&self, _: &str, _: &PropMap, _: &PropMap) -> bool {
            true
        }

        fn intercept(&self, _: &str, _: &PropMap, _: &PropMap, mut patch: PropPatch) -> PropPatch {
            patch.suppress(self.0);
            patch
        }
    }

    struct Inventor;

    impl PropDiffInterceptor for Inventor {
        fn should_handle(&self, _: &str, _: &PropMap, _: &PropMap) -> bool {
            true
        }

        fn intercept(&self, _: &str, _: &PropMap, _: &PropMap, mut patch: PropPatch) -> PropPatch {
            patch.set("invented", PropValue::Bool(true));
            patch
        }
    }

    struct OnlyFor(&'static str);

    impl PropDiffInterceptor for OnlyFor {
        fn should_handle(&self, element_type: &str, _: &PropMap, _: &PropMap) -> bool {
            element_type == self.0
        }

        fn intercept(&self, _: &str, _: &PropMap, _: &PropMap, _: PropPatch) -> PropPatch {
            PropPatch::new()
        }
    }

    #[test]
    fn interceptors_run_in_order_and_filter() {
        let registry = ExtensionRegistry::new();
        registry.register_prop_diff_interceptor(DropKey("a"));
        registry.register_prop_diff_interceptor(DropKey("b"));
        assert_eq!(registry.len(), 2);

        let old = PropMap::new();
        let new = props(&[("a", 1.into()), ("b", 2.into()), ("c", 3.into())]);
        let patch = registry.apply("View", &old, &new, diff(&old, &new));
        assert_eq!(patch.keys().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(registry.rejected_count(), 0);
    }

    #[test]
    fn inventing_keys_is_discarded() {
        let registry = ExtensionRegistry::new();
        registry.register_prop_diff_interceptor(Inventor);
        registry.register_prop_diff_interceptor(DropKey("a"));

        let old = PropMap::new();
        let new = props(&[("a", 1.into()), ("b", 2.into())]);
        let patch = registry.apply("View", &old, &new, diff(&old, &new));
        // Inventor's mutation discarded, DropKey still applied.
        assert_eq!(patch.keys().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(registry.rejected_count(), 1);
    }

    #[test]
    fn altering_values_is_discarded() {
        struct Rewrite;
        impl PropDiffInterceptor for Rewrite {
            fn should_handle(&self, _: &str, _: &PropMap, _: &PropMap) -> bool {
                true
            }
            fn intercept(&self, _: &str, _: &PropMap, _: &PropMap, mut p: PropPatch) -> PropPatch {
                p.set("a", PropValue::Int(99));
                p
            }
        }

        let registry = ExtensionRegistry::new();
        registry.register_prop_diff_interceptor(Rewrite);
        let old = PropMap::new();
        let new = props(&[("a", 1.into())]);
        let patch = registry.apply("View", &old, &new, diff(&old, &new));
        assert_eq!(patch.get("a"), Some(&PatchValue::Set(PropValue::Int(1))));
        assert_eq!(registry.rejected_count(), 1);
    }

    #[test]
    fn predicate_gates_interception() {
        let registry = ExtensionRegistry::new();
        registry.register_prop_diff_interceptor(OnlyFor("Canvas"));
        let old = PropMap::new();
        let new = props(&[("a", 1.into())]);
        assert_eq!(registry.apply("View", &old, &new, diff(&old, &new)).len(), 1);
        assert!(registry.apply("Canvas", &old, &new, diff(&old, &new)).is_empty());
    }

    #[test]
    fn identity_token_suppresses_payload() {
        let registry = ExtensionRegistry::new();
        registry.register_prop_diff_interceptor(
            IdentityTokenInterceptor::new("workletHash", ["worklet"])
                .for_element_types(["AnimatedView"]),
        );

        let old = props(&[
            ("workletHash", "h1".into()),
            ("worklet", "big-v1".into()),
            ("opacity", 0.5.into()),
        ]);
        let same_token = props(&[
            ("workletHash", "h1".into()),
            ("worklet", "big-v1-rebuilt".into()),
            ("opacity", 1.0.into()),
        ]);
        let patch = registry.apply("AnimatedView", &old, &same_token, diff(&old, &same_token));
        assert_eq!(patch.keys().collect::<Vec<_>>(), vec!["opacity"]);

        let new_token = props(&[
            ("workletHash", "h2".into()),
            ("worklet", "big-v2".into()),
            ("opacity", 0.5.into()),
        ]);
        let patch = registry.apply("AnimatedView", &old, &new_token, diff(&old, &new_token));
        assert_eq!(
            patch.keys().collect::<Vec<_>>(),
            vec!["worklet", "workletHash"]
        );

        // Other element types are untouched.
        let patch = registry.apply("View", &old, &same_token, diff(&old, &same_token));
        assert!(patch.contains_key("worklet"));
        assert_eq!(registry.rejected_count(), 0);
    }
}
