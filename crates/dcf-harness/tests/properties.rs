#![forbid(unsafe_code)]

//! Integration tests: property-based checks of the native tree after
//! arbitrary render sequences.

use std::collections::HashMap;

use dcf_core::identity::ViewId;
use dcf_core::node::ComponentNode;
use dcf_harness::fixtures::{key_order, keyed_list, prop_map, runtime};
use dcf_harness::{NativeTree, OpKind};
use dcf_render::prop_diff::wire_props;
use proptest::prelude::*;

const POOL: &[&str] = &["a", "b", "c", "d", "e", "f"];
const LIST: ViewId = ViewId::new(1);

fn contents(tree: &NativeTree, parent: ViewId) -> Vec<String> {
    tree.children(parent)
        .iter()
        .filter_map(|id| tree.view(*id)?.props.get("content")?.as_str().map(str::to_owned))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn keyed_children_track_render_order(orders in prop::collection::vec(key_order(POOL), 1..5)) {
        let mut rt = runtime();
        let mut ids: HashMap<String, ViewId> = HashMap::new();

        for order in &orders {
            prop_assert!(rt.render(&keyed_list(order)).is_ok());
            let tree = rt.bridge().tree();
            prop_assert!(tree.verify().is_ok());
            prop_assert!(tree.detached().is_empty());
            prop_assert_eq!(contents(tree, LIST), order.clone());

            let mut next = HashMap::new();
            for (key, view) in order.iter().zip(tree.children(LIST)) {
                if let Some(previous) = ids.get(*key) {
                    prop_assert_eq!(previous, view, "key {} changed identity", key);
                }
                next.insert((*key).to_owned(), *view);
            }
            ids = next;
        }
    }

    #[test]
    fn native_props_converge_to_last_render(maps in prop::collection::vec(prop_map(), 1..6)) {
        let mut rt = runtime();
        for map in &maps {
            prop_assert!(rt.render(&ComponentNode::element("View").props(map.clone())).is_ok());
            let view = rt.bridge().tree().view(LIST).cloned().unwrap_or_default();
            prop_assert_eq!(view.props, wire_props(map));
        }
        prop_assert_eq!(rt.bridge().count(OpKind::CreateView), 1);
        prop_assert_eq!(rt.bridge().count(OpKind::DeleteView), 0);
    }

    #[test]
    fn rerendering_the_same_props_is_silent(map in prop_map()) {
        let mut rt = runtime();
        let node = ComponentNode::element("View").props(map);
        prop_assert!(rt.render(&node).is_ok());
        let batches = rt.bridge().batch_count();
        let outcome = rt.render(&node);
        prop_assert!(outcome.is_ok());
        prop_assert_eq!(rt.bridge().batch_count(), batches);
    }

    #[test]
    fn unmount_always_empties_the_tree(order in key_order(POOL)) {
        let mut rt = runtime();
        prop_assert!(rt.render(&keyed_list(&order)).is_ok());
        prop_assert!(rt.unmount().is_ok());
        prop_assert!(rt.bridge().tree().is_empty());
        prop_assert_eq!(
            rt.bridge().count(OpKind::DeleteView),
            rt.bridge().count(OpKind::CreateView)
        );
    }
}
