#![forbid(unsafe_code)]

//! Component/element descriptors produced by one render pass.
//!
//! A [`ComponentNode`] is immutable once built: builder methods consume and
//! return the node, and nothing in the reconciler mutates a node it has been
//! handed. The reconciler keeps its own mounted state instead.
//!
//! # Variants
//!
//! | Kind | Native view | Children come from |
//! |------|-------------|--------------------|
//! | `Element` | yes | `children` |
//! | `Component` (stateful/stateless) | no | `render(props)` |
//! | `Fragment` | no | `children` |
//! | `Portal` | no | `children`, placed into a named target |
//!
//! # Invariants
//!
//! 1. `event_types` is exactly the set of prop keys whose value is a
//!    [`Handler`]; every prop mutation recomputes it.
//! 2. `children` order is the native sibling order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::identity::ChildKey;
use crate::value::{Handler, PropMap, PropValue};

/// Render function of a composition node.
pub type RenderFn = Rc<dyn Fn(&PropMap) -> ComponentNode>;

/// Stateful components can schedule their own re-render; stateless ones only
/// re-render when their parent does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Holds state and may be marked dirty independently.
    Stateful,
    /// Pure function of props.
    Stateless,
}

/// The variant part of a node.
#[derive(Clone)]
pub enum NodeKind {
    /// Maps to one native view.
    Element {
        /// Native component kind.
        element_type: String,
        /// When set, this element's view is the named portal target.
        portal_host: Option<String>,
    },
    /// Composition node rendering to a single child.
    Component {
        /// Component name (type tag).
        name: String,
        /// Stateful or stateless.
        kind: ComponentKind,
        /// Render function.
        render: RenderFn,
    },
    /// Groups children without a native view.
    Fragment,
    /// Renders its children into a named target container.
    Portal {
        /// Name of the target container.
        target: String,
    },
}

impl NodeKind {
    /// Tag used for positional identity matching.
    #[must_use]
    pub fn type_tag(&self) -> String {
        match self {
            Self::Element { element_type, .. } => element_type.clone(),
            Self::Component { name, .. } => name.clone(),
            Self::Fragment => "#fragment".to_owned(),
            Self::Portal { target } => format!("#portal:{target}"),
        }
    }

    /// Whether an old node of this kind can be updated in place to `other`.
    ///
    /// Elements must share an element type; composition nodes must be of the
    /// same kind (same component name and statefulness, same portal target).
    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Element {
                    element_type: a, ..
                },
                Self::Element {
                    element_type: b, ..
                },
            ) => a == b,
            (
                Self::Component {
                    name: a, kind: ka, ..
                },
                Self::Component {
                    name: b, kind: kb, ..
                },
            ) => a == b && ka == kb,
            (Self::Fragment, Self::Fragment) => true,
            (Self::Portal { target: a }, Self::Portal { target: b }) => a == b,
            _ => false,
        }
    }

    /// Whether nodes of this kind own a native view.
    #[inline]
    #[must_use]
    pub const fn is_element(&self) -> bool {
        matches!(self, Self::Element { .. })
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element {
                element_type,
                portal_host,
            } => f
                .debug_struct("Element")
                .field("element_type", element_type)
                .field("portal_host", portal_host)
                .finish(),
            Self::Component { name, kind, .. } => f
                .debug_struct("Component")
                .field("name", name)
                .field("kind", kind)
                .finish_non_exhaustive(),
            Self::Fragment => f.write_str("Fragment"),
            Self::Portal { target } => f.debug_struct("Portal").field("target", target).finish(),
        }
    }
}

/// One node of a render pass's output tree.
#[derive(Clone, Debug)]
pub struct ComponentNode {
    kind: NodeKind,
    key: Option<String>,
    props: PropMap,
    event_types: BTreeSet<String>,
    children: Vec<ComponentNode>,
}

impl ComponentNode {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            key: None,
            props: PropMap::new(),
            event_types: BTreeSet::new(),
            children: Vec::new(),
        }
    }

    /// A native element of the given type.
    pub fn element(element_type: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Element {
            element_type: element_type.into(),
            portal_host: None,
        })
    }

    /// A stateless component.
    pub fn stateless(
        name: impl Into<String>,
        render: impl Fn(&PropMap) -> ComponentNode + 'static,
    ) -> Self {
        Self::with_kind(NodeKind::Component {
            name: name.into(),
            kind: ComponentKind::Stateless,
            render: Rc::new(render),
        })
    }

    /// A stateful component. State lives in whatever `render` captures.
    pub fn stateful(
        name: impl Into<String>,
        render: impl Fn(&PropMap) -> ComponentNode + 'static,
    ) -> Self {
        Self::with_kind(NodeKind::Component {
            name: name.into(),
            kind: ComponentKind::Stateful,
            render: Rc::new(render),
        })
    }

    /// A fragment grouping `children`.
    pub fn fragment(children: impl IntoIterator<Item = ComponentNode>) -> Self {
        Self::with_kind(NodeKind::Fragment).children(children)
    }

    /// A portal rendering `children` into the container named `target`.
    pub fn portal(
        target: impl Into<String>,
        children: impl IntoIterator<Item = ComponentNode>,
    ) -> Self {
        Self::with_kind(NodeKind::Portal {
            target: target.into(),
        })
        .children(children)
    }

    /// Set the explicit sibling key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set one prop.
    #[must_use]
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        let key = key.into();
        let value = value.into();
        if value.is_handler() {
            self.event_types.insert(key.clone());
        } else {
            self.event_types.remove(&key);
        }
        self.props.insert(key, value);
        self
    }

    /// Bind an event handler under `event`.
    #[must_use]
    pub fn on(self, event: impl Into<String>, handler: Handler) -> Self {
        self.prop(event, PropValue::Handler(handler))
    }

    /// Replace all props.
    #[must_use]
    pub fn props(mut self, props: PropMap) -> Self {
        self.event_types = derive_event_types(&props);
        self.props = props;
        self
    }

    /// Append one child.
    #[must_use]
    pub fn child(mut self, child: ComponentNode) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children.
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = ComponentNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Mark an element as the named portal target.
    ///
    /// Has no effect on non-element nodes.
    #[must_use]
    pub fn portal_host(mut self, name: impl Into<String>) -> Self {
        if let NodeKind::Element { portal_host, .. } = &mut self.kind {
            *portal_host = Some(name.into());
        }
        self
    }

    /// Variant of this node.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Explicit sibling key, if any.
    #[must_use]
    pub fn key_str(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Native element type, for element nodes.
    #[must_use]
    pub fn element_type(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { element_type, .. } => Some(element_type),
            _ => None,
        }
    }

    /// Prop map.
    #[must_use]
    pub fn prop_map(&self) -> &PropMap {
        &self.props
    }

    /// Prop keys bound to handlers.
    #[must_use]
    pub fn event_types(&self) -> &BTreeSet<String> {
        &self.event_types
    }

    /// Child nodes (empty for components; see [`render`](Self::render)).
    #[must_use]
    pub fn child_nodes(&self) -> &[ComponentNode] {
        &self.children
    }

    /// Run a component's render function against its props.
    ///
    /// Returns `None` for non-component nodes.
    #[must_use]
    pub fn render(&self) -> Option<ComponentNode> {
        match &self.kind {
            NodeKind::Component { render, .. } => Some(render(&self.props)),
            _ => None,
        }
    }

    /// Copy of this node without its children.
    ///
    /// The reconciler keeps these as mounted state; children are tracked
    /// separately by identity.
    #[must_use]
    pub fn shallow_clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            key: self.key.clone(),
            props: self.props.clone(),
            event_types: self.event_types.clone(),
            children: Vec::new(),
        }
    }

    /// Portal target name hosted by this element, if any.
    #[must_use]
    pub fn hosted_portal(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { portal_host, .. } => portal_host.as_deref(),
            _ => None,
        }
    }

    /// Whether this is a stateful component.
    #[must_use]
    pub fn is_stateful(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Component {
                kind: ComponentKind::Stateful,
                ..
            }
        )
    }
}

/// Prop keys whose value is a handler.
#[must_use]
pub fn derive_event_types(props: &PropMap) -> BTreeSet<String> {
    props
        .iter()
        .filter(|(_, v)| v.is_handler())
        .map(|(k, _)| k.clone())
        .collect()
}

/// Compute sibling keys for a child list.
///
/// Duplicate explicit keys are not unique identities; every occurrence after
/// the first falls back to positional matching. The second element of each
/// pair flags such a duplicate.
#[must_use]
pub fn child_keys(children: &[ComponentNode]) -> Vec<(ChildKey, bool)> {
    let mut seen_keys = BTreeSet::new();
    let mut ordinals: BTreeMap<String, usize> = BTreeMap::new();
    children
        .iter()
        .map(|child| {
            let duplicate = match child.key_str() {
                Some(key) if seen_keys.insert(key.to_owned()) => {
                    return (ChildKey::Keyed(key.to_owned()), false);
                }
                Some(_) => true,
                None => false,
            };
            let type_tag = child.kind.type_tag();
            let ordinal = ordinals.entry(type_tag.clone()).or_insert(0);
            let index = *ordinal;
            *ordinal += 1;
            (ChildKey::Positional { type_tag, index }, duplicate)
        })
        .collect()
}
