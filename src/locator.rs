//! Finds the conversation's messages in a page, in on-screen order.

use crate::dom::{self, Element, Selector};
use crate::error::DiscoveryError;
use serde::{Deserialize, Serialize};

/// Who a message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Typed by the person using the chat.
    #[serde(rename = "user")]
    Submitted,
    /// Generated by the model.
    #[serde(rename = "assistant")]
    Produced,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Submitted => "User",
            Role::Produced => "Assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub type Located<'a> = Vec<(Role, &'a Element)>;

const MESSAGE_TAGS: &[Selector] = &[
    Selector::Tag("user-query"),
    Selector::Tag("model-response"),
    Selector::Tag("dual-model-response"),
];

const CONVERSATION_WRAPPERS: &[Selector] = &[Selector::Class("conversation-container")];

const ROLE_CONTAINERS: &[Selector] = &[
    Selector::Class("user-query-container"),
    Selector::Class("user-query-bubble-container"),
    Selector::Class("response-container"),
    Selector::ClassContains("user-query"),
    Selector::ClassContains("response"),
    Selector::AttrContains("data-role", ""),
];

/// One way of finding messages. Strategies run in [`STRATEGIES`] order and
/// the first one that finds anything wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// `<user-query>` / `<model-response>` custom elements.
    MessageTags,
    /// Class names and `data-role` hints inside conversation wrappers.
    RoleContainers,
}

pub const STRATEGIES: [Strategy; 2] = [Strategy::MessageTags, Strategy::RoleContainers];

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::MessageTags => "message-tags",
            Strategy::RoleContainers => "role-containers",
        }
    }

    /// `Ok(None)` when this strategy found nothing.
    pub fn run(self, root: &Element) -> Result<Option<Located<'_>>, DiscoveryError> {
        let found = match self {
            Strategy::MessageTags => dom::select_outermost(root, MESSAGE_TAGS)?
                .into_iter()
                .map(|el| (role_from_tag(el), el))
                .collect::<Vec<_>>(),
            Strategy::RoleContainers => role_containers(root)?,
        };
        Ok((!found.is_empty()).then_some(found))
    }
}

fn role_from_tag(el: &Element) -> Role {
    if el.tag() == "user-query" {
        Role::Submitted
    } else {
        Role::Produced
    }
}

fn role_containers(root: &Element) -> Result<Located<'_>, DiscoveryError> {
    let wrappers = dom::select_outermost(root, CONVERSATION_WRAPPERS)?;
    let scopes = if wrappers.is_empty() {
        vec![root]
    } else {
        wrappers
    };

    let mut found = Vec::new();
    for scope in scopes {
        for el in dom::select_outermost(scope, ROLE_CONTAINERS)? {
            found.push((classify(el), el));
        }
    }
    Ok(found)
}

/// Role from class-name or `data-role` hints; anything unrecognized is a
/// model response.
pub fn classify(el: &Element) -> Role {
    let class = el.attr("class").unwrap_or_default();
    let data_role = el.attr("data-role").unwrap_or_default();
    if class.contains("user") || class.contains("query") || data_role.contains("user") {
        Role::Submitted
    } else {
        Role::Produced
    }
}

/// Run the strategies in order; the first populated result wins.
pub fn find(root: &Element) -> Result<Option<(Strategy, Located<'_>)>, DiscoveryError> {
    for strategy in STRATEGIES {
        if let Some(found) = strategy.run(root)? {
            tracing::debug!(
                strategy = strategy.name(),
                count = found.len(),
                "located conversation elements"
            );
            return Ok(Some((strategy, found)));
        }
        tracing::debug!(strategy = strategy.name(), "strategy found nothing");
    }
    Ok(None)
}

/// The elements found by [`find`], or none when no strategy matched.
pub fn try_locate(root: &Element) -> Result<Located<'_>, DiscoveryError> {
    Ok(find(root)?.map(|(_, found)| found).unwrap_or_default())
}

/// Like [`try_locate`], but a failure is logged and yields no elements.
pub fn locate(root: &Element) -> Located<'_> {
    try_locate(root).unwrap_or_else(|e| {
        tracing::error!(error = %e, "conversation discovery failed");
        Vec::new()
    })
}

/// Match count for one of the selectors the extractor cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureCount {
    pub group: &'static str,
    pub selector: &'static str,
    pub count: usize,
}

const PROBES: &[(&str, &str, Selector)] = &[
    ("chat history", "#chat-history", Selector::AttrEquals("id", "chat-history")),
    (
        "chat history",
        ".chat-history-scroll-container",
        Selector::Class("chat-history-scroll-container"),
    ),
    ("chat history", ".chat-history", Selector::Class("chat-history")),
    ("user", "user-query", Selector::Tag("user-query")),
    ("user", ".user-query-container", Selector::Class("user-query-container")),
    (
        "user",
        ".user-query-bubble-container",
        Selector::Class("user-query-bubble-container"),
    ),
    ("response", "model-response", Selector::Tag("model-response")),
    ("response", "dual-model-response", Selector::Tag("dual-model-response")),
    ("response", ".response-container", Selector::Class("response-container")),
    (
        "conversation",
        ".conversation-container",
        Selector::Class("conversation-container"),
    ),
];

/// Count matches for each known page-structure selector.
pub fn inspect(root: &Element) -> Result<Vec<StructureCount>, DiscoveryError> {
    PROBES
        .iter()
        .map(|&(group, selector, probe)| {
            let count = dom::select_all(root, &[probe])?.len();
            Ok::<_, DiscoveryError>(StructureCount {
                group,
                selector,
                count,
            })
        })
        .collect()
}
