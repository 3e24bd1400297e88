use std::fmt;

use serde::Serialize;

/// Marker attribute used to hand an XPath match over to a CSS lookup.
pub(crate) const TARGET_ATTRIBUTE: &str = "data-storecheck-target";

/// How an element is addressed on the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    Css(String),
    XPath(String),
    Tag(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Locator::Tag(name.into())
    }

    /// Reads a selector from configuration: XPath when it starts like one,
    /// CSS otherwise.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('/') || trimmed.starts_with("(/") {
            Locator::XPath(trimmed.to_string())
        } else {
            Locator::Css(trimmed.to_string())
        }
    }

    /// CSS selector for locators that have one without a round trip.
    pub fn as_css(&self) -> Option<&str> {
        match self {
            Locator::Css(selector) | Locator::Tag(selector) => Some(selector),
            Locator::XPath(_) => None,
        }
    }

    /// JS expression evaluating to an array of the matched nodes.
    pub(crate) fn nodes_script(&self) -> String {
        match self {
            Locator::Css(selector) | Locator::Tag(selector) => {
                format!("Array.from(document.querySelectorAll({}))", js_string(selector))
            }
            Locator::XPath(expression) => format!(
                "(() => {{
    const snapshot = document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    const nodes = [];
    for (let i = 0; i < snapshot.snapshotLength; i++) nodes.push(snapshot.snapshotItem(i));
    return nodes;
}})()",
                js_string(expression)
            ),
        }
    }

    pub(crate) fn count_script(&self) -> String {
        format!("({}).length", self.nodes_script())
    }

    pub(crate) fn texts_script(&self) -> String {
        format!(
            "({}).map(node => (node.innerText || node.textContent || '').trim())",
            self.nodes_script()
        )
    }

    /// Tags the first match with [`TARGET_ATTRIBUTE`]; evaluates to `false`
    /// when nothing matched.
    pub(crate) fn mark_script(&self, marker: &str) -> String {
        format!(
            "(() => {{
    const node = ({})[0];
    if (!node) return false;
    node.setAttribute('{TARGET_ATTRIBUTE}', {});
    return true;
}})()",
            self.nodes_script(),
            js_string(marker)
        )
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css={selector}"),
            Locator::XPath(expression) => write!(f, "xpath={expression}"),
            Locator::Tag(name) => write!(f, "tag={name}"),
        }
    }
}

/// Result of a soft lookup: absence is an answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found { locator: Locator, count: usize },
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found { .. })
    }

    pub fn count(&self) -> usize {
        match self {
            Lookup::Found { count, .. } => *count,
            Lookup::NotFound => 0,
        }
    }

    pub fn locator(&self) -> Option<&Locator> {
        match self {
            Lookup::Found { locator, .. } => Some(locator),
            Lookup::NotFound => None,
        }
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
