//! Render tree nodes.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt};

use crate::deferred::Deferred;
use crate::error::ComponentError;

/// Lazily evaluated component body.
pub type ComponentFn = Box<dyn FnOnce() -> Result<Node, ComponentError> + Send>;

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &["area", "br", "hr", "img", "input", "link", "meta", "source"];

/// One node of a render tree.
pub enum Node {
    /// Text content, escaped on output.
    Text(String),
    /// Trusted markup, written as is.
    Raw(String),
    /// An HTML element.
    Element(Element),
    /// A sequence of siblings.
    Fragment(Vec<Node>),
    /// A component evaluated at render time. May fail.
    Component(ComponentFn),
    /// Content that waits on pending data, with a fallback shown meanwhile.
    Suspense(Boundary),
}

impl Node {
    /// Escaped text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Trusted markup.
    pub fn raw(html: impl Into<String>) -> Self {
        Self::Raw(html.into())
    }

    /// Start building an element.
    pub fn element(tag: &'static str) -> Element {
        Element::new(tag)
    }

    /// Group siblings.
    pub fn fragment(children: impl IntoIterator<Item = Node>) -> Self {
        Self::Fragment(children.into_iter().collect())
    }

    /// An empty node.
    pub fn empty() -> Self {
        Self::Fragment(Vec::new())
    }

    /// A component evaluated when the renderer reaches it.
    pub fn component<F>(render: F) -> Self
    where
        F: FnOnce() -> Result<Node, ComponentError> + Send + 'static,
    {
        Self::Component(Box::new(render))
    }

    /// A suspense boundary: `fallback` goes into the shell, `content` streams in later.
    pub fn suspense<F>(fallback: Node, content: F) -> Self
    where
        F: Future<Output = Result<Node, ComponentError>> + Send + 'static,
    {
        Self::Suspense(Boundary {
            fallback: Box::new(fallback),
            content: content.boxed(),
        })
    }

    /// A boundary whose content is `render` applied to a deferred value.
    ///
    /// The deferred value is awaited by this boundary only.
    pub fn await_deferred<T, R>(deferred: Deferred<T>, fallback: Node, render: R) -> Self
    where
        T: Clone + Send + Sync + 'static,
        R: FnOnce(T) -> Node + Send + 'static,
    {
        Self::suspense(fallback, async move { deferred.await.map(render) })
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// An HTML element with attributes and children.
pub struct Element {
    pub(crate) tag: &'static str,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) children: Vec<Node>,
}

impl Element {
    /// Create an element.
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Add an attribute. Values are escaped on output.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Set the class attribute.
    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    /// Append a child.
    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append escaped text.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Node::text(text))
    }

    pub(crate) fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.tag)
    }
}

/// A suspense boundary.
pub struct Boundary {
    pub(crate) fallback: Box<Node>,
    pub(crate) content: BoxFuture<'static, Result<Node, ComponentError>>,
}

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
