//! Ownership of value trees.
//!
//! A tree is either owned by the holder of a [`Node::Owned`] or borrowed
//! from someone else through [`Node::Borrowed`]; only owned trees are ever
//! torn down. [`destroy`] releases a tree without recursing, so arbitrarily
//! deep host replies cannot overflow the stack when they are dropped.

use tracing::trace;

use crate::value::Value;

/// A value that is either owned here or borrowed from another tree.
#[derive(Debug)]
pub enum Node<'a> {
    Owned(Value),
    Borrowed(&'a Value),
}

impl<'a> Node<'a> {
    pub fn as_value(&self) -> &Value {
        match self {
            Node::Owned(value) => value,
            Node::Borrowed(value) => value,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Node::Owned(_))
    }

    /// An owned value, cloning a borrowed one.
    pub fn into_owned(self) -> Value {
        match self {
            Node::Owned(value) => value,
            Node::Borrowed(value) => value.clone(),
        }
    }

    /// Tear down an owned tree; a borrowed one is left alone.
    ///
    /// Returns the number of nodes released.
    pub fn release(self) -> usize {
        match self {
            Node::Owned(value) => destroy(value),
            Node::Borrowed(_) => 0,
        }
    }
}

impl From<Value> for Node<'static> {
    fn from(value: Value) -> Self {
        Node::Owned(value)
    }
}

impl<'a> From<&'a Value> for Node<'a> {
    fn from(value: &'a Value) -> Self {
        Node::Borrowed(value)
    }
}

/// Release a value tree, returning the number of nodes released.
///
/// Containers are emptied as they are visited, so every node is dropped
/// as a leaf, in reverse visitation order.
pub fn destroy(root: Value) -> usize {
    let mut work = vec![root];
    let mut visited = Vec::new();

    while let Some(mut node) = work.pop() {
        match &mut node {
            Value::Array(items) => work.append(items),
            Value::Map(entries) => {
                for (key, value) in entries.drain(..) {
                    work.push(key);
                    work.push(value);
                }
            }
            _ => {}
        }
        visited.push(node);
    }

    let released = visited.len();
    while let Some(node) = visited.pop() {
        drop(node);
    }
    trace!(released, "destroyed value tree");
    released
}
