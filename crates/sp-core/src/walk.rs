//! Iterative traversal kernel.
//!
//! Both primitives keep their own work stack, so input depth never grows the
//! native call stack. Cycles are detected against the current root-to-node
//! path only: a node reachable through two different parents is fine, a node
//! that is its own ancestor fails with [`RecodeError::CircularReference`].

use std::collections::HashSet;

use crate::error::{RecodeError, Result};
use crate::value::{Map, Value};

/// The set of composite nodes on the current root-to-node path.
#[derive(Debug, Default)]
pub struct AncestorPath {
    on_path: HashSet<usize>,
}

impl AncestorPath {
    pub fn enter(&mut self, id: usize) -> Result<()> {
        if self.on_path.insert(id) {
            Ok(())
        } else {
            Err(RecodeError::CircularReference)
        }
    }

    pub fn leave(&mut self, id: usize) {
        self.on_path.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.on_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.on_path.is_empty()
    }
}

/// One step of a depth-first walk.
#[derive(Debug)]
pub enum Event<'a> {
    /// An array or object, before its children.
    Enter { value: &'a Value, depth: usize },
    /// An object key, immediately before the value it labels.
    Key { key: &'a str, depth: usize },
    Leaf { value: &'a Value, depth: usize },
    /// An array or object, after its children.
    Exit { value: &'a Value, depth: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Break,
}

enum Frame {
    Visit(Value, usize),
    Key(String, usize),
    Exit(Value, usize),
}

/// Depth-first, pre-order walk. The visitor can stop early with [`Control::Break`].
pub fn walk<F>(root: &Value, mut visit: F) -> Result<()>
where
    F: FnMut(Event<'_>) -> Result<Control>,
{
    let mut path = AncestorPath::default();
    let mut stack = vec![Frame::Visit(root.clone(), 0)];

    while let Some(frame) = stack.pop() {
        let flow = match frame {
            Frame::Visit(value, depth) => match &value {
                Value::Array(node) => {
                    path.enter(node.id())?;
                    let flow = visit(Event::Enter { value: &value, depth })?;
                    let items = node.read().clone();
                    stack.push(Frame::Exit(value.clone(), depth));
                    stack.extend(items.into_iter().rev().map(|item| Frame::Visit(item, depth + 1)));
                    flow
                }
                Value::Object(node) => {
                    path.enter(node.id())?;
                    let flow = visit(Event::Enter { value: &value, depth })?;
                    let map = node.read().clone();
                    stack.push(Frame::Exit(value.clone(), depth));
                    let entries: Vec<(String, Value)> = map.into_iter().collect();
                    for (key, child) in entries.into_iter().rev() {
                        stack.push(Frame::Visit(child, depth + 1));
                        stack.push(Frame::Key(key, depth + 1));
                    }
                    flow
                }
                _ => visit(Event::Leaf { value: &value, depth })?,
            },
            Frame::Key(key, depth) => visit(Event::Key { key: &key, depth })?,
            Frame::Exit(value, depth) => {
                if let Some(id) = value.node_id() {
                    path.leave(id);
                }
                visit(Event::Exit { value: &value, depth })?
            }
        };
        if flow == Control::Break {
            break;
        }
    }
    Ok(())
}

/// Hooks for [`rebuild`]. Every default reproduces the input structure.
pub trait Rebuild {
    /// Called for every value before it is visited. `Some` is used verbatim
    /// and the original subtree is not descended into.
    fn replace(&mut self, value: &Value) -> Result<Option<Value>> {
        let _ = value;
        Ok(None)
    }

    fn key(&mut self, key: &str) -> Result<String> {
        Ok(key.to_owned())
    }

    fn leaf(&mut self, value: &Value) -> Result<Value> {
        Ok(value.clone())
    }

    /// Receives the already rebuilt children.
    fn finish_array(&mut self, items: Vec<Value>) -> Result<Value> {
        Ok(Value::array(items))
    }

    /// Receives the already rebuilt entries, keys passed through [`Rebuild::key`].
    fn finish_object(&mut self, map: Map) -> Result<Value> {
        Ok(Value::object(map))
    }
}

enum Task {
    Visit(Value),
    FinishArray { id: usize, len: usize },
    FinishObject { id: usize, keys: Vec<String> },
}

/// Rebuild `root` into fresh composites, post-order, through `hooks`.
pub fn rebuild<R: Rebuild + ?Sized>(root: &Value, hooks: &mut R) -> Result<Value> {
    let mut path = AncestorPath::default();
    let mut tasks = vec![Task::Visit(root.clone())];
    let mut built: Vec<Value> = Vec::new();

    while let Some(task) = tasks.pop() {
        match task {
            Task::Visit(value) => {
                if let Some(replacement) = hooks.replace(&value)? {
                    built.push(replacement);
                    continue;
                }
                match &value {
                    Value::Array(node) => {
                        path.enter(node.id())?;
                        let items = node.read().clone();
                        tasks.push(Task::FinishArray { id: node.id(), len: items.len() });
                        tasks.extend(items.into_iter().rev().map(Task::Visit));
                    }
                    Value::Object(node) => {
                        path.enter(node.id())?;
                        let map = node.read().clone();
                        let mut keys = Vec::with_capacity(map.len());
                        let mut children = Vec::with_capacity(map.len());
                        for (key, child) in map {
                            keys.push(hooks.key(&key)?);
                            children.push(child);
                        }
                        tasks.push(Task::FinishObject { id: node.id(), keys });
                        tasks.extend(children.into_iter().rev().map(Task::Visit));
                    }
                    leaf => built.push(hooks.leaf(leaf)?),
                }
            }
            Task::FinishArray { id, len } => {
                path.leave(id);
                let items = built.split_off(built.len() - len);
                built.push(hooks.finish_array(items)?);
            }
            Task::FinishObject { id, keys } => {
                path.leave(id);
                let values = built.split_off(built.len() - keys.len());
                let map: Map = keys.into_iter().zip(values).collect();
                built.push(hooks.finish_object(map)?);
            }
        }
    }

    debug_assert_eq!(built.len(), 1);
    Ok(built.pop().unwrap_or(Value::Null))
}

/// Rebuild with default hooks.
pub struct DeepCopy;

impl Rebuild for DeepCopy {}

pub fn deep_clone(value: &Value) -> Result<Value> {
    rebuild(value, &mut DeepCopy)
}
