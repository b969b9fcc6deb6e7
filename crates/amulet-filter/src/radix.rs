//! Compressed radix tree over string keys.
//!
//! Keys inserted by the filter store are reverse-labeled domains
//! (`ads.example.com` → `com.example.ads`), which turns the DNS
//! suffix-containment test into a prefix test: one entry for `com.example`
//! covers every name under `example.com`.
//!
//! Edges are arbitrary-length strings; among the children of any node, no
//! two edges share a nonempty prefix. A node is terminal iff it carries a
//! value.

use compact_str::CompactString;
use hashbrown::HashMap;

#[derive(Debug, Clone)]
struct Node<V> {
    children: HashMap<CompactString, Node<V>>,
    value: Option<V>,
}

impl<V> Node<V> {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            value: None,
        }
    }
}

/// A radix tree mapping string keys to values.
#[derive(Debug, Clone)]
pub struct RadixTree<V> {
    root: Node<V>,
    len: usize,
}

impl<V> Default for RadixTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RadixTree<V> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            root: Node::new(),
            len: 0,
        }
    }

    /// Number of terminal entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a key, overwriting the value on re-insertion.
    ///
    /// Descends matching existing edges; an edge sharing only part of its
    /// label with the remaining key is split at the shared length, with a
    /// new intermediate node inheriting the old child.
    pub fn insert(&mut self, key: &str, value: V) {
        let mut node = &mut self.root;
        let mut rest = key;

        while !rest.is_empty() {
            let matched = node.children.keys().find_map(|edge| {
                let common = common_prefix_len(edge, rest);
                (common > 0).then(|| (edge.clone(), common))
            });

            match matched {
                Some((edge, common)) if common < edge.len() => {
                    // Split the edge at the shared prefix
                    let (shared, remainder) = edge.as_str().split_at(common);
                    if let Some(child) = node.children.remove(edge.as_str()) {
                        let mut mid = Node::new();
                        mid.children.insert(CompactString::from(remainder), child);
                        node.children.insert(CompactString::from(shared), mid);
                    }
                    node = match node.children.get_mut(shared) {
                        Some(node) => node,
                        None => return,
                    };
                    rest = &rest[common..];
                }
                Some((edge, common)) => {
                    node = match node.children.get_mut(edge.as_str()) {
                        Some(node) => node,
                        None => return,
                    };
                    rest = &rest[common..];
                }
                None => {
                    node.children.insert(CompactString::from(rest), Node::new());
                    node = match node.children.get_mut(rest) {
                        Some(node) => node,
                        None => return,
                    };
                    rest = "";
                }
            }
        }

        if node.value.replace(value).is_none() {
            self.len += 1;
        }
    }

    /// Looks up a key, matching stored prefixes.
    ///
    /// Descends greedily, consuming any child edge that is a prefix of the
    /// remaining key, and returns the value at the first terminal reached.
    /// An exact match is the case where the key is fully consumed at a
    /// terminal; a stored key that prefixes the query matches earlier.
    pub fn get(&self, key: &str) -> Option<&V> {
        let mut node = &self.root;
        let mut rest = key;

        loop {
            if let Some(value) = &node.value {
                return Some(value);
            }
            if rest.is_empty() {
                return None;
            }

            match node
                .children
                .iter()
                .find(|(edge, _)| rest.starts_with(edge.as_str()))
            {
                Some((edge, child)) => {
                    rest = &rest[edge.len()..];
                    node = child;
                }
                None => return None,
            }
        }
    }

    /// Removes a key, returning its value if present.
    ///
    /// Empty non-terminal leaves are pruned on the way back up, and a
    /// non-terminal node left with a single child is merged into its parent
    /// edge so the no-shared-prefix invariant keeps holding.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let removed = Self::remove_at(&mut self.root, key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn remove_at(node: &mut Node<V>, key: &str) -> Option<V> {
        if key.is_empty() {
            return node.value.take();
        }

        let edge = node
            .children
            .keys()
            .find(|edge| key.starts_with(edge.as_str()))
            .cloned()?;

        let removed = {
            let child = node.children.get_mut(edge.as_str())?;
            Self::remove_at(child, &key[edge.len()..])
        };

        if removed.is_some() {
            if let Some(mut child) = node.children.remove(edge.as_str()) {
                if child.value.is_none() && child.children.is_empty() {
                    // Pruned
                } else if child.value.is_none() && child.children.len() == 1 {
                    if let Some((grand_edge, grand)) = child.children.drain().next() {
                        let mut merged = String::with_capacity(edge.len() + grand_edge.len());
                        merged.push_str(&edge);
                        merged.push_str(&grand_edge);
                        node.children.insert(CompactString::from(merged), grand);
                    }
                } else {
                    node.children.insert(edge, child);
                }
            }
        }

        removed
    }
}

impl<V: Clone> RadixTree<V> {
    /// Walks out every `(key, value)` pair.
    pub fn entries(&self) -> Vec<(String, V)> {
        let mut items = Vec::with_capacity(self.len);
        Self::collect(&self.root, String::new(), &mut items);
        items
    }

    fn collect(node: &Node<V>, path: String, items: &mut Vec<(String, V)>) {
        if let Some(value) = &node.value {
            items.push((path.clone(), value.clone()));
        }
        for (edge, child) in &node.children {
            let mut next = String::with_capacity(path.len() + edge.len());
            next.push_str(&path);
            next.push_str(edge);
            Self::collect(child, next, items);
        }
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}
