//! Arena trie over pattern keys.
//!
//! Each registered pattern is stored as a path of `field=value` edges taken
//! in field-name order. Nodes live in a flat `Vec` and reference each other
//! by index. A lookup walks every edge whose field is present in the query
//! and whose value matches, collecting the entries it reaches, then picks the
//! most specific one.
//!
//! # Specificity
//!
//! 1. more exactly-matched (non-wildcard) fields wins;
//! 2. then more total fields;
//! 3. then the earlier registration.

use std::collections::BTreeMap;

use super::{PatternKey, ValueMatcher};
use crate::{Error, Result};

type NodeId = usize;

#[derive(Debug, Default)]
struct Node {
    /// field -> literal value -> child
    exact: BTreeMap<String, BTreeMap<String, NodeId>>,
    /// wildcard edges, in insertion order
    globs: Vec<GlobEdge>,
    entry: Option<usize>,
}

#[derive(Debug)]
struct GlobEdge {
    field: String,
    source: String,
    matcher: ValueMatcher,
    child: NodeId,
}

#[derive(Debug)]
struct Entry<V> {
    key: PatternKey,
    value: V,
    exact_fields: usize,
}

/// Most-specific-match index from [`PatternKey`] to `V`.
#[derive(Debug)]
pub struct PatternTrie<V> {
    nodes: Vec<Node>,
    entries: Vec<Entry<V>>,
}

impl<V> Default for PatternTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> PatternTrie<V> {
    /// Create an empty trie.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            entries: Vec::new(),
        }
    }

    /// Register `value` under `key`, replacing the value of an identical key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPattern`] if a field value is an invalid glob.
    pub fn add(&mut self, key: PatternKey, value: V) -> Result<()> {
        let mut node = 0;
        let mut exact_fields = 0;

        for (field, text) in key.iter() {
            let matcher =
                ValueMatcher::new(text).map_err(|reason| Error::malformed(key.to_string(), reason))?;
            node = if matcher.is_exact() {
                exact_fields += 1;
                self.exact_child(node, field, text)
            } else {
                self.glob_child(node, field, text, matcher)
            };
        }

        match self.nodes[node].entry {
            Some(index) => self.entries[index].value = value,
            None => {
                self.nodes[node].entry = Some(self.entries.len());
                self.entries.push(Entry {
                    key,
                    value,
                    exact_fields,
                });
            }
        }
        Ok(())
    }

    /// Value of the most specific pattern matching `query`.
    #[must_use]
    pub fn find(&self, query: &PatternKey) -> Option<&V> {
        self.find_entry(query).map(|(_, value)| value)
    }

    /// Most specific matching pattern together with its value.
    #[must_use]
    pub fn find_entry(&self, query: &PatternKey) -> Option<(&PatternKey, &V)> {
        self.matching(query)
            .into_iter()
            .max_by_key(|&index| {
                let entry = &self.entries[index];
                (
                    entry.exact_fields,
                    entry.key.len(),
                    std::cmp::Reverse(index),
                )
            })
            .map(|index| {
                let entry = &self.entries[index];
                (&entry.key, &entry.value)
            })
    }

    /// Registered patterns and values, in registration order.
    pub fn list(&self) -> impl Iterator<Item = (&PatternKey, &V)> {
        self.entries.iter().map(|e| (&e.key, &e.value))
    }

    /// Number of registered patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry indices of every pattern matching `query`.
    fn matching(&self, query: &PatternKey) -> Vec<usize> {
        let mut found = Vec::new();
        let mut pending = vec![0];

        while let Some(id) = pending.pop() {
            let node = &self.nodes[id];
            if let Some(index) = node.entry {
                found.push(index);
            }
            for (field, values) in &node.exact {
                if let Some(child) = query.get(field).and_then(|v| values.get(v)) {
                    pending.push(*child);
                }
            }
            for edge in &node.globs {
                if query.get(&edge.field).is_some_and(|v| edge.matcher.matches(v)) {
                    pending.push(edge.child);
                }
            }
        }
        found
    }

    fn exact_child(&mut self, node: NodeId, field: &str, value: &str) -> NodeId {
        if let Some(child) = self.nodes[node]
            .exact
            .get(field)
            .and_then(|values| values.get(value))
        {
            return *child;
        }
        let child = self.push_node();
        self.nodes[node]
            .exact
            .entry(field.to_string())
            .or_default()
            .insert(value.to_string(), child);
        child
    }

    fn glob_child(&mut self, node: NodeId, field: &str, source: &str, matcher: ValueMatcher) -> NodeId {
        if let Some(edge) = self.nodes[node]
            .globs
            .iter()
            .find(|e| e.field == field && e.source == source)
        {
            return edge.child;
        }
        let child = self.push_node();
        self.nodes[node].globs.push(GlobEdge {
            field: field.to_string(),
            source: source.to_string(),
            matcher,
            child,
        });
        child
    }

    fn push_node(&mut self) -> NodeId {
        self.nodes.push(Node::default());
        self.nodes.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> PatternKey {
        PatternKey::parse(s).unwrap()
    }

    fn trie(patterns: &[(&str, &'static str)]) -> PatternTrie<&'static str> {
        let mut trie = PatternTrie::new();
        for (pattern, value) in patterns {
            trie.add(key(pattern), *value).unwrap();
        }
        trie
    }

    #[test]
    fn empty_trie_finds_nothing() {
        let trie: PatternTrie<()> = PatternTrie::new();
        assert!(trie.is_empty());
        assert!(trie.find(&key("a:1")).is_none());
    }

    #[test]
    fn extra_query_fields_are_ignored() {
        let trie = trie(&[("foo:1", "foo")]);
        assert_eq!(trie.find(&key("foo:1,x:2")), Some(&"foo"));
        assert_eq!(trie.find(&key("foo:2")), None);
        assert_eq!(trie.find(&key("x:2")), None);
    }

    #[test]
    fn more_fields_win() {
        let trie = trie(&[("a:1", "short"), ("a:1,b:2", "long")]);
        assert_eq!(trie.find(&key("a:1,b:2,c:3")), Some(&"long"));
        assert_eq!(trie.find(&key("a:1,b:3")), Some(&"short"));
    }

    #[test]
    fn exact_fields_beat_wildcard_fields() {
        let trie = trie(&[("a:1,b:*", "wild"), ("a:1", "exact")]);
        // one exact field each: more total fields wins
        assert_eq!(trie.find(&key("a:1,b:2")), Some(&"wild"));

        let trie = self::trie(&[("a:*,b:*,c:*", "wild"), ("a:1,b:2", "exact")]);
        assert_eq!(trie.find(&key("a:1,b:2,c:3")), Some(&"exact"));
    }

    #[test]
    fn ties_go_to_earlier_registration() {
        let trie = trie(&[("a:1", "first"), ("b:2", "second")]);
        assert_eq!(trie.find(&key("a:1,b:2")), Some(&"first"));
    }

    #[test]
    fn field_order_is_irrelevant() {
        let trie = trie(&[("b:2,a:1", "ab")]);
        assert_eq!(trie.find(&key("a:1,b:2")), Some(&"ab"));
    }

    #[test]
    fn glob_values_match() {
        let trie = trie(&[("cmd:get*", "getter"), ("cmd:get_user", "user")]);
        assert_eq!(trie.find(&key("cmd:get_all")), Some(&"getter"));
        assert_eq!(trie.find(&key("cmd:get_user")), Some(&"user"));
        assert_eq!(trie.find(&key("cmd:put")), None);
    }

    #[test]
    fn re_adding_replaces_value() {
        let mut trie = trie(&[("a:1", "old")]);
        trie.add(key("a:1"), "new").unwrap();
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.find(&key("a:1")), Some(&"new"));
    }

    #[test]
    fn find_entry_reports_pattern() {
        let trie = trie(&[("role:user,cmd:*", "any-cmd")]);
        let (pattern, value) = trie.find_entry(&key("role:user,cmd:load,id:7")).unwrap();
        assert_eq!(pattern.to_string(), "cmd:*,role:user");
        assert_eq!(*value, "any-cmd");
    }

    #[test]
    fn list_keeps_registration_order() {
        let trie = trie(&[("z:1", "z"), ("a:1", "a")]);
        let listed: Vec<_> = trie.list().map(|(k, v)| (k.to_string(), *v)).collect();
        assert_eq!(listed, vec![("z:1".to_string(), "z"), ("a:1".to_string(), "a")]);
    }
}
