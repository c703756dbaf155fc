//! Trie-structured sets of field paths.

use super::path::{Path, PathElement};
use std::collections::BTreeMap;

/// PathElementSet is a sorted set of PathElements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathElementSet {
    members: Vec<PathElement>,
}

impl PathElementSet {
    pub fn new() -> Self {
        PathElementSet {
            members: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, element: &PathElement) -> bool {
        self.members.binary_search(element).is_ok()
    }

    pub fn insert(&mut self, element: PathElement) {
        if let Err(pos) = self.members.binary_search(&element) {
            self.members.insert(pos, element);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.members.iter()
    }

    pub fn union(&self, other: &PathElementSet) -> PathElementSet {
        let mut result = Vec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0, 0);
        while i < self.members.len() && j < other.members.len() {
            match self.members[i].cmp(&other.members[j]) {
                std::cmp::Ordering::Less => {
                    result.push(self.members[i].clone());
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    result.push(other.members[j].clone());
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    result.push(self.members[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        result.extend(self.members[i..].iter().cloned());
        result.extend(other.members[j..].iter().cloned());
        PathElementSet { members: result }
    }

    pub fn intersection(&self, other: &PathElementSet) -> PathElementSet {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.members.len() && j < other.members.len() {
            match self.members[i].cmp(&other.members[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    result.push(self.members[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        PathElementSet { members: result }
    }

    pub fn difference(&self, other: &PathElementSet) -> PathElementSet {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.members.len() && j < other.members.len() {
            match self.members[i].cmp(&other.members[j]) {
                std::cmp::Ordering::Less => {
                    result.push(self.members[i].clone());
                    i += 1;
                }
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        result.extend(self.members[i..].iter().cloned());
        PathElementSet { members: result }
    }
}

/// Set is a trie over field paths. Each level holds the leaf members at that
/// depth plus children for deeper paths; a path element may be both a member
/// (the path itself is in the set) and a child prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Set {
    pub members: PathElementSet,
    pub children: BTreeMap<PathElement, Set>,
}

impl Set {
    pub fn new() -> Self {
        Set {
            members: PathElementSet::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.children.is_empty()
    }

    pub fn equals(&self, other: &Set) -> bool {
        self == other
    }

    /// Returns the number of paths in the set.
    pub fn size(&self) -> usize {
        let mut n = 0;
        self.iterate(|_| n += 1);
        n
    }

    pub fn has(&self, path: &Path) -> bool {
        self.has_elements(path.as_slice())
    }

    fn has_elements(&self, elements: &[PathElement]) -> bool {
        match elements {
            [] => false,
            [last] => self.members.contains(last),
            [first, rest @ ..] => self
                .children
                .get(first)
                .map(|child| child.has_elements(rest))
                .unwrap_or(false),
        }
    }

    pub fn insert(&mut self, path: &Path) {
        self.insert_elements(path.as_slice());
    }

    fn insert_elements(&mut self, elements: &[PathElement]) {
        match elements {
            [] => {}
            [last] => self.members.insert(last.clone()),
            [first, rest @ ..] => self
                .children
                .entry(first.clone())
                .or_default()
                .insert_elements(rest),
        }
    }

    pub fn union(&self, other: &Set) -> Set {
        let mut result = self.clone();
        result.union_into(other);
        result
    }

    fn union_into(&mut self, other: &Set) {
        self.members = self.members.union(&other.members);
        for (key, other_child) in &other.children {
            match self.children.get_mut(key) {
                Some(self_child) => self_child.union_into(other_child),
                None => {
                    self.children.insert(key.clone(), other_child.clone());
                }
            }
        }
    }

    pub fn intersection(&self, other: &Set) -> Set {
        let members = self.members.intersection(&other.members);
        let mut children = BTreeMap::new();
        for (key, self_child) in &self.children {
            if let Some(other_child) = other.children.get(key) {
                let child = self_child.intersection(other_child);
                if !child.is_empty() {
                    children.insert(key.clone(), child);
                }
            }
        }
        Set { members, children }
    }

    /// Returns self minus other.
    pub fn difference(&self, other: &Set) -> Set {
        let members = self.members.difference(&other.members);
        let mut children = BTreeMap::new();
        for (key, self_child) in &self.children {
            match other.children.get(key) {
                Some(other_child) => {
                    let child = self_child.difference(other_child);
                    if !child.is_empty() {
                        children.insert(key.clone(), child);
                    }
                }
                None => {
                    children.insert(key.clone(), self_child.clone());
                }
            }
        }
        Set { members, children }
    }

    /// Visits every path in the set in sorted order.
    pub fn iterate<F>(&self, mut f: F)
    where
        F: FnMut(&Path),
    {
        self.iterate_with(&mut Path::new(), &mut f);
    }

    fn iterate_with<F>(&self, current: &mut Path, f: &mut F)
    where
        F: FnMut(&Path),
    {
        for member in self.members.iter() {
            current.push(member.clone());
            f(current);
            current.pop();
        }
        for (key, child) in &self.children {
            current.push(key.clone());
            child.iterate_with(current, f);
            current.pop();
        }
    }

    /// Collects every path in the set.
    pub fn paths(&self) -> Vec<Path> {
        let mut out = Vec::new();
        self.iterate(|p| out.push(p.clone()));
        out
    }
}
