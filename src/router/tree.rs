//! Radix tree holding the routes of one HTTP method.
//!
//! Each node owns a slice of the pattern. Static children are picked through a
//! parallel `indices` list holding their first character; a node with a
//! wildcard child has exactly that one child. Children are kept ordered by
//! priority (the number of values reachable below them) so the busiest
//! branches are tried first.

use std::mem;

use super::error::RouteError;
use super::params::Params;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum NodeKind {
    #[default]
    Static,
    Root,
    Param,
    CatchAll,
}

/// A node of the routing trie, generic over the stored value.
///
/// # Examples
///
/// ```
/// use pathwise::router::{Node, Params};
///
/// let mut tree = Node::new();
/// tree.add_route("/blog/:category/:post", "post").unwrap();
/// tree.add_route("/files/*filepath", "files").unwrap();
///
/// let mut params = Params::new();
/// let hit = tree.get_value("/blog/go/request-routers", Some(&mut params));
/// assert_eq!(hit.value, Some(&"post"));
/// assert_eq!(params.by_name("category"), Some("go"));
///
/// let miss = tree.get_value("/files", None);
/// assert!(miss.value.is_none());
/// assert!(miss.tsr);
/// ```
#[derive(Debug, Clone)]
pub struct Node<T> {
    path: String,
    kind: NodeKind,
    wild_child: bool,
    indices: Vec<char>,
    children: Vec<Node<T>>,
    value: Option<T>,
    priority: u32,
}

/// Outcome of [`Node::get_value`].
#[derive(Debug)]
pub struct Lookup<'a, T> {
    /// The value registered for the path, if any.
    pub value: Option<&'a T>,
    /// No value matched, but one exists with the trailing slash toggled.
    pub tsr: bool,
}

impl<T> Lookup<'_, T> {
    fn miss(tsr: bool) -> Self {
        Self { value: None, tsr }
    }
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            path: String::new(),
            kind: NodeKind::Static,
            wild_child: false,
            indices: Vec::new(),
            children: Vec::new(),
            value: None,
            priority: 0,
        }
    }
}

/// Number of wildcard segments (`:name` or `*name`) in `pattern`.
pub fn count_params(pattern: &str) -> usize {
    pattern.bytes().filter(|b| matches!(b, b':' | b'*')).count()
}

/// Byte length of the longest common prefix, always on a char boundary.
fn longest_common_prefix(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map_or_else(|| a.len().min(b.len()), |((i, _), _)| i)
}

/// First wildcard in `path`: its text up to the next `/`, its byte offset,
/// and whether it is free of a second `:` or `*`.
fn find_wildcard(path: &str) -> Option<(&str, usize, bool)> {
    let bytes = path.as_bytes();
    let start = bytes.iter().position(|b| matches!(b, b':' | b'*'))?;
    let mut valid = true;
    for (offset, b) in bytes[start + 1..].iter().enumerate() {
        match b {
            b'/' => return Some((&path[start..start + 1 + offset], start, valid)),
            b':' | b'*' => valid = false,
            _ => {}
        }
    }
    Some((&path[start..], start, valid))
}

/// Checks wildcard syntax of a whole pattern before the tree is modified.
fn validate_pattern(full_path: &str) -> Result<(), RouteError> {
    let mut offset = 0;
    while let Some((wildcard, i, valid)) = find_wildcard(&full_path[offset..]) {
        if !valid {
            return Err(RouteError::MultipleWildcards {
                wildcard: wildcard.to_owned(),
                path: full_path.to_owned(),
            });
        }
        if wildcard.len() < 2 {
            return Err(RouteError::UnnamedWildcard {
                path: full_path.to_owned(),
            });
        }
        let at = offset + i;
        if wildcard.starts_with('*') {
            if at + wildcard.len() != full_path.len() {
                return Err(RouteError::CatchAllNotLast {
                    path: full_path.to_owned(),
                });
            }
            if at == 0 || full_path.as_bytes()[at - 1] != b'/' {
                return Err(RouteError::MissingSlashBeforeCatchAll {
                    path: full_path.to_owned(),
                });
            }
        }
        offset = at + wildcard.len();
    }
    Ok(())
}

fn chars_eq_fold(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

fn str_eq_fold(a: &str, b: &str) -> bool {
    a.chars().count() == b.chars().count() && a.chars().zip(b.chars()).all(|(x, y)| chars_eq_fold(x, y))
}

/// Strips `prefix` from `path` comparing char by char without case.
fn strip_prefix_fold<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let mut rest = path.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = rest.next()?;
        if !chars_eq_fold(actual, expected) {
            return None;
        }
    }
    Some(rest.as_str())
}

impl<T> Node<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` under `path`.
    ///
    /// # Errors
    ///
    /// Fails on malformed wildcards, on patterns that conflict with routes
    /// already in the tree, and when `path` is already registered.
    pub fn add_route(&mut self, path: &str, value: T) -> Result<(), RouteError> {
        validate_pattern(path)?;

        let full_path = path;
        let mut path = path;
        self.priority += 1;

        if self.path.is_empty() && self.indices.is_empty() {
            self.insert_child(path, full_path, value)?;
            self.kind = NodeKind::Root;
            return Ok(());
        }

        let mut n = self;
        loop {
            let i = longest_common_prefix(path, &n.path);

            // split edge
            if i < n.path.len() {
                let child = Node {
                    path: n.path[i..].to_owned(),
                    kind: NodeKind::Static,
                    wild_child: n.wild_child,
                    indices: mem::take(&mut n.indices),
                    children: mem::take(&mut n.children),
                    value: n.value.take(),
                    priority: n.priority - 1,
                };
                n.indices = child.path.chars().next().into_iter().collect();
                n.children = vec![child];
                n.path.truncate(i);
                n.wild_child = false;
            }

            if i == path.len() {
                if n.value.is_some() {
                    return Err(RouteError::Duplicate {
                        path: full_path.to_owned(),
                    });
                }
                n.value = Some(value);
                return Ok(());
            }

            path = &path[i..];

            if n.wild_child {
                n = &mut n.children[0];
                n.priority += 1;

                if n.kind == NodeKind::CatchAll && path == n.path {
                    return Err(RouteError::Duplicate {
                        path: full_path.to_owned(),
                    });
                }

                let fits = path.starts_with(n.path.as_str())
                    && n.kind != NodeKind::CatchAll
                    && (n.path.len() >= path.len() || path.as_bytes()[n.path.len()] == b'/');
                if fits {
                    continue;
                }
                return Err(wildcard_conflict(path, full_path, &n.path, n.kind));
            }

            let Some(idxc) = path.chars().next() else {
                return Ok(());
            };

            // '/' after a param
            if n.kind == NodeKind::Param && idxc == '/' && n.children.len() == 1 {
                n = &mut n.children[0];
                n.priority += 1;
                continue;
            }

            if let Some(pos) = n.indices.iter().position(|&c| c == idxc) {
                let pos = n.increment_child_prio(pos);
                n = &mut n.children[pos];
                continue;
            }

            if idxc != ':' && idxc != '*' {
                n.indices.push(idxc);
                n.children.push(Node::default());
                let pos = n.increment_child_prio(n.indices.len() - 1);
                n = &mut n.children[pos];
            }
            return n.insert_child(path, full_path, value);
        }
    }

    /// Bumps the priority of child `pos` and moves it ahead of every sibling
    /// with a strictly lower priority. Returns its new position.
    fn increment_child_prio(&mut self, pos: usize) -> usize {
        self.children[pos].priority += 1;
        let prio = self.children[pos].priority;

        let mut new_pos = pos;
        while new_pos > 0 && self.children[new_pos - 1].priority < prio {
            self.children.swap(new_pos - 1, new_pos);
            new_pos -= 1;
        }

        if new_pos != pos {
            let c = self.indices.remove(pos);
            self.indices.insert(new_pos, c);
        }
        new_pos
    }

    fn insert_child(&mut self, path: &str, full_path: &str, value: T) -> Result<(), RouteError> {
        let mut n = self;
        let mut path = path;

        while let Some((wildcard, i, _)) = find_wildcard(path) {
            if !n.children.is_empty() {
                return Err(RouteError::ChildConflict {
                    wildcard: wildcard.to_owned(),
                    path: full_path.to_owned(),
                });
            }

            if wildcard.starts_with(':') {
                if i > 0 {
                    n.path = path[..i].to_owned();
                    path = &path[i..];
                }

                n.wild_child = true;
                n.children = vec![Node {
                    path: wildcard.to_owned(),
                    kind: NodeKind::Param,
                    ..Node::default()
                }];
                n = &mut n.children[0];
                n.priority += 1;

                if wildcard.len() < path.len() {
                    path = &path[wildcard.len()..];
                    n.children = vec![Node {
                        priority: 1,
                        ..Node::default()
                    }];
                    n = &mut n.children[0];
                    continue;
                }

                n.value = Some(value);
                return Ok(());
            }

            if n.path.ends_with('/') {
                return Err(RouteError::CatchAllRootConflict {
                    path: full_path.to_owned(),
                });
            }
            if i == 0 || path.as_bytes()[i - 1] != b'/' {
                return Err(RouteError::MissingSlashBeforeCatchAll {
                    path: full_path.to_owned(),
                });
            }

            let slash = i - 1;
            n.path = path[..slash].to_owned();
            n.indices = vec!['/'];
            n.children = vec![Node {
                kind: NodeKind::CatchAll,
                wild_child: true,
                priority: 1,
                children: vec![Node {
                    path: path[slash..].to_owned(),
                    kind: NodeKind::CatchAll,
                    value: Some(value),
                    priority: 1,
                    ..Node::default()
                }],
                ..Node::default()
            }];
            return Ok(());
        }

        n.path = path.to_owned();
        n.value = Some(value);
        Ok(())
    }

    /// Looks `path` up. Captured wildcards are appended to `params` when given.
    pub fn get_value<'a>(&'a self, path: &str, mut params: Option<&mut Params>) -> Lookup<'a, T> {
        let mut n = self;
        let mut path = path;

        loop {
            let prefix = n.path.as_str();

            if path.len() > prefix.len() {
                if let Some(rest) = path.strip_prefix(prefix) {
                    path = rest;

                    if !n.wild_child {
                        if let Some(idxc) = path.chars().next() {
                            if let Some(pos) = n.indices.iter().position(|&c| c == idxc) {
                                n = &n.children[pos];
                                continue;
                            }
                        }
                        return Lookup::miss(path == "/" && n.value.is_some());
                    }

                    n = &n.children[0];
                    match n.kind {
                        NodeKind::Param => {
                            let end = path.find('/').unwrap_or(path.len());
                            if let Some(ps) = params.as_deref_mut() {
                                ps.push(&n.path[1..], &path[..end]);
                            }

                            if end < path.len() {
                                if let Some(child) = n.children.first() {
                                    path = &path[end..];
                                    n = child;
                                    continue;
                                }
                                return Lookup::miss(path.len() == end + 1);
                            }

                            if let Some(value) = &n.value {
                                return Lookup {
                                    value: Some(value),
                                    tsr: false,
                                };
                            }
                            if let [child] = n.children.as_slice() {
                                return Lookup::miss(
                                    (child.path == "/" && child.value.is_some())
                                        || (child.path.is_empty() && child.indices == ['/']),
                                );
                            }
                            return Lookup::miss(false);
                        }
                        NodeKind::CatchAll => {
                            if let Some(ps) = params.as_deref_mut() {
                                ps.push(&n.path[2..], path);
                            }
                            return Lookup {
                                value: n.value.as_ref(),
                                tsr: false,
                            };
                        }
                        NodeKind::Static | NodeKind::Root => return Lookup::miss(false),
                    }
                }
            } else if path == prefix {
                if let Some(value) = &n.value {
                    return Lookup {
                        value: Some(value),
                        tsr: false,
                    };
                }

                // the wildcard child below must hold the route with the slash
                if path == "/" && n.wild_child && n.kind != NodeKind::Root {
                    return Lookup::miss(true);
                }

                if let Some(pos) = n.indices.iter().position(|&c| c == '/') {
                    let child = &n.children[pos];
                    return Lookup::miss(
                        (child.path.len() == 1 && child.value.is_some())
                            || (child.kind == NodeKind::CatchAll
                                && child.children.first().is_some_and(|c| c.value.is_some())),
                    );
                }
                return Lookup::miss(false);
            }

            return Lookup::miss(
                path == "/"
                    || (prefix.len() == path.len() + 1
                        && prefix.ends_with('/')
                        && prefix.starts_with(path)
                        && n.value.is_some()),
            );
        }
    }

    /// Case-insensitive lookup returning the registered spelling of `path`.
    ///
    /// With `fix_trailing_slash` a missing or extra trailing slash is also
    /// corrected. Parameter values keep the case they had in `path`.
    pub fn find_case_insensitive_path(&self, path: &str, fix_trailing_slash: bool) -> Option<String> {
        let mut out = String::with_capacity(path.len() + 1);
        self.find_ci(path, &mut out, fix_trailing_slash)
            .then_some(out)
    }

    fn find_ci(&self, path: &str, out: &mut String, fix_ts: bool) -> bool {
        let Some(rest) = strip_prefix_fold(path, &self.path) else {
            if fix_ts
                && self.value.is_some()
                && self
                    .path
                    .strip_suffix('/')
                    .is_some_and(|without| str_eq_fold(path, without))
            {
                out.push_str(&self.path);
                return true;
            }
            return false;
        };

        let mark = out.len();
        out.push_str(&self.path);

        if rest.is_empty() {
            if self.value.is_some() {
                return true;
            }
            if fix_ts {
                if let Some(pos) = self.indices.iter().position(|&c| c == '/') {
                    let child = &self.children[pos];
                    if (child.path.len() == 1 && child.value.is_some())
                        || (child.kind == NodeKind::CatchAll
                            && child.children.first().is_some_and(|c| c.value.is_some()))
                    {
                        out.push('/');
                        return true;
                    }
                }
            }
            out.truncate(mark);
            return false;
        }

        if !self.wild_child {
            if let Some(first) = rest.chars().next() {
                // both the lower and the upper case spelling may be indexed
                for (pos, &idxc) in self.indices.iter().enumerate() {
                    if chars_eq_fold(idxc, first) && self.children[pos].find_ci(rest, out, fix_ts) {
                        return true;
                    }
                }
            }
            if fix_ts && rest == "/" && self.value.is_some() {
                return true;
            }
            out.truncate(mark);
            return false;
        }

        let child = &self.children[0];
        let found = match child.kind {
            NodeKind::Param => {
                let end = rest.find('/').unwrap_or(rest.len());
                out.push_str(&rest[..end]);

                if end < rest.len() {
                    match child.children.first() {
                        Some(next) => next.find_ci(&rest[end..], out, fix_ts),
                        None => fix_ts && rest.len() == end + 1,
                    }
                } else if child.value.is_some() {
                    true
                } else if let (true, [slash]) = (fix_ts, child.children.as_slice()) {
                    let ok = slash.path == "/" && slash.value.is_some();
                    if ok {
                        out.push('/');
                    }
                    ok
                } else {
                    false
                }
            }
            NodeKind::CatchAll => {
                out.push_str(rest);
                true
            }
            NodeKind::Static | NodeKind::Root => false,
        };

        if !found {
            out.truncate(mark);
        }
        found
    }

    /// Calls `visit` with the pattern and value of every registered route
    /// until it returns `false`. Without `include_params`, patterns are cut
    /// back to the static part before their first wildcard.
    pub fn walk<'a, F>(&'a self, include_params: bool, visit: &mut F) -> bool
    where
        F: FnMut(&str, &'a T) -> bool,
    {
        let mut prefix = String::new();
        self.walk_inner(include_params, &mut prefix, visit)
    }

    fn walk_inner<'a, F>(&'a self, include_params: bool, prefix: &mut String, visit: &mut F) -> bool
    where
        F: FnMut(&str, &'a T) -> bool,
    {
        let mark = prefix.len();
        prefix.push_str(&self.path);

        let mut keep_going = true;
        if let Some(value) = &self.value {
            keep_going = if include_params {
                visit(prefix.as_str(), value)
            } else {
                visit(collapse_wildcards(prefix.as_str()), value)
            };
        }

        if keep_going {
            for child in &self.children {
                if !child.walk_inner(include_params, prefix, visit) {
                    keep_going = false;
                    break;
                }
            }
        }

        prefix.truncate(mark);
        keep_going
    }

    /// Whether `name` names a registered route, or the static stem of a
    /// wildcard route (`/blog` for `/blog/:category/:post`).
    pub fn contains_prefix(&self, name: &str) -> bool {
        let mut prefix = String::new();
        self.contains_inner(name, &mut prefix)
    }

    fn contains_inner(&self, name: &str, prefix: &mut String) -> bool {
        if self.value.is_some() {
            let hit = match self.kind {
                NodeKind::CatchAll => name == prefix.as_str(),
                NodeKind::Param => prefix.strip_prefix(name).is_some_and(|rest| {
                    rest.is_empty() || rest.starts_with('/') || name.ends_with('/')
                }),
                NodeKind::Static | NodeKind::Root => {
                    name.len() == prefix.len() + self.path.len()
                        && name.starts_with(prefix.as_str())
                        && name.ends_with(self.path.as_str())
                }
            };
            if hit {
                return true;
            }
        }

        let mark = prefix.len();
        prefix.push_str(&self.path);
        let found = self.children.iter().any(|c| c.contains_inner(name, prefix));
        prefix.truncate(mark);
        found
    }
}

fn collapse_wildcards(pattern: &str) -> &str {
    match pattern.find([':', '*']) {
        Some(i) => {
            let stem = pattern[..i].trim_end_matches('/');
            if stem.is_empty() { "/" } else { stem }
        }
        None => pattern,
    }
}

fn wildcard_conflict(path: &str, full_path: &str, wildcard: &str, kind: NodeKind) -> RouteError {
    let segment = if kind == NodeKind::CatchAll {
        path
    } else {
        path.split('/').next().unwrap_or(path)
    };
    let before = full_path.find(segment).map_or("", |i| &full_path[..i]);
    RouteError::WildcardConflict {
        segment: segment.to_owned(),
        path: full_path.to_owned(),
        wildcard: wildcard.to_owned(),
        prefix: format!("{before}{wildcard}"),
    }
}
