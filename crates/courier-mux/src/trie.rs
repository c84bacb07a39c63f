//! Subject trie
//!
//! Literal text is stored one character per node. A node may additionally
//! own one `{param}` child and one `*catch_all` child. Lookup prefers the
//! literal branch, then the parameter, then the catch-all, backtracking when
//! a branch dead-ends.

use courier_core::{Pattern, Segment};
use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::RouteError;
use crate::handler::{HandleFunc, Middleware, SubjectFn};

/// A handler together with the middlewares registered only for it
#[derive(Clone)]
pub(crate) struct Route {
    pub(crate) handler: HandleFunc,
    pub(crate) middlewares: Vec<Middleware>,
}

/// Kind of entry reported by [`Mux::endpoints`](crate::Mux::endpoints)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RouteKind {
    Handler,
    Default,
    NotFound,
    Transform,
}

impl std::fmt::Display for RouteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RouteKind::Handler => "handler",
            RouteKind::Default => "default handler",
            RouteKind::NotFound => "not-found handler",
            RouteKind::Transform => "transform",
        };
        f.write_str(name)
    }
}

/// One registered entry, for introspection
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RouteInfo {
    pub subject: String,
    pub kind: RouteKind,
}

pub(crate) struct Node {
    children: BTreeMap<char, Node>,
    param: Option<(String, Box<Node>)>,
    catch_all: Option<(String, Box<Node>)>,
    route: Option<Route>,
    default_route: Option<Route>,
    not_found: Option<HandleFunc>,
    middlewares: Vec<Middleware>,
    transforms: Vec<HandleFunc>,
    subject_fn: Option<SubjectFn>,
    full_subject: String,
}

impl Node {
    pub(crate) fn new(full_subject: String) -> Self {
        Self {
            children: BTreeMap::new(),
            param: None,
            catch_all: None,
            route: None,
            default_route: None,
            not_found: None,
            middlewares: Vec::new(),
            transforms: Vec::new(),
            subject_fn: None,
            full_subject,
        }
    }

    pub(crate) fn transforms(&self) -> &[HandleFunc] {
        &self.transforms
    }

    pub(crate) fn subject_fn(&self) -> Option<&SubjectFn> {
        self.subject_fn.as_ref()
    }

    pub(crate) fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    /// Find or create the node a pattern ends at
    pub(crate) fn insert(&mut self, pattern: &Pattern) -> Result<&mut Node, RouteError> {
        let mut node = self;
        let segments = pattern.segments();

        for (i, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => {
                    for ch in text.chars() {
                        let full = format!("{}{}", node.full_subject, ch);
                        node = node.children.entry(ch).or_insert_with(|| Node::new(full));
                    }
                }
                Segment::Param(name) => {
                    node = child_slot(&mut node.param, name, &node.full_subject, '{')?;
                }
                Segment::CatchAll(name) => {
                    if i + 1 != segments.len() {
                        return Err(RouteError::InvalidPattern(format!(
                            "catch-all must be last in {:?}",
                            pattern.as_str()
                        )));
                    }
                    node = child_slot(&mut node.catch_all, name, &node.full_subject, '*')?;
                }
            }
        }

        Ok(node)
    }

    pub(crate) fn set_route(&mut self, route: Route) -> Result<(), RouteError> {
        if self.route.is_some() {
            return Err(self.duplicate(RouteKind::Handler));
        }
        self.route = Some(route);
        Ok(())
    }

    pub(crate) fn set_default(&mut self, route: Route) -> Result<(), RouteError> {
        if self.default_route.is_some() {
            return Err(self.duplicate(RouteKind::Default));
        }
        self.default_route = Some(route);
        Ok(())
    }

    pub(crate) fn set_not_found(&mut self, handler: HandleFunc) -> Result<(), RouteError> {
        if self.not_found.is_some() {
            return Err(self.duplicate(RouteKind::NotFound));
        }
        self.not_found = Some(handler);
        Ok(())
    }

    pub(crate) fn set_subject_fn(&mut self, f: SubjectFn) {
        self.subject_fn = Some(f);
    }

    pub(crate) fn add_middlewares(&mut self, middlewares: impl IntoIterator<Item = Middleware>) {
        self.middlewares.extend(middlewares);
    }

    pub(crate) fn add_transform(&mut self, transform: HandleFunc) {
        self.transforms.push(transform);
    }

    fn duplicate(&self, kind: RouteKind) -> RouteError {
        RouteError::Duplicate {
            subject: self.full_subject.clone(),
            kind,
        }
    }

    /// Collect every registered entry below (and including) this node
    pub(crate) fn collect_routes(&self, out: &mut Vec<RouteInfo>) {
        let mut push = |kind| {
            out.push(RouteInfo {
                subject: self.full_subject.clone(),
                kind,
            })
        };
        if self.route.is_some() {
            push(RouteKind::Handler);
        }
        if self.default_route.is_some() {
            push(RouteKind::Default);
        }
        if self.not_found.is_some() {
            push(RouteKind::NotFound);
        }
        if !self.transforms.is_empty() {
            push(RouteKind::Transform);
        }
        for child in self.children.values() {
            child.collect_routes(out);
        }
        if let Some((_, child)) = &self.param {
            child.collect_routes(out);
        }
        if let Some((_, child)) = &self.catch_all {
            child.collect_routes(out);
        }
    }
}

fn child_slot<'n>(
    slot: &'n mut Option<(String, Box<Node>)>,
    name: &str,
    parent_subject: &str,
    sigil: char,
) -> Result<&'n mut Node, RouteError> {
    let rendered = if sigil == '{' {
        format!("{}{{{}}}", parent_subject, name)
    } else {
        format!("{}*{}", parent_subject, name)
    };

    if let Some((existing, _)) = slot.as_ref() {
        if existing != name {
            return Err(RouteError::ParamConflict {
                subject: parent_subject.to_string(),
                existing: existing.clone(),
                new: name.to_string(),
            });
        }
    }
    let (_, node) = slot.get_or_insert_with(|| (name.to_string(), Box::new(Node::new(rendered))));
    Ok(node.as_mut())
}

/// Where a lookup ended
pub(crate) enum Target<'t> {
    /// A handler registered at the exact subject
    Route(&'t Route),
    /// A transform boundary; dispatch continues from this node
    Transform(&'t Node),
    /// Deepest default handler on the way
    Default(&'t Route),
    /// Deepest not-found handler on the way; runs without middleware
    NotFound(&'t HandleFunc),
}

/// Outcome of a lookup: the target plus what dispatch needs to run it
pub(crate) struct Resolved<'t> {
    pub(crate) target: Target<'t>,
    /// Nodes whose middlewares apply, outermost first
    pub(crate) trail: Vec<&'t Node>,
    pub(crate) params: Vec<(&'t str, Range<usize>)>,
}

struct Fallback<'t> {
    depth: usize,
    route: &'t Route,
    trail: Vec<&'t Node>,
    params: Vec<(&'t str, Range<usize>)>,
}

pub(crate) struct Lookup<'t, 's> {
    subject: &'s str,
    delimiter: &'s str,
    trail: Vec<&'t Node>,
    params: Vec<(&'t str, Range<usize>)>,
    fallback: Option<Fallback<'t>>,
    not_found: Option<(usize, &'t HandleFunc)>,
}

impl<'t, 's> Lookup<'t, 's> {
    pub(crate) fn new(subject: &'s str, delimiter: &'s str) -> Self {
        Self {
            subject,
            delimiter,
            trail: Vec::new(),
            params: Vec::new(),
            fallback: None,
            not_found: None,
        }
    }

    /// Match the subject starting at `start`.
    ///
    /// When `resume` is set, `start` is a transform boundary being re-entered:
    /// its middlewares already ran and its transforms must not fire again.
    pub(crate) fn run(mut self, start: &'t Node, resume: bool) -> Option<Resolved<'t>> {
        if let Some(target) = self.walk(start, 0, resume) {
            return Some(Resolved {
                target,
                trail: self.trail,
                params: self.params,
            });
        }
        if let Some(fallback) = self.fallback {
            return Some(Resolved {
                target: Target::Default(fallback.route),
                trail: fallback.trail,
                params: fallback.params,
            });
        }
        self.not_found.map(|(_, handler)| Resolved {
            target: Target::NotFound(handler),
            trail: Vec::new(),
            params: Vec::new(),
        })
    }

    fn walk(&mut self, start: &'t Node, start_idx: usize, resume: bool) -> Option<Target<'t>> {
        let trail_mark = self.trail.len();
        let mut node = start;
        let mut idx = start_idx;
        let mut entering_start = resume;

        loop {
            if !entering_start {
                if !node.middlewares.is_empty() {
                    self.trail.push(node);
                }
                if !node.transforms.is_empty() {
                    return Some(Target::Transform(node));
                }
            }
            entering_start = false;

            self.note_fallbacks(node, idx);

            if idx == self.subject.len() {
                if let Some(route) = &node.route {
                    return Some(Target::Route(route));
                }
                // A catch-all may capture nothing.
                if let Some((name, child)) = &node.catch_all {
                    self.params.push((name.as_str(), idx..idx));
                    if let Some(target) = self.walk(child, idx, false) {
                        return Some(target);
                    }
                    self.params.pop();
                }
                break;
            }

            let Some(ch) = self.subject[idx..].chars().next() else {
                break;
            };
            let literal = node.children.get(&ch);
            let next_idx = idx + ch.len_utf8();

            if node.param.is_none() && node.catch_all.is_none() {
                match literal {
                    Some(child) => {
                        node = child;
                        idx = next_idx;
                        continue;
                    }
                    None => break,
                }
            }

            if let Some(child) = literal {
                if let Some(target) = self.walk(child, next_idx, false) {
                    return Some(target);
                }
            }

            if let Some((name, child)) = &node.param {
                let end = self.param_end(idx);
                if end > idx {
                    self.params.push((name.as_str(), idx..end));
                    if let Some(target) = self.walk(child, end, false) {
                        return Some(target);
                    }
                    self.params.pop();
                }
            }

            if let Some((name, child)) = &node.catch_all {
                let end = self.subject.len();
                self.params.push((name.as_str(), idx..end));
                if let Some(target) = self.walk(child, end, false) {
                    return Some(target);
                }
                self.params.pop();
            }

            break;
        }

        self.trail.truncate(trail_mark);
        None
    }

    fn note_fallbacks(&mut self, node: &'t Node, idx: usize) {
        if let Some(route) = &node.default_route {
            let deeper = self.fallback.as_ref().map_or(true, |f| idx > f.depth);
            if deeper {
                self.fallback = Some(Fallback {
                    depth: idx,
                    route,
                    trail: self.trail.clone(),
                    params: self.params.clone(),
                });
            }
        }
        if let Some(handler) = &node.not_found {
            let deeper = self.not_found.map_or(true, |(depth, _)| idx > depth);
            if deeper {
                self.not_found = Some((idx, handler));
            }
        }
    }

    /// End of a `{param}` value: the next delimiter or the end of the subject
    fn param_end(&self, idx: usize) -> usize {
        if self.delimiter.is_empty() {
            return self.subject.len();
        }
        self.subject[idx..]
            .find(self.delimiter)
            .map_or(self.subject.len(), |offset| idx + offset)
    }
}
