//! Path pattern matching.
//!
//! # Responsibilities
//! - Compile route patterns such as `/redfish/v1/Systems/{id}`
//! - Match request paths segment by segment, capturing parameters
//!
//! # Design Decisions
//! - Literal segments are case-sensitive
//! - A `{name}` parameter matches exactly one non-empty segment
//! - One trailing slash on the request path is ignored
//! - No regex: matching is a single pass over the segments

/// One compiled pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        let segments = split(pattern)
            .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                _ => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Captured parameters when `path` matches, in pattern order.
    pub fn captures(&self, path: &str) -> Option<Vec<(String, String)>> {
        let mut params = Vec::new();
        let mut parts = split(path);
        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }
        match parts.next() {
            None => Some(params),
            Some(_) => None,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.captures(path).is_some()
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    };
    path.split('/').filter(move |_| !path.is_empty())
}
