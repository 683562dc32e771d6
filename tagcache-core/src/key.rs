//! Typed cache keys.
//!
//! Every key produced for a tenant has the shape
//!
//! ```text
//! {module}:{entity}[:list|:count]:{tenant_id}:{suffix}
//! ```
//!
//! where the module segment is optional and the suffix is a filter digest, a
//! record id, or `all`. Bulk tenant invalidation matches `*:{tenant_id}:*`
//! against stored keys, so the tenant segment must always be followed by a
//! non-empty suffix and must never contain the separator. [`CacheKey`] is the
//! only place that builds and parses this layout.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;

use crate::error::KeyError;

/// Segment separator.
pub const SEPARATOR: char = ':';

/// Suffix used when a key has no identifiers or no active filters.
pub const ALL_SUFFIX: &str = "all";

/// Filter maps as handed over by service code.
pub type Filters = serde_json::Map<String, Value>;

/// Characters that would break positional parsing or pattern matching.
static RESERVED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[:*\s]").expect("Invalid reserved character regex"));

/// Variant of a cached entity query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// A single record, suffix is the record id.
    Detail,
    /// A filtered collection, suffix is the filter digest.
    List,
    /// A filtered count, suffix is the filter digest.
    Count,
}

impl KeyKind {
    /// Segment inserted after the entity, if any.
    pub fn segment(self) -> Option<&'static str> {
        match self {
            KeyKind::Detail => None,
            KeyKind::List => Some("list"),
            KeyKind::Count => Some("count"),
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "list" => Some(KeyKind::List),
            "count" => Some(KeyKind::Count),
            _ => None,
        }
    }
}

/// A fully qualified, tenant-scoped cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    module: Option<String>,
    entity: String,
    kind: KeyKind,
    tenant_id: String,
    suffix: String,
}

impl CacheKey {
    /// Build a key, validating every fixed segment.
    ///
    /// An empty module is treated as "no module". An empty suffix becomes
    /// [`ALL_SUFFIX`].
    pub fn new(
        module: Option<&str>,
        entity: &str,
        kind: KeyKind,
        tenant_id: &str,
        suffix: &str,
    ) -> Result<Self, KeyError> {
        let module = match module {
            Some(m) if !m.is_empty() => {
                validate_segment("module", m)?;
                Some(m.to_string())
            }
            _ => None,
        };
        validate_segment("entity", entity)?;
        validate_tenant_id(tenant_id)?;

        Ok(Self {
            module,
            entity: entity.to_string(),
            kind,
            tenant_id: tenant_id.to_string(),
            suffix: if suffix.is_empty() {
                ALL_SUFFIX.to_string()
            } else {
                suffix.to_string()
            },
        })
    }

    /// Key for a single record.
    pub fn detail(
        module: Option<&str>,
        entity: &str,
        tenant_id: &str,
        id: &str,
    ) -> Result<Self, KeyError> {
        Self::new(module, entity, KeyKind::Detail, tenant_id, id)
    }

    /// Key for a filtered list.
    pub fn list(
        module: Option<&str>,
        entity: &str,
        tenant_id: &str,
        filter_digest: &str,
    ) -> Result<Self, KeyError> {
        Self::new(module, entity, KeyKind::List, tenant_id, filter_digest)
    }

    /// Key for a filtered count.
    pub fn count(
        module: Option<&str>,
        entity: &str,
        tenant_id: &str,
        filter_digest: &str,
    ) -> Result<Self, KeyError> {
        Self::new(module, entity, KeyKind::Count, tenant_id, filter_digest)
    }

    /// Parse a key produced by [`CacheKey`]'s `Display`.
    ///
    /// `has_module` must match how the key was built; the layout has no
    /// marker distinguishing a module segment from an entity segment.
    pub fn parse(key: &str, has_module: bool) -> Option<Self> {
        let mut parts = key.splitn(if has_module { 5 } else { 4 }, SEPARATOR);
        let module = if has_module {
            Some(parts.next()?.to_string())
        } else {
            None
        };
        let entity = parts.next()?;
        let mut next = parts.next()?;
        let kind = match KeyKind::from_segment(next) {
            Some(kind) => {
                next = parts.next()?;
                kind
            }
            None => KeyKind::Detail,
        };
        let tenant_id = next;
        let suffix = parts.collect::<Vec<_>>().join(":");
        if suffix.is_empty() {
            return None;
        }

        Self::new(module.as_deref(), entity, kind, tenant_id, &suffix).ok()
    }

    /// Pattern matching every key of `tenant_id`.
    pub fn tenant_pattern(tenant_id: &str) -> String {
        format!("*{SEPARATOR}{tenant_id}{SEPARATOR}*")
    }

    /// Patterns matching every detail, list and count key of one entity
    /// under one tenant.
    pub fn entity_patterns(module: Option<&str>, entity: &str, tenant_id: &str) -> Vec<String> {
        [KeyKind::Detail, KeyKind::List, KeyKind::Count]
            .into_iter()
            .map(|kind| {
                let mut segments: Vec<&str> = Vec::with_capacity(5);
                if let Some(m) = module.filter(|m| !m.is_empty()) {
                    segments.push(m);
                }
                segments.push(entity);
                if let Some(kind) = kind.segment() {
                    segments.push(kind);
                }
                segments.push(tenant_id);
                segments.push("*");
                segments.join(":")
            })
            .collect()
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(module) = &self.module {
            write!(f, "{module}{SEPARATOR}")?;
        }
        f.write_str(&self.entity)?;
        if let Some(kind) = self.kind.segment() {
            write!(f, "{SEPARATOR}{kind}")?;
        }
        write!(f, "{SEPARATOR}{}{SEPARATOR}{}", self.tenant_id, self.suffix)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

/// Check a fixed key segment: non-empty, no `:`, `*` or whitespace.
pub fn validate_segment(segment: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::EmptySegment { segment });
    }
    if let Some(found) = RESERVED_CHARS.find(value) {
        let ch = found.as_str().chars().next().unwrap_or(SEPARATOR);
        return Err(KeyError::ReservedCharacter {
            segment,
            value: value.to_string(),
            ch,
        });
    }
    Ok(())
}

/// Check a tenant id. Besides the segment rules, `list` and `count` are
/// rejected since they would be read back as a key kind.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), KeyError> {
    validate_segment("tenant", tenant_id)?;
    if KeyKind::from_segment(tenant_id).is_some() {
        return Err(KeyError::ReservedSegment {
            segment: "tenant",
            value: tenant_id.to_string(),
        });
    }
    Ok(())
}

/// Join segments with `:`, skipping empty ones.
///
/// This is the unchecked form used for ad-hoc keys; tenant-scoped keys go
/// through [`CacheKey`].
pub fn create_key<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(":")
}

/// Canonical digest of a filter map.
///
/// Null values are dropped, the rest are sorted by key and rendered as
/// `k1:v1|k2:v2`. Returns [`ALL_SUFFIX`] when nothing remains. Two maps with
/// the same pairs produce the same digest regardless of iteration order.
///
/// Separator characters inside keys and string values are backslash-escaped,
/// and strings that read as JSON literals (`"10"`, `"true"`) are quoted so
/// they stay apart from the number or boolean. Plain values are unchanged.
pub fn filter_digest<'a, I, K>(filters: I) -> String
where
    I: IntoIterator<Item = (K, &'a Value)>,
    K: AsRef<str>,
{
    let mut pairs: Vec<(String, String)> = filters
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (escape_digest(k.as_ref()), render_value(v)))
        .collect();
    if pairs.is_empty() {
        return ALL_SUFFIX.to_string();
    }
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("|")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(literal) if !literal.is_string() => format!("\"{}\"", escape_digest(s)),
            _ => escape_digest(s),
        },
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

fn escape_digest(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '|' | ',' | ':' | '"') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
