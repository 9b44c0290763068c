//! Link descriptors: the hypermedia relations declared by a `$links` header.
//!
//! A descriptor graph is parsed once per response and then only read. Records
//! derived from the same collection or parent hold the same [`Rc<LinkMap>`]
//! rather than a copy.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{Map, Value};

/// Key under which declarations for every element of an array or collection
/// are nested.
pub const EACH: &str = "*";

/// A declared relation from one field to another resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Link {
    /// Target url template as sent by the server.
    pub url: Option<String>,
    /// Declarations for the linked resource itself.
    pub links: Option<Rc<LinkMap>>,
}

impl Link {
    /// A link whose template is exactly `{field}` is a computed relation: any
    /// inline value for the field is a placeholder, never expanded data.
    pub fn is_formula(&self, field: &str) -> bool {
        self.url
            .as_deref()
            .and_then(|url| url.strip_prefix('{'))
            .and_then(|url| url.strip_suffix('}'))
            .is_some_and(|name| name == field)
    }
}

/// Field name → [`Link`], plus the optional `*` declarations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkMap {
    fields: BTreeMap<String, Link>,
    each: Option<Rc<LinkMap>>,
}

impl LinkMap {
    /// An empty descriptor graph.
    pub fn empty() -> Rc<LinkMap> {
        Rc::new(LinkMap::default())
    }

    /// Parses a `$links` header. Anything that is not an object yields an
    /// empty map.
    pub fn from_value(value: &Value) -> LinkMap {
        let Value::Object(entries) = value else {
            return LinkMap::default();
        };
        let mut map = LinkMap::default();
        for (key, entry) in entries {
            if key == EACH {
                map.each = Some(Rc::new(LinkMap::from_value(entry)));
                continue;
            }
            let url = entry
                .get("url")
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty())
                .map(str::to_string);
            let links = entry
                .get("links")
                .filter(|l| l.is_object())
                .map(|l| Rc::new(LinkMap::from_value(l)));
            map.fields.insert(key.clone(), Link { url, links });
        }
        map
    }

    /// Returns the declaration for `field`, if any.
    pub fn get(&self, field: &str) -> Option<&Link> {
        self.fields.get(field)
    }

    /// Returns `true` when `field` is declared with a target url.
    pub fn is_linked(&self, field: &str) -> bool {
        self.get(field).is_some_and(|link| link.url.is_some())
    }

    /// The `*` declarations, shared.
    pub fn each(&self) -> Option<&Rc<LinkMap>> {
        self.each.as_ref()
    }

    /// Returns `true` when nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.each.is_none()
    }

    /// Iterates per-field declarations in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Link)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fields that resolve to a url: the `*` declarations when present,
    /// otherwise this map's own fields.
    pub fn declared_fields(&self) -> Vec<&str> {
        let source = self.each.as_deref().unwrap_or(self);
        source
            .fields
            .iter()
            .filter(|(_, link)| link.url.is_some())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Renders the graph as field → url, nesting child declarations and
    /// flattening `*` into the current level.
    pub fn dump(&self) -> Value {
        let mut out = Map::new();
        if let Some(each) = &self.each {
            if let Value::Object(nested) = each.dump() {
                out.extend(nested);
            }
        }
        for (key, link) in &self.fields {
            if let Some(url) = &link.url {
                out.insert(key.clone(), Value::String(url.clone()));
            }
            if let Some(nested) = &link.links {
                out.insert(key.clone(), nested.dump());
            }
        }
        Value::Object(out)
    }
}
