//! Single-object resources with lazily resolved links.
//!
//! Field access consults the link graph first. A linked field resolves, in
//! order, to the memoized link result, the inline (expanded) value, or a live
//! fetch of the link url. Unlinked structured values are promoted to child
//! records once and reused.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use protocol::{keys, ClientError, LinkMap, Payload};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{Client, Node, Resource};

/// Fetched link results whose serialized size reaches this are not memoized.
pub const LINK_CACHE_LIMIT: usize = 1 << 20;

/// A single record. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct Record {
    inner: Rc<RecordState>,
}

#[derive(Debug)]
struct RecordState {
    url: String,
    headers: Payload,
    links: Rc<LinkMap>,
    /// Object or array.
    fields: RefCell<Value>,
    /// Structured field values promoted to records.
    children: RefCell<BTreeMap<String, Record>>,
    /// Resolved links and values written to linked fields.
    link_data: RefCell<BTreeMap<String, Node>>,
    client: Option<Client>,
}

impl Record {
    pub(crate) fn new(
        url: String,
        data: Value,
        headers: Payload,
        links: Rc<LinkMap>,
        client: Option<Client>,
    ) -> Self {
        let fields = match data {
            Value::Object(_) | Value::Array(_) => data,
            _ => Value::Object(Map::new()),
        };
        Self {
            inner: Rc::new(RecordState {
                url,
                headers,
                links,
                fields: RefCell::new(fields),
                children: RefCell::new(BTreeMap::new()),
                link_data: RefCell::new(BTreeMap::new()),
                client,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn headers(&self) -> &Payload {
        &self.inner.headers
    }

    pub fn links(&self) -> &Rc<LinkMap> {
        &self.inner.links
    }

    pub fn client(&self) -> Option<&Client> {
        self.inner.client.as_ref()
    }

    /// Links resolved so far, and values written to linked fields.
    pub fn link_data(&self) -> BTreeMap<String, Node> {
        self.inner.link_data.borrow().clone()
    }

    /// Returns `true` when both handles refer to the same record.
    pub fn same(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Raw field names.
    pub fn keys(&self) -> Vec<String> {
        match &*self.inner.fields.borrow() {
            Value::Object(map) => map.keys().cloned().collect(),
            Value::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match &*self.inner.fields.borrow() {
            Value::Object(map) => map.len(),
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` when `field` has a raw value or is a declared link.
    pub fn contains(&self, field: &str) -> bool {
        lookup(&self.inner.fields.borrow(), field).is_some()
            || field == keys::LINKS
            || self.inner.links.is_linked(field)
    }

    /// Field access.
    ///
    /// `$links` yields field → resolved url for every declared link.
    ///
    /// # Errors
    ///
    /// Whatever the client returns when a link has to be fetched.
    pub fn get(&self, field: &str) -> Result<Node, ClientError> {
        if field == keys::LINKS || self.inner.links.is_linked(field) {
            let node = self.link(field)?;
            if !node.is_null() {
                return Ok(node);
            }
        }
        Ok(self.field(field))
    }

    /// Writes a field. Writes to a linked field replace the link's resolved
    /// value and leave the raw data untouched.
    pub fn set(&self, field: &str, value: impl Into<Node>) {
        let node = value.into();
        if self.inner.links.is_linked(field) {
            self.inner.link_data.borrow_mut().insert(field.to_string(), node);
            return;
        }
        self.inner.children.borrow_mut().remove(field);
        store(&mut self.inner.fields.borrow_mut(), field, node.to_value());
    }

    /// Overwrites raw fields with `fields`, linked or not. Anything promoted
    /// or resolved from an overwritten field is dropped.
    pub(crate) fn merge(&self, fields: Map<String, Value>) {
        let mut raw = self.inner.fields.borrow_mut();
        let mut children = self.inner.children.borrow_mut();
        let mut link_data = self.inner.link_data.borrow_mut();
        for (field, value) in fields {
            children.remove(&field);
            link_data.remove(&field);
            store(&mut raw, &field, value);
        }
    }

    /// Drops a field's raw value and anything resolved from it.
    pub fn unset(&self, field: &str) {
        self.inner.children.borrow_mut().remove(field);
        self.inner.link_data.borrow_mut().remove(field);
        discard(&mut self.inner.fields.borrow_mut(), field);
    }

    /// The url a link field resolves to: this record's url without its query,
    /// with the last segment replaced by `id` when given, plus `/field`.
    pub fn link_url(&self, field: &str, id: Option<&str>) -> String {
        let url = self.inner.url.as_str();
        let mut base = match url.find('?') {
            Some(pos) if pos > 0 => url[..pos].to_string(),
            _ => url.to_string(),
        };
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            let trimmed = base.trim_end_matches('/');
            base = match trimmed.rfind('/') {
                Some(pos) => format!("{}{id}", &trimmed[..=pos]),
                None if trimmed.is_empty() => String::new(),
                None => id.to_string(),
            };
        }
        format!("{base}/{field}")
    }

    /// Raw fields. With `raw`, promoted children and resolved link resources
    /// are flattened in.
    pub fn data(&self, raw: bool) -> Value {
        let mut data = self.inner.fields.borrow().clone();
        if raw {
            for (field, child) in self.inner.children.borrow().iter() {
                store(&mut data, field, child.data(true));
            }
            for (field, node) in self.inner.link_data.borrow().iter() {
                if let Node::Resource(resource) = node {
                    store(&mut data, field, resource.data(true));
                }
            }
        }
        data
    }

    /// Raw fields plus `depth` levels of linked resources and the link graph.
    /// A link that fails to resolve is shown as `{"$error": message}`.
    pub fn dump(&self, depth: usize) -> Value {
        let mut dump = self.data(false);
        let links = Rc::clone(&self.inner.links);
        if depth > 0 {
            for (field, _) in links.iter().filter(|(_, link)| link.url.is_some()) {
                let related = match self.get(field) {
                    Ok(node) => node.dump(depth - 1),
                    Err(e) => error_placeholder(&e),
                };
                store(&mut dump, field, related);
            }
        }
        if !links.is_empty() {
            store(&mut dump, keys::LINKS, links.dump());
        }
        dump
    }

    fn link(&self, field: &str) -> Result<Node, ClientError> {
        let links = &self.inner.links;
        if field == keys::LINKS {
            let urls: Map<String, Value> = links
                .declared_fields()
                .into_iter()
                .map(|name| (name.to_string(), Value::String(self.link_url(name, None))))
                .collect();
            return Ok(Node::Value(Value::Object(urls)));
        }
        if let Some(node) = self.inner.link_data.borrow().get(field) {
            return Ok(node.clone());
        }

        let link = links.get(field).cloned().unwrap_or_default();
        let inline = lookup(&self.inner.fields.borrow(), field);
        if let Some(value) = inline {
            if link.is_formula(field) {
                discard(&mut self.inner.fields.borrow_mut(), field);
                return self.link(field);
            }
            let node = if is_structured(&value) {
                let mut result = Payload::new();
                result.insert(keys::URL.to_string(), Value::String(self.link_url(field, None)));
                result.insert(keys::DATA.to_string(), value);
                let nested = link.links.clone().unwrap_or_else(LinkMap::empty);
                Node::Resource(Resource::build(result, Some(nested), self.inner.client.clone()))
            } else {
                Node::Value(value)
            };
            self.inner
                .link_data
                .borrow_mut()
                .insert(field.to_string(), node.clone());
            return Ok(node);
        }

        let Some(client) = self.inner.client.as_ref() else {
            return Ok(Node::Value(Value::Null));
        };
        let url = self.link_url(field, None);
        let mut args = Map::new();
        if let Some(limit) = client.default_limit() {
            args.insert("limit".to_string(), Value::from(limit));
        }
        let node = client.get(&url, Value::Object(args))?;
        let footprint = node.footprint();
        if footprint < LINK_CACHE_LIMIT {
            self.inner
                .link_data
                .borrow_mut()
                .insert(field.to_string(), node.clone());
        } else {
            debug!(url, footprint, "link result too large to keep");
        }
        Ok(node)
    }

    fn field(&self, field: &str) -> Node {
        if let Some(child) = self.inner.children.borrow().get(field) {
            return Node::from(child.clone());
        }
        let Some(value) = lookup(&self.inner.fields.borrow(), field) else {
            return Node::Value(Value::Null);
        };
        if !is_structured(&value) || is_empty(&value) {
            return Node::Value(value);
        }

        let links = &self.inner.links;
        let child_links = links
            .each()
            .cloned()
            .or_else(|| links.get(field).and_then(|link| link.links.clone()))
            .unwrap_or_else(LinkMap::empty);
        let mut headers = Payload::new();
        if let Some(collection) = self.inner.headers.get(keys::COLLECTION) {
            headers.insert(keys::COLLECTION.to_string(), collection.clone());
        }
        let child = Record::new(
            self.link_url(field, None),
            value,
            headers,
            child_links,
            self.inner.client.clone(),
        );
        self.inner
            .children
            .borrow_mut()
            .insert(field.to_string(), child.clone());
        Node::from(child)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.url)
    }
}

pub(crate) fn error_placeholder(error: &ClientError) -> Value {
    let message = match error {
        ClientError::Server { message } => message.clone(),
        other => other.to_string(),
    };
    let mut placeholder = Map::new();
    placeholder.insert(keys::ERROR.to_string(), Value::String(message));
    Value::Object(placeholder)
}

fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn lookup(fields: &Value, field: &str) -> Option<Value> {
    match fields {
        Value::Object(map) => map.get(field).cloned(),
        Value::Array(items) => field.parse::<usize>().ok().and_then(|i| items.get(i)).cloned(),
        _ => None,
    }
}

/// Writes `field`. An array only takes in-range indices or an append; any
/// other key turns it into an object keyed by index.
fn store(fields: &mut Value, field: &str, value: Value) {
    if let Value::Array(items) = fields {
        match field.parse::<usize>() {
            Ok(i) if i < items.len() => {
                items[i] = value;
                return;
            }
            Ok(i) if i == items.len() => {
                items.push(value);
                return;
            }
            _ => {
                let indexed: Map<String, Value> = items
                    .drain(..)
                    .enumerate()
                    .map(|(i, item)| (i.to_string(), item))
                    .collect();
                *fields = Value::Object(indexed);
            }
        }
    }
    if let Value::Object(map) = fields {
        map.insert(field.to_string(), value);
    }
}

fn discard(fields: &mut Value, field: &str) {
    match fields {
        Value::Object(map) => {
            map.remove(field);
        }
        Value::Array(items) => {
            if let Some(item) = field.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *item = Value::Null;
            }
        }
        _ => {}
    }
}
