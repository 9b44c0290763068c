//! The value model handed back to callers: [`Node`] and [`Resource`].

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use protocol::{keys, ClientError, LinkMap, Method, Payload};
use serde_json::Value;

use crate::{Client, Collection, Record};

/// What a request or a field access yields: a resource, or plain JSON.
#[derive(Debug, Clone)]
pub enum Node {
    Resource(Resource),
    Value(Value),
}

impl Node {
    pub fn is_null(&self) -> bool {
        matches!(self, Node::Value(Value::Null))
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Node::Resource(resource) => Some(resource),
            Node::Value(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        self.as_resource().and_then(Resource::as_record)
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        self.as_resource().and_then(Resource::as_collection)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Value(value) => Some(value),
            Node::Resource(_) => None,
        }
    }

    /// Plain JSON, with resources flattened including resolved links.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Resource(resource) => resource.data(true),
            Node::Value(value) => value.clone(),
        }
    }

    /// Serialized size of [`Node::to_value`], used to decide whether a fetched
    /// link is worth keeping in memory.
    pub fn footprint(&self) -> usize {
        self.to_value().to_string().len()
    }

    /// Renders the node for display, expanding links `depth` levels deep.
    pub fn dump(&self, depth: usize) -> Value {
        match self {
            Node::Resource(resource) => resource.dump(depth),
            Node::Value(value) => value.clone(),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::Value(value)
    }
}

impl From<Resource> for Node {
    fn from(resource: Resource) -> Self {
        Node::Resource(resource)
    }
}

impl From<Record> for Node {
    fn from(record: Record) -> Self {
        Node::Resource(Resource::Record(record))
    }
}

impl From<Collection> for Node {
    fn from(collection: Collection) -> Self {
        Node::Resource(Resource::Collection(collection))
    }
}

/// A server resource: a single record or a page of records.
#[derive(Debug, Clone)]
pub enum Resource {
    Record(Record),
    Collection(Collection),
}

impl Resource {
    /// Builds the resource for a result payload. `$data` shaped like
    /// `{results: [...], count: N}` is a collection, anything else a record.
    pub fn instance(result: Payload, client: Option<Client>) -> Resource {
        Resource::build(result, None, client)
    }

    /// Like [`Resource::instance`], with an already parsed link graph taking
    /// the place of any `$links` header.
    pub(crate) fn build(
        result: Payload,
        links: Option<Rc<LinkMap>>,
        client: Option<Client>,
    ) -> Resource {
        let parts = Parts::split(result, links);
        if is_collection(&parts.data) {
            Resource::Collection(Collection::new(parts, client))
        } else {
            Resource::Record(Record::new(
                parts.url,
                parts.data,
                parts.headers,
                parts.links,
                client,
            ))
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Resource::Record(record) => Some(record),
            Resource::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Resource::Collection(collection) => Some(collection),
            Resource::Record(_) => None,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Resource::Record(record) => record.url(),
            Resource::Collection(collection) => collection.url(),
        }
    }

    /// Reply headers other than `$data`, `$url` and `$links`.
    pub fn headers(&self) -> &Payload {
        match self {
            Resource::Record(record) => record.headers(),
            Resource::Collection(collection) => collection.headers(),
        }
    }

    pub fn links(&self) -> &Rc<LinkMap> {
        match self {
            Resource::Record(record) => record.links(),
            Resource::Collection(collection) => collection.links(),
        }
    }

    pub fn client(&self) -> Option<&Client> {
        match self {
            Resource::Record(record) => record.client(),
            Resource::Collection(collection) => collection.client(),
        }
    }

    /// Resolved links. Collections resolve links per record, so theirs is empty.
    pub fn link_data(&self) -> BTreeMap<String, Node> {
        match self {
            Resource::Record(record) => record.link_data(),
            Resource::Collection(_) => BTreeMap::new(),
        }
    }

    /// The resource's data. With `raw`, resolved links and promoted values
    /// are flattened into it.
    pub fn data(&self, raw: bool) -> Value {
        match self {
            Resource::Record(record) => record.data(raw),
            Resource::Collection(collection) => collection.data(raw),
        }
    }

    /// Field access. See [`Record::get`] and [`Collection::get`].
    pub fn get(&self, field: &str) -> Result<Node, ClientError> {
        match self {
            Resource::Record(record) => record.get(field),
            Resource::Collection(collection) => {
                Ok(collection.get(field).unwrap_or(Node::Value(Value::Null)))
            }
        }
    }

    pub fn dump(&self, depth: usize) -> Value {
        match self {
            Resource::Record(record) => record.dump(depth),
            Resource::Collection(collection) => collection.dump(depth),
        }
    }

    /// The link graph rendered as field → url.
    pub fn dump_links(&self) -> Value {
        self.links().dump()
    }

    /// Issues `method` against this resource, or `url/scope` when scoped.
    ///
    /// An unscoped request on a record merges the returned fields into the
    /// record and returns the record itself.
    pub fn request(
        &self,
        method: Method,
        scope: Option<&str>,
        data: Value,
    ) -> Result<Node, ClientError> {
        let client = self.client().ok_or_else(|| ClientError::Configuration {
            message: format!("resource '{}' is not bound to a client", self.url()),
        })?;
        let url = match scope {
            Some(scope) => format!("{}/{}", self.url(), scope.trim_start_matches('/')),
            None => self.url().to_string(),
        };
        let node = client.request(method, &url, data)?;
        if scope.is_some() {
            return Ok(node);
        }
        match (self, &node) {
            (Resource::Record(record), Node::Resource(result)) => {
                if let Value::Object(fields) = result.data(false) {
                    record.merge(fields);
                }
                Ok(Node::Resource(self.clone()))
            }
            (Resource::Record(_), Node::Value(_)) => Ok(Node::Resource(self.clone())),
            (Resource::Collection(_), _) => Ok(node),
        }
    }

    pub fn read(&self, scope: Option<&str>, data: Value) -> Result<Node, ClientError> {
        self.request(Method::Get, scope, data)
    }

    pub fn put(&self, scope: Option<&str>, data: Value) -> Result<Node, ClientError> {
        self.request(Method::Put, scope, data)
    }

    pub fn post(&self, scope: Option<&str>, data: Value) -> Result<Node, ClientError> {
        self.request(Method::Post, scope, data)
    }

    pub fn delete(&self, scope: Option<&str>, data: Value) -> Result<Node, ClientError> {
        self.request(Method::Delete, scope, data)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url())
    }
}

impl From<Record> for Resource {
    fn from(record: Record) -> Self {
        Resource::Record(record)
    }
}

impl From<Collection> for Resource {
    fn from(collection: Collection) -> Self {
        Resource::Collection(collection)
    }
}

fn is_collection(data: &Value) -> bool {
    data.as_object()
        .is_some_and(|data| data.contains_key("results") && data.contains_key("count"))
}

/// A result payload taken apart into what every resource keeps.
pub(crate) struct Parts {
    pub(crate) url: String,
    pub(crate) data: Value,
    pub(crate) headers: Payload,
    pub(crate) links: Rc<LinkMap>,
}

impl Parts {
    pub(crate) fn split(mut result: Payload, links: Option<Rc<LinkMap>>) -> Parts {
        let url = match result.remove(keys::URL) {
            Some(Value::String(url)) => url,
            _ => String::new(),
        };
        let header_links = result.remove(keys::LINKS);
        let links = links.unwrap_or_else(|| match header_links {
            Some(value) => Rc::new(LinkMap::from_value(&value)),
            None => LinkMap::empty(),
        });
        let data = result.remove(keys::DATA).unwrap_or(Value::Null);
        Parts {
            url,
            data,
            headers: result,
            links,
        }
    }
}
