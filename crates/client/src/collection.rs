//! Paginated result sets.

use std::fmt;
use std::rc::Rc;

use protocol::{keys, LinkMap, Payload};
use serde_json::{Map, Value};

use crate::record::error_placeholder;
use crate::resource::Parts;
use crate::{Client, Node, Record};

/// One page of records plus its pagination metadata.
///
/// Every record shares the collection's link graph. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Collection {
    inner: Rc<CollectionState>,
}

#[derive(Debug)]
struct CollectionState {
    url: String,
    headers: Payload,
    links: Rc<LinkMap>,
    count: Value,
    page: Value,
    pages: Value,
    /// Metadata keys other than `results`, `count`, `page` and `pages`.
    extras: Payload,
    records: Vec<Record>,
    client: Option<Client>,
}

impl Collection {
    pub(crate) fn new(parts: Parts, client: Option<Client>) -> Self {
        let Parts {
            url,
            data,
            headers,
            links,
        } = parts;
        let Value::Object(mut body) = data else {
            return Self::empty(url, headers, links, client);
        };

        let results = body.remove("results").unwrap_or(Value::Null);
        let count = body.remove("count").unwrap_or(Value::Null);
        let page = body.remove("page").unwrap_or(Value::Null);
        let pages = body.remove("pages").unwrap_or(Value::Null);

        let base = format!("/{}", strip_query(&url).trim_matches('/'));
        let records = match results {
            Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    let record_url = match item.get("id").and_then(id_text) {
                        Some(id) => format!("{base}/{id}"),
                        None => base.clone(),
                    };
                    Record::new(record_url, item, Payload::new(), Rc::clone(&links), client.clone())
                })
                .collect(),
            _ => Vec::new(),
        };

        Self {
            inner: Rc::new(CollectionState {
                url,
                headers,
                links,
                count,
                page,
                pages,
                extras: body,
                records,
                client,
            }),
        }
    }

    fn empty(url: String, headers: Payload, links: Rc<LinkMap>, client: Option<Client>) -> Self {
        Self {
            inner: Rc::new(CollectionState {
                url,
                headers,
                links,
                count: Value::Null,
                page: Value::Null,
                pages: Value::Null,
                extras: Payload::new(),
                records: Vec::new(),
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

    /// Total number of records across all pages, as reported by the server.
    pub fn count(&self) -> u64 {
        self.inner.count.as_u64().unwrap_or(0)
    }

    pub fn page(&self) -> &Value {
        &self.inner.page
    }

    pub fn pages(&self) -> &Value {
        &self.inner.pages
    }

    /// Metadata keys the server sent alongside the page.
    pub fn extras(&self) -> &Payload {
        &self.inner.extras
    }

    pub fn records(&self) -> &[Record] {
        &self.inner.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.inner.records.iter()
    }

    /// Records on this page.
    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    /// Looks up `key` as pagination metadata, `results`, a position on the
    /// page, or a record id, in that order.
    pub fn get(&self, key: &str) -> Option<Node> {
        let state = &self.inner;
        let meta = match key {
            "count" => Some(&state.count),
            "page" => Some(&state.page),
            "pages" => Some(&state.pages),
            _ => state.extras.get(key),
        };
        if let Some(value) = meta.filter(|v| !v.is_null()) {
            return Some(Node::Value(value.clone()));
        }
        if key == "results" {
            let results = state.records.iter().map(|r| r.data(false)).collect();
            return Some(Node::Value(Value::Array(results)));
        }
        if let Some(record) = key.parse::<usize>().ok().and_then(|i| state.records.get(i)) {
            return Some(Node::from(record.clone()));
        }
        self.find(key).map(Node::from)
    }

    /// The record on this page whose `id` is `id`.
    pub fn find(&self, id: &str) -> Option<Record> {
        self.inner
            .records
            .iter()
            .find(|record| {
                record
                    .data(false)
                    .get("id")
                    .and_then(id_text)
                    .is_some_and(|candidate| candidate == id)
            })
            .cloned()
    }

    /// `{count, results, pages, page}`, records rendered with `raw`.
    pub fn data(&self, raw: bool) -> Value {
        let state = &self.inner;
        let mut data = Map::new();
        data.insert("count".to_string(), state.count.clone());
        data.insert(
            "results".to_string(),
            Value::Array(state.records.iter().map(|r| r.data(raw)).collect()),
        );
        data.insert("pages".to_string(), state.pages.clone());
        data.insert("page".to_string(), state.page.clone());
        Value::Object(data)
    }

    /// Records with `depth` levels of their linked fields expanded.
    pub fn dump(&self, depth: usize) -> Value {
        let state = &self.inner;
        let results: Vec<Value> = state
            .records
            .iter()
            .map(|record| {
                let mut data = record.data(false);
                if depth > 0 {
                    for (field, _) in state.links.iter().filter(|(_, link)| link.url.is_some()) {
                        let related = match record.get(field) {
                            Ok(node) => node.dump(depth - 1),
                            Err(e) => error_placeholder(&e),
                        };
                        if let Value::Object(map) = &mut data {
                            map.insert(field.to_string(), related);
                        }
                    }
                }
                data
            })
            .collect();

        let mut dump = Map::new();
        dump.insert("count".to_string(), state.count.clone());
        let has_results = !results.is_empty();
        dump.insert("results".to_string(), Value::Array(results));
        if has_results && !state.links.is_empty() {
            dump.insert(keys::LINKS.to_string(), state.links.dump());
        }
        if self.count() > 0 {
            dump.insert("page".to_string(), state.page.clone());
        }
        if is_truthy(&state.pages) {
            dump.insert("pages".to_string(), state.pages.clone());
        }
        Value::Object(dump)
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.url)
    }
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

fn id_text(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Resource;
    use serde_json::json;

    fn collection(value: Value) -> Collection {
        let Value::Object(result) = value else {
            unreachable!()
        };
        match Resource::instance(result, None) {
            Resource::Collection(collection) => collection,
            Resource::Record(_) => panic!("expected a collection"),
        }
    }

    fn users() -> Collection {
        collection(json!({
            "$url": "/users/?limit=2",
            "$links": {"account": {"url": "/accounts/{account_id}"}},
            "$collection": "users",
            "$data": {
                "count": 3,
                "page": 1,
                "pages": {"1": {"start": 1, "end": 2}, "2": {"start": 3, "end": 3}},
                "results": [
                    {"id": "u1", "name": "Ada"},
                    {"id": 7, "name": "Grace"}
                ],
                "facets": {"role": 2}
            }
        }))
    }

    #[test]
    fn records_get_urls_from_their_ids() {
        let users = users();
        let urls: Vec<&str> = users.iter().map(Record::url).collect();
        assert_eq!(urls, vec!["/users/u1", "/users/7"]);
    }

    #[test]
    fn records_share_the_link_graph() {
        let users = users();
        for record in &users {
            assert!(Rc::ptr_eq(record.links(), users.links()));
        }
    }

    #[test]
    fn metadata_accessors() {
        let users = users();
        assert_eq!(users.count(), 3);
        assert_eq!(users.page(), &json!(1));
        assert_eq!(users.len(), 2);
        assert_eq!(users.extras()["facets"], json!({"role": 2}));
        assert_eq!(users.headers()["$collection"], json!("users"));
        assert_eq!(users.get("facets").unwrap().as_value(), Some(&json!({"role": 2})));
    }

    #[test]
    fn lookup_by_position_and_id() {
        let users = users();
        assert_eq!(users.get("0").unwrap().as_record().unwrap().url(), "/users/u1");
        assert_eq!(users.get("u1").unwrap().as_record().unwrap().url(), "/users/u1");
        assert_eq!(users.find("7").unwrap().url(), "/users/7");
        assert!(users.get("nobody").is_none());
        assert_eq!(
            users.get("results").unwrap().as_value().unwrap().as_array().unwrap().len(),
            2
        );
    }

    #[test]
    fn data_shape() {
        let data = users().data(false);
        assert_eq!(data["count"], json!(3));
        assert_eq!(data["results"][1]["name"], json!("Grace"));
        assert!(data.get("facets").is_none());
    }

    #[test]
    fn records_without_ids_use_the_collection_url() {
        let c = collection(json!({
            "$url": "/logs",
            "$data": {"count": 1, "results": [{"message": "hi"}]}
        }));
        assert_eq!(c.records()[0].url(), "/logs");
    }

    #[test]
    fn dump_omits_empty_pagination() {
        let c = collection(json!({
            "$url": "/logs",
            "$data": {"count": 0, "results": [], "page": 1, "pages": {}}
        }));
        assert_eq!(c.dump(0), json!({"count": 0, "results": []}));
    }

    #[test]
    fn dump_includes_links_and_pages() {
        let dump = users().dump(0);
        assert_eq!(dump["$links"], json!({"account": "/accounts/{account_id}"}));
        assert_eq!(dump["page"], json!(1));
        assert!(dump["pages"].is_object());
    }
}
