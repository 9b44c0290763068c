//! Request/response cycle tests against a scripted transport.

mod common;

use client::{CacheConfig, ClientConfig, ClientError, Node, ProxyConfig, RescueConfig, RouteConfig};
use common::{config, Scripted};
use protocol::{auth_key, Endpoint, Method, SessionId, VersionToken};
use serde_json::{json, Value};

fn rescue_config() -> ClientConfig {
    ClientConfig {
        rescue: Some(RescueConfig {
            host: "rescue".to_string(),
            port: 8443,
        }),
        ..config()
    }
}

fn cached_config(dir: &tempfile::TempDir) -> ClientConfig {
    ClientConfig {
        cache: Some(CacheConfig::new(dir.path())),
        ..config()
    }
}

#[test]
fn first_request_on_a_connection_carries_credentials() {
    let script = Scripted::new();
    script.reply(json!({"$data": {"id": 1}}));
    script.reply(json!({"$data": {"id": 2}}));
    let client = script.client(ClientConfig {
        session: SessionId::new("sess-1"),
        ..config()
    });

    client.get("/users/1", Value::Null).unwrap();
    client.get("/users/2", Value::Null).unwrap();

    let sent = script.sent();
    assert_eq!(sent[0].method, Method::Get);
    assert_eq!(
        sent[0].args,
        json!(["/users/1", {
            "$data": null,
            "$client": "client-1",
            "$key": "secret-key",
            "$session": "sess-1"
        }])
    );
    assert_eq!(sent[1].args, json!(["/users/2", {"$data": null}]));
    assert_eq!(script.opened().len(), 1);
}

#[test]
fn plaintext_connections_send_identity_only() {
    let script = Scripted::new();
    script.reply(json!({"$data": null}));
    let client = script.client(ClientConfig {
        clear: true,
        ..config()
    });

    client.post("/events", json!({"kind": "ping"})).unwrap();

    assert_eq!(
        script.sent()[0].args,
        json!(["/events", {"$data": {"kind": "ping"}, "$client": "client-1"}])
    );
}

#[test]
fn routed_requests_act_as_the_routed_client() {
    let script = Scripted::new();
    script.reply(json!({"$data": {"id": 1}}));
    let client = script.client(ClientConfig {
        route: Some(RouteConfig::new("store-9")),
        ..config()
    });

    client.get("/products/1", Value::Null).unwrap();

    let call = &script.sent()[0].args[1];
    assert_eq!(call["$client"], json!("store-9"));
    assert!(call.get("$key").is_none());
}

#[test]
fn proxied_requests_name_the_real_target() {
    let script = Scripted::new();
    script.reply(json!({"$data": {"ok": true}}));
    let client = script.client(ClientConfig {
        proxy: Some(ProxyConfig {
            host: Some("proxy".to_string()),
            port: Some(9000),
            clear: true,
        }),
        ..config()
    });

    client.get("/status", Value::Null).unwrap();

    assert_eq!(script.opened(), vec![Endpoint::new("proxy", 9000).clear()]);
    let call = &script.sent()[0].args[1];
    assert_eq!(
        call["$proxy"],
        json!({"client": "client-1", "host": "primary", "port": 8443})
    );
    assert!(call.get("$key").is_none());
}

#[test]
fn auth_challenge_is_answered_with_the_derived_key() {
    let script = Scripted::new();
    script.reply(json!({"$auth": "nonce-abc123"}));
    script.reply(json!({"$data": {"id": 1}, "$collection": "users"}));
    let client = script.client(config());

    let user = client.get("/users/1", Value::Null).unwrap();

    assert_eq!(user.as_record().unwrap().data(false), json!({"id": 1}));
    let sent = script.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].method, Method::Auth);
    assert_eq!(
        sent[1].args,
        json!([{
            "client": "client-1",
            "key": "76686961fc1164ca90fb25c8ebd627a3",
            "$v": 1
        }])
    );
    assert!(client.is_authenticated());
}

#[test]
fn auth_carries_optional_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new();
    script.reply(json!({"$auth": "n"}));
    script.reply(json!({"$data": true}));
    let client = script.client(ClientConfig {
        api: Some("2024-01".to_string()),
        caller_ip: Some("10.0.0.8".to_string()),
        route: Some(RouteConfig::new("store-9")),
        ..cached_config(&dir)
    });

    client.get("/me", Value::Null).unwrap();

    let params = &script.sent()[1].args[0];
    assert_eq!(params["$api"], json!("2024-01"));
    assert_eq!(params["$ip"], json!("10.0.0.8"));
    assert_eq!(params["$route"], json!({"client": "store-9"}));
    assert_eq!(params["$cached"], json!({}));
    assert_eq!(params["client"], json!("client-1"));
}

#[test]
fn explicit_auth_fetches_a_nonce_first() {
    let script = Scripted::new();
    script.reply(json!({"$auth": "nonce-abc123"}));
    script.reply(json!({"$data": {"authed": true}}));
    let client = script.client(config());

    let reply = client.auth(None).unwrap();

    assert_eq!(reply["$data"], json!({"authed": true}));
    let sent = script.sent();
    assert_eq!(sent[0].method, Method::Auth);
    assert_eq!(sent[0].args, json!([]));
    assert_eq!(sent[1].args[0]["key"], json!("76686961fc1164ca90fb25c8ebd627a3"));
}

#[test]
fn repeated_challenge_is_a_rejection() {
    let script = Scripted::new();
    script.reply(json!({"$auth": "n1"}));
    script.reply(json!({"$auth": "n2"}));
    let client = script.client(config());

    let err = client.get("/users", Value::Null).unwrap_err();

    assert!(matches!(err, ClientError::Server { .. }), "{err}");
}

#[test]
fn challenge_with_end_replays_on_a_fresh_connection() {
    let script = Scripted::new();
    script.reply(json!({"$auth": "n1", "$end": true}));
    script.reply(json!({"$data": "ok"}));
    let client = script.client(config());

    let node = client.get("/ping", Value::Null).unwrap();

    assert_eq!(node.as_value(), Some(&json!("ok")));
    let sent = script.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|s| s.method == Method::Get));
    assert_eq!(sent[1].args[1]["$client"], json!("client-1"));
    assert_eq!(script.opened().len(), 2);
}

#[test]
fn second_session_end_is_reported() {
    let script = Scripted::new();
    script.reply(json!({"$auth": "n1", "$end": true}));
    script.reply(json!({"$auth": "n2", "$end": true}));
    let client = script.client(config());

    let err = client.get("/ping", Value::Null).unwrap_err();

    assert!(matches!(err, ClientError::SessionEnded { .. }), "{err}");
}

#[test]
fn bare_end_is_not_data() {
    let script = Scripted::new();
    script.reply(json!({"$end": true}));
    let client = script.client(config());

    let err = client.delete("/sessions/current", Value::Null).unwrap_err();

    assert!(matches!(err, ClientError::SessionEnded { ref method } if method == "delete"));
    assert_eq!(script.sent().len(), 1);
}

#[test]
fn server_errors_are_not_retried() {
    let script = Scripted::new();
    script.reply(json!({"$error": "Not found"}));
    let client = script.client(rescue_config());

    let err = client.get("/users/404", Value::Null).unwrap_err();

    assert!(matches!(err, ClientError::Server { ref message } if message == "Not found"));
    assert_eq!(script.sent().len(), 1);
    assert!(!client.is_rescued());
}

#[test]
fn refused_primary_fails_over_to_rescue() {
    let script = Scripted::new();
    script.refuse("primary");
    script.reply(json!({"$data": {"id": 1}}));
    let client = script.client(rescue_config());

    client.get("/users/1", Value::Null).unwrap();

    let hosts: Vec<String> = script.opened().into_iter().map(|e| e.host).collect();
    assert_eq!(hosts, vec!["primary", "rescue"]);
    assert_eq!(script.sent()[0].host, "rescue");
    assert!(client.is_rescued());
}

#[test]
fn dropped_request_is_replayed_on_rescue() {
    let script = Scripted::new();
    script.drop_connection();
    script.reply(json!({"$data": {"id": 1}}));
    let client = script.client(rescue_config());

    client.put("/users/1", json!({"name": "Ada"})).unwrap();

    let sent = script.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].host, "primary");
    assert_eq!(sent[1].host, "rescue");
    assert_eq!(sent[0].args, sent[1].args);
}

#[test]
fn failover_happens_once() {
    let script = Scripted::new();
    script.refuse("primary").refuse("rescue");
    let client = script.client(rescue_config());

    let err = client.get("/users/1", Value::Null).unwrap_err();

    assert!(matches!(err, ClientError::Network { code: Some(111), .. }));
    assert_eq!(script.opened().len(), 2);
}

#[test]
fn dropped_auth_call_is_resent_on_rescue() {
    let script = Scripted::new();
    script.drop_connection();
    script.reply(json!({"$auth": "n2"}));
    script.reply(json!({"$data": {"authed": true}}));
    let client = script.client(rescue_config());

    let reply = client.auth(Some("n1")).unwrap();

    assert_eq!(reply["$data"], json!({"authed": true}));
    let sent = script.sent();
    let hosts: Vec<&str> = sent.iter().map(|s| s.host.as_str()).collect();
    assert_eq!(hosts, vec!["primary", "rescue", "rescue"]);
    assert!(sent.iter().all(|s| s.method == Method::Auth));
    assert_eq!(
        sent[0].args[0]["key"],
        json!(auth_key("n1", "client-1", "secret-key"))
    );
    assert_eq!(sent[1].args, json!([]));
    assert_eq!(
        sent[2].args[0]["key"],
        json!(auth_key("n2", "client-1", "secret-key"))
    );
    assert!(client.is_rescued());
    assert_eq!(script.pending(), 0);
}

#[test]
fn auth_call_failing_on_rescue_too_is_reported() {
    let script = Scripted::new();
    script.drop_connection();
    script.reply(json!({"$auth": "n2"}));
    script.drop_connection();
    let client = script.client(rescue_config());

    let err = client.auth(Some("n1")).unwrap_err();

    assert!(matches!(err, ClientError::Network { code: Some(104), .. }), "{err}");
    let hosts: Vec<String> = script.opened().into_iter().map(|e| e.host).collect();
    assert_eq!(hosts, vec!["primary", "rescue"]);
    assert_eq!(script.sent().len(), 3);
}

#[test]
fn network_errors_propagate_without_rescue() {
    let script = Scripted::new();
    script.refuse("primary");
    let client = script.client(config());

    let err = client.get("/users/1", Value::Null).unwrap_err();

    assert!(matches!(err, ClientError::Network { .. }));
    assert_eq!(script.opened().len(), 1);
    assert!(!client.is_rescued());
}

#[test]
fn scalar_and_missing_data() {
    let script = Scripted::new();
    script.reply(json!({"$data": 42}));
    script.reply(json!({"$collection": "users"}));
    let client = script.client(config());

    assert_eq!(client.get("/count", Value::Null).unwrap().as_value(), Some(&json!(42)));
    assert!(client.post("/noop", Value::Null).unwrap().is_null());
}

#[test]
fn result_url_defaults_to_the_request_url() {
    let script = Scripted::new();
    script.reply(json!({"$data": {"id": 1}}));
    script.reply(json!({"$url": "/canonical/1", "$data": {"id": 1}}));
    let client = script.client(config());

    let first = client.get("/users/1", Value::Null).unwrap();
    let second = client.get("/users/1", Value::Null).unwrap();

    assert_eq!(first.as_resource().unwrap().url(), "/users/1");
    assert_eq!(second.as_resource().unwrap().url(), "/canonical/1");
}

#[test]
fn cache_hit_skips_the_network() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new();
    script.reply(json!({
        "$data": {"id": 1, "name": "Ada"},
        "$collection": "users",
        "$cached": {"users": "v1"}
    }));
    let client = script.client(cached_config(&dir));

    client.get("/users/1", Value::Null).unwrap();
    let again = client.get("/users/1", Value::Null).unwrap();

    assert_eq!(script.sent().len(), 1);
    assert_eq!(script.sent()[0].args[1]["$cached"], json!({}));
    let record = again.as_record().unwrap();
    assert_eq!(record.get("name").unwrap().as_value(), Some(&json!("Ada")));
    assert_eq!(record.headers()["$cached"], json!(true));
}

#[test]
fn writes_are_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new();
    script.reply(json!({"$data": {"id": 1}, "$collection": "users", "$cached": {"users": "v1"}}));
    script.reply(json!({"$data": {"id": 1}, "$collection": "users", "$cached": {"users": "v1"}}));
    let client = script.client(cached_config(&dir));

    client.post("/users/1", Value::Null).unwrap();
    client.get("/users/1", Value::Null).unwrap();

    assert_eq!(script.sent().len(), 2);
    let indexed = client.with_cache(|c| c.index().get("users").map_or(0, |keys| keys.len()));
    assert_eq!(indexed, Some(1));
}

#[test]
fn version_change_purges_the_collection() {
    let dir = tempfile::tempdir().unwrap();
    let script = Scripted::new();
    script.reply(json!({"$data": {"id": 1}, "$collection": "users", "$cached": {"users": "v1"}}));
    script.reply(json!({"$data": {"id": 2}, "$collection": "users"}));
    script.reply(json!({"$data": {"id": 3}, "$collection": "users", "$cached": {"users": "v2"}}));
    script.reply(json!({"$data": {"id": 1, "name": "fresh"}, "$collection": "users"}));
    let client = script.client(cached_config(&dir));

    client.get("/users/1", Value::Null).unwrap();
    client.get("/users/2", Value::Null).unwrap();
    assert_eq!(client.with_cache(|c| c.index()["users"].len()), Some(2));

    client.get("/users/3", Value::Null).unwrap();
    let version = client.with_cache(|c| c.versions().get("users").cloned()).flatten();
    assert_eq!(version, Some(VersionToken::from("v2")));
    assert_eq!(client.with_cache(|c| c.index()["users"].len()), Some(1));

    let refetched = client.get("/users/1", Value::Null).unwrap();
    assert_eq!(script.sent().len(), 4);
    assert_eq!(
        refetched.as_record().unwrap().get("name").unwrap().as_value(),
        Some(&json!("fresh"))
    );
}

#[test]
fn cache_write_failure_aborts_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();
    let script = Scripted::new();
    script.reply(json!({"$data": {"id": 1}, "$collection": "users", "$cached": {"users": "v1"}}));
    let client = script.client(ClientConfig {
        cache: Some(CacheConfig::new(&blocker)),
        ..config()
    });

    let err = client.get("/users/1", Value::Null).unwrap_err();

    assert!(matches!(err, ClientError::Cache(_)), "{err}");
}

#[test]
fn put_resource_writes_back_to_its_url() {
    let script = Scripted::new();
    script.reply(json!({"$data": {"id": 1, "name": "Ada"}}));
    script.reply(json!({"$data": {"id": 1, "name": "Grace"}}));
    let client = script.client(config());

    let user = client.get("/users/1", Value::Null).unwrap();
    let record = user.as_record().unwrap();
    record.set("name", json!("Grace"));
    let saved = client.put_resource(user.as_resource().unwrap()).unwrap();

    let sent = script.sent();
    assert_eq!(sent[1].method, Method::Put);
    assert_eq!(sent[1].args, json!(["/users/1", {"$data": {"id": 1, "name": "Grace"}}]));
    assert!(matches!(saved, Node::Resource(_)));
}

#[test]
fn auth_method_is_not_a_plain_request() {
    let script = Scripted::new();
    let client = script.client(config());

    assert!(matches!(
        client.request(Method::Auth, "/", Value::Null),
        Err(ClientError::Configuration { .. })
    ));
    assert!(script.sent().is_empty());
}

#[test]
fn default_limit_is_adjustable() {
    let client = Scripted::new().client(config());
    assert_eq!(client.default_limit(), None);
    client.set_default_limit(Some(25));
    assert_eq!(client.config().default_limit, Some(25));
}
