//! Request orchestration: URL parsing, the `GET`/`POST` control flow, and
//! the bus round-trips that back them.
//!
//! Each bus call is a single `async fn`: `.await` suspends without
//! blocking and resumes once the reply arrives, so there's no separate
//! start-function/completion-callback split to maintain. `send` is the
//! one place that pulls a pending reply out of a bus connection; every
//! round-trip in this module funnels through it.

use std::time::Duration;

use dbus::arg::IterAppend;
use dbus::nonblock::{NonblockReply, SyncConnection};
use dbus::Message;
use tokio::sync::oneshot;

use crate::error::GatewayError;
use crate::introspect::{self, Method, Node};
use crate::json::{Kind, Value};
use crate::reader;
use crate::writer;

/// How long a single bus call is allowed to stay unanswered before the
/// gateway gives up and the HTTP client sees a 500.
const CALL_TIMEOUT: Duration = Duration::from_secs(25);

/// Splits `/<destination>[/<rest>]` into a bus name and an object path,
/// defaulting the object path to `/` when the URL names nothing past the
/// destination.
pub fn parse_url(path: &str) -> Result<(String, String), GatewayError> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| GatewayError::MalformedRequest("URL must start with '/'".into()))?;
    match rest.find('/') {
        Some(i) => Ok((rest[..i].to_string(), rest[i..].to_string())),
        None => Ok((rest.to_string(), "/".to_string())),
    }
}

/// Sends `msg` and waits for its reply, translating a dropped connection
/// or a lost `IOResource` into `GatewayError::Internal`.
async fn send(conn: &SyncConnection, msg: Message) -> Result<Message, GatewayError> {
    let (tx, rx) = oneshot::channel();
    let mut tx = Some(tx);
    let callback = SyncConnection::make_f(move |reply: Message, _: &SyncConnection| {
        if let Some(tx) = tx.take() {
            let _ = tx.send(reply);
        }
    });
    conn.send_with_reply(msg, callback)
        .map_err(|_| GatewayError::Internal("failed to send message to the bus".into()))?;
    let reply = tokio::time::timeout(CALL_TIMEOUT, rx)
        .await
        .map_err(|_| GatewayError::Internal("timed out waiting for a bus reply".into()))?
        .map_err(|_| GatewayError::Internal("connection closed before a reply arrived".into()))?;
    Ok(reply)
}

async fn call(
    conn: &SyncConnection,
    destination: &str,
    object: &str,
    interface: &str,
    method: &str,
    build: impl FnOnce(&mut IterAppend),
) -> Result<Message, GatewayError> {
    let mut msg = Message::new_method_call(destination, object, interface, method)
        .map_err(GatewayError::MalformedRequest)?;
    build(&mut IterAppend::new(&mut msg));
    let mut reply = send(conn, msg).await?;
    reply.as_result().map_err(GatewayError::from)?;
    Ok(reply)
}

/// `org.freedesktop.DBus.Properties.GetAll("")`, decoded straight into
/// JSON: the degenerate `GET` case, always called with an empty interface
/// name.
pub async fn get_all_properties(
    conn: &SyncConnection,
    destination: &str,
    object: &str,
) -> Result<Value, GatewayError> {
    let reply = call(
        conn,
        destination,
        object,
        "org.freedesktop.DBus.Properties",
        "GetAll",
        |ia| ia.append(""),
    )
    .await?;
    reader::properties_to_json(reply.iter_init())
}

/// `org.freedesktop.DBus.Introspectable.Introspect`, parsed into a [`Node`].
async fn introspect(conn: &SyncConnection, destination: &str, object: &str) -> Result<Node, GatewayError> {
    let reply = call(
        conn,
        destination,
        object,
        "org.freedesktop.DBus.Introspectable",
        "Introspect",
        |_| {},
    )
    .await?;
    let xml: String = reply
        .read1()
        .map_err(|e| GatewayError::Internal(format!("introspection reply: {e}")))?;
    Ok(introspect::parse(&xml)?)
}

/// Reads `interface`, `method`, and `arguments` out of a POST body, matching
/// `introspect_finished`'s `json_object_lookup_string`/`json_object_lookup`
/// checks — all three are required, and `arguments` must be an array.
fn parse_call_request(body: &Value) -> Result<(&str, &str, &[Value]), GatewayError> {
    let interface = body
        .get_str("interface")
        .map_err(|_| GatewayError::MalformedRequest("missing string field \"interface\"".into()))?;
    let method_name = body
        .get_str("method")
        .map_err(|_| GatewayError::MalformedRequest("missing string field \"method\"".into()))?;
    let arguments = body
        .get("arguments", Some(Kind::Array))
        .map_err(|_| GatewayError::MalformedRequest("missing array field \"arguments\"".into()))?
        .as_array()
        .expect("checked Kind::Array above");
    Ok((interface, method_name, arguments))
}

/// Resolves `(interface, method_name)` against `node`, matching
/// `dbus_node_find_method`'s "No such method" rejection.
fn resolve_method<'a>(node: &'a Node, interface: &str, method_name: &str) -> Result<&'a Method, GatewayError> {
    node.find_method(interface, method_name).ok_or(GatewayError::MethodNotFound)
}

/// Builds, sends, and decodes an outgoing method call once its method has
/// been resolved. Mirrors `bus_message_append_args_from_json` followed by
/// `sd_bus_call_async`/`method_call_finished`.
async fn invoke_method(
    conn: &SyncConnection,
    destination: &str,
    object: &str,
    interface: &str,
    method: &Method,
    arguments: &[Value],
) -> Result<Value, GatewayError> {
    // The destination/object/interface/method were all already validated
    // against a successful introspection, so a failure constructing the
    // call here is a server-side fault, not a bad request.
    let mut msg = Message::new_method_call(destination, object, interface, &method.name)
        .map_err(GatewayError::Internal)?;
    {
        let mut ia = IterAppend::new(&mut msg);
        writer::append_call_args(&mut ia, method, arguments)?;
    }
    let mut reply = send(conn, msg).await?;
    reply.as_result().map_err(GatewayError::from)?;
    reader::reply_to_json(method, reply.iter_init())
}

/// The full `GET /<destination>[/<object>]` request: parse the URL, call
/// `GetAll("")`, hand back the resulting JSON object.
pub async fn handle_get(conn: &SyncConnection, path: &str) -> Result<Value, GatewayError> {
    let (destination, object) = parse_url(path)?;
    get_all_properties(conn, &destination, &object).await
}

/// The full `POST /<destination>[/<object>]` request: parse the URL and
/// body, introspect the destination, resolve the method, call it, and
/// decode the reply. Mirrors `handle_post` + `introspect_finished` end to
/// end, minus the manual userdata bookkeeping `sd-bus` callbacks needed.
pub async fn handle_post(conn: &SyncConnection, path: &str, body: &str) -> Result<Value, GatewayError> {
    let (destination, object) = parse_url(path)?;
    let request = crate::json::parse(body, Some(Kind::Object))?;
    let (interface, method_name, arguments) = parse_call_request(&request)?;

    let node = introspect(conn, &destination, &object).await?;
    let method = resolve_method(&node, interface, method_name)?;

    invoke_method(conn, &destination, &object, interface, method, arguments).await
}
