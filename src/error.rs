//! The error taxonomy and its translation to HTTP status + JSON body: a
//! fixed `match` over D-Bus error-name suffixes for `BusError`, and a
//! `{"error": ..., "message": ...}` body shape for every other kind.
//! `thiserror` gives each variant a `Display` impl doubling as its log
//! message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// URL shape, body not JSON, missing required keys, argument arity
    /// mismatch.
    #[error("invalid request: {0}")]
    MalformedRequest(String),

    /// Introspection succeeded but (interface, method) is absent.
    #[error("no such method")]
    MethodNotFound,

    /// A JSON value does not fit the declared D-Bus type.
    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    /// A file-descriptor type appears, or a variant cannot be typed.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The bus replied with an error.
    #[error("bus error: {0}")]
    BusError(#[from] dbus::Error),

    /// I/O failure, unexpected parser state, or another internal fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<crate::introspect::IntrospectError> for GatewayError {
    fn from(e: crate::introspect::IntrospectError) -> Self {
        GatewayError::Internal(format!("introspection XML: {e}"))
    }
}

impl From<crate::json::JsonError> for GatewayError {
    fn from(e: crate::json::JsonError) -> Self {
        GatewayError::MalformedRequest(e.to_string())
    }
}

impl GatewayError {
    /// Maps this error to an HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::MalformedRequest(_) => 400,
            GatewayError::MethodNotFound => 400,
            GatewayError::InvalidArgs(_) => 400,
            // An unsupported argument shape is a client-side request
            // problem, not a server fault.
            GatewayError::Unsupported(_) => 400,
            GatewayError::BusError(e) => bus_error_status(e),
            GatewayError::Internal(_) => 500,
        }
    }

    /// Builds the `{"error": ..., "message": ...}` response body.
    pub fn error_body(&self) -> crate::json::Value {
        let mut body = crate::json::Value::object();
        let (name, message) = match self {
            GatewayError::MalformedRequest(msg) => ("Invalid request".to_string(), Some(msg.clone())),
            GatewayError::MethodNotFound => ("No such method".to_string(), None),
            GatewayError::InvalidArgs(msg) => ("Invalid request".to_string(), Some(msg.clone())),
            GatewayError::Unsupported(msg) => ("Invalid request".to_string(), Some(msg.clone())),
            GatewayError::BusError(e) => (
                e.name().unwrap_or("org.freedesktop.DBus.Error.Failed").to_string(),
                e.message().map(str::to_string),
            ),
            GatewayError::Internal(msg) => ("Internal error".to_string(), Some(msg.clone())),
        };
        body.insert_string("error", name).expect("body is a freshly constructed object");
        if let Some(m) = message {
            body.insert_string("message", m).expect("body is a freshly constructed object");
        }
        body
    }
}

/// The fixed D-Bus error suffix → HTTP status table.
fn bus_error_status(e: &dbus::Error) -> u16 {
    match e.name().unwrap_or("") {
        "org.freedesktop.DBus.Error.UnknownMethod"
        | "org.freedesktop.DBus.Error.UnknownObject"
        | "org.freedesktop.DBus.Error.UnknownInterface"
        | "org.freedesktop.DBus.Error.UnknownProperty"
        | "org.freedesktop.DBus.Error.InvalidSignature"
        | "org.freedesktop.DBus.Error.InvalidArgs" => 400,
        "org.freedesktop.DBus.Error.AccessDenied" => 403,
        "org.freedesktop.DBus.Error.ServiceUnknown" | "org.freedesktop.DBus.Error.NameHasNoOwner" => 404,
        "org.freedesktop.DBus.Error.NoReply" | "org.freedesktop.DBus.Error.Timeout" => 408,
        _ => 500,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bus_err(name: &str) -> dbus::Error {
        dbus::Error::new_custom(name, "boom")
    }

    #[test]
    fn maps_known_bus_error_names() {
        assert_eq!(GatewayError::from(bus_err("org.freedesktop.DBus.Error.UnknownMethod")).http_status(), 400);
        assert_eq!(GatewayError::from(bus_err("org.freedesktop.DBus.Error.AccessDenied")).http_status(), 403);
        assert_eq!(GatewayError::from(bus_err("org.freedesktop.DBus.Error.ServiceUnknown")).http_status(), 404);
        assert_eq!(GatewayError::from(bus_err("org.freedesktop.DBus.Error.Timeout")).http_status(), 408);
    }

    #[test]
    fn unknown_bus_error_name_maps_to_500() {
        assert_eq!(GatewayError::from(bus_err("dbus.http.DivisionByZero")).http_status(), 500);
    }

    #[test]
    fn malformed_and_not_found_map_to_400() {
        assert_eq!(GatewayError::MalformedRequest("x".into()).http_status(), 400);
        assert_eq!(GatewayError::MethodNotFound.http_status(), 400);
        assert_eq!(
            GatewayError::error_body(&GatewayError::MethodNotFound).get_str("error").unwrap(),
            "No such method"
        );
    }

    #[test]
    fn unsupported_is_pinned_to_400() {
        assert_eq!(GatewayError::Unsupported("fd".into()).http_status(), 400);
    }

    #[test]
    fn internal_maps_to_500() {
        assert_eq!(GatewayError::Internal("oops".into()).http_status(), 500);
    }
}
