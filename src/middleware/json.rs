//! JSON request and response bodies.

use std::sync::Arc;

use serde::Deserialize;

use crate::context::Context;
use crate::error::{BoxError, HandlerResult};
use crate::http::Headers;

use super::{Unit, handler};

/// Which halves of the JSON codec to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    /// Decode request bodies sent as `application/json`.
    pub decode_requests: bool,
    /// Encode structured response bodies as JSON.
    pub encode_responses: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            decode_requests: true,
            encode_responses: true,
        }
    }
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

fn decode(bytes: &[u8]) -> Result<serde_json::Value, BoxError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn encode(value: &serde_json::Value, headers: &mut Headers) -> Result<Vec<u8>, BoxError> {
    headers.set("Content-Type", "application/json");
    Ok(serde_json::to_vec(value)?)
}

fn install(ctx: &mut Context, options: JsonOptions) -> HandlerResult {
    if options.decode_requests && ctx.request_headers().get("content-type").is_some_and(is_json) {
        ctx.set_request_decoder(Arc::new(decode));
    }
    if options.encode_responses {
        ctx.set_response_encoder(Arc::new(encode));
    }
    ctx.next();
    Ok(())
}

/// Installs the JSON decoder and encoder with default options.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use waypoint::{handler, Context, Router};
/// use waypoint::http::{Recorder, Request};
/// use waypoint::middleware::json;
///
/// #[derive(Deserialize, Serialize)]
/// struct Note {
///     text: String,
/// }
///
/// let mut router = Router::new();
/// router.use_all([json()]);
/// router.post("/echo", [handler(|ctx: &mut Context| {
///     let note: Note = ctx.decode_body()?;
///     ctx.set_json(&note)?;
///     Ok(())
/// })]);
///
/// let recorder = Recorder::new();
/// router.serve(
///     Request::new("POST", "/echo")
///         .header("Content-Type", "application/json")
///         .body(r#"{"text":"hi"}"#),
///     recorder.clone(),
/// );
/// assert_eq!(recorder.body_text(), r#"{"text":"hi"}"#);
/// assert_eq!(recorder.header("content-type").as_deref(), Some("application/json"));
/// ```
pub fn json() -> Unit {
    json_with(JsonOptions::default())
}

/// Installs the JSON codec halves selected by `options`.
pub fn json_with(options: JsonOptions) -> Unit {
    handler(move |ctx: &mut Context| install(ctx, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::http::{Recorder, Request, StatusCode};

    #[test]
    fn content_type_detection() {
        assert!(is_json("application/json"));
        assert!(is_json("Application/JSON; charset=utf-8"));
        assert!(!is_json("text/plain"));
        assert!(!is_json("application/jsonp"));
    }

    #[test]
    fn non_json_request_gets_no_decoder() {
        let recorder = Recorder::new();
        let mut ctx = Context::with_units(
            Request::new("POST", "/")
                .header("Content-Type", "text/plain")
                .body("{}"),
            recorder,
            [
                json(),
                handler(|ctx: &mut Context| {
                    let _: serde_json::Value = ctx.decode_body()?;
                    Ok(())
                }),
            ],
        );
        ctx.next();
        assert!(matches!(ctx.error(), Some(Error::NoDecoderConfigured)));
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let recorder = Recorder::new();
        let mut ctx = Context::with_units(
            Request::new("POST", "/")
                .header("Content-Type", "application/json")
                .body("{not json"),
            recorder.clone(),
            [
                json(),
                handler(|ctx: &mut Context| {
                    let _: serde_json::Value = ctx.decode_body()?;
                    Ok(())
                }),
            ],
        );
        ctx.next();
        assert!(matches!(ctx.error(), Some(Error::Decode(_))));
        ctx.finalize();
        assert_eq!(recorder.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn encoder_can_be_disabled() {
        let recorder = Recorder::new();
        let mut ctx = Context::with_units(
            Request::new("GET", "/"),
            recorder.clone(),
            [
                json_with(JsonOptions {
                    decode_requests: true,
                    encode_responses: false,
                }),
                handler(|ctx: &mut Context| {
                    ctx.set_json(&[1, 2, 3])?;
                    Ok(())
                }),
            ],
        );
        ctx.next();
        ctx.finalize();
        assert_eq!(recorder.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: JsonOptions = serde_json::from_str(r#"{ "encode_responses": false }"#).unwrap();
        assert!(options.decode_requests);
        assert!(!options.encode_responses);
    }
}
