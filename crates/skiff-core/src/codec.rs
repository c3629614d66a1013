//! Method-call encoding.
//!
//! Applications address actors with named methods rather than raw byte
//! blobs. A [`CallCodec`] turns `(method, args)` into a payload and back;
//! a [`DecoderRegistry`] maps method tags to typed decoders on the
//! serving side. An unresolvable tag decodes to an error, which the
//! request/response path returns to a remote caller as a fault.

use crate::envelope::Payload;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Encodes and decodes method calls and their replies.
pub trait CallCodec: Send + Sync {
    /// Encode an invocation of `method` with `args`.
    fn encode_call(&self, method: &str, args: &Value) -> Result<Payload>;

    /// Decode an invocation payload into `(method, args)`.
    fn decode_call(&self, payload: &Payload) -> Result<(String, Value)>;

    /// Encode the reply to `method`.
    fn encode_reply(&self, method: &str, result: &Value) -> Result<Payload>;

    /// Decode a reply payload.
    fn decode_reply(&self, payload: &Payload) -> Result<Value>;
}

/// Self-describing JSON codec.
///
/// The method name rides in the payload type tag as
/// `<namespace>.<method>`; replies use `<namespace>.<method>.reply`. The
/// body is plain JSON, so any homogeneous peer can locate the decoder
/// from the tag alone.
pub struct JsonCallCodec {
    namespace: String,
}

impl JsonCallCodec {
    /// Create a codec for one method namespace, e.g. `"match"`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn call_tag(&self, method: &str) -> String {
        format!("{}.{}", self.namespace, method)
    }

    fn reply_tag(&self, method: &str) -> String {
        format!("{}.{}.reply", self.namespace, method)
    }
}

impl CallCodec for JsonCallCodec {
    fn encode_call(&self, method: &str, args: &Value) -> Result<Payload> {
        Payload::json(self.call_tag(method), args)
    }

    fn decode_call(&self, payload: &Payload) -> Result<(String, Value)> {
        let prefix = format!("{}.", self.namespace);
        let method = payload
            .type_tag
            .strip_prefix(&prefix)
            .ok_or_else(|| Error::PayloadType {
                expected: format!("{prefix}*"),
                actual: payload.type_tag.clone(),
            })?;
        if method.ends_with(".reply") {
            return Err(Error::PayloadType {
                expected: format!("{prefix}<method>"),
                actual: payload.type_tag.clone(),
            });
        }
        Ok((method.to_string(), payload.decode_json()?))
    }

    fn encode_reply(&self, method: &str, result: &Value) -> Result<Payload> {
        Payload::json(self.reply_tag(method), result)
    }

    fn decode_reply(&self, payload: &Payload) -> Result<Value> {
        if !payload.type_tag.ends_with(".reply") {
            return Err(Error::PayloadType {
                expected: format!("{}.<method>.reply", self.namespace),
                actual: payload.type_tag.clone(),
            });
        }
        payload.decode_json()
    }
}

type Decoder<T> = Box<dyn Fn(&Payload) -> Result<T> + Send + Sync>;

/// Method-tag decoder table, populated once at startup.
///
/// The serving actor decodes each inbound payload through the registry;
/// a tag with no registered decoder is an error the caller sees as a
/// remote-call fault.
pub struct DecoderRegistry<T> {
    decoders: HashMap<String, Decoder<T>>,
}

impl<T> DecoderRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register a typed JSON decoder under a tag. Replaces any previous
    /// decoder for the tag.
    pub fn register<A, F>(&mut self, tag: impl Into<String>, build: F)
    where
        A: DeserializeOwned,
        F: Fn(A) -> T + Send + Sync + 'static,
    {
        self.decoders.insert(
            tag.into(),
            Box::new(move |payload| Ok(build(payload.decode_json::<A>()?))),
        );
    }

    /// Decode a payload through the registered decoder for its tag.
    pub fn decode(&self, payload: &Payload) -> Result<T> {
        match self.decoders.get(&payload.type_tag) {
            Some(decoder) => decoder(payload),
            None => Err(Error::PayloadType {
                expected: "a registered method tag".into(),
                actual: payload.type_tag.clone(),
            }),
        }
    }

    /// Registered tags.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }
}

impl<T> Default for DecoderRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode any serde value for a [`DecoderRegistry`] peer.
pub fn encode_as<A: Serialize>(tag: impl Into<String>, value: &A) -> Result<Payload> {
    Payload::json(tag, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_round_trip() {
        let codec = JsonCallCodec::new("match");
        let payload = codec
            .encode_call("join", &json!({"room": "lobby"}))
            .unwrap();
        assert_eq!(payload.type_tag, "match.join");

        let (method, args) = codec.decode_call(&payload).unwrap();
        assert_eq!(method, "join");
        assert_eq!(args, json!({"room": "lobby"}));
    }

    #[test]
    fn test_reply_round_trip() {
        let codec = JsonCallCodec::new("match");
        let payload = codec.encode_reply("join", &json!({"ok": true})).unwrap();
        assert_eq!(payload.type_tag, "match.join.reply");
        assert_eq!(codec.decode_reply(&payload).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_foreign_namespace_rejected() {
        let codec = JsonCallCodec::new("match");
        let payload = Payload::json("chat.say", &json!({})).unwrap();
        assert!(matches!(
            codec.decode_call(&payload),
            Err(Error::PayloadType { .. })
        ));
    }

    #[test]
    fn test_reply_is_not_a_call() {
        let codec = JsonCallCodec::new("match");
        let reply = codec.encode_reply("join", &json!({})).unwrap();
        assert!(codec.decode_call(&reply).is_err());
        assert!(codec
            .decode_reply(&Payload::json("match.join", &json!({})).unwrap())
            .is_err());
    }

    #[derive(Debug, PartialEq)]
    enum Command {
        Join { room: String },
        Leave,
    }

    #[test]
    fn test_decoder_registry_dispatch() {
        #[derive(serde::Deserialize)]
        struct JoinArgs {
            room: String,
        }

        let mut registry: DecoderRegistry<Command> = DecoderRegistry::new();
        registry.register("match.join", |args: JoinArgs| Command::Join {
            room: args.room,
        });
        registry.register("match.leave", |_: Value| Command::Leave);

        let join = encode_as("match.join", &json!({"room": "lobby"})).unwrap();
        assert_eq!(
            registry.decode(&join).unwrap(),
            Command::Join {
                room: "lobby".into()
            }
        );

        let leave = encode_as("match.leave", &json!(null)).unwrap();
        assert_eq!(registry.decode(&leave).unwrap(), Command::Leave);
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let registry: DecoderRegistry<Command> = DecoderRegistry::new();
        let payload = encode_as("match.unknown", &json!({})).unwrap();
        assert!(matches!(
            registry.decode(&payload),
            Err(Error::PayloadType { .. })
        ));
    }
}
