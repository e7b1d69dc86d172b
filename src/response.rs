use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;

use crate::error::{BeanstalkError, BeanstalkResult, ServerError};

const CRLF: &[u8] = b"\r\n";

/// Name of the positional field carrying the body length.
const BODY_LEN_FIELD: &str = "bytes";

/// Turns the raw body (trailing CRLF already stripped) into a `Body`.
pub type BodyParser = fn(Vec<u8>) -> BeanstalkResult<Body>;

/// Body of a reply, e.g. the payload of a reserved job or a stats document.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Raw(Vec<u8>),
    Yaml(serde_yaml::Value),
}

impl Body {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Raw(data) => Some(&data[..]),
            Body::Yaml(_) => None,
        }
    }

    pub fn as_yaml(&self) -> Option<&serde_yaml::Value> {
        match self {
            Body::Yaml(value) => Some(value),
            Body::Raw(_) => None,
        }
    }
}

/// Keep the body bytes as they are.
pub fn raw_body(data: Vec<u8>) -> BeanstalkResult<Body> {
    Ok(Body::Raw(data))
}

/// Parse the YAML document sent back by the `stats` and `list-*` commands.
pub fn yaml_body(data: Vec<u8>) -> BeanstalkResult<Body> {
    Ok(Body::Yaml(serde_yaml::from_slice(&data)?))
}

/// One status word a command may be answered with, and what follows it.
#[derive(Debug, Clone, Copy)]
pub struct ReplyShape {
    pub word: &'static str,
    /// Lowercase identifier reported as the `state` of a decoded reply.
    pub state: &'static str,
    pub fields: &'static [&'static str],
    pub has_data: bool,
    pub parse: BodyParser,
}

impl ReplyShape {
    pub const fn new(
        word: &'static str,
        state: &'static str,
        fields: &'static [&'static str],
    ) -> ReplyShape {
        ReplyShape {
            word,
            state,
            fields,
            has_data: false,
            parse: raw_body,
        }
    }

    /// Declare a body whose length is given by the `bytes` field.
    pub const fn with_body(mut self, parse: BodyParser) -> ReplyShape {
        self.has_data = true;
        self.parse = parse;
        self
    }

    /// Number of body bytes announced by the status line, CRLF excluded.
    fn body_len(&self, args: &[String]) -> BeanstalkResult<Option<usize>> {
        if !self.has_data {
            return Ok(None);
        }

        let index = self
            .fields
            .iter()
            .position(|&f| f == BODY_LEN_FIELD)
            .ok_or_else(|| {
                BeanstalkError::UnexpectedResponse(format!(
                    "{} declares a body but no length field",
                    self.word
                ))
            })?;

        args.get(index)
            .and_then(|x| x.parse().ok())
            .map(Some)
            .ok_or_else(|| {
                BeanstalkError::UnexpectedResponse(format!(
                    "{} is missing a valid body length",
                    self.word
                ))
            })
    }
}

/// Every reply a command may legitimately receive, keyed by status word.
#[derive(Debug, Clone, Copy)]
pub struct ResponseSpec {
    shapes: &'static [ReplyShape],
}

impl ResponseSpec {
    pub const fn new(shapes: &'static [ReplyShape]) -> ResponseSpec {
        ResponseSpec { shapes }
    }

    pub fn lookup(&self, word: &str) -> Option<&ReplyShape> {
        self.shapes.iter().find(|shape| shape.word == word)
    }

    pub fn shapes(&self) -> &[ReplyShape] {
        self.shapes
    }

    /// How many body bytes (CRLF excluded) follow the status line of `reply`.
    /// Error tokens and unknown words never carry a body.
    pub fn body_len(&self, reply: &Reply) -> BeanstalkResult<Option<usize>> {
        match self.lookup(&reply.status) {
            Some(shape) => shape.body_len(&reply.args),
            None => Ok(None),
        }
    }
}

/// A reply as read from the wire, before decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub status: String,
    pub args: Vec<String>,
    /// Body bytes including the trailing CRLF.
    pub body: Option<Vec<u8>>,
}

impl Reply {
    /// Split a status line (CRLF included or not) into status word and arguments.
    pub fn parse_line(line: &[u8]) -> BeanstalkResult<Reply> {
        let line = std::str::from_utf8(line).map_err(|_| {
            BeanstalkError::UnexpectedResponse("status line is not valid UTF-8".to_string())
        })?;

        let mut parts = line.split_whitespace();
        let status = match parts.next() {
            Some(word) => word.to_string(),
            None => {
                return Err(BeanstalkError::UnexpectedResponse(
                    "empty response".to_string(),
                ))
            }
        };

        Ok(Reply {
            status,
            args: parts.map(|x| x.to_string()).collect(),
            body: None,
        })
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.status)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Positional value of a reply: ids and counts are integers, tube names strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(u64),
    Str(String),
}

impl FieldValue {
    /// Convert `token` to an integer when it is entirely numeric.
    pub fn coerce(token: &str) -> FieldValue {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(value) = token.parse() {
                return FieldValue::Int(value);
            }
        }
        FieldValue::Str(token.to_string())
    }
}

/// Outcome of a command: the reply's state, its named fields and its body.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    state: &'static str,
    fields: HashMap<&'static str, FieldValue>,
    data: Option<Body>,
}

impl Decoded {
    pub fn state(&self) -> &'static str {
        self.state
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn int(&self, name: &str) -> Option<u64> {
        match self.fields.get(name) {
            Some(FieldValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Str(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn fields(&self) -> &HashMap<&'static str, FieldValue> {
        &self.fields
    }

    pub fn data(&self) -> Option<&Body> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<Body> {
        self.data
    }

    /// Deserialize the structured body into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> BeanstalkResult<T> {
        match &self.data {
            Some(Body::Yaml(value)) => Ok(serde_yaml::from_value(value.clone())?),
            Some(Body::Raw(data)) => Ok(serde_yaml::from_slice(data)?),
            None => Err(BeanstalkError::InvalidArgument(format!(
                "{} reply has no body",
                self.state
            ))),
        }
    }
}

/// Decode `reply` against the replies its command allows.
///
/// Words declared by `spec` win over the global error table, so `TIMED_OUT`
/// is a regular outcome of `reserve-with-timeout`.
pub fn decode(spec: &ResponseSpec, reply: Reply) -> BeanstalkResult<Decoded> {
    let shape = match spec.lookup(&reply.status) {
        Some(shape) => shape,
        None => {
            ServerError::check(&reply.status)?;
            return Err(BeanstalkError::UnexpectedResponse(format!(
                "response was: {}",
                reply
            )));
        }
    };

    if reply.args.len() != shape.fields.len() {
        return Err(BeanstalkError::UnexpectedResponse(format!(
            "response {} had wrong # args, got {} (expected {})",
            shape.word,
            reply.args.len(),
            shape.fields.len()
        )));
    }

    let fields = shape
        .fields
        .iter()
        .zip(reply.args.iter())
        .map(|(&name, token)| (name, FieldValue::coerce(token)))
        .collect();

    let data = if shape.has_data {
        let mut body = reply.body.ok_or_else(|| {
            BeanstalkError::UnexpectedResponse(format!("{} is missing its body", shape.word))
        })?;
        if !body.ends_with(CRLF) {
            return Err(BeanstalkError::UnexpectedResponse(format!(
                "{} body is not terminated by CRLF",
                shape.word
            )));
        }
        body.truncate(body.len() - CRLF.len());
        Some((shape.parse)(body)?)
    } else {
        None
    };

    Ok(Decoded {
        state: shape.state,
        fields,
        data,
    })
}
