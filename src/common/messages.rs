//! Typed RPC messages and their form/json wire encoding.
//!
//! Requests travel as form-encoded HTTP bodies carrying the sender's
//! `id`, `ip` and `port`, responses as JSON. Every inbound payload is
//! parsed into these types at the boundary, and anything that does not
//! fit is an error, never a partially filled message.

use std::collections::HashMap;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::common::{Contact, Id};
use crate::rpc::Info;
use crate::{Error, Result};

pub const PING_PATH: &str = "/rpc/ping";
pub const STORE_PATH: &str = "/rpc/store";
pub const FIND_NODE_PATH: &str = "/rpc/find_node";
pub const FIND_VALUE_PATH: &str = "/rpc/find_value";
pub const INFO_PATH: &str = "/info";

#[derive(Debug, PartialEq, Clone)]
pub struct RequestSpecific {
    /// The requesting node, so the recipient can add or refresh it.
    /// Only `info` requests come without one.
    pub sender: Option<Contact>,
    pub request_type: RequestTypeSpecific,
}

#[derive(Debug, PartialEq, Clone)]
pub enum RequestTypeSpecific {
    Ping,
    Store(StoreRequestArguments),
    FindNode(FindNodeRequestArguments),
    FindValue(FindValueRequestArguments),
    Info,
}

#[derive(Debug, PartialEq, Clone)]
pub struct StoreRequestArguments {
    pub key: Id,
    pub value: Bytes,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindNodeRequestArguments {
    pub target: Id,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindValueRequestArguments {
    pub key: Id,
}

#[derive(Debug, PartialEq, Clone)]
pub enum ResponseSpecific {
    Ping,
    Store,
    FindNode(FindNodeResponseArguments),
    FindValue(FindValueResponseArguments),
    Info(Info),
    Error(ErrorSpecific),
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindNodeResponseArguments {
    pub contacts: Vec<Contact>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum FindValueResponseArguments {
    Value(Bytes),
    Contacts(Vec<Contact>),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ErrorSpecific {
    pub code: u16,
    pub description: String,
}

/// JSON body of a `find_value` response.
#[derive(Debug, Default, Serialize, Deserialize)]
struct FindValueBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contacts: Option<Vec<Contact>>,
}

impl RequestSpecific {
    pub fn new(sender: Contact, request_type: RequestTypeSpecific) -> Self {
        Self {
            sender: Some(sender),
            request_type,
        }
    }

    pub fn info() -> Self {
        Self {
            sender: None,
            request_type: RequestTypeSpecific::Info,
        }
    }

    /// HTTP path this request is sent to.
    pub fn path(&self) -> &'static str {
        match self.request_type {
            RequestTypeSpecific::Ping => PING_PATH,
            RequestTypeSpecific::Store(_) => STORE_PATH,
            RequestTypeSpecific::FindNode(_) => FIND_NODE_PATH,
            RequestTypeSpecific::FindValue(_) => FIND_VALUE_PATH,
            RequestTypeSpecific::Info => INFO_PATH,
        }
    }

    /// Form fields of this request.
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = Vec::with_capacity(5);

        match &self.request_type {
            RequestTypeSpecific::Store(args) => {
                form.push(("file_id", args.key.to_string()));
                form.push(("address", hex::encode(&args.value)));
            }
            RequestTypeSpecific::FindNode(args) => {
                form.push(("node_id", args.target.to_string()));
            }
            RequestTypeSpecific::FindValue(args) => {
                form.push(("file_id", args.key.to_string()));
            }
            RequestTypeSpecific::Ping | RequestTypeSpecific::Info => {}
        }

        if let Some(sender) = &self.sender {
            form.push(("id", sender.id().to_string()));
            form.push(("ip", sender.ip().to_string()));
            form.push(("port", sender.port().to_string()));
        }

        form
    }

    /// Parse an inbound request from its path and form fields.
    pub fn from_form<I, K, V>(path: &str, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect::<HashMap<String, String>>();

        if path == INFO_PATH {
            return Ok(Self::info());
        }

        let request_type = match path {
            PING_PATH => RequestTypeSpecific::Ping,
            STORE_PATH => RequestTypeSpecific::Store(StoreRequestArguments {
                key: parse_id(&fields, "file_id")?,
                value: hex::decode(field(&fields, "address")?)
                    .map_err(|error| Error::MalformedRequest(format!("address: {error}")))?
                    .into(),
            }),
            FIND_NODE_PATH => RequestTypeSpecific::FindNode(FindNodeRequestArguments {
                target: parse_id(&fields, "node_id")?,
            }),
            FIND_VALUE_PATH => RequestTypeSpecific::FindValue(FindValueRequestArguments {
                key: parse_id(&fields, "file_id")?,
            }),
            _ => return Err(Error::MalformedRequest(format!("unknown path {path}"))),
        };

        let port = field(&fields, "port")?
            .parse::<u16>()
            .map_err(|error| Error::MalformedRequest(format!("port: {error}")))?;

        let sender = Contact::new(parse_id(&fields, "id")?, field(&fields, "ip")?, port);

        Ok(Self::new(sender, request_type))
    }
}

impl ResponseSpecific {
    /// HTTP status and JSON body of this response.
    pub fn to_http(&self) -> Result<(u16, String)> {
        let body = match self {
            ResponseSpecific::Ping | ResponseSpecific::Store => "true".to_string(),
            ResponseSpecific::FindNode(args) => serde_json::to_string(&args.contacts)?,
            ResponseSpecific::FindValue(args) => {
                let body = match args {
                    FindValueResponseArguments::Value(value) => FindValueBody {
                        data: Some(hex::encode(value)),
                        contacts: None,
                    },
                    FindValueResponseArguments::Contacts(contacts) => FindValueBody {
                        data: None,
                        contacts: Some(contacts.clone()),
                    },
                };

                serde_json::to_string(&body)?
            }
            ResponseSpecific::Info(info) => serde_json::to_string(info)?,
            ResponseSpecific::Error(error) => return Ok((error.code, serde_json::to_string(error)?)),
        };

        Ok((200, body))
    }

    /// Parse the HTTP response to `request`.
    ///
    /// Non-success statuses and bodies that do not match the request are errors.
    pub fn from_http(request: &RequestTypeSpecific, status: u16, body: &str) -> Result<Self> {
        if !(200..300).contains(&status) {
            return Err(Error::Status(status));
        }

        let response = match request {
            RequestTypeSpecific::Ping => ResponseSpecific::Ping,
            RequestTypeSpecific::Store(_) => ResponseSpecific::Store,
            RequestTypeSpecific::FindNode(_) => ResponseSpecific::FindNode(FindNodeResponseArguments {
                contacts: serde_json::from_str(body)?,
            }),
            RequestTypeSpecific::FindValue(_) => {
                let body: FindValueBody = serde_json::from_str(body)?;

                match (body.data, body.contacts) {
                    (Some(data), _) => ResponseSpecific::FindValue(FindValueResponseArguments::Value(
                        hex::decode(data)
                            .map_err(|_| Error::UnexpectedResponse { expected: "hex value" })?
                            .into(),
                    )),
                    (None, Some(contacts)) => {
                        ResponseSpecific::FindValue(FindValueResponseArguments::Contacts(contacts))
                    }
                    (None, None) => {
                        return Err(Error::UnexpectedResponse {
                            expected: "find_value data or contacts",
                        })
                    }
                }
            }
            RequestTypeSpecific::Info => ResponseSpecific::Info(serde_json::from_str(body)?),
        };

        Ok(response)
    }
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::MalformedRequest(format!("missing field {name}")))
}

fn parse_id(fields: &HashMap<String, String>, name: &str) -> Result<Id> {
    Id::from_str(field(fields, name)?).map_err(|error| Error::MalformedRequest(format!("{name}: {error}")))
}
