//! Network boundary: the [NetworkAdapter] capability and the per-lookup state
//! built on top of it.

mod closest_contacts;
mod http;
mod info;
pub(crate) mod lookup;
mod memory;
mod response;

use std::fmt::Debug;

use bytes::Bytes;
use tracing::trace;

use crate::common::{
    Contact, FindNodeRequestArguments, FindValueRequestArguments, FindValueResponseArguments, Id,
    RequestSpecific, RequestTypeSpecific, ResponseSpecific, StoreRequestArguments,
};
use crate::Result;

pub use closest_contacts::ClosestContacts;
pub use http::HttpAdapter;
pub use info::Info;
pub use memory::{MemoryNetwork, Testnet};
pub use response::StoreOutcome;

/// Carries RPCs to other nodes.
///
/// Implementors only provide [Self::request]. The provided methods absorb
/// every failure (unreachable peer, timeout, malformed payload, or a response
/// of the wrong kind) into `false` or `None`, which callers read as "did not
/// respond".
pub trait NetworkAdapter: Debug + Send + Sync {
    /// Send `request` to `recipient` and wait for its response, or the timeout.
    fn request(&self, recipient: &Contact, request: RequestSpecific) -> Result<ResponseSpecific>;

    /// Liveness probe.
    fn ping(&self, recipient: &Contact, sender: &Contact) -> bool {
        let request = RequestSpecific::new(sender.clone(), RequestTypeSpecific::Ping);

        matches!(absorb(self.request(recipient, request), recipient), Some(ResponseSpecific::Ping))
    }

    /// Ask `recipient` to store `value` under `key`. Returns `true` on acknowledgement.
    fn store(&self, key: Id, value: Bytes, recipient: &Contact, sender: &Contact) -> bool {
        let request = RequestSpecific::new(
            sender.clone(),
            RequestTypeSpecific::Store(StoreRequestArguments { key, value }),
        );

        matches!(absorb(self.request(recipient, request), recipient), Some(ResponseSpecific::Store))
    }

    /// Contacts `recipient` knows closest to `target`, or `None` if it did not respond.
    fn find_node(&self, target: Id, recipient: &Contact, sender: &Contact) -> Option<Vec<Contact>> {
        let request = RequestSpecific::new(
            sender.clone(),
            RequestTypeSpecific::FindNode(FindNodeRequestArguments { target }),
        );

        match absorb(self.request(recipient, request), recipient)? {
            ResponseSpecific::FindNode(args) => Some(args.contacts),
            other => unexpected(recipient, other),
        }
    }

    /// The value stored under `key` at `recipient`, or the contacts it knows closest to `key`.
    fn find_value(&self, key: Id, recipient: &Contact, sender: &Contact) -> Option<FindValueResponseArguments> {
        let request = RequestSpecific::new(
            sender.clone(),
            RequestTypeSpecific::FindValue(FindValueRequestArguments { key }),
        );

        match absorb(self.request(recipient, request), recipient)? {
            ResponseSpecific::FindValue(args) => Some(args),
            other => unexpected(recipient, other),
        }
    }

    /// Status of `recipient`.
    fn info(&self, recipient: &Contact) -> Option<Info> {
        match absorb(self.request(recipient, RequestSpecific::info()), recipient)? {
            ResponseSpecific::Info(info) => Some(info),
            other => unexpected(recipient, other),
        }
    }
}

/// Turn transport failures and error responses into "no response".
fn absorb(result: Result<ResponseSpecific>, recipient: &Contact) -> Option<ResponseSpecific> {
    match result {
        Ok(ResponseSpecific::Error(error)) => {
            trace!(to = ?recipient.id(), ?error, "Error response");
            None
        }
        Ok(response) => Some(response),
        Err(error) => {
            trace!(to = ?recipient.id(), %error, "Request failed");
            None
        }
    }
}

fn unexpected<T>(recipient: &Contact, response: ResponseSpecific) -> Option<T> {
    trace!(to = ?recipient.id(), ?response, "Unexpected response");
    None
}
