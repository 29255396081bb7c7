#![recursion_limit = "256"]

// Re-export deltalake crate so downstream crates (e.g. dash-query-provider)
// can use its DataFusion/Arrow types without a second direct dependency.
#[cfg(feature = "deltalake")]
pub extern crate deltalake;

mod channel;
mod function;
mod message;
pub mod messengers;
mod model;
mod namespace;
mod runtime;
pub mod schema;
pub mod storage;

pub use ark_core_k8s::data::Name;

pub use self::{
    channel::ModelChannel,
    function::Function,
    message::{decode_opt, Codec, DynMap, DynValue, PipeMessage, PipePayload},
    messengers::MessengerType,
    model::{Model, PayloadInput, Payloads},
    namespace::Namespace,
    runtime::{Runtime, RuntimeArgs},
};
