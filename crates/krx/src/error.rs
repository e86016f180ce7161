//! 💀 Errors: every way a search request can go sideways, with a name tag on each.
//!
//! 🧠 Knowledge graph:
//! - `Connection` / `Timeout` / `Response` come out of the transport. These are the
//!   "the cluster is having a day" errors, and the only ones `failsafe` will swallow.
//! - `BulkItem` is one document in a `_bulk` batch that came back rejected and was not
//!   on the ignore list. Carries the raw item so you can see exactly what the cluster said.
//! - `NotSupported` means the caller asked for something illegal (a scroll inside an
//!   aggregation, a delete-by-query on a cluster too old to have one).
//! - `UndefinedScope` is a named scope lookup that found nothing in the registry.
//!
//! 🦆 The duck is not an error. The duck is a constant.

use serde_json::Value;
use thiserror::Error;

/// 📦 The one error type the library hands out.
#[derive(Debug, Error)]
pub enum Error {
    /// 📡 The transport never reached the engine: refused, reset, DNS, TLS, you name it.
    #[error("💀 connection error: {0}")]
    Connection(String),

    /// ⏱️ The engine took longer than the configured deadline.
    #[error("💀 request timed out: {0}")]
    Timeout(String),

    /// 📭 The engine answered, but not with a 2xx.
    #[error("💀 engine responded with status {status}: {body}")]
    Response { status: u16, body: String },

    /// 🗑️ A single bulk item failed with a status that was not ignored.
    #[error("💀 bulk item failed with status {status}: {item}")]
    BulkItem { status: u16, item: Value },

    /// 🚫 Illegal field combination or an operation the active engine cannot do.
    #[error("💀 not supported: {0}")]
    NotSupported(String),

    /// 🔍 Polymorphic dispatch asked for a scope the target never registered.
    #[error("💀 undefined scope '{0}'")]
    UndefinedScope(String),

    /// 🧩 The response body was not the JSON we were promised.
    #[error("💀 could not decode engine response: {0}")]
    Decode(#[from] serde_json::Error),

    /// 🔧 Configuration that cannot be turned into a working client.
    #[error("💀 invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// 🔄 Transport-shaped failures: the set `failsafe` converts into an empty response.
    ///
    /// `BulkItem` and `NotSupported` are never transient. They are caller bugs or real
    /// write failures, and hiding them would only move the 3am page to a worse 3am.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Timeout(_) | Error::Response { .. }
        )
    }

    /// 📭 Status code of a `Response` error, if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Response { status, .. } | Error::BulkItem { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 🎯 Shorthand used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
