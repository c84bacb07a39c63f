//! Route registration errors
//!
//! These are configuration errors raised while the route table is built,
//! before any message is dispatched. The panicking registration methods on
//! [`Mux`](crate::Mux) and [`Group`](crate::Group) report them through
//! `panic!`; the `try_*` variants return them.

use thiserror::Error;

use crate::trie::RouteKind;

pub type Result<T> = std::result::Result<T, RouteError>;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("duplicate {kind} registered for subject {subject:?}")]
    Duplicate { subject: String, kind: RouteKind },

    #[error("parameter {{{new}}} conflicts with {{{existing}}} after {subject:?}")]
    ParamConflict {
        subject: String,
        existing: String,
        new: String,
    },

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

impl From<courier_core::Error> for RouteError {
    fn from(e: courier_core::Error) -> Self {
        match e {
            courier_core::Error::InvalidPattern(msg) => RouteError::InvalidPattern(msg),
            other => RouteError::InvalidPattern(other.to_string()),
        }
    }
}

impl From<RouteError> for courier_core::Error {
    fn from(e: RouteError) -> Self {
        courier_core::Error::Config(e.to_string())
    }
}
