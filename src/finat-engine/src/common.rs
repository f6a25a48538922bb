// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,     // will never be produced
    UnknownNode, // a handle that names no node in the arena
    UnknownIndex,
    MismatchedArity,
    UnresolvableIndex,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            UnknownNode => "unknown_node",
            UnknownIndex => "unknown_index",
            MismatchedArity => "mismatched_arity",
            UnresolvableIndex => "unresolvable_index",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Rewrite,
    Binding,
    Extraction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Rewrite => "RewriteError",
            ErrorKind::Binding => "BindingError",
            ErrorKind::Extraction => "ExtractionError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! rewrite_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Rewrite, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Rewrite, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! binding_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Binding, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Binding, ErrorCode::$code, None))
    }};
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Binding,
        ErrorCode::UnresolvableIndex,
        Some("missing index q".to_string()),
    );
    assert_eq!(
        "BindingError{unresolvable_index: missing index q}",
        format!("{err}")
    );

    let err = Error::new(ErrorKind::Rewrite, ErrorCode::UnknownNode, None);
    assert_eq!("RewriteError{unknown_node}", format!("{err}"));
}

#[test]
fn test_err_macros() {
    let r: Result<()> = binding_err!(UnresolvableIndex, "j".to_string());
    let err = r.unwrap_err();
    assert_eq!(ErrorKind::Binding, err.kind);
    assert_eq!(ErrorCode::UnresolvableIndex, err.code);
    assert_eq!(Some("j".to_string()), err.get_details());

    let r: Result<()> = rewrite_err!(MismatchedArity);
    assert_eq!(ErrorCode::MismatchedArity, r.unwrap_err().code);
}
