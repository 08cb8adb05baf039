// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    error,
    fmt,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Failure
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fail {
    /// Error code.
    pub errno: i32,
    /// Cause of the failure.
    pub cause: String,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Fail {
    /// Creates a new failure.
    pub fn new(errno: i32, cause: &str) -> Self {
        Self {
            errno,
            cause: cause.to_string(),
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl error::Error for Fail {}

impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "error {:?}: {:?}", self.errno, self.cause)
    }
}
