// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod fail;
pub mod queue;
pub mod timebase;

pub use fail::Fail;
pub use queue::{
    Runnable,
    RunnableQueue,
};
pub use timebase::Ticks;
