// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The seam between the facade and the DFS client entry points.

mod abstractions;
mod facade;
mod native;

pub use abstractions::*;
pub(crate) use facade::BindingsFacade;
pub use native::*;
