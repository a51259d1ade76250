// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Named host definitions and the registry that holds them.
//!
//! A host is either directly reachable or declares a `from` host it must be
//! tunneled through. `from` references are checked when a host is resolved,
//! not when it is registered, so definitions may refer to hosts registered
//! later.

pub mod descriptor;
pub mod registry;

pub use descriptor::{HostDescriptor, HostOptions, SshOptions, VagrantOption};
pub use registry::HostRegistry;
