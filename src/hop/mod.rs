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

//! Multi-hop endpoint resolution.
//!
//! For a host declared `from` another host, reaching one of its ports means
//! reaching the upstream's SSH port first (itself possibly multi-hop),
//! opening a gateway session there and forwarding through it:
//!
//! ```text
//! db from web, web from bastion:
//!
//! runner → bastion:22 (direct)
//!        → session(bastion) → forward to web:22 → 127.0.0.1:a
//!        → session(web via 127.0.0.1:a) → forward to db:5432 → 127.0.0.1:b
//! ```

mod endpoint;
mod pool;
mod resolver;

pub use endpoint::Endpoint;
pub use pool::{SessionPool, SessionTracker};
pub use resolver::{HopResolver, DEFAULT_MAX_CHAIN_DEPTH};
