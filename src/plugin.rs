// Copyright 2024 Saptak Santra
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

//! Modular setup: a `Plugin` registers tags, systems and resources into
//! an `App` exactly once, declaring what it depends on so `App::plugin`
//! can refuse to run it out of order.

use crate::app::App;
use crate::error::Result;

/// A named, composable unit of app setup. `dependencies` names other
/// plugins (by `name()`) that must already be installed; `App::plugin`
/// checks this before calling `build`, so two plugins that depend on each
/// other (directly or transitively) can never both be installed — one of
/// them will always be the one that finds its dependency missing.
pub trait Plugin: 'static {
    fn name(&self) -> &'static str;

    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    fn build(&self, app: &mut App) -> Result<()>;
}
